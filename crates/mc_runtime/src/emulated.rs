// crates/mc_runtime/src/emulated.rs

//! 模拟加速器
//!
//! 设备内存为打上 `Device` 标记的主机内存，拷贝在发起时即完成。
//! 记录每类操作的调用次数与绑定线程，并可按调用序号注入驱动故障，
//! 用于在没有硬件的环境中验证传输阶段的顺序与故障语义。

use bytemuck::Pod;
use log::debug;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::accelerator::Accelerator;
use crate::channel::BlockRef;
use crate::error::{AccelError, AccelOp, AccelResult};
use crate::metrics::Counter;
use crate::storage::{HostAccessible, HostMemory, HostRegion, MemoryLocation, Shape, Storage};

/// 注入的故障：第 `on_call` 次（从 1 计）调用 `op` 时失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// 失败的操作
    pub op: AccelOp,
    /// 失败的调用序号
    pub on_call: u64,
}

/// 模拟设备内存
pub struct EmulatedDeviceMemory<T> {
    inner: HostMemory<T>,
    ordinal: usize,
}

impl<T: Pod> EmulatedDeviceMemory<T> {
    /// 在指定设备序号上创建零初始化内存
    pub fn zeroed(shape: impl Into<Shape>, ordinal: usize) -> Self {
        Self {
            inner: HostMemory::zeroed(shape),
            ordinal,
        }
    }
}

impl<T: Pod + Send + Sync> Storage for EmulatedDeviceMemory<T> {
    type Elem = T;

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn shape(&self) -> Shape {
        self.inner.shape()
    }

    fn location(&self) -> MemoryLocation {
        MemoryLocation::Device(self.ordinal)
    }
}

// 模拟设备内存即主机内存，生产者（模拟内核）可直接写入
unsafe impl<T: Pod + Send + Sync> HostAccessible for EmulatedDeviceMemory<T> {
    fn base_ptr(&self) -> *mut T {
        self.inner.base_ptr()
    }
}

impl<T> fmt::Debug for EmulatedDeviceMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedDeviceMemory")
            .field("memory", &self.inner)
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

/// 模拟传输流
#[derive(Debug)]
pub struct EmulatedStream {
    id: u64,
    owner: ThreadId,
    in_flight: u64,
}

impl EmulatedStream {
    /// 流编号（从 1 计）
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 自上次同步以来发起的拷贝数
    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }
}

struct Inner {
    ordinal: usize,
    faults: Mutex<Vec<Fault>>,
    calls: [Counter; AccelOp::COUNT],
    bound_thread: Mutex<Option<ThreadId>>,
    pinned: Mutex<Vec<usize>>,
}

/// 模拟加速器
///
/// 克隆共享同一份调用计数与故障计划。
#[derive(Clone)]
pub struct EmulatedAccelerator {
    inner: Arc<Inner>,
}

impl EmulatedAccelerator {
    /// 创建指定设备序号的模拟加速器
    pub fn new(ordinal: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                ordinal,
                faults: Mutex::new(Vec::new()),
                calls: Default::default(),
                bound_thread: Mutex::new(None),
                pinned: Mutex::new(Vec::new()),
            }),
        }
    }

    /// 注入故障：第 `on_call` 次调用 `op` 时失败
    pub fn with_fault(self, op: AccelOp, on_call: u64) -> Self {
        self.inject(Fault { op, on_call });
        self
    }

    /// 追加故障
    pub fn inject(&self, fault: Fault) {
        self.inner.faults.lock().push(fault);
    }

    /// 某操作的调用次数（含失败的调用）
    pub fn calls(&self, op: AccelOp) -> u64 {
        self.inner.calls[op.index()].get()
    }

    /// 已绑定上下文的线程
    pub fn bound_thread(&self) -> Option<ThreadId> {
        *self.inner.bound_thread.lock()
    }

    /// 已注册锁页区域的字节数（按注册顺序）
    pub fn pinned_regions(&self) -> Vec<usize> {
        self.inner.pinned.lock().clone()
    }

    /// 计数一次调用，命中故障计划时返回错误
    fn tick(&self, op: AccelOp) -> AccelResult<u64> {
        let call = self.inner.calls[op.index()].next();
        let hit = self
            .inner
            .faults
            .lock()
            .iter()
            .any(|f| f.op == op && f.on_call == call);
        if hit {
            debug!("emulated fault injected: {} call #{}", op, call);
            return Err(AccelError::new(op, format!("injected fault on call #{}", call)));
        }
        Ok(call)
    }

    /// 检查当前线程持有上下文
    fn check_context(&self, op: AccelOp) -> AccelResult<()> {
        let current = thread::current().id();
        match *self.inner.bound_thread.lock() {
            Some(owner) if owner == current => Ok(()),
            Some(_) => Err(AccelError::new(op, "context is bound to another thread")),
            None => Err(AccelError::new(op, "no context bound to the calling thread")),
        }
    }
}

impl Default for EmulatedAccelerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for EmulatedAccelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedAccelerator")
            .field("ordinal", &self.inner.ordinal)
            .field("bound_thread", &self.bound_thread())
            .finish()
    }
}

impl Accelerator for EmulatedAccelerator {
    type Memory<T: Pod + Send + Sync> = EmulatedDeviceMemory<T>;
    type Stream = EmulatedStream;

    fn name(&self) -> &'static str {
        "Emulated"
    }

    fn location(&self) -> MemoryLocation {
        MemoryLocation::Device(self.inner.ordinal)
    }

    fn alloc<T: Pod + Send + Sync>(&self, shape: Shape) -> AccelResult<EmulatedDeviceMemory<T>> {
        self.tick(AccelOp::Alloc)?;
        Ok(EmulatedDeviceMemory::zeroed(shape, self.inner.ordinal))
    }

    fn bind_thread(&self) -> AccelResult<()> {
        self.tick(AccelOp::BindContext)?;
        let current = thread::current().id();
        let mut bound = self.inner.bound_thread.lock();
        if let Some(owner) = *bound {
            if owner != current {
                return Err(AccelError::new(
                    AccelOp::BindContext,
                    "context already bound to another thread",
                ));
            }
        }
        *bound = Some(current);
        debug!("emulated device {} bound to {:?}", self.inner.ordinal, current);
        Ok(())
    }

    fn create_stream(&self) -> AccelResult<EmulatedStream> {
        self.check_context(AccelOp::CreateStream)?;
        let id = self.tick(AccelOp::CreateStream)?;
        Ok(EmulatedStream {
            id,
            owner: thread::current().id(),
            in_flight: 0,
        })
    }

    fn register_host(&self, region: HostRegion) -> AccelResult<()> {
        self.check_context(AccelOp::RegisterHost)?;
        self.tick(AccelOp::RegisterHost)?;
        self.inner.pinned.lock().push(region.bytes);
        debug!("emulated pin: {} bytes at {:p}", region.bytes, region.ptr);
        Ok(())
    }

    unsafe fn copy_dtoh_async<T: Pod + Send + Sync>(
        &self,
        stream: &mut EmulatedStream,
        src: BlockRef<'_, EmulatedDeviceMemory<T>>,
        dst: &mut [T],
    ) -> AccelResult<()> {
        if stream.owner != thread::current().id() {
            return Err(AccelError::new(AccelOp::CopyAsync, "stream used off its owner thread"));
        }
        self.tick(AccelOp::CopyAsync)?;
        if src.len != dst.len() {
            return Err(AccelError::new(
                AccelOp::CopyAsync,
                format!("length mismatch: src {} vs dst {}", src.len, dst.len()),
            ));
        }
        if src.offset + src.len > src.storage.len() {
            return Err(AccelError::new(AccelOp::CopyAsync, "source block out of bounds"));
        }
        let source = std::slice::from_raw_parts(src.storage.base_ptr().add(src.offset), src.len);
        dst.copy_from_slice(source);
        stream.in_flight += 1;
        Ok(())
    }

    fn synchronize(&self, stream: &mut EmulatedStream) -> AccelResult<()> {
        if stream.owner != thread::current().id() {
            return Err(AccelError::new(AccelOp::Synchronize, "stream used off its owner thread"));
        }
        self.tick(AccelOp::Synchronize)?;
        stream.in_flight = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;

    #[test]
    fn test_stream_requires_bound_context() {
        let accel = EmulatedAccelerator::new(0);
        let err = accel.create_stream().unwrap_err();
        assert_eq!(err.op, AccelOp::CreateStream);

        accel.bind_thread().unwrap();
        let stream = accel.create_stream().unwrap();
        assert_eq!(stream.id(), 1);
        assert_eq!(accel.bound_thread(), Some(thread::current().id()));
    }

    #[test]
    fn test_bind_from_second_thread_fails() {
        let accel = EmulatedAccelerator::new(0);
        accel.bind_thread().unwrap();

        let other = accel.clone();
        let result = thread::spawn(move || other.bind_thread()).join().unwrap();
        assert_eq!(result.unwrap_err().op, AccelOp::BindContext);
    }

    #[test]
    fn test_copy_and_synchronize() {
        let accel = EmulatedAccelerator::new(1);
        let memory: EmulatedDeviceMemory<f32> = accel.alloc(Shape::flat(8)).unwrap();
        assert_eq!(memory.location(), MemoryLocation::Device(1));

        let (mut tx, mut rx) = channel(memory);
        let mut block = tx.acquire_writable(4).unwrap();
        block.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        block.release();

        accel.bind_thread().unwrap();
        let mut stream = accel.create_stream().unwrap();
        let input = rx.acquire_readable(4).unwrap();
        let mut out = [0.0f32; 4];
        unsafe { accel.copy_dtoh_async(&mut stream, input.block_ref(), &mut out) }.unwrap();
        accel.synchronize(&mut stream).unwrap();
        input.release();

        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(accel.calls(AccelOp::CopyAsync), 1);
        assert_eq!(accel.calls(AccelOp::Synchronize), 1);
    }

    #[test]
    fn test_injected_fault_hits_exact_call() {
        let accel = EmulatedAccelerator::new(0).with_fault(AccelOp::Synchronize, 2);
        accel.bind_thread().unwrap();
        let mut stream = accel.create_stream().unwrap();

        assert!(accel.synchronize(&mut stream).is_ok());
        let err = accel.synchronize(&mut stream).unwrap_err();
        assert_eq!(err.op, AccelOp::Synchronize);
        assert!(accel.synchronize(&mut stream).is_ok());
        assert_eq!(accel.calls(AccelOp::Synchronize), 3);
    }

    #[test]
    fn test_register_host_records_region() {
        let accel = EmulatedAccelerator::new(0);
        accel.bind_thread().unwrap();
        let host: HostMemory<f64> = HostMemory::zeroed([1, 2, 8]);
        accel.register_host(host.region()).unwrap();
        assert_eq!(accel.pinned_regions(), vec![128]);
    }
}
