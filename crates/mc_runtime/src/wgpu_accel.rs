// crates/mc_runtime/src/wgpu_accel.rs

//! wgpu 加速器后端
//!
//! 基于 wgpu 的跨平台实现（Vulkan/Metal/DX12）。
//!
//! - 设备内存为 `STORAGE | COPY_SRC | COPY_DST` 缓冲区
//! - 传输流持有一个可映射的暂存缓冲区：拷贝先提交到暂存区，
//!   同步时映射暂存区并写入目标主机内存
//! - wgpu 没有锁页接口，`register_host` 只记录区域

use std::marker::PhantomData;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use bytemuck::Pod;
use log::{debug, info};
use parking_lot::Mutex;
use wgpu::{
    Adapter, Buffer, BufferDescriptor, BufferUsages, Device, DeviceDescriptor, Features,
    Instance, InstanceDescriptor, Limits, PowerPreference, Queue, RequestAdapterOptions,
    COPY_BUFFER_ALIGNMENT,
};

use crate::accelerator::Accelerator;
use crate::channel::BlockRef;
use crate::error::{AccelError, AccelOp, AccelResult};
use crate::storage::{HostRegion, MemoryLocation, Shape, Storage};

/// wgpu 设备缓冲区
pub struct WgpuDeviceMemory<T> {
    buffer: Buffer,
    shape: Shape,
    ordinal: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> WgpuDeviceMemory<T> {
    /// 底层 wgpu 缓冲区（供计算内核绑定）
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// 元素偏移对应的字节偏移
    fn byte_offset(offset: usize) -> u64 {
        (offset * std::mem::size_of::<T>()) as u64
    }
}

impl<T: Pod + Send + Sync> Storage for WgpuDeviceMemory<T> {
    type Elem = T;

    fn len(&self) -> usize {
        self.shape.len()
    }

    fn shape(&self) -> Shape {
        self.shape
    }

    fn location(&self) -> MemoryLocation {
        MemoryLocation::Device(self.ordinal)
    }
}

/// 已提交、尚未同步的拷贝
struct PendingCopy {
    bytes: u64,
    dst: *mut u8,
}

/// wgpu 传输流
///
/// 持有裸指针，不能跨线程移动。
pub struct WgpuStream {
    owner: ThreadId,
    staging: Option<Buffer>,
    pending: Option<PendingCopy>,
}

impl WgpuStream {
    /// 确保暂存缓冲区至少 `bytes` 字节
    fn staging(&mut self, device: &Device, bytes: u64) -> &Buffer {
        if self.staging.as_ref().is_some_and(|b| b.size() < bytes) {
            self.staging = None;
        }
        self.staging.get_or_insert_with(|| {
            device.create_buffer(&BufferDescriptor {
                label: Some("mc_staging_buffer"),
                size: bytes,
                usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
    }

    fn check_owner(&self, op: AccelOp) -> AccelResult<()> {
        if self.owner != thread::current().id() {
            return Err(AccelError::new(op, "stream used off its owner thread"));
        }
        Ok(())
    }
}

/// wgpu 加速器
pub struct WgpuAccelerator {
    ordinal: usize,
    adapter: Arc<Adapter>,
    device: Arc<Device>,
    queue: Arc<Queue>,
    bound_thread: Mutex<Option<ThreadId>>,
    pinned: Mutex<Vec<usize>>,
}

impl WgpuAccelerator {
    /// 异步创建加速器（首选高性能适配器，序号 0）
    ///
    /// 返回 `Ok(None)` 表示没有可用的 GPU
    pub async fn new_async() -> AccelResult<Option<Self>> {
        Self::with_ordinal_async(0).await
    }

    /// 异步创建指定序号的加速器
    ///
    /// 序号 0 为首选高性能适配器，其余序号按枚举顺序选取。
    /// 返回 `Ok(None)` 表示该序号没有适配器。
    pub async fn with_ordinal_async(ordinal: usize) -> AccelResult<Option<Self>> {
        let instance = Instance::new(InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = if ordinal == 0 {
            instance
                .request_adapter(&RequestAdapterOptions {
                    power_preference: PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
        } else {
            instance
                .enumerate_adapters(wgpu::Backends::all())
                .into_iter()
                .nth(ordinal)
        };
        let Some(adapter) = adapter else {
            return Ok(None);
        };

        let adapter_info = adapter.get_info();
        info!(
            "Found GPU adapter: {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("MagCube GPU Device"),
                    required_features: Features::empty(),
                    required_limits: Limits {
                        max_buffer_size: adapter.limits().max_buffer_size,
                        ..Limits::downlevel_defaults()
                    },
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| AccelError::new(AccelOp::BindContext, e.to_string()))?;

        Ok(Some(Self {
            ordinal,
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
            bound_thread: Mutex::new(None),
            pinned: Mutex::new(Vec::new()),
        }))
    }

    /// 同步创建加速器（阻塞调用）
    pub fn new() -> AccelResult<Option<Self>> {
        pollster::block_on(Self::new_async())
    }

    /// 同步创建指定序号的加速器（阻塞调用）
    pub fn with_ordinal(ordinal: usize) -> AccelResult<Option<Self>> {
        pollster::block_on(Self::with_ordinal_async(ordinal))
    }

    /// 设备序号
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// 适配器名称
    pub fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }

    /// 获取 wgpu 设备引用
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// 获取 wgpu 队列引用
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// 已记录的主机区域字节数
    pub fn pinned_regions(&self) -> Vec<usize> {
        self.pinned.lock().clone()
    }

    /// 将主机数据写入设备缓冲区（从元素 `offset` 开始）
    pub fn upload<T: Pod + Send + Sync>(
        &self,
        memory: &WgpuDeviceMemory<T>,
        offset: usize,
        data: &[T],
    ) -> AccelResult<()> {
        if offset + data.len() > memory.len() {
            return Err(AccelError::new(AccelOp::Alloc, "upload exceeds buffer length"));
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let start = WgpuDeviceMemory::<T>::byte_offset(offset);
        check_aligned(AccelOp::Alloc, start, bytes.len() as u64)?;
        self.queue.write_buffer(&memory.buffer, start, bytes);
        Ok(())
    }

    fn check_context(&self, op: AccelOp) -> AccelResult<()> {
        match *self.bound_thread.lock() {
            Some(owner) if owner == thread::current().id() => Ok(()),
            _ => Err(AccelError::new(op, "no context bound to the calling thread")),
        }
    }
}

/// wgpu 缓冲区拷贝要求偏移与长度按 4 字节对齐
fn check_aligned(op: AccelOp, offset: u64, bytes: u64) -> AccelResult<()> {
    if offset % COPY_BUFFER_ALIGNMENT != 0 || bytes % COPY_BUFFER_ALIGNMENT != 0 {
        return Err(AccelError::new(
            op,
            format!(
                "range [{}, +{}) is not {}-byte aligned",
                offset, bytes, COPY_BUFFER_ALIGNMENT
            ),
        ));
    }
    Ok(())
}

impl Accelerator for WgpuAccelerator {
    type Memory<T: Pod + Send + Sync> = WgpuDeviceMemory<T>;
    type Stream = WgpuStream;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn location(&self) -> MemoryLocation {
        MemoryLocation::Device(self.ordinal)
    }

    fn alloc<T: Pod + Send + Sync>(&self, shape: Shape) -> AccelResult<WgpuDeviceMemory<T>> {
        let bytes = (shape.len() * std::mem::size_of::<T>()) as u64;
        let size = bytes.div_ceil(COPY_BUFFER_ALIGNMENT) * COPY_BUFFER_ALIGNMENT;
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(AccelError::new(
                AccelOp::Alloc,
                format!("{} bytes exceeds device limit {}", size, max),
            ));
        }
        // wgpu 保证新缓冲区零初始化
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("mc_device_buffer"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(WgpuDeviceMemory {
            buffer,
            shape,
            ordinal: self.ordinal,
            _marker: PhantomData,
        })
    }

    fn bind_thread(&self) -> AccelResult<()> {
        let current = thread::current().id();
        let mut bound = self.bound_thread.lock();
        match *bound {
            Some(owner) if owner != current => Err(AccelError::new(
                AccelOp::BindContext,
                "context already bound to another thread",
            )),
            _ => {
                *bound = Some(current);
                Ok(())
            }
        }
    }

    fn create_stream(&self) -> AccelResult<WgpuStream> {
        self.check_context(AccelOp::CreateStream)?;
        Ok(WgpuStream {
            owner: thread::current().id(),
            staging: None,
            pending: None,
        })
    }

    fn register_host(&self, region: HostRegion) -> AccelResult<()> {
        self.check_context(AccelOp::RegisterHost)?;
        debug!("wgpu has no page-lock api, recording {} bytes", region.bytes);
        self.pinned.lock().push(region.bytes);
        Ok(())
    }

    unsafe fn copy_dtoh_async<T: Pod + Send + Sync>(
        &self,
        stream: &mut WgpuStream,
        src: BlockRef<'_, WgpuDeviceMemory<T>>,
        dst: &mut [T],
    ) -> AccelResult<()> {
        stream.check_owner(AccelOp::CopyAsync)?;
        if stream.pending.is_some() {
            return Err(AccelError::new(
                AccelOp::CopyAsync,
                "previous copy not synchronized",
            ));
        }
        if src.len != dst.len() {
            return Err(AccelError::new(
                AccelOp::CopyAsync,
                format!("length mismatch: src {} vs dst {}", src.len, dst.len()),
            ));
        }
        if src.offset + src.len > src.storage.len() {
            return Err(AccelError::new(AccelOp::CopyAsync, "source block out of bounds"));
        }

        let start = WgpuDeviceMemory::<T>::byte_offset(src.offset);
        let bytes = (src.len * std::mem::size_of::<T>()) as u64;
        check_aligned(AccelOp::CopyAsync, start, bytes)?;

        let staging = stream.staging(&self.device, bytes);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mc_copy_dtoh"),
        });
        encoder.copy_buffer_to_buffer(&src.storage.buffer, start, staging, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        stream.pending = Some(PendingCopy {
            bytes,
            dst: dst.as_mut_ptr() as *mut u8,
        });
        Ok(())
    }

    fn synchronize(&self, stream: &mut WgpuStream) -> AccelResult<()> {
        stream.check_owner(AccelOp::Synchronize)?;
        let Some(pending) = stream.pending.take() else {
            self.device.poll(wgpu::Maintain::Wait);
            return Ok(());
        };
        let Some(staging) = stream.staging.as_ref() else {
            return Err(AccelError::new(AccelOp::Synchronize, "staging buffer missing"));
        };

        let slice = staging.slice(..pending.bytes);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| AccelError::new(AccelOp::Synchronize, e.to_string()))?
            .map_err(|e| AccelError::new(AccelOp::Synchronize, e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            // SAFETY: copy_dtoh_async 的调用方保证 dst 在同步返回前有效且未被访问
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), pending.dst, data.len());
            }
        }
        staging.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use crate::storage::{HostAccessible, HostMemory};

    #[test]
    fn test_alignment_check() {
        assert!(check_aligned(AccelOp::CopyAsync, 0, 1024).is_ok());
        assert!(check_aligned(AccelOp::CopyAsync, 2, 1024).is_err());
        assert!(check_aligned(AccelOp::CopyAsync, 0, 6).is_err());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn test_backend_creation() {
        let result = WgpuAccelerator::new();
        assert!(result.is_ok());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn test_memory_tagged_with_ordinal() {
        for ordinal in 0..2 {
            let Ok(Some(accel)) = WgpuAccelerator::with_ordinal(ordinal) else {
                continue;
            };
            assert_eq!(accel.ordinal(), ordinal);
            assert_eq!(accel.location(), MemoryLocation::Device(ordinal));
            let memory: WgpuDeviceMemory<f32> = accel.alloc(Shape::flat(16)).unwrap();
            assert_eq!(memory.location(), MemoryLocation::Device(ordinal));
        }
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn test_copy_block_to_host() {
        let Ok(Some(accel)) = WgpuAccelerator::new() else {
            return;
        };
        let memory: WgpuDeviceMemory<f32> = accel.alloc(Shape::flat(8)).unwrap();
        let values: Vec<f32> = (0..8).map(|i| i as f32).collect();
        accel.upload(&memory, 0, &values).unwrap();

        let (mut tx, mut rx) = channel(memory);
        tx.acquire_writable(8).unwrap().release();

        accel.bind_thread().unwrap();
        let mut stream = accel.create_stream().unwrap();
        let host: HostMemory<f32> = HostMemory::zeroed([1, 1, 4]);
        accel.register_host(host.region()).unwrap();

        let block = rx.acquire_readable(4).unwrap();
        let mut out = [0.0f32; 4];
        unsafe { accel.copy_dtoh_async(&mut stream, block.block_ref(), &mut out) }.unwrap();
        accel.synchronize(&mut stream).unwrap();
        block.release();

        assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(accel.pinned_regions(), vec![16]);
    }
}
