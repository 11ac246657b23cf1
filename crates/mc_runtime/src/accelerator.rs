// crates/mc_runtime/src/accelerator.rs

//! Accelerator - 加速器抽象
//!
//! 统一设备内存分配、上下文绑定、传输流、主机锁页与异步拷贝接口。
//!
//! # 线程亲和
//!
//! 加速器上下文与线程绑定：`bind_thread` 之后，同一传输流上的全部操作
//! 必须在同一线程上发起。流类型通常不是 `Send`，无法离开创建它的线程。
//!
//! # 实现
//!
//! - [`EmulatedAccelerator`](crate::emulated::EmulatedAccelerator): 主机内存模拟，
//!   始终可用，支持故障注入
//! - `WgpuAccelerator`（`gpu` 特性）: 基于 wgpu 的 GPU 后端

use bytemuck::Pod;

use crate::channel::BlockRef;
use crate::error::AccelResult;
use crate::storage::{HostRegion, MemoryLocation, Shape, Storage};

/// 加速器 Trait
///
/// # 类型参数
///
/// - `Memory<T>`: 设备端缓冲区类型
/// - `Stream`: 异步传输流
pub trait Accelerator: Send + Sync + 'static {
    /// 设备缓冲区类型
    type Memory<T: Pod + Send + Sync>: Storage<Elem = T>;
    /// 传输流类型
    type Stream;

    /// 加速器名称
    fn name(&self) -> &'static str;

    /// 设备内存位置
    fn location(&self) -> MemoryLocation;

    /// 分配零初始化的设备缓冲区
    fn alloc<T: Pod + Send + Sync>(&self, shape: Shape) -> AccelResult<Self::Memory<T>>;

    /// 将当前线程绑定到加速器上下文
    fn bind_thread(&self) -> AccelResult<()>;

    /// 创建专用传输流
    fn create_stream(&self) -> AccelResult<Self::Stream>;

    /// 将主机内存区域注册为锁页内存
    ///
    /// 注册不会撤销，区域需在进程生命周期内有效。
    fn register_host(&self, region: HostRegion) -> AccelResult<()>;

    /// 在流上发起设备到主机的异步拷贝
    ///
    /// # Safety
    ///
    /// 调用返回后拷贝可能仍在进行：在同一流上 [`synchronize`](Self::synchronize)
    /// 返回之前，`dst` 指向的内存必须保持有效且不被读写，`src` 所在区域不得被改写。
    unsafe fn copy_dtoh_async<T: Pod + Send + Sync>(
        &self,
        stream: &mut Self::Stream,
        src: BlockRef<'_, Self::Memory<T>>,
        dst: &mut [T],
    ) -> AccelResult<()>;

    /// 阻塞直到流上已发起的操作全部完成
    fn synchronize(&self, stream: &mut Self::Stream) -> AccelResult<()>;
}
