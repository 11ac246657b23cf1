// crates/mc_runtime/src/storage.rs

//! 缓冲区存储抽象
//!
//! 每个通道包装一块定长、连续、带驻留位置标记的元素存储。
//! 主机端实现为 [`HostMemory`]，设备端实现由各加速器提供。

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::fmt;
use std::ptr::NonNull;

/// 内存位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// 主机内存 (CPU)
    Host,
    /// 设备内存 (加速器序号)
    Device(usize),
}

impl MemoryLocation {
    /// 是否为设备内存
    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device(ordinal) => write!(f, "device:{}", ordinal),
        }
    }
}

/// 缓冲区三维形状 `[nz, ny, nx]`
///
/// `nx` 为最内层（连续）维度，一行即 `nx` 个连续元素。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(pub [usize; 3]);

impl Shape {
    /// 创建形状
    pub const fn new(nz: usize, ny: usize, nx: usize) -> Self {
        Self([nz, ny, nx])
    }

    /// 一维形状（单行）
    pub const fn flat(len: usize) -> Self {
        Self([1, 1, len])
    }

    /// 元素总数
    #[inline]
    pub fn len(&self) -> usize {
        self.0.iter().product()
    }

    /// 是否不含元素
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 行数 `nz * ny`
    #[inline]
    pub fn rows(&self) -> usize {
        self.0[0] * self.0[1]
    }

    /// 行长 `nx`
    #[inline]
    pub fn row_len(&self) -> usize {
        self.0[2]
    }

    /// 原始维度
    pub fn dims(&self) -> [usize; 3] {
        self.0
    }
}

impl From<[usize; 3]> for Shape {
    fn from(dims: [usize; 3]) -> Self {
        Self(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.0[0], self.0[1], self.0[2])
    }
}

/// 通道底层存储
///
/// 总长度在构造时固定，整个生命周期内不变。
pub trait Storage: Send + Sync + 'static {
    /// 元素类型
    type Elem: Pod + Send + Sync;

    /// 元素总数
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 自然形状
    fn shape(&self) -> Shape;

    /// 驻留位置
    fn location(&self) -> MemoryLocation;
}

/// 可由主机直接寻址的存储
///
/// # Safety
///
/// `base_ptr` 必须在存储的整个生命周期内指向 `len()` 个有效、对齐的元素，
/// 且允许通过共享引用进行内部可变访问。并发访问的互斥由通道握手保证。
pub unsafe trait HostAccessible: Storage {
    /// 首元素地址
    fn base_ptr(&self) -> *mut Self::Elem;

    /// 整个存储的主机内存区域
    fn region(&self) -> HostRegion {
        let ptr = NonNull::new(self.base_ptr() as *mut u8).unwrap_or(NonNull::dangling());
        HostRegion {
            ptr,
            bytes: self.len() * std::mem::size_of::<Self::Elem>(),
        }
    }
}

/// 主机内存区域（用于锁页注册）
#[derive(Debug, Clone, Copy)]
pub struct HostRegion {
    /// 区域首地址
    pub ptr: NonNull<u8>,
    /// 区域字节数
    pub bytes: usize,
}

// 区域只是地址描述，本身不访问内存
unsafe impl Send for HostRegion {}
unsafe impl Sync for HostRegion {}

/// 主机端缓冲区
///
/// 元素存放在 `UnsafeCell` 中；读写只经由通道块视图进行，
/// 同一区域在同一时刻只属于一个参与方。
pub struct HostMemory<T> {
    data: Box<[UnsafeCell<T>]>,
    shape: Shape,
}

// 区域所有权通过通道握手转移，不存在同一元素的并发读写
unsafe impl<T: Send> Send for HostMemory<T> {}
unsafe impl<T: Send + Sync> Sync for HostMemory<T> {}

impl<T: Pod> HostMemory<T> {
    /// 创建零初始化的缓冲区
    pub fn zeroed(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let data = (0..shape.len())
            .map(|_| UnsafeCell::new(T::zeroed()))
            .collect();
        Self { data, shape }
    }

    /// 用给定数据创建缓冲区
    ///
    /// 数据长度与形状不一致时返回 `None`。
    pub fn from_vec(shape: impl Into<Shape>, values: Vec<T>) -> Option<Self> {
        let shape = shape.into();
        if values.len() != shape.len() {
            return None;
        }
        let data = values.into_iter().map(UnsafeCell::new).collect();
        Some(Self { data, shape })
    }

    /// 字节大小
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}

impl<T: Pod + Send + Sync> Storage for HostMemory<T> {
    type Elem = T;

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    fn shape(&self) -> Shape {
        self.shape
    }

    fn location(&self) -> MemoryLocation {
        MemoryLocation::Host
    }
}

unsafe impl<T: Pod + Send + Sync> HostAccessible for HostMemory<T> {
    #[inline]
    fn base_ptr(&self) -> *mut T {
        // UnsafeCell<T> 与 T 内存布局相同
        UnsafeCell::raw_get(self.data.as_ptr())
    }
}

impl<T> fmt::Debug for HostMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMemory")
            .field("len", &self.data.len())
            .field("shape", &self.shape)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_rows() {
        let shape = Shape::new(2, 16, 32);
        assert_eq!(shape.len(), 1024);
        assert_eq!(shape.rows(), 32);
        assert_eq!(shape.row_len(), 32);
        assert_eq!(shape.to_string(), "2x16x32");
    }

    #[test]
    fn test_shape_flat() {
        let shape = Shape::flat(100);
        assert_eq!(shape.rows(), 1);
        assert_eq!(shape.row_len(), 100);
    }

    #[test]
    fn test_host_memory_zeroed() {
        let mem: HostMemory<f32> = HostMemory::zeroed([1, 4, 8]);
        assert_eq!(mem.len(), 32);
        assert_eq!(mem.location(), MemoryLocation::Host);
        assert_eq!(mem.size_bytes(), 128);
        assert_eq!(mem.region().bytes, 128);
    }

    #[test]
    fn test_host_memory_from_vec() {
        let mem = HostMemory::from_vec([1, 1, 3], vec![1.0f64, 2.0, 3.0]).unwrap();
        let first = unsafe { *mem.base_ptr() };
        assert_eq!(first, 1.0);
        assert!(HostMemory::from_vec([1, 1, 4], vec![1.0f64]).is_none());
    }

    #[test]
    fn test_memory_location_display() {
        assert_eq!(MemoryLocation::Host.to_string(), "host");
        assert_eq!(MemoryLocation::Device(1).to_string(), "device:1");
        assert!(MemoryLocation::Device(0).is_device());
    }
}
