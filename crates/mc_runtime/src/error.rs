// crates/mc_runtime/src/error.rs

//! 运行时错误类型
//!
//! 定义 Runtime 层的错误类型：通道握手错误、分块配置错误、加速器故障。

use std::fmt;
use thiserror::Error;

/// 通道错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChanError {
    /// 请求零长度块
    #[error("块长度不能为 0")]
    EmptyBlock,

    /// 请求长度超过通道容量（编程错误）
    #[error("请求 {requested} 个元素超出通道容量 {capacity}")]
    ExceedsCapacity {
        /// 请求的元素数
        requested: usize,
        /// 通道容量
        capacity: usize,
    },

    /// 块跨越环形缓冲区末尾
    #[error("块 [{offset}, {offset}+{len}) 跨越容量为 {capacity} 的缓冲区末尾")]
    Straddles {
        /// 块起始偏移
        offset: usize,
        /// 块长度
        len: usize,
        /// 通道容量
        capacity: usize,
    },

    /// 等待期间收到停止信号
    #[error("等待被停止信号中断")]
    Cancelled,
}

/// 分块错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// 缓冲区为空
    #[error("缓冲区形状 {shape:?} 不含任何元素")]
    EmptyShape {
        /// 缓冲区形状
        shape: [usize; 3],
    },

    /// 目标块数为 0
    #[error("目标块数必须大于 0")]
    ZeroTarget,

    /// 显式块长无法整除总长度
    #[error("块长 {block_len} 无法整除总长度 {total}")]
    Uneven {
        /// 配置的块长
        block_len: usize,
        /// 缓冲区总元素数
        total: usize,
    },
}

/// 加速器操作类型
///
/// 用于故障定位：每个加速器错误都携带失败的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelOp {
    /// 分配设备内存
    Alloc,
    /// 绑定线程到加速器上下文
    BindContext,
    /// 创建传输流
    CreateStream,
    /// 注册（锁页）主机内存
    RegisterHost,
    /// 异步设备到主机拷贝
    CopyAsync,
    /// 流同步
    Synchronize,
}

impl AccelOp {
    /// 操作种类数
    pub const COUNT: usize = 6;

    /// 全部操作
    pub const ALL: [AccelOp; Self::COUNT] = [
        Self::Alloc,
        Self::BindContext,
        Self::CreateStream,
        Self::RegisterHost,
        Self::CopyAsync,
        Self::Synchronize,
    ];

    /// 操作名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Alloc => "alloc",
            Self::BindContext => "bind_context",
            Self::CreateStream => "create_stream",
            Self::RegisterHost => "register_host",
            Self::CopyAsync => "copy_dtoh_async",
            Self::Synchronize => "synchronize",
        }
    }

    /// 按名称查找
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// 在 [`AccelOp::ALL`] 中的下标
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for AccelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 加速器故障
///
/// 驱动层失败不可恢复，由调用方决定终止。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("加速器操作 {op} 失败: {message}")]
pub struct AccelError {
    /// 失败的操作
    pub op: AccelOp,
    /// 驱动返回的描述
    pub message: String,
}

impl AccelError {
    /// 创建加速器错误
    pub fn new(op: AccelOp, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// 加速器结果类型
pub type AccelResult<T> = Result<T, AccelError>;
