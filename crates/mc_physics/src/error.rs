// crates/mc_physics/src/error.rs

//! 物理层错误类型

use thiserror::Error;

/// 物理层错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// 区域编号越界
    #[error("区域 {region} 越界，共 {count} 个区域")]
    RegionOutOfRange {
        /// 请求的区域下标
        region: usize,
        /// 区域总数
        count: usize,
    },

    /// 未知输出量
    #[error("未知输出量: {0}")]
    UnknownQuantity(String),

    /// 未知命令
    #[error("未知命令: {0}")]
    UnknownCommand(String),

    /// 参数个数不符
    #[error("命令 {command} 需要 {expected} 个参数，实际 {got} 个")]
    Arity {
        /// 命令名
        command: &'static str,
        /// 期望参数个数
        expected: usize,
        /// 实际参数个数
        got: usize,
    },

    /// 命令文本无法解析
    #[error("无法解析命令 '{0}'")]
    Syntax(String),

    /// 块长与通道容量不匹配
    #[error("块长 {block_len} 无法整除通道容量 {capacity}")]
    BlockLength {
        /// 块长
        block_len: usize,
        /// 通道容量
        capacity: usize,
    },
}
