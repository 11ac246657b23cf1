// crates/mc_stream/src/error.rs

//! 传输阶段错误类型

use mc_runtime::{AccelError, AccelOp, BlockError, ChanError};
use thiserror::Error;

/// 传输阶段错误
#[derive(Debug, Error)]
pub enum StageError {
    /// 设备通道与主机通道大小不一致
    #[error("通道大小不一致: 设备 {device} 个元素, 主机 {host} 个元素")]
    SizeMismatch {
        /// 设备通道元素数
        device: usize,
        /// 主机通道元素数
        host: usize,
    },

    /// 分块配置错误
    #[error("分块配置错误: {0}")]
    Block(#[from] BlockError),

    /// 通道协议错误
    #[error("通道错误: {0}")]
    Channel(#[from] ChanError),

    /// 加速器故障（致命，不重试）
    #[error(transparent)]
    Accelerator(#[from] AccelError),

    /// 无法启动工作线程
    #[error("无法启动传输线程: {0}")]
    Spawn(#[from] std::io::Error),

    /// 工作线程 panic
    #[error("传输线程异常退出")]
    Panicked,
}

impl StageError {
    /// 失败的加速器操作（仅加速器故障）
    pub fn accel_op(&self) -> Option<AccelOp> {
        match self {
            Self::Accelerator(e) => Some(e.op),
            _ => None,
        }
    }

    /// 是否为构造期的配置错误
    pub fn is_config(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::Block(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accel_op_extraction() {
        let err: StageError = AccelError::new(AccelOp::Synchronize, "device lost").into();
        assert_eq!(err.accel_op(), Some(AccelOp::Synchronize));
        assert!(!err.is_config());
        assert!(err.to_string().contains("synchronize"));
    }

    #[test]
    fn test_config_errors() {
        let err = StageError::SizeMismatch { device: 1024, host: 512 };
        assert!(err.is_config());
        assert!(err.to_string().contains("512"));

        let err: StageError = BlockError::ZeroTarget.into();
        assert!(err.is_config());
        assert_eq!(err.accel_op(), None);
    }
}
