// crates/mc_runtime/src/stop.rs

//! 停止信号
//!
//! 在传输阶段每轮迭代开始时以及通道等待期间检查。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 可克隆的停止标志
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// 创建未触发的停止标志
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 是否已请求停止
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_shared_between_clones() {
        let token = StopToken::new();
        let other = token.clone();
        assert!(!other.is_stopped());
        token.stop();
        assert!(other.is_stopped());
    }
}
