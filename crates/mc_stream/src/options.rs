// crates/mc_stream/src/options.rs

//! 传输阶段选项

use std::time::Duration;

use mc_config::StageConfig;
use mc_runtime::BlockPolicy;

/// 传输阶段选项
#[derive(Debug, Clone, PartialEq)]
pub struct StageOptions {
    /// 分块策略
    pub block: BlockPolicy,
    /// 工作线程名
    pub thread_name: String,
    /// 等待通道时检查停止信号的间隔
    pub poll_interval: Duration,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            block: BlockPolicy::default(),
            thread_name: "mc-transfer".to_string(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl StageOptions {
    /// 设置分块策略
    pub fn with_block_policy(mut self, block: BlockPolicy) -> Self {
        self.block = block;
        self
    }

    /// 设置工作线程名
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// 设置停止检查间隔
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl From<&StageConfig> for StageOptions {
    fn from(config: &StageConfig) -> Self {
        Self {
            block: BlockPolicy {
                target_blocks: config.target_blocks,
                block_len: config.block_len,
            },
            thread_name: config.thread_name.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}
