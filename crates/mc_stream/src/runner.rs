// crates/mc_stream/src/runner.rs

//! 阶段运行器
//!
//! 在专用命名线程上运行传输阶段，并提供停止、观察与汇合控制。

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mc_runtime::{Accelerator, HostAccessible, StopToken, TransferMetrics, TransferSnapshot};

use crate::error::StageError;
use crate::stage::{StageExit, TransferStage};

/// 传输阶段句柄
///
/// 丢弃句柄不会停止阶段，工作线程将继续运行。
pub struct StageHandle {
    /// 工作线程名
    pub thread_name: String,
    stop: StopToken,
    metrics: Arc<TransferMetrics>,
    join: JoinHandle<Result<StageExit, StageError>>,
}

impl StageHandle {
    /// 在新线程上启动阶段
    ///
    /// 线程名取自阶段选项，阶段在该线程上运行到结束。
    /// 阶段以错误退出时会触发停止信号，唤醒共享该信号的等待方。
    pub fn spawn<A, H>(stage: TransferStage<A, H>) -> Result<Self, StageError>
    where
        A: Accelerator,
        H: HostAccessible,
    {
        let thread_name = stage.options().thread_name.clone();
        let stop = stage.stop_token();
        let metrics = stage.metrics();

        let token = stop.clone();
        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let result = stage.run();
                if result.is_err() {
                    token.stop();
                }
                result
            })?;
        tracing::debug!("spawned transfer thread '{}'", thread_name);

        Ok(Self {
            thread_name,
            stop,
            metrics,
            join,
        })
    }

    /// 请求停止
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// 是否已请求停止
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// 停止信号
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// 当前指标快照
    pub fn snapshot(&self) -> TransferSnapshot {
        self.metrics.snapshot()
    }

    /// 已完成的迭代数
    pub fn iterations(&self) -> u64 {
        self.metrics.iterations.get()
    }

    /// 工作线程是否已退出
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 等待迭代数达到 `n`，超时或线程提前退出时返回 `false`
    pub fn wait_iterations(&self, n: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.iterations() >= n {
                return true;
            }
            if self.is_finished() || Instant::now() >= deadline {
                return self.iterations() >= n;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// 等待工作线程退出，返回阶段结果
    pub fn join(self) -> Result<StageExit, StageError> {
        let result = self.join.join().map_err(|_| StageError::Panicked)?;
        match &result {
            Ok(exit) => tracing::info!(
                "transfer thread '{}' exited after {} iterations",
                self.thread_name,
                exit.iterations()
            ),
            Err(e) => tracing::error!("transfer thread '{}' failed: {}", self.thread_name, e),
        }
        result
    }

    /// 请求停止并等待退出
    pub fn shutdown(self) -> Result<StageExit, StageError> {
        self.stop();
        self.join()
    }
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("thread_name", &self.thread_name)
            .field("stopped", &self.is_stopped())
            .field("iterations", &self.iterations())
            .finish()
    }
}
