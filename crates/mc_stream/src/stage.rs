// crates/mc_stream/src/stage.rs

//! 传输阶段
//!
//! 将设备通道中的数据逐块拷贝到主机通道。
//!
//! # 运行流程
//!
//! 1. 绑定当前线程到加速器上下文
//! 2. 创建专用传输流
//! 3. 将主机缓冲区整体注册为锁页内存（仅一次，不撤销）
//! 4. 循环：获取设备可读块 → 获取主机可写块 → 异步拷贝 → 同步 → 双端释放
//!
//! 第 4 步中的加速器故障是致命的：立即返回错误且不释放当次迭代的块，
//! 两端游标停留在该次迭代之前的位置。

use std::sync::Arc;

use mc_runtime::{
    Accelerator, AccelResult, BlockPlan, ChanError, ChanReader, ChanWriter, HostAccessible,
    StopToken, TransferMetrics,
};
use tracing::{debug, error, info};

use crate::error::StageError;
use crate::options::StageOptions;

/// 阶段退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// 收到停止信号
    Stopped {
        /// 已完成的迭代数
        iterations: u64,
    },
}

impl StageExit {
    /// 已完成的迭代数
    pub fn iterations(&self) -> u64 {
        match self {
            Self::Stopped { iterations } => *iterations,
        }
    }
}

/// 设备到主机传输阶段
///
/// `H` 为主机端存储，设备端存储由加速器决定。
pub struct TransferStage<A, H>
where
    A: Accelerator,
    H: HostAccessible,
{
    accel: A,
    device: ChanReader<A::Memory<H::Elem>>,
    host: ChanWriter<H>,
    plan: BlockPlan,
    options: StageOptions,
    stop: StopToken,
    metrics: Arc<TransferMetrics>,
}

impl<A, H> TransferStage<A, H>
where
    A: Accelerator,
    H: HostAccessible,
{
    /// 创建传输阶段
    ///
    /// 两端通道元素总数必须一致；块长由主机缓冲区形状推导。
    pub fn new(
        accel: A,
        device: ChanReader<A::Memory<H::Elem>>,
        host: ChanWriter<H>,
        options: StageOptions,
    ) -> Result<Self, StageError> {
        let (device_len, host_len) = (device.capacity(), host.capacity());
        if device_len != host_len {
            error!(
                "transfer stage size mismatch: device {} vs host {}",
                device_len, host_len
            );
            return Err(StageError::SizeMismatch {
                device: device_len,
                host: host_len,
            });
        }

        let plan = options.block.plan(host.shape())?;
        debug!(
            "transfer plan: {} blocks of {} elements over {}",
            plan.block_count, plan.block_len, plan.shape
        );

        Ok(Self {
            accel,
            device,
            host,
            plan,
            options,
            stop: StopToken::new(),
            metrics: Arc::new(TransferMetrics::new()),
        })
    }

    /// 使用外部停止信号
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    /// 分块方案
    pub fn plan(&self) -> &BlockPlan {
        &self.plan
    }

    /// 块长（元素数）
    pub fn block_len(&self) -> usize {
        self.plan.block_len
    }

    /// 阶段选项
    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    /// 停止信号
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// 共享指标
    pub fn metrics(&self) -> Arc<TransferMetrics> {
        Arc::clone(&self.metrics)
    }

    /// 加速器
    pub fn accelerator(&self) -> &A {
        &self.accel
    }

    /// 在当前线程上运行，直到停止或出现致命故障
    pub fn run(mut self) -> Result<StageExit, StageError> {
        let accel = &self.accel;

        fatal(accel.bind_thread())?;
        let mut stream = fatal(accel.create_stream())?;
        fatal(accel.register_host(self.host.storage().region()))?;

        let block_len = self.plan.block_len;
        let poll = self.options.poll_interval;
        info!(
            accelerator = accel.name(),
            block_len,
            block_count = self.plan.block_count,
            "transfer stage started"
        );

        let mut iterations = 0u64;
        loop {
            if self.stop.is_stopped() {
                break;
            }

            let waiting = self.metrics.wait_timer.start();
            let input = match self.device.acquire_readable_cancellable(block_len, &self.stop, poll) {
                Ok(block) => block,
                Err(ChanError::Cancelled) => break,
                Err(e) => return Err(channel_fault(e)),
            };
            let mut output = match self.host.acquire_writable_cancellable(block_len, &self.stop, poll) {
                Ok(block) => block,
                Err(ChanError::Cancelled) => break,
                Err(e) => return Err(channel_fault(e)),
            };
            drop(waiting);

            {
                let _copy = self.metrics.copy_timer.start();
                // SAFETY: `output` 在同步返回后才释放或丢弃，拷贝期间不被访问
                fatal(unsafe {
                    accel.copy_dtoh_async(&mut stream, input.block_ref(), output.as_mut_slice())
                })?;
            }
            {
                let _sync = self.metrics.sync_timer.start();
                fatal(accel.synchronize(&mut stream))?;
            }

            input.release();
            output.release();

            self.metrics.record_block(block_len);
            iterations += 1;
            debug!(iteration = iterations, "block transferred");
        }

        info!(iterations, "transfer stage stopped");
        Ok(StageExit::Stopped { iterations })
    }
}

/// 记录并转换加速器故障
fn fatal<T>(result: AccelResult<T>) -> Result<T, StageError> {
    result.map_err(|e| {
        error!(op = %e.op, "transfer stage fault: {}", e.message);
        StageError::Accelerator(e)
    })
}

fn channel_fault(e: ChanError) -> StageError {
    error!("transfer stage channel error: {}", e);
    StageError::Channel(e)
}

impl<A, H> std::fmt::Debug for TransferStage<A, H>
where
    A: Accelerator,
    H: HostAccessible,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferStage")
            .field("accelerator", &self.accel.name())
            .field("plan", &self.plan)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_runtime::{channel, BlockPolicy, EmulatedAccelerator, HostMemory, Shape};

    #[test]
    fn test_new_computes_plan_from_host_shape() {
        let accel = EmulatedAccelerator::new(0);
        let device = accel.alloc::<f32>(Shape::flat(1024)).unwrap();
        let (_dtx, drx) = channel(device);
        let (htx, _hrx) = channel(HostMemory::<f32>::zeroed([1, 32, 32]));

        let stage = TransferStage::new(accel, drx, htx, StageOptions::default()).unwrap();
        assert_eq!(stage.block_len(), 256);
        assert_eq!(stage.plan().block_count, 4);
    }

    #[test]
    fn test_new_rejects_size_mismatch() {
        let accel = EmulatedAccelerator::new(0);
        let device = accel.alloc::<f32>(Shape::new(1, 32, 32)).unwrap();
        let (_dtx, drx) = channel(device);
        let (htx, _hrx) = channel(HostMemory::<f32>::zeroed([1, 16, 32]));

        let err = TransferStage::new(accel.clone(), drx, htx, StageOptions::default()).unwrap_err();
        assert!(matches!(err, StageError::SizeMismatch { device: 1024, host: 512 }));
        assert_eq!(accel.bound_thread(), None);
    }

    #[test]
    fn test_new_rejects_uneven_block_len() {
        let accel = EmulatedAccelerator::new(0);
        let device = accel.alloc::<f64>(Shape::new(1, 32, 32)).unwrap();
        let (_dtx, drx) = channel(device);
        let (htx, _hrx) = channel(HostMemory::<f64>::zeroed([1, 32, 32]));

        let options = StageOptions::default().with_block_policy(BlockPolicy::default().with_block_len(300));
        let err = TransferStage::new(accel, drx, htx, options).unwrap_err();
        assert!(matches!(err, StageError::Block(_)));
    }

    #[test]
    fn test_stop_before_run_exits_after_setup() {
        let accel = EmulatedAccelerator::new(0);
        let device = accel.alloc::<f32>(Shape::flat(64)).unwrap();
        let (_dtx, drx) = channel(device);
        let (htx, _hrx) = channel(HostMemory::<f32>::zeroed([1, 1, 64]));

        let stage = TransferStage::new(accel.clone(), drx, htx, StageOptions::default()).unwrap();
        stage.stop_token().stop();
        assert_eq!(stage.run().unwrap(), StageExit::Stopped { iterations: 0 });
        assert_eq!(accel.pinned_regions(), vec![256]);
    }
}
