// crates/mc_physics/src/producer.rs

//! 块生产者
//!
//! 以采样函数逐块填充设备通道，作为传输管线的上游。
//! 采样函数接收元素的全局序号（跨轮次递增），返回元素值。

use std::f64::consts::PI;
use std::time::Duration;

use log::trace;
use mc_runtime::{ChanError, ChanWriter, HostAccessible, StopToken};

use crate::error::PhysicsError;
use crate::oscillator::region_of;

/// 块生产者
pub struct BlockProducer<S: HostAccessible> {
    tx: ChanWriter<S>,
    block_len: usize,
    blocks: u64,
}

impl<S: HostAccessible> BlockProducer<S> {
    /// 创建生产者，块长必须整除通道容量
    pub fn new(tx: ChanWriter<S>, block_len: usize) -> Result<Self, PhysicsError> {
        let capacity = tx.capacity();
        if block_len == 0 || capacity % block_len != 0 {
            return Err(PhysicsError::BlockLength { block_len, capacity });
        }
        Ok(Self {
            tx,
            block_len,
            blocks: 0,
        })
    }

    /// 块长
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// 每轮完整填充的块数
    pub fn blocks_per_pass(&self) -> usize {
        self.tx.capacity() / self.block_len
    }

    /// 已提交的块数
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// 写入一个块
    pub fn produce<F>(&mut self, sample: F) -> Result<(), ChanError>
    where
        F: FnMut(usize) -> S::Elem,
    {
        let block = self.tx.acquire_writable(self.block_len)?;
        Self::fill(block, self.blocks, self.block_len, sample);
        self.blocks += 1;
        Ok(())
    }

    /// 写入一个块，停止信号触发时返回 [`ChanError::Cancelled`]
    pub fn produce_cancellable<F>(
        &mut self,
        stop: &StopToken,
        poll: Duration,
        sample: F,
    ) -> Result<(), ChanError>
    where
        F: FnMut(usize) -> S::Elem,
    {
        let block = self.tx.acquire_writable_cancellable(self.block_len, stop, poll)?;
        Self::fill(block, self.blocks, self.block_len, sample);
        self.blocks += 1;
        Ok(())
    }

    /// 写满一轮（整个缓冲区）
    pub fn produce_pass<F>(&mut self, mut sample: F) -> Result<(), ChanError>
    where
        F: FnMut(usize) -> S::Elem,
    {
        for _ in 0..self.blocks_per_pass() {
            self.produce(&mut sample)?;
        }
        Ok(())
    }

    /// 取回写端
    pub fn into_inner(self) -> ChanWriter<S> {
        self.tx
    }

    fn fill<F>(mut block: mc_runtime::WriteBlock<'_, S>, index: u64, block_len: usize, mut sample: F)
    where
        F: FnMut(usize) -> S::Elem,
    {
        let base = index as usize * block_len;
        for (j, v) in block.as_mut_slice().iter_mut().enumerate() {
            *v = sample(base + j);
        }
        trace!("produced block #{} at offset {}", index, block.offset());
        block.release();
    }
}

/// 演示用磁化 x 分量
///
/// 缓冲区按 [`region_of`] 划分为四个区域，各区域以 `frequency` 进动，
/// 相位依次相差 π/2。`t` 为模拟时间 [s]。
pub fn precession_mx(index: usize, total: usize, t: f64, frequency: f64) -> f64 {
    let region = region_of(index, total);
    (2.0 * PI * frequency * t + region as f64 * PI / 2.0).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_runtime::{channel, HostMemory};

    #[test]
    fn test_produce_fills_in_order() {
        let (tx, mut rx) = channel(HostMemory::<f64>::zeroed([1, 4, 4]));
        let mut producer = BlockProducer::new(tx, 4).unwrap();
        assert_eq!(producer.blocks_per_pass(), 4);

        producer.produce(|i| i as f64).unwrap();
        producer.produce(|i| i as f64).unwrap();
        assert_eq!(producer.blocks(), 2);

        let block = rx.acquire_readable(8).unwrap();
        assert_eq!(block.as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        block.release();
    }

    #[test]
    fn test_produce_pass() {
        let (tx, mut rx) = channel(HostMemory::<f32>::zeroed([1, 2, 8]));
        let mut producer = BlockProducer::new(tx, 8).unwrap();
        producer.produce_pass(|_| 1.5).unwrap();
        assert_eq!(rx.cursors().written, 16);
        let block = rx.acquire_readable(16).unwrap();
        assert!(block.as_slice().iter().all(|&v| v == 1.5));
        block.release();
    }

    #[test]
    fn test_rejects_uneven_block_len() {
        let (tx, _rx) = channel(HostMemory::<f32>::zeroed([1, 1, 10]));
        assert!(matches!(
            BlockProducer::new(tx, 3),
            Err(PhysicsError::BlockLength { block_len: 3, capacity: 10 })
        ));
    }

    #[test]
    fn test_cancellable_when_full() {
        let (tx, _rx) = channel(HostMemory::<f32>::zeroed([1, 1, 4]));
        let mut producer = BlockProducer::new(tx, 4).unwrap();
        producer.produce(|_| 0.0).unwrap();

        let stop = StopToken::new();
        stop.stop();
        let result = producer.produce_cancellable(&stop, Duration::from_millis(1), |_| 0.0);
        assert_eq!(result, Err(ChanError::Cancelled));
        assert_eq!(producer.blocks(), 1);
    }

    #[test]
    fn test_precession_phase_per_region() {
        assert!((precession_mx(0, 1024, 0.0, 5e9) - 1.0).abs() < 1e-10);
        assert!(precession_mx(300, 1024, 0.0, 5e9).abs() < 1e-12);
        assert!((precession_mx(600, 1024, 0.0, 5e9) - (-1.0)).abs() < 1e-10);
        // 半个周期后反号
        assert!((precession_mx(0, 1024, 1e-10, 5e9) - (-1.0)).abs() < 1e-12);
    }
}
