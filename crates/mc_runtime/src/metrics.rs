// crates/mc_runtime/src/metrics.rs

//! 传输性能指标
//!
//! 提供线程安全的计数器与计时器，传输阶段在工作线程上记录，
//! 编排方在任意线程读取快照。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 原子计数器
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// 创建零值计数器
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// 增加计数
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// 增加指定值
    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// 增加计数并返回新值
    #[inline]
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 获取当前值
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// 计时器
// =============================================================================

/// 高精度计时器（累积时间）
///
/// 用于测量代码块执行时间，线程安全。
#[derive(Debug)]
pub struct Timer {
    total_ns: AtomicU64,
    count: AtomicU64,
}

impl Timer {
    /// 创建新计时器
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// 开始计时，返回守卫
    ///
    /// # 示例
    ///
    /// ```rust
    /// use mc_runtime::metrics::Timer;
    ///
    /// let timer = Timer::new();
    /// {
    ///     let _guard = timer.start();
    ///     // ... 被测量的代码 ...
    /// }
    /// assert_eq!(timer.count(), 1);
    /// ```
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            start: Instant::now(),
        }
    }

    fn record(&self, elapsed: Duration) {
        self.total_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取总时间（秒）
    pub fn total_sec(&self) -> f64 {
        self.total_ns.load(Ordering::Relaxed) as f64 / 1_000_000_000.0
    }

    /// 获取计时次数
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// 计时守卫
///
/// 当守卫被 drop 时，自动记录时间。
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.timer.record(elapsed);
    }
}


// =============================================================================
// 传输指标
// =============================================================================

/// 传输阶段指标收集器
#[derive(Debug, Default)]
pub struct TransferMetrics {
    /// 完成的迭代（块）数
    pub iterations: Counter,
    /// 已传输元素数
    pub elements: Counter,
    /// 等待通道的时间
    pub wait_timer: Timer,
    /// 发起拷贝的时间
    pub copy_timer: Timer,
    /// 流同步的时间
    pub sync_timer: Timer,
}

impl TransferMetrics {
    /// 创建新的收集器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个完成的块
    pub fn record_block(&self, len: usize) {
        self.iterations.inc();
        self.elements.add(len as u64);
    }

    /// 生成快照
    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            iterations: self.iterations.get(),
            elements: self.elements.get(),
            wait_time_sec: self.wait_timer.total_sec(),
            copy_time_sec: self.copy_timer.total_sec(),
            sync_time_sec: self.sync_timer.total_sec(),
        }
    }
}

/// 传输指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransferSnapshot {
    /// 完成的迭代数
    pub iterations: u64,
    /// 已传输元素数
    pub elements: u64,
    /// 等待通道时间（秒）
    pub wait_time_sec: f64,
    /// 发起拷贝时间（秒）
    pub copy_time_sec: f64,
    /// 流同步时间（秒）
    pub sync_time_sec: f64,
}

impl TransferSnapshot {
    /// 格式化为人类可读的摘要
    pub fn summary(&self) -> String {
        format!(
            "Blocks: {}, Elements: {}, Wait: {:.3}s, Copy: {:.3}s, Sync: {:.3}s",
            self.iterations,
            self.elements,
            self.wait_time_sec,
            self.copy_time_sec,
            self.sync_time_sec
        )
    }

    /// 传输耗时占比（拷贝 + 同步）/（含等待的总时间）
    pub fn busy_ratio(&self) -> f64 {
        let busy = self.copy_time_sec + self.sync_time_sec;
        let total = busy + self.wait_time_sec;
        if total > 0.0 {
            busy / total
        } else {
            0.0
        }
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        counter.add(3);
        assert_eq!(counter.get(), 5);
        assert_eq!(counter.next(), 6);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        {
            let _guard = timer.start();
            sleep(std::time::Duration::from_millis(10));
        }
        assert!(timer.total_sec() >= 0.01);
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn test_transfer_metrics_snapshot() {
        let metrics = TransferMetrics::new();
        metrics.record_block(256);
        metrics.record_block(256);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.iterations, 2);
        assert_eq!(snapshot.elements, 512);
        assert!(snapshot.summary().contains("Blocks: 2"));
    }

    #[test]
    fn test_busy_ratio() {
        let snapshot = TransferSnapshot {
            iterations: 10,
            elements: 100,
            wait_time_sec: 2.0,
            copy_time_sec: 1.0,
            sync_time_sec: 1.0,
        };
        assert_eq!(snapshot.busy_ratio(), 0.5);
        assert_eq!(TransferSnapshot::default().busy_ratio(), 0.0);
    }

    #[test]
    fn test_snapshot_json() {
        let metrics = TransferMetrics::new();
        metrics.record_block(64);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["iterations"], 1);
        assert_eq!(json["elements"], 64);
        assert!(json.get("sync_time_sec").is_some());
    }
}
