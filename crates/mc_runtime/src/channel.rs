// crates/mc_runtime/src/channel.rs

//! 块通道
//!
//! 在定长环形缓冲区上提供单生产者/单消费者的读写握手。
//!
//! # 协议
//!
//! ```text
//! 写端: acquire_writable(n) ─> 写入 ─> release()   (写游标 += n, 唤醒读端)
//! 读端: acquire_readable(n) ─> 读取 ─> release()   (读游标 += n, 唤醒写端)
//! ```
//!
//! - 游标为单调递增的元素计数，缓冲区偏移为 `cursor % capacity`
//! - 读游标永远不超过写游标，写游标领先读游标不超过容量
//! - 每侧同一时刻至多一个未释放块：获取操作以 `&mut self` 借用端点，
//!   块守卫持有该借用直到 `release()` 消费它
//! - 未调用 `release()` 而被丢弃的块视为放弃：游标不动，下次获取返回同一区域
//!
//! 通道不对数据做任何变换，只保证可见性顺序。元素数据本身不加锁，
//! 区域所有权随握手转移。

use log::{debug, trace};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ChanError;
use crate::stop::StopToken;
use crate::storage::{HostAccessible, MemoryLocation, Shape, Storage};

/// 游标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursors {
    /// 已提交（写端释放）的元素总数
    pub written: u64,
    /// 已消费（读端释放）的元素总数
    pub read: u64,
    /// 读端未释放块的长度
    pub reading: Option<usize>,
    /// 写端未释放块的长度
    pub writing: Option<usize>,
}

impl Cursors {
    /// 读端可见但尚未消费的元素数
    #[inline]
    pub fn pending(&self) -> u64 {
        self.written - self.read
    }
}

struct Shared<S> {
    storage: S,
    state: Mutex<Cursors>,
    /// 写端释放时通知
    readable: Condvar,
    /// 读端释放时通知
    writable: Condvar,
}

impl<S: Storage> Shared<S> {
    #[inline]
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// 校验块长并返回游标对应的缓冲区偏移
    fn block_offset(&self, cursor: u64, n: usize) -> Result<usize, ChanError> {
        let capacity = self.capacity();
        if n == 0 {
            return Err(ChanError::EmptyBlock);
        }
        if n > capacity {
            return Err(ChanError::ExceedsCapacity {
                requested: n,
                capacity,
            });
        }
        let offset = (cursor % capacity as u64) as usize;
        if offset + n > capacity {
            return Err(ChanError::Straddles {
                offset,
                len: n,
                capacity,
            });
        }
        Ok(offset)
    }

    /// 在条件变量上等待，直到 `ready` 成立
    ///
    /// 给定停止标志时按轮询间隔醒来检查；否则无条件等待。
    fn wait_until<F>(
        &self,
        cond: &Condvar,
        stop: Option<(&StopToken, Duration)>,
        ready: F,
    ) -> Result<MutexGuard<'_, Cursors>, ChanError>
    where
        F: Fn(&Cursors) -> bool,
    {
        let mut state = self.state.lock();
        loop {
            if ready(&state) {
                return Ok(state);
            }
            match stop {
                None => cond.wait(&mut state),
                Some((token, poll)) => {
                    if token.is_stopped() {
                        return Err(ChanError::Cancelled);
                    }
                    let _ = cond.wait_for(&mut state, poll);
                }
            }
        }
    }
}

/// 创建块通道，返回 (写端, 读端)
pub fn channel<S: Storage>(storage: S) -> (ChanWriter<S>, ChanReader<S>) {
    debug!(
        "create channel: {} elements ({}) on {}",
        storage.len(),
        storage.shape(),
        storage.location()
    );
    let shared = Arc::new(Shared {
        storage,
        state: Mutex::new(Cursors::default()),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        ChanWriter {
            shared: Arc::clone(&shared),
        },
        ChanReader { shared },
    )
}

macro_rules! endpoint_info {
    ($ty:ident) => {
        impl<S: Storage> $ty<S> {
            /// 通道容量（元素数）
            pub fn capacity(&self) -> usize {
                self.shared.capacity()
            }

            /// 缓冲区形状
            pub fn shape(&self) -> Shape {
                self.shared.storage.shape()
            }

            /// 缓冲区驻留位置
            pub fn location(&self) -> MemoryLocation {
                self.shared.storage.location()
            }

            /// 底层存储
            pub fn storage(&self) -> &S {
                &self.shared.storage
            }

            /// 当前游标快照
            pub fn cursors(&self) -> Cursors {
                *self.shared.state.lock()
            }

            /// 创建只读观察者
            pub fn probe(&self) -> ChanProbe<S> {
                ChanProbe {
                    shared: Arc::clone(&self.shared),
                }
            }
        }
    };
}

/// 通道读端（唯一）
pub struct ChanReader<S> {
    shared: Arc<Shared<S>>,
}

endpoint_info!(ChanReader);

impl<S: Storage> ChanReader<S> {
    /// 阻塞直到至少 `n` 个未读元素可见，返回只读块
    ///
    /// 块释放后才能再次获取：
    ///
    /// ```
    /// use mc_runtime::{channel, HostMemory};
    ///
    /// let (mut tx, mut rx) = channel(HostMemory::<f32>::zeroed([1, 1, 8]));
    /// tx.acquire_writable(8).unwrap().release();
    ///
    /// let first = rx.acquire_readable(4).unwrap();
    /// first.release();
    /// let second = rx.acquire_readable(4).unwrap();
    /// assert_eq!(second.offset(), 4);
    /// second.release();
    /// ```
    ///
    /// 持有未释放的块时再次获取无法通过编译：
    ///
    /// ```compile_fail
    /// use mc_runtime::{channel, HostMemory};
    ///
    /// let (mut tx, mut rx) = channel(HostMemory::<f32>::zeroed([1, 1, 8]));
    /// tx.acquire_writable(8).unwrap().release();
    ///
    /// let first = rx.acquire_readable(4).unwrap();
    /// let second = rx.acquire_readable(4).unwrap();
    /// first.release();
    /// second.release();
    /// ```
    pub fn acquire_readable(&mut self, n: usize) -> Result<ReadBlock<'_, S>, ChanError> {
        self.acquire(n, None)
    }

    /// 同 [`acquire_readable`](Self::acquire_readable)，停止标志触发时返回
    /// [`ChanError::Cancelled`]
    pub fn acquire_readable_cancellable(
        &mut self,
        n: usize,
        stop: &StopToken,
        poll: Duration,
    ) -> Result<ReadBlock<'_, S>, ChanError> {
        self.acquire(n, Some((stop, poll)))
    }

    fn acquire(
        &mut self,
        n: usize,
        stop: Option<(&StopToken, Duration)>,
    ) -> Result<ReadBlock<'_, S>, ChanError> {
        let shared = &*self.shared;
        let offset = {
            let state = shared.state.lock();
            shared.block_offset(state.read, n)?
        };

        let need = n as u64;
        let mut state = shared.wait_until(&shared.readable, stop, |c| c.pending() >= need)?;
        state.reading = Some(n);
        trace!("acquire readable [{}, {}) cursor={}", offset, offset + n, state.read);
        drop(state);

        Ok(ReadBlock {
            shared,
            offset,
            len: n,
            released: false,
        })
    }
}

/// 通道写端（唯一）
pub struct ChanWriter<S> {
    shared: Arc<Shared<S>>,
}

endpoint_info!(ChanWriter);

impl<S: Storage> ChanWriter<S> {
    /// 阻塞直到写游标前方有 `n` 个空闲元素，返回可写块
    ///
    /// 块释放后才能再次获取：
    ///
    /// ```
    /// use mc_runtime::{channel, HostMemory};
    ///
    /// let (mut tx, _rx) = channel(HostMemory::<f32>::zeroed([1, 1, 8]));
    /// let first = tx.acquire_writable(4).unwrap();
    /// first.release();
    /// let second = tx.acquire_writable(4).unwrap();
    /// assert_eq!(second.offset(), 4);
    /// second.release();
    /// ```
    ///
    /// 持有未释放的块时再次获取无法通过编译：
    ///
    /// ```compile_fail
    /// use mc_runtime::{channel, HostMemory};
    ///
    /// let (mut tx, _rx) = channel(HostMemory::<f32>::zeroed([1, 1, 8]));
    /// let first = tx.acquire_writable(4).unwrap();
    /// let second = tx.acquire_writable(4).unwrap();
    /// first.release();
    /// second.release();
    /// ```
    pub fn acquire_writable(&mut self, n: usize) -> Result<WriteBlock<'_, S>, ChanError> {
        self.acquire(n, None)
    }

    /// 同 [`acquire_writable`](Self::acquire_writable)，停止标志触发时返回
    /// [`ChanError::Cancelled`]
    pub fn acquire_writable_cancellable(
        &mut self,
        n: usize,
        stop: &StopToken,
        poll: Duration,
    ) -> Result<WriteBlock<'_, S>, ChanError> {
        self.acquire(n, Some((stop, poll)))
    }

    fn acquire(
        &mut self,
        n: usize,
        stop: Option<(&StopToken, Duration)>,
    ) -> Result<WriteBlock<'_, S>, ChanError> {
        let shared = &*self.shared;
        let offset = {
            let state = shared.state.lock();
            shared.block_offset(state.written, n)?
        };

        let capacity = shared.capacity() as u64;
        let need = n as u64;
        let mut state =
            shared.wait_until(&shared.writable, stop, |c| c.pending() + need <= capacity)?;
        state.writing = Some(n);
        trace!("acquire writable [{}, {}) cursor={}", offset, offset + n, state.written);
        drop(state);

        Ok(WriteBlock {
            shared,
            offset,
            len: n,
            released: false,
        })
    }
}

/// 通道观察者
///
/// 不参与握手，仅用于监控与测试。
pub struct ChanProbe<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for ChanProbe<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Storage> ChanProbe<S> {
    /// 通道容量
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// 当前游标快照
    pub fn cursors(&self) -> Cursors {
        *self.shared.state.lock()
    }

    /// 读端可见元素数（含读端未释放块）
    pub fn readable(&self) -> usize {
        self.cursors().pending() as usize
    }

    /// 写端空闲元素数（不含写端未释放块）
    pub fn writable(&self) -> usize {
        let cursors = self.cursors();
        self.capacity() - cursors.pending() as usize - cursors.writing.unwrap_or(0)
    }
}

/// 对通道缓冲区内某一块的借用描述
///
/// 交给加速器发起拷贝，不提供元素访问。
pub struct BlockRef<'a, S> {
    /// 块所在存储
    pub storage: &'a S,
    /// 起始偏移（元素）
    pub offset: usize,
    /// 长度（元素）
    pub len: usize,
}

impl<S> Clone for BlockRef<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for BlockRef<'_, S> {}

impl<S> fmt::Debug for BlockRef<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRef")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// 已获取的只读块
pub struct ReadBlock<'a, S: Storage> {
    shared: &'a Shared<S>,
    offset: usize,
    len: usize,
    released: bool,
}

impl<'a, S: Storage> ReadBlock<'a, S> {
    /// 起始偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 块长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空块（恒为 false）
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 块引用
    pub fn block_ref(&self) -> BlockRef<'_, S> {
        BlockRef {
            storage: &self.shared.storage,
            offset: self.offset,
            len: self.len,
        }
    }

    /// 标记已消费：推进读游标并唤醒写端
    pub fn release(mut self) {
        let mut state = self.shared.state.lock();
        state.read += self.len as u64;
        state.reading = None;
        trace!("release read -> cursor={}", state.read);
        drop(state);
        self.released = true;
        self.shared.writable.notify_one();
    }
}

impl<'a, S: HostAccessible> ReadBlock<'a, S> {
    /// 主机可见的元素切片
    pub fn as_slice(&self) -> &[S::Elem] {
        // SAFETY: 区域在块释放前由本块独占，且位于缓冲区内
        unsafe {
            std::slice::from_raw_parts(self.shared.storage.base_ptr().add(self.offset), self.len)
        }
    }
}

impl<S: Storage> Drop for ReadBlock<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            self.shared.state.lock().reading = None;
            debug!("read block [{}, +{}) abandoned", self.offset, self.len);
        }
    }
}

/// 已获取的可写块
pub struct WriteBlock<'a, S: Storage> {
    shared: &'a Shared<S>,
    offset: usize,
    len: usize,
    released: bool,
}

impl<'a, S: Storage> WriteBlock<'a, S> {
    /// 起始偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 块长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空块（恒为 false）
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 块引用
    pub fn block_ref(&self) -> BlockRef<'_, S> {
        BlockRef {
            storage: &self.shared.storage,
            offset: self.offset,
            len: self.len,
        }
    }

    /// 提交：推进写游标并唤醒读端
    pub fn release(mut self) {
        let mut state = self.shared.state.lock();
        state.written += self.len as u64;
        state.writing = None;
        trace!("release write -> cursor={}", state.written);
        drop(state);
        self.released = true;
        self.shared.readable.notify_one();
    }
}

impl<'a, S: HostAccessible> WriteBlock<'a, S> {
    /// 主机可见的元素切片
    pub fn as_slice(&self) -> &[S::Elem] {
        // SAFETY: 同 as_mut_slice
        unsafe {
            std::slice::from_raw_parts(self.shared.storage.base_ptr().add(self.offset), self.len)
        }
    }

    /// 可写元素切片
    pub fn as_mut_slice(&mut self) -> &mut [S::Elem] {
        // SAFETY: 区域在块释放前由本块独占，且位于缓冲区内
        unsafe {
            std::slice::from_raw_parts_mut(
                self.shared.storage.base_ptr().add(self.offset),
                self.len,
            )
        }
    }
}

impl<S: Storage> Drop for WriteBlock<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            self.shared.state.lock().writing = None;
            debug!("write block [{}, +{}) abandoned", self.offset, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HostMemory;
    use std::sync::mpsc;
    use std::thread;

    fn host_channel(len: usize) -> (ChanWriter<HostMemory<f32>>, ChanReader<HostMemory<f32>>) {
        channel(HostMemory::zeroed([1, 1, len]))
    }

    #[test]
    fn test_write_then_read() {
        let (mut tx, mut rx) = host_channel(8);

        let mut block = tx.acquire_writable(4).unwrap();
        block.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        block.release();

        let block = rx.acquire_readable(4).unwrap();
        assert_eq!(block.offset(), 0);
        assert_eq!(block.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        block.release();

        let cursors = rx.cursors();
        assert_eq!(cursors.written, 4);
        assert_eq!(cursors.read, 4);
    }

    #[test]
    fn test_offsets_wrap_around() {
        let (mut tx, mut rx) = host_channel(4);
        for round in 0..3u64 {
            let block = tx.acquire_writable(2).unwrap();
            assert_eq!(block.offset(), ((round * 2) % 4) as usize);
            block.release();
            rx.acquire_readable(2).unwrap().release();
        }
        assert_eq!(rx.cursors().read, 6);
    }

    #[test]
    fn test_invalid_lengths() {
        let (mut tx, mut rx) = host_channel(8);
        assert!(matches!(tx.acquire_writable(0), Err(ChanError::EmptyBlock)));
        assert!(matches!(
            rx.acquire_readable(9),
            Err(ChanError::ExceedsCapacity { requested: 9, capacity: 8 })
        ));

        tx.acquire_writable(3).unwrap().release();
        assert!(matches!(
            tx.acquire_writable(6),
            Err(ChanError::Straddles { offset: 3, len: 6, capacity: 8 })
        ));
    }

    #[test]
    fn test_abandoned_block_keeps_cursor() {
        let (mut tx, mut rx) = host_channel(4);
        tx.acquire_writable(4).unwrap().release();

        {
            let block = rx.acquire_readable(4).unwrap();
            assert_eq!(rx_probe_reading(&block), 4);
        }
        let cursors = rx.cursors();
        assert_eq!(cursors.read, 0);
        assert_eq!(cursors.reading, None);

        let again = rx.acquire_readable(4).unwrap();
        assert_eq!(again.offset(), 0);
    }

    fn rx_probe_reading<S: Storage>(block: &ReadBlock<'_, S>) -> usize {
        block.shared.state.lock().reading.unwrap_or(0)
    }

    #[test]
    fn test_reader_blocks_until_write_release() {
        let (mut tx, mut rx) = host_channel(4);
        let (done_tx, done_rx) = mpsc::channel();

        let reader = thread::spawn(move || {
            let block = rx.acquire_readable(2).unwrap();
            let values = block.as_slice().to_vec();
            block.release();
            done_tx.send(values).unwrap();
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

        let mut block = tx.acquire_writable(2).unwrap();
        block.as_mut_slice().copy_from_slice(&[7.0, 8.0]);
        block.release();

        let values = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(values, vec![7.0, 8.0]);
        reader.join().unwrap();
    }

    #[test]
    fn test_writer_blocks_when_full() {
        let (mut tx, mut rx) = host_channel(4);
        tx.acquire_writable(4).unwrap().release();
        let probe = tx.probe();
        assert_eq!(probe.writable(), 0);

        let (done_tx, done_rx) = mpsc::channel();
        let writer = thread::spawn(move || {
            let block = tx.acquire_writable(2).unwrap();
            let offset = block.offset();
            block.release();
            done_tx.send(offset).unwrap();
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        rx.acquire_readable(2).unwrap().release();

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        writer.join().unwrap();
        assert_eq!(probe.cursors().written, 6);
    }

    #[test]
    fn test_cancellable_wait_returns_on_stop() {
        let (_tx, mut rx) = host_channel(4);
        let stop = StopToken::new();
        let remote = stop.clone();

        let waiter = thread::spawn(move || {
            rx.acquire_readable_cancellable(2, &stop, Duration::from_millis(5))
                .map(|_| ())
        });

        thread::sleep(Duration::from_millis(20));
        remote.stop();
        assert_eq!(waiter.join().unwrap(), Err(ChanError::Cancelled));
    }

    #[test]
    fn test_outstanding_blocks_visible_in_cursors() {
        let (mut tx, mut rx) = host_channel(8);
        let tx_probe = tx.probe();
        let rx_probe = rx.probe();

        let block = tx.acquire_writable(4).unwrap();
        assert_eq!(tx_probe.cursors().writing, Some(4));
        assert_eq!(tx_probe.writable(), 4);
        block.release();
        assert_eq!(tx_probe.cursors().writing, None);
        assert_eq!(tx_probe.writable(), 4);
        assert_eq!(rx_probe.readable(), 4);

        let block = rx.acquire_readable(4).unwrap();
        assert_eq!(rx_probe.cursors().reading, Some(4));
        assert_eq!(rx_probe.writable(), 4);
        block.release();
        assert_eq!(rx_probe.cursors().reading, None);
        assert_eq!(rx_probe.writable(), 8);
    }

    #[test]
    fn test_endpoint_info() {
        let (tx, rx) = channel(HostMemory::<f64>::zeroed([2, 4, 8]));
        assert_eq!(tx.capacity(), 64);
        assert_eq!(rx.shape(), Shape::new(2, 4, 8));
        assert_eq!(rx.location(), MemoryLocation::Host);
    }
}
