//! 托管侧入口：以句柄操作单元、流、唤醒句柄与可调用包装。
//!
//! ## 设计目标（Why）
//! - 托管侧只保存整数句柄；每一次调用都先在表中解析句柄，再在表锁之外操作实体；
//! - 注册表是显式构造的值，不依赖进程级全局状态，同一进程可以并存多个互不干扰的注册表。
//!
//! ## 契约说明（What）
//! - 释放类操作（`dispose_waker`、`release_*`、`close_runnable`）对过期句柄返回 `false`，属于良性无操作；
//! - `wake` 与 `run` 对过期句柄同样是无操作；
//! - 需要读取或写入实体的操作（`poll_*`、`complete_*`、`push_stream`、`finish_stream`）对过期句柄返回
//!   [`BridgeError::StaleHandle`](crate::error::BridgeError::StaleHandle)，由调用方决定如何处理；
//! - 生产者的编程错误（重复写入、结束后推送）以错误值返回，而不是 panic，因为托管侧无法捕获原生 panic；
//!   同理，`run` 执行的闭包若 panic，以 [`BridgeError::Panicked`](crate::error::BridgeError::Panicked) 返回。

use std::{
    fmt,
    sync::Arc,
    task::{Poll, Waker},
};

use crate::{
    config::{AffinityMode, BridgeConfig},
    error::Result,
    future::CompletionCell,
    handle::{Handle, HandleTable},
    ops::{FnOnceRunnable, FnRunnable},
    stream::QueueStream,
    task::{FutureFailure, PollResult, WakerHandle},
    thread::ThreadAffinity,
};

#[derive(Clone)]
enum Runnable {
    Once(Arc<FnOnceRunnable>),
    Repeat(Arc<FnRunnable>),
}

impl Runnable {
    fn run(&self) -> Result<bool> {
        match self {
            Runnable::Once(runnable) => runnable.run(),
            Runnable::Repeat(runnable) => runnable.run(),
        }
    }

    /// 闭包是否已被消费，已消费的一次性闭包不必再占用表项。
    fn is_spent(&self) -> bool {
        match self {
            Runnable::Once(runnable) => runnable.is_closed(),
            Runnable::Repeat(_) => false,
        }
    }

    fn close(&self) -> Result<bool> {
        match self {
            Runnable::Once(runnable) => runnable.close(),
            Runnable::Repeat(runnable) => runnable.close(),
        }
    }
}

/// 句柄注册表，`V` 为托管侧对象引用在原生侧的表示。
pub struct BridgeRegistry<V> {
    affinity: AffinityMode,
    futures: HandleTable<CompletionCell<V>>,
    streams: HandleTable<QueueStream<V>>,
    wakers: HandleTable<WakerHandle>,
    runnables: HandleTable<Runnable>,
}

impl<V> BridgeRegistry<V> {
    pub fn new(config: &BridgeConfig) -> Self {
        tracing::debug!(affinity = ?config.affinity, "bridge registry created");
        Self {
            affinity: config.affinity,
            futures: HandleTable::new("future"),
            streams: HandleTable::new("stream"),
            wakers: HandleTable::new("waker"),
            runnables: HandleTable::new("runnable"),
        }
    }

    // ---- 唤醒句柄 ----

    /// 为执行器提供的 [`Waker`] 分配托管侧句柄。
    pub fn register_waker(&self, waker: Waker) -> Handle {
        self.wakers.insert(WakerHandle::new(waker))
    }

    /// 唤醒句柄对应的续体；句柄过期或已释放时返回 `false`。
    pub fn wake(&self, waker: Handle) -> bool {
        self.wakers
            .get(waker)
            .is_some_and(|handle| handle.wake())
    }

    /// 释放唤醒句柄；与并发的 `wake` 竞争时不会产生悬垂访问。
    pub fn dispose_waker(&self, waker: Handle) -> bool {
        match self.wakers.remove(waker) {
            Some(handle) => handle.dispose(),
            None => false,
        }
    }

    // ---- 单值单元 ----

    /// 新建单元：句柄交给托管侧消费者，单元本身留给原生侧生产者。
    pub fn create_future(&self) -> (Handle, CompletionCell<V>) {
        let cell = CompletionCell::new();
        (self.futures.insert(cell.clone()), cell)
    }

    /// 以 `waker` 句柄轮询单元。
    pub fn poll_future(&self, future: Handle, waker: Handle) -> Result<Poll<PollResult<V>>> {
        let cell = self.futures.resolve(future)?;
        let waker = self.wakers.resolve(waker)?;
        Ok(cell.poll(&waker))
    }

    pub fn complete_future(&self, future: Handle, value: V) -> Result<()> {
        self.futures.resolve(future)?.try_complete(value)
    }

    pub fn fail_future(&self, future: Handle, failure: FutureFailure) -> Result<()> {
        self.futures.resolve(future)?.try_complete_with_failure(failure)
    }

    /// 托管侧放弃单元；原生侧持有的引用不受影响。
    pub fn release_future(&self, future: Handle) -> bool {
        self.futures.remove(future).is_some()
    }

    // ---- 多值流 ----

    pub fn create_stream(&self) -> (Handle, QueueStream<V>) {
        let stream = QueueStream::new();
        (self.streams.insert(stream.clone()), stream)
    }

    pub fn poll_stream(&self, stream: Handle, waker: Handle) -> Result<Poll<Option<V>>> {
        let stream = self.streams.resolve(stream)?;
        let waker = self.wakers.resolve(waker)?;
        Ok(stream.poll_next(&waker))
    }

    pub fn push_stream(&self, stream: Handle, item: V) -> Result<()> {
        self.streams.resolve(stream)?.try_push(item)
    }

    pub fn finish_stream(&self, stream: Handle) -> Result<()> {
        self.streams.resolve(stream)?.try_finish()
    }

    pub fn release_stream(&self, stream: Handle) -> bool {
        self.streams.remove(stream).is_some()
    }

    // ---- 可调用包装 ----

    /// 登记至多执行一次的闭包，线程亲和取自配置。
    pub fn register_fn_once<F>(&self, f: F) -> Handle
    where
        F: FnOnce() + Send + 'static,
    {
        let affinity = ThreadAffinity::from_mode(self.affinity);
        self.runnables
            .insert(Runnable::Once(Arc::new(FnOnceRunnable::new(f, affinity))))
    }

    /// 登记可反复执行的闭包，线程亲和取自配置。
    pub fn register_fn<F>(&self, f: F) -> Handle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let affinity = ThreadAffinity::from_mode(self.affinity);
        self.runnables
            .insert(Runnable::Repeat(Arc::new(FnRunnable::new(f, affinity))))
    }

    /// 执行闭包；句柄过期时为无操作并返回 `Ok(false)`。
    ///
    /// - 闭包 panic 时返回 [`BridgeError::Panicked`](crate::error::BridgeError::Panicked)，展开不会越过本调用；
    /// - 一次性闭包执行（或 panic）之后其表项随即移除，托管侧无需再调用 `close_runnable`。
    pub fn run(&self, runnable: Handle) -> Result<bool> {
        let Some(entry) = self.runnables.get(runnable) else {
            return Ok(false);
        };
        let outcome = entry.run();
        if entry.is_spent() {
            self.runnables.remove(runnable);
        }
        outcome
    }

    /// 关闭并移除闭包。亲和检查失败时闭包保留在表中，调用方可以在所属线程上重试。
    pub fn close_runnable(&self, runnable: Handle) -> Result<bool> {
        let Some(entry) = self.runnables.get(runnable) else {
            return Ok(false);
        };
        entry.close()?;
        Ok(self.runnables.remove(runnable).is_some())
    }

    /// 当前仍被托管侧持有的句柄数量：(单元, 流, 唤醒句柄, 可调用包装)。
    ///
    /// 已执行的一次性闭包不计入；可反复执行的闭包直到 `close_runnable` 才移除。
    pub fn live_handles(&self) -> (usize, usize, usize, usize) {
        (
            self.futures.len(),
            self.streams.len(),
            self.wakers.len(),
            self.runnables.len(),
        )
    }
}

impl<V> Default for BridgeRegistry<V> {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl<V> fmt::Debug for BridgeRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("affinity", &self.affinity)
            .field("futures", &self.futures)
            .field("streams", &self.streams)
            .field("wakers", &self.wakers)
            .field("runnables", &self.runnables)
            .finish()
    }
}
