//! 单值完成单元。
//!
//! ## 设计目标（Why）
//! - 托管侧消费者以非阻塞方式轮询一个“最终只有一个结果”的单元，原生侧生产者一次性写入结果；
//! - 同一单元也可以被原生 `async` 任务直接 `.await`，见 [`CellFuture`]。
//!
//! ## 契约说明（What）
//! - `poll` 在锁内检查：已有结果则直接返回且不保存唤醒句柄；否则保存句柄（后登记者覆盖先登记者）
//!   并返回 [`Poll::Pending`]；
//! - 写入在锁内完成并取走已保存的句柄，释放锁之后再调用 `wake()`，唤醒方可以立即重入本单元；
//! - 每个单元只允许写入一次，重复写入属于生产者的编程错误。

use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    error::{BridgeError, Result},
    sync::Mutex,
    task::{FutureFailure, PollResult, WakerHandle},
};

/// 单值完成单元，克隆得到的是指向同一单元的新引用。
///
/// # 并发（Concurrency）
/// - 每个单元独占一把互斥锁，临界区只包含状态读写；
/// - 任意多个线程可以并发 `poll`，唯一的生产者可以在任意线程写入。
pub struct CompletionCell<T> {
    inner: Arc<Mutex<CellSlot<T>>>,
}

struct CellSlot<T> {
    waker: Option<WakerHandle>,
    result: Option<PollResult<T>>,
}

impl<T> CompletionCell<T> {
    /// 创建空单元。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CellSlot {
                waker: None,
                result: None,
            })),
        }
    }

    /// 非阻塞轮询。
    ///
    /// - 已有结果：返回 `Poll::Ready`，`waker` 不会被保存；
    /// - 尚无结果：保存 `waker` 的克隆（替换先前保存的句柄）并返回 `Poll::Pending`。
    ///
    /// 调用方必须以最近一次 `poll` 的返回值为准：只有最后登记的句柄会被唤醒。
    pub fn poll(&self, waker: &WakerHandle) -> Poll<PollResult<T>> {
        let mut slot = self.inner.lock();
        if let Some(result) = &slot.result {
            return Poll::Ready(result.clone());
        }
        slot.waker = Some(waker.clone());
        Poll::Pending
    }

    /// 写入值并唤醒已登记的消费者。
    ///
    /// # Panics
    ///
    /// 单元已经写入过结果时 panic；这是生产者的编程错误。
    pub fn complete(&self, value: T) {
        self.write_or_panic(PollResult::ready(value));
    }

    /// 写入失败并唤醒已登记的消费者，失败会在消费者读取结果时抛出。
    ///
    /// # Panics
    ///
    /// 单元已经写入过结果时 panic。
    pub fn complete_with_failure<E>(&self, error: E)
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.write_or_panic(PollResult::failed(FutureFailure::new(error)));
    }

    /// [`complete`](Self::complete) 的非 panic 版本，重复写入返回 [`BridgeError::AlreadyCompleted`]
    /// 且不改变单元状态。
    pub fn try_complete(&self, value: T) -> Result<()> {
        self.write(PollResult::ready(value))
    }

    /// 以既有的 [`FutureFailure`] 写入失败，重复写入返回 [`BridgeError::AlreadyCompleted`]。
    pub fn try_complete_with_failure(&self, failure: FutureFailure) -> Result<()> {
        self.write(PollResult::failed(failure))
    }

    pub fn is_completed(&self) -> bool {
        self.inner.lock().result.is_some()
    }

    /// 判断两个引用是否指向同一单元。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn write(&self, result: PollResult<T>) -> Result<()> {
        let waker = {
            let mut slot = self.inner.lock();
            if slot.result.is_some() {
                return Err(BridgeError::AlreadyCompleted);
            }
            slot.result = Some(result);
            slot.waker.take()
        };

        tracing::trace!(delivered = waker.is_some(), "completion cell resolved");
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    fn write_or_panic(&self, result: PollResult<T>) {
        if let Err(err) = self.write(result) {
            panic!("completion cell written twice: {err}");
        }
    }
}

impl<T> Clone for CompletionCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CompletionCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.lock();
        f.debug_struct("CompletionCell")
            .field("completed", &slot.result.is_some())
            .field("waker_registered", &slot.waker.is_some())
            .finish()
    }
}

impl<T: Clone> IntoFuture for CompletionCell<T> {
    type Output = std::result::Result<T, FutureFailure>;
    type IntoFuture = CellFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        CellFuture::new(self)
    }
}

/// 让原生 `async` 任务等待一个 [`CompletionCell`]。
///
/// # 执行逻辑（How）
/// - 每次 `poll` 由 `Context` 中的 [`Waker`](std::task::Waker) 铸造 [`WakerHandle`] 交给单元；
///   若执行器仍是同一任务（`will_wake`），复用上一次铸造的句柄；
/// - 适配器被丢弃时释放其句柄，保证取消之后执行器不会再收到唤醒。
pub struct CellFuture<T> {
    cell: CompletionCell<T>,
    waker: Option<WakerHandle>,
}

impl<T> CellFuture<T> {
    pub fn new(cell: CompletionCell<T>) -> Self {
        Self { cell, waker: None }
    }

    /// 被等待的单元。
    pub fn cell(&self) -> &CompletionCell<T> {
        &self.cell
    }
}

impl<T: Clone> Future for CellFuture<T> {
    type Output = std::result::Result<T, FutureFailure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let handle = match this.waker.take() {
            Some(handle) if handle.will_wake(cx.waker()) => handle,
            _ => WakerHandle::new(cx.waker().clone()),
        };
        let polled = this.cell.poll(&handle);
        this.waker = Some(handle);
        polled.map(PollResult::into_result)
    }
}

impl<T> Drop for CellFuture<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.waker.take() {
            handle.dispose();
        }
    }
}

impl<T> fmt::Debug for CellFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellFuture")
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}
