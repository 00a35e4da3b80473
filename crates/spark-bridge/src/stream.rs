//! 基于队列的多值流。
//!
//! ## 设计目标（Why）
//! - 生产者按顺序推送元素并最终标记结束，消费者以非阻塞 `poll_next` 逐个取出；
//! - 结束标记与 Pending、与元素三者互不混淆：`Poll::Ready(None)` 表示流已结束。
//!
//! ## 契约说明（What）
//! - 元素严格按推送顺序（FIFO）交付，不重排、不丢失；
//! - 结束之后继续推送或再次结束属于生产者的编程错误；
//! - 队列为空且已结束时，后续每次 `poll_next` 都稳定返回结束标记；
//! - 推送与结束在锁内取走已登记的唤醒句柄，于锁外唤醒；每次登记至多产生一次唤醒。

use std::{
    collections::VecDeque,
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::stream::{FusedStream, Stream};

use crate::{
    error::{BridgeError, Result},
    sync::Mutex,
    task::WakerHandle,
};

/// 多值队列流，克隆得到的是指向同一队列的新引用。
pub struct QueueStream<T> {
    inner: Arc<Mutex<StreamSlot<T>>>,
}

struct StreamSlot<T> {
    waker: Option<WakerHandle>,
    queue: VecDeque<T>,
    finished: bool,
}

impl<T> StreamSlot<T> {
    fn poll_next(&mut self, waker: &WakerHandle) -> Poll<Option<T>> {
        if let Some(item) = self.queue.pop_front() {
            return Poll::Ready(Some(item));
        }
        if self.finished {
            return Poll::Ready(None);
        }
        self.waker = Some(waker.clone());
        Poll::Pending
    }
}

impl<T> QueueStream<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamSlot {
                waker: None,
                queue: VecDeque::new(),
                finished: false,
            })),
        }
    }

    /// 非阻塞地取出下一个元素。
    ///
    /// - 队列非空：`Poll::Ready(Some(item))`，交付最早推送的元素；
    /// - 队列为空且已结束：`Poll::Ready(None)`，此后保持不变；
    /// - 否则保存 `waker` 的克隆（后登记者覆盖先登记者）并返回 `Poll::Pending`。
    pub fn poll_next(&self, waker: &WakerHandle) -> Poll<Option<T>> {
        self.inner.lock().poll_next(waker)
    }

    /// 向队尾推送元素并唤醒已登记的消费者。
    ///
    /// # Panics
    ///
    /// 流已结束时 panic；这是生产者的编程错误，元素不会被静默丢弃。
    pub fn push(&self, item: T) {
        if let Err(err) = self.try_push(item) {
            panic!("push on a finished queue stream: {err}");
        }
    }

    /// 标记结束并唤醒已登记的消费者。
    ///
    /// # Panics
    ///
    /// 流已结束时 panic。
    pub fn finish(&self) {
        if let Err(err) = self.try_finish() {
            panic!("queue stream finished twice: {err}");
        }
    }

    /// [`push`](Self::push) 的非 panic 版本，流已结束时返回 [`BridgeError::StreamFinished`]。
    pub fn try_push(&self, item: T) -> Result<()> {
        let (waker, queued) = {
            let mut slot = self.inner.lock();
            if slot.finished {
                return Err(BridgeError::StreamFinished);
            }
            slot.queue.push_back(item);
            (slot.waker.take(), slot.queue.len())
        };

        tracing::trace!(queued, delivered = waker.is_some(), "queue stream item pushed");
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// [`finish`](Self::finish) 的非 panic 版本，重复结束返回 [`BridgeError::StreamFinished`]。
    pub fn try_finish(&self) -> Result<()> {
        let waker = {
            let mut slot = self.inner.lock();
            if slot.finished {
                return Err(BridgeError::StreamFinished);
            }
            slot.finished = true;
            slot.waker.take()
        };

        tracing::trace!(delivered = waker.is_some(), "queue stream finished");
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    /// 尚未被取走的元素数量。
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// 判断两个引用是否指向同一队列。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let slot = self.inner.lock();
        let len = slot.queue.len();
        if slot.finished {
            (len, Some(len))
        } else {
            (len, None)
        }
    }

    fn is_terminated(&self) -> bool {
        let slot = self.inner.lock();
        slot.finished && slot.queue.is_empty()
    }
}

impl<T> Clone for QueueStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for QueueStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for QueueStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.lock();
        f.debug_struct("QueueStream")
            .field("queued", &slot.queue.len())
            .field("finished", &slot.finished)
            .field("waker_registered", &slot.waker.is_some())
            .finish()
    }
}

/// 让原生 `async` 任务以 [`futures::Stream`] 的方式消费 [`QueueStream`]。
///
/// 与 [`CellFuture`](crate::future::CellFuture) 相同：复用同一任务的唤醒句柄，丢弃时释放句柄。
pub struct QueueStreamAdapter<T> {
    stream: QueueStream<T>,
    waker: Option<WakerHandle>,
}

impl<T> QueueStreamAdapter<T> {
    pub fn new(stream: QueueStream<T>) -> Self {
        Self {
            stream,
            waker: None,
        }
    }

    pub fn stream(&self) -> &QueueStream<T> {
        &self.stream
    }
}

impl<T> From<QueueStream<T>> for QueueStreamAdapter<T> {
    fn from(stream: QueueStream<T>) -> Self {
        Self::new(stream)
    }
}

impl<T> Stream for QueueStreamAdapter<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let handle = match this.waker.take() {
            Some(handle) if handle.will_wake(cx.waker()) => handle,
            _ => WakerHandle::new(cx.waker().clone()),
        };
        let polled = this.stream.poll_next(&handle);
        this.waker = Some(handle);
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}

impl<T> FusedStream for QueueStreamAdapter<T> {
    fn is_terminated(&self) -> bool {
        self.stream.is_terminated()
    }
}

impl<T> Drop for QueueStreamAdapter<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.waker.take() {
            handle.dispose();
        }
    }
}

impl<T> fmt::Debug for QueueStreamAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueStreamAdapter")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, executor::block_on};

    use super::*;
    use crate::test_utils::counting_waker;

    #[test]
    fn items_are_delivered_in_push_order_then_end_is_stable() {
        let stream: QueueStream<char> = QueueStream::new();
        let (data, waker) = counting_waker();
        let handle = WakerHandle::new(waker);

        stream.push('a');
        stream.push('b');
        stream.push('c');

        assert_eq!(stream.poll_next(&handle), Poll::Ready(Some('a')));
        assert_eq!(stream.poll_next(&handle), Poll::Ready(Some('b')));
        assert_eq!(stream.poll_next(&handle), Poll::Ready(Some('c')));
        assert_eq!(stream.poll_next(&handle), Poll::Pending);

        stream.finish();
        assert_eq!(data.count(), 1, "结束唤醒最后登记的句柄");
        for _ in 0..3 {
            assert_eq!(stream.poll_next(&handle), Poll::Ready(None));
        }
    }

    #[test]
    fn push_wakes_registered_consumer_once() {
        let stream = QueueStream::new();
        let (data, waker) = counting_waker();
        let handle = WakerHandle::new(waker);

        assert!(stream.poll_next(&handle).is_pending());
        stream.push(1_u32);
        assert_eq!(data.count(), 1);

        // 句柄已被取走，未重新登记前的推送不会重复唤醒。
        stream.push(2);
        assert_eq!(data.count(), 1);
        assert_eq!(stream.len(), 2);

        assert_eq!(stream.poll_next(&handle), Poll::Ready(Some(1)));
        assert_eq!(stream.poll_next(&handle), Poll::Ready(Some(2)));
        assert!(stream.poll_next(&handle).is_pending());
        stream.push(3);
        assert_eq!(data.count(), 2);
    }

    #[test]
    fn queued_items_drain_before_end_marker() {
        let stream = QueueStream::new();
        stream.push("x");
        stream.finish();
        assert!(stream.is_finished());

        let handle = WakerHandle::from_fn(|| {});
        assert_eq!(stream.poll_next(&handle), Poll::Ready(Some("x")));
        assert_eq!(stream.poll_next(&handle), Poll::Ready(None));
    }

    #[test]
    #[should_panic(expected = "push on a finished queue stream")]
    fn push_after_finish_panics() {
        let stream = QueueStream::new();
        stream.finish();
        stream.push(1_u8);
    }

    #[test]
    #[should_panic(expected = "queue stream finished twice")]
    fn double_finish_panics() {
        let stream: QueueStream<u8> = QueueStream::new();
        stream.finish();
        stream.finish();
    }

    #[test]
    fn try_variants_reject_writes_after_finish() {
        let stream = QueueStream::new();
        stream.try_push(1_u8).expect("结束前可以推送");
        stream.try_finish().expect("首次结束成功");
        assert!(matches!(stream.try_push(2), Err(BridgeError::StreamFinished)));
        assert!(matches!(stream.try_finish(), Err(BridgeError::StreamFinished)));
        assert_eq!(stream.len(), 1, "被拒绝的元素不得入队");
    }

    #[test]
    fn adapter_yields_items_then_terminates() {
        let stream = QueueStream::new();
        let producer = stream.clone();
        let mut adapter = QueueStreamAdapter::new(stream);

        block_on(async {
            futures::join!(
                async {
                    producer.push(10_i64);
                    producer.push(20);
                    producer.finish();
                },
                async {
                    assert_eq!(adapter.next().await, Some(10));
                    assert_eq!(adapter.next().await, Some(20));
                    assert_eq!(adapter.next().await, None);
                }
            );
        });
        assert!(adapter.is_terminated());
        assert_eq!(adapter.size_hint(), (0, Some(0)));
    }
}
