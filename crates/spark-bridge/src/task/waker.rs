use std::{
    fmt,
    sync::Arc,
    task::{Wake, Waker},
};

use crate::sync::Mutex;

/// 指向执行器续体的不透明唤醒句柄。
///
/// # 设计背景（Why）
/// - 托管侧只需要“能把某个挂起任务叫醒”的能力，不关心续体的具体形态，因此句柄只暴露
///   [`wake`](Self::wake) 与 [`dispose`](Self::dispose)；
/// - 句柄可以被多个单元、多个线程同时持有，克隆只增加一次引用计数。
///
/// # 契约说明（What）
/// - `wake()` 可在任意线程、任意次数调用；释放之后的调用是无操作并返回 `false`；
/// - `dispose()` 幂等，首次释放返回 `true`；
/// - 释放与并发的 `wake()` 之间不存在悬垂访问：`wake()` 在锁内克隆底层 [`Waker`] 后于锁外调用，
///   `dispose()` 在同一把锁内取走 [`Waker`]。竞争中的唤醒要么持有自己的克隆完成投递，要么观察到
///   已释放状态；释放方从不等待用户代码。
/// - 最后一个克隆被丢弃时底层 [`Waker`] 随之析构，无需依赖终结器。
#[derive(Clone)]
pub struct WakerHandle {
    inner: Arc<WakerSlot>,
}

struct WakerSlot {
    target: Mutex<Option<Waker>>,
}

/// 以闭包充当唤醒目标，供没有现成 [`Waker`] 的托管侧续体使用。
struct FnWake<F>(F);

impl<F> Wake for FnWake<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn wake(self: Arc<Self>) {
        (self.0)();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        (self.0)();
    }
}

impl WakerHandle {
    /// 由执行器提供的 [`Waker`] 铸造句柄。
    pub fn new(waker: Waker) -> Self {
        Self {
            inner: Arc::new(WakerSlot {
                target: Mutex::new(Some(waker)),
            }),
        }
    }

    /// 以闭包作为唤醒目标铸造句柄。
    pub fn from_fn<F>(wake: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(Waker::from(Arc::new(FnWake(wake))))
    }

    /// 通知续体重新轮询。
    ///
    /// 返回 `true` 表示通知已投递；句柄已释放时返回 `false`。
    pub fn wake(&self) -> bool {
        let target = self.inner.target.lock().clone();
        match target {
            Some(waker) => {
                waker.wake();
                true
            }
            None => {
                tracing::trace!("wake on disposed waker handle ignored");
                false
            }
        }
    }

    /// 释放句柄绑定的唤醒目标。
    ///
    /// # 并发（Concurrency）
    /// - 释放不会等待正在进行的 `wake()`：若某次 `wake()` 已在锁内克隆了底层 [`Waker`]，
    ///   它仍可能在本方法返回 `true` 之后调用目标一次；
    /// - 该克隆持有目标的引用计数，调用结束后才析构，因此不存在悬垂访问；
    /// - 本方法返回之后才开始的 `wake()` 一律观察到已释放状态并返回 `false`。
    pub fn dispose(&self) -> bool {
        let released = self.inner.target.lock().take();
        // 在锁外析构，避免 Waker 的 drop 逻辑重入本句柄。
        let disposed = released.is_some();
        drop(released);
        if disposed {
            tracing::trace!("waker handle disposed");
        }
        disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.target.lock().is_none()
    }

    /// 判断本句柄是否会唤醒与 `waker` 相同的任务，供适配器复用已铸造的句柄。
    pub fn will_wake(&self, waker: &Waker) -> bool {
        self.inner
            .target
            .lock()
            .as_ref()
            .is_some_and(|target| target.will_wake(waker))
    }

    /// 判断两个句柄是否为同一句柄的克隆。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WakerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakerHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl From<Waker> for WakerHandle {
    fn from(waker: Waker) -> Self {
        Self::new(waker)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::test_utils::counting_waker;

    #[test]
    fn wake_reaches_target_each_call() {
        let (data, waker) = counting_waker();
        let handle = WakerHandle::new(waker);
        assert_eq!(Arc::strong_count(&data), 2);

        assert!(handle.wake());
        assert!(handle.wake());
        assert_eq!(data.count(), 2);
    }

    #[test]
    fn dispose_releases_target_and_silences_wake() {
        let (data, waker) = counting_waker();
        let handle = WakerHandle::new(waker);

        assert!(handle.dispose());
        assert_eq!(Arc::strong_count(&data), 1, "释放后底层 Waker 必须析构");
        assert!(handle.is_disposed());

        assert!(!handle.wake(), "释放后的唤醒应为无操作");
        assert!(!handle.dispose(), "重复释放返回 false");
        assert_eq!(data.count(), 0);
    }

    #[test]
    fn dropping_last_clone_releases_target() {
        let (data, waker) = counting_waker();
        let handle = WakerHandle::new(waker);
        let clone = handle.clone();
        assert!(handle.ptr_eq(&clone));
        drop(handle);
        assert_eq!(Arc::strong_count(&data), 2);
        drop(clone);
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn closure_target_is_invoked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = {
            let hits = Arc::clone(&hits);
            WakerHandle::from_fn(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        handle.wake();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_racing_wake_never_loses_target_mid_call() {
        for _ in 0..64 {
            let (data, waker) = counting_waker();
            let handle = WakerHandle::new(waker);
            let waker_side = handle.clone();

            let waking = thread::spawn(move || {
                for _ in 0..16 {
                    waker_side.wake();
                }
            });
            handle.dispose();
            waking.join().expect("唤醒线程不应 panic");

            assert!(data.count() <= 16);
            assert_eq!(Arc::strong_count(&data), 1, "竞争结束后不得残留引用");
        }
    }

    #[test]
    fn wake_in_flight_finishes_after_dispose_returns() {
        use std::sync::Barrier;

        let entered = Arc::new(Barrier::new(2));
        let resume = Arc::new(Barrier::new(2));
        let hits = Arc::new(AtomicUsize::new(0));
        let target_alive = Arc::new(());

        let handle = {
            let entered = Arc::clone(&entered);
            let resume = Arc::clone(&resume);
            let hits = Arc::clone(&hits);
            let target_alive = Arc::clone(&target_alive);
            WakerHandle::from_fn(move || {
                entered.wait();
                resume.wait();
                // 释放已经返回，目标仍由本次唤醒持有的克隆保活。
                assert!(Arc::strong_count(&target_alive) >= 2);
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let waking = {
            let handle = handle.clone();
            thread::spawn(move || handle.wake())
        };
        entered.wait();
        assert!(handle.dispose(), "唤醒进行中同样可以释放");
        assert!(!handle.wake(), "释放之后开始的唤醒是无操作");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        resume.wait();

        assert!(waking.join().expect("唤醒线程不应 panic"), "进行中的唤醒照常投递");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&target_alive), 1, "进行中的唤醒结束后目标被析构");
    }

    #[test]
    fn will_wake_matches_same_task() {
        let (_data, waker) = counting_waker();
        let handle = WakerHandle::new(waker.clone());
        assert!(handle.will_wake(&waker));

        let (_other, other_waker) = counting_waker();
        assert!(!handle.will_wake(&other_waker));

        handle.dispose();
        assert!(!handle.will_wake(&waker));
    }
}
