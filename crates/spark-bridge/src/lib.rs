#![deny(unsafe_code)]
#![doc = "spark-bridge: 原生轮询式执行器与托管对象运行时之间的异步握手原语。"]
#![doc = ""]
#![doc = "== 定位 =="]
#![doc = "本 Crate 只提供 Future/Stream/Waker 的同步协议：执行器登记兴趣、生产者一次性写入结果、唤醒恰好投递一次。"]
#![doc = "执行器本身、托管侧对象分配器以及载荷序列化均由外部协作方负责。"]
#![doc = ""]
#![doc = "== 并发纪律 =="]
#![doc = "每个实例独占一把互斥锁；临界区只做状态检查与修改，唤醒回调一律在释放锁之后执行，避免与重入方形成锁序死锁。"]

// 教案级说明：模块拓扑。
//
// # 意图（Why）
// - `task` 承载叶子概念（轮询结果、唤醒句柄），`future`/`stream` 在其上构建单值与多值握手单元；
// - `ops` 与 `thread` 描述可调用包装及其线程亲和约束；
// - `handle`/`registry` 以“竞技场 + 索引”模式模拟托管侧持有的不透明句柄。
//
// # 合同（What）
// - 所有公开类型均为 `Send + Sync`，可在任意工作线程之间传递；
// - 任何操作都不会阻塞调用线程，`poll`/`poll_next` 总是立即返回。
pub mod config;
pub mod error;
pub mod future;
pub mod handle;
pub mod observability;
pub mod ops;
pub mod registry;
pub mod stream;
pub mod task;
pub mod thread;

mod sync;

pub use config::{AffinityMode, BridgeConfig, LogConfig};
pub use error::{BridgeError, Result};
pub use future::{CellFuture, CompletionCell};
pub use handle::{Handle, HandleTable};
pub use ops::{FnOnceRunnable, FnRunnable, fn_once_runnable, fn_runnable};
pub use registry::BridgeRegistry;
pub use stream::{QueueStream, QueueStreamAdapter};
pub use task::{FutureFailure, PollResult, WakerHandle};
pub use thread::{ThreadAffinity, ThreadChecker};

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use std::task::{Wake, Waker};

    /// 记录被唤醒次数的测试用唤醒目标。
    #[derive(Debug, Default)]
    pub struct CountingWake(AtomicUsize);

    impl CountingWake {
        pub fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Wake for CountingWake {
        fn wake(self: Arc<Self>) {
            self.wake_by_ref();
        }

        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn counting_waker() -> (Arc<CountingWake>, Waker) {
        let data = Arc::new(CountingWake::default());
        let waker = Waker::from(Arc::clone(&data));
        (data, waker)
    }
}
