//! 互斥原语的统一出口。
//!
//! 教案级说明：`loom` 运行时需要接管互斥锁以枚举调度交错，因此在模型检查配置下
//! 显式切换到 `loom::sync::Mutex`；常规构建使用 `parking_lot::Mutex`，不存在锁中毒。
//! `Arc` 始终保持标准实现，以支持 `Arc<dyn Fn()>` 之类的非定长类型。

#[cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]
pub(crate) use parking_lot::Mutex;

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
pub(crate) use self::loom_mutex::Mutex;

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
mod loom_mutex {
    use loom::sync::MutexGuard;

    /// 与 `parking_lot::Mutex` 对齐的薄包装：`lock()` 直接返回守卫。
    #[derive(Debug)]
    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            match self.0.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }
}
