//! 线程亲和约束。
//!
//! # 设计背景（Why）
//! - 部分闭包只能在创建它的执行上下文中运行或释放；在错误线程上调用时应明确失败，
//!   而不是静默地在错误线程上执行；
//! - 所属线程在构造时显式捕获并保存在字段中，不依赖任何进程级全局状态。
//!
//! # 契约说明（What）
//! - [`ThreadAffinity::Any`]：不做检查；
//! - [`ThreadAffinity::Local`]：调用线程必须与捕获的线程一致，否则返回
//!   [`BridgeError::ThreadAffinity`]，调用方可改投到所属线程后重试。

use std::thread::{self, ThreadId};

use crate::{
    config::AffinityMode,
    error::{BridgeError, Result},
};

/// 可调用包装允许被调用的线程范围。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadAffinity {
    /// 任意线程均可调用。
    Any,
    /// 仅限指定线程调用。
    Local(ThreadId),
}

impl ThreadAffinity {
    /// 绑定到当前线程。
    pub fn current() -> Self {
        ThreadAffinity::Local(thread::current().id())
    }

    /// 根据配置模式推导亲和约束；`Local` 模式捕获当前线程。
    pub fn from_mode(mode: AffinityMode) -> Self {
        match mode {
            AffinityMode::Any => ThreadAffinity::Any,
            AffinityMode::Local => ThreadAffinity::current(),
        }
    }
}

/// 亲和检查器，构造时即确定所属线程。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadChecker {
    affinity: ThreadAffinity,
}

impl ThreadChecker {
    /// `local == true` 时绑定到当前线程，否则不做限制。
    pub fn new(local: bool) -> Self {
        if local {
            Self::with_affinity(ThreadAffinity::current())
        } else {
            Self::with_affinity(ThreadAffinity::Any)
        }
    }

    pub fn with_affinity(affinity: ThreadAffinity) -> Self {
        Self { affinity }
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// 校验当前线程是否允许调用。
    pub fn check(&self) -> Result<()> {
        let ThreadAffinity::Local(owner) = self.affinity else {
            return Ok(());
        };
        let caller = thread::current().id();
        if caller == owner {
            return Ok(());
        }
        tracing::warn!(?owner, ?caller, "thread affinity violated");
        Err(BridgeError::ThreadAffinity { owner, caller })
    }
}

impl Default for ThreadChecker {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn foreign_thread_id() -> ThreadId {
        thread::spawn(|| thread::current().id())
            .join()
            .expect("探测线程不应 panic")
    }

    #[test]
    fn any_affinity_accepts_every_thread() {
        let checker = ThreadChecker::new(false);
        assert!(checker.check().is_ok());
        let result = thread::spawn(move || checker.check().is_ok())
            .join()
            .expect("检查线程不应 panic");
        assert!(result);
    }

    #[test]
    fn local_affinity_accepts_owner_and_rejects_others() {
        let checker = ThreadChecker::new(true);
        assert!(checker.check().is_ok());

        let err = thread::spawn(move || checker.check())
            .join()
            .expect("检查线程不应 panic")
            .expect_err("非所属线程必须被拒绝");
        assert!(err.is_thread_affinity());
    }

    #[traced_test]
    #[test]
    fn violation_is_logged_with_both_threads() {
        let owner = foreign_thread_id();
        let checker = ThreadChecker::with_affinity(ThreadAffinity::Local(owner));

        match checker.check() {
            Err(BridgeError::ThreadAffinity { owner: seen, caller }) => {
                assert_eq!(seen, owner);
                assert_eq!(caller, thread::current().id());
            }
            other => panic!("unexpected check result: {other:?}"),
        }
        assert!(logs_contain("thread affinity violated"));
    }

    #[test]
    fn mode_local_captures_current_thread() {
        assert_eq!(
            ThreadAffinity::from_mode(AffinityMode::Local),
            ThreadAffinity::Local(thread::current().id())
        );
        assert_eq!(
            ThreadAffinity::from_mode(AffinityMode::Any),
            ThreadAffinity::Any
        );
    }
}
