//! 可调用包装：把原生闭包交给托管侧调用。
//!
//! ## 设计目标（Why）
//! - 托管侧持有一个 `run()`/`close()` 对象即可触发或丢弃原生闭包，而无需为每个闭包导出新的入口；
//! - [`FnOnceRunnable`] 至多执行一次，[`FnRunnable`] 可以反复执行。
//!
//! ## 契约说明（What）
//! - `run()`/`close()` 在释放之后调用均为无操作，返回 `Ok(false)`；
//! - `close()` 幂等，在 `FnOnceRunnable` 已执行之后调用同样是无操作；
//! - 亲和检查先于一切状态变更：在错误线程上调用时闭包既不执行也不释放；
//! - 闭包总是在锁外执行，执行过程中可以重入同一个包装（例如在闭包内 `close()` 自己）；
//! - 闭包内的 panic 在 `run()` 中截获并以 [`BridgeError::Panicked`] 返回，展开不会越过桥接边界。
//!   `FnOnceRunnable` 的闭包在 panic 后视为已消费；`FnRunnable` 保持可用。

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    error::{BridgeError, Result},
    sync::Mutex,
    thread::{ThreadAffinity, ThreadChecker},
};

type OnceFn = Box<dyn FnOnce() + Send + 'static>;
type RepeatFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// 至多执行一次的闭包包装。
pub struct FnOnceRunnable {
    checker: ThreadChecker,
    data: Mutex<Option<OnceFn>>,
}

impl FnOnceRunnable {
    pub fn new<F>(f: F, affinity: ThreadAffinity) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            checker: ThreadChecker::with_affinity(affinity),
            data: Mutex::new(Some(Box::new(f))),
        }
    }

    /// 执行闭包。
    ///
    /// 返回 `Ok(true)` 表示本次调用执行了闭包；已执行或已关闭时返回 `Ok(false)`。
    /// 闭包 panic 时返回 [`BridgeError::Panicked`]，闭包同样视为已消费。
    pub fn run(&self) -> Result<bool> {
        self.checker.check()?;
        let f = self.data.lock().take();
        match f {
            Some(f) => invoke(f).map(|()| true),
            None => Ok(false),
        }
    }

    /// 不执行而直接释放闭包。返回 `Ok(true)` 表示本次调用完成了释放。
    pub fn close(&self) -> Result<bool> {
        self.checker.check()?;
        let released = self.data.lock().take();
        Ok(released.is_some())
    }

    /// 闭包是否已被执行或释放。
    pub fn is_closed(&self) -> bool {
        self.data.lock().is_none()
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.checker.affinity()
    }
}

impl fmt::Debug for FnOnceRunnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOnceRunnable")
            .field("affinity", &self.checker.affinity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 可反复执行的闭包包装。
///
/// 执行时在锁内克隆闭包的 `Arc` 后于锁外调用，并发的 `close()` 不会等待执行完成，
/// 闭包资源在最后一次执行返回后才真正释放。
pub struct FnRunnable {
    checker: ThreadChecker,
    data: Mutex<Option<RepeatFn>>,
}

impl FnRunnable {
    pub fn new<F>(f: F, affinity: ThreadAffinity) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            checker: ThreadChecker::with_affinity(affinity),
            data: Mutex::new(Some(Arc::new(f))),
        }
    }

    /// 执行闭包；已关闭时返回 `Ok(false)`。
    pub fn run(&self) -> Result<bool> {
        self.checker.check()?;
        let f = self.data.lock().clone();
        match f {
            Some(f) => invoke(|| f()).map(|()| true),
            None => Ok(false),
        }
    }

    /// 释放闭包，之后的 `run()` 均为无操作。
    pub fn close(&self) -> Result<bool> {
        self.checker.check()?;
        let released = self.data.lock().take();
        Ok(released.is_some())
    }

    pub fn is_closed(&self) -> bool {
        self.data.lock().is_none()
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.checker.affinity()
    }
}

impl fmt::Debug for FnRunnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRunnable")
            .field("affinity", &self.checker.affinity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 执行闭包并截获 panic。
fn invoke(f: impl FnOnce()) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::warn!(%message, "native closure panicked");
        BridgeError::Panicked { message }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        String::from(*message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// 由 [`FnOnce`] 构造可调用包装；`local` 为 `true` 时仅允许当前线程调用。
pub fn fn_once_runnable<F>(f: F, local: bool) -> FnOnceRunnable
where
    F: FnOnce() + Send + 'static,
{
    FnOnceRunnable::new(f, ThreadChecker::new(local).affinity())
}

/// 由 [`Fn`] 构造可调用包装；`local` 为 `true` 时仅允许当前线程调用。
pub fn fn_runnable<F>(f: F, local: bool) -> FnRunnable
where
    F: Fn() + Send + Sync + 'static,
{
    FnRunnable::new(f, ThreadChecker::new(local).affinity())
}
