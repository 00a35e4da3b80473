use std::{error::Error as StdError, fmt, sync::Arc};

use thiserror::Error;

/// 生产者上报的失败，在消费者读取结果时才被抛出。
///
/// # 契约说明（What）
/// - 内部以 `Arc<dyn Error + Send + Sync>` 保存原始错误，克隆成本为一次原子计数；
/// - [`std::error::Error::source`] 返回原始错误，便于沿错误链定位根因。
#[derive(Clone, Debug, Error)]
#[error("future completed with failure: {source}")]
pub struct FutureFailure {
    source: Arc<dyn StdError + Send + Sync + 'static>,
}

/// 只有文本描述的失败，用于生产者没有结构化错误类型的场景。
#[derive(Debug, Error)]
#[error("{0}")]
struct MessageFailure(String);

impl FutureFailure {
    /// 包装任意错误作为失败结果。
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(error),
        }
    }

    /// 以纯文本描述构造失败结果。
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(MessageFailure(message.into()))
    }

    /// 访问生产者上报的原始错误。
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// 尝试把原始错误还原为具体类型。
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.source.downcast_ref::<E>()
    }
}

enum Outcome<T> {
    Value(T),
    Failure(FutureFailure),
}

/// 已就绪的轮询结果：要么携带值，要么携带失败。
///
/// # 设计背景（Why）
/// - 失败需要“惰性抛出”：`poll` 返回就绪结果本身并不报错，消费者可以先把结果对象传递到别处，
///   直到调用 [`PollResult::get`] / [`PollResult::into_result`] 时才物化失败；
/// - 单值单元在就绪后每次 `poll` 都返回同一个结果，因此内部以 `Arc` 共享，克隆不要求 `T: Clone`。
///
/// # 契约说明（What）
/// - 结果一旦构造即不可变，对应“离开 Pending 后永不回退”的不变量。
pub struct PollResult<T> {
    outcome: Arc<Outcome<T>>,
}

impl<T> PollResult<T> {
    /// 构造携值的就绪结果。
    pub fn ready(value: T) -> Self {
        Self {
            outcome: Arc::new(Outcome::Value(value)),
        }
    }

    /// 构造携失败的就绪结果。
    pub fn failed(failure: FutureFailure) -> Self {
        Self {
            outcome: Arc::new(Outcome::Failure(failure)),
        }
    }

    /// 结果是否为失败。读取失败本身不会抛出。
    pub fn is_failure(&self) -> bool {
        matches!(*self.outcome, Outcome::Failure(_))
    }

    /// 读取结果：携值时返回引用，携失败时抛出失败。
    pub fn get(&self) -> Result<&T, FutureFailure> {
        match &*self.outcome {
            Outcome::Value(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure.clone()),
        }
    }

    /// 取出结果的所有权。
    ///
    /// 若本结果是唯一持有者则直接移动出值，否则克隆一份。
    pub fn into_result(self) -> Result<T, FutureFailure>
    where
        T: Clone,
    {
        match Arc::try_unwrap(self.outcome) {
            Ok(Outcome::Value(value)) => Ok(value),
            Ok(Outcome::Failure(failure)) => Err(failure),
            Err(shared) => match &*shared {
                Outcome::Value(value) => Ok(value.clone()),
                Outcome::Failure(failure) => Err(failure.clone()),
            },
        }
    }

    /// 判断两个结果是否指向同一次写入。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.outcome, &other.outcome)
    }
}

impl<T> Clone for PollResult<T> {
    fn clone(&self) -> Self {
        Self {
            outcome: Arc::clone(&self.outcome),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PollResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.outcome {
            Outcome::Value(value) => f.debug_tuple("PollResult::Ready").field(value).finish(),
            Outcome::Failure(failure) => f.debug_tuple("PollResult::Failed").field(failure).finish(),
        }
    }
}
