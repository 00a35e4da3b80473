//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义握手原语对外暴露的可恢复错误，统一使用 `thiserror` 派生；
//! - 生产者侧的编程错误（重复完成、结束后推送）默认以 panic 暴露，`try_*` 变体则以
//!   [`BridgeError`] 返回，供希望自行处理的调用方使用。
//!
//! ## 设计要求（What）
//! - 所有变体均为 `Send + Sync + 'static`，可安全跨线程传播；
//! - “生产者上报的失败”不属于本枚举，而由 [`FutureFailure`](crate::task::FutureFailure)
//!   承载，直到消费者读取结果时才被抛出。

use std::thread::ThreadId;

use thiserror::Error;

/// 统一的结果别名，默认错误类型为 [`BridgeError`]。
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// 握手原语错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“调用方可以据此改变行为”的失败路径集中起来，例如在错误线程上调用
///   可调用包装时，调用方可以改为调度到正确线程后重试；
/// - **契约 (What)**：`Pending` 永远不携带错误信息，本枚举只出现在生产者写入、可调用包装与
///   句柄解析等同步 API 的返回值中；
/// - **权衡 (Trade-offs)**：配置解析错误直接保留 `toml::de::Error`，以便输出行列位置。
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 单值单元已经写入过结果，拒绝第二次写入。
    #[error("completion cell already holds a result")]
    AlreadyCompleted,

    /// 流已被标记结束，拒绝继续推送或再次结束。
    #[error("queue stream is already finished")]
    StreamFinished,

    /// 标记为 `Local` 的可调用包装在非所属线程上被调用。
    ///
    /// - **契约 (What)**：闭包不会被执行，也不会被释放；调用方可切换到 `owner` 线程后重试。
    #[error("callable is bound to thread {owner:?} but was invoked from {caller:?}")]
    ThreadAffinity { owner: ThreadId, caller: ThreadId },

    /// 可调用包装内的原生闭包 panic，展开在桥接边界被截获。
    ///
    /// - **契约 (What)**：`message` 取自 panic 载荷（`&str`/`String`），其它载荷类型以占位文本代替。
    #[error("native closure panicked: {message}")]
    Panicked { message: String },

    /// 托管侧持有的句柄在表中已不存在（已释放或从未分配）。
    #[error("{kind} handle #{id} is not registered")]
    StaleHandle { kind: &'static str, id: u64 },

    /// 配置文本无法解析。
    #[error("invalid bridge configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// 全局 tracing Subscriber 安装失败。
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(String),
}

impl BridgeError {
    /// 判断错误是否属于线程亲和违规，便于调用方决定是否改投到所属线程。
    pub fn is_thread_affinity(&self) -> bool {
        matches!(self, BridgeError::ThreadAffinity { .. })
    }
}
