//! 轮询结果与唤醒句柄。
//!
//! # 设计背景（Why）
//! - `future` 与 `stream` 共享同一套叶子概念：三态轮询结果（Pending / 携值就绪 / 携失败就绪）
//!   以及指向执行器续体的唤醒句柄；
//! - Pending 统一使用 [`core::task::Poll::Pending`] 表达，不另造平行枚举。

mod poll;
mod waker;

pub use poll::{FutureFailure, PollResult};
pub use waker::WakerHandle;
