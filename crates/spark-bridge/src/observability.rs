//! 日志接入。
//!
//! # 教案式说明
//! - **意图（Why）**：握手原语本身只发出 `tracing` 事件（状态迁移为 `trace`，过期句柄为 `debug`，
//!   线程亲和违规为 `warn`），是否输出、输出到哪里由宿主决定；
//! - **逻辑（How）**：[`install_subscriber`] 以 `tracing-subscriber` 组装 `fmt + EnvFilter` 并设置为全局
//!   Subscriber，供没有自带日志体系的宿主一键启用；
//! - **契约（What）**：外部已设置全局 Subscriber 时返回 [`BridgeError::SubscriberInstall`]，不覆盖既有配置。

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

use crate::{
    config::LogConfig,
    error::{BridgeError, Result},
};

/// 按配置安装全局 tracing Subscriber。
pub fn install_subscriber(config: &LogConfig) -> Result<()> {
    if dispatcher::has_been_set() {
        return Err(BridgeError::SubscriberInstall(String::from(
            "a global tracing subscriber is already set",
        )));
    }

    let filter = build_env_filter(config)?;
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_ansi(config.ansi)
            .with_target(config.target),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| BridgeError::SubscriberInstall(err.to_string()))?;
    tracing::debug!(filter = %config.filter, "spark-bridge logging installed");
    Ok(())
}

/// 按配置构造过滤器，语法错误映射为 [`BridgeError::SubscriberInstall`]。
fn build_env_filter(config: &LogConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(&config.filter)
        .map_err(|err| BridgeError::SubscriberInstall(format!("invalid filter: {err}")))
}
