//! 桥接层配置。
//!
//! # 契约说明（What）
//! - 配置以 TOML 文本提供，所有字段都有默认值，空文本即得到默认配置；
//! - 未知字段视为错误，避免拼写错误被静默忽略。
//!
//! ```toml
//! affinity = "local"
//!
//! [logging]
//! filter = "spark_bridge=debug"
//! ansi = false
//! ```

use serde::Deserialize;

use crate::error::Result;

/// 注册表新建可调用包装时采用的线程亲和模式。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AffinityMode {
    /// 任意线程均可调用。
    #[default]
    Any,
    /// 仅限登记闭包的线程调用。
    Local,
}

/// 日志输出配置，交给 [`install_subscriber`](crate::observability::install_subscriber) 使用。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` 语法的过滤指令。
    pub filter: String,
    /// 是否输出 ANSI 颜色。
    pub ansi: bool,
    /// 是否在每行日志中输出 target。
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: String::from("info"),
            ansi: true,
            target: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    pub affinity: AffinityMode,
    pub logging: LogConfig,
}

impl BridgeConfig {
    /// 解析 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn empty_text_yields_defaults() {
        let config = BridgeConfig::from_toml_str("").expect("空配置合法");
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.affinity, AffinityMode::Any);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn explicit_values_are_read() {
        let config = BridgeConfig::from_toml_str(
            r#"
            affinity = "local"

            [logging]
            filter = "spark_bridge=trace"
            ansi = false
            "#,
        )
        .expect("配置合法");
        assert_eq!(config.affinity, AffinityMode::Local);
        assert_eq!(config.logging.filter, "spark_bridge=trace");
        assert!(!config.logging.ansi);
        assert!(!config.logging.target);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = BridgeConfig::from_toml_str("affinty = \"local\"").expect_err("拼写错误必须报错");
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
