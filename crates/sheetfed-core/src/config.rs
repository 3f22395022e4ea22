//! 域进程配置。
//!
//! # 教案式说明
//! - **意图 (Why)**：发现组播地址、重试次数与间隔、连接/响应超时、缓存刷新周期在原有实现中是
//!   散落的常量；集中为一个可反序列化的结构后，测试可以缩短周期，部署可以覆盖组播地址；
//! - **契约 (What)**：TOML 文档中的任意字段都可省略，省略时取 [`Default`] 的协议常量；
//!   所有时长以毫秒表示；
//! - **执行 (How)**：`serde(default)` + `toml::from_str`。

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// 本进程所属的域。
    pub domain: String,
    pub discovery: DiscoveryConfig,
    pub retry: RetryConfig,
    pub transport: TransportConfig,
    pub cache: CacheConfig,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            domain: "default".to_owned(),
            discovery: DiscoveryConfig::default(),
            retry: RetryConfig::default(),
            transport: TransportConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl FederationConfig {
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: FederationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() || self.domain.contains([':', '\t']) {
            return Err(ConfigError::Invalid(format!(
                "domain `{}` must be non-empty and free of `:` and tabs",
                self.domain
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_owned(),
            ));
        }
        if !self.discovery.group.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "discovery.group {} is not a multicast address",
                self.discovery.group
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    pub announce_period_ms: u64,
    pub max_datagram: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(226, 226, 226, 226),
            port: 2266,
            announce_period_ms: 1000,
            max_datagram: 1024,
        }
    }
}

impl DiscoveryConfig {
    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }

    pub fn announce_period(&self) -> Duration {
        Duration::from_millis(self.announce_period_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            response_timeout_ms: 1_000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub refresh_period_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_period_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = FederationConfig::default();
        assert_eq!(config.discovery.group_addr().to_string(), "226.226.226.226:2266");
        assert_eq!(config.discovery.announce_period(), Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.interval(), Duration::from_secs(1));
        assert_eq!(config.transport.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.transport.response_timeout(), Duration::from_secs(1));
        assert_eq!(config.cache.refresh_period(), Duration::from_millis(500));
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config = FederationConfig::from_toml_str(
            r#"
            domain = "alpha"

            [retry]
            interval_ms = 10

            [cache]
            refresh_period_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.domain, "alpha");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.interval(), Duration::from_millis(10));
        assert_eq!(config.cache.refresh_period(), Duration::from_millis(50));
        assert_eq!(config.discovery, DiscoveryConfig::default());
    }

    #[test]
    fn rejects_domains_that_break_the_announcement_format() {
        assert!(matches!(
            FederationConfig::from_toml_str("domain = \"a:b\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            FederationConfig::from_toml_str("domain = \"a\"\n[discovery]\ngroup = \"10.0.0.1\""),
            Err(ConfigError::Invalid(_))
        ));
    }
}
