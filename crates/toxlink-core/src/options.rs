//! Caller facing engine options, their native plan, and registry settings.
//!
//! # Design
//! - Caller values arrive wider than the engine accepts; validation rejects
//!   anything that does not fit instead of truncating it.
//! - Settings that are valid but ignored by the engine are kept and reported
//!   as guard-rail warnings so callers can surface them.
//! - The caller to native mapping lives in one place to avoid drift as fields
//!   grow.

use serde::{Deserialize, Serialize};
use toxlink_events::PUBLIC_KEY_SIZE;

use crate::error::OptionsError;

/// Default upper bound on concurrently registered sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4_096;
/// Default accumulator size that triggers a backlog warning.
pub const DEFAULT_ACCUMULATOR_WARN_THRESHOLD: usize = 65_536;
/// Longest proxy host name the engine accepts.
pub const MAX_PROXY_HOST_LEN: usize = 255;

/// Proxy flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    /// Connect directly.
    #[default]
    None,
    /// HTTP CONNECT proxy.
    Http,
    /// SOCKS5 proxy.
    Socks5,
}

impl ProxyType {
    /// Raw engine value.
    #[must_use]
    pub const fn as_native(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Http => 1,
            Self::Socks5 => 2,
        }
    }
}

/// Proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Proxy flavour; `None` disables the proxy.
    #[serde(rename = "type")]
    pub kind: ProxyType,
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u32,
}

/// Persisted state to load on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SaveData {
    /// Start with a fresh identity.
    #[default]
    None,
    /// Restore a full save blob produced by `save`.
    ToxSave(Vec<u8>),
    /// Restore only the long-term secret key.
    SecretKey([u8; PUBLIC_KEY_SIZE]),
}

impl SaveData {
    /// Raw engine value for the save data type.
    #[must_use]
    pub const fn native_type(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::ToxSave(_) => 1,
            Self::SecretKey(_) => 2,
        }
    }
}

/// Options supplied by the caller when creating a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Enable IPv6 sockets.
    pub ipv6_enabled: bool,
    /// Enable UDP; when disabled the node only uses TCP relays.
    pub udp_enabled: bool,
    /// Proxy settings.
    pub proxy: ProxyOptions,
    /// First port to try binding; `0` lets the engine choose.
    pub start_port: u32,
    /// Last port to try binding; `0` lets the engine choose.
    pub end_port: u32,
    /// TCP relay server port; `0` disables the relay server.
    pub tcp_port: u32,
    /// Persisted state to restore.
    pub save_data: SaveData,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            ipv6_enabled: true,
            udp_enabled: true,
            proxy: ProxyOptions::default(),
            start_port: 0,
            end_port: 0,
            tcp_port: 0,
            save_data: SaveData::None,
        }
    }
}

impl EngineOptions {
    /// Check every field against the engine's constraints.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::InvalidField`] for the first offending field.
    pub fn validate(&self) -> Result<(), OptionsError> {
        self.plan().map(|_| ())
    }

    /// Validate and map onto the native option layout.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::InvalidField`] for the first offending field.
    pub fn plan(&self) -> Result<NativeOptionsPlan, OptionsError> {
        let mut warnings = Vec::new();

        let start_port = port_field("start_port", self.start_port)?;
        let end_port = port_field("end_port", self.end_port)?;
        let tcp_port = port_field("tcp_port", self.tcp_port)?;
        if start_port > end_port {
            return Err(OptionsError::InvalidField {
                field: "start_port",
                reason: "start_port must not exceed end_port",
            });
        }
        if (start_port == 0) != (end_port == 0) {
            warnings.push(format!(
                "port range {start_port}..={end_port} has an open end; engine picks the missing bound"
            ));
        }

        let (proxy_host, proxy_port) = match self.proxy.kind {
            ProxyType::None => {
                if !self.proxy.host.is_empty() || self.proxy.port != 0 {
                    warnings.push(
                        "proxy host/port set without a proxy type; ignoring proxy settings"
                            .to_string(),
                    );
                }
                (String::new(), 0)
            }
            ProxyType::Http | ProxyType::Socks5 => {
                if self.proxy.host.is_empty() {
                    return Err(OptionsError::InvalidField {
                        field: "proxy.host",
                        reason: "proxy host must not be empty",
                    });
                }
                if self.proxy.host.len() > MAX_PROXY_HOST_LEN {
                    return Err(OptionsError::InvalidField {
                        field: "proxy.host",
                        reason: "proxy host exceeds 255 bytes",
                    });
                }
                let port = port_field("proxy.port", self.proxy.port)?;
                if port == 0 {
                    return Err(OptionsError::InvalidField {
                        field: "proxy.port",
                        reason: "proxy port must be within 1..=65535",
                    });
                }
                (self.proxy.host.clone(), port)
            }
        };

        let save_data = match &self.save_data {
            SaveData::ToxSave(blob) if blob.is_empty() => {
                warnings.push("empty save blob; starting with a fresh identity".to_string());
                SaveData::None
            }
            other => other.clone(),
        };

        let options = NativeOptions {
            ipv6_enabled: self.ipv6_enabled,
            udp_enabled: self.udp_enabled,
            proxy_type: self.proxy.kind.as_native(),
            proxy_host,
            proxy_port,
            start_port,
            end_port,
            tcp_port,
            savedata_type: save_data.native_type(),
            savedata: match save_data {
                SaveData::None => Vec::new(),
                SaveData::ToxSave(blob) => blob,
                SaveData::SecretKey(key) => key.to_vec(),
            },
        };

        Ok(NativeOptionsPlan { options, warnings })
    }
}

fn port_field(field: &'static str, value: u32) -> Result<u16, OptionsError> {
    u16::try_from(value).map_err(|_| OptionsError::InvalidField {
        field,
        reason: "port must be within 0..=65535",
    })
}

/// Option layout handed to the engine factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeOptions {
    /// Enable IPv6 sockets.
    pub ipv6_enabled: bool,
    /// Enable UDP.
    pub udp_enabled: bool,
    /// Raw proxy type.
    pub proxy_type: u32,
    /// Proxy host; empty without a proxy.
    pub proxy_host: String,
    /// Proxy port; `0` without a proxy.
    pub proxy_port: u16,
    /// First port to try binding.
    pub start_port: u16,
    /// Last port to try binding.
    pub end_port: u16,
    /// TCP relay server port.
    pub tcp_port: u16,
    /// Raw save data type.
    pub savedata_type: u32,
    /// Save data bytes.
    pub savedata: Vec<u8>,
}

/// Planned native options plus guard-rail warnings.
#[derive(Debug, Clone)]
pub struct NativeOptionsPlan {
    /// Options passed to the engine factory.
    pub options: NativeOptions,
    /// Settings that were accepted but will have no effect.
    pub warnings: Vec<String>,
}

/// Registry tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of live sessions.
    pub max_sessions: usize,
    /// Undrained event count that triggers a warning.
    pub accumulator_warn_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            accumulator_warn_threshold: DEFAULT_ACCUMULATOR_WARN_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(options: &EngineOptions) -> Option<&'static str> {
        match options.validate() {
            Err(OptionsError::InvalidField { field, .. }) => Some(field),
            Ok(()) => None,
        }
    }

    #[test]
    fn defaults_validate_without_warnings() -> anyhow::Result<()> {
        let plan = EngineOptions::default().plan()?;
        assert!(plan.warnings.is_empty());
        assert!(plan.options.ipv6_enabled);
        assert!(plan.options.udp_enabled);
        assert_eq!(plan.options.proxy_type, 0);
        assert_eq!(plan.options.savedata_type, 0);
        Ok(())
    }

    #[test]
    fn out_of_range_ports_are_rejected() {
        let options = EngineOptions {
            start_port: 70_000,
            end_port: 70_001,
            ..EngineOptions::default()
        };
        assert_eq!(invalid_field(&options), Some("start_port"));

        let options = EngineOptions {
            tcp_port: 65_536,
            ..EngineOptions::default()
        };
        assert_eq!(invalid_field(&options), Some("tcp_port"));
    }

    #[test]
    fn inverted_port_range_is_rejected() {
        let options = EngineOptions {
            start_port: 33_500,
            end_port: 33_445,
            ..EngineOptions::default()
        };
        assert_eq!(invalid_field(&options), Some("start_port"));
    }

    #[test]
    fn proxy_requires_host_and_port() {
        let mut options = EngineOptions {
            proxy: ProxyOptions {
                kind: ProxyType::Socks5,
                host: String::new(),
                port: 9050,
            },
            ..EngineOptions::default()
        };
        assert_eq!(invalid_field(&options), Some("proxy.host"));

        options.proxy.host = "x".repeat(MAX_PROXY_HOST_LEN + 1);
        assert_eq!(invalid_field(&options), Some("proxy.host"));

        options.proxy.host = "localhost".to_string();
        options.proxy.port = 0;
        assert_eq!(invalid_field(&options), Some("proxy.port"));

        options.proxy.port = 9050;
        assert_eq!(invalid_field(&options), None);
    }

    #[test]
    fn ignored_settings_produce_warnings() -> anyhow::Result<()> {
        let options = EngineOptions {
            proxy: ProxyOptions {
                kind: ProxyType::None,
                host: "proxy.local".to_string(),
                port: 8080,
            },
            save_data: SaveData::ToxSave(Vec::new()),
            ..EngineOptions::default()
        };
        let plan = options.plan()?;
        assert_eq!(plan.warnings.len(), 2);
        assert!(plan.options.proxy_host.is_empty());
        assert_eq!(plan.options.savedata_type, 0);
        Ok(())
    }

    #[test]
    fn secret_key_is_forwarded_as_bytes() -> anyhow::Result<()> {
        let options = EngineOptions {
            save_data: SaveData::SecretKey([5; PUBLIC_KEY_SIZE]),
            ..EngineOptions::default()
        };
        let plan = options.plan()?;
        assert_eq!(plan.options.savedata_type, 2);
        assert_eq!(plan.options.savedata, vec![5; PUBLIC_KEY_SIZE]);
        Ok(())
    }

    #[test]
    fn registry_config_loads_partial_json() -> anyhow::Result<()> {
        let config: RegistryConfig = serde_json::from_str(r#"{"max_sessions": 8}"#)?;
        assert_eq!(config.max_sessions, 8);
        assert_eq!(
            config.accumulator_warn_threshold,
            DEFAULT_ACCUMULATOR_WARN_THRESHOLD
        );
        Ok(())
    }
}
