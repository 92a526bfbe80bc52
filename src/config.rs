//! Shim configuration - host runtime capability and logging
//!
//! Loaded from TOML:
//!
//! ```toml
//! host_version = "3.8"        # or 0x03080000, or "0x030800f0"
//! strategy = "legacy"         # optional override
//!
//! [log]
//! level = "debug"
//! file = "shim.log"
//! json = false
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::call::CallStrategy;
use crate::logging::{parse_level, LogConfig};

/// Host runtime revision assumed when nothing is configured
pub const DEFAULT_HOST_VERSION: u32 = 0x030B_0000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShimConfig {
    /// Host runtime version, `0xMMmm....` as the host encodes it
    #[serde(
        default = "default_host_version",
        deserialize_with = "deserialize_host_version"
    )]
    pub host_version: u32,

    /// Force a call strategy instead of deriving it from `host_version`
    #[serde(default)]
    pub strategy: Option<CallStrategy>,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub spans: bool,
}

impl LogSection {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self
                .level
                .as_deref()
                .map(parse_level)
                .unwrap_or(LogConfig::default().level),
            file_output: self.file.is_some(),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.spans,
        }
    }
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            host_version: DEFAULT_HOST_VERSION,
            strategy: None,
            log: LogSection::default(),
        }
    }
}

impl ShimConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by `HSHIM_HOST_VERSION` / `HSHIM_STRATEGY`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(version) = std::env::var("HSHIM_HOST_VERSION") {
            config.host_version = parse_host_version(&version)?;
        }
        if let Ok(strategy) = std::env::var("HSHIM_STRATEGY") {
            config.strategy = Some(strategy.parse()?);
        }
        Ok(config)
    }

    /// Strategy in effect: the explicit override, else derived from the host
    pub fn strategy(&self) -> CallStrategy {
        self.strategy
            .unwrap_or_else(|| CallStrategy::for_host_version(self.host_version))
    }
}

/// Parse `"3.9"`, `"3.9.1"`, `"0x030900f0"` or a plain decimal
pub fn parse_host_version(text: &str) -> Result<u32, ConfigError> {
    let text = text.trim();
    let invalid = || ConfigError::InvalidHostVersion(text.to_string());

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|_| invalid());
    }

    if text.contains('.') {
        let mut parts = text.split('.');
        let mut next = |shift: u32| -> Result<u32, ConfigError> {
            match parts.next() {
                Some(p) => {
                    let v: u32 = p.parse().map_err(|_| invalid())?;
                    if v > 0xFF {
                        return Err(invalid());
                    }
                    Ok(v << shift)
                }
                None => Ok(0),
            }
        };
        let version = next(24)? | next(16)? | next(8)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        return Ok(version);
    }

    text.parse().map_err(|_| invalid())
}

fn default_host_version() -> u32 {
    DEFAULT_HOST_VERSION
}

fn deserialize_host_version<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => parse_host_version(&s).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    InvalidHostVersion(String),
    InvalidStrategy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read config: {}", e),
            Self::Parse(e) => write!(f, "Failed to parse config: {}", e),
            Self::InvalidHostVersion(v) => write!(f, "Invalid host version: {:?}", v),
            Self::InvalidStrategy(s) => write!(f, "Unknown call strategy: {:?}", s),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_host_version_forms() {
        assert_eq!(parse_host_version("3.9").unwrap(), 0x0309_0000);
        assert_eq!(parse_host_version("3.8.10").unwrap(), 0x0308_0A00);
        assert_eq!(parse_host_version("0x030B00F0").unwrap(), 0x030B_00F0);
        assert_eq!(parse_host_version("50921472").unwrap(), 0x0309_0000);
        assert!(parse_host_version("three").is_err());
        assert!(parse_host_version("3.999").is_err());
        assert!(parse_host_version("3.9.1.2").is_err());
    }

    #[test]
    fn test_default_is_vectorcall() {
        let config = ShimConfig::default();
        assert_eq!(config.strategy(), CallStrategy::Vectorcall);
    }

    #[test]
    fn test_toml_host_version() {
        let config = ShimConfig::from_toml_str("host_version = \"3.8\"").unwrap();
        assert_eq!(config.host_version, 0x0308_0000);
        assert_eq!(config.strategy(), CallStrategy::Legacy);

        let config = ShimConfig::from_toml_str("host_version = 50921472").unwrap();
        assert_eq!(config.strategy(), CallStrategy::Vectorcall);
    }

    #[test]
    fn test_toml_strategy_override() {
        let config = ShimConfig::from_toml_str(
            r#"
            host_version = "3.12"
            strategy = "legacy"

            [log]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy(), CallStrategy::Legacy);
        let log = config.log.to_log_config();
        assert_eq!(log.level, tracing::Level::DEBUG);
        assert!(log.json_format);
        assert!(!log.file_output);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host_version = \"0x03070000\"").unwrap();
        let config = ShimConfig::from_file(file.path()).unwrap();
        assert_eq!(config.strategy(), CallStrategy::Legacy);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ShimConfig::from_toml_str("host_version = \"x.y\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(ShimConfig::from_file("/nonexistent/shim.toml").is_err());
    }
}
