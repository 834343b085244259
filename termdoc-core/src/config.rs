use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pixels::{Rgb, DEFAULT_TINT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferFormat {
    /// Raw RGB(A) samples, zlib-compressed on the wire.
    #[default]
    Raw,
    /// PNG-encoded pages.
    Png,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tint_color: Rgb,
    pub z_index: i32,
    pub handshake_timeout_ms: u64,
    pub watch_interval_ms: u64,
    pub transfer_format: TransferFormat,
    pub default_first_page_offset: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tint_color: DEFAULT_TINT,
            z_index: -1,
            handshake_timeout_ms: 2000,
            watch_interval_ms: 1000,
            transfer_format: TransferFormat::default(),
            default_first_page_offset: 1,
        }
    }
}

impl Config {
    /// Missing file means defaults; a file that fails to parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms.max(1))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.z_index, -1);
    }

    #[test]
    fn partial_config_overrides_selected_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "tint_color = [200, 200, 180]\ntransfer_format = \"png\"\nhandshake_timeout_ms = 500\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.tint_color, [200, 200, 180]);
        assert_eq!(config.transfer_format, TransferFormat::Png);
        assert_eq!(config.handshake_timeout(), Duration::from_millis(500));
        assert_eq!(config.watch_interval_ms, 1000);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "z_index = \"high\"").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
