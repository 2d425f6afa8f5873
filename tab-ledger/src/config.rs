//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Writer actor configuration
    pub actor: ActorConfig,

    /// Administrative credential seeded on first open
    pub admin: AdminConfig,

    /// History rendering
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/tab-ledger"),
            service_name: "tab-ledger".to_string(),
            rocksdb: RocksDBConfig::default(),
            actor: ActorConfig::default(),
            admin: AdminConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Writer actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Administrative credential
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Username (compared case-insensitively)
    pub username: String,

    /// Plaintext password, digested before it is stored
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// History rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Offset from UTC applied to history dates and times (seconds)
    pub utc_offset_seconds: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_seconds: 0,
        }
    }
}

impl DisplayConfig {
    /// Offset as a chrono timezone
    pub fn offset(&self) -> crate::Result<chrono::FixedOffset> {
        chrono::FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            crate::Error::Config(format!(
                "UTC offset out of range: {}s",
                self.utc_offset_seconds
            ))
        })
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.display.offset()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("TAB_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(user) = std::env::var("TAB_LEDGER_ADMIN_USER") {
            config.admin.username = user;
        }

        if let Ok(password) = std::env::var("TAB_LEDGER_ADMIN_PASSWORD") {
            config.admin.password = password;
        }

        if let Ok(offset) = std::env::var("TAB_LEDGER_UTC_OFFSET") {
            config.display.utc_offset_seconds = offset.trim().parse().map_err(|e| {
                crate::Error::Config(format!("Invalid TAB_LEDGER_UTC_OFFSET {:?}: {}", offset, e))
            })?;
            config.display.offset()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "tab-ledger");
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert_eq!(config.display.utc_offset_seconds, 0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/tmp/tabs"

            [display]
            utc_offset_seconds = -10800
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/tabs"));
        assert_eq!(config.display.utc_offset_seconds, -10800);
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.rocksdb.max_background_jobs, 2);
    }

    #[test]
    fn test_offset_out_of_range() {
        let display = DisplayConfig {
            utc_offset_seconds: 86_400,
        };
        assert!(matches!(display.offset(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_admin_password_redacted() {
        let rendered = format!("{:?}", AdminConfig::default());
        assert!(rendered.contains("<redacted>"));
    }
}
