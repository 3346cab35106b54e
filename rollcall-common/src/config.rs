//! Configuration loading and root folder resolution
//!
//! The tracker reads a single TOML file. Every key is optional; a missing
//! file or a missing key falls back to compiled defaults so a fresh install
//! starts without any setup. Malformed values are rejected.
//!
//! ```toml
//! root_folder = "/var/lib/rollcall"
//! cooldown_window_secs = 300
//! late_cutoff = "08:30"
//! overtime_cutoff = "17:00"
//! lock_timeout_ms = 5000
//! reentry_policy = "discard"
//! unknown_label = "Unknown"
//!
//! [logging]
//! level = "info"
//! ```

use crate::events::DEFAULT_UNKNOWN_LABEL;
use crate::human_time::parse_clock;
use crate::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "ROLLCALL_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "ROLLCALL_CONFIG";

/// Longest accepted cooldown window
pub const MAX_COOLDOWN_WINDOW_SECS: u64 = 86_400;

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "rollcall.db";

/// What a new arrival does to a day that already has a completed
/// check-in/check-out span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Clear the check-out along with its duration and overtime
    #[default]
    Discard,
    /// Clear the check-out but leave the completed span's duration and
    /// overtime in place until the next check-out recomputes them
    Retain,
}

/// Logging section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Folder holding the database; resolved with [`resolve_root_folder`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Minimum seconds between two admitted events for one person
    pub cooldown_window_secs: u64,

    /// Check-ins after this time are late (`HH:MM` or `HH:MM:SS`)
    pub late_cutoff: String,

    /// Check-outs after this time accrue overtime (`HH:MM` or `HH:MM:SS`)
    pub overtime_cutoff: String,

    /// How long a unit of work waits for its ledger lock
    pub lock_timeout_ms: u64,

    /// Handling of arrivals after a completed span
    pub reentry_policy: ReentryPolicy,

    /// Recognizer label for unmatched faces
    pub unknown_label: String,

    pub logging: LoggingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            cooldown_window_secs: 300,
            late_cutoff: "08:30".to_string(),
            overtime_cutoff: "17:00".to_string(),
            lock_timeout_ms: 5000,
            reentry_policy: ReentryPolicy::Discard,
            unknown_label: DEFAULT_UNKNOWN_LABEL.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file is not an error: a warning is logged and the compiled
    /// defaults are returned.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cutoff ordering
    pub fn validate(&self) -> Result<()> {
        let late = self.late_cutoff_time()?;
        let overtime = self.overtime_cutoff_time()?;
        if late > overtime {
            return Err(Error::Config(format!(
                "late_cutoff {} is after overtime_cutoff {}",
                self.late_cutoff, self.overtime_cutoff
            )));
        }
        if self.cooldown_window_secs > MAX_COOLDOWN_WINDOW_SECS {
            return Err(Error::Config(format!(
                "cooldown_window_secs {} exceeds one day",
                self.cooldown_window_secs
            )));
        }
        if self.lock_timeout_ms == 0 {
            return Err(Error::Config("lock_timeout_ms must be positive".to_string()));
        }
        if self.unknown_label.trim().is_empty() {
            return Err(Error::Config("unknown_label must not be blank".to_string()));
        }
        Ok(())
    }

    pub fn late_cutoff_time(&self) -> Result<NaiveTime> {
        parse_clock(&self.late_cutoff)
            .map_err(|e| Error::Config(format!("late_cutoff: {}", e)))
    }

    pub fn overtime_cutoff_time(&self) -> Result<NaiveTime> {
        parse_clock(&self.overtime_cutoff)
            .map_err(|e| Error::Config(format!("overtime_cutoff: {}", e)))
    }

    pub fn cooldown_window(&self) -> chrono::Duration {
        let secs = self.cooldown_window_secs.min(MAX_COOLDOWN_WINDOW_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Write configuration atomically (temp file + rename)
///
/// Readers never observe a half-written file: the new content is written
/// next to the target and renamed over it.
pub fn write_config(config: &TrackerConfig, path: &Path) -> Result<()> {
    config.validate()?;
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, content)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Config file location: `ROLLCALL_CONFIG`, else `<config dir>/rollcall/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .map(|d| d.join("rollcall").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("rollcall.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TrackerConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rollcall"))
        .unwrap_or_else(|| PathBuf::from("./rollcall_data"))
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cooldown_window(), chrono::Duration::seconds(300));
        assert_eq!(
            config.late_cutoff_time().unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert_eq!(
            config.overtime_cutoff_time().unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap()
        );
        assert_eq!(config.reentry_policy, ReentryPolicy::Discard);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TrackerConfig::from_toml_str("cooldown_window_secs = 60\n").unwrap();
        assert_eq!(config.cooldown_window_secs, 60);
        assert_eq!(config.late_cutoff, "08:30");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_reentry_policy_parsing() {
        let config = TrackerConfig::from_toml_str("reentry_policy = \"retain\"\n").unwrap();
        assert_eq!(config.reentry_policy, ReentryPolicy::Retain);
        assert!(TrackerConfig::from_toml_str("reentry_policy = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_rejects_inverted_cutoffs() {
        let result = TrackerConfig::from_toml_str(
            "late_cutoff = \"18:00\"\novertime_cutoff = \"17:00\"\n",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_clock() {
        let result = TrackerConfig::from_toml_str("late_cutoff = \"half past eight\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_root_folder_wins() {
        let config = TrackerConfig {
            root_folder: Some(PathBuf::from("/from/config")),
            ..TrackerConfig::default()
        };
        let root = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_database_path() {
        assert_eq!(
            database_path(Path::new("/srv/rollcall")),
            PathBuf::from("/srv/rollcall/rollcall.db")
        );
    }
}
