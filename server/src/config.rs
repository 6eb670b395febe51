//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tierward_common::LevelTable;

use crate::engine::{
    GroupMapping, DEFAULT_COMMAND_PREFIX, DEFAULT_LOWOP_GROUP, DEFAULT_OP_GROUP,
    DEFAULT_PLAYER_GROUP,
};

/// Name of the persisted player state file inside `data_dir`.
pub const STATE_FILE: &str = "player_states.json";

/// Name of the persisted audit log inside `data_dir`.
pub const AUDIT_FILE: &str = "audit_log.json";

/// How engine commands are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Run the external launcher.
    Process,
    /// In-process engine, for dry runs.
    Simulated,
}

impl FromStr for EngineMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "simulated" => Ok(Self::Simulated),
            other => bail!("ENGINE_MODE must be `process` or `simulated`, got `{other}`"),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "127.0.0.1:8085")
    pub bind_address: SocketAddr,

    /// Directory holding the state and audit files
    pub data_dir: PathBuf,

    /// Engine group per level
    pub groups: LevelTable<String>,

    /// Record audit entries at all (default: true)
    pub audit_log_enabled: bool,

    /// Audit entries kept in memory and on disk (default: 1000)
    pub audit_max_entries: usize,

    /// Prune audit entries older than this many days on autosave; 0 disables
    pub audit_retention_days: i64,

    /// Seconds between periodic flushes (default: 300)
    pub auto_save_interval: u64,

    /// Flush after every write (default: true)
    pub persist_on_write: bool,

    /// Pause between users in a batch, in milliseconds (default: 100)
    pub batch_delay_ms: u64,

    /// Largest accepted batch (default: 10)
    pub batch_max_users: usize,

    /// Seconds between health checks (default: 300)
    pub health_check_interval: u64,

    /// Memory use, in percent of the limit, considered unhealthy (default: 90)
    pub memory_threshold_percent: f64,

    /// Level-changing commands per second per actor; 0 disables (default: 3)
    pub rate_limit: u32,

    /// Engine backend
    pub engine_mode: EngineMode,

    /// Launcher for engine commands, split on whitespace (default: "mcrcon")
    pub engine_exec: String,

    /// Leading word of every engine command (default: "lp")
    pub engine_command_prefix: String,
}

/// Read a variable, treating unset and blank the same.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bind_address = var("BIND_ADDRESS")
            .unwrap_or_else(|| "127.0.0.1:8085".into())
            .parse()
            .context("BIND_ADDRESS must be a socket address")?;
        let engine_mode = var("ENGINE_MODE")
            .map_or(Ok(EngineMode::Process), |v| v.parse())?;

        let config = Self {
            bind_address,
            data_dir: var("DATA_DIR").map_or_else(|| PathBuf::from("./data"), PathBuf::from),
            groups: groups_from_env(),
            audit_log_enabled: parsed("AUDIT_LOG_ENABLED", true),
            audit_max_entries: parsed("AUDIT_MAX_ENTRIES", 1000),
            audit_retention_days: parsed("AUDIT_RETENTION_DAYS", 0),
            auto_save_interval: parsed("AUTO_SAVE_INTERVAL", 300),
            persist_on_write: parsed("PERSIST_ON_WRITE", true),
            batch_delay_ms: parsed("BATCH_DELAY_MS", 100),
            batch_max_users: parsed("BATCH_MAX_USERS", 10),
            health_check_interval: parsed("HEALTH_CHECK_INTERVAL", 300),
            memory_threshold_percent: parsed("MEMORY_THRESHOLD_PERCENT", 90.0),
            rate_limit: parsed("RATE_LIMIT", 3),
            engine_mode,
            engine_exec: var("ENGINE_EXEC").unwrap_or_else(|| "mcrcon".into()),
            engine_command_prefix: var("ENGINE_COMMAND_PREFIX")
                .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.into()),
        };

        config
            .group_mapping()
            .context("PLAYER_GROUP, LOWOP_GROUP and OP_GROUP must be valid")?;
        if config.audit_max_entries == 0 {
            bail!("AUDIT_MAX_ENTRIES must be at least 1");
        }
        if config.batch_max_users == 0 {
            bail!("BATCH_MAX_USERS must be at least 1");
        }
        Ok(config)
    }

    /// Validated group mapping.
    pub fn group_mapping(&self) -> Result<GroupMapping, crate::engine::EngineError> {
        GroupMapping::new(self.groups.clone())
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_FILE)
    }

    pub const fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval)
    }

    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    /// Create a default config for testing.
    pub fn default_for_test(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: data_dir.into(),
            groups: LevelTable::new(
                DEFAULT_PLAYER_GROUP.into(),
                DEFAULT_LOWOP_GROUP.into(),
                DEFAULT_OP_GROUP.into(),
            ),
            audit_log_enabled: true,
            audit_max_entries: 1000,
            audit_retention_days: 0,
            auto_save_interval: 300,
            persist_on_write: true,
            batch_delay_ms: 0,
            batch_max_users: 10,
            health_check_interval: 300,
            memory_threshold_percent: 90.0,
            rate_limit: 0,
            engine_mode: EngineMode::Simulated,
            engine_exec: "mcrcon".into(),
            engine_command_prefix: DEFAULT_COMMAND_PREFIX.into(),
        }
    }
}

/// Level → group names from `PLAYER_GROUP`, `LOWOP_GROUP` and `OP_GROUP`.
///
/// Re-read on reload, so it does not go through [`Config`].
pub fn groups_from_env() -> LevelTable<String> {
    LevelTable::new(
        var("PLAYER_GROUP").unwrap_or_else(|| DEFAULT_PLAYER_GROUP.into()),
        var("LOWOP_GROUP").unwrap_or_else(|| DEFAULT_LOWOP_GROUP.into()),
        var("OP_GROUP").unwrap_or_else(|| DEFAULT_OP_GROUP.into()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "DATA_DIR",
        "PLAYER_GROUP",
        "LOWOP_GROUP",
        "OP_GROUP",
        "AUDIT_MAX_ENTRIES",
        "RATE_LIMIT",
        "ENGINE_MODE",
        "PERSIST_ON_WRITE",
    ];

    fn clear_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8085");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.groups.lowop, "otherop");
        assert_eq!(config.audit_max_entries, 1000);
        assert_eq!(config.rate_limit, 3);
        assert_eq!(config.engine_mode, EngineMode::Process);
        assert!(config.persist_on_write);
        assert_eq!(config.state_path(), PathBuf::from("./data/player_states.json"));
    }

    #[test]
    #[serial]
    fn test_overrides_and_blank_values() {
        clear_env();
        env::set_var("OP_GROUP", "admin");
        env::set_var("LOWOP_GROUP", "   ");
        env::set_var("RATE_LIMIT", "0");
        env::set_var("ENGINE_MODE", "Simulated");
        env::set_var("PERSIST_ON_WRITE", "false");

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.groups.op, "admin");
        assert_eq!(config.groups.lowop, "otherop");
        assert_eq!(config.rate_limit, 0);
        assert_eq!(config.engine_mode, EngineMode::Simulated);
        assert!(!config.persist_on_write);
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        clear_env();
        env::set_var("OP_GROUP", "default");
        assert!(Config::from_env().is_err());

        clear_env();
        env::set_var("ENGINE_MODE", "telnet");
        assert!(Config::from_env().is_err());

        clear_env();
        env::set_var("BIND_ADDRESS", "not an address");
        assert!(Config::from_env().is_err());
        clear_env();
    }
}
