use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WamiError};
use crate::intent::DEFAULT_RESIZE_WIDTH;

pub const CONFIG_FILE: &str = "config.json";
pub const FLOWS_FILE: &str = "flows.json";
pub const TRANSFER_CACHE_FILE: &str = "transfer-cache.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const DEFAULT_HOME: &str = ".wami";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WamiConfig {
    /// Run the resolved flow automatically after a share is ingested.
    pub auto_process_shares: bool,
    pub auto_run_delay_ms: u64,
    pub default_resize_width: i64,
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_command: Option<String>,
}

impl Default for WamiConfig {
    fn default() -> Self {
        Self {
            auto_process_shares: true,
            auto_run_delay_ms: 500,
            default_resize_width: DEFAULT_RESIZE_WIDTH,
            engine: "dryrun".to_string(),
            engine_command: None,
        }
    }
}

impl WamiConfig {
    /// Defaults, then `<home>/config.json`, then `WAMI_*` environment overrides.
    pub fn load(home: &Path) -> Result<Self> {
        let mut config = Self::read_file(&home.join(CONFIG_FILE))?;
        config.apply_env(non_empty_env)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file missing, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|err| WamiError::InvalidConfig(format!("{}: {err}", path.display())))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("WAMI_AUTO_PROCESS") {
            self.auto_process_shares = parse_bool(&raw).ok_or_else(|| {
                WamiError::InvalidConfig(format!("WAMI_AUTO_PROCESS: expected a boolean, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("WAMI_AUTO_RUN_DELAY_MS") {
            self.auto_run_delay_ms = raw.parse().map_err(|_| {
                WamiError::InvalidConfig(format!("WAMI_AUTO_RUN_DELAY_MS: not a number: '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("WAMI_ENGINE") {
            self.engine = raw;
        }
        if let Some(raw) = lookup("WAMI_ENGINE_COMMAND") {
            self.engine_command = Some(raw);
        }
        if self.default_resize_width <= 0 {
            return Err(WamiError::InvalidConfig(
                "default_resize_width must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// `--home`, else `WAMI_HOME`, else `./.wami`.
pub fn resolve_home(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| non_empty_env("WAMI_HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{WamiConfig, CONFIG_FILE};
    use crate::error::WamiError;

    #[test]
    fn missing_file_yields_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = WamiConfig::read_file(&temp.path().join(CONFIG_FILE))?;
        assert_eq!(config, WamiConfig::default());
        assert!(config.auto_process_shares);
        assert_eq!(config.default_resize_width, 1000);
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"auto_process_shares": false}"#)?;
        let config = WamiConfig::read_file(&path)?;
        assert!(!config.auto_process_shares);
        assert_eq!(config.auto_run_delay_ms, 500);
        assert_eq!(config.engine, "dryrun");
        Ok(())
    }

    #[test]
    fn malformed_file_is_invalid_config() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "[1,2")?;
        assert!(matches!(
            WamiConfig::read_file(&path),
            Err(WamiError::InvalidConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn env_overrides_apply_after_file() -> anyhow::Result<()> {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WAMI_AUTO_PROCESS", "off"),
            ("WAMI_AUTO_RUN_DELAY_MS", "25"),
            ("WAMI_ENGINE", "process"),
        ]);
        let mut config = WamiConfig::default();
        config.apply_env(|key| vars.get(key).map(|value| value.to_string()))?;
        assert!(!config.auto_process_shares);
        assert_eq!(config.auto_run_delay_ms, 25);
        assert_eq!(config.engine, "process");
        assert_eq!(config.engine_command, None);
        Ok(())
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = WamiConfig::default();
        let result = config.apply_env(|key| (key == "WAMI_AUTO_PROCESS").then(|| "maybe".to_string()));
        assert!(matches!(result, Err(WamiError::InvalidConfig(_))));
    }
}
