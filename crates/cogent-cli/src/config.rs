//! Settings file – reads/writes `~/.cogent/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cogent_runtime::{RuntimeConfig, SchedulingMode};

/// Persisted settings for the demo system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// `pool` or `sequential`.
    #[serde(default)]
    pub scheduling: SchedulingMode,

    /// Agents in the relay ring (at least two).
    #[serde(default = "default_agents")]
    pub agents: usize,

    /// Laps the token travels before the ring shuts down.
    #[serde(default = "default_laps")]
    pub laps: u32,

    /// Terminate every agent after this many rounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u64>,

    #[serde(default = "default_sleep_timeout_ms")]
    pub sleep_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub sleep_on_no_change: bool,
}

fn default_agents() -> usize {
    3
}
fn default_laps() -> u32 {
    2
}
fn default_sleep_timeout_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduling: SchedulingMode::default(),
            agents: default_agents(),
            laps: default_laps(),
            max_rounds: None,
            sleep_timeout_ms: default_sleep_timeout_ms(),
            sleep_on_no_change: default_true(),
        }
    }
}

impl Config {
    pub fn to_runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            scheduling: self.scheduling,
            sleep_timeout: Duration::from_millis(self.sleep_timeout_ms),
            sleep_on_no_change: self.sleep_on_no_change,
            max_rounds: self.max_rounds,
            ..RuntimeConfig::default()
        }
    }
}

/// Return the path to `~/.cogent/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cogent").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `COGENT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `COGENT_SCHEDULING` | `scheduling` |
/// | `COGENT_AGENTS` | `agents` |
/// | `COGENT_LAPS` | `laps` |
/// | `COGENT_MAX_ROUNDS` | `max_rounds` |
/// | `COGENT_SLEEP_TIMEOUT_MS` | `sleep_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Unparseable values are ignored.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("COGENT_SCHEDULING")
        && let Ok(mode) = v.parse::<SchedulingMode>()
    {
        cfg.scheduling = mode;
    }
    if let Some(v) = lookup("COGENT_AGENTS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.agents = n;
    }
    if let Some(v) = lookup("COGENT_LAPS")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.laps = n;
    }
    if let Some(v) = lookup("COGENT_MAX_ROUNDS")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.max_rounds = Some(n);
    }
    if let Some(v) = lookup("COGENT_SLEEP_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.sleep_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.cogent/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
