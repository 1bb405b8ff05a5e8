//! Configuration – reads/writes `~/.cortex/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cortex_runtime::CoordinatorConfig;

/// Persisted user configuration stored in `~/.cortex/config.toml`.
///
/// Paths may start with `~/`, expanded against the home directory at use.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_working_memory_capacity")]
    pub working_memory_capacity: usize,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Failures tolerated before a task is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_urgency_factor")]
    pub urgency_factor: f64,

    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    /// Upper bound for a single dispatch; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_timeout_ms: Option<u64>,

    /// Directory holding the SQLite memory database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Plain-text error log.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Logs untouched for longer than this are moved to `archive/` at startup.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// Base URL of the OpenAI-compatible model server.
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Bearer token for hosted endpoints (stored as plain text; the file is
    /// written owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub llm_api_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("working_memory_capacity", &self.working_memory_capacity)
            .field("cache_capacity", &self.cache_capacity)
            .field("max_retries", &self.max_retries)
            .field("urgency_factor", &self.urgency_factor)
            .field("decay_factor", &self.decay_factor)
            .field("dispatch_timeout_ms", &self.dispatch_timeout_ms)
            .field("data_dir", &self.data_dir)
            .field("log_file", &self.log_file)
            .field("log_retention_days", &self.log_retention_days)
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                if self.llm_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

fn default_working_memory_capacity() -> usize {
    20
}
fn default_cache_capacity() -> usize {
    50
}
fn default_max_retries() -> u32 {
    3
}
fn default_urgency_factor() -> f64 {
    1.5
}
fn default_decay_factor() -> f64 {
    0.9
}
fn default_data_dir() -> String {
    "~/.cortex/data".to_string()
}
fn default_log_file() -> String {
    "~/.cortex/logs/system_log.txt".to_string()
}
fn default_log_retention_days() -> u32 {
    7
}
fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_memory_capacity: default_working_memory_capacity(),
            cache_capacity: default_cache_capacity(),
            max_retries: default_max_retries(),
            urgency_factor: default_urgency_factor(),
            decay_factor: default_decay_factor(),
            dispatch_timeout_ms: None,
            data_dir: default_data_dir(),
            log_file: default_log_file(),
            log_retention_days: default_log_retention_days(),
            llm_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_api_key: String::new(),
        }
    }
}

impl Config {
    /// Settings for the coordination core.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            working_memory_capacity: self.working_memory_capacity,
            cache_capacity: self.cache_capacity,
            max_retries: self.max_retries,
            urgency_factor: self.urgency_factor,
            decay_factor: self.decay_factor,
            dispatch_timeout: self.dispatch_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn data_dir_in(&self, home: &str) -> PathBuf {
        expand_home(&self.data_dir, home)
    }

    pub fn log_file_in(&self, home: &str) -> PathBuf {
        expand_home(&self.log_file, home)
    }

    /// `None` when no API key is configured.
    pub fn api_key(&self) -> Option<String> {
        (!self.llm_api_key.is_empty()).then(|| self.llm_api_key.clone())
    }
}

/// Resolve a leading `~/` against `home`.
pub(crate) fn expand_home(path: &str, home: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => Path::new(home).join(rest),
        None if path == "~" => PathBuf::from(home),
        None => PathBuf::from(path),
    }
}

/// The user's home directory, or `.` when it cannot be determined.
pub fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return the path to `~/.cortex/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cortex").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `CORTEX_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CORTEX_WORKING_MEMORY_CAPACITY` | `working_memory_capacity` |
/// | `CORTEX_CACHE_CAPACITY` | `cache_capacity` |
/// | `CORTEX_MAX_RETRIES` | `max_retries` |
/// | `CORTEX_DISPATCH_TIMEOUT_MS` | `dispatch_timeout_ms` |
/// | `CORTEX_DATA_DIR` | `data_dir` |
/// | `CORTEX_LOG_FILE` | `log_file` |
/// | `CORTEX_LLM_URL` | `llm_url` |
/// | `CORTEX_MODEL` | `llm_model` |
/// | `CORTEX_API_KEY` | `llm_api_key` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    parse_var(&lookup, "CORTEX_WORKING_MEMORY_CAPACITY", &mut cfg.working_memory_capacity);
    parse_var(&lookup, "CORTEX_CACHE_CAPACITY", &mut cfg.cache_capacity);
    parse_var(&lookup, "CORTEX_MAX_RETRIES", &mut cfg.max_retries);
    if let Some(ms) = lookup("CORTEX_DISPATCH_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        cfg.dispatch_timeout_ms = Some(ms);
    }
    if let Some(v) = lookup("CORTEX_DATA_DIR") {
        cfg.data_dir = v;
    }
    if let Some(v) = lookup("CORTEX_LOG_FILE") {
        cfg.log_file = v;
    }
    if let Some(v) = lookup("CORTEX_LLM_URL") {
        cfg.llm_url = v;
    }
    if let Some(v) = lookup("CORTEX_MODEL") {
        cfg.llm_model = v;
    }
    if let Some(v) = lookup("CORTEX_API_KEY") {
        cfg.llm_api_key = v;
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) {
    if let Some(v) = lookup(name).and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

/// Save the config to disk, creating `~/.cortex/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
