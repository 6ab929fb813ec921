//! Configuration loader
//!
//! Loads application configuration from a file and environment variables.
//!
//! ## Loading Strategy
//! 1. Explicit path if given, otherwise the first probed config file
//! 2. Built-in defaults when no file exists
//! 3. `FIELDSYNC_*` environment variables override individual fields
//! 4. The result is validated
//!
//! ## Environment Variables
//! - `FIELDSYNC_DB_PATH`: Database file path
//! - `FIELDSYNC_DB_POOL_SIZE`: Connection pool size
//! - `FIELDSYNC_BASE_URL`: Backend base URL
//! - `FIELDSYNC_REQUEST_TIMEOUT_SECS`: Per-attempt request timeout
//! - `FIELDSYNC_MAX_ATTEMPTS`: Attempts before an entry is marked failed
//! - `FIELDSYNC_POLL_INTERVAL_SECS`: Backoff sweep interval
//! - `FIELDSYNC_DEBOUNCE_MS`: Connectivity debounce window
//! - `FIELDSYNC_PROBE_INTERVAL_SECS`: Health probe interval (0 disables)
//! - `FIELDSYNC_LOG_LEVEL`: Log filter used when `RUST_LOG` is unset
//! - `FIELDSYNC_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./fieldsync.toml`, `./fieldsync.json`, `./config.toml`,
//!    `./config.json` (current working directory)
//! 2. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fieldsync_domain::{Config, FieldSyncError, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["fieldsync.toml", "fieldsync.json", "config.toml", "config.json"];

/// Load configuration with the full fallback chain.
///
/// # Errors
/// Returns `FieldSyncError::Config` if:
/// - An explicit `path` does not exist
/// - The file format is invalid
/// - An environment override cannot be parsed
/// - The merged configuration fails validation
pub fn load(path: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_from_file(Some(p))?,
        None => match probe_config_paths() {
            Some(found) => load_from_file(Some(found))?,
            None => {
                tracing::info!("No config file found, using defaults");
                Config::default()
            }
        },
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Defaults plus environment overrides, no file.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. JSON and TOML are
/// detected by file extension. Environment overrides are not applied.
///
/// # Errors
/// Returns `FieldSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FieldSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FieldSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FieldSyncError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Overlay `FIELDSYNC_*` variables onto `config`. Unset variables are left
/// alone.
///
/// # Errors
/// Returns `FieldSyncError::Config` when a numeric variable does not parse.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(path) = env_opt("FIELDSYNC_DB_PATH") {
        config.storage.path = path;
    }
    if let Some(size) = env_parse::<u32>("FIELDSYNC_DB_POOL_SIZE")? {
        config.storage.pool_size = size;
    }
    if let Some(url) = env_opt("FIELDSYNC_BASE_URL") {
        config.server.base_url = url;
    }
    if let Some(secs) = env_parse::<u64>("FIELDSYNC_REQUEST_TIMEOUT_SECS")? {
        config.server.request_timeout_secs = secs;
    }
    if let Some(attempts) = env_parse::<u32>("FIELDSYNC_MAX_ATTEMPTS")? {
        config.sync.max_attempts = attempts;
    }
    if let Some(secs) = env_parse::<u64>("FIELDSYNC_POLL_INTERVAL_SECS")? {
        config.sync.poll_interval_secs = secs;
    }
    if let Some(ms) = env_parse::<u64>("FIELDSYNC_DEBOUNCE_MS")? {
        config.connectivity.debounce_ms = ms;
    }
    if let Some(secs) = env_parse::<u64>("FIELDSYNC_PROBE_INTERVAL_SECS")? {
        config.connectivity.probe_interval_secs = secs;
    }
    if let Some(level) = env_opt("FIELDSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("FIELDSYNC_LOG_JSON", config.logging.json);
    Ok(())
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `FieldSyncError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FieldSyncError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FieldSyncError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(FieldSyncError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the current directory, then the executable directory.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Non-empty environment variable, if set.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| FieldSyncError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
///
/// # Returns
/// The parsed boolean value, or `default` if not set.
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const OVERRIDE_VARS: [&str; 10] = [
        "FIELDSYNC_DB_PATH",
        "FIELDSYNC_DB_POOL_SIZE",
        "FIELDSYNC_BASE_URL",
        "FIELDSYNC_REQUEST_TIMEOUT_SECS",
        "FIELDSYNC_MAX_ATTEMPTS",
        "FIELDSYNC_POLL_INTERVAL_SECS",
        "FIELDSYNC_DEBOUNCE_MS",
        "FIELDSYNC_PROBE_INTERVAL_SECS",
        "FIELDSYNC_LOG_LEVEL",
        "FIELDSYNC_LOG_JSON",
    ];

    fn clear_overrides() {
        for key in OVERRIDE_VARS {
            std::env::remove_var(key);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("FIELDSYNC_TEST_BOOL_YES", "yes");
        std::env::set_var("FIELDSYNC_TEST_BOOL_UPPER", "TRUE");
        std::env::set_var("FIELDSYNC_TEST_BOOL_OFF", "off");

        assert!(env_bool("FIELDSYNC_TEST_BOOL_YES", false));
        assert!(env_bool("FIELDSYNC_TEST_BOOL_UPPER", false));
        assert!(!env_bool("FIELDSYNC_TEST_BOOL_OFF", true));

        std::env::remove_var("FIELDSYNC_TEST_BOOL_MISSING");
        assert!(env_bool("FIELDSYNC_TEST_BOOL_MISSING", true));

        std::env::remove_var("FIELDSYNC_TEST_BOOL_YES");
        std::env::remove_var("FIELDSYNC_TEST_BOOL_UPPER");
        std::env::remove_var("FIELDSYNC_TEST_BOOL_OFF");
    }

    #[test]
    fn test_env_overrides_apply_on_top_of_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_overrides();

        std::env::set_var("FIELDSYNC_DB_PATH", "/tmp/fieldsync-test.db");
        std::env::set_var("FIELDSYNC_BASE_URL", "https://api.example.com");
        std::env::set_var("FIELDSYNC_MAX_ATTEMPTS", "3");
        std::env::set_var("FIELDSYNC_DEBOUNCE_MS", "500");
        std::env::set_var("FIELDSYNC_LOG_JSON", "true");

        let result = load_from_env();
        clear_overrides();

        let config = result.expect("overrides should load");
        assert_eq!(config.storage.path, "/tmp/fieldsync-test.db");
        assert_eq!(config.server.base_url, "https://api.example.com");
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.connectivity.debounce_ms, 500);
        assert!(config.logging.json);
        assert_eq!(config.sync.poll_interval_secs, 30);
    }

    #[test]
    fn test_env_override_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_overrides();

        std::env::set_var("FIELDSYNC_DB_POOL_SIZE", "not-a-number");
        let result = load_from_env();
        clear_overrides();

        assert!(matches!(result, Err(FieldSyncError::Config(_))), "Should be a Config error");
    }

    #[test]
    fn test_env_override_failing_validation() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_overrides();

        std::env::set_var("FIELDSYNC_MAX_ATTEMPTS", "0");
        let result = load_from_env();
        clear_overrides();

        assert!(matches!(result, Err(FieldSyncError::Config(_))));
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = temp_config(
            r#"
[storage]
path = "queue.db"

[sync]
max_attempts = 7

[[operations]]
operation_type = "complete_task"
endpoint = "/api/tasks/complete"
module = "tasks"
method = "PUT"
"#,
            "toml",
        );

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        let config = result.expect("Should load config from TOML file");
        assert_eq!(config.storage.path, "queue.db");
        assert_eq!(config.sync.max_attempts, 7);
        assert_eq!(config.operations.len(), 1);
        assert_eq!(config.operations[0].method, "PUT");
    }

    #[test]
    fn test_load_applies_env_after_file() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_overrides();

        let path = temp_config(r#"{ "sync": { "max_attempts": 7 } }"#, "json");
        std::env::set_var("FIELDSYNC_MAX_ATTEMPTS", "2");

        let result = load(Some(path.clone()));
        clear_overrides();
        std::fs::remove_file(path).ok();

        assert_eq!(result.expect("Should load").sync.max_attempts, 2);
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/fieldsync.toml")));
        assert!(matches!(result, Err(FieldSyncError::Config(_))), "Should be a Config error");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = temp_config(r#"{ "this is": "not valid json" "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(result.is_err(), "Should fail with invalid JSON");
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("storage:\n  path: x", Path::new("fieldsync.yaml"));
        assert!(matches!(result, Err(FieldSyncError::Config(msg)) if msg.contains("yaml")));
    }
}
