//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `TASKDESK_API_URL` is not set, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Falls back to [`Config::default`] when no file exists
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! - `TASKDESK_API_URL`: API base URL (required to select env mode)
//! - `TASKDESK_TIMEOUT_MS`: Per-attempt timeout in milliseconds
//! - `TASKDESK_MAX_RETRIES`: Retries after the first attempt
//! - `TASKDESK_MAX_CONCURRENT`: Concurrent network attempts
//! - `TASKDESK_CLIENT_VERSION`: Value of `X-Client-Version`
//! - `TASKDESK_STORAGE_PATH`: Session file path (file backend)
//! - `TASKDESK_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! The loader searches the following names, in order, in the current working
//! directory, its parent and grandparent, then next to the executable:
//! `taskdesk.toml`, `taskdesk.json`, `config.toml`, `config.json`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use taskdesk_domain::{Config, Result, TaskdeskError};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["taskdesk.toml", "taskdesk.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `TaskdeskError::Config` if:
/// - An environment variable or config file holds an invalid value
/// - The resulting configuration fails validation
pub fn load() -> Result<Config> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Environment configuration unavailable, trying file");
            match discover_config_path() {
                Some(path) => load_from_file(Some(path))?,
                None => {
                    tracing::info!("No config file found, using defaults");
                    Config::default()
                }
            }
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `TASKDESK_API_URL` must be present; every other setting falls back to
/// its default when unset.
///
/// # Errors
/// Returns `TaskdeskError::Config` if `TASKDESK_API_URL` is missing or a
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    config.api.base_url = env_var("TASKDESK_API_URL")?;

    if let Some(timeout_ms) = env_parse::<u64>("TASKDESK_TIMEOUT_MS")? {
        config.api.timeout_ms = timeout_ms;
    }
    if let Some(max_retries) = env_parse::<u32>("TASKDESK_MAX_RETRIES")? {
        config.retry.max_retries = max_retries;
    }
    if let Some(max_concurrent) = env_parse::<usize>("TASKDESK_MAX_CONCURRENT")? {
        config.throttle.max_concurrent = max_concurrent;
    }
    if let Ok(client_version) = std::env::var("TASKDESK_CLIENT_VERSION") {
        config.api.client_version = client_version;
    }
    if let Ok(path) = std::env::var("TASKDESK_STORAGE_PATH") {
        config.storage.path = path;
    }
    config.logging.json = env_bool("TASKDESK_LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches several locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Missing fields take their defaults.
///
/// # Errors
/// Returns `TaskdeskError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TaskdeskError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => discover_config_path().ok_or_else(|| {
            TaskdeskError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TaskdeskError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `TaskdeskError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TaskdeskError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TaskdeskError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(TaskdeskError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn discover_config_path() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
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

/// Get required environment variable
///
/// # Errors
/// Returns `TaskdeskError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        TaskdeskError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional numeric environment variable
///
/// # Errors
/// Returns `TaskdeskError::Config` if the variable is set but not a valid
/// number.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TaskdeskError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(None),
    }
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
    use taskdesk_domain::StorageBackend;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: [&str; 7] = [
        "TASKDESK_API_URL",
        "TASKDESK_TIMEOUT_MS",
        "TASKDESK_MAX_RETRIES",
        "TASKDESK_MAX_CONCURRENT",
        "TASKDESK_CLIENT_VERSION",
        "TASKDESK_STORAGE_PATH",
        "TASKDESK_LOG_JSON",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn write_temp(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for value in ["1", "true", "yes", "on", "TRUE"] {
            std::env::set_var("TASKDESK_TEST_BOOL", value);
            assert!(env_bool("TASKDESK_TEST_BOOL", false), "{value}");
        }
        for value in ["0", "false", "no", "off"] {
            std::env::set_var("TASKDESK_TEST_BOOL", value);
            assert!(!env_bool("TASKDESK_TEST_BOOL", true), "{value}");
        }

        std::env::remove_var("TASKDESK_TEST_BOOL");
        assert!(env_bool("TASKDESK_TEST_BOOL", true));
        assert!(!env_bool("TASKDESK_TEST_BOOL", false));
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("TASKDESK_API_URL", "https://tasks.example.com/api");
        std::env::set_var("TASKDESK_TIMEOUT_MS", "5000");
        std::env::set_var("TASKDESK_MAX_RETRIES", "5");
        std::env::set_var("TASKDESK_MAX_CONCURRENT", "4");
        std::env::set_var("TASKDESK_CLIENT_VERSION", "2.1.0");
        std::env::set_var("TASKDESK_STORAGE_PATH", "/tmp/taskdesk/session.json");
        std::env::set_var("TASKDESK_LOG_JSON", "true");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(config.api.base_url, "https://tasks.example.com/api");
        assert_eq!(config.api.timeout_ms, 5000);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.throttle.max_concurrent, 4);
        assert_eq!(config.api.client_version, "2.1.0");
        assert_eq!(config.storage.path, "/tmp/taskdesk/session.json");
        assert!(config.logging.json);
        // Untouched settings keep their defaults.
        assert_eq!(config.session.refresh_threshold_secs, 300);
    }

    #[test]
    fn test_load_from_env_missing_url() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, TaskdeskError::Config(_)), "Should be a Config error");
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("TASKDESK_API_URL", "https://tasks.example.com/api");
        std::env::set_var("TASKDESK_MAX_CONCURRENT", "lots");

        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(TaskdeskError::Config(_))));
    }

    #[test]
    fn test_load_validates_env_config() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("TASKDESK_API_URL", "https://tasks.example.com/api");
        std::env::set_var("TASKDESK_MAX_CONCURRENT", "0");

        let result = load();
        clear_env();

        assert!(matches!(result, Err(TaskdeskError::Config(_))));
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = write_temp(
            r#"
[api]
base_url = "https://tasks.example.com/api"
timeout_ms = 10000

[retry]
max_retries = 1

[storage]
backend = "memory"
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).expect("config from TOML");
        std::fs::remove_file(path).ok();

        assert_eq!(config.api.base_url, "https://tasks.example.com/api");
        assert_eq!(config.api.timeout_ms, 10_000);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.throttle.max_concurrent, 10);
    }

    #[test]
    fn test_load_from_file_json() {
        let path = write_temp(
            r#"{ "dedup": { "enabled": false }, "session": { "poll_interval_secs": 30 } }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).expect("config from JSON");
        std::fs::remove_file(path).ok();

        assert!(!config.dedup.enabled);
        assert_eq!(config.session.poll_interval_secs, 30);
        assert_eq!(config.api.base_url, "http://localhost:5000/api");
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/taskdesk.toml")));
        assert!(matches!(result, Err(TaskdeskError::Config(_))));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = write_temp(r#"{ "api": { "timeout_ms": "soon" "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(result, Err(TaskdeskError::Config(_))));
    }

    #[test]
    fn test_parse_config_unsupported_extension() {
        let result = parse_config("api: {}", Path::new("taskdesk.yaml"));
        assert!(matches!(result, Err(TaskdeskError::Config(_))));
    }
}
