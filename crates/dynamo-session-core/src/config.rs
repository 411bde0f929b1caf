use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::sid::{SidCodec, MIN_KEY_LEN};

pub const DEFAULT_IDLE_TIMEOUT: u64 = 7200; // two hours
pub const DEFAULT_ABSOLUTE_TIMEOUT: u64 = 43200; // twelve hours
pub const DEFAULT_TABLE: &str = "app_session";
pub const DEFAULT_SESSION_ID_BYTES: usize = 32;

/// Session manager configuration.
///
/// Immutable once handed to a `SessionManager`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Random bytes per session id.
    pub sid_byte_length: usize,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    pub idle_timeout_secs: u64,
    pub absolute_timeout_secs: u64,
    /// Signing secrets, oldest first. The last one signs new ids.
    pub sid_keys: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sid_byte_length: DEFAULT_SESSION_ID_BYTES,
            table_name: DEFAULT_TABLE.to_string(),
            endpoint_url: None,
            region_name: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT,
            absolute_timeout_secs: DEFAULT_ABSOLUTE_TIMEOUT,
            sid_keys: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Default configuration with a single signing key.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            sid_keys: vec![key.into()],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sid_byte_length == 0 {
            return Err(ConfigError::Invalid("sidByteLength must be positive".into()));
        }
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::Invalid("tableName must not be empty".into()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("idleTimeoutSecs must be positive".into()));
        }
        if self.absolute_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "absoluteTimeoutSecs must be positive".into(),
            ));
        }
        if self.sid_keys.is_empty() {
            return Err(ConfigError::NoSigningKey);
        }
        if let Some(idx) = self.sid_keys.iter().position(|k| k.len() < MIN_KEY_LEN) {
            return Err(ConfigError::WeakSigningKey(idx));
        }
        Ok(())
    }

    /// Build the identifier codec for this configuration.
    pub fn sid_codec(&self) -> Result<SidCodec, ConfigError> {
        self.validate()?;
        SidCodec::new(self.sid_byte_length, &self.sid_keys)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("sid_byte_length", &self.sid_byte_length)
            .field("table_name", &self.table_name)
            .field("endpoint_url", &self.endpoint_url)
            .field("region_name", &self.region_name)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("absolute_timeout_secs", &self.absolute_timeout_secs)
            .field("sid_keys", &format_args!("[{} redacted]", self.sid_keys.len()))
            .finish()
    }
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `DYNAMO_SESSION_CONFIG` env var: full JSON config
/// 2. Individual env vars (merged on top of the file config)
/// 3. File fallback (`~/.dynamo-session/config.json`)
pub fn load_config_from_env() -> SessionConfig {
    if let Ok(json) = std::env::var("DYNAMO_SESSION_CONFIG") {
        match serde_json::from_str::<SessionConfig>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse DYNAMO_SESSION_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg);
    cfg
}

/// Overlay individual `DYNAMO_SESSION_*` variables onto `cfg`.
pub fn apply_env_overrides(cfg: &mut SessionConfig) {
    if let Ok(v) = std::env::var("DYNAMO_SESSION_TABLE") {
        cfg.table_name = v;
    }
    if let Ok(v) = std::env::var("DYNAMO_SESSION_ENDPOINT") {
        cfg.endpoint_url = Some(v);
    }
    if let Ok(v) = std::env::var("AWS_REGION") {
        cfg.region_name = Some(v);
    }
    if let Ok(v) = std::env::var("DYNAMO_SESSION_KEYS") {
        cfg.sid_keys = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    parse_env("DYNAMO_SESSION_IDLE_TIMEOUT", &mut cfg.idle_timeout_secs);
    parse_env("DYNAMO_SESSION_ABSOLUTE_TIMEOUT", &mut cfg.absolute_timeout_secs);
    parse_env("DYNAMO_SESSION_SID_BYTES", &mut cfg.sid_byte_length);
}

fn parse_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(v) = std::env::var(name) {
        match v.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Ignoring {}: not a number: {}", name, v),
        }
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dynamo-session")
        .join("config.json")
}

/// Load configuration from file or fall back to defaults.
///
/// A missing file is silent; an unreadable or unparsable one logs a warning.
pub fn load_config(config_path: Option<&Path>) -> SessionConfig {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path);
    if !path.exists() {
        return SessionConfig::default();
    }

    read_config(&path).unwrap_or_else(|e| {
        tracing::warn!(
            "Ignoring config at {} ({}); using defaults",
            path.display(),
            e
        );
        SessionConfig::default()
    })
}

fn read_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Save configuration to file.
pub fn save_config(config: &SessionConfig, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "config-test-signing-key";

    #[test]
    fn test_default_config() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.sid_byte_length, 32);
        assert_eq!(cfg.table_name, "app_session");
        assert_eq!(cfg.idle_timeout_secs, 7200);
        assert_eq!(cfg.absolute_timeout_secs, 43200);
        assert!(cfg.endpoint_url.is_none());
        assert!(cfg.region_name.is_none());
        assert!(cfg.sid_keys.is_empty());
    }

    #[test]
    fn test_default_config_needs_key() {
        assert!(matches!(
            SessionConfig::default().validate(),
            Err(ConfigError::NoSigningKey)
        ));
        assert!(SessionConfig::with_key(KEY).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = SessionConfig::with_key(KEY);
        cfg.idle_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SessionConfig::with_key(KEY);
        cfg.absolute_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SessionConfig::with_key(KEY);
        cfg.sid_byte_length = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SessionConfig::with_key(KEY);
        cfg.table_name = " ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = SessionConfig::with_key(KEY);
        cfg.sid_keys.push("weak".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::WeakSigningKey(1))));
    }

    #[test]
    fn test_config_camelcase_compat() {
        let json = r#"{
            "sidByteLength": 24,
            "tableName": "sessions",
            "endpointUrl": "http://localhost:8000",
            "regionName": "us-east-1",
            "idleTimeoutSecs": 30,
            "sidKeys": ["first-secret-0123456789", "second-secret-0123456789"]
        }"#;
        let cfg: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.sid_byte_length, 24);
        assert_eq!(cfg.table_name, "sessions");
        assert_eq!(cfg.endpoint_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(cfg.region_name.as_deref(), Some("us-east-1"));
        assert_eq!(cfg.idle_timeout_secs, 30);
        // Unset fields keep their defaults.
        assert_eq!(cfg.absolute_timeout_secs, 43200);
        assert_eq!(cfg.sid_keys.len(), 2);
        assert_eq!(cfg.sid_codec().unwrap().byte_length(), 24);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let cfg = SessionConfig::with_key(KEY);
        let debug = format!("{cfg:?}");
        assert!(!debug.contains(KEY));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_save_and_load_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut cfg = SessionConfig::with_key(KEY);
        cfg.table_name = "test-table".to_string();
        save_config(&cfg, Some(path.as_path())).unwrap();

        assert!(path.exists());
        let loaded = load_config(Some(path.as_path()));
        assert_eq!(loaded.table_name, "test-table");
        assert_eq!(loaded.sid_keys, vec![KEY.to_string()]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(tmp.path().join("missing.json").as_path()));
        assert_eq!(cfg.table_name, DEFAULT_TABLE);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cfg = load_config(Some(path.as_path()));
        assert_eq!(cfg.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn test_read_config_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(read_config(tmp.path()), Err(ConfigError::Io(_))));

        let path = tmp.path().join("config.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        // The directory exists, so loading it falls back to defaults.
        assert_eq!(load_config(Some(tmp.path())).table_name, DEFAULT_TABLE);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("DYNAMO_SESSION_TABLE", "env-table");
        std::env::set_var("DYNAMO_SESSION_KEYS", "env-secret-0123456789, , other-secret-0123456789");
        std::env::set_var("DYNAMO_SESSION_IDLE_TIMEOUT", "60");
        std::env::set_var("DYNAMO_SESSION_ABSOLUTE_TIMEOUT", "not-a-number");

        let mut cfg = SessionConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.table_name, "env-table");
        assert_eq!(
            cfg.sid_keys,
            vec!["env-secret-0123456789", "other-secret-0123456789"]
        );
        assert_eq!(cfg.idle_timeout_secs, 60);
        assert_eq!(cfg.absolute_timeout_secs, DEFAULT_ABSOLUTE_TIMEOUT);

        std::env::remove_var("DYNAMO_SESSION_TABLE");
        std::env::remove_var("DYNAMO_SESSION_KEYS");
        std::env::remove_var("DYNAMO_SESSION_IDLE_TIMEOUT");
        std::env::remove_var("DYNAMO_SESSION_ABSOLUTE_TIMEOUT");
    }
}
