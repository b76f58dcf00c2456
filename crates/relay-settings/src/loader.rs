//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target), except where a
//!   field is itself optional (see [`NULLABLE_KEYS`])

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{DeliveryMode, EmbeddingBackend, FailureScope, LogFormat, RelaySettings};

/// Keys whose `null` in the user file means "disable", not "keep default".
const NULLABLE_KEYS: &[&str] = &["idleShutdownAfter"];

/// Resolve the path to the settings file (`~/.embed-relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".embed-relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() && !NULLABLE_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RELAY_*` environment variable overrides.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_with(settings, &|name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
pub fn apply_overrides_with(settings: &mut RelaySettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("RELAY_PORT", |s| parse_u64_range(s, 0, 65535)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = env.parsed("RELAY_ACCEPT_TIMEOUT_MS", |s| parse_u64_range(s, 1, 600_000)) {
        settings.server.accept_timeout_ms = v;
    }
    if let Some(v) = env.string("RELAY_IDLE_SHUTDOWN_AFTER") {
        match parse_idle_limit(&v) {
            Some(limit) => settings.server.idle_shutdown_after = limit,
            None => tracing::warn!(key = "RELAY_IDLE_SHUTDOWN_AFTER", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = env.parsed("RELAY_DELIVERY_MODE", parse_delivery_mode) {
        settings.server.delivery_mode = v;
    }
    if let Some(v) = env.parsed("RELAY_FAILURE_SCOPE", parse_failure_scope) {
        settings.server.failure_scope = v;
    }

    // ── Embedding ───────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_MODEL") {
        settings.embedding.model = v;
    }
    if let Some(v) = env.parsed("RELAY_EMBEDDING_BACKEND", parse_backend) {
        settings.embedding.backend = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("RELAY_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse an idle limit: a positive count, or `off`/`none`/`0` to disable.
pub fn parse_idle_limit(val: &str) -> Option<Option<u32>> {
    match val.to_lowercase().as_str() {
        "off" | "none" | "0" => Some(None),
        other => other.parse::<u32>().ok().map(Some),
    }
}

/// Parse a delivery mode (`shared` or `per-session`/`perSession`).
pub fn parse_delivery_mode(val: &str) -> Option<DeliveryMode> {
    match val.to_lowercase().replace(['-', '_'], "").as_str() {
        "shared" => Some(DeliveryMode::Shared),
        "persession" => Some(DeliveryMode::PerSession),
        _ => None,
    }
}

/// Parse a failure scope (`global` or `session`).
pub fn parse_failure_scope(val: &str) -> Option<FailureScope> {
    match val.to_lowercase().as_str() {
        "global" => Some(FailureScope::Global),
        "session" => Some(FailureScope::Session),
        _ => None,
    }
}

/// Parse an embedding backend (`onnx` or `mock`).
pub fn parse_backend(val: &str) -> Option<EmbeddingBackend> {
    match val.to_lowercase().as_str() {
        "onnx" => Some(EmbeddingBackend::Onnx),
        "mock" => Some(EmbeddingBackend::Mock),
        _ => None,
    }
}

/// Parse a log format (`pretty` or `json`).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn with_vars(pairs: &[(&str, &str)]) -> RelaySettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = RelaySettings::default();
        apply_overrides_with(&mut settings, &|name| vars.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 5096, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_null_clears_nullable_key() {
        let target = serde_json::json!({"server": {"idleShutdownAfter": 3}});
        let source = serde_json::json!({"server": {"idleShutdownAfter": null}});
        let merged = deep_merge(target, source);
        assert!(merged["server"]["idleShutdownAfter"].is_null());
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 5096);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 7001, "deliveryMode": "perSession"}, "logging": {"format": "json"}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 7001);
        assert_eq!(settings.server.delivery_mode, DeliveryMode::PerSession);
        assert_eq!(settings.server.accept_timeout_ms, 5000);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn load_null_idle_limit_disables_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"idleShutdownAfter": null}}"#).unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.idle_shutdown_after, None);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(load_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"acceptTimeoutMs": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_server() {
        let settings = with_vars(&[
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_PORT", "6001"),
            ("RELAY_DELIVERY_MODE", "per-session"),
            ("RELAY_FAILURE_SCOPE", "session"),
            ("RELAY_IDLE_SHUTDOWN_AFTER", "off"),
        ]);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 6001);
        assert_eq!(settings.server.delivery_mode, DeliveryMode::PerSession);
        assert_eq!(settings.server.failure_scope, FailureScope::Session);
        assert_eq!(settings.server.idle_shutdown_after, None);
    }

    #[test]
    fn env_overrides_embedding_and_logging() {
        let settings = with_vars(&[
            ("RELAY_MODEL", "sentence-transformers/all-MiniLM-L6-v2"),
            ("RELAY_EMBEDDING_BACKEND", "mock"),
            ("RELAY_LOG_LEVEL", "debug"),
            ("RELAY_LOG_FORMAT", "json"),
        ]);
        assert_eq!(settings.embedding.model, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(settings.embedding.backend, EmbeddingBackend::Mock);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let settings = with_vars(&[
            ("RELAY_PORT", "99999"),
            ("RELAY_DELIVERY_MODE", "broadcast"),
            ("RELAY_ACCEPT_TIMEOUT_MS", "0"),
        ]);
        assert_eq!(settings.server.port, 5096);
        assert_eq!(settings.server.delivery_mode, DeliveryMode::Shared);
        assert_eq!(settings.server.accept_timeout_ms, 5000);
    }

    #[test]
    fn empty_env_values_ignored() {
        let settings = with_vars(&[("RELAY_HOST", "")]);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn idle_limit_parsing() {
        assert_eq!(parse_idle_limit("5"), Some(Some(5)));
        assert_eq!(parse_idle_limit("none"), Some(None));
        assert_eq!(parse_idle_limit("0"), Some(None));
        assert_eq!(parse_idle_limit("-1"), None);
    }

    #[test]
    fn u64_range_parsing() {
        assert_eq!(parse_u64_range("10", 1, 20), Some(10));
        assert_eq!(parse_u64_range("0", 1, 20), None);
        assert_eq!(parse_u64_range("abc", 1, 20), None);
    }
}
