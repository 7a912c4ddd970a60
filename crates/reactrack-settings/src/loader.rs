//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ReactrackSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ReactrackSettings;

/// `~/.reactrack`, or `/tmp/.reactrack` when HOME is unset.
pub fn reactrack_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".reactrack")
}

/// Resolve the path to the settings file (`~/.reactrack/settings.json`).
pub fn settings_path() -> PathBuf {
    reactrack_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ReactrackSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ReactrackSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file(path: &Path) -> Result<ReactrackSettings> {
    let defaults = serde_json::to_value(ReactrackSettings::default())?;

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
                if source_val.is_null() {
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid numeric values are logged and ignored.
pub fn apply_env_overrides(settings: &mut ReactrackSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("REACTRACK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("REACTRACK_PORT", 1, 65535) {
        settings.server.port = v;
    }

    // ── Messenger ───────────────────────────────────────────────────
    if let Some(v) = read_env_string("FB_PAGE_TOKEN") {
        settings.messenger.page_token = Some(SecretString::from(v));
    }
    if let Some(v) = read_env_string("FB_VERIFY_TOKEN") {
        settings.messenger.verify_token = Some(SecretString::from(v));
    }
    if let Some(v) = read_env_string("FB_APP_SECRET") {
        settings.messenger.app_secret = Some(SecretString::from(v));
    }
    if let Some(v) = read_env_string("REACTRACK_GRAPH_URL") {
        settings.messenger.graph_base_url = v;
    }

    // ── Fulfillment ─────────────────────────────────────────────────
    if let Some(v) = read_env_string("API_AI_CLIENT_ACCESS_TOKEN") {
        settings.fulfillment.client_token = Some(SecretString::from(v));
    }
    if let Some(v) = read_env_string("REACTRACK_FULFILLMENT_URL") {
        settings.fulfillment.base_url = v;
    }

    // ── Delivery / sessions / store ─────────────────────────────────
    if let Some(v) = read_env_u64("REACTRACK_DELIVERY_SPACING_MS", 0, 60_000) {
        settings.delivery.spacing_ms = v;
    }
    if let Some(v) = read_env_usize("REACTRACK_SESSION_CAPACITY", 1, 10_000_000) {
        settings.sessions.capacity = v;
    }
    if let Some(v) = read_env_string("REACTRACK_DB") {
        settings.store.path = v;
    }

    // ── Telemetry ───────────────────────────────────────────────────
    if let Some(v) = read_env_string("REACTRACK_LOG_LEVEL") {
        settings.telemetry.level = v;
    }
    if let Some(v) = read_env_bool("REACTRACK_LOG_JSON") {
        settings.telemetry.json = v;
    }
}

/// Fail when any credential the process cannot run without is absent.
pub fn validate_required(settings: &ReactrackSettings) -> Result<()> {
    if settings.messenger.page_token.is_none() {
        return Err(SettingsError::Missing("messenger.pageToken (FB_PAGE_TOKEN)"));
    }
    if settings.messenger.verify_token.is_none() {
        return Err(SettingsError::Missing("messenger.verifyToken (FB_VERIFY_TOKEN)"));
    }
    if settings.messenger.app_secret.is_none() {
        return Err(SettingsError::Missing("messenger.appSecret (FB_APP_SECRET)"));
    }
    if settings.fulfillment.client_token.is_none() {
        return Err(SettingsError::Missing(
            "fulfillment.clientToken (API_AI_CLIENT_ACCESS_TOKEN)",
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"host": "0.0.0.0", "port": 5000}});
        let source = json!({"server": {"port": 8080}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
        assert_eq!(merged["server"]["port"], 8080);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [4]}));
        assert_eq!(merged["a"], json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"b": 1}}), json!({"a": 2}));
        assert_eq!(merged["a"], 2);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.delivery.lane_idle_secs, 30);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "delivery": {"spacingMs": 250},
                "messenger": {"pageToken": "page", "sendApiVersion": "v3.0"}
            }"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.delivery.spacing_ms, 250);
        assert_eq!(settings.delivery.lane_idle_secs, 30);
        assert_eq!(settings.messenger.send_api_version, "v3.0");
        assert_eq!(settings.messenger.profile_api_version, "v2.7");
        assert_eq!(
            settings.messenger.page_token.as_ref().unwrap().expose_secret(),
            "page"
        );
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_file(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn validation_requires_all_secrets() {
        let mut settings = ReactrackSettings::default();
        assert!(matches!(
            validate_required(&settings),
            Err(SettingsError::Missing(name)) if name.contains("pageToken")
        ));

        settings.messenger.page_token = Some(SecretString::from("p"));
        settings.messenger.verify_token = Some(SecretString::from("v"));
        settings.messenger.app_secret = Some(SecretString::from("s"));
        assert!(matches!(
            validate_required(&settings),
            Err(SettingsError::Missing(name)) if name.contains("clientToken")
        ));

        settings.fulfillment.client_token = Some(SecretString::from("c"));
        assert!(validate_required(&settings).is_ok());
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(v), Some(true));
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("5000", 1, 65535), Some(5000));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
        assert_eq!(parse_u64_range("1100", 0, 60_000), Some(1100));
        assert_eq!(parse_u64_range("60001", 0, 60_000), None);
        assert_eq!(parse_usize_range("10", 1, 100), Some(10));
        assert_eq!(parse_usize_range("0", 1, 100), None);
    }
}
