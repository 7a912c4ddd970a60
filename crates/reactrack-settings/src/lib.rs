//! # reactrack-settings
//!
//! Layered configuration for the bot process.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`ReactrackSettings::default()`])
//! 2. **Settings file** (`~/.reactrack/settings.json`, or an explicit path)
//! 3. **Environment variables** (`FB_*`, `API_AI_*`, `REACTRACK_*`)
//!
//! The binary calls [`validate_required`] after loading; the process does
//! not start without its platform and intent-engine credentials.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, reactrack_home,
    settings_path, validate_required,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_home_dir() {
        let path = settings_path();
        assert!(path.ends_with(".reactrack/settings.json"));
    }

    #[test]
    fn defaults_round_trip_through_json() {
        let value = serde_json::to_value(ReactrackSettings::default()).unwrap();
        assert_eq!(value["server"]["port"], 5000);
        assert_eq!(value["fulfillment"]["baseUrl"], "https://api.api.ai");
        let back: ReactrackSettings = serde_json::from_value(value).unwrap();
        assert_eq!(back.store.path, "reactrack.db");
    }
}
