//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section has `#[serde(default)]`
//! so a partial file only overrides what it names. Secrets are never
//! serialized back out.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Root settings for the bot process.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReactrackSettings {
    pub server: ServerSettings,
    pub messenger: MessengerSettings,
    pub fulfillment: FulfillmentSettings,
    pub delivery: DeliverySettings,
    pub sessions: SessionSettings,
    pub store: StoreSettings,
    pub telemetry: TelemetrySettings,
}

/// HTTP listener.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Messaging platform endpoints and credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessengerSettings {
    /// Base URL of the Graph API, without a version segment.
    pub graph_base_url: String,
    /// Version segment used for the send API.
    pub send_api_version: String,
    /// Version segment used for profile lookups.
    pub profile_api_version: String,
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub page_token: Option<SecretString>,
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub verify_token: Option<SecretString>,
    /// Key for the webhook payload signature.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub app_secret: Option<SecretString>,
    pub request_timeout_secs: u64,
}

impl Default for MessengerSettings {
    fn default() -> Self {
        Self {
            graph_base_url: "https://graph.facebook.com".to_string(),
            send_api_version: "v2.6".to_string(),
            profile_api_version: "v2.7".to_string(),
            page_token: None,
            verify_token: None,
            app_secret: None,
            request_timeout_secs: 30,
        }
    }
}

/// Intent engine endpoint and credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FulfillmentSettings {
    pub base_url: String,
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub client_token: Option<SecretString>,
    pub language: String,
    /// Value of the `v` query parameter.
    pub protocol_version: String,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.api.ai".to_string(),
            client_token: None,
            language: "en".to_string(),
            protocol_version: "20150910".to_string(),
        }
    }
}

/// Outbound pacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Minimum gap between two issuances to the same recipient.
    pub spacing_ms: u64,
    /// A recipient lane with no work for this long is torn down. Never
    /// shorter than the spacing.
    pub lane_idle_secs: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            spacing_ms: 1100,
            lane_idle_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Maximum number of senders kept in the session cache.
    pub capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file. Relative paths resolve under `~/.reactrack`.
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "reactrack.db".to_string(),
        }
    }
}

impl StoreSettings {
    pub fn resolved_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);
        if path.is_absolute() {
            path
        } else {
            crate::loader::reactrack_home().join(path)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    pub level: String,
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}
