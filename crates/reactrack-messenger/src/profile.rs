use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use reactrack_core::errors::{ChannelError, IdentityError};
use reactrack_core::identity::{IdentityProvider, Profile};
use reactrack_core::ids::SenderId;

use crate::graph::GraphConfig;

/// Raw profile response; every field is optional on the wire.
#[derive(Deserialize)]
struct ProfileResponse {
    first_name: Option<String>,
    last_name: Option<String>,
    locale: Option<String>,
    timezone: Option<f64>,
    gender: Option<String>,
}

/// Profile lookups against the user profile API.
pub struct GraphIdentityProvider {
    client: Client,
    config: GraphConfig,
}

impl GraphIdentityProvider {
    pub fn new(client: Client, config: GraphConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for GraphIdentityProvider {
    #[instrument(skip(self), fields(sender_id = %sender))]
    async fn lookup(&self, sender: &SenderId) -> Result<Profile, IdentityError> {
        let resp = self
            .client
            .get(self.config.profile_url(sender.as_str()))
            .query(&[("access_token", self.config.access_token())])
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::from_status(status, body).into());
        }

        let raw: ProfileResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;

        let first_name = raw
            .first_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IdentityError::MissingProfile(sender.to_string()))?;

        Ok(Profile {
            first_name,
            last_name: raw.last_name,
            locale: raw.locale,
            timezone: raw.timezone,
            gender: raw.gender,
        })
    }
}
