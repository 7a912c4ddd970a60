use secrecy::{ExposeSecret, SecretString};

/// Graph API endpoint and page credential.
#[derive(Clone, Debug)]
pub struct GraphConfig {
    pub base_url: String,
    pub send_api_version: String,
    pub profile_api_version: String,
    pub page_token: SecretString,
}

impl GraphConfig {
    pub fn new(base_url: impl Into<String>, page_token: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            send_api_version: "v2.6".to_string(),
            profile_api_version: "v2.7".to_string(),
            page_token,
        }
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/me/messages",
            self.base_url.trim_end_matches('/'),
            self.send_api_version
        )
    }

    pub fn profile_url(&self, user_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.profile_api_version,
            user_id
        )
    }

    pub(crate) fn access_token(&self) -> &str {
        self.page_token.expose_secret()
    }
}
