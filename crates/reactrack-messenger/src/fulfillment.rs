use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use reactrack_core::errors::FulfillmentError;
use reactrack_core::fulfillment::{Fulfillment, FulfillmentEngine};
use reactrack_core::ids::SessionId;

use crate::converter;

#[derive(Clone, Debug)]
pub struct ApiAiConfig {
    pub base_url: String,
    pub client_token: SecretString,
    pub language: String,
    pub protocol_version: String,
}

impl ApiAiConfig {
    pub fn new(base_url: impl Into<String>, client_token: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            client_token,
            language: "en".to_string(),
            protocol_version: "20150910".to_string(),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/v1/query", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    lang: &'a str,
    session_id: &'a str,
}

/// Text queries against the intent engine's `/v1/query` endpoint.
pub struct ApiAiEngine {
    client: Client,
    config: ApiAiConfig,
}

impl ApiAiEngine {
    pub fn new(client: Client, config: ApiAiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl FulfillmentEngine for ApiAiEngine {
    #[instrument(skip(self, text), fields(session_id = %session))]
    async fn query(&self, text: &str, session: &SessionId) -> Result<Fulfillment, FulfillmentError> {
        let body = QueryRequest {
            query: text,
            lang: &self.config.language,
            session_id: session.as_str(),
        };

        let resp = self
            .client
            .post(self.config.query_url())
            .query(&[("v", self.config.protocol_version.as_str())])
            .bearer_auth(self.config.client_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| FulfillmentError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FulfillmentError::Status { status, body });
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| FulfillmentError::Decode(e.to_string()))?;
        let fulfillment = converter::decode_query_response(value)?;
        debug!(
            action = fulfillment.action_name().unwrap_or(""),
            fragments = fulfillment.fragments.len(),
            "fulfillment received"
        );
        Ok(fulfillment)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn posts_query_with_session_and_token() {
        let server = MockServer::start().await;
        let session = SessionId::from_raw("sess_abc");
        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .and(query_param("v", "20150910"))
            .and(header("authorization", "Bearer client-token"))
            .and(body_json(json!({
                "query": "hi",
                "lang": "en",
                "sessionId": "sess_abc"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "action": "input.welcome",
                    "fulfillment": {"speech": "Hello!", "messages": [{"type": 0, "speech": "Hello!"}]}
                },
                "status": {"code": 200}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = ApiAiEngine::new(
            Client::new(),
            ApiAiConfig::new(server.uri(), SecretString::from("client-token")),
        );
        let f = engine.query("hi", &session).await.unwrap();
        assert_eq!(f.action_name(), Some("input.welcome"));
        assert_eq!(f.speech_text(), Some("Hello!"));
        assert!(!f.has_structured_reply());
    }

    #[tokio::test]
    async fn http_error_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let engine = ApiAiEngine::new(
            Client::new(),
            ApiAiConfig::new(server.uri(), SecretString::from("t")),
        );
        let err = engine.query("hi", &SessionId::new()).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::Status { status: 503, .. }));
    }
}
