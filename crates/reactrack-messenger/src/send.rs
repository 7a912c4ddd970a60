use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use reactrack_core::channel::{SendChannel, SendReceipt, SenderAction};
use reactrack_core::errors::ChannelError;
use reactrack_core::ids::SenderId;
use reactrack_core::message::OutboundMessage;

use crate::graph::GraphConfig;

#[derive(Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    recipient: Recipient<'a>,
    message: &'a OutboundMessage,
}

#[derive(Serialize)]
struct SenderActionRequest<'a> {
    recipient: Recipient<'a>,
    sender_action: SenderAction,
}

/// Send API channel: one POST per message, addressed by page token.
pub struct GraphSendChannel {
    client: Client,
    config: GraphConfig,
}

impl GraphSendChannel {
    pub fn new(client: Client, config: GraphConfig) -> Self {
        Self { client, config }
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<reqwest::Response, ChannelError> {
        let resp = self
            .client
            .post(self.config.messages_url())
            .query(&[("access_token", self.config.access_token())])
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let err = ChannelError::from_status(status, body);
            warn!(status, kind = err.error_kind(), "send API call failed");
            return Err(err);
        }
        Ok(resp)
    }
}

#[async_trait]
impl SendChannel for GraphSendChannel {
    #[instrument(skip(self, message), fields(recipient = %recipient))]
    async fn send(
        &self,
        recipient: &SenderId,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, ChannelError> {
        let request = MessageRequest {
            recipient: Recipient {
                id: recipient.as_str(),
            },
            message,
        };
        let resp = self.post(&request).await?;
        let receipt: SendReceipt = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;

        match &receipt.message_id {
            Some(id) => debug!(message_id = %id, "message accepted"),
            None => debug!("send API call accepted without message id"),
        }
        Ok(receipt)
    }

    #[instrument(skip(self), fields(recipient = %recipient, action = action.as_str()))]
    async fn sender_action(
        &self,
        recipient: &SenderId,
        action: SenderAction,
    ) -> Result<(), ChannelError> {
        let request = SenderActionRequest {
            recipient: Recipient {
                id: recipient.as_str(),
            },
            sender_action: action,
        };
        self.post(&request).await.map(|_| ())
    }
}
