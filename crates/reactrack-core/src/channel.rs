use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ChannelError;
use crate::ids::SenderId;
use crate::message::OutboundMessage;

/// Acknowledgement returned by the channel for an accepted message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Presence indicators that are not messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderAction {
    TypingOn,
    TypingOff,
    MarkSeen,
}

impl SenderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypingOn => "typing_on",
            Self::TypingOff => "typing_off",
            Self::MarkSeen => "mark_seen",
        }
    }
}

/// External messaging API that accepts one message per call.
///
/// Completion order across concurrent calls is unspecified; callers must not
/// assume a call issued earlier resolves earlier.
#[async_trait]
pub trait SendChannel: Send + Sync {
    async fn send(
        &self,
        recipient: &SenderId,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, ChannelError>;

    async fn sender_action(
        &self,
        recipient: &SenderId,
        action: SenderAction,
    ) -> Result<(), ChannelError>;
}
