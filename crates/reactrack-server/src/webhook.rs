//! Webhook payloads and event routing.
//!
//! A page delivery carries entries, each with a batch of messaging events.
//! Every event is classified once, then routed: user text goes to the turn
//! controller, a few event kinds get a canned reply, the rest is logged.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use reactrack_core::ids::SenderId;
use reactrack_engine::{TurnController, FALLBACK_TEXT};
use reactrack_telemetry::{transcript, Direction};

pub const ATTACHMENT_REPLY: &str = "Attachment received. Thank you.";
pub const OPTIN_REPLY: &str = "Authentication successful";

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    pub sender: Party,
    #[serde(default)]
    pub recipient: Option<Party>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub optin: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<InboundMessage>,
    #[serde(default)]
    pub delivery: Option<serde_json::Value>,
    #[serde(default)]
    pub postback: Option<Postback>,
    #[serde(default)]
    pub read: Option<serde_json::Value>,
    #[serde(default)]
    pub account_linking: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub quick_reply: Option<QuickReplyPayload>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct QuickReplyPayload {
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct Postback {
    #[serde(default)]
    pub payload: Option<String>,
}

/// What an inbound messaging event asks of the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Optin,
    Echo { mid: Option<String> },
    /// Tapped quick reply; the payload is treated as typed text.
    QuickReply(String),
    Text(String),
    Attachments(usize),
    /// A message with neither text nor attachments.
    EmptyMessage,
    Delivery,
    Postback(Option<String>),
    Read,
    AccountLinking,
    Unknown,
}

impl InboundEvent {
    pub fn classify(event: &MessagingEvent) -> Self {
        if event.optin.is_some() {
            return Self::Optin;
        }
        if let Some(message) = &event.message {
            if message.is_echo {
                return Self::Echo {
                    mid: message.mid.clone(),
                };
            }
            if let Some(quick_reply) = &message.quick_reply {
                return Self::QuickReply(quick_reply.payload.clone());
            }
            return match &message.text {
                Some(text) if !text.is_empty() => Self::Text(text.clone()),
                _ if !message.attachments.is_empty() => {
                    Self::Attachments(message.attachments.len())
                }
                _ => Self::EmptyMessage,
            };
        }
        if event.delivery.is_some() {
            Self::Delivery
        } else if let Some(postback) = &event.postback {
            Self::Postback(postback.payload.clone())
        } else if event.read.is_some() {
            Self::Read
        } else if event.account_linking.is_some() {
            Self::AccountLinking
        } else {
            Self::Unknown
        }
    }

    /// Whether the event comes from a person talking to the bot.
    fn opens_turn(&self) -> bool {
        matches!(
            self,
            Self::QuickReply(_)
                | Self::Text(_)
                | Self::Attachments(_)
                | Self::EmptyMessage
                | Self::Postback(_)
        )
    }
}

/// Route one event. Work that talks to the network runs on spawned tasks.
pub fn dispatch(controller: &Arc<TurnController>, event: &MessagingEvent) -> InboundEvent {
    let sender = SenderId::new(event.sender.id.clone());
    let inbound = InboundEvent::classify(event);

    if inbound.opens_turn() {
        let sessions = controller.sessions();
        sessions.resolve(&sender);
        let _ = sessions.resolve_profile(&sender);
    }

    match &inbound {
        InboundEvent::Optin => {
            info!(sender_id = %sender, "authentication received");
            controller.reply_text(&sender, OPTIN_REPLY);
        }
        InboundEvent::Echo { mid } => {
            debug!(sender_id = %sender, mid = mid.as_deref().unwrap_or_default(), "echo received");
        }
        InboundEvent::QuickReply(text) | InboundEvent::Text(text) => {
            transcript(Direction::Inbound, sender.as_str(), text);
            let controller = Arc::clone(controller);
            let text = text.clone();
            tokio::spawn(async move {
                if let Err(e) = controller.handle_text(&sender, &text).await {
                    warn!(sender_id = %sender, error = %e, "turn failed");
                }
            });
        }
        InboundEvent::Attachments(count) => {
            debug!(sender_id = %sender, count, "attachments received");
            controller.reply_text(&sender, ATTACHMENT_REPLY);
        }
        InboundEvent::EmptyMessage => {
            debug!(sender_id = %sender, "message without text or attachments");
        }
        InboundEvent::Delivery => debug!(sender_id = %sender, "delivery confirmation"),
        InboundEvent::Postback(payload) => {
            info!(
                sender_id = %sender,
                payload = payload.as_deref().unwrap_or_default(),
                "postback received"
            );
            controller.reply_text(&sender, FALLBACK_TEXT);
        }
        InboundEvent::Read => debug!(sender_id = %sender, "read receipt"),
        InboundEvent::AccountLinking => info!(sender_id = %sender, "account linking event"),
        InboundEvent::Unknown => warn!(sender_id = %sender, "unknown messaging event"),
    }
    inbound
}
