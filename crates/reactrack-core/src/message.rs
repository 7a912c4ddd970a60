//! Send API message bodies.
//!
//! [`OutboundMessage`] serializes to the `message` object of a Send API
//! request. Conversion from a [`BatchUnit`] follows the channel's rules:
//! cards become elements of one generic template, and card buttons become
//! `web_url` or `postback` buttons depending on their target.

use serde::Serialize;

use crate::fragment::{BatchUnit, ButtonTarget, Card, Fragment, QuickReply};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Structured(MessageBody),
    /// Channel-specific payload passed through untouched.
    Raw(serde_json::Value),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReplyOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuickReplyOption {
    pub content_type: &'static str,
    pub title: String,
    pub payload: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Attachment {
    Image { url: String },
    Template(TemplatePayload),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "template_type", rename_all = "snake_case")]
pub enum TemplatePayload {
    Generic { elements: Vec<TemplateElement> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TemplateElement {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<TemplateButton>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateButton {
    WebUrl { title: String, url: String },
    Postback { title: String, payload: String },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Structured(MessageBody {
            text: Some(text.into()),
            ..Default::default()
        })
    }

    pub fn quick_replies(text: impl Into<String>, replies: &[QuickReply]) -> Self {
        Self::Structured(MessageBody {
            text: Some(text.into()),
            quick_replies: replies
                .iter()
                .map(|r| QuickReplyOption {
                    content_type: "text",
                    title: r.label.clone(),
                    payload: r.value.clone(),
                })
                .collect(),
            ..Default::default()
        })
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Structured(MessageBody {
            attachment: Some(Attachment::Image { url: url.into() }),
            ..Default::default()
        })
    }

    pub fn carousel(cards: &[Card]) -> Self {
        let elements = cards.iter().map(TemplateElement::from).collect();
        Self::Structured(MessageBody {
            attachment: Some(Attachment::Template(TemplatePayload::Generic { elements })),
            ..Default::default()
        })
    }
}

impl From<&Card> for TemplateElement {
    fn from(card: &Card) -> Self {
        Self {
            title: card.title.clone(),
            subtitle: card.subtitle.clone(),
            image_url: card.image_url.clone(),
            buttons: card
                .buttons
                .iter()
                .map(|b| match &b.target {
                    ButtonTarget::Url(url) => TemplateButton::WebUrl {
                        title: b.label.clone(),
                        url: url.clone(),
                    },
                    ButtonTarget::Postback(payload) => TemplateButton::Postback {
                        title: b.label.clone(),
                        payload: payload.clone(),
                    },
                })
                .collect(),
        }
    }
}

impl From<&Fragment> for OutboundMessage {
    fn from(fragment: &Fragment) -> Self {
        match fragment {
            Fragment::Text { text } => Self::text(text.clone()),
            Fragment::QuickReplies { prompt, replies } => Self::quick_replies(prompt.clone(), replies),
            Fragment::Image { url } => Self::image(url.clone()),
            Fragment::Card(card) => Self::carousel(std::slice::from_ref(card)),
            Fragment::RawPayload { payload } => Self::Raw(payload.clone()),
            // Fails validation, so it is never handed to a channel.
            Fragment::Unsupported { .. } => Self::Raw(serde_json::Value::Null),
        }
    }
}

impl From<&BatchUnit> for OutboundMessage {
    fn from(unit: &BatchUnit) -> Self {
        match unit {
            BatchUnit::Single { fragment } => fragment.into(),
            BatchUnit::Carousel { carousel } => Self::carousel(carousel.cards()),
        }
    }
}
