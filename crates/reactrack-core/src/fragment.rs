//! Agent output fragments and the units they are delivered in.
//!
//! A [`Fragment`] is one piece of output emitted by the fulfillment engine.
//! Fragments are grouped into [`BatchUnit`]s before delivery: every run of
//! adjacent cards becomes a single [`Carousel`], everything else is sent on
//! its own. An engine message that could not be decoded keeps its place as
//! [`Fragment::Unsupported`]; it separates card runs but never validates, so
//! delivery skips it.

use serde::{Deserialize, Serialize};

/// Discriminant of a [`Fragment`], used for logging and batching decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Text,
    QuickReplies,
    Image,
    Card,
    RawPayload,
    Unsupported,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::QuickReplies => "quick_replies",
            Self::Image => "image",
            Self::Card => "card",
            Self::RawPayload => "raw_payload",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One quick-reply option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    pub label: String,
    pub value: String,
}

impl QuickReply {
    /// Option whose payload is the label itself.
    pub fn echo(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            value: label.clone(),
            label,
        }
    }
}

/// Where a card button leads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ButtonTarget {
    Url(String),
    Postback(String),
}

impl ButtonTarget {
    /// Classify a raw button target: anything starting with `http` is a link.
    pub fn classify(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with("http") {
            Self::Url(raw)
        } else {
            Self::Postback(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) | Self::Postback(s) => s,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardButton {
    pub label: String,
    pub target: ButtonTarget,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub buttons: Vec<CardButton>,
}

/// One unit of agent output, in the order the fulfillment engine emitted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    Text { text: String },
    QuickReplies { prompt: String, replies: Vec<QuickReply> },
    Image { url: String },
    Card(Card),
    RawPayload { payload: serde_json::Value },
    Unsupported { reason: String },
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn quick_replies(prompt: impl Into<String>, replies: Vec<QuickReply>) -> Self {
        Self::QuickReplies {
            prompt: prompt.into(),
            replies,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }

    pub fn kind(&self) -> FragmentKind {
        match self {
            Self::Text { .. } => FragmentKind::Text,
            Self::QuickReplies { .. } => FragmentKind::QuickReplies,
            Self::Image { .. } => FragmentKind::Image,
            Self::Card(_) => FragmentKind::Card,
            Self::RawPayload { .. } => FragmentKind::RawPayload,
            Self::Unsupported { .. } => FragmentKind::Unsupported,
        }
    }

    /// Check the fields the send channel requires for this kind.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Text { text } if text.trim().is_empty() => Err("text fragment is empty".into()),
            Self::QuickReplies { prompt, .. } if prompt.trim().is_empty() => {
                Err("quick replies without a prompt".into())
            }
            Self::QuickReplies { replies, .. } if replies.is_empty() => {
                Err("quick replies without options".into())
            }
            Self::Image { url } if url.trim().is_empty() => Err("image without url".into()),
            Self::Card(card) => card.validate(),
            Self::RawPayload { payload } if payload.is_null() => Err("raw payload is null".into()),
            Self::Unsupported { reason } => Err(reason.clone()),
            _ => Ok(()),
        }
    }
}

impl Card {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("card without title".into());
        }
        Ok(())
    }
}

/// A non-empty run of consecutive cards delivered as one message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Carousel {
    cards: Vec<Card>,
}

impl Carousel {
    /// Returns `None` for an empty run.
    pub fn new(cards: Vec<Card>) -> Option<Self> {
        if cards.is_empty() {
            None
        } else {
            Some(Self { cards })
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_cards(self) -> Vec<Card> {
        self.cards
    }
}

/// Dispatch granularity after batching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum BatchUnit {
    /// A single non-card fragment.
    Single { fragment: Fragment },
    Carousel { carousel: Carousel },
}

impl BatchUnit {
    pub fn single(fragment: Fragment) -> Self {
        Self::Single { fragment }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::single(Fragment::text(text))
    }

    pub fn is_carousel(&self) -> bool {
        matches!(self, Self::Carousel { .. })
    }

    /// Short label for log records.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Single { fragment } => fragment.kind().as_str(),
            Self::Carousel { .. } => "carousel",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Single { fragment } => fragment.validate(),
            Self::Carousel { carousel } => carousel.cards().iter().try_for_each(Card::validate),
        }
    }

    /// Expand back into the fragments this unit was built from.
    pub fn into_fragments(self) -> Vec<Fragment> {
        match self {
            Self::Single { fragment } => vec![fragment],
            Self::Carousel { carousel } => carousel.into_cards().into_iter().map(Fragment::Card).collect(),
        }
    }
}
