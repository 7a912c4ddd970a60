use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::FulfillmentError;
use crate::fragment::{Fragment, FragmentKind};
use crate::ids::SessionId;

/// A parameter value resolved by the intent engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Textual form; whole numbers render without a fractional part.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                format!("{}", *n as i64)
            }
            Self::Number(n) => n.to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Self::Number(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Parameter mapping of a resolved intent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Non-empty textual value for `key`.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(ParamValue::as_text).filter(|s| !s.trim().is_empty())
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ParamValue::as_i64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Structured output of the intent engine for one user utterance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    #[serde(default)]
    pub speech: Option<String>,
    #[serde(default)]
    pub raw_reply: Option<serde_json::Value>,
    #[serde(default)]
    pub resolved_query: Option<String>,
}

impl Fulfillment {
    /// Resolved action name; an empty name counts as no action.
    pub fn action_name(&self) -> Option<&str> {
        self.action.as_deref().filter(|a| !a.trim().is_empty())
    }

    /// Plain response text, if non-empty.
    pub fn speech_text(&self) -> Option<&str> {
        self.speech.as_deref().filter(|s| !s.is_empty())
    }

    /// True when the fragment sequence needs batching and paced delivery:
    /// it is non-empty and is not exactly one text fragment.
    pub fn has_structured_reply(&self) -> bool {
        match self.fragments.as_slice() {
            [] => false,
            [only] => only.kind() != FragmentKind::Text,
            _ => true,
        }
    }

    /// A raw channel reply that is present and not null.
    pub fn raw_channel_reply(&self) -> Option<&serde_json::Value> {
        self.raw_reply.as_ref().filter(|v| !v.is_null())
    }
}

/// Intent engine: free text in, fulfillment out.
#[async_trait]
pub trait FulfillmentEngine: Send + Sync {
    async fn query(&self, text: &str, session: &SessionId) -> Result<Fulfillment, FulfillmentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{Card, QuickReply};

    fn card() -> Fragment {
        Fragment::Card(Card {
            title: "t".into(),
            subtitle: None,
            image_url: None,
            buttons: vec![],
        })
    }

    #[test]
    fn param_value_text_forms() {
        assert_eq!(ParamValue::Number(2.0).as_text(), "2");
        assert_eq!(ParamValue::Number(2.5).as_text(), "2.5");
        assert_eq!(ParamValue::Text("x".into()).as_text(), "x");
    }

    #[test]
    fn param_value_integers() {
        assert_eq!(ParamValue::Number(3.0).as_i64(), Some(3));
        assert_eq!(ParamValue::Text(" 7 ".into()).as_i64(), Some(7));
        assert_eq!(ParamValue::Text("seven".into()).as_i64(), None);
    }

    #[test]
    fn parameters_deserialize_mixed_values() {
        let params: Parameters =
            serde_json::from_str(r#"{"medication": "Prozac", "number": 2}"#).unwrap();
        assert_eq!(params.text("medication").as_deref(), Some("Prozac"));
        assert_eq!(params.integer("number"), Some(2));
        assert!(params.text("missing").is_none());
    }

    #[test]
    fn empty_parameter_text_is_none() {
        let params = Parameters::new().with("medication", "");
        assert!(params.text("medication").is_none());
    }

    #[test]
    fn empty_action_is_no_action() {
        let f = Fulfillment {
            action: Some(String::new()),
            ..Default::default()
        };
        assert!(f.action_name().is_none());
    }

    #[test]
    fn structured_reply_detection() {
        let mut f = Fulfillment::default();
        assert!(!f.has_structured_reply());

        f.fragments = vec![Fragment::text("hi")];
        assert!(!f.has_structured_reply());

        f.fragments = vec![card()];
        assert!(f.has_structured_reply());

        f.fragments = vec![Fragment::quick_replies("p", vec![QuickReply::echo("a")])];
        assert!(f.has_structured_reply());

        f.fragments = vec![Fragment::text("a"), Fragment::text("b")];
        assert!(f.has_structured_reply());
    }
}
