//! Intent engine response decoding.
//!
//! `/v1/query` answers with a `result` object whose `fulfillment.messages`
//! array is tagged by a numeric `type`:
//!
//! | type | kind          | fields                                   |
//! |------|---------------|------------------------------------------|
//! | 0    | text          | `speech`                                 |
//! | 1    | card          | `title`, `subtitle`, `imageUrl`, `buttons` |
//! | 2    | quick replies | `title`, `replies`                       |
//! | 3    | image         | `imageUrl`                               |
//! | 4    | custom        | `payload.facebook`                       |
//!
//! An entry that cannot be decoded is logged and kept in place as an
//! unsupported fragment, so it still separates the cards around it and one
//! bad message never costs the rest of the turn.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use reactrack_core::errors::FulfillmentError;
use reactrack_core::fragment::{ButtonTarget, Card, CardButton, Fragment, QuickReply};
use reactrack_core::fulfillment::{Fulfillment, ParamValue, Parameters};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    result: Option<QueryResult>,
    #[serde(default)]
    status: Option<QueryStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatus {
    code: Option<u16>,
    error_type: Option<String>,
    error_details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryResult {
    action: Option<String>,
    resolved_query: Option<String>,
    parameters: serde_json::Map<String, Value>,
    fulfillment: Option<RawFulfillment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFulfillment {
    speech: Option<String>,
    messages: Vec<Value>,
    data: Option<Value>,
}

/// Decode a full `/v1/query` response body.
pub fn decode_query_response(body: Value) -> Result<Fulfillment, FulfillmentError> {
    let response: QueryResponse =
        serde_json::from_value(body).map_err(|e| FulfillmentError::Decode(e.to_string()))?;

    if let Some(status) = &response.status {
        if let Some(code) = status.code.filter(|c| *c >= 400) {
            return Err(FulfillmentError::Status {
                status: code,
                body: status
                    .error_details
                    .clone()
                    .or_else(|| status.error_type.clone())
                    .unwrap_or_default(),
            });
        }
    }

    let result = response
        .result
        .ok_or_else(|| FulfillmentError::Decode("response has no result".into()))?;

    let fulfillment = result.fulfillment.unwrap_or_default();
    let raw_reply = fulfillment
        .data
        .as_ref()
        .and_then(|d| d.get("facebook"))
        .filter(|v| !v.is_null())
        .cloned();

    Ok(Fulfillment {
        action: result.action,
        parameters: decode_parameters(result.parameters),
        fragments: fulfillment.messages.iter().map(decode_logged).collect(),
        speech: fulfillment.speech,
        raw_reply,
        resolved_query: result.resolved_query,
    })
}

fn decode_logged(message: &Value) -> Fragment {
    decode_message(message).unwrap_or_else(|reason| {
        warn!(reason = %reason, message = %message, "undecodable fulfillment message");
        Fragment::Unsupported { reason }
    })
}

/// Decode one entry of `fulfillment.messages`.
pub fn decode_message(message: &Value) -> Result<Fragment, String> {
    let kind = message
        .get("type")
        .and_then(Value::as_u64)
        .ok_or("message has no numeric type")?;

    match kind {
        0 => {
            let speech = str_field(message, "speech").ok_or("text message without speech")?;
            Ok(Fragment::text(speech))
        }
        1 => {
            let title = str_field(message, "title").ok_or("card without title")?;
            let buttons = message
                .get("buttons")
                .and_then(Value::as_array)
                .map(|buttons| buttons.iter().filter_map(decode_button).collect())
                .unwrap_or_default();
            Ok(Fragment::Card(Card {
                title,
                subtitle: str_field(message, "subtitle"),
                image_url: str_field(message, "imageUrl"),
                buttons,
            }))
        }
        2 => {
            let prompt = str_field(message, "title").ok_or("quick replies without title")?;
            let replies: Vec<QuickReply> = message
                .get("replies")
                .and_then(Value::as_array)
                .ok_or("quick replies without replies")?
                .iter()
                .filter_map(Value::as_str)
                .map(QuickReply::echo)
                .collect();
            Ok(Fragment::quick_replies(prompt, replies))
        }
        3 => {
            let url = str_field(message, "imageUrl").ok_or("image without imageUrl")?;
            Ok(Fragment::image(url))
        }
        4 => {
            let payload = message
                .get("payload")
                .and_then(|p| p.get("facebook"))
                .filter(|v| !v.is_null())
                .ok_or("custom payload without facebook section")?;
            Ok(Fragment::RawPayload {
                payload: payload.clone(),
            })
        }
        other => Err(format!("unknown message type {other}")),
    }
}

fn decode_button(button: &Value) -> Option<CardButton> {
    let label = str_field(button, "text")?;
    let target = str_field(button, "postback").unwrap_or_default();
    Some(CardButton {
        label,
        target: ButtonTarget::classify(target),
    })
}

/// Strings and numbers are kept; structured values carry nothing the
/// action handlers read.
fn decode_parameters(raw: serde_json::Map<String, Value>) -> Parameters {
    let mut params = Parameters::new();
    for (key, value) in raw {
        match value {
            Value::String(s) => params.insert(key, ParamValue::Text(s)),
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    params.insert(key, ParamValue::Number(n));
                }
            }
            _ => {}
        }
    }
    params
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}
