//! In-process collaborators for tests.
//!
//! Each mock records what it was asked to do and answers from a script, so
//! engine and server tests run without network access. Timestamps use
//! `tokio::time::Instant` so paused-clock tests can assert exact spacing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use reactrack_core::channel::{SendChannel, SendReceipt, SenderAction};
use reactrack_core::errors::{ChannelError, FulfillmentError, IdentityError};
use reactrack_core::fulfillment::{Fulfillment, FulfillmentEngine};
use reactrack_core::identity::{IdentityProvider, Profile};
use reactrack_core::ids::{SenderId, SessionId};
use reactrack_core::message::{MessageBody, OutboundMessage};

/// Scripted outcome of one send call.
#[derive(Clone, Debug)]
pub enum MockSend {
    Accept,
    Fail(ChannelError),
    /// Wait, then resolve the inner outcome.
    Delay(Duration, Box<MockSend>),
}

impl MockSend {
    pub fn delayed(delay: Duration, inner: MockSend) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// A send call as it was issued.
#[derive(Clone, Debug)]
pub struct SentMessage {
    pub recipient: SenderId,
    pub message: OutboundMessage,
    pub issued_at: Instant,
}

impl SentMessage {
    /// Text of a structured message, if it has one.
    pub fn text(&self) -> Option<&str> {
        match &self.message {
            OutboundMessage::Structured(MessageBody { text, .. }) => text.as_deref(),
            OutboundMessage::Raw(_) => None,
        }
    }
}

/// Send channel that records issuance and answers from a script.
///
/// Calls beyond the script use the default outcome (accept).
pub struct MockChannel {
    script: Mutex<VecDeque<MockSend>>,
    default: MockSend,
    sent: Mutex<Vec<SentMessage>>,
    actions: Mutex<Vec<(SenderId, SenderAction)>>,
    completed: AtomicUsize,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockChannel {
    pub fn new(script: Vec<MockSend>) -> Self {
        Self::with_default(script, MockSend::Accept)
    }

    pub fn with_default(script: Vec<MockSend>, default: MockSend) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
            sent: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, recipient: &SenderId) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| &m.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Texts of all structured messages, in issuance order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| m.text().map(str::to_owned))
            .collect()
    }

    pub fn actions(&self) -> Vec<(SenderId, SenderAction)> {
        self.actions.lock().clone()
    }

    /// Number of send calls that have resolved, successfully or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SendChannel for MockChannel {
    async fn send(
        &self,
        recipient: &SenderId,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, ChannelError> {
        let index = {
            let mut sent = self.sent.lock();
            sent.push(SentMessage {
                recipient: recipient.clone(),
                message: message.clone(),
                issued_at: Instant::now(),
            });
            sent.len()
        };
        let mut outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        let result = loop {
            match outcome {
                MockSend::Accept => {
                    break Ok(SendReceipt {
                        recipient_id: Some(recipient.to_string()),
                        message_id: Some(format!("mid.{index}")),
                    })
                }
                MockSend::Fail(err) => break Err(err),
                MockSend::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn sender_action(
        &self,
        recipient: &SenderId,
        action: SenderAction,
    ) -> Result<(), ChannelError> {
        self.actions.lock().push((recipient.clone(), action));
        Ok(())
    }
}

/// Identity provider answering from a fixed table.
#[derive(Default)]
pub struct MockIdentity {
    profiles: Mutex<HashMap<SenderId, Profile>>,
    failures: Mutex<HashMap<SenderId, IdentityError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every lookup after `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_profile(self, sender: impl Into<SenderId>, first_name: &str) -> Self {
        self.profiles.lock().insert(
            sender.into(),
            Profile {
                first_name: first_name.to_string(),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_failure(self, sender: impl Into<SenderId>, error: IdentityError) -> Self {
        self.failures.lock().insert(sender.into(), error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn lookup(&self, sender: &SenderId) -> Result<Profile, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.lock().get(sender) {
            return Err(err.clone());
        }
        self.profiles
            .lock()
            .get(sender)
            .cloned()
            .ok_or_else(|| IdentityError::MissingProfile(sender.to_string()))
    }
}

/// Intent engine returning pre-programmed fulfillments in sequence.
pub struct MockEngine {
    responses: Mutex<VecDeque<Result<Fulfillment, FulfillmentError>>>,
    queries: Mutex<Vec<(String, SessionId)>>,
}

impl MockEngine {
    pub fn new(responses: Vec<Result<Fulfillment, FulfillmentError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Engine that answers every query with the same plain text.
    pub fn speech(text: &str) -> Self {
        Self::new(vec![Ok(Fulfillment {
            speech: Some(text.to_string()),
            ..Default::default()
        })])
    }

    pub fn queries(&self) -> Vec<(String, SessionId)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl FulfillmentEngine for MockEngine {
    async fn query(&self, text: &str, session: &SessionId) -> Result<Fulfillment, FulfillmentError> {
        let call = {
            let mut queries = self.queries.lock();
            queries.push((text.to_string(), session.clone()));
            queries.len()
        };
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(FulfillmentError::Transport(format!(
                "MockEngine: no response configured for call {call}"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn channel_records_issuance_before_latency() {
        let channel = MockChannel::new(vec![
            MockSend::delayed(Duration::from_secs(5), MockSend::Accept),
            MockSend::Fail(ChannelError::RateLimited),
        ]);
        let to = SenderId::new("1");
        let start = Instant::now();

        let first = channel.send(&to, &OutboundMessage::text("a")).await;
        assert!(first.is_ok());
        let second = channel.send(&to, &OutboundMessage::text("b")).await;
        assert!(matches!(second, Err(ChannelError::RateLimited)));

        let sent = channel.sent();
        assert_eq!(sent[0].issued_at, start);
        assert_eq!(sent[1].issued_at, start + Duration::from_secs(5));
        assert_eq!(channel.texts(), vec!["a", "b"]);
        assert_eq!(channel.completed(), 2);
    }

    #[tokio::test]
    async fn identity_table_lookup() {
        let identity = MockIdentity::new().with_profile("1", "Ada");
        assert_eq!(identity.lookup(&SenderId::new("1")).await.unwrap().first_name, "Ada");
        assert!(identity.lookup(&SenderId::new("2")).await.is_err());
        assert_eq!(identity.calls(), 2);
    }

    #[tokio::test]
    async fn engine_runs_out_of_responses() {
        let engine = MockEngine::speech("hi");
        let session = SessionId::new();
        assert!(engine.query("a", &session).await.is_ok());
        assert!(engine.query("b", &session).await.is_err());
        assert_eq!(engine.queries().len(), 2);
    }
}
