//! One conversational turn: fulfillment in, paced replies out.
//!
//! Reply precedence for a fulfillment:
//! 1. a resolved action runs and may queue scripted units;
//! 2. a structured fragment sequence is batched and queued;
//! 3. otherwise, with no action and no response text, the fallback text;
//! 4. otherwise, with an action, nothing more;
//! 5. otherwise a raw channel reply, verbatim;
//! 6. otherwise the response text.
//!
//! 1 and 2 may both fire. Their units go through the recipient's single
//! delivery lane, action units first, so their combined order is fixed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reactrack_core::action::Action;
use reactrack_core::channel::{SendChannel, SenderAction};
use reactrack_core::errors::IdentityError;
use reactrack_core::fragment::{BatchUnit, Fragment};
use reactrack_core::fulfillment::{Fulfillment, FulfillmentEngine};
use reactrack_core::identity::Profile;
use reactrack_core::ids::SenderId;

use crate::actions::ActionHandler;
use crate::batcher::batch;
use crate::error::EngineError;
use crate::scheduler::{DeliveryScheduler, DeliveryTicket};
use crate::sessions::{IdentityCache, Session};

pub const FALLBACK_TEXT: &str = "I'm not sure what you want. Can you be more specific?";

/// What a turn decided to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// An action ran and queued `units` scripted units (possibly zero).
    Action { name: String, units: usize },
    /// A batched fragment sequence of `units` units.
    Structured { units: usize },
    Fallback,
    Raw,
    Speech,
}

pub struct TurnOutcome {
    pub session: Session,
    pub replies: Vec<Reply>,
    pub deliveries: Vec<DeliveryTicket>,
    /// Profile lookup started by this turn, if any.
    pub profile: Option<JoinHandle<Result<Profile, IdentityError>>>,
}

impl std::fmt::Debug for TurnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOutcome")
            .field("session", &self.session)
            .field("replies", &self.replies)
            .field("deliveries", &self.deliveries.len())
            .finish()
    }
}

pub struct TurnController {
    sessions: Arc<IdentityCache>,
    scheduler: Arc<DeliveryScheduler>,
    actions: ActionHandler,
    engine: Arc<dyn FulfillmentEngine>,
    channel: Arc<dyn SendChannel>,
}

impl TurnController {
    pub fn new(
        sessions: Arc<IdentityCache>,
        scheduler: Arc<DeliveryScheduler>,
        actions: ActionHandler,
        engine: Arc<dyn FulfillmentEngine>,
        channel: Arc<dyn SendChannel>,
    ) -> Self {
        Self {
            sessions,
            scheduler,
            actions,
            engine,
            channel,
        }
    }

    pub fn sessions(&self) -> &Arc<IdentityCache> {
        &self.sessions
    }

    pub fn scheduler(&self) -> &Arc<DeliveryScheduler> {
        &self.scheduler
    }

    /// Send user text to the fulfillment engine and dispatch the result.
    ///
    /// The message is marked seen, then the typing indicator is shown while
    /// the engine is queried.
    pub async fn handle_text(&self, sender: &SenderId, text: &str) -> Result<TurnOutcome, EngineError> {
        let session = self.sessions.resolve(sender);
        self.indicate(sender, SenderAction::MarkSeen);
        self.indicate(sender, SenderAction::TypingOn);
        let result = self.engine.query(text, &session.session_id).await;
        self.indicate(sender, SenderAction::TypingOff);

        let fulfillment = result.map_err(|e| {
            warn!(sender_id = %sender, error = %e, "fulfillment query failed");
            e
        })?;
        Ok(self.handle_fulfillment(sender, fulfillment))
    }

    /// Dispatch one fulfillment for `sender`. Never waits on the network.
    ///
    /// A lone text reply goes out without delay only when the recipient's
    /// lane is quiet. Queued behind an earlier paced run, it waits its turn
    /// like any other unit so the minimum spacing still holds.
    pub fn handle_fulfillment(&self, sender: &SenderId, fulfillment: Fulfillment) -> TurnOutcome {
        let session = self.sessions.resolve(sender);
        let profile = self.sessions.resolve_profile(sender);

        let mut replies = Vec::new();
        let mut deliveries = Vec::new();

        let action = fulfillment.action_name().map(|name| {
            Action::parse(
                name,
                &fulfillment.parameters,
                fulfillment.resolved_query.as_deref(),
            )
        });
        let speech = speech_of(&fulfillment);

        if let Some(action) = &action {
            let units = match self.actions.handle(sender, action, speech) {
                Ok(units) => units,
                Err(e) => {
                    warn!(sender_id = %sender, action = action.name(), error = %e, "action failed");
                    Vec::new()
                }
            };
            replies.push(Reply::Action {
                name: action.name().to_string(),
                units: units.len(),
            });
            if !units.is_empty() {
                deliveries.push(self.scheduler.deliver(sender, units));
            }
        }

        if fulfillment.has_structured_reply() {
            let units = batch(fulfillment.fragments.iter().cloned());
            debug!(sender_id = %sender, units = units.len(), "structured reply batched");
            replies.push(Reply::Structured { units: units.len() });
            deliveries.push(self.scheduler.deliver(sender, units));
        } else if action.is_none() && speech.is_none() {
            info!(
                sender_id = %sender,
                query = fulfillment.resolved_query.as_deref().unwrap_or_default(),
                "unknown query, sending fallback"
            );
            replies.push(Reply::Fallback);
            deliveries.push(self.scheduler.deliver(sender, vec![BatchUnit::text(FALLBACK_TEXT)]));
        } else if action.is_some() {
            // The action handler already produced whatever reply it has.
        } else if let Some(raw) = fulfillment.raw_channel_reply() {
            replies.push(Reply::Raw);
            let unit = BatchUnit::single(Fragment::RawPayload {
                payload: raw.clone(),
            });
            deliveries.push(self.scheduler.deliver(sender, vec![unit]));
        } else if let Some(text) = speech {
            replies.push(Reply::Speech);
            deliveries.push(self.scheduler.deliver(sender, vec![BatchUnit::text(text)]));
        }

        TurnOutcome {
            session,
            replies,
            deliveries,
            profile,
        }
    }

    /// Queue a plain text reply outside of any fulfillment.
    pub fn reply_text(&self, recipient: &SenderId, text: &str) -> DeliveryTicket {
        self.scheduler.deliver(recipient, vec![BatchUnit::text(text)])
    }

    /// Fire-and-forget sender action; failures are only logged.
    fn indicate(&self, recipient: &SenderId, action: SenderAction) {
        let channel = Arc::clone(&self.channel);
        let recipient = recipient.clone();
        tokio::spawn(async move {
            if let Err(e) = channel.sender_action(&recipient, action).await {
                debug!(recipient = %recipient, action = action.as_str(), error = %e, "sender action failed");
            }
        });
    }
}

/// Response text: the speech field, or the text of a lone text fragment.
fn speech_of(fulfillment: &Fulfillment) -> Option<&str> {
    fulfillment.speech_text().or(match fulfillment.fragments.as_slice() {
        [Fragment::Text { text }] if !text.is_empty() => Some(text.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reactrack_core::errors::{ChannelError, FulfillmentError};
    use reactrack_core::fragment::{Card, QuickReply};
    use reactrack_core::fulfillment::Parameters;
    use reactrack_core::identity::SubscriberDirectory;
    use reactrack_messenger::mock::{MockChannel, MockEngine, MockIdentity, MockSend};
    use reactrack_store::{Database, SubscriberRepo};
    use serde_json::json;
    use tokio::time::Instant;

    use crate::scheduler::{SchedulerConfig, UnitOutcome};

    const SPACING: Duration = Duration::from_millis(1100);

    struct Harness {
        controller: TurnController,
        channel: Arc<MockChannel>,
        identity: Arc<MockIdentity>,
        engine: Arc<MockEngine>,
        db: Database,
    }

    fn harness_with(channel: MockChannel, engine: MockEngine) -> Harness {
        let db = Database::in_memory().unwrap();
        let channel = Arc::new(channel);
        let engine = Arc::new(engine);
        let identity = Arc::new(MockIdentity::new().with_profile("42", "Ada"));
        let directory: Arc<dyn SubscriberDirectory> = Arc::new(SubscriberRepo::new(db.clone()));
        let sessions = Arc::new(IdentityCache::new(100, identity.clone(), directory));
        let scheduler = Arc::new(DeliveryScheduler::new(
            channel.clone(),
            SchedulerConfig {
                spacing: SPACING,
                lane_idle: Duration::from_secs(30),
            },
        ));
        let controller = TurnController::new(
            sessions,
            scheduler,
            ActionHandler::new(db.clone()),
            engine.clone(),
            channel.clone(),
        );
        Harness {
            controller,
            channel,
            identity,
            engine,
            db,
        }
    }

    fn harness() -> Harness {
        harness_with(MockChannel::default(), MockEngine::new(Vec::new()))
    }

    fn card(title: &str) -> Fragment {
        Fragment::Card(Card {
            title: title.into(),
            subtitle: None,
            image_url: None,
            buttons: vec![],
        })
    }

    async fn settle(outcome: TurnOutcome) -> Vec<Vec<crate::scheduler::DeliveryOutcome>> {
        if let Some(profile) = outcome.profile {
            let _ = profile.await;
        }
        let mut all = Vec::new();
        for ticket in outcome.deliveries {
            all.push(ticket.outcomes().await);
        }
        all
    }

    #[tokio::test(start_paused = true)]
    async fn lone_text_fragment_goes_out_immediately() {
        let h = harness();
        let start = Instant::now();
        let outcome = h.controller.handle_fulfillment(
            &SenderId::new("42"),
            Fulfillment {
                speech: Some("Hello".into()),
                fragments: vec![Fragment::text("Hello")],
                ..Default::default()
            },
        );
        assert_eq!(outcome.replies, vec![Reply::Speech]);
        settle(outcome).await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text(), Some("Hello"));
        assert_eq!(sent[0].issued_at, start);
    }

    #[tokio::test(start_paused = true)]
    async fn structured_reply_is_batched_and_paced() {
        let h = harness();
        let start = Instant::now();
        let outcome = h.controller.handle_fulfillment(
            &SenderId::new("42"),
            Fulfillment {
                speech: Some("ignored".into()),
                fragments: vec![
                    Fragment::text("Here are some options"),
                    card("a"),
                    card("b"),
                    Fragment::quick_replies("Pick", vec![QuickReply::echo("a")]),
                ],
                ..Default::default()
            },
        );
        assert_eq!(outcome.replies, vec![Reply::Structured { units: 3 }]);
        settle(outcome).await;

        let sent = h.channel.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].text(), Some("Here are some options"));
        assert_eq!(sent[2].text(), Some("Pick"));
        for (i, msg) in sent.iter().enumerate() {
            assert_eq!(msg.issued_at, start + SPACING * i as u32);
        }
    }

    #[tokio::test]
    async fn fallback_only_without_action_speech_or_fragments() {
        let h = harness();
        let sender = SenderId::new("42");

        let outcome = h.controller.handle_fulfillment(&sender, Fulfillment::default());
        assert_eq!(outcome.replies, vec![Reply::Fallback]);
        settle(outcome).await;
        assert_eq!(h.channel.texts(), vec![FALLBACK_TEXT]);

        let with_action = Fulfillment {
            action: Some("input.welcome".into()),
            ..Default::default()
        };
        let outcome = h.controller.handle_fulfillment(&sender, with_action);
        assert_eq!(
            outcome.replies,
            vec![Reply::Action {
                name: "input.welcome".into(),
                units: 0
            }]
        );
        assert!(outcome.deliveries.is_empty());

        let with_cards = Fulfillment {
            fragments: vec![card("only")],
            ..Default::default()
        };
        let outcome = h.controller.handle_fulfillment(&sender, with_cards);
        assert_eq!(outcome.replies, vec![Reply::Structured { units: 1 }]);

        let lone_text = Fulfillment {
            fragments: vec![Fragment::text("from fragment")],
            ..Default::default()
        };
        let outcome = h.controller.handle_fulfillment(&sender, lone_text);
        assert_eq!(outcome.replies, vec![Reply::Speech]);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_fragment_is_skipped_not_merged() {
        let h = harness();
        let outcome = h.controller.handle_fulfillment(
            &SenderId::new("42"),
            Fulfillment {
                speech: Some("Hello".into()),
                fragments: vec![
                    Fragment::text("Hello"),
                    Fragment::Unsupported {
                        reason: "unknown message type 9".into(),
                    },
                ],
                ..Default::default()
            },
        );
        assert_eq!(outcome.replies, vec![Reply::Structured { units: 2 }]);
        let results = settle(outcome).await.remove(0);
        assert!(results[0].is_sent());
        assert!(matches!(results[1].outcome, UnitOutcome::Skipped(_)));
        assert_eq!(h.channel.texts(), vec!["Hello"]);
    }

    #[tokio::test]
    async fn raw_reply_passes_through() {
        let h = harness();
        let payload = json!({"attachment": {"type": "template"}});
        let outcome = h.controller.handle_fulfillment(
            &SenderId::new("42"),
            Fulfillment {
                speech: Some("text".into()),
                raw_reply: Some(payload.clone()),
                ..Default::default()
            },
        );
        assert_eq!(outcome.replies, vec![Reply::Raw]);
        settle(outcome).await;
        assert_eq!(
            h.channel.sent()[0].message,
            reactrack_core::message::OutboundMessage::Raw(payload)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn action_reply_precedes_fragment_reply() {
        let h = harness();
        let sender = SenderId::new("42");
        let outcome = h.controller.handle_fulfillment(
            &sender,
            Fulfillment {
                action: Some("check_reminder".into()),
                fragments: vec![Fragment::text("one"), Fragment::text("two")],
                ..Default::default()
            },
        );
        assert_eq!(
            outcome.replies,
            vec![
                Reply::Action {
                    name: "check_reminder".into(),
                    units: 2
                },
                Reply::Structured { units: 2 },
            ]
        );
        settle(outcome).await;
        assert_eq!(
            h.channel.texts(),
            vec![
                "You don't seem to have any reminder.",
                "What would you like to do?",
                "one",
                "two"
            ]
        );
    }

    #[tokio::test]
    async fn action_persists_for_registered_sender() {
        let h = harness();
        let sender = SenderId::new("42");
        let params = Parameters::new().with("medication", "Zoloft").with("number", 2.0);
        let outcome = h.controller.handle_fulfillment(
            &sender,
            Fulfillment {
                action: Some("prescribed_med".into()),
                parameters: params.clone(),
                speech: Some("Got it".into()),
                ..Default::default()
            },
        );
        // First contact: the subscriber row appears once the profile resolves.
        settle(outcome).await;
        assert!(h.channel.sent().is_empty());

        let outcome = h.controller.handle_fulfillment(
            &sender,
            Fulfillment {
                action: Some("prescribed_med".into()),
                parameters: params,
                ..Default::default()
            },
        );
        assert!(outcome.profile.is_none());
        settle(outcome).await;

        let row = SubscriberRepo::new(h.db.clone()).get(&sender).unwrap();
        assert_eq!(row.profile.first_name, "Ada");
        assert_eq!(row.medication.name.as_deref(), Some("Zoloft"));
        assert_eq!(row.medication.schedule, Some(2));
        assert_eq!(h.identity.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_does_not_hold_back_the_rest() {
        let h = harness_with(
            MockChannel::new(vec![
                MockSend::Fail(ChannelError::RateLimited),
                MockSend::delayed(Duration::from_secs(5), MockSend::Accept),
            ]),
            MockEngine::new(Vec::new()),
        );
        let start = Instant::now();
        let outcome = h.controller.handle_fulfillment(
            &SenderId::new("42"),
            Fulfillment {
                fragments: vec![
                    Fragment::text("a"),
                    Fragment::text("b"),
                    Fragment::text("c"),
                ],
                ..Default::default()
            },
        );
        let results = settle(outcome).await.remove(0);
        assert!(matches!(results[0].outcome, UnitOutcome::Failed(_)));
        assert!(results[1].is_sent());
        assert!(results[2].is_sent());
        assert_eq!(results[2].issued_at, Some(start + SPACING * 2));
    }

    #[tokio::test]
    async fn handle_text_queries_engine_with_session() {
        let h = harness_with(MockChannel::default(), MockEngine::speech("Hi there"));
        let sender = SenderId::new("42");

        let outcome = h.controller.handle_text(&sender, "hello").await.unwrap();
        let session = outcome.session.clone();
        settle(outcome).await;
        tokio::task::yield_now().await;

        let queries = h.engine.queries();
        assert_eq!(queries, vec![("hello".to_string(), session.session_id)]);
        assert_eq!(h.channel.texts(), vec!["Hi there"]);
        let actions: Vec<SenderAction> = h.channel.actions().into_iter().map(|(_, a)| a).collect();
        assert!(actions.contains(&SenderAction::MarkSeen));
        assert!(actions.contains(&SenderAction::TypingOn));
        assert!(actions.contains(&SenderAction::TypingOff));
    }

    #[tokio::test(start_paused = true)]
    async fn lone_text_behind_a_paced_run_keeps_spacing() {
        let h = harness();
        let sender = SenderId::new("42");
        let start = Instant::now();

        let first = h.controller.handle_fulfillment(
            &sender,
            Fulfillment {
                fragments: vec![Fragment::text("a"), Fragment::text("b")],
                ..Default::default()
            },
        );
        let second = h.controller.handle_fulfillment(
            &sender,
            Fulfillment {
                speech: Some("c".into()),
                ..Default::default()
            },
        );
        assert_eq!(second.replies, vec![Reply::Speech]);
        settle(first).await;
        let later = settle(second).await.remove(0);
        assert_eq!(later[0].issued_at, Some(start + SPACING * 2));
    }

    #[tokio::test]
    async fn engine_failure_surfaces_as_error() {
        let h = harness_with(
            MockChannel::default(),
            MockEngine::new(vec![Err(FulfillmentError::Transport("down".into()))]),
        );
        let err = h
            .controller
            .handle_text(&SenderId::new("42"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Fulfillment(_)));
        assert!(h.channel.sent().is_empty());
    }
}
