//! Paced, ordered delivery of batch units.
//!
//! Every recipient gets a lane: an unbounded queue drained by one worker
//! task. The worker issues units strictly in queue order and keeps at
//! least `spacing` between two issuances to the same recipient. Issuing a
//! unit spawns its send call and moves on; the worker never waits for a
//! call to complete, so a slow or failing call delays nothing behind it.
//!
//! Lanes are created on demand and torn down after `lane_idle` without
//! work, but never sooner than `spacing` after their last issuance: a fresh
//! lane has no history and issues its first unit at once. Teardown happens
//! under the map's shard lock and only when the queue is empty, so an
//! enqueue either lands in the live lane or creates a fresh one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use reactrack_core::channel::{SendChannel, SendReceipt};
use reactrack_core::errors::ChannelError;
use reactrack_core::fragment::{BatchUnit, Fragment};
use reactrack_core::ids::SenderId;
use reactrack_core::message::OutboundMessage;
use reactrack_telemetry::{transcript, Direction};

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Minimum gap between consecutive issuances to one recipient.
    pub spacing: Duration,
    /// Idle time after which a recipient's lane is dropped. Values below
    /// `spacing` are raised to `spacing`.
    pub lane_idle: Duration,
}

impl SchedulerConfig {
    /// How long a lane waits for work before closing.
    pub fn idle_timeout(&self) -> Duration {
        self.lane_idle.max(self.spacing)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            spacing: Duration::from_millis(1100),
            lane_idle: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub enum UnitOutcome {
    Sent(SendReceipt),
    Failed(ChannelError),
    /// Never issued; the unit failed validation.
    Skipped(String),
}

/// Result of one unit of a delivery.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub index: usize,
    pub label: &'static str,
    /// When the send call was issued. `None` for skipped units.
    pub issued_at: Option<Instant>,
    pub outcome: UnitOutcome,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Sent(_))
    }
}

/// Receiver for the outcomes of one `deliver` call.
///
/// Dropping the ticket is fine; delivery continues regardless.
pub struct DeliveryTicket {
    rx: mpsc::UnboundedReceiver<DeliveryOutcome>,
    units: usize,
}

impl DeliveryTicket {
    /// Number of units enqueued.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Wait for every unit to resolve. Outcomes are sorted by unit index.
    pub async fn outcomes(mut self) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(self.units);
        while let Some(outcome) = self.rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }
}

struct Job {
    units: Vec<BatchUnit>,
    report: mpsc::UnboundedSender<DeliveryOutcome>,
}

struct Lane {
    tx: mpsc::UnboundedSender<Job>,
    generation: u64,
}

type Lanes = DashMap<SenderId, Lane>;

pub struct DeliveryScheduler {
    channel: Arc<dyn SendChannel>,
    lanes: Arc<Lanes>,
    config: SchedulerConfig,
    next_generation: AtomicU64,
}

impl DeliveryScheduler {
    pub fn new(channel: Arc<dyn SendChannel>, config: SchedulerConfig) -> Self {
        Self {
            channel,
            lanes: Arc::new(DashMap::new()),
            config,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Number of recipients with a live lane.
    pub fn active_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Queue `units` for `recipient` behind anything already queued.
    ///
    /// The first unit on an idle lane is issued at once; every later unit
    /// waits until `spacing` has passed since the previous issuance. Must be
    /// called from within a tokio runtime.
    pub fn deliver(&self, recipient: &SenderId, units: Vec<BatchUnit>) -> DeliveryTicket {
        let (report, rx) = mpsc::unbounded_channel();
        let ticket = DeliveryTicket {
            rx,
            units: units.len(),
        };
        if units.is_empty() {
            return ticket;
        }

        let mut job = Job { units, report };
        loop {
            let lane = self
                .lanes
                .entry(recipient.clone())
                .or_insert_with(|| self.spawn_lane(recipient));
            match lane.tx.send(job) {
                Ok(()) => break,
                Err(mpsc::error::SendError(returned)) => {
                    // Worker is gone without deregistering; replace it.
                    warn!(recipient = %recipient, "delivery lane closed unexpectedly, respawning");
                    job = returned;
                    let generation = lane.generation;
                    drop(lane);
                    self.lanes
                        .remove_if(recipient, |_, l| l.generation == generation);
                }
            }
        }
        ticket
    }

    fn spawn_lane(&self, recipient: &SenderId) -> Lane {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let worker = LaneWorker {
            recipient: recipient.clone(),
            generation,
            channel: Arc::clone(&self.channel),
            lanes: Arc::clone(&self.lanes),
            config: self.config.clone(),
        };
        tokio::spawn(worker.run(rx));
        debug!(recipient = %recipient, generation, "delivery lane opened");
        Lane { tx, generation }
    }
}

struct LaneWorker {
    recipient: SenderId,
    generation: u64,
    channel: Arc<dyn SendChannel>,
    lanes: Arc<Lanes>,
    config: SchedulerConfig,
}

impl LaneWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Job>) {
        let mut last_issue: Option<Instant> = None;
        let idle = self.config.idle_timeout();
        loop {
            let job = match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => {
                    let removed = self.lanes.remove_if(&self.recipient, |_, lane| {
                        lane.generation == self.generation && rx.is_empty()
                    });
                    if removed.is_some() {
                        debug!(recipient = %self.recipient, "delivery lane idle, closing");
                        break;
                    }
                    continue;
                }
            };
            self.run_job(job, &mut last_issue).await;
        }
    }

    async fn run_job(&self, job: Job, last_issue: &mut Option<Instant>) {
        let Job { units, report } = job;

        for (index, unit) in units.into_iter().enumerate() {
            let label = unit.label();
            if let Err(reason) = unit.validate() {
                warn!(
                    recipient = %self.recipient,
                    unit_index = index,
                    unit = label,
                    reason = %reason,
                    "skipping malformed unit"
                );
                let _ = report.send(DeliveryOutcome {
                    index,
                    label,
                    issued_at: None,
                    outcome: UnitOutcome::Skipped(reason),
                });
                continue;
            }

            if let Some(last) = *last_issue {
                tokio::time::sleep_until(last + self.config.spacing).await;
            }
            let issued_at = Instant::now();
            *last_issue = Some(issued_at);
            self.issue(index, unit, issued_at, report.clone());
        }
    }

    /// Spawn the send call for one unit; the outcome goes to `report`.
    fn issue(
        &self,
        index: usize,
        unit: BatchUnit,
        issued_at: Instant,
        report: mpsc::UnboundedSender<DeliveryOutcome>,
    ) {
        let label = unit.label();
        log_outbound(&self.recipient, &unit);
        let message = OutboundMessage::from(&unit);
        let channel = Arc::clone(&self.channel);
        let recipient = self.recipient.clone();

        tokio::spawn(async move {
            let outcome = match channel.send(&recipient, &message).await {
                Ok(receipt) => UnitOutcome::Sent(receipt),
                Err(e) => {
                    warn!(
                        recipient = %recipient,
                        unit_index = index,
                        unit = label,
                        kind = e.error_kind(),
                        error = %e,
                        "send failed"
                    );
                    UnitOutcome::Failed(e)
                }
            };
            let _ = report.send(DeliveryOutcome {
                index,
                label,
                issued_at: Some(issued_at),
                outcome,
            });
        });
    }
}

fn log_outbound(recipient: &SenderId, unit: &BatchUnit) {
    let text = match unit {
        BatchUnit::Single {
            fragment: Fragment::Text { text },
        } => text,
        BatchUnit::Single {
            fragment: Fragment::QuickReplies { prompt, .. },
        } => prompt,
        _ => return,
    };
    transcript(Direction::Outbound, recipient.as_str(), text);
}
