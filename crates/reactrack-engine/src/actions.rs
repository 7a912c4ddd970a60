//! Persistence side effects and scripted replies for resolved actions.
//!
//! One arm per [`Action`] variant. Each arm performs its store write (if
//! any) and returns the units to deliver, possibly none.

use tracing::{debug, info, warn};

use reactrack_core::action::Action;
use reactrack_core::fragment::{BatchUnit, Fragment, QuickReply};
use reactrack_core::ids::SenderId;
use reactrack_store::{
    AdherenceRepo, Database, DrugRepo, Phq9Repo, StoreError, SubscriberRepo, SymptomRepo,
};

use crate::error::EngineError;

/// How many reference terms a drug lookup reply lists.
pub const DRUG_TERM_LIMIT: usize = 5;

const NOTHING_ELSE: &str = "Nothing, I am good";
const SET_REMINDER: &str = "Set a new reminder";

fn quick_replies(prompt: &str, options: &[&str]) -> BatchUnit {
    BatchUnit::single(Fragment::quick_replies(
        prompt,
        options.iter().copied().map(QuickReply::echo).collect(),
    ))
}

fn follow_up() -> BatchUnit {
    quick_replies(
        "Anything else you would like to do?",
        &["Check my reminder", "Share my mood", "Know another drug", NOTHING_ELSE],
    )
}

#[derive(Clone)]
pub struct ActionHandler {
    subscribers: SubscriberRepo,
    adherence: AdherenceRepo,
    phq9: Phq9Repo,
    symptoms: SymptomRepo,
    drugs: DrugRepo,
}

impl ActionHandler {
    pub fn new(db: Database) -> Self {
        Self {
            subscribers: SubscriberRepo::new(db.clone()),
            adherence: AdherenceRepo::new(db.clone()),
            phq9: Phq9Repo::new(db.clone()),
            symptoms: SymptomRepo::new(db.clone()),
            drugs: DrugRepo::new(db),
        }
    }

    /// Apply `action` for `sender` and build its reply.
    ///
    /// `speech` is the engine's plain response text; only unhandled actions
    /// echo it back.
    pub fn handle(
        &self,
        sender: &SenderId,
        action: &Action,
        speech: Option<&str>,
    ) -> Result<Vec<BatchUnit>, EngineError> {
        debug!(sender_id = %sender, action = action.name(), "handling action");
        match action {
            Action::Phq9Answer { item, score } => {
                self.phq9.record(sender, *item, *score)?;
                if *item == 9 {
                    if let Some(total) = self.phq9.record_total(sender)? {
                        info!(sender_id = %sender, total, "questionnaire completed");
                    }
                }
                Ok(Vec::new())
            }
            Action::PrescribedMedication { name, schedule } => {
                match (name, schedule) {
                    (Some(name), Some(schedule)) => {
                        self.subscribers.set_medication(sender, name, *schedule)?
                    }
                    _ => debug!(sender_id = %sender, "prescription incomplete, not stored"),
                }
                Ok(Vec::new())
            }
            Action::SetReminder { time } => {
                self.subscribers.set_reminder(sender, time.as_deref())?;
                Ok(Vec::new())
            }
            Action::DeleteReminder => {
                self.subscribers.clear_reminder(sender)?;
                Ok(Vec::new())
            }
            Action::MedicationTaken { taken } => {
                // Anything but an explicit "false" counts as taken.
                let taken = taken
                    .as_deref()
                    .map_or(true, |t| !t.trim().eq_ignore_ascii_case("false"));
                self.adherence.record_taken(sender, taken)?;
                Ok(Vec::new())
            }
            Action::MedicationNotTaken { reason } => {
                self.adherence
                    .record_missed(sender, reason.as_deref().unwrap_or_default())?;
                Ok(Vec::new())
            }
            Action::MedicationEffectiveness { rating } => {
                match rating {
                    Some(rating) => self.adherence.rate_latest(sender, *rating)?,
                    None => warn!(sender_id = %sender, "effectiveness without a rating"),
                }
                Ok(Vec::new())
            }
            Action::CheckReminder => self.check_reminder(sender),
            Action::Symptom { symptom } => {
                if let Some(symptom) = symptom {
                    self.symptoms.record(sender, symptom)?;
                }
                Ok(Vec::new())
            }
            Action::DrugUsage { medication } => match medication {
                None => Ok(vec![BatchUnit::text("Usage of what medication?")]),
                Some(m) => {
                    let terms = self.drugs.indications(m, DRUG_TERM_LIMIT)?;
                    Ok(drug_reply(format!("The most common usage of {m} is"), terms))
                }
            },
            Action::DrugSideEffects { medication } => match medication {
                None => Ok(vec![BatchUnit::text("Side effect of what medication?")]),
                Some(m) => {
                    let terms = self.drugs.side_effects(m, DRUG_TERM_LIMIT)?;
                    Ok(drug_reply(
                        format!("The most common reported side effects of {m} include:"),
                        terms,
                    ))
                }
            },
            Action::Other(name) => {
                debug!(sender_id = %sender, action = %name, "no handler, replying with speech");
                Ok(speech
                    .filter(|s| !s.is_empty())
                    .map(|s| vec![BatchUnit::text(s)])
                    .unwrap_or_default())
            }
        }
    }

    fn check_reminder(&self, sender: &SenderId) -> Result<Vec<BatchUnit>, EngineError> {
        let medication = match self.subscribers.get(sender) {
            Ok(row) => Some(row.medication),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let reminder = medication
            .as_ref()
            .and_then(|m| m.active_reminder().map(|time| (m.name.as_deref(), time)));

        Ok(match reminder {
            Some((name, time)) => vec![
                BatchUnit::text("You have the following reminder:"),
                BatchUnit::text(format!("{} - {}", name.unwrap_or("medication"), time)),
                quick_replies(
                    "What would you like to do on your reminder?",
                    &[SET_REMINDER, "Delete a reminder", "Nope, nothing"],
                ),
            ],
            None => vec![
                BatchUnit::text("You don't seem to have any reminder."),
                quick_replies("What would you like to do?", &[SET_REMINDER, NOTHING_ELSE]),
            ],
        })
    }
}

fn drug_reply(intro: String, terms: Vec<String>) -> Vec<BatchUnit> {
    let mut units = Vec::with_capacity(terms.len() + 2);
    units.push(BatchUnit::text(intro));
    units.extend(terms.into_iter().map(BatchUnit::text));
    units.push(follow_up());
    units
}
