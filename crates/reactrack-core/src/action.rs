//! Closed set of actions the intent engine can resolve.
//!
//! Each variant carries the parameters its handler needs, already extracted
//! from the raw parameter mapping. Unknown names land in [`Action::Other`].

use crate::fulfillment::Parameters;

/// Answer-to-score mapping for a PHQ-9 item response.
pub fn phq9_score(response: Option<&str>) -> i64 {
    match response {
        Some("Not at all") => 0,
        Some("Several days") => 1,
        Some("Nearly every day") => 3,
        _ => 2,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Answer to PHQ-9 item `item` (1..=9).
    Phq9Answer { item: u8, score: i64 },
    PrescribedMedication {
        name: Option<String>,
        schedule: Option<i64>,
    },
    SetReminder { time: Option<String> },
    DeleteReminder,
    MedicationTaken { taken: Option<String> },
    MedicationNotTaken { reason: Option<String> },
    MedicationEffectiveness { rating: Option<i64> },
    CheckReminder,
    Symptom { symptom: Option<String> },
    DrugUsage { medication: Option<String> },
    DrugSideEffects { medication: Option<String> },
    Other(String),
}

impl Action {
    pub fn parse(name: &str, params: &Parameters, resolved_query: Option<&str>) -> Self {
        if let Some(item) = name.strip_prefix("phq9_").and_then(|n| n.parse::<u8>().ok()) {
            if (1..=9).contains(&item) {
                let response = params.text("phq-9-res");
                return Self::Phq9Answer {
                    item,
                    score: phq9_score(response.as_deref()),
                };
            }
        }

        match name {
            "prescribed_med" => Self::PrescribedMedication {
                name: params.text("medication"),
                schedule: params.integer("number"),
            },
            "med_reminder" | "set_new_reminder" => Self::SetReminder {
                time: params.text("time"),
            },
            "delete_reminder" => Self::DeleteReminder,
            "med_taken" => Self::MedicationTaken {
                taken: params.text("med_taken"),
            },
            "med_not_taken" => Self::MedicationNotTaken {
                reason: resolved_query.filter(|q| !q.is_empty()).map(str::to_owned),
            },
            "med_effectiveness" => Self::MedicationEffectiveness {
                rating: params.integer("effectiveness"),
            },
            "check_reminder" => Self::CheckReminder,
            "symptom" => Self::Symptom {
                symptom: params.text("symptom"),
            },
            "user_sider_usage" => Self::DrugUsage {
                medication: params.text("medication"),
            },
            "user_sider_effect" => Self::DrugSideEffects {
                medication: params.text("medication"),
            },
            other => Self::Other(other.to_owned()),
        }
    }

    /// Name used in log records.
    pub fn name(&self) -> &str {
        match self {
            Self::Phq9Answer { .. } => "phq9_answer",
            Self::PrescribedMedication { .. } => "prescribed_medication",
            Self::SetReminder { .. } => "set_reminder",
            Self::DeleteReminder => "delete_reminder",
            Self::MedicationTaken { .. } => "medication_taken",
            Self::MedicationNotTaken { .. } => "medication_not_taken",
            Self::MedicationEffectiveness { .. } => "medication_effectiveness",
            Self::CheckReminder => "check_reminder",
            Self::Symptom { .. } => "symptom",
            Self::DrugUsage { .. } => "drug_usage",
            Self::DrugSideEffects { .. } => "drug_side_effects",
            Self::Other(name) => name,
        }
    }
}
