pub mod adherence;
pub mod database;
pub mod drugs;
pub mod error;
pub mod phq9;
pub mod schema;
pub mod subscribers;
pub mod symptoms;

pub use adherence::{AdherenceRepo, AdherenceRow};
pub use database::Database;
pub use drugs::DrugRepo;
pub use error::StoreError;
pub use phq9::{Phq9Repo, PHQ9_TOTAL_ITEM};
pub use subscribers::{Medication, SubscriberRepo, SubscriberRow};
pub use symptoms::SymptomRepo;

/// Timestamp format used for every `*_at` column.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
