use serde::{Deserialize, Serialize};
use tracing::instrument;

use reactrack_core::ids::SenderId;

use crate::database::Database;
use crate::error::StoreError;

/// Reason stored for a dose that was taken.
pub const TAKEN_REASON: &str = "NA";
/// Effectiveness recorded alongside a missed dose.
pub const MISSED_EFFECTIVENESS: i64 = -1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdherenceRow {
    pub id: i64,
    pub taken: bool,
    pub reason: String,
    pub effectiveness: Option<i64>,
    pub recorded_at: String,
}

/// Daily medication log: one row per reported dose.
#[derive(Clone)]
pub struct AdherenceRepo {
    db: Database,
}

impl AdherenceRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn record_taken(&self, sender: &SenderId, taken: bool) -> Result<i64, StoreError> {
        self.insert(sender, taken, TAKEN_REASON, None)
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn record_missed(&self, sender: &SenderId, reason: &str) -> Result<i64, StoreError> {
        self.insert(sender, false, reason, Some(MISSED_EFFECTIVENESS))
    }

    /// Attach an effectiveness rating to the sender's most recent entry.
    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn rate_latest(&self, sender: &SenderId, rating: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE adherence_log SET effectiveness = ?2
                 WHERE id = (SELECT MAX(id) FROM adherence_log WHERE sender_id = ?1)",
                rusqlite::params![sender.as_str(), rating],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("adherence log for {sender}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn history(&self, sender: &SenderId) -> Result<Vec<AdherenceRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, taken, reason, effectiveness, recorded_at
                 FROM adherence_log WHERE sender_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([sender.as_str()], |row| {
                    Ok(AdherenceRow {
                        id: row.get(0)?,
                        taken: row.get(1)?,
                        reason: row.get(2)?,
                        effectiveness: row.get(3)?,
                        recorded_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn insert(
        &self,
        sender: &SenderId,
        taken: bool,
        reason: &str,
        effectiveness: Option<i64>,
    ) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO adherence_log (sender_id, taken, reason, effectiveness, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![sender.as_str(), taken, reason, effectiveness, crate::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> AdherenceRepo {
        AdherenceRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn taken_and_missed_entries() {
        let repo = repo();
        let id = SenderId::new("1");
        repo.record_taken(&id, true).unwrap();
        repo.record_missed(&id, "I forgot").unwrap();

        let history = repo.history(&id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].taken);
        assert_eq!(history[0].reason, "NA");
        assert_eq!(history[0].effectiveness, None);
        assert!(!history[1].taken);
        assert_eq!(history[1].reason, "I forgot");
        assert_eq!(history[1].effectiveness, Some(-1));
    }

    #[test]
    fn rating_attaches_to_latest_entry_of_sender() {
        let repo = repo();
        let a = SenderId::new("a");
        let b = SenderId::new("b");
        repo.record_taken(&a, true).unwrap();
        repo.record_taken(&a, true).unwrap();
        repo.record_taken(&b, true).unwrap();

        repo.rate_latest(&a, 4).unwrap();

        let history = repo.history(&a).unwrap();
        assert_eq!(history[0].effectiveness, None);
        assert_eq!(history[1].effectiveness, Some(4));
        assert_eq!(repo.history(&b).unwrap()[0].effectiveness, None);
    }

    #[test]
    fn rating_without_entries_is_not_found() {
        let err = repo().rate_latest(&SenderId::new("x"), 3).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
