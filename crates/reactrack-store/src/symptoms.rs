use tracing::instrument;

use reactrack_core::ids::SenderId;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone)]
pub struct SymptomRepo {
    db: Database,
}

impl SymptomRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn record(&self, sender: &SenderId, symptom: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO symptom_log (sender_id, symptom, recorded_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![sender.as_str(), symptom, crate::now()],
            )?;
            Ok(())
        })
    }

    /// Reported symptoms, oldest first.
    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn list(&self, sender: &SenderId) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT symptom FROM symptom_log WHERE sender_id = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map([sender.as_str()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}
