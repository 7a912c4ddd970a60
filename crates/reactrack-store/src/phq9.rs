use rusqlite::OptionalExtension;
use tracing::{instrument, warn};

use reactrack_core::ids::SenderId;

use crate::database::Database;
use crate::error::StoreError;

/// Item number under which questionnaire totals are stored.
pub const PHQ9_TOTAL_ITEM: u8 = 0;

/// PHQ-9 questionnaire answers, one row per answer.
#[derive(Clone)]
pub struct Phq9Repo {
    db: Database,
}

impl Phq9Repo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn record(&self, sender: &SenderId, item: u8, score: i64) -> Result<(), StoreError> {
        if !(1..=9).contains(&item) {
            return Err(StoreError::Invalid(format!("phq-9 item {item}")));
        }
        self.insert(sender, item, score)
    }

    /// Latest score for one item.
    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn latest(&self, sender: &SenderId, item: u8) -> Result<Option<i64>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT score FROM phq9_answers
                     WHERE sender_id = ?1 AND item = ?2 ORDER BY id DESC LIMIT 1",
                    rusqlite::params![sender.as_str(), item],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Sum the latest answer of items 1 to 9 and append it as a total.
    ///
    /// Returns `None` without writing when any item is unanswered.
    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn record_total(&self, sender: &SenderId) -> Result<Option<i64>, StoreError> {
        let mut total = 0;
        for item in 1..=9 {
            match self.latest(sender, item)? {
                Some(score) => total += score,
                None => {
                    warn!(item, "questionnaire incomplete, total not recorded");
                    return Ok(None);
                }
            }
        }
        self.insert(sender, PHQ9_TOTAL_ITEM, total)?;
        Ok(Some(total))
    }

    fn insert(&self, sender: &SenderId, item: u8, score: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO phq9_answers (sender_id, item, score, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender.as_str(), item, score, crate::now()],
            )?;
            Ok(())
        })
    }
}
