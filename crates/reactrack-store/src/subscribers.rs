use async_trait::async_trait;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use reactrack_core::errors::IdentityError;
use reactrack_core::identity::{Profile, SubscriberDirectory};
use reactrack_core::ids::SenderId;

use crate::database::Database;
use crate::error::StoreError;

/// Prescribed medication and its reminder, as captured in conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: Option<String>,
    pub schedule: Option<i64>,
    pub reminder: Option<String>,
}

impl Medication {
    /// A reminder counts only when it is a non-empty string.
    pub fn active_reminder(&self) -> Option<&str> {
        self.reminder.as_deref().filter(|r| !r.is_empty())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriberRow {
    pub sender_id: SenderId,
    pub profile: Profile,
    pub medication: Medication,
    pub start_time: String,
}

const SELECT_COLUMNS: &str = "sender_id, first_name, last_name, locale, timezone, gender, \
     medication_name, medication_schedule, reminder, start_time";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriberRow> {
    Ok(SubscriberRow {
        sender_id: SenderId::new(row.get::<_, String>(0)?),
        profile: Profile {
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            locale: row.get(3)?,
            timezone: row.get(4)?,
            gender: row.get(5)?,
        },
        medication: Medication {
            name: row.get(6)?,
            schedule: row.get(7)?,
            reminder: row.get(8)?,
        },
        start_time: row.get(9)?,
    })
}

#[derive(Clone)]
pub struct SubscriberRepo {
    db: Database,
}

impl SubscriberRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a subscriber unless one already exists for this sender.
    /// Returns whether a row was written.
    #[instrument(skip(self, profile), fields(sender_id = %sender))]
    pub fn insert_if_absent(&self, sender: &SenderId, profile: &Profile) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO subscribers
                    (sender_id, first_name, last_name, locale, timezone, gender, start_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    sender.as_str(),
                    profile.first_name,
                    profile.last_name,
                    profile.locale,
                    profile.timezone,
                    profile.gender,
                    crate::now(),
                ],
            )?;
            if inserted == 0 {
                debug!("subscriber already exists");
            }
            Ok(inserted == 1)
        })
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn get(&self, sender: &SenderId) -> Result<SubscriberRow, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM subscribers WHERE sender_id = ?1"),
                [sender.as_str()],
                map_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("subscriber {sender}")))
        })
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn set_medication(&self, sender: &SenderId, name: &str, schedule: i64) -> Result<(), StoreError> {
        self.update(
            sender,
            "UPDATE subscribers SET medication_name = ?2, medication_schedule = ?3 WHERE sender_id = ?1",
            rusqlite::params![sender.as_str(), name, schedule],
        )
    }

    /// Set the reminder time. `None` stores an empty reminder.
    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn set_reminder(&self, sender: &SenderId, time: Option<&str>) -> Result<(), StoreError> {
        self.update(
            sender,
            "UPDATE subscribers SET reminder = ?2 WHERE sender_id = ?1",
            rusqlite::params![sender.as_str(), time.unwrap_or("")],
        )
    }

    #[instrument(skip(self), fields(sender_id = %sender))]
    pub fn clear_reminder(&self, sender: &SenderId) -> Result<(), StoreError> {
        self.set_reminder(sender, None)
    }

    fn update(
        &self,
        sender: &SenderId,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(sql, params)?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("subscriber {sender}")));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl SubscriberDirectory for SubscriberRepo {
    async fn register(&self, sender: &SenderId, profile: &Profile) -> Result<bool, IdentityError> {
        self.insert_if_absent(sender, profile)
            .map_err(|e| IdentityError::Directory(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SubscriberRepo {
        SubscriberRepo::new(Database::in_memory().unwrap())
    }

    fn profile(first: &str) -> Profile {
        Profile {
            first_name: first.into(),
            last_name: Some("Doe".into()),
            locale: Some("en_US".into()),
            timezone: Some(-5.0),
            gender: None,
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let repo = repo();
        let id = SenderId::new("100");
        assert!(repo.insert_if_absent(&id, &profile("Jane")).unwrap());
        assert!(!repo.insert_if_absent(&id, &profile("Other")).unwrap());

        let row = repo.get(&id).unwrap();
        assert_eq!(row.profile.first_name, "Jane");
        assert_eq!(row.profile.timezone, Some(-5.0));
        assert_eq!(row.medication, Medication::default());
    }

    #[test]
    fn get_missing_is_not_found() {
        let err = repo().get(&SenderId::new("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn medication_and_reminder_updates() {
        let repo = repo();
        let id = SenderId::new("100");
        repo.insert_if_absent(&id, &profile("Jane")).unwrap();

        repo.set_medication(&id, "Zoloft", 2).unwrap();
        repo.set_reminder(&id, Some("08:00:00")).unwrap();
        let med = repo.get(&id).unwrap().medication;
        assert_eq!(med.name.as_deref(), Some("Zoloft"));
        assert_eq!(med.schedule, Some(2));
        assert_eq!(med.active_reminder(), Some("08:00:00"));

        repo.clear_reminder(&id).unwrap();
        let med = repo.get(&id).unwrap().medication;
        assert_eq!(med.reminder.as_deref(), Some(""));
        assert!(med.active_reminder().is_none());
    }

    #[test]
    fn update_unknown_subscriber_is_not_found() {
        let err = repo().set_reminder(&SenderId::new("x"), Some("9am")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn directory_registration() {
        let repo = repo();
        let id = SenderId::new("7");
        assert!(repo.register(&id, &profile("A")).await.unwrap());
        assert!(!repo.register(&id, &profile("A")).await.unwrap());
    }
}
