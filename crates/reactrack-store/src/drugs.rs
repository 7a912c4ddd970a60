//! Read-only drug reference lookups.
//!
//! Brand names resolve to a drug id through `drug_synonyms`; indications
//! and side effects reference MedDRA terms by id.

use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone)]
pub struct DrugRepo {
    db: Database,
}

impl DrugRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Indication terms for a brand name.
    #[instrument(skip(self))]
    pub fn indications(&self, brand_name: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.terms(
            "SELECT m.symptom
             FROM drug_indications i
             JOIN meddra_terms m ON m.meddra_id = i.meddra_id
             WHERE i.drug_id = (
                 SELECT drug_id FROM drug_synonyms
                 WHERE brand_name = ?1 COLLATE NOCASE LIMIT 1
             )
             ORDER BY i.rowid
             LIMIT ?2",
            brand_name,
            limit,
        )
    }

    /// Side-effect terms for a brand name, most frequently reported first.
    #[instrument(skip(self))]
    pub fn side_effects(&self, brand_name: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.terms(
            "SELECT m.symptom
             FROM drug_side_effects s
             JOIN meddra_terms m ON m.meddra_id = s.meddra_id
             WHERE s.drug_id = (
                 SELECT drug_id FROM drug_synonyms
                 WHERE brand_name = ?1 COLLATE NOCASE LIMIT 1
             )
             ORDER BY s.frequency DESC
             LIMIT ?2",
            brand_name,
            limit,
        )
    }

    fn terms(&self, sql: &str, brand_name: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let limit = i64::try_from(limit).map_err(|_| StoreError::Invalid("limit".into()))?;
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(rusqlite::params![brand_name, limit], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Seed a small reference set: "Zoloft" (drug D1) with two indications
    /// and six side effects of increasing frequency.
    pub(crate) fn seed(db: &Database) {
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO drug_synonyms VALUES ('D1', 'Zoloft');
                 INSERT INTO meddra_terms VALUES ('M1', 'Depression'), ('M2', 'Panic disorder'),
                     ('S1', 'Nausea'), ('S2', 'Insomnia'), ('S3', 'Diarrhoea'),
                     ('S4', 'Dry mouth'), ('S5', 'Dizziness'), ('S6', 'Fatigue');
                 INSERT INTO drug_indications VALUES ('D1', 'M1'), ('D1', 'M2');
                 INSERT INTO drug_side_effects VALUES ('D1', 'S1', 0.25), ('D1', 'S2', 0.20),
                     ('D1', 'S3', 0.15), ('D1', 'S4', 0.10), ('D1', 'S5', 0.05), ('D1', 'S6', 0.01);",
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn indications_by_brand_name() {
        let db = Database::in_memory().unwrap();
        seed(&db);
        let repo = DrugRepo::new(db);
        assert_eq!(
            repo.indications("zoloft", 5).unwrap(),
            vec!["Depression", "Panic disorder"]
        );
    }

    #[test]
    fn side_effects_ordered_and_limited() {
        let db = Database::in_memory().unwrap();
        seed(&db);
        let repo = DrugRepo::new(db);
        assert_eq!(
            repo.side_effects("Zoloft", 5).unwrap(),
            vec!["Nausea", "Insomnia", "Diarrhoea", "Dry mouth", "Dizziness"]
        );
    }

    #[test]
    fn unknown_drug_and_injection_attempt_are_empty() {
        let db = Database::in_memory().unwrap();
        seed(&db);
        let repo = DrugRepo::new(db);
        assert!(repo.indications("Aspirin", 5).unwrap().is_empty());
        assert!(repo
            .side_effects("\" OR 1=1 --", 5)
            .unwrap()
            .is_empty());
    }
}
