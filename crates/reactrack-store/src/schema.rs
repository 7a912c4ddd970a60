/// SQL DDL for the reactrack database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS subscribers (
    sender_id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT,
    locale TEXT,
    timezone REAL,
    gender TEXT,
    medication_name TEXT,
    medication_schedule INTEGER,
    reminder TEXT,
    start_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS adherence_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id TEXT NOT NULL,
    taken INTEGER NOT NULL,
    reason TEXT NOT NULL,
    effectiveness INTEGER,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS phq9_answers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id TEXT NOT NULL,
    item INTEGER NOT NULL CHECK (item BETWEEN 0 AND 9),
    score INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS symptom_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id TEXT NOT NULL,
    symptom TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drug_synonyms (
    drug_id TEXT NOT NULL,
    brand_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drug_indications (
    drug_id TEXT NOT NULL,
    meddra_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS drug_side_effects (
    drug_id TEXT NOT NULL,
    meddra_id TEXT NOT NULL,
    frequency REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS meddra_terms (
    meddra_id TEXT PRIMARY KEY,
    symptom TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_adherence_sender ON adherence_log(sender_id, id);
CREATE INDEX IF NOT EXISTS idx_phq9_sender_item ON phq9_answers(sender_id, item, id);
CREATE INDEX IF NOT EXISTS idx_symptom_sender ON symptom_log(sender_id);
CREATE INDEX IF NOT EXISTS idx_synonyms_brand ON drug_synonyms(brand_name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_indications_drug ON drug_indications(drug_id);
CREATE INDEX IF NOT EXISTS idx_side_effects_drug ON drug_side_effects(drug_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
