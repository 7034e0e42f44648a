//! Patient record storage.
//!
//! Records live in a single SQLite table, `patients`, with one REAL column
//! per lab panel field in panel order. Ids come from `AUTOINCREMENT`, so they
//! are never reused, even after a restart.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::features::{FeatureVector, MISSING_VALUE};
use crate::schema::{FeatureField, FEATURE_COUNT};

const TABLE: &str = "patients";
const PROBABILITY_COLUMN: &str = "sepsis_probability";
const RECORDED_AT_COLUMN: &str = "recorded_at";

/// Errors from the patient store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Table layout does not match the lab panel: {0}")]
    LayoutMismatch(String),

    #[error("Probability must be a finite number, got {0}")]
    InvalidProbability(f64),
}

/// Row shown in the patient list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub probability: f64,
}

/// A saved scoring event with every lab value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub features: FeatureVector,
    pub probability: f64,
    /// Absent for rows written before the column existed
    pub recorded_at: Option<DateTime<Utc>>,
}

impl PatientRecord {
    /// Per-field history rows: every field in panel order, then the probability
    pub fn history(&self) -> Vec<(&'static str, f64)> {
        self.features
            .iter()
            .map(|(field, value)| (field.name(), value))
            .chain(std::iter::once(("Sepsis probability", self.probability)))
            .collect()
    }
}

/// Round a probability to the two decimals that get persisted.
///
/// Rounds the exact decimal value of `probability`, not `probability * 100`,
/// which can land on a false tie.
pub fn round_probability(probability: f64) -> f64 {
    format!("{:.2}", probability)
        .parse()
        .unwrap_or(probability)
}

/// SQLite-backed store owning all patient records
#[derive(Debug)]
pub struct PatientStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl PatientStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!(
            "Opened patient store at {:?} ({} records)",
            path,
            store.count()?
        );
        Ok(store)
    }

    /// Open a throwaway store held in memory
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(&format!(
            "PRAGMA synchronous=FULL;
             {};",
            create_table_sql()
        ))?;

        let store = Self { conn, path };
        store.check_layout()?;
        Ok(store)
    }

    /// Verify an existing table matches the panel, adding `recorded_at` if missing
    fn check_layout(&self) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", TABLE))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        let expected = value_columns();
        if columns.len() < expected.len() || columns[..expected.len()] != expected[..] {
            return Err(StoreError::LayoutMismatch(format!(
                "expected columns {:?}, found {:?}",
                expected, columns
            )));
        }

        if !columns.iter().any(|c| c == RECORDED_AT_COLUMN) {
            warn!("Adding missing {} column to {}", RECORDED_AT_COLUMN, TABLE);
            self.conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} TEXT;",
                TABLE, RECORDED_AT_COLUMN
            ))?;
        }

        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist a record and return its id.
    ///
    /// The probability is rounded to two decimals. The insert is committed
    /// before returning.
    pub fn save(
        &mut self,
        first_name: &str,
        last_name: &str,
        features: &FeatureVector,
        probability: f64,
    ) -> Result<i64, StoreError> {
        if !probability.is_finite() {
            return Err(StoreError::InvalidProbability(probability));
        }
        let rounded = round_probability(probability);
        let recorded_at = Utc::now().to_rfc3339();

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(FEATURE_COUNT + 4);
        params.push(&first_name);
        params.push(&last_name);
        for value in features.values() {
            params.push(value);
        }
        params.push(&rounded);
        params.push(&recorded_at);

        let tx = self.conn.transaction()?;
        tx.execute(&insert_sql(), params.as_slice())?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Saved patient record {} (probability {:.2})", id, rounded);
        Ok(id)
    }

    /// All records as `(id, first name, last name, probability)`, by id
    pub fn list_summary(&self) -> Result<Vec<PatientSummary>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, first_name, last_name, {} FROM {} ORDER BY id",
            PROBABILITY_COLUMN, TABLE
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(PatientSummary {
                id: row.get(0)?,
                first_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                last_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                probability: row.get::<_, Option<f64>>(3)?.unwrap_or(MISSING_VALUE),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Full record for `id`, or `None` if there is no such record
    pub fn get_full(&self, id: i64) -> Result<Option<PatientRecord>, StoreError> {
        let record = self
            .conn
            .query_row(&select_full_sql(), [id], record_from_row)
            .optional()?;
        if record.is_none() {
            debug!("No patient record with id {}", id);
        }
        Ok(record)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Close the connection, reporting any error from the final flush
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        debug!("Patient store closed");
        Ok(())
    }
}

/// `id`, names, panel fields and probability, in table order
fn value_columns() -> Vec<String> {
    let mut columns = vec!["id".to_string(), "first_name".into(), "last_name".into()];
    columns.extend(FeatureField::ALL.iter().map(|f| f.column().to_string()));
    columns.push(PROBABILITY_COLUMN.to_string());
    columns
}

fn field_columns() -> String {
    FeatureField::ALL
        .iter()
        .map(|f| f.column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql() -> String {
    let fields = FeatureField::ALL
        .iter()
        .map(|f| format!("{} REAL", f.column()))
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT,
    last_name TEXT,
    {},
    {} REAL,
    {} TEXT
)",
        TABLE, fields, PROBABILITY_COLUMN, RECORDED_AT_COLUMN
    )
}

fn insert_sql() -> String {
    let placeholders = (1..=FEATURE_COUNT + 4)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} (first_name, last_name, {}, {}, {}) VALUES ({})",
        TABLE,
        field_columns(),
        PROBABILITY_COLUMN,
        RECORDED_AT_COLUMN,
        placeholders
    )
}

fn select_full_sql() -> String {
    format!(
        "SELECT id, first_name, last_name, {}, {}, {} FROM {} WHERE id = ?1",
        field_columns(),
        PROBABILITY_COLUMN,
        RECORDED_AT_COLUMN,
        TABLE
    )
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PatientRecord> {
    let mut values = [MISSING_VALUE; FEATURE_COUNT];
    for (i, slot) in values.iter_mut().enumerate() {
        *slot = row.get::<_, Option<f64>>(3 + i)?.unwrap_or(MISSING_VALUE);
    }

    let recorded_at = row
        .get::<_, Option<String>>(FEATURE_COUNT + 4)?
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(PatientRecord {
        id: row.get(0)?,
        first_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        last_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        features: FeatureVector::from_values(values),
        probability: row.get::<_, Option<f64>>(FEATURE_COUNT + 3)?.unwrap_or(MISSING_VALUE),
        recorded_at,
    })
}
