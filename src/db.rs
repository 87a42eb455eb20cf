// 🗄️ Historical Store - SQLite, one row per cutoff, one row per bulletin
//
// Invariants:
// - at most one cutoff per (year, month, table_type, category, country)
//   (primary key; a violation surfaces as DuplicateRecord)
// - a month is replaced atomically: delete + insert in one transaction,
//   readers never see a half-written month
// - every upsert leaves an event in the audit trail

use crate::error::{BulletinError, BulletinResult};
use crate::model::{BulletinMonth, BulletinRecord, CutoffValue, Layout, TableType, VisaClass, YearMonth};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Event for the audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// What upsert_month did to the stored month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// Month was not stored before
    Inserted,
    /// Month was stored with different content
    Replaced,
    /// Month was stored with identical content
    Unchanged,
}

impl UpsertOutcome {
    fn event_type(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "bulletin_inserted",
            UpsertOutcome::Replaced => "bulletin_replaced",
            UpsertOutcome::Unchanged => "bulletin_unchanged",
        }
    }
}

/// One row of the bulletins table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthSummary {
    pub period: YearMonth,
    pub layout: Layout,
    pub content_hash: String,
    pub record_count: i64,
    pub fetched_at: String,
}

pub fn setup_database(conn: &Connection) -> BulletinResult<()> {
    // WAL for crash recovery; in-memory databases answer "memory"
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    // ==========================================================================
    // Bulletins: one row per stored month
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bulletins (
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            layout TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY (year, month)
        )",
        [],
    )?;

    // ==========================================================================
    // Cutoffs: value is a tagged string (current / date:YYYY-MM-DD / ...)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cutoffs (
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            table_type TEXT NOT NULL,
            visa_class TEXT NOT NULL,
            category TEXT NOT NULL,
            country TEXT NOT NULL,
            value TEXT NOT NULL,
            annotation TEXT,
            PRIMARY KEY (year, month, table_type, category, country)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cutoffs_series
         ON cutoffs(category, country, table_type, year, month)",
        [],
    )?;

    // ==========================================================================
    // Events: audit trail
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            event_id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> BulletinResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(conn: &Connection, entity_type: &str, entity_id: &str) -> BulletinResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY rowid",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| conversion_error(1, e.to_string()))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e.to_string()))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

/// cutoffs row → record (columns: year, month, table_type, visa_class,
/// category, country, value, annotation)
fn record_from_row(row: &Row) -> rusqlite::Result<BulletinRecord> {
    let table_type: String = row.get(2)?;
    let visa_class: String = row.get(3)?;
    let value: String = row.get(6)?;

    Ok(BulletinRecord {
        year: row.get(0)?,
        month: row.get(1)?,
        table_type: TableType::from_code(&table_type)
            .ok_or_else(|| conversion_error(2, format!("unknown table type '{}'", table_type)))?,
        visa_class: VisaClass::from_code(&visa_class)
            .ok_or_else(|| conversion_error(3, format!("unknown visa class '{}'", visa_class)))?,
        category: row.get(4)?,
        country: row.get(5)?,
        value: CutoffValue::from_storage(&value)
            .ok_or_else(|| conversion_error(6, format!("unknown cutoff value '{}'", value)))?,
        annotation: row.get(7)?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<MonthSummary> {
    let layout: String = row.get(2)?;
    Ok(MonthSummary {
        period: YearMonth { year: row.get(0)?, month: row.get(1)? },
        layout: Layout::from_code(&layout)
            .ok_or_else(|| conversion_error(2, format!("unknown layout '{}'", layout)))?,
        content_hash: row.get(3)?,
        record_count: row.get(4)?,
        fetched_at: row.get(5)?,
    })
}

const RECORD_COLUMNS: &str = "year, month, table_type, visa_class, category, country, value, annotation";

// ============================================================================
// STORE
// ============================================================================

/// Owns the connection; `&mut self` on upsert serializes writers
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> BulletinResult<Store> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BulletinError::io(parent.display().to_string(), e))?;
        }
        let conn = Connection::open(path)?;
        Store::from_connection(conn)
    }

    pub fn open_in_memory() -> BulletinResult<Store> {
        Store::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> BulletinResult<Store> {
        setup_database(&conn)?;
        Ok(Store { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace everything stored for the month with `month`'s records
    ///
    /// # Errors
    /// * `MonthMismatch` - a record belongs to another month (nothing written)
    /// * `DuplicateRecord` - two records share a key (transaction rolled back)
    pub fn upsert_month(&mut self, month: &BulletinMonth) -> BulletinResult<UpsertOutcome> {
        let period = month.period;
        if let Some(stray) = month.records.iter().find(|r| r.period() != period) {
            return Err(BulletinError::MonthMismatch { expected: period, found: stray.period() });
        }

        let hash = month.content_hash();
        let tx = self.conn.transaction()?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT content_hash FROM bulletins WHERE year = ?1 AND month = ?2",
                params![period.year, period.month],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match previous.as_deref() {
            None => UpsertOutcome::Inserted,
            Some(h) if h == hash => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
        };

        if outcome == UpsertOutcome::Unchanged {
            // identical content: leave rows, fetched_at and the event log as they are
            tx.commit()?;
            tracing::info!(period = %period, outcome = outcome.event_type(), "bulletin month unchanged");
            return Ok(outcome);
        }

        tx.execute(
            "DELETE FROM cutoffs WHERE year = ?1 AND month = ?2",
            params![period.year, period.month],
        )?;
        tx.execute(
            "DELETE FROM bulletins WHERE year = ?1 AND month = ?2",
            params![period.year, period.month],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO cutoffs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                RECORD_COLUMNS
            ))?;
            for record in &month.records {
                let result = stmt.execute(params![
                    record.year,
                    record.month,
                    record.table_type.code(),
                    record.visa_class.code(),
                    record.category,
                    record.country,
                    record.value.to_storage(),
                    record.annotation,
                ]);

                match result {
                    Ok(_) => {}
                    Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                        // tx dropped on return → rollback
                        return Err(BulletinError::DuplicateRecord {
                            period,
                            table_type: record.table_type,
                            category: record.category.clone(),
                            country: record.country.clone(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tx.execute(
            "INSERT INTO bulletins (year, month, layout, content_hash, record_count, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                period.year,
                period.month,
                month.layout.code(),
                hash,
                month.records.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let event = Event::new(
            outcome.event_type(),
            "bulletin",
            &period.to_string(),
            serde_json::json!({
                "layout": month.layout.code(),
                "content_hash": hash,
                "previous_hash": previous,
                "record_count": month.records.len(),
            }),
            "store",
        );
        insert_event(&tx, &event)?;

        tx.commit()?;

        tracing::info!(
            period = %period,
            outcome = outcome.event_type(),
            records = month.records.len(),
            "bulletin month stored"
        );
        Ok(outcome)
    }

    /// One series in bulletin order
    pub fn get_series(&self, category: &str, country: &str, table_type: TableType) -> BulletinResult<Vec<BulletinRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cutoffs
             WHERE category = ?1 AND country = ?2 AND table_type = ?3
             ORDER BY year, month",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![category, country, table_type.code()], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn months_present(&self) -> BulletinResult<BTreeSet<YearMonth>> {
        let mut stmt = self.conn.prepare("SELECT year, month FROM bulletins")?;
        let months = stmt
            .query_map([], |row| Ok(YearMonth { year: row.get(0)?, month: row.get(1)? }))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(months)
    }

    /// Stored month, records in (table type, category, country) order
    pub fn get_month(&self, period: YearMonth) -> BulletinResult<Option<BulletinMonth>> {
        let Some(summary) = self.month_summary(period)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cutoffs WHERE year = ?1 AND month = ?2",
            RECORD_COLUMNS
        ))?;
        let mut records = stmt
            .query_map(params![period.year, period.month], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.key().cmp(&b.key()));

        Ok(Some(BulletinMonth::new(period, summary.layout, records)))
    }

    pub fn month_summary(&self, period: YearMonth) -> BulletinResult<Option<MonthSummary>> {
        let summary = self
            .conn
            .query_row(
                "SELECT year, month, layout, content_hash, record_count, fetched_at
                 FROM bulletins WHERE year = ?1 AND month = ?2",
                params![period.year, period.month],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// All stored months, oldest first
    pub fn months(&self) -> BulletinResult<Vec<MonthSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT year, month, layout, content_hash, record_count, fetched_at
             FROM bulletins ORDER BY year, month",
        )?;
        let months = stmt.query_map([], summary_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(months)
    }

    pub fn latest_month(&self) -> BulletinResult<Option<YearMonth>> {
        Ok(self.months_present()?.into_iter().next_back())
    }

    /// Distinct (category, country, table type) series
    pub fn series_keys(&self) -> BulletinResult<Vec<(String, String, TableType)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT category, country, table_type FROM cutoffs
             ORDER BY category, country, table_type",
        )?;
        let keys = stmt
            .query_map([], |row| {
                let table_type: String = row.get(2)?;
                let table_type = TableType::from_code(&table_type)
                    .ok_or_else(|| conversion_error(2, format!("unknown table type '{}'", table_type)))?;
                Ok((row.get(0)?, row.get(1)?, table_type))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    pub fn record_count(&self) -> BulletinResult<i64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM cutoffs", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn categories(&self, class: VisaClass) -> BulletinResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT category FROM cutoffs WHERE visa_class = ?1 ORDER BY category")?;
        let categories = stmt
            .query_map(params![class.code()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(categories)
    }

    pub fn countries(&self) -> BulletinResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT country FROM cutoffs ORDER BY country")?;
        let countries = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(countries)
    }

    /// Audit trail of one month, oldest first
    pub fn events_for(&self, period: YearMonth) -> BulletinResult<Vec<Event>> {
        get_events_for_entity(&self.conn, "bulletin", &period.to_string())
    }
}
