// 📈 Movement & Export Engine - store → frontend document
//
// Reads only. For every (category, country, table type) series, movement is
// computed between consecutive stored bulletins:
//   Date → Date                  delta_days = d2 - d1 (negative = retrogression)
//   Current → Current            delta_days = 0
//   Unavailable → Unavailable    delta_days = 0
//   anything else                status_transition "<from>-><to>"

use crate::codec;
use crate::db::Store;
use crate::error::{BulletinError, BulletinResult};
use crate::model::{BulletinRecord, CutoffValue, TableType, VisaClass, YearMonth};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// MOVEMENT
// ============================================================================

/// Change between two consecutive bulletins of one series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    DeltaDays(i64),
    StatusTransition(String),
}

/// Derived, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementEntry {
    pub category: String,
    pub country: String,
    pub table_type: TableType,
    pub from_month: YearMonth,
    pub to_month: YearMonth,
    #[serde(flatten)]
    pub movement: Movement,
}

pub fn classify_movement(from: &CutoffValue, to: &CutoffValue) -> Movement {
    match (from, to) {
        (CutoffValue::Date(a), CutoffValue::Date(b)) => Movement::DeltaDays((*b - *a).num_days()),
        (CutoffValue::Current, CutoffValue::Current) | (CutoffValue::Unavailable, CutoffValue::Unavailable) => {
            Movement::DeltaDays(0)
        }
        _ => Movement::StatusTransition(format!("{}->{}", from.kind(), to.kind())),
    }
}

/// Movements along one series; records must share one key and be in bulletin order
pub fn series_movements(series: &[BulletinRecord]) -> Vec<MovementEntry> {
    series
        .windows(2)
        .map(|pair| MovementEntry {
            category: pair[1].category.clone(),
            country: pair[1].country.clone(),
            table_type: pair[1].table_type,
            from_month: pair[0].period(),
            to_month: pair[1].period(),
            movement: classify_movement(&pair[0].value, &pair[1].value),
        })
        .collect()
}

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub year: i32,
    pub month: u32,
    pub table_type: TableType,
    pub country: String,
    pub value: CutoffValue,
    /// Bulletin notation: C, U, 01JAN20
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl From<&BulletinRecord> for HistoryEntry {
    fn from(r: &BulletinRecord) -> Self {
        HistoryEntry {
            year: r.year,
            month: r.month,
            table_type: r.table_type,
            country: r.country.clone(),
            value: r.value.clone(),
            display: codec::encode(&r.value),
            annotation: r.annotation.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryExport {
    pub category: String,
    pub visa_class: VisaClass,
    pub history: Vec<HistoryEntry>,
    pub movements: Vec<MovementEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryIndex {
    pub family: Vec<String>,
    pub employment: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    /// Newest first
    pub months: Vec<YearMonth>,
    pub countries: Vec<String>,
    pub categories: CategoryIndex,
    /// Keyed by category code
    pub data: BTreeMap<String, CategoryExport>,
}

/// Flat CSV line: one per stored record
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    year: i32,
    month: u32,
    table_type: &'static str,
    visa_class: &'static str,
    category: &'a str,
    country: &'a str,
    kind: &'static str,
    value: String,
    annotation: &'a str,
}

impl ExportDocument {
    pub fn movement_count(&self) -> usize {
        self.data.values().map(|c| c.movements.len()).sum()
    }

    /// Compact JSON for the static frontend
    pub fn write_json(&self, path: &Path) -> BulletinResult<()> {
        ensure_parent(path)?;
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).map_err(|e| BulletinError::io(path.display().to_string(), e))?;
        tracing::info!(path = %path.display(), months = self.months.len(), "JSON export written");
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> BulletinResult<()> {
        ensure_parent(path)?;
        let mut writer = csv::Writer::from_path(path)?;
        let mut rows = 0usize;

        for export in self.data.values() {
            for entry in &export.history {
                writer.serialize(CsvRow {
                    year: entry.year,
                    month: entry.month,
                    table_type: entry.table_type.code(),
                    visa_class: export.visa_class.code(),
                    category: &export.category,
                    country: &entry.country,
                    kind: entry.value.kind(),
                    value: entry.display.clone(),
                    annotation: entry.annotation.as_deref().unwrap_or(""),
                })?;
                rows += 1;
            }
        }

        writer.flush().map_err(|e| BulletinError::io(path.display().to_string(), e))?;
        tracing::info!(path = %path.display(), rows, "CSV export written");
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> BulletinResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BulletinError::io(parent.display().to_string(), e))?;
    }
    Ok(())
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ExportEngine<'a> {
    store: &'a Store,
}

impl<'a> ExportEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        ExportEngine { store }
    }

    pub fn export(&self) -> BulletinResult<ExportDocument> {
        let mut data: BTreeMap<String, CategoryExport> = BTreeMap::new();

        for (category, country, table_type) in self.store.series_keys()? {
            let series = self.store.get_series(&category, &country, table_type)?;
            let Some(first) = series.first() else {
                continue;
            };

            let entry = data.entry(category.clone()).or_insert_with(|| CategoryExport {
                category: category.clone(),
                visa_class: first.visa_class,
                history: Vec::new(),
                movements: Vec::new(),
            });
            entry.history.extend(series.iter().map(HistoryEntry::from));
            entry.movements.extend(series_movements(&series));
        }

        for export in data.values_mut() {
            export
                .history
                .sort_by(|a, b| (a.year, a.month, a.table_type, &a.country).cmp(&(b.year, b.month, b.table_type, &b.country)));
            export.movements.sort_by(|a, b| {
                (a.to_month, a.table_type, &a.country).cmp(&(b.to_month, b.table_type, &b.country))
            });
        }

        let months: Vec<YearMonth> = self.store.months_present()?.into_iter().rev().collect();
        let document = ExportDocument {
            generated_at: Utc::now(),
            months,
            countries: self.store.countries()?,
            categories: CategoryIndex {
                family: self.store.categories(VisaClass::Family)?,
                employment: self.store.categories(VisaClass::Employment)?,
            },
            data,
        };

        tracing::info!(
            months = document.months.len(),
            categories = document.data.len(),
            movements = document.movement_count(),
            "export built"
        );
        Ok(document)
    }
}
