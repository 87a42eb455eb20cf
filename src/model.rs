// 📅 Bulletin Model - periods, cutoff values, records
// Everything the store persists and the export engine reads back

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// YEAR / MONTH
// ============================================================================

pub const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

/// Publication period of a bulletin (not the scrape time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Returns None when month is outside 1-12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(YearMonth { year, month })
        } else {
            None
        }
    }

    pub fn next(&self) -> YearMonth {
        if self.month == 12 {
            YearMonth { year: self.year + 1, month: 1 }
        } else {
            YearMonth { year: self.year, month: self.month + 1 }
        }
    }

    /// Federal fiscal year: October opens the next fiscal year
    /// Example: 2025-10 → FY2026
    pub fn fiscal_year(&self) -> i32 {
        if self.month >= 10 {
            self.year + 1
        } else {
            self.year
        }
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES
            .get(self.month.wrapping_sub(1) as usize)
            .copied()
            .unwrap_or("")
    }

    pub fn from_date(date: NaiveDate) -> YearMonth {
        YearMonth { year: date.year(), month: date.month() }
    }

    /// Inclusive range start..=end, empty when start > end
    pub fn range(start: YearMonth, end: YearMonth) -> MonthRange {
        MonthRange { next: Some(start), end }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    /// Parses "YYYY-MM"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = y.parse().map_err(|_| format!("invalid year in '{}'", s))?;
        let month: u32 = m.parse().map_err(|_| format!("invalid month in '{}'", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in '{}'", s))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub struct MonthRange {
    next: Option<YearMonth>,
    end: YearMonth,
}

impl Iterator for MonthRange {
    type Item = YearMonth;

    fn next(&mut self) -> Option<YearMonth> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = Some(current.next());
        Some(current)
    }
}

// ============================================================================
// TABLE TYPE / VISA CLASS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    FinalAction,
    FilingDate,
}

impl TableType {
    /// Storage / export code
    pub fn code(&self) -> &'static str {
        match self {
            TableType::FinalAction => "final_action",
            TableType::FilingDate => "filing_date",
        }
    }

    pub fn from_code(code: &str) -> Option<TableType> {
        match code {
            "final_action" => Some(TableType::FinalAction),
            "filing_date" => Some(TableType::FilingDate),
            _ => None,
        }
    }
}

/// Preference section a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisaClass {
    Family,
    Employment,
}

impl VisaClass {
    pub fn code(&self) -> &'static str {
        match self {
            VisaClass::Family => "family",
            VisaClass::Employment => "employment",
        }
    }

    pub fn from_code(code: &str) -> Option<VisaClass> {
        match code {
            "family" => Some(VisaClass::Family),
            "employment" => Some(VisaClass::Employment),
            _ => None,
        }
    }
}

// ============================================================================
// CUTOFF VALUE
// ============================================================================

/// One cell of a bulletin table after decoding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CutoffValue {
    /// "C" - every priority date is actionable
    Current,
    /// "U" - no visa numbers available
    Unavailable,
    Date(NaiveDate),
    /// Category/country combination not published that month
    Unlisted,
    /// Cell text the codec could not classify; kept verbatim
    Unrecognized(String),
}

impl CutoffValue {
    /// Tagged form for the store's value column
    pub fn to_storage(&self) -> String {
        match self {
            CutoffValue::Current => "current".to_string(),
            CutoffValue::Unavailable => "unavailable".to_string(),
            CutoffValue::Unlisted => "unlisted".to_string(),
            CutoffValue::Date(d) => format!("date:{}", d.format("%Y-%m-%d")),
            CutoffValue::Unrecognized(text) => format!("unrecognized:{}", text),
        }
    }

    pub fn from_storage(s: &str) -> Option<CutoffValue> {
        match s {
            "current" => return Some(CutoffValue::Current),
            "unavailable" => return Some(CutoffValue::Unavailable),
            "unlisted" => return Some(CutoffValue::Unlisted),
            _ => {}
        }

        if let Some(date) = s.strip_prefix("date:") {
            return NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .ok()
                .map(CutoffValue::Date);
        }

        s.strip_prefix("unrecognized:")
            .map(|text| CutoffValue::Unrecognized(text.to_string()))
    }

    /// Short label used in status transitions
    pub fn kind(&self) -> &'static str {
        match self {
            CutoffValue::Current => "current",
            CutoffValue::Unavailable => "unavailable",
            CutoffValue::Date(_) => "date",
            CutoffValue::Unlisted => "unlisted",
            CutoffValue::Unrecognized(_) => "unrecognized",
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One cutoff value for a single category/country in one bulletin month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinRecord {
    pub year: i32,
    pub month: u32,
    pub table_type: TableType,
    pub visa_class: VisaClass,
    pub category: String,
    pub country: String,
    pub value: CutoffValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl BulletinRecord {
    pub fn period(&self) -> YearMonth {
        YearMonth { year: self.year, month: self.month }
    }

    /// Uniqueness key inside one month
    pub fn key(&self) -> (TableType, &str, &str) {
        (self.table_type, self.category.as_str(), self.country.as_str())
    }
}

/// Table layout a bulletin month was parsed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Single Final Action table per section (before October 2015)
    Combined,
    /// Final Action + Dates for Filing tables (October 2015 onwards)
    Split,
    /// Split tables with title rows and EB-5 set-aside groups (October 2022 onwards)
    Modern,
}

impl Layout {
    pub fn code(&self) -> &'static str {
        match self {
            Layout::Combined => "combined",
            Layout::Split => "split",
            Layout::Modern => "modern",
        }
    }

    pub fn from_code(code: &str) -> Option<Layout> {
        match code {
            "combined" => Some(Layout::Combined),
            "split" => Some(Layout::Split),
            "modern" => Some(Layout::Modern),
            _ => None,
        }
    }

    /// Table types published under this layout
    pub fn table_types(&self) -> &'static [TableType] {
        match self {
            Layout::Combined => &[TableType::FinalAction],
            Layout::Split | Layout::Modern => &[TableType::FinalAction, TableType::FilingDate],
        }
    }
}

/// All records of one bulletin, complete against the era's vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinMonth {
    pub period: YearMonth,
    pub layout: Layout,
    pub records: Vec<BulletinRecord>,
}

impl BulletinMonth {
    pub fn new(period: YearMonth, layout: Layout, records: Vec<BulletinRecord>) -> Self {
        BulletinMonth { period, layout, records }
    }

    pub fn get(&self, table_type: TableType, category: &str, country: &str) -> Option<&BulletinRecord> {
        self.records
            .iter()
            .find(|r| r.table_type == table_type && r.category == category && r.country == country)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// SHA-256 over the records in key order
    ///
    /// Independent of record order in `records`, so a reparse of identical
    /// HTML and a reload from the store hash the same.
    pub fn content_hash(&self) -> String {
        let mut lines: Vec<String> = self
            .records
            .iter()
            .map(|r| {
                format!(
                    "{}|{}|{}|{}|{}|{}",
                    r.table_type.code(),
                    r.visa_class.code(),
                    r.category,
                    r.country,
                    r.value.to_storage(),
                    r.annotation.as_deref().unwrap_or("")
                )
            })
            .collect();
        lines.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.period.to_string());
        for line in &lines {
            hasher.update(b"\n");
            hasher.update(line.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
