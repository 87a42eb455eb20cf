// 🏗️ Table-Format Adapter - one strategy per historical table layout
//
// The Department of State changed the bulletin tables several times:
//
//   Combined  (… → 2015-09)   one Final Action table per section
//   Split     (2015-10 → 2022-09)   Final Action + Dates for Filing tables
//   Modern    (2022-10 → …)   split tables with title rows / captions and
//                              EB-5 set-aside group rows
//
// Each layout implements TableFormat. Adding a layout = new struct + one arm
// in get_format(); the parser never branches on era.

pub mod combined;
pub mod html;
pub mod modern;
pub mod split;

pub use combined::CombinedFormat;
pub use modern::ModernFormat;
pub use split::SplitFormat;

use crate::error::{BulletinError, BulletinResult};
use crate::model::{Layout, TableType, VisaClass, YearMonth};
use crate::vocabulary::{normalize_label, Vocabulary};
use html::TableGrid;
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// CORE TYPES
// ============================================================================

/// First bulletin with separate Dates for Filing tables
pub const SPLIT_LAYOUT_FROM: YearMonth = YearMonth { year: 2015, month: 10 };

/// First bulletin with EB-5 set-aside rows and titled tables
pub const MODERN_LAYOUT_FROM: YearMonth = YearMonth { year: 2022, month: 10 };

/// Cell content as found in the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellText {
    Raw(String),
    /// Optional vocabulary entry the table does not publish this month
    Unlisted,
}

/// One extracted cell: labels are still the source text, not canonical codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub table_type: TableType,
    pub visa_class: VisaClass,
    pub category_label: String,
    pub country_label: String,
    pub text: CellText,
}

/// TableFormat - one historical layout
///
/// Locates the bulletin's tables by structural markers, keeps only rows and
/// columns whose labels the vocabulary recognizes, and marks optional
/// vocabulary entries missing from a table as `CellText::Unlisted`.
pub trait TableFormat: Send + Sync {
    /// Extract all cells of one bulletin
    ///
    /// # Errors
    /// * `FormatMismatch` - the tables this layout expects are not there
    fn extract(&self, html: &str, period: YearMonth) -> BulletinResult<Vec<RawCell>>;

    /// Layout this strategy handles
    fn layout(&self) -> Layout;

    /// Strategy version (recorded in logs for provenance)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Layout in use for a bulletin month
pub fn detect_layout(period: YearMonth) -> Layout {
    if period >= MODERN_LAYOUT_FROM {
        Layout::Modern
    } else if period >= SPLIT_LAYOUT_FROM {
        Layout::Split
    } else {
        Layout::Combined
    }
}

/// Strategy for a layout
pub fn get_format(layout: Layout, vocabulary: Arc<Vocabulary>) -> Box<dyn TableFormat> {
    match layout {
        Layout::Combined => Box::new(CombinedFormat::new(vocabulary)),
        Layout::Split => Box::new(SplitFormat::new(vocabulary)),
        Layout::Modern => Box::new(ModernFormat::new(vocabulary)),
    }
}

/// Dispatch on the month and extract
pub fn extract(html: &str, period: YearMonth, vocabulary: &Arc<Vocabulary>) -> BulletinResult<(Layout, Vec<RawCell>)> {
    let format = get_format(detect_layout(period), Arc::clone(vocabulary));
    tracing::debug!(
        period = %period,
        layout = format.layout().code(),
        version = format.version(),
        "extracting bulletin tables"
    );
    let cells = format.extract(html, period)?;
    Ok((format.layout(), cells))
}

// ============================================================================
// SHARED TABLE READING
// ============================================================================

/// Section named by a header label ("Family-Sponsored", "Employment-based")
pub fn classify_section(label: &str) -> Option<VisaClass> {
    let label = normalize_label(label);
    if label.contains("family") {
        Some(VisaClass::Family)
    } else if label.contains("employment") {
        Some(VisaClass::Employment)
    } else {
        None
    }
}

/// A located bulletin table
#[derive(Debug, Clone, Copy)]
pub struct SectionTable<'a> {
    pub grid: &'a TableGrid,
    pub header_row: usize,
    pub visa_class: VisaClass,
    pub table_type: TableType,
}

/// Row reading options that differ between layouts
#[derive(Debug, Clone, Copy, Default)]
pub struct RowRules {
    /// Rows with an unknown label and no data prefix the next labels
    /// ("5th Set Aside:" followed by "Rural (20%)")
    pub group_rows: bool,
}

/// Read one located table into cells
///
/// # Errors
/// * `FormatMismatch` - no header cell maps to a known chargeability area
pub fn read_table(
    table: SectionTable<'_>,
    vocabulary: &Vocabulary,
    period: YearMonth,
    rules: RowRules,
    source: &str,
    all_grids: &[TableGrid],
    out: &mut Vec<RawCell>,
) -> BulletinResult<()> {
    let SectionTable { grid, header_row, visa_class, table_type } = table;
    let header = grid.rows.get(header_row).map(|r| r.as_slice()).unwrap_or(&[]);

    // (column index, header label, country code)
    let columns: Vec<(usize, &str, &str)> = header
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, label)| {
            match vocabulary.resolve_country(visa_class, label, period) {
                Some(country) => Some((idx, label.as_str(), country.code.as_str())),
                None => {
                    tracing::debug!(period = %period, column = %label, "ignoring unrecognized column");
                    None
                }
            }
        })
        .collect();

    if columns.is_empty() {
        return Err(BulletinError::format_mismatch(
            period,
            format!(
                "{} {} table has no recognizable country columns",
                visa_class.code(),
                table_type.code()
            ),
            html::excerpt(source, all_grids),
        ));
    }

    let mut seen_categories: HashSet<&str> = HashSet::new();
    let seen_countries: HashSet<&str> = columns.iter().map(|(_, _, code)| *code).collect();
    let mut group_prefix: Option<&str> = None;

    for row in grid.rows.iter().skip(header_row + 1) {
        let label = row.first().map(|s| s.as_str()).unwrap_or("");
        if label.is_empty() {
            continue;
        }

        let direct = vocabulary.resolve_category(visa_class, label, period);
        let category = match (direct, group_prefix) {
            (Some(c), _) => {
                group_prefix = None;
                Some(c)
            }
            (None, Some(prefix)) if rules.group_rows => {
                vocabulary.resolve_category(visa_class, &format!("{} {}", prefix, label), period)
            }
            _ => None,
        };

        let Some(category) = category else {
            let has_data = columns
                .iter()
                .any(|(idx, _, _)| row.get(*idx).map_or(false, |t| !t.is_empty()));
            if rules.group_rows && !has_data {
                tracing::debug!(period = %period, group = %label, "group row");
                group_prefix = Some(label);
            } else {
                tracing::debug!(period = %period, row = %label, "ignoring unrecognized row");
            }
            continue;
        };

        seen_categories.insert(category.code.as_str());
        let category_label = if direct.is_some() {
            label.to_string()
        } else {
            format!("{} {}", group_prefix.unwrap_or_default(), label)
        };

        for (idx, country_label, _) in &columns {
            // short rows: a missing trailing cell reads as empty
            let text = row.get(*idx).cloned().unwrap_or_default();
            out.push(RawCell {
                table_type,
                visa_class,
                category_label: category_label.clone(),
                country_label: country_label.to_string(),
                text: CellText::Raw(text),
            });
        }
    }

    // optional entries the table does not publish become explicit Unlisted
    for category in vocabulary.categories_for(visa_class, period) {
        for country in vocabulary.countries_for(visa_class, period) {
            if !(category.optional || country.optional) {
                continue;
            }
            if seen_categories.contains(category.code.as_str())
                && seen_countries.contains(country.code.as_str())
            {
                continue;
            }
            out.push(RawCell {
                table_type,
                visa_class,
                category_label: category.code.clone(),
                country_label: country.code.clone(),
                text: CellText::Unlisted,
            });
        }
    }

    Ok(())
}

/// Tables whose first header cell names a section, in document order
///
/// Only row 0 is inspected; layouts with title rows locate headers themselves.
/// A table whose header names no known country (a notes or limits table that
/// happens to mention "Family") is not a section table.
pub fn section_tables(grids: &[TableGrid], vocabulary: &Vocabulary, period: YearMonth) -> Vec<(usize, VisaClass)> {
    grids
        .iter()
        .enumerate()
        .filter(|(_, g)| g.rows.len() >= 2)
        .filter_map(|(idx, g)| {
            let class = classify_section(g.label(0))?;
            let has_country = g.rows[0]
                .iter()
                .skip(1)
                .any(|c| vocabulary.resolve_country(class, c, period).is_some());
            if !has_country {
                tracing::debug!(period = %period, table = idx, "skipping section-like table without country columns");
                return None;
            }
            Some((idx, class))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn vocab() -> Arc<Vocabulary> {
        Arc::new(Vocabulary::embedded().unwrap())
    }

    fn grid(rows: &[&[&str]]) -> TableGrid {
        TableGrid {
            caption: None,
            rows: rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect(),
        }
    }

    #[test]
    fn test_detect_layout_boundaries() {
        assert_eq!(detect_layout(ym("2006-01")), Layout::Combined);
        assert_eq!(detect_layout(ym("2015-09")), Layout::Combined);
        assert_eq!(detect_layout(ym("2015-10")), Layout::Split);
        assert_eq!(detect_layout(ym("2022-09")), Layout::Split);
        assert_eq!(detect_layout(ym("2022-10")), Layout::Modern);
        assert_eq!(detect_layout(ym("2026-01")), Layout::Modern);
    }

    #[test]
    fn test_get_format_matches_layout() {
        for layout in [Layout::Combined, Layout::Split, Layout::Modern] {
            assert_eq!(get_format(layout, vocab()).layout(), layout);
        }
    }

    #[test]
    fn test_section_tables_require_country_header() {
        let v = vocab();
        let period = ym("2010-06");
        let grids = vec![
            grid(&[&["Family-sponsored preference limit: 226,000", "see section C"], &["F1", "23,400"]]),
            grid(&[&["Family", "INDIA", "MEXICO"], &["1st", "C", "C"]]),
            grid(&[&["Region", "AFRICA"], &["AFRICA", "60,000"]]),
            grid(&[&["Employment- Based", "All Chargeability Areas Except Those Listed"], &["1st", "C"]]),
        ];

        assert_eq!(
            section_tables(&grids, &v, period),
            vec![(1, VisaClass::Family), (3, VisaClass::Employment)]
        );
    }

    #[test]
    fn test_classify_section() {
        assert_eq!(classify_section("Family-Sponsored"), Some(VisaClass::Family));
        assert_eq!(classify_section("Employment- based"), Some(VisaClass::Employment));
        assert_eq!(classify_section("Diversity"), None);
    }

    #[test]
    fn test_read_table_filters_unknown_rows_and_columns() {
        let v = vocab();
        let period = ym("2010-06");
        let g = grid(&[
            &["Family", "All Chargeability", "Notes", "INDIA"],
            &["F1", "01JAN06", "x", "01FEB06"],
            &["Footnote row", "", "", ""],
            &["F2A", "C", "y"],
        ]);
        let table = SectionTable {
            grid: &g,
            header_row: 0,
            visa_class: VisaClass::Family,
            table_type: TableType::FinalAction,
        };

        let mut out = Vec::new();
        read_table(table, &v, period, RowRules::default(), "", &[], &mut out).unwrap();

        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|c| c.country_label != "Notes"));
        // short row: India cell missing → empty text
        let f2a_india = out
            .iter()
            .find(|c| c.category_label == "F2A" && c.country_label == "INDIA")
            .unwrap();
        assert_eq!(f2a_india.text, CellText::Raw(String::new()));
    }

    #[test]
    fn test_read_table_marks_optional_entries_unlisted() {
        let v = vocab();
        let period = ym("2016-06");
        let g = grid(&[
            &["Employment-based", "All Chargeability", "INDIA"],
            &["1st", "C", "C"],
        ]);
        let table = SectionTable {
            grid: &g,
            header_row: 0,
            visa_class: VisaClass::Employment,
            table_type: TableType::FinalAction,
        };

        let mut out = Vec::new();
        read_table(table, &v, period, RowRules::default(), "", &[], &mut out).unwrap();

        // CentralAmerica column absent → EB-1/CentralAmerica unlisted
        assert!(out.iter().any(|c| c.category_label == "EB-1"
            && c.country_label == "CentralAmerica"
            && c.text == CellText::Unlisted));
        // regional center row absent → unlisted for every country
        let regional: Vec<_> = out
            .iter()
            .filter(|c| c.category_label == "EB-5-RegionalCenter")
            .collect();
        assert_eq!(regional.len(), v.countries_for(VisaClass::Employment, period).count());
        // required pair never marked
        assert!(!out.iter().any(|c| c.category_label == "EB-2"
            && c.country_label != "CentralAmerica"
            && c.text == CellText::Unlisted));
    }

    #[test]
    fn test_read_table_group_rows_prefix_labels() {
        let v = vocab();
        let period = ym("2024-02");
        let g = grid(&[
            &["Employment-based", "All Chargeability", "INDIA"],
            &["5th Set Aside:", "", ""],
            &["Rural (20%)", "C", "C"],
            &["Infrastructure (2%)", "C", "01JAN20"],
        ]);
        let table = SectionTable {
            grid: &g,
            header_row: 0,
            visa_class: VisaClass::Employment,
            table_type: TableType::FinalAction,
        };

        let mut out = Vec::new();
        let rules = RowRules { group_rows: true };
        read_table(table, &v, period, rules, "", &[], &mut out).unwrap();

        let labels: HashSet<&str> = out
            .iter()
            .filter(|c| matches!(c.text, CellText::Raw(_)))
            .map(|c| c.category_label.as_str())
            .collect();
        assert!(labels.contains("5th Set Aside: Rural (20%)"));
        assert!(labels.contains("5th Set Aside: Infrastructure (2%)"));
    }

    #[test]
    fn test_read_table_without_countries_is_format_mismatch() {
        let v = vocab();
        let g = grid(&[&["Family", "Notes"], &["F1", "x"]]);
        let table = SectionTable {
            grid: &g,
            header_row: 0,
            visa_class: VisaClass::Family,
            table_type: TableType::FinalAction,
        };
        let err = read_table(table, &v, ym("2010-06"), RowRules::default(), "", &[], &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, BulletinError::FormatMismatch { .. }));
    }
}
