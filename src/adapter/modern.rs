// Modern layout (October 2022 onwards)
//
// Same four tables as the split layout, but:
// - a <caption> or title rows above the header name the table type
//   ("A. FINAL ACTION DATES FOR EMPLOYMENT-BASED PREFERENCE CASES")
// - the header row is not necessarily the first row
// - EB-5 set-aside lines sit under a "5th Set Aside:" group row

use super::html::{self, TableGrid};
use super::{classify_section, read_table, RawCell, RowRules, SectionTable, TableFormat};
use crate::error::{BulletinError, BulletinResult};
use crate::model::{Layout, TableType, VisaClass, YearMonth};
use crate::vocabulary::{normalize_label, Vocabulary};
use std::sync::Arc;

/// Title rows tolerated above the header row
const MAX_TITLE_ROWS: usize = 2;

pub struct ModernFormat {
    vocabulary: Arc<Vocabulary>,
}

/// A section table before its type is settled
struct Located<'a> {
    grid: &'a TableGrid,
    header_row: usize,
    visa_class: VisaClass,
    titled: Option<TableType>,
}

impl ModernFormat {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        ModernFormat { vocabulary }
    }

    /// Header row: section label in the first cell and at least one known country
    fn locate<'a>(&self, grid: &'a TableGrid, period: YearMonth) -> Option<Located<'a>> {
        (0..=MAX_TITLE_ROWS).find_map(|row| {
            let cells = grid.rows.get(row)?;
            let visa_class = classify_section(cells.first()?)?;
            let has_country = cells
                .iter()
                .skip(1)
                .any(|c| self.vocabulary.resolve_country(visa_class, c, period).is_some());
            if !has_country {
                return None;
            }

            let mut title: Vec<&str> = grid.caption.iter().map(|c| c.as_str()).collect();
            title.extend(grid.rows[..row].iter().flat_map(|r| r.first()).map(|s| s.as_str()));

            Some(Located {
                grid,
                header_row: row,
                visa_class,
                titled: title_table_type(&title.join(" ")),
            })
        })
    }
}

/// Table type named by a caption or title row
fn title_table_type(title: &str) -> Option<TableType> {
    let title = normalize_label(title);
    if title.contains("filing") {
        Some(TableType::FilingDate)
    } else if title.contains("final action") {
        Some(TableType::FinalAction)
    } else {
        None
    }
}

impl TableFormat for ModernFormat {
    fn extract(&self, source: &str, period: YearMonth) -> BulletinResult<Vec<RawCell>> {
        let grids = html::tables(source);
        let located: Vec<Located> = grids.iter().filter_map(|g| self.locate(g, period)).collect();
        let rules = RowRules { group_rows: true };
        let mut cells = Vec::new();

        for class in [VisaClass::Family, VisaClass::Employment] {
            let mut slots: [Option<&Located>; 2] = [None, None];
            let mut ordinal = 0;

            for table in located.iter().filter(|t| t.visa_class == class) {
                // untitled tables fall back to document order
                let table_type = match table.titled {
                    Some(tt) => tt,
                    None if ordinal == 0 => TableType::FinalAction,
                    None => TableType::FilingDate,
                };
                ordinal += 1;

                let slot = match table_type {
                    TableType::FinalAction => &mut slots[0],
                    TableType::FilingDate => &mut slots[1],
                };
                if slot.is_some() {
                    tracing::warn!(
                        period = %period,
                        class = class.code(),
                        table_type = table_type.code(),
                        "second table of the same type ignored"
                    );
                    continue;
                }
                *slot = Some(table);
            }

            for (slot, table_type) in slots.iter().zip([TableType::FinalAction, TableType::FilingDate]) {
                let Some(table) = slot else {
                    return Err(BulletinError::format_mismatch(
                        period,
                        format!("no {} {} table found", class.code(), table_type.code()),
                        html::excerpt(source, &grids),
                    ));
                };
                let section = SectionTable {
                    grid: table.grid,
                    header_row: table.header_row,
                    visa_class: class,
                    table_type,
                };
                read_table(section, &self.vocabulary, period, rules, source, &grids, &mut cells)?;
            }
        }

        tracing::debug!(period = %period, cells = cells.len(), "modern layout extracted");
        Ok(cells)
    }

    fn layout(&self) -> Layout {
        Layout::Modern
    }
}
