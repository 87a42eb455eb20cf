// Combined layout (bulletins through September 2015)
//
// One family table and one employment table, both Final Action dates.
// Header row is the first row; its top-left cell names the section.

use super::html::{self, TableGrid};
use super::{read_table, section_tables, RawCell, RowRules, SectionTable, TableFormat};
use crate::error::{BulletinError, BulletinResult};
use crate::model::{Layout, TableType, VisaClass, YearMonth};
use crate::vocabulary::Vocabulary;
use std::sync::Arc;

pub struct CombinedFormat {
    vocabulary: Arc<Vocabulary>,
}

impl CombinedFormat {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        CombinedFormat { vocabulary }
    }
}

/// First table of a section, FormatMismatch when the bulletin has none
pub(super) fn first_of(
    sections: &[(usize, VisaClass)],
    class: VisaClass,
    period: YearMonth,
    source: &str,
    grids: &[TableGrid],
) -> BulletinResult<usize> {
    sections
        .iter()
        .find(|(_, c)| *c == class)
        .map(|(idx, _)| *idx)
        .ok_or_else(|| {
            BulletinError::format_mismatch(
                period,
                format!("no {} preference table found", class.code()),
                html::excerpt(source, grids),
            )
        })
}

impl TableFormat for CombinedFormat {
    fn extract(&self, source: &str, period: YearMonth) -> BulletinResult<Vec<RawCell>> {
        let grids = html::tables(source);
        let sections = section_tables(&grids, &self.vocabulary, period);
        let mut cells = Vec::new();

        for class in [VisaClass::Family, VisaClass::Employment] {
            let idx = first_of(&sections, class, period, source, &grids)?;
            let table = SectionTable {
                grid: &grids[idx],
                header_row: 0,
                visa_class: class,
                table_type: TableType::FinalAction,
            };
            read_table(table, &self.vocabulary, period, RowRules::default(), source, &grids, &mut cells)?;
        }

        tracing::debug!(period = %period, cells = cells.len(), "combined layout extracted");
        Ok(cells)
    }

    fn layout(&self) -> Layout {
        Layout::Combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CellText;

    const PAGE: &str = r#"
        <html><body>
        <p>A. STATUTORY NUMBERS</p>
        <table>
          <tr><td>Family</td><td>All Chargeability Areas Except Those Listed</td><td>CHINA-mainland born</td><td>INDIA</td><td>MEXICO</td><td>PHILIPPINES</td></tr>
          <tr><td>F1</td><td>01JAN06</td><td>01JAN06</td><td>01JAN06</td><td>01JAN93</td><td>01JAN96</td></tr>
        </table>
        <table>
          <tr><td>Employment-Based</td><td>All Chargeability Areas Except Those Listed</td><td>CHINA-mainland born</td><td>INDIA</td><td>MEXICO</td><td>PHILIPPINES</td></tr>
          <tr><td>1st</td><td>C</td><td>C</td><td>C</td><td>C</td><td>C</td></tr>
        </table>
        </body></html>"#;

    fn format() -> CombinedFormat {
        CombinedFormat::new(Arc::new(Vocabulary::embedded().unwrap()))
    }

    #[test]
    fn test_extracts_both_sections_as_final_action() {
        let period = YearMonth::new(2010, 6).unwrap();
        let cells = format().extract(PAGE, period).unwrap();

        let raw: Vec<&RawCell> = cells.iter().filter(|c| matches!(c.text, CellText::Raw(_))).collect();
        assert_eq!(raw.len(), 10);
        assert!(cells.iter().all(|c| c.table_type == TableType::FinalAction));
        assert!(raw.iter().any(|c| c.visa_class == VisaClass::Family && c.category_label == "F1"));
        assert!(raw.iter().any(|c| c.visa_class == VisaClass::Employment && c.category_label == "1st"));
    }

    #[test]
    fn test_leading_notes_table_is_not_a_section() {
        let page = format!(
            "<table><tr><td>Family-sponsored preference limit: 226,000</td><td>see section C</td></tr>\
             <tr><td>F1</td><td>23,400</td></tr></table>{}",
            PAGE
        );
        let cells = format().extract(&page, YearMonth::new(2010, 6).unwrap()).unwrap();

        let f1_india = cells
            .iter()
            .find(|c| c.visa_class == VisaClass::Family && c.category_label == "F1" && c.country_label == "INDIA")
            .unwrap();
        assert_eq!(f1_india.text, CellText::Raw("01JAN06".into()));
    }

    #[test]
    fn test_missing_employment_table_is_format_mismatch() {
        let page = r#"<table><tr><td>Family</td><td>INDIA</td></tr><tr><td>F1</td><td>C</td></tr></table>"#;
        let err = format().extract(page, YearMonth::new(2010, 6).unwrap()).unwrap_err();
        match err {
            BulletinError::FormatMismatch { reason, excerpt, .. } => {
                assert!(reason.contains("employment"));
                assert!(excerpt.contains("Family | INDIA"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
