// Split layout (October 2015 through September 2022)
//
// Each section appears twice: the first table holds Final Action dates, the
// second Dates for Filing. Header row is the first row.

use super::html;
use super::{read_table, section_tables, RawCell, RowRules, SectionTable, TableFormat};
use crate::error::{BulletinError, BulletinResult};
use crate::model::{Layout, TableType, VisaClass, YearMonth};
use crate::vocabulary::Vocabulary;
use std::sync::Arc;

pub struct SplitFormat {
    vocabulary: Arc<Vocabulary>,
}

impl SplitFormat {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        SplitFormat { vocabulary }
    }
}

impl TableFormat for SplitFormat {
    fn extract(&self, source: &str, period: YearMonth) -> BulletinResult<Vec<RawCell>> {
        let grids = html::tables(source);
        let sections = section_tables(&grids, &self.vocabulary, period);
        let mut cells = Vec::new();

        for class in [VisaClass::Family, VisaClass::Employment] {
            let found: Vec<usize> = sections
                .iter()
                .filter(|(_, c)| *c == class)
                .map(|(idx, _)| *idx)
                .collect();

            if found.len() < 2 {
                return Err(BulletinError::format_mismatch(
                    period,
                    format!(
                        "expected final action and filing {} tables, found {}",
                        class.code(),
                        found.len()
                    ),
                    html::excerpt(source, &grids),
                ));
            }
            if found.len() > 2 {
                tracing::warn!(period = %period, class = class.code(), tables = found.len(), "extra section tables ignored");
            }

            for (idx, table_type) in found.iter().zip([TableType::FinalAction, TableType::FilingDate]) {
                let table = SectionTable {
                    grid: &grids[*idx],
                    header_row: 0,
                    visa_class: class,
                    table_type,
                };
                read_table(table, &self.vocabulary, period, RowRules::default(), source, &grids, &mut cells)?;
            }
        }

        tracing::debug!(period = %period, cells = cells.len(), "split layout extracted");
        Ok(cells)
    }

    fn layout(&self) -> Layout {
        Layout::Split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CellText;

    fn table(section: &str, row: &str, value: &str) -> String {
        format!(
            "<table><tr><td>{}</td><td>All Chargeability</td><td>INDIA</td></tr>\
             <tr><td>{}</td><td>{}</td><td>{}</td></tr></table>",
            section, row, value, value
        )
    }

    fn format() -> SplitFormat {
        SplitFormat::new(Arc::new(Vocabulary::embedded().unwrap()))
    }

    #[test]
    fn test_second_table_of_section_is_filing_date() {
        let page = [
            table("Family-Sponsored", "F1", "08DEC08"),
            table("Employment-based", "2nd", "01JAN12"),
            table("Family-Sponsored", "F1", "01JAN10"),
            table("Employment-based", "2nd", "01JUL12"),
        ]
        .concat();
        let period = YearMonth::new(2016, 6).unwrap();
        let cells = format().extract(&page, period).unwrap();

        let value = |class: VisaClass, tt: TableType| {
            cells
                .iter()
                .find(|c| c.visa_class == class && c.table_type == tt && c.country_label == "INDIA")
                .map(|c| c.text.clone())
        };
        assert_eq!(value(VisaClass::Family, TableType::FinalAction), Some(CellText::Raw("08DEC08".into())));
        assert_eq!(value(VisaClass::Family, TableType::FilingDate), Some(CellText::Raw("01JAN10".into())));
        assert_eq!(value(VisaClass::Employment, TableType::FilingDate), Some(CellText::Raw("01JUL12".into())));
    }

    #[test]
    fn test_notes_table_does_not_take_final_action_slot() {
        let page = [
            "<table><tr><td>Employment-based preference limit: 140,000</td><td>see section D</td></tr>\
             <tr><td>1st</td><td>40,040</td></tr></table>"
                .to_string(),
            table("Family-Sponsored", "F1", "08DEC08"),
            table("Employment-based", "2nd", "01JAN12"),
            table("Family-Sponsored", "F1", "01JAN10"),
            table("Employment-based", "2nd", "01JUL12"),
        ]
        .concat();
        let cells = format().extract(&page, YearMonth::new(2016, 6).unwrap()).unwrap();

        let eb2_final = cells
            .iter()
            .find(|c| c.visa_class == VisaClass::Employment
                && c.table_type == TableType::FinalAction
                && c.country_label == "INDIA")
            .unwrap();
        assert_eq!(eb2_final.text, CellText::Raw("01JAN12".into()));
    }

    #[test]
    fn test_single_table_per_section_is_format_mismatch() {
        let page = [
            table("Family-Sponsored", "F1", "08DEC08"),
            table("Employment-based", "2nd", "01JAN12"),
        ]
        .concat();
        let err = format().extract(&page, YearMonth::new(2016, 6).unwrap()).unwrap_err();
        assert!(matches!(err, BulletinError::FormatMismatch { .. }));
    }
}
