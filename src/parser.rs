// 🧾 Bulletin Parser - adapter cells + codec → one complete BulletinMonth
//
// parse(html, year, month):
//   1. adapter picks the layout for the month and yields raw cells
//   2. row/column labels resolve to canonical codes through the vocabulary
//   3. every cell is decoded
//   4. completeness is asserted against the era's vocabulary
//
// Output records are sorted by (table type, category, country), so the same
// HTML always produces the same BulletinMonth.

use crate::adapter::{self, CellText, RawCell};
use crate::codec::{self, Decoded};
use crate::error::{BulletinError, BulletinResult, MissingEntry};
use crate::model::{BulletinMonth, BulletinRecord, CutoffValue, Layout, TableType, VisaClass, YearMonth};
use crate::vocabulary::Vocabulary;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

type RecordKey = (TableType, String, String);

pub struct BulletinParser {
    vocabulary: Arc<Vocabulary>,
}

impl BulletinParser {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        BulletinParser { vocabulary }
    }

    /// Parse one bulletin page
    ///
    /// # Errors
    /// * `InvalidPeriod` - month outside 1-12
    /// * `FormatMismatch` - the layout's tables were not found
    /// * `IncompleteVocabulary` - a required category/country never appeared
    pub fn parse(&self, html: &str, year: i32, month: u32) -> BulletinResult<BulletinMonth> {
        let period = YearMonth::new(year, month).ok_or(BulletinError::InvalidPeriod { year, month })?;
        self.parse_period(html, period)
    }

    pub fn parse_period(&self, html: &str, period: YearMonth) -> BulletinResult<BulletinMonth> {
        let (layout, cells) = adapter::extract(html, period, &self.vocabulary)?;

        let mut decoded: BTreeMap<RecordKey, (VisaClass, Decoded)> = BTreeMap::new();
        for cell in &cells {
            let Some((category, country)) = self.resolve(cell, period) else {
                tracing::debug!(
                    period = %period,
                    category = %cell.category_label,
                    country = %cell.country_label,
                    "cell labels not in vocabulary"
                );
                continue;
            };

            let value = match &cell.text {
                CellText::Raw(text) => codec::decode(text, cell.table_type, &category, &country),
                CellText::Unlisted => Decoded { value: CutoffValue::Unlisted, annotation: None },
            };

            match decoded.entry((cell.table_type, category, country)) {
                Entry::Vacant(slot) => {
                    slot.insert((cell.visa_class, value));
                }
                Entry::Occupied(mut slot) => {
                    let (table_type, category, country) = slot.key().clone();
                    let (_, existing) = slot.get_mut();
                    tracing::warn!(
                        period = %period,
                        table_type = table_type.code(),
                        category = %category,
                        country = %country,
                        kept = %existing.value.to_storage(),
                        other = %value.value.to_storage(),
                        "two rows map to the same record"
                    );
                    // first value wins unless it carried nothing
                    if existing.value == CutoffValue::Unlisted && value.value != CutoffValue::Unlisted {
                        *existing = value;
                    }
                }
            }
        }

        self.complete(&mut decoded, layout, period)?;

        let records: Vec<BulletinRecord> = decoded
            .into_iter()
            .map(|((table_type, category, country), (visa_class, d))| BulletinRecord {
                year: period.year,
                month: period.month,
                table_type,
                visa_class,
                category,
                country,
                value: d.value,
                annotation: d.annotation,
            })
            .collect();

        let unrecognized = records
            .iter()
            .filter(|r| matches!(r.value, CutoffValue::Unrecognized(_)))
            .count();
        tracing::info!(
            period = %period,
            layout = layout.code(),
            records = records.len(),
            unrecognized,
            "parsed bulletin"
        );

        Ok(BulletinMonth::new(period, layout, records))
    }

    /// Canonical (category, country) codes of a cell
    fn resolve(&self, cell: &RawCell, period: YearMonth) -> Option<(String, String)> {
        let (category, country) = match cell.text {
            // unlisted markers already carry canonical codes
            CellText::Unlisted => (
                self.vocabulary.category(&cell.category_label)?,
                self.vocabulary.country(&cell.country_label)?,
            ),
            CellText::Raw(_) => (
                self.vocabulary
                    .resolve_category(cell.visa_class, &cell.category_label, period)?,
                self.vocabulary
                    .resolve_country(cell.visa_class, &cell.country_label, period)?,
            ),
        };
        Some((category.code.clone(), country.code.clone()))
    }

    /// Fill absent optional entries with Unlisted, fail on absent required ones
    fn complete(
        &self,
        decoded: &mut BTreeMap<RecordKey, (VisaClass, Decoded)>,
        layout: Layout,
        period: YearMonth,
    ) -> BulletinResult<()> {
        let mut missing = Vec::new();

        for &table_type in layout.table_types() {
            for class in [VisaClass::Family, VisaClass::Employment] {
                for category in self.vocabulary.categories_for(class, period) {
                    for country in self.vocabulary.countries_for(class, period) {
                        let key = (table_type, category.code.clone(), country.code.clone());
                        if decoded.contains_key(&key) {
                            continue;
                        }
                        if category.optional || country.optional {
                            decoded.insert(key, (class, Decoded { value: CutoffValue::Unlisted, annotation: None }));
                        } else {
                            missing.push(MissingEntry {
                                table_type,
                                category: category.code.clone(),
                                country: country.code.clone(),
                            });
                        }
                    }
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            tracing::error!(period = %period, missing = missing.len(), "bulletin incomplete");
            Err(BulletinError::IncompleteVocabulary { period, missing })
        }
    }
}
