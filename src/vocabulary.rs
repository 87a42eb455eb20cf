// 📚 Controlled Vocabulary - canonical category and chargeability codes
//
// "A label is a VALUE (changes from era to era), the code is IDENTITY"
//
// Problem solved:
// - "1st", "F1", "1st preference" → F1 (family) or EB-1 (employment)
// - "CHINA-mainland born", "CH" → China
// - Set-aside EB-5 lines only exist from FY2023 on, translators only until FY2016
//
// The tables live in data/vocabulary.toml (embedded at build time), so adding
// a category or a country split is a data change, not a code change.

use crate::codec::normalize_text;
use crate::error::{BulletinError, BulletinResult};
use crate::model::{VisaClass, YearMonth};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

const EMBEDDED_VOCABULARY: &str = include_str!("../data/vocabulary.toml");

// ============================================================================
// LABEL MATCHING
// ============================================================================

fn hyphen_break() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\w)-\s*(\w)").expect("hyphen pattern is valid"))
}

/// Normalize a table label for matching
///
/// Lowercase, whitespace collapsed, trailing footnote asterisks dropped,
/// word-breaking hyphens removed ("PHILIP-PINES" → "philippines").
pub fn normalize_label(raw: &str) -> String {
    let text = normalize_text(raw);
    let text = text.trim_end_matches(|c| matches!(c, '*' | '†' | '‡')).trim();
    hyphen_break().replace_all(text, "$1$2").to_lowercase()
}

/// Aliases + keyword sets shared by categories and countries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelMatcher {
    /// Whole-label matches
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Each inner list matches when all of its substrings occur
    #[serde(default)]
    pub keywords: Vec<Vec<String>>,
}

impl LabelMatcher {
    fn normalized(self) -> LabelMatcher {
        LabelMatcher {
            aliases: self.aliases.iter().map(|a| normalize_label(a)).collect(),
            keywords: self
                .keywords
                .iter()
                .map(|set| set.iter().map(|k| normalize_label(k)).collect())
                .collect(),
        }
    }

    fn matches_alias(&self, code: &str, label: &str) -> bool {
        normalize_label(code) == label || self.aliases.iter().any(|a| a == label)
    }

    fn matches_keywords(&self, label: &str) -> bool {
        self.keywords
            .iter()
            .any(|set| !set.is_empty() && set.iter().all(|k| label.contains(k.as_str())))
    }
}

/// Inclusive effective range; open ends when None
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EffectiveRange {
    #[serde(default)]
    pub from: Option<YearMonth>,
    #[serde(default)]
    pub until: Option<YearMonth>,
}

impl EffectiveRange {
    pub fn contains(&self, period: YearMonth) -> bool {
        self.from.map_or(true, |f| f <= period) && self.until.map_or(true, |u| period <= u)
    }
}

// ============================================================================
// VOCABULARY ENTRIES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDef {
    pub code: String,
    pub class: VisaClass,
    #[serde(flatten)]
    pub labels: LabelMatcher,
    #[serde(default)]
    pub optional: bool,
    #[serde(flatten)]
    pub effective: EffectiveRange,
}

fn all_classes() -> Vec<VisaClass> {
    vec![VisaClass::Family, VisaClass::Employment]
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryDef {
    pub code: String,
    #[serde(default = "all_classes")]
    pub classes: Vec<VisaClass>,
    #[serde(flatten)]
    pub labels: LabelMatcher,
    #[serde(default)]
    pub optional: bool,
    #[serde(flatten)]
    pub effective: EffectiveRange,
}

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    #[serde(default, rename = "category")]
    categories: Vec<CategoryDef>,
    #[serde(default, rename = "country")]
    countries: Vec<CountryDef>,
}

// ============================================================================
// VOCABULARY
// ============================================================================

/// The two controlled tables, consulted by the adapter and the parser
#[derive(Debug, Clone)]
pub struct Vocabulary {
    categories: Vec<CategoryDef>,
    countries: Vec<CountryDef>,
}

impl Vocabulary {
    /// Vocabulary shipped with the crate
    pub fn embedded() -> BulletinResult<Vocabulary> {
        Vocabulary::from_toml(EMBEDDED_VOCABULARY)
    }

    pub fn load(path: &Path) -> BulletinResult<Vocabulary> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BulletinError::io(path.display().to_string(), e))?;
        Vocabulary::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> BulletinResult<Vocabulary> {
        let file: VocabularyFile =
            toml::from_str(content).map_err(|e| BulletinError::Vocabulary(e.to_string()))?;

        let categories: Vec<CategoryDef> = file
            .categories
            .into_iter()
            .map(|mut c| {
                c.labels = c.labels.normalized();
                c
            })
            .collect();
        let countries: Vec<CountryDef> = file
            .countries
            .into_iter()
            .map(|mut c| {
                c.labels = c.labels.normalized();
                c
            })
            .collect();

        let vocabulary = Vocabulary { categories, countries };
        vocabulary.validate()?;
        Ok(vocabulary)
    }

    fn validate(&self) -> BulletinResult<()> {
        if self.categories.is_empty() || self.countries.is_empty() {
            return Err(BulletinError::Vocabulary(
                "vocabulary needs at least one category and one country".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for code in self.categories.iter().map(|c| &c.code) {
            if !seen.insert(code.as_str()) {
                return Err(BulletinError::Vocabulary(format!("duplicate category code '{}'", code)));
            }
        }

        seen.clear();
        for country in &self.countries {
            if !seen.insert(country.code.as_str()) {
                return Err(BulletinError::Vocabulary(format!(
                    "duplicate country code '{}'",
                    country.code
                )));
            }
            if country.classes.is_empty() {
                return Err(BulletinError::Vocabulary(format!(
                    "country '{}' applies to no visa class",
                    country.code
                )));
            }
        }

        for (code, range) in self
            .categories
            .iter()
            .map(|c| (&c.code, c.effective))
            .chain(self.countries.iter().map(|c| (&c.code, c.effective)))
        {
            if let (Some(from), Some(until)) = (range.from, range.until) {
                if from > until {
                    return Err(BulletinError::Vocabulary(format!(
                        "'{}' has an empty effective range {}..{}",
                        code, from, until
                    )));
                }
            }
        }

        Ok(())
    }

    /// Categories of a class in effect for the month, in declaration order
    pub fn categories_for(&self, class: VisaClass, period: YearMonth) -> impl Iterator<Item = &CategoryDef> {
        self.categories
            .iter()
            .filter(move |c| c.class == class && c.effective.contains(period))
    }

    /// Countries published for a class in the month
    pub fn countries_for(&self, class: VisaClass, period: YearMonth) -> impl Iterator<Item = &CountryDef> {
        self.countries
            .iter()
            .filter(move |c| c.classes.contains(&class) && c.effective.contains(period))
    }

    /// Map a row label to its category, None for decorative/unknown rows
    pub fn resolve_category(&self, class: VisaClass, label: &str, period: YearMonth) -> Option<&CategoryDef> {
        let label = normalize_label(label);
        if label.is_empty() {
            return None;
        }
        let candidates: Vec<&CategoryDef> = self.categories_for(class, period).collect();

        candidates
            .iter()
            .find(|c| c.labels.matches_alias(&c.code, &label))
            .or_else(|| candidates.iter().find(|c| c.labels.matches_keywords(&label)))
            .copied()
    }

    /// Map a column header to its chargeability area
    pub fn resolve_country(&self, class: VisaClass, label: &str, period: YearMonth) -> Option<&CountryDef> {
        let label = normalize_label(label);
        if label.is_empty() {
            return None;
        }
        let candidates: Vec<&CountryDef> = self.countries_for(class, period).collect();

        candidates
            .iter()
            .find(|c| c.labels.matches_alias(&c.code, &label))
            .or_else(|| candidates.iter().find(|c| c.labels.matches_keywords(&label)))
            .copied()
    }

    pub fn category(&self, code: &str) -> Option<&CategoryDef> {
        self.categories.iter().find(|c| c.code == code)
    }

    pub fn country(&self, code: &str) -> Option<&CountryDef> {
        self.countries.iter().find(|c| c.code == code)
    }

    pub fn all_categories(&self) -> &[CategoryDef] {
        &self.categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn vocab() -> Vocabulary {
        Vocabulary::embedded().expect("embedded vocabulary parses")
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("PHILIP-PINES"), "philippines");
        assert_eq!(normalize_label("CHINA- mainland\u{a0}born"), "chinamainland born");
        assert_eq!(normalize_label("  Other   Workers* "), "other workers");
    }

    #[test]
    fn test_same_label_resolves_by_class() {
        let v = vocab();
        let p = ym("2010-06");
        assert_eq!(v.resolve_category(VisaClass::Family, "1st", p).unwrap().code, "F1");
        assert_eq!(v.resolve_category(VisaClass::Employment, "1st", p).unwrap().code, "EB-1");
        assert_eq!(v.resolve_category(VisaClass::Family, "2A", p).unwrap().code, "F2A");
        assert_eq!(v.resolve_category(VisaClass::Family, "F2B", p).unwrap().code, "F2B");
    }

    #[test]
    fn test_eb5_labels_by_era() {
        let v = vocab();
        let split = ym("2016-06");
        assert_eq!(
            v.resolve_category(VisaClass::Employment, "5th Non-Regional Center (C5 and T5)", split)
                .unwrap()
                .code,
            "EB-5"
        );
        assert_eq!(
            v.resolve_category(VisaClass::Employment, "5th Regional Center (I5 and R5)", split)
                .unwrap()
                .code,
            "EB-5-RegionalCenter"
        );

        let modern = ym("2024-02");
        assert_eq!(
            v.resolve_category(VisaClass::Employment, "5th Unreserved (including C5, T5, I5, R5)", modern)
                .unwrap()
                .code,
            "EB-5-Unreserved"
        );
        assert_eq!(
            v.resolve_category(VisaClass::Employment, "5th Set Aside: Rural (20%)", modern)
                .unwrap()
                .code,
            "EB-5-Rural"
        );
        // group row text missing: bare label is not enough
        assert!(v.resolve_category(VisaClass::Employment, "Rural (20%)", modern).is_none());
        // pre-2022 EB-5 line does not exist in the modern era
        assert!(v.resolve_category(VisaClass::Employment, "5th Non-Regional Center", modern).is_none());
    }

    #[test]
    fn test_country_headers() {
        let v = vocab();
        let p = ym("2010-06");
        let cases = [
            ("All Chargeability Areas Except Those Listed", "All"),
            ("CHINA-mainland born", "China"),
            ("INDIA", "India"),
            ("MEXICO", "Mexico"),
            ("PHILIP-PINES", "Philippines"),
            ("PH", "Philippines"),
        ];
        for (label, code) in cases {
            assert_eq!(v.resolve_country(VisaClass::Family, label, p).unwrap().code, code, "{}", label);
        }
        assert!(v.resolve_country(VisaClass::Family, "Notes", p).is_none());
    }

    #[test]
    fn test_central_america_only_for_employment_after_introduction() {
        let v = vocab();
        let label = "EL SALVADOR GUATEMALA HONDURAS";
        assert!(v.resolve_country(VisaClass::Employment, label, ym("2016-06")).is_some());
        assert!(v.resolve_country(VisaClass::Family, label, ym("2016-06")).is_none());
        assert!(v.resolve_country(VisaClass::Employment, label, ym("2015-06")).is_none());
    }

    #[test]
    fn test_categories_for_era() {
        let v = vocab();
        let legacy: Vec<&str> = v
            .categories_for(VisaClass::Employment, ym("2010-06"))
            .map(|c| c.code.as_str())
            .collect();
        assert!(legacy.contains(&"EB-5"));
        assert!(legacy.contains(&"EB-4-Translators"));
        assert!(!legacy.contains(&"EB-5-Unreserved"));

        let modern: Vec<&str> = v
            .categories_for(VisaClass::Employment, ym("2024-02"))
            .map(|c| c.code.as_str())
            .collect();
        assert!(modern.contains(&"EB-5-Infrastructure"));
        assert!(!modern.contains(&"EB-5"));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let toml = r#"
            [[category]]
            code = "F1"
            class = "family"
            [[category]]
            code = "F1"
            class = "family"
            [[country]]
            code = "All"
        "#;
        let err = Vocabulary::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate category code 'F1'"));
    }

    #[test]
    fn test_empty_effective_range_rejected() {
        let toml = r#"
            [[category]]
            code = "F1"
            class = "family"
            from = "2020-01"
            until = "2019-01"
            [[country]]
            code = "All"
        "#;
        assert!(Vocabulary::from_toml(toml).is_err());
    }
}
