// 🔤 Date/Status Codec - one table cell → CutoffValue
//
// decode() is total: every input maps to a value, unparseable text lands in
// CutoffValue::Unrecognized instead of an error.

use crate::model::{CutoffValue, TableType, MONTH_NAMES};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Decoded cell: the value plus any footnote markers stripped from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub value: CutoffValue,
    pub annotation: Option<String>,
}

impl Decoded {
    fn plain(value: CutoffValue) -> Self {
        Decoded { value, annotation: None }
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // day, month name (3+ letters), year: exactly 4 digits (19xx/20xx) or exactly 2
        Regex::new(r"^(\d{1,2})[\s\-/.]*([A-Za-z]{3,9})\.?[\s\-/.,]*((?:19|20)\d{2}|\d{2})$")
            .expect("date pattern is valid")
    })
}

fn bracketed_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*[\(\[](\d{1,3}|[a-z]|[*†‡]{1,3})[\)\]]$").expect("marker pattern is valid"))
}

/// Collapse whitespace (NBSP included), drop soft hyphens and zero-width chars
pub fn normalize_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '\u{ad}' | '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn superscript_digit(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴' => Some('4'),
        '⁵' => Some('5'),
        '⁶' => Some('6'),
        '⁷' => Some('7'),
        '⁸' => Some('8'),
        '⁹' => Some('9'),
        _ => None,
    }
}

/// Strip trailing footnote markers: `*`, `†`, superscript digits, `(1)`, `[a]`
///
/// Returns the remaining text and the markers in their original order.
pub fn split_annotation(text: &str) -> (String, Option<String>) {
    let mut core = text.trim().to_string();
    let mut markers: Vec<String> = Vec::new();

    loop {
        if let Some(caps) = bracketed_marker().captures(&core) {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(core.len());
            markers.push(caps[1].to_string());
            core.truncate(whole);
            core = core.trim_end().to_string();
            continue;
        }

        match core.chars().last() {
            Some(c @ ('*' | '†' | '‡')) => {
                markers.push(c.to_string());
                core.pop();
                core = core.trim_end().to_string();
            }
            Some(c) if superscript_digit(c).is_some() => {
                markers.push(superscript_digit(c).map(String::from).unwrap_or_default());
                core.pop();
                core = core.trim_end().to_string();
            }
            _ => break,
        }
    }

    if markers.is_empty() {
        (core, None)
    } else {
        markers.reverse();
        (core, Some(markers.concat()))
    }
}

/// Two-digit years: 00-49 → 20xx, 50-99 → 19xx
fn expand_year(digits: &str) -> Option<i32> {
    let n: i32 = digits.parse().ok()?;
    if digits.len() == 4 {
        Some(n)
    } else if n < 50 {
        Some(2000 + n)
    } else {
        Some(1900 + n)
    }
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|full| full.starts_with(&lower))
        .map(|idx| idx as u32 + 1)
}

/// Parse a day-month-year cutoff
fn parse_date(text: &str) -> Option<NaiveDate> {
    let caps = date_pattern().captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year = expand_year(&caps[3])?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Decode one cell
///
/// The table/category/country context is only used for diagnostics.
pub fn decode(raw_text: &str, table_type: TableType, category: &str, country: &str) -> Decoded {
    let text = normalize_text(raw_text);
    if text.is_empty() {
        return Decoded::plain(CutoffValue::Unlisted);
    }

    let (core, annotation) = split_annotation(&text);
    if core.is_empty() {
        // cell held nothing but a footnote marker
        return Decoded { value: CutoffValue::Unlisted, annotation };
    }

    match core.to_uppercase().as_str() {
        "C" | "CURRENT" => return Decoded { value: CutoffValue::Current, annotation },
        "U" | "UNAVAILABLE" => return Decoded { value: CutoffValue::Unavailable, annotation },
        _ => {}
    }

    if let Some(date) = parse_date(&core) {
        return Decoded { value: CutoffValue::Date(date), annotation };
    }

    tracing::debug!(
        table_type = table_type.code(),
        category,
        country,
        text = %text,
        "unrecognized cutoff cell"
    );
    Decoded { value: CutoffValue::Unrecognized(text), annotation: None }
}

/// Inverse of decode for display: C, U, 01JAN20
pub fn encode(value: &CutoffValue) -> String {
    match value {
        CutoffValue::Current => "C".to_string(),
        CutoffValue::Unavailable => "U".to_string(),
        CutoffValue::Date(d) => d.format("%d%b%y").to_string().to_uppercase(),
        CutoffValue::Unlisted => String::new(),
        CutoffValue::Unrecognized(text) => text.clone(),
    }
}
