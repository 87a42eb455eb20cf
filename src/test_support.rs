// Synthetic combined-layout pages for unit tests

const COUNTRIES: [&str; 5] = [
    "All Chargeability Areas Except Those Listed",
    "CHINA-mainland born",
    "INDIA",
    "MEXICO",
    "PHILIPPINES",
];

/// Section table with every country column holding the row's value
pub fn table(section: &str, rows: &[(&str, &str)]) -> String {
    let mut html = format!("<table><tr><td>{}</td>", section);
    for c in COUNTRIES {
        html.push_str(&format!("<td>{}</td>", c));
    }
    html.push_str("</tr>");
    for (label, value) in rows {
        html.push_str(&format!("<tr><td>{}</td>", label));
        for _ in COUNTRIES {
            html.push_str(&format!("<td>{}</td>", value));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

pub fn employment() -> String {
    table(
        "Employment-based",
        &[
            ("1st", "C"),
            ("2nd", "01JAN06"),
            ("3rd", "01APR03"),
            ("Other Workers", "01APR03"),
            ("4th", "C"),
            ("Certain Religious Workers", "C"),
            ("5th", "C"),
        ],
    )
}

/// Complete pre-2015 bulletin; F1 holds `f1` in every column
pub fn combined_page(f1: &str) -> String {
    let family = table(
        "Family",
        &[("F1", f1), ("F2A", "01AUG06"), ("F2B", "01JAN03"), ("F3", "01JUN00"), ("F4", "08MAR99")],
    );
    format!("<html><body>{}{}</body></html>", family, employment())
}
