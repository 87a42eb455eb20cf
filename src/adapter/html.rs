// HTML → plain text grids
//
// Every strategy works on TableGrid, never on the DOM directly, so the
// era-specific code only deals with rows of cleaned strings.

use crate::codec::normalize_text;
use scraper::{ElementRef, Html, Node, Selector};

/// Widest colspan expanded into the grid
const MAX_COLSPAN: usize = 20;

/// One <table>, cell text cleaned, colspans expanded
#[derive(Debug, Clone, Default)]
pub struct TableGrid {
    pub caption: Option<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    /// First cell of a row ("" when the row is empty)
    pub fn label(&self, row: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.first())
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

fn selector(css: &str) -> Selector {
    // selectors are compile-time literals
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {}: {:?}", css, e))
}

/// Text of a cell as rendered: inline markup concatenated, <br>/<p> as spaces
///
/// A footnote superscript is kept apart from the value in brackets
/// ("15JAN20<sup>12</sup>" → "15JAN20[12]") so the codec never reads it as
/// part of the year. Other superscripts ("1<sup>st</sup>") stay inline.
pub fn cell_text(cell: ElementRef) -> String {
    let mut out = String::new();
    push_text(cell, &mut out);
    normalize_text(&out)
}

fn push_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Node::Text(text) = child.value() {
            out.push_str(text);
            continue;
        }
        let Some(el) = ElementRef::wrap(child) else { continue };
        match el.value().name() {
            "sup" => push_superscript(el, out),
            "br" | "p" | "div" | "li" => {
                out.push(' ');
                push_text(el, out);
            }
            _ => push_text(el, out),
        }
    }
}

fn push_superscript(sup: ElementRef, out: &mut String) {
    let text = normalize_text(&sup.text().collect::<String>());
    if is_footnote_marker(&text) {
        out.push('[');
        out.push_str(&text);
        out.push(']');
    } else {
        out.push_str(&text);
    }
}

/// 1-3 digits, one lowercase letter, or up to three of `*` `†` `‡`
fn is_footnote_marker(text: &str) -> bool {
    let len = text.chars().count();
    if len == 0 || len > 3 {
        return false;
    }
    text.chars().all(|c| c.is_ascii_digit())
        || (len == 1 && text.chars().all(|c| c.is_ascii_lowercase()))
        || text.chars().all(|c| matches!(c, '*' | '†' | '‡'))
}

fn colspan(cell: &ElementRef) -> usize {
    cell.value()
        .attr("colspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_COLSPAN)
}

/// All tables of the document in source order
pub fn tables(html: &str) -> Vec<TableGrid> {
    let document = Html::parse_document(html);
    let table_sel = selector("table");
    let row_sel = selector("tr");
    let cell_sel = selector("th, td");
    let caption_sel = selector("caption");

    document
        .select(&table_sel)
        .map(|table| {
            let caption = table
                .select(&caption_sel)
                .next()
                .map(cell_text)
                .filter(|c| !c.is_empty());

            let rows = table
                .select(&row_sel)
                .map(|row| {
                    let mut cells = Vec::new();
                    for cell in row.select(&cell_sel) {
                        let text = cell_text(cell);
                        for _ in 0..colspan(&cell) {
                            cells.push(text.clone());
                        }
                    }
                    cells
                })
                .filter(|cells| !cells.is_empty())
                .collect();

            TableGrid { caption, rows }
        })
        .collect()
}

/// Short diagnostic of what the document contains, for FormatMismatch
pub fn excerpt(html: &str, grids: &[TableGrid]) -> String {
    const LIMIT: usize = 200;

    let summary = if grids.is_empty() {
        let document = Html::parse_document(html);
        normalize_text(&document.root_element().text().collect::<Vec<_>>().join(" "))
    } else {
        let heads: Vec<String> = grids
            .iter()
            .take(6)
            .map(|g| format!("[{}]", g.rows.first().map(|r| r.join(" | ")).unwrap_or_default()))
            .collect();
        format!("{} tables: {}", grids.len(), heads.join(" "))
    };

    summary.chars().take(LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_extracts_rows_and_cells() {
        let html = r#"
            <html><body>
            <table>
              <caption> Final Action </caption>
              <tr><th>Family-<br>Sponsored</th><th>CHINA-<br/>mainland born</th></tr>
              <tr><td><strong>F1</strong></td><td>01JAN06<sup>1</sup></td></tr>
              <tr></tr>
            </table>
            </body></html>"#;

        let grids = tables(html);
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].caption.as_deref(), Some("Final Action"));
        assert_eq!(grids[0].rows.len(), 2);
        assert_eq!(grids[0].rows[0], vec!["Family- Sponsored", "CHINA- mainland born"]);
        assert_eq!(grids[0].rows[1], vec!["F1", "01JAN06[1]"]);
        assert_eq!(grids[0].label(1), "F1");
        assert_eq!(grids[0].label(9), "");
    }

    #[test]
    fn test_footnote_superscripts_kept_apart_from_value() {
        let html = r#"<table>
            <tr><td>1<sup>st</sup></td><td>15JAN20<sup>12</sup></td><td>C<sup>1</sup></td></tr>
            <tr><td>2A</td><td>01JAN06<sup>*</sup></td><td>U<sup> <b>a</b> </sup></td></tr>
            </table>"#;
        let grids = tables(html);
        assert_eq!(grids[0].rows[0], vec!["1st", "15JAN20[12]", "C[1]"]);
        assert_eq!(grids[0].rows[1], vec!["2A", "01JAN06[*]", "U[a]"]);
    }

    #[test]
    fn test_colspan_expanded() {
        let html = r#"<table><tr><td colspan="3">DATES FOR FILING</td></tr><tr><td>a</td><td>b</td><td>c</td></tr></table>"#;
        let grids = tables(html);
        assert_eq!(grids[0].rows[0].len(), 3);
        assert_eq!(grids[0].rows[0][2], "DATES FOR FILING");
    }

    #[test]
    fn test_excerpt_without_tables_uses_text() {
        let html = "<html><body><h1>Page  Not\n Found</h1></body></html>";
        assert_eq!(excerpt(html, &[]), "Page Not Found");
    }

    #[test]
    fn test_excerpt_lists_table_heads() {
        let html = "<table><tr><td>Family</td><td>INDIA</td></tr></table>";
        let grids = tables(html);
        assert_eq!(excerpt(html, &grids), "1 tables: [Family | INDIA]");
    }
}
