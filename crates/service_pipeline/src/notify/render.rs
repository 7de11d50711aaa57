//! Plain-text and HTML renderings of a comparison result.

use rates_core::lenient::format_number;
use rates_core::{BetterProduct, ComparisonResult};
use std::fmt::Write;

/// Column headers in display order. Special-condition text is never shown.
pub const DISPLAY_COLUMNS: [&str; 10] = [
    "상품 타입",
    "비교 우리 은행 상품",
    "저축 기간",
    "타행명",
    "타행 상품명",
    "우리은행 기본금리",
    "우리은행 최대금리",
    "타행 기본금리",
    "타행 최대금리",
    "최대 금리차",
];

const FOOTER_LEAD: &str = "자세한 사항은 아래 링크를 통해 확인할 수 있습니다.";

fn cells(entry: &BetterProduct) -> [String; 10] {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let num = |v: Option<f64>| v.map(format_number).unwrap_or_default();
    [
        text(&entry.product_type),
        text(&entry.our_product),
        text(&entry.term),
        text(&entry.institution),
        text(&entry.product_name),
        num(entry.our_base_rate),
        num(entry.our_max_rate),
        num(entry.base_rate),
        num(entry.max_rate),
        num(entry.rate_delta),
    ]
}

/// Plain-text body: a row count, a pipe-separated table and the footer.
pub fn render_text(result: &ComparisonResult, detail_url: Option<&str>) -> String {
    let mut out = format!("Rows: {}\n\n", result.len());
    out.push_str(&DISPLAY_COLUMNS.join(" | "));
    out.push('\n');
    for entry in result.entries() {
        out.push_str(&cells(entry).join(" | "));
        out.push('\n');
    }
    if let Some(url) = detail_url {
        let _ = write!(out, "\n{FOOTER_LEAD}\n{url}\n");
    }
    out
}

/// HTML body: a row count, a bordered table and the footer.
pub fn render_html(result: &ComparisonResult, detail_url: Option<&str>) -> String {
    let mut out = format!("<p>Rows: {}</p>\n", result.len());
    out.push_str("<table border=\"1\" style=\"text-align: left;\">\n<thead><tr>");
    for column in DISPLAY_COLUMNS {
        let _ = write!(out, "<th>{}</th>", escape_html(column));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for entry in result.entries() {
        out.push_str("<tr>");
        for cell in cells(entry) {
            let _ = write!(out, "<td>{}</td>", escape_html(&cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    if let Some(url) = detail_url {
        let url = escape_html(url);
        let _ = write!(out, "<p>{FOOTER_LEAD}</p>\n<p><a href=\"{url}\">{url}</a></p>\n");
    }
    out
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ComparisonResult {
        ComparisonResult::from_entries(vec![
            BetterProduct {
                product_type: Some("DEPOSIT".to_string()),
                our_product: Some("WON플러스예금".to_string()),
                term: Some("12".to_string()),
                institution: Some("B은행".to_string()),
                product_name: Some("<특판> 예금".to_string()),
                our_base_rate: Some(2.8),
                our_max_rate: Some(3.0),
                base_rate: Some(3.1),
                max_rate: Some(3.35),
                rate_delta: Some(0.35),
            },
            BetterProduct {
                institution: Some("C은행".to_string()),
                max_rate: Some(4.0),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn test_text_body() {
        let body = render_text(&result(), Some("https://rates.example.com/detail"));
        assert!(body.starts_with("Rows: 2\n\n상품 타입 | 비교 우리 은행 상품"));
        assert!(body.contains("DEPOSIT | WON플러스예금 | 12 | B은행 | <특판> 예금 | 2.8 | 3 | 3.1 | 3.35 | 0.35"));
        assert!(body.contains(" | C은행 | "));
        assert!(body.ends_with("https://rates.example.com/detail\n"));
    }

    #[test]
    fn test_html_body_is_escaped() {
        let body = render_html(&result(), None);
        assert!(body.starts_with("<p>Rows: 2</p>"));
        assert!(body.contains("<td>&lt;특판&gt; 예금</td>"));
        assert!(body.contains("<th>최대 금리차</th>"));
        assert!(!body.contains("<a href"));
    }

    #[test]
    fn test_footer_link() {
        let body = render_html(&result(), Some("https://x.example/?a=1&b=2"));
        assert!(body.contains("<a href=\"https://x.example/?a=1&amp;b=2\">"));
    }

    #[test]
    fn test_empty_result_renders_header_only() {
        let body = render_text(&ComparisonResult::absent(), None);
        assert_eq!(body, format!("Rows: 0\n\n{}\n", DISPLAY_COLUMNS.join(" | ")));
    }
}
