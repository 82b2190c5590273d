//! Text helpers shared by the provider normalizers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::{Html, Node};
use serde::{Deserialize, Deserializer};

use crate::Source;

/// Byte budget for stored descriptions.
pub const MAX_DESCRIPTION_BYTES: usize = 2000;

/// Working hours used to annualize hourly pay.
pub const HOURS_PER_YEAR: i64 = 2080;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre", "section", "table", "tr",
    "ul",
];

fn is_block(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|el| BLOCK_TAGS.contains(&el.name()))
}

/// Converts an HTML fragment to plain text: script and style bodies are dropped,
/// entities decoded and block elements turned into line breaks.
pub fn strip_markup(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return collapse_whitespace(input);
    }

    let fragment = Html::parse_fragment(input);
    let mut out = String::with_capacity(input.len());
    for node in fragment.tree.root().descendants() {
        match node.value() {
            Node::Element(_) if is_block(node.value()) => out.push('\n'),
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element())
                    .is_some_and(|el| matches!(el.name(), "script" | "style"));
                if hidden {
                    continue;
                }
                if node.prev_sibling().is_some_and(|s| is_block(s.value())) {
                    out.push('\n');
                }
                out.push_str(text);
            }
            _ => {}
        }
    }
    collapse_whitespace(&out)
}

/// Squeezes runs of spaces inside each line and drops blank lines.
fn collapse_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cuts `input` to at most `max_bytes` without splitting a character.
pub fn truncate_utf8(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    input[..end].to_string()
}

pub fn clean_description(raw: &str) -> String {
    truncate_utf8(&strip_markup(raw), MAX_DESCRIPTION_BYTES)
}

/// Accepts RFC 3339, naive ISO datetimes, `Y-m-d H:M:S` and plain dates.
pub fn parse_posted_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn extract_amounts(text: &str) -> Vec<f64> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut thousands_suffix = false;
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let mut digits = String::new();
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == ',' || chars[i] == '.') {
            if chars[i] != ',' {
                digits.push(chars[i]);
            }
            i += 1;
        }
        let Ok(mut value) = digits.trim_end_matches('.').parse::<f64>() else {
            continue;
        };
        if matches!(chars.get(i), Some('k' | 'K')) {
            value *= 1000.0;
            thousands_suffix = true;
        }
        out.push(value);
    }
    // "$120-160k" carries the suffix only on the upper bound
    if thousands_suffix {
        for value in &mut out {
            if *value < 1000.0 {
                *value *= 1000.0;
            }
        }
    }
    out
}

fn is_hourly(lower: &str) -> bool {
    ["/hr", "/hour", "per hour", "hourly", "an hour"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Yearly `(min, max)` parsed from freeform salary text such as "$120k - $160k".
/// Hourly figures are annualized. `None` when the text carries no amount.
pub fn parse_salary_text(text: &str) -> Option<(i64, i64)> {
    let amounts = extract_amounts(text);
    let first = *amounts.first()?;
    let second = amounts.get(1).copied().unwrap_or(first);
    let (min, max) = if first <= second { (first, second) } else { (second, first) };
    if min <= 0.0 && max <= 0.0 {
        return None;
    }
    let factor = if is_hourly(&text.to_ascii_lowercase()) {
        HOURS_PER_YEAR as f64
    } else {
        1.0
    };
    Some(((min * factor).round() as i64, (max * factor).round() as i64))
}

/// Prefixes a native id with its provider, leaving already-prefixed ids alone.
/// Blank ids stay blank so callers can drop the listing.
pub fn namespace_id(source: Source, native: &str) -> String {
    let native = native.trim();
    if native.is_empty() {
        return String::new();
    }
    let prefix = format!("{}-", source.as_str());
    if native.starts_with(&prefix) {
        native.to_string()
    } else {
        format!("{prefix}{native}")
    }
}

/// Deserializes JSON `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Provider ids arrive as strings from some APIs and integers from others.
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(i64),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::Text(text)) => text,
        Some(Repr::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_is_stripped_with_block_breaks() {
        let html = r#"<div><h2>About</h2><p>We build <b>fast</b> APIs &amp; tools.</p>
            <script>alert("x")</script><style>p { color: red }</style>
            <ul><li>Rust</li><li>Go</li></ul>Apply today</div>"#;
        let text = strip_markup(html);
        assert_eq!(
            text,
            "About\nWe build fast APIs & tools.\nRust\nGo\nApply today"
        );
    }

    #[test]
    fn plain_text_only_collapses_whitespace() {
        assert_eq!(strip_markup("  Rust   developer \n\n  remote "), "Rust developer\nremote");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let input = "€".repeat(5000 / 3 + 1);
        let out = truncate_utf8(&input, MAX_DESCRIPTION_BYTES);
        assert!(out.len() <= MAX_DESCRIPTION_BYTES);
        assert_eq!(out.len(), 1998);
        assert!(out.chars().all(|c| c == '€'));

        assert_eq!(truncate_utf8("short", 10), "short");
    }

    #[test]
    fn posted_at_tolerates_several_layouts() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 4)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .map(|n| n.and_utc());
        assert_eq!(parse_posted_at("2026-03-04T10:30:00Z"), expected);
        assert_eq!(parse_posted_at("2026-03-04T12:30:00+02:00"), expected);
        assert_eq!(parse_posted_at("2026-03-04T10:30:00"), expected);
        assert_eq!(parse_posted_at("2026-03-04 10:30:00"), expected);
        assert!(parse_posted_at("2026-03-04").is_some());
        assert_eq!(parse_posted_at("last tuesday"), None);
        assert_eq!(parse_posted_at(""), None);
    }

    #[test]
    fn salary_text_parsing() {
        assert_eq!(parse_salary_text("$120k - $160k"), Some((120_000, 160_000)));
        assert_eq!(parse_salary_text("$120-160k"), Some((120_000, 160_000)));
        assert_eq!(parse_salary_text("USD 95,000 - 110,000 per year"), Some((95_000, 110_000)));
        assert_eq!(parse_salary_text("$50/hr"), Some((104_000, 104_000)));
        assert_eq!(parse_salary_text("competitive"), None);
        assert_eq!(parse_salary_text(""), None);
    }

    #[test]
    fn salary_bounds_are_ordered() {
        let (min, max) = parse_salary_text("$120k + 10% bonus").unwrap();
        assert!(min <= max);
        assert_eq!(max, 120_000);
        assert_eq!(parse_salary_text("$160k - $120k"), Some((120_000, 160_000)));
    }

    #[test]
    fn ids_are_namespaced_once() {
        assert_eq!(namespace_id(Source::Remotive, "1234"), "remotive-1234");
        assert_eq!(namespace_id(Source::Adzuna, "adzuna-99"), "adzuna-99");
        assert_eq!(namespace_id(Source::JSearch, "  "), "");
    }
}
