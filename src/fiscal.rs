//! Fiscal-year and amount parsing shared by the tabular source and the tools.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn query_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b((?:19|20)[0-9]{2})\b").expect("valid regex"))
}

fn fy_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bFY\s?'?([0-9]{4}|[0-9]{2})\b").expect("valid regex"))
}

// File names use `_` as a separator, which `\b` treats as a word character.
fn file_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})(?:[^0-9]|$)").expect("valid regex"))
}

fn fy_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)FY[_-]?([0-9]{4}|[0-9]{2})(?:[^0-9]|$)").expect("valid regex"))
}

fn non_numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9.\-]").expect("valid regex"))
}

fn normalize_year(raw: &str) -> String {
    if raw.len() == 2 {
        format!("20{}", raw)
    } else {
        raw.to_string()
    }
}

/// Fiscal years named in a question (`2024`, `FY23`, `FY 2025`), sorted and unique.
pub fn years_in_query(query: &str) -> Vec<String> {
    let mut years = BTreeSet::new();

    for caps in fy_year_re().captures_iter(query) {
        years.insert(normalize_year(&caps[1]));
    }
    for caps in query_year_re().captures_iter(query) {
        years.insert(caps[1].to_string());
    }

    years.into_iter().collect()
}

/// `MSFT_FY23Q4_10K.csv` → 2023, `Microsoft_2024_table_3.csv` → 2024.
pub fn year_from_file_name(name: &str) -> Option<String> {
    if let Some(caps) = fy_name_re().captures(name) {
        return Some(normalize_year(&caps[1]));
    }
    file_year_re()
        .captures(name)
        .map(|caps| caps[1].to_string())
}

/// Parse a formatted table cell: `$211,915` → 211915, `(1,234)` → -1234.
/// Percentages and empty or dash cells yield `None`.
pub fn parse_amount(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.contains('%') {
        return None;
    }

    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned = non_numeric_re().replace_all(trimmed, "");
    if cleaned.is_empty() || cleaned == "-" || cleaned == "." {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value.abs() } else { value })
}
