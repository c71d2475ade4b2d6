//! Candidate harvesters.
//!
//! Each strategy turns page text into candidate [`Measurement`] rows on its
//! own; none is assumed to be sufficient. The merger decides which
//! candidates survive.
//!
//! - [`table`]: column-split lines (`Glucose   6.1   mmol/L   3.9-5.5`)
//! - [`card`]: heading blocks with labelled `Result:` / `Unit of Measure:` lines
//! - [`llm`]: prompt and schema for per-page model extraction
//! - [`fallback`]: looser single-line regex and narrative culture results

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{MeasurementValue, ReferenceRange};
use crate::rules::{is_qualitative, is_unit_token};
use crate::text::parse_number;

pub mod card;
pub mod fallback;
pub mod llm;
pub mod table;

/// Split a line into columns on runs of two or more whitespace characters.
pub fn split_columns(line: &str) -> Vec<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\s{2,}").unwrap());
    re.split(line.trim())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Lines that look like table rows: at least two columns and something
/// value-like after the first one. Pages without any are not worth a model
/// call.
pub fn table_like_lines(page: &str) -> Vec<String> {
    page.lines()
        .filter(|line| {
            let columns = split_columns(line);
            columns.len() >= 2
                && columns[1..].iter().any(|c| {
                    c.chars().any(|ch| ch.is_ascii_digit()) || is_qualitative(c)
                })
        })
        .map(|line| line.trim().to_string())
        .collect()
}

/// A value token: a bare number, a comparator value (`<0.5`) or a
/// qualitative keyword.
pub(crate) fn parse_value_token(token: &str) -> Option<MeasurementValue> {
    let t = token.trim();
    if let Some(n) = parse_number(t) {
        return Some(MeasurementValue::Number(n));
    }
    if is_comparator_value(t) || is_qualitative(t) {
        return Some(MeasurementValue::Text(t.to_string()));
    }
    None
}

pub(crate) fn is_comparator_value(token: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(?:<=?|>=?|≤|≥)\s*\d+(?:[.,]\d+)?$").unwrap());
    re.is_match(token.trim())
}

/// Two-sided `a-b` range token.
pub(crate) fn is_span_range(token: &str) -> bool {
    ReferenceRange::parse(token).is_some_and(|r| r.min.is_some() && r.max.is_some())
}

/// Find a reference range inside free text that may carry units or words
/// (`Optimal: 65-99 mg/dL`, `< 200 mg/dL`).
pub(crate) fn find_range(text: &str) -> Option<ReferenceRange> {
    let cleaned = text
        .split_whitespace()
        .filter(|t| !is_unit_token(t))
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(range) = ReferenceRange::parse(&cleaned) {
        return Some(range);
    }

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?:<=?|>=?|≤|≥)\s*\d+(?:[.,]\d+)?|-?\d+(?:[.,]\d+)?\s*(?:-|–|to|bis)\s*-?\d+(?:[.,]\d+)?")
            .unwrap()
    });
    re.find(&cleaned)
        .and_then(|m| ReferenceRange::parse(m.as_str()))
}

/// First unit token found in free text, if any.
pub(crate) fn find_unit(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|t| is_unit_token(t))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_columns() {
        assert_eq!(
            split_columns("  Glucose    6.1  H   mmol/L    3.9 - 5.5 "),
            vec!["Glucose", "6.1", "H", "mmol/L", "3.9 - 5.5"]
        );
        assert_eq!(split_columns("Single column text"), vec!["Single column text"]);
    }

    #[test]
    fn test_table_like_lines() {
        let page = "LABORATORY REPORT\nGlucose    6.1   mmol/L\nUrine culture    Negative\nPatient  Jane Doe";
        assert_eq!(
            table_like_lines(page),
            vec![
                "Glucose    6.1   mmol/L".to_string(),
                "Urine culture    Negative".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_value_token() {
        assert_eq!(
            parse_value_token("6,1"),
            Some(MeasurementValue::Number(6.1))
        );
        assert_eq!(
            parse_value_token("<0.5"),
            Some(MeasurementValue::Text("<0.5".to_string()))
        );
        assert_eq!(
            parse_value_token("Negative"),
            Some(MeasurementValue::Text("Negative".to_string()))
        );
        assert_eq!(parse_value_token("mg/dL"), None);
    }

    #[test]
    fn test_find_range() {
        assert_eq!(
            find_range("65-99 mg/dL"),
            Some(ReferenceRange::new(Some(65.0), Some(99.0)))
        );
        assert_eq!(
            find_range("Optimal < 200"),
            Some(ReferenceRange::new(None, Some(200.0)))
        );
        assert_eq!(find_range("see comment"), None);
    }
}
