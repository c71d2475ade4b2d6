use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Flag, Measurement, MeasurementValue};
use crate::rules::{
    is_category_header, is_unit_token, matches_admin_pattern, matches_analyte_vocabulary,
};
use crate::text::{collapse_whitespace, is_all_caps, title_case_heading};

use super::{find_range, find_unit, parse_value_token};

/// Lines scanned after a heading before the block is abandoned.
const CARD_WINDOW: usize = 8;

enum Field {
    Range,
    Unit,
    Result,
}

fn labelled_field(line: &str) -> Option<(Field, &str)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^\s*(desired range|reference range|reference interval|normal range|range",
            r"|unit of measure|units?|your result|result|value)\s*:\s*(.*)$",
        ))
        .unwrap()
    });
    let caps = re.captures(line)?;
    let label = caps.get(1)?.as_str().to_lowercase();
    let rest = caps.get(2)?.as_str().trim();
    let field = if label.contains("range") || label.contains("interval") {
        Field::Range
    } else if label.starts_with("unit") {
        Field::Unit
    } else {
        Field::Result
    };
    Some((field, rest))
}

fn is_heading(line: &str) -> bool {
    let t = line.trim();
    let len = t.chars().count();
    (2..=80).contains(&len)
        && is_all_caps(t)
        && !t.contains(':')
        && !matches_admin_pattern(t)
}

/// Harvest heading blocks of the form
///
/// ```text
/// GLUCOSE
/// Desired Range: 65-99 mg/dL
/// Unit of Measure: mg/dL
/// Result: 95
/// ```
///
/// from the whole document text.
pub fn harvest_cards(text: &str) -> Vec<Measurement> {
    let lines: Vec<&str> = text.lines().collect();
    let mut rows = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_heading(line) || is_category_header(line) {
            continue;
        }
        if let Some(m) = read_card(line.trim(), &lines[i + 1..]) {
            rows.push(m);
        }
    }

    rows
}

fn read_card(heading: &str, following: &[&str]) -> Option<Measurement> {
    let mut result: Option<&str> = None;
    let mut unit: Option<String> = None;
    let mut range_text: Option<&str> = None;

    for line in following.iter().take(CARD_WINDOW) {
        if is_heading(line) && matches_analyte_vocabulary(line) {
            break;
        }
        match labelled_field(line) {
            Some((Field::Result, rest)) if result.is_none() => result = Some(rest),
            Some((Field::Unit, rest)) if unit.is_none() && !rest.is_empty() => {
                unit = Some(rest.to_string())
            }
            Some((Field::Range, rest)) if range_text.is_none() => range_text = Some(rest),
            _ => {}
        }
    }

    let result = result?;
    let (value, flag) = parse_result(result)?;

    let mut m = Measurement::new(title_case_heading(heading), Some(value));
    m.flag = flag;
    m.unit = unit
        .or_else(|| find_unit(result))
        .or_else(|| range_text.and_then(find_unit));
    m.reference_range = range_text.and_then(find_range);
    Some(m)
}

/// Split a `Result:` payload such as `95 H` or `6.1 mmol/L` into value and
/// flag.
fn parse_result(result: &str) -> Option<(MeasurementValue, Option<Flag>)> {
    let trimmed = collapse_whitespace(result);
    if let Some(value) = parse_value_token(&trimmed) {
        return Some((value, None));
    }

    let mut value = None;
    let mut flag = None;
    for token in trimmed.split_whitespace() {
        if value.is_none() {
            value = parse_value_token(token);
            if value.is_some() {
                continue;
            }
        }
        if value.is_some() && flag.is_none() && !is_unit_token(token) {
            flag = Flag::parse(token);
        }
    }
    value.map(|v| (v, flag))
}
