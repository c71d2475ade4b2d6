//! Last-resort harvesting, used only when no candidate from the other
//! strategies survives filtering.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Flag, Measurement, MeasurementValue, ReferenceRange};
use crate::rules::{
    is_qualitative, is_unit_token, matches_admin_pattern, matches_analyte_vocabulary,
};
use crate::text::{collapse_whitespace, parse_number};

/// `name value [unit] [min-max]` on a single line, any spacing.
fn single_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<name>\p{L}[\p{L}\d ,.()/%+'-]{1,60}?)\s*[:=]?\s+",
            r"(?P<value>(?:<=?|>=?|≤|≥)?\s?-?\d+(?:[.,]\d+)?)",
            r"(?:\s+(?P<unit>[^\s\d(][^\s]*))?",
            r"(?:\s+\(?\s*(?P<min>-?\d+(?:[.,]\d+)?)\s*(?:-|–)\s*(?P<max>-?\d+(?:[.,]\d+)?)\s*\)?)?",
            r"\s*$",
        ))
        .unwrap()
    })
}

/// `Urine culture: Negative`, `Streptococcus A - not detected`.
fn narrative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^(?P<name>\p{L}[\p{L}\d ,.()/'-]{2,80}?)\s*(?:[:=]|\s-|\s–)?\s+",
            r"(?P<result>positive|negative|detected|not detected|reactive|non-reactive",
            r"|present|absent|positiv|negativ|nachweisbar|nicht nachweisbar|no growth)\.?$",
        ))
        .unwrap()
    })
}

fn is_test_name_line(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:culture|screen|test|antigen|antibod\w*|pcr|kultur|nachweis)\b")
            .unwrap()
    });
    let len = line.chars().count();
    (3..=80).contains(&len)
        && !matches_admin_pattern(line)
        && (re.is_match(line) || matches_analyte_vocabulary(line))
}

/// Harvest candidates with the looser single-line and narrative patterns.
pub fn harvest_fallback(text: &str) -> Vec<Measurement> {
    let lines: Vec<String> = text.lines().map(collapse_whitespace).collect();
    let mut rows = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() || matches_admin_pattern(line) {
            continue;
        }
        if let Some(m) = single_line(line).or_else(|| narrative(line)) {
            rows.push(m);
            continue;
        }
        // A test name on its own line followed by a bare qualitative result.
        if let Some(next) = lines.get(i + 1) {
            if is_test_name_line(line) && is_qualitative(next) {
                rows.push(Measurement::new(
                    line.trim_end_matches(':').trim(),
                    Some(MeasurementValue::Text(next.clone())),
                ));
            }
        }
    }

    rows
}

fn single_line(line: &str) -> Option<Measurement> {
    let caps = single_line_re().captures(line)?;
    let name = caps.name("name")?.as_str().trim();
    let raw_value = caps.name("value")?.as_str();
    let value = match parse_number(raw_value) {
        Some(n) => MeasurementValue::Number(n),
        None => MeasurementValue::Text(raw_value.replace(' ', "")),
    };

    let mut m = Measurement::new(name, Some(value));
    if let Some(token) = caps.name("unit").map(|u| u.as_str()) {
        if is_unit_token(token) {
            m.unit = Some(token.to_string());
        } else if let Some(flag) = Flag::parse(token) {
            m.flag = Some(flag);
        } else {
            return None;
        }
    }
    let bound = |key: &str| caps.name(key).and_then(|b| parse_number(b.as_str()));
    m.reference_range = ReferenceRange::new(bound("min"), bound("max")).non_empty();
    Some(m)
}

fn narrative(line: &str) -> Option<Measurement> {
    let caps = narrative_re().captures(line)?;
    let name = caps.name("name")?.as_str().trim();
    let result = caps.name("result")?.as_str();
    Some(Measurement::new(
        name,
        Some(MeasurementValue::Text(result.to_string())),
    ))
}
