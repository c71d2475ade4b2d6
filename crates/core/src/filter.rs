//! Candidate acceptance filter.
//!
//! A candidate must clear every gate, checked in order. Each gate rejects a
//! different kind of noise, so they are kept separate and the first failing
//! gate is reported.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Measurement, MeasurementValue};
use crate::rules::{
    is_admin_stoplisted, is_placeholder_value, is_qualitative, is_unit_token,
    matches_admin_pattern, matches_analyte_vocabulary,
};

const MAX_NAME_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Exact match against the administrative stoplist.
    Stoplisted,
    /// Contact info, identity, prose, comments or banners.
    AdministrativePattern,
    /// No letters, purely numeric, too long, or an ambiguous `word, word`.
    MalformedName,
    /// Missing value, non-finite number or placeholder text.
    NoUsableValue,
    /// No unit, range, qualitative result or known analyte name.
    NoEvidence,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::Stoplisted => "stoplisted name",
            Rejection::AdministrativePattern => "administrative text",
            Rejection::MalformedName => "malformed name",
            Rejection::NoUsableValue => "no usable value",
            Rejection::NoEvidence => "no structural evidence",
        };
        f.write_str(reason)
    }
}

fn has_unit(m: &Measurement) -> bool {
    m.unit.as_deref().is_some_and(is_unit_token)
}

fn is_ambiguous_pair(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\p{L}+,\s*\p{L}+$").unwrap());
    re.is_match(name)
}

fn check_name(m: &Measurement) -> Result<(), Rejection> {
    let name = m.name.trim();
    if !name.chars().any(char::is_alphabetic) {
        return Err(Rejection::MalformedName);
    }
    let stripped: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
    if stripped.chars().all(|c| c.is_ascii_digit()) {
        return Err(Rejection::MalformedName);
    }
    if name.split_whitespace().count() > MAX_NAME_WORDS {
        return Err(Rejection::MalformedName);
    }
    if is_ambiguous_pair(name) && !has_unit(m) && m.reference_range.is_none() {
        return Err(Rejection::MalformedName);
    }
    Ok(())
}

fn has_usable_value(m: &Measurement) -> bool {
    match &m.value {
        Some(MeasurementValue::Number(n)) => n.is_finite(),
        Some(MeasurementValue::Text(t)) => !t.trim().is_empty() && !is_placeholder_value(t),
        None => false,
    }
}

fn has_evidence(m: &Measurement) -> bool {
    has_unit(m)
        || m.reference_range.is_some()
        || m.value
            .as_ref()
            .and_then(MeasurementValue::as_text)
            .is_some_and(is_qualitative)
        || matches_analyte_vocabulary(&m.name)
}

/// Run every gate against one candidate.
pub fn check(m: &Measurement) -> Result<(), Rejection> {
    if is_admin_stoplisted(&m.name) {
        return Err(Rejection::Stoplisted);
    }
    if matches_admin_pattern(&m.name) {
        return Err(Rejection::AdministrativePattern);
    }
    check_name(m)?;
    if !has_usable_value(m) {
        return Err(Rejection::NoUsableValue);
    }
    if !has_evidence(m) {
        return Err(Rejection::NoEvidence);
    }
    Ok(())
}

/// Keep the candidates that pass [`check`], logging the rest.
pub fn filter_candidates(candidates: Vec<Measurement>) -> Vec<Measurement> {
    candidates
        .into_iter()
        .filter(|m| match check(m) {
            Ok(()) => true,
            Err(reason) => {
                log::debug!("Rejected candidate '{}': {}", m.name, reason);
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(name: &str, value: f64) -> Measurement {
        Measurement::new(name, Some(MeasurementValue::Number(value)))
    }

    fn text(name: &str, value: &str) -> Measurement {
        Measurement::new(name, Some(MeasurementValue::Text(value.to_string())))
    }

    #[test]
    fn test_page_is_stoplisted() {
        assert_eq!(check(&number("Page", 1.0)), Err(Rejection::Stoplisted));
    }

    #[test]
    fn test_german_leukocytes_accepted() {
        let m = number("Leukozyten (EB)", 6.1).with_unit("Gpt/l");
        assert_eq!(check(&m), Ok(()));
    }

    #[test]
    fn test_administrative_patterns() {
        assert_eq!(
            check(&number("Tel 030", 1234.0)),
            Err(Rejection::AdministrativePattern)
        );
        assert_eq!(
            check(&text("Comment", "hemolyzed").with_unit("mg/dL")),
            Err(Rejection::Stoplisted)
        );
        assert_eq!(
            check(&text("Comment: sample", "hemolyzed")),
            Err(Rejection::AdministrativePattern)
        );
    }

    #[test]
    fn test_malformed_names() {
        assert_eq!(check(&number("123", 4.0)), Err(Rejection::MalformedName));
        assert_eq!(
            check(&number("Mustermann, Max", 1980.0)),
            Err(Rejection::MalformedName)
        );
        assert_eq!(
            check(&number(
                "one two three four five six seven eight nine ten eleven",
                1.0
            )),
            Err(Rejection::MalformedName)
        );
        // A unit turns the pair into a plausible analyte label.
        assert_eq!(
            check(&number("Glucose, fasting", 95.0).with_unit("mg/dL")),
            Ok(())
        );
    }

    #[test]
    fn test_unusable_values() {
        assert_eq!(
            check(&text("Ferritin", "pending")),
            Err(Rejection::NoUsableValue)
        );
        assert_eq!(
            check(&Measurement::new("Ferritin", None)),
            Err(Rejection::NoUsableValue)
        );
        assert_eq!(
            check(&number("Ferritin", f64::NAN)),
            Err(Rejection::NoUsableValue)
        );
    }

    #[test]
    fn test_evidence_disjunction() {
        assert_eq!(check(&number("Widget count", 3.0)), Err(Rejection::NoEvidence));
        assert_eq!(
            check(&number("Widget count", 3.0).with_unit("mg/dL")),
            Ok(())
        );
        assert_eq!(
            check(&number("Widget count", 3.0).with_range(Some(1.0), Some(5.0))),
            Ok(())
        );
        assert_eq!(check(&text("Widget screen", "Negative")), Ok(()));
        assert_eq!(check(&number("Ferritin", 45.0)), Ok(()));
    }

    #[test]
    fn test_filter_candidates_keeps_order() {
        let kept = filter_candidates(vec![
            number("Page", 1.0),
            number("Ferritin", 45.0),
            number("TSH", 2.1),
        ]);
        let names: Vec<_> = kept.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ferritin", "TSH"]);
    }
}
