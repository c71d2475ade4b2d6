//! Deduplication and cross-strategy merging of candidates.

use std::collections::HashSet;

use crate::model::{Measurement, MeasurementValue};
use crate::text::{canonical_key, loose_key};

/// Card-style harvests with at least this many rows are trusted over the
/// other strategies for the names they cover.
pub const CARD_CONFIDENCE_THRESHOLD: usize = 3;

fn bound_key(bound: Option<f64>) -> String {
    bound.map(|b| format!("{:.6}", b)).unwrap_or_default()
}

/// Normalized `(name, unit, value, range)` tuple.
pub fn dedupe_key(m: &Measurement) -> String {
    let value = match &m.value {
        Some(MeasurementValue::Number(n)) => format!("{:.6}", n),
        Some(MeasurementValue::Text(t)) => loose_key(t),
        None => String::new(),
    };
    let (min, max) = m
        .reference_range
        .map(|r| (bound_key(r.min), bound_key(r.max)))
        .unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}",
        canonical_key(&m.name),
        m.unit.as_deref().map(loose_key).unwrap_or_default(),
        value,
        min,
        max
    )
}

/// Drop later duplicates; the first occurrence wins and order is kept.
pub fn dedupe(measurements: Vec<Measurement>) -> Vec<Measurement> {
    let mut seen = HashSet::new();
    measurements
        .into_iter()
        .filter(|m| seen.insert(dedupe_key(m)))
        .collect()
}

/// Merge candidates from the three primary strategies.
///
/// Precedence is card, then model extraction, then table lines. When the
/// card harvest is confident, other strategies only contribute names the
/// cards did not produce.
pub fn merge_strategies(
    card: Vec<Measurement>,
    llm: Vec<Measurement>,
    table: Vec<Measurement>,
) -> Vec<Measurement> {
    let mut merged = Vec::with_capacity(card.len() + llm.len() + table.len());

    if card.len() >= CARD_CONFIDENCE_THRESHOLD {
        let card_names: HashSet<String> =
            card.iter().map(|m| canonical_key(&m.name)).collect();
        merged.extend(card);
        merged.extend(
            llm.into_iter()
                .chain(table)
                .filter(|m| !card_names.contains(&canonical_key(&m.name))),
        );
    } else {
        merged.extend(card);
        merged.extend(llm);
        merged.extend(table);
    }

    dedupe(merged)
}
