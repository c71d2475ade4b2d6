//! Persistent canonical vocabulary of analyte names.
//!
//! The glossary is an explicit value: the shell loads it, the
//! [`Canonicalizer`] mutates it while a report is processed, and
//! [`Glossary::renormalize`] produces the form that is written back. There
//! is no locking; one process writes a given glossary file at a time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::ReferenceRange;
use crate::text::canonical_key;

mod canonicalizer;
mod classify;
mod names;

pub use canonicalizer::{canonicalize_offline, fallback_accepts, Canonicalizer, Resolution};
pub use classify::{
    classification_prompt, classification_schema, validate_decisions, ClassificationResponse,
    DecisionAction, DecisionError, GlossaryDecision, CLASSIFICATION_MAX_TOKENS,
    CLASSIFICATION_PREAMBLE, MAX_BATCH,
};
pub use names::normalize_name;

pub const GLOSSARY_VERSION: u32 = 1;

/// A reference range observed for an analyte, with the unit it was printed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl KnownRange {
    pub fn new(range: ReferenceRange, unit: Option<&str>) -> Self {
        Self {
            min: range.min,
            max: range.max,
            unit: unit.map(str::to_string),
        }
    }

    /// Identity used to keep `knownRanges` free of duplicates.
    pub fn fingerprint(&self) -> String {
        let bound = |b: Option<f64>| b.map(|v| format!("{:.6}", v)).unwrap_or_default();
        format!(
            "{}|{}|{}",
            bound(self.min),
            bound(self.max),
            self.unit.as_deref().unwrap_or_default().to_lowercase()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryEntry {
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub known_ranges: Vec<KnownRange>,
    #[serde(default)]
    pub unit_hints: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl GlossaryEntry {
    pub fn new(canonical_name: impl Into<String>, now: &str) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            aliases: Vec::new(),
            known_ranges: Vec::new(),
            unit_hints: Vec::new(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    pub fn key(&self) -> String {
        canonical_key(&self.canonical_name)
    }

    /// Add an alias unless it is empty, equals the canonical name or is
    /// already present (compared by canonical key). Returns whether the
    /// entry changed.
    pub fn add_alias(&mut self, alias: &str) -> bool {
        let alias = alias.trim();
        let key = canonical_key(alias);
        if key.is_empty()
            || key == self.key()
            || self.aliases.iter().any(|a| canonical_key(a) == key)
        {
            return false;
        }
        self.aliases.push(alias.to_string());
        true
    }

    /// Add a unit hint, unique case-insensitively.
    pub fn add_unit_hint(&mut self, unit: &str) -> bool {
        let unit = unit.trim();
        if unit.is_empty()
            || self
                .unit_hints
                .iter()
                .any(|u| u.to_lowercase() == unit.to_lowercase())
        {
            return false;
        }
        self.unit_hints.push(unit.to_string());
        true
    }

    /// Add a known range, unique by fingerprint.
    pub fn add_range(&mut self, range: KnownRange) -> bool {
        if range.min.is_none() && range.max.is_none() {
            return false;
        }
        let fingerprint = range.fingerprint();
        if self
            .known_ranges
            .iter()
            .any(|r| r.fingerprint() == fingerprint)
        {
            return false;
        }
        self.known_ranges.push(range);
        true
    }

    /// Fold another entry with the same key into this one.
    pub fn absorb(&mut self, other: GlossaryEntry) {
        self.add_alias(&other.canonical_name);
        for alias in &other.aliases {
            self.add_alias(alias);
        }
        for hint in &other.unit_hints {
            self.add_unit_hint(hint);
        }
        for range in other.known_ranges {
            self.add_range(range);
        }
        if !other.created_at.is_empty()
            && (self.created_at.is_empty() || other.created_at < self.created_at)
        {
            self.created_at = other.created_at;
        }
        if other.updated_at > self.updated_at {
            self.updated_at = other.updated_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Glossary {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub entries: Vec<GlossaryEntry>,
}

fn default_version() -> u32 {
    GLOSSARY_VERSION
}

impl Glossary {
    pub fn empty(now: &str) -> Self {
        Self {
            version: GLOSSARY_VERSION,
            updated_at: now.to_string(),
            entries: Vec::new(),
        }
    }

    /// Parse a persisted glossary. Callers treat an error as "start empty".
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produce the persisted form.
    ///
    /// Canonical names are re-run through [`normalize_name`]; entries whose
    /// names no longer normalize are dropped, and entries that share a key
    /// are merged (union of aliases, hints and ranges, earliest
    /// `createdAt`, latest `updatedAt`). Aliases that name another entry's
    /// canonical key are removed, and entries are sorted by canonical name.
    pub fn renormalize(self, now: &str) -> Glossary {
        let mut merged: Vec<GlossaryEntry> = Vec::with_capacity(self.entries.len());
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for mut entry in self.entries {
            let Some(normalized) = normalize_name(&entry.canonical_name) else {
                log::debug!("Dropping glossary entry '{}'", entry.canonical_name);
                continue;
            };
            if normalized != entry.canonical_name {
                let previous = std::mem::replace(&mut entry.canonical_name, normalized);
                entry.add_alias(&previous);
            }
            // Re-filter aliases against the (possibly new) canonical name.
            let aliases = std::mem::take(&mut entry.aliases);
            for alias in &aliases {
                entry.add_alias(alias);
            }

            match by_key.get(&entry.key()) {
                Some(&i) => merged[i].absorb(entry),
                None => {
                    by_key.insert(entry.key(), merged.len());
                    merged.push(entry);
                }
            }
        }

        for entry in merged.iter_mut() {
            let own = entry.key();
            entry.aliases.retain(|alias| {
                let key = canonical_key(alias);
                key == own || !by_key.contains_key(&key)
            });
        }

        merged.sort_by(|a, b| {
            a.canonical_name
                .to_lowercase()
                .cmp(&b.canonical_name.to_lowercase())
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });

        Glossary {
            version: GLOSSARY_VERSION,
            updated_at: now.to_string(),
            entries: merged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2024-01-01T00:00:00Z";
    const T1: &str = "2024-02-01T00:00:00Z";

    #[test]
    fn test_add_alias_rules() {
        let mut entry = GlossaryEntry::new("Leukocytes", T0);
        assert!(entry.add_alias("Leukozyten"));
        assert!(!entry.add_alias("LEUKOZYTEN"));
        assert!(!entry.add_alias("leukocytes"));
        assert!(!entry.add_alias("  "));
        assert_eq!(entry.aliases, vec!["Leukozyten".to_string()]);
    }

    #[test]
    fn test_unit_hints_and_ranges_unique() {
        let mut entry = GlossaryEntry::new("Glucose", T0);
        assert!(entry.add_unit_hint("mmol/L"));
        assert!(!entry.add_unit_hint("MMOL/l"));
        let range = KnownRange::new(ReferenceRange::new(Some(3.9), Some(5.5)), Some("mmol/L"));
        assert!(entry.add_range(range.clone()));
        assert!(!entry.add_range(range));
        assert!(!entry.add_range(KnownRange::new(ReferenceRange::default(), None)));
    }

    #[test]
    fn test_from_json_tolerates_missing_fields() {
        let glossary =
            Glossary::from_json(r#"{"entries":[{"canonicalName":"Glucose"}]}"#).unwrap();
        assert_eq!(glossary.version, 1);
        assert_eq!(glossary.entries[0].aliases, Vec::<String>::new());
        assert!(Glossary::from_json("not json").is_err());
    }

    #[test]
    fn test_renormalize_merges_duplicates() {
        let mut a = GlossaryEntry::new("Leukocytes", T1);
        a.add_alias("WBC");
        a.add_unit_hint("Gpt/l");
        let mut b = GlossaryEntry::new("leukocytes", T0);
        b.add_alias("Leukozyten");
        b.add_unit_hint("GPT/L");
        b.updated_at = "2024-03-01T00:00:00Z".to_string();

        let glossary = Glossary {
            version: 1,
            updated_at: T0.to_string(),
            entries: vec![a, b],
        }
        .renormalize(T1);

        assert_eq!(glossary.entries.len(), 1);
        let entry = &glossary.entries[0];
        assert_eq!(entry.canonical_name, "Leukocytes");
        assert_eq!(entry.aliases, vec!["WBC".to_string(), "Leukozyten".to_string()]);
        assert_eq!(entry.unit_hints, vec!["Gpt/l".to_string()]);
        assert_eq!(entry.created_at, T0);
        assert_eq!(entry.updated_at, "2024-03-01T00:00:00Z");
        assert_eq!(glossary.updated_at, T1);
    }

    #[test]
    fn test_renormalize_drops_invalid_and_sorts() {
        let glossary = Glossary {
            version: 1,
            updated_at: T0.to_string(),
            entries: vec![
                GlossaryEntry::new("TSH", T0),
                GlossaryEntry::new("HEMATOLOGY", T0),
                GlossaryEntry::new("Ferritin", T0),
                GlossaryEntry::new("Leukocytes (EB)", T0),
            ],
        }
        .renormalize(T1);

        let names: Vec<_> = glossary
            .entries
            .iter()
            .map(|e| e.canonical_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ferritin", "Leukocytes", "TSH"]);
        assert_eq!(glossary.entries[1].aliases, vec!["Leukocytes (EB)".to_string()]);
    }

    #[test]
    fn test_renormalize_removes_alias_that_is_another_canonical() {
        let mut hb = GlossaryEntry::new("Hemoglobin", T0);
        hb.add_alias("Hemoglobin A1c");
        let glossary = Glossary {
            version: 1,
            updated_at: T0.to_string(),
            entries: vec![hb, GlossaryEntry::new("Hemoglobin A1c", T0)],
        }
        .renormalize(T1);
        assert!(glossary.entries[0].aliases.is_empty());
    }

    #[test]
    fn test_renormalize_is_idempotent() {
        let mut entry = GlossaryEntry::new("Glucose", T0);
        entry.add_alias("Glukose");
        let once = Glossary {
            version: 1,
            updated_at: T0.to_string(),
            entries: vec![entry, GlossaryEntry::new("SGPT", T0)],
        }
        .renormalize(T1);
        let twice = once.clone().renormalize(T1);
        assert_eq!(once, twice);
    }
}
