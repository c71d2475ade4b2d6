use std::collections::{HashMap, HashSet};

use crate::model::Measurement;
use crate::rules::{contains_unit_token, matches_analyte_vocabulary, matches_fallback_reject};
use crate::text::canonical_key;

use super::classify::{DecisionAction, GlossaryDecision};
use super::names::normalize_name;
use super::{Glossary, GlossaryEntry, KnownRange};

/// Longest name the fallback classifier will promote.
const FALLBACK_MAX_LEN: usize = 55;

/// Conservative check used when classification is unavailable or
/// non-committal: short, looks like an analyte, carries no unit text and
/// trips none of the looser reject patterns.
pub fn fallback_accepts(name: &str) -> bool {
    name.chars().count() <= FALLBACK_MAX_LEN
        && matches_analyte_vocabulary(name)
        && !contains_unit_token(name)
        && !matches_fallback_reject(name)
}

/// Resolves measurement names against a glossary, mutating it as evidence
/// accumulates.
pub struct Canonicalizer<'a> {
    glossary: &'a mut Glossary,
    index: HashMap<String, usize>,
    canonical_keys: HashSet<String>,
    now: String,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(glossary: &'a mut Glossary, now: impl Into<String>) -> Self {
        let mut canonicalizer = Self {
            glossary,
            index: HashMap::new(),
            canonical_keys: HashSet::new(),
            now: now.into(),
        };
        canonicalizer.rebuild_index();
        canonicalizer
    }

    /// Canonical names win over aliases when both claim a key.
    fn rebuild_index(&mut self) {
        self.index.clear();
        self.canonical_keys.clear();
        for (i, entry) in self.glossary.entries.iter().enumerate() {
            let key = entry.key();
            self.canonical_keys.insert(key.clone());
            self.index.entry(key).or_insert(i);
        }
        for (i, entry) in self.glossary.entries.iter().enumerate() {
            for alias in &entry.aliases {
                self.index.entry(canonical_key(alias)).or_insert(i);
            }
        }
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        let key = canonical_key(name);
        if key.is_empty() {
            return None;
        }
        self.index.get(&key).copied()
    }

    /// Canonical names and aliases, used as classification context.
    pub fn known_names(&self) -> Vec<(String, Vec<String>)> {
        self.glossary
            .entries
            .iter()
            .map(|e| (e.canonical_name.clone(), e.aliases.clone()))
            .collect()
    }

    /// Normalize the measurement's name. The source label is kept in
    /// `originalName` when the name changes. Returns `None` for names that
    /// do not normalize.
    pub fn prepare(&self, mut m: Measurement) -> Option<Measurement> {
        let Some(normalized) = normalize_name(&m.name) else {
            log::debug!("Dropping '{}': name does not normalize", m.name);
            return None;
        };
        if normalized != m.name && m.original_name.is_none() {
            m.original_name = Some(m.name.clone());
        }
        m.name = normalized;
        Some(m)
    }

    /// Exact lookup by canonical key of the name, then of the original
    /// label. On a hit the measurement takes the entry's canonical name and
    /// its evidence is merged into the entry.
    pub fn lookup(&mut self, m: Measurement) -> Result<Measurement, Measurement> {
        let hit = self
            .resolve(&m.name)
            .or_else(|| m.original_name.as_deref().and_then(|o| self.resolve(o)));
        match hit {
            Some(i) => Ok(self.accept_into(i, m, &[])),
            None => Err(m),
        }
    }

    /// Apply a classification decision for a measurement that missed the
    /// exact lookup. A missing, rejected or `invalid` decision goes through
    /// [`fallback_accepts`]; `None` means the measurement is discarded.
    pub fn apply_decision(
        &mut self,
        m: Measurement,
        decision: Option<&GlossaryDecision>,
    ) -> Option<Measurement> {
        // An earlier decision in the same batch may have created the entry.
        let m = match self.lookup(m) {
            Ok(m) => return Some(m),
            Err(m) => m,
        };

        match decision.map(|d| (d.action, d)) {
            Some((DecisionAction::Alias, d)) => {
                let target = d.target_canonical_name.as_deref().and_then(|t| {
                    self.resolve(t)
                        .or_else(|| normalize_name(t).and_then(|n| self.resolve(&n)))
                });
                match target {
                    Some(i) => return Some(self.accept_into(i, m, &d.aliases)),
                    None => log::debug!(
                        "Alias decision for '{}' names an unknown target {:?}",
                        m.name,
                        d.target_canonical_name
                    ),
                }
            }
            Some((DecisionAction::NewValid, d)) => {
                match d.canonical_name.as_deref().and_then(normalize_name) {
                    Some(canonical) => {
                        let i = match self.resolve(&canonical) {
                            Some(i) => i,
                            None => self.create_entry(&canonical),
                        };
                        return Some(self.accept_into(i, m, &d.aliases));
                    }
                    None => log::debug!(
                        "New entry for '{}' has no valid English name {:?}",
                        m.name,
                        d.canonical_name
                    ),
                }
            }
            Some((DecisionAction::Invalid, d)) => {
                log::debug!(
                    "Classifier marked '{}' invalid: {}",
                    m.name,
                    d.reason.as_deref().unwrap_or("no reason given")
                );
            }
            None => {}
        }

        if fallback_accepts(&m.name) {
            log::info!("Adding '{}' to the glossary without classification", m.name);
            let i = self.create_entry(&m.name);
            return Some(self.accept_into(i, m, &[]));
        }

        log::debug!("Discarding unresolved measurement '{}'", m.name);
        None
    }

    /// Split measurements into resolved ones and those needing
    /// classification, keeping their positions.
    pub fn partition(&mut self, measurements: Vec<Measurement>) -> Resolution {
        let mut resolution = Resolution::default();
        for m in measurements {
            let Some(m) = self.prepare(m) else {
                continue;
            };
            match self.lookup(m) {
                Ok(m) => resolution.slots.push(Some(m)),
                Err(m) => {
                    resolution.pending.push((resolution.slots.len(), m));
                    resolution.slots.push(None);
                }
            }
        }
        resolution
    }

    fn create_entry(&mut self, canonical: &str) -> usize {
        let i = self.glossary.entries.len();
        self.glossary
            .entries
            .push(GlossaryEntry::new(canonical, &self.now));
        self.rebuild_index();
        i
    }

    /// Rename `m` to entry `i` and merge its aliases, unit hint and range.
    fn accept_into(
        &mut self,
        i: usize,
        mut m: Measurement,
        extra_aliases: &[String],
    ) -> Measurement {
        let entry_key = self.glossary.entries[i].key();
        let aliases: Vec<String> = [Some(m.name.clone()), m.original_name.clone()]
            .into_iter()
            .flatten()
            .chain(extra_aliases.iter().cloned())
            .filter(|alias| {
                let key = canonical_key(alias);
                key == entry_key || !self.canonical_keys.contains(&key)
            })
            .collect();

        let entry = &mut self.glossary.entries[i];
        for alias in &aliases {
            entry.add_alias(alias);
        }
        if let Some(unit) = m.unit.as_deref() {
            entry.add_unit_hint(unit);
        }
        if let Some(range) = m.reference_range {
            entry.add_range(KnownRange::new(range, m.unit.as_deref()));
        }
        entry.updated_at = self.now.clone();

        if m.name != entry.canonical_name && m.original_name.is_none() {
            m.original_name = Some(m.name.clone());
        }
        m.name = entry.canonical_name.clone();

        self.rebuild_index();
        m
    }
}

/// Measurements in their original order, with holes for those awaiting a
/// classification decision.
#[derive(Debug, Default)]
pub struct Resolution {
    pub slots: Vec<Option<Measurement>>,
    pub pending: Vec<(usize, Measurement)>,
}

impl Resolution {
    /// Take the pending measurements out, leaving their slots empty.
    pub fn take_pending(&mut self) -> Vec<(usize, Measurement)> {
        std::mem::take(&mut self.pending)
    }

    pub fn fill(&mut self, slot: usize, m: Option<Measurement>) {
        if let Some(target) = self.slots.get_mut(slot) {
            *target = m;
        }
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Canonicalize without a classifier: exact lookup, then the fallback
/// check for every unknown name.
pub fn canonicalize_offline(
    glossary: &mut Glossary,
    now: &str,
    measurements: Vec<Measurement>,
) -> Vec<Measurement> {
    let mut canonicalizer = Canonicalizer::new(glossary, now);
    let mut resolution = canonicalizer.partition(measurements);
    for (slot, m) in resolution.take_pending() {
        let resolved = canonicalizer.apply_decision(m, None);
        resolution.fill(slot, resolved);
    }
    resolution.into_measurements()
}
