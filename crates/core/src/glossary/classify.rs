//! Classification of names the glossary does not know yet.
//!
//! The model sees a batch of candidate names together with the known
//! vocabulary and answers with one decision per candidate. Decisions are
//! checked here before the [`Canonicalizer`](super::Canonicalizer) acts on
//! them.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::model::Measurement;

/// Largest number of candidates sent in one classification call.
pub const MAX_BATCH: usize = 64;

/// Output token budget for one classification call.
pub const CLASSIFICATION_MAX_TOKENS: u32 = 2000;

pub const CLASSIFICATION_PREAMBLE: &str = "\
You maintain a glossary of blood test names in English.
You output ONLY a JSON object. No markdown fences. No explanations.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Another spelling of an existing entry.
    Alias,
    /// A real analyte missing from the glossary.
    NewValid,
    /// Not an analyte.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryDecision {
    pub index: usize,
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_canonical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassificationResponse {
    #[serde(default)]
    pub decisions: Vec<GlossaryDecision>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("decision index {0} is outside the batch")]
    IndexOutOfRange(usize),
    #[error("more than one decision for index {0}")]
    Duplicate(usize),
    #[error("alias decision for index {0} has no target")]
    MissingTarget(usize),
    #[error("new entry decision for index {0} has no canonical name")]
    MissingCanonicalName(usize),
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Line decisions up with the batch positions they answer.
///
/// Invalid decisions are dropped and reported; a slot left `None` is treated
/// like a missing decision. The first decision for an index wins.
pub fn validate_decisions(
    batch_len: usize,
    decisions: Vec<GlossaryDecision>,
) -> (Vec<Option<GlossaryDecision>>, Vec<DecisionError>) {
    let mut slots: Vec<Option<GlossaryDecision>> = vec![None; batch_len];
    let mut errors = Vec::new();

    for decision in decisions {
        let index = decision.index;
        let error = match decision.action {
            _ if index >= batch_len => Some(DecisionError::IndexOutOfRange(index)),
            _ if slots[index].is_some() => Some(DecisionError::Duplicate(index)),
            DecisionAction::Alias if is_blank(&decision.target_canonical_name) => {
                Some(DecisionError::MissingTarget(index))
            }
            DecisionAction::NewValid if is_blank(&decision.canonical_name) => {
                Some(DecisionError::MissingCanonicalName(index))
            }
            _ => None,
        };
        match error {
            Some(error) => errors.push(error),
            None => slots[index] = Some(decision),
        }
    }

    (slots, errors)
}

fn describe_candidate(index: usize, m: &Measurement) -> String {
    let mut line = format!("{}. {}", index, m.name);
    if let Some(original) = m.original_name.as_deref().filter(|o| *o != m.name) {
        line.push_str(&format!(" (printed as \"{}\")", original));
    }
    if let Some(unit) = m.unit.as_deref() {
        line.push_str(&format!(" [unit: {}]", unit));
    }
    line
}

/// Build the classification prompt for one batch.
///
/// `known` lists every canonical name with its aliases.
pub fn classification_prompt(
    candidates: &[Measurement],
    known: &[(String, Vec<String>)],
) -> String {
    let mut parts = Vec::new();

    parts.push(
        "Classify each candidate name from a laboratory report against the glossary.".to_string(),
    );
    parts.push(
        [
            "Actions:",
            "- alias: the candidate is another spelling, abbreviation or translation of a glossary name. Set targetCanonicalName to that exact glossary name.",
            "- new_valid: the candidate is a real blood or urine test missing from the glossary. Set canonicalName to its standard English name.",
            "- invalid: the candidate is not a test (headings, patient data, comments, units).",
            "Optionally list extra spellings in aliases and explain briefly in reason.",
        ]
        .join("\n"),
    );

    let glossary = if known.is_empty() {
        "(empty)".to_string()
    } else {
        known
            .iter()
            .map(|(name, aliases)| {
                if aliases.is_empty() {
                    format!("- {}", name)
                } else {
                    format!("- {} (aliases: {})", name, aliases.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    parts.push(format!("Glossary:\n{}", glossary));

    let lines: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, m)| describe_candidate(i, m))
        .collect();
    parts.push(format!("Candidates:\n{}", lines.join("\n")));
    parts.push(
        "Respond with {\"decisions\": [...]}, one decision per candidate index.".to_string(),
    );

    parts.join("\n\n")
}

/// JSON schema for [`ClassificationResponse`].
pub fn classification_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "decisions": {
                "type": "array",
                "maxItems": MAX_BATCH,
                "items": {
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer", "minimum": 0 },
                        "action": { "type": "string", "enum": ["alias", "new_valid", "invalid"] },
                        "targetCanonicalName": { "type": "string" },
                        "canonicalName": { "type": "string" },
                        "aliases": { "type": "array", "items": { "type": "string" } },
                        "reason": { "type": "string" }
                    },
                    "required": ["index", "action"]
                }
            }
        },
        "required": ["decisions"]
    })
}
