//! Prompts, schemas and response shapes for model-assisted extraction.
//!
//! The shell owns the transport; everything here is pure so prompts and
//! response handling can be tested without a model.

use serde::Deserialize;
use serde_json::json;

use crate::model::Measurement;

/// Upper bound on rows accepted from one page.
pub const MAX_ROWS: usize = 120;

/// Output token budget for one page extraction call.
pub const MAX_OUTPUT_TOKENS: u32 = 1400;

pub const EXTRACTION_PREAMBLE: &str = "\
You extract blood test results from laboratory report text.
You output ONLY a JSON object. No markdown fences. No explanations.";

/// Response of a page extraction call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub rows: Vec<Measurement>,
}

/// Build the extraction prompt for one page from its table-like lines.
pub fn extraction_prompt(page_number: usize, lines: &[String]) -> String {
    let mut parts = Vec::new();

    parts.push(format!(
        "Extract the analyte rows from page {} of a laboratory report.",
        page_number
    ));
    parts.push(
        [
            "Rules:",
            "- Return analyte measurements only. Skip patient data, addresses, phone numbers, comments and headings.",
            "- Translate non-English analyte names into English and put the label exactly as printed in `originalName`.",
            "- Numeric values must be JSON numbers; use a string only for qualitative results such as \"Negative\".",
            "- Encode reference ranges as {\"min\": a, \"max\": b}; a range like \"< 5\" is {\"max\": 5} and \"> 40\" is {\"min\": 40}.",
            "- Use the flag values low, high, normal, abnormal, critical or unknown.",
            format!("- Return at most {} rows.", MAX_ROWS).as_str(),
        ]
        .join("\n"),
    );
    parts.push(format!("Lines:\n{}", lines.join("\n")));
    parts.push("Respond with {\"rows\": [...]}.".to_string());

    parts.join("\n\n")
}

fn range_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "min": { "type": "number" },
            "max": { "type": "number" }
        }
    })
}

/// JSON schema for [`ExtractionResponse`], sent as the structured output
/// format.
pub fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "rows": {
                "type": "array",
                "maxItems": MAX_ROWS,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "originalName": { "type": "string" },
                        "category": { "type": "string" },
                        "value": { "type": ["number", "string"] },
                        "unit": { "type": "string" },
                        "referenceRange": range_schema(),
                        "flag": {
                            "type": "string",
                            "enum": ["low", "high", "normal", "abnormal", "critical", "unknown"]
                        },
                        "note": { "type": "string" }
                    },
                    "required": ["name", "value"]
                }
            }
        },
        "required": ["rows"]
    })
}

/// Turn a model response into candidate rows: capped at [`MAX_ROWS`],
/// tidied, nameless rows dropped.
pub fn rows_to_measurements(response: ExtractionResponse) -> Vec<Measurement> {
    response
        .rows
        .into_iter()
        .take(MAX_ROWS)
        .map(Measurement::tidy)
        .filter(|m| !m.name.is_empty())
        .collect()
}

/// Response of a name translation call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslationResponse {
    #[serde(default)]
    pub translations: Vec<Translation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Translation {
    pub index: usize,
    pub english: String,
}

pub const TRANSLATION_PREAMBLE: &str = "\
You translate laboratory analyte names into English.
You output ONLY a JSON object. No markdown fences. No explanations.";

/// Output token budget for one translation call.
pub const TRANSLATION_MAX_TOKENS: u32 = 800;

pub fn translation_prompt(names: &[&str]) -> String {
    let listing = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}: {}", i, name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Translate these laboratory analyte names into standard English analyte names. \
Keep abbreviations such as TSH or ALT unchanged.\n\n{}\n\n\
Respond with {{\"translations\": [{{\"index\": <n>, \"english\": \"<name>\"}}]}}.",
        listing
    )
}

pub fn translation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "translations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer", "minimum": 0 },
                        "english": { "type": "string" }
                    },
                    "required": ["index", "english"]
                }
            }
        },
        "required": ["translations"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MeasurementValue, ReferenceRange};

    #[test]
    fn test_prompt_contains_lines_and_rules() {
        let lines = vec!["Leukozyten    6,1    Gpt/l".to_string()];
        let prompt = extraction_prompt(2, &lines);
        assert!(prompt.contains("page 2"));
        assert!(prompt.contains("originalName"));
        assert!(prompt.contains("at most 120 rows"));
        assert!(prompt.ends_with("Respond with {\"rows\": [...]}."));
        assert!(prompt.contains("Lines:\nLeukozyten    6,1    Gpt/l"));
    }

    #[test]
    fn test_schema_limits_rows() {
        let schema = extraction_schema();
        assert_eq!(schema["properties"]["rows"]["maxItems"], 120);
    }

    #[test]
    fn test_rows_to_measurements() {
        let response: ExtractionResponse = serde_json::from_str(
            r#"{"rows":[
                {"name":"Leukocytes","originalName":"Leukozyten","value":"6,1","unit":"Gpt/l",
                 "referenceRange":{"min":3.9,"max":10.5}},
                {"name":"  ","value":1}
            ]}"#,
        )
        .unwrap();
        let rows = rows_to_measurements(response);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].original_name.as_deref(), Some("Leukozyten"));
        assert_eq!(rows[0].value, Some(MeasurementValue::Number(6.1)));
        assert_eq!(
            rows[0].reference_range,
            Some(ReferenceRange::new(Some(3.9), Some(10.5)))
        );
    }

    #[test]
    fn test_rows_are_capped() {
        let rows = (0..150)
            .map(|i| Measurement::new(format!("Row {}", i), None))
            .collect();
        let capped = rows_to_measurements(ExtractionResponse { rows });
        assert_eq!(capped.len(), MAX_ROWS);
    }

    #[test]
    fn test_translation_prompt_lists_indices() {
        let prompt = translation_prompt(&["Leukozyten", "Harnsäure"]);
        assert!(prompt.contains("0: Leukozyten\n1: Harnsäure"));
    }
}
