//! Lab record data model.
//!
//! Input is accepted leniently (numeric strings, legacy `{lower, upper}`
//! ranges, free-text ranges, single-letter flags) and normalized at the
//! boundary; output always has the canonical shape.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::parse_number;

/// A measured value: numeric, or a qualitative result such as `"Negative"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Number(f64),
    Text(String),
}

impl MeasurementValue {
    /// Build a value from raw text, promoting numeric strings to numbers.
    pub fn from_text(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match parse_number(trimmed) {
            Some(n) => MeasurementValue::Number(n),
            None => MeasurementValue::Text(trimmed.to_string()),
        })
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MeasurementValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MeasurementValue::Text(s) => Some(s),
            MeasurementValue::Number(_) => None,
        }
    }
}

impl fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementValue::Number(n) => write!(f, "{}", n),
            MeasurementValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl<'de> Deserialize<'de> for MeasurementValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(MeasurementValue::Number)
                .ok_or_else(|| serde::de::Error::custom("value is not a finite number")),
            serde_json::Value::String(s) => MeasurementValue::from_text(&s)
                .ok_or_else(|| serde::de::Error::custom("value is an empty string")),
            serde_json::Value::Bool(b) => Ok(MeasurementValue::Text(
                if b { "Positive" } else { "Negative" }.to_string(),
            )),
            other => Err(serde::de::Error::custom(format!(
                "unsupported value: {}",
                other
            ))),
        }
    }
}

/// Numeric reference bounds. Textual and comparator forms are parsed into
/// this shape on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReferenceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ReferenceRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// `Some(self)` unless both bounds are missing.
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    /// Parse free-text ranges: `3.9-5.5`, `3,9 – 5,5`, `(70 - 99)`, `< 5.7`,
    /// `<=200`, `> 40`, `≥ 60`, `up to 5`, `bis 5`.
    pub fn parse(text: &str) -> Option<Self> {
        static RE_BETWEEN: OnceLock<Regex> = OnceLock::new();
        static RE_UPPER: OnceLock<Regex> = OnceLock::new();
        static RE_LOWER: OnceLock<Regex> = OnceLock::new();

        let t = text.trim().trim_start_matches('(').trim_end_matches(')').trim();

        let re_between = RE_BETWEEN.get_or_init(|| {
            Regex::new(r"^(-?\d+(?:[.,]\d+)?)\s*(?:-|–|—|to|bis)\s*(-?\d+(?:[.,]\d+)?)$").unwrap()
        });
        if let Some(caps) = re_between.captures(t) {
            let min = parse_number(&caps[1]);
            let max = parse_number(&caps[2]);
            return ReferenceRange::new(min, max).non_empty();
        }

        let re_upper = RE_UPPER.get_or_init(|| {
            Regex::new(r"(?i)^(?:<=?|≤|=<|up to|bis|below|under)\s*(\d+(?:[.,]\d+)?)$").unwrap()
        });
        if let Some(caps) = re_upper.captures(t) {
            return ReferenceRange::new(None, parse_number(&caps[1])).non_empty();
        }

        let re_lower = RE_LOWER.get_or_init(|| {
            Regex::new(r"(?i)^(?:>=?|≥|=>|above|over|ab)\s*(\d+(?:[.,]\d+)?)$").unwrap()
        });
        if let Some(caps) = re_lower.captures(t) {
            return ReferenceRange::new(parse_number(&caps[1]), None).non_empty();
        }

        None
    }

    fn from_json(raw: &serde_json::Value) -> Option<Self> {
        let bound = |v: Option<&serde_json::Value>| -> Option<f64> {
            match v? {
                serde_json::Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
                serde_json::Value::String(s) => parse_number(s),
                _ => None,
            }
        };
        match raw {
            serde_json::Value::String(s) => ReferenceRange::parse(s),
            serde_json::Value::Object(map) => {
                let min = bound(map.get("min")).or_else(|| bound(map.get("lower")));
                let max = bound(map.get("max")).or_else(|| bound(map.get("upper")));
                ReferenceRange::new(min, max).non_empty().or_else(|| {
                    map.get("text")
                        .and_then(|t| t.as_str())
                        .and_then(ReferenceRange::parse)
                })
            }
            serde_json::Value::Array(items) if items.len() == 2 => {
                ReferenceRange::new(bound(items.first()), bound(items.get(1))).non_empty()
            }
            _ => None,
        }
    }
}

/// Deserialize an optional reference range from any of the accepted input
/// shapes; unrecognized or empty ranges become `None`.
fn deserialize_range<'de, D>(deserializer: D) -> Result<Option<ReferenceRange>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(ReferenceRange::from_json))
}

/// Result flag printed next to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Low,
    High,
    Normal,
    Abnormal,
    Critical,
    Unknown,
}

impl Flag {
    /// Interpret a flag token as printed on reports (`H`, `LL`, `*`, `high`,
    /// `niedrig`, ...).
    pub fn parse(token: &str) -> Option<Flag> {
        let t = token.trim().trim_matches(|c| c == '(' || c == ')' || c == '[' || c == ']');
        let lower = t.to_lowercase();
        let flag = match lower.as_str() {
            "l" | "low" | "lo" | "-" | "niedrig" | "erniedrigt" | "bajo" | "↓" => Flag::Low,
            "h" | "high" | "hi" | "+" | "hoch" | "erhoht" | "erhöht" | "alto" | "↑" => Flag::High,
            "n" | "normal" | "ok" => Flag::Normal,
            "a" | "abnormal" | "abn" | "*" | "auffallig" | "auffällig" => Flag::Abnormal,
            "ll" | "hh" | "critical" | "crit" | "c" | "!" | "panic" => Flag::Critical,
            "unknown" | "?" => Flag::Unknown,
            _ => return None,
        };
        Some(flag)
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Flag::parse(&raw).unwrap_or(Flag::Unknown))
    }
}

/// Pre-conversion snapshot kept when unit standardization changes the
/// numeric encoding of a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<MeasurementValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_range"
    )]
    pub reference_range: Option<ReferenceRange>,
}

/// One analyte reading, either a harvested candidate or a final record row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<MeasurementValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_range"
    )]
    pub reference_range: Option<ReferenceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<Flag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<OriginalReading>,
}

impl Measurement {
    pub fn new(name: impl Into<String>, value: Option<MeasurementValue>) -> Self {
        Self {
            name: name.into(),
            value,
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.reference_range = ReferenceRange::new(min, max).non_empty();
        self
    }

    /// Trim strings and drop empty optionals so equivalent rows compare and
    /// serialize identically.
    pub fn tidy(mut self) -> Self {
        let clean = |s: Option<String>| {
            s.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        self.name = crate::text::collapse_whitespace(&self.name);
        self.original_name = clean(self.original_name);
        self.category = clean(self.category);
        self.unit = clean(self.unit);
        self.note = clean(self.note);
        self.reference_range = self.reference_range.and_then(ReferenceRange::non_empty);
        if let Some(MeasurementValue::Text(t)) = &self.value {
            self.value = MeasurementValue::from_text(t);
        }
        self
    }
}

/// A complete imported lab report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lab {
    /// `YYYY-MM-DD`
    pub date: String,
    pub lab_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub measurements: Vec<Measurement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_text() {
        assert_eq!(
            MeasurementValue::from_text("6,1"),
            Some(MeasurementValue::Number(6.1))
        );
        assert_eq!(
            MeasurementValue::from_text(" Negative "),
            Some(MeasurementValue::Text("Negative".to_string()))
        );
        assert_eq!(MeasurementValue::from_text("  "), None);
    }

    #[test]
    fn test_range_parse_forms() {
        assert_eq!(
            ReferenceRange::parse("3.9-5.5"),
            Some(ReferenceRange::new(Some(3.9), Some(5.5)))
        );
        assert_eq!(
            ReferenceRange::parse("(3,9 – 5,5)"),
            Some(ReferenceRange::new(Some(3.9), Some(5.5)))
        );
        assert_eq!(
            ReferenceRange::parse("< 5.7"),
            Some(ReferenceRange::new(None, Some(5.7)))
        );
        assert_eq!(
            ReferenceRange::parse(">=40"),
            Some(ReferenceRange::new(Some(40.0), None))
        );
        assert_eq!(
            ReferenceRange::parse("≤ 200"),
            Some(ReferenceRange::new(None, Some(200.0)))
        );
        assert_eq!(ReferenceRange::parse("see note"), None);
    }

    #[test]
    fn test_flag_parse() {
        assert_eq!(Flag::parse("H"), Some(Flag::High));
        assert_eq!(Flag::parse("(L)"), Some(Flag::Low));
        assert_eq!(Flag::parse("HH"), Some(Flag::Critical));
        assert_eq!(Flag::parse("*"), Some(Flag::Abnormal));
        assert_eq!(Flag::parse("mg/dL"), None);
    }

    #[test]
    fn test_measurement_accepts_legacy_shapes() {
        let m: Measurement = serde_json::from_str(
            r#"{"name":"Glucose","value":"6,1","unit":"mmol/L",
                "referenceRange":{"lower":"3.9","upper":5.5},"flag":"H"}"#,
        )
        .unwrap();
        assert_eq!(m.value, Some(MeasurementValue::Number(6.1)));
        assert_eq!(
            m.reference_range,
            Some(ReferenceRange::new(Some(3.9), Some(5.5)))
        );
        assert_eq!(m.flag, Some(Flag::High));
    }

    #[test]
    fn test_measurement_accepts_text_range_and_unknown_flag() {
        let m: Measurement = serde_json::from_str(
            r#"{"name":"HbA1c","value":5.4,"referenceRange":"< 5.7","flag":"weird"}"#,
        )
        .unwrap();
        assert_eq!(
            m.reference_range,
            Some(ReferenceRange::new(None, Some(5.7)))
        );
        assert_eq!(m.flag, Some(Flag::Unknown));
    }

    #[test]
    fn test_empty_range_becomes_none() {
        let m: Measurement =
            serde_json::from_str(r#"{"name":"TSH","value":2.1,"referenceRange":{}}"#).unwrap();
        assert_eq!(m.reference_range, None);
    }

    #[test]
    fn test_measurement_serializes_camel_case_without_nulls() {
        let m = Measurement::new("TSH", Some(MeasurementValue::Number(2.1)))
            .with_unit("uIU/mL")
            .with_range(Some(0.4), Some(4.0));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "TSH",
                "value": 2.1,
                "unit": "uIU/mL",
                "referenceRange": {"min": 0.4, "max": 4.0}
            })
        );
    }

    #[test]
    fn test_tidy_drops_empty_fields() {
        let m = Measurement {
            name: "  Ferritin   serum ".to_string(),
            unit: Some("  ".to_string()),
            value: Some(MeasurementValue::Text("45".to_string())),
            ..Default::default()
        }
        .tidy();
        assert_eq!(m.name, "Ferritin serum");
        assert_eq!(m.unit, None);
        assert_eq!(m.value, Some(MeasurementValue::Number(45.0)));
    }
}
