//! Unit standardization.
//!
//! Each canonical analyte has one reporting unit. Rows printed in another
//! spelling of the same unit are relabeled; rows in a different unit are
//! converted with a linear formula and keep a snapshot of what was printed.

use crate::model::{Measurement, MeasurementValue, OriginalReading, ReferenceRange};
use crate::text::{canonical_key, fold_diacritics};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// Same physical unit, different spelling.
    Relabel,
    /// `to = factor * from + offset`
    Linear { factor: f64, offset: f64 },
}

impl Conversion {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Conversion::Relabel => x,
            Conversion::Linear { factor, offset } => factor * x + offset,
        }
    }

    pub fn invert(&self, y: f64) -> f64 {
        match self {
            Conversion::Relabel => y,
            Conversion::Linear { factor, offset } => (y - offset) / factor,
        }
    }
}

#[derive(Debug)]
pub struct UnitRule {
    /// Canonical analyte names the rule applies to.
    pub analytes: &'static [&'static str],
    /// Accepted source spellings, as [`unit_key`] output.
    pub from: &'static [&'static str],
    /// Preferred spelling of the source unit.
    pub from_label: &'static str,
    pub to: &'static str,
    pub conversion: Conversion,
}

const fn linear(factor: f64) -> Conversion {
    Conversion::Linear {
        factor,
        offset: 0.0,
    }
}

const CHOLESTEROL: &[&str] = &["Total Cholesterol", "LDL Cholesterol", "HDL Cholesterol"];
const WHITE_CELLS_AND_PLATELETS: &[&str] = &["Leukocytes", "Platelets"];

pub const RULES: &[UnitRule] = &[
    UnitRule {
        analytes: &["Glucose"],
        from: &["mmol/l"],
        from_label: "mmol/L",
        to: "mg/dL",
        conversion: linear(18.0182),
    },
    UnitRule {
        analytes: CHOLESTEROL,
        from: &["mmol/l"],
        from_label: "mmol/L",
        to: "mg/dL",
        conversion: linear(38.67),
    },
    UnitRule {
        analytes: &["Triglycerides"],
        from: &["mmol/l"],
        from_label: "mmol/L",
        to: "mg/dL",
        conversion: linear(88.57),
    },
    UnitRule {
        analytes: &["Creatinine"],
        from: &["umol/l"],
        from_label: "umol/L",
        to: "mg/dL",
        conversion: linear(0.01131),
    },
    UnitRule {
        analytes: &["Hemoglobin"],
        from: &["g/l"],
        from_label: "g/L",
        to: "g/dL",
        conversion: linear(0.1),
    },
    UnitRule {
        analytes: &["Hemoglobin A1c"],
        from: &["mmol/mol"],
        from_label: "mmol/mol",
        to: "%",
        conversion: Conversion::Linear {
            factor: 0.09148,
            offset: 2.152,
        },
    },
    UnitRule {
        analytes: &["25-OH Vitamin D"],
        from: &["nmol/l"],
        from_label: "nmol/L",
        to: "ng/mL",
        conversion: linear(0.4006),
    },
    UnitRule {
        analytes: &["TSH"],
        from: &["mu/l", "miu/l", "uu/ml"],
        from_label: "uIU/mL",
        to: "uIU/mL",
        conversion: Conversion::Relabel,
    },
    UnitRule {
        analytes: &["TSH"],
        from: &["mu/ml", "miu/ml"],
        from_label: "mU/mL",
        to: "uIU/mL",
        conversion: linear(1000.0),
    },
    UnitRule {
        analytes: WHITE_CELLS_AND_PLATELETS,
        from: &["gpt/l", "g/l", "/nl", "10^3/ul", "tsd/ul"],
        from_label: "10^9/L",
        to: "10^9/L",
        conversion: Conversion::Relabel,
    },
    UnitRule {
        analytes: &["Erythrocytes"],
        from: &["tpt/l", "t/l", "/pl", "10^6/ul", "mio/ul"],
        from_label: "10^12/L",
        to: "10^12/L",
        conversion: Conversion::Relabel,
    },
];

/// Comparison form of a unit string: diacritic-folded, lowercase, no
/// spaces, `*`/`10e` exponent markers as `^`, and no leading `x` as in
/// `x10^9/L`.
pub fn unit_key(unit: &str) -> String {
    let key: String = fold_diacritics(unit)
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '*' { '^' } else { c })
        .collect();
    let key = key.replace("10e", "10^").replace("^^", "^");
    match key.strip_prefix('x') {
        Some(rest) if rest.starts_with("10^") => rest.to_string(),
        _ => key,
    }
}

/// The rule for `name` printed in `unit`, and the conversion to apply.
///
/// A unit that is already the target in another spelling relabels.
pub fn find_rule(name: &str, unit: &str) -> Option<(&'static UnitRule, Conversion)> {
    let analyte = canonical_key(name);
    let unit = unit_key(unit);
    RULES
        .iter()
        .filter(|rule| rule.analytes.iter().any(|a| canonical_key(a) == analyte))
        .find_map(|rule| {
            if rule.from.contains(&unit.as_str()) {
                Some((rule, rule.conversion))
            } else if unit_key(rule.to) == unit {
                Some((rule, Conversion::Relabel))
            } else {
                None
            }
        })
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn convert_range(range: ReferenceRange, conversion: Conversion) -> Option<ReferenceRange> {
    let bound = |b: Option<f64>| b.map(|v| round4(conversion.apply(v)));
    ReferenceRange::new(bound(range.min), bound(range.max)).non_empty()
}

/// Bring a canonicalized measurement to its analyte's reporting unit.
pub fn standardize(mut m: Measurement) -> Measurement {
    let Some(unit) = m.unit.clone() else {
        return m;
    };
    let Some((rule, conversion)) = find_rule(&m.name, &unit) else {
        return m;
    };

    match conversion {
        Conversion::Relabel => {
            m.unit = Some(rule.to.to_string());
        }
        Conversion::Linear { .. } => {
            let Some(x) = m.value.as_ref().and_then(MeasurementValue::as_number) else {
                m.unit = Some(rule.from_label.to_string());
                return m;
            };
            log::debug!("Converting {} from {} to {}", m.name, unit, rule.to);
            if m.original.is_none() {
                m.original = Some(OriginalReading {
                    value: m.value.clone(),
                    unit: Some(unit),
                    reference_range: m.reference_range,
                });
            }
            m.value = Some(MeasurementValue::Number(round4(conversion.apply(x))));
            m.reference_range = m
                .reference_range
                .and_then(|range| convert_range(range, conversion));
            m.unit = Some(rule.to.to_string());
        }
    }
    m
}

pub fn standardize_all(measurements: Vec<Measurement>) -> Vec<Measurement> {
    measurements.into_iter().map(standardize).collect()
}

/// Recompute the printed reading of a converted measurement from its
/// current value, for checking against the stored `original`.
pub fn reverse_conversion(m: &Measurement) -> Option<OriginalReading> {
    let original_unit = m.original.as_ref()?.unit.as_deref()?;
    let (_, conversion) = find_rule(&m.name, original_unit)?;
    let y = m.value.as_ref()?.as_number()?;
    let bound = |b: Option<f64>| b.map(|v| conversion.invert(v));
    Some(OriginalReading {
        value: Some(MeasurementValue::Number(conversion.invert(y))),
        unit: Some(original_unit.to_string()),
        reference_range: m
            .reference_range
            .and_then(|r| ReferenceRange::new(bound(r.min), bound(r.max)).non_empty()),
    })
}
