use crate::model::{Flag, Measurement, MeasurementValue, ReferenceRange};
use crate::rules::{
    is_category_header, is_qualitative, is_unit_token, matches_admin_pattern,
    matches_analyte_vocabulary,
};
use crate::text::{collapse_whitespace, is_all_caps};

use super::{is_comparator_value, is_span_range, parse_value_token, split_columns};

const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 100;
const MAX_CONTINUATION_LEN: usize = 40;

/// Harvest candidates from column-aligned lines of one page.
pub fn harvest_table_lines(page: &str) -> Vec<Measurement> {
    let mut rows = Vec::new();
    let mut previous: Option<&str> = None;

    for line in page.lines() {
        let columns = split_columns(line);
        if let Some(m) = parse_row(&columns, previous) {
            rows.push(m);
        }
        let trimmed = line.trim();
        previous = (!trimmed.is_empty()).then_some(trimmed);
    }

    rows
}

/// Parse one split line. `above` is the preceding non-blank line, used as a
/// name continuation when it is a short ALL-CAPS fragment.
fn parse_row(columns: &[&str], above: Option<&str>) -> Option<Measurement> {
    if columns.len() < 2 {
        return None;
    }

    let first = columns[0];
    let len = first.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len)
        || !first.chars().any(char::is_alphabetic)
        || matches_admin_pattern(first)
    {
        return None;
    }

    let tail = parse_tail(&columns[1..])?;

    let name = match above.filter(|a| is_continuation(a, first)) {
        Some(prefix) => format!("{} {}", prefix, first),
        None => first.to_string(),
    };

    let mut m = Measurement::new(collapse_whitespace(&name), Some(tail.value));
    m.unit = tail.unit;
    m.reference_range = tail.range;
    m.flag = tail.flag;
    Some(m)
}

fn is_continuation(above: &str, name: &str) -> bool {
    split_columns(above).len() == 1
        && above.chars().count() <= MAX_CONTINUATION_LEN
        && is_all_caps(above)
        && !above.contains(':')
        && !is_category_header(above)
        && !matches_admin_pattern(above)
        && (name.starts_with('(') || name.starts_with(',') || !matches_analyte_vocabulary(name))
}

struct Tail {
    value: MeasurementValue,
    unit: Option<String>,
    range: Option<ReferenceRange>,
    flag: Option<Flag>,
}

/// Scan the tail columns for a flag, a reference range, a unit and the
/// value. Returns `None` when no value token is present.
fn parse_tail(columns: &[&str]) -> Option<Tail> {
    let mut value: Option<MeasurementValue> = None;
    let mut unit = None;
    let mut range = None;
    let mut flag = None;

    for column in columns {
        // Multi-word tokens first: "not detected", "3.9 - 5.5".
        if value.is_none() && is_qualitative(column) {
            value = Some(MeasurementValue::Text(column.to_string()));
            continue;
        }
        if range.is_none()
            && (is_span_range(column) || (value.is_some() && is_comparator_value(column)))
        {
            range = ReferenceRange::parse(column);
            continue;
        }

        for token in column.split_whitespace() {
            if flag.is_none() && value.is_some() {
                if let Some(f) = Flag::parse(token) {
                    flag = Some(f);
                    continue;
                }
            }
            if range.is_none()
                && (is_span_range(token) || (value.is_some() && is_comparator_value(token)))
            {
                range = ReferenceRange::parse(token);
                continue;
            }
            if unit.is_none() && is_unit_token(token) {
                unit = Some(token.to_string());
                continue;
            }
            if value.is_none() {
                value = parse_value_token(token);
            }
        }
    }

    Some(Tail {
        value: value?,
        unit,
        range,
        flag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_row() {
        let rows = harvest_table_lines("Glucose      6.1   H    mmol/L     3.9 - 5.5");
        assert_eq!(rows.len(), 1);
        let m = &rows[0];
        assert_eq!(m.name, "Glucose");
        assert_eq!(m.value, Some(MeasurementValue::Number(6.1)));
        assert_eq!(m.unit.as_deref(), Some("mmol/L"));
        assert_eq!(
            m.reference_range,
            Some(ReferenceRange::new(Some(3.9), Some(5.5)))
        );
        assert_eq!(m.flag, Some(Flag::High));
    }

    #[test]
    fn test_german_row_with_decimal_comma() {
        let rows = harvest_table_lines("Leukozyten (EB)    6,1    Gpt/l    3,9-10,5");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Leukozyten (EB)");
        assert_eq!(rows[0].value, Some(MeasurementValue::Number(6.1)));
        assert_eq!(rows[0].unit.as_deref(), Some("Gpt/l"));
        assert_eq!(
            rows[0].reference_range,
            Some(ReferenceRange::new(Some(3.9), Some(10.5)))
        );
    }

    #[test]
    fn test_comparator_range_after_value() {
        let rows = harvest_table_lines("HbA1c    5.4 %    < 5.7");
        assert_eq!(rows[0].value, Some(MeasurementValue::Number(5.4)));
        assert_eq!(rows[0].unit.as_deref(), Some("%"));
        assert_eq!(
            rows[0].reference_range,
            Some(ReferenceRange::new(None, Some(5.7)))
        );
    }

    #[test]
    fn test_comparator_value_before_range() {
        let rows = harvest_table_lines("CRP    <0.5    mg/L    0-5");
        assert_eq!(
            rows[0].value,
            Some(MeasurementValue::Text("<0.5".to_string()))
        );
        assert_eq!(
            rows[0].reference_range,
            Some(ReferenceRange::new(Some(0.0), Some(5.0)))
        );
    }

    #[test]
    fn test_qualitative_value() {
        let rows = harvest_table_lines("HIV Ag/Ab    not detected");
        assert_eq!(
            rows[0].value,
            Some(MeasurementValue::Text("not detected".to_string()))
        );
    }

    #[test]
    fn test_rejects_single_column_and_admin_lines() {
        assert!(harvest_table_lines("Glucose 6.1 mmol/L").is_empty());
        assert!(harvest_table_lines("Tel    030 123456").is_empty());
        assert!(harvest_table_lines("Patient    Jane Doe").is_empty());
        assert!(harvest_table_lines("12    34").is_empty());
    }

    #[test]
    fn test_all_caps_continuation() {
        let page = "CHOLESTEROL\n(CALC.)    130    mg/dL    < 100";
        let rows = harvest_table_lines(page);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "CHOLESTEROL (CALC.)");
    }

    #[test]
    fn test_category_header_is_not_a_continuation() {
        let page = "HEMATOLOGY\nHemoglobin    14.2    g/dL    13.5-17.5";
        let rows = harvest_table_lines(page);
        assert_eq!(rows[0].name, "Hemoglobin");
    }
}
