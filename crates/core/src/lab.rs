//! Report metadata detection and lab record assembly.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use crate::model::{Lab, Measurement, MeasurementValue};
use crate::text::{collapse_whitespace, fold_diacritics};

pub const UNKNOWN_LAB: &str = "Unknown laboratory";
pub const PLACEHOLDER_NAME: &str = "No measurements extracted";
pub const PLACEHOLDER_NOTE: &str =
    "No analyte rows could be extracted from this report. Check the source PDF.";

fn month_number(word: &str) -> Option<u32> {
    const PREFIXES: &[(&str, u32)] = &[
        ("jan", 1),
        ("ene", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("abr", 4),
        ("may", 5),
        ("mai", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("ago", 8),
        ("sep", 9),
        ("set", 9),
        ("oct", 10),
        ("okt", 10),
        ("nov", 11),
        ("dec", 12),
        ("dez", 12),
        ("dic", 12),
    ];
    let word = fold_diacritics(word).to_lowercase();
    PREFIXES
        .iter()
        .find(|(prefix, _)| word.starts_with(prefix))
        .map(|(_, month)| *month)
}

fn full_year(year: i32) -> i32 {
    match year {
        0..=69 => 2000 + year,
        70..=99 => 1900 + year,
        _ => year,
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<String> {
    NaiveDate::from_ymd_opt(full_year(year), month, day)
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Pulls `(year, month, day)` out of one pattern's captures.
type Fields = fn(&Captures) -> Option<(i32, u32, u32)>;

/// Every date in `line`, with the byte offset where it starts.
fn date_matches(line: &str) -> Vec<(usize, String)> {
    static ISO: OnceLock<Regex> = OnceLock::new();
    static DOTTED: OnceLock<Regex> = OnceLock::new();
    static SLASHED: OnceLock<Regex> = OnceLock::new();
    static DAY_MONTH: OnceLock<Regex> = OnceLock::new();
    static MONTH_DAY: OnceLock<Regex> = OnceLock::new();

    let iso = ISO.get_or_init(|| {
        Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b").unwrap()
    });
    let dotted =
        DOTTED.get_or_init(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4}|\d{2})\b").unwrap());
    let slashed =
        SLASHED.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").unwrap());
    let day_month = DAY_MONTH.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\.?\s+(\p{L}{3,10})\.?,?\s+(\d{4})\b").unwrap()
    });
    let month_day = MONTH_DAY.get_or_init(|| {
        Regex::new(r"(?i)\b(\p{L}{3,10})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").unwrap()
    });

    let patterns: [(&Regex, Fields); 5] = [
        (iso, |c| {
            Some((c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?))
        }),
        (dotted, |c| {
            Some((c[3].parse().ok()?, c[2].parse().ok()?, c[1].parse().ok()?))
        }),
        (slashed, |c| {
            // Day first, unless the second field cannot be a month.
            let (a, b): (u32, u32) = (c[1].parse().ok()?, c[2].parse().ok()?);
            let (month, day) = if b > 12 { (a, b) } else { (b, a) };
            Some((c[3].parse().ok()?, month, day))
        }),
        (day_month, |c| {
            Some((c[3].parse().ok()?, month_number(&c[2])?, c[1].parse().ok()?))
        }),
        (month_day, |c| {
            Some((c[3].parse().ok()?, month_number(&c[1])?, c[2].parse().ok()?))
        }),
    ];

    patterns
        .iter()
        .flat_map(|(re, fields)| {
            re.captures_iter(line).filter_map(move |c| {
                let (year, month, day) = fields(&c)?;
                Some((c.get(0)?.start(), ymd(year, month, day)?))
            })
        })
        .collect()
}

/// The leftmost date in `text`, as `YYYY-MM-DD`.
pub fn find_date(text: &str) -> Option<String> {
    date_matches(text)
        .into_iter()
        .min_by_key(|(start, _)| *start)
        .map(|(_, date)| date)
}

/// Normalize a date written in any supported format to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    find_date(raw.trim())
}

fn is_collection_line(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)collect|drawn|specimen date|sample date|entnahme|abnahme|probeneingang",
            r"|toma de muestra|fecha de toma|extraccion",
        ))
        .unwrap()
    });
    re.is_match(&fold_diacritics(line))
}

fn is_date_label_line(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\b(?:date|datum|fecha|report)\b").unwrap());
    re.is_match(line)
}

fn is_birth_line(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)birth|\bdob\b|geburt|\bgeb\.|nacimiento|f\. ?nac").unwrap()
    });
    re.is_match(&fold_diacritics(line))
}

/// Report date: a collection-labelled line first, then any date-labelled
/// line, then the first date outside birth-date lines.
pub fn detect_report_date(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !is_birth_line(l)).collect();
    lines
        .iter()
        .filter(|l| is_collection_line(l))
        .find_map(|l| find_date(l))
        .or_else(|| {
            lines
                .iter()
                .filter(|l| is_date_label_line(l))
                .find_map(|l| find_date(l))
        })
        .or_else(|| lines.iter().find_map(|l| find_date(l)))
}

/// First line that names a laboratory, clinic or diagnostics provider.
pub fn detect_lab_name(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:laborator\w*|labor|lab|diagnostics?|diagnostik\w*|clinic|klinik\w*|cl[ií]nica)\b")
            .unwrap()
    });
    text.lines()
        .map(collapse_whitespace)
        .filter(|l| l.chars().count() <= 80 && !l.contains(':') && re.is_match(l))
        .find(|l| find_date(l).is_none())
}

/// Report-level fields that are not measurements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabMeta {
    pub date: String,
    pub lab_name: String,
    pub location: Option<String>,
    pub import_location: Option<String>,
    pub weight_kg: Option<f64>,
    pub notes: Option<String>,
}

impl LabMeta {
    /// Detect date and laboratory from the report text. `fallback_date` is
    /// used when the text carries no recognizable date.
    pub fn detect(text: &str, fallback_date: &str) -> Self {
        let date = detect_report_date(text).unwrap_or_else(|| {
            log::warn!("No report date found; using {}", fallback_date);
            fallback_date.to_string()
        });
        Self {
            date,
            lab_name: detect_lab_name(text).unwrap_or_else(|| UNKNOWN_LAB.to_string()),
            ..Default::default()
        }
    }
}

fn placeholder() -> Measurement {
    Measurement {
        note: Some(PLACEHOLDER_NOTE.to_string()),
        ..Measurement::new(PLACEHOLDER_NAME, Some(MeasurementValue::Text("n/a".into())))
    }
}

/// Build the final record. The measurement list is never empty.
pub fn assemble_lab(meta: LabMeta, measurements: Vec<Measurement>) -> Lab {
    let measurements = if measurements.is_empty() {
        log::warn!("No measurements extracted; inserting placeholder");
        vec![placeholder()]
    } else {
        measurements
    };
    Lab {
        date: meta.date,
        lab_name: meta.lab_name,
        location: meta.location,
        import_location: meta.import_location,
        weight_kg: meta.weight_kg,
        notes: meta.notes,
        measurements,
    }
}
