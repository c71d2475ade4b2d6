//! String helpers shared by the harvesters, the filter and the glossary.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip diacritics: NFD-decompose and drop combining marks. `ß` becomes
/// `ss` so German spellings fold onto their ASCII transliteration.
pub fn fold_diacritics(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| match c {
            'ß' => vec!['s', 's'],
            'µ' | 'μ' => vec!['u'],
            c => vec![c],
        })
        .collect()
}

/// Canonical lookup key: lowercase, diacritic-free, every run of
/// non-alphanumeric characters collapsed to a single space.
pub fn canonical_key(s: &str) -> String {
    let folded = fold_diacritics(s).to_lowercase();
    let mut key = String::with_capacity(folded.len());
    let mut pending_space = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            key.push(c);
        } else {
            pending_space = true;
        }
    }
    key
}

/// Lowercase, diacritic-free, whitespace-collapsed form used for stoplist
/// comparisons (punctuation is kept, unlike [`canonical_key`]).
pub fn loose_key(s: &str) -> String {
    collapse_whitespace(&fold_diacritics(s).to_lowercase())
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a bare number, accepting a comma as the decimal separator and a
/// leading `+`. Only finite values are returned.
pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim().trim_start_matches('+');
    if t.is_empty() {
        return None;
    }
    let normalized = if t.contains(',') && !t.contains('.') {
        // A lone comma is always a decimal comma, so "1,005" is 1.005 (urine
        // specific gravity). Comma grouping without a decimal point, as in
        // "1,234" meaning 1234, is misread.
        t.replacen(',', ".", 1)
    } else {
        t.replace(',', "")
    };
    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
    {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True when every letter in `s` is uppercase and there is at least one.
pub fn is_all_caps(s: &str) -> bool {
    let mut letters = s.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
}

/// Title-case an ALL-CAPS heading, leaving short tokens (acronyms such as
/// `TSH`, `HDL`, `B12`) untouched.
pub fn title_case_heading(s: &str) -> String {
    collapse_whitespace(s)
        .split(' ')
        .map(|word| {
            let letters = word.chars().filter(|c| c.is_alphabetic()).count();
            if letters <= 3 || word.chars().any(|c| c.is_ascii_digit()) {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_diacritics() {
        assert_eq!(fold_diacritics("Hämoglobin"), "Hamoglobin");
        assert_eq!(fold_diacritics("Triglicéridos"), "Trigliceridos");
        assert_eq!(fold_diacritics("Harnsäure Größe"), "Harnsaure Grosse");
        assert_eq!(fold_diacritics("µmol/l"), "umol/l");
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!(canonical_key("  ALT (SGPT) "), "alt sgpt");
        assert_eq!(canonical_key("Vitamin B-12"), "vitamin b 12");
        assert_eq!(canonical_key("Leukozyten"), "leukozyten");
        assert_eq!(canonical_key("Hämoglobin A1c"), "hamoglobin a1c");
        assert_eq!(canonical_key("---"), "");
    }

    #[test]
    fn test_loose_key_keeps_punctuation() {
        assert_eq!(loose_key("  Tel:   "), "tel:");
        assert_eq!(loose_key("N/A"), "n/a");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("6.1"), Some(6.1));
        assert_eq!(parse_number("6,1"), Some(6.1));
        assert_eq!(parse_number("+12"), Some(12.0));
        assert_eq!(parse_number("-0.5"), Some(-0.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1,005"), Some(1.005));
        assert_eq!(parse_number("<5"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_is_all_caps() {
        assert!(is_all_caps("GLUCOSE, FASTING"));
        assert!(is_all_caps("VITAMIN B12"));
        assert!(!is_all_caps("Glucose"));
        assert!(!is_all_caps("123"));
    }

    #[test]
    fn test_title_case_heading() {
        assert_eq!(title_case_heading("FERRITIN"), "Ferritin");
        assert_eq!(title_case_heading("HDL  CHOLESTEROL"), "HDL Cholesterol");
        assert_eq!(title_case_heading("VITAMIN B12"), "Vitamin B12");
    }
}
