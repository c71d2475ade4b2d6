use crate::rules::{
    apply_canonical_rules, is_category_header, is_english_name, strip_trailing_qualifier,
    translate_terms,
};
use crate::text::collapse_whitespace;

/// Upper bound on rewrite rounds; the pipeline normally settles in two.
const MAX_ROUNDS: usize = 8;

fn strip_qualifiers(name: String) -> String {
    let mut current = name;
    while let Some(stripped) = strip_trailing_qualifier(&current) {
        current = stripped;
    }
    current
}

fn rewrite_once(name: &str) -> String {
    let translated = collapse_whitespace(&translate_terms(name));
    let trimmed = translated
        .trim_matches(|c: char| c == ':' || c == '*' || c == ',' || c.is_whitespace())
        .to_string();
    let stripped = strip_qualifiers(trimmed);
    match apply_canonical_rules(&stripped) {
        Some(canonical) => strip_qualifiers(canonical.to_string()),
        None => stripped,
    }
}

/// Normalize an analyte name for the glossary.
///
/// Applies term translation, canonical-name rules and trailing-qualifier
/// stripping until the name stops changing, then rejects names that are
/// empty, category headers or not plain English. The result is a fixpoint,
/// so `normalize_name(normalize_name(x)) == normalize_name(x)`.
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut current = collapse_whitespace(raw);
    for _ in 0..MAX_ROUNDS {
        let next = rewrite_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() || is_category_header(&current) || !is_english_name(&current) {
        return None;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_then_qualifier_strip() {
        assert_eq!(
            normalize_name("Leukozyten (EB)"),
            Some("Leukocytes".to_string())
        );
        assert_eq!(
            normalize_name("Leukocytes (EB)"),
            Some("Leukocytes".to_string())
        );
    }

    #[test]
    fn test_canonical_rules() {
        assert_eq!(normalize_name("GPT"), Some("ALT (SGPT)".to_string()));
        assert_eq!(normalize_name("GPT (ALT)"), Some("ALT (SGPT)".to_string()));
        assert_eq!(normalize_name("GOT (AST)"), Some("AST (SGOT)".to_string()));
        assert_eq!(
            normalize_name("HbA1c (IFCC)"),
            Some("Hemoglobin A1c".to_string())
        );
        assert_eq!(normalize_name("TSH (Gen 2)"), Some("TSH".to_string()));
        assert_eq!(normalize_name("Glukose"), Some("Glucose".to_string()));
    }

    #[test]
    fn test_stacked_qualifiers() {
        assert_eq!(
            normalize_name("Ferritin (Serum) (II)"),
            Some("Ferritin".to_string())
        );
    }

    #[test]
    fn test_rejections() {
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_name("HEMATOLOGY"), None);
        assert_eq!(normalize_name("Harnsäure"), Some("Uric Acid".to_string()));
        assert_eq!(normalize_name("Gesamteiweiß"), Some("Total Protein".to_string()));
        assert_eq!(normalize_name("Kalium im Serum"), None);
    }

    #[test]
    fn test_idempotent() {
        for raw in [
            "Leukozyten (EB)",
            "SGPT",
            "ALT (SGPT)",
            "HbA1c",
            "25-OH-Vitamin D3",
            "Cholesterin",
            "Ferritin (Serum)",
            "Vitamin B12",
            "Triglyceride",
        ] {
            let once = normalize_name(raw);
            let twice = once.as_deref().and_then(normalize_name);
            assert_eq!(once, twice, "not idempotent for {}", raw);
        }
    }
}
