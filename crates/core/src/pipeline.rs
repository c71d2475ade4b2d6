//! Composition of the heuristic stages.
//!
//! The shell interleaves model calls between these steps; without a model
//! [`process_offline`] runs the whole path from page text to a lab record.

use crate::filter::filter_candidates;
use crate::glossary::{canonicalize_offline, Glossary};
use crate::harvest::card::harvest_cards;
use crate::harvest::fallback::harvest_fallback;
use crate::harvest::llm::Translation;
use crate::harvest::table::harvest_table_lines;
use crate::lab::{assemble_lab, LabMeta};
use crate::merge::{dedupe, merge_strategies};
use crate::model::{Lab, Measurement};
use crate::rules::{is_english_name, translate_terms};
use crate::text::collapse_whitespace;
use crate::units::standardize_all;

/// Candidates from the strategies that need no model.
#[derive(Debug, Clone, Default)]
pub struct DocumentHarvest {
    pub card: Vec<Measurement>,
    pub table: Vec<Measurement>,
}

/// Card blocks can span a page break, so cards are read from the joined
/// text; table lines are read per page.
pub fn harvest_document(pages: &[String]) -> DocumentHarvest {
    let card = harvest_cards(&pages.join("\n"));
    let table: Vec<Measurement> = pages
        .iter()
        .flat_map(|page| harvest_table_lines(page))
        .collect();
    log::debug!(
        "Harvested {} card and {} table candidates",
        card.len(),
        table.len()
    );
    DocumentHarvest { card, table }
}

/// Apply the literal term substitutions to every name, keeping the printed
/// label in `originalName`.
pub fn translate_names(measurements: Vec<Measurement>) -> Vec<Measurement> {
    measurements
        .into_iter()
        .map(|mut m| {
            let translated = collapse_whitespace(&translate_terms(&m.name));
            if translated != m.name {
                if m.original_name.is_none() {
                    m.original_name = Some(m.name.clone());
                }
                m.name = translated;
            }
            m
        })
        .collect()
}

/// Merge the strategies, filter, then translate.
pub fn combine(harvest: DocumentHarvest, llm: Vec<Measurement>) -> Vec<Measurement> {
    let merged = merge_strategies(harvest.card, llm, harvest.table);
    translate_names(filter_candidates(merged))
}

/// Last-resort candidates for a document where nothing else survived.
pub fn fallback_candidates(full_text: &str) -> Vec<Measurement> {
    translate_names(filter_candidates(dedupe(harvest_fallback(full_text))))
}

/// Positions of measurements whose names are still not plain English.
pub fn needs_translation(measurements: &[Measurement]) -> Vec<usize> {
    measurements
        .iter()
        .enumerate()
        .filter(|(_, m)| !is_english_name(&m.name))
        .map(|(i, _)| i)
        .collect()
}

/// Apply model translations. `pending` maps each translation index to a
/// measurement position, as returned by [`needs_translation`]. Answers that
/// are not English themselves are ignored.
pub fn apply_translations(
    measurements: &mut [Measurement],
    pending: &[usize],
    translations: Vec<Translation>,
) {
    for t in translations {
        let Some(m) = pending
            .get(t.index)
            .and_then(|&position| measurements.get_mut(position))
        else {
            continue;
        };
        let english = collapse_whitespace(&t.english);
        if english.is_empty() || english == m.name || !is_english_name(&english) {
            continue;
        }
        if m.original_name.is_none() {
            m.original_name = Some(m.name.clone());
        }
        m.name = english;
    }
}

/// Unit standardization, a second dedupe now that names are canonical, and
/// record assembly.
pub fn finalize(meta: LabMeta, measurements: Vec<Measurement>) -> Lab {
    assemble_lab(meta, dedupe(standardize_all(measurements)))
}

/// Heuristic-only import of one document.
pub fn process_offline(
    pages: &[String],
    glossary: &mut Glossary,
    now: &str,
    fallback_date: &str,
) -> Lab {
    let full_text = pages.join("\n");
    let mut candidates = combine(harvest_document(pages), Vec::new());
    if candidates.is_empty() {
        log::info!("No candidates from the primary strategies; trying fallback patterns");
        candidates = fallback_candidates(&full_text);
    }
    let measurements = canonicalize_offline(glossary, now, candidates);
    finalize(LabMeta::detect(&full_text, fallback_date), measurements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::PLACEHOLDER_NAME;
    use crate::model::{MeasurementValue, ReferenceRange};

    const NOW: &str = "2024-05-01T10:00:00Z";

    fn page(text: &str) -> Vec<String> {
        vec![text.to_string()]
    }

    #[test]
    fn test_combine_translates_and_filters() {
        let pages = page("Seite    1\nLeukozyten (EB)    6,1    Gpt/l    3,9-10,5");
        let rows = combine(harvest_document(&pages), Vec::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Leukocytes (EB)");
        assert_eq!(rows[0].original_name.as_deref(), Some("Leukozyten (EB)"));
    }

    #[test]
    fn test_apply_translations() {
        let mut rows = vec![
            Measurement::new("Glucose", Some(MeasurementValue::Number(95.0))),
            Measurement::new("Harnsäurewert", Some(MeasurementValue::Number(5.0))),
        ];
        let pending = needs_translation(&rows);
        assert_eq!(pending, vec![1]);

        apply_translations(
            &mut rows,
            &pending,
            vec![
                Translation {
                    index: 0,
                    english: "Uric  acid".to_string(),
                },
                Translation {
                    index: 5,
                    english: "Ignored".to_string(),
                },
            ],
        );
        assert_eq!(rows[1].name, "Uric acid");
        assert_eq!(rows[1].original_name.as_deref(), Some("Harnsäurewert"));
        assert_eq!(rows[0].name, "Glucose");
    }

    #[test]
    fn test_process_offline_end_to_end() {
        let pages = page(
            "\
MVZ Labor Berlin
Entnahme: 28.03.2024
Leukozyten (EB)    6,1    Gpt/l    3,9-10,5
Glukose    6,1    mmol/l    3,9-5,5
Tel    030 123456",
        );
        let mut glossary = Glossary::empty(NOW);
        let lab = process_offline(&pages, &mut glossary, NOW, "2024-05-01");

        assert_eq!(lab.date, "2024-03-28");
        assert_eq!(lab.lab_name, "MVZ Labor Berlin");
        assert_eq!(lab.measurements.len(), 2);

        let leukocytes = &lab.measurements[0];
        assert_eq!(leukocytes.name, "Leukocytes");
        assert_eq!(leukocytes.original_name.as_deref(), Some("Leukozyten (EB)"));
        assert_eq!(leukocytes.unit.as_deref(), Some("10^9/L"));

        let glucose = &lab.measurements[1];
        assert_eq!(glucose.name, "Glucose");
        assert_eq!(glucose.value, Some(MeasurementValue::Number(109.911)));
        assert_eq!(glucose.unit.as_deref(), Some("mg/dL"));
        assert_eq!(
            glucose.reference_range,
            Some(ReferenceRange::new(Some(70.271), Some(99.1001)))
        );
        assert!(glucose.original.is_some());

        assert_eq!(glossary.len(), 2);
        let count = glossary.len();
        let again = process_offline(&pages, &mut glossary, NOW, "2024-05-01");
        assert_eq!(again, lab);
        assert_eq!(glossary.len(), count);
    }

    #[test]
    fn test_process_offline_uses_fallback_patterns() {
        let pages = page("Ferritin 45 ng/mL 30-400");
        let mut glossary = Glossary::empty(NOW);
        let lab = process_offline(&pages, &mut glossary, NOW, "2024-05-01");
        assert_eq!(lab.measurements.len(), 1);
        assert_eq!(lab.measurements[0].name, "Ferritin");
    }

    #[test]
    fn test_process_offline_empty_document() {
        let mut glossary = Glossary::empty(NOW);
        let lab = process_offline(&page("Thank you"), &mut glossary, NOW, "2024-05-01");
        assert_eq!(lab.date, "2024-05-01");
        assert_eq!(lab.measurements.len(), 1);
        assert_eq!(lab.measurements[0].name, PLACEHOLDER_NAME);
        assert!(glossary.is_empty());
    }
}
