//! Rule tables used by the harvesters, the candidate filter and the glossary.
//!
//! Every table is data: an ordered list of patterns (or words) compiled once
//! on first use. Control flow lives in the callers; the tables can grow
//! without touching it.

use std::sync::OnceLock;

use regex::Regex;

use crate::text::{canonical_key, fold_diacritics, loose_key};

/// Compile an ordered list of `(pattern, replacement)` pairs.
fn compile_pairs(pairs: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    pairs
        .iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
        .collect()
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

// ---------------------------------------------------------------------------
// Value-side tokens
// ---------------------------------------------------------------------------

/// True for a unit token such as `mg/dL`, `µmol/l`, `10^9/L`, `Gpt/l` or `%`.
pub fn is_unit_token(token: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:%|‰|fl|pg|mm/h|mm/hr|mm3|mosm/kg|index",
            r"|[munpk]?(?:g|mol|eq|val|kat)/(?:[dcmunp]?l|kg|24\s?h|d|g|mol)",
            r"|[kmunp]?(?:iu|u|ie|e)/(?:[dmu]?l)",
            r"|(?:gpt|tpt|g|t|mio|tsd)/(?:u?l)",
            r"|/(?:[nupm]l|hpf)",
            r"|(?:x\s?)?10(?:\^|\*|e)?\d{1,2}/(?:[unp]?l)",
            r"|ml/min(?:/1[.,]73\s?m(?:2|²)?)?",
            r"|(?:cells|zellen)/(?:ul|mm3))$",
        ))
        .unwrap()
    });
    let t = fold_diacritics(token.trim()).to_lowercase();
    !t.is_empty() && re.is_match(&t)
}

/// True when any whitespace-separated token of `name` is a unit token.
pub fn contains_unit_token(name: &str) -> bool {
    name.split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == '(' || c == ')' || c == '[' || c == ']' || c == ','))
        .any(is_unit_token)
}

/// Qualitative result keywords (`Positive`, `nicht nachweisbar`, `+++`, ...).
pub fn is_qualitative(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:positive|negative|pos|neg|detected|not detected|non[- ]?detected|undetected",
            r"|reactive|non[- ]?reactive|present|absent|trace|normal|abnormal|indeterminate",
            r"|equivocal|clear|cloudy|turbid|yellow|amber|straw|none seen|few|moderate|many|rare",
            r"|positiv|negativ|nachweisbar|nicht nachweisbar|unauffallig",
            r"|positivo|negativo|detectado|no detectado|\+{1,4})$",
        ))
        .unwrap()
    });
    re.is_match(&loose_key(value))
}

/// Placeholder values that stand in for a result that was never reported.
pub fn is_placeholder_value(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:pending|n/?a|na|-+|—|–|\*+|\.+|x|null|none|canceled|cancelled|see note",
            r"|see comment|see below|see report|not performed|not done|to follow|tbd",
            r"|to be determined|insufficient|qns|hemolyzed|no result|storniert|folgt",
            r"|siehe befund|siehe kommentar|entfallt|nicht bestimmt|pendiente|anulado)$",
        ))
        .unwrap()
    });
    re.is_match(&loose_key(value))
}

// ---------------------------------------------------------------------------
// Name-side rules: filter
// ---------------------------------------------------------------------------

const ADMIN_STOPLIST: &[&str] = &[
    "page", "seite", "pagina", "tel", "telefon", "phone", "fax", "email", "e-mail", "www", "name",
    "patient", "patient name", "date", "datum", "dob", "date of birth", "geburtsdatum", "sex",
    "gender", "age", "id", "patient id", "order", "order number", "ordered by", "doctor",
    "physician", "address", "adresse", "result", "results", "ergebnis", "resultado",
    "reference", "reference range", "reference interval", "referenzbereich", "normalwert",
    "valor de referencia", "unit", "units", "einheit", "unidad", "test", "test name", "analyte",
    "parameter", "specimen", "sample", "material", "collected", "received", "reported",
    "printed", "flag", "status", "final", "approved", "signature", "comment", "comments",
    "note", "notes", "befund", "lab", "laboratory", "labor",
];

/// Exact-match administrative stoplist, compared by case, diacritics and
/// whitespace insensitive key with any trailing colon removed.
pub fn is_admin_stoplisted(name: &str) -> bool {
    let key = loose_key(name);
    let key = key.trim_end_matches(':').trim();
    ADMIN_STOPLIST.contains(&key)
}

/// Administrative and narrative patterns: contact info, patient identity,
/// addresses, guideline prose, comments and section banners.
pub fn matches_admin_pattern(name: &str) -> bool {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = RE.get_or_init(|| {
        compile_all(&[
            // contact
            r"(?i)(?:\btel\b|\bphone\b|\bfax\b|\be-?mail\b|www\.|https?://|@)",
            // identity
            r"(?i)\b(?:patient|date of birth|dob|geburtsdatum|geb\.|born|gender|medical record|mrn|insurance|versicherung|physician|doctor|arzt|ordered by|requested by|einsender)\b",
            r"(?i)(?:^|\s)dr\.\s",
            // addresses
            r"(?i)\b(?:street|avenue|road|suite|strasse|postfach|p\.?\s?o\.? box|zip code)\b",
            r"(?i)\b\w+(?:str\.|strasse)\s+\d+",
            // guideline prose
            r"(?i)\b(?:recommend\w*|guideline\w*|according to|consistent with|please|should|interpretation|for further|in case of|if you|clinical correlation|therapy|treatment|pregnan\w*|empfehl\w*|bitte)\b",
            // comments
            r"(?i)^(?:comments?|notes?|remarks?|kommentar|bemerkung|hinweis|nota)\b",
            // banners
            r"(?i)^(?:page|seite|pagina)\s*\d+",
            r"(?i)^(?:end of report|final report|laboratory report|lab report|befundbericht|results? for|specimen|sample|collected|received|reported|printed|validated|approved|signed|requisition)\b",
            r"^[-=_*#.\s]+$",
            // dates and times as names
            r"^\d{1,4}[./-]\d{1,2}[./-]\d{1,4}",
            r"^\d{1,2}:\d{2}",
        ])
    });
    patterns.iter().any(|re| re.is_match(name))
}

/// Analyte vocabulary: stems and acronyms of common blood and urine tests in
/// English, German and Spanish. Matched against the diacritic-folded name.
pub fn matches_analyte_vocabulary(name: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(?:glu[ck]os|cholester|colesterol|triglycer|triglicer|h(?:a|ae|e)moglobin|hemoglobina",
            r"|h(?:a|ae|e)matocrit|h(?:a|ae|e)matokrit|leu[ck]o[cz]yt|leucocit|erythro[cz]yt|eritrocit",
            r"|thrombo[cz]yt|platelet|plaqueta|neutrophil|lymphoc?[yz]t|monoc?[yz]t|eosinophil|basophil",
            r"|creatinin|kreatinin|urea\b|harnstoff|uric acid|harnsaure|sodium|natrium|potassium|kalium",
            r"|chlorid|calcium|kalzium|magnesium|phosph|\biron\b|\beisen\b|ferritin|transferrin",
            r"|vitamin|folate|folic|folsaure|cobalamin|thyro|thyrox|triiodo|albumin|globulin|protein",
            r"|bilirubin|bilirrubin|phosphatase|amylase|lipase|insulin|cortisol|testosteron|estradiol",
            r"|progesteron|prolactin|homocystein|lipoprotein|apolipoprotein|fibrinogen|troponin",
            r"|zinc|zink|selen|copper|kupfer|culture|urine|urin\b|sediment|antibod|antikorper|antigen",
            r"|\b(?:wbc|rbc|mcv|mch|mchc|rdw|mpv|hb|hgb|hct|hba1c|a1c|bun|egfr|gfr|tsh|ft3|ft4|t3|t4",
            r"|alt|ast|ggt|gpt|got|sgpt|sgot|alp|ldh|ck|cpk|crp|hs-?crp|esr|bsg|psa|lh|fsh|dhea|dhea-?s",
            r"|shbg|ldl|hdl|vldl|apo|inr|pt|ptt|aptt|bnp|nt-?probnp|igg|igm|iga|ige|ana|hiv|hbsag|hcv)\b)",
        ))
        .unwrap()
    });
    re.is_match(&fold_diacritics(name))
}

// ---------------------------------------------------------------------------
// Name-side rules: glossary normalization
// ---------------------------------------------------------------------------

/// Literal source-language term substitutions, applied word-wise in order.
pub fn translate_terms(name: &str) -> String {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        compile_pairs(&[
            (r"(?i)\bleukozyten\b|\bleucocitos\b", "Leukocytes"),
            (r"(?i)\berythrozyten\b|\beritrocitos\b|\bhemat[ií]es\b", "Erythrocytes"),
            (r"(?i)\bthrombozyten\b|\bplaquetas\b", "Platelets"),
            (r"(?i)\bh[äa]moglobin\b|\bhemoglobina\b", "Hemoglobin"),
            (r"(?i)\bh[äa]matokrit\b|\bhematocrito\b", "Hematocrit"),
            (r"(?i)\bkreatinin\b|\bcreatinina\b", "Creatinine"),
            (r"(?i)\bharns[äa]ure\b|\b[áa]cido [úu]rico\b", "Uric Acid"),
            (r"(?i)\bharnstoff\b|\burea\b", "Urea"),
            (r"(?i)\bgesamt-?cholesterin\b|\bcolesterol total\b", "Total Cholesterol"),
            (r"(?i)\bcholesterin\b|\bcolesterol\b", "Cholesterol"),
            (r"(?i)\btriglyceride\b|\btriglic[ée]ridos\b", "Triglycerides"),
            (r"(?i)\bglukose\b|\bglucosa\b", "Glucose"),
            (r"(?i)\beisen\b|\bhierro\b", "Iron"),
            (r"(?i)\bkalium\b|\bpotasio\b", "Potassium"),
            (r"(?i)\bnatrium\b|\bsodio\b", "Sodium"),
            (r"(?i)\bkalzium\b|\bcalcio\b", "Calcium"),
            (r"(?i)\bfolsäure\b|\bfolsaure\b|\b[áa]cido f[óo]lico\b", "Folic Acid"),
            (r"(?i)\bbilirubin gesamt\b|\bbilirrubina total\b", "Total Bilirubin"),
            (r"(?i)\bbilirrubina\b", "Bilirubin"),
            (r"(?i)\bgesamteiweiß\b|\bgesamteiweiss\b|\bprote[íi]nas totales\b", "Total Protein"),
            (r"(?i)\bzink\b", "Zinc"),
            (r"(?i)\bkupfer\b|\bcobre\b", "Copper"),
        ])
    });
    rules
        .iter()
        .fold(name.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Canonical-name rules: the first pattern that matches the whole name maps
/// it to a fixed canonical string.
pub fn apply_canonical_rules(name: &str) -> Option<&'static str> {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        compile_pairs(&[
            (r"(?i)^(?:alt|gpt|sgpt|alat|alt/gpt|gpt/alt|alt \(sgpt\)|alt \(gpt\)|alanine (?:amino)?transferase(?: \((?:alt|sgpt)\))?|(?:alt|gpt|alat|sgpt)\s*\((?:alt|gpt|alat|sgpt)\))$", "ALT (SGPT)"),
            (r"(?i)^(?:ast|got|sgot|asat|ast/got|got/ast|ast \(sgot\)|ast \(got\)|aspartate (?:amino)?transferase(?: \((?:ast|sgot)\))?|(?:ast|got|asat|sgot)\s*\((?:ast|got|asat|sgot)\))$", "AST (SGOT)"),
            (r"(?i)^(?:hba1c|hb a1c|hba 1c|a1c|hemoglobin a1c|haemoglobin a1c|glycated h(?:a)?emoglobin|glycosylated h(?:a)?emoglobin|h(?:a)?emoglobin a1c \(hba1c\))$", "Hemoglobin A1c"),
            (r"(?i)^(?:ggt|gamma[- ]?gt|γ-?gt|gamma[- ]glutamyl ?transferase|gamma[- ]glutamyltransferase)$", "GGT"),
            (r"(?i)^(?:tsh|tsh basal|thyroid stimulating hormone|thyrotropin|tsh \(thyrotropin\))$", "TSH"),
            (r"(?i)^(?:glucose|blood glucose|fasting glucose|glucose,? fasting|fasting blood glucose|glucose \(fasting\))$", "Glucose"),
            (r"(?i)^(?:wbc|white blood cells?|white blood cell count|white cell count|leukocytes?|leucocytes?|leukocyte count)$", "Leukocytes"),
            (r"(?i)^(?:rbc|red blood cells?|red blood cell count|red cell count|erythrocytes?|erythrocyte count)$", "Erythrocytes"),
            (r"(?i)^(?:plt|platelets?|platelet count|thrombocytes?)$", "Platelets"),
            (r"(?i)^(?:hb|hgb|hemoglobin|haemoglobin)$", "Hemoglobin"),
            (r"(?i)^(?:hct|hkt|hematocrit|haematocrit)$", "Hematocrit"),
            (r"(?i)^(?:ldl|ldl-?c|ldl cholesterol|ldl-cholesterol|cholesterol,? ldl|ldl cholesterol calc)$", "LDL Cholesterol"),
            (r"(?i)^(?:hdl|hdl-?c|hdl cholesterol|hdl-cholesterol|cholesterol,? hdl)$", "HDL Cholesterol"),
            (r"(?i)^(?:cholesterol|total cholesterol|cholesterol,? total)$", "Total Cholesterol"),
            (r"(?i)^(?:tg|triglycerides?)$", "Triglycerides"),
            (r"(?i)^(?:crea|creatinine|creatinine,? serum)$", "Creatinine"),
            (r"(?i)^(?:crp|c-reactive protein|c reactive protein)$", "C-Reactive Protein"),
            (r"(?i)^(?:25-?\(?oh\)?[- ]?(?:vitamin )?d3?|25-?hydroxy-?vitamin d3?|25-?\(oh\)-?(?:vitamin )?d3?|vitamin d,? 25-?(?:oh|hydroxy)|vitamin d 25-?oh|25 oh vitamin d|vitamin d3 \(25-?oh\))$", "25-OH Vitamin D"),
        ])
    });
    rules
        .iter()
        .find(|(re, _)| re.is_match(name))
        .map(|(_, canonical)| *canonical)
}

/// Remove one trailing parenthetical qualifier recognized as a specimen or
/// method annotation. Returns `None` when there is nothing to strip.
pub fn strip_trailing_qualifier(name: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\s*[(\[]\s*(?:eb|gen\.?\s*\d+|[ivx]{1,4}|serum|plasma|s|p|edta|citrate|cit",
            r"|calc\.?|calculated|berechnet|ifcc|ngsp|dcct|venous|venos|capillary|kapillar",
            r"|whole blood|vollblut|fasting|nuchtern|nüchtern|hplc|immunoassay|enzymatic",
            r"|enzymatisch|photometric|photometrisch|heparin|li-?hep|urine|urin)\s*[)\]]\s*$",
        ))
        .unwrap()
    });
    let m = re.find(name)?;
    Some(name[..m.start()].trim_end().to_string())
}

const CATEGORY_HEADERS: &[&str] = &[
    "hematology", "haematology", "chemistry", "clinical chemistry", "blood count",
    "complete blood count", "cbc", "differential", "lipid panel", "lipids", "lipid profile",
    "thyroid", "thyroid panel", "liver function", "liver panel", "kidney function",
    "renal function", "electrolytes", "urinalysis", "hormones", "vitamins", "immunology",
    "serology", "coagulation", "metabolic panel", "basic metabolic panel",
    "comprehensive metabolic panel", "iron studies", "inflammation", "hamatologie",
    "klinische chemie", "blutbild", "kleines blutbild", "grosses blutbild", "differentialblutbild",
    "fettstoffwechsel", "leber", "niere", "schilddruse", "elektrolyte", "gerinnung",
    "hematologia", "bioquimica", "quimica clinica", "hemograma",
];

/// Section or category headings that are never analytes themselves.
pub fn is_category_header(name: &str) -> bool {
    CATEGORY_HEADERS.contains(&canonical_key(name).as_str())
}

const NON_ENGLISH_TOKENS: &[&str] = &[
    "leukozyten", "erythrozyten", "thrombozyten", "hamoglobin", "hamatokrit", "kreatinin",
    "harnsaure", "harnstoff", "cholesterin", "eisen", "kalium", "natrium", "kalzium", "gesamt",
    "nuchtern", "blut", "und", "der", "die", "das", "des", "im", "mit", "berechnet", "glukose",
    "glucosa", "colesterol", "trigliceridos", "hemoglobina", "plaquetas", "leucocitos",
    "hematies", "creatinina", "acido", "urico", "hierro", "sodio", "potasio", "calcio",
    "bilirrubina", "proteina", "proteinas", "totales", "del", "la", "el", "y", "en",
];

/// English/character-set check for canonical names: ASCII letters, digits
/// and a small punctuation set; no token from the non-English vocabulary.
pub fn is_english_name(name: &str) -> bool {
    let allowed = |c: char| c.is_ascii_alphanumeric() || " ()-/.,%+'#:&[]*^".contains(c);
    if name.trim().is_empty() || !name.chars().all(allowed) {
        return false;
    }
    if !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    !canonical_key(name)
        .split(' ')
        .any(|token| NON_ENGLISH_TOKENS.contains(&token))
}

/// Looser reject list used by the heuristic fallback classifier before it
/// promotes an unresolved name to a new canonical entry.
pub fn matches_fallback_reject(name: &str) -> bool {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = RE.get_or_init(|| {
        compile_all(&[
            r"(?i)\b(?:comment|note|remark|method|methode|sample|specimen|interpretation|reference|range|result|units?|date|time|page|report|patient|doctor|physician|laboratory|address|phone|fax|email|signature|approved|validated|collected|received|printed|order|request|see)\b",
            r"(?i)\b(?:ratio of|calculated from|estimated by|valid for|applies to|below|above|less than|greater than)\b",
            r"\d{3,}",
            r"[:;]",
            r"(?i)^(?:the|a|an|this|these|for|with|and|or)\b",
        ])
    });
    patterns.iter().any(|re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_tokens() {
        for unit in [
            "mg/dL", "mmol/L", "µmol/l", "μmol/L", "g/dL", "g/L", "%", "U/L", "IU/L", "mU/L",
            "mIU/L", "µIU/mL", "ng/mL", "pg/mL", "nmol/L", "fL", "pg", "10^9/L", "10^12/L",
            "10*9/l", "x10^9/L", "/nL", "/pL", "Gpt/l", "Tpt/l", "G/L", "mmol/mol", "mL/min/1.73m²",
            "mEq/L", "kU/l", "mm/h", "Mio/µl", "Tsd/µl",
        ] {
            assert!(is_unit_token(unit), "{} should be a unit", unit);
        }
        for word in ["Glucose", "6.1", "H", "Vitamin", "ratio", "D"] {
            assert!(!is_unit_token(word), "{} should not be a unit", word);
        }
    }

    #[test]
    fn test_contains_unit_token() {
        assert!(contains_unit_token("Glucose mg/dL"));
        assert!(contains_unit_token("Leukocytes (Gpt/l)"));
        assert!(!contains_unit_token("25-OH Vitamin D"));
    }

    #[test]
    fn test_qualitative_and_placeholder() {
        assert!(is_qualitative("Negative"));
        assert!(is_qualitative("nicht nachweisbar"));
        assert!(is_qualitative("Not Detected"));
        assert!(is_qualitative("++"));
        assert!(!is_qualitative("6.1"));

        assert!(is_placeholder_value("Pending"));
        assert!(is_placeholder_value("N/A"));
        assert!(is_placeholder_value("---"));
        assert!(is_placeholder_value("Cancelled"));
        assert!(!is_placeholder_value("Negative"));
    }

    #[test]
    fn test_admin_stoplist() {
        assert!(is_admin_stoplisted("Page"));
        assert!(is_admin_stoplisted("  TEL: "));
        assert!(is_admin_stoplisted("Reference Range"));
        assert!(!is_admin_stoplisted("Glucose"));
    }

    #[test]
    fn test_admin_patterns() {
        assert!(matches_admin_pattern("Tel 030 1234567"));
        assert!(matches_admin_pattern("info@lab.example"));
        assert!(matches_admin_pattern("Patient: Jane Doe"));
        assert!(matches_admin_pattern("Page 2 of 3"));
        assert!(matches_admin_pattern("Comment: sample hemolyzed"));
        assert!(matches_admin_pattern("Treatment should be considered if"));
        assert!(matches_admin_pattern("Hauptstr. 12"));
        assert!(matches_admin_pattern("05.03.2024"));
        assert!(!matches_admin_pattern("Glucose"));
        assert!(!matches_admin_pattern("Leukozyten (EB)"));
        assert!(!matches_admin_pattern("25-OH Vitamin D"));
    }

    #[test]
    fn test_analyte_vocabulary() {
        assert!(matches_analyte_vocabulary("Leukozyten (EB)"));
        assert!(matches_analyte_vocabulary("Hämoglobin"));
        assert!(matches_analyte_vocabulary("TSH"));
        assert!(matches_analyte_vocabulary("Ferritin"));
        assert!(matches_analyte_vocabulary("LDL Cholesterol"));
        assert!(!matches_analyte_vocabulary("Page"));
        assert!(!matches_analyte_vocabulary("Signature"));
        assert!(!matches_analyte_vocabulary("Mustermann, Max"));
    }

    #[test]
    fn test_translate_terms_keeps_qualifiers() {
        assert_eq!(translate_terms("Leukozyten (EB)"), "Leukocytes (EB)");
        assert_eq!(translate_terms("Hämoglobin"), "Hemoglobin");
        assert_eq!(translate_terms("Glucosa"), "Glucose");
        assert_eq!(translate_terms("Ferritin"), "Ferritin");
    }

    #[test]
    fn test_canonical_rules() {
        assert_eq!(apply_canonical_rules("SGPT"), Some("ALT (SGPT)"));
        assert_eq!(apply_canonical_rules("ALT (SGPT)"), Some("ALT (SGPT)"));
        assert_eq!(apply_canonical_rules("GPT"), Some("ALT (SGPT)"));
        for alt in ["GPT (ALT)", "ALAT (GPT)", "GPT (ALAT)", "ALT(GPT)"] {
            assert_eq!(apply_canonical_rules(alt), Some("ALT (SGPT)"), "{}", alt);
        }
        for ast in ["GOT (AST)", "ASAT (GOT)", "GOT (ASAT)", "AST (SGOT)"] {
            assert_eq!(apply_canonical_rules(ast), Some("AST (SGOT)"), "{}", ast);
        }
        assert_eq!(apply_canonical_rules("HbA1c"), Some("Hemoglobin A1c"));
        assert_eq!(apply_canonical_rules("Gamma-GT"), Some("GGT"));
        assert_eq!(apply_canonical_rules("WBC"), Some("Leukocytes"));
        assert_eq!(apply_canonical_rules("Hemoglobin"), Some("Hemoglobin"));
        assert_eq!(apply_canonical_rules("Ferritin"), None);
    }

    #[test]
    fn test_strip_trailing_qualifier() {
        assert_eq!(
            strip_trailing_qualifier("Leukocytes (EB)"),
            Some("Leukocytes".to_string())
        );
        assert_eq!(
            strip_trailing_qualifier("TSH (Gen 2)"),
            Some("TSH".to_string())
        );
        assert_eq!(
            strip_trailing_qualifier("Factor (VIII)"),
            Some("Factor".to_string())
        );
        assert_eq!(strip_trailing_qualifier("ALT (SGPT)"), None);
        assert_eq!(strip_trailing_qualifier("Glucose"), None);
    }

    #[test]
    fn test_category_headers() {
        assert!(is_category_header("HEMATOLOGY"));
        assert!(is_category_header("Klinische Chemie"));
        assert!(!is_category_header("Hemoglobin"));
    }

    #[test]
    fn test_english_check() {
        assert!(is_english_name("ALT (SGPT)"));
        assert!(is_english_name("25-OH Vitamin D"));
        assert!(!is_english_name("Hämoglobin"));
        assert!(!is_english_name("Kreatinin"));
        assert!(!is_english_name("Bilirubin gesamt"));
        assert!(!is_english_name("123"));
        assert!(!is_english_name(""));
    }

    #[test]
    fn test_fallback_reject() {
        assert!(matches_fallback_reject("Reference values for adults"));
        assert!(matches_fallback_reject("Method: photometric"));
        assert!(!matches_fallback_reject("Lipoprotein(a)"));
        assert!(!matches_fallback_reject("Ferritin"));
    }
}
