use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Clean up text pulled from a page's text layer.
///
/// Applies NFC normalization, ligature expansion, maps the various Unicode
/// spaces onto ASCII space, drops replacement and control characters and
/// trims trailing whitespace per line. Runs of spaces are preserved because
/// they carry the column layout.
pub fn cleanup_text(text: &str) -> String {
    let mut result: String = text.nfc().collect();

    let ligatures = [
        ("\u{FB00}", "ff"),
        ("\u{FB01}", "fi"),
        ("\u{FB02}", "fl"),
        ("\u{FB03}", "ffi"),
        ("\u{FB04}", "ffl"),
    ];
    for (lig, replacement) in &ligatures {
        result = result.replace(lig, replacement);
    }

    result = result
        .chars()
        .filter_map(|c| match c {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{2009}' | '\t' => Some(' '),
            '\u{FFFD}' | '\u{00AD}' => None,
            '\n' => Some('\n'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    static RE_TRAILING: OnceLock<Regex> = OnceLock::new();
    let re_trailing = RE_TRAILING.get_or_init(|| Regex::new(r"(?m)[ ]+$").unwrap());
    re_trailing.replace_all(&result, "").into_owned()
}
