//! Seller-name canonicalisation for accent- and case-insensitive matching.

use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Letters that mark-stripping alone does not fold the way operators type
/// them. Keys are stored decomposed because the table runs after NFKD.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("đ", "dj"),
    ("dž", "dz"),
    ("č", "c"),
    ("ć", "c"),
    ("š", "s"),
    ("ž", "z"),
];

static DECOMPOSED_SUBSTITUTIONS: Lazy<Vec<(String, &'static str)>> = Lazy::new(|| {
    SUBSTITUTIONS
        .iter()
        .map(|(from, to)| (from.nfkd().collect::<String>(), *to))
        .collect()
});

/// "  Ivan   PETROVIĆ " → "ivan petrovic"
pub fn normalize(raw: &str) -> String {
    let mut s: String = raw.trim().nfkd().collect::<String>().to_lowercase();

    for (from, to) in DECOMPOSED_SUBSTITUTIONS.iter() {
        if s.contains(from.as_str()) {
            s = s.replace(from.as_str(), to);
        }
    }

    let stripped: String = s.chars().filter(|c| !is_combining_mark(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize` over an optional name; `None` becomes "".
pub fn normalize_opt(raw: Option<&str>) -> String {
    raw.map(normalize).unwrap_or_default()
}
