//! Title cleanup for listing noise that leaks into extracted product names.

use std::sync::LazyLock;

use regex::Regex;

static NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)average customer rating.*",
        r"(?i)\d+ reviews.*",
        r"(?i)\[\d+ out of \d+ stars\].*",
        r"(?i)this item is on sale.*",
        r"\$\d+\.\d+.*",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("title noise pattern is valid"))
    .collect()
});

static GENDER_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(men's|women's)\b.*").expect("gender pattern is valid"));

/// Strips rating, review, sale-banner and price text from a product title,
/// and drops whatever follows a "Men's"/"Women's" qualifier.
///
/// Returns the input (trimmed) when cleaning would leave nothing.
#[must_use]
pub fn clean_title(title: &str) -> String {
    let mut cleaned = title.to_string();
    for pattern in NOISE.iter() {
        cleaned = pattern.replace(&cleaned, "").trim().to_string();
    }
    cleaned = GENDER_TAIL.replace(&cleaned, "$1").trim().to_string();

    if cleaned.is_empty() {
        title.trim().to_string()
    } else {
        cleaned
    }
}
