//! Price parsing and discount percentage calculation.
//!
//! Both functions are pure. Anything that does not look like a price
//! degrades to "no value" rather than an error.

use std::sync::LazyLock;

use regex::Regex;

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)?|\.\d+").expect("decimal pattern is valid")
});

/// Extracts the first decimal number embedded in a price display string.
///
/// Thousands separators are removed first, so `"$1,234.56"` yields `1234.56`.
/// Returns `None` when the text contains no digits.
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let found = DECIMAL.find(&cleaned)?;
    found.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Percentage saved going from `original` to `current`, rounded to the
/// nearest integer with exact halves going to the even integer.
///
/// Returns 0 when either price is unparseable or when `original` is not
/// strictly greater than `current`.
#[must_use]
pub fn calculate_discount(original: &str, current: &str) -> u32 {
    let (Some(original), Some(current)) = (parse_price(original), parse_price(current)) else {
        return 0;
    };

    if original <= current {
        return 0;
    }

    // halves go to the even neighbour: 30.5 -> 30, 31.5 -> 32
    let pct = ((original - current) / original * 100.0).round_ties_even();
    // original > current >= 0 keeps this within 0..=100
    pct.clamp(0.0, 100.0) as u32
}
