//! Deal filters.
//!
//! Two stages: a light per-store filter right after extraction, and a heavier
//! category-wide filter over the aggregate. They are deliberately separate and
//! use different thresholds.

use crate::discount::parse_price;
use crate::models::Deal;
use crate::traits::StoreFilters;

impl StoreFilters {
    /// `true` if `deal` passes the minimum discount and keyword checks.
    #[must_use]
    pub fn accepts(&self, deal: &Deal) -> bool {
        if let Some(min) = self.min_discount
            && deal.discount_pct < min
        {
            return false;
        }
        self.keywords.is_empty() || title_contains_any(&deal.title, &self.keywords)
    }
}

/// Keyword-and-threshold heuristic picking deals worth resale analysis
#[derive(Debug, Clone, PartialEq)]
pub struct HighValueFilter {
    pub min_discount: u32,
    pub min_original_price: f64,
    pub keywords: Vec<String>,
}

const HIGH_VALUE_BEAUTY_KEYWORDS: &[&str] = &[
    "mascara",
    "serum",
    "cream",
    "foundation",
    "palette",
    "brush",
    "volumizing",
    "anti-aging",
    "skincare",
    "treatment",
    "set",
    "collection",
    "kit",
    "fragrance",
    "perfume",
    "device",
    "tool",
];

impl HighValueFilter {
    /// The beauty category filter: 40%+ off, $20+ original price, and a
    /// high-value product keyword in the title.
    #[must_use]
    pub fn beauty() -> Self {
        Self {
            min_discount: 40,
            min_original_price: 20.0,
            keywords: HIGH_VALUE_BEAUTY_KEYWORDS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Category-wide filter for `category`, if it has one.
    #[must_use]
    pub fn for_category(category: &str) -> Option<Self> {
        category
            .trim()
            .eq_ignore_ascii_case("beauty")
            .then(Self::beauty)
    }

    #[must_use]
    pub fn accepts(&self, deal: &Deal) -> bool {
        let Some(original) = parse_price(&deal.original_price) else {
            return false;
        };
        deal.discount_pct >= self.min_discount
            && original >= self.min_original_price
            && title_contains_any(&deal.title, &self.keywords)
    }

    /// Keeps only accepted deals, preserving order.
    #[must_use]
    pub fn apply(&self, deals: Vec<Deal>) -> Vec<Deal> {
        deals.into_iter().filter(|deal| self.accepts(deal)).collect()
    }
}

fn title_contains_any(title: &str, keywords: &[String]) -> bool {
    let title = title.to_lowercase();
    keywords
        .iter()
        .any(|keyword| title.contains(&keyword.to_lowercase()))
}
