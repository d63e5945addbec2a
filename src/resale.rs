//! Resale analysis over scraped deals: marketplace profit estimates and
//! matching against trending products.

use crate::discount::parse_price;
use crate::models::{AmazonSearchResult, Deal, ProfitAnalysis, TrendMatch, TrendingProduct};

/// Share of the sale price the marketplace keeps.
pub const MARKETPLACE_FEE_RATE: f64 = 0.15;

/// Net profit a deal must beat to count as profitable, in dollars.
pub const PROFIT_THRESHOLD: f64 = 5.0;

/// Estimates the profit of buying `deal` and reselling at the cheapest
/// marketplace price in `results`.
///
/// Returns `None` when there are no results or the deal price cannot be
/// parsed.
#[must_use]
pub fn estimate_profit(deal: &Deal, results: &[AmazonSearchResult]) -> Option<ProfitAnalysis> {
    let deal_price = parse_price(&deal.current_price)?;
    let lowest = results.iter().min_by(|a, b| a.price.total_cmp(&b.price))?;

    let gross_profit = lowest.price - deal_price;
    let estimated_fees = lowest.price * MARKETPLACE_FEE_RATE;
    let net_profit = gross_profit - estimated_fees;
    let margin = |profit: f64| {
        if deal_price > 0.0 {
            profit / deal_price * 100.0
        } else {
            0.0
        }
    };

    Some(ProfitAnalysis {
        deal_price,
        marketplace_price: lowest.price,
        marketplace_title: lowest.title.clone(),
        gross_profit: round2(gross_profit),
        profit_margin: round2(margin(gross_profit)),
        estimated_fees: round2(estimated_fees),
        net_profit: round2(net_profit),
        net_margin: round2(margin(net_profit)),
        profitable: net_profit > PROFIT_THRESHOLD,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Deals whose titles contain at least half of the trending product's name
/// words (case-insensitive substring match).
#[must_use]
pub fn find_matching_deals(trending: &TrendingProduct, deals: &[Deal]) -> Vec<TrendMatch> {
    let keywords: Vec<String> = trending
        .name
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    deals
        .iter()
        .filter(|deal| {
            let title = deal.title.to_lowercase();
            let hits = keywords.iter().filter(|k| title.contains(k.as_str())).count();
            hits * 2 >= keywords.len()
        })
        .map(|deal| TrendMatch {
            deal: deal.clone(),
            trending_score: trending.trending_score,
            views: trending.total_views,
            mentions: trending.mention_count,
            engagement_rate: trending.avg_engagement,
        })
        .collect()
}
