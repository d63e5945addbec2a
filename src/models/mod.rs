//! Data models for deals, run reports and marketplace lookups

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExtractionMiss;

/// A discounted product found at one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub store: String,
    pub title: String,
    pub current_price: String,
    pub original_price: String,
    pub discount_pct: u32,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(with = "minute_format")]
    pub date_found: DateTime<Utc>,
}

impl Deal {
    /// Stable fingerprint for a store listing.
    #[must_use]
    pub fn fingerprint(store: &str, url: &str) -> String {
        format!("{:x}", md5::compute(format!("{store}:{url}")))
    }

    /// `true` when the record satisfies the emitted-deal invariant: non-empty
    /// store, title and current price, and an absolute http(s) URL.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.store.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.current_price.trim().is_empty()
            && crate::extract::is_absolute_url(&self.url)
    }
}

/// Current time at minute resolution.
#[must_use]
pub fn captured_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

mod minute_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Counts of everything that went wrong (or was rejected) during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub soft_blocks: usize,
    pub hard_errors: usize,
    pub empty_pages: usize,
    pub missing_title: usize,
    pub missing_price: usize,
    pub missing_url: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    pub invalid_dropped: usize,
}

impl Diagnostics {
    pub fn record_miss(&mut self, miss: ExtractionMiss) {
        match miss {
            ExtractionMiss::Title => self.missing_title += 1,
            ExtractionMiss::CurrentPrice => self.missing_price += 1,
            ExtractionMiss::Url => self.missing_url += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.soft_blocks += other.soft_blocks;
        self.hard_errors += other.hard_errors;
        self.empty_pages += other.empty_pages;
        self.missing_title += other.missing_title;
        self.missing_price += other.missing_price;
        self.missing_url += other.missing_url;
        self.filtered_out += other.filtered_out;
        self.duplicates += other.duplicates;
        self.invalid_dropped += other.invalid_dropped;
    }

    /// Products that were found on a page but could not be turned into a deal.
    #[must_use]
    pub fn extraction_misses(&self) -> usize {
        self.missing_title + self.missing_price + self.missing_url
    }
}

/// Outcome of scraping one store
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreReport {
    pub store: String,
    pub pages_attempted: usize,
    pub pages_ok: usize,
    pub pages_soft_blocked: usize,
    pub pages_failed: usize,
    pub deals: usize,
    pub diagnostics: Diagnostics,
}

impl StoreReport {
    #[must_use]
    pub fn new(store: &str) -> Self {
        Self {
            store: store.to_string(),
            ..Self::default()
        }
    }

    /// Every page the store was asked for faulted.
    #[must_use]
    pub fn failed_outright(&self) -> bool {
        self.pages_attempted > 0 && self.pages_ok == 0
    }
}

/// Result of one orchestrated scrape across a category
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub category: String,
    pub deals: Vec<Deal>,
    pub stores: Vec<StoreReport>,
    pub failed_stores: usize,
    pub failed_pages: usize,
    /// Deals aggregated before any category-wide filter ran.
    pub deals_before_filter: usize,
    pub diagnostics: Diagnostics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Progress notification emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    /// Store about to be scraped, or `"Complete"` on the final call.
    pub store: String,
    pub category: String,
}

impl Progress {
    pub const COMPLETE: &'static str = "Complete";

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current == self.total && self.store == Self::COMPLETE
    }
}

/// One ranked listing from the secondary marketplace search page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmazonSearchResult {
    pub title: String,
    pub price: f64,
    /// 1-based position on the result page.
    pub position: usize,
}

/// Why a marketplace lookup was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Captcha,
    RateLimited { status: u16 },
}

/// Outcome of a marketplace lookup; zero matches and a refused lookup are
/// distinct variants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LookupOutcome {
    Found(Vec<AmazonSearchResult>),
    NoResults,
    Blocked(BlockReason),
    Failed(String),
}

impl LookupOutcome {
    #[must_use]
    pub fn results(&self) -> Option<&[AmazonSearchResult]> {
        match self {
            Self::Found(results) => Some(results),
            _ => None,
        }
    }
}

/// Resale profit estimate for one deal against marketplace prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitAnalysis {
    pub deal_price: f64,
    pub marketplace_price: f64,
    pub marketplace_title: String,
    pub gross_profit: f64,
    pub profit_margin: f64,
    pub estimated_fees: f64,
    pub net_profit: f64,
    pub net_margin: f64,
    pub profitable: bool,
}

/// One entry of a batch marketplace check
#[derive(Debug, Clone, Serialize)]
pub struct BatchLookup {
    pub deal: Deal,
    pub outcome: LookupOutcome,
    pub attempts: u32,
    pub profit: Option<ProfitAnalysis>,
}

/// A product trending on social media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingProduct {
    pub name: String,
    #[serde(default)]
    pub store: Option<String>,
    pub total_views: u64,
    pub mention_count: u32,
    pub avg_engagement: f64,
    pub trending_score: f64,
}

/// A deal whose title matches a trending product
#[derive(Debug, Clone, Serialize)]
pub struct TrendMatch {
    pub deal: Deal,
    pub trending_score: f64,
    pub views: u64,
    pub mentions: u32,
    pub engagement_rate: f64,
}
