//! Retail deal discovery.
//!
//! Scrapes configured store listings for discounted products, normalizes them
//! into [`Deal`] records and, optionally, checks a secondary marketplace for
//! resale opportunities.

pub mod amazon;
pub mod deal_finder;
pub mod discount;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod filters;
pub mod job;
pub mod models;
pub mod normalize;
pub mod pacing;
pub mod registry;
pub mod resale;
pub mod scraper;
pub mod settings;
pub mod traits;

#[cfg(test)]
mod testing;

pub use amazon::{LookupConfig, MarketplaceLookup};
pub use deal_finder::{DealFinder, ProgressSink, ScrapeRequest};
pub use error::{ConfigError, ExtractionMiss, FetchError, SelectorError};
pub use fetch::{FetchOutcome, HttpFetcher};
pub use job::{FlightToken, SingleFlight, spawn_scrape};
pub use models::{
    AmazonSearchResult, BatchLookup, BlockReason, Deal, Diagnostics, LookupOutcome, ProfitAnalysis,
    Progress, ScrapeReport, StoreReport, TrendMatch, TrendingProduct,
};
pub use pacing::{DelayRange, LookupPacing, Pacing};
pub use registry::StoreRegistry;
pub use settings::Settings;
pub use traits::{PageFetcher, StoreConfig};
