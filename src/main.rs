use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deal_finder::registry::ALL_CATEGORIES;
use deal_finder::resale::find_matching_deals;
use deal_finder::{
    Deal, DealFinder, HttpFetcher, LookupOutcome, MarketplaceLookup, Progress, ScrapeReport,
    ScrapeRequest, Settings, SingleFlight, StoreRegistry, TrendingProduct, spawn_scrape,
};

#[derive(Debug, Parser)]
#[command(name = "deal-finder")]
#[command(about = "Find discounted products across retail stores")]
struct Cli {
    /// Store catalog YAML to use instead of the built-in one
    #[arg(long, global = true)]
    stores: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape every store in a category
    Scrape {
        #[arg(long, default_value = ALL_CATEGORIES)]
        category: String,
        /// Pages per multi-page store
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Write the deals as JSON
        #[arg(long)]
        output: Option<PathBuf>,
        /// Deals to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Scrape a single store by name
    Store {
        name: String,
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// List catalog stores
    Stores {
        #[arg(long, default_value = ALL_CATEGORIES)]
        category: String,
    },
    /// Look up one product on the marketplace
    Lookup { title: String },
    /// Check the highest-discount deals from a snapshot for resale profit
    Resale {
        /// Deals JSON written by `scrape --output`
        #[arg(long)]
        input: PathBuf,
        /// Deals to check
        #[arg(long)]
        top: Option<usize>,
    },
    /// Match trending products against a deals snapshot
    Trends {
        /// Trending products JSON
        #[arg(long)]
        trends: PathBuf,
        #[arg(long)]
        input: PathBuf,
    },
    /// Scrape on a cron schedule until interrupted
    Watch {
        #[arg(long, default_value = "0 0 */6 * * *")]
        cron: String,
        #[arg(long, default_value = ALL_CATEGORIES)]
        category: String,
        #[arg(long, default_value_t = 1)]
        pages: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("invalid configuration")?;
    init_tracing(&settings.log_level);

    let cli = Cli::parse();
    match cli.command {
        Commands::Scrape {
            category,
            pages,
            output,
            top,
        } => {
            let finder = build_finder(&settings, cli.stores.as_deref())?;
            let sink = |p: &Progress| {
                if !p.is_complete() {
                    info!("[{}/{}] Scraping {}", p.current + 1, p.total, p.store);
                }
            };
            let report = finder
                .run(&ScrapeRequest::new(&category, pages), Some(&sink))
                .await;
            print_summary(&report, top);
            if let Some(path) = output {
                write_deals(&path, &report.deals)?;
            }
        }
        Commands::Store { name, pages } => {
            let finder = build_finder(&settings, cli.stores.as_deref())?;
            let Some(outcome) = finder.scrape_store(&name, pages).await else {
                bail!("no store named \"{name}\" in the catalog");
            };
            println!(
                "{}: {} deals from {} of {} page(s)",
                outcome.report.store,
                outcome.deals.len(),
                outcome.report.pages_ok,
                outcome.report.pages_attempted
            );
            print_deals(&outcome.deals, outcome.deals.len());
        }
        Commands::Stores { category } => {
            let registry = settings.registry(cli.stores.as_deref())?;
            if !registry.has_category(&category) {
                let known: Vec<_> = registry.category_names().collect();
                warn!(
                    "Unknown category \"{}\" (known: {})",
                    category,
                    known.join(", ")
                );
            }
            for store in registry.stores_for(&category) {
                println!(
                    "{:<24} {:<10} {}",
                    store.name,
                    store.category.as_deref().unwrap_or("-"),
                    store.base_url
                );
            }
        }
        Commands::Lookup { title } => {
            let lookup = MarketplaceLookup::http(settings.lookup.clone())?;
            match lookup.search(&title).await {
                LookupOutcome::Found(results) => {
                    for result in results {
                        println!("{}. ${:.2}  {}", result.position, result.price, result.title);
                    }
                }
                LookupOutcome::NoResults => println!("No results for \"{title}\""),
                LookupOutcome::Blocked(reason) => println!("Lookup blocked: {reason:?}"),
                LookupOutcome::Failed(reason) => println!("Lookup failed: {reason}"),
            }
        }
        Commands::Resale { input, top } => {
            let mut deals = read_deals(&input)?;
            deals.sort_by(|a, b| b.discount_pct.cmp(&a.discount_pct));

            let mut config = settings.lookup.clone();
            if let Some(top) = top {
                config.max_items = top;
            }
            let lookup = MarketplaceLookup::http(config)?;
            let checked = lookup.batch_check(&deals).await;

            let profitable: Vec<_> = checked
                .iter()
                .filter_map(|entry| entry.profit.as_ref().map(|p| (entry, p)))
                .filter(|(_, profit)| profit.profitable)
                .collect();
            println!(
                "{} of {} checked deals look profitable",
                profitable.len(),
                checked.len()
            );
            for (entry, profit) in profitable {
                println!(
                    "  {} ({}): buy ${:.2}, sells ${:.2}, net ${:.2} ({:.1}%)",
                    entry.deal.title,
                    entry.deal.store,
                    profit.deal_price,
                    profit.marketplace_price,
                    profit.net_profit,
                    profit.net_margin
                );
            }
        }
        Commands::Trends { trends, input } => {
            let deals = read_deals(&input)?;
            let content = std::fs::read_to_string(&trends)
                .with_context(|| format!("failed to read {}", trends.display()))?;
            let trending: Vec<TrendingProduct> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", trends.display()))?;

            for product in &trending {
                let matches = find_matching_deals(product, &deals);
                println!(
                    "{} (score {:.1}): {} matching deal(s)",
                    product.name,
                    product.trending_score,
                    matches.len()
                );
                for m in matches {
                    println!(
                        "  {} - {} at {} ({}% off)",
                        m.deal.title, m.deal.current_price, m.deal.store, m.deal.discount_pct
                    );
                }
            }
        }
        Commands::Watch {
            cron,
            category,
            pages,
            output,
        } => {
            let finder = Arc::new(build_finder(&settings, cli.stores.as_deref())?);
            watch(finder, &cron, ScrapeRequest::new(&category, pages), output).await?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_finder(settings: &Settings, stores: Option<&Path>) -> Result<DealFinder<HttpFetcher>> {
    let registry: StoreRegistry = settings.registry(stores)?;
    let fetcher = HttpFetcher::new(settings.request_timeout, &settings.user_agent)?;
    Ok(DealFinder::new(Arc::new(registry), fetcher, settings.pacing))
}

async fn watch(
    finder: Arc<DealFinder<HttpFetcher>>,
    cron: &str,
    request: ScrapeRequest,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Starting deal watch for \"{}\"", request.category);
    let flight = SingleFlight::new();

    // Run once immediately
    run_guarded(&finder, &flight, &request, output.as_deref()).await;

    let mut sched = JobScheduler::new().await?;

    let job_finder = Arc::clone(&finder);
    let job_flight = flight.clone();
    sched
        .add(Job::new_async(cron, move |_uuid, _l| {
            let finder = Arc::clone(&job_finder);
            let flight = job_flight.clone();
            let request = request.clone();
            let output = output.clone();
            Box::pin(async move {
                run_guarded(&finder, &flight, &request, output.as_deref()).await;
            })
        })?)
        .await?;

    info!("Scheduler started ({})", cron);
    sched.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    sched.shutdown().await?;
    Ok(())
}

async fn run_guarded(
    finder: &Arc<DealFinder<HttpFetcher>>,
    flight: &SingleFlight,
    request: &ScrapeRequest,
    output: Option<&Path>,
) {
    let Some(token) = flight.try_acquire() else {
        warn!("Previous scrape still running, skipping this run");
        return;
    };

    match spawn_scrape(Arc::clone(finder), request.clone(), None, token).await {
        Ok(report) => {
            print_summary(&report, 5);
            if let Some(path) = output
                && let Err(e) = write_deals(path, &report.deals)
            {
                error!("Error saving deals: {:#}", e);
            }
        }
        Err(e) => error!("Scrape job failed: {}", e),
    }
}

fn print_summary(report: &ScrapeReport, top: usize) {
    println!(
        "Found {} deals, {} store(s) had issues ({} page(s) failed)",
        report.deals.len(),
        report.failed_stores,
        report.failed_pages
    );
    let diagnostics = &report.diagnostics;
    if diagnostics.extraction_misses() > 0 || diagnostics.invalid_dropped > 0 {
        info!(
            "Skipped {} product(s) with missing fields, dropped {} invalid",
            diagnostics.extraction_misses(),
            diagnostics.invalid_dropped
        );
    }

    let mut ranked: Vec<&Deal> = report.deals.iter().collect();
    ranked.sort_by(|a, b| b.discount_pct.cmp(&a.discount_pct));
    for deal in ranked.into_iter().take(top) {
        print_deal(deal);
    }
}

fn print_deals(deals: &[Deal], top: usize) {
    for deal in deals.iter().take(top) {
        print_deal(deal);
    }
}

fn print_deal(deal: &Deal) {
    println!(
        "  {:>3}% off  {} -> {}  {} [{}]",
        deal.discount_pct, deal.original_price, deal.current_price, deal.title, deal.store
    );
}

fn read_deals(path: &Path) -> Result<Vec<Deal>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_deals(path: &Path, deals: &[Deal]) -> Result<()> {
    let json = serde_json::to_string_pretty(deals)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!("Saved {} deals to {}", deals.len(), path.display());
    Ok(())
}
