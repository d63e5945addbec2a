//! Background scrape jobs.
//!
//! A scrape is long-running and must never overlap with another one, so the
//! caller holds a [`SingleFlight`] guard and hands the acquired token to the
//! spawned task. The task's `JoinHandle` carries the report back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::info;

use crate::deal_finder::{DealFinder, ProgressSink, ScrapeRequest};
use crate::models::ScrapeReport;
use crate::traits::PageFetcher;

/// Allows at most one job at a time
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

/// Proof that a job holds the [`SingleFlight`] guard; releases it on drop
#[derive(Debug)]
pub struct FlightToken {
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the guard, or returns `None` while another job holds it.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FlightToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightToken {
                running: Arc::clone(&self.running),
            })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightToken {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs one orchestrated scrape on its own task.
///
/// `token` is held until the scrape finishes, even if the handle is dropped.
pub fn spawn_scrape<F>(
    finder: Arc<DealFinder<F>>,
    request: ScrapeRequest,
    progress: Option<Arc<dyn ProgressSink>>,
    token: FlightToken,
) -> JoinHandle<ScrapeReport>
where
    F: PageFetcher + 'static,
{
    tokio::spawn(async move {
        let _token = token;
        let report = finder.run(&request, progress.as_deref()).await;
        info!(
            "Scrape job for \"{}\" finished with {} deals",
            request.category,
            report.deals.len()
        );
        report
    })
}
