//! Canned-response fetcher and HTML builders for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::fetch::{FetchOutcome, HardError};
use crate::traits::PageFetcher;

/// Serves fixed outcomes by exact URL; anything unknown is a 404.
#[derive(Default)]
pub struct CannedFetcher {
    outcomes: HashMap<String, FetchOutcome>,
    requested: Mutex<Vec<String>>,
    headers_seen: Mutex<Vec<HeaderMap>>,
}

impl CannedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.outcome(
            url,
            FetchOutcome::Success {
                body: html.to_string(),
            },
        )
    }

    pub fn outcome(mut self, url: &str, outcome: FetchOutcome) -> Self {
        self.outcomes.insert(url.to_string(), outcome);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn headers_seen(&self) -> Vec<HeaderMap> {
        self.headers_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for CannedFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> FetchOutcome {
        self.requested.lock().unwrap().push(url.to_string());
        self.headers_seen.lock().unwrap().push(headers.clone());
        self.outcomes
            .get(url)
            .cloned()
            .unwrap_or(FetchOutcome::HardError(HardError::Status(404)))
    }
}

/// One product card using the `.card/.title/.now/.was/a.link` test layout.
pub fn card(title: &str, now: &str, was: Option<&str>, href: &str) -> String {
    let was = was
        .map(|price| format!(r#"<span class="was">{price}</span>"#))
        .unwrap_or_default();
    format!(
        r#"<div class="card"><h3 class="title">{title}</h3><span class="now">{now}</span>{was}<a class="link" href="{href}">View</a></div>"#
    )
}

/// Wraps cards in a full listing document.
pub fn listing<S: AsRef<str>>(cards: &[S]) -> String {
    let body: String = cards.iter().map(AsRef::as_ref).collect();
    format!("<html><body><main>{body}</main></body></html>")
}
