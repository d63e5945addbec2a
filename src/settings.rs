//! Runtime settings read from `DEAL_FINDER_*` environment variables.

use std::env::VarError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::amazon::{DEFAULT_BASE_URL, LookupConfig};
use crate::error::ConfigError;
use crate::extract::is_absolute_url;
use crate::fetch::DEFAULT_USER_AGENT;
use crate::pacing::{DelayRange, LookupPacing, Pacing};
use crate::registry::StoreRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log_level: String,
    /// Catalog file replacing the built-in store list
    pub stores_path: Option<PathBuf>,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub pacing: Pacing,
    pub lookup: LookupConfig,
}

impl Settings {
    /// Loads `.env` (if present) and then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] for any value that does not parse.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Reads the process environment without touching `.env` files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] for any value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        build_settings(|key| std::env::var(key))
    }

    /// The store catalog: `override_path` if given, else the configured
    /// catalog file, else the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the catalog cannot be read or fails
    /// validation.
    pub fn registry(&self, override_path: Option<&Path>) -> Result<StoreRegistry, ConfigError> {
        match override_path.or(self.stores_path.as_deref()) {
            Some(path) => StoreRegistry::load(path),
            None => StoreRegistry::builtin(),
        }
    }
}

fn build_settings<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_secs = |var: &str, default: &str| -> Result<Duration, ConfigError> {
        match parse_u64(var, default)? {
            0 => Err(invalid(var, "timeout must be at least one second".to_string())),
            secs => Ok(Duration::from_secs(secs)),
        }
    };

    let parse_delay = |var: &str, default: &str| -> Result<DelayRange, ConfigError> {
        DelayRange::parse(var, &or_default(var, default))
    };

    let log_level = or_default("DEAL_FINDER_LOG_LEVEL", "info");
    let stores_path = lookup("DEAL_FINDER_STORES_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    let user_agent = or_default("DEAL_FINDER_USER_AGENT", DEFAULT_USER_AGENT);
    let request_timeout = parse_secs("DEAL_FINDER_REQUEST_TIMEOUT_SECS", "30")?;

    let pacing = Pacing {
        page: parse_delay("DEAL_FINDER_PAGE_DELAY_MS", "1000-2000")?,
        store: parse_delay("DEAL_FINDER_STORE_DELAY_MS", "2000-5000")?,
    };
    if pacing.store.max() < pacing.page.min() {
        return Err(invalid(
            "DEAL_FINDER_STORE_DELAY_MS",
            format!(
                "store delay (at most {}ms) must not be shorter than the page delay (at least {}ms)",
                pacing.store.max().as_millis(),
                pacing.page.min().as_millis()
            ),
        ));
    }

    let base_url = or_default("DEAL_FINDER_LOOKUP_BASE_URL", DEFAULT_BASE_URL);
    if !is_absolute_url(&base_url) {
        return Err(invalid(
            "DEAL_FINDER_LOOKUP_BASE_URL",
            format!("\"{base_url}\" is not an absolute http(s) URL"),
        ));
    }

    let max_attempts = parse_u64("DEAL_FINDER_LOOKUP_MAX_ATTEMPTS", "3")?;
    let max_attempts = u32::try_from(max_attempts)
        .ok()
        .filter(|attempts| *attempts > 0)
        .ok_or_else(|| {
            invalid(
                "DEAL_FINDER_LOOKUP_MAX_ATTEMPTS",
                format!("{max_attempts} is not a usable attempt count"),
            )
        })?;
    let max_items = parse_u64("DEAL_FINDER_LOOKUP_MAX_ITEMS", "5")?;
    let max_items = usize::try_from(max_items)
        .map_err(|e| invalid("DEAL_FINDER_LOOKUP_MAX_ITEMS", e.to_string()))?;

    let lookup = LookupConfig {
        base_url,
        timeout: parse_secs("DEAL_FINDER_LOOKUP_TIMEOUT_SECS", "10")?,
        pacing: LookupPacing {
            human: parse_delay("DEAL_FINDER_LOOKUP_DELAY_MS", "2000-5000")?,
            retry: parse_delay("DEAL_FINDER_LOOKUP_RETRY_DELAY_MS", "10000-20000")?,
            item: parse_delay("DEAL_FINDER_LOOKUP_ITEM_DELAY_MS", "10000-30000")?,
        },
        max_attempts,
        max_items,
    };

    Ok(Settings {
        log_level,
        stores_path,
        user_agent,
        request_timeout,
        pacing,
        lookup,
    })
}
