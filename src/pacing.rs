//! Randomized wall-clock delays between requests.

use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// Uniform delay range, sampled fresh for every pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    pub const ZERO: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Range in whole seconds, for built-in defaults.
    #[must_use]
    pub const fn seconds(min: u64, max: u64) -> Self {
        assert!(min <= max, "delay range minimum exceeds maximum");
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] when `min_ms > max_ms`.
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Result<Self, ConfigError> {
        if min_ms > max_ms {
            return Err(ConfigError::InvalidEnvVar {
                var: "delay range".to_string(),
                reason: format!("minimum {min_ms}ms exceeds maximum {max_ms}ms"),
            });
        }
        Ok(Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        })
    }

    /// Parses `"MIN-MAX"` or a single `"N"` (milliseconds).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] naming `var` on malformed input.
    pub fn parse(var: &str, raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason,
        };
        let number = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| invalid(format!("\"{raw}\": {e}")))
        };

        let (min, max) = match raw.split_once('-') {
            Some((min, max)) => (number(min)?, number(max)?),
            None => {
                let single = number(raw)?;
                (single, single)
            }
        };

        Self::from_millis(min, max).map_err(|_| invalid(format!("minimum {min}ms exceeds maximum {max}ms")))
    }

    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws one delay from the range.
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Sleeps for a sampled delay scaled by `factor`.
    pub async fn pause_scaled(&self, factor: u32) {
        if self.is_zero() || factor == 0 {
            return;
        }
        let delay = self.sample().saturating_mul(factor);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "pausing");
        tokio::time::sleep(delay).await;
    }

    /// Sleeps for a sampled delay.
    pub async fn pause(&self) {
        self.pause_scaled(1).await;
    }
}

/// Delays used by the store scraper and orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Between successive pages of one store
    pub page: DelayRange,
    /// Between stores; longer than `page`
    pub store: DelayRange,
}

impl Pacing {
    /// No delays at all; for tests and local fixtures.
    #[must_use]
    pub fn none() -> Self {
        Self {
            page: DelayRange::ZERO,
            store: DelayRange::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page: DelayRange::seconds(1, 2),
            store: DelayRange::seconds(2, 5),
        }
    }
}

/// Delays used by the marketplace lookup, which is far more sensitive to
/// request rate than store listings are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPacing {
    /// Before every search request
    pub human: DelayRange,
    /// Before a retry; multiplied by the attempt number
    pub retry: DelayRange,
    /// Between items of a batch
    pub item: DelayRange,
}

impl LookupPacing {
    #[must_use]
    pub fn none() -> Self {
        Self {
            human: DelayRange::ZERO,
            retry: DelayRange::ZERO,
            item: DelayRange::ZERO,
        }
    }
}

impl Default for LookupPacing {
    fn default() -> Self {
        Self {
            human: DelayRange::seconds(2, 5),
            retry: DelayRange::seconds(10, 20),
            item: DelayRange::seconds(10, 30),
        }
    }
}
