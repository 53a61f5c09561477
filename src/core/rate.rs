//! Rate snapshot model and fetching abstraction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BestOption {
    Official,
    Parallel,
}

impl Display for BestOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                BestOption::Official => "BCV",
                BestOption::Parallel => "Binance",
            }
        )
    }
}

/// One observation of the official and parallel-market rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Local currency per USD, official.
    pub official_usd: f64,
    /// Local currency per EUR, official.
    pub official_eur: f64,
    /// Local currency per USD, parallel market.
    pub parallel_usd: f64,
    pub observed_at: DateTime<Utc>,
    /// Indicator supplied by the backend, authoritative when present.
    pub best_option: Option<BestOption>,
}

impl RateSnapshot {
    /// Checks that every rate is a positive finite number.
    pub fn validate(&self) -> Result<(), FetchError> {
        for (name, value) in [
            ("official_usd", self.official_usd),
            ("official_eur", self.official_eur),
            ("parallel_usd", self.parallel_usd),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FetchError::Malformed(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Cloneable so one shared fetch result can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request error: {0}")]
    Transport(String),

    #[error("HTTP error: {status} for market: {market}")]
    Status { status: u16, market: String },

    #[error("Malformed rate response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Single round trip to the rate backend. Implementations never retry.
    async fn fetch(&self, market: &str) -> Result<RateSnapshot, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(official: f64, eur: f64, parallel: f64) -> RateSnapshot {
        RateSnapshot {
            official_usd: official,
            official_eur: eur,
            parallel_usd: parallel,
            observed_at: Utc::now(),
            best_option: None,
        }
    }

    #[test]
    fn test_validate_accepts_positive_rates() {
        assert!(snapshot(36.5, 39.8, 40.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        assert!(snapshot(0.0, 39.8, 40.0).validate().is_err());
        assert!(snapshot(36.5, -1.0, 40.0).validate().is_err());
        assert!(snapshot(36.5, 39.8, f64::NAN).validate().is_err());
        let err = snapshot(36.5, 39.8, f64::INFINITY).validate().unwrap_err();
        assert!(err.to_string().contains("parallel_usd"));
    }
}
