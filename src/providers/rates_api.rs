use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::rate::{BestOption, FetchError, RateFetcher, RateSnapshot};

/// Client for the rates backend, `GET {base_url}/rates/{market}`.
pub struct RatesApiProvider {
    base_url: String,
    client: reqwest::Client,
}

impl RatesApiProvider {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("tasaverde/0.1")
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(RatesApiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OfficialRates {
    usd: f64,
    eur: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BestOptionIndicator {
    Bcv,
    Binance,
    /// Unrecognised indicators leave the choice to the local comparison.
    #[serde(other)]
    Unknown,
}

impl BestOptionIndicator {
    fn best_option(self) -> Option<BestOption> {
        match self {
            BestOptionIndicator::Bcv => Some(BestOption::Official),
            BestOptionIndicator::Binance => Some(BestOption::Parallel),
            BestOptionIndicator::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    bcv: OfficialRates,
    binance: f64,
    #[serde(alias = "lastUpdated")]
    last_updated: DateTime<Utc>,
    #[serde(default, alias = "bestOption")]
    best_option: Option<BestOptionIndicator>,
}

impl From<RatesResponse> for RateSnapshot {
    fn from(response: RatesResponse) -> Self {
        RateSnapshot {
            official_usd: response.bcv.usd,
            official_eur: response.bcv.eur,
            parallel_usd: response.binance,
            observed_at: response.last_updated,
            best_option: response.best_option.and_then(BestOptionIndicator::best_option),
        }
    }
}

#[async_trait]
impl RateFetcher for RatesApiProvider {
    #[instrument(name = "RatesFetch", skip(self), fields(market = %market))]
    async fn fetch(&self, market: &str) -> Result<RateSnapshot, FetchError> {
        let url = format!("{}/rates/{}", self.base_url, market);
        debug!("Requesting rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("{e} for market: {market}")))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                market: market.to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("{e} for market: {market}")))?;

        let data: RatesResponse = serde_json::from_str(&text).map_err(|e| {
            FetchError::Malformed(format!("failed to parse response for {market}: {e}"))
        })?;

        let snapshot = RateSnapshot::from(data);
        snapshot.validate()?;
        debug!(observed_at = %snapshot.observed_at, "Received rate snapshot");
        Ok(snapshot)
    }
}
