use super::ui;
use crate::core::metrics::{self, DerivedMetrics};
use crate::core::{BestOption, FetchError, RateCache, RateFetcher, RateSnapshot};
use anyhow::Result;
use comfy_table::Cell;
use std::time::Duration;

/// Floor for the `--watch` redraw period.
const MIN_WATCH_PERIOD: Duration = Duration::from_secs(1);

impl RateSnapshot {
    pub fn display_as_table(&self, metrics: &DerivedMetrics) -> String {
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Rate"),
            ui::header_cell("Value"),
            ui::header_cell("Unit"),
            ui::header_cell(""),
        ]);
        table.add_row(vec![
            Cell::new("BCV Dólar"),
            ui::rate_cell(self.official_usd),
            Cell::new("Bs/$"),
            ui::best_cell(metrics.best_option == BestOption::Official),
        ]);
        table.add_row(vec![
            Cell::new("BCV Euro"),
            ui::rate_cell(self.official_eur),
            Cell::new("Bs/€"),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Binance P2P"),
            ui::rate_cell(self.parallel_usd),
            Cell::new("Bs/$"),
            ui::best_cell(metrics.best_option == BestOption::Parallel),
        ]);

        let mut output = format!(
            "{}  {}\n\n",
            ui::style_text("TasaVerde", ui::StyleType::Title),
            ui::style_text(
                &format!("updated {}", self.observed_at.format("%Y-%m-%d %H:%M UTC")),
                ui::StyleType::Subtle
            )
        );
        output.push_str(&format!(
            "Best option: {} · {}% spread between rates\n\n",
            ui::style_text(&metrics.best_option.to_string(), ui::StyleType::Highlight),
            metrics.spread_display()
        ));
        output.push_str(&table.to_string());
        output
    }
}

/// Renders the latest snapshot, falling back to the last known good one
/// with an error line when the fetch fails.
async fn render<F: RateFetcher + 'static>(
    cache: &RateCache<F>,
    market: &str,
    result: Result<RateSnapshot, FetchError>,
) -> Result<()> {
    match result {
        Ok(snapshot) => {
            println!("{}", snapshot.display_as_table(&metrics::compute(&snapshot)));
            Ok(())
        }
        Err(e) => match cache.peek(market).await {
            Some(entry) => {
                let snapshot = entry.snapshot;
                println!("{}", snapshot.display_as_table(&metrics::compute(&snapshot)));
                println!(
                    "\n{}",
                    ui::style_text(
                        &format!("Could not update rates, showing last known values: {e}"),
                        ui::StyleType::Error
                    )
                );
                Ok(())
            }
            None => Err(e.into()),
        },
    }
}

pub async fn run<F: RateFetcher + 'static>(
    cache: &RateCache<F>,
    market: &str,
    refresh: bool,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching rates...");
    let result = if refresh {
        cache.refresh(market).await
    } else {
        cache.get(market).await
    };
    pb.finish_and_clear();

    render(cache, market, result).await
}

/// Polls the cache until interrupted. Each tick goes through `get`, so the
/// backend is only hit once the cached snapshot is stale.
pub async fn watch<F: RateFetcher + 'static>(
    cache: &RateCache<F>,
    market: &str,
    every: Duration,
) -> Result<()> {
    let mut interval = tokio::time::interval(every.max(MIN_WATCH_PERIOD));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let result = cache.get(market).await;
                console::Term::stdout().clear_screen()?;
                render(cache, market, result).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Interrupted, stopping rate watch");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_display_as_table() {
        let snapshot = RateSnapshot {
            official_usd: 36.5,
            official_eur: 39.75,
            parallel_usd: 40.0,
            observed_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 0).unwrap(),
            best_option: None,
        };
        let output = snapshot.display_as_table(&metrics::compute(&snapshot));

        assert!(output.contains("BCV Dólar"));
        assert!(output.contains("36.50"));
        assert!(output.contains("39.75"));
        assert!(output.contains("40.00"));
        assert!(output.contains("9.6%"));
        assert!(output.contains("BEST"));
        assert!(output.contains("2026-01-15 12:30 UTC"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_accepts_zero_period() {
        use crate::core::CacheConfig;
        use async_trait::async_trait;
        use std::sync::Arc;

        struct Unreachable;

        #[async_trait]
        impl RateFetcher for Unreachable {
            async fn fetch(&self, market: &str) -> Result<RateSnapshot, FetchError> {
                Err(FetchError::Transport(format!("offline for market: {market}")))
            }
        }

        let config = CacheConfig {
            stale_time: Duration::ZERO,
            retries: 0,
            ..CacheConfig::default()
        };
        let cache = RateCache::new(Arc::new(Unreachable), config);

        // With nothing cached the first tick surfaces the fetch error.
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            watch(&cache, "ves", Duration::ZERO),
        )
        .await;
        let err = result.unwrap().unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
