//! Metrics derived from a rate snapshot for display

use crate::core::rate::{BestOption, RateSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    pub best_option: BestOption,
    /// Parallel over official, in percent.
    pub spread_percent: f64,
}

impl DerivedMetrics {
    /// Spread rounded to one decimal place, e.g. `"9.6"`.
    pub fn spread_display(&self) -> String {
        format!("{:.1}", self.spread_percent)
    }
}

/// Computes display metrics for `snapshot`.
///
/// The backend indicator decides the best option when present. Otherwise the
/// lower acquisition cost wins and a tie goes to the official rate; the
/// fallback rule still awaits product confirmation.
pub fn compute(snapshot: &RateSnapshot) -> DerivedMetrics {
    let spread_percent =
        (snapshot.parallel_usd - snapshot.official_usd) / snapshot.official_usd * 100.0;

    let best_option = snapshot.best_option.unwrap_or(
        if snapshot.official_usd <= snapshot.parallel_usd {
            BestOption::Official
        } else {
            BestOption::Parallel
        },
    );

    DerivedMetrics {
        best_option,
        spread_percent,
    }
}
