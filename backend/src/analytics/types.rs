use chrono::{DateTime, Utc};

/// Fewer collected ticks than this and window figures are not meaningful.
pub const MIN_TICKS_FOR_ANALYTICS: u64 = 5;

/// Lookbacks offered to consumers, in ticks.
pub const LOOKBACK_OPTIONS: [usize; 4] = [5, 15, 30, 60];

/// One row of the ranked pool table.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSummary {
    pub pair_address: String,
    pub name: String,
    pub bin_step: Option<i64>,
    pub base_fee_percentage: Option<f64>,

    pub ticks_observed: usize,
    pub last_tick: Option<DateTime<Utc>>,
    pub latest_price: Option<f64>,
    pub latest_liquidity: Option<f64>,

    pub avg_liquidity: Option<f64>,
    pub liquidity_std_dev: Option<f64>,
    pub cumulative_fees: f64,
    pub fee_yield_ratio: Option<f64>,
    /// 24-hour-equivalent fee yield, percent.
    pub annualized_fee_yield: Option<f64>,

    pub price_range: Option<f64>,
    pub estimated_bins: Option<u64>,
    pub estimated_positions: Option<u64>,
    /// Over the pool's whole history, not just the window.
    pub tick_direction_ratio: Option<f64>,
    pub pct_minutes_with_volume: f64,
}

/// One tick of a single pool's chart series. Running figures cover the
/// window up to and including this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolTick {
    pub captured_at: DateTime<Utc>,
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    pub fee_delta: Option<f64>,
    pub cumulative_fees: f64,
    pub fee_yield_24h: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub ticks_collected: u64,
    pub last_tick: Option<DateTime<Utc>>,
}

impl Readiness {
    pub fn is_ready(&self, min_ticks: u64) -> bool {
        self.ticks_collected >= min_ticks
    }

    /// The subset of `options` already covered by collected history.
    pub fn available_lookbacks(&self, options: &[usize]) -> Vec<usize> {
        options
            .iter()
            .copied()
            .filter(|n| *n as u64 <= self.ticks_collected)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookbacks_gated_by_collected_ticks() {
        let r = Readiness {
            ticks_collected: 17,
            last_tick: None,
        };

        assert!(r.is_ready(MIN_TICKS_FOR_ANALYTICS));
        assert_eq!(r.available_lookbacks(&LOOKBACK_OPTIONS), vec![5, 15]);
    }

    #[test]
    fn too_little_history_is_not_ready() {
        let r = Readiness {
            ticks_collected: 4,
            last_tick: None,
        };

        assert!(!r.is_ready(MIN_TICKS_FOR_ANALYTICS));
        assert!(r.available_lookbacks(&LOOKBACK_OPTIONS).is_empty());
    }
}
