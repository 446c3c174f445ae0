//! Single-pass rolling statistics over one pool's window of ticks.
//!
//! Samples are pushed oldest first. Liquidity variance uses Welford's
//! update so that long windows of large, similar values do not lose
//! precision the way a naive sum-of-squares would.

use std::time::Duration;

/// Bins covered by one full DLMM position.
pub const BINS_PER_POSITION: u64 = 69;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One stored history row, as read back for analytics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSample {
    pub captured_at_ms: i64,
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    pub fee_delta: Option<f64>,
}

/// Scaling parameters shared by every pool.
#[derive(Debug, Clone, Copy)]
pub struct YieldParams {
    pub tick_interval: Duration,
}

impl YieldParams {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval: tick_interval.max(Duration::from_secs(1)),
        }
    }

    pub fn ticks_per_day(&self) -> f64 {
        SECONDS_PER_DAY / self.tick_interval.as_secs_f64()
    }
}

impl Default for YieldParams {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample (n - 1) standard deviation.
    fn sample_std_dev(&self) -> Option<f64> {
        (self.count >= 2).then(|| (self.m2.max(0.0) / (self.count - 1) as f64).sqrt())
    }
}

#[derive(Debug, Clone, Default)]
pub struct WindowAccumulator {
    ticks: usize,
    ticks_with_volume: usize,
    liquidity: Welford,
    cumulative_fees: f64,
    min_price: Option<f64>,
    max_price: Option<f64>,
    latest: Option<TickSample>,
}

/// Statistics of one window. Fields that need more data than the window
/// holds are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    pub ticks_observed: usize,
    pub last_tick_ms: Option<i64>,
    pub latest_price: Option<f64>,
    pub latest_liquidity: Option<f64>,
    pub avg_liquidity: Option<f64>,
    pub liquidity_std_dev: Option<f64>,
    pub cumulative_fees: f64,
    pub fee_yield_ratio: Option<f64>,
    pub price_range: Option<f64>,
    pub pct_minutes_with_volume: f64,
}

impl WindowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: TickSample) {
        self.ticks += 1;

        if let Some(liq) = s.liquidity {
            self.liquidity.push(liq);
        }

        // Unknown deltas are left out of the sum, not counted as zero.
        if let Some(fees) = s.fee_delta {
            self.cumulative_fees += fees;
            if fees > 0.0 {
                self.ticks_with_volume += 1;
            }
        }

        if let Some(p) = s.price {
            self.min_price = Some(self.min_price.map_or(p, |m| m.min(p)));
            self.max_price = Some(self.max_price.map_or(p, |m| m.max(p)));
        }

        self.latest = Some(s);
    }

    pub fn stats(&self) -> WindowStats {
        let avg_liquidity = self.liquidity.mean();
        let liquidity_std_dev = self.liquidity.sample_std_dev();

        WindowStats {
            ticks_observed: self.ticks,
            last_tick_ms: self.latest.map(|s| s.captured_at_ms),
            latest_price: self.latest.and_then(|s| s.price),
            latest_liquidity: self.latest.and_then(|s| s.liquidity),
            avg_liquidity,
            liquidity_std_dev,
            cumulative_fees: self.cumulative_fees,
            fee_yield_ratio: fee_yield_ratio(self.cumulative_fees, avg_liquidity, liquidity_std_dev),
            price_range: price_range(self.min_price, self.max_price),
            pct_minutes_with_volume: if self.ticks == 0 {
                0.0
            } else {
                self.ticks_with_volume as f64 / self.ticks as f64 * 100.0
            },
        }
    }
}

/// Fees over a volatility-inflated liquidity base.
///
/// Zero whenever average liquidity is zero, whatever the fees. Otherwise
/// undefined until the standard deviation is.
pub fn fee_yield_ratio(
    cumulative_fees: f64,
    avg_liquidity: Option<f64>,
    liquidity_std_dev: Option<f64>,
) -> Option<f64> {
    let avg = avg_liquidity?;
    if avg == 0.0 {
        return Some(0.0);
    }

    let base = avg + liquidity_std_dev?;
    if base == 0.0 {
        return Some(0.0);
    }

    Some(cumulative_fees / base)
}

/// Scales a window ratio to a 24-hour-equivalent percentage using the number
/// of ticks actually observed, so short histories are not overstated.
pub fn fee_yield_24h(ratio: Option<f64>, ticks_observed: usize, params: &YieldParams) -> Option<f64> {
    if ticks_observed == 0 {
        return None;
    }
    ratio.map(|r| r * params.ticks_per_day() / ticks_observed as f64 * 100.0)
}

/// `(max - min) / min`, undefined for a non-positive minimum.
pub fn price_range(min_price: Option<f64>, max_price: Option<f64>) -> Option<f64> {
    let (min, max) = (min_price?, max_price?);
    (min > 0.0).then(|| (max - min) / min)
}

/// Number of bins the price range spans. Adjacent DLMM bins differ in price
/// by a factor of `1 + bin_step / 10_000`.
pub fn estimated_bins(price_range: Option<f64>, bin_step: Option<i64>) -> Option<u64> {
    let range = price_range?;
    let step = bin_step.filter(|s| *s > 0)? as f64 / 10_000.0;
    let bins = (1.0 + range).ln() / (1.0 + step).ln();
    bins.is_finite().then(|| bins.max(0.0).ceil() as u64)
}

pub fn estimated_positions(bins: Option<u64>) -> Option<u64> {
    bins.map(|b| b.div_ceil(BINS_PER_POSITION))
}

/// Share of upward moves among all non-flat moves.
pub fn tick_direction_ratio(ups: i64, downs: i64) -> Option<f64> {
    let moves = ups + downs;
    (moves > 0).then(|| ups as f64 / moves as f64)
}
