use std::cmp::Ordering;
use std::collections::HashMap;

use futures::TryStreamExt;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;
use sqlx::{AnyPool, Row};
use tracing::{debug, instrument};

use crate::analytics::errors::AnalyticsError;
use crate::analytics::types::{PoolSummary, PoolTick, Readiness};
use crate::analytics::window::{
    TickSample, WindowAccumulator, YieldParams, estimated_bins, estimated_positions,
    fee_yield_24h, tick_direction_ratio,
};
use common::time::ms_to_datetime;

/// Read-only queries over committed history. Never writes.
#[derive(Clone)]
pub struct WindowAnalytics {
    pool: AnyPool,
    params: YieldParams,
}

/// Static attributes of the pool a group of streamed rows belongs to.
struct PoolHeader {
    pair_id: i64,
    pair_address: String,
    name: String,
    bin_step: Option<i64>,
    base_fee_percentage: Option<f64>,
}

impl WindowAnalytics {
    pub fn new(pool: AnyPool, params: YieldParams) -> Self {
        Self { pool, params }
    }

    /// One row per non-blacklisted pool over its last `lookback` samples,
    /// best yield first.
    #[instrument(skip(self))]
    pub async fn summarize(&self, lookback: usize) -> Result<Vec<PoolSummary>, AnalyticsError> {
        if lookback == 0 {
            return Err(AnalyticsError::InvalidLookback(lookback));
        }

        // Both passes read one snapshot of history, so a tick committing in
        // between cannot show up in one and not the other.
        let mut tx = self.pool.begin().await?;
        let directions = direction_counts(&mut tx).await?;

        // Rows arrive grouped by pool, oldest first within a pool, so each
        // pool is folded in one pass and closed when the next one starts.
        let mut rows = sqlx::query(
            r#"
SELECT
  p.id AS pair_id, p.pair_address, p.name, p.bin_step, p.base_fee_percentage,
  w.created_at_ms, w.price, w.liquidity, w.fees
FROM (
  SELECT
    pair_id, created_at_ms, price, liquidity, fees,
    ROW_NUMBER() OVER (PARTITION BY pair_id ORDER BY created_at_ms DESC) AS rn
  FROM pair_history
) w
JOIN pairs p ON p.id = w.pair_id
WHERE w.rn <= ? AND p.is_blacklisted = 0
ORDER BY p.id ASC, w.created_at_ms ASC;
"#,
        )
        .bind(lookback_limit(lookback))
        .fetch(&mut *tx);

        let mut out = Vec::new();
        let mut current: Option<(PoolHeader, WindowAccumulator)> = None;

        while let Some(row) = rows.try_next().await? {
            let pair_id: i64 = row.try_get("pair_id")?;

            if current.as_ref().is_none_or(|(h, _)| h.pair_id != pair_id) {
                if let Some((header, acc)) = current.take() {
                    out.push(self.finish(header, &acc, &directions));
                }
                current = Some((row_to_header(&row)?, WindowAccumulator::new()));
            }

            if let Some((_, acc)) = current.as_mut() {
                acc.push(row_to_sample(&row)?);
            }
        }
        if let Some((header, acc)) = current.take() {
            out.push(self.finish(header, &acc, &directions));
        }
        drop(rows);
        tx.commit().await?;

        out.sort_by(|a, b| by_yield_desc(a.annualized_fee_yield, b.annualized_fee_yield));

        debug!(pools = out.len(), "window summarized");
        Ok(out)
    }

    /// Chronological series for one pool over its last `lookback` samples.
    /// Served regardless of the blacklist flag. Unknown pools yield no rows.
    #[instrument(skip(self))]
    pub async fn detail(
        &self,
        pair_address: &str,
        lookback: usize,
    ) -> Result<Vec<PoolTick>, AnalyticsError> {
        if lookback == 0 {
            return Err(AnalyticsError::InvalidLookback(lookback));
        }

        let rows = sqlx::query(
            r#"
SELECT h.created_at_ms, h.price, h.liquidity, h.fees
FROM pair_history h
JOIN pairs p ON p.id = h.pair_id
WHERE p.pair_address = ?
ORDER BY h.created_at_ms DESC
LIMIT ?;
"#,
        )
        .bind(pair_address)
        .bind(lookback_limit(lookback))
        .fetch_all(&self.pool)
        .await?;

        let mut acc = WindowAccumulator::new();
        let mut out = Vec::with_capacity(rows.len());

        for row in rows.iter().rev() {
            let sample = row_to_sample(row)?;
            acc.push(sample);
            let stats = acc.stats();

            out.push(PoolTick {
                captured_at: ms_to_datetime(sample.captured_at_ms),
                price: sample.price,
                liquidity: sample.liquidity,
                fee_delta: sample.fee_delta,
                cumulative_fees: stats.cumulative_fees,
                fee_yield_24h: fee_yield_24h(
                    stats.fee_yield_ratio,
                    stats.ticks_observed,
                    &self.params,
                ),
            });
        }

        Ok(out)
    }

    /// How much history exists, for gating consumers.
    pub async fn readiness(&self) -> Result<Readiness, AnalyticsError> {
        let row = sqlx::query(
            r#"
SELECT COUNT(DISTINCT created_at_ms) AS ticks, MAX(created_at_ms) AS last_ms
FROM pair_history;
"#,
        )
        .fetch_one(&self.pool)
        .await?;

        let ticks: i64 = row.try_get("ticks")?;
        let last_ms: Option<i64> = row.try_get("last_ms")?;

        Ok(Readiness {
            ticks_collected: ticks.max(0) as u64,
            last_tick: last_ms.map(ms_to_datetime),
        })
    }

    fn finish(
        &self,
        header: PoolHeader,
        acc: &WindowAccumulator,
        directions: &HashMap<i64, (i64, i64)>,
    ) -> PoolSummary {
        let stats = acc.stats();
        let bins = estimated_bins(stats.price_range, header.bin_step);
        let (ups, downs) = directions.get(&header.pair_id).copied().unwrap_or((0, 0));

        PoolSummary {
            pair_address: header.pair_address,
            name: header.name,
            bin_step: header.bin_step,
            base_fee_percentage: header.base_fee_percentage,
            ticks_observed: stats.ticks_observed,
            last_tick: stats.last_tick_ms.map(ms_to_datetime),
            latest_price: stats.latest_price,
            latest_liquidity: stats.latest_liquidity,
            avg_liquidity: stats.avg_liquidity,
            liquidity_std_dev: stats.liquidity_std_dev,
            cumulative_fees: stats.cumulative_fees,
            fee_yield_ratio: stats.fee_yield_ratio,
            annualized_fee_yield: fee_yield_24h(
                stats.fee_yield_ratio,
                stats.ticks_observed,
                &self.params,
            ),
            price_range: stats.price_range,
            estimated_bins: bins,
            estimated_positions: estimated_positions(bins),
            tick_direction_ratio: tick_direction_ratio(ups, downs),
            pct_minutes_with_volume: stats.pct_minutes_with_volume,
        }
    }
}

/// Up and down moves between consecutive known prices, per pool, over
/// the whole history.
async fn direction_counts(
    conn: &mut AnyConnection,
) -> Result<HashMap<i64, (i64, i64)>, AnalyticsError> {
    let rows = sqlx::query(
        r#"
SELECT
  pair_id,
  CAST(COALESCE(SUM(CASE WHEN price > prev_price THEN 1 ELSE 0 END), 0) AS INTEGER) AS ups,
  CAST(COALESCE(SUM(CASE WHEN price < prev_price THEN 1 ELSE 0 END), 0) AS INTEGER) AS downs
FROM (
  SELECT
pair_id, price,
LAG(price) OVER (PARTITION BY pair_id ORDER BY created_at_ms) AS prev_price
  FROM pair_history
  WHERE price IS NOT NULL
) moves
GROUP BY pair_id;
"#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for r in rows {
        out.insert(
            r.try_get::<i64, _>("pair_id")?,
            (r.try_get::<i64, _>("ups")?, r.try_get::<i64, _>("downs")?),
        );
    }
    Ok(out)
}

/// Lookbacks beyond what SQL can express mean "all of it".
fn lookback_limit(lookback: usize) -> i64 {
    i64::try_from(lookback).unwrap_or(i64::MAX)
}

/// Descending, with undefined yields after every defined one.
fn by_yield_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/* =========================
Row mapping
========================= */

fn row_to_header(r: &AnyRow) -> Result<PoolHeader, sqlx::Error> {
    Ok(PoolHeader {
        pair_id: r.try_get("pair_id")?,
        pair_address: r.try_get("pair_address")?,
        name: r.try_get("name")?,
        bin_step: r.try_get("bin_step")?,
        base_fee_percentage: r.try_get("base_fee_percentage")?,
    })
}

fn row_to_sample(r: &AnyRow) -> Result<TickSample, sqlx::Error> {
    Ok(TickSample {
        captured_at_ms: r.try_get("created_at_ms")?,
        price: r.try_get("price")?,
        liquidity: r.try_get("liquidity")?,
        fee_delta: r.try_get("fees")?,
    })
}
