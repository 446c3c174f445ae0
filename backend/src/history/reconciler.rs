//! Reconciler
//!
//! Turns one snapshot into durable rows inside a single transaction:
//!   1. tokens   (insert-if-absent)
//!   2. pairs    (insert-if-absent, immutable attributes)
//!   3. history  (one sample per pair, fee delta against the stored counter)
//!   4. counters (stored lifetime counter advanced to this snapshot)
//!
//! Step 3 must see the counters as they were before this tick. All samples
//! are written before any counter is advanced.

use sqlx::AnyConnection;
use sqlx::{Acquire, AnyPool, Row};
use tracing::{debug, info, instrument, warn};

use crate::history::errors::{RecordAnomaly, ReconcileError};
use crate::history::model::{
    FeeDelta, ReconcileOutcome, ReconcileReport, fee_delta, split_pair_name,
};
use crate::market::types::{PairRecord, Snapshot};
use crate::metrics::counters::Counters;
use common::time::ms_to_datetime;

/// A record that carries everything needed to be stored.
struct ValidRecord<'a> {
    address: &'a str,
    name: &'a str,
    mint_x: &'a str,
    mint_y: &'a str,
    symbol_x: &'a str,
    symbol_y: &'a str,
    bin_step: Option<i64>,
    base_fee_percentage: Option<f64>,
    hide: bool,
    blacklisted: bool,
    price: Option<f64>,
    liquidity: Option<f64>,
    counter: Option<f64>,
}

impl<'a> ValidRecord<'a> {
    fn from_record(r: &'a PairRecord) -> Result<Self, RecordAnomaly> {
        let address = r
            .address
            .as_deref()
            .ok_or(RecordAnomaly::MissingField("address"))?;
        let name = r.name.as_deref().ok_or(RecordAnomaly::MissingField("name"))?;
        let mint_x = r
            .mint_x
            .as_deref()
            .ok_or(RecordAnomaly::MissingField("mint_x"))?;
        let mint_y = r
            .mint_y
            .as_deref()
            .ok_or(RecordAnomaly::MissingField("mint_y"))?;
        let (symbol_x, symbol_y) = split_pair_name(name)?;

        Ok(Self {
            address,
            name,
            mint_x,
            mint_y,
            symbol_x,
            symbol_y,
            bin_step: r.bin_step.map(i64::from),
            base_fee_percentage: r.base_fee_percentage,
            hide: r.hide.unwrap_or(false),
            blacklisted: r.is_blacklisted.unwrap_or(false),
            price: r.current_price,
            liquidity: r.liquidity,
            counter: r.cumulative_fee_volume,
        })
    }
}

/// What staging one record produced.
struct Staged {
    pair_id: i64,
    delta: FeeDelta,
    tokens_created: usize,
    pool_created: bool,
}

pub struct Reconciler {
    pool: AnyPool,
    counters: Counters,
}

impl Reconciler {
    pub fn new(pool: AnyPool, counters: Counters) -> Self {
        Self { pool, counters }
    }

    /// Stores one snapshot, all or nothing.
    ///
    /// Re-running with an already stored capture time is a no-op; an older
    /// capture time is rejected. A record that fails validation is skipped,
    /// a record whose writes fail is rolled back to its savepoint; neither
    /// aborts the tick.
    #[instrument(
        skip(self, snapshot),
        fields(captured_at = %snapshot.captured_at, records = snapshot.records.len())
    )]
    pub async fn reconcile(&self, snapshot: &Snapshot) -> Result<ReconcileReport, ReconcileError> {
        let captured_ms = snapshot.captured_at.timestamp_millis();
        let mut report = ReconcileReport::new(snapshot.captured_at);

        let mut tx = self.pool.begin().await?;

        let latest: Option<i64> = sqlx::query("SELECT MAX(created_at_ms) AS latest FROM pair_history")
            .fetch_one(&mut *tx)
            .await?
            .try_get("latest")?;

        match latest {
            Some(latest) if latest == captured_ms => {
                info!("tick already recorded; skipping");
                report.outcome = ReconcileOutcome::AlreadyRecorded;
                return Ok(report);
            }
            Some(latest) if latest > captured_ms => {
                return Err(ReconcileError::OutOfOrder {
                    captured_at: snapshot.captured_at,
                    latest: ms_to_datetime(latest),
                });
            }
            _ => {}
        }

        // (pair_id, counter) to advance once every sample is in.
        let mut advance: Vec<(i64, f64)> = Vec::with_capacity(snapshot.records.len());

        for record in &snapshot.records {
            let valid = match ValidRecord::from_record(record) {
                Ok(v) => v,
                Err(anomaly) => {
                    warn!(pool = ?record.address, %anomaly, "skipping record");
                    report.records_skipped += 1;
                    continue;
                }
            };

            let mut savepoint = tx.begin().await?;
            match stage_record(&mut savepoint, &valid, captured_ms).await {
                Ok(staged) => {
                    savepoint.commit().await?;

                    if let FeeDelta::Negative { previous, current } = staged.delta {
                        warn!(
                            pool = %valid.address,
                            previous,
                            current,
                            "negative fee delta; lifetime counter went backwards, storing no value"
                        );
                        report.anomalies += 1;
                    }

                    report.pools_sampled += 1;
                    report.tokens_created += staged.tokens_created;
                    report.pools_created += usize::from(staged.pool_created);

                    if let Some(counter) = valid.counter {
                        advance.push((staged.pair_id, counter));
                    }
                }
                Err(e) => {
                    warn!(pool = %valid.address, error = %e, "record rolled back");
                    savepoint.rollback().await?;
                    report.records_failed += 1;
                }
            }
        }

        for (pair_id, counter) in advance {
            sqlx::query("UPDATE pairs SET cumulative_fee_volume = ? WHERE id = ?")
                .bind(counter)
                .bind(pair_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Counters::add(&self.counters.records_skipped, report.records_skipped as u64);
        Counters::add(&self.counters.records_failed, report.records_failed as u64);
        Counters::add(&self.counters.anomalies, report.anomalies as u64);

        info!(
            sampled = report.pools_sampled,
            new_pools = report.pools_created,
            new_tokens = report.tokens_created,
            skipped = report.records_skipped,
            failed = report.records_failed,
            anomalies = report.anomalies,
            "tick committed"
        );

        Ok(report)
    }

    /// Operator override. Ingestion never touches the flag after insert.
    /// Returns false when no pair has this address.
    #[instrument(skip(self))]
    pub async fn set_blacklisted(
        &self,
        pair_address: &str,
        blacklisted: bool,
    ) -> Result<bool, ReconcileError> {
        let res = sqlx::query("UPDATE pairs SET is_blacklisted = ? WHERE pair_address = ?")
            .bind(i64::from(blacklisted))
            .bind(pair_address)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

async fn stage_record(
    conn: &mut AnyConnection,
    rec: &ValidRecord<'_>,
    captured_ms: i64,
) -> Result<Staged, sqlx::Error> {
    let tokens_created = upsert_token(conn, rec.mint_x, rec.symbol_x).await?
        + upsert_token(conn, rec.mint_y, rec.symbol_y).await?;

    let inserted = sqlx::query(
        r#"
INSERT INTO pairs (
  pair_address, name, mint_x_id, mint_y_id,
  bin_step, base_fee_percentage, hide, is_blacklisted, cumulative_fee_volume
)
VALUES (
  ?, ?,
  (SELECT id FROM tokens WHERE mint = ?),
  (SELECT id FROM tokens WHERE mint = ?),
  ?, ?, ?, ?, NULL
)
ON CONFLICT (pair_address) DO NOTHING;
"#,
    )
    .bind(rec.address)
    .bind(rec.name)
    .bind(rec.mint_x)
    .bind(rec.mint_y)
    .bind(rec.bin_step)
    .bind(rec.base_fee_percentage)
    .bind(i64::from(rec.hide))
    .bind(i64::from(rec.blacklisted))
    .execute(&mut *conn)
    .await?;

    // Read the counter as of the previous tick.
    let row = sqlx::query("SELECT id, cumulative_fee_volume FROM pairs WHERE pair_address = ?")
        .bind(rec.address)
        .fetch_one(&mut *conn)
        .await?;
    let pair_id: i64 = row.try_get("id")?;
    let previous: Option<f64> = row.try_get("cumulative_fee_volume")?;

    let delta = fee_delta(previous, rec.counter);

    sqlx::query(
        r#"
INSERT INTO pair_history (created_at_ms, pair_id, price, liquidity, fees)
VALUES (?, ?, ?, ?, ?);
"#,
    )
    .bind(captured_ms)
    .bind(pair_id)
    .bind(rec.price)
    .bind(rec.liquidity)
    .bind(delta.value())
    .execute(&mut *conn)
    .await?;

    debug!(pool = %rec.address, pair_id, ?delta, "sample staged");

    Ok(Staged {
        pair_id,
        delta,
        tokens_created,
        pool_created: inserted.rows_affected() == 1,
    })
}

/// Returns 1 when the token is new, 0 when it already existed.
async fn upsert_token(
    conn: &mut AnyConnection,
    mint: &str,
    symbol: &str,
) -> Result<usize, sqlx::Error> {
    let res = sqlx::query("INSERT INTO tokens (mint, symbol) VALUES (?, ?) ON CONFLICT (mint) DO NOTHING;")
        .bind(mint)
        .bind(symbol)
        .execute(&mut *conn)
        .await?;

    Ok(res.rows_affected() as usize)
}
