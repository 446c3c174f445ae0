use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use dlmm_backend::db::Db;
use dlmm_backend::history::{ReconcileError, ReconcileOutcome, Reconciler};
use dlmm_backend::market::types::{PairRecord, Snapshot};
use dlmm_backend::metrics::counters::Counters;

/// Isolated, uniquely named in-memory SQLite database per test.
async fn setup() -> (AnyPool, Reconciler) {
    let url = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::new_v4());
    let db = Db::connect(&url).await.unwrap();
    db.migrate().await.unwrap();

    let rec = Reconciler::new(db.pool.clone(), Counters::default());
    (db.pool, rec)
}

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
}

fn record(address: &str, name: &str, mints: (&str, &str), counter: Option<f64>) -> PairRecord {
    PairRecord {
        address: Some(address.into()),
        name: Some(name.into()),
        mint_x: Some(mints.0.into()),
        mint_y: Some(mints.1.into()),
        bin_step: Some(20),
        base_fee_percentage: Some(0.2),
        current_price: Some(1.0),
        liquidity: Some(5_000.0),
        cumulative_fee_volume: counter,
        ..Default::default()
    }
}

fn sol_usdc(counter: f64) -> PairRecord {
    record("PoolA", "SOL-USDC", ("MintSol", "MintUsdc"), Some(counter))
}

async fn deltas(pool: &AnyPool, address: &str) -> Vec<Option<f64>> {
    sqlx::query(
        r#"
SELECT h.fees FROM pair_history h
JOIN pairs p ON p.id = h.pair_id
WHERE p.pair_address = ?
ORDER BY h.created_at_ms;
"#,
    )
    .bind(address)
    .fetch_all(pool)
    .await
    .unwrap()
    .iter()
    .map(|r| r.get::<Option<f64>, _>("fees"))
    .collect()
}

async fn count(pool: &AnyPool, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
        .get("n")
}

#[tokio::test]
async fn deltas_follow_the_lifetime_counter() {
    let (pool, rec) = setup().await;

    for (i, counter) in [100.0, 140.0, 140.0, 190.0].into_iter().enumerate() {
        let snap = Snapshot {
            records: vec![sol_usdc(counter)],
            captured_at: t(i as i64),
        };
        rec.reconcile(&snap).await.unwrap();
    }

    assert_eq!(
        deltas(&pool, "PoolA").await,
        vec![None, Some(40.0), Some(0.0), Some(50.0)]
    );

    let stored: Option<f64> = sqlx::query("SELECT cumulative_fee_volume FROM pairs")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("cumulative_fee_volume");
    assert_eq!(stored, Some(190.0));
}

#[tokio::test]
async fn every_history_row_resolves_to_a_pool_and_its_tokens() {
    let (pool, rec) = setup().await;

    let snap = Snapshot {
        records: vec![
            sol_usdc(10.0),
            record("PoolB", "JUP-USDC", ("MintJup", "MintUsdc"), Some(5.0)),
            record("PoolC", "JUP-SOL", ("MintJup", "MintSol"), None),
        ],
        captured_at: t(0),
    };
    let report = rec.reconcile(&snap).await.unwrap();

    assert_eq!(report.outcome, ReconcileOutcome::Committed);
    assert_eq!(report.pools_sampled, 3);
    assert_eq!(report.pools_created, 3);
    assert_eq!(report.tokens_created, 3);

    let orphans: i64 = sqlx::query(
        r#"
SELECT COUNT(*) AS n
FROM pair_history h
LEFT JOIN pairs p ON p.id = h.pair_id
LEFT JOIN tokens tx ON tx.id = p.mint_x_id
LEFT JOIN tokens ty ON ty.id = p.mint_y_id
WHERE p.id IS NULL OR tx.id IS NULL OR ty.id IS NULL;
"#,
    )
    .fetch_one(&pool)
    .await
    .unwrap()
    .get("n");

    assert_eq!(orphans, 0);
    assert_eq!(count(&pool, "pair_history").await, 3);
    assert_eq!(count(&pool, "tokens").await, 3);
}

#[tokio::test]
async fn second_token_takes_the_quote_symbol() {
    let (pool, rec) = setup().await;

    rec.reconcile(&Snapshot {
        records: vec![sol_usdc(1.0)],
        captured_at: t(0),
    })
    .await
    .unwrap();

    let symbols: Vec<(String, Option<String>)> =
        sqlx::query("SELECT mint, symbol FROM tokens ORDER BY mint")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|r| (r.get("mint"), r.get("symbol")))
            .collect();

    assert_eq!(
        symbols,
        vec![
            ("MintSol".to_string(), Some("SOL".to_string())),
            ("MintUsdc".to_string(), Some("USDC".to_string())),
        ]
    );
}

#[tokio::test]
async fn reconciling_the_same_snapshot_twice_is_a_no_op() {
    let (pool, rec) = setup().await;

    let snap = Snapshot {
        records: vec![sol_usdc(100.0)],
        captured_at: t(0),
    };
    rec.reconcile(&snap).await.unwrap();

    let again = rec.reconcile(&snap).await.unwrap();

    assert_eq!(again.outcome, ReconcileOutcome::AlreadyRecorded);
    assert_eq!(again.pools_sampled, 0);
    assert_eq!(count(&pool, "pair_history").await, 1);
    assert_eq!(count(&pool, "pairs").await, 1);
    assert_eq!(count(&pool, "tokens").await, 2);
}

#[tokio::test]
async fn older_snapshot_is_rejected_and_nothing_written() {
    let (pool, rec) = setup().await;

    rec.reconcile(&Snapshot {
        records: vec![sol_usdc(100.0)],
        captured_at: t(5),
    })
    .await
    .unwrap();

    let err = rec
        .reconcile(&Snapshot {
            records: vec![sol_usdc(90.0)],
            captured_at: t(4),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::OutOfOrder { .. }));
    assert_eq!(count(&pool, "pair_history").await, 1);
}

#[tokio::test]
async fn fee_tier_and_symbols_are_fixed_at_first_sighting() {
    let (pool, rec) = setup().await;

    rec.reconcile(&Snapshot {
        records: vec![sol_usdc(1.0)],
        captured_at: t(0),
    })
    .await
    .unwrap();

    let mut changed = record("PoolA", "WSOL-USDT", ("MintSol", "MintUsdc"), Some(2.0));
    changed.bin_step = Some(80);
    changed.base_fee_percentage = Some(1.0);
    changed.is_blacklisted = Some(true);

    let report = rec
        .reconcile(&Snapshot {
            records: vec![changed],
            captured_at: t(1),
        })
        .await
        .unwrap();
    assert_eq!(report.pools_created, 0);
    assert_eq!(report.tokens_created, 0);

    let row = sqlx::query(
        "SELECT name, bin_step, base_fee_percentage, is_blacklisted, cumulative_fee_volume FROM pairs",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(row.get::<String, _>("name"), "SOL-USDC");
    assert_eq!(row.get::<Option<i64>, _>("bin_step"), Some(20));
    assert_eq!(row.get::<Option<f64>, _>("base_fee_percentage"), Some(0.2));
    assert_eq!(row.get::<i64, _>("is_blacklisted"), 0);
    assert_eq!(row.get::<Option<f64>, _>("cumulative_fee_volume"), Some(2.0));

    let sol: Option<String> = sqlx::query("SELECT symbol FROM tokens WHERE mint = 'MintSol'")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("symbol");
    assert_eq!(sol.as_deref(), Some("SOL"));
}

#[tokio::test]
async fn missing_counter_keeps_the_stored_one() {
    let (pool, rec) = setup().await;

    let mut gap = sol_usdc(0.0);
    gap.cumulative_fee_volume = None;

    for (i, r) in [sol_usdc(100.0), gap, sol_usdc(130.0)].into_iter().enumerate() {
        rec.reconcile(&Snapshot {
            records: vec![r],
            captured_at: t(i as i64),
        })
        .await
        .unwrap();
    }

    assert_eq!(deltas(&pool, "PoolA").await, vec![None, None, Some(30.0)]);
}

#[tokio::test]
async fn pool_missing_identifiers_is_skipped_and_counted() {
    let (pool, rec) = setup().await;

    let mut no_mint = record("PoolB", "JUP-USDC", ("MintJup", "MintUsdc"), Some(1.0));
    no_mint.mint_x = None;

    let report = rec
        .reconcile(&Snapshot {
            records: vec![sol_usdc(1.0), no_mint, PairRecord::default()],
            captured_at: t(0),
        })
        .await
        .unwrap();

    assert_eq!(report.pools_sampled, 1);
    assert_eq!(report.records_skipped, 2);
    assert_eq!(count(&pool, "pairs").await, 1);
}

#[tokio::test]
async fn operator_blacklist_survives_ingestion() {
    let (pool, rec) = setup().await;

    rec.reconcile(&Snapshot {
        records: vec![sol_usdc(1.0)],
        captured_at: t(0),
    })
    .await
    .unwrap();

    assert!(rec.set_blacklisted("PoolA", true).await.unwrap());
    assert!(!rec.set_blacklisted("Nowhere", true).await.unwrap());

    // Upstream still reports the pool as not blacklisted.
    rec.reconcile(&Snapshot {
        records: vec![sol_usdc(2.0)],
        captured_at: t(1),
    })
    .await
    .unwrap();

    let flag: i64 = sqlx::query("SELECT is_blacklisted FROM pairs WHERE pair_address = 'PoolA'")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("is_blacklisted");
    assert_eq!(flag, 1);
}
