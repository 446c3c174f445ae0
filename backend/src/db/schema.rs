use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Tokens: written once, never updated.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tokens (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  mint TEXT NOT NULL UNIQUE,
  symbol TEXT
);
"#,
    )
    .execute(pool)
    .await?;

    // Pairs: fee tier and flags fixed at insert; only the lifetime fee
    // counter moves afterwards (and the blacklist flag, by operator).
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS pairs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  pair_address TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  mint_x_id INTEGER NOT NULL REFERENCES tokens(id),
  mint_y_id INTEGER NOT NULL REFERENCES tokens(id),
  bin_step BIGINT,
  base_fee_percentage REAL,
  hide INTEGER NOT NULL DEFAULT 0 CHECK (hide IN (0,1)),
  is_blacklisted INTEGER NOT NULL DEFAULT 0 CHECK (is_blacklisted IN (0,1)),
  cumulative_fee_volume REAL
);
"#,
    )
    .execute(pool)
    .await?;

    // History: append-only, one row per pair per tick.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS pair_history (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  created_at_ms BIGINT NOT NULL,
  pair_id INTEGER NOT NULL REFERENCES pairs(id),
  price REAL,
  liquidity REAL,
  fees REAL,
  UNIQUE (pair_id, created_at_ms)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_pair_history_created ON pair_history(created_at_ms);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
