//! Database schema management for `climate-warehouse`.
//!
//! Ensures the bronze and silver tables exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `raw_weather` (bronze) and `fact_weather` (silver) tables.
/// Both carry a composite primary key on (site, ts_utc); the upsert writers
/// in `store` rely on that key for their ON CONFLICT clauses. Safe to call
/// on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Bronze: raw samples exactly as the provider reported them, plus the
    // original payload for traceability.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_weather (
            site        TEXT             NOT NULL,
            ts_utc      TIMESTAMPTZ      NOT NULL,
            ghi_wm2     DOUBLE PRECISION,
            t2m_c       DOUBLE PRECISION,
            ws10_mps    DOUBLE PRECISION,
            ingested_at TIMESTAMPTZ      NOT NULL,
            raw_json    JSONB,
            PRIMARY KEY (site, ts_utc)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Silver: one validated row per (site, hour), no nullable measurements.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fact_weather (
            site     TEXT             NOT NULL,
            ts_utc   TIMESTAMPTZ      NOT NULL,
            ghi_wm2  DOUBLE PRECISION NOT NULL,
            temp_c   DOUBLE PRECISION NOT NULL,
            wind_mps DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (site, ts_utc)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for the recent-rows queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_raw_weather_site_ts
            ON raw_weather (site, ts_utc DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_fact_weather_site_ts
            ON fact_weather (site, ts_utc DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
