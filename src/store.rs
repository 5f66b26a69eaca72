//! Persistence for the bronze and silver tables.
//!
//! Both writers take whole batches: each call is a single `INSERT ... SELECT
//! FROM UNNEST(...) ON CONFLICT DO UPDATE` statement, so a batch either
//! lands completely or not at all, and replaying the same batch is a no-op
//! beyond re-setting the same values. Returned counts are rows presented to
//! the write, not rows changed.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{FactObservation, RawObservation, TableSummary};

// ---

/// Upsert a batch of bronze rows keyed by (site, ts_utc). A conflicting key
/// overwrites every measurement field plus `raw_json` and refreshes
/// `ingested_at`.
pub async fn upsert_raw(pool: &PgPool, rows: &[RawObservation]) -> Result<u64> {
    // ---
    if rows.is_empty() {
        return Ok(0);
    }

    let mut sites = Vec::with_capacity(rows.len());
    let mut timestamps = Vec::with_capacity(rows.len());
    let mut ghi = Vec::with_capacity(rows.len());
    let mut temp = Vec::with_capacity(rows.len());
    let mut wind = Vec::with_capacity(rows.len());
    let mut ingested = Vec::with_capacity(rows.len());
    let mut payloads = Vec::with_capacity(rows.len());

    for row in rows {
        sites.push(row.site.clone());
        timestamps.push(row.ts_utc);
        ghi.push(row.ghi_wm2);
        temp.push(row.t2m_c);
        wind.push(row.ws10_mps);
        ingested.push(row.ingested_at);
        payloads.push(row.raw_payload());
    }

    sqlx::query(
        r#"
        INSERT INTO raw_weather (site, ts_utc, ghi_wm2, t2m_c, ws10_mps, ingested_at, raw_json)
        SELECT * FROM UNNEST(
            $1::text[], $2::timestamptz[], $3::float8[],
            $4::float8[], $5::float8[], $6::timestamptz[], $7::jsonb[]
        )
        ON CONFLICT (site, ts_utc) DO UPDATE
        SET ghi_wm2     = EXCLUDED.ghi_wm2,
            t2m_c       = EXCLUDED.t2m_c,
            ws10_mps    = EXCLUDED.ws10_mps,
            ingested_at = EXCLUDED.ingested_at,
            raw_json    = EXCLUDED.raw_json
        "#,
    )
    .bind(&sites)
    .bind(&timestamps)
    .bind(&ghi)
    .bind(&temp)
    .bind(&wind)
    .bind(&ingested)
    .bind(&payloads)
    .execute(pool)
    .await?;

    Ok(rows.len() as u64)
}

/// Upsert a batch of silver rows keyed by (site, ts_utc). All three
/// measurement fields are replaced together; a fact row is never partially
/// updated.
pub async fn upsert_fact(pool: &PgPool, rows: &[FactObservation]) -> Result<u64> {
    // ---
    if rows.is_empty() {
        return Ok(0);
    }

    let mut sites = Vec::with_capacity(rows.len());
    let mut hours = Vec::with_capacity(rows.len());
    let mut ghi = Vec::with_capacity(rows.len());
    let mut temp = Vec::with_capacity(rows.len());
    let mut wind = Vec::with_capacity(rows.len());

    for row in rows {
        sites.push(row.site.clone());
        hours.push(row.ts_utc);
        ghi.push(row.ghi_wm2);
        temp.push(row.temp_c);
        wind.push(row.wind_mps);
    }

    sqlx::query(
        r#"
        INSERT INTO fact_weather (site, ts_utc, ghi_wm2, temp_c, wind_mps)
        SELECT * FROM UNNEST(
            $1::text[], $2::timestamptz[], $3::float8[], $4::float8[], $5::float8[]
        )
        ON CONFLICT (site, ts_utc) DO UPDATE
        SET ghi_wm2  = EXCLUDED.ghi_wm2,
            temp_c   = EXCLUDED.temp_c,
            wind_mps = EXCLUDED.wind_mps
        "#,
    )
    .bind(&sites)
    .bind(&hours)
    .bind(&ghi)
    .bind(&temp)
    .bind(&wind)
    .execute(pool)
    .await?;

    Ok(rows.len() as u64)
}

// ---

/// Candidate bronze rows for one site over a half-open window `[start, end)`.
pub async fn fetch_raw_window(
    pool: &PgPool,
    site: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<RawObservation>> {
    // ---
    let rows = sqlx::query_as::<_, RawObservation>(
        r#"
        SELECT site, ts_utc, ghi_wm2, t2m_c, ws10_mps, ingested_at
        FROM raw_weather
        WHERE site = $1
          AND ts_utc >= $2
          AND ts_utc <  $3
        "#,
    )
    .bind(site)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Most recent silver rows for a site, returned oldest first.
pub async fn recent_fact_rows(pool: &PgPool, site: &str, hours: i64) -> Result<Vec<FactObservation>> {
    // ---
    let mut rows = sqlx::query_as::<_, FactObservation>(
        r#"
        SELECT site, ts_utc, ghi_wm2, temp_c, wind_mps
        FROM fact_weather
        WHERE site = $1
        ORDER BY ts_utc DESC
        LIMIT $2
        "#,
    )
    .bind(site)
    .bind(hours)
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows)
}

/// Most recent bronze rows for a site, returned oldest first.
pub async fn recent_raw_rows(pool: &PgPool, site: &str, hours: i64) -> Result<Vec<RawObservation>> {
    // ---
    let mut rows = sqlx::query_as::<_, RawObservation>(
        r#"
        SELECT site, ts_utc, ghi_wm2, t2m_c, ws10_mps, ingested_at
        FROM raw_weather
        WHERE site = $1
        ORDER BY ts_utc DESC
        LIMIT $2
        "#,
    )
    .bind(site)
    .bind(hours)
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows)
}

/// Sites that currently have bronze data, for dropdowns and 404 checks.
pub async fn list_sites(pool: &PgPool) -> Result<Vec<String>> {
    // ---
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT site FROM raw_weather ORDER BY site ASC")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(site,)| site).collect())
}

/// Which table a summary query targets. Table names are interpolated into
/// SQL, so they come from this closed enum rather than caller strings.
#[derive(Debug, Clone, Copy)]
pub enum Tier {
    Raw,
    Fact,
}

impl Tier {
    fn table(self) -> &'static str {
        match self {
            Tier::Raw => "raw_weather",
            Tier::Fact => "fact_weather",
        }
    }
}

/// Row count plus first/latest timestamps for one site in one tier.
pub async fn table_summary(pool: &PgPool, site: &str, tier: Tier) -> Result<TableSummary> {
    // ---
    let sql = format!(
        "SELECT COUNT(*) AS row_count, MIN(ts_utc) AS first_ts, MAX(ts_utc) AS latest_ts
         FROM {} WHERE site = $1",
        tier.table()
    );

    let (row_count, first_ts, latest_ts): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
        sqlx::query_as(&sql).bind(site).fetch_one(pool).await?;

    Ok(TableSummary {
        row_count,
        first_ts,
        latest_ts,
    })
}
