//! NASA POWER hourly ingestion: fetch, parse, and align provider payloads
//! into bronze [`RawObservation`] rows.
//!
//! The provider encodes each parameter either as a per-day array of 24
//! hourly values keyed by `YYYYMMDD`, or as a flat map keyed by a compact
//! `YYYYMMDDHH` datetime string. Both are normalized into a
//! timestamp-indexed series; keys that fit neither format are skipped so a
//! surprise in one record cannot abort the whole window.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration as StdDuration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::{store, Config, RawObservation};

// ---

/// GHI, 2-meter temperature, 10-meter wind speed.
const PARAMS: [&str; 3] = ["ALLSKY_SFC_SW_DWN", "T2M", "WS10M"];

const FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// A single parameter's values indexed by UTC timestamp. Values stay
/// optional end to end; the provider uses null for hours it has no data for.
type Series = BTreeMap<DateTime<Utc>, Option<f64>>;

/// Compose the POWER endpoint URL with consistent query parameters.
fn build_power_url(base: &str, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> String {
    // ---
    format!(
        "{base}?parameters={params}&community=RE&longitude={lon}&latitude={lat}\
         &start={start}&end={end}&format=JSON&time-standard=UTC",
        params = PARAMS.join(","),
        start = start.format("%Y%m%d"),
        end = end.format("%Y%m%d"),
    )
}

/// Fetch one date window of hourly data from the provider.
async fn fetch_power(
    base: &str,
    lat: f64,
    lon: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Value> {
    // ---
    let url = build_power_url(base, lat, lon, start, end);
    debug!("Fetching POWER window: {}", url);

    let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("POWER request failed: {url}"))?
        .error_for_status()
        .with_context(|| format!("POWER returned error status: {url}"))?;

    Ok(response.json().await?)
}

/// Normalize one parameter object into a timestamp-keyed series, accepting
/// both provider encodings. Unparseable keys are skipped, not fatal.
fn series_from_param(param: &Value) -> Series {
    // ---
    let mut series = Series::new();
    let Some(map) = param.as_object() else {
        return series;
    };

    for (key, value) in map {
        match value {
            Value::Array(hourly) => {
                // Per-day encoding: key is YYYYMMDD, index is hour of day.
                let Ok(date) = NaiveDate::parse_from_str(key, "%Y%m%d") else {
                    warn!("Skipping unparseable POWER date key: {}", key);
                    continue;
                };
                for (hour, hourly_value) in hourly.iter().enumerate() {
                    let Some(ts) = date
                        .and_hms_opt(hour as u32, 0, 0)
                        .map(|naive| Utc.from_utc_datetime(&naive))
                    else {
                        continue;
                    };
                    series.insert(ts, hourly_value.as_f64());
                }
            }
            _ => {
                // Flat encoding: first ten characters form YYYYMMDDHH.
                let Some(ts) = parse_compact_key(key) else {
                    warn!("Skipping unparseable POWER datetime key: {}", key);
                    continue;
                };
                series.insert(ts, value.as_f64());
            }
        }
    }

    series
}

/// Parse a compact `YYYYMMDDHH` datetime key; extra trailing characters are
/// ignored. Returns `None` for anything that does not fit the format.
fn parse_compact_key(key: &str) -> Option<DateTime<Utc>> {
    // ---
    if key.len() < 10 || !key.is_char_boundary(8) || !key.is_char_boundary(10) {
        return None;
    }
    let date = NaiveDate::parse_from_str(&key[..8], "%Y%m%d").ok()?;
    let hour: u32 = key[8..10].parse().ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Pull the parameters we care about out of `properties.parameter`.
fn parse_power_json(payload: &Value) -> BTreeMap<&'static str, Series> {
    // ---
    let params = &payload["properties"]["parameter"];

    PARAMS
        .iter()
        .map(|name| (*name, series_from_param(&params[*name])))
        .collect()
}

/// Align all parameter series on the union of their timestamps and emit one
/// row per timestamp, each measurement optionally absent.
fn merge_params_to_rows(
    site: &str,
    series_map: &BTreeMap<&'static str, Series>,
    ingested_at: DateTime<Utc>,
) -> Vec<RawObservation> {
    // ---
    let mut timestamps: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    for series in series_map.values() {
        timestamps.extend(series.keys().copied());
    }

    timestamps
        .into_iter()
        .map(|ts| RawObservation {
            site: site.to_string(),
            ts_utc: ts,
            ghi_wm2: lookup(series_map, "ALLSKY_SFC_SW_DWN", ts),
            t2m_c: lookup(series_map, "T2M", ts),
            ws10_mps: lookup(series_map, "WS10M", ts),
            ingested_at,
        })
        .collect()
}

fn lookup(series_map: &BTreeMap<&'static str, Series>, name: &str, ts: DateTime<Utc>) -> Option<f64> {
    series_map.get(name).and_then(|s| s.get(&ts).copied().flatten())
}

// ---

/// Parameters for one ingestion run. Dates are inclusive on both ends.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub site: String,
    pub lat: f64,
    pub lon: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub chunk_days: u32,
}

impl IngestRequest {
    /// Fill in site/coordinate defaults from config, with explicit query
    /// values taking precedence.
    pub fn from_config(cfg: &Config, start: NaiveDate, end: NaiveDate) -> Self {
        // ---
        Self {
            site: cfg.site_name.clone(),
            lat: cfg.site_lat,
            lon: cfg.site_lon,
            start,
            end,
            chunk_days: cfg.chunk_days,
        }
    }
}

/// Fetch the requested date range in `chunk_days`-sized windows and upsert
/// each window into `raw_weather`. Chunks run strictly sequentially; the
/// returned count is the total number of rows presented to the writer.
pub async fn run_ingest(pool: &PgPool, cfg: &Config, req: &IngestRequest) -> Result<u64> {
    // ---
    if req.end < req.start {
        bail!("end date {} precedes start date {}", req.end, req.start);
    }
    let chunk_days = req.chunk_days.max(1) as i64;

    let mut total: u64 = 0;
    let mut cursor = req.start;
    while cursor <= req.end {
        let chunk_end = (cursor + Duration::days(chunk_days - 1)).min(req.end);

        let payload = fetch_power(&cfg.power_api_url, req.lat, req.lon, cursor, chunk_end).await?;
        let series_map = parse_power_json(&payload);
        let rows = merge_params_to_rows(&req.site, &series_map, Utc::now());

        total += store::upsert_raw(pool, &rows).await?;
        debug!(
            "Ingested chunk {}..={} for site {}: {} rows",
            cursor,
            chunk_end,
            req.site,
            rows.len()
        );

        cursor = chunk_end + Duration::days(1);
    }

    info!("Ingest complete for site {}: {} rows upserted", req.site, total);
    Ok(total)
}
