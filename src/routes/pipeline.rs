//! Pipeline trigger endpoints: bronze ingestion and the bronze -> silver
//! transform.
//!
//! Sibling module of the `routes` gateway (EMBP). Both endpoints run the
//! whole operation synchronously inside the request, mirroring how the rest
//! of the service treats the pipeline as a sequence of blocking steps per
//! window. Dates arrive as compact `YYYYMMDD` strings, inclusive on both
//! ends.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::post, Json,
    Router,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, info};

use crate::power::{self, IngestRequest};
use crate::{clean, store, Config};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/pipeline/ingest", post(ingest))
        .route("/pipeline/clean", post(run_clean))
}

#[derive(Debug, Deserialize)]
struct IngestParams {
    site: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    /// Inclusive start date, `YYYYMMDD`.
    start: String,
    /// Inclusive end date, `YYYYMMDD`.
    end: String,
    chunk_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CleanParams {
    site: Option<String>,
    /// Inclusive start date, `YYYYMMDD`.
    start: String,
    /// Inclusive end date, `YYYYMMDD`.
    end: String,
}

#[derive(Serialize)]
struct PipelineResponse {
    site: String,
    rows_written: u64,
}

// ---

/// Handle `POST /pipeline/ingest`: fetch the provider window and upsert the
/// resulting bronze rows.
async fn ingest(
    Query(params): Query<IngestParams>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    let (start, end) = match parse_date_range(&params.start, &params.end) {
        Ok(range) => range,
        Err(resp) => return resp,
    };

    let mut req = IngestRequest::from_config(&config, start, end);
    if let Some(site) = params.site {
        req.site = site;
    }
    if let Some(lat) = params.lat {
        req.lat = lat;
    }
    if let Some(lon) = params.lon {
        req.lon = lon;
    }
    if let Some(chunk_days) = params.chunk_days {
        req.chunk_days = chunk_days;
    }

    info!(
        "POST /pipeline/ingest site={} range={}..={}",
        req.site, req.start, req.end
    );

    match power::run_ingest(&pool, &config, &req).await {
        Ok(rows_written) => (
            StatusCode::OK,
            Json(PipelineResponse {
                site: req.site,
                rows_written,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Ingest failed for site {}: {}", req.site, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Ingest failed")).into_response()
        }
    }
}

/// Handle `POST /pipeline/clean`: read the bronze window, run the Cleaning
/// Engine, and upsert the surviving hourly rows into `fact_weather`.
async fn run_clean(
    Query(params): Query<CleanParams>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    let (start, end) = match parse_date_range(&params.start, &params.end) {
        Ok(range) => range,
        Err(resp) => return resp,
    };
    let site = params.site.unwrap_or_else(|| config.site_name.clone());

    // Inclusive end date becomes an exclusive timestamp bound one day later.
    let start_ts = Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap_or_default());
    let end_ts =
        Utc.from_utc_datetime(&(end + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap_or_default());

    info!(
        "POST /pipeline/clean site={} window={}..{}",
        site, start_ts, end_ts
    );

    let result = async {
        let raw = store::fetch_raw_window(&pool, &site, start_ts, end_ts).await?;
        let cleaned = clean::clean_to_hourly(raw)?;
        store::upsert_fact(&pool, &cleaned).await
    }
    .await;

    match result {
        Ok(rows_written) => {
            info!("Clean complete: site={} rows_written={}", site, rows_written);
            (
                StatusCode::OK,
                Json(PipelineResponse { site, rows_written }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Clean failed for site {}: {}", site, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Clean failed")).into_response()
        }
    }
}

// ---

/// Parse the compact date pair, answering 400 for malformed or inverted
/// ranges before any work is attempted.
fn parse_date_range(
    start: &str,
    end: &str,
) -> Result<(NaiveDate, NaiveDate), axum::response::Response> {
    // ---
    let parse = |value: &str| NaiveDate::parse_from_str(value, "%Y%m%d");

    let (Ok(start), Ok(end)) = (parse(start), parse(end)) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json("Dates must be YYYYMMDD".to_string()),
        )
            .into_response());
    };

    if end < start {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(format!("End date {end} precedes start date {start}")),
        )
            .into_response());
    }

    Ok((start, end))
}
