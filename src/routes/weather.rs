//! Read-only query boundary over the bronze and silver tables.
//!
//! Sibling module of the `routes` gateway (EMBP): exports one subrouter with
//! the `/weather/*` endpoints consumed by the dashboard. All endpoints
//! resolve the target site against the sites that actually have bronze data
//! and answer 404 for an unknown site rather than returning empty rows.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::get, Json,
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error};

use crate::store::{self, Tier};
use crate::{Config, FactObservation, RawObservation, TableSummary};

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/weather/sites", get(sites))
        .route("/weather/hourly", get(hourly))
        .route("/weather/raw", get(raw))
        .route("/weather/metrics", get(metrics))
}

/// Query parameters shared by the listing endpoints.
#[derive(Debug, Deserialize)]
struct WeatherQuery {
    /// Site identifier; defaults to the configured `SITE_NAME`.
    site: Option<String>,
    /// Number of recent hours to return (1..=336, default 24).
    hours: Option<i64>,
}

#[derive(Serialize)]
struct SitesResponse {
    sites: Vec<String>,
}

#[derive(Serialize)]
struct HourlyResponse {
    site: String,
    hours: i64,
    rows: Vec<FactObservation>,
    summary: TableSummary,
}

#[derive(Serialize)]
struct RawResponse {
    site: String,
    hours: i64,
    rows: Vec<RawObservation>,
    summary: TableSummary,
}

#[derive(Serialize)]
struct MetricsResponse {
    site: String,
    raw: TableSummary,
    fact: TableSummary,
    dropped_rows: i64,
    /// `fact / raw * 100`; absent when there are no raw rows yet.
    kept_percentage: Option<f64>,
}

// ---

async fn sites(State((pool, _config)): State<(PgPool, Config)>) -> impl IntoResponse {
    // ---
    match store::list_sites(&pool).await {
        Ok(sites) => (StatusCode::OK, Json(SitesResponse { sites })).into_response(),
        Err(e) => {
            error!("Failed to list sites: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to list sites")).into_response()
        }
    }
}

async fn hourly(
    Query(params): Query<WeatherQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    let hours = clamp_hours(params.hours);
    let site = match resolve_site(&pool, params.site.as_deref(), &config).await {
        Ok(site) => site,
        Err(resp) => return resp,
    };

    debug!("GET /weather/hourly site={} hours={}", site, hours);

    let result = async {
        let rows = store::recent_fact_rows(&pool, &site, hours).await?;
        let summary = store::table_summary(&pool, &site, Tier::Fact).await?;
        anyhow::Ok((rows, summary))
    }
    .await;

    match result {
        Ok((rows, summary)) => (
            StatusCode::OK,
            Json(HourlyResponse {
                site,
                hours,
                rows,
                summary,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to fetch hourly rows: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to fetch rows")).into_response()
        }
    }
}

async fn raw(
    Query(params): Query<WeatherQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    let hours = clamp_hours(params.hours);
    let site = match resolve_site(&pool, params.site.as_deref(), &config).await {
        Ok(site) => site,
        Err(resp) => return resp,
    };

    debug!("GET /weather/raw site={} hours={}", site, hours);

    let result = async {
        let rows = store::recent_raw_rows(&pool, &site, hours).await?;
        let summary = store::table_summary(&pool, &site, Tier::Raw).await?;
        anyhow::Ok((rows, summary))
    }
    .await;

    match result {
        Ok((rows, summary)) => (
            StatusCode::OK,
            Json(RawResponse {
                site,
                hours,
                rows,
                summary,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to fetch raw rows: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to fetch rows")).into_response()
        }
    }
}

async fn metrics(
    Query(params): Query<WeatherQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> impl IntoResponse {
    // ---
    let site = match resolve_site(&pool, params.site.as_deref(), &config).await {
        Ok(site) => site,
        Err(resp) => return resp,
    };

    let result = async {
        let raw = store::table_summary(&pool, &site, Tier::Raw).await?;
        let fact = store::table_summary(&pool, &site, Tier::Fact).await?;
        anyhow::Ok((raw, fact))
    }
    .await;

    match result {
        Ok((raw, fact)) => {
            let response = build_metrics(site, raw, fact);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Failed to compute metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to compute metrics")).into_response()
        }
    }
}

// ---

fn clamp_hours(hours: Option<i64>) -> i64 {
    hours.unwrap_or(24).clamp(1, 336)
}

/// Raw-vs-fact comparison; kept percentage is undefined (not a division
/// error) while the raw table is empty.
fn build_metrics(site: String, raw: TableSummary, fact: TableSummary) -> MetricsResponse {
    // ---
    let kept_percentage = if raw.row_count > 0 {
        Some(fact.row_count as f64 / raw.row_count as f64 * 100.0)
    } else {
        None
    };
    let dropped_rows = (raw.row_count - fact.row_count).max(0);

    MetricsResponse {
        site,
        raw,
        fact,
        dropped_rows,
        kept_percentage,
    }
}

/// Resolve the target site (query param or configured default) and answer
/// 404 when it has no data. An empty warehouse accepts any site so the first
/// ingest can be observed through these endpoints.
async fn resolve_site(
    pool: &PgPool,
    requested: Option<&str>,
    config: &Config,
) -> Result<String, axum::response::Response> {
    // ---
    let target = requested.unwrap_or(&config.site_name).to_string();

    let sites = match store::list_sites(pool).await {
        Ok(sites) => sites,
        Err(e) => {
            error!("Failed to list sites: {}", e);
            return Err(
                (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to list sites")).into_response(),
            );
        }
    };

    if !sites.is_empty() && !sites.contains(&target) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(format!("Unknown site '{target}'")),
        )
            .into_response());
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn summary(count: i64) -> TableSummary {
        TableSummary {
            row_count: count,
            first_ts: None,
            latest_ts: None,
        }
    }

    #[test]
    fn kept_percentage_is_none_when_raw_table_is_empty() {
        // ---
        let m = build_metrics("A".into(), summary(0), summary(0));
        assert!(m.kept_percentage.is_none());
        assert_eq!(m.dropped_rows, 0);
    }

    #[test]
    fn kept_percentage_compares_fact_to_raw() {
        // ---
        let m = build_metrics("A".into(), summary(200), summary(150));
        assert_eq!(m.kept_percentage, Some(75.0));
        assert_eq!(m.dropped_rows, 50);
    }

    #[test]
    fn dropped_rows_never_goes_negative() {
        // ---
        let m = build_metrics("A".into(), summary(10), summary(12));
        assert_eq!(m.dropped_rows, 0);
    }

    #[test]
    fn hours_are_clamped_to_the_allowed_window() {
        // ---
        assert_eq!(clamp_hours(None), 24);
        assert_eq!(clamp_hours(Some(0)), 1);
        assert_eq!(clamp_hours(Some(100)), 100);
        assert_eq!(clamp_hours(Some(1000)), 336);
    }
}
