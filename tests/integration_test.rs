use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use reqwest::Client;
use serde::Deserialize;

// ---

#[derive(Debug, Deserialize)]
struct FactRow {
    site: String,
    ts_utc: DateTime<Utc>,
    ghi_wm2: f64,
    temp_c: f64,
    wind_mps: f64,
}

#[derive(Debug, Deserialize)]
struct Summary {
    row_count: i64,
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    site: String,
    rows: Vec<FactRow>,
    summary: Summary,
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    raw: Summary,
    fact: Summary,
    dropped_rows: i64,
    kept_percentage: Option<f64>,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

// ---

#[tokio::test]
async fn health_endpoint_responds_ok() -> Result<()> {
    // ---
    let url = format!("{}/health", base_url());
    let response: serde_json::Value = Client::new().get(&url).send().await?.json().await?;
    assert_eq!(response["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn hourly_rows_are_aligned_complete_and_chronological() -> Result<()> {
    // ---
    let url = format!("{}/weather/hourly?hours=48", base_url());
    let body: HourlyResponse = Client::new().get(&url).send().await?.json().await?;

    assert!(!body.site.is_empty(), "site should not be empty");
    assert!(body.rows.len() <= 48, "hours bound not respected");
    assert!(
        body.summary.row_count >= body.rows.len() as i64,
        "summary count below returned rows"
    );

    for row in &body.rows {
        // Silver rows are always on the hour, UTC, fully populated.
        assert_eq!(row.ts_utc.minute(), 0, "non-hourly ts: {}", row.ts_utc);
        assert_eq!(row.ts_utc.second(), 0, "non-hourly ts: {}", row.ts_utc);
        assert_eq!(row.site, body.site);
        assert!(row.ghi_wm2.is_finite());
        assert!(row.temp_c.is_finite());
        assert!(row.wind_mps.is_finite());
        assert!((-80.0..=80.0).contains(&row.temp_c));
        assert!(row.ghi_wm2 >= 0.0);
        assert!(row.wind_mps >= 0.0);
    }

    for pair in body.rows.windows(2) {
        assert!(
            pair[0].ts_utc < pair[1].ts_utc,
            "rows not in chronological order"
        );
    }

    Ok(())
}

#[tokio::test]
async fn metrics_compare_raw_and_fact_counts() -> Result<()> {
    // ---
    let url = format!("{}/weather/metrics", base_url());
    let metrics: MetricsResponse = Client::new().get(&url).send().await?.json().await?;

    assert!(metrics.dropped_rows >= 0);

    match metrics.kept_percentage {
        Some(pct) => {
            assert!(metrics.raw.row_count > 0);
            let expected = metrics.fact.row_count as f64 / metrics.raw.row_count as f64 * 100.0;
            assert!((pct - expected).abs() < 1e-9, "kept_percentage mismatch");
        }
        None => {
            // Undefined, not a division error, when the raw table is empty.
            assert_eq!(metrics.raw.row_count, 0);
        }
    }

    Ok(())
}

#[tokio::test]
async fn unknown_site_returns_not_found() -> Result<()> {
    // ---
    let client = Client::new();

    // Only meaningful once at least one site exists; an empty warehouse
    // accepts any site so the first ingest can be observed.
    let sites: serde_json::Value = client
        .get(format!("{}/weather/sites", base_url()))
        .send()
        .await?
        .json()
        .await?;
    let have_sites = sites["sites"].as_array().map_or(false, |s| !s.is_empty());
    if !have_sites {
        return Ok(());
    }

    let url = format!(
        "{}/weather/hourly?site=definitely-not-a-site",
        base_url()
    );
    let response = client.get(&url).send().await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    Ok(())
}
