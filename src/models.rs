//! Data models for the bronze/silver weather pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Bronze-tier row: one raw sample for one site at one instant, exactly as
/// the provider reported it. Measurement fields are optional because the
/// provider may omit any parameter for any timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawObservation {
    // ---
    pub site: String,
    pub ts_utc: DateTime<Utc>,
    pub ghi_wm2: Option<f64>,
    pub t2m_c: Option<f64>,
    pub ws10_mps: Option<f64>,
    pub ingested_at: DateTime<Utc>,
}

/// Silver-tier row: one validated hourly record. All measurement fields are
/// required; rows that cannot supply all three never become facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FactObservation {
    // ---
    pub site: String,
    /// Top-of-hour timestamp, UTC.
    pub ts_utc: DateTime<Utc>,
    pub ghi_wm2: f64,
    pub temp_c: f64,
    pub wind_mps: f64,
}

/// Per-table summary served alongside row listings and metrics.
#[derive(Debug, Serialize, Deserialize)]
pub struct TableSummary {
    // ---
    pub row_count: i64,
    pub first_ts: Option<DateTime<Utc>>,
    pub latest_ts: Option<DateTime<Utc>>,
}

impl RawObservation {
    /// Provenance payload stored in the `raw_json` column next to the
    /// decomposed measurement fields.
    pub fn raw_payload(&self) -> serde_json::Value {
        // ---
        serde_json::json!({
            "source": "NASA_POWER",
            "ghi_wm2": self.ghi_wm2,
            "t2m_c": self.t2m_c,
            "ws10_mps": self.ws10_mps,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn raw_payload_carries_all_parameters() {
        // ---
        let raw = RawObservation {
            site: "chicago_il".to_string(),
            ts_utc: Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap(),
            ghi_wm2: Some(100.0),
            t2m_c: None,
            ws10_mps: Some(3.5),
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        };

        let payload = raw.raw_payload();
        assert_eq!(payload["source"], "NASA_POWER");
        assert_eq!(payload["ghi_wm2"], 100.0);
        assert!(payload["t2m_c"].is_null());
        assert_eq!(payload["ws10_mps"], 3.5);
    }
}
