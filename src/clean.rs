//! Bronze -> silver Cleaning Engine.
//!
//! Pure transformation: raw time-indexed samples in, validated hourly rows
//! out. No I/O happens here; `store` persists the result. The stages run in
//! a fixed order because the order is observable:
//!
//! 1. floor timestamps to the top of the hour (UTC)
//! 2. null out-of-range measurements, each field checked independently
//! 3. drop rows still missing any of the three measurements
//! 4. keep the latest `ingested_at` per (site, hour)
//! 5. project to [`FactObservation`]
//!
//! Validation runs before deduplication, so "latest" means latest among the
//! samples that survived validation. An hour whose only samples are invalid
//! produces no fact row at all.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

use crate::{FactObservation, RawObservation};

// ---

/// Valid temperature band in degrees Celsius.
const TEMP_MIN_C: f64 = -80.0;
const TEMP_MAX_C: f64 = 80.0;

/// Clean a window of raw samples into at most one fact row per (site, hour).
///
/// Empty input yields empty output. The function is deterministic: the same
/// input always produces the same rows in the same order (sorted by site,
/// then hour).
///
/// Returns an error only on an internal invariant violation: a surviving
/// timestamp that is not exactly on the hour. That signals a defect in this
/// module, not bad input data, and must halt the pipeline rather than let a
/// corrupt row reach `fact_weather`.
pub fn clean_to_hourly(rows: Vec<RawObservation>) -> Result<Vec<FactObservation>> {
    // ---
    let mut candidates: Vec<(DateTime<Utc>, RawObservation)> = Vec::with_capacity(rows.len());

    for row in rows {
        let hour = floor_to_hour(row.ts_utc)?;

        let ghi = validate_ghi(row.ghi_wm2);
        let temp = validate_temp(row.t2m_c);
        let wind = validate_wind(row.ws10_mps);

        // A row survives only if every measurement is present and in range.
        let (Some(ghi), Some(temp), Some(wind)) = (ghi, temp, wind) else {
            continue;
        };

        candidates.push((
            hour,
            RawObservation {
                ghi_wm2: Some(ghi),
                t2m_c: Some(temp),
                ws10_mps: Some(wind),
                ..row
            },
        ));
    }

    // Stable sort so that ties on ingested_at resolve to the later input row
    // once the map insertion below lets the last entry win.
    candidates.sort_by(|a, b| {
        (&a.1.site, a.0, a.1.ingested_at).cmp(&(&b.1.site, b.0, b.1.ingested_at))
    });

    let mut latest: BTreeMap<(String, DateTime<Utc>), RawObservation> = BTreeMap::new();
    for (hour, row) in candidates {
        latest.insert((row.site.clone(), hour), row);
    }

    let mut out = Vec::with_capacity(latest.len());
    for ((site, hour), row) in latest {
        check_hour_aligned(hour)?;
        out.push(FactObservation {
            site,
            ts_utc: hour,
            // Fields were validated to Some above.
            ghi_wm2: row.ghi_wm2.unwrap_or_default(),
            temp_c: row.t2m_c.unwrap_or_default(),
            wind_mps: row.ws10_mps.unwrap_or_default(),
        });
    }

    Ok(out)
}

// ---

/// Floor an instant to the start of its containing hour.
fn floor_to_hour(ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
    // ---
    Ok(ts.duration_trunc(Duration::hours(1))?)
}

/// Irradiance cannot be negative.
fn validate_ghi(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

/// Temperature outside [-80, 80] degrees C is a sensor fault.
fn validate_temp(value: Option<f64>) -> Option<f64> {
    value.filter(|v| (TEMP_MIN_C..=TEMP_MAX_C).contains(v))
}

/// Wind speed cannot be negative.
fn validate_wind(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

/// Postcondition for every row leaving the engine: minute, second, and
/// sub-second components must all be zero.
fn check_hour_aligned(ts: DateTime<Utc>) -> Result<()> {
    // ---
    if ts.minute() != 0 || ts.second() != 0 || ts.nanosecond() != 0 {
        bail!("non-hourly timestamp {ts} survived cleaning");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn raw(
        site: &str,
        ts: DateTime<Utc>,
        ghi: Option<f64>,
        temp: Option<f64>,
        wind: Option<f64>,
        ingested: DateTime<Utc>,
    ) -> RawObservation {
        // ---
        RawObservation {
            site: site.to_string(),
            ts_utc: ts,
            ghi_wm2: ghi,
            t2m_c: temp,
            ws10_mps: wind,
            ingested_at: ingested,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        // ---
        let out = clean_to_hourly(Vec::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn two_samples_in_one_hour_collapse_to_latest() {
        // ---
        let t1 = at(2024, 1, 2, 0, 0);
        let t2 = at(2024, 1, 2, 1, 0);
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 37), Some(100.0), Some(10.0), Some(3.0), t1),
            raw("A", at(2024, 1, 1, 5, 50), Some(110.0), Some(11.0), Some(4.0), t2),
        ];

        let out = clean_to_hourly(rows).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].site, "A");
        assert_eq!(out[0].ts_utc, at(2024, 1, 1, 5, 0));
        assert_eq!(out[0].ghi_wm2, 110.0);
        assert_eq!(out[0].temp_c, 11.0);
        assert_eq!(out[0].wind_mps, 4.0);
    }

    #[test]
    fn dedup_keeps_latest_ingested_regardless_of_input_order() {
        // ---
        let t1 = at(2024, 1, 2, 0, 0);
        let t2 = at(2024, 1, 2, 1, 0);
        // Later-ingested row appears first in the input.
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 50), Some(110.0), Some(11.0), Some(4.0), t2),
            raw("A", at(2024, 1, 1, 5, 37), Some(100.0), Some(10.0), Some(3.0), t1),
        ];

        let out = clean_to_hourly(rows).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ghi_wm2, 110.0);
    }

    #[test]
    fn ingested_at_tie_lets_later_input_row_win() {
        // ---
        let t = at(2024, 1, 2, 0, 0);
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 10), Some(100.0), Some(10.0), Some(3.0), t),
            raw("A", at(2024, 1, 1, 5, 20), Some(200.0), Some(20.0), Some(6.0), t),
        ];

        let out = clean_to_hourly(rows).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ghi_wm2, 200.0);
    }

    #[test]
    fn negative_ghi_drops_the_row() {
        // ---
        let rows = vec![raw(
            "A",
            at(2024, 1, 1, 5, 37),
            Some(-5.0),
            Some(10.0),
            Some(3.0),
            at(2024, 1, 2, 0, 0),
        )];

        let out = clean_to_hourly(rows).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn out_of_range_temperature_drops_the_row() {
        // ---
        for temp in [85.0, -90.0] {
            let rows = vec![raw(
                "A",
                at(2024, 1, 1, 5, 0),
                Some(100.0),
                Some(temp),
                Some(3.0),
                at(2024, 1, 2, 0, 0),
            )];
            assert!(clean_to_hourly(rows).unwrap().is_empty(), "temp={temp}");
        }
        // Boundary values are valid.
        for temp in [80.0, -80.0] {
            let rows = vec![raw(
                "A",
                at(2024, 1, 1, 5, 0),
                Some(100.0),
                Some(temp),
                Some(3.0),
                at(2024, 1, 2, 0, 0),
            )];
            assert_eq!(clean_to_hourly(rows).unwrap().len(), 1, "temp={temp}");
        }
    }

    #[test]
    fn negative_wind_drops_the_row() {
        // ---
        let rows = vec![raw(
            "A",
            at(2024, 1, 1, 5, 0),
            Some(100.0),
            Some(10.0),
            Some(-1.0),
            at(2024, 1, 2, 0, 0),
        )];
        assert!(clean_to_hourly(rows).unwrap().is_empty());
    }

    #[test]
    fn missing_field_drops_the_row() {
        // ---
        let rows = vec![raw(
            "A",
            at(2024, 1, 1, 5, 0),
            Some(100.0),
            None,
            Some(3.0),
            at(2024, 1, 2, 0, 0),
        )];
        assert!(clean_to_hourly(rows).unwrap().is_empty());
    }

    #[test]
    fn invalid_latest_sample_falls_back_to_earlier_valid_one() {
        // ---
        // Validation runs before dedup: the invalid latest-ingested sample
        // is dropped first, so the earlier valid sample becomes the sole
        // candidate for the hour and wins. Under dedup-first ordering the
        // hour would instead produce no row.
        let t1 = at(2024, 1, 2, 0, 0);
        let t2 = at(2024, 1, 2, 1, 0);
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 10), Some(100.0), Some(10.0), Some(3.0), t1),
            raw("A", at(2024, 1, 1, 5, 50), Some(110.0), Some(85.0), Some(4.0), t2),
        ];

        let out = clean_to_hourly(rows).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ghi_wm2, 100.0);
    }

    #[test]
    fn output_is_hour_aligned_and_utc() {
        // ---
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 37), Some(100.0), Some(10.0), Some(3.0), at(2024, 1, 2, 0, 0)),
            raw("A", at(2024, 1, 1, 6, 59), Some(50.0), Some(9.0), Some(2.0), at(2024, 1, 2, 0, 0)),
        ];

        let out = clean_to_hourly(rows).unwrap();
        assert_eq!(out.len(), 2);
        for fact in &out {
            assert_eq!(fact.ts_utc.minute(), 0);
            assert_eq!(fact.ts_utc.second(), 0);
            assert_eq!(fact.ts_utc.timezone(), Utc);
        }
    }

    #[test]
    fn multiple_sites_do_not_interfere() {
        // ---
        let ingested = at(2024, 1, 2, 0, 0);
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 10), Some(100.0), Some(10.0), Some(3.0), ingested),
            raw("B", at(2024, 1, 1, 5, 20), Some(200.0), Some(20.0), Some(6.0), ingested),
        ];

        let out = clean_to_hourly(rows).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].site, "A");
        assert_eq!(out[1].site, "B");
        assert_eq!(out[0].ts_utc, out[1].ts_utc);
    }

    #[test]
    fn cleaning_is_idempotent_over_the_same_input() {
        // ---
        let rows = vec![
            raw("A", at(2024, 1, 1, 5, 37), Some(100.0), Some(10.0), Some(3.0), at(2024, 1, 2, 0, 0)),
            raw("A", at(2024, 1, 1, 5, 50), Some(110.0), Some(11.0), Some(4.0), at(2024, 1, 2, 1, 0)),
            raw("A", at(2024, 1, 1, 6, 5), Some(-1.0), Some(12.0), Some(5.0), at(2024, 1, 2, 1, 0)),
        ];

        let first = clean_to_hourly(rows.clone()).unwrap();
        let second = clean_to_hourly(rows).unwrap();
        assert_eq!(first, second);
    }
}
