//! The flat, ordered CPU usage table and its time filter.

use crate::error::{CpuPlotError, Result};
use crate::load::SampleRecord;
use chrono::prelude::*;
use chrono::SecondsFormat;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Timestamp layouts with an explicit offset, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Timestamp layouts without an offset; these are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One core at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub timestamp: DateTime<Utc>,
    pub cpu: i64,
    pub usr: f64,
    pub sys: f64,
    pub idle: f64,
}

/// The main struct for the CPU usage time series,
/// always sorted by (timestamp, cpu).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CpuTable {
    rows: Vec<FlatRow>,
}

impl CpuTable {
    /// Flattens the records, one row per core reading,
    /// and sorts the result by (timestamp, cpu).
    pub fn from_records(records: &[SampleRecord]) -> Result<CpuTable> {
        let capacity = records.iter().map(|r| r.cpu_usage.len()).sum();
        let mut rows: Vec<FlatRow> = Vec::with_capacity(capacity);
        for record in records {
            // a record without readings yields no row, its timestamp is never used
            if record.cpu_usage.is_empty() {
                continue;
            }
            let timestamp = parse_timestamp(&record.timestamp)?;
            for reading in &record.cpu_usage {
                rows.push(FlatRow {
                    timestamp,
                    cpu: coerce_core_id(&reading.cpu)?,
                    usr: reading.usr,
                    sys: reading.sys,
                    idle: reading.idle,
                });
            }
        }
        debug!("flattened {} records into {} rows", records.len(), rows.len());
        Ok(CpuTable::from_rows(rows))
    }

    /// Takes rows in any order and returns the sorted table.
    pub fn from_rows(mut rows: Vec<FlatRow>) -> CpuTable {
        rows.sort_by(|a, b| (a.timestamp, a.cpu).cmp(&(b.timestamp, b.cpu)));
        CpuTable { rows }
    }

    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps the rows with start <= timestamp <= end; a missing bound is open.
    /// takes a reference and returns a new CpuTable
    pub fn filter_time(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> CpuTable {
        let rows: Vec<FlatRow> = self
            .rows
            .iter()
            .filter(|r| start.map_or(true, |s| r.timestamp >= s))
            .filter(|r| end.map_or(true, |e| r.timestamp <= e))
            .cloned()
            .collect();
        debug!("time filter kept {} of {} rows", rows.len(), self.rows.len());
        CpuTable { rows }
    }

    /// Distinct timestamps, ascending.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        let mut timestamps: Vec<DateTime<Utc>> = self.rows.iter().map(|r| r.timestamp).collect();
        timestamps.dedup();
        timestamps
    }

    /// Distinct core ids, ascending.
    pub fn cores(&self) -> Vec<i64> {
        let mut cores: Vec<i64> = self.rows.iter().map(|r| r.cpu).collect();
        cores.sort_unstable();
        cores.dedup();
        cores
    }

    /// Regroups the rows by timestamp, listing the cores seen at each one.
    pub fn cores_by_timestamp(&self) -> BTreeMap<DateTime<Utc>, Vec<i64>> {
        let mut groups: BTreeMap<DateTime<Utc>, Vec<i64>> = BTreeMap::new();
        for r in &self.rows {
            groups.entry(r.timestamp).or_insert_with(Vec::new).push(r.cpu);
        }
        groups
    }

    /// First and last timestamp, None for an empty table.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Fails on the first (timestamp, cpu) pair that appears more than once.
    /// Relies on the table ordering: duplicates are always adjacent.
    pub fn ensure_unique_cells(&self) -> Result<()> {
        for pair in self.rows.windows(2) {
            if pair[0].timestamp == pair[1].timestamp && pair[0].cpu == pair[1].cpu {
                return Err(CpuPlotError::AmbiguousPivot {
                    timestamp: pair[0].timestamp,
                    cpu: pair[0].cpu,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for CpuTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "timestamp,cpu,usr,sys,idle")?;
        for r in &self.rows {
            writeln!(
                f,
                "{},{},{},{},{}",
                r.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                r.cpu,
                r.usr,
                r.sys,
                r.idle
            )?;
        }
        Ok(())
    }
}

/// Builds the sorted table from validated records.
pub fn build_table(records: &[SampleRecord]) -> Result<CpuTable> {
    CpuTable::from_records(records)
}

/// Parses an ISO-8601-like timestamp into UTC.
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(CpuPlotError::InvalidTimestamp(s.to_string()))
}

/// Accepts integers, integral floats, and strings holding an integer.
pub fn coerce_core_id(value: &Value) -> Result<i64> {
    let coerced = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    coerced.ok_or_else(|| CpuPlotError::InvalidCoreId(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{load_records, CoreReading};
    use serde_json::json;

    fn reading(cpu: Value, usr: f64) -> CoreReading {
        CoreReading {
            cpu,
            usr,
            sys: 1.0,
            idle: 99.0 - usr,
        }
    }

    fn record(timestamp: &str, cpus: &[i64]) -> SampleRecord {
        SampleRecord {
            timestamp: timestamp.to_string(),
            cpu_usage: cpus
                .iter()
                .map(|&c| reading(json!(c), c as f64 * 10.0))
                .collect(),
        }
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 25, h, m, 0).unwrap()
    }

    fn sample_table() -> CpuTable {
        build_table(&[
            record("2025-03-25T16:00:00Z", &[0, 1]),
            record("2025-03-25T16:10:00Z", &[0, 1]),
            record("2025-03-25T16:20:00Z", &[0, 1]),
            record("2025-03-25T16:30:00Z", &[0, 1]),
        ])
        .unwrap()
    }

    #[test]
    fn test_two_core_example() {
        let doc = r#"[{"timestamp":"2025-03-25T16:00:00Z","cpu_usage":[{"cpu":0,"usr":10,"sys":5,"idle":85},{"cpu":1,"usr":20,"sys":10,"idle":70}]}]"#;
        let table = build_table(&load_records(doc.as_bytes()).unwrap()).unwrap();
        let expected = vec![
            FlatRow {
                timestamp: utc(16, 0),
                cpu: 0,
                usr: 10.0,
                sys: 5.0,
                idle: 85.0,
            },
            FlatRow {
                timestamp: utc(16, 0),
                cpu: 1,
                usr: 20.0,
                sys: 10.0,
                idle: 70.0,
            },
        ];
        assert_eq!(table.rows(), &expected[..]);
    }

    #[test]
    fn test_order_does_not_depend_on_input_order() {
        let forward = build_table(&[
            record("2025-03-25T16:00:00Z", &[0, 1, 2]),
            record("2025-03-25T16:01:00Z", &[0, 1, 2]),
        ])
        .unwrap();
        let shuffled = build_table(&[
            record("2025-03-25T16:01:00Z", &[2, 0, 1]),
            record("2025-03-25T16:00:00Z", &[1, 2, 0]),
        ])
        .unwrap();
        assert_eq!(forward, shuffled);
        let keys: Vec<(DateTime<Utc>, i64)> =
            forward.rows().iter().map(|r| (r.timestamp, r.cpu)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(CpuTable::from_rows(forward.rows().to_vec()), forward);
    }

    #[test]
    fn test_offsets_are_normalised_to_utc() {
        let table = build_table(&[
            record("2025-03-25T17:00:00+01:00", &[1]),
            record("2025-03-25T16:00:00Z", &[0]),
        ])
        .unwrap();
        assert_eq!(table.timestamps(), vec![utc(16, 0)]);
        assert_eq!(table.cores(), vec![0, 1]);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = utc(16, 0);
        for s in [
            "2025-03-25T16:00:00Z",
            "2025-03-25T16:00:00+00:00",
            "2025-03-25T18:00:00+0200",
            "2025-03-25T16:00:00",
            "2025-03-25 16:00:00",
            "2025-03-25T16:00:00.000",
            "2025-03-25T16:00",
            " 2025-03-25T16:00:00Z ",
        ]
        .iter()
        {
            assert_eq!(parse_timestamp(s).unwrap(), expected, "parsing {}", s);
        }
        assert_eq!(
            parse_timestamp("2025-03-25").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 25, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_timestamp_names_value() {
        let err = build_table(&[record("25/03/2025 at four", &[0])]).unwrap_err();
        match err {
            CpuPlotError::InvalidTimestamp(v) => assert_eq!(v, "25/03/2025 at four"),
            other => panic!("expected InvalidTimestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_of_empty_record_is_not_parsed() {
        let table = build_table(&[
            record("garbage", &[]),
            record("2025-03-25T16:00:00Z", &[0]),
        ])
        .unwrap();
        assert_eq!(table.len(), 1);
        assert!(matches!(
            build_table(&[record("garbage", &[0])]),
            Err(CpuPlotError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_core_id_coercion() {
        assert_eq!(coerce_core_id(&json!(3)).unwrap(), 3);
        assert_eq!(coerce_core_id(&json!("12")).unwrap(), 12);
        assert_eq!(coerce_core_id(&json!(" 7 ")).unwrap(), 7);
        assert_eq!(coerce_core_id(&json!(4.0)).unwrap(), 4);
        for bad in [json!("all"), json!(1.5), json!(null), json!(true), json!([0])].iter() {
            assert!(
                matches!(coerce_core_id(bad), Err(CpuPlotError::InvalidCoreId(_))),
                "{} should not coerce",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_core_id_fails_build() {
        let records = vec![SampleRecord {
            timestamp: "2025-03-25T16:00:00Z".to_string(),
            cpu_usage: vec![reading(json!(0), 1.0), reading(json!("all"), 2.0)],
        }];
        match build_table(&records).unwrap_err() {
            CpuPlotError::InvalidCoreId(v) => assert_eq!(v, "\"all\""),
            other => panic!("expected InvalidCoreId, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_without_bounds_is_identity() {
        let table = sample_table();
        assert_eq!(table.filter_time(None, None), table);
    }

    #[test]
    fn test_filter_bounds_are_inclusive() {
        let table = sample_table();
        let filtered = table.filter_time(Some(utc(16, 10)), Some(utc(16, 20)));
        assert_eq!(filtered.timestamps(), vec![utc(16, 10), utc(16, 20)]);
        assert_eq!(filtered.len(), 4);
        assert_eq!(table.len(), 8);

        let from = table.filter_time(Some(utc(16, 20)), None);
        assert_eq!(from.timestamps(), vec![utc(16, 20), utc(16, 30)]);
        let until = table.filter_time(None, Some(utc(16, 0)));
        assert_eq!(until.timestamps(), vec![utc(16, 0)]);
    }

    #[test]
    fn test_filter_narrowing_never_grows() {
        let table = sample_table();
        let mut previous = table.len();
        for (start, end) in [
            (utc(15, 0), utc(17, 0)),
            (utc(16, 0), utc(16, 30)),
            (utc(16, 5), utc(16, 30)),
            (utc(16, 5), utc(16, 25)),
            (utc(16, 15), utc(16, 15)),
        ]
        .iter()
        {
            let n = table.filter_time(Some(*start), Some(*end)).len();
            assert!(n <= previous);
            previous = n;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_filter_after_last_sample_is_empty() {
        let table = build_table(&[record("2025-03-25T16:00:00Z", &[0, 1])]).unwrap();
        let filtered = table.filter_time(Some(utc(16, 30)), None);
        assert!(filtered.is_empty());
        assert_eq!(filtered.time_span(), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_regrouping_restores_core_sets() {
        let records = vec![
            record("2025-03-25T16:00:00Z", &[0, 1, 2, 3]),
            record("2025-03-25T16:01:00Z", &[0, 2]),
            record("2025-03-25T16:02:00Z", &[]),
            record("2025-03-25T16:03:00Z", &[1]),
        ];
        let table = build_table(&records).unwrap();
        let groups = table.cores_by_timestamp();
        for r in &records {
            let ts = parse_timestamp(&r.timestamp).unwrap();
            let mut expected: Vec<i64> = r
                .cpu_usage
                .iter()
                .map(|c| coerce_core_id(&c.cpu).unwrap())
                .collect();
            expected.sort_unstable();
            if expected.is_empty() {
                assert!(!groups.contains_key(&ts));
            } else {
                assert_eq!(groups[&ts], expected);
            }
        }
        assert_eq!(table.len(), 7);
    }

    #[test]
    fn test_duplicate_cells_are_detected() {
        let table = build_table(&[
            record("2025-03-25T16:00:00Z", &[0, 1]),
            record("2025-03-25T16:00:00Z", &[1]),
        ])
        .unwrap();
        match table.ensure_unique_cells().unwrap_err() {
            CpuPlotError::AmbiguousPivot { timestamp, cpu } => {
                assert_eq!(timestamp, utc(16, 0));
                assert_eq!(cpu, 1);
            }
            other => panic!("expected AmbiguousPivot, got {:?}", other),
        }
        assert!(sample_table().ensure_unique_cells().is_ok());
    }

    #[test]
    fn test_display_as_csv() {
        let table = build_table(&[record("2025-03-25T16:00:00Z", &[1])]).unwrap();
        assert_eq!(
            table.to_string(),
            "timestamp,cpu,usr,sys,idle\n2025-03-25T16:00:00Z,1,10,1,89\n"
        );
    }
}
