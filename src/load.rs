//! Loading and validation of CPU usage JSON documents.
//!
//! Three top-level shapes are accepted: a single record, a bare list of
//! records, and an object holding the list under `data`.

use crate::error::{CpuPlotError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

pub const TIMESTAMP_KEY: &str = "timestamp";
pub const CPU_USAGE_KEY: &str = "cpu_usage";
pub const DATA_KEY: &str = "data";

/// One timestamped snapshot of all the cores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: String,
    pub cpu_usage: Vec<CoreReading>,
}

/// One core within a [`SampleRecord`].
/// The core id stays raw here, it is coerced when the table is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreReading {
    pub cpu: Value,
    pub usr: f64,
    pub sys: f64,
    pub idle: f64,
}

/// The recognised top-level shapes of an input document.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDocument {
    Single(Map<String, Value>),
    Wrapped(Vec<Value>),
    Batch(Vec<Value>),
}

impl RawDocument {
    /// Sorts a parsed JSON value into one of the accepted shapes.
    /// A record carrying both required fields wins over a `data` list.
    pub fn classify(value: Value) -> Result<RawDocument> {
        match value {
            Value::Array(records) => Ok(RawDocument::Batch(records)),
            Value::Object(mut map) => {
                if map.contains_key(TIMESTAMP_KEY) && map.contains_key(CPU_USAGE_KEY) {
                    return Ok(RawDocument::Single(map));
                }
                match map.remove(DATA_KEY) {
                    Some(Value::Array(records)) => Ok(RawDocument::Wrapped(records)),
                    Some(other) => Err(CpuPlotError::InvalidSchema {
                        found: format!("an object whose \"data\" is {}", describe(&other)),
                    }),
                    None => Err(CpuPlotError::InvalidSchema {
                        found: "an object without \"timestamp\"/\"cpu_usage\" or \"data\"".to_string(),
                    }),
                }
            }
            other => Err(CpuPlotError::InvalidSchema {
                found: describe(&other),
            }),
        }
    }

    /// The candidate records, in document order.
    pub fn into_candidates(self) -> Vec<Value> {
        match self {
            RawDocument::Single(map) => vec![Value::Object(map)],
            RawDocument::Wrapped(records) | RawDocument::Batch(records) => records,
        }
    }
}

/// Parses, normalises, and validates the raw bytes of a document.
pub fn load_records(bytes: &[u8]) -> Result<Vec<SampleRecord>> {
    let value: Value = serde_json::from_slice(bytes).map_err(CpuPlotError::MalformedInput)?;
    let document = RawDocument::classify(value)?;
    let candidates = document.into_candidates();
    check_required_fields(&candidates)?;
    let records = candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| {
            serde_json::from_value::<SampleRecord>(candidate).map_err(|e| {
                CpuPlotError::InvalidRecord {
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect::<Result<Vec<SampleRecord>>>()?;
    debug!("loaded {} records", records.len());
    Ok(records)
}

/// Reads the whole file, then hands the bytes to [`load_records`].
pub fn load_file(path: &Path) -> Result<Vec<SampleRecord>> {
    let bytes = std::fs::read(path).map_err(|source| CpuPlotError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("read {} bytes from {}", bytes.len(), path.display());
    load_records(&bytes)
}

/// Stops at the first candidate that is not an object with both required fields.
fn check_required_fields(candidates: &[Value]) -> Result<()> {
    for (index, candidate) in candidates.iter().enumerate() {
        let map = match candidate.as_object() {
            Some(m) => m,
            None => {
                return Err(CpuPlotError::InvalidRecord {
                    index,
                    reason: format!("expected an object, found {}", describe(candidate)),
                })
            }
        };
        let missing: Vec<&str> = [TIMESTAMP_KEY, CPU_USAGE_KEY]
            .iter()
            .copied()
            .filter(|key| !map.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(CpuPlotError::InvalidRecord {
                index,
                reason: format!("missing '{}'", missing.join("' and '")),
            });
        }
    }
    Ok(())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
    .to_string()
}
