use std::collections::HashMap;
use std::fs;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::debug_trace;
use crate::errors::{Result, TuneError};

pub type Metrics = HashMap<String, f64>;
pub type Flags = HashMap<String, String>;

/// One slow-query log record. `duration_ms` is None when the duration field
/// of the source line contained no digits - such records are kept for context
/// but excluded from duration-based rules.
#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlowQuery {
    pub timestamp: String,
    pub duration_ms: Option<u64>,
    pub query: String,
}

/// Canonical view of one telemetry snapshot. Built once per run, never
/// mutated afterwards.
#[derive(Default, Debug, Clone)]
pub struct Telemetry {
    pub metrics: Metrics,
    pub flags: Flags,
    pub slow_queries: Vec<SlowQuery>,
}

impl Telemetry {
    pub fn load(metrics_path: &str, flags_path: &str, slow_log_path: &str) -> Result<Telemetry> {
        Ok(Telemetry {
            metrics: load_metrics(metrics_path)?,
            flags: load_flags(flags_path)?,
            slow_queries: load_slow_queries(slow_log_path)?,
        })
    }
}

fn read_source(path: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|source| TuneError::Input {
        path: path.to_string(),
        source,
    })
}

/// Metrics snapshot: a flat JSON object of numeric values. Missing keys are
/// treated as zero at rule evaluation time, but a file that is not a numeric
/// JSON object is a fatal input error.
pub fn load_metrics(path: &str) -> Result<Metrics> {
    let raw = read_source(path)?;
    let metrics: Metrics =
        serde_json::from_str(&raw).map_err(|source| TuneError::BadMetrics {
            path: path.to_string(),
            source,
        })?;
    debug_trace!("loaded {} metrics from {}", metrics.len(), path);
    Ok(metrics)
}

pub fn load_flags(path: &str) -> Result<Flags> {
    let raw = read_source(path)?;
    Ok(parse_flags(&raw))
}

/// Database flags: one key=value per line, # comments and blank lines
/// ignored, last duplicate key wins. Lines without '=' are skipped.
pub fn parse_flags(content: &str) -> Flags {
    let mut flags = Flags::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            flags.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    flags
}

pub fn load_slow_queries(path: &str) -> Result<Vec<SlowQuery>> {
    let raw = read_source(path)?;
    Ok(parse_slow_queries(&raw))
}

/// Slow-query log: one record per line, pipe-delimited as
/// `timestamp | duration | query`. The query text may itself contain pipes,
/// so everything after the second delimiter is rejoined. Lines with fewer
/// than 3 segments are silently skipped - this parser is tolerant, not
/// validating.
pub fn parse_slow_queries(content: &str) -> Vec<SlowQuery> {
    let digits = Regex::new(r"\d+").expect("digit regex is valid");
    let mut queries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 3 {
            continue;
        }
        //duration could be "2500" or "2500 ms" - take the first run of digits
        let duration_ms = digits
            .find(parts[1])
            .and_then(|m| m.as_str().parse::<u64>().ok());
        queries.push(SlowQuery {
            timestamp: parts[0].to_string(),
            duration_ms,
            query: parts[2..].join("|"),
        });
    }
    queries
}
