use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::telemetry::{Flags, Metrics, SlowQuery};

/// Issue texts are compared (and truncated for display) on their first 120
/// characters, so long query texts that differ only past that point collapse
/// into one finding.
pub const ISSUE_KEY_LEN: usize = 120;

const BUFFER_POOL_WARN_GB: f64 = 8.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Instance,
    Storage,
    Connections,
    #[serde(rename = "DB Flags")]
    DbFlags,
    Query,
    Other,
}

impl Area {
    /// Maps a free-form area string from the reasoning service back into the
    /// closed vocabulary. Anything unrecognized lands in Other.
    pub fn parse(s: &str) -> Area {
        match s.trim().to_ascii_lowercase().as_str() {
            "instance" => Area::Instance,
            "storage" => Area::Storage,
            "connections" => Area::Connections,
            "db flags" | "dbflags" | "db_flags" => Area::DbFlags,
            "query" => Area::Query,
            _ => Area::Other,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Area::Instance => "Instance",
            Area::Storage => "Storage",
            Area::Connections => "Connections",
            Area::DbFlags => "DB Flags",
            Area::Query => "Query",
            Area::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Unrecognized or missing priority strings map to Low, the least
    /// alarming choice for advice we can't attribute.
    pub fn parse(s: &str) -> Priority {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        };
        write!(f, "{}", s)
    }
}

/// A single tuning observation. Value object: the deduplicator and the
/// refiner build new vectors instead of mutating in place.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Finding {
    pub area: Area,
    pub issue: String,
    pub recommendation: String,
    pub priority: Priority,
    #[serde(default)]
    pub rationale: String,
}

impl Finding {
    fn new(area: Area, issue: String, recommendation: &str, priority: Priority) -> Finding {
        Finding {
            area,
            issue,
            recommendation: recommendation.to_string(),
            priority,
            rationale: String::new(),
        }
    }
}

pub fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// The heuristic battery. Pure function over the telemetry snapshot,
/// deterministic, every applicable rule fires exactly once and rules never
/// short-circuit each other. Output order is not a contract - the
/// deduplicator imposes the final one.
pub fn evaluate(metrics: &Metrics, flags: &Flags, slow_queries: &[SlowQuery]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let metric = |name: &str| metrics.get(name).copied().unwrap_or(0.0);

    //Instance-level
    let cpu = metric("cpu_utilization_pct");
    let mem = metric("memory_utilization_pct");
    let active_conn = metric("active_connections");
    let max_conn = metric("max_connections_configured");
    let storage_used = metric("storage_used_gb");
    let storage_alloc = metric("storage_allocated_gb");

    if cpu >= 80.0 {
        findings.push(Finding::new(
            Area::Instance,
            format!("High CPU utilization ({}%)", cpu),
            "Consider scaling up instance type (more vCPU) or investigate top CPU-consuming queries.",
            Priority::High,
        ));
    }
    if mem >= 80.0 {
        findings.push(Finding::new(
            Area::Instance,
            format!("High memory utilization ({}%)", mem),
            "Increase memory (bigger machine) or tune buffer_pool/work_mem settings.",
            Priority::High,
        ));
    }
    //denominator floor of 1.0 keeps a zero allocation from dividing by zero
    if storage_used / storage_alloc.max(1.0) >= 0.9 {
        findings.push(Finding::new(
            Area::Storage,
            format!("Storage >90% used ({}GB/{}GB)", storage_used, storage_alloc),
            "Increase storage or clean old data; enable autoscaling if supported.",
            Priority::High,
        ));
    }
    if active_conn != 0.0 && max_conn != 0.0 && active_conn > 0.8 * max_conn {
        findings.push(Finding::new(
            Area::Connections,
            format!("Active connections high ({}/{})", active_conn, max_conn),
            "Introduce connection pooling (PgBouncer/Cloud SQL Proxy) and check for connection leaks.",
            Priority::Medium,
        ));
    }

    //DB flags quick wins
    if let Some(ibps) = flags.get("innodb_buffer_pool_size") {
        if let Some(gb) = buffer_pool_gb(ibps) {
            if gb < BUFFER_POOL_WARN_GB {
                findings.push(Finding::new(
                    Area::DbFlags,
                    format!("innodb_buffer_pool_size is small ({})", ibps),
                    "Increase innodb_buffer_pool_size to reduce disk IO for InnoDB heavy workloads.",
                    Priority::Medium,
                ));
            }
        }
    }

    //Slow query analysis - only records with a known duration qualify
    for q in slow_queries {
        let Some(dur) = q.duration_ms else { continue };
        if dur >= 2000 {
            findings.push(Finding::new(
                Area::Query,
                format!("Slow query ({} ms): {}", dur, truncate_chars(&q.query, ISSUE_KEY_LEN)),
                "Consider adding appropriate indexes, avoid SELECT *, and break large joins. Inspect query plan (EXPLAIN).",
                Priority::High,
            ));
        } else if dur >= 1000 {
            findings.push(Finding::new(
                Area::Query,
                format!("Moderately slow query ({} ms): {}", dur, truncate_chars(&q.query, ISSUE_KEY_LEN)),
                "Review query plan, check indexes, and consider limiting returned columns.",
                Priority::Medium,
            ));
        }
    }

    findings
}

/// Parses values like "16G" or "16384M" into gigabytes. K or a missing unit
/// divides by 1024 twice. Unparseable values yield None and no finding.
fn buffer_pool_gb(raw: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)^(\d+)([GMK]?)").expect("buffer pool regex is valid");
    let caps = re.captures(raw)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let gb = match caps.get(2).map_or("", |m| m.as_str()).to_ascii_uppercase().as_str() {
        "M" => value / 1024.0,
        "G" => value,
        _ => value / 1024.0 / 1024.0,
    };
    Some(gb)
}

/// Collapses near-duplicate findings: two findings with the same area and
/// the same first 120 characters of issue text are one. First occurrence
/// wins, first-seen order is preserved. Total function, idempotent.
pub fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(Area, String)> = HashSet::new();
    let mut out = Vec::with_capacity(findings.len());
    for f in findings {
        if seen.insert((f.area, truncate_chars(&f.issue, ISSUE_KEY_LEN))) {
            out.push(f);
        }
    }
    out
}
