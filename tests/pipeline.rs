use std::fs;

use async_trait::async_trait;

use dbtune::errors::{AdvisoryError, TuneError};
use dbtune::refine::{self, Advisor, FALLBACK_RATIONALE};
use dbtune::report;
use dbtune::rules::{self, Area, Priority};
use dbtune::telemetry::Telemetry;

struct DownAdvisor;

#[async_trait]
impl Advisor for DownAdvisor {
    async fn advise(&self, _prompt: &str) -> Result<String, AdvisoryError> {
        Err(AdvisoryError::Service {
            status: 503,
            body: "upstream unavailable".to_string(),
        })
    }
}

struct EchoAdvisor;

#[async_trait]
impl Advisor for EchoAdvisor {
    async fn advise(&self, _prompt: &str) -> Result<String, AdvisoryError> {
        Ok(r#"[{"area": "Instance", "issue": "CPU saturated", "recommendation": "Scale to 8 vCPU", "priority": "High", "rationale": "sustained 95% CPU"}]"#.to_string())
    }
}

fn write_snapshot(dir: &std::path::Path, metrics: &str, flags: &str, slow: &str) -> (String, String, String) {
    let metrics_path = dir.join("metrics.json");
    let flags_path = dir.join("db_flags.txt");
    let slow_path = dir.join("slow_queries.log");
    fs::write(&metrics_path, metrics).unwrap();
    fs::write(&flags_path, flags).unwrap();
    fs::write(&slow_path, slow).unwrap();
    (
        metrics_path.to_str().unwrap().to_string(),
        flags_path.to_str().unwrap().to_string(),
        slow_path.to_str().unwrap().to_string(),
    )
}

#[test]
fn end_to_end_cpu_only_snapshot_with_refinement_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let (m, f, s) = write_snapshot(
        dir.path(),
        r#"{"cpu_utilization_pct": 95, "storage_used_gb": 5, "storage_allocated_gb": 100}"#,
        "",
        "",
    );

    let telemetry = Telemetry::load(&m, &f, &s).unwrap();
    let findings = rules::dedup(rules::evaluate(
        &telemetry.metrics,
        &telemetry.flags,
        &telemetry.slow_queries,
    ));
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].area, Area::Instance);
    assert_eq!(findings[0].priority, Priority::High);
    assert!(findings[0].issue.contains("CPU"));

    //refinement disabled: heuristic findings delivered with the fallback marker
    let findings = refine::heuristic_only(findings);
    let rows = report::assemble(&findings);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rationale, FALLBACK_RATIONALE);

    let out = dir.path().join("outputs").join("recommendations.csv");
    report::write_csv(&rows, out.to_str().unwrap()).unwrap();
    let written = fs::read_to_string(&out).unwrap();
    assert!(written.starts_with("Area,Issue,Recommendation,Priority,Rationale\n"));
    assert!(written.contains(FALLBACK_RATIONALE));
}

#[tokio::test]
async fn unreachable_service_still_delivers_full_heuristic_report() {
    let dir = tempfile::tempdir().unwrap();
    let (m, f, s) = write_snapshot(
        dir.path(),
        r#"{"cpu_utilization_pct": 90, "memory_utilization_pct": 85}"#,
        "innodb_buffer_pool_size=4096M\n",
        "2024-01-01T10:00:00 | 2500 ms | SELECT * FROM orders WHERE customer_id = 42\n",
    );

    let telemetry = Telemetry::load(&m, &f, &s).unwrap();
    let heuristics = rules::dedup(rules::evaluate(
        &telemetry.metrics,
        &telemetry.flags,
        &telemetry.slow_queries,
    ));
    assert_eq!(heuristics.len(), 4);

    let context = refine::telemetry_context(&telemetry);
    let refined = refine::refine(&DownAdvisor, heuristics.clone(), &context, true).await;

    //identical to the input except for the fallback rationale
    assert_eq!(refined.len(), heuristics.len());
    for (before, after) in heuristics.iter().zip(&refined) {
        assert_eq!(after.area, before.area);
        assert_eq!(after.issue, before.issue);
        assert_eq!(after.recommendation, before.recommendation);
        assert_eq!(after.priority, before.priority);
        assert_eq!(after.rationale, FALLBACK_RATIONALE);
    }
}

#[tokio::test]
async fn healthy_service_response_replaces_findings() {
    let dir = tempfile::tempdir().unwrap();
    let (m, f, s) = write_snapshot(dir.path(), r#"{"cpu_utilization_pct": 95}"#, "", "");

    let telemetry = Telemetry::load(&m, &f, &s).unwrap();
    let heuristics = rules::dedup(rules::evaluate(
        &telemetry.metrics,
        &telemetry.flags,
        &telemetry.slow_queries,
    ));
    let context = refine::telemetry_context(&telemetry);
    let refined = refine::refine(&EchoAdvisor, heuristics, &context, true).await;

    assert_eq!(refined.len(), 1);
    assert_eq!(refined[0].issue, "CPU saturated");
    assert_eq!(refined[0].rationale, "sustained 95% CPU");
}

#[test]
fn quiet_snapshot_produces_an_explicit_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let (m, f, s) = write_snapshot(
        dir.path(),
        r#"{"cpu_utilization_pct": 20, "storage_used_gb": 5, "storage_allocated_gb": 100}"#,
        "innodb_buffer_pool_size=16G\n",
        "2024-01-01T10:00:00 | 150 | SELECT 1\n",
    );

    let telemetry = Telemetry::load(&m, &f, &s).unwrap();
    let findings = rules::dedup(rules::evaluate(
        &telemetry.metrics,
        &telemetry.flags,
        &telemetry.slow_queries,
    ));
    assert!(findings.is_empty());

    let out = dir.path().join("recommendations.csv");
    report::write_csv(&report::assemble(&findings), out.to_str().unwrap()).unwrap();
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "Area,Issue,Recommendation,Priority,Rationale\n"
    );
}

#[test]
fn missing_required_file_aborts_before_findings() {
    let dir = tempfile::tempdir().unwrap();
    let (m, f, _) = write_snapshot(dir.path(), "{}", "", "");
    let missing = dir.path().join("nope.log");
    let err = Telemetry::load(&m, &f, missing.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, TuneError::Input { .. }));
}

#[test]
fn duplicate_slow_queries_collapse_into_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let query = format!("SELECT * FROM orders WHERE region = 'emea' AND padding = '{}'", "p".repeat(200));
    let slow_log = format!(
        "2024-01-01T10:00:00 | 2500 | {q} -- first\n2024-01-01T10:05:00 | 2500 | {q} -- second\n",
        q = query
    );
    let (m, f, s) = write_snapshot(dir.path(), "{}", "", &slow_log);

    let telemetry = Telemetry::load(&m, &f, &s).unwrap();
    let findings = rules::dedup(rules::evaluate(
        &telemetry.metrics,
        &telemetry.flags,
        &telemetry.slow_queries,
    ));
    //both issues agree on their first 120 characters, so only one survives
    assert_eq!(findings.len(), 1);
}
