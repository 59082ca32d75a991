use std::time::Duration;

use async_trait::async_trait;
use colored::*;
use reqwest::Client;
use serde_json::{json, Value};

use crate::debug_trace;
use crate::errors::AdvisoryError;
use crate::rules::{Area, Finding, Priority};
use crate::telemetry::Telemetry;

/// Rationale stamped on every finding when the run is heuristic-only, either
/// because refinement was disabled or because the reasoning service failed.
pub const FALLBACK_RATIONALE: &str =
    "Heuristic generated fallback (advisory service unavailable).";

/// How many slow-query records go into the condensed context. Deliberate cap
/// to bound the payload size.
const CONTEXT_SLOW_QUERY_CAP: usize = 10;

static SPELL: &str = "You are a Cloud DBA/DevOps expert. Given the following heuristics-based recommendations and raw telemetry notes,
produce an improved, prioritized list of recommendations. For each recommendation return a JSON object with:
- area (Instance/Query/Storage/Connections/DB Flags/Other)
- issue (short description)
- recommendation (concrete steps)
- priority (High/Medium/Low)
- rationale (brief)
";

/// Seam for the external reasoning service. Injected into the refiner so
/// tests can substitute a deterministic fake.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, prompt: &str) -> Result<String, AdvisoryError>;
}

/// Chat-completions style HTTP client. One request, bounded timeout,
/// no retries - a failed call goes straight to the fallback path.
pub struct OpenAiAdvisor {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiAdvisor {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<OpenAiAdvisor, AdvisoryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(OpenAiAdvisor { client, api_key, model })
    }
}

#[async_trait]
impl Advisor for OpenAiAdvisor {
    async fn advise(&self, prompt: &str) -> Result<String, AdvisoryError> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.0,
            "max_tokens": 800,
        });
        debug_trace!("advisory request to model {}: {}", self.model, payload);

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AdvisoryError::Service {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await?;
        debug_trace!("advisory response: {}", body);
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(AdvisoryError::EmptyResponse)
    }
}

/// Condensed telemetry summary that rides along with the heuristic findings:
/// all metrics, all flags, and the first 10 slow queries.
pub fn telemetry_context(telemetry: &Telemetry) -> String {
    let top_queries: Vec<_> = telemetry
        .slow_queries
        .iter()
        .take(CONTEXT_SLOW_QUERY_CAP)
        .collect();
    format!(
        "Metrics: {}\nDB Flags: {}\nTop slow queries: {}",
        serde_json::to_string(&telemetry.metrics).unwrap_or_default(),
        serde_json::to_string(&telemetry.flags).unwrap_or_default(),
        serde_json::to_string(&top_queries).unwrap_or_default(),
    )
}

fn build_prompt(findings: &[Finding], context: &str) -> String {
    let heur_json = serde_json::to_string_pretty(findings).unwrap_or_default();
    format!(
        "{}\nHeuristics:\n{}\n\nContext/Notes:\n{}\n\nReturn only JSON (a list of objects). Ensure JSON is parseable.\n",
        SPELL, heur_json, context
    )
}

/// Stamps the fallback rationale on every finding. Used when refinement is
/// disabled and as the landing spot for every advisory failure.
pub fn heuristic_only(findings: Vec<Finding>) -> Vec<Finding> {
    findings
        .into_iter()
        .map(|mut f| {
            f.rationale = FALLBACK_RATIONALE.to_string();
            f
        })
        .collect()
}

/// Best-effort enrichment of the deduplicated findings. Refinement never
/// blocks delivery: any transport, service or parse failure returns the
/// heuristic findings annotated with the fallback marker.
pub async fn refine(
    advisor: &dyn Advisor,
    findings: Vec<Finding>,
    context: &str,
    quiet: bool,
) -> Vec<Finding> {
    let prompt = build_prompt(&findings, context);
    let outcome = match advisor.advise(&prompt).await {
        Ok(text) => parse_refined(&text),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(refined) => refined,
        Err(e) => {
            if !quiet {
                println!(
                    "{} {}",
                    "⚠️  Advisory refinement unavailable, keeping heuristic findings:".yellow(),
                    e
                );
            }
            heuristic_only(findings)
        }
    }
}

/// Projects the service's loose JSON array into Findings. Missing string
/// fields default to empty; area and priority strings fold back into the
/// closed vocabularies.
fn parse_refined(text: &str) -> Result<Vec<Finding>, AdvisoryError> {
    let parsed: Value = serde_json::from_str(text.trim())?;
    let items = parsed.as_array().ok_or(AdvisoryError::NotAnArray)?;

    let field = |item: &Value, key: &str| -> String {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };

    Ok(items
        .iter()
        .map(|item| Finding {
            area: Area::parse(&field(item, "area")),
            issue: field(item, "issue"),
            recommendation: field(item, "recommendation"),
            priority: Priority::parse(&field(item, "priority")),
            rationale: field(item, "rationale"),
        })
        .collect())
}
