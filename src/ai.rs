use crate::aggregate::{AnalysisStats, BaselineCluster};
use crate::config::{InsightConfig, InsightProvider};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const MAX_SUMMARY_CHARS: usize = 4000;
const MAX_REMEDIATION_CHARS: usize = 6000;
const MAX_RUNBOOK_CHARS: usize = 6000;
const MAX_TITLE_CHARS: usize = 200;
const MAX_RATIONALE_CHARS: usize = 1000;
const MAX_ROOT_CAUSES: usize = 5;
const MAX_EVIDENCE_IDS: usize = 20;

const SYSTEM_PROMPT: &str = "You are an SRE assistant. The input is already redacted. \
Provide careful, non-speculative output.";

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("insight api key is required for the external backend")]
    MissingApiKey,
    #[error("no completion client available for the external backend")]
    MissingClient,
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion response does not contain a JSON object")]
    UnparseableResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCause {
    pub title: String,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_cluster_ids: Vec<i64>,
}

/// Sanitized incident guidance for one analysis. Every field is bounded and
/// safe to persist regardless of what the backend returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiInsight {
    pub executive_summary: String,
    pub root_causes: Vec<RootCause>,
    pub overall_confidence: Option<f64>,
    pub evidence_references: Vec<i64>,
    pub remediation: String,
    pub runbook: String,
}

impl AiInsight {
    /// Empty record used when insight generation is disabled.
    pub fn neutral() -> Self {
        Self {
            executive_summary: String::new(),
            root_causes: Vec::new(),
            overall_confidence: None,
            evidence_references: Vec::new(),
            remediation: String::new(),
            runbook: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub timeout: Duration,
}

/// External text-completion collaborator. Returns the raw response text,
/// which is expected (but not trusted) to contain a JSON object.
pub trait CompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InsightError>;
}

/// OpenAI-compatible chat-completions client. One blocking call per request
/// with an enforced timeout; retry policy belongs to the caller.
pub struct HttpCompletionClient {
    api_url: String,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InsightError> {
        let body = json!({
            "model": request.model,
            "temperature": request.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": request.prompt},
            ],
        });

        let client = reqwest::blocking::Client::builder()
            .timeout(request.timeout)
            .build()
            .map_err(|err| InsightError::Transport(err.to_string()))?;
        let response = client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| InsightError::Transport(err.to_string()))?;
        let payload: Value = response
            .json()
            .map_err(|err| InsightError::Transport(err.to_string()))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(content)
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max).collect();
    cut.trim_end().to_string()
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn number_of(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn positive_ids(value: Option<&Value>) -> Vec<i64> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.as_i64())
        .filter(|id| *id > 0)
        .take(MAX_EVIDENCE_IDS)
        .collect()
}

/// Direct JSON-object parse, else the substring between the first `{` and
/// the last `}`. No object anywhere fails the stage.
pub fn extract_json_object(content: &str) -> Result<Value, InsightError> {
    let text = content.trim();
    if text.is_empty() {
        return Err(InsightError::UnparseableResponse);
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(InsightError::UnparseableResponse);
    };
    if end <= start {
        return Err(InsightError::UnparseableResponse);
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(InsightError::UnparseableResponse),
    }
}

/// Defensive boundary against untrusted backend output: trims and truncates
/// every text field, drops malformed root causes, clamps confidences, caps
/// evidence ids. Never fails; malformed input degrades to omitted fields.
pub fn sanitize_payload(payload: &Value) -> AiInsight {
    let field = |key: &str| payload.as_object().and_then(|map| map.get(key));

    let executive_summary = truncate_chars(&text_of(field("executive_summary")), MAX_SUMMARY_CHARS);
    let remediation = truncate_chars(&text_of(field("remediation")), MAX_REMEDIATION_CHARS);
    let runbook = truncate_chars(&text_of(field("runbook")), MAX_RUNBOOK_CHARS);

    let mut root_causes: Vec<RootCause> = Vec::new();
    if let Some(Value::Array(items)) = field("root_causes") {
        for item in items {
            if root_causes.len() >= MAX_ROOT_CAUSES {
                break;
            }
            let Some(entry) = item.as_object() else {
                continue;
            };
            let title = truncate_chars(&text_of(entry.get("title")), MAX_TITLE_CHARS);
            if title.is_empty() {
                continue;
            }
            let rationale = truncate_chars(&text_of(entry.get("rationale")), MAX_RATIONALE_CHARS);
            let confidence = number_of(entry.get("confidence")).map(|v| v.clamp(0.0, 1.0));
            let evidence_cluster_ids = positive_ids(entry.get("evidence_cluster_ids"));
            root_causes.push(RootCause {
                title,
                rationale,
                confidence,
                evidence_cluster_ids,
            });
        }
    }

    let overall_confidence = number_of(field("overall_confidence"))
        .map(|v| v.clamp(0.0, 1.0))
        .or_else(|| {
            let known: Vec<f64> = root_causes
                .iter()
                .filter_map(|cause| cause.confidence)
                .collect();
            if known.is_empty() {
                None
            } else {
                let mean = known.iter().sum::<f64>() / known.len() as f64;
                Some((mean * 1000.0).round() / 1000.0)
            }
        });

    let mut evidence_references = positive_ids(field("evidence_references"));
    if evidence_references.is_empty() {
        // Backfill from root-cause evidence in first-seen order, deduplicated.
        for cause in &root_causes {
            for id in &cause.evidence_cluster_ids {
                if evidence_references.len() >= MAX_EVIDENCE_IDS {
                    break;
                }
                if !evidence_references.contains(id) {
                    evidence_references.push(*id);
                }
            }
        }
    }

    AiInsight {
        executive_summary,
        root_causes,
        overall_confidence,
        evidence_references,
        remediation,
        runbook,
    }
}

fn build_user_prompt(
    stats: &AnalysisStats,
    clusters: &[BaselineCluster],
    max_cluster_context: usize,
) -> String {
    let top_clusters: Vec<Value> = clusters
        .iter()
        .take(max_cluster_context)
        .map(|cluster| {
            json!({
                "id": cluster.id,
                "fingerprint": cluster.fingerprint,
                "count": cluster.count,
                "title": cluster.title,
                "first_seen": cluster.first_seen.map(|ts| ts.to_rfc3339()),
                "last_seen": cluster.last_seen.map(|ts| ts.to_rfc3339()),
                "level": cluster.level,
                "service": cluster.service,
            })
        })
        .collect();

    let payload = json!({
        "stats": {
            "total_lines": stats.total_lines,
            "error_count": stats.error_count,
            "services": stats.services,
            "level_counts": stats.level_counts,
            "truncated": stats.truncated,
        },
        "clusters": top_clusters,
    });

    format!(
        "Analyze the redacted log summary below and produce concise incident guidance.\n\
         Return strict JSON with keys: executive_summary (string), root_causes (array of \
         objects with title, rationale, confidence and evidence_cluster_ids), \
         overall_confidence (number), evidence_references (array of integers), \
         remediation (string), runbook (string).\n\
         Do not include markdown fences.\n\
         Input:\n{payload}"
    )
}

/// Deterministic offline payload: templated from the top cluster and the
/// error count, byte-for-byte reproducible for identical inputs.
fn mock_insight(stats: &AnalysisStats, clusters: &[BaselineCluster]) -> AiInsight {
    let top = clusters.first();
    let top_message = top
        .map(|cluster| cluster.sample_message.as_str())
        .filter(|message| !message.is_empty())
        .unwrap_or("No dominant cluster detected.");
    let top_count = top.map(|cluster| cluster.count).unwrap_or(0);
    let evidence: Vec<i64> = top.map(|cluster| vec![cluster.id as i64]).unwrap_or_default();

    let payload = json!({
        "executive_summary": format!(
            "Detected {} high-severity events. Top cluster count is {}: {}",
            stats.error_count, top_count, top_message
        ),
        "root_causes": [{
            "title": "Repeated failure signature",
            "rationale": "A dominant fingerprint cluster indicates recurring execution failure.",
            "confidence": 0.78,
            "evidence_cluster_ids": evidence,
        }],
        "remediation": "Mitigate impact by rate-limiting failing paths and validating upstream \
                        dependency health. Then deploy a fix and monitor cluster frequency decline.",
        "runbook": "1) Identify impacted service owners.\n\
                    2) Validate dependency status and rollbacks.\n\
                    3) Apply mitigation and confirm error trend reduction.",
    });
    sanitize_payload(&payload)
}

/// Runs the configured insight backend over the pipeline's statistics and
/// top clusters. Disabled configuration short-circuits to a neutral record
/// without any external call. External-backend failures are hard failures of
/// this stage only.
pub fn generate_insight(
    config: &InsightConfig,
    stats: &AnalysisStats,
    clusters: &[BaselineCluster],
    client: Option<&dyn CompletionClient>,
) -> Result<AiInsight, InsightError> {
    if !config.enabled {
        return Ok(AiInsight::neutral());
    }

    match config.provider {
        InsightProvider::Mock => Ok(mock_insight(stats, clusters)),
        InsightProvider::OpenAi => {
            if config.api_key.is_empty() {
                return Err(InsightError::MissingApiKey);
            }
            let fallback;
            let client: &dyn CompletionClient = match client {
                Some(client) => client,
                None => {
                    fallback = HttpCompletionClient::new(config.api_url.clone(), config.api_key.clone());
                    &fallback
                }
            };

            let request = CompletionRequest {
                model: config.model.clone(),
                prompt: build_user_prompt(stats, clusters, config.max_cluster_context),
                temperature: 0.1,
                timeout: Duration::from_secs(config.timeout_s),
            };
            let content = client.complete(&request).inspect_err(|err| {
                warn!(error = %err, "completion request failed");
            })?;
            let payload = extract_json_object(&content)?;
            Ok(sanitize_payload(&payload))
        }
    }
}
