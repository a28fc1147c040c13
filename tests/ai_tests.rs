use chrono::{DateTime, Utc};
use loglens::aggregate::{AnalysisStats, BaselineCluster, Guardrails};
use loglens::ai::{
    extract_json_object, generate_insight, sanitize_payload, CompletionClient, CompletionRequest,
    InsightError,
};
use loglens::config::{InsightConfig, InsightProvider};
use loglens::parser::Level;
use serde_json::json;

fn stats() -> AnalysisStats {
    let guardrails = Guardrails {
        max_lines: 1000,
        max_bytes: 1 << 20,
        soft_time_limit_s: 120,
        time_limit_s: 180,
    };
    let mut stats = AnalysisStats {
        total_lines: 10,
        truncated: false,
        truncated_by: None,
        json_lines: 6,
        text_lines: 2,
        nginx_lines: 1,
        unparsed_lines: 1,
        error_count: 4,
        level_counts: Default::default(),
        service_counts: Default::default(),
        services: vec!["api".to_string()],
        reader_error: None,
        ai_status: "disabled",
        guardrails,
    };
    stats.level_counts.insert("error".to_string(), 4);
    stats.level_counts.insert("info".to_string(), 6);
    stats
}

fn cluster(id: usize, fingerprint: &str, count: u64, message: &str) -> BaselineCluster {
    let no_time: Option<DateTime<Utc>> = None;
    BaselineCluster {
        id,
        fingerprint: fingerprint.to_string(),
        title: message.to_string(),
        count,
        first_line: 1,
        last_line: count,
        first_seen: no_time,
        last_seen: no_time,
        sample_message: message.to_string(),
        level: Level::Error,
        service: "api".to_string(),
        sample_events: vec![1],
        affected_services: vec!["api".to_string()],
    }
}

struct FixedClient {
    response: String,
}

impl CompletionClient for FixedClient {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, InsightError> {
        Ok(self.response.clone())
    }
}

struct FailingClient;

impl CompletionClient for FailingClient {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, InsightError> {
        Err(InsightError::Transport("connection reset".to_string()))
    }
}

fn openai_config() -> InsightConfig {
    InsightConfig {
        provider: InsightProvider::OpenAi,
        api_key: "test-key".to_string(),
        ..InsightConfig::default()
    }
}

#[test]
fn disabled_insight_is_neutral_without_any_call() {
    let config = InsightConfig {
        enabled: false,
        ..openai_config()
    };
    let insight =
        generate_insight(&config, &stats(), &[], Some(&FailingClient)).expect("neutral insight");
    assert!(insight.executive_summary.is_empty());
    assert!(insight.root_causes.is_empty());
    assert!(insight.overall_confidence.is_none());
    assert!(insight.remediation.is_empty());
    assert!(insight.runbook.is_empty());
}

#[test]
fn mock_backend_is_deterministic_and_references_top_cluster() {
    let config = InsightConfig::default();
    let clusters = vec![cluster(1, "aa", 7, "DatabaseError: connect refused")];

    let first = generate_insight(&config, &stats(), &clusters, None).expect("insight");
    let second = generate_insight(&config, &stats(), &clusters, None).expect("insight");
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );

    assert!(first.executive_summary.contains("4 high-severity events"));
    assert!(first.executive_summary.contains("DatabaseError: connect refused"));
    assert_eq!(first.root_causes.len(), 1);
    assert_eq!(first.root_causes[0].confidence, Some(0.78));
    assert_eq!(first.root_causes[0].evidence_cluster_ids, vec![1]);
    assert_eq!(first.overall_confidence, Some(0.78));
    assert_eq!(first.evidence_references, vec![1]);
}

#[test]
fn missing_api_key_is_a_hard_failure() {
    let config = InsightConfig {
        api_key: String::new(),
        ..openai_config()
    };
    let result = generate_insight(&config, &stats(), &[], Some(&FixedClient { response: "{}".into() }));
    assert!(matches!(result, Err(InsightError::MissingApiKey)));
}

#[test]
fn transport_failure_fails_the_stage() {
    let result = generate_insight(&openai_config(), &stats(), &[], Some(&FailingClient));
    assert!(matches!(result, Err(InsightError::Transport(_))));
}

#[test]
fn external_response_flows_through_sanitization() {
    let response = json!({
        "executive_summary": "  Upstream dependency degraded.  ",
        "root_causes": [
            {"title": "Connection pool exhausted", "rationale": "r", "confidence": 0.9,
             "evidence_cluster_ids": [1, 2]},
        ],
        "remediation": "Scale the pool.",
        "runbook": "1) check pool",
    })
    .to_string();
    let insight = generate_insight(
        &openai_config(),
        &stats(),
        &[],
        Some(&FixedClient { response }),
    )
    .expect("insight");
    assert_eq!(insight.executive_summary, "Upstream dependency degraded.");
    assert_eq!(insight.root_causes.len(), 1);
    assert_eq!(insight.evidence_references, vec![1, 2]);
}

#[test]
fn json_extraction_recovers_object_from_prose() {
    let content = "Here is my answer:\n{\"executive_summary\": \"ok\"}\nThat is all.";
    let value = extract_json_object(content).expect("extract");
    assert_eq!(value["executive_summary"], "ok");
}

#[test]
fn json_extraction_fails_without_an_object() {
    assert!(matches!(
        extract_json_object("no braces anywhere"),
        Err(InsightError::UnparseableResponse)
    ));
    assert!(matches!(
        extract_json_object(""),
        Err(InsightError::UnparseableResponse)
    ));
    assert!(matches!(
        extract_json_object("[1, 2, 3]"),
        Err(InsightError::UnparseableResponse)
    ));
}

#[test]
fn sanitizer_caps_root_causes_at_five_in_order() {
    let payload = json!({
        "root_causes": (1..=8).map(|i| json!({
            "title": format!("cause {i}"),
            "rationale": "because",
        })).collect::<Vec<_>>(),
    });
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.root_causes.len(), 5);
    let titles: Vec<&str> = insight
        .root_causes
        .iter()
        .map(|cause| cause.title.as_str())
        .collect();
    assert_eq!(titles, vec!["cause 1", "cause 2", "cause 3", "cause 4", "cause 5"]);
}

#[test]
fn sanitizer_clamps_confidences() {
    let payload = json!({
        "root_causes": [
            {"title": "too confident", "confidence": 1.5},
            {"title": "negative", "confidence": -0.25},
            {"title": "stringly", "confidence": "0.5"},
            {"title": "garbage", "confidence": "high"},
        ],
    });
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.root_causes[0].confidence, Some(1.0));
    assert_eq!(insight.root_causes[1].confidence, Some(0.0));
    assert_eq!(insight.root_causes[2].confidence, Some(0.5));
    assert_eq!(insight.root_causes[3].confidence, None);
    // Mean of the parseable confidences, rounded to 3 decimals.
    assert_eq!(insight.overall_confidence, Some(0.5));
}

#[test]
fn sanitizer_drops_malformed_root_causes() {
    let payload = json!({
        "root_causes": [
            "not an object",
            {"rationale": "missing title"},
            {"title": "   "},
            {"title": "kept", "rationale": "ok"},
        ],
    });
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.root_causes.len(), 1);
    assert_eq!(insight.root_causes[0].title, "kept");
}

#[test]
fn sanitizer_truncates_long_fields() {
    let payload = json!({
        "executive_summary": "s".repeat(5000),
        "remediation": "r".repeat(7000),
        "runbook": "b".repeat(7000),
        "root_causes": [{"title": "t".repeat(300), "rationale": "x".repeat(1500)}],
    });
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.executive_summary.len(), 4000);
    assert_eq!(insight.remediation.len(), 6000);
    assert_eq!(insight.runbook.len(), 6000);
    assert_eq!(insight.root_causes[0].title.len(), 200);
    assert_eq!(insight.root_causes[0].rationale.len(), 1000);
}

#[test]
fn sanitizer_filters_evidence_ids() {
    let payload = json!({
        "evidence_references": [3, -1, 0, "seven", 2.5, 4],
        "root_causes": [{"title": "t", "evidence_cluster_ids": (1..=30).collect::<Vec<i64>>()}],
    });
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.evidence_references, vec![3, 4]);
    assert_eq!(insight.root_causes[0].evidence_cluster_ids.len(), 20);
}

#[test]
fn sanitizer_backfills_evidence_from_root_causes() {
    let payload = json!({
        "root_causes": [
            {"title": "a", "evidence_cluster_ids": [5, 2]},
            {"title": "b", "evidence_cluster_ids": [2, 9]},
        ],
    });
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.evidence_references, vec![5, 2, 9]);
}

#[test]
fn sanitizer_never_fails_on_garbage() {
    let insight = sanitize_payload(&json!(null));
    assert!(insight.executive_summary.is_empty());
    assert!(insight.root_causes.is_empty());

    let insight = sanitize_payload(&json!({"root_causes": 42, "overall_confidence": [], "evidence_references": {}}));
    assert!(insight.root_causes.is_empty());
    assert!(insight.overall_confidence.is_none());
    assert!(insight.evidence_references.is_empty());
}

#[test]
fn overall_confidence_is_clamped_when_present() {
    let payload = json!({"overall_confidence": 2.5});
    let insight = sanitize_payload(&payload);
    assert_eq!(insight.overall_confidence, Some(1.0));
}
