use loglens::aggregate::MemorySink;
use loglens::config::AnalysisConfig;
use loglens::pipeline::run_analysis;
use loglens::reader::LogSource;
use loglens::report::render_markdown;

#[test]
fn report_renders_all_sections() {
    let content = [
        r#"{"level":"error","service":"db","message":"TimeoutError after 250 ms"}"#,
        r#"{"level":"info","service":"api","message":"request served"}"#,
    ]
    .join("\n");
    let mut sink = MemorySink::default();
    let outcome = run_analysis(
        &LogSource::Inline(content),
        &AnalysisConfig::default(),
        &mut sink,
        None,
    );

    let report = render_markdown(&outcome, "staging-logs", &sink.events);

    assert!(report.starts_with("# LogLens Incident Report"));
    assert!(report.contains("- Source: staging-logs"));
    assert!(report.contains("- Status: completed"));
    assert!(report.contains("## Key Stats"));
    assert!(report.contains("- Total lines: 2"));
    assert!(report.contains("- Error count: 1"));
    assert!(report.contains("- Services: api, db"));
    assert!(report.contains("## Top Clusters"));
    assert!(report.contains("| Cluster ID | Count | Title | Services | Window |"));
    assert!(report.contains("## Root Cause Hypotheses"));
    assert!(report.contains("Repeated failure signature"));
    assert!(report.contains("(confidence: 0.78)"));
    assert!(report.contains("## Remediation"));
    assert!(report.contains("## Runbook"));
    assert!(report.contains("## Event Excerpts"));
    assert!(report.contains("- line 1 [error] db: TimeoutError after 250 ms"));
}

#[test]
fn report_falls_back_when_insight_is_missing() {
    let mut config = AnalysisConfig::default();
    config.insight.enabled = false;

    let mut sink = MemorySink::default();
    let outcome = run_analysis(
        &LogSource::Inline("plain line".to_string()),
        &config,
        &mut sink,
        None,
    );
    let report = render_markdown(&outcome, "upload", &sink.events);

    assert!(report.contains("No AI executive summary is available."));
    assert!(report.contains("No AI root cause hypotheses available."));
    assert!(report.contains("No remediation guidance available."));
    assert!(report.contains("No runbook guidance available."));
}

#[test]
fn report_handles_empty_analyses() {
    let mut sink = MemorySink::default();
    let outcome = run_analysis(
        &LogSource::Inline(String::new()),
        &AnalysisConfig::default(),
        &mut sink,
        None,
    );
    let report = render_markdown(&outcome, "empty", &sink.events);

    assert!(report.contains("No clusters available."));
    assert!(report.contains("No events available for this analysis."));
    assert!(report.contains("- Services: n/a"));
}

#[test]
fn report_escapes_table_cells() {
    let content = r#"{"level":"error","service":"db","message":"pipe | in message"}"#.to_string();
    let mut sink = MemorySink::default();
    let outcome = run_analysis(
        &LogSource::Inline(content),
        &AnalysisConfig::default(),
        &mut sink,
        None,
    );
    let report = render_markdown(&outcome, "pipes", &sink.events);
    assert!(report.contains("pipe \\| in message"));
}
