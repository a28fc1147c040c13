use crate::normalize::LogEvent;
use crate::pipeline::AnalysisOutcome;
use chrono::Utc;

const MAX_REPORT_CLUSTERS: usize = 20;
const MAX_REPORT_EVENTS: usize = 100;

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ").trim().to_string()
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "n/a"
    } else {
        value
    }
}

/// Renders an incident-report markdown document from one analysis outcome.
/// Event and cluster sections are bounded; fields are rendered as stored,
/// which is already redacted.
pub fn render_markdown(outcome: &AnalysisOutcome, source_name: &str, events: &[LogEvent]) -> String {
    let stats = &outcome.stats;
    let mut lines: Vec<String> = vec![
        "# LogLens Incident Report".to_string(),
        String::new(),
        format!("- Generated at: {}", Utc::now().to_rfc3339()),
        format!("- Source: {source_name}"),
        format!("- Status: {}", outcome.status.as_str()),
        String::new(),
        "## Summary".to_string(),
    ];

    let executive_summary = outcome
        .insight
        .as_ref()
        .map(|insight| insight.executive_summary.trim())
        .unwrap_or("");
    if !executive_summary.is_empty() {
        lines.push(executive_summary.to_string());
    } else {
        lines.push(format!(
            "Processed {} log lines with {} error/fatal events. No AI executive summary is available.",
            stats.total_lines, stats.error_count
        ));
    }

    lines.extend([
        String::new(),
        "## Key Stats".to_string(),
        String::new(),
        format!("- Total lines: {}", stats.total_lines),
        format!("- Error count: {}", stats.error_count),
        format!("- Services: {}", or_na(&stats.services.join(", "))),
        String::new(),
        "## Top Clusters".to_string(),
        String::new(),
    ]);

    if outcome.clusters.is_empty() {
        lines.push("No clusters available.".to_string());
    } else {
        lines.push("| Cluster ID | Count | Title | Services | Window |".to_string());
        lines.push("| --- | ---: | --- | --- | --- |".to_string());
        for cluster in outcome.clusters.iter().take(MAX_REPORT_CLUSTERS) {
            let window = format!(
                "{} to {}",
                cluster
                    .first_seen
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "n/a".to_string()),
                cluster
                    .last_seen
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "n/a".to_string()),
            );
            lines.push(format!(
                "| {} | {} | {} | {} | {} |",
                cluster.id,
                cluster.count,
                escape_cell(&cluster.title),
                escape_cell(or_na(&cluster.affected_services.join(", "))),
                window,
            ));
        }
    }

    lines.extend([String::new(), "## Root Cause Hypotheses".to_string(), String::new()]);
    let root_causes = outcome
        .insight
        .as_ref()
        .map(|insight| insight.root_causes.as_slice())
        .unwrap_or(&[]);
    if root_causes.is_empty() {
        lines.push("No AI root cause hypotheses available.".to_string());
    } else {
        for (index, cause) in root_causes.iter().enumerate() {
            let confidence = cause
                .confidence
                .map(|value| format!(" (confidence: {value})"))
                .unwrap_or_default();
            let evidence = if cause.evidence_cluster_ids.is_empty() {
                String::new()
            } else {
                let ids: Vec<String> = cause
                    .evidence_cluster_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect();
                format!(" | evidence clusters: {}", ids.join(", "))
            };
            lines.push(format!("{}. **{}**{confidence}{evidence}", index + 1, cause.title));
            if !cause.rationale.is_empty() {
                lines.push(format!("   - {}", cause.rationale));
            }
        }
    }

    let remediation = outcome
        .insight
        .as_ref()
        .map(|insight| insight.remediation.as_str())
        .unwrap_or("");
    let runbook = outcome
        .insight
        .as_ref()
        .map(|insight| insight.runbook.as_str())
        .unwrap_or("");

    lines.extend([String::new(), "## Remediation".to_string(), String::new()]);
    lines.push(if remediation.is_empty() {
        "No remediation guidance available.".to_string()
    } else {
        remediation.to_string()
    });

    lines.extend([String::new(), "## Runbook".to_string(), String::new()]);
    lines.push(if runbook.is_empty() {
        "No runbook guidance available.".to_string()
    } else {
        runbook.to_string()
    });

    lines.extend([String::new(), "## Event Excerpts".to_string(), String::new()]);
    if events.is_empty() {
        lines.push("No events available for this analysis.".to_string());
    } else {
        for event in events.iter().take(MAX_REPORT_EVENTS) {
            lines.push(format!(
                "- line {} [{}] {}: {}",
                event.line_no,
                event.level,
                or_na(&event.service),
                event.message,
            ));
        }
    }

    let mut report = lines.join("\n");
    report.push('\n');
    report
}
