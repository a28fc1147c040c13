use crate::aggregate::{Aggregator, AnalysisStats, BaselineCluster, EventSink, Guardrails};
use crate::ai::{generate_insight, AiInsight, CompletionClient};
use crate::clustering::{merge_clusters_tfidf, MergedCluster};
use crate::config::AnalysisConfig;
use crate::normalize::normalize_event;
use crate::parser::parse_line;
use crate::reader::{LineReader, LogSource};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Short user-facing message for job-level failures; internal detail goes to
/// the logs only.
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis execution failed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Everything one analysis run produces besides the committed events, which
/// live in the sink.
#[derive(Debug, Serialize)]
pub struct AnalysisOutcome {
    pub status: JobStatus,
    pub stats: AnalysisStats,
    #[serde(rename = "clusters_baseline")]
    pub clusters: Vec<BaselineCluster>,
    #[serde(rename = "clusters_tfidf")]
    pub merged_clusters: Vec<MergedCluster>,
    pub insight: Option<AiInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn failed_outcome(stats: AnalysisStats) -> AnalysisOutcome {
    AnalysisOutcome {
        status: JobStatus::Failed,
        stats,
        clusters: Vec::new(),
        merged_clusters: Vec::new(),
        insight: None,
        error_message: Some(GENERIC_FAILURE_MESSAGE.to_string()),
    }
}

/// Runs the full analysis pipeline for one source as a single sequential
/// unit of work: bounded line reading, the parser chain, redaction and
/// normalization, streaming aggregation with batched event commits, TF-IDF
/// cluster merging, and the insight stage.
///
/// Truncation and unreadable sources degrade the run instead of failing it;
/// events committed before an interruption stay committed. The hard time
/// limit is enforced cooperatively between reader iterations.
pub fn run_analysis(
    source: &LogSource,
    config: &AnalysisConfig,
    sink: &mut dyn EventSink,
    completion: Option<&dyn CompletionClient>,
) -> AnalysisOutcome {
    let started = Instant::now();
    let soft_limit = Duration::from_secs(config.soft_time_limit_s);
    let hard_limit = Duration::from_secs(config.time_limit_s);

    let guardrails = Guardrails {
        max_lines: config.max_lines,
        max_bytes: config.max_bytes,
        soft_time_limit_s: config.soft_time_limit_s,
        time_limit_s: config.time_limit_s,
    };
    let mut aggregator = Aggregator::new(config.event_batch_size, guardrails, sink);

    let mut reader = match LineReader::open(source, config.max_lines, config.max_bytes) {
        Ok(reader) => Some(reader),
        Err(err) => {
            warn!(error = %err, "source is unreadable");
            aggregator.set_reader_error();
            None
        }
    };

    let mut failed = false;
    let mut soft_warned = false;
    let mut line_no: u64 = 0;

    if let Some(reader) = reader.as_mut() {
        loop {
            if started.elapsed() >= hard_limit {
                error!(lines = line_no, "analysis exceeded its hard time limit");
                failed = true;
                break;
            }
            if !soft_warned && started.elapsed() >= soft_limit {
                warn!(lines = line_no, "analysis exceeded its soft time limit");
                soft_warned = true;
            }

            match reader.next_line() {
                Ok(Some(line)) => {
                    line_no += 1;
                    let (parsed, kind) = parse_line(&line);
                    let event = normalize_event(line_no, &line, &parsed, kind, &config.redaction);
                    if let Err(err) = aggregator.push(event, kind) {
                        error!(error = %err, line = line_no, "event commit failed");
                        failed = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, line = line_no, "line reader failed mid-stream");
                    aggregator.set_reader_error();
                    break;
                }
            }
        }

        if let Some(reason) = reader.truncation() {
            info!(reason = reason.as_str(), lines = line_no, "line reading truncated");
            aggregator.set_truncated(reason);
        }
    }

    // Commit whatever is buffered; interrupted runs keep what they produced.
    if let Err(err) = aggregator.flush() {
        error!(error = %err, "final event flush failed");
        failed = true;
    }

    let (mut stats, clusters) = aggregator.into_parts();
    if failed {
        return failed_outcome(stats);
    }

    let merged_clusters = if config.merge.enabled {
        merge_clusters_tfidf(&clusters, config.merge.similarity_threshold)
    } else {
        Vec::new()
    };

    let insight = if config.insight.enabled {
        match generate_insight(&config.insight, &stats, &clusters, completion) {
            Ok(insight) => {
                stats.ai_status = "ok";
                Some(insight)
            }
            Err(err) => {
                warn!(error = %err, "insight generation failed");
                stats.ai_status = "failed";
                None
            }
        }
    } else {
        stats.ai_status = "disabled";
        None
    };

    info!(
        lines = stats.total_lines,
        clusters = clusters.len(),
        truncated = stats.truncated,
        "analysis completed"
    );

    AnalysisOutcome {
        status: JobStatus::Completed,
        stats,
        clusters,
        merged_clusters,
        insight,
        error_message: None,
    }
}
