use crate::normalize::LogEvent;
use crate::parser::{Level, ParserKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

pub const MAX_SAMPLE_EVENTS: usize = 5;
pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Error)]
#[error("event sink write failed: {0}")]
pub struct SinkError(pub String);

/// Destination for committed events. Writes happen in bounded batches; a
/// batch that was written stays written even if a later stage fails.
pub trait EventSink {
    fn write_batch(&mut self, events: Vec<LogEvent>) -> Result<(), SinkError>;
}

/// In-memory sink for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<LogEvent>,
}

impl EventSink for MemorySink {
    fn write_batch(&mut self, events: Vec<LogEvent>) -> Result<(), SinkError> {
        self.events.extend(events);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Guardrails {
    pub max_lines: usize,
    pub max_bytes: u64,
    pub soft_time_limit_s: u64,
    pub time_limit_s: u64,
}

/// The statistics blob of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStats {
    pub total_lines: u64,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_by: Option<&'static str>,
    pub json_lines: u64,
    pub text_lines: u64,
    pub nginx_lines: u64,
    pub unparsed_lines: u64,
    pub error_count: u64,
    pub level_counts: BTreeMap<String, u64>,
    pub service_counts: BTreeMap<String, u64>,
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader_error: Option<&'static str>,
    pub ai_status: &'static str,
    pub guardrails: Guardrails,
}

impl AnalysisStats {
    fn new(guardrails: Guardrails) -> Self {
        Self {
            total_lines: 0,
            truncated: false,
            truncated_by: None,
            json_lines: 0,
            text_lines: 0,
            nginx_lines: 0,
            unparsed_lines: 0,
            error_count: 0,
            level_counts: BTreeMap::new(),
            service_counts: BTreeMap::new(),
            services: Vec::new(),
            reader_error: None,
            ai_status: "disabled",
            guardrails,
        }
    }
}

/// Baseline cluster: all events of one analysis sharing a fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineCluster {
    /// 1-based rank after the canonical `-count, fingerprint` ordering.
    pub id: usize,
    pub fingerprint: String,
    pub title: String,
    pub count: u64,
    pub first_line: u64,
    pub last_line: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub sample_message: String,
    pub level: Level,
    pub service: String,
    pub sample_events: Vec<u64>,
    pub affected_services: Vec<String>,
}

struct ClusterAccum {
    count: u64,
    first_line: u64,
    last_line: u64,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    sample_message: String,
    level: Level,
    service: String,
    sample_events: Vec<u64>,
    services: BTreeSet<String>,
}

impl ClusterAccum {
    fn seed(event: &LogEvent) -> Self {
        let mut services = BTreeSet::new();
        if !event.service.is_empty() {
            services.insert(event.service.clone());
        }
        Self {
            count: 1,
            first_line: event.line_no,
            last_line: event.line_no,
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            sample_message: event.message.clone(),
            level: event.level,
            service: event.service.clone(),
            sample_events: vec![event.line_no],
            services,
        }
    }

    fn absorb(&mut self, event: &LogEvent) {
        self.count += 1;
        self.last_line = event.line_no;
        if let Some(ts) = event.timestamp {
            self.first_seen = Some(self.first_seen.map_or(ts, |seen| seen.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |seen| seen.max(ts)));
        }
        if self.sample_events.len() < MAX_SAMPLE_EVENTS {
            self.sample_events.push(event.line_no);
        }
        if !event.service.is_empty() {
            self.services.insert(event.service.clone());
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Streams normalized events into running statistics and per-fingerprint
/// cluster accumulators, committing events through the sink in fixed-size
/// batches so the whole line sequence is never held in memory.
pub struct Aggregator<'a> {
    stats: AnalysisStats,
    groups: HashMap<String, ClusterAccum>,
    batch: Vec<LogEvent>,
    batch_size: usize,
    sink: &'a mut dyn EventSink,
}

impl<'a> Aggregator<'a> {
    pub fn new(batch_size: usize, guardrails: Guardrails, sink: &'a mut dyn EventSink) -> Self {
        Self {
            stats: AnalysisStats::new(guardrails),
            groups: HashMap::new(),
            batch: Vec::new(),
            batch_size: batch_size.max(1),
            sink,
        }
    }

    pub fn push(&mut self, event: LogEvent, parser: ParserKind) -> Result<(), SinkError> {
        self.stats.total_lines += 1;
        match parser {
            ParserKind::Json => self.stats.json_lines += 1,
            ParserKind::Text => self.stats.text_lines += 1,
            ParserKind::Nginx => self.stats.nginx_lines += 1,
            ParserKind::Raw => self.stats.unparsed_lines += 1,
        }

        *self
            .stats
            .level_counts
            .entry(event.level.as_str().to_string())
            .or_insert(0) += 1;
        if event.level.is_high_severity() {
            self.stats.error_count += 1;
        }
        if !event.service.is_empty() {
            *self
                .stats
                .service_counts
                .entry(event.service.clone())
                .or_insert(0) += 1;
        }

        self.groups
            .entry(event.fingerprint.clone())
            .and_modify(|accum| accum.absorb(&event))
            .or_insert_with(|| ClusterAccum::seed(&event));

        self.batch.push(event);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Commits whatever is buffered. Safe to call on interruption paths;
    /// already-committed batches are never rolled back.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        self.sink.write_batch(batch)
    }

    pub fn set_truncated(&mut self, reason: crate::reader::TruncatedBy) {
        self.stats.truncated = true;
        self.stats.truncated_by = Some(reason.as_str());
    }

    pub fn set_reader_error(&mut self) {
        self.stats.reader_error = Some("unreadable_source");
    }

    /// Finalizes statistics and baseline clusters. Does not flush; callers
    /// flush explicitly so interruption paths stay in control of commits.
    pub fn into_parts(mut self) -> (AnalysisStats, Vec<BaselineCluster>) {
        self.stats.services = self.stats.service_counts.keys().cloned().collect();

        let mut clusters: Vec<BaselineCluster> = self
            .groups
            .into_iter()
            .map(|(fingerprint, accum)| BaselineCluster {
                id: 0,
                fingerprint,
                title: truncate_chars(&accum.sample_message, MAX_TITLE_CHARS),
                count: accum.count,
                first_line: accum.first_line,
                last_line: accum.last_line,
                first_seen: accum.first_seen,
                last_seen: accum.last_seen,
                sample_message: accum.sample_message,
                level: accum.level,
                service: accum.service,
                sample_events: accum.sample_events,
                affected_services: accum.services.into_iter().collect(),
            })
            .collect();

        clusters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.fingerprint.cmp(&b.fingerprint)));
        for (index, cluster) in clusters.iter_mut().enumerate() {
            cluster.id = index + 1;
        }

        (self.stats, clusters)
    }
}
