use crate::config::RedactionConfig;
use crate::parser::{Level, ParsedFields, ParserKind};
use crate::redaction::{redact_text, Redaction};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

static RE_EXCEPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][A-Za-z0-9_]*(?:Exception|Error|Fault))\b").unwrap());

/// First exception/error/fault type name in the message, or `none`.
pub fn extract_exception_type(message: &str) -> &str {
    RE_EXCEPTION
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("none")
}

fn normalize_message_for_fingerprint(message: &str) -> String {
    let lowered = message.trim().to_lowercase();
    RE_DIGITS.replace_all(&lowered, "<num>").into_owned()
}

/// 32-hex-char failure signature. The digest keys on exception type plus the
/// digit-normalized message only; level and service do not contribute, so the
/// same signature groups across services.
pub fn compute_fingerprint(_level: &str, _service: &str, message: &str) -> String {
    let base = format!(
        "{}|{}",
        extract_exception_type(message),
        normalize_message_for_fingerprint(message)
    );
    let digest = Sha256::digest(base.as_bytes());
    hex::encode(digest)[..32].to_string()
}

const NAIVE_OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Tolerant timestamp parse: RFC 3339 first, then ISO-ish variants with an
/// offset, then naive variants assumed UTC, then the Apache access-log form.
/// Exhausting every format yields `None`, not an error.
pub fn parse_timestamp_value(value: Option<&str>) -> Option<DateTime<Utc>> {
    let candidate = value?.trim();
    if candidate.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(candidate, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(dt) = DateTime::parse_from_str(candidate, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[derive(Debug, Clone, Serialize)]
pub struct EventTags {
    pub parser: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction_types: Option<Vec<String>>,
}

/// Canonical event record: one per input line, redacted, fingerprinted,
/// immutable once aggregation commits it.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub line_no: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Level,
    pub service: String,
    pub message: String,
    pub raw: String,
    pub fingerprint: String,
    pub trace_id: Option<String>,
    pub request_id: Option<String>,
    pub tags: EventTags,
}

fn redact_optional(config: &RedactionConfig, value: Option<&str>) -> (Option<String>, Redaction) {
    match value {
        Some(text) if !text.is_empty() => {
            let outcome = redact_text(config, text);
            (Some(outcome.text.clone()), outcome)
        }
        _ => (None, Redaction::default()),
    }
}

/// Combines one line's parsed fields with the redaction outcome. Redaction
/// runs before fingerprinting, so fingerprints never key off secret data.
pub fn normalize_event(
    line_no: u64,
    raw_line: &str,
    parsed: &ParsedFields,
    parser: ParserKind,
    redaction: &RedactionConfig,
) -> LogEvent {
    let level = parsed.level;
    let service = parsed
        .service
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    let message = if parsed.message.is_empty() {
        raw_line
    } else {
        parsed.message.as_str()
    };

    let message_outcome = redact_text(redaction, message);
    let raw_outcome = redact_text(redaction, raw_line);
    let (trace_id, trace_outcome) = redact_optional(redaction, parsed.trace_id.as_deref());
    let (request_id, request_outcome) = redact_optional(redaction, parsed.request_id.as_deref());

    let mut redaction_count = 0usize;
    let mut redaction_types: BTreeSet<String> = BTreeSet::new();
    for outcome in [
        &message_outcome,
        &raw_outcome,
        &trace_outcome,
        &request_outcome,
    ] {
        redaction_count += outcome.count;
        redaction_types.extend(outcome.categories.iter().cloned());
    }

    let fingerprint = compute_fingerprint(level.as_str(), &service, &message_outcome.text);
    let timestamp = parse_timestamp_value(parsed.timestamp.as_deref());

    let tags = EventTags {
        parser: parser.as_str().to_string(),
        redaction_count: (redaction_count > 0).then_some(redaction_count),
        redaction_types: (redaction_count > 0)
            .then(|| redaction_types.into_iter().collect::<Vec<_>>()),
    };

    LogEvent {
        line_no,
        timestamp,
        level,
        service,
        message: message_outcome.text,
        raw: raw_outcome.text,
        fingerprint,
        trace_id,
        request_id,
        tags,
    }
}
