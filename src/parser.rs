use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Service name recorded for lines classified by the web-server log parser.
pub const NGINX_SERVICE: &str = "nginx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Json,
    Text,
    Nginx,
    Raw,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Json => "json",
            ParserKind::Text => "text",
            ParserKind::Nginx => "nginx",
            ParserKind::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Unknown => "unknown",
        }
    }

    /// Case-insensitive synonym table. Anything outside it is `unknown`.
    pub fn normalize(value: Option<&str>) -> Level {
        let Some(value) = value else {
            return Level::Unknown;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Level::Debug,
            "info" | "notice" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" | "err" => Level::Error,
            "fatal" | "critical" => Level::Fatal,
            _ => Level::Unknown,
        }
    }

    pub fn is_high_severity(&self) -> bool {
        matches!(self, Level::Error | Level::Fatal)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields extracted from one raw line by exactly one parser.
#[derive(Debug, Clone)]
pub struct ParsedFields {
    pub timestamp: Option<String>,
    pub level: Level,
    pub service: Option<String>,
    pub message: String,
    pub trace_id: Option<String>,
    pub request_id: Option<String>,
    pub raw_json: Option<Value>,
}

static RE_TEXT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+(?P<level>debug|info|warn|warning|error|err|fatal|critical)\s*:?\s+(?P<rest>.+)$",
    )
    .unwrap()
});

static RE_TEXT_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\[(?P<ts>[^\]]+)\]\s*\[(?P<level>debug|info|warn|warning|error|err|fatal|critical)\]\s*(?P<rest>.+)$",
    )
    .unwrap()
});

static RE_NGINX_ACCESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<addr>\S+) \S+ \S+ \[(?P<ts>[^\]]+)\] "(?P<method>[A-Z]+) (?P<path>\S+) HTTP/(?P<proto>[0-9.]+)" (?P<status>\d{3}) (?P<bytes>\d+|-) "(?P<referer>[^"]*)" "(?P<agent>[^"]*)"$"#,
    )
    .unwrap()
});

static RE_NGINX_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<ts>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<level>[a-z]+)\] (?P<rest>.+)$")
        .unwrap()
});

fn pick<'a>(map: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Structured JSON line: any JSON object, with synonym lists per field.
pub fn parse_json_line(line: &str) -> Option<ParsedFields> {
    let value: Value = serde_json::from_str(line).ok()?;
    let map = value.as_object()?;

    let timestamp = pick(map, &["timestamp", "time", "ts", "datetime"]).map(scalar_string);
    let level = Level::normalize(
        pick(map, &["level", "severity", "log_level"])
            .map(scalar_string)
            .as_deref(),
    );
    let service = pick(map, &["service", "component", "logger", "app"]).map(scalar_string);
    let message = pick(map, &["message", "msg", "event"])
        .map(scalar_string)
        .unwrap_or_default();
    let trace_id = pick(map, &["trace_id", "traceId", "correlation_id"]).map(scalar_string);
    let request_id = pick(map, &["request_id", "requestId"]).map(scalar_string);

    Some(ParsedFields {
        timestamp,
        level,
        service,
        message,
        trace_id,
        request_id,
        raw_json: Some(value),
    })
}

/// Splits `rest` into (service, message) when it carries a ` - ` separator
/// and the left segment is a single token.
fn split_service(rest: &str) -> (Option<String>, String) {
    if let Some((left, right)) = rest.split_once(" - ") {
        let left = left.trim();
        if !left.is_empty() && !left.contains(' ') {
            return (Some(left.to_string()), right.trim().to_string());
        }
    }
    (None, rest.trim().to_string())
}

/// Timestamp+level free text, plain (`2024-01-01T00:00:00Z error ...`) or
/// bracketed (`[ts] [LEVEL] ...`).
pub fn parse_text_line(line: &str) -> Option<ParsedFields> {
    let caps = RE_TEXT_LINE
        .captures(line)
        .or_else(|| RE_TEXT_BRACKET.captures(line))?;

    let level = Level::normalize(Some(&caps["level"]));
    let (service, message) = split_service(&caps["rest"]);

    Some(ParsedFields {
        timestamp: Some(caps["ts"].to_string()),
        level,
        service,
        message,
        trace_id: None,
        request_id: None,
        raw_json: None,
    })
}

/// Web-server access/error lines. Access lines derive their level from the
/// status code; error lines carry it inline.
pub fn parse_nginx_line(line: &str) -> Option<ParsedFields> {
    if let Some(caps) = RE_NGINX_ACCESS.captures(line) {
        let status: u16 = caps["status"].parse().ok()?;
        let level = if status >= 500 {
            Level::Error
        } else if status >= 400 {
            Level::Warn
        } else {
            Level::Info
        };
        return Some(ParsedFields {
            timestamp: Some(caps["ts"].to_string()),
            level,
            service: Some(NGINX_SERVICE.to_string()),
            message: format!("{} {} -> {}", &caps["method"], &caps["path"], status),
            trace_id: None,
            request_id: None,
            raw_json: None,
        });
    }

    let caps = RE_NGINX_ERROR.captures(line)?;
    Some(ParsedFields {
        timestamp: Some(caps["ts"].to_string()),
        level: Level::normalize(Some(&caps["level"])),
        service: Some(NGINX_SERVICE.to_string()),
        message: caps["rest"].trim().to_string(),
        trace_id: None,
        request_id: None,
        raw_json: None,
    })
}

fn raw_fallback(line: &str) -> ParsedFields {
    ParsedFields {
        timestamp: None,
        level: Level::Unknown,
        service: None,
        message: line.to_string(),
        trace_id: None,
        request_id: None,
        raw_json: None,
    }
}

/// Ordered parser chain. Each parser is total; the first hit wins and the
/// raw fallback guarantees every line classifies.
pub fn parse_line(line: &str) -> (ParsedFields, ParserKind) {
    if let Some(parsed) = parse_json_line(line) {
        return (parsed, ParserKind::Json);
    }
    if let Some(parsed) = parse_text_line(line) {
        return (parsed, ParserKind::Text);
    }
    if let Some(parsed) = parse_nginx_line(line) {
        return (parsed, ParserKind::Nginx);
    }
    (raw_fallback(line), ParserKind::Raw)
}
