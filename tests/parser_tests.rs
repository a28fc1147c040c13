use loglens::parser::{parse_line, Level, ParserKind, NGINX_SERVICE};

#[test]
fn json_object_line_wins_the_chain() {
    let line = r#"{"timestamp":"2024-01-15T14:20:00Z","level":"error","service":"payments","message":"charge failed","trace_id":"abc123","request_id":"req-9"}"#;
    let (parsed, kind) = parse_line(line);
    assert_eq!(kind, ParserKind::Json);
    assert_eq!(parsed.timestamp.as_deref(), Some("2024-01-15T14:20:00Z"));
    assert_eq!(parsed.level, Level::Error);
    assert_eq!(parsed.service.as_deref(), Some("payments"));
    assert_eq!(parsed.message, "charge failed");
    assert_eq!(parsed.trace_id.as_deref(), Some("abc123"));
    assert_eq!(parsed.request_id.as_deref(), Some("req-9"));
    assert!(parsed.raw_json.is_some());
}

#[test]
fn json_field_synonyms_are_accepted() {
    let line = r#"{"ts":1700000000,"severity":"WARNING","component":"auth","msg":"slow login","correlation_id":"c-1","requestId":"r-2"}"#;
    let (parsed, kind) = parse_line(line);
    assert_eq!(kind, ParserKind::Json);
    assert_eq!(parsed.timestamp.as_deref(), Some("1700000000"));
    assert_eq!(parsed.level, Level::Warn);
    assert_eq!(parsed.service.as_deref(), Some("auth"));
    assert_eq!(parsed.message, "slow login");
    assert_eq!(parsed.trace_id.as_deref(), Some("c-1"));
    assert_eq!(parsed.request_id.as_deref(), Some("r-2"));
}

#[test]
fn json_null_fields_are_skipped() {
    let line = r#"{"level":null,"severity":"err","message":null,"msg":"fallback"}"#;
    let (parsed, _) = parse_line(line);
    assert_eq!(parsed.level, Level::Error);
    assert_eq!(parsed.message, "fallback");
}

#[test]
fn non_object_json_falls_through_to_raw() {
    let (parsed, kind) = parse_line(r#"[1, 2, 3]"#);
    assert_eq!(kind, ParserKind::Raw);
    assert_eq!(parsed.level, Level::Unknown);
    assert_eq!(parsed.message, "[1, 2, 3]");
}

#[test]
fn text_line_with_service_separator() {
    let (parsed, kind) = parse_line("2024-01-15T14:20:00Z ERROR payments-api - upstream timeout");
    assert_eq!(kind, ParserKind::Text);
    assert_eq!(parsed.level, Level::Error);
    assert_eq!(parsed.service.as_deref(), Some("payments-api"));
    assert_eq!(parsed.message, "upstream timeout");
    assert_eq!(parsed.timestamp.as_deref(), Some("2024-01-15T14:20:00Z"));
}

#[test]
fn text_line_without_separator_keeps_whole_message() {
    let (parsed, kind) = parse_line("2024-01-15 14:20:00 warn disk usage at 91 percent");
    assert_eq!(kind, ParserKind::Text);
    assert_eq!(parsed.level, Level::Warn);
    assert!(parsed.service.is_none());
    assert_eq!(parsed.message, "disk usage at 91 percent");
}

#[test]
fn text_line_left_segment_with_space_is_not_a_service() {
    let (parsed, _) = parse_line("2024-01-15T14:20:00Z info user login - succeeded");
    assert!(parsed.service.is_none());
    assert_eq!(parsed.message, "user login - succeeded");
}

#[test]
fn bracketed_text_variant_parses() {
    let (parsed, kind) = parse_line("[2024-01-15 14:20:00] [WARNING] queue depth rising");
    assert_eq!(kind, ParserKind::Text);
    assert_eq!(parsed.level, Level::Warn);
    assert_eq!(parsed.message, "queue depth rising");
    assert_eq!(parsed.timestamp.as_deref(), Some("2024-01-15 14:20:00"));
}

#[test]
fn nginx_access_line_derives_level_from_status() {
    let line = r#"192.0.2.10 - - [10/Oct/2024:13:55:36 +0000] "GET /api/items HTTP/1.1" 502 152 "-" "curl/8.0""#;
    let (parsed, kind) = parse_line(line);
    assert_eq!(kind, ParserKind::Nginx);
    assert_eq!(parsed.level, Level::Error);
    assert_eq!(parsed.service.as_deref(), Some(NGINX_SERVICE));
    assert_eq!(parsed.message, "GET /api/items -> 502");
    assert_eq!(parsed.timestamp.as_deref(), Some("10/Oct/2024:13:55:36 +0000"));
}

#[test]
fn nginx_access_status_bands() {
    let warn_line = r#"192.0.2.10 - - [10/Oct/2024:13:55:36 +0000] "POST /login HTTP/1.1" 404 0 "-" "-""#;
    let (parsed, _) = parse_line(warn_line);
    assert_eq!(parsed.level, Level::Warn);

    let info_line = r#"192.0.2.10 - - [10/Oct/2024:13:55:36 +0000] "GET /healthz HTTP/1.1" 200 2 "-" "-""#;
    let (parsed, _) = parse_line(info_line);
    assert_eq!(parsed.level, Level::Info);
}

#[test]
fn nginx_error_line_parses_timestamp_and_level() {
    let (parsed, kind) = parse_line("2024/10/10 13:55:36 [error] 1234#0: *5 connect() failed");
    assert_eq!(kind, ParserKind::Nginx);
    assert_eq!(parsed.level, Level::Error);
    assert_eq!(parsed.message, "1234#0: *5 connect() failed");
    assert_eq!(parsed.timestamp.as_deref(), Some("2024/10/10 13:55:36"));
}

#[test]
fn unparseable_line_falls_back_to_raw() {
    let (parsed, kind) = parse_line("completely freeform noise without structure");
    assert_eq!(kind, ParserKind::Raw);
    assert_eq!(parsed.level, Level::Unknown);
    assert!(parsed.service.is_none());
    assert_eq!(parsed.message, "completely freeform noise without structure");
}

#[test]
fn level_normalization_table() {
    assert_eq!(Level::normalize(Some("NOTICE")), Level::Info);
    assert_eq!(Level::normalize(Some("warning")), Level::Warn);
    assert_eq!(Level::normalize(Some("ERR")), Level::Error);
    assert_eq!(Level::normalize(Some("critical")), Level::Fatal);
    assert_eq!(Level::normalize(Some("verbose")), Level::Unknown);
    assert_eq!(Level::normalize(None), Level::Unknown);
}
