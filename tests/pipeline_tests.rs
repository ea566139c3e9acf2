// tests/pipeline_tests.rs
use chrono::{Datelike, Utc};
use logrecycler::{AppConfig, LineOutcome, TransformPipeline};

fn pipeline(yaml: &str) -> TransformPipeline {
    let config = AppConfig::from_yaml_str(yaml).unwrap();
    TransformPipeline::new(config.pipeline)
}

fn emit(pipeline: &TransformPipeline, line: &str) -> Option<String> {
    pipeline.process(line).record().map(|r| r.to_json())
}

#[test]
fn test_plain_line_with_empty_config() {
    let pipeline = pipeline("");
    assert_eq!(emit(&pipeline, "hi").as_deref(), Some(r#"{"message":"hi"}"#));
}

#[test]
fn test_level_key_defaults_to_info() {
    let pipeline = pipeline("levelKey: severity");
    assert_eq!(
        emit(&pipeline, "hi").as_deref(),
        Some(r#"{"severity":"INFO","message":"hi"}"#)
    );
}

#[test]
fn test_timestamp_comes_first() {
    let pipeline = pipeline("timestampKey: ts\nlevelKey: level");
    let outcome = pipeline.process("hi");
    let record = outcome.record().unwrap();

    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["ts", "level", "message"]);
    let ts = record.get("ts").unwrap();
    assert!(ts.ends_with('Z'), "not UTC: {}", ts);
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
}

#[test]
fn test_add_fields() {
    let pipeline = pipeline("patterns:\n- regex: hi\n  add:\n    foo: bar\n");
    assert_eq!(
        emit(&pipeline, "hi").as_deref(),
        Some(r#"{"message":"hi","foo":"bar"}"#)
    );
}

#[test]
fn test_capture_can_replace_message() {
    let pipeline = pipeline("patterns:\n- regex: '(?P<message>hi) \\S+'\n");
    assert_eq!(emit(&pipeline, "hi foo").as_deref(), Some(r#"{"message":"hi"}"#));
}

#[test]
fn test_unmatched_line_passes_through() {
    let pipeline = pipeline("patterns:\n- regex: '^ERROR'\n  discard: true\n");
    assert_eq!(emit(&pipeline, "all good").as_deref(), Some(r#"{"message":"all good"}"#));
    assert!(pipeline.process("ERROR nope").is_dropped());
}

#[test]
fn test_discard_wins_over_later_rules() {
    let pipeline = pipeline(
        "patterns:\n- regex: hi\n  discard: true\n- regex: hi\n  add:\n    foo: bar\n",
    );
    assert!(matches!(pipeline.process("hi foo"), LineOutcome::Dropped(_)));
}

#[test]
fn test_sample_rate_extremes() {
    let always = pipeline("patterns:\n- regex: hi\n  sampleRate: 1.0\n");
    let never = pipeline("patterns:\n- regex: hi\n  sampleRate: 0.0\n");

    for _ in 0..200 {
        assert!(!always.process("hi").is_dropped());
        assert!(never.process("hi").is_dropped());
    }
    // sampling only applies to lines the rule matched
    assert!(!never.process("bye").is_dropped());
}

#[test]
fn test_rule_level_override() {
    let pipeline = pipeline("levelKey: level\npatterns:\n- regex: oops\n  level: ERROR\n");
    assert_eq!(
        emit(&pipeline, "oops").as_deref(),
        Some(r#"{"level":"ERROR","message":"oops"}"#)
    );
    assert_eq!(
        emit(&pipeline, "fine").as_deref(),
        Some(r#"{"level":"INFO","message":"fine"}"#)
    );
}

#[test]
fn test_preprocess_then_patterns_see_new_message() {
    let pipeline = pipeline(
        "preprocess: '^(?P<host>\\S+) (?P<message>.*)'\npatterns:\n- regex: '^user (?P<user>\\w+)'\n",
    );
    assert_eq!(
        emit(&pipeline, "web1 user bob logged in").as_deref(),
        Some(r#"{"message":"user bob logged in","host":"web1","user":"bob"}"#)
    );
    assert_eq!(emit(&pipeline, "nospace").as_deref(), Some(r#"{"message":"nospace"}"#));
}

#[test]
fn test_glog_prefix() {
    let pipeline = pipeline("glog: simple\nlevelKey: level\ntimestampKey: ts\n");
    let outcome = pipeline.process("W0203 02:03:04.12345    123 foo.go:123] hi");
    let record = outcome.record().unwrap();

    let year = Utc::now().year();
    assert_eq!(record.get("ts"), Some(format!("{}-02-03T02:03:04Z", year).as_str()));
    assert_eq!(record.get("level"), Some("WARN"));
    assert_eq!(record.get("message"), Some("hi"));
}

#[test]
fn test_glog_ignores_other_lines() {
    let pipeline = pipeline("glog: simple\nlevelKey: level\n");
    assert_eq!(
        emit(&pipeline, "X0203 not glog").as_deref(),
        Some(r#"{"level":"INFO","message":"X0203 not glog"}"#)
    );
}

#[test]
fn test_json_message() {
    let pipeline = pipeline("json: simple");
    assert_eq!(
        emit(&pipeline, r#"{"foo":123}"#).as_deref(),
        Some(r#"{"message":"","foo":"123"}"#)
    );
    assert_eq!(
        emit(&pipeline, r#"{"message":"inner","ok":true}"#).as_deref(),
        Some(r#"{"message":"inner","ok":"true"}"#)
    );
}

#[test]
fn test_broken_json_passes_through() {
    let pipeline = pipeline("json: simple");
    assert_eq!(emit(&pipeline, "{}}}").as_deref(), Some(r#"{"message":"{}}}"}"#));
}

#[test]
fn test_json_fields_feed_patterns() {
    let pipeline = pipeline("json: simple\nmessageKey: msg\npatterns:\n- regex: boom\n  add:\n    alert: 'yes'\n");
    assert_eq!(
        emit(&pipeline, r#"{"msg":"boom","code":7}"#).as_deref(),
        Some(r#"{"msg":"boom","code":"7","alert":"yes"}"#)
    );
}

#[test]
fn test_labels_exclude_message_and_timestamp() {
    let pipeline = pipeline(
        "timestampKey: ts\nlevelKey: lvl\npatterns:\n- regex: '(?P<user>\\w+) in'\n  add:\n    kind: login\n",
    );
    let outcome = pipeline.process("bob in");
    let labels = outcome.labels().unwrap();

    assert_eq!(labels.keys().collect::<Vec<_>>(), vec!["lvl", "user", "kind"]);
    assert_eq!(labels["user"], "bob");
}

#[test]
fn test_ignore_metric_labels_only_for_matching_rule() {
    let pipeline = pipeline(
        "patterns:\n- regex: a\n  add:\n    x: '1'\n    y: '2'\n  ignoreMetricLabels: [y]\n- regex: b\n  add:\n    y: '3'\n",
    );

    let a = pipeline.process("a");
    assert_eq!(a.labels().unwrap().keys().collect::<Vec<_>>(), vec!["x"]);
    assert_eq!(a.record().unwrap().get("y"), Some("2"));

    let b = pipeline.process("b");
    assert_eq!(b.labels().unwrap().keys().collect::<Vec<_>>(), vec!["y"]);
}

#[test]
fn test_allow_metric_labels() {
    let pipeline = pipeline(
        "levelKey: lvl\nallowMetricLabels: [foo]\npatterns:\n- regex: hi\n  add:\n    foo: bar\n    baz: qux\n",
    );
    let outcome = pipeline.process("hi");
    let labels = outcome.labels().unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels["foo"], "bar");
}
