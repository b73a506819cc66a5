// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn push_splits_complete_lines() {
    let mut splitter = LineSplitter::new();
    let lines = splitter.push(b"hello\nworld\n");
    assert_eq!(lines, vec![b"hello".to_vec(), b"world".to_vec()]);
}

#[test]
fn push_buffers_partial_line_across_calls() {
    let mut splitter = LineSplitter::new();
    assert!(splitter.push(b"hel").is_empty());
    let lines = splitter.push(b"lo\n");
    assert_eq!(lines, vec![b"hello".to_vec()]);
}

#[test]
fn push_strips_trailing_carriage_return() {
    let mut splitter = LineSplitter::new();
    let lines = splitter.push(b"hello\r\n");
    assert_eq!(lines, vec![b"hello".to_vec()]);
}

#[test]
fn flush_returns_none_when_empty() {
    let mut splitter = LineSplitter::new();
    splitter.push(b"hello\n");
    assert!(splitter.flush().is_none());
}

#[test]
fn flush_drains_trailing_partial_buffer() {
    let mut splitter = LineSplitter::new();
    splitter.push(b"partial");
    assert_eq!(splitter.flush(), Some(b"partial".to_vec()));
    assert!(splitter.flush().is_none());
}

#[test]
fn classify_hybrid_line_recognizes_json_object() {
    match classify_hybrid_line(br#"{"event":"progress","pct":50}"#) {
        HybridLine::Message(serde_json::Value::Object(map)) => {
            assert_eq!(map.get("event").unwrap(), "progress");
        }
        _ => panic!("expected a parsed message"),
    }
}

#[test]
fn classify_hybrid_line_treats_bare_scalar_as_text() {
    match classify_hybrid_line(br#""just a quoted string""#) {
        HybridLine::Text => {}
        HybridLine::Message(_) => panic!("bare scalar should not be a message"),
    }
}

#[test]
fn classify_hybrid_line_treats_non_json_as_text() {
    match classify_hybrid_line(b"plain log output") {
        HybridLine::Text => {}
        HybridLine::Message(_) => panic!("non-JSON should not be a message"),
    }
}
