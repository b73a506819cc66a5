// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn new_generates_prefixed_id() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn new_generates_unique_ids() {
    assert_ne!(TestId::new(), TestId::new());
}

#[test]
fn from_string_roundtrips() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id.as_str(), "tst-abc123");
    assert_eq!(id.to_string(), "tst-abc123");
}

#[test]
fn suffix_strips_prefix() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn suffix_falls_back_without_prefix() {
    let id = TestId::from_string("abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn short_truncates_the_suffix() {
    let id = TestId::from_string("tst-abcdefghijklmnop");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn short_returns_full_suffix_when_shorter() {
    let id = TestId::from_string("tst-ab");
    assert_eq!(id.short(8), "ab");
}

#[test]
fn hash_map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(TestId::from_string("tst-k"), 42);
    assert_eq!(map.get("tst-k"), Some(&42));
}

#[test]
fn equality_against_str() {
    let id = TestId::from_string("tst-abc");
    assert_eq!(id, "tst-abc");
    assert_eq!(id, *"tst-abc".to_string().as_str());
}

#[test]
fn is_empty_reports_blank_ids() {
    assert!(TestId::from_string("").is_empty());
    assert!(!TestId::new().is_empty());
}

#[test]
fn default_generates_a_fresh_id() {
    assert_ne!(TestId::default(), TestId::default());
}

#[test]
fn short_fn_on_str_truncates() {
    assert_eq!(short("abcdefghijklmnop", 8), "abcdefgh");
    assert_eq!(short("abc", 8), "abc");
}

#[test]
fn serde_roundtrip() {
    let id = TestId::from_string("tst-roundtrip");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"tst-roundtrip\"");
    let back: TestId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
