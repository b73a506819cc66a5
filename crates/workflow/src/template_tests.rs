// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn substitutes_top_level_key() {
    let context = json!({"name": "world"});
    assert_eq!(render("hello ${name}", &context), "hello world");
}

#[test]
fn substitutes_nested_path() {
    let context = json!({"task": {"result": {"value": 42}}});
    assert_eq!(render("answer: ${task.result.value}", &context), "answer: 42");
}

#[test]
fn substitutes_array_index() {
    let context = json!({"items": ["a", "b", "c"]});
    assert_eq!(render("${items[1]}", &context), "b");
}

#[test]
fn undefined_placeholder_renders_empty() {
    let context = json!({});
    assert_eq!(render("[${missing}]", &context), "[]");
}

#[test]
fn multiple_placeholders_in_one_string() {
    let context = json!({"a": "1", "b": "2"});
    assert_eq!(render("${a}-${b}", &context), "1-2");
}

#[test]
fn text_without_placeholders_is_unchanged() {
    let context = json!({});
    assert_eq!(render("no placeholders here", &context), "no placeholders here");
}
