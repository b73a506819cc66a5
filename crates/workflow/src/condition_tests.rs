// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn literal_booleans() {
    let ctx = json!({});
    assert!(evaluate("true", &ctx).unwrap());
    assert!(!evaluate("false", &ctx).unwrap());
}

#[test]
fn equality_on_path() {
    let ctx = json!({"status": "ok"});
    assert!(evaluate("status == \"ok\"", &ctx).unwrap());
    assert!(!evaluate("status == \"bad\"", &ctx).unwrap());
}

#[test]
fn numeric_comparison() {
    let ctx = json!({"count": 5});
    assert!(evaluate("count > 3", &ctx).unwrap());
    assert!(!evaluate("count > 10", &ctx).unwrap());
    assert!(evaluate("count >= 5", &ctx).unwrap());
}

#[test]
fn logical_and_or() {
    let ctx = json!({"a": true, "b": false});
    assert!(evaluate("a || b", &ctx).unwrap());
    assert!(!evaluate("a && b", &ctx).unwrap());
}

#[test]
fn negation() {
    let ctx = json!({"ready": false});
    assert!(evaluate("!ready", &ctx).unwrap());
}

#[test]
fn parentheses_control_precedence() {
    let ctx = json!({"a": true, "b": false, "c": false});
    assert!(evaluate("a && (b || !c)", &ctx).unwrap());
    assert!(!evaluate("a && (b || c)", &ctx).unwrap());
}

#[test]
fn missing_path_resolves_to_null_and_is_falsy() {
    let ctx = json!({});
    assert!(!evaluate("missing", &ctx).unwrap());
    assert!(evaluate("missing == null", &ctx).unwrap());
}

#[test]
fn nested_path_access() {
    let ctx = json!({"step": {"result": {"success": true}}});
    assert!(evaluate("step.result.success", &ctx).unwrap());
}

#[test]
fn malformed_expression_is_a_parse_error() {
    let ctx = json!({});
    assert!(evaluate("&&", &ctx).is_err());
}
