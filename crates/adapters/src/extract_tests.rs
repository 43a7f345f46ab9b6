// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn direct_parse_wins() {
    let (value, method) = extract_json(r#"{"kind": "execute"}"#).unwrap();
    assert_eq!(method, ExtractMethod::Direct);
    assert_eq!(value["kind"], "execute");
}

#[test]
fn fenced_block_is_found() {
    let raw = "Here is the plan:\n```json\n{\"kind\": \"execute\"}\n```\nGood luck!";
    let (value, method) = extract_json(raw).unwrap();
    assert_eq!(method, ExtractMethod::Fenced);
    assert_eq!(value["kind"], "execute");
}

#[test]
fn fenced_block_without_language_tag() {
    let raw = "```\n{\"a\": 1}\n```";
    let (value, method) = extract_json(raw).unwrap();
    assert_eq!(method, ExtractMethod::Fenced);
    assert_eq!(value["a"], 1);
}

#[test]
fn balanced_scan_recovers_embedded_object() {
    let raw = "I think the answer is {\"kind\": \"question\", \"note\": \"a } in a string\"} hope that helps";
    let (value, method) = extract_json(raw).unwrap();
    assert_eq!(method, ExtractMethod::BalancedScan);
    assert_eq!(value["kind"], "question");
    assert_eq!(value["note"], "a } in a string");
}

#[test]
fn longest_object_is_preferred() {
    let raw = "{\"a\": 1} and then {\"b\": 2, \"c\": {\"d\": 3}}";
    let (value, _method) = extract_json(raw).unwrap();
    assert_eq!(value["b"], 2);
}

#[test]
fn arrays_are_not_accepted() {
    assert!(extract_json("[1, 2, 3]").is_none());
}

#[test]
fn prose_without_json_yields_none() {
    assert!(extract_json("I could not produce a plan today.").is_none());
}

#[test]
fn unbalanced_braces_yield_none() {
    assert!(extract_json("{\"kind\": \"execute\"").is_none());
}

#[test]
fn escaped_quotes_inside_strings() {
    let raw = r#"noise {"msg": "she said \"hi\" {"} trailing"#;
    let (value, _) = extract_json(raw).unwrap();
    assert_eq!(value["msg"], "she said \"hi\" {");
}
