// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn key_combines_class_and_transaction() {
    let error = ErrorGroup::new("NoMethodError", "Controller/products/show");
    assert_eq!(error.key(), "NoMethodError:Controller/products/show");
}

#[test]
fn new_defaults_to_single_occurrence() {
    let error = ErrorGroup::new("TypeError", "Controller/orders/update");
    assert_eq!(error.occurrences, 1);
    assert_eq!(error.score, 0.0);
    assert!(error.entity_guid.is_none());
}

#[test]
fn error_group_serde_round_trip() {
    let mut error = ErrorGroup::new("ActiveRecord::RecordNotFound", "Controller/orders/show");
    error.message = "Couldn't find Order".to_string();
    error.occurrences = 42;
    error.last_seen = "1760000000000".to_string();
    error.entity_guid = Some("guid-1".to_string());

    let json = serde_json::to_string(&error).unwrap();
    let parsed: ErrorGroup = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, error);
}

#[test]
fn trace_data_empty_check() {
    let traces = TraceData::default();
    assert!(traces.is_empty());

    let traces = TraceData {
        transaction_errors: vec![json!({"error.class": "TypeError"})],
        error_traces: vec![],
    };
    assert!(!traces.is_empty());
}

#[test]
fn trace_data_deserializes_with_missing_fields() {
    let traces: TraceData = serde_json::from_str("{}").unwrap();
    assert!(traces.is_empty());
}
