// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn error(class: &str, transaction: &str, occurrences: u64) -> ErrorGroup {
    let mut e = ErrorGroup::new(class, transaction);
    e.occurrences = occurrences;
    e.last_seen = Utc::now().timestamp_millis().to_string();
    e
}

#[parameterized(
    critical = {"SystemStackError", 1.0},
    high = {"ActiveRecord::RecordNotFound", 0.7},
    medium = {"ArgumentError", 0.5},
    low = {"Pundit::NotAuthorizedError", 0.3},
    unknown = {"WeirdCustomError", 0.5},
)]
fn severity_weights(class: &str, expected: f64) {
    assert_eq!(severity_weight(class), expected);
}

#[test]
fn recency_weight_decays_over_24h() {
    let now_ms = 1_760_000_000_000f64;
    let fresh = recency_weight("1760000000000", now_ms);
    let half_day = recency_weight(&format!("{}", 1_760_000_000_000u64 - 12 * 3_600_000), now_ms);
    let old = recency_weight(&format!("{}", 1_760_000_000_000u64 - 48 * 3_600_000), now_ms);

    assert_eq!(fresh, 1.0);
    assert!((half_day - 0.5).abs() < 1e-9);
    assert_eq!(old, 0.0);
}

#[test]
fn recency_weight_defaults_on_garbage() {
    assert_eq!(recency_weight("", 0.0), 0.5);
    assert_eq!(recency_weight("not-a-number", 0.0), 0.5);
}

#[parameterized(
    controller = {"Controller/products/show", 1.0},
    api = {"WebTransaction/api/v2/orders", 1.0},
    sidekiq = {"OtherTransaction/Sidekiq/ImportJob", 0.3},
    mailer = {"OtherTransaction/Mailer/WelcomeMailer", 0.5},
    other = {"WebTransaction/Rack/health", 0.6},
)]
fn user_facing_weights(transaction: &str, expected: f64) {
    assert_eq!(user_facing_weight(transaction), expected);
}

#[test]
fn rank_orders_by_score_descending() {
    let errors = vec![
        error("Pundit::NotAuthorizedError", "OtherTransaction/Sidekiq/X", 1),
        error("SystemStackError", "Controller/checkout/create", 500),
        error("ArgumentError", "Controller/products/index", 20),
    ];
    let ranked = rank_errors(errors);

    assert_eq!(ranked[0].error_class, "SystemStackError");
    assert_eq!(ranked[2].error_class, "Pundit::NotAuthorizedError");
    assert!(ranked[0].score > ranked[1].score);
    assert!(ranked.iter().all(|e| e.score > 0.0 && e.score <= 1.0));
}

#[test]
fn filter_respects_match_kinds() {
    let patterns = vec![
        IgnorePattern {
            pattern: "Timeout::Error".to_string(),
            match_kind: IgnoreMatch::Exact,
            reason: String::new(),
        },
        IgnorePattern {
            pattern: "rate limit".to_string(),
            match_kind: IgnoreMatch::Contains,
            reason: String::new(),
        },
        IgnorePattern {
            pattern: "ActiveRecord::".to_string(),
            match_kind: IgnoreMatch::Prefix,
            reason: String::new(),
        },
    ];

    let mut rate_limited = error("ApiError", "Controller/x/y", 3);
    rate_limited.message = "upstream rate limit exceeded".to_string();

    let errors = vec![
        error("Timeout::Error", "Controller/a/b", 5),
        rate_limited,
        error("ActiveRecord::RecordNotFound", "Controller/c/d", 9),
        error("NoMethodError", "Controller/e/f", 2),
    ];

    let kept = filter_errors(errors, &patterns);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].error_class, "NoMethodError");
}

#[test]
fn empty_patterns_keep_everything() {
    let errors = vec![error("KeyError", "Controller/a/b", 1)];
    assert_eq!(filter_errors(errors.clone(), &[]).len(), errors.len());
}

#[test]
fn load_ignore_patterns_missing_file_is_empty() {
    assert!(load_ignore_patterns(Path::new("/nonexistent/ignore.yml")).is_empty());
}

#[test]
fn load_ignore_patterns_parses_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ignore.yml");
    std::fs::write(
        &path,
        "ignore:\n  - pattern: Timeout::Error\n    match: exact\n    reason: transient\n  - pattern: ssl\n",
    )
    .unwrap();

    let patterns = load_ignore_patterns(&path);
    assert_eq!(patterns.len(), 2);
    assert_eq!(patterns[0].match_kind, IgnoreMatch::Exact);
    assert_eq!(patterns[1].match_kind, IgnoreMatch::Contains);
}
