// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn pr(number: u64, changed_files: &[&str]) -> CorrelatedPr {
    CorrelatedPr {
        number,
        title: format!("PR {number}"),
        url: format!("https://example.test/pull/{number}"),
        merged_at: "2026-07-31T20:00:00Z".to_string(),
        changed_files: changed_files.iter().map(|s| s.to_string()).collect(),
        overlap_score: 0.0,
    }
}

#[test]
fn search_terms_from_transaction() {
    let terms = extract_search_terms("NoMethodError", "Controller/products/show");
    assert!(terms.contains("products"));
    assert!(terms.contains("product"), "singular form included");
    assert!(terms.contains("products_controller"));
    assert!(terms.contains("show"));
    assert!(!terms.contains("controller"), "noise dropped");
}

#[test]
fn search_terms_from_namespaced_class() {
    let terms = extract_search_terms("Orders::CheckoutService::Failure", "");
    assert!(terms.contains("orders"));
    assert!(terms.contains("checkout_service"));
}

#[test]
fn plain_error_classes_yield_nothing_useful() {
    let terms = extract_search_terms("NoMethodError", "");
    assert!(terms.is_empty());
}

#[test]
fn correlation_scores_by_overlap_fraction() {
    let error = ErrorGroup::new("NoMethodError", "Controller/products/show");
    let prs = vec![
        pr(1, &["app/controllers/products_controller.rb", "README.md"]),
        pr(2, &["app/models/order.rb"]),
        pr(3, &["app/models/product.rb"]),
    ];

    let related = correlate_error_with_prs(&error, &prs);
    assert_eq!(related.len(), 2);
    // PR 3 overlaps 1/1, PR 1 overlaps 1/2.
    assert_eq!(related[0].number, 3);
    assert_eq!(related[0].overlap_score, 1.0);
    assert_eq!(related[1].number, 1);
    assert_eq!(related[1].overlap_score, 0.5);
}

#[test]
fn no_terms_means_no_correlation() {
    let error = ErrorGroup::new("NoMethodError", "");
    assert!(correlate_error_with_prs(&error, &[pr(1, &["a.rb"])]).is_empty());
}

#[test]
fn formatted_section_is_a_markdown_table() {
    let mut one = pr(412, &["app/controllers/products_controller.rb"]);
    one.title = "A very long title that should be cut down to fit the table".to_string();
    one.overlap_score = 0.5;

    let section = format_correlated_prs(&[one]).unwrap();
    assert!(section.starts_with("## Recent Related Changes"));
    assert!(section.contains("| [#412](https://example.test/pull/412) |"));
    assert!(section.contains("... |"));
    assert!(section.contains("| 50% |"));
}

#[test]
fn empty_list_formats_to_none() {
    assert!(format_correlated_prs(&[]).is_none());
}
