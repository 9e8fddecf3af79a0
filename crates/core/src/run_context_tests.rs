// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_context_renders_nothing() {
    let ctx = RunContext::new();
    assert!(ctx.is_empty());
    assert_eq!(ctx.to_prompt_section(1500), "");
}

#[test]
fn records_all_three_sections() {
    let mut ctx = RunContext::new();
    ctx.record_analysis(
        "NoMethodError",
        "Controller/products/show",
        "missing nil guard",
    );
    ctx.record_pattern("controllers fetch records without find_by");
    ctx.record_file("app/controllers/products_controller.rb", "show action");

    let section = ctx.to_prompt_section(1500);
    assert!(section.contains("### Errors Already Analyzed"));
    assert!(section.contains("NoMethodError in Controller/products/show — missing nil guard"));
    assert!(section.contains("### Codebase Patterns Discovered"));
    assert!(section.contains("### Key Files Examined"));
    assert!(section.contains("`app/controllers/products_controller.rb`: show action"));
}

#[test]
fn file_summary_capped_at_80_chars() {
    let mut ctx = RunContext::new();
    ctx.record_file("app/models/user.rb", &"x".repeat(200));
    assert_eq!(ctx.files_examined()[0].1.len(), 80);
}

#[test]
fn re_recording_a_file_updates_in_place() {
    let mut ctx = RunContext::new();
    ctx.record_file("a.rb", "first");
    ctx.record_file("b.rb", "other");
    ctx.record_file("a.rb", "second");

    assert_eq!(ctx.files_examined().len(), 2);
    assert_eq!(ctx.files_examined()[0], ("a.rb".to_string(), "second".to_string()));
}

#[test]
fn only_last_entries_rendered() {
    let mut ctx = RunContext::new();
    for i in 0..8 {
        ctx.record_analysis(&format!("Error{i}"), "tx", "");
    }
    let section = ctx.to_prompt_section(5000);
    assert!(!section.contains("Error0"));
    assert!(!section.contains("Error2"));
    assert!(section.contains("Error3"));
    assert!(section.contains("Error7"));
}

#[test]
fn long_context_truncated_with_marker() {
    let mut ctx = RunContext::new();
    for i in 0..10 {
        ctx.record_file(&format!("app/services/service_{i}.rb"), &"s".repeat(80));
    }
    let section = ctx.to_prompt_section(300);
    assert!(section.len() <= 300 + "\n\n[...truncated]".len());
    assert!(section.ends_with("[...truncated]"));
}

#[test]
fn analysis_entry_without_summary_has_no_dash() {
    let mut ctx = RunContext::new();
    ctx.record_analysis("KeyError", "Controller/carts/update", "");
    let section = ctx.to_prompt_section(1500);
    assert!(section.contains("- KeyError in Controller/carts/update"));
    assert!(!section.contains("Controller/carts/update —"));
}
