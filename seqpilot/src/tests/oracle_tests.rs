//! Tests for normalization and visibility

use crate::oracle::{effective_label, is_disabled, is_interactable, is_visible, normalize};
use crate::platforms::memory::NodeSpec;
use crate::tests::memory_page;

#[test]
fn test_normalize_is_idempotent() {
    let samples = ["  Add   to\tSequence ", "ÄDD\n\nTO", "", "already normal"];
    for sample in samples {
        let once = normalize(sample);
        assert_eq!(normalize(&once), once, "normalize({sample:?}) not idempotent");
    }
}

#[test]
fn test_normalize_ignores_case_and_whitespace() {
    assert_eq!(normalize("  More\n Actions "), "more actions");
    assert_eq!(normalize("MORE ACTIONS"), normalize("more    actions"));
}

#[test]
fn test_effective_label_combines_text_aria_label_and_title() {
    let (memory, _page) = memory_page("https://app.example.com/");
    let id = memory.mount(
        NodeSpec::button("  Send ")
            .attr("aria-label", "Send   email")
            .attr("title", "Ctrl+Enter"),
    );
    let el = memory.element(id);
    assert_eq!(effective_label(&el), "Send Send email Ctrl+Enter");
}

#[test]
fn test_visibility_rules() {
    let (memory, _page) = memory_page("https://app.example.com/");
    let shown = memory.mount(NodeSpec::button("Shown"));
    let display_none = memory.mount(NodeSpec::button("Gone").hidden());
    let hidden = memory.mount(NodeSpec::button("Hidden").invisible());
    let transparent = memory.mount(NodeSpec::button("Transparent").opacity(0.0));
    let empty_box = memory.mount(NodeSpec::button("Collapsed").size(0.0, 24.0));
    let in_hidden_parent =
        memory.mount(NodeSpec::new("div").hidden().child(NodeSpec::button("Nested")));

    assert!(is_visible(&memory.element(shown)));
    assert!(!is_visible(&memory.element(display_none)));
    assert!(!is_visible(&memory.element(hidden)));
    assert!(!is_visible(&memory.element(transparent)));
    assert!(!is_visible(&memory.element(empty_box)));
    let nested = memory.with_dom(|dom| dom.children(in_hidden_parent)[0]);
    assert!(!is_visible(&memory.element(nested)));
}

#[test]
fn test_detached_node_is_not_visible() {
    let (memory, _page) = memory_page("https://app.example.com/");
    let id = memory.mount(NodeSpec::button("Soon gone"));
    let el = memory.element(id);
    assert!(is_visible(&el));
    memory.with_dom(|dom| dom.remove(id));
    assert!(!is_visible(&el));
    assert!(!el.is_connected());
}

#[test]
fn test_disabled_attribute_and_aria_disabled() {
    let (memory, _page) = memory_page("https://app.example.com/");
    let plain = memory.mount(NodeSpec::button("Go"));
    let disabled = memory.mount(NodeSpec::button("Go").disabled());
    let aria = memory.mount(NodeSpec::button("Go").attr("aria-disabled", "TRUE"));
    let aria_false = memory.mount(NodeSpec::button("Go").attr("aria-disabled", "false"));

    assert!(!is_disabled(&memory.element(plain)));
    assert!(is_disabled(&memory.element(disabled)));
    assert!(is_disabled(&memory.element(aria)));
    assert!(!is_disabled(&memory.element(aria_false)));
    assert!(is_interactable(&memory.element(plain)));
    assert!(!is_interactable(&memory.element(aria)));
}
