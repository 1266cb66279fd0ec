//! Tests for element discovery on in-memory pages

use crate::discovery::{
    find_by_text, find_by_text_deep, find_clickable, find_first, find_overlay_roots,
    find_search_inputs, native_options, nearest_interactable, popup_of, run_query,
};
use crate::oracle::{is_visible, normalized_label};
use crate::platforms::memory::NodeSpec;
use crate::selector::{DiscoveryQuery, Scope, TextPredicate};
use crate::tests::memory_page;

#[test]
fn test_find_by_text_never_returns_invisible_nodes() {
    let (memory, page) = memory_page("https://app.example.com/");
    memory.mount(NodeSpec::button("Next").hidden());
    memory.mount(NodeSpec::button("Next").invisible());
    memory.mount(NodeSpec::button("Next").opacity(0.0));
    let predicate = TextPredicate::exact("next");

    assert!(find_by_text(&predicate, &page.root()).is_none());

    let real = memory.mount(NodeSpec::button("Next"));
    let found = find_by_text(&predicate, &page.root()).expect("visible Next");
    assert_eq!(found, memory.element(real));
    for el in find_clickable(&page.root()) {
        assert!(is_visible(&el));
    }
}

#[test]
fn test_clickable_allowlist() {
    let (memory, page) = memory_page("https://app.example.com/");
    memory.mount(NodeSpec::new("div").text("Plain text"));
    memory.mount(NodeSpec::new("div").role("menuitem").text("Menu item"));
    memory.mount(NodeSpec::new("span").attr("tabindex", "0").text("Focusable"));
    memory.mount(NodeSpec::input("checkbox").attr("aria-label", "Check"));
    memory.mount(NodeSpec::input("text").attr("aria-label", "Search"));
    memory.mount(NodeSpec::new("a").text("Link"));

    let labels: Vec<String> = find_clickable(&page.root())
        .iter()
        .map(normalized_label)
        .collect();
    assert_eq!(labels, vec!["menu item", "focusable", "check", "link"]);
}

#[test]
fn test_overlay_matches_win_over_background_decoys() {
    let (memory, page) = memory_page("https://app.example.com/");
    let decoy = memory.mount(NodeSpec::button("Add"));
    let dialog = memory.mount(
        NodeSpec::new("div")
            .role("dialog")
            .attr("aria-modal", "true")
            .child(NodeSpec::button("Add")),
    );
    let in_dialog = memory.with_dom(|dom| dom.children(dialog)[0]);

    let found = find_first(&page, &DiscoveryQuery::from("exact:add")).expect("add button");
    assert_eq!(found, memory.element(in_dialog));

    let all = run_query(&page, &DiscoveryQuery::from("exact:add"));
    assert_eq!(all, vec![memory.element(in_dialog), memory.element(decoy)]);

    let document_only = find_first(&page, &DiscoveryQuery::from("exact:add").scope(Scope::Document));
    assert_eq!(document_only, Some(memory.element(decoy)));
}

#[test]
fn test_overlays_are_listed_topmost_first() {
    let (memory, page) = memory_page("https://app.example.com/");
    let menu = memory.mount(NodeSpec::new("div").role("menu"));
    let dialog = memory.mount(NodeSpec::new("dialog"));
    memory.mount(NodeSpec::new("div").role("listbox").hidden());

    let overlays = find_overlay_roots(&page.root());
    assert_eq!(overlays, vec![memory.element(dialog), memory.element(menu)]);
}

#[test]
fn test_deep_match_prefers_shortest_label_and_climbs() {
    let (memory, page) = memory_page("https://app.example.com/");
    let row = memory.mount(
        NodeSpec::new("div").attr("tabindex", "0").child(
            NodeSpec::new("span")
                .text("Outreach A")
                .child(NodeSpec::new("span").text("(3 steps)")),
        ),
    );
    memory.mount(NodeSpec::new("p").text("Outreach A is our default sequence for new leads"));

    let found = find_by_text_deep(&TextPredicate::contains("outreach a"), &page.root())
        .expect("deep match");
    assert_eq!(found, memory.element(row));
}

#[test]
fn test_nearest_interactable_stops_at_scope() {
    let (memory, page) = memory_page("https://app.example.com/");
    let button = memory.mount(
        NodeSpec::button("").child(NodeSpec::new("div").child(NodeSpec::new("span").text("Go"))),
    );
    let span = memory.with_dom(|dom| {
        let div = dom.children(button)[0];
        dom.children(div)[0]
    });
    let span = memory.element(span);

    let climbed = nearest_interactable(&span, &memory.element(button), 6, false);
    assert!(climbed.is_none(), "must not climb onto the scope itself");

    let climbed = nearest_interactable(&span, &page.root(), 6, false).expect("button ancestor");
    assert_eq!(climbed, memory.element(button));

    assert!(nearest_interactable(&span, &page.root(), 1, false).is_none());
}

#[test]
fn test_native_options_skip_placeholder_and_disabled() {
    let (memory, _page) = memory_page("https://app.example.com/");
    let select = memory.mount(
        NodeSpec::select(&[("seq-1", "Outreach A"), ("seq-2", "Outreach B")])
            .child(NodeSpec::option("seq-3", "Archived").disabled()),
    );
    let labels: Vec<String> = native_options(&memory.element(select))
        .iter()
        .map(normalized_label)
        .collect();
    assert_eq!(labels, vec!["outreach a", "outreach b"]);
}

#[test]
fn test_popup_of_follows_aria_controls() {
    let (memory, page) = memory_page("https://app.example.com/");
    let trigger = memory.mount(
        NodeSpec::button("More")
            .attr("aria-haspopup", "menu")
            .attr("aria-controls", "missing cand-menu"),
    );
    let trigger = memory.element(trigger);
    assert!(popup_of(&page, &trigger).is_none());

    let menu = memory.mount(NodeSpec::new("div").id("cand-menu").role("menu"));
    assert_eq!(popup_of(&page, &trigger), Some(memory.element(menu)));

    memory.with_dom(|dom| dom.hide(menu));
    assert!(popup_of(&page, &trigger).is_none());
}

#[test]
fn test_search_inputs() {
    let (memory, page) = memory_page("https://app.example.com/");
    let text = memory.mount(NodeSpec::input("text"));
    let search = memory.mount(NodeSpec::input("search"));
    memory.mount(NodeSpec::input("checkbox"));
    memory.mount(NodeSpec::input("text").disabled());
    memory.mount(NodeSpec::input("search").hidden());
    memory.mount(NodeSpec::new("textarea").value(""));
    memory.mount(NodeSpec::new("div").role("searchbox"));
    let searchbox = memory.mount(NodeSpec::input("number").role("searchbox"));

    assert_eq!(
        find_search_inputs(&page.root()),
        vec![
            memory.element(text),
            memory.element(search),
            memory.element(searchbox)
        ]
    );
}
