//! Element discovery engine.
//!
//! Nothing here caches nodes: every function re-derives its answer from the
//! tree as it is right now. Page-level lookups try visible overlays before the
//! whole document so a decoy in the background never wins while a menu or
//! modal is open.

use crate::element::Element;
use crate::oracle::{is_disabled, is_visible, normalize, normalized_label};
use crate::selector::{DiscoveryQuery, MatchMode, Scope, TextPredicate};
use crate::Page;
use tracing::trace;

/// How far [`find_by_text_deep`] climbs looking for an interactable ancestor.
pub const MAX_ANCESTOR_HOPS: usize = 6;

const CLICKABLE_TAGS: &[&str] = &["button", "a", "summary"];
const CLICKABLE_INPUT_TYPES: &[&str] = &["button", "submit", "reset", "checkbox", "radio"];
const CLICKABLE_ROLES: &[&str] = &[
    "button",
    "link",
    "menuitem",
    "menuitemradio",
    "menuitemcheckbox",
    "option",
    "tab",
    "switch",
    "checkbox",
    "radio",
    "combobox",
    "treeitem",
];
const OVERLAY_ROLES: &[&str] = &["dialog", "alertdialog", "menu", "listbox"];
const SEARCH_INPUT_TYPES: &[&str] = &["text", "search", ""];

/// Tag/role allowlist check, ignoring visibility and disabled state.
pub fn is_clickable_candidate(element: &Element) -> bool {
    let tag = element.tag();
    if CLICKABLE_TAGS.contains(&tag.as_str()) {
        return true;
    }
    if tag == "input" {
        let kind = element.attribute("type").unwrap_or_default().to_lowercase();
        return CLICKABLE_INPUT_TYPES.contains(&kind.as_str());
    }
    if let Some(role) = element.role() {
        if CLICKABLE_ROLES.contains(&role.as_str()) {
            return true;
        }
    }
    element.has_attribute("tabindex")
}

/// Allowlisted, visible and not disabled.
pub fn is_clickable(element: &Element) -> bool {
    is_clickable_candidate(element) && is_visible(element) && !is_disabled(element)
}

/// Visible, enabled interactive nodes beneath `scope`.
pub fn find_clickable(scope: &Element) -> Vec<Element> {
    scope
        .descendants()
        .into_iter()
        .filter(is_clickable)
        .collect()
}

/// Visible interactive nodes beneath `scope`, disabled ones included.
pub fn find_controls(scope: &Element) -> Vec<Element> {
    scope
        .descendants()
        .into_iter()
        .filter(|el| is_clickable_candidate(el) && is_visible(el))
        .collect()
}

pub fn find_all_by_text(predicate: &TextPredicate, scope: &Element) -> Vec<Element> {
    find_clickable(scope)
        .into_iter()
        .filter(|el| predicate.matches_normalized(&normalized_label(el)))
        .collect()
}

pub fn find_by_text(predicate: &TextPredicate, scope: &Element) -> Option<Element> {
    find_clickable(scope)
        .into_iter()
        .find(|el| predicate.matches_normalized(&normalized_label(el)))
}

/// Like [`find_all_by_text`] but keeps visible controls that are disabled.
pub fn find_all_controls_by_text(predicate: &TextPredicate, scope: &Element) -> Vec<Element> {
    find_controls(scope)
        .into_iter()
        .filter(|el| predicate.matches_normalized(&normalized_label(el)))
        .collect()
}

/// Match over every visible node, most specific (shortest label) first, then
/// climb to the nearest interactable ancestor.
pub fn find_by_text_deep(predicate: &TextPredicate, scope: &Element) -> Option<Element> {
    deep_match(predicate, scope, false)
}

fn deep_match(predicate: &TextPredicate, scope: &Element, include_disabled: bool) -> Option<Element> {
    let mut matches: Vec<(usize, Element)> = scope
        .descendants()
        .into_iter()
        .filter(is_visible)
        .filter_map(|el| {
            let label = normalized_label(&el);
            if label.is_empty() || !predicate.matches_normalized(&label) {
                return None;
            }
            Some((label.chars().count(), el))
        })
        .collect();
    // stable sort keeps document order among equal lengths
    matches.sort_by_key(|(len, _)| *len);
    let (_, best) = matches.into_iter().next()?;
    trace!(?best, "deep text match");
    Some(nearest_interactable(&best, scope, MAX_ANCESTOR_HOPS, include_disabled).unwrap_or(best))
}

/// `element` itself or its nearest clickable ancestor within `max_hops`,
/// never climbing past `scope`.
pub fn nearest_interactable(
    element: &Element,
    scope: &Element,
    max_hops: usize,
    include_disabled: bool,
) -> Option<Element> {
    let accept = |el: &Element| {
        if include_disabled {
            is_clickable_candidate(el) && is_visible(el)
        } else {
            is_clickable(el)
        }
    };
    if accept(element) {
        return Some(element.clone());
    }
    for ancestor in element.ancestors(max_hops) {
        if &ancestor == scope {
            break;
        }
        if accept(&ancestor) {
            return Some(ancestor);
        }
    }
    None
}

/// Modal, menu or listbox style container.
pub fn is_overlay(element: &Element) -> bool {
    if element.tag() == "dialog" || element.attribute_is_true("aria-modal") {
        return true;
    }
    if element.has_attribute("data-portal") {
        return true;
    }
    element
        .role()
        .map(|role| OVERLAY_ROLES.contains(&role.as_str()))
        .unwrap_or(false)
}

/// Visible overlay containers, top-most (last in document order) first.
pub fn find_overlay_roots(root: &Element) -> Vec<Element> {
    let mut overlays: Vec<Element> = root
        .descendants()
        .into_iter()
        .filter(|el| is_overlay(el) && is_visible(el))
        .collect();
    overlays.reverse();
    overlays
}

/// Visible, enabled text/search inputs (including input-based comboboxes).
pub fn find_search_inputs(scope: &Element) -> Vec<Element> {
    scope
        .descendants()
        .into_iter()
        .filter(|el| {
            if el.tag() != "input" {
                return false;
            }
            let kind = el.attribute("type").unwrap_or_default().to_lowercase();
            let typed = SEARCH_INPUT_TYPES.contains(&kind.as_str())
                || matches!(el.role().as_deref(), Some("searchbox"));
            typed && is_visible(el) && !is_disabled(el)
        })
        .collect()
}

pub fn find_native_selects(scope: &Element) -> Vec<Element> {
    scope
        .descendants()
        .into_iter()
        .filter(|el| el.tag() == "select" && is_visible(el) && !is_disabled(el))
        .collect()
}

pub fn find_listboxes(scope: &Element) -> Vec<Element> {
    scope
        .descendants()
        .into_iter()
        .filter(|el| el.role().as_deref() == Some("listbox") && is_visible(el))
        .collect()
}

/// Visible, enabled `role=option` rows beneath `scope`.
pub fn find_list_options(scope: &Element) -> Vec<Element> {
    scope
        .descendants()
        .into_iter()
        .filter(|el| el.role().as_deref() == Some("option") && is_clickable(el))
        .collect()
}

/// Real choices of a native select; options are not rendered boxes, so no
/// visibility filter. The empty-value placeholder is skipped.
pub fn native_options(select: &Element) -> Vec<Element> {
    select
        .descendants()
        .into_iter()
        .filter(|el| {
            el.tag() == "option"
                && !is_disabled(el)
                && el
                    .attribute("value")
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(true)
        })
        .collect()
}

/// Container a trigger declares via `aria-controls` / `aria-owns`, if visible.
pub fn popup_of(page: &Page, trigger: &Element) -> Option<Element> {
    ["aria-controls", "aria-owns"]
        .iter()
        .filter_map(|attr| trigger.attribute(attr))
        .flat_map(|ids| {
            ids.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter_map(|id| page.element_by_dom_id(&id))
        .find(is_visible)
}

/// Ordered search roots for a scope.
pub fn resolve_roots(page: &Page, scope: &Scope) -> Vec<Element> {
    match scope {
        Scope::Document => vec![page.root()],
        Scope::Within(element) => vec![element.clone()],
        Scope::OverlaysFirst => {
            let mut roots = find_overlay_roots(&page.root());
            roots.push(page.root());
            roots
        }
        Scope::OverlaysOnly => find_overlay_roots(&page.root()),
        Scope::Modal(name) => {
            let name = normalize(name);
            find_overlay_roots(&page.root())
                .into_iter()
                .filter(|overlay| normalized_label(overlay).contains(&name))
                .collect()
        }
    }
}

/// Every match for `query`, in root order, without duplicates.
pub fn run_query(page: &Page, query: &DiscoveryQuery) -> Vec<Element> {
    let mut found: Vec<Element> = Vec::new();
    for root in resolve_roots(page, &query.scope) {
        let matches = match query.mode {
            MatchMode::Clickable if query.include_disabled => {
                find_all_controls_by_text(&query.predicate, &root)
            }
            MatchMode::Clickable => find_all_by_text(&query.predicate, &root),
            MatchMode::Deep => deep_match(&query.predicate, &root, query.include_disabled)
                .into_iter()
                .collect(),
        };
        for el in matches {
            if !found.contains(&el) {
                found.push(el);
            }
        }
    }
    found
}

/// First match for `query`; roots are tried in order and the first root
/// with any match wins.
pub fn find_first(page: &Page, query: &DiscoveryQuery) -> Option<Element> {
    resolve_roots(page, &query.scope)
        .into_iter()
        .find_map(|root| match query.mode {
            MatchMode::Clickable if query.include_disabled => {
                find_all_controls_by_text(&query.predicate, &root)
                    .into_iter()
                    .next()
            }
            MatchMode::Clickable => find_by_text(&query.predicate, &root),
            MatchMode::Deep => deep_match(&query.predicate, &root, query.include_disabled),
        })
}
