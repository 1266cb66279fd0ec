//! Failure snapshots.
//!
//! Captured once per exhausted stage and attached to the stage's failure
//! event, so a broken run can be debugged from the log alone.

use crate::discovery::{find_clickable, find_overlay_roots, find_search_inputs};
use crate::element::Element;
use crate::oracle::{effective_label, is_disabled};
use crate::Page;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_LABEL_CHARS: usize = 80;
const MAX_MENU_TRIGGERS: usize = 10;
const MAX_OVERLAYS: usize = 5;
const MAX_OVERLAY_ITEMS: usize = 15;
const MAX_CANDIDATES: usize = 25;

/// Minimal description of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSummary {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub label: String,
    pub disabled: bool,
}

impl ElementSummary {
    pub fn of(element: &Element) -> Self {
        let label: String = effective_label(element).chars().take(MAX_LABEL_CHARS).collect();
        Self {
            tag: element.tag(),
            role: element.role(),
            id: element.attribute("id"),
            label,
            disabled: is_disabled(element),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySample {
    pub root: ElementSummary,
    pub items: Vec<ElementSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    pub url: String,
    /// Controls that advertise a popup (`aria-haspopup` / `aria-expanded`)
    pub menu_triggers: Vec<ElementSummary>,
    pub overlays: Vec<OverlaySample>,
    /// Visible clickable nodes in the document, capped
    pub candidates: Vec<ElementSummary>,
    pub search_inputs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_element: Option<ElementSummary>,
    pub captured_at: DateTime<Utc>,
}

impl DiagnosticSnapshot {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn is_menu_trigger(element: &Element) -> bool {
    element.has_attribute("aria-haspopup") || element.has_attribute("aria-expanded")
}

/// Sample the page as it is right now.
pub fn capture_diagnostics(page: &Page) -> DiagnosticSnapshot {
    let root = page.root();
    let clickable = find_clickable(&root);

    let menu_triggers = clickable
        .iter()
        .filter(|el| is_menu_trigger(el))
        .take(MAX_MENU_TRIGGERS)
        .map(ElementSummary::of)
        .collect();

    let overlays = find_overlay_roots(&root)
        .into_iter()
        .take(MAX_OVERLAYS)
        .map(|overlay| OverlaySample {
            root: ElementSummary::of(&overlay),
            items: find_clickable(&overlay)
                .iter()
                .take(MAX_OVERLAY_ITEMS)
                .map(ElementSummary::of)
                .collect(),
        })
        .collect();

    DiagnosticSnapshot {
        url: page.url(),
        menu_triggers,
        overlays,
        candidates: clickable
            .iter()
            .take(MAX_CANDIDATES)
            .map(ElementSummary::of)
            .collect(),
        search_inputs: find_search_inputs(&root).len(),
        active_element: page.engine().active_element().as_ref().map(ElementSummary::of),
        captured_at: Utc::now(),
    }
}
