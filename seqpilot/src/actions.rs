//! Action primitives.
//!
//! Reactive frameworks ignore bare `click()` calls and direct property writes,
//! so every primitive here synthesizes the full event sequence a real user
//! would produce.

use crate::element::{Element, EventKind, SyntheticEvent};
use crate::errors::AutomationError;
use crate::oracle::collapse_whitespace;
use tracing::{debug, instrument};

/// Ancestors `activate` will also click, at most.
const MAX_ACTIVATE_ANCESTORS: usize = 3;
/// How far up `activate` looks for semantic containers.
const ACTIVATE_SEARCH_HOPS: usize = 6;

const SEMANTIC_CONTAINER_ROLES: &[&str] = &["menuitem", "listitem", "option", "button", "link"];
const SEMANTIC_CONTAINER_TAGS: &[&str] = &["li", "button", "a"];

/// What an action actually did, for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickResult {
    pub method: String,
    pub clicked: usize,
    pub details: String,
}

fn ensure_connected(element: &Element, action: &str) -> Result<(), AutomationError> {
    if element.is_connected() {
        Ok(())
    } else {
        Err(AutomationError::ElementDetached(format!(
            "cannot {action} {element:?}"
        )))
    }
}

/// pointerdown, mousedown, pointerup, mouseup, click.
#[instrument(level = "debug", skip(element))]
pub fn click(element: &Element) -> Result<(), AutomationError> {
    ensure_connected(element, "click")?;
    for kind in [
        EventKind::PointerDown,
        EventKind::MouseDown,
        EventKind::PointerUp,
        EventKind::MouseUp,
        EventKind::Click,
    ] {
        element.dispatch(&SyntheticEvent::new(kind))?;
    }
    Ok(())
}

fn is_semantic_container(element: &Element) -> bool {
    if let Some(role) = element.role() {
        if SEMANTIC_CONTAINER_ROLES.contains(&role.as_str()) {
            return true;
        }
    }
    SEMANTIC_CONTAINER_TAGS.contains(&element.tag().as_str())
}

/// Click the node, then up to three semantic ancestors, then focus it and
/// press Enter. Only the first click must succeed: handlers commonly tear the
/// menu down, detaching everything after it.
#[instrument(level = "debug", skip(element))]
pub fn activate(element: &Element) -> Result<ClickResult, AutomationError> {
    let ancestors: Vec<Element> = element
        .ancestors(ACTIVATE_SEARCH_HOPS)
        .into_iter()
        .filter(is_semantic_container)
        .take(MAX_ACTIVATE_ANCESTORS)
        .collect();

    click(element)?;
    let mut clicked = 1;
    for ancestor in &ancestors {
        match click(ancestor) {
            Ok(()) => clicked += 1,
            Err(e) => debug!(error = %e, "ancestor click skipped"),
        }
    }

    let mut details = format!("clicked {clicked} node(s)");
    match element.focus().and_then(|_| press_key(element, "Enter")) {
        Ok(()) => details.push_str(", enter sent"),
        Err(e) => {
            debug!(error = %e, "enter after activate skipped");
            details.push_str(", enter skipped");
        }
    }
    Ok(ClickResult {
        method: "activate".to_string(),
        clicked,
        details,
    })
}

/// Native value setter, then `input` and `change`.
#[instrument(level = "debug", skip(element))]
pub fn set_value(element: &Element, text: &str) -> Result<(), AutomationError> {
    ensure_connected(element, "set value on")?;
    element.set_native_value(text)?;
    element.dispatch(&SyntheticEvent::new(EventKind::Input))?;
    element.dispatch(&SyntheticEvent::new(EventKind::Change))
}

/// Focus then [`set_value`]. Focus failures are not fatal.
pub fn type_text(element: &Element, text: &str) -> Result<(), AutomationError> {
    if let Err(e) = element.focus() {
        debug!(error = %e, "focus before typing failed");
    }
    set_value(element, text)
}

/// keydown + keyup for `key` (e.g. "Enter", "ArrowDown", "Escape").
pub fn press_key(element: &Element, key: &str) -> Result<(), AutomationError> {
    ensure_connected(element, "send keys to")?;
    element.dispatch(&SyntheticEvent::key(EventKind::KeyDown, key))?;
    element.dispatch(&SyntheticEvent::key(EventKind::KeyUp, key))
}

/// Pick `option` on a native `<select>` the way a user would.
#[instrument(level = "debug", skip(select, option))]
pub fn select_native_option(select: &Element, option: &Element) -> Result<(), AutomationError> {
    if select.tag() != "select" {
        return Err(AutomationError::InvalidArgument(format!(
            "expected a <select>, got <{}>",
            select.tag()
        )));
    }
    let value = option
        .attribute("value")
        .unwrap_or_else(|| collapse_whitespace(&option.text_content()));
    set_value(select, &value)
}
