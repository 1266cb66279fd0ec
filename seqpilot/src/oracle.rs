//! Visibility and text oracle.
//!
//! Every text comparison in the crate goes through [`normalize`] so that case
//! and whitespace differences never cause a false negative.

use crate::element::Element;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and collapse whitespace. Idempotent.
pub fn normalize(text: &str) -> String {
    collapse_whitespace(&text.to_lowercase())
}

/// Text content, accessible label and title, concatenated and collapsed.
pub fn effective_label(element: &Element) -> String {
    let mut parts = vec![element.text_content()];
    if let Some(label) = element.attribute("aria-label") {
        parts.push(label);
    }
    if let Some(title) = element.attribute("title") {
        parts.push(title);
    }
    collapse_whitespace(&parts.join(" "))
}

/// Normalized [`effective_label`], the form used for matching.
pub fn normalized_label(element: &Element) -> String {
    normalize(&effective_label(element))
}

/// Positive rendered area and not hidden via display, visibility or opacity.
pub fn is_visible(element: &Element) -> bool {
    if !element.is_connected() || !element.bounds().has_area() {
        return false;
    }
    let style = element.style();
    style.display != "none"
        && style.visibility != "hidden"
        && style.visibility != "collapse"
        && style.opacity > 0.0
}

/// `disabled` attribute present or `aria-disabled="true"`.
pub fn is_disabled(element: &Element) -> bool {
    element.has_attribute("disabled") || element.attribute_is_true("aria-disabled")
}

pub fn is_interactable(element: &Element) -> bool {
    is_visible(element) && !is_disabled(element)
}
