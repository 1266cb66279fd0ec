use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use tracing::instrument;

/// Rendered box of a node in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// The subset of computed style the visibility checks care about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

/// Low-level event types the action primitives synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    PointerDown,
    MouseDown,
    PointerUp,
    MouseUp,
    Click,
    KeyDown,
    KeyUp,
    Focus,
    Input,
    Change,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PointerDown => "pointerdown",
            EventKind::MouseDown => "mousedown",
            EventKind::PointerUp => "pointerup",
            EventKind::MouseUp => "mouseup",
            EventKind::Click => "click",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
            EventKind::Focus => "focus",
            EventKind::Input => "input",
            EventKind::Change => "change",
        }
    }

    /// Focus is the only synthesized event that does not bubble.
    pub fn bubbles(&self) -> bool {
        !matches!(self, EventKind::Focus)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticEvent {
    pub kind: EventKind,
    pub key: Option<String>,
}

impl SyntheticEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, key: None }
    }

    pub fn key(kind: EventKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
        }
    }
}

/// Interface for engine-specific node implementations
pub trait ElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    /// Lowercase tag name (e.g. "button", "div")
    fn tag(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn text_content(&self) -> String;
    fn style(&self) -> ComputedStyle;
    fn bounds(&self) -> Bounds;
    fn children(&self) -> Result<Vec<Element>, AutomationError>;
    fn parent(&self) -> Result<Option<Element>, AutomationError>;
    fn is_connected(&self) -> bool;
    fn dispatch(&self, event: &SyntheticEvent) -> Result<(), AutomationError>;
    fn focus(&self) -> Result<(), AutomationError>;
    fn value(&self) -> Option<String>;
    /// Assign the value through the underlying native setter, bypassing any
    /// framework-level property interception. Does not fire events.
    fn set_native_value(&self, value: &str) -> Result<(), AutomationError>;
    fn clone_box(&self) -> Box<dyn ElementImpl>;
}

/// Represents a node in the live render tree
pub struct Element {
    inner: Box<dyn ElementImpl>,
}

impl Element {
    /// Create a new element from an engine-specific implementation
    pub fn new(impl_: Box<dyn ElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attribute(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attribute(name).is_some()
    }

    /// Explicit ARIA role, lowercased
    pub fn role(&self) -> Option<String> {
        self.inner
            .attribute("role")
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
    }

    /// True when the attribute is present and equals `"true"` (case-insensitive).
    pub fn attribute_is_true(&self, name: &str) -> bool {
        self.inner
            .attribute(name)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn text_content(&self) -> String {
        self.inner.text_content()
    }

    pub fn style(&self) -> ComputedStyle {
        self.inner.style()
    }

    pub fn bounds(&self) -> Bounds {
        self.inner.bounds()
    }

    pub fn children(&self) -> Result<Vec<Element>, AutomationError> {
        self.inner.children()
    }

    pub fn parent(&self) -> Result<Option<Element>, AutomationError> {
        self.inner.parent()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    #[instrument(level = "trace", skip(self))]
    pub fn dispatch(&self, event: &SyntheticEvent) -> Result<(), AutomationError> {
        self.inner.dispatch(event)
    }

    pub fn focus(&self) -> Result<(), AutomationError> {
        self.inner.focus()
    }

    pub fn value(&self) -> Option<String> {
        self.inner.value()
    }

    pub fn set_native_value(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.set_native_value(value)
    }

    /// All descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        let mut stack: Vec<Element> = match self.children() {
            Ok(children) => children.into_iter().rev().collect(),
            Err(_) => return out,
        };
        while let Some(node) = stack.pop() {
            if let Ok(children) = node.children() {
                stack.extend(children.into_iter().rev());
            }
            out.push(node);
        }
        out
    }

    /// Up to `max_hops` ancestors, nearest first.
    pub fn ancestors(&self, max_hops: usize) -> Vec<Element> {
        let mut out = Vec::new();
        let mut current = self.parent().ok().flatten();
        while let Some(node) = current {
            if out.len() >= max_hops {
                break;
            }
            current = node.parent().ok().flatten();
            out.push(node);
        }
        out
    }

    /// Whether `other` is `self` or lives somewhere beneath it.
    pub fn contains(&self, other: &Element) -> bool {
        if self == other {
            return true;
        }
        let mut current = other.parent().ok().flatten();
        while let Some(node) = current {
            if &node == self {
                return true;
            }
            current = node.parent().ok().flatten();
        }
        false
    }
}

impl Clone for Element {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("Element");
        debug_struct.field("tag", &self.tag());
        if let Some(id) = self.attribute("id") {
            debug_struct.field("id", &id);
        }
        if let Some(role) = self.role() {
            debug_struct.field("role", &role);
        }
        let text: String = self.text_content().chars().take(40).collect();
        if !text.is_empty() {
            debug_struct.field("text", &text);
        }
        debug_struct.finish()
    }
}
