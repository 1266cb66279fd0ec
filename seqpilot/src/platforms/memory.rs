//! In-memory render tree backend.
//!
//! `MemoryPage` keeps a mutable DOM-like arena behind a mutex and lets callers
//! register reactive handlers per node and event kind. Handlers receive the
//! tree mutably, so a fixture can model menus opening, modals mounting or
//! buttons enabling in response to synthesized input, which is exactly what
//! the discovery and workflow layers have to cope with on a live page.

use crate::element::{Bounds, ComputedStyle, Element, ElementImpl, EventKind, SyntheticEvent};
use crate::errors::AutomationError;
use crate::platforms::PageEngine;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, trace};

const DEFAULT_WIDTH: f64 = 120.0;
const DEFAULT_HEIGHT: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Reactive callback run when an event reaches a node (directly or by bubbling).
pub type Handler = Arc<dyn Fn(&mut Dom, &SyntheticEvent) + Send + Sync>;

/// Declarative description of a subtree to mount.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<NodeSpec>,
    display: String,
    visibility: Option<String>,
    opacity: f64,
    size: (f64, f64),
    value: Option<String>,
}

impl NodeSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
            display: "block".to_string(),
            visibility: None,
            opacity: 1.0,
            size: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            value: None,
        }
    }

    pub fn button(label: &str) -> Self {
        Self::new("button").text(label)
    }

    pub fn option(value: &str, label: &str) -> Self {
        Self::new("option").attr("value", value).text(label)
    }

    /// Native `<select>` with `(value, label)` options and an empty placeholder.
    pub fn select(options: &[(&str, &str)]) -> Self {
        let mut spec = Self::new("select")
            .value("")
            .child(Self::option("", "Choose..."));
        for (value, label) in options {
            spec = spec.child(Self::option(value, label));
        }
        spec
    }

    pub fn input(kind: &str) -> Self {
        Self::new("input").attr("type", kind).value("")
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn role(self, role: &str) -> Self {
        self.attr("role", role)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn disabled(self) -> Self {
        self.attr("disabled", "")
    }

    /// `display: none`
    pub fn hidden(mut self) -> Self {
        self.display = "none".to_string();
        self
    }

    /// `visibility: hidden`
    pub fn invisible(mut self) -> Self {
        self.visibility = Some("hidden".to_string());
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.size = (width, height);
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    display: String,
    visibility: Option<String>,
    opacity: f64,
    size: (f64, f64),
    value: Option<String>,
    connected: bool,
}

/// A synthesized event as observed by the page.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub target: NodeId,
    pub kind: EventKind,
    pub key: Option<String>,
}

/// The mutable tree plus page-scoped state.
pub struct Dom {
    nodes: Vec<NodeData>,
    handlers: HashMap<(NodeId, EventKind), Vec<Handler>>,
    url: String,
    url_replacements: u32,
    session: HashMap<String, String>,
    active: Option<NodeId>,
    reloads: u32,
    events: Vec<RecordedEvent>,
}

impl fmt::Debug for Dom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dom")
            .field("url", &self.url)
            .field("nodes", &self.nodes.len())
            .field("handlers", &self.handlers.len())
            .field("reloads", &self.reloads)
            .finish()
    }
}

impl Dom {
    fn new(url: &str) -> Self {
        let body = NodeData {
            tag: "body".to_string(),
            attributes: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            display: "block".to_string(),
            visibility: None,
            opacity: 1.0,
            size: (1280.0, 800.0),
            value: None,
            connected: true,
        };
        Self {
            nodes: vec![body],
            handlers: HashMap::new(),
            url: url.to_string(),
            url_replacements: 0,
            session: HashMap::new(),
            active: None,
            reloads: 0,
            events: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Mount `spec` as the last child of `parent`, returning the new node.
    pub fn append(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        let connected = self.node(parent).map(|n| n.connected).unwrap_or(false);
        self.nodes.push(NodeData {
            tag: spec.tag,
            attributes: spec.attributes,
            text: spec.text,
            children: Vec::new(),
            parent: Some(parent),
            display: spec.display,
            visibility: spec.visibility,
            opacity: spec.opacity,
            size: spec.size,
            value: spec.value,
            connected,
        });
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            parent_node.children.push(id);
        }
        for child in spec.children {
            self.append(id, child);
        }
        id
    }

    /// Detach `node` and its subtree from the tree.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.node(node).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(parent.0) {
                parent_node.children.retain(|c| *c != node);
            }
        }
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(data) = self.nodes.get_mut(current.0) {
                data.connected = false;
                stack.extend(data.children.iter().copied());
            }
        }
        if self.active.map(|a| !self.is_connected(a)).unwrap_or(false) {
            self.active = None;
        }
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.node(node).map(|n| n.tag.clone())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node).and_then(|n| n.attributes.get(name).cloned())
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.attributes.remove(name);
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.text = text.to_string();
        }
    }

    pub fn hide(&mut self, node: NodeId) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.display = "none".to_string();
        }
    }

    pub fn show(&mut self, node: NodeId) {
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.display = "block".to_string();
        }
    }

    pub fn value(&self, node: NodeId) -> Option<String> {
        self.node(node).and_then(|n| n.value.clone())
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) {
        let is_select = self.tag(node).as_deref() == Some("select");
        if let Some(data) = self.nodes.get_mut(node.0) {
            data.value = Some(value.to_string());
        }
        if is_select {
            for option in self.descendants(node) {
                if self.tag(option).as_deref() != Some("option") {
                    continue;
                }
                if self.attr(option, "value").as_deref() == Some(value) {
                    self.set_attr(option, "selected", "");
                } else {
                    self.remove_attr(option, "selected");
                }
            }
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    /// Descendants in document order
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }
        out
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.node(node).map(|n| n.connected).unwrap_or(false)
    }

    /// Connected and no `display: none` on the node or any ancestor.
    pub fn is_rendered(&self, node: NodeId) -> bool {
        if !self.is_connected(node) {
            return false;
        }
        let mut current = Some(node);
        while let Some(id) = current {
            match self.node(id) {
                Some(data) if data.display == "none" => return false,
                Some(data) => current = data.parent,
                None => return false,
            }
        }
        true
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        if let Some(data) = self.node(node) {
            if !data.text.is_empty() {
                parts.push(data.text.clone());
            }
        }
        for id in self.descendants(node) {
            if let Some(data) = self.node(id) {
                if !data.text.is_empty() {
                    parts.push(data.text.clone());
                }
            }
        }
        parts.join(" ")
    }

    /// First node with `id` attribute equal to `dom_id`
    pub fn find_by_dom_id(&self, dom_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|id| self.attr(*id, "id").as_deref() == Some(dom_id))
    }

    /// First connected node whose own text equals `text` after trimming.
    pub fn find_by_text(&self, text: &str) -> Option<NodeId> {
        self.descendants(self.root()).into_iter().find(|id| {
            self.node(*id)
                .map(|n| n.text.trim() == text.trim())
                .unwrap_or(false)
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Navigate within the single-page app (pushes a new URL).
    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn url_replacements(&self) -> u32 {
        self.url_replacements
    }

    pub fn reloads(&self) -> u32 {
        self.reloads
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn event_count(&self, node: NodeId, kind: EventKind) -> usize {
        self.events
            .iter()
            .filter(|e| e.target == node && e.kind == kind)
            .count()
    }

    /// Register a reactive handler for `kind` events reaching `node`.
    pub fn on<F>(&mut self, node: NodeId, kind: EventKind, handler: F)
    where
        F: Fn(&mut Dom, &SyntheticEvent) + Send + Sync + 'static,
    {
        self.handlers
            .entry((node, kind))
            .or_default()
            .push(Arc::new(handler));
    }

    fn is_disabled_control(&self, node: NodeId) -> bool {
        match self.node(node) {
            Some(data) => {
                matches!(
                    data.tag.as_str(),
                    "button" | "input" | "select" | "textarea" | "option"
                ) && data.attributes.contains_key("disabled")
            }
            None => false,
        }
    }

    fn dispatch(&mut self, target: NodeId, event: &SyntheticEvent) -> Result<(), AutomationError> {
        if !self.is_connected(target) {
            return Err(AutomationError::ElementDetached(format!(
                "node {} received {}",
                target.0,
                event.kind.as_str()
            )));
        }
        self.events.push(RecordedEvent {
            target,
            kind: event.kind,
            key: event.key.clone(),
        });
        // Browsers never deliver click to disabled form controls.
        if event.kind == EventKind::Click && self.is_disabled_control(target) {
            trace!(node = target.0, "click suppressed on disabled control");
            return Ok(());
        }

        let mut path = vec![target];
        if event.kind.bubbles() {
            let mut current = self.parent(target);
            while let Some(id) = current {
                path.push(id);
                current = self.parent(id);
            }
        }
        let handlers: Vec<Handler> = path
            .iter()
            .flat_map(|id| {
                self.handlers
                    .get(&(*id, event.kind))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();
        for handler in handlers {
            handler(self, event);
        }
        Ok(())
    }
}

fn lock(dom: &Mutex<Dom>) -> MutexGuard<'_, Dom> {
    dom.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one node of a [`MemoryPage`]
#[derive(Clone)]
pub struct MemoryElement {
    dom: Arc<Mutex<Dom>>,
    id: NodeId,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement").field("id", &self.id).finish()
    }
}

impl ElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        (Arc::as_ptr(&self.dom) as usize)
            .wrapping_mul(31)
            .wrapping_add(self.id.0)
    }

    fn tag(&self) -> String {
        lock(&self.dom).tag(self.id).unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        lock(&self.dom).attr(self.id, name)
    }

    fn text_content(&self) -> String {
        lock(&self.dom).text_content(self.id)
    }

    fn style(&self) -> ComputedStyle {
        let dom = lock(&self.dom);
        let Some(own) = dom.node(self.id) else {
            return ComputedStyle::default();
        };
        let mut visibility = None;
        let mut opacity = 1.0;
        let mut current = Some(self.id);
        while let Some(id) = current {
            let Some(data) = dom.node(id) else { break };
            if visibility.is_none() {
                visibility = data.visibility.clone();
            }
            opacity *= data.opacity;
            current = data.parent;
        }
        ComputedStyle {
            display: own.display.clone(),
            visibility: visibility.unwrap_or_else(|| "visible".to_string()),
            opacity,
        }
    }

    fn bounds(&self) -> Bounds {
        let dom = lock(&self.dom);
        if !dom.is_rendered(self.id) {
            return Bounds::default();
        }
        let (width, height) = dom.node(self.id).map(|n| n.size).unwrap_or_default();
        Bounds::new(0.0, self.id.0 as f64 * DEFAULT_HEIGHT, width, height)
    }

    fn children(&self) -> Result<Vec<Element>, AutomationError> {
        let ids = lock(&self.dom).children(self.id);
        Ok(ids
            .into_iter()
            .map(|id| wrap(&self.dom, id))
            .collect())
    }

    fn parent(&self) -> Result<Option<Element>, AutomationError> {
        let parent = lock(&self.dom).parent(self.id);
        Ok(parent.map(|id| wrap(&self.dom, id)))
    }

    fn is_connected(&self) -> bool {
        lock(&self.dom).is_connected(self.id)
    }

    fn dispatch(&self, event: &SyntheticEvent) -> Result<(), AutomationError> {
        lock(&self.dom).dispatch(self.id, event)
    }

    fn focus(&self) -> Result<(), AutomationError> {
        let mut dom = lock(&self.dom);
        if !dom.is_connected(self.id) {
            return Err(AutomationError::ElementDetached(format!(
                "cannot focus node {}",
                self.id.0
            )));
        }
        dom.active = Some(self.id);
        dom.dispatch(self.id, &SyntheticEvent::new(EventKind::Focus))
    }

    fn value(&self) -> Option<String> {
        lock(&self.dom).value(self.id)
    }

    fn set_native_value(&self, value: &str) -> Result<(), AutomationError> {
        let mut dom = lock(&self.dom);
        match dom.tag(self.id).as_deref() {
            Some("input") | Some("textarea") | Some("select") => {
                dom.set_value(self.id, value);
                Ok(())
            }
            Some(other) => Err(AutomationError::UnsupportedOperation(format!(
                "<{other}> has no value setter"
            ))),
            None => Err(AutomationError::ElementDetached(format!(
                "node {} no longer exists",
                self.id.0
            ))),
        }
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }
}

fn wrap(dom: &Arc<Mutex<Dom>>, id: NodeId) -> Element {
    Element::new(Box::new(MemoryElement {
        dom: dom.clone(),
        id,
    }))
}

/// In-memory page context
#[derive(Clone)]
pub struct MemoryPage {
    dom: Arc<Mutex<Dom>>,
}

impl fmt::Debug for MemoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MemoryPage").field(&*lock(&self.dom)).finish()
    }
}

impl MemoryPage {
    pub fn new(url: &str) -> Self {
        Self {
            dom: Arc::new(Mutex::new(Dom::new(url))),
        }
    }

    /// Run `f` with exclusive access to the tree.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut Dom) -> R) -> R {
        f(&mut lock(&self.dom))
    }

    /// Mount `spec` under the body.
    pub fn mount(&self, spec: NodeSpec) -> NodeId {
        self.with_dom(|dom| {
            let root = dom.root();
            dom.append(root, spec)
        })
    }

    pub fn element(&self, id: NodeId) -> Element {
        wrap(&self.dom, id)
    }

    pub fn downgrade(&self) -> WeakPage {
        WeakPage {
            dom: Arc::downgrade(&self.dom),
        }
    }
}

/// Non-owning handle used by handlers that schedule delayed renders.
#[derive(Clone)]
pub struct WeakPage {
    dom: Weak<Mutex<Dom>>,
}

impl WeakPage {
    /// Apply `f` to the tree after `delay`, modelling asynchronous rendering.
    /// Requires a running tokio runtime; dropped silently if the page is gone.
    pub fn defer<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce(&mut Dom) + Send + 'static,
    {
        let weak = self.dom.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available, deferred render dropped");
            return;
        };
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(dom) = weak.upgrade() {
                f(&mut lock(&dom));
            }
        });
    }
}

#[async_trait::async_trait]
impl PageEngine for MemoryPage {
    fn root(&self) -> Element {
        wrap(&self.dom, NodeId(0))
    }

    fn current_url(&self) -> String {
        lock(&self.dom).url.clone()
    }

    fn replace_url(&self, url: &str) -> Result<(), AutomationError> {
        let mut dom = lock(&self.dom);
        dom.url = url.to_string();
        dom.url_replacements += 1;
        Ok(())
    }

    async fn reload(&self) -> Result<(), AutomationError> {
        let mut dom = lock(&self.dom);
        dom.reloads += 1;
        debug!(reloads = dom.reloads, url = %dom.url, "page reload requested");
        Ok(())
    }

    fn active_element(&self) -> Option<Element> {
        let dom = lock(&self.dom);
        dom.active
            .filter(|id| dom.is_connected(*id))
            .map(|id| wrap(&self.dom, id))
    }

    fn session_get(&self, key: &str) -> Option<String> {
        lock(&self.dom).session.get(key).cloned()
    }

    fn session_set(&self, key: &str, value: &str) -> Result<(), AutomationError> {
        lock(&self.dom)
            .session
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn session_remove(&self, key: &str) -> Result<(), AutomationError> {
        lock(&self.dom).session.remove(key);
        Ok(())
    }

    fn element_by_dom_id(&self, id: &str) -> Option<Element> {
        let found = lock(&self.dom).find_by_dom_id(id);
        found.map(|node| wrap(&self.dom, node))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
