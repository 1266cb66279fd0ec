//! Ordered discovery strategies for reaching a sub-action behind a menu
//! trigger.
//!
//! Order: structural attribute, scoped text, deep text, then keyboard
//! navigation as the only strategy with side effects.

use crate::actions::press_key;
use crate::discovery::{
    find_by_text, find_by_text_deep, find_overlay_roots, nearest_interactable, popup_of,
    MAX_ANCESTOR_HOPS,
};
use crate::element::Element;
use crate::errors::AutomationError;
use crate::oracle::is_visible;
use crate::selector::TextPredicate;
use crate::wait::wait_for;
use crate::Page;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Result of a successful discovery.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The node to activate
    Node(Element),
    /// The sub-flow is already showing; nothing to activate
    AlreadyOpen,
}

pub type OpenCheck = Arc<dyn Fn(&Page) -> bool + Send + Sync>;

/// What is being looked for.
#[derive(Clone)]
pub struct DiscoveryTarget {
    pub predicate: TextPredicate,
    /// `(attribute, value)` pairs, compared case-insensitively
    pub attributes: Vec<(String, String)>,
    /// Detects that the sub-flow the target leads to is already open
    pub open_check: Option<OpenCheck>,
}

impl fmt::Debug for DiscoveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryTarget")
            .field("predicate", &self.predicate)
            .field("attributes", &self.attributes)
            .field("open_check", &self.open_check.is_some())
            .finish()
    }
}

impl DiscoveryTarget {
    pub fn new(predicate: impl Into<TextPredicate>) -> Self {
        Self {
            predicate: predicate.into(),
            attributes: Vec::new(),
            open_check: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_open_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Page) -> bool + Send + Sync + 'static,
    {
        self.open_check = Some(Arc::new(check));
        self
    }

    pub fn is_open(&self, page: &Page) -> bool {
        self.open_check.as_ref().map(|check| check(page)).unwrap_or(false)
    }
}

pub struct StrategyContext<'a> {
    pub page: &'a Page,
    /// The menu trigger that was just clicked, if any
    pub trigger: Option<&'a Element>,
    pub target: &'a DiscoveryTarget,
    /// How long side-effecting strategies wait for the page to react
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
}

impl<'a> StrategyContext<'a> {
    pub fn new(page: &'a Page, target: &'a DiscoveryTarget) -> Self {
        Self {
            page,
            trigger: None,
            target,
            settle_timeout: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_trigger(mut self, trigger: &'a Element) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_timing(mut self, settle_timeout: Duration, poll_interval: Duration) -> Self {
        self.settle_timeout = settle_timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// The trigger's declared popup, then visible overlays, then the document.
    pub fn search_roots(&self) -> Vec<Element> {
        let mut roots = Vec::new();
        if let Some(popup) = self.trigger.and_then(|t| popup_of(self.page, t)) {
            roots.push(popup);
        }
        for overlay in find_overlay_roots(&self.page.root()) {
            if !roots.contains(&overlay) {
                roots.push(overlay);
            }
        }
        roots.push(self.page.root());
        roots
    }
}

#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fallbacks may change page state and run only after every passive
    /// strategy has come up empty.
    fn is_fallback(&self) -> bool {
        false
    }

    async fn resolve(&self, ctx: &StrategyContext<'_>) -> Result<Option<Resolution>, AutomationError>;
}

/// Stable data attributes (`data-action`, `data-testid`, ...).
pub struct StructuralStrategy;

#[async_trait]
impl DiscoveryStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    async fn resolve(&self, ctx: &StrategyContext<'_>) -> Result<Option<Resolution>, AutomationError> {
        if ctx.target.attributes.is_empty() {
            return Ok(None);
        }
        for root in ctx.search_roots() {
            let hit = root.descendants().into_iter().find(|el| {
                is_visible(el)
                    && ctx.target.attributes.iter().any(|(name, value)| {
                        el.attribute(name)
                            .map(|v| v.trim().eq_ignore_ascii_case(value))
                            .unwrap_or(false)
                    })
            });
            if let Some(el) = hit {
                let node = nearest_interactable(&el, &root, MAX_ANCESTOR_HOPS, false).unwrap_or(el);
                return Ok(Some(Resolution::Node(node)));
            }
        }
        Ok(None)
    }
}

/// Interactive nodes whose label matches, popup first.
pub struct ScopedTextStrategy;

fn scoped_text_lookup(ctx: &StrategyContext<'_>) -> Option<Element> {
    ctx.search_roots()
        .iter()
        .find_map(|root| find_by_text(&ctx.target.predicate, root))
}

#[async_trait]
impl DiscoveryStrategy for ScopedTextStrategy {
    fn name(&self) -> &'static str {
        "scoped_text"
    }

    async fn resolve(&self, ctx: &StrategyContext<'_>) -> Result<Option<Resolution>, AutomationError> {
        Ok(scoped_text_lookup(ctx).map(Resolution::Node))
    }
}

/// Any visible node whose label matches, climbing to an interactable ancestor.
pub struct DeepTextStrategy;

#[async_trait]
impl DiscoveryStrategy for DeepTextStrategy {
    fn name(&self) -> &'static str {
        "deep_text"
    }

    async fn resolve(&self, ctx: &StrategyContext<'_>) -> Result<Option<Resolution>, AutomationError> {
        Ok(ctx
            .search_roots()
            .iter()
            .find_map(|root| find_by_text_deep(&ctx.target.predicate, root))
            .map(Resolution::Node))
    }
}

/// Focus the trigger and walk its menu with ArrowDown, ArrowDown, Enter.
pub struct KeyboardStrategy;

#[async_trait]
impl DiscoveryStrategy for KeyboardStrategy {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn is_fallback(&self) -> bool {
        true
    }

    async fn resolve(&self, ctx: &StrategyContext<'_>) -> Result<Option<Resolution>, AutomationError> {
        let Some(trigger) = ctx.trigger else {
            return Ok(None);
        };
        trigger.focus()?;
        for key in ["ArrowDown", "ArrowDown", "Enter"] {
            // menus usually move focus into their items
            let target = ctx
                .page
                .engine()
                .active_element()
                .unwrap_or_else(|| trigger.clone());
            press_key(&target, key)?;
        }
        let found = wait_for(
            || {
                if ctx.target.is_open(ctx.page) {
                    return Some(Resolution::AlreadyOpen);
                }
                scoped_text_lookup(ctx).map(Resolution::Node)
            },
            ctx.settle_timeout,
            ctx.poll_interval,
        )
        .await;
        Ok(found)
    }
}

/// A strategy's successful answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub resolution: Resolution,
    pub strategy: &'static str,
}

/// The ordered list of strategies. Strategy errors are logged and skipped.
pub struct StrategyChain {
    strategies: Vec<Arc<dyn DiscoveryStrategy>>,
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(StructuralStrategy),
            Arc::new(ScopedTextStrategy),
            Arc::new(DeepTextStrategy),
            Arc::new(KeyboardStrategy),
        ])
    }
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn DiscoveryStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// One pass over the passive strategies. An already open sub-flow wins
    /// over any node.
    pub async fn resolve_passive(&self, ctx: &StrategyContext<'_>) -> Option<Resolved> {
        if ctx.target.is_open(ctx.page) {
            return Some(Resolved {
                resolution: Resolution::AlreadyOpen,
                strategy: "open_check",
            });
        }
        self.run(ctx, false).await
    }

    /// Side-effecting fallbacks, in order, until one resolves.
    pub async fn resolve_fallbacks(&self, ctx: &StrategyContext<'_>) -> Option<Resolved> {
        self.run(ctx, true).await
    }

    async fn run(&self, ctx: &StrategyContext<'_>, fallbacks: bool) -> Option<Resolved> {
        for strategy in self.strategies.iter().filter(|s| s.is_fallback() == fallbacks) {
            match strategy.resolve(ctx).await {
                Ok(Some(resolution)) => {
                    debug!(strategy = strategy.name(), ?resolution, "target resolved");
                    return Some(Resolved {
                        resolution,
                        strategy: strategy.name(),
                    });
                }
                Ok(None) => trace!(strategy = strategy.name(), "no match"),
                Err(e) => debug!(strategy = strategy.name(), error = %e, "strategy failed"),
            }
        }
        None
    }
}
