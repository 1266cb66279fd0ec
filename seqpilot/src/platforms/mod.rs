use crate::{AutomationError, Element};

pub mod memory;

/// The common trait every page backend must implement.
///
/// A backend owns the live render tree of one page context plus the small
/// amount of page-scoped state the runner consults (URL, session store).
#[async_trait::async_trait]
pub trait PageEngine: Send + Sync {
    /// Get the root node of the render tree
    fn root(&self) -> Element;

    /// Current page URL
    fn current_url(&self) -> String;

    /// Replace the current URL in history without reloading
    fn replace_url(&self, url: &str) -> Result<(), AutomationError>;

    /// Full page reload
    async fn reload(&self) -> Result<(), AutomationError>;

    /// Element that currently has keyboard focus
    fn active_element(&self) -> Option<Element>;

    fn session_get(&self, key: &str) -> Option<String>;

    fn session_set(&self, key: &str, value: &str) -> Result<(), AutomationError>;

    fn session_remove(&self, key: &str) -> Result<(), AutomationError>;

    /// Look up a node by its `id` attribute.
    ///
    /// The default walks the whole tree; backends with an index should override.
    fn element_by_dom_id(&self, id: &str) -> Option<Element> {
        self.root()
            .descendants()
            .into_iter()
            .find(|el| el.attribute("id").as_deref() == Some(id))
    }

    /// Enable downcasting to concrete engine types
    fn as_any(&self) -> &dyn std::any::Any;
}
