//! Heuristic UI automation for third-party web applications.
//!
//! The crate discovers interactive elements in an unlabeled, constantly
//! re-rendering page by visible text, role and visibility, drives multi-stage
//! workflows over them with bounded retries, and reports every transition as
//! a structured event.

use std::fmt;
use std::sync::Arc;

pub mod actions;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod element;
pub mod errors;
pub mod host;
pub mod locator;
pub mod logging;
pub mod notify;
pub mod observe;
pub mod oracle;
pub mod picker;
pub mod platforms;
pub mod retry;
pub mod runner;
pub mod selector;
pub mod strategy;
#[cfg(test)]
mod tests;
pub mod trigger;
pub mod wait;
pub mod workflow;

pub use config::{FlowVocabulary, Settings, SettingsClient, WorkflowTimings};
pub use element::{Element, ElementImpl};
pub use errors::AutomationError;
pub use host::{HostChannel, HostClient, HostError, JobListItem};
pub use locator::Locator;
pub use observe::{EventLevel, EventSink, LogEvent, Observer};
pub use platforms::PageEngine;
pub use retry::{MatchedBy, RetryPolicy, StageResult};
pub use runner::{ActionRunner, RunOutcome};
pub use selector::{DiscoveryQuery, Scope, TextPredicate};
pub use strategy::Resolution;
pub use trigger::WorkflowParams;
pub use workflow::{FlowReport, OpenSequenceFlow};

/// One live page context, backed by a [`PageEngine`].
#[derive(Clone)]
pub struct Page {
    engine: Arc<dyn PageEngine>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("url", &self.url()).finish()
    }
}

impl Page {
    pub fn new(engine: Arc<dyn PageEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn PageEngine> {
        &self.engine
    }

    pub fn root(&self) -> Element {
        self.engine.root()
    }

    pub fn url(&self) -> String {
        self.engine.current_url()
    }

    pub fn element_by_dom_id(&self, id: &str) -> Option<Element> {
        self.engine.element_by_dom_id(id)
    }

    /// Visible overlay containers, top-most first.
    pub fn overlays(&self) -> Vec<Element> {
        discovery::find_overlay_roots(&self.root())
    }

    /// Create a locator for text-matched elements on this page.
    pub fn locator(&self, query: impl Into<DiscoveryQuery>) -> Locator {
        Locator::new(self.clone(), query.into())
    }
}
