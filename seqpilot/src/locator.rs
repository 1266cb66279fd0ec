use tracing::{debug, instrument};

use crate::discovery::{find_first, run_query};
use crate::element::Element;
use crate::errors::AutomationError;
use crate::oracle::is_disabled;
use crate::selector::{DiscoveryQuery, Scope, TextPredicate};
use crate::wait::{wait_for, DEFAULT_POLL_INTERVAL};
use crate::Page;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// A high-level API for finding elements by visible text on a page.
///
/// The query is re-evaluated on every poll; nothing is cached between polls.
#[derive(Clone)]
pub struct Locator {
    page: Page,
    query: DiscoveryQuery,
    timeout: Duration, // Default timeout for this locator instance
    interval: Duration,
}

impl Locator {
    pub(crate) fn new(page: Page, query: DiscoveryQuery) -> Self {
        Self {
            page,
            query,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Restrict the search to `element`'s subtree
    pub fn within(mut self, element: Element) -> Self {
        self.query = self.query.within(element);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.query = self.query.scope(scope);
        self
    }

    /// Match any visible node and climb to its interactable ancestor
    pub fn deep(mut self) -> Self {
        self.query = self.query.deep();
        self
    }

    pub fn include_disabled(mut self) -> Self {
        self.query = self.query.include_disabled();
        self
    }

    pub fn predicate(&self) -> &TextPredicate {
        &self.query.predicate
    }

    /// Current matches, without waiting.
    pub fn all_now(&self) -> Vec<Element> {
        run_query(&self.page, &self.query)
    }

    /// Current first match, without waiting.
    pub fn first_now(&self) -> Option<Element> {
        find_first(&self.page, &self.query)
    }

    /// All matches once at least one exists, waiting up to `timeout`
    /// (or the locator's default).
    pub async fn all(&self, timeout: Option<Duration>) -> Result<Vec<Element>, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let found = wait_for(
            || {
                let all = self.all_now();
                (!all.is_empty()).then_some(all)
            },
            effective_timeout,
            self.interval,
        )
        .await;
        found.ok_or_else(|| self.timed_out(effective_timeout))
    }

    pub async fn first(&self, timeout: Option<Duration>) -> Result<Element, AutomationError> {
        self.wait(timeout).await
    }

    /// Wait for an element matching the locator to appear.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Element, AutomationError> {
        debug!("Waiting for element matching {}", self.query.predicate);
        let effective_timeout = timeout.unwrap_or(self.timeout);
        wait_for(|| self.first_now(), effective_timeout, self.interval)
            .await
            .ok_or_else(|| self.timed_out(effective_timeout))
    }

    /// Wait for a match that is not disabled. Disabled matches are waited
    /// on, not returned.
    pub async fn wait_enabled(&self, timeout: Option<Duration>) -> Result<Element, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        wait_for(
            || self.all_now().into_iter().find(|el| !is_disabled(el)),
            effective_timeout,
            self.interval,
        )
        .await
        .ok_or_else(|| self.timed_out(effective_timeout))
    }

    fn timed_out(&self, after: Duration) -> AutomationError {
        AutomationError::Timeout(format!(
            "Timed out after {after:?} waiting for element {}",
            self.query.predicate
        ))
    }
}
