//! Interactive picker: choose one item from a remotely fetched list.
//!
//! [`Picker`] is the pure state machine. [`spawn_picker`] drives one on a
//! task, fetching the list while input is already being accepted, and
//! resolves exactly one outcome.

use crate::errors::AutomationError;
use crate::host::{HostClient, JobListItem};
use crate::oracle::normalize;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument};

/// Rows rendered at most, whatever the number of matches.
pub const RENDER_CAP: usize = 100;
pub const DEFAULT_FETCH_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerKey {
    Up,
    Down,
    Enter,
    Escape,
    /// `0`-`9`; `1` is the first row, `0` the tenth
    Digit(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerInput {
    Key(PickerKey),
    /// The search box's full new text
    Query(String),
    /// Click on a visible row
    ClickRow(usize),
    ConfirmAccept,
    ConfirmReject,
    ClickOutside,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    Done(Option<JobListItem>),
}

/// Render state, published after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PickerView {
    pub query: String,
    pub rows: Vec<JobListItem>,
    pub selected: Option<usize>,
    pub confirmation: Option<JobListItem>,
    pub loading: bool,
    pub error: Option<String>,
    pub total_matches: usize,
}

#[derive(Debug, Clone)]
pub struct Picker {
    query: String,
    all_items: Vec<JobListItem>,
    filtered: Vec<JobListItem>,
    selected_id: Option<String>,
    confirmation: Option<JobListItem>,
    loading: bool,
    error: Option<String>,
    terminated: bool,
}

impl Default for Picker {
    fn default() -> Self {
        Self::new()
    }
}

impl Picker {
    /// A picker waiting for its list.
    pub fn new() -> Self {
        Self {
            query: String::new(),
            all_items: Vec::new(),
            filtered: Vec::new(),
            selected_id: None,
            confirmation: None,
            loading: true,
            error: None,
            terminated: false,
        }
    }

    pub fn with_items(items: Vec<JobListItem>) -> Self {
        let mut picker = Self::new();
        picker.load(items);
        picker
    }

    pub fn load(&mut self, items: Vec<JobListItem>) {
        self.all_items = items;
        self.loading = false;
        self.error = None;
        self.refilter();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn confirmation(&self) -> Option<&JobListItem> {
        self.confirmation.as_ref()
    }

    /// Rendered rows, capped at [`RENDER_CAP`].
    pub fn visible(&self) -> &[JobListItem] {
        &self.filtered[..self.filtered.len().min(RENDER_CAP)]
    }

    pub fn selected_index(&self) -> Option<usize> {
        let id = self.selected_id.as_deref()?;
        self.visible().iter().position(|item| item.id == id)
    }

    pub fn selected(&self) -> Option<&JobListItem> {
        self.selected_index().map(|i| &self.visible()[i])
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.refilter();
    }

    fn refilter(&mut self) {
        let needle = normalize(&self.query);
        self.filtered = self
            .all_items
            .iter()
            .filter(|item| needle.is_empty() || normalize(&item.name).contains(&needle))
            .cloned()
            .collect();
        // keep the selection on the same item when it survived the filter
        if self.selected_index().is_none() {
            self.selected_id = self.visible().first().map(|item| item.id.clone());
        }
    }

    fn select_index(&mut self, index: usize) -> bool {
        match self.visible().get(index) {
            Some(item) => {
                self.selected_id = Some(item.id.clone());
                true
            }
            None => false,
        }
    }

    fn move_selection(&mut self, forward: bool) {
        let len = self.visible().len();
        if len == 0 {
            return;
        }
        let next = match self.selected_index() {
            None => 0,
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
        };
        self.select_index(next);
    }

    fn open_confirmation(&mut self) {
        self.confirmation = self.selected().cloned();
    }

    fn finish(&mut self, outcome: Option<JobListItem>) -> Step {
        self.terminated = true;
        self.confirmation = None;
        Step::Done(outcome)
    }

    /// Apply one input. Input after the terminal outcome is an error.
    pub fn handle(&mut self, input: PickerInput) -> Result<Step, AutomationError> {
        if self.terminated {
            return Err(AutomationError::InvalidArgument(
                "picker already closed".to_string(),
            ));
        }
        let confirming = self.confirmation.is_some();
        let step = match input {
            PickerInput::Key(PickerKey::Enter) | PickerInput::ConfirmAccept if confirming => {
                let item = self.confirmation.take();
                self.finish(item)
            }
            PickerInput::Key(PickerKey::Escape)
            | PickerInput::ConfirmReject
            | PickerInput::ClickOutside
                if confirming =>
            {
                self.confirmation = None;
                Step::Continue
            }
            // the confirmation step swallows everything else
            _ if confirming => Step::Continue,
            PickerInput::Key(PickerKey::Escape) | PickerInput::ClickOutside => self.finish(None),
            PickerInput::Key(PickerKey::Enter) => {
                self.open_confirmation();
                Step::Continue
            }
            PickerInput::Key(PickerKey::Down) => {
                self.move_selection(true);
                Step::Continue
            }
            PickerInput::Key(PickerKey::Up) => {
                self.move_selection(false);
                Step::Continue
            }
            PickerInput::Key(PickerKey::Digit(digit)) => {
                let index = match digit {
                    0 => 9,
                    d @ 1..=9 => usize::from(d) - 1,
                    _ => return Ok(Step::Continue),
                };
                if self.select_index(index) {
                    self.open_confirmation();
                }
                Step::Continue
            }
            PickerInput::ClickRow(index) => {
                if self.select_index(index) {
                    self.open_confirmation();
                }
                Step::Continue
            }
            PickerInput::Query(query) => {
                self.set_query(&query);
                Step::Continue
            }
            PickerInput::ConfirmAccept | PickerInput::ConfirmReject => Step::Continue,
        };
        Ok(step)
    }

    pub fn view(&self) -> PickerView {
        PickerView {
            query: self.query.clone(),
            rows: self.visible().to_vec(),
            selected: self.selected_index(),
            confirmation: self.confirmation.clone(),
            loading: self.loading,
            error: self.error.clone(),
            total_matches: self.filtered.len(),
        }
    }
}

/// Where the picker's list comes from.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn list_items(&self, query: &str, limit: u32) -> Result<Vec<JobListItem>, AutomationError>;
}

/// `LIST_ITEMS` through the host.
pub struct HostItemSource {
    client: HostClient,
    run_id: Option<String>,
}

impl HostItemSource {
    pub fn new(client: HostClient, run_id: Option<String>) -> Self {
        Self { client, run_id }
    }
}

#[async_trait]
impl ItemSource for HostItemSource {
    async fn list_items(&self, query: &str, limit: u32) -> Result<Vec<JobListItem>, AutomationError> {
        Ok(self
            .client
            .list_items(query, limit, self.run_id.clone())
            .await?)
    }
}

/// Caller side of a running picker.
pub struct PickerHandle {
    inputs: mpsc::Sender<PickerInput>,
    view: watch::Receiver<PickerView>,
    outcome: oneshot::Receiver<Option<JobListItem>>,
}

impl PickerHandle {
    pub async fn send(&self, input: PickerInput) -> Result<(), AutomationError> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| AutomationError::InvalidArgument("picker already closed".to_string()))
    }

    pub async fn key(&self, key: PickerKey) -> Result<(), AutomationError> {
        self.send(PickerInput::Key(key)).await
    }

    pub async fn type_query(&self, query: &str) -> Result<(), AutomationError> {
        self.send(PickerInput::Query(query.to_string())).await
    }

    pub fn view(&self) -> PickerView {
        self.view.borrow().clone()
    }

    /// Wait until the list has arrived (or failed to).
    pub async fn loaded(&mut self) -> PickerView {
        let loaded = self.view.wait_for(|v| !v.loading).await.map(|v| v.clone()).ok();
        loaded.unwrap_or_else(|| self.view())
    }

    /// The single terminal outcome. Resolves once an accepting or cancelling
    /// input has been processed.
    pub async fn outcome(self) -> Option<JobListItem> {
        let PickerHandle {
            inputs: _inputs,
            outcome,
            ..
        } = self;
        outcome.await.unwrap_or(None)
    }
}

/// Open a picker over `source` on a new task.
#[instrument(level = "debug", skip(source))]
pub fn spawn_picker(source: Arc<dyn ItemSource>, limit: u32) -> PickerHandle {
    let picker = Picker::new();
    let (input_tx, input_rx) = mpsc::channel(32);
    let (view_tx, view_rx) = watch::channel(picker.view());
    let (outcome_tx, outcome_rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = drive(picker, source, limit, input_rx, view_tx).await;
        debug!(chosen = ?outcome.as_ref().map(|i| &i.id), "picker closed");
        let _ = outcome_tx.send(outcome);
    });
    PickerHandle {
        inputs: input_tx,
        view: view_rx,
        outcome: outcome_rx,
    }
}

async fn drive(
    mut picker: Picker,
    source: Arc<dyn ItemSource>,
    limit: u32,
    mut inputs: mpsc::Receiver<PickerInput>,
    view: watch::Sender<PickerView>,
) -> Option<JobListItem> {
    let mut fetch = source.list_items("", limit);
    let mut fetched = false;
    loop {
        tokio::select! {
            result = &mut fetch, if !fetched => {
                fetched = true;
                match result {
                    Ok(items) => picker.load(items),
                    Err(e) => picker.fail(e.to_string()),
                }
            }
            input = inputs.recv() => {
                let Some(input) = input else {
                    return None;
                };
                match picker.handle(input) {
                    Ok(Step::Done(outcome)) => {
                        view.send_replace(picker.view());
                        return outcome;
                    }
                    Ok(Step::Continue) => {}
                    Err(e) => debug!(error = %e, "picker input rejected"),
                }
            }
        }
        view.send_replace(picker.view());
    }
}
