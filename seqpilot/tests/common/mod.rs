#![allow(dead_code)]

use async_trait::async_trait;
use seqpilot::element::EventKind;
use seqpilot::host::{HostChannel, HostError, HostRequest};
use seqpilot::platforms::memory::{Dom, MemoryPage, NodeId, NodeSpec, WeakPage};
use seqpilot::{Page, WorkflowTimings};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CANDIDATE_URL: &str = "https://app.example.com/candidates/42";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("seqpilot=debug")
        .with_test_writer()
        .try_init();
}

/// Node ids of the candidate page chrome that tests inspect.
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub trigger: NodeId,
}

/// Short stage waits so failing runs stay cheap on the paused clock.
pub fn fast_timings() -> WorkflowTimings {
    WorkflowTimings::default()
        .with_stage_timeouts(Duration::from_secs(2), Duration::from_secs(2))
        .with_retries(3, Duration::from_millis(300))
}

/// Items the sequence dialog can offer, as `(value, label)`.
pub const SEQUENCES: &[(&str, &str)] = &[
    ("seq-1", "Outreach A"),
    ("seq-2", "Outreach B"),
    ("seq-3", "Nurture"),
];

/// How the sequence dialog lets the user choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chooser {
    /// A native select with every option present.
    NativeSelect,
    /// A native select whose options arrive a second after the dialog.
    LateOptions,
    /// A text combobox whose listbox renders in a portal as the user types.
    Combobox,
    /// A search box over a list. Results arrive 1.5s after each keystroke.
    SearchList,
}

#[derive(Debug, Clone, Copy)]
pub struct PageOptions {
    pub chooser: Chooser,
    /// Unset leaves the "Next" button dead.
    pub next_navigates: bool,
    /// "Next" renders disabled and enables after this long.
    pub next_enabled_after: Option<Duration>,
    /// Unset leaves the "Edit" toggle dead.
    pub edit_works: bool,
    /// A "More" menu button ahead of the real one that opens nothing.
    pub decoy_trigger: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            chooser: Chooser::NativeSelect,
            next_navigates: true,
            next_enabled_after: None,
            edit_works: true,
            decoy_trigger: false,
        }
    }
}

/// A candidate page that behaves like the target application: a "More
/// actions" menu, an "Add to sequence" dialog rendered late, a "Next" step
/// and an "Edit" toggle on the review stage. With `next_navigates` unset the
/// "Next" button is dead.
pub fn candidate_page(url: &str, next_navigates: bool) -> (MemoryPage, Page, Fixture) {
    candidate_page_with(
        url,
        PageOptions {
            next_navigates,
            ..PageOptions::default()
        },
    )
}

pub fn candidate_page_with(url: &str, options: PageOptions) -> (MemoryPage, Page, Fixture) {
    let memory = MemoryPage::new(url);
    let page = Page::new(Arc::new(memory.clone()));
    let weak = memory.downgrade();

    memory.mount(NodeSpec::new("h1").text("Jane Doe"));
    if options.decoy_trigger {
        memory.mount(NodeSpec::button("More").attr("aria-haspopup", "menu"));
    }
    let trigger = memory.mount(
        NodeSpec::button("")
            .attr("aria-label", "More actions")
            .attr("aria-haspopup", "menu")
            .attr("aria-controls", "cand-menu"),
    );

    memory.with_dom(|dom| {
        dom.on(trigger, EventKind::Click, move |dom, _| {
            let root = dom.root();
            let menu = dom.append(root, NodeSpec::new("div").id("cand-menu").role("menu"));
            let add_to_sequence = dom.append(
                menu,
                NodeSpec::new("div").role("menuitem").text("Add to sequence"),
            );
            dom.append(menu, NodeSpec::new("div").role("menuitem").text("Add to job"));

            let weak = weak.clone();
            dom.on(add_to_sequence, EventKind::Click, move |dom, _| {
                dom.remove(menu);
                let later = weak.clone();
                weak.defer(Duration::from_millis(300), move |dom| {
                    render_sequence_dialog(dom, later, options)
                });
            });
        });
    });

    (memory, page, Fixture { trigger })
}

fn render_sequence_dialog(dom: &mut Dom, weak: WeakPage, options: PageOptions) {
    let root = dom.root();
    let dialog = dom.append(
        root,
        NodeSpec::new("div").role("dialog").attr("aria-modal", "true"),
    );
    dom.append(dialog, NodeSpec::new("h2").text("Choose a sequence"));
    let chooser = dom.append(dialog, NodeSpec::new("div"));
    let add = dom.append(dialog, NodeSpec::button("Add").disabled());
    dom.append(dialog, NodeSpec::button("Cancel"));

    match options.chooser {
        Chooser::NativeSelect => {
            let select = dom.append(chooser, NodeSpec::select(SEQUENCES));
            dom.on(select, EventKind::Change, move |dom, _| {
                dom.remove_attr(add, "disabled")
            });
        }
        Chooser::LateOptions => {
            let select = dom.append(chooser, NodeSpec::select(&[]));
            dom.on(select, EventKind::Change, move |dom, _| {
                dom.remove_attr(add, "disabled")
            });
            weak.defer(Duration::from_secs(1), move |dom| {
                for (value, label) in SEQUENCES {
                    dom.append(select, NodeSpec::option(value, label));
                }
            });
        }
        Chooser::Combobox => render_combobox(dom, chooser, add),
        Chooser::SearchList => render_search_list(dom, weak.clone(), chooser, add),
    }

    dom.on(add, EventKind::Click, move |dom, _| {
        dom.remove(dialog);
        let root = dom.root();
        let spec = match options.next_enabled_after {
            Some(_) => NodeSpec::button("Next").disabled(),
            None => NodeSpec::button("Next"),
        };
        let next = dom.append(root, spec);
        if let Some(delay) = options.next_enabled_after {
            weak.defer(delay, move |dom| dom.remove_attr(next, "disabled"));
        }
        if options.next_navigates {
            let edit_works = options.edit_works;
            dom.on(next, EventKind::Click, move |dom, _| render_review_stage(dom, edit_works));
        }
    });
}

fn matching_sequences(query: &str) -> Vec<(&'static str, &'static str)> {
    let query = query.trim().to_lowercase();
    SEQUENCES
        .iter()
        .copied()
        .filter(|(_, label)| label.to_lowercase().contains(&query))
        .collect()
}

/// Typing into the combobox (re)renders a listbox portal at the document root.
fn render_combobox(dom: &mut Dom, container: NodeId, add: NodeId) {
    let combobox = dom.append(
        container,
        NodeSpec::input("text")
            .role("combobox")
            .attr("aria-autocomplete", "list")
            .attr("aria-controls", "seq-listbox"),
    );
    dom.on(combobox, EventKind::Input, move |dom, _| {
        if let Some(stale) = dom.find_by_dom_id("seq-listbox") {
            dom.remove(stale);
        }
        let query = dom.value(combobox).unwrap_or_default();
        let root = dom.root();
        let listbox = dom.append(
            root,
            NodeSpec::new("div")
                .id("seq-listbox")
                .role("listbox")
                .attr("data-portal", ""),
        );
        for (value, label) in matching_sequences(&query) {
            let row = dom.append(
                listbox,
                NodeSpec::new("div")
                    .role("option")
                    .attr("data-value", value)
                    .text(label),
            );
            dom.on(row, EventKind::Click, move |dom, _| {
                dom.set_value(combobox, label);
                dom.remove(listbox);
                dom.remove_attr(add, "disabled");
            });
        }
    });
}

/// A search box over a short list. Each keystroke re-renders the list with
/// the matching items 1.5s later.
fn render_search_list(dom: &mut Dom, weak: WeakPage, container: NodeId, add: NodeId) {
    let search = dom.append(
        container,
        NodeSpec::input("search")
            .id("seq-search")
            .attr("placeholder", "Search sequences"),
    );
    let list = dom.append(container, NodeSpec::new("ul"));
    for label in ["Nurture", "Onboarding check-in"] {
        dom.append(list, NodeSpec::new("li").text(label));
    }

    dom.on(search, EventKind::Input, move |dom, _| {
        let query = dom.value(search).unwrap_or_default();
        weak.defer(Duration::from_millis(1500), move |dom| {
            if !dom.is_connected(list) {
                return;
            }
            for row in dom.children(list) {
                dom.remove(row);
            }
            for (_, label) in matching_sequences(&query) {
                let row = dom.append(list, NodeSpec::new("li").text(label));
                dom.on(row, EventKind::Click, move |dom, _| {
                    dom.set_attr(row, "aria-selected", "true");
                    dom.remove_attr(add, "disabled");
                });
            }
        });
    });
}

fn render_review_stage(dom: &mut Dom, edit_works: bool) {
    let review_url = format!("{}/review", CANDIDATE_URL);
    dom.set_url(&review_url);
    let root = dom.root();
    let stage = dom.append(root, NodeSpec::new("section"));
    dom.append(stage, NodeSpec::new("h2").text("Review emails"));
    let marker = dom.append(stage, NodeSpec::new("div").text("Preview mode"));
    let edit = dom.append(stage, NodeSpec::button("Edit").attr("aria-pressed", "false"));
    if !edit_works {
        return;
    }
    dom.on(edit, EventKind::Click, move |dom, _| {
        dom.set_text(marker, "Editing for Jane Doe");
        dom.set_attr(edit, "aria-pressed", "true");
    });
}

/// Scripted host: answers from fixed values and records every request.
pub struct FakeHost {
    pub settings: Mutex<Result<Value, HostError>>,
    pub action_response: Mutex<Result<Value, HostError>>,
    pub items: Mutex<Value>,
    pub list_error: Mutex<Option<HostError>>,
    requests: Mutex<Vec<HostRequest>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            settings: Mutex::new(Ok(json!({}))),
            action_response: Mutex::new(Ok(json!({
                "ok": true,
                "message": "Done",
                "link": "https://crm.example.com/runs/1",
                "runId": "host-1",
            }))),
            items: Mutex::new(json!([])),
            list_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_settings(&self, settings: Result<Value, HostError>) {
        *self.settings.lock().unwrap() = settings;
    }

    pub fn set_action_response(&self, response: Result<Value, HostError>) {
        *self.action_response.lock().unwrap() = response;
    }

    pub fn set_items(&self, items: Value) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_list_error(&self, error: HostError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    pub fn requests(&self) -> Vec<HostRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.requests().iter().filter(|r| r.kind() == kind).count()
    }

    pub fn run_actions(&self) -> Vec<(String, Value, Value)> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                HostRequest::RunAction {
                    action_id,
                    context,
                    meta,
                } => Some((action_id, context, meta)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl HostChannel for FakeHost {
    async fn request(&self, request: HostRequest) -> Result<Value, HostError> {
        self.requests.lock().unwrap().push(request.clone());
        match request {
            HostRequest::GetSettings => self
                .settings
                .lock()
                .unwrap()
                .clone()
                .map(|settings| json!({ "ok": true, "settings": settings })),
            HostRequest::SaveSettings { .. } => Ok(json!({ "ok": true })),
            HostRequest::RunAction { .. } => self.action_response.lock().unwrap().clone(),
            HostRequest::ListItems { .. } => match self.list_error.lock().unwrap().clone() {
                Some(error) => Err(error),
                None => Ok(json!({ "ok": true, "items": self.items.lock().unwrap().clone() })),
            },
            HostRequest::LogEvent { .. } => Ok(json!({ "ok": true })),
        }
    }

    async fn notify(&self, request: HostRequest) -> Result<(), HostError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}
