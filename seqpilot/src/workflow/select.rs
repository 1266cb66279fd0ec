//! Stage 4: choose the requested item inside the selection scope.
//!
//! Three mechanisms, tried in order: a native `<select>`, a combobox that
//! opens a list, and finally a scan-and-poll loop that keeps re-reading the
//! scope (native options included) while typing the search term into any
//! search box.

use super::{OpenSequenceFlow, Stage};
use crate::actions::{activate, click, select_native_option, type_text};
use crate::discovery::{
    find_listboxes, find_native_selects, find_search_inputs, is_clickable, native_options,
    popup_of,
};
use crate::element::Element;
use crate::errors::AutomationError;
use crate::oracle::{is_disabled, is_visible, normalize, normalized_label};
use crate::trigger::WorkflowParams;
use crate::wait::wait_for;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

const ID_ATTRIBUTES: &[&str] = &["value", "data-value", "data-id", "id"];
const ROW_ROLES: &[&str] = &["option", "listitem", "menuitem", "menuitemradio"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchRule {
    ExactName,
    NameSubstring,
    IdSubstring,
}

impl MatchRule {
    fn as_str(&self) -> &'static str {
        match self {
            MatchRule::ExactName => "exact_name",
            MatchRule::NameSubstring => "name_substring",
            MatchRule::IdSubstring => "id_substring",
        }
    }
}

/// Exact name, then name substring, then id substring; first candidate in
/// document order wins within a rule.
pub(crate) fn best_match(
    candidates: &[Element],
    name: Option<&str>,
    id: Option<&str>,
) -> Option<(Element, MatchRule)> {
    let labels: Vec<String> = candidates.iter().map(normalized_label).collect();
    if let Some(name) = name.map(normalize).filter(|n| !n.is_empty()) {
        if let Some(i) = labels.iter().position(|l| *l == name) {
            return Some((candidates[i].clone(), MatchRule::ExactName));
        }
        if let Some(i) = labels.iter().position(|l| l.contains(&name)) {
            return Some((candidates[i].clone(), MatchRule::NameSubstring));
        }
    }
    let id = id.map(|i| i.trim().to_lowercase()).filter(|i| !i.is_empty())?;
    candidates
        .iter()
        .find(|el| {
            ID_ATTRIBUTES.iter().any(|attr| {
                el.attribute(attr)
                    .map(|v| v.to_lowercase().contains(&id))
                    .unwrap_or(false)
            })
        })
        .map(|el| (el.clone(), MatchRule::IdSubstring))
}

fn is_row(element: &Element) -> bool {
    let role_match = element
        .role()
        .map(|r| ROW_ROLES.contains(&r.as_str()))
        .unwrap_or(false);
    (role_match || element.tag() == "li") && is_visible(element) && !is_disabled(element)
}

fn rows_in(container: &Element, out: &mut Vec<Element>) {
    for row in container.descendants().into_iter().filter(is_row) {
        if !out.contains(&row) {
            out.push(row);
        }
    }
}

fn is_combobox(element: &Element) -> bool {
    element.tag() != "select"
        && (element.role().as_deref() == Some("combobox")
            || element.attribute("aria-haspopup").as_deref() == Some("listbox"))
        && is_visible(element)
        && !is_disabled(element)
}

struct Selected {
    label: String,
    method: &'static str,
    rule: MatchRule,
}

impl OpenSequenceFlow {
    /// Selectable rows in the scope and in any listbox rendered elsewhere
    /// (portals), scope first.
    fn option_rows(&self, scope: &Element, popup: Option<&Element>) -> Vec<Element> {
        let mut rows = Vec::new();
        if let Some(popup) = popup {
            rows_in(popup, &mut rows);
        }
        rows_in(scope, &mut rows);
        for listbox in find_listboxes(&self.page.root()) {
            rows_in(&listbox, &mut rows);
        }
        rows
    }

    fn select_native(
        &self,
        scope: &Element,
        name: Option<&str>,
        id: Option<&str>,
    ) -> Result<Option<Selected>, AutomationError> {
        for select in find_native_selects(scope) {
            let options = native_options(&select);
            if let Some((option, rule)) = best_match(&options, name, id) {
                select_native_option(&select, &option)?;
                return Ok(Some(Selected {
                    label: normalized_label(&option),
                    method: "native",
                    rule,
                }));
            }
            debug!(options = options.len(), "native select has no matching option");
        }
        Ok(None)
    }

    async fn select_via_combobox(
        &self,
        scope: &Element,
        name: Option<&str>,
        id: Option<&str>,
        term: &str,
    ) -> Result<Option<Selected>, AutomationError> {
        let Some(combobox) = scope.descendants().into_iter().find(is_combobox) else {
            return Ok(None);
        };
        let typeable = combobox.tag() == "input";
        if typeable {
            type_text(&combobox, term)?;
        } else {
            click(&combobox)?;
        }

        let mut filtered = typeable;
        let found = wait_for(
            || {
                let popup = popup_of(&self.page, &combobox);
                let rows = self.option_rows(scope, popup.as_ref());
                if let Some(hit) = best_match(&rows, name, id) {
                    return Some(hit);
                }
                if !filtered {
                    filtered = true;
                    let search = popup
                        .as_ref()
                        .and_then(|p| find_search_inputs(p).into_iter().next())
                        .or_else(|| find_search_inputs(scope).into_iter().next());
                    if let Some(search) = search {
                        if let Err(e) = type_text(&search, term) {
                            debug!(error = %e, "could not pre-filter combobox list");
                        }
                    }
                }
                None
            },
            self.timings.menu_open_timeout,
            self.timings.poll_interval,
        )
        .await;

        match found {
            Some((row, rule)) => {
                activate(&row)?;
                Ok(Some(Selected {
                    label: normalized_label(&row),
                    method: "combobox",
                    rule,
                }))
            }
            None => Ok(None),
        }
    }

    async fn scan_and_select(
        &self,
        scope: &Element,
        name: Option<&str>,
        id: Option<&str>,
        term: &str,
    ) -> Result<Option<Selected>, AutomationError> {
        let deadline = Instant::now() + self.timings.scan_timeout;
        let mut last_typed: Option<Instant> = None;
        let mut scans = 0u32;
        loop {
            scans += 1;
            // options of a native select may render after the scope does
            if let Some(selected) = self.select_native(scope, name, id)? {
                return Ok(Some(selected));
            }
            let rows = self.option_rows(scope, None);
            if let Some((row, rule)) = best_match(&rows, name, id) {
                activate(&row)?;
                return Ok(Some(Selected {
                    label: normalized_label(&row),
                    method: "scan",
                    rule,
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(scans, "scan loop gave up");
                return Ok(None);
            }
            let may_type = last_typed
                .map(|t| now.duration_since(t) >= self.timings.retype_interval)
                .unwrap_or(true);
            if may_type {
                if let Some(input) = find_search_inputs(scope).into_iter().find(is_clickable_or_input) {
                    match type_text(&input, term) {
                        Ok(()) => last_typed = Some(now),
                        Err(e) => warn!(error = %e, "typing search term failed"),
                    }
                }
            }
            sleep(self.timings.poll_interval).await;
        }
    }

    #[instrument(level = "debug", skip(self, scope, params))]
    pub(super) async fn select_item(
        &self,
        scope: &Element,
        params: &WorkflowParams,
    ) -> Result<String, AutomationError> {
        let name = params.sequence_name.as_deref();
        let id = params.sequence_id.as_deref();
        let term = name.or(id).unwrap_or_default();

        let selected = match self.select_native(scope, name, id) {
            Ok(Some(selected)) => Some(selected),
            Ok(None) => match self.select_via_combobox(scope, name, id, term).await {
                Ok(Some(selected)) => Some(selected),
                Ok(None) => self
                    .scan_and_select(scope, name, id, term)
                    .await
                    .map_err(|e| self.stage_failed(Stage::Select, e))?,
                Err(e) => return Err(self.stage_failed(Stage::Select, e)),
            },
            Err(e) => return Err(self.stage_failed(Stage::Select, e)),
        };

        let Some(selected) = selected else {
            return Err(self.stage_failed(
                Stage::Select,
                AutomationError::ElementNotFound(format!(
                    "no item matching name {name:?} or id {id:?}"
                )),
            ));
        };
        self.observer.info(
            Stage::Select.as_str(),
            "selected",
            format!("selected \"{}\"", selected.label),
            Some(json!({
                "method": selected.method,
                "rule": selected.rule.as_str(),
                "label": selected.label,
            })),
        );
        Ok(selected.label)
    }
}

fn is_clickable_or_input(element: &Element) -> bool {
    element.tag() == "input" || is_clickable(element)
}
