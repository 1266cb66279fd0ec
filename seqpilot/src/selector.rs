use crate::element::Element;
use crate::oracle::normalize;

/// Predicate over normalized node text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextPredicate {
    /// Whole label equals the phrase
    Exact(String),
    /// Label starts with the phrase
    Prefix(String),
    /// Label contains the phrase anywhere
    Contains(String),
    /// Any of the inner predicates matches
    AnyOf(Vec<TextPredicate>),
}

impl TextPredicate {
    pub fn exact(phrase: &str) -> Self {
        TextPredicate::Exact(normalize(phrase))
    }

    pub fn prefix(phrase: &str) -> Self {
        TextPredicate::Prefix(normalize(phrase))
    }

    pub fn contains(phrase: &str) -> Self {
        TextPredicate::Contains(normalize(phrase))
    }

    pub fn any_exact<S: AsRef<str>>(phrases: &[S]) -> Self {
        TextPredicate::AnyOf(phrases.iter().map(|p| Self::exact(p.as_ref())).collect())
    }

    pub fn any_contains<S: AsRef<str>>(phrases: &[S]) -> Self {
        TextPredicate::AnyOf(
            phrases
                .iter()
                .map(|p| Self::contains(p.as_ref()))
                .collect(),
        )
    }

    /// Test a label. The label is normalized here, so callers may pass raw text.
    pub fn matches(&self, label: &str) -> bool {
        let label = normalize(label);
        self.matches_normalized(&label)
    }

    /// Test a label that is already normalized.
    pub fn matches_normalized(&self, label: &str) -> bool {
        match self {
            TextPredicate::Exact(p) => label == normalize(p),
            TextPredicate::Prefix(p) => label.starts_with(&normalize(p)),
            TextPredicate::Contains(p) => label.contains(&normalize(p)),
            TextPredicate::AnyOf(inner) => inner.iter().any(|p| p.matches_normalized(label)),
        }
    }

    /// Loosen an exact/prefix predicate into a substring match.
    pub fn relaxed(&self) -> Self {
        match self {
            TextPredicate::Exact(p) | TextPredicate::Prefix(p) => TextPredicate::Contains(p.clone()),
            TextPredicate::Contains(_) => self.clone(),
            TextPredicate::AnyOf(inner) => {
                TextPredicate::AnyOf(inner.iter().map(|p| p.relaxed()).collect())
            }
        }
    }
}

impl std::fmt::Display for TextPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextPredicate::Exact(p) => write!(f, "exact:{p}"),
            TextPredicate::Prefix(p) => write!(f, "prefix:{p}"),
            TextPredicate::Contains(p) => write!(f, "text:{p}"),
            TextPredicate::AnyOf(inner) => {
                let parts: Vec<String> = inner.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(" || "))
            }
        }
    }
}

impl From<&str> for TextPredicate {
    fn from(s: &str) -> Self {
        let alternatives: Vec<&str> = s.split("||").map(|p| p.trim()).collect();
        if alternatives.len() > 1 {
            return TextPredicate::AnyOf(alternatives.into_iter().map(TextPredicate::from).collect());
        }

        if let Some(rest) = strip_prefix_ci(s, "exact:") {
            TextPredicate::exact(rest)
        } else if let Some(rest) = strip_prefix_ci(s, "prefix:") {
            TextPredicate::prefix(rest)
        } else if let Some(rest) =
            strip_prefix_ci(s, "text:").or_else(|| strip_prefix_ci(s, "contains:"))
        {
            TextPredicate::contains(rest)
        } else {
            TextPredicate::exact(s)
        }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

impl From<String> for TextPredicate {
    fn from(s: String) -> Self {
        TextPredicate::from(s.as_str())
    }
}

/// Where a lookup starts
#[derive(Debug, Clone, Default)]
pub enum Scope {
    /// Whole document only
    Document,
    /// A specific container
    Within(Element),
    /// Visible overlays first, then the whole document
    #[default]
    OverlaysFirst,
    /// Visible overlays only
    OverlaysOnly,
    /// Overlays whose label contains the given (normalized) name
    Modal(String),
}

/// How candidate nodes are enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Only interactive roles/tags
    #[default]
    Clickable,
    /// Any visible node, shortest label first, then climb to an interactable ancestor
    Deep,
}

/// Stateless lookup description, rebuilt for every search.
#[derive(Debug, Clone)]
pub struct DiscoveryQuery {
    pub predicate: TextPredicate,
    pub scope: Scope,
    pub mode: MatchMode,
    /// Also return visible controls that are currently disabled
    pub include_disabled: bool,
}

impl DiscoveryQuery {
    pub fn new(predicate: impl Into<TextPredicate>) -> Self {
        Self {
            predicate: predicate.into(),
            scope: Scope::default(),
            mode: MatchMode::default(),
            include_disabled: false,
        }
    }

    pub fn within(mut self, element: Element) -> Self {
        self.scope = Scope::Within(element);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn in_modal(mut self, name: &str) -> Self {
        self.scope = Scope::Modal(normalize(name));
        self
    }

    pub fn deep(mut self) -> Self {
        self.mode = MatchMode::Deep;
        self
    }

    pub fn include_disabled(mut self) -> Self {
        self.include_disabled = true;
        self
    }
}

impl From<&str> for DiscoveryQuery {
    fn from(s: &str) -> Self {
        DiscoveryQuery::new(TextPredicate::from(s))
    }
}

impl From<TextPredicate> for DiscoveryQuery {
    fn from(predicate: TextPredicate) -> Self {
        DiscoveryQuery::new(predicate)
    }
}
