use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// A navigable screen: identity plus its place in the back-link forest.
///
/// Identity is the node itself (`Arc` pointer); two nodes may share a tag when
/// one is a [`rebased`](Self::rebased) alias of the other. Links are immutable
/// once built; params are the one mutable part, set by callers right before
/// navigating.
#[derive(Debug)]
pub struct ScreenLink {
    tag: i32,
    name: String,
    params: Mutex<Vec<Value>>,
    previous: Option<Arc<ScreenLink>>,
    root: bool,
}

impl ScreenLink {
    /// A root screen: where back navigation stops.
    pub fn root(tag: i32, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            tag,
            name: name.into(),
            params: Mutex::new(Vec::new()),
            previous: None,
            root: true,
        })
    }

    /// A screen with no back link, reachable only by forking or redirecting.
    pub fn new(tag: i32, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            tag,
            name: name.into(),
            params: Mutex::new(Vec::new()),
            previous: None,
            root: false,
        })
    }

    /// A screen whose back press returns to `previous`.
    pub fn with_previous(tag: i32, name: impl Into<String>, previous: &Arc<ScreenLink>) -> Arc<Self> {
        Arc::new(Self {
            tag,
            name: name.into(),
            params: Mutex::new(Vec::new()),
            previous: Some(previous.clone()),
            root: false,
        })
    }

    /// The same screen with a different back link. Keeps tag, name, root
    /// flag, and the params as they are right now.
    pub fn rebased(self: &Arc<Self>, previous: Option<&Arc<ScreenLink>>) -> Arc<ScreenLink> {
        Arc::new(Self {
            tag: self.tag,
            name: self.name.clone(),
            params: Mutex::new(self.params()),
            previous: previous.cloned(),
            root: self.root,
        })
    }

    pub fn tag(&self) -> i32 {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn previous(&self) -> Option<Arc<ScreenLink>> {
        self.previous.clone()
    }

    pub fn params(&self) -> Vec<Value> {
        self.params.lock().expect("screen params poisoned").clone()
    }

    pub fn set_params(&self, params: Vec<Value>) {
        *self.params.lock().expect("screen params poisoned") = params;
    }
}

impl fmt::Display for ScreenLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.tag)
    }
}

/// Verdict a condition returns for one candidate transition.
pub enum RouteDecision {
    /// Let the transition happen as requested.
    Proceed,
    /// Block it; the active screen stays.
    Veto,
    /// Substitute a different target.
    Redirect(Arc<ScreenLink>),
}

/// Gate evaluated against every transition before it commits.
///
/// Conditions run while the navigator holds its state lock: they must not
/// call back into the navigator.
pub trait NavigationCondition: Send + Sync {
    fn evaluate(&self, from: &Arc<ScreenLink>, to: &Arc<ScreenLink>) -> RouteDecision;
}

impl<F> NavigationCondition for F
where
    F: Fn(&Arc<ScreenLink>, &Arc<ScreenLink>) -> RouteDecision + Send + Sync,
{
    fn evaluate(&self, from: &Arc<ScreenLink>, to: &Arc<ScreenLink>) -> RouteDecision {
        self(from, to)
    }
}

/// Rendering seam: the navigator decides what is active, the host shows it.
pub trait ScreenHost: Send + Sync {
    /// Show `screen`. Runs after the transition committed, outside the
    /// navigator's state lock.
    fn mount(&self, screen: &Arc<ScreenLink>);

    /// Offer the active screen a back press before any navigation happens.
    /// Return `true` to consume it.
    fn on_back_pressed(&self, screen: &Arc<ScreenLink>) -> bool {
        let _ = screen;
        false
    }
}
