//! Screen navigation state machine.
//!
//! Screens form a back-link forest: every [`ScreenLink`] optionally points at
//! the screen a back press returns to, and exactly one bound screen is the
//! root where back navigation stops. The [`Navigator`] owns the active
//! screen, runs registered [`NavigationCondition`]s before committing any
//! transition, and tracks at most one pending fork (a jump to a screen with
//! no back link) so the detour can later be merged back.
//!
//! # Architecture
//!
//! - [`screen`]: screen nodes, conditions, and the [`ScreenHost`] seam
//! - [`Navigator`]: transition engine with veto/redirect gating and
//!   single-level fork bookkeeping
//!
//! Mount callbacks run outside the navigator's state lock; conditions run
//! inside it and must not call back into the navigator.

mod screen;

pub use screen::{NavigationCondition, RouteDecision, ScreenHost, ScreenLink};

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors surfaced while binding the screen set.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("no root screen among the {0} bound screens")]
    NoRoot(usize),
    #[error("multiple root screens bound: {0} and {1}")]
    MultipleRoots(String, String),
    #[error("default screen {0} is not among the bound screens")]
    UnboundDefault(String),
}

/// Outcome of a forward transition.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The transition committed on this screen, possibly a redirect target.
    Committed(Arc<ScreenLink>),
    /// The target was already active and was remounted in place.
    Reloaded,
    /// A condition blocked the transition; nothing changed.
    Vetoed,
}

impl Transition {
    /// The screen the transition landed on, when it committed.
    pub fn committed_to(&self) -> Option<&Arc<ScreenLink>> {
        match self {
            Transition::Committed(screen) => Some(screen),
            _ => None,
        }
    }
}

struct NavState {
    active: Arc<ScreenLink>,
    last_fork: Option<Arc<ScreenLink>>,
}

/// Transition engine over a bound set of screens.
pub struct Navigator {
    host: Arc<dyn ScreenHost>,
    screens: Vec<Arc<ScreenLink>>,
    root: Arc<ScreenLink>,
    conditions: Mutex<Vec<Arc<dyn NavigationCondition>>>,
    state: Mutex<NavState>,
}

impl Navigator {
    /// Binds the screen set, validates it, and mounts the default screen.
    ///
    /// The set must contain exactly one root and the default screen itself.
    pub fn new(
        host: Arc<dyn ScreenHost>,
        screens: Vec<Arc<ScreenLink>>,
        default_screen: &Arc<ScreenLink>,
    ) -> Result<Self, NavError> {
        let mut roots = screens.iter().filter(|screen| screen.is_root());
        let root = roots.next().ok_or(NavError::NoRoot(screens.len()))?.clone();
        if let Some(extra) = roots.next() {
            return Err(NavError::MultipleRoots(root.to_string(), extra.to_string()));
        }
        if !screens.iter().any(|screen| Arc::ptr_eq(screen, default_screen)) {
            return Err(NavError::UnboundDefault(default_screen.to_string()));
        }

        tracing::info!(
            "navigation bound: {} screens, root {root}, starting at {default_screen}",
            screens.len()
        );
        host.mount(default_screen);

        Ok(Self {
            host,
            screens,
            root,
            conditions: Mutex::new(Vec::new()),
            state: Mutex::new(NavState {
                active: default_screen.clone(),
                last_fork: None,
            }),
        })
    }

    /// Registers a condition. Conditions run in registration order on every
    /// subsequent transition.
    pub fn add_condition(&self, condition: impl NavigationCondition + 'static) {
        self.conditions
            .lock()
            .expect("navigation conditions poisoned")
            .push(Arc::new(condition));
    }

    pub fn active_screen(&self) -> Arc<ScreenLink> {
        self.state
            .lock()
            .expect("navigation state poisoned")
            .active
            .clone()
    }

    pub fn pending_fork(&self) -> Option<Arc<ScreenLink>> {
        self.state
            .lock()
            .expect("navigation state poisoned")
            .last_fork
            .clone()
    }

    pub fn root_screen(&self) -> &Arc<ScreenLink> {
        &self.root
    }

    pub fn screens(&self) -> &[Arc<ScreenLink>] {
        &self.screens
    }

    /// Navigates forward to `target`.
    ///
    /// Navigating to the screen that is already active remounts it and
    /// reports [`Transition::Reloaded`] without consulting conditions.
    pub fn go_to(&self, target: &Arc<ScreenLink>) -> Transition {
        let mut state = self.state.lock().expect("navigation state poisoned");

        if Arc::ptr_eq(&state.active, target) {
            drop(state);
            tracing::debug!("reloading {target} in place");
            self.host.mount(target);
            return Transition::Reloaded;
        }

        let Some(resolved) = self.run_conditions(&state.active, target) else {
            tracing::info!("transition {} -> {target} vetoed", state.active);
            return Transition::Vetoed;
        };

        self.note_fork(&mut state, &resolved);
        state.active = resolved.clone();
        drop(state);

        self.host.mount(&resolved);
        tracing::debug!("navigated to {resolved}");
        Transition::Committed(resolved)
    }

    /// Handles a back press. Returns `false` only when the active screen is
    /// the root and has nothing to consume it, meaning the caller should
    /// close the application.
    pub fn go_back(&self) -> bool {
        let active = self.active_screen();
        if self.host.on_back_pressed(&active) {
            tracing::debug!("back press consumed by {active}");
            return true;
        }

        let mut state = self.state.lock().expect("navigation state poisoned");
        // The host callback ran unlocked; re-read the active screen.
        let active = state.active.clone();

        if let Some(previous) = active.previous() {
            match self.run_conditions(&active, &previous) {
                Some(resolved) => {
                    state.active = resolved.clone();
                    drop(state);
                    self.host.mount(&resolved);
                    tracing::debug!("navigated back to {resolved}");
                }
                None => tracing::info!("back transition {active} -> {previous} vetoed"),
            }
            return true;
        }

        if let Some(fork) = state.last_fork.clone() {
            match self.run_conditions(&active, &fork) {
                Some(resolved) => {
                    if Arc::ptr_eq(&resolved, &fork) {
                        state.last_fork = None;
                        tracing::debug!("returned to fork point {fork}");
                    }
                    state.active = resolved.clone();
                    drop(state);
                    self.host.mount(&resolved);
                }
                None => tracing::info!("back transition {active} -> {fork} vetoed"),
            }
            return true;
        }

        if active.is_root() {
            tracing::debug!("back pressed on root {active}; yielding to caller");
            return false;
        }

        tracing::warn!("{active} has no back link; recovering to root {}", self.root);
        if let Some(resolved) = self.run_conditions(&active, &self.root) {
            state.active = resolved.clone();
            drop(state);
            self.host.mount(&resolved);
        }
        true
    }

    /// Returns to the pending fork point and clears it. With no fork pending
    /// this falls through to the root screen.
    pub fn merge_branches(&self) -> Transition {
        let fork = self
            .state
            .lock()
            .expect("navigation state poisoned")
            .last_fork
            .clone();

        let Some(fork) = fork else {
            tracing::warn!("merge requested with no fork pending; going to root");
            return self.go_to(&self.root);
        };

        let outcome = self.go_to(&fork);
        if matches!(outcome, Transition::Reloaded) {
            // Already sitting on the fork point; the reload path skipped the
            // fork bookkeeping.
            let mut state = self.state.lock().expect("navigation state poisoned");
            if state.last_fork.as_ref().is_some_and(|f| Arc::ptr_eq(f, &fork)) {
                state.last_fork = None;
                tracing::debug!("branches merged at {fork}");
            }
        }
        outcome
    }

    /// Runs the conditions for one transition. Returns the resolved target,
    /// or `None` when a condition vetoed it. Redirects pointing back at the
    /// requested target are ignored; when the remaining redirects disagree,
    /// the first registered condition wins.
    fn run_conditions(
        &self,
        from: &Arc<ScreenLink>,
        to: &Arc<ScreenLink>,
    ) -> Option<Arc<ScreenLink>> {
        let conditions = self
            .conditions
            .lock()
            .expect("navigation conditions poisoned")
            .clone();

        let mut redirects: Vec<Arc<ScreenLink>> = Vec::new();
        for condition in &conditions {
            match condition.evaluate(from, to) {
                RouteDecision::Proceed => {}
                RouteDecision::Veto => return None,
                RouteDecision::Redirect(alternative) => {
                    if !Arc::ptr_eq(&alternative, to) {
                        redirects.push(alternative);
                    }
                }
            }
        }

        let Some(first) = redirects.first() else {
            return Some(to.clone());
        };
        if redirects.iter().any(|redirect| redirect.tag() != first.tag()) {
            tracing::error!(
                "conditions disagree on a redirect for {from} -> {to}; using the first ({first})"
            );
        }
        tracing::debug!("transition {from} -> {to} redirected to {first}");
        Some(first.clone())
    }

    /// Fork bookkeeping for a committed forward transition, evaluated against
    /// the pre-transition state.
    fn note_fork(&self, state: &mut NavState, resolved: &Arc<ScreenLink>) {
        if let Some(fork) = &state.last_fork {
            let leaving_fork_point = Arc::ptr_eq(fork, &state.active);
            let reached_fork_point = Arc::ptr_eq(fork, resolved);
            if leaving_fork_point || reached_fork_point || resolved.is_root() {
                tracing::debug!("pending fork at {fork} resolved");
                state.last_fork = None;
                return;
            }
        }

        if resolved.previous().is_none() && !resolved.is_root() && !state.active.is_root() {
            match &state.last_fork {
                Some(pending) => {
                    tracing::error!("fork already pending at {pending}; keeping it");
                }
                None => {
                    tracing::debug!("fork recorded at {}", state.active);
                    state.last_fork = Some(state.active.clone());
                }
            }
        }
    }
}
