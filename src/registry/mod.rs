//! Reference-counted lifecycle registries for shared components.
//!
//! One generic mechanism, instantiated twice:
//! - `PresenterRegistry`: presenters subscribe to the bus while in service
//!   and are shared by type code, never handed out
//! - `ProviderRegistry`: data providers are handed out as shared instances
//!
//! An instance is created on the first request for its type code, shared by
//! every further request, and torn down exactly once when the last requester
//! releases it. Unknown type codes are soft misses, not errors.

mod presenter;
mod provider;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use presenter::{Presenter, PresenterCreator, PresenterRegistry};
pub use provider::{DataProvider, ProviderCreator, ProviderRegistry, WatcherId, Watchers};

/// How a registry creates, activates, and retires one kind of component.
///
/// The registry owns counting and entry bookkeeping; everything
/// component-specific lives behind this trait.
pub trait Family: Send + Sync + 'static {
    /// The component type managed by the registry.
    type Instance: ?Sized + Send + Sync + 'static;

    /// Label used in logs ("presenter", "data provider").
    const KIND: &'static str;

    /// Build a fresh instance for `type_code`; `None` for unknown codes.
    fn create(&self, type_code: i32) -> Option<Arc<Self::Instance>>;

    /// Display name for a code, used in logs.
    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        let _ = type_code;
        None
    }

    /// Bring an instance into service.
    fn activate(&self, type_code: i32, instance: &Arc<Self::Instance>);

    /// Take an instance out of service.
    fn deactivate(&self, type_code: i32, instance: &Arc<Self::Instance>);

    /// Whether the instance is currently in service.
    fn is_active(&self, type_code: i32, instance: &Arc<Self::Instance>) -> bool;
}

struct Entry<T: ?Sized> {
    instance: Arc<T>,
    requesters: u32,
}

/// Shared-instance registry keyed by `i32` type codes.
///
/// One lock serializes every operation, including factory calls: a factory
/// that calls back into the same registry will deadlock, and a slow factory
/// stalls concurrent requests for other codes.
pub struct ComponentRegistry<F: Family> {
    family: F,
    entries: Mutex<HashMap<i32, Entry<F::Instance>>>,
}

impl<F: Family> ComponentRegistry<F> {
    pub fn new(family: F) -> Self {
        Self {
            family,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn family(&self) -> &F {
        &self.family
    }

    /// Fetch the shared instance for `type_code`, creating it on first use.
    ///
    /// A resident instance that reports inactive is reactivated before being
    /// handed out. Every successful request must be paired with a
    /// [`release`](Self::release).
    pub fn request(&self, type_code: i32) -> Option<Arc<F::Instance>> {
        let mut entries = self.entries.lock().expect("component registry poisoned");

        if let Some(entry) = entries.get_mut(&type_code) {
            if !self.family.is_active(type_code, &entry.instance) {
                self.family.activate(type_code, &entry.instance);
                tracing::info!("reactivated {} {}", F::KIND, self.label(type_code));
            }
            entry.requesters += 1;
            return Some(entry.instance.clone());
        }

        let Some(instance) = self.family.create(type_code) else {
            tracing::warn!("unknown {} type code {type_code}", F::KIND);
            return None;
        };
        self.family.activate(type_code, &instance);
        tracing::debug!("created {} {}", F::KIND, self.label(type_code));
        entries.insert(
            type_code,
            Entry {
                instance: instance.clone(),
                requesters: 1,
            },
        );
        Some(instance)
    }

    /// Give back one request. The last release deactivates the instance and
    /// removes its entry; releasing a code with no entry is a no-op.
    pub fn release(&self, type_code: i32) {
        let mut entries = self.entries.lock().expect("component registry poisoned");

        let Some(mut entry) = entries.remove(&type_code) else {
            tracing::debug!("release of unrequested {} code {type_code}; ignored", F::KIND);
            return;
        };
        entry.requesters -= 1;
        if entry.requesters > 0 {
            entries.insert(type_code, entry);
            return;
        }
        self.family.deactivate(type_code, &entry.instance);
        tracing::debug!("tore down {} {}", F::KIND, self.label(type_code));
    }

    /// Deactivate and drop every entry regardless of requester counts.
    pub fn purge(&self) {
        let drained: Vec<(i32, Entry<F::Instance>)> = {
            let mut entries = self.entries.lock().expect("component registry poisoned");
            entries.drain().collect()
        };
        if drained.is_empty() {
            return;
        }
        for (type_code, entry) in &drained {
            self.family.deactivate(*type_code, &entry.instance);
        }
        tracing::info!("purged {} {}s", drained.len(), F::KIND);
    }

    pub fn requester_count(&self, type_code: i32) -> u32 {
        let entries = self.entries.lock().expect("component registry poisoned");
        entries.get(&type_code).map_or(0, |entry| entry.requesters)
    }

    pub fn contains(&self, type_code: i32) -> bool {
        let entries = self.entries.lock().expect("component registry poisoned");
        entries.contains_key(&type_code)
    }

    fn label(&self, type_code: i32) -> String {
        match self.family.type_name(type_code) {
            Some(name) => format!("{name} (code {type_code})"),
            None => format!("code {type_code}"),
        }
    }
}

#[cfg(test)]
mod tests;
