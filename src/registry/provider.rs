use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::registry::{ComponentRegistry, Family};

/// Shared holder of application data, addressed by type code.
///
/// Values are opaque JSON at this seam; what a provider keeps, filters, and
/// clears is its own business.
pub trait DataProvider: Send + Sync + 'static {
    /// Store a value.
    fn save(&self, value: Value);

    /// Fetch the current value, optionally narrowed by `filters`.
    fn retrieve(&self, filters: Option<&Value>) -> Option<Value>;

    /// Drop stored state, optionally narrowed by `props`. Returns whether
    /// anything was cleared.
    fn clear(&self, props: Option<&Value>) -> bool;

    /// Teardown hook: detach observers before the provider is discarded.
    fn drop_watchers(&self);
}

/// Maps provider type codes to instances, same shape as the presenter side.
pub trait ProviderCreator: Send + Sync + 'static {
    fn create(&self, type_code: i32) -> Option<Arc<dyn DataProvider>>;

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        let _ = type_code;
        None
    }
}

/// Handle for removing a registered watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

type WatcherFn = Box<dyn Fn(&Value) + Send + Sync>;

/// Change-notification helper for provider implementations.
///
/// Providers embed one and call [`notify`](Self::notify) from `save`;
/// [`DataProvider::drop_watchers`] typically forwards to
/// [`clear`](Self::clear).
#[derive(Default)]
pub struct Watchers {
    next: AtomicU64,
    entries: Mutex<Vec<(u64, WatcherFn)>>,
}

impl Watchers {
    pub fn add(&self, watcher: impl Fn(&Value) + Send + Sync + 'static) -> WatcherId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .expect("watcher list poisoned")
            .push((id, Box::new(watcher)));
        WatcherId(id)
    }

    pub fn remove(&self, id: WatcherId) -> bool {
        let mut entries = self.entries.lock().expect("watcher list poisoned");
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id.0);
        entries.len() < before
    }

    pub fn notify(&self, value: &Value) {
        let entries = self.entries.lock().expect("watcher list poisoned");
        for (_, watcher) in entries.iter() {
            watcher(value);
        }
    }

    /// Remove every watcher. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().expect("watcher list poisoned");
        let dropped = entries.len();
        entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("watcher list poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ProviderFamily {
    creator: Box<dyn ProviderCreator>,
}

impl Family for ProviderFamily {
    type Instance = dyn DataProvider;
    const KIND: &'static str = "data provider";

    fn create(&self, type_code: i32) -> Option<Arc<dyn DataProvider>> {
        self.creator.create(type_code)
    }

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        self.creator.type_name(type_code)
    }

    // Providers are in service from creation to teardown.
    fn activate(&self, _type_code: i32, _instance: &Arc<dyn DataProvider>) {}

    fn deactivate(&self, _type_code: i32, instance: &Arc<dyn DataProvider>) {
        instance.drop_watchers();
    }

    fn is_active(&self, _type_code: i32, _instance: &Arc<dyn DataProvider>) -> bool {
        true
    }
}

/// Data variant of the component registry: `request` hands the shared
/// provider instance out.
pub struct ProviderRegistry {
    registry: ComponentRegistry<ProviderFamily>,
}

impl ProviderRegistry {
    pub fn new(creator: Box<dyn ProviderCreator>) -> Self {
        Self {
            registry: ComponentRegistry::new(ProviderFamily { creator }),
        }
    }

    /// Fetch the provider for `type_code`, creating it on first use.
    /// `None` means the code is unknown.
    pub fn request(&self, type_code: i32) -> Option<Arc<dyn DataProvider>> {
        self.registry.request(type_code)
    }

    pub fn release(&self, type_code: i32) {
        self.registry.release(type_code);
    }

    pub fn purge(&self) {
        self.registry.purge();
    }

    pub fn requester_count(&self, type_code: i32) -> u32 {
        self.registry.requester_count(type_code)
    }

    pub fn contains(&self, type_code: i32) -> bool {
        self.registry.contains(type_code)
    }
}
