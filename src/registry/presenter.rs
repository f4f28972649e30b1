use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::bus::{EventBus, ListenerId};
use crate::registry::{ComponentRegistry, Family};

/// Business-logic component that lives on the bus while in service.
///
/// Presenters subscribe to request events, do their work, and post response
/// events back; the registry attaches them on activation and detaches them on
/// teardown.
pub trait Presenter: Send + Sync + 'static {
    /// Subscribe this presenter on the bus.
    ///
    /// Implementations are typically one line: `bus.register(self)`.
    fn attach(self: Arc<Self>, bus: &EventBus) -> ListenerId;

    /// Called after the presenter is attached.
    fn on_activate(&self) {}

    /// Called after the presenter is detached.
    fn on_deactivate(&self) {}
}

/// Maps presenter type codes to instances. Supplied once at construction;
/// unknown codes return `None` and surface as soft misses.
pub trait PresenterCreator: Send + Sync + 'static {
    fn create(&self, type_code: i32) -> Option<Arc<dyn Presenter>>;

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        let _ = type_code;
        None
    }
}

pub(crate) struct PresenterFamily {
    bus: Arc<EventBus>,
    creator: Box<dyn PresenterCreator>,
    attachments: Mutex<HashMap<i32, ListenerId>>,
}

impl Family for PresenterFamily {
    type Instance = dyn Presenter;
    const KIND: &'static str = "presenter";

    fn create(&self, type_code: i32) -> Option<Arc<dyn Presenter>> {
        self.creator.create(type_code)
    }

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        self.creator.type_name(type_code)
    }

    fn activate(&self, type_code: i32, instance: &Arc<dyn Presenter>) {
        let id = instance.clone().attach(&self.bus);
        self.attachments
            .lock()
            .expect("presenter attachment map poisoned")
            .insert(type_code, id);
        instance.on_activate();
    }

    fn deactivate(&self, type_code: i32, instance: &Arc<dyn Presenter>) {
        let id = self
            .attachments
            .lock()
            .expect("presenter attachment map poisoned")
            .remove(&type_code);
        if let Some(id) = id {
            self.bus.unregister(id);
        }
        instance.on_deactivate();
    }

    fn is_active(&self, type_code: i32, _instance: &Arc<dyn Presenter>) -> bool {
        let attachments = self
            .attachments
            .lock()
            .expect("presenter attachment map poisoned");
        attachments
            .get(&type_code)
            .is_some_and(|id| self.bus.is_registered(*id))
    }
}

/// Lifecycle registry for presenters.
///
/// Presenters are shared per type code and never handed out, so `request`
/// reports success as a bool. While requested, the presenter is registered on
/// the bus; the last release (or a purge) detaches it.
pub struct PresenterRegistry {
    registry: ComponentRegistry<PresenterFamily>,
}

impl PresenterRegistry {
    pub fn new(bus: Arc<EventBus>, creator: Box<dyn PresenterCreator>) -> Self {
        Self {
            registry: ComponentRegistry::new(PresenterFamily {
                bus,
                creator,
                attachments: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Bring the presenter for `type_code` into service (creating or
    /// reactivating it as needed). `false` means the code is unknown.
    pub fn request(&self, type_code: i32) -> bool {
        self.registry.request(type_code).is_some()
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
