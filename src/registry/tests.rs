//! Component registry unit tests

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use crate::bus::{EventBus, Listener, ListenerId, Subscriptions};
    use crate::registry::{
        ComponentRegistry, DataProvider, Family, Presenter, PresenterCreator, PresenterRegistry,
        ProviderCreator, ProviderRegistry, Watchers,
    };

    #[derive(Default)]
    struct LabelFamily {
        created: AtomicUsize,
        deactivated: AtomicUsize,
        active: Mutex<HashSet<i32>>,
    }

    impl Family for LabelFamily {
        type Instance = String;
        const KIND: &'static str = "label";

        fn create(&self, type_code: i32) -> Option<Arc<String>> {
            let label = match type_code {
                1 => "X",
                2 => "Y",
                3 => "Z",
                _ => return None,
            };
            self.created.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(label.to_string()))
        }

        fn activate(&self, type_code: i32, _instance: &Arc<String>) {
            self.active.lock().unwrap().insert(type_code);
        }

        fn deactivate(&self, type_code: i32, _instance: &Arc<String>) {
            self.deactivated.fetch_add(1, Ordering::SeqCst);
            self.active.lock().unwrap().remove(&type_code);
        }

        fn is_active(&self, type_code: i32, _instance: &Arc<String>) -> bool {
            self.active.lock().unwrap().contains(&type_code)
        }
    }

    #[test]
    fn test_shared_instance_created_once_and_torn_down_once() {
        let registry = ComponentRegistry::new(LabelFamily::default());

        let first = registry.request(1).expect("code 1 is known");
        let second = registry.request(1).expect("code 1 is known");
        let third = registry.request(1).expect("code 1 is known");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(*first, "X");
        assert_eq!(registry.family().created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.requester_count(1), 3);

        // Unknown code is a soft miss and leaves the registry usable.
        assert!(registry.request(9).is_none());
        assert_eq!(registry.requester_count(9), 0);

        registry.release(1);
        registry.release(1);
        assert!(registry.contains(1));
        assert_eq!(registry.family().deactivated.load(Ordering::SeqCst), 0);

        registry.release(1);
        assert!(!registry.contains(1));
        assert_eq!(registry.requester_count(1), 0);
        assert_eq!(registry.family().deactivated.load(Ordering::SeqCst), 1);

        // Releasing a code with no entry is a no-op.
        registry.release(1);
        assert_eq!(registry.family().deactivated.load(Ordering::SeqCst), 1);

        // The next request builds a fresh instance.
        let fresh = registry.request(1).expect("code 1 is known");
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(registry.family().created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resident_inactive_instance_is_reactivated() {
        let registry = ComponentRegistry::new(LabelFamily::default());
        let instance = registry.request(2).expect("code 2 is known");

        // Deactivated out of band, but the entry is still resident.
        registry.family().active.lock().unwrap().remove(&2);

        let again = registry.request(2).expect("code 2 is known");
        assert!(Arc::ptr_eq(&instance, &again));
        assert_eq!(registry.family().created.load(Ordering::SeqCst), 1);
        assert!(registry.family().is_active(2, &again));
        assert_eq!(registry.requester_count(2), 2);
    }

    #[test]
    fn test_purge_tears_down_all_entries() {
        let registry = ComponentRegistry::new(LabelFamily::default());
        registry.request(1);
        registry.request(2);
        registry.request(2);
        registry.request(3);

        registry.purge();
        assert!(!registry.contains(1));
        assert!(!registry.contains(2));
        assert!(!registry.contains(3));
        assert_eq!(registry.family().deactivated.load(Ordering::SeqCst), 3);

        // Purging an empty registry is a no-op.
        registry.purge();
        assert_eq!(registry.family().deactivated.load(Ordering::SeqCst), 3);
    }

    // --- presenter variant -------------------------------------------------

    #[derive(Default)]
    struct NullPresenter {
        id: Mutex<Option<ListenerId>>,
        activated: AtomicUsize,
        deactivated: AtomicUsize,
    }

    impl Listener for NullPresenter {
        fn subscriptions(_table: &mut Subscriptions<Self>) {}
    }

    impl Presenter for NullPresenter {
        fn attach(self: Arc<Self>, bus: &EventBus) -> ListenerId {
            let id = bus.register(self.clone());
            *self.id.lock().unwrap() = Some(id);
            id
        }

        fn on_activate(&self) {
            self.activated.fetch_add(1, Ordering::SeqCst);
        }

        fn on_deactivate(&self) {
            self.deactivated.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct OnePresenterCreator {
        last: Mutex<Option<Arc<NullPresenter>>>,
        created: AtomicUsize,
    }

    impl PresenterCreator for OnePresenterCreator {
        fn create(&self, type_code: i32) -> Option<Arc<dyn Presenter>> {
            if type_code != 7 {
                return None;
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            let presenter = Arc::new(NullPresenter::default());
            *self.last.lock().unwrap() = Some(presenter.clone());
            Some(presenter)
        }

        fn type_name(&self, type_code: i32) -> Option<&'static str> {
            (type_code == 7).then_some("NullPresenter")
        }
    }

    #[test]
    fn test_presenter_lifecycle_attaches_and_detaches_on_the_bus() {
        let bus = Arc::new(EventBus::new());
        let creator = Arc::new(OnePresenterCreator::default());
        let registry = PresenterRegistry::new(bus.clone(), Box::new(SharedCreator(creator.clone())));

        assert!(registry.request(7));
        assert!(!registry.request(8));
        assert_eq!(registry.requester_count(7), 1);

        let presenter = creator.last.lock().unwrap().clone().expect("created");
        let id = presenter.id.lock().unwrap().expect("attached");
        assert!(bus.is_registered(id));
        assert_eq!(presenter.activated.load(Ordering::SeqCst), 1);

        registry.release(7);
        assert!(!bus.is_registered(id));
        assert_eq!(presenter.deactivated.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(7));
        bus.shutdown();
    }

    #[test]
    fn test_presenter_detached_out_of_band_is_reattached() {
        let bus = Arc::new(EventBus::new());
        let creator = Arc::new(OnePresenterCreator::default());
        let registry = PresenterRegistry::new(bus.clone(), Box::new(SharedCreator(creator.clone())));

        assert!(registry.request(7));
        let presenter = creator.last.lock().unwrap().clone().expect("created");
        let first_id = presenter.id.lock().unwrap().expect("attached");
        assert!(bus.unregister(first_id));

        // Same resident instance, re-attached rather than rebuilt.
        assert!(registry.request(7));
        assert_eq!(creator.created.load(Ordering::SeqCst), 1);
        assert_eq!(presenter.activated.load(Ordering::SeqCst), 2);
        let second_id = presenter.id.lock().unwrap().expect("re-attached");
        assert_ne!(first_id, second_id);
        assert!(bus.is_registered(second_id));
        bus.shutdown();
    }

    /// Lets tests keep a handle on a creator that registries take by box.
    struct SharedCreator(Arc<OnePresenterCreator>);

    impl PresenterCreator for SharedCreator {
        fn create(&self, type_code: i32) -> Option<Arc<dyn Presenter>> {
            self.0.create(type_code)
        }

        fn type_name(&self, type_code: i32) -> Option<&'static str> {
            self.0.type_name(type_code)
        }
    }

    // --- provider variant --------------------------------------------------

    #[derive(Default)]
    struct MemoryProvider {
        value: Mutex<Option<Value>>,
        watchers: Watchers,
    }

    impl DataProvider for MemoryProvider {
        fn save(&self, value: Value) {
            *self.value.lock().unwrap() = Some(value.clone());
            self.watchers.notify(&value);
        }

        fn retrieve(&self, _filters: Option<&Value>) -> Option<Value> {
            self.value.lock().unwrap().clone()
        }

        fn clear(&self, _props: Option<&Value>) -> bool {
            self.value.lock().unwrap().take().is_some()
        }

        fn drop_watchers(&self) {
            self.watchers.clear();
        }
    }

    #[derive(Default)]
    struct OneProviderCreator {
        last: Mutex<Option<Arc<MemoryProvider>>>,
    }

    impl ProviderCreator for OneProviderCreator {
        fn create(&self, type_code: i32) -> Option<Arc<dyn DataProvider>> {
            if type_code != 3 {
                return None;
            }
            let provider = Arc::new(MemoryProvider::default());
            *self.last.lock().unwrap() = Some(provider.clone());
            Some(provider)
        }
    }

    #[test]
    fn test_provider_requests_share_one_instance() {
        let registry = ProviderRegistry::new(Box::new(OneProviderCreator::default()));

        let first = registry.request(3).expect("code 3 is known");
        let second = registry.request(3).expect("code 3 is known");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.requester_count(3), 2);

        first.save(json!({"user": "ada"}));
        assert_eq!(second.retrieve(None), Some(json!({"user": "ada"})));
        assert!(registry.request(4).is_none());
    }

    #[test]
    fn test_provider_watchers_dropped_on_teardown() {
        let creator = Arc::new(OneProviderCreator::default());
        let registry = ProviderRegistry::new(Box::new(SharedProviderCreator(creator.clone())));
        let handle = registry.request(3).expect("code 3 is known");

        let notified = Arc::new(AtomicUsize::new(0));
        let provider = creator.last.lock().unwrap().clone().expect("created");
        let counter = notified.clone();
        provider.watchers.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.save(json!("hello"));
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        registry.release(3);
        assert!(provider.watchers.is_empty());

        // The held handle still works, but nobody is notified anymore.
        handle.save(json!("again"));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    struct SharedProviderCreator(Arc<OneProviderCreator>);

    impl ProviderCreator for SharedProviderCreator {
        fn create(&self, type_code: i32) -> Option<Arc<dyn DataProvider>> {
            self.0.create(type_code)
        }
    }

    #[test]
    fn test_watchers_add_remove_notify() {
        let watchers = Watchers::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let first = {
            let hits = hits.clone();
            watchers.add(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let hits = hits.clone();
            watchers.add(move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };
        assert_eq!(watchers.len(), 2);

        watchers.notify(&json!(1));
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        assert!(watchers.remove(first));
        assert!(!watchers.remove(first));
        watchers.notify(&json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 21);

        assert_eq!(watchers.clear(), 1);
        assert!(watchers.is_empty());
    }
}
