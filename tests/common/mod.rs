// tests/common/mod.rs
//! Shared fixture app for runtime integration tests: a welcome flow with one
//! presenter, one message provider, and a screen host that maps screen tags
//! to presenter type codes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use armature::{
    CacheStore, Channel, DataProvider, Event, EventBus, Listener, ListenerId, Ownership,
    Presenter, PresenterCreator, PresenterRegistry, ProviderCreator, ProviderRegistry,
    RequestEvent, ResponseEvent, ResponseStatus, ScreenHost, ScreenLink, Subscriptions, Watchers,
};

pub const WELCOME_PRESENTER: i32 = 1;
pub const MESSAGE_PROVIDER: i32 = 1;

const MESSAGE_KEY: &str = "welcome-message";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub struct WelcomeRequest {
    pub ownership: Ownership,
}

impl Event for WelcomeRequest {
    fn channel(&self) -> Option<Channel> {
        Some(Channel::Background)
    }
}

impl RequestEvent for WelcomeRequest {
    fn ownership(&self) -> &Ownership {
        &self.ownership
    }
}

pub struct WelcomeResponse {
    pub ownership: Ownership,
    pub status: ResponseStatus,
    pub message: String,
}

impl Event for WelcomeResponse {
    fn channel(&self) -> Option<Channel> {
        Some(Channel::Ui)
    }
}

impl ResponseEvent for WelcomeResponse {
    fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    fn status(&self) -> ResponseStatus {
        self.status
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Keeps the welcome message in memory, mirrored to the cache when one is
/// configured.
pub struct MessageProvider {
    value: Mutex<Option<Value>>,
    cache: Option<CacheStore>,
    pub watchers: Watchers,
}

impl MessageProvider {
    pub fn new(cache: Option<CacheStore>) -> Self {
        Self {
            value: Mutex::new(None),
            cache,
            watchers: Watchers::default(),
        }
    }
}

impl DataProvider for MessageProvider {
    fn save(&self, value: Value) {
        *self.value.lock().unwrap() = Some(value.clone());
        if let Some(cache) = &self.cache {
            cache.put(MESSAGE_KEY, &value);
        }
        self.watchers.notify(&value);
    }

    fn retrieve(&self, _filters: Option<&Value>) -> Option<Value> {
        if let Some(value) = self.value.lock().unwrap().clone() {
            return Some(value);
        }
        self.cache.as_ref().and_then(|cache| cache.get(MESSAGE_KEY))
    }

    fn clear(&self, _props: Option<&Value>) -> bool {
        let had_memory = self.value.lock().unwrap().take().is_some();
        let had_cached = self
            .cache
            .as_ref()
            .is_some_and(|cache| cache.delete(MESSAGE_KEY));
        had_memory || had_cached
    }

    fn drop_watchers(&self) {
        self.watchers.clear();
    }
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// Answers `WelcomeRequest` with the provider's current message.
pub struct WelcomePresenter {
    bus: Arc<EventBus>,
    providers: Arc<ProviderRegistry>,
    provider: Mutex<Option<Arc<dyn DataProvider>>>,
}

impl WelcomePresenter {
    pub fn new(bus: Arc<EventBus>, providers: Arc<ProviderRegistry>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            providers,
            provider: Mutex::new(None),
        })
    }

    fn current_message(&self) -> Option<String> {
        self.provider
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|provider| provider.retrieve(None))
            .and_then(|value| value.as_str().map(str::to_owned))
    }

    fn respond_to(&self, ownership: &Ownership) -> WelcomeResponse {
        match self.current_message() {
            Some(message) => WelcomeResponse {
                ownership: ownership.clone(),
                status: ResponseStatus::Ok,
                message,
            },
            None => WelcomeResponse {
                ownership: ownership.clone(),
                status: ResponseStatus::Fail,
                message: String::new(),
            },
        }
    }

    fn handle_welcome(&self, request: &WelcomeRequest) {
        self.bus.post(self.respond_to(&request.ownership));
    }
}

impl Listener for WelcomePresenter {
    fn subscriptions(table: &mut Subscriptions<Self>) {
        table
            .on::<WelcomeRequest>(Self::handle_welcome)
            .produce::<WelcomeResponse>(|presenter| {
                presenter.respond_to(&Ownership::anonymous())
            });
    }
}

impl Presenter for WelcomePresenter {
    fn attach(self: Arc<Self>, bus: &EventBus) -> ListenerId {
        bus.register(self)
    }

    fn on_activate(&self) {
        *self.provider.lock().unwrap() = self.providers.request(MESSAGE_PROVIDER);
    }

    fn on_deactivate(&self) {
        if self.provider.lock().unwrap().take().is_some() {
            self.providers.release(MESSAGE_PROVIDER);
        }
    }
}

// ---------------------------------------------------------------------------
// Creators
// ---------------------------------------------------------------------------

pub struct DemoPresenterCreator {
    bus: Arc<EventBus>,
    providers: Arc<ProviderRegistry>,
}

impl DemoPresenterCreator {
    pub fn new(bus: Arc<EventBus>, providers: Arc<ProviderRegistry>) -> Self {
        Self { bus, providers }
    }
}

impl PresenterCreator for DemoPresenterCreator {
    fn create(&self, type_code: i32) -> Option<Arc<dyn Presenter>> {
        match type_code {
            WELCOME_PRESENTER => Some(WelcomePresenter::new(
                self.bus.clone(),
                self.providers.clone(),
            )),
            _ => None,
        }
    }

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        (type_code == WELCOME_PRESENTER).then_some("WelcomePresenter")
    }
}

pub struct DemoProviderCreator {
    cache: Option<CacheStore>,
}

impl DemoProviderCreator {
    pub fn new(cache: Option<CacheStore>) -> Self {
        Self { cache }
    }
}

impl ProviderCreator for DemoProviderCreator {
    fn create(&self, type_code: i32) -> Option<Arc<dyn DataProvider>> {
        match type_code {
            MESSAGE_PROVIDER => Some(Arc::new(MessageProvider::new(self.cache.clone()))),
            _ => None,
        }
    }

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        (type_code == MESSAGE_PROVIDER).then_some("MessageProvider")
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Collects welcome responses addressed to one owner.
pub struct ResponseCollector {
    ownership: Ownership,
    seen: Mutex<Vec<(String, ResponseStatus)>>,
}

impl ResponseCollector {
    pub fn for_owner(owner: &str) -> Arc<Self> {
        Arc::new(Self {
            ownership: Ownership::owned_by(owner),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<(String, ResponseStatus)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Listener for ResponseCollector {
    fn subscriptions(table: &mut Subscriptions<Self>) {
        table.on::<WelcomeResponse>(|collector, response| {
            if collector.ownership.matches(&response.ownership) {
                collector
                    .seen
                    .lock()
                    .unwrap()
                    .push((response.message.clone(), response.status));
            }
        });
    }
}

/// Screen host that requests the presenter matching each mounted screen's
/// tag and releases the previous one.
pub struct PresenterHost {
    presenters: Arc<PresenterRegistry>,
    current: Mutex<Option<i32>>,
}

impl PresenterHost {
    pub fn new(presenters: Arc<PresenterRegistry>) -> Arc<Self> {
        Arc::new(Self {
            presenters,
            current: Mutex::new(None),
        })
    }
}

impl ScreenHost for PresenterHost {
    fn mount(&self, screen: &Arc<ScreenLink>) {
        let mut current = self.current.lock().unwrap();
        if let Some(previous) = current.take() {
            self.presenters.release(previous);
        }
        if self.presenters.request(screen.tag()) {
            *current = Some(screen.tag());
        }
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
