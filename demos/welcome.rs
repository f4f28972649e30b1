// demos/welcome.rs
//! Minimal application shell on top of the armature runtime: one presenter,
//! one data provider, a three-screen navigation walk, and a request/response
//! round trip over the bus.
//!
//! Run with `cargo run --example welcome`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use armature::{
    CacheStore, Channel, DataProvider, Event, EventBus, Listener, ListenerId, Navigator,
    Ownership, Presenter, PresenterCreator, ProviderCreator, ProviderRegistry, RequestEvent,
    ResponseEvent, ResponseStatus, RouteDecision, Runtime, RuntimeConfig, ScreenHost, ScreenLink,
    Subscriptions, Watchers,
};

const WELCOME_PRESENTER: i32 = 1;
const MESSAGE_PROVIDER: i32 = 1;

const WELCOME_SCREEN: i32 = 1;
const FEED_SCREEN: i32 = 2;
const SETTINGS_SCREEN: i32 = 3;

const MESSAGE_KEY: &str = "greeting";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

struct GreetingRequest {
    ownership: Ownership,
}

impl Event for GreetingRequest {
    fn channel(&self) -> Option<Channel> {
        Some(Channel::Background)
    }
}

impl RequestEvent for GreetingRequest {
    fn ownership(&self) -> &Ownership {
        &self.ownership
    }
}

struct GreetingResponse {
    ownership: Ownership,
    status: ResponseStatus,
    message: String,
}

impl Event for GreetingResponse {
    fn channel(&self) -> Option<Channel> {
        Some(Channel::Ui)
    }
}

impl ResponseEvent for GreetingResponse {
    fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    fn status(&self) -> ResponseStatus {
        self.status
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Greeting text, kept in memory and mirrored to a cache directory so a
/// second run of the demo starts out warm.
struct GreetingProvider {
    value: Mutex<Option<Value>>,
    cache: Option<CacheStore>,
    watchers: Watchers,
}

impl GreetingProvider {
    fn new(cache: Option<CacheStore>) -> Self {
        Self {
            value: Mutex::new(None),
            cache,
            watchers: Watchers::default(),
        }
    }
}

impl DataProvider for GreetingProvider {
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

/// Answers `GreetingRequest` with whatever the provider currently holds.
struct GreetingPresenter {
    bus: Arc<EventBus>,
    providers: Arc<ProviderRegistry>,
    provider: Mutex<Option<Arc<dyn DataProvider>>>,
}

impl GreetingPresenter {
    fn handle_request(&self, request: &GreetingRequest) {
        let message = self
            .provider
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|provider| provider.retrieve(None))
            .and_then(|value| value.as_str().map(str::to_owned));

        let response = match message {
            Some(message) => GreetingResponse {
                ownership: request.ownership.clone(),
                status: ResponseStatus::Ok,
                message,
            },
            None => GreetingResponse {
                ownership: request.ownership.clone(),
                status: ResponseStatus::Fail,
                message: String::new(),
            },
        };
        self.bus.post(response);
    }
}

impl Listener for GreetingPresenter {
    fn subscriptions(table: &mut Subscriptions<Self>) {
        table.on::<GreetingRequest>(Self::handle_request);
    }
}

impl Presenter for GreetingPresenter {
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
// Factories and UI stand-ins
// ---------------------------------------------------------------------------

struct DemoPresenters {
    bus: Arc<EventBus>,
    providers: Arc<ProviderRegistry>,
}

impl PresenterCreator for DemoPresenters {
    fn create(&self, type_code: i32) -> Option<Arc<dyn Presenter>> {
        match type_code {
            WELCOME_PRESENTER => Some(Arc::new(GreetingPresenter {
                bus: self.bus.clone(),
                providers: self.providers.clone(),
                provider: Mutex::new(None),
            })),
            _ => None,
        }
    }

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        (type_code == WELCOME_PRESENTER).then_some("GreetingPresenter")
    }
}

struct DemoProviders {
    cache: Option<CacheStore>,
}

impl ProviderCreator for DemoProviders {
    fn create(&self, type_code: i32) -> Option<Arc<dyn DataProvider>> {
        match type_code {
            MESSAGE_PROVIDER => Some(Arc::new(GreetingProvider::new(self.cache.clone()))),
            _ => None,
        }
    }

    fn type_name(&self, type_code: i32) -> Option<&'static str> {
        (type_code == MESSAGE_PROVIDER).then_some("GreetingProvider")
    }
}

/// Logs every mounted screen instead of rendering it.
struct ConsoleHost;

impl ScreenHost for ConsoleHost {
    fn mount(&self, screen: &Arc<ScreenLink>) {
        tracing::info!("showing {screen}");
    }
}

/// UI side of the bus: greets out loud when a response lands.
#[derive(Default)]
struct ConsoleListener {
    responses: AtomicUsize,
}

impl Listener for ConsoleListener {
    fn subscriptions(table: &mut Subscriptions<Self>) {
        table.on::<GreetingResponse>(|listener, response| {
            match response.status {
                ResponseStatus::Ok => tracing::info!("greeting arrived: {}", response.message),
                ResponseStatus::Fail => tracing::warn!("no greeting stored yet"),
            }
            listener.responses.fetch_add(1, Ordering::SeqCst);
        });
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "armature=debug,info".parse().expect("valid env filter")),
        )
        .init();

    let cache_dir = std::env::temp_dir().join("armature-welcome");
    let runtime = Runtime::bootstrap(
        RuntimeConfig::default(),
        Box::new(DemoProviders {
            cache: CacheStore::open(&cache_dir),
        }),
        |bus, providers| Box::new(DemoPresenters { bus, providers }),
    );

    let console = Arc::new(ConsoleListener::default());
    runtime.bus().register(console.clone());

    // Screens: welcome is the root, feed sits behind it, settings is a
    // detour with no back link.
    let welcome = ScreenLink::root(WELCOME_SCREEN, "welcome");
    let feed = ScreenLink::with_previous(FEED_SCREEN, "feed", &welcome);
    let settings = ScreenLink::new(SETTINGS_SCREEN, "settings");
    let nav = Navigator::new(
        Arc::new(ConsoleHost),
        vec![welcome.clone(), feed.clone(), settings.clone()],
        &welcome,
    )
    .expect("valid screen set");

    // Settings stays locked until the greeting round trip has happened.
    let unlocked = Arc::new(AtomicBool::new(false));
    let gate = unlocked.clone();
    nav.add_condition(move |_: &Arc<ScreenLink>, to: &Arc<ScreenLink>| {
        if to.tag() == SETTINGS_SCREEN && !gate.load(Ordering::SeqCst) {
            RouteDecision::Veto
        } else {
            RouteDecision::Proceed
        }
    });

    runtime.presenters().request(WELCOME_PRESENTER);

    // Seed the greeting through the shared provider instance, then ask for
    // it over the bus.
    let provider = runtime
        .providers()
        .request(MESSAGE_PROVIDER)
        .expect("provider available");
    provider.save(json!("hello from armature"));
    runtime.providers().release(MESSAGE_PROVIDER);

    runtime.bus().post(GreetingRequest {
        ownership: Ownership::owned_by("demo"),
    });
    for _ in 0..100 {
        if console.responses.load(Ordering::SeqCst) > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    // A short walk: the locked detour bounces, the unlocked one forks at
    // feed, merging returns there, and back lands on the root.
    nav.go_to(&feed);
    nav.go_to(&settings);
    unlocked.store(true, Ordering::SeqCst);
    nav.go_to(&settings);
    nav.merge_branches();
    nav.go_back();

    runtime.presenters().release(WELCOME_PRESENTER);
    runtime.shutdown();
}
