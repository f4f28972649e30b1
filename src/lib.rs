//! Event-driven application runtime.
//!
//! Armature wires up the plumbing an interactive application needs before
//! any feature code exists:
//! - Event distribution between loosely coupled components
//! - Reference-counted component lifecycles
//! - Screen navigation with pluggable routing rules
//! - A small persistent cache for provider state
//!
//! # Architecture
//!
//! The crate is organized into four modules:
//! - `bus`: dual-lane event bus with typed subscriber tables, timestamp
//!   checkpoints, and save/restore tokens
//! - `registry`: reference-counted registries for presenters and data
//!   providers
//! - `nav`: screen navigation state machine with veto/redirect conditions
//!   and single-level forks
//! - `cache`: file-backed JSON store data providers layer under their
//!   in-memory state
//!
//! Presenters subscribe to request events on the bus and post responses;
//! data providers hold the state presenters read; the navigator decides
//! which screen is active, which in turn drives which presenters get
//! requested. [`Runtime`] owns one of each registry plus the bus and tears
//! them down in order.

pub mod bus;
pub mod cache;
pub mod nav;
pub mod registry;

use std::sync::Arc;

pub use bus::{
    Channel, CheckpointToken, Event, EventBus, LaneConfig, Listener, ListenerId, OverflowPolicy,
    Ownership, RequestEvent, ResponseEvent, ResponseStatus, Subscriptions,
};
pub use cache::CacheStore;
pub use nav::{
    NavError, NavigationCondition, Navigator, RouteDecision, ScreenHost, ScreenLink, Transition,
};
pub use registry::{
    ComponentRegistry, DataProvider, Family, Presenter, PresenterCreator, PresenterRegistry,
    ProviderCreator, ProviderRegistry, WatcherId, Watchers,
};

// ---------------------------------------------------------------------------
// Runtime assembly
// ---------------------------------------------------------------------------

/// Lane sizing for the two bus channels.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub background_lane: LaneConfig,
    pub ui_lane: LaneConfig,
}

/// The assembled runtime: one bus, one presenter registry, one provider
/// registry.
pub struct Runtime {
    bus: Arc<EventBus>,
    presenters: Arc<PresenterRegistry>,
    providers: Arc<ProviderRegistry>,
}

impl Runtime {
    pub fn new(
        bus: Arc<EventBus>,
        presenters: Arc<PresenterRegistry>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            bus,
            presenters,
            providers,
        }
    }

    /// Builds the bus and both registries. The presenter creator is built
    /// last so it can hold handles to both.
    pub fn bootstrap(
        config: RuntimeConfig,
        provider_creator: Box<dyn ProviderCreator>,
        presenter_creator: impl FnOnce(Arc<EventBus>, Arc<ProviderRegistry>) -> Box<dyn PresenterCreator>,
    ) -> Self {
        let bus = Arc::new(EventBus::with_config(
            config.background_lane,
            config.ui_lane,
        ));
        let providers = Arc::new(ProviderRegistry::new(provider_creator));
        let presenters = Arc::new(PresenterRegistry::new(
            bus.clone(),
            presenter_creator(bus.clone(), providers.clone()),
        ));
        Self::new(bus, presenters, providers)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn presenters(&self) -> &Arc<PresenterRegistry> {
        &self.presenters
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Detaches every live component, then stops the bus lanes. Events
    /// posted afterwards are dropped.
    pub fn shutdown(&self) {
        self.presenters.purge();
        self.providers.purge();
        self.bus.shutdown();
        tracing::info!("runtime stopped");
    }
}
