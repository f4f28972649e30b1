//! Subscriber directory: which events a listener type consumes and produces.
//!
//! Listener types declare their interests once in [`Listener::subscriptions`].
//! The directory runs that declaration the first time an instance of the type
//! registers, validates it, and caches the resulting table so later instances
//! of the same type reuse it. Entries live until the type is cleared
//! (unregistering an instance clears its type's entry; live registrations
//! keep their reference to the table and are unaffected).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;

use crate::bus::envelope::{Envelope, Event};

/// A type that consumes events from the bus.
///
/// Registration is per instance, but the subscription table is per type:
/// `subscriptions` is run once for the first registered instance and cached.
pub trait Listener: Send + Sync + 'static {
    /// Declare the events this type handles and produces.
    fn subscriptions(table: &mut Subscriptions<Self>)
    where
        Self: Sized;
}

type Handler<L> = Box<dyn Fn(&L, &(dyn Any + Send + Sync)) + Send + Sync>;
type Producer<L> = Box<dyn Fn(&L) -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Declaration table for one listener type: event handlers keyed by event
/// type, plus zero-argument producers.
///
/// A listener type may declare several handlers for the same event type.
/// Producers are unique per event type; declaring a second one for the same
/// type is a configuration error and panics when the table is first built.
pub struct Subscriptions<L> {
    handlers: HashMap<TypeId, Vec<Handler<L>>>,
    producers: HashMap<TypeId, Producer<L>>,
    event_names: HashMap<TypeId, &'static str>,
}

impl<L: Listener> Subscriptions<L> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            producers: HashMap::new(),
            event_names: HashMap::new(),
        }
    }

    /// Handle events of type `E` with `handler`.
    pub fn on<E: Event>(&mut self, handler: impl Fn(&L, &E) + Send + Sync + 'static) -> &mut Self {
        let erased: Handler<L> = Box::new(move |listener, payload| {
            if let Some(event) = payload.downcast_ref::<E>() {
                handler(listener, event);
            }
        });
        self.handlers.entry(TypeId::of::<E>()).or_default().push(erased);
        self.event_names
            .insert(TypeId::of::<E>(), std::any::type_name::<E>());
        self
    }

    /// Declare a producer for events of type `E`.
    ///
    /// Producers are cached alongside handlers and can be invoked on demand
    /// through [`Subscriptions::run_producer`]; delivery never calls them.
    ///
    /// # Panics
    ///
    /// Panics if a producer for `E` was already declared on this type.
    pub fn produce<E: Event>(
        &mut self,
        producer: impl Fn(&L) -> E + Send + Sync + 'static,
    ) -> &mut Self {
        let erased: Producer<L> =
            Box::new(move |listener| Box::new(producer(listener)) as Box<dyn Any + Send + Sync>);
        if self.producers.insert(TypeId::of::<E>(), erased).is_some() {
            panic!(
                "duplicate producer for {} declared by {}",
                std::any::type_name::<E>(),
                std::any::type_name::<L>()
            );
        }
        self.event_names
            .insert(TypeId::of::<E>(), std::any::type_name::<E>());
        self
    }

    /// Run the producer declared for `event_type`, if any.
    pub fn run_producer(
        &self,
        listener: &L,
        event_type: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        self.producers.get(&event_type).map(|p| p(listener))
    }

    pub fn handler_count(&self, event_type: TypeId) -> usize {
        self.handlers.get(&event_type).map_or(0, Vec::len)
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    /// Distinct cache entries this table holds: one per handled event type
    /// plus one per producer.
    pub fn entry_count(&self) -> usize {
        self.handlers.len() + self.producers.len()
    }

    /// Invoke every handler matching the envelope's event type.
    ///
    /// A panicking handler is caught and logged; it never stops delivery to
    /// the remaining handlers.
    pub(crate) fn dispatch(&self, listener: &L, envelope: &Envelope) {
        let Some(handlers) = self.handlers.get(&envelope.type_id) else {
            return;
        };
        for handler in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                handler(listener, envelope.payload.as_ref())
            }));
            if outcome.is_err() {
                tracing::error!(
                    "handler in {} panicked on {}; continuing delivery",
                    std::any::type_name::<L>(),
                    envelope.type_name
                );
            }
        }
    }
}

struct CachedTable {
    table: Arc<dyn Any + Send + Sync>,
    entry_count: usize,
    type_name: &'static str,
}

/// Per-type cache of built subscription tables.
#[derive(Default)]
pub(crate) struct Directory {
    tables: DashMap<TypeId, CachedTable>,
}

impl Directory {
    /// Fetch the table for `L`, building and caching it on first use.
    ///
    /// Building runs `L::subscriptions`, so configuration errors in the
    /// declaration (duplicate producers) surface here, on first registration.
    pub fn table_for<L: Listener>(&self) -> Arc<Subscriptions<L>> {
        let entry = self.tables.entry(TypeId::of::<L>()).or_insert_with(|| {
            let mut table = Subscriptions::new();
            L::subscriptions(&mut table);
            let entry_count = table.entry_count();
            tracing::debug!(
                "built subscription table for {}: {entry_count} entries",
                std::any::type_name::<L>()
            );
            CachedTable {
                table: Arc::new(table),
                entry_count,
                type_name: std::any::type_name::<L>(),
            }
        });
        entry
            .table
            .clone()
            .downcast::<Subscriptions<L>>()
            .expect("directory cache holds a table of the wrong type")
    }

    /// Drop the cached table for a listener type. Returns the number of
    /// entries freed, 0 when the type was never cached.
    pub fn clear(&self, listener_type: TypeId) -> usize {
        match self.tables.remove(&listener_type) {
            Some((_, cached)) => {
                tracing::debug!(
                    "cleared {} cached subscription entries for {}",
                    cached.entry_count,
                    cached.type_name
                );
                cached.entry_count
            }
            None => 0,
        }
    }
}
