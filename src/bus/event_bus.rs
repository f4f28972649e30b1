use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::bus::directory::{Directory, Listener};
use crate::bus::envelope::{Channel, Envelope, Event};
use crate::bus::lane::{Lane, LaneConfig};

/// Source of envelope timestamps. Swappable so tests can drive logical time.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time in milliseconds since the epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Handle to one bus registration. Returned by [`EventBus::register`];
/// required to unregister, checkpoint, or restore that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token naming a moment in a listener's delivery stream.
///
/// Produced by [`EventBus::checkpoint`], consumed by [`EventBus::restore`].
/// Callers keep it wherever they keep state across a pause/resume cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointToken(String);

impl CheckpointToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CheckpointToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

struct ListenerEntry {
    id: ListenerId,
    type_id: TypeId,
    type_name: &'static str,
    checkpoint: Option<i64>,
    dispatcher: Arc<dyn Fn(&Envelope) + Send + Sync>,
}

struct BusShared {
    listeners: Mutex<Vec<ListenerEntry>>,
    tokens: Mutex<HashMap<String, i64>>,
}

struct Lanes {
    background: Lane,
    ui: Lane,
}

impl Lanes {
    fn for_channel(&self, channel: Channel) -> &Lane {
        match channel {
            Channel::Background => &self.background,
            Channel::Ui => &self.ui,
        }
    }
}

/// Dual-lane publish/subscribe bus with per-listener checkpoint filtering.
///
/// Listeners register per instance and are visible to both lanes; an event
/// reaches a listener when the listener's type declares a handler for it and
/// the envelope's timestamp is not behind the listener's checkpoint.
pub struct EventBus {
    shared: Arc<BusShared>,
    directory: Directory,
    lanes: RwLock<Option<Lanes>>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(LaneConfig::default(), LaneConfig::default())
    }

    pub fn with_config(background: LaneConfig, ui: LaneConfig) -> Self {
        Self::with_clock(background, ui, Arc::new(SystemClock))
    }

    /// Full constructor: lane configs plus an injected clock.
    pub fn with_clock(background: LaneConfig, ui: LaneConfig, clock: Arc<dyn Clock>) -> Self {
        let shared = Arc::new(BusShared {
            listeners: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashMap::new()),
        });

        let lanes = Lanes {
            background: start_lane(Channel::Background, &background, shared.clone()),
            ui: start_lane(Channel::Ui, &ui, shared.clone()),
        };

        Self {
            shared,
            directory: Directory::default(),
            lanes: RwLock::new(Some(lanes)),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Register a listener instance on both lanes.
    ///
    /// The first registration of a type builds its subscription table, so
    /// declaration errors (duplicate producers) panic here. A fresh
    /// registration carries no checkpoint: it sees every event posted from
    /// now on.
    pub fn register<L: Listener>(&self, listener: Arc<L>) -> ListenerId {
        let table = self.directory.table_for::<L>();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let dispatcher: Arc<dyn Fn(&Envelope) + Send + Sync> = Arc::new(move |envelope| {
            table.dispatch(listener.as_ref(), envelope);
        });

        let mut listeners = self.shared.listeners.lock().expect("bus listener table poisoned");
        listeners.push(ListenerEntry {
            id,
            type_id: TypeId::of::<L>(),
            type_name: std::any::type_name::<L>(),
            checkpoint: None,
            dispatcher,
        });
        tracing::debug!("registered {} (listener {id})", std::any::type_name::<L>());
        id
    }

    /// Remove a registration and purge its type's directory cache entry.
    /// Saved checkpoint tokens survive. Unknown ids are a no-op.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = {
            let mut listeners = self.shared.listeners.lock().expect("bus listener table poisoned");
            let Some(index) = listeners.iter().position(|entry| entry.id == id) else {
                return false;
            };
            listeners.remove(index)
        };
        let freed = self.directory.clear(removed.type_id);
        tracing::debug!(
            "unregistered {} (listener {id}), freed {freed} directory entries",
            removed.type_name
        );
        true
    }

    pub fn is_registered(&self, id: ListenerId) -> bool {
        let listeners = self.shared.listeners.lock().expect("bus listener table poisoned");
        listeners.iter().any(|entry| entry.id == id)
    }

    /// Post an event. Unclassified events (`channel() == None`) are dropped.
    ///
    /// Enqueues and returns; delivery happens on the lane's worker thread.
    /// With [`OverflowPolicy::Block`](crate::bus::OverflowPolicy::Block) this
    /// call waits while the lane is full.
    pub fn post<E: Event>(&self, event: E) {
        let Some(channel) = event.channel() else {
            tracing::debug!(
                "event {} has no channel; dropped",
                std::any::type_name::<E>()
            );
            return;
        };

        let envelope = Envelope::new(event, self.clock.now_millis(), channel);
        let lanes = self.lanes.read().expect("bus lane table poisoned");
        match lanes.as_ref() {
            Some(lanes) => lanes.for_channel(channel).post(envelope),
            None => tracing::warn!(
                "event bus is shut down; dropping {}",
                envelope.type_name
            ),
        }
    }

    /// Record the listener's position in time and hand back a token for it.
    ///
    /// After a later `register` + [`restore`](Self::restore), events stamped
    /// before this moment are suppressed for that listener. Tokens are
    /// retained for the life of the bus.
    pub fn checkpoint(&self, id: ListenerId) -> CheckpointToken {
        let now = self.clock.now_millis();
        let token = format!("{id}${now}${}", Uuid::new_v4().simple());
        self.shared
            .tokens
            .lock()
            .expect("bus token map poisoned")
            .insert(token.clone(), now);
        tracing::debug!("checkpoint for listener {id} at {now}");
        CheckpointToken(token)
    }

    /// Apply a saved checkpoint to a (typically re-registered) listener.
    ///
    /// Returns `false` when the token was never issued by this bus or the
    /// listener id is not currently registered.
    pub fn restore(&self, id: ListenerId, token: &CheckpointToken) -> bool {
        let timestamp = {
            let tokens = self.shared.tokens.lock().expect("bus token map poisoned");
            tokens.get(token.as_str()).copied()
        };
        let Some(timestamp) = timestamp else {
            tracing::debug!("restore with unknown checkpoint token for listener {id}");
            return false;
        };

        let mut listeners = self.shared.listeners.lock().expect("bus listener table poisoned");
        match listeners.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.checkpoint = Some(timestamp);
                tracing::debug!("restored listener {id} to checkpoint {timestamp}");
                true
            }
            None => {
                tracing::debug!("restore for unregistered listener {id}");
                false
            }
        }
    }

    /// Drop the cached subscription table for a listener type. Returns the
    /// number of entries freed.
    pub fn clear_subscriptions<L: Listener>(&self) -> usize {
        self.directory.clear(TypeId::of::<L>())
    }

    /// Close both lanes and join their workers. Queued envelopes are drained
    /// first. Posting afterwards logs a warning and drops the event.
    pub fn shutdown(&self) {
        let lanes = self.lanes.write().expect("bus lane table poisoned").take();
        if let Some(lanes) = lanes {
            lanes.background.stop();
            lanes.ui.stop();
            tracing::debug!("event bus stopped");
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn start_lane(channel: Channel, config: &LaneConfig, shared: Arc<BusShared>) -> Lane {
    Lane::start(channel, config, move |envelope| {
        deliver(&shared, envelope);
    })
}

/// Deliver one envelope to every currently registered listener.
///
/// The listener set is snapshotted first so handlers run without the table
/// lock held; each listener's registration and checkpoint are re-read just
/// before its dispatch so unregistration and restore take effect mid-stream.
fn deliver(shared: &BusShared, envelope: &Envelope) {
    let snapshot: Vec<(ListenerId, Arc<dyn Fn(&Envelope) + Send + Sync>)> = {
        let listeners = shared.listeners.lock().expect("bus listener table poisoned");
        listeners
            .iter()
            .map(|entry| (entry.id, entry.dispatcher.clone()))
            .collect()
    };

    for (id, dispatcher) in snapshot {
        let current = {
            let listeners = shared.listeners.lock().expect("bus listener table poisoned");
            listeners
                .iter()
                .find(|entry| entry.id == id)
                .map(|entry| entry.checkpoint)
        };
        let Some(checkpoint) = current else {
            tracing::trace!("listener {id} unregistered before delivery; skipped");
            continue;
        };
        if let Some(threshold) = checkpoint {
            if envelope.posted_at < threshold {
                tracing::trace!(
                    "{} at {} suppressed by checkpoint {threshold} for listener {id}",
                    envelope.type_name,
                    envelope.posted_at
                );
                continue;
            }
        }
        dispatcher(envelope);
    }
}
