//! Dual-lane event system decoupling screens from business logic.
//!
//! The event bus provides:
//! - Publish-subscribe delivery over two serialized lanes (background, UI)
//! - Typed handler dispatch from per-type subscription tables
//! - Checkpoint tokens that suppress already-seen events across a
//!   pause/resume cycle
//!
//! # Architecture
//!
//! Events flow from posters → lane queue → lane worker → listeners:
//! - `EventBus`: registration, routing, checkpoints
//! - `Lane`: one bounded queue drained by one dedicated worker thread,
//!   so delivery within a lane is strictly ordered
//! - `Directory`/`Subscriptions`: which handlers a listener type declared,
//!   built once per type and cached
//!
//! Presenters subscribe to request events on the background lane and post
//! response events on the UI lane; view-side listeners consume the responses.

mod directory;
mod envelope;
mod event_bus;
mod lane;

pub use directory::{Listener, Subscriptions};
pub use envelope::{Channel, Event, Ownership, RequestEvent, ResponseEvent, ResponseStatus};
pub use event_bus::{CheckpointToken, Clock, EventBus, ListenerId, SystemClock};
pub use lane::{LaneConfig, OverflowPolicy};
