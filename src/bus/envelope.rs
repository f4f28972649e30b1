use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Delivery lane for routable events.
///
/// Each channel is drained by its own dedicated worker, so ordering is
/// guaranteed within a channel but never across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Work events: requests, long-running results.
    Background,
    /// Presentation events: responses the view layer consumes.
    Ui,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Background => "background",
            Channel::Ui => "ui",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A value that can travel on the bus.
///
/// Types opt into delivery by returning a channel. The default is `None`,
/// which makes `post` drop the value silently; only types that explicitly
/// classify themselves are routable.
pub trait Event: Any + Send + Sync {
    /// The lane this event travels on, or `None` for unroutable types.
    fn channel(&self) -> Option<Channel> {
        None
    }
}

/// Correlates a request/response pair with the party that issued it.
///
/// Matching is strict: two anonymous tokens match, a named token only
/// matches the same name, and anonymous never matches named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    owner: Option<String>,
}

impl Ownership {
    /// An unowned token. Matches only other unowned tokens.
    pub fn anonymous() -> Self {
        Self { owner: None }
    }

    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn matches(&self, other: &Ownership) -> bool {
        match (&self.owner, &other.owner) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Outcome carried by response events so failures cross the bus as data
/// instead of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Fail,
}

impl ResponseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }
}

/// An event that asks some component to do work on behalf of an owner.
pub trait RequestEvent: Event {
    fn ownership(&self) -> &Ownership;
}

/// An event produced in answer to a [`RequestEvent`]. Implementations copy
/// the request's ownership so the issuing party can recognise the reply.
pub trait ResponseEvent: Event {
    fn ownership(&self) -> &Ownership;
    fn status(&self) -> ResponseStatus;
}

/// Internal wrapper that carries a posted event through a lane.
///
/// The payload is type-erased once at post time; handlers downcast back to
/// the concrete type declared in their subscription.
#[derive(Clone)]
pub(crate) struct Envelope {
    pub payload: Arc<dyn Any + Send + Sync>,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub posted_at: i64,
    pub channel: Channel,
}

impl Envelope {
    pub fn new<E: Event>(event: E, posted_at: i64, channel: Channel) -> Self {
        Self {
            payload: Arc::new(event),
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            posted_at,
            channel,
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("type_name", &self.type_name)
            .field("posted_at", &self.posted_at)
            .field("channel", &self.channel)
            .finish()
    }
}
