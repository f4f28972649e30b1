//! Delivery lanes: one bounded queue and one dedicated worker per channel.
//!
//! Posting only enqueues; the worker thread owns delivery. Within a lane,
//! envelopes are handed to listeners in post order. What happens when a lane
//! fills up is explicit configuration:
//! - [`OverflowPolicy::DropOldest`]: a ring buffer overwrites the oldest
//!   undelivered envelopes and the worker logs how many were lost.
//! - [`OverflowPolicy::Block`]: producers wait for space. A handler that
//!   posts to its own full lane will deadlock under this policy, and posting
//!   must happen from ordinary threads, not async tasks.

use std::thread::{self, JoinHandle};

use tokio::sync::broadcast;
use tokio::sync::mpsc;

use crate::bus::envelope::{Channel, Envelope};

/// Default per-lane queue capacity.
const LANE_CAPACITY: usize = 1024;

/// What a lane does with new envelopes once its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Overwrite the oldest undelivered envelopes. Posting never blocks.
    DropOldest,
    /// Make posters wait until the worker frees space.
    Block,
}

/// Capacity and overflow behaviour for one lane.
#[derive(Debug, Clone, Copy)]
pub struct LaneConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            capacity: LANE_CAPACITY,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

enum LaneSender {
    Ring(broadcast::Sender<Envelope>),
    Bounded(mpsc::Sender<Envelope>),
}

enum LaneReceiver {
    Ring(broadcast::Receiver<Envelope>),
    Bounded(mpsc::Receiver<Envelope>),
}

/// One delivery lane: the queue plus the worker draining it.
pub(crate) struct Lane {
    channel: Channel,
    sender: LaneSender,
    worker: Option<JoinHandle<()>>,
}

impl Lane {
    /// Build the queue for `config` and spawn the worker thread.
    ///
    /// `deliver` runs on the worker for every envelope, in post order.
    pub fn start<D>(channel: Channel, config: &LaneConfig, deliver: D) -> Self
    where
        D: Fn(&Envelope) + Send + 'static,
    {
        let capacity = config.capacity.max(1);
        let (sender, receiver) = match config.overflow {
            OverflowPolicy::DropOldest => {
                let (tx, rx) = broadcast::channel(capacity);
                (LaneSender::Ring(tx), LaneReceiver::Ring(rx))
            }
            OverflowPolicy::Block => {
                let (tx, rx) = mpsc::channel(capacity);
                (LaneSender::Bounded(tx), LaneReceiver::Bounded(rx))
            }
        };

        let worker = thread::Builder::new()
            .name(format!("bus-{}", channel.label()))
            .spawn(move || drain(channel, receiver, deliver))
            .expect("failed to spawn bus lane worker");

        Self {
            channel,
            sender,
            worker: Some(worker),
        }
    }

    /// Enqueue an envelope according to the lane's overflow policy.
    pub fn post(&self, envelope: Envelope) {
        match &self.sender {
            LaneSender::Ring(tx) => {
                if tx.send(envelope).is_err() {
                    tracing::warn!("{} lane has no worker; event dropped", self.channel);
                }
            }
            LaneSender::Bounded(tx) => {
                if tx.blocking_send(envelope).is_err() {
                    tracing::warn!("{} lane has no worker; event dropped", self.channel);
                }
            }
        }
    }

    /// Close the queue and wait for the worker to drain what is left.
    pub fn stop(mut self) {
        drop(self.sender);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("{} lane worker terminated abnormally", self.channel);
            }
        }
    }
}

fn drain<D: Fn(&Envelope)>(channel: Channel, receiver: LaneReceiver, deliver: D) {
    match receiver {
        LaneReceiver::Ring(mut rx) => loop {
            match rx.blocking_recv() {
                Ok(envelope) => deliver(&envelope),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("{channel} lane lagged, dropped {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        },
        LaneReceiver::Bounded(mut rx) => {
            while let Some(envelope) = rx.blocking_recv() {
                deliver(&envelope);
            }
        }
    }
    tracing::debug!("{channel} lane worker stopped");
}
