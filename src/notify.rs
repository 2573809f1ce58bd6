use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{AllocationEvent, Pk};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for allocation changes, one channel per application round.
pub struct RefreshHub {
    channels: DashMap<Pk, broadcast::Sender<AllocationEvent>>,
}

impl Default for RefreshHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes in a round. Creates the channel if needed.
    pub fn subscribe(&self, application_round_pk: Pk) -> broadcast::Receiver<AllocationEvent> {
        let sender = self
            .channels
            .entry(application_round_pk)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a change to the round's sessions and return how many
    /// received it. A round whose listeners are all gone loses its channel.
    pub fn send(&self, application_round_pk: Pk, event: &AllocationEvent) -> usize {
        let delivered = match self.channels.get(&application_round_pk) {
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => return 0,
        };
        if delivered == 0 {
            self.channels
                .remove_if(&application_round_pk, |_, sender| sender.receiver_count() == 0);
        }
        debug!("round {application_round_pk}: event from {} reached {delivered} sessions", event.origin());
        delivered
    }

    /// Close a round's channel; its listeners see the channel close and exit.
    pub fn close_round(&self, application_round_pk: Pk) {
        self.channels.remove(&application_round_pk);
    }
}
