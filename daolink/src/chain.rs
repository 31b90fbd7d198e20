//! Fan-out of chain block notifications.
//!
//! The node-side subscription is a shared resource: we hold exactly one physical subscription per
//! trigger granularity and fan its notifications out to any number of logical subscribers (watch
//! queries) over a broadcast channel.

use tokio::{
    sync::{broadcast, mpsc::UnboundedReceiver},
    task::JoinHandle,
};
use tracing::trace;

use crate::crypto::BlockRef;

/// Blocks arrive every few seconds and watches drain eagerly, so a small backlog suffices. A
/// lagged watch skips straight to the newest trigger, which is exactly the coalescing we want.
const FANOUT_CAPACITY: usize = 64;

/// Forwards one physical block subscription to many logical subscribers.
#[derive(Debug)]
pub struct BlockFanout {
    sender: broadcast::Sender<BlockRef>,
    forwarder: JoinHandle<()>,
}

impl BlockFanout {
    /// Spawn a forwarder draining `source` into a broadcast channel. The forwarder stops when the
    /// physical subscription closes.
    pub fn spawn(mut source: UnboundedReceiver<BlockRef>) -> BlockFanout {
        let (sender, _) = broadcast::channel(FANOUT_CAPACITY);
        let fanout_sender = sender.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(block) = source.recv().await {
                trace!(%block, "block trigger");
                // No receivers just means no watch is currently live.
                let _ = fanout_sender.send(block);
            }
        });
        BlockFanout { sender, forwarder }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockRef> {
        self.sender.subscribe()
    }
}

impl Drop for BlockFanout {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}
