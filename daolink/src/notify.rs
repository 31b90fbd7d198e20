//! The status notifier: user-visible feedback for one transaction submission.
//!
//! Exactly one notifier is spawned per submission. It owns its own subscription to the status
//! stream, so concurrent submissions never share or disturb each other's feedback. Display state
//! is refreshed optimistically at best-block inclusion rather than at finality; a reorg may
//! briefly revert what the user sees, and the next watch emission corrects it. This trade-off is
//! deliberate and must not be silently changed to finality-only.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    error::ClientError,
    tx::{StatusStream, TxStatus},
};

/// A user-visible feedback message. `is_settling` stays true while the transaction is
/// non-terminal, so the UI can keep a spinner up.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Notification {
    pub message: String,
    pub is_settling: bool,
}

/// Where notifications go. The hosting UI implements this once; tests record into a vec.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// The message shown for one status transition.
pub fn notification_for(status: &TxStatus) -> Notification {
    let message = match status {
        TxStatus::Ready => "Signing transaction...".to_owned(),
        TxStatus::Broadcasting => "Broadcasting transaction...".to_owned(),
        TxStatus::BestBlockIncluded { block } => {
            format!("Included in block {block}, awaiting finality...")
        }
        TxStatus::Finalized { block } => format!("Transaction finalized in block {block}"),
        TxStatus::BroadcastFailed { reason } => format!("Transaction failed: {reason}"),
        TxStatus::FinalizationFailed { reason } => format!("Transaction failed: {reason}"),
        TxStatus::Invalid { reason } => format!("Transaction invalid: {reason}"),
        TxStatus::Dropped => "Transaction dropped, watching for re-inclusion...".to_owned(),
        TxStatus::Retracted => "Block retracted by a reorg, awaiting re-inclusion...".to_owned(),
    };
    Notification {
        message,
        is_settling: status.is_settling(),
    }
}

/// Surface a failure that happened before anything was submitted, through the same channel as
/// in-flight statuses.
pub fn notify_failure(sink: &dyn NotificationSink, error: &ClientError) {
    sink.notify(Notification {
        message: format!("Transaction failed: {error}"),
        is_settling: false,
    });
}

/// Spawn the notifier for one submission. Consumes `stream` until its terminal status, mapping
/// every transition to a notification. The caller-supplied `refresh` hook fires at most once, at
/// the first best-block inclusion (or directly at finality if inclusion was never observed).
pub fn spawn_notifier(
    mut stream: StatusStream,
    sink: Arc<dyn NotificationSink>,
    refresh: Option<Box<dyn Fn() + Send>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut refreshed = false;
        while let Some(status) = stream.recv().await {
            if !refreshed
                && matches!(
                    status,
                    TxStatus::BestBlockIncluded { .. } | TxStatus::Finalized { .. }
                )
            {
                refreshed = true;
                if let Some(refresh) = &refresh {
                    debug!(%status, "refreshing displayed state");
                    refresh();
                }
            }
            sink.notify(notification_for(&status));
            if status.is_terminal() {
                break;
            }
        }
    })
}
