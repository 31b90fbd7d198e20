//! The transaction channel: submit a contract call and track it to finality.
//!
//! Each submission owns a single-producer/multi-consumer broadcast stream of [`TxStatus`] events,
//! so the status notifier and the orchestration layer consume the same lifecycle independently.
//! The stream is cold: the driver waits until a consumer first asks for events (or
//! [`TxProgress::begin`] is called), then signs, broadcasts and follows chain feedback until a
//! terminal status.
//!
//! Per-stream ordering is Ready → Broadcasting → [BestBlockIncluded] → terminal, with one
//! documented exception: a reorg may regress an included transaction to Retracted/Dropped before
//! a later inclusion or terminal status. Whatever the node delivers, the channel normalizes its
//! feedback so that exactly one terminal status is emitted.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::{
    connector::{ChainConnector, ChainTxEvent, ExtrinsicPayload, Signer},
    contract::{Arg, ContractHandle},
    crypto::{Address, BlockRef},
    error::ClientError,
};

/// One write contract call, constructed per user action.
#[derive(Clone, Debug)]
pub struct TxRequest {
    pub contract: ContractHandle,
    pub function: String,
    pub args: Vec<Arg>,
    pub sender: Address,
}

/// The point a transaction has reached in its lifecycle. Exactly one status is current per
/// in-flight transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TxStatus {
    Ready,
    Broadcasting,
    BroadcastFailed { reason: String },
    BestBlockIncluded { block: BlockRef },
    Finalized { block: BlockRef },
    FinalizationFailed { reason: String },
    Invalid { reason: String },
    Dropped,
    Retracted,
}

impl TxStatus {
    /// Terminal statuses end the stream. Dropped/Retracted are not terminal: a dropped or
    /// retracted transaction may still be re-included until the chain settles the matter.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Finalized { .. }
                | TxStatus::FinalizationFailed { .. }
                | TxStatus::Invalid { .. }
                | TxStatus::BroadcastFailed { .. }
        )
    }

    pub fn is_settling(&self) -> bool {
        !self.is_terminal()
    }

    /// The failure this status represents, if it is a failed terminal.
    pub fn as_failure(&self) -> Option<ClientError> {
        match self {
            TxStatus::BroadcastFailed { reason } => {
                Some(ClientError::BroadcastFailed(reason.clone()))
            }
            TxStatus::FinalizationFailed { reason } => {
                Some(ClientError::FinalizationFailed(reason.clone()))
            }
            TxStatus::Invalid { reason } => Some(ClientError::Invalid(reason.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Ready => write!(f, "ready"),
            TxStatus::Broadcasting => write!(f, "broadcasting"),
            TxStatus::BroadcastFailed { reason } => write!(f, "broadcast failed: {reason}"),
            TxStatus::BestBlockIncluded { block } => write!(f, "included in best block {block}"),
            TxStatus::Finalized { block } => write!(f, "finalized in block {block}"),
            TxStatus::FinalizationFailed { reason } => write!(f, "finalization failed: {reason}"),
            TxStatus::Invalid { reason } => write!(f, "invalid: {reason}"),
            TxStatus::Dropped => write!(f, "dropped"),
            TxStatus::Retracted => write!(f, "retracted"),
        }
    }
}

/// A consumer of one submission's status stream. Ends (returns `None`) after the terminal status.
#[derive(Debug)]
pub struct StatusStream {
    receiver: broadcast::Receiver<TxStatus>,
    finished: bool,
}

impl StatusStream {
    pub(crate) fn from_receiver(receiver: broadcast::Receiver<TxStatus>) -> StatusStream {
        StatusStream {
            receiver,
            finished: false,
        }
    }

    /// Adapt into a [`futures::Stream`] that ends after the terminal status.
    pub fn into_stream(self) -> impl futures::Stream<Item = TxStatus> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.recv().await.map(|status| (status, stream))
        })
    }

    pub async fn recv(&mut self) -> Option<TxStatus> {
        if self.finished {
            return None;
        }
        loop {
            match self.receiver.recv().await {
                Ok(status) => {
                    if status.is_terminal() {
                        self.finished = true;
                    }
                    return Some(status);
                }
                // A slow consumer that lagged just skips to newer statuses; the stream is short
                // enough that this only happens under pathological backpressure.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

/// The handle to one in-flight submission.
#[derive(Debug)]
pub struct TxProgress {
    sender: broadcast::Sender<TxStatus>,
    events: StatusStream,
    start: Option<oneshot::Sender<()>>,
    inclusion_window: Duration,
}

impl TxProgress {
    /// Attach another consumer. Subscribe before driving the stream, otherwise early statuses
    /// are missed.
    pub fn subscribe(&self) -> StatusStream {
        StatusStream {
            receiver: self.sender.subscribe(),
            finished: false,
        }
    }

    /// Request execution. Until this (or the first [`recv`](Self::recv)) the stream is cold and
    /// nothing has been signed or broadcast.
    pub fn begin(&mut self) {
        if let Some(start) = self.start.take() {
            let _ = start.send(());
        }
    }

    /// The next status, driving the stream on first call. `None` once terminal.
    pub async fn recv(&mut self) -> Option<TxStatus> {
        self.begin();
        self.events.recv().await
    }

    /// Wait until the transaction is included in a best block (or finalized directly), with the
    /// configured policy window per status step ([`crate::cfg::Config::inclusion_timeout`]).
    /// Elapsing the window reports [`ClientError::InclusionTimeout`] without cancelling the
    /// stream; the caller may keep consuming.
    pub async fn wait_for_inclusion(&mut self) -> Result<BlockRef, ClientError> {
        self.wait_for_inclusion_within(self.inclusion_window).await
    }

    /// [`wait_for_inclusion`](Self::wait_for_inclusion) with an explicit window.
    pub async fn wait_for_inclusion_within(
        &mut self,
        window: Duration,
    ) -> Result<BlockRef, ClientError> {
        loop {
            match tokio::time::timeout(window, self.recv()).await {
                Err(_) => return Err(ClientError::InclusionTimeout),
                Ok(None) => {
                    return Err(ClientError::BroadcastFailed(
                        "status stream ended unexpectedly".to_owned(),
                    ));
                }
                Ok(Some(TxStatus::BestBlockIncluded { block })) => return Ok(block),
                Ok(Some(TxStatus::Finalized { block })) => return Ok(block),
                Ok(Some(status)) => match status.as_failure() {
                    Some(failure) => return Err(failure),
                    None => continue,
                },
            }
        }
    }

    /// Drive the stream to its terminal status and return it.
    pub async fn wait_for_terminal(&mut self) -> Option<TxStatus> {
        let mut last = None;
        while let Some(status) = self.recv().await {
            last = Some(status);
        }
        last
    }
}

impl Drop for TxProgress {
    fn drop(&mut self) {
        // Dropping an undriven submission cancels it before anything was signed; the driver sees
        // the closed start channel and exits without side effects.
        self.start.take();
    }
}

/// Validate, encode and stage a submission. Fails fast with `InvalidArgument`/`EncodingError`
/// before anything leaves the process; all later failures surface in-stream as statuses.
pub fn submit(
    connector: Arc<dyn ChainConnector>,
    signer: Arc<dyn Signer>,
    request: TxRequest,
    capacity: usize,
    inclusion_window: Duration,
) -> Result<TxProgress, ClientError> {
    let meta = request
        .contract
        .validate_call(&request.function, &request.args)?;
    if !meta.mutates {
        return Err(ClientError::invalid_argument(
            &request.function,
            "read-only function; use the query channel",
        ));
    }
    let data = connector.encode_call(&request.contract, meta, &request.args)?;
    let payload = ExtrinsicPayload {
        contract: request.contract.address,
        data,
    };

    let (sender, receiver) = broadcast::channel(capacity);
    let (start_tx, start_rx) = oneshot::channel();

    let driver_sender = sender.clone();
    tokio::spawn(async move {
        // Cold until a consumer requests execution. A dropped handle cancels outright.
        if start_rx.await.is_err() {
            return;
        }
        drive(connector, signer, request, payload, driver_sender).await;
    });

    Ok(TxProgress {
        sender,
        events: StatusStream {
            receiver,
            finished: false,
        },
        start: Some(start_tx),
        inclusion_window,
    })
}

/// Emit to every live consumer. A torn-down consumer is not an error; statuses for it are
/// silently dropped.
fn emit(sender: &broadcast::Sender<TxStatus>, status: TxStatus) {
    debug!(%status, "tx status");
    let _ = sender.send(status);
}

async fn drive(
    connector: Arc<dyn ChainConnector>,
    signer: Arc<dyn Signer>,
    request: TxRequest,
    payload: ExtrinsicPayload,
    sender: broadcast::Sender<TxStatus>,
) {
    emit(&sender, TxStatus::Ready);

    let signed = match signer.sign(payload, request.sender).await {
        Ok(signed) => signed,
        Err(e) => {
            emit(&sender, TxStatus::BroadcastFailed {
                reason: e.to_string(),
            });
            return;
        }
    };

    let mut feedback = match connector.submit_extrinsic(signed).await {
        Ok(feedback) => feedback,
        Err(e) => {
            emit(&sender, TxStatus::BroadcastFailed {
                reason: e.to_string(),
            });
            return;
        }
    };

    emit(&sender, TxStatus::Broadcasting);

    // Whether the transaction is currently sitting in a best block. A retraction flips this back,
    // and a later re-inclusion emits BestBlockIncluded again.
    let mut in_best_block = false;

    while let Some(event) = feedback.recv().await {
        match event {
            ChainTxEvent::InBlock(block) => {
                in_best_block = true;
                emit(&sender, TxStatus::BestBlockIncluded { block });
            }
            ChainTxEvent::Retracted => {
                // A retraction for a transaction we never saw included is node noise.
                if in_best_block {
                    in_best_block = false;
                    emit(&sender, TxStatus::Retracted);
                }
            }
            ChainTxEvent::Dropped => {
                in_best_block = false;
                emit(&sender, TxStatus::Dropped);
            }
            ChainTxEvent::Invalid(reason) => {
                emit(&sender, TxStatus::Invalid { reason });
                return;
            }
            ChainTxEvent::FinalizationFailed(reason) => {
                emit(&sender, TxStatus::FinalizationFailed { reason });
                return;
            }
            ChainTxEvent::Finalized(block) => {
                emit(&sender, TxStatus::Finalized { block });
                return;
            }
        }
    }

    // The node's feedback stream closed without a verdict. Normalize to a failed terminal so
    // every stream ends in exactly one terminal status.
    warn!(function = %request.function, "chain feedback closed before finality");
    emit(&sender, TxStatus::FinalizationFailed {
        reason: "chain feedback stream closed before finality".to_owned(),
    });
}

/// A per-action write channel with a settling guard: while a previous submission for this action
/// has not reached best-block inclusion (or failed), re-triggering is refused. Distinct actions
/// hold distinct channels and never serialize against each other.
pub struct TxChannel {
    connector: Arc<dyn ChainConnector>,
    signer: Arc<dyn Signer>,
    contract: ContractHandle,
    function: &'static str,
    capacity: usize,
    inclusion_window: Duration,
    settling: Arc<AtomicBool>,
}

impl TxChannel {
    pub fn new(
        connector: Arc<dyn ChainConnector>,
        signer: Arc<dyn Signer>,
        contract: ContractHandle,
        function: &'static str,
        capacity: usize,
        inclusion_window: Duration,
    ) -> TxChannel {
        TxChannel {
            connector,
            signer,
            contract,
            function,
            capacity,
            inclusion_window,
            settling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a previous submission is between sign-off and best-block inclusion. The UI
    /// disables the action button on this.
    pub fn in_best_block_progress(&self) -> bool {
        self.settling.load(Ordering::SeqCst)
    }

    pub fn submit(&self, args: Vec<Arg>, sender: Address) -> Result<TxProgress, ClientError> {
        if self.settling.swap(true, Ordering::SeqCst) {
            return Err(ClientError::ActionInFlight(self.function));
        }

        let request = TxRequest {
            contract: self.contract.clone(),
            function: self.function.to_owned(),
            args,
            sender,
        };
        let progress = match submit(
            self.connector.clone(),
            self.signer.clone(),
            request,
            self.capacity,
            self.inclusion_window,
        ) {
            Ok(progress) => progress,
            Err(e) => {
                self.settling.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        // Clear the guard at the best-block boundary or on any terminal status, whichever comes
        // first. The watcher holds its own subscription so it observes the stream regardless of
        // what the caller does with theirs.
        let mut stream = progress.subscribe();
        let settling = self.settling.clone();
        tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Some(TxStatus::BestBlockIncluded { .. }) | None => break,
                    Some(status) if status.is_terminal() => break,
                    Some(_) => continue,
                }
            }
            settling.store(false, Ordering::SeqCst);
        });

        Ok(progress)
    }
}
