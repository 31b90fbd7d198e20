//! The query channel: one-shot contract reads and live watch subscriptions.
//!
//! A watch layers re-fetching on top of [`query`]: a loading placeholder, an immediate initial
//! fetch, then one re-fetch per chain-state trigger. At most one fetch is ever in flight per subscription; triggers that
//! arrive mid-fetch coalesce into a single re-fetch, so the subscriber always converges on the
//! result of the most recent trigger and a superseded fetch can never overwrite a newer one.

use std::sync::Arc;

use serde_json::Value;
use tokio::{
    sync::{Notify, broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace};

use crate::{
    connector::ChainConnector,
    contract::{Arg, ContractHandle},
    crypto::BlockRef,
    error::ClientError,
};

/// One read-only contract call. The identity key for watch deduplication: two specs are equal iff
/// they target the same contract instance, function and arguments under the same session.
#[derive(Clone, Debug)]
pub struct QuerySpec {
    pub contract: ContractHandle,
    pub function: String,
    pub args: Vec<Arg>,
}

impl PartialEq for QuerySpec {
    fn eq(&self, other: &Self) -> bool {
        self.contract.id == other.contract.id
            && self.contract.network == other.contract.network
            && self.contract.address == other.contract.address
            && self.contract.session == other.contract.session
            && self.function == other.function
            && self.args == other.args
    }
}

impl Eq for QuerySpec {}

impl std::hash::Hash for QuerySpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.contract.id.hash(state);
        self.contract.network.hash(state);
        self.contract.address.hash(state);
        self.contract.session.hash(state);
        self.function.hash(state);
        self.args.hash(state);
    }
}

/// One snapshot produced by a query invocation. Loading snapshots carry no value, so consumers
/// render a neutral placeholder rather than stale data.
#[derive(Clone, Debug)]
pub struct QueryResult<T> {
    pub value: Option<T>,
    pub is_loading: bool,
    pub error: Option<ClientError>,
}

impl<T> QueryResult<T> {
    pub fn loading() -> QueryResult<T> {
        QueryResult {
            value: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn ready(value: T) -> QueryResult<T> {
        QueryResult {
            value: Some(value),
            is_loading: false,
            error: None,
        }
    }

    pub fn failed(error: ClientError) -> QueryResult<T> {
        QueryResult {
            value: None,
            is_loading: false,
            error: Some(error),
        }
    }
}

impl QueryResult<Value> {
    /// Reinterpret a dynamic reply as a concrete type. A shape mismatch becomes a
    /// `DecodingError` on the result, like any other decode failure.
    pub fn decode<T: serde::de::DeserializeOwned>(self, function: &str) -> QueryResult<T> {
        match self.value {
            Some(value) => match serde_json::from_value(value) {
                Ok(typed) => QueryResult {
                    value: Some(typed),
                    is_loading: self.is_loading,
                    error: self.error,
                },
                Err(e) => QueryResult::failed(ClientError::decoding(function, e.to_string())),
            },
            None => QueryResult {
                value: None,
                is_loading: self.is_loading,
                error: self.error,
            },
        }
    }
}

async fn run(connector: &dyn ChainConnector, spec: &QuerySpec) -> Result<Value, ClientError> {
    let meta = spec.contract.validate_call(&spec.function, &spec.args)?;
    if meta.mutates {
        return Err(ClientError::invalid_argument(
            &spec.function,
            "not a read-only function; use the transaction channel",
        ));
    }
    let data = connector.encode_call(&spec.contract, meta, &spec.args)?;
    let reply = connector
        .dispatch_read_call(spec.contract.address, data)
        .await?;
    connector.decode_reply(&spec.contract, meta, &reply)
}

/// A single asynchronous fetch: validate locally, encode, dispatch the read call, decode.
/// Argument mismatches fail before any network interaction.
pub async fn query(connector: &dyn ChainConnector, spec: &QuerySpec) -> QueryResult<Value> {
    match run(connector, spec).await {
        Ok(value) => QueryResult::ready(value),
        Err(error) => {
            debug!(function = %spec.function, %error, "query failed");
            QueryResult::failed(error)
        }
    }
}

/// A clonable handle that re-fires a watch on demand, independent of block triggers. Used by the
/// status notifier to refresh displayed state at transaction inclusion.
#[derive(Clone, Debug)]
pub struct Refresher {
    notify: Arc<Notify>,
}

impl Refresher {
    pub fn poke(&self) {
        self.notify.notify_one();
    }
}

/// A live watch subscription. Dropping the handle tears the watch down; [`WatchHandle::unsubscribe`]
/// does so deterministically, returning only once the task has stopped.
#[derive(Debug)]
pub struct WatchHandle {
    spec: QuerySpec,
    results: mpsc::UnboundedReceiver<QueryResult<Value>>,
    refresher: Refresher,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// The next result snapshot. `None` once the watch has stopped.
    pub async fn recv(&mut self) -> Option<QueryResult<Value>> {
        self.results.recv().await
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn refresher(&self) -> Refresher {
        self.refresher.clone()
    }

    /// Adapt the handle into a [`futures::Stream`] of snapshots. The stream owns the watch;
    /// dropping it tears the watch down like dropping the handle.
    pub fn into_stream(self) -> impl futures::Stream<Item = QueryResult<Value>> + Send {
        futures::stream::unfold(self, |mut handle| async move {
            handle.recv().await.map(|result| (result, handle))
        })
    }

    /// Stop the watch. Once this returns, no further snapshot will ever be emitted and the
    /// logical chain-state subscription is released.
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start a watch over `spec`: a loading snapshot, the initial fetch, then a re-fetch on every
/// trigger from `triggers`.
pub fn watch(
    connector: Arc<dyn ChainConnector>,
    spec: QuerySpec,
    mut triggers: broadcast::Receiver<BlockRef>,
) -> WatchHandle {
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let notify = Arc::new(Notify::new());
    let refresher = Refresher {
        notify: notify.clone(),
    };

    let task_spec = spec.clone();
    let task_notify = notify.clone();
    let task = tokio::spawn(async move {
        // A fresh subscription renders a neutral placeholder until the initial fetch resolves.
        if results_tx.send(QueryResult::loading()).is_err() {
            return;
        }
        loop {
            // Collapse any trigger backlog into the fetch we are about to run. Triggers arriving
            // *during* the fetch stay buffered and coalesce into the next iteration the same way.
            loop {
                match triggers.try_recv() {
                    Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                    _ => break,
                }
            }

            // One fetch in flight at a time. A stop request mid-fetch abandons the fetch, so
            // nothing can be emitted after teardown wins the race.
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                result = query(connector.as_ref(), &task_spec) => {
                    if results_tx.send(result).is_err() {
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                next = triggers.recv() => match next {
                    Ok(block) => trace!(%block, function = %task_spec.function, "watch trigger"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!(skipped, function = %task_spec.function, "watch lagged, refetching");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = task_notify.notified() => {
                    trace!(function = %task_spec.function, "manual refresh");
                }
            }
        }
    });

    WatchHandle {
        spec,
        results: results_rx,
        refresher,
        stop: Some(stop_tx),
        task: Some(task),
    }
}
