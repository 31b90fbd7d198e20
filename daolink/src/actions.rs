//! Action orchestration: the thin facade the view layer calls.
//!
//! Each user action is: validate local input → construct the request → submit → attach a status
//! notifier → refresh the relevant query at best-block inclusion. Anything that fails before
//! submission is caught here and surfaced through the notifier, never propagated unhandled.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use serde_json::Value;
use tracing::info;

use crate::{
    cfg::{Config, NetworkId, TriggerGranularity},
    chain::BlockFanout,
    connector::{ChainConnector, Signer},
    contract::{Arg, ContractHandle, ContractId, Proposal},
    crypto::Address,
    error::ClientError,
    notify::{NotificationSink, notify_failure, spawn_notifier},
    query::{QueryResult, QuerySpec, Refresher, WatchHandle, query, watch},
    session::{Session, Sessions},
    tx::{TxChannel, TxProgress},
};

/// The logical action buttons whose settling state the UI reads.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ActionKind {
    Register,
    Deregister,
    Vote(u32),
    CreateCrossChainProposal,
    CreateContractCallProposal,
}

/// A connected client over the minidao and superdao contracts.
///
/// Bound to one wallet session; when the account or network changes, the hosting dApp drops this
/// client and connects a new one. Anything still holding the old client fails with
/// [`ClientError::StaleSession`].
pub struct DaoClient {
    connector: Arc<dyn ChainConnector>,
    signer: Arc<dyn Signer>,
    sink: Arc<dyn NotificationSink>,
    sessions: Arc<Sessions>,
    session: Session,
    minidao: ContractHandle,
    superdao: ContractHandle,
    triggers: BlockFanout,
    capacity: usize,
    inclusion_window: Duration,
    register_tx: TxChannel,
    deregister_tx: TxChannel,
    create_cross_chain_tx: TxChannel,
    create_contract_call_tx: TxChannel,
    update_value_tx: TxChannel,
    /// One vote channel per proposal: votes on distinct proposals overlap freely, re-votes on the
    /// same proposal are gated until the previous one settles.
    vote_txs: Mutex<HashMap<u32, Arc<TxChannel>>>,
}

impl DaoClient {
    /// Connect a wallet account and resolve both contract handles for its network.
    pub fn connect(
        connector: Arc<dyn ChainConnector>,
        signer: Arc<dyn Signer>,
        sink: Arc<dyn NotificationSink>,
        sessions: Arc<Sessions>,
        config: &Config,
        account: Address,
        network: NetworkId,
    ) -> Result<DaoClient> {
        let session = sessions.connect(account, network);
        info!(%account, ?network, "connecting dao client");

        let minidao = ContractHandle::new(
            ContractId::Minidao,
            network,
            config.deployment(ContractId::Minidao, network)?.address,
            session.token,
        );
        let superdao = ContractHandle::new(
            ContractId::Superdao,
            network,
            config.deployment(ContractId::Superdao, network)?.address,
            session.token,
        );

        // One physical block subscription for the configured granularity, fanned out to every
        // watch this client creates.
        let source = match config.trigger_granularity {
            TriggerGranularity::BestBlock => connector.subscribe_best_blocks(),
            TriggerGranularity::FinalizedBlock => connector.subscribe_finalized_blocks(),
        };
        let triggers = BlockFanout::spawn(source);

        let capacity = config.status_channel_capacity;
        let inclusion_window = config.inclusion_timeout;
        let channel = |function: &'static str| {
            TxChannel::new(
                connector.clone(),
                signer.clone(),
                minidao.clone(),
                function,
                capacity,
                inclusion_window,
            )
        };
        let register_tx = channel("register_voter");
        let deregister_tx = channel("deregister_voter");
        let create_cross_chain_tx = channel("create_superdao_cross_chain_proposal");
        let create_contract_call_tx = channel("create_contract_call_proposal");
        let update_value_tx = channel("update_value");

        Ok(DaoClient {
            connector,
            signer,
            sink,
            sessions,
            session,
            minidao,
            superdao,
            triggers,
            capacity,
            inclusion_window,
            register_tx,
            deregister_tx,
            create_cross_chain_tx,
            create_contract_call_tx,
            update_value_tx,
            vote_txs: Mutex::new(HashMap::new()),
        })
    }

    pub fn account(&self) -> Address {
        self.session.account
    }

    fn spec(&self, contract: &ContractHandle, function: &str, args: Vec<Arg>) -> QuerySpec {
        QuerySpec {
            contract: contract.clone(),
            function: function.to_owned(),
            args,
        }
    }

    fn live(&self) -> Result<(), ClientError> {
        self.sessions.ensure_live(self.session.token).map(|_| ())
    }

    /// The shared submit path: session check, submit, notifier attach, drive.
    fn action(
        &self,
        channel: &TxChannel,
        args: Vec<Arg>,
        refresh: Option<Refresher>,
    ) -> Result<TxProgress, ClientError> {
        let staged = self
            .live()
            .and_then(|()| channel.submit(args, self.session.account));
        let mut progress = match staged {
            Ok(progress) => progress,
            Err(e) => {
                notify_failure(self.sink.as_ref(), &e);
                return Err(e);
            }
        };

        let stream = progress.subscribe();
        spawn_notifier(
            stream,
            self.sink.clone(),
            refresh.map(|r| Box::new(move || r.poke()) as Box<dyn Fn() + Send>),
        );
        progress.begin();
        Ok(progress)
    }

    pub fn register_voter(
        &self,
        voter: Address,
        refresh: Option<Refresher>,
    ) -> Result<TxProgress, ClientError> {
        self.action(&self.register_tx, vec![Arg::Address(voter)], refresh)
    }

    pub fn deregister_voter(
        &self,
        voter: Address,
        refresh: Option<Refresher>,
    ) -> Result<TxProgress, ClientError> {
        self.action(&self.deregister_tx, vec![Arg::Address(voter)], refresh)
    }

    pub fn vote_proposal(
        &self,
        proposal_id: u32,
        vote: bool,
        voter: Address,
        refresh: Option<Refresher>,
    ) -> Result<TxProgress, ClientError> {
        let channel = {
            let mut votes = self.vote_txs.lock().unwrap();
            votes
                .entry(proposal_id)
                .or_insert_with(|| {
                    Arc::new(TxChannel::new(
                        self.connector.clone(),
                        self.signer.clone(),
                        self.minidao.clone(),
                        "vote_proposal",
                        self.capacity,
                        self.inclusion_window,
                    ))
                })
                .clone()
        };
        self.action(
            channel.as_ref(),
            vec![
                Arg::U32(proposal_id),
                Arg::Bool(vote),
                Arg::Address(voter),
            ],
            refresh,
        )
    }

    /// Create a superdao proposal wrapping a cross-chain message. `encoded_extrinsic` is the
    /// hex-encoded remote call, as pasted by the user.
    pub fn create_cross_chain_proposal(
        &self,
        voter: Address,
        encoded_extrinsic: &str,
        fee_max: u128,
        ref_time: u64,
        proof_size: u64,
        refresh: Option<Refresher>,
    ) -> Result<TxProgress, ClientError> {
        let stripped = encoded_extrinsic
            .strip_prefix("0x")
            .unwrap_or(encoded_extrinsic);
        let extrinsic = match hex::decode(stripped) {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = ClientError::invalid_argument(
                    "create_superdao_cross_chain_proposal",
                    format!("encoded extrinsic is not valid hex: {e}"),
                );
                notify_failure(self.sink.as_ref(), &error);
                return Err(error);
            }
        };
        self.action(
            &self.create_cross_chain_tx,
            vec![
                Arg::Address(voter),
                Arg::Bytes(extrinsic),
                Arg::U128(fee_max),
                Arg::U64(ref_time),
                Arg::U64(proof_size),
            ],
            refresh,
        )
    }

    /// Create a superdao proposal that calls back into the minidao contract (its `update_value`
    /// entry point).
    pub fn create_contract_call_proposal(
        &self,
        voter: Address,
        refresh: Option<Refresher>,
    ) -> Result<TxProgress, ClientError> {
        self.action(
            &self.create_contract_call_tx,
            vec![Arg::Address(voter)],
            refresh,
        )
    }

    pub fn update_value(&self, refresh: Option<Refresher>) -> Result<TxProgress, ClientError> {
        self.action(&self.update_value_tx, vec![], refresh)
    }

    pub fn in_best_block_progress(&self, action: ActionKind) -> bool {
        match action {
            ActionKind::Register => self.register_tx.in_best_block_progress(),
            ActionKind::Deregister => self.deregister_tx.in_best_block_progress(),
            ActionKind::Vote(proposal_id) => self
                .vote_txs
                .lock()
                .unwrap()
                .get(&proposal_id)
                .is_some_and(|c| c.in_best_block_progress()),
            ActionKind::CreateCrossChainProposal => {
                self.create_cross_chain_tx.in_best_block_progress()
            }
            ActionKind::CreateContractCallProposal => {
                self.create_contract_call_tx.in_best_block_progress()
            }
        }
    }

    pub async fn get_name(&self) -> QueryResult<String> {
        self.read("get_name", vec![]).await.decode("get_name")
    }

    pub async fn get_value(&self) -> QueryResult<u8> {
        self.read("get_value", vec![]).await.decode("get_value")
    }

    pub async fn has_voter(&self, address: Address) -> QueryResult<bool> {
        self.read("has_voter", vec![Arg::Address(address)])
            .await
            .decode("has_voter")
    }

    async fn read(&self, function: &str, args: Vec<Arg>) -> QueryResult<Value> {
        if let Err(e) = self.live() {
            return QueryResult::failed(e);
        }
        query(
            self.connector.as_ref(),
            &self.spec(&self.minidao, function, args),
        )
        .await
    }

    /// A live watch over the voter-membership flag for `address`.
    pub fn watch_has_voter(&self, address: Address) -> Result<WatchHandle, ClientError> {
        self.watch_spec(self.spec(&self.minidao, "has_voter", vec![Arg::Address(address)]))
    }

    /// A live watch over the superdao proposal list. Decode snapshots with [`proposals_from`].
    pub fn watch_proposals(&self) -> Result<WatchHandle, ClientError> {
        self.watch_spec(self.spec(&self.superdao, "super_dao_query_get_proposals", vec![]))
    }

    fn watch_spec(&self, spec: QuerySpec) -> Result<WatchHandle, ClientError> {
        self.live()?;
        Ok(watch(
            self.connector.clone(),
            spec,
            self.triggers.subscribe(),
        ))
    }
}

/// Decode a proposal-list snapshot into `(index, proposal)` pairs.
pub fn proposals_from(value: Value) -> Result<Vec<(u32, Proposal)>, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::decoding("super_dao_query_get_proposals", e.to_string()))
}
