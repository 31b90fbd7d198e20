//! Integration tests against a fake chain with scriptable feedback.

mod watch;

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use daolink::{
    actions::DaoClient,
    cfg::{Config, ContractDeployment, NetworkId},
    connector::{ChainConnector, ChainTxEvent, ExtrinsicPayload, SignedExtrinsic, Signer},
    contract::{Arg, ContractHandle, ContractId, FunctionMeta, Proposal, ProposalCall},
    crypto::{Address, BlockRef, Hash},
    error::ClientError,
    notify::{Notification, NotificationSink},
    session::Sessions,
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub fn addr(n: u8) -> Address {
    Address([n; 32])
}

pub fn block(number: u64) -> BlockRef {
    BlockRef {
        number,
        hash: Hash([number as u8; 32]),
    }
}

/// The contract state the fake chain executes calls against, mirroring the deployed minidao and
/// superdao contracts.
#[derive(Debug)]
pub struct ChainState {
    pub name: String,
    pub value: u8,
    pub voters: HashSet<Address>,
    pub proposals: Vec<(u32, Proposal)>,
}

impl Default for ChainState {
    fn default() -> ChainState {
        ChainState {
            name: "minidao".to_owned(),
            value: 0,
            voters: HashSet::new(),
            proposals: Vec::new(),
        }
    }
}

/// A fake node: executes calls against [`ChainState`], serves reads, and either drives
/// submissions straight to finality (auto mode) or hands the test a script handle per submission
/// (manual mode).
pub struct FakeChain {
    pub state: Mutex<ChainState>,
    reject_signing: AtomicBool,
    auto_finalize: AtomicBool,
    height: AtomicU64,
    best_subs: Mutex<Vec<UnboundedSender<BlockRef>>>,
    final_subs: Mutex<Vec<UnboundedSender<BlockRef>>>,
    scripts: Mutex<VecDeque<UnboundedSender<ChainTxEvent>>>,
}

impl FakeChain {
    pub fn new() -> Arc<FakeChain> {
        Arc::new(FakeChain {
            state: Mutex::new(ChainState::default()),
            reject_signing: AtomicBool::new(false),
            auto_finalize: AtomicBool::new(true),
            height: AtomicU64::new(0),
            best_subs: Mutex::new(Vec::new()),
            final_subs: Mutex::new(Vec::new()),
            scripts: Mutex::new(VecDeque::new()),
        })
    }

    pub fn reject_signing(&self, reject: bool) {
        self.reject_signing.store(reject, Ordering::SeqCst);
    }

    /// In manual mode, submissions emit nothing on their own; drive them with
    /// [`FakeChain::next_script`].
    pub fn manual_feedback(&self) {
        self.auto_finalize.store(false, Ordering::SeqCst);
    }

    /// The feedback sender for the oldest unscripted submission.
    pub fn next_script(&self) -> UnboundedSender<ChainTxEvent> {
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no pending submission to script")
    }

    /// Produce a new best block and notify subscribers, re-firing any best-block watches.
    pub fn produce_block(&self) -> BlockRef {
        let number = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let block = BlockRef {
            number,
            hash: Hash([number as u8; 32]),
        };
        self.best_subs
            .lock()
            .unwrap()
            .retain(|sub| sub.send(block).is_ok());
        block
    }

    pub fn finalize_block(&self, block: BlockRef) {
        self.final_subs
            .lock()
            .unwrap()
            .retain(|sub| sub.send(block).is_ok());
    }

    pub fn has_voter(&self, address: Address) -> bool {
        self.state.lock().unwrap().voters.contains(&address)
    }

    pub fn proposal_count(&self) -> usize {
        self.state.lock().unwrap().proposals.len()
    }

    fn apply(&self, function: &str, args: &[Arg]) {
        let mut state = self.state.lock().unwrap();
        match (function, args) {
            ("register_voter", [Arg::Address(voter)]) => {
                state.voters.insert(*voter);
            }
            ("deregister_voter", [Arg::Address(voter)]) => {
                state.voters.remove(voter);
            }
            ("vote_proposal", [Arg::U32(id), Arg::Bool(aye), Arg::Address(_)]) => {
                if let Some((_, proposal)) = state.proposals.iter_mut().find(|(i, _)| i == id) {
                    if *aye {
                        proposal.ayes += 1;
                    } else {
                        proposal.nays += 1;
                    }
                }
            }
            (
                "create_superdao_cross_chain_proposal",
                [Arg::Address(_), Arg::Bytes(extrinsic), Arg::U128(_), Arg::U64(_), Arg::U64(_)],
            ) => {
                let index = state.proposals.len() as u32;
                state.proposals.push((index, Proposal {
                    call: ProposalCall::CrossChain {
                        encoded_extrinsic: extrinsic.clone(),
                    },
                    ayes: 0,
                    nays: 0,
                }));
            }
            ("create_contract_call_proposal", [Arg::Address(_)]) => {
                let index = state.proposals.len() as u32;
                state.proposals.push((index, Proposal {
                    call: ProposalCall::ContractCall {
                        callee: Address::ZERO,
                    },
                    ayes: 0,
                    nays: 0,
                }));
            }
            ("update_value", []) => {
                state.value = state.value.saturating_add(10);
            }
            _ => panic!("fake chain cannot execute {function} with {args:?}"),
        }
    }

    fn serve(&self, function: &str, args: &[Arg]) -> Value {
        let state = self.state.lock().unwrap();
        match (function, args) {
            ("get_name", []) => json!(state.name),
            ("get_value", []) => json!(state.value),
            ("has_voter", [Arg::Address(address)]) => json!(state.voters.contains(address)),
            ("super_dao_query_get_proposals", []) => {
                serde_json::to_value(&state.proposals).unwrap()
            }
            _ => panic!("fake chain cannot serve {function} with {args:?}"),
        }
    }
}

#[async_trait]
impl ChainConnector for FakeChain {
    fn encode_call(
        &self,
        _contract: &ContractHandle,
        function: &FunctionMeta,
        args: &[Arg],
    ) -> Result<Vec<u8>, ClientError> {
        serde_json::to_vec(&(function.name, args))
            .map_err(|e| ClientError::encoding(function.name, e.to_string()))
    }

    fn decode_reply(
        &self,
        _contract: &ContractHandle,
        function: &FunctionMeta,
        bytes: &[u8],
    ) -> Result<Value, ClientError> {
        serde_json::from_slice(bytes).map_err(|e| ClientError::decoding(function.name, e.to_string()))
    }

    async fn dispatch_read_call(
        &self,
        _address: Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ClientError> {
        let (function, args): (String, Vec<Arg>) = serde_json::from_slice(&data)
            .map_err(|e| ClientError::QueryFailed(e.to_string()))?;
        let reply = self.serve(&function, &args);
        Ok(serde_json::to_vec(&reply).unwrap())
    }

    async fn submit_extrinsic(
        &self,
        extrinsic: SignedExtrinsic,
    ) -> Result<UnboundedReceiver<ChainTxEvent>, ClientError> {
        let (function, args): (String, Vec<Arg>) =
            serde_json::from_slice(&extrinsic.payload.data)
                .map_err(|e| ClientError::BroadcastFailed(e.to_string()))?;
        self.apply(&function, &args);

        let (events, receiver) = mpsc::unbounded_channel();
        if self.auto_finalize.load(Ordering::SeqCst) {
            let included = self.produce_block();
            events.send(ChainTxEvent::InBlock(included)).unwrap();
            events.send(ChainTxEvent::Finalized(included)).unwrap();
            self.finalize_block(included);
        } else {
            self.scripts.lock().unwrap().push_back(events);
        }
        Ok(receiver)
    }

    fn subscribe_best_blocks(&self) -> UnboundedReceiver<BlockRef> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.best_subs.lock().unwrap().push(sender);
        receiver
    }

    fn subscribe_finalized_blocks(&self) -> UnboundedReceiver<BlockRef> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.final_subs.lock().unwrap().push(sender);
        receiver
    }
}

#[async_trait]
impl Signer for FakeChain {
    async fn sign(
        &self,
        payload: ExtrinsicPayload,
        account: Address,
    ) -> Result<SignedExtrinsic, ClientError> {
        if self.reject_signing.load(Ordering::SeqCst) {
            return Err(ClientError::SignerRejected("rejected".to_owned()));
        }
        Ok(SignedExtrinsic {
            payload,
            signer: account,
            signature: vec![0xee],
        })
    }
}

/// Records every notification the client surfaces.
#[derive(Default)]
pub struct RecordingSink {
    notes: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Notification> {
        self.notes.lock().unwrap().last().cloned()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.notes.lock().unwrap().push(notification);
    }
}

/// One fake chain plus everything needed to connect clients against it.
pub struct TestNet {
    pub chain: Arc<FakeChain>,
    pub sink: Arc<RecordingSink>,
    pub sessions: Arc<Sessions>,
    pub config: Config,
}

impl TestNet {
    pub fn new() -> TestNet {
        TestNet {
            chain: FakeChain::new(),
            sink: Arc::new(RecordingSink::default()),
            sessions: Arc::new(Sessions::new()),
            config: Config {
                deployments: vec![
                    ContractDeployment {
                        id: ContractId::Minidao,
                        network: NetworkId::PopTestnet,
                        address: addr(0xd0),
                    },
                    ContractDeployment {
                        id: ContractId::Superdao,
                        network: NetworkId::PopTestnet,
                        address: addr(0xd1),
                    },
                ],
                ..Config::default()
            },
        }
    }

    pub fn connect(&self, account: Address) -> DaoClient {
        DaoClient::connect(
            self.chain.clone(),
            self.chain.clone(),
            self.sink.clone(),
            self.sessions.clone(),
            &self.config,
            account,
            NetworkId::PopTestnet,
        )
        .unwrap()
    }
}
