//! Contract identities, function metadata and the typed argument values passed to them.
//!
//! ABI byte-level encoding lives behind [`crate::connector::ChainConnector`]; this module only
//! knows enough about each deployed contract (function names, arities, argument kinds) to reject
//! malformed calls locally, before anything touches the network.

use serde::{Deserialize, Serialize};

use crate::{cfg::NetworkId, crypto::Address, error::ClientError, session::SessionToken};

/// Tagged identity of a deployed contract variant. Selecting behaviour by this tag replaces any
/// runtime shape inspection of metadata objects.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractId {
    Minidao,
    Superdao,
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractId::Minidao => write!(f, "minidao"),
            ContractId::Superdao => write!(f, "superdao"),
        }
    }
}

/// The kind of a single call argument. Used for local arity/type validation only.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArgKind {
    Address,
    Bool,
    U32,
    U64,
    U128,
    Bytes,
}

/// A single typed call argument.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Arg {
    Address(Address),
    Bool(bool),
    U32(u32),
    U64(u64),
    U128(u128),
    Bytes(Vec<u8>),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Address(_) => ArgKind::Address,
            Arg::Bool(_) => ArgKind::Bool,
            Arg::U32(_) => ArgKind::U32,
            Arg::U64(_) => ArgKind::U64,
            Arg::U128(_) => ArgKind::U128,
            Arg::Bytes(_) => ArgKind::Bytes,
        }
    }
}

/// Static metadata for one contract function: its name, declared parameter kinds and whether it
/// mutates chain state (and therefore must go through the transaction channel, not a read call).
#[derive(Debug)]
pub struct FunctionMeta {
    pub name: &'static str,
    pub params: &'static [ArgKind],
    pub mutates: bool,
}

const MINIDAO_FUNCTIONS: &[FunctionMeta] = &[
    FunctionMeta {
        name: "get_name",
        params: &[],
        mutates: false,
    },
    FunctionMeta {
        name: "has_voter",
        params: &[ArgKind::Address],
        mutates: false,
    },
    FunctionMeta {
        name: "get_value",
        params: &[],
        mutates: false,
    },
    FunctionMeta {
        name: "register_voter",
        params: &[ArgKind::Address],
        mutates: true,
    },
    FunctionMeta {
        name: "deregister_voter",
        params: &[ArgKind::Address],
        mutates: true,
    },
    FunctionMeta {
        name: "vote_proposal",
        params: &[ArgKind::U32, ArgKind::Bool, ArgKind::Address],
        mutates: true,
    },
    FunctionMeta {
        name: "create_superdao_cross_chain_proposal",
        params: &[
            ArgKind::Address,
            ArgKind::Bytes,
            ArgKind::U128,
            ArgKind::U64,
            ArgKind::U64,
        ],
        mutates: true,
    },
    FunctionMeta {
        name: "create_contract_call_proposal",
        params: &[ArgKind::Address],
        mutates: true,
    },
    FunctionMeta {
        name: "update_value",
        params: &[],
        mutates: true,
    },
];

const SUPERDAO_FUNCTIONS: &[FunctionMeta] = &[FunctionMeta {
    name: "super_dao_query_get_proposals",
    params: &[],
    mutates: false,
}];

/// A resolved deployed contract instance, bound to the session it was resolved under.
///
/// Immutable once constructed. When the connected account or network changes, handles are
/// re-created with the new session token; any in-flight work holding an old handle fails with
/// [`ClientError::StaleSession`] instead of silently talking to the wrong context.
#[derive(Clone, Debug)]
pub struct ContractHandle {
    pub id: ContractId,
    pub network: NetworkId,
    pub address: Address,
    pub session: SessionToken,
    functions: &'static [FunctionMeta],
}

impl ContractHandle {
    pub fn new(
        id: ContractId,
        network: NetworkId,
        address: Address,
        session: SessionToken,
    ) -> ContractHandle {
        let functions = match id {
            ContractId::Minidao => MINIDAO_FUNCTIONS,
            ContractId::Superdao => SUPERDAO_FUNCTIONS,
        };
        ContractHandle {
            id,
            network,
            address,
            session,
            functions,
        }
    }

    pub fn function(&self, name: &str) -> Option<&'static FunctionMeta> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Check a call against the target function's declared arity and argument kinds. Fails before
    /// any network interaction.
    pub fn validate_call(&self, name: &str, args: &[Arg]) -> Result<&'static FunctionMeta, ClientError> {
        let Some(meta) = self.function(name) else {
            return Err(ClientError::invalid_argument(
                name,
                format!("unknown function on {} contract", self.id),
            ));
        };
        if args.len() != meta.params.len() {
            return Err(ClientError::invalid_argument(
                name,
                format!("expected {} arguments, got {}", meta.params.len(), args.len()),
            ));
        }
        for (i, (arg, expected)) in args.iter().zip(meta.params).enumerate() {
            if arg.kind() != *expected {
                return Err(ClientError::invalid_argument(
                    name,
                    format!("argument {i} has kind {:?}, expected {expected:?}", arg.kind()),
                ));
            }
        }
        Ok(meta)
    }
}

/// The call wrapped by a superdao proposal, as displayed to voters.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalCall {
    CrossChain {
        #[serde(with = "hex")]
        encoded_extrinsic: Vec<u8>,
    },
    ContractCall {
        callee: Address,
    },
}

/// A superdao proposal snapshot, paired with its index in query replies.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub call: ProposalCall,
    pub ayes: u32,
    pub nays: u32,
}
