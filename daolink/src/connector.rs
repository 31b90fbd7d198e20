//! The seams to the outside world: the chain connector and the wallet signer.
//!
//! ABI encoding, the node transport and key management are external capabilities. The client only
//! consumes them through these traits; tests substitute fakes with injectable behaviour.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    contract::{Arg, ContractHandle, FunctionMeta},
    crypto::{Address, BlockRef},
    error::ClientError,
};

/// An unsigned contract-call payload, ready for signing.
#[derive(Clone, Debug)]
pub struct ExtrinsicPayload {
    pub contract: Address,
    pub data: Vec<u8>,
}

/// A signed, chain-submittable extrinsic.
#[derive(Clone, Debug)]
pub struct SignedExtrinsic {
    pub payload: ExtrinsicPayload,
    pub signer: Address,
    pub signature: Vec<u8>,
}

/// Raw per-transaction feedback from the chain, as delivered by the connector after broadcast.
/// The transaction channel normalizes these into the public [`crate::tx::TxStatus`] lifecycle.
#[derive(Clone, Debug)]
pub enum ChainTxEvent {
    InBlock(BlockRef),
    Retracted,
    Dropped,
    Invalid(String),
    FinalizationFailed(String),
    Finalized(BlockRef),
}

/// Typed access to a node: call encoding/decoding, read dispatch, extrinsic submission and block
/// subscriptions. One physical connector is shared process-wide.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    /// ABI-encode a call to `function` with `args`. Arguments have already passed local
    /// validation; a failure here is an encoder-level mismatch.
    fn encode_call(
        &self,
        contract: &ContractHandle,
        function: &FunctionMeta,
        args: &[Arg],
    ) -> Result<Vec<u8>, ClientError>;

    /// Decode the reply bytes of a read call to `function`.
    fn decode_reply(
        &self,
        contract: &ContractHandle,
        function: &FunctionMeta,
        bytes: &[u8],
    ) -> Result<serde_json::Value, ClientError>;

    /// Dispatch a read-only chain state call.
    async fn dispatch_read_call(
        &self,
        address: Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ClientError>;

    /// Broadcast a signed extrinsic. On success, returns the stream of chain feedback for this
    /// one submission. The stream closing without a terminal event means the node went away.
    async fn submit_extrinsic(
        &self,
        extrinsic: SignedExtrinsic,
    ) -> Result<UnboundedReceiver<ChainTxEvent>, ClientError>;

    /// A physical subscription to new best blocks.
    fn subscribe_best_blocks(&self) -> UnboundedReceiver<BlockRef>;

    /// A physical subscription to newly finalized blocks.
    fn subscribe_finalized_blocks(&self) -> UnboundedReceiver<BlockRef>;
}

/// The external wallet signer.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Request a signature for `payload` from the connected account. A user rejection or an
    /// unavailable signer surfaces as [`ClientError::SignerRejected`].
    async fn sign(
        &self,
        payload: ExtrinsicPayload,
        account: Address,
    ) -> Result<SignedExtrinsic, ClientError>;
}
