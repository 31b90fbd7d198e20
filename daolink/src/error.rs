//! The error taxonomy for the client.
//!
//! Every failure a channel can produce is one of these variants. All of them are recovered at the
//! action-orchestration boundary and turned into user-visible notifications; none should ever
//! reach an unhandled-panic path. Pool drops and reorg retractions are not failures: they are
//! non-terminal [`crate::tx::TxStatus`] transitions, because the transaction may still be
//! re-included.

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The call shape did not match the target function. Local, never reaches the network.
    #[error("invalid argument for {function}: {reason}")]
    InvalidArgument { function: String, reason: String },
    /// The arguments could not be encoded for the target function.
    #[error("failed to encode call to {function}: {reason}")]
    EncodingError { function: String, reason: String },
    /// The reply bytes could not be decoded as the function's return type.
    #[error("failed to decode reply from {function}: {reason}")]
    DecodingError { function: String, reason: String },
    /// The user declined to sign, or the signer was unavailable.
    #[error("signer rejected the transaction: {0}")]
    SignerRejected(String),
    /// The node rejected the submission.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
    /// No inclusion feedback arrived within the policy window. Reported, not fatal; the
    /// underlying status stream keeps running.
    #[error("no inclusion feedback within the policy window")]
    InclusionTimeout,
    /// The chain reported that the transaction could not be finalized.
    #[error("finalization failed: {0}")]
    FinalizationFailed(String),
    /// The chain judged the transaction invalid.
    #[error("transaction invalid: {0}")]
    Invalid(String),
    /// A read call failed at the node.
    #[error("query failed: {0}")]
    QueryFailed(String),
    /// The operation was bound to an account/network session that has since been replaced.
    #[error("session is stale; reconnect and retry")]
    StaleSession,
    /// A previous submission for the same logical action has not settled yet.
    #[error("a previous {0} transaction is still settling")]
    ActionInFlight(&'static str),
}

impl ClientError {
    pub fn invalid_argument(function: &str, reason: impl Into<String>) -> ClientError {
        ClientError::InvalidArgument {
            function: function.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn encoding(function: &str, reason: impl Into<String>) -> ClientError {
        ClientError::EncodingError {
            function: function.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn decoding(function: &str, reason: impl Into<String>) -> ClientError {
        ClientError::DecodingError {
            function: function.to_owned(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before anything was sent to the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidArgument { .. }
                | ClientError::EncodingError { .. }
                | ClientError::StaleSession
                | ClientError::ActionInFlight(_)
        )
    }
}
