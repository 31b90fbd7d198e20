//! The connected account/network session.
//!
//! The wallet connection is process-wide state: set on connect, cleared on disconnect or network
//! switch. Each session carries a monotonic token; channels capture the token they were created
//! under, so work bound to a replaced session is detectable and rejected rather than silently
//! reused against the wrong account or network.

use std::sync::{
    RwLock,
    atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{cfg::NetworkId, crypto::Address, error::ClientError};

/// Monotonic identifier of one wallet-connection session.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct SessionToken(u64);

/// The currently connected account and network.
#[derive(Clone, Debug)]
pub struct Session {
    pub account: Address,
    pub network: NetworkId,
    pub token: SessionToken,
}

/// Tracks the current session and hands out tokens. Connecting or switching networks replaces the
/// session and bumps the token, invalidating everything created under the previous one.
#[derive(Debug, Default)]
pub struct Sessions {
    counter: AtomicU64,
    current: RwLock<Option<Session>>,
}

impl Sessions {
    pub fn new() -> Sessions {
        Sessions::default()
    }

    pub fn connect(&self, account: Address, network: NetworkId) -> Session {
        let token = SessionToken(self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let session = Session {
            account,
            network,
            token,
        };
        *self.current.write().unwrap() = Some(session.clone());
        tracing::debug!(account = %session.account, network = ?session.network, "wallet connected");
        session
    }

    pub fn disconnect(&self) {
        // Bump the counter so tokens from the disconnected session never match again.
        self.counter.fetch_add(1, Ordering::SeqCst);
        *self.current.write().unwrap() = None;
        tracing::debug!("wallet disconnected");
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().unwrap().clone()
    }

    /// Fails unless `token` belongs to the live session.
    pub fn ensure_live(&self, token: SessionToken) -> Result<Session, ClientError> {
        match self.current() {
            Some(session) if session.token == token => Ok(session),
            _ => Err(ClientError::StaleSession),
        }
    }
}
