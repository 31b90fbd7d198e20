pub mod actions;
pub mod cfg;
pub mod chain;
pub mod connector;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod notify;
pub mod query;
pub mod session;
pub mod tx;
