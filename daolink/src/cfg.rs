use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{contract::ContractId, crypto::Address};

/// The network a contract is deployed to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkId {
    PopTestnet,
    PopLocal,
}

/// Which chain-state change re-fires watch queries.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerGranularity {
    /// Re-fetch on every new best block. More responsive, may observe state that is later
    /// retracted by a reorg.
    #[default]
    BestBlock,
    /// Re-fetch only on finalized blocks.
    FinalizedBlock,
}

/// A deployed contract instance, mirroring the deployment registry shipped with the dApp.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractDeployment {
    pub id: ContractId,
    pub network: NetworkId,
    pub address: Address,
}

// Note that a hosting dApp constructs instances of this to save as a configuration, so it must be
// both serializable and deserializable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Known contract deployments. Must contain the minidao and superdao contracts for whichever
    /// network the wallet connects to.
    pub deployments: Vec<ContractDeployment>,
    /// Granularity of the chain-state trigger for watch queries. Defaults to best block.
    #[serde(default)]
    pub trigger_granularity: TriggerGranularity,
    /// How long to wait for inclusion feedback after broadcasting before the wait helpers report
    /// a timeout. The status stream itself keeps running. Defaults to 60 seconds.
    #[serde(default = "inclusion_timeout_default")]
    pub inclusion_timeout: Duration,
    /// Capacity of each per-transaction status broadcast channel. A submission emits a handful of
    /// statuses, so the default of 16 leaves ample slack for slow consumers.
    #[serde(default = "status_channel_capacity_default")]
    pub status_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            deployments: vec![],
            trigger_granularity: TriggerGranularity::default(),
            inclusion_timeout: inclusion_timeout_default(),
            status_channel_capacity: status_channel_capacity_default(),
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Config> {
        Ok(toml::from_str(s)?)
    }

    pub fn deployment(&self, id: ContractId, network: NetworkId) -> Result<&ContractDeployment> {
        self.deployments
            .iter()
            .find(|d| d.id == id && d.network == network)
            .ok_or_else(|| anyhow!("no {id} deployment configured for {network:?}"))
    }
}

fn inclusion_timeout_default() -> Duration {
    Duration::from_secs(60)
}

fn status_channel_capacity_default() -> usize {
    16
}
