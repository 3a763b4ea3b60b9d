use crate::{
    bet::unit_for,
    deployment::{
        DeploymentEnv,
        DeploymentRecord,
    },
    payload::{
        AccountAddress,
        ModuleId,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::time::Duration;

pub const DEFAULT_TESTNET_NODE_URL: &str = "https://fullnode.testnet.aptoslabs.com";
pub const DEFAULT_DEVNET_NODE_URL: &str = "https://fullnode.devnet.aptoslabs.com";
pub const DEFAULT_LOCAL_NODE_URL: &str = "http://127.0.0.1:8080";

pub const DEFAULT_MODULE_NAME: &str = "DiceGame";
pub const TESTNET_MODULE_ADDRESS: &str =
    "0x14e72b44314ea3fde52ad42db5c40d8f40e138f64fdab577c9de3f4c51561e48";
pub const DEFAULT_HOUSE_EDGE_PERCENT: u64 = 5;
pub const DEFAULT_COIN_DECIMALS: u8 = 8;
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkTarget {
    Testnet { url: String },
    Devnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn for_env(env: DeploymentEnv, url: Option<String>) -> Self {
        match env {
            DeploymentEnv::Dev => NetworkTarget::Devnet {
                url: url.unwrap_or_else(|| DEFAULT_DEVNET_NODE_URL.to_string()),
            },
            DeploymentEnv::Test => NetworkTarget::Testnet {
                url: url.unwrap_or_else(|| DEFAULT_TESTNET_NODE_URL.to_string()),
            },
            DeploymentEnv::Local => NetworkTarget::LocalNode {
                url: url.unwrap_or_else(|| DEFAULT_LOCAL_NODE_URL.to_string()),
            },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Testnet { url }
            | NetworkTarget::Devnet { url }
            | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Testnet { .. } => DeploymentEnv::Test,
            NetworkTarget::Devnet { .. } => DeploymentEnv::Dev,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

/// Values given on the command line; each one beats the deployment record.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub node_url: Option<String>,
    pub module_address: Option<String>,
    pub house_owner: Option<String>,
    pub house_edge_percent: Option<u64>,
    pub confirmation_timeout: Option<Duration>,
    pub settlement_event: Option<String>,
}

/// Everything the game core needs to know about one deployment.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub network: NetworkTarget,
    pub module: ModuleId,
    pub house_owner: AccountAddress,
    pub house_edge_percent: u64,
    pub coin_decimals: u8,
    pub confirmation_timeout: Duration,
    /// Event type suffix (e.g. `DiceGame::DiceRolled`) carrying the real roll.
    pub settlement_event: Option<String>,
}

impl GameConfig {
    pub fn resolve(
        env: DeploymentEnv,
        overrides: &ConfigOverrides,
        record: Option<&DeploymentRecord>,
    ) -> Result<Self> {
        let node_url = overrides
            .node_url
            .clone()
            .or_else(|| record.map(|r| r.network_url.clone()));
        let network = NetworkTarget::for_env(env, node_url);

        let module_address = overrides
            .module_address
            .clone()
            .or_else(|| record.map(|r| r.module_address.clone()))
            .or_else(|| {
                (env == DeploymentEnv::Test).then(|| TESTNET_MODULE_ADDRESS.to_string())
            })
            .ok_or_else(|| {
                eyre!(
                    "No DiceGame deployment recorded for {env}. Pass --module-address \
                     or run `record-deployment` first."
                )
            })?;
        let module_address: AccountAddress =
            module_address.parse().map_err(|e: String| eyre!(e))?;

        let module_name = record
            .and_then(|r| r.module_name.clone())
            .unwrap_or_else(|| DEFAULT_MODULE_NAME.to_string());

        let house_owner = match overrides
            .house_owner
            .clone()
            .or_else(|| record.and_then(|r| r.house_owner.clone()))
        {
            Some(raw) => raw.parse().map_err(|e: String| eyre!(e))?,
            None => module_address.clone(),
        };

        let house_edge_percent = overrides
            .house_edge_percent
            .or_else(|| record.and_then(|r| r.house_edge_percent))
            .unwrap_or(DEFAULT_HOUSE_EDGE_PERCENT);
        if house_edge_percent >= 100 {
            return Err(eyre!(
                "house edge must be below 100%, got {house_edge_percent}%"
            ));
        }

        let coin_decimals = record
            .and_then(|r| r.coin_decimals)
            .unwrap_or(DEFAULT_COIN_DECIMALS);
        if unit_for(coin_decimals).is_none() {
            return Err(eyre!("coin decimals {coin_decimals} do not fit in u64"));
        }

        let settlement_event = overrides
            .settlement_event
            .clone()
            .or_else(|| record.and_then(|r| r.settlement_event.clone()));

        Ok(Self {
            network,
            module: ModuleId {
                address: module_address,
                name: module_name,
            },
            house_owner,
            house_edge_percent,
            coin_decimals,
            confirmation_timeout: overrides
                .confirmation_timeout
                .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT),
            settlement_event,
        })
    }
}
