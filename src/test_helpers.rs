use crate::{
    config::{
        ConfigOverrides,
        GameConfig,
    },
    deployment::DeploymentEnv,
    payload::{
        AccountAddress,
        EntryFunctionPayload,
    },
    submitter::{
        ChainClient,
        ChainEvent,
        Confirmation,
        TransactionHandle,
        TransactionSubmitter,
        Wallet,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use serde_json::json;
use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

pub const ALICE: &str = "0xa11ce";
pub const MODULE: &str = "0x14e72b44314ea3fde52ad42db5c40d8f40e138f64fdab577c9de3f4c51561e48";

#[derive(Clone, Debug)]
pub enum WalletBehaviour {
    Accept,
    Reject(String),
    /// Never returns from signing.
    Stall,
}

/// Records every payload it is asked to sign.
pub struct FakeWallet {
    account: Option<AccountAddress>,
    behaviour: WalletBehaviour,
    submitted: Mutex<Vec<EntryFunctionPayload>>,
}

impl FakeWallet {
    pub fn connected() -> Self {
        Self {
            account: Some(ALICE.parse().expect("valid test address")),
            behaviour: WalletBehaviour::Accept,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            account: None,
            ..Self::connected()
        }
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            behaviour: WalletBehaviour::Reject(reason.into()),
            ..Self::connected()
        }
    }

    pub fn stalling() -> Self {
        Self {
            behaviour: WalletBehaviour::Stall,
            ..Self::connected()
        }
    }

    pub fn submitted(&self) -> Vec<EntryFunctionPayload> {
        self.submitted.lock().expect("wallet lock poisoned").clone()
    }
}

impl Wallet for FakeWallet {
    fn account(&self) -> Option<AccountAddress> {
        self.account.clone()
    }

    async fn sign_and_submit(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<TransactionHandle> {
        match &self.behaviour {
            WalletBehaviour::Accept => {}
            WalletBehaviour::Reject(reason) => return Err(eyre!("{reason}")),
            WalletBehaviour::Stall => std::future::pending::<()>().await,
        }
        let mut submitted = self.submitted.lock().expect("wallet lock poisoned");
        submitted.push(payload.clone());
        Ok(TransactionHandle(format!("0x{:04x}", submitted.len())))
    }
}

#[derive(Clone, Debug)]
pub enum ChainBehaviour {
    Confirm(Confirmation),
    Error(String),
    /// Never confirms.
    Stall,
}

pub struct FakeChain {
    behaviour: ChainBehaviour,
    waited_on: Mutex<Vec<TransactionHandle>>,
}

impl FakeChain {
    pub fn new(behaviour: ChainBehaviour) -> Self {
        Self {
            behaviour,
            waited_on: Mutex::new(Vec::new()),
        }
    }

    pub fn confirming() -> Self {
        Self::new(ChainBehaviour::Confirm(success_confirmation(Vec::new())))
    }

    pub fn confirming_roll(roll: u8) -> Self {
        Self::new(ChainBehaviour::Confirm(success_confirmation(vec![ChainEvent {
            event_type: format!("{MODULE}::DiceGame::DiceRolled"),
            data: json!({ "roll": roll.to_string() }),
        }])))
    }

    pub fn aborting(vm_status: impl Into<String>) -> Self {
        Self::new(ChainBehaviour::Confirm(Confirmation {
            success: false,
            vm_status: vm_status.into(),
            version: Some(2),
            events: Vec::new(),
        }))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::new(ChainBehaviour::Error(reason.into()))
    }

    pub fn stalled() -> Self {
        Self::new(ChainBehaviour::Stall)
    }

    pub fn waited_on(&self) -> Vec<TransactionHandle> {
        self.waited_on.lock().expect("chain lock poisoned").clone()
    }
}

impl ChainClient for FakeChain {
    async fn wait_for_transaction(&self, handle: &TransactionHandle) -> Result<Confirmation> {
        self.waited_on
            .lock()
            .expect("chain lock poisoned")
            .push(handle.clone());
        match &self.behaviour {
            ChainBehaviour::Confirm(confirmation) => Ok(confirmation.clone()),
            ChainBehaviour::Error(reason) => Err(eyre!("{reason}")),
            ChainBehaviour::Stall => std::future::pending().await,
        }
    }
}

pub fn success_confirmation(events: Vec<ChainEvent>) -> Confirmation {
    Confirmation {
        success: true,
        vm_status: "Executed successfully".to_string(),
        version: Some(1),
        events,
    }
}

pub fn test_config() -> GameConfig {
    let overrides = ConfigOverrides {
        confirmation_timeout: Some(Duration::from_millis(200)),
        ..ConfigOverrides::default()
    };
    GameConfig::resolve(DeploymentEnv::Test, &overrides, None)
        .expect("testnet defaults resolve")
}

pub struct TestContext {
    pub wallet: Arc<FakeWallet>,
    pub chain: Arc<FakeChain>,
    pub config: Arc<GameConfig>,
}

impl TestContext {
    pub fn new(wallet: FakeWallet, chain: FakeChain) -> Self {
        Self::with_config(wallet, chain, test_config())
    }

    pub fn with_config(wallet: FakeWallet, chain: FakeChain, config: GameConfig) -> Self {
        Self {
            wallet: Arc::new(wallet),
            chain: Arc::new(chain),
            config: Arc::new(config),
        }
    }

    pub fn submitter(&self) -> TransactionSubmitter<FakeWallet, FakeChain> {
        TransactionSubmitter::new(self.config.clone(), self.wallet.clone(), self.chain.clone())
    }
}
