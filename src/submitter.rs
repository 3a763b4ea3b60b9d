use crate::{
    bet::BetRequest,
    config::GameConfig,
    payload::{
        AccountAddress,
        EntryFunctionPayload,
    },
    reporter::DieFace,
};
use color_eyre::eyre::{
    Report,
    Result,
    eyre,
};
use serde_json::Value;
use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::watch,
    time,
};
use tracing::{
    info,
    warn,
};

pub const SUCCESS_NOTICE: &str = "Dice rolled successfully! Check your result.";
pub const FAILURE_NOTICE: &str = "Transaction failed. Please try again.";

/// Hash of a submitted transaction, used only to await its confirmation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TransactionHandle(pub String);

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainEvent {
    pub event_type: String,
    pub data: Value,
}

/// What the chain reports once a transaction has left the mempool.
#[derive(Clone, Debug, PartialEq)]
pub struct Confirmation {
    pub success: bool,
    pub vm_status: String,
    pub version: Option<u64>,
    pub events: Vec<ChainEvent>,
}

impl Confirmation {
    /// Roll carried by the first event whose type ends with `event_suffix`.
    pub fn settled_roll(&self, event_suffix: &str) -> Option<DieFace> {
        self.events
            .iter()
            .filter(|e| e.event_type.ends_with(event_suffix))
            .find_map(|e| {
                let roll = &e.data["roll"];
                roll.as_u64()
                    .or_else(|| roll.as_str().and_then(|s| s.parse().ok()))
                    .and_then(|n| u8::try_from(n).ok())
                    .and_then(DieFace::new)
            })
    }
}

/// The user's key-holding agent.
pub trait Wallet: Send + Sync + 'static {
    /// Connected account, if any.
    fn account(&self) -> Option<AccountAddress>;

    fn sign_and_submit(
        &self,
        payload: &EntryFunctionPayload,
    ) -> impl Future<Output = Result<TransactionHandle>> + Send;
}

pub trait ChainClient: Send + Sync + 'static {
    fn wait_for_transaction(
        &self,
        handle: &TransactionHandle,
    ) -> impl Future<Output = Result<Confirmation>> + Send;
}

pub enum SubmissionError {
    NotConnected,
    UnitMismatch { expected: u8, actual: u8 },
    SubmissionRejected(Report),
    ConfirmationFailed {
        handle: Option<TransactionHandle>,
        cause: Report,
    },
    ConfirmationTimeout {
        handle: TransactionHandle,
        after: Duration,
    },
    /// `handle` is `None` when the wallet had not yet submitted.
    Cancelled { handle: Option<TransactionHandle> },
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionError::NotConnected => write!(f, "no wallet account connected"),
            SubmissionError::UnitMismatch { expected, actual } => write!(
                f,
                "stake was parsed with {actual} decimals but the deployment uses {expected}"
            ),
            SubmissionError::SubmissionRejected(cause) => {
                write!(f, "transaction was not submitted: {cause}")
            }
            SubmissionError::ConfirmationFailed {
                handle: Some(handle),
                cause,
            } => write!(f, "transaction {handle} did not confirm: {cause}"),
            SubmissionError::ConfirmationFailed { handle: None, cause } => {
                write!(f, "transaction did not confirm: {cause}")
            }
            SubmissionError::ConfirmationTimeout { handle, after } => {
                write!(f, "gave up waiting for {handle} after {after:?}")
            }
            SubmissionError::Cancelled {
                handle: Some(handle),
            } => write!(f, "stopped waiting for {handle}"),
            SubmissionError::Cancelled { handle: None } => {
                write!(f, "stopped waiting for the wallet to submit")
            }
        }
    }
}

impl fmt::Debug for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for SubmissionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmissionError::SubmissionRejected(cause)
            | SubmissionError::ConfirmationFailed { cause, .. } => {
                let cause: &(dyn std::error::Error + 'static) = cause.as_ref();
                Some(cause)
            }
            _ => None,
        }
    }
}

/// Receiving half of a cancellation signal for a confirmation wait.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // sender dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settlement {
    pub handle: TransactionHandle,
    pub confirmation: Confirmation,
}

/// Builds entry-function calls, hands them to the wallet and waits for the
/// chain to confirm them. Holds no per-bet state; the caller keeps at most
/// one submission in flight.
pub struct TransactionSubmitter<W, C> {
    config: Arc<GameConfig>,
    wallet: Arc<W>,
    chain: Arc<C>,
}

impl<W, C> Clone for TransactionSubmitter<W, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            wallet: self.wallet.clone(),
            chain: self.chain.clone(),
        }
    }
}

impl<W: Wallet, C: ChainClient> TransactionSubmitter<W, C> {
    pub fn new(config: Arc<GameConfig>, wallet: Arc<W>, chain: Arc<C>) -> Self {
        Self {
            config,
            wallet,
            chain,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn account(&self) -> Option<AccountAddress> {
        self.wallet.account()
    }

    pub fn is_connected(&self) -> bool {
        self.wallet.account().is_some()
    }

    pub fn play_dice_payload(&self, request: &BetRequest) -> EntryFunctionPayload {
        EntryFunctionPayload::play_dice(
            &self.config.module,
            &self.config.house_owner,
            request,
        )
    }

    /// Submits `play_dice` for the request. The stake must already be in the
    /// deployment's base unit; it is sent without further scaling.
    pub async fn submit_bet(
        &self,
        request: &BetRequest,
        cancel: CancelToken,
    ) -> Result<Settlement, SubmissionError> {
        if self.wallet.account().is_none() {
            return Err(SubmissionError::NotConnected);
        }
        if request.stake.decimals() != self.config.coin_decimals {
            return Err(SubmissionError::UnitMismatch {
                expected: self.config.coin_decimals,
                actual: request.stake.decimals(),
            });
        }
        let payload = self.play_dice_payload(request);
        self.submit(payload, cancel).await
    }

    pub async fn initialize_house(
        &self,
        cancel: CancelToken,
    ) -> Result<Settlement, SubmissionError> {
        let payload = EntryFunctionPayload::initialize_house(
            &self.config.module,
            self.config.house_edge_percent,
        );
        self.submit(payload, cancel).await
    }

    async fn submit(
        &self,
        payload: EntryFunctionPayload,
        mut cancel: CancelToken,
    ) -> Result<Settlement, SubmissionError> {
        let Some(account) = self.wallet.account() else {
            return Err(SubmissionError::NotConnected);
        };
        info!(sender = %account, function = %payload.function, "submitting transaction");

        let timeout = self.config.confirmation_timeout;
        let deadline = time::Instant::now() + timeout;
        let handle = tokio::select! {
            res = self.wallet.sign_and_submit(&payload) => {
                res.map_err(SubmissionError::SubmissionRejected)?
            }
            _ = time::sleep_until(deadline) => {
                warn!(?timeout, "wallet did not submit in time");
                return Err(SubmissionError::SubmissionRejected(eyre!(
                    "wallet did not submit within {timeout:?}"
                )));
            }
            _ = cancel.cancelled() => {
                warn!("cancelled before the wallet submitted");
                return Err(SubmissionError::Cancelled { handle: None });
            }
        };
        info!(hash = %handle, "transaction submitted, awaiting confirmation");

        // signing and confirmation share one deadline
        let confirmation = tokio::select! {
            res = self.chain.wait_for_transaction(&handle) => {
                res.map_err(|cause| SubmissionError::ConfirmationFailed {
                    handle: Some(handle.clone()),
                    cause,
                })?
            }
            _ = time::sleep_until(deadline) => {
                warn!(hash = %handle, ?timeout, "confirmation timed out");
                return Err(SubmissionError::ConfirmationTimeout {
                    handle: handle.clone(),
                    after: timeout,
                });
            }
            _ = cancel.cancelled() => {
                warn!(hash = %handle, "confirmation wait cancelled");
                return Err(SubmissionError::Cancelled {
                    handle: Some(handle.clone()),
                });
            }
        };

        if !confirmation.success {
            return Err(SubmissionError::ConfirmationFailed {
                cause: eyre!("execution failed: {}", confirmation.vm_status),
                handle: Some(handle),
            });
        }
        info!(hash = %handle, version = ?confirmation.version, "transaction confirmed");
        Ok(Settlement {
            handle,
            confirmation,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    fn confirmation_with(events: Vec<ChainEvent>) -> Confirmation {
        Confirmation {
            success: true,
            vm_status: "Executed successfully".to_string(),
            version: Some(1),
            events,
        }
    }

    #[test]
    fn settled_roll__reads_numeric_and_string_rolls() {
        let numeric = confirmation_with(vec![ChainEvent {
            event_type: "0x1::DiceGame::DiceRolled".to_string(),
            data: json!({ "roll": 5 }),
        }]);
        let string = confirmation_with(vec![ChainEvent {
            event_type: "0x1::DiceGame::DiceRolled".to_string(),
            data: json!({ "roll": "2" }),
        }]);

        assert_eq!(
            numeric.settled_roll("DiceGame::DiceRolled").map(DieFace::value),
            Some(5)
        );
        assert_eq!(
            string.settled_roll("DiceGame::DiceRolled").map(DieFace::value),
            Some(2)
        );
    }

    #[test]
    fn settled_roll__ignores_other_events_and_out_of_range_values() {
        let confirmation = confirmation_with(vec![
            ChainEvent {
                event_type: "0x1::coin::WithdrawEvent".to_string(),
                data: json!({ "roll": 3 }),
            },
            ChainEvent {
                event_type: "0x1::DiceGame::DiceRolled".to_string(),
                data: json!({ "roll": 9 }),
            },
        ]);

        assert_eq!(confirmation.settled_roll("DiceGame::DiceRolled"), None);
    }

    #[test]
    fn display__timeout_keeps_sub_second_precision() {
        let err = SubmissionError::ConfirmationTimeout {
            handle: TransactionHandle("0xbeef".to_string()),
            after: Duration::from_millis(250),
        };

        assert_eq!(err.to_string(), "gave up waiting for 0xbeef after 250ms");
    }

    #[tokio::test]
    async fn cancel_token__never_does_not_resolve() {
        let mut token = CancelToken::never();

        let res =
            time::timeout(Duration::from_millis(20), token.cancelled()).await;

        assert!(res.is_err());
    }

    #[tokio::test]
    async fn cancel_token__resolves_after_cancel() {
        let (handle, mut token) = cancel_pair();

        handle.cancel();

        time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }
}
