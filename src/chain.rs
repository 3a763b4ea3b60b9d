use crate::{
    payload::AccountAddress,
    submitter::{
        ChainClient,
        ChainEvent,
        Confirmation,
        TransactionHandle,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use std::time::Duration;
use tokio::time;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PENDING_TRANSACTION: &str = "pending_transaction";

/// Thin client over a fullnode's REST API.
#[derive(Clone, Debug)]
pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl RestClient {
    pub fn new(node_url: impl Into<String>) -> Result<Self> {
        let raw = node_url.into();
        let trimmed = raw.trim_end_matches('/');
        let base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build HTTP client for node")?;
        Ok(Self {
            base_url,
            http,
            poll_interval: POLL_INTERVAL,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chain_id(&self) -> Result<u8> {
        let info: LedgerInfoDto = self.get_json("").await?.ok_or_else(|| {
            eyre!("node at {} returned no ledger info", self.base_url)
        })?;
        Ok(info.chain_id)
    }

    pub async fn sequence_number(&self, account: &AccountAddress) -> Result<u64> {
        let path = format!("/accounts/{account}");
        let dto: AccountDto = self
            .get_json(&path)
            .await?
            .ok_or_else(|| eyre!("account {account} does not exist on chain; fund it first"))?;
        dto.sequence_number
            .parse()
            .wrap_err("node returned a non-numeric sequence number")
    }

    /// Returns the exact bytes the sender must sign for `txn`.
    pub async fn encode_submission(&self, txn: &UnsignedTransaction) -> Result<Vec<u8>> {
        let encoded: String = self
            .post_json("/transactions/encode_submission", txn)
            .await?;
        let digits = encoded.strip_prefix("0x").unwrap_or(&encoded);
        hex::decode(digits).wrap_err("node returned invalid signing message hex")
    }

    pub async fn submit_signed(&self, txn: &SignedTransaction) -> Result<TransactionHandle> {
        let pending: PendingTransactionDto = self.post_json("/transactions", txn).await?;
        Ok(TransactionHandle(pending.hash))
    }

    pub async fn transaction_by_hash(
        &self,
        handle: &TransactionHandle,
    ) -> Result<Option<TransactionDto>> {
        self.get_json(&format!("/transactions/by_hash/{}", handle.0))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}/v1{}", self.base_url, path);
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err("node request failed")?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .wrap_err("failed to read node response body")?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(eyre!("node responded with {status} for GET {url}: {body}"));
        }
        let value = serde_json::from_slice(&bytes)
            .wrap_err_with(|| format!("invalid node payload from GET {url}"))?;
        Ok(Some(value))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/v1{}", self.base_url, path);
        let res = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .wrap_err("node request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(eyre!("node responded with {status} for POST {url}: {body}"));
        }
        res.json()
            .await
            .wrap_err_with(|| format!("invalid node payload from POST {url}"))
    }
}

impl ChainClient for RestClient {
    /// Polls until the transaction is committed. Not bounded here; the
    /// submitter owns the timeout.
    async fn wait_for_transaction(&self, handle: &TransactionHandle) -> Result<Confirmation> {
        loop {
            let txn = self.transaction_by_hash(handle).await?;
            if let Some(confirmation) = poll_step(handle, txn) {
                return confirmation;
            }
            time::sleep(self.poll_interval).await;
        }
    }
}

/// One look at a transaction by hash: `None` while it is unknown to the
/// node (404) or still pending.
fn poll_step(
    handle: &TransactionHandle,
    txn: Option<TransactionDto>,
) -> Option<Result<Confirmation>> {
    match txn {
        Some(txn) if txn.kind != PENDING_TRANSACTION => Some(txn.into_confirmation()),
        Some(_) => {
            debug!(hash = %handle, "transaction pending");
            None
        }
        None => {
            debug!(hash = %handle, "transaction not yet visible");
            None
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UnsignedTransaction {
    pub sender: String,
    pub sequence_number: String,
    pub max_gas_amount: String,
    pub gas_unit_price: String,
    pub expiration_timestamp_secs: String,
    pub payload: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub transaction: UnsignedTransaction,
    pub signature: SignatureDto,
}

#[derive(Clone, Debug, Serialize)]
pub struct SignatureDto {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub public_key: String,
    pub signature: String,
}

impl SignatureDto {
    pub fn ed25519(public_key: &[u8], signature: &[u8]) -> Self {
        Self {
            kind: "ed25519_signature",
            public_key: format!("0x{}", hex::encode(public_key)),
            signature: format!("0x{}", hex::encode(signature)),
        }
    }
}

#[derive(Deserialize)]
struct LedgerInfoDto {
    chain_id: u8,
}

#[derive(Deserialize)]
struct AccountDto {
    sequence_number: String,
}

#[derive(Deserialize)]
struct PendingTransactionDto {
    hash: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransactionDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub vm_status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub events: Vec<EventDto>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventDto {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl TransactionDto {
    fn into_confirmation(self) -> Result<Confirmation> {
        let success = self
            .success
            .ok_or_else(|| eyre!("committed transaction {} has no success flag", self.hash))?;
        Ok(Confirmation {
            success,
            vm_status: self.vm_status.unwrap_or_default(),
            version: self.version.and_then(|v| v.parse().ok()),
            events: self
                .events
                .into_iter()
                .map(|e| ChainEvent {
                    event_type: e.event_type,
                    data: e.data,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    #[test]
    fn new__normalizes_trailing_slash_and_version_suffix() {
        let a = RestClient::new("https://fullnode.testnet.aptoslabs.com/v1/").unwrap();
        let b = RestClient::new("http://127.0.0.1:8080/").unwrap();

        assert_eq!(a.base_url(), "https://fullnode.testnet.aptoslabs.com");
        assert_eq!(b.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn into_confirmation__maps_committed_user_transaction() {
        // given
        let dto: TransactionDto = serde_json::from_value(json!({
            "type": "user_transaction",
            "hash": "0xfeed",
            "success": false,
            "vm_status": "Move abort: EINSUFFICIENT_BALANCE",
            "version": "4242",
            "events": [
                { "type": "0x1::DiceGame::DiceRolled", "data": { "roll": "4" } }
            ]
        }))
        .unwrap();

        // when
        let confirmation = dto.into_confirmation().unwrap();

        // then
        assert!(!confirmation.success);
        assert_eq!(confirmation.version, Some(4242));
        assert_eq!(confirmation.events.len(), 1);
        assert!(confirmation.vm_status.contains("EINSUFFICIENT_BALANCE"));
    }

    fn handle() -> TransactionHandle {
        TransactionHandle("0xfeed".to_string())
    }

    #[test]
    fn poll_step__keeps_polling_while_unknown_or_pending() {
        // given
        let pending: TransactionDto = serde_json::from_value(json!({
            "type": "pending_transaction",
            "hash": "0xfeed"
        }))
        .unwrap();

        // then
        assert!(poll_step(&handle(), None).is_none());
        assert!(poll_step(&handle(), Some(pending)).is_none());
    }

    #[test]
    fn poll_step__stops_on_committed_transaction() {
        // given
        let committed: TransactionDto = serde_json::from_value(json!({
            "type": "user_transaction",
            "hash": "0xfeed",
            "success": true,
            "vm_status": "Executed successfully",
            "version": "7"
        }))
        .unwrap();

        // when
        let confirmation = poll_step(&handle(), Some(committed)).unwrap().unwrap();

        // then
        assert!(confirmation.success);
        assert_eq!(confirmation.version, Some(7));
    }

    #[test]
    fn poll_step__committed_without_success_flag_is_an_error() {
        let committed: TransactionDto = serde_json::from_value(json!({
            "type": "user_transaction",
            "hash": "0xfeed"
        }))
        .unwrap();

        let res = poll_step(&handle(), Some(committed)).unwrap();

        assert!(res.is_err());
    }

    #[test]
    fn signed_transaction__flattens_fields_next_to_signature() {
        // given
        let signed = SignedTransaction {
            transaction: UnsignedTransaction {
                sender: "0x1".to_string(),
                sequence_number: "3".to_string(),
                max_gas_amount: "2000".to_string(),
                gas_unit_price: "100".to_string(),
                expiration_timestamp_secs: "1700000000".to_string(),
                payload: json!({}),
            },
            signature: SignatureDto::ed25519(&[1, 2], &[3, 4]),
        };

        // when
        let value = serde_json::to_value(&signed).unwrap();

        // then
        assert_eq!(value["sequence_number"], json!("3"));
        assert_eq!(value["signature"]["type"], json!("ed25519_signature"));
        assert_eq!(value["signature"]["public_key"], json!("0x0102"));
        assert_eq!(value["signature"]["signature"], json!("0x0304"));
    }
}
