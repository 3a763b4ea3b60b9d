use crate::{
    chain::{
        RestClient,
        SignatureDto,
        SignedTransaction,
        UnsignedTransaction,
    },
    payload::{
        AccountAddress,
        EntryFunctionPayload,
    },
    submitter::{
        TransactionHandle,
        Wallet,
    },
};
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ed25519_dalek::{
    Signer,
    SigningKey,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use sha3::{
    Digest,
    Sha3_256,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const ED25519_SCHEME: u8 = 0x00;
const DEFAULT_MAX_GAS_AMOUNT: u64 = 10_000;
const DEFAULT_GAS_UNIT_PRICE: u64 = 100;
const TX_EXPIRATION_SECS: i64 = 60;

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".aptos").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("wallet") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Prompts for the keystore password and decrypts the Ed25519 seed.
pub fn unlock_wallet(descriptor: &WalletDescriptor, node: RestClient) -> Result<KeystoreWallet> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;

    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;

    let seed: [u8; 32] = secret.as_slice().try_into().map_err(|_| {
        eyre!(
            "Wallet '{}' contained unsupported key material ({} bytes, expected 32)",
            descriptor.name,
            secret.len()
        )
    })?;
    Ok(KeystoreWallet::new(SigningKey::from_bytes(&seed), node))
}

/// Authentication key of a single-signer Ed25519 account, which is also its
/// address until the key is rotated.
pub fn derive_address(public_key: &[u8; 32]) -> AccountAddress {
    let mut hasher = Sha3_256::new();
    hasher.update(public_key);
    hasher.update([ED25519_SCHEME]);
    AccountAddress::from_bytes(hasher.finalize().into())
}

/// A locally held Ed25519 key that signs through the node's
/// `encode_submission` endpoint.
pub struct KeystoreWallet {
    signing_key: SigningKey,
    address: AccountAddress,
    node: RestClient,
}

impl KeystoreWallet {
    pub fn new(signing_key: SigningKey, node: RestClient) -> Self {
        let address = derive_address(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
            node,
        }
    }

    pub fn address(&self) -> &AccountAddress {
        &self.address
    }
}

impl Wallet for KeystoreWallet {
    fn account(&self) -> Option<AccountAddress> {
        Some(self.address.clone())
    }

    async fn sign_and_submit(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<TransactionHandle> {
        let sequence_number = self.node.sequence_number(&self.address).await?;
        let expiration = Utc::now().timestamp() + TX_EXPIRATION_SECS;
        let unsigned = UnsignedTransaction {
            sender: self.address.to_string(),
            sequence_number: sequence_number.to_string(),
            max_gas_amount: DEFAULT_MAX_GAS_AMOUNT.to_string(),
            gas_unit_price: DEFAULT_GAS_UNIT_PRICE.to_string(),
            expiration_timestamp_secs: expiration.to_string(),
            payload: payload.to_rest_json(),
        };
        let message = self
            .node
            .encode_submission(&unsigned)
            .await
            .wrap_err("failed to encode transaction for signing")?;
        let signature = self.signing_key.sign(&message);
        let signed = SignedTransaction {
            transaction: unsigned,
            signature: SignatureDto::ed25519(
                &self.signing_key.verifying_key().to_bytes(),
                &signature.to_bytes(),
            ),
        };
        self.node
            .submit_signed(&signed)
            .await
            .wrap_err("node rejected signed transaction")
    }
}

/// The wallet slot of a session: either an unlocked keystore or nothing.
pub enum SessionWallet {
    Keystore(KeystoreWallet),
    Disconnected,
}

impl Wallet for SessionWallet {
    fn account(&self) -> Option<AccountAddress> {
        match self {
            SessionWallet::Keystore(w) => w.account(),
            SessionWallet::Disconnected => None,
        }
    }

    async fn sign_and_submit(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<TransactionHandle> {
        match self {
            SessionWallet::Keystore(w) => w.sign_and_submit(payload).await,
            SessionWallet::Disconnected => Err(eyre!("no wallet connected")),
        }
    }
}
