use crate::bet::BetRequest;
use serde::{
    Deserialize,
    Serialize,
    Serializer,
    ser::SerializeStruct,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    str::FromStr,
};

pub const PLAY_DICE: &str = "play_dice";
pub const INITIALIZE_HOUSE: &str = "initialize_house";

const ADDRESS_HEX_LEN: usize = 64;

/// A 32-byte account address, kept in its canonical `0x`-prefixed,
/// zero-padded lowercase hex form.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountAddress(String);

impl AccountAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234...cdef`, for status lines.
    pub fn short(&self) -> String {
        let digits = &self.0[2..];
        format!("0x{}...{}", &digits[..4], &digits[digits.len() - 4..])
    }
}

impl FromStr for AccountAddress {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > ADDRESS_HEX_LEN {
            return Err(format!("'{raw}' is not a valid account address"));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{raw}' contains non-hex characters"));
        }
        Ok(Self(format!(
            "0x{:0>width$}",
            digits.to_ascii_lowercase(),
            width = ADDRESS_HEX_LEN
        )))
    }
}

impl TryFrom<String> for AccountAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountAddress> for String {
    fn from(value: AccountAddress) -> Self {
        value.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `<address>::<module>`, the published Move module the game lives in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleId {
    pub address: AccountAddress,
    pub name: String,
}

impl ModuleId {
    pub fn function(&self, function: &str) -> String {
        format!("{}::{}::{}", self.address, self.name, function)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryArgument {
    Address(AccountAddress),
    U64(u64),
    Bool(bool),
}

impl EntryArgument {
    /// Wallet adapters take plain JSON numbers.
    fn to_wallet_json(&self) -> Value {
        match self {
            EntryArgument::Address(a) => json!(a.as_str()),
            EntryArgument::U64(n) => json!(n),
            EntryArgument::Bool(b) => json!(b),
        }
    }

    /// The node REST API wants u64 as a decimal string.
    fn to_rest_json(&self) -> Value {
        match self {
            EntryArgument::Address(a) => json!(a.as_str()),
            EntryArgument::U64(n) => json!(n.to_string()),
            EntryArgument::Bool(b) => json!(b),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryFunctionPayload {
    pub function: String,
    pub arguments: Vec<EntryArgument>,
}

impl EntryFunctionPayload {
    /// `play_dice(house_owner, stake, high_bet)`. The argument order is part
    /// of the deployed ABI.
    pub fn play_dice(
        module: &ModuleId,
        house_owner: &AccountAddress,
        request: &BetRequest,
    ) -> Self {
        Self {
            function: module.function(PLAY_DICE),
            arguments: vec![
                EntryArgument::Address(house_owner.clone()),
                EntryArgument::U64(request.stake.base_units()),
                EntryArgument::Bool(request.direction.is_high()),
            ],
        }
    }

    pub fn initialize_house(module: &ModuleId, house_edge_percent: u64) -> Self {
        Self {
            function: module.function(INITIALIZE_HOUSE),
            arguments: vec![EntryArgument::U64(house_edge_percent)],
        }
    }

    pub fn to_rest_json(&self) -> Value {
        json!({
            "type": "entry_function_payload",
            "function": self.function,
            "type_arguments": [],
            "arguments": self
                .arguments
                .iter()
                .map(EntryArgument::to_rest_json)
                .collect::<Vec<_>>(),
        })
    }
}

impl Serialize for EntryFunctionPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let arguments: Vec<Value> = self
            .arguments
            .iter()
            .map(EntryArgument::to_wallet_json)
            .collect();
        let mut state = serializer.serialize_struct("EntryFunctionPayload", 2)?;
        state.serialize_field("function", &self.function)?;
        state.serialize_field("functionArguments", &arguments)?;
        state.end()
    }
}
