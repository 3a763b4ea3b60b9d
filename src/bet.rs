use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

/// Smallest stake the form accepts, in whole coins.
pub const MIN_STAKE_COINS: u64 = 1;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Low,
    #[default]
    High,
}

impl Direction {
    pub fn is_high(self) -> bool {
        matches!(self, Direction::High)
    }

    pub fn toggled(self) -> Self {
        match self {
            Direction::Low => Direction::High,
            Direction::High => Direction::Low,
        }
    }

    pub fn range_label(self) -> &'static str {
        match self {
            Direction::Low => "Low (1-3)",
            Direction::High => "High (4-6)",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Low => "low",
            Direction::High => "high",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StakeError {
    Empty,
    Malformed(String),
    TooManyDecimals { max: u8 },
    Overflow,
    BelowMinimum,
}

impl fmt::Display for StakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeError::Empty => write!(f, "stake amount is empty"),
            StakeError::Malformed(raw) => write!(f, "'{raw}' is not a valid amount"),
            StakeError::TooManyDecimals { max } => {
                write!(f, "stake supports at most {max} decimal places")
            }
            StakeError::Overflow => write!(f, "stake amount is too large"),
            StakeError::BelowMinimum => {
                write!(f, "stake must be at least {MIN_STAKE_COINS}")
            }
        }
    }
}

impl std::error::Error for StakeError {}

/// A stake expressed in the chain's smallest unit.
///
/// Display amounts are entered in whole coins with up to `decimals`
/// fractional digits and converted once, here, without floating point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Stake {
    base_units: u64,
    decimals: u8,
}

impl Stake {
    pub fn parse(raw: &str, decimals: u8) -> Result<Self, StakeError> {
        let stake = Self {
            base_units: parse_base_units(raw, decimals)?,
            decimals,
        };
        if !stake.meets_minimum() {
            return Err(StakeError::BelowMinimum);
        }
        Ok(stake)
    }

    pub fn from_base_units(base_units: u64, decimals: u8) -> Self {
        Self {
            base_units,
            decimals,
        }
    }

    pub fn base_units(&self) -> u64 {
        self.base_units
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn meets_minimum(&self) -> bool {
        unit_for(self.decimals)
            .and_then(|unit| unit.checked_mul(MIN_STAKE_COINS))
            .is_some_and(|min| self.base_units >= min)
    }
}

impl fmt::Display for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_base_units(self.base_units, self.decimals))
    }
}

pub fn unit_for(decimals: u8) -> Option<u64> {
    10u64.checked_pow(decimals as u32)
}

/// Parses a non-negative decimal amount into base units, with no minimum.
pub fn parse_base_units(raw: &str, decimals: u8) -> Result<u64, StakeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StakeError::Empty);
    }
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty())
        || !all_digits(whole)
        || !all_digits(fraction)
    {
        return Err(StakeError::Malformed(raw.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(StakeError::TooManyDecimals { max: decimals });
    }

    let unit = unit_for(decimals).ok_or(StakeError::Overflow)?;
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| StakeError::Overflow)?
    };
    let fraction_units: u64 = if fraction.is_empty() {
        0
    } else {
        let padding = decimals as u32 - fraction.len() as u32;
        let digits: u64 = fraction.parse().map_err(|_| StakeError::Overflow)?;
        digits * 10u64.pow(padding)
    };
    whole
        .checked_mul(unit)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or(StakeError::Overflow)
}

pub fn format_base_units(amount: u64, decimals: u8) -> String {
    let Some(unit) = unit_for(decimals) else {
        return amount.to_string();
    };
    let whole = amount / unit;
    let fractional = amount % unit;
    if fractional == 0 {
        format!("{whole}")
    } else {
        let width = decimals as usize;
        let padded = format!("{fractional:0width$}");
        format!("{whole}.{}", padded.trim_end_matches('0'))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BetRequest {
    pub stake: Stake,
    pub direction: Direction,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BetFormError {
    NotConnected,
    InFlight,
    /// Parses, but is under the minimum stake.
    StakeTooSmall,
    InvalidStake(StakeError),
}

impl fmt::Display for BetFormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetFormError::NotConnected => write!(f, "Please connect your wallet first"),
            BetFormError::InFlight => write!(f, "A bet is already being rolled"),
            BetFormError::StakeTooSmall => {
                write!(f, "Bet amount must be at least {MIN_STAKE_COINS}")
            }
            BetFormError::InvalidStake(e) => write!(f, "Invalid bet amount: {e}"),
        }
    }
}

impl std::error::Error for BetFormError {}

impl From<StakeError> for BetFormError {
    fn from(e: StakeError) -> Self {
        match e {
            StakeError::BelowMinimum => BetFormError::StakeTooSmall,
            other => BetFormError::InvalidStake(other),
        }
    }
}

/// Controlled bet input: the text of the stake field, the chosen direction,
/// and whether a submission is outstanding.
#[derive(Clone, Debug)]
pub struct BetForm {
    stake_input: String,
    direction: Direction,
    in_flight: bool,
    decimals: u8,
}

impl BetForm {
    pub fn new(decimals: u8) -> Self {
        Self {
            stake_input: MIN_STAKE_COINS.to_string(),
            direction: Direction::default(),
            in_flight: false,
            decimals,
        }
    }

    pub fn stake_input(&self) -> &str {
        &self.stake_input
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn toggle_direction(&mut self) {
        self.direction = self.direction.toggled();
    }

    pub fn set_stake_input(&mut self, raw: impl Into<String>) {
        self.stake_input = raw.into();
    }

    pub fn push_digit(&mut self, digit: char) {
        if !digit.is_ascii_digit() {
            return;
        }
        if let Some((_, fraction)) = self.stake_input.split_once('.')
            && fraction.len() >= self.decimals as usize
        {
            return;
        }
        if self.stake_input == "0" {
            self.stake_input.clear();
        }
        self.stake_input.push(digit);
    }

    pub fn push_decimal_point(&mut self) {
        if self.decimals == 0 || self.stake_input.contains('.') {
            return;
        }
        if self.stake_input.is_empty() {
            self.stake_input.push('0');
        }
        self.stake_input.push('.');
    }

    pub fn backspace(&mut self) {
        self.stake_input.pop();
    }

    /// Adds one whole coin to the current stake. An empty or unreadable field
    /// resets to the minimum; a stake that cannot grow is left as typed.
    pub fn increment(&mut self) {
        let Some(unit) = unit_for(self.decimals) else {
            return;
        };
        match parse_base_units(&self.stake_input, self.decimals) {
            Ok(units) => {
                if let Some(next) = units.checked_add(unit) {
                    self.stake_input = format_base_units(next, self.decimals);
                }
            }
            Err(StakeError::Empty | StakeError::Malformed(_)) => {
                self.stake_input = MIN_STAKE_COINS.to_string();
            }
            Err(_) => {}
        }
    }

    /// Removes one whole coin, clamping at the minimum stake.
    pub fn decrement(&mut self) {
        let next = self
            .parsed_units()
            .map(|(units, unit)| {
                let min = unit.saturating_mul(MIN_STAKE_COINS);
                units.saturating_sub(unit).max(min)
            })
            .map(|units| format_base_units(units, self.decimals))
            .unwrap_or_else(|| MIN_STAKE_COINS.to_string());
        self.stake_input = next;
    }

    pub fn can_submit(&self, connected: bool) -> bool {
        connected && !self.in_flight
    }

    /// Validates the form and, when accepted, marks it in flight until
    /// [`BetForm::settle`] is called.
    pub fn submit(&mut self, connected: bool) -> Result<BetRequest, BetFormError> {
        if !connected {
            return Err(BetFormError::NotConnected);
        }
        if self.in_flight {
            return Err(BetFormError::InFlight);
        }
        let stake = Stake::parse(&self.stake_input, self.decimals)?;
        self.in_flight = true;
        Ok(BetRequest {
            stake,
            direction: self.direction,
        })
    }

    pub fn settle(&mut self) {
        self.in_flight = false;
    }

    fn parsed_units(&self) -> Option<(u64, u64)> {
        let unit = unit_for(self.decimals)?;
        let units = parse_base_units(&self.stake_input, self.decimals).ok()?;
        Some((units, unit))
    }
}
