use crate::bet::{
    Direction,
    Stake,
};
use chrono::{
    DateTime,
    Utc,
};
use rand::Rng;
use std::collections::VecDeque;

const RESULT_HISTORY_DEPTH: usize = 10;

/// One face of a six-sided die.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DieFace(u8);

impl DieFace {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn roll<R: Rng>(rng: &mut R) -> Self {
        Self(rng.random_range(Self::MIN..=Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

pub fn is_win(direction: Direction, face: DieFace) -> bool {
    match direction {
        Direction::High => face.value() >= 4,
        Direction::Low => face.value() <= 3,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimulatedOutcome {
    pub rolled: DieFace,
    pub won: bool,
}

impl SimulatedOutcome {
    pub fn new(direction: Direction, rolled: DieFace) -> Self {
        Self {
            rolled,
            won: is_win(direction, rolled),
        }
    }
}

/// Where a reported roll came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutcomeSource {
    /// Drawn locally after confirmation; not verified against the chain.
    Simulated,
    /// Read from the contract's settlement event.
    ChainEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BetResult {
    pub stake: Stake,
    pub direction: Direction,
    pub outcome: SimulatedOutcome,
    pub source: OutcomeSource,
    pub tx_hash: String,
    pub settled_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionStats {
    games_played: u64,
    wins: u64,
}

impl SessionStats {
    pub fn games_played(&self) -> u64 {
        self.games_played
    }

    pub fn wins(&self) -> u64 {
        self.wins
    }

    pub fn losses(&self) -> u64 {
        self.games_played - self.wins
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.games_played == 0 {
            return None;
        }
        Some(self.wins as f64 / self.games_played as f64 * 100.0)
    }

    /// Win rate as a percentage to one decimal place, hidden until the first
    /// game has been played.
    pub fn win_rate_display(&self) -> Option<String> {
        self.win_rate().map(|rate| format!("{rate:.1}"))
    }

    fn record(&mut self, won: bool) {
        self.games_played += 1;
        if won {
            self.wins += 1;
        }
    }
}

/// Turns confirmed bets into outcomes and keeps the session tally.
#[derive(Debug, Default)]
pub struct ResultReporter {
    stats: SessionStats,
    history: VecDeque<BetResult>,
}

impl ResultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws a roll for a confirmed bet and records it.
    pub fn settle<R: Rng>(
        &mut self,
        stake: Stake,
        direction: Direction,
        tx_hash: impl Into<String>,
        rng: &mut R,
    ) -> &BetResult {
        let face = DieFace::roll(rng);
        self.record(stake, direction, face, OutcomeSource::Simulated, tx_hash)
    }

    pub fn record(
        &mut self,
        stake: Stake,
        direction: Direction,
        face: DieFace,
        source: OutcomeSource,
        tx_hash: impl Into<String>,
    ) -> &BetResult {
        let outcome = SimulatedOutcome::new(direction, face);
        self.stats.record(outcome.won);
        tracing::info!(
            roll = face.value(),
            won = outcome.won,
            %direction,
            ?source,
            games = self.stats.games_played(),
            "bet settled"
        );
        self.history.push_front(BetResult {
            stake,
            direction,
            outcome,
            source,
            tx_hash: tx_hash.into(),
            settled_at: Utc::now(),
        });
        self.history.truncate(RESULT_HISTORY_DEPTH);
        &self.history[0]
    }

    pub fn latest(&self) -> Option<&BetResult> {
        self.history.front()
    }

    pub fn history(&self) -> impl Iterator<Item = &BetResult> {
        self.history.iter()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}
