//! Protocol types.

use crate::crypto::Commitment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Participant identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new random account ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A player's move
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    /// Wire/storage code for this move (0, 1, 2)
    pub fn code(&self) -> u8 {
        match self {
            Choice::Rock => 0,
            Choice::Paper => 1,
            Choice::Scissors => 2,
        }
    }

    /// Decode a move from its storage code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Choice::Rock),
            1 => Some(Choice::Paper),
            2 => Some(Choice::Scissors),
            _ => None,
        }
    }

    /// Check if this choice beats the other
    pub fn beats(&self, other: &Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Scissors, Choice::Paper)
                | (Choice::Paper, Choice::Rock)
        )
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Rock => write!(f, "Rock"),
            Choice::Paper => write!(f, "Paper"),
            Choice::Scissors => write!(f, "Scissors"),
        }
    }
}

/// One of the two fixed player positions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// Array index of this slot (0 or 1)
    pub fn index(&self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    /// Slot byte used in commitment hashing
    pub fn as_u8(&self) -> u8 {
        self.index() as u8
    }

    /// Decode a slot from its array index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Slot::A),
            1 => Some(Slot::B),
            _ => None,
        }
    }

    /// Get the opponent's slot
    pub fn opponent(&self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Protocol phase, advancing monotonically within one game
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Commit,
    Reveal,
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Commit => write!(f, "commit"),
            Phase::Reveal => write!(f, "reveal"),
            Phase::GameOver => write!(f, "game_over"),
        }
    }
}

/// Why a game ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Aborted,
    Forfeited,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Completed => write!(f, "normal-completion"),
            EndReason::Aborted => write!(f, "abort"),
            EndReason::Forfeited => write!(f, "forfeiture"),
        }
    }
}

/// Resolution of a finished game; `winner` is `None` on a draw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub winner: Option<Slot>,
    pub reason: EndReason,
}

/// The authoritative record for the single game slot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_number: u64,
    pub phase: Phase,
    pub players: [Option<AccountId>; 2],
    pub committed: [bool; 2],
    pub commitments: [Option<Commitment>; 2],
    pub revealed: [bool; 2],
    pub choices: [Option<Choice>; 2],
    pub timeout_start_time: DateTime<Utc>,
    pub outcome: Option<Outcome>,
}

impl Game {
    /// Create a fresh game in the Init phase
    pub fn new(game_number: u64, now: DateTime<Utc>) -> Self {
        Self {
            game_number,
            phase: Phase::Init,
            players: [None, None],
            committed: [false, false],
            commitments: [None, None],
            revealed: [false, false],
            choices: [None, None],
            timeout_start_time: now,
            outcome: None,
        }
    }

    /// The slot occupied by `account`, if it is a registered player
    pub fn slot_of(&self, account: AccountId) -> Option<Slot> {
        self.players
            .iter()
            .position(|p| *p == Some(account))
            .and_then(Slot::from_index)
    }

    /// The player occupying `slot`, if any
    pub fn player(&self, slot: Slot) -> Option<AccountId> {
        self.players[slot.index()]
    }

    /// Number of filled player slots
    pub fn player_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_some()).count()
    }

    pub fn both_committed(&self) -> bool {
        self.committed.iter().all(|c| *c)
    }

    pub fn both_revealed(&self) -> bool {
        self.revealed.iter().all(|r| *r)
    }
}

/// Finalized record of a past game, carried in the GameOver notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletedGame {
    pub game_number: u64,
    pub players: [Option<AccountId>; 2],
    pub choices: [Option<Choice>; 2],
    pub winner: Option<Slot>,
    pub reason: EndReason,
}
