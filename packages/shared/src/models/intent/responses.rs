use serde::{Deserialize, Serialize};

use crate::models::clock::ClockSnapshot;
use crate::models::log_entry::MatchLogEntry;
use crate::models::match_session::MatchPhase;
use crate::models::piece::Color;

/// Entries appended by one accepted intent, split per viewer, plus the clock
/// as it stood when the intent was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub white: Vec<MatchLogEntry>,
    pub black: Vec<MatchLogEntry>,
    pub clock: ClockSnapshot,
    pub phase: MatchPhase,
    /// Color of the player whose intent this was, resolved under the lock.
    #[serde(skip)]
    pub actor: Option<Color>,
}

impl IntentOutcome {
    pub fn entries_for(&self, color: Color) -> &[MatchLogEntry] {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.white.is_empty() && self.black.is_empty()
    }

    /// The part of the outcome one color is allowed to see.
    pub fn for_color(self, color: Color) -> ViewerOutcome {
        let entries = match color {
            Color::White => self.white,
            Color::Black => self.black,
        };
        ViewerOutcome {
            entries,
            clock: self.clock,
            phase: self.phase,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerOutcome {
    pub entries: Vec<MatchLogEntry>,
    pub clock: ClockSnapshot,
    pub phase: MatchPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMatchResponse {
    pub room_id: String,
    pub match_id: String,
    pub white_token: String,
    pub black_token: String,
    pub phase: MatchPhase,
    pub clock: ClockSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncResponse {
    pub match_id: String,
    pub phase: MatchPhase,
    pub fen: String,
    /// Position to pass back on the next resync.
    pub cursor: usize,
    pub entries: Vec<MatchLogEntry>,
    pub clock: ClockSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
