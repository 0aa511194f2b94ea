use serde::{Deserialize, Serialize};

use crate::models::clock::MatchClock;
use crate::models::modifier::{Terrain, TimedEffect, Weather};
use crate::models::piece::{Color, PieceKind};

/// One element of the resync tape. Serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum MatchLogEntry {
    Chess(ChessEntry),
    Ban(BanEntry),
    Draft(DraftEntry),
    Pokemon(PokemonEvent),
    Weather(WeatherEvent),
    Generic(GenericEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChessEntry {
    pub color: Color,
    pub san: String,
    /// Set for captures: `true` when the attacker lost the battle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub color: Color,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftEntry {
    pub color: Color,
    pub index: usize,
    pub square: String,
    pub piece: PieceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PokemonEvent {
    #[serde(rename_all = "camelCase")]
    BattleStart {
        attacker: Color,
        san: String,
        attacker_square: String,
        defender_square: String,
        seed: [u16; 4],
        attacker_species: String,
        defender_species: String,
    },
    /// Both sides' choices for one battle turn, committed together.
    #[serde(rename_all = "camelCase")]
    TurnCommitted { white: String, black: String },
    StreamOutput { chunk: String },
    Victory { color: Color },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WeatherEvent {
    /// Replaces everything on `square` with the given effects.
    Modify {
        square: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weather: Option<TimedEffect<Weather>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        terrain: Option<TimedEffect<Terrain>>,
    },
    Remove { square: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GenericEvent {
    GameEnd {
        color: Option<Color>,
        reason: GameEndReason,
    },
    /// Both clocks as an intent left them.
    Clock(MatchClock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEndReason {
    KingCaptured,
    Timeout,
    HostEndedGame,
    PlayerDisconnected,
    Checkmate,
    Stalemate,
}

impl MatchLogEntry {
    pub fn chess(color: Color, san: impl Into<String>, failed: Option<bool>) -> Self {
        MatchLogEntry::Chess(ChessEntry {
            color,
            san: san.into(),
            failed,
        })
    }

    pub fn game_end(color: Option<Color>, reason: GameEndReason) -> Self {
        MatchLogEntry::Generic(GenericEvent::GameEnd { color, reason })
    }

    pub fn stream_output(chunk: impl Into<String>) -> Self {
        MatchLogEntry::Pokemon(PokemonEvent::StreamOutput {
            chunk: chunk.into(),
        })
    }

    pub fn clock(clock: MatchClock) -> Self {
        MatchLogEntry::Generic(GenericEvent::Clock(clock))
    }

    pub fn is_game_end(&self) -> bool {
        matches!(self, MatchLogEntry::Generic(GenericEvent::GameEnd { .. }))
    }

    pub fn is_clock(&self) -> bool {
        matches!(self, MatchLogEntry::Generic(GenericEvent::Clock(_)))
    }
}
