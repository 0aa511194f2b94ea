use serde::{Deserialize, Serialize};

use crate::models::log_entry::GameEndReason;
use crate::models::match_session::{MatchFormat, MatchOptions};
use crate::models::piece::Color;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMatchRequest {
    pub room_id: String,
    pub white_player: String,
    pub black_player: String,
    pub format: MatchFormat,
    #[serde(default)]
    pub options: MatchOptions,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChessMoveRequest {
    pub san: String,
}

/// `move 1` through `move 4`, or `forfeit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleMoveRequest {
    pub choice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRequest {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPickRequest {
    pub index: usize,
    pub square: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndMatchRequest {
    #[serde(default)]
    pub winner: Option<Color>,
    pub reason: GameEndReason,
}
