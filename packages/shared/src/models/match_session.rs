use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::models::clock::MatchClock;
use crate::models::log_entry::GameEndReason;
use crate::models::modifier::MAX_DURATION;
use crate::models::piece::{CapturedPiece, Color};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub const MAX_BUDGET_MS: i64 = 24 * 60 * 60 * 1000;
pub const MAX_INCREMENT_MS: i64 = 10 * 60 * 1000;
pub const MAX_MODIFIER_INTERVAL: u32 = 1_000;
pub const MAX_MODIFIER_TARGET: u8 = 16;
pub const MAX_BANS_PER_PLAYER: usize = 16;
pub const MAX_DRAFT_POOL: usize = 256;
pub const MAX_BATTLE_TIMEOUT_MS: u64 = 25_000;
pub const MAX_BOOST_STAGES: i8 = 6;

const BOOSTABLE_STATS: [&str; 7] = ["atk", "def", "spa", "spd", "spe", "accuracy", "evasion"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchFormat {
    Random,
    Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPhase {
    DraftBan,
    ChessTurn,
    BattlePending,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerOptions {
    pub chess_budget_ms: i64,
    pub chess_increment_ms: i64,
    pub battle_increment_ms: i64,
    pub draft_budget_ms: i64,
    pub draft_increment_ms: i64,
}

impl Default for TimerOptions {
    fn default() -> Self {
        TimerOptions {
            chess_budget_ms: 600_000,
            chess_increment_ms: 5_000,
            battle_increment_ms: 10_000,
            draft_budget_ms: 120_000,
            draft_increment_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub timers: TimerOptions,
    /// Stat stage boosts granted to the capturing creature, e.g. `{"atk": 1}`.
    pub offense_advantage: BTreeMap<String, i8>,
    pub weather_wars: bool,
    /// Full moves between modifier rolls.
    pub modifier_interval: u32,
    pub modifier_target_min: u8,
    pub modifier_target_max: u8,
    pub modifier_duration_min: u8,
    pub modifier_duration_max: u8,
    pub bans_per_player: usize,
    pub draft_pool_size: usize,
    pub battle_format: String,
    pub battle_timeout_ms: u64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            timers: TimerOptions::default(),
            offense_advantage: BTreeMap::from([("atk".to_string(), 1), ("spa".to_string(), 1)]),
            weather_wars: false,
            modifier_interval: 5,
            modifier_target_min: 2,
            modifier_target_max: 6,
            modifier_duration_min: 3,
            modifier_duration_max: 5,
            bans_per_player: 3,
            draft_pool_size: 48,
            battle_format: "gen9customgame".to_string(),
            battle_timeout_ms: 20_000,
        }
    }
}

impl MatchOptions {
    pub fn modifier_target_range(&self) -> RangeInclusive<u8> {
        let min = self.modifier_target_min.min(self.modifier_target_max);
        min..=self.modifier_target_max.max(min)
    }

    pub fn modifier_duration_range(&self) -> RangeInclusive<u8> {
        let min = self.modifier_duration_min.clamp(1, 15);
        min..=self.modifier_duration_max.clamp(min, 15)
    }

    pub fn total_bans(&self) -> usize {
        self.bans_per_player.saturating_mul(2)
    }

    /// Rejects options the engine cannot run with. Client supplied, so every
    /// count and duration is bounded here.
    pub fn validate(&self) -> Result<(), String> {
        let timers = &self.timers;
        for (name, budget) in [
            ("chess_budget_ms", timers.chess_budget_ms),
            ("draft_budget_ms", timers.draft_budget_ms),
        ] {
            if !(1..=MAX_BUDGET_MS).contains(&budget) {
                return Err(format!("{} must be between 1 and {}", name, MAX_BUDGET_MS));
            }
        }
        for (name, increment) in [
            ("chess_increment_ms", timers.chess_increment_ms),
            ("battle_increment_ms", timers.battle_increment_ms),
            ("draft_increment_ms", timers.draft_increment_ms),
        ] {
            if !(0..=MAX_INCREMENT_MS).contains(&increment) {
                return Err(format!("{} must be between 0 and {}", name, MAX_INCREMENT_MS));
            }
        }

        if !(1..=MAX_MODIFIER_INTERVAL).contains(&self.modifier_interval) {
            return Err(format!(
                "modifier_interval must be between 1 and {}",
                MAX_MODIFIER_INTERVAL
            ));
        }
        if self.modifier_target_min > self.modifier_target_max
            || self.modifier_target_max > MAX_MODIFIER_TARGET
        {
            return Err(format!(
                "modifier targets must satisfy min <= max <= {}",
                MAX_MODIFIER_TARGET
            ));
        }
        if self.modifier_duration_min == 0
            || self.modifier_duration_min > self.modifier_duration_max
            || self.modifier_duration_max > MAX_DURATION
        {
            return Err(format!(
                "modifier durations must satisfy 1 <= min <= max <= {}",
                MAX_DURATION
            ));
        }

        if self.bans_per_player > MAX_BANS_PER_PLAYER {
            return Err(format!("bans_per_player cannot exceed {}", MAX_BANS_PER_PLAYER));
        }
        if self.draft_pool_size > MAX_DRAFT_POOL {
            return Err(format!("draft_pool_size cannot exceed {}", MAX_DRAFT_POOL));
        }

        if !(1..=MAX_BATTLE_TIMEOUT_MS).contains(&self.battle_timeout_ms) {
            return Err(format!(
                "battle_timeout_ms must be between 1 and {}",
                MAX_BATTLE_TIMEOUT_MS
            ));
        }
        let format_ok = !self.battle_format.is_empty()
            && self.battle_format.len() <= 64
            && self
                .battle_format
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
        if !format_ok {
            return Err(format!("unsupported battle format {:?}", self.battle_format));
        }
        for (stat, stages) in &self.offense_advantage {
            if !BOOSTABLE_STATS.contains(&stat.as_str()) {
                return Err(format!("{:?} cannot be boosted", stat));
            }
            if stages.abs() > MAX_BOOST_STAGES {
                return Err(format!(
                    "boost for {} must be within +/-{}",
                    stat, MAX_BOOST_STAGES
                ));
            }
        }
        Ok(())
    }
}

/// One committed battle turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleTurn {
    pub white: String,
    pub black: String,
}

impl BattleTurn {
    pub fn choice(&self, color: Color) -> &str {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

/// The capture currently being fought over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBattle {
    pub san: String,
    pub attacker: Color,
    pub attacker_square: String,
    pub defender_square: String,
    pub seed: [u16; 4],
    pub history: Vec<BattleTurn>,
    pub pending_white: Option<String>,
    pub pending_black: Option<String>,
}

impl PendingBattle {
    pub fn pending(&self, color: Color) -> Option<&String> {
        match color {
            Color::White => self.pending_white.as_ref(),
            Color::Black => self.pending_black.as_ref(),
        }
    }

    pub fn set_pending(&mut self, color: Color, choice: Option<String>) {
        match color {
            Color::White => self.pending_white = choice,
            Color::Black => self.pending_black = choice,
        }
    }
}

/// Fixed parameters of one match; everything the transition function needs
/// besides the tape itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub room_id: String,
    pub match_id: String,
    pub white_player: String,
    pub black_player: String,
    pub seed: u64,
    pub format: MatchFormat,
    pub options: MatchOptions,
    /// Epoch ms the opening clock started at.
    #[serde(default)]
    pub started_at: i64,
}

impl MatchConfig {
    pub fn player_color(&self, player_id: &str) -> Option<Color> {
        if self.white_player == player_id {
            Some(Color::White)
        } else if self.black_player == player_id {
            Some(Color::Black)
        } else {
            None
        }
    }
}

/// Persisted authoritative state of a room, keyed by `room_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub room_id: String,
    /// Bumped by every committed write; updates are conditional on it.
    #[serde(default)]
    pub version: u64,
    pub config: MatchConfig,
    pub phase: MatchPhase,
    pub fen: String,
    pub ply: u32,
    pub locations: BTreeMap<String, usize>,
    pub captured: Vec<CapturedPiece>,
    pub bans: Vec<usize>,
    pub pending_battle: Option<PendingBattle>,
    pub clock: MatchClock,
    #[serde(with = "serde_bytes")]
    pub modifiers: Vec<u8>,
    pub white_log_len: usize,
    pub black_log_len: usize,
    pub winner: Option<Color>,
    pub end_reason: Option<GameEndReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchSnapshot {
    pub fn log_len(&self, color: Color) -> usize {
        match color {
            Color::White => self.white_log_len,
            Color::Black => self.black_log_len,
        }
    }

    pub fn is_ongoing(&self) -> bool {
        self.phase != MatchPhase::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_options_default_when_fields_missing() {
        let options: MatchOptions =
            serde_json::from_str(r#"{"weather_wars": true, "timers": {"chess_budget_ms": 1000}}"#)
                .unwrap();
        assert!(options.weather_wars);
        assert_eq!(options.timers.chess_budget_ms, 1000);
        assert_eq!(options.timers.chess_increment_ms, 5_000);
        assert_eq!(options.modifier_interval, 5);
        assert_eq!(options.offense_advantage.get("atk"), Some(&1));
        assert_eq!(options.total_bans(), 6);
    }

    #[test]
    fn test_ranges_are_well_formed() {
        let options = MatchOptions {
            modifier_duration_min: 0,
            modifier_duration_max: 40,
            modifier_target_min: 9,
            modifier_target_max: 3,
            ..MatchOptions::default()
        };
        assert_eq!(options.modifier_duration_range(), 1..=15);
        assert_eq!(options.modifier_target_range(), 3..=3);
    }

    #[test]
    fn test_player_color_lookup() {
        let config = MatchConfig {
            room_id: "room".to_string(),
            match_id: "m1".to_string(),
            white_player: "alice".to_string(),
            black_player: "bob".to_string(),
            seed: 1,
            format: MatchFormat::Random,
            options: MatchOptions::default(),
            started_at: 0,
        };
        assert_eq!(config.player_color("alice"), Some(Color::White));
        assert_eq!(config.player_color("bob"), Some(Color::Black));
        assert_eq!(config.player_color("carol"), None);
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&MatchPhase::BattlePending).unwrap(),
            "\"BATTLE_PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&MatchFormat::Draft).unwrap(),
            "\"draft\""
        );
    }

    #[test]
    fn test_default_options_are_valid() {
        assert_eq!(MatchOptions::default().validate(), Ok(()));
    }

    #[rstest]
    #[case(r#"{"modifier_interval": 2147483648}"#)]
    #[case(r#"{"modifier_interval": 0}"#)]
    #[case(r#"{"bans_per_player": 9223372036854775808}"#)]
    #[case(r#"{"draft_pool_size": 4000000000}"#)]
    #[case(r#"{"modifier_target_max": 200}"#)]
    #[case(r#"{"modifier_target_min": 7, "modifier_target_max": 3}"#)]
    #[case(r#"{"modifier_duration_min": 0}"#)]
    #[case(r#"{"timers": {"chess_budget_ms": 0}}"#)]
    #[case(r#"{"timers": {"chess_increment_ms": -5}}"#)]
    #[case(r#"{"battle_timeout_ms": 60000}"#)]
    #[case(r#"{"battle_format": "gen9'); process.exit(0); ('"}"#)]
    #[case(r#"{"offense_advantage": {"hp": 1}}"#)]
    #[case(r#"{"offense_advantage": {"atk": 12}}"#)]
    fn test_out_of_range_options_are_rejected(#[case] raw: &str) {
        let options: MatchOptions = serde_json::from_str(raw).unwrap();
        assert!(options.validate().is_err(), "{} should be rejected", raw);
    }

    #[test]
    fn test_total_bans_saturates() {
        let options = MatchOptions {
            bans_per_player: usize::MAX,
            ..MatchOptions::default()
        };
        assert_eq!(options.total_bans(), usize::MAX);
    }
}
