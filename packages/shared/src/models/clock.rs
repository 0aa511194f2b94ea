use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::piece::Color;

/// Wall-clock source in epoch milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// One side's countdown. While paused, the time left is frozen at
/// `expires_at - paused_at`; resuming shifts `expires_at` forward by the
/// paused span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorClock {
    pub expires_at: i64,
    pub paused_at: Option<i64>,
    pub started: bool,
    pub last_move_at: Option<i64>,
}

impl ColorClock {
    pub fn new(budget_ms: i64, now: i64) -> Self {
        ColorClock {
            expires_at: now + budget_ms,
            paused_at: Some(now),
            started: false,
            last_move_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.paused_at.is_none()
    }

    pub fn remaining(&self, now: i64) -> i64 {
        match self.paused_at {
            Some(paused_at) => self.expires_at - paused_at,
            None => self.expires_at - now,
        }
    }

    fn start(&mut self, now: i64) {
        if let Some(paused_at) = self.paused_at.take() {
            self.expires_at += now - paused_at;
        }
        self.started = true;
    }

    fn stop(&mut self, now: i64) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    Exact,
    Floor,
    Ceil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideClockSnapshot {
    pub remaining_ms: i64,
    pub running: bool,
    pub started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub white: SideClockSnapshot,
    pub black: SideClockSnapshot,
    pub taken_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    pub white: bool,
    pub black: bool,
}

impl Expiry {
    pub fn any(&self) -> Option<Color> {
        if self.white {
            Some(Color::White)
        } else if self.black {
            Some(Color::Black)
        } else {
            None
        }
    }
}

/// Both players' clocks. Every mutating call takes the caller's `now` so an
/// operation never reads the wall clock twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchClock {
    pub white: ColorClock,
    pub black: ColorClock,
}

impl MatchClock {
    pub fn new(budget_ms: i64, now: i64) -> Self {
        MatchClock {
            white: ColorClock::new(budget_ms, now),
            black: ColorClock::new(budget_ms, now),
        }
    }

    fn side_mut(&mut self, color: Color) -> &mut ColorClock {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    pub fn start(&mut self, color: Color, now: i64) {
        self.side_mut(color).start(now);
    }

    /// Freezes one side without recording a move.
    pub fn stop(&mut self, color: Color, now: i64) {
        self.side_mut(color).stop(now);
    }

    pub fn pause(&mut self, color: Color, now: i64) {
        let side = self.side_mut(color);
        side.stop(now);
        side.last_move_at = Some(now);
    }

    /// Adds exactly `increment_ms` to the side's deadline whether it is
    /// running or paused.
    pub fn apply_increment(&mut self, color: Color, increment_ms: i64) {
        self.side_mut(color).expires_at += increment_ms;
    }

    /// Pauses `from`, credits it the increment and starts its opponent.
    pub fn hand_over(&mut self, from: Color, increment_ms: i64, now: i64) {
        self.pause(from, now);
        self.apply_increment(from, increment_ms);
        self.start(from.opposite(), now);
    }

    /// Puts one side back to a fresh, paused budget.
    pub fn reset(&mut self, color: Color, budget_ms: i64, now: i64) {
        *self.side_mut(color) = ColorClock::new(budget_ms, now);
    }

    pub fn expired(&self, now: i64) -> Expiry {
        Expiry {
            white: self.white.remaining(now) <= 0,
            black: self.black.remaining(now) <= 0,
        }
    }

    /// Read-only projection of both clocks at `now`.
    pub fn snapshot(&self, now: i64, rounding: RoundingMode) -> ClockSnapshot {
        let project = |side: &ColorClock| SideClockSnapshot {
            remaining_ms: round(side.remaining(now).max(0), rounding),
            running: side.is_running(),
            started: side.started,
        };
        ClockSnapshot {
            white: project(&self.white),
            black: project(&self.black),
            taken_at: now,
        }
    }
}

fn round(ms: i64, rounding: RoundingMode) -> i64 {
    match rounding {
        RoundingMode::Exact => ms,
        RoundingMode::Floor => ms.div_euclid(1000) * 1000,
        RoundingMode::Ceil => (ms + 999).div_euclid(1000) * 1000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const BUDGET: i64 = 60_000;

    #[test]
    fn test_new_clock_is_paused_and_full() {
        let clock = MatchClock::new(BUDGET, 1_000);
        assert!(!clock.white.is_running());
        assert_eq!(clock.white.remaining(50_000), BUDGET);
        assert_eq!(clock.expired(1_000_000), Expiry::default());
    }

    #[test]
    fn test_running_clock_counts_down() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 10_000);
        assert_eq!(clock.white.remaining(25_000), BUDGET - 15_000);
        assert!(clock.white.started);
        assert!(!clock.black.started);
    }

    #[test]
    fn test_pause_freezes_remaining_and_resume_keeps_it() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::Black, 0);
        clock.pause(Color::Black, 20_000);
        assert_eq!(clock.black.last_move_at, Some(20_000));
        assert_eq!(clock.black.remaining(90_000), BUDGET - 20_000);

        clock.start(Color::Black, 90_000);
        assert_eq!(clock.black.remaining(100_000), BUDGET - 30_000);
    }

    #[rstest]
    #[case(0)]
    #[case(7_500)]
    #[case(59_999)]
    fn test_increment_adds_exactly_configured_amount(#[case] elapsed: i64) {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);
        clock.pause(Color::White, elapsed);
        let before = clock.white.expires_at;

        clock.apply_increment(Color::White, 5_000);

        assert_eq!(clock.white.expires_at, before + 5_000);
    }

    #[test]
    fn test_hand_over_pauses_mover_and_starts_opponent() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);

        clock.hand_over(Color::White, 5_000, 12_000);

        assert!(!clock.white.is_running());
        assert!(clock.black.is_running());
        assert_eq!(clock.white.remaining(40_000), BUDGET - 12_000 + 5_000);
        assert_eq!(clock.black.remaining(12_000), BUDGET);
    }

    #[test]
    fn test_expired_reports_only_the_flagged_side() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);

        let expiry = clock.expired(BUDGET);
        assert!(expiry.white);
        assert!(!expiry.black);
        assert_eq!(expiry.any(), Some(Color::White));
        assert_eq!(clock.expired(BUDGET - 1).any(), None);
    }

    #[rstest]
    #[case(RoundingMode::Exact, 41_250)]
    #[case(RoundingMode::Floor, 41_000)]
    #[case(RoundingMode::Ceil, 42_000)]
    fn test_snapshot_rounding(#[case] rounding: RoundingMode, #[case] expected: i64) {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);

        let snapshot = clock.snapshot(BUDGET - 41_250, rounding);

        assert_eq!(snapshot.white.remaining_ms, expected);
        assert!(snapshot.white.running);
        assert_eq!(snapshot.black.remaining_ms, BUDGET);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);
        let copy = clock;
        let _ = clock.snapshot(30_000, RoundingMode::Exact);
        assert_eq!(clock, copy);
    }

    #[test]
    fn test_snapshot_never_negative() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);
        assert_eq!(
            clock.snapshot(BUDGET * 2, RoundingMode::Exact).white.remaining_ms,
            0
        );
    }

    #[test]
    fn test_stop_freezes_without_a_move_timestamp() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);

        clock.stop(Color::White, 4_000);

        assert!(!clock.white.is_running());
        assert_eq!(clock.white.last_move_at, None);
        assert_eq!(clock.white.remaining(50_000), BUDGET - 4_000);
    }

    #[test]
    fn test_reset_restores_paused_budget() {
        let mut clock = MatchClock::new(BUDGET, 0);
        clock.start(Color::White, 0);
        clock.reset(Color::White, 10_000, 70_000);
        assert!(!clock.white.is_running());
        assert!(!clock.white.started);
        assert_eq!(clock.white.remaining(99_000), 10_000);
    }
}
