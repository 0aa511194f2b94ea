use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::clock::{MatchClock, RoundingMode, TimeSource};
use crate::models::intent::requests::StartMatchRequest;
use crate::models::intent::responses::{IntentOutcome, ResyncResponse, StartMatchResponse};
use crate::models::log_entry::{GameEndReason, MatchLogEntry};
use crate::models::match_session::{
    MatchConfig, MatchPhase, MatchSnapshot, TimerOptions, START_FEN,
};
use crate::models::piece::Color;
use crate::models::roster::CreatureRoster;
use crate::repositories::match_repository::{LogAppend, MatchRepository};
use crate::services::auth_service::PlayerTokenServiceTrait;
use crate::services::battle_bridge::{BattleBridge, BattleReport, BattleSetup};
use crate::services::errors::battle_errors::BattleError;
use crate::services::errors::match_service_errors::MatchServiceError;
use crate::services::match_state::{BattleChoicePlan, ChessMoveOutcome, MatchState};
use crate::services::resync::{ResyncTape, Viewer};

/// Default lifetime of the room lock. Must outlast one battle run.
pub const DEFAULT_LOCK_TTL_MS: i64 = 30_000;

/// Part of the lock lifetime kept back from a battle run for the reads and
/// the commit around it.
pub const LOCK_MARGIN_MS: i64 = 5_000;

/// Upper bound on consecutive clock expiries resolved in one call.
const MAX_TIMEOUT_STEPS: usize = 8;

enum Intent {
    ChessMove(String),
    BattleMove(String),
    Ban(usize),
    DraftPick { index: usize, square: String },
    End {
        winner: Option<Color>,
        reason: GameEndReason,
    },
}

/// One locked unit of work on a room: the loaded snapshot, the state rebuilt
/// from it and everything produced since.
struct Session {
    snapshot: MatchSnapshot,
    state: MatchState,
    clock: MatchClock,
    tape: ResyncTape,
    now: i64,
    dirty: bool,
}

impl Session {
    fn timers(&self) -> TimerOptions {
        self.state.config().options.timers
    }

    fn start_chess_clock(&mut self) {
        let budget = self.timers().chess_budget_ms;
        for color in [Color::White, Color::Black] {
            self.clock.reset(color, budget, self.now);
        }
        self.clock.start(Color::White, self.now);
    }

    /// Brings the clock in line with the phase after a chess transition.
    fn settle_clock(&mut self) {
        match self.state.current_turn() {
            None => {
                self.clock.stop(Color::White, self.now);
                self.clock.stop(Color::Black, self.now);
            }
            Some(turn) if self.state.phase() == MatchPhase::ChessTurn => {
                self.clock.start(turn, self.now);
            }
            Some(_) => {}
        }
    }

    fn after_draft_action(&mut self, color: Color) {
        if self.state.phase() == MatchPhase::ChessTurn {
            self.start_chess_clock();
        } else {
            let increment = self.timers().draft_increment_ms;
            self.clock.hand_over(color, increment, self.now);
        }
    }

    fn append_battle_output(&mut self, report: &BattleReport) {
        for color in [Color::White, Color::Black] {
            for chunk in report.chunks_for(color) {
                self.tape
                    .append_for(color, MatchLogEntry::stream_output(chunk.clone()));
            }
        }
    }

    fn has_changes(&self) -> bool {
        self.dirty || !self.tape.is_empty()
    }

    fn into_outcome(self) -> IntentOutcome {
        let clock = self.clock.snapshot(self.now, RoundingMode::Exact);
        let phase = self.state.phase();
        self.tape.into_outcome(clock, phase)
    }
}

/// A held room lock. Dropping it unreleased, on a panic or a cancelled
/// request, releases it from a background task.
struct RoomLock {
    repository: Arc<dyn MatchRepository + Send + Sync>,
    room_id: String,
    token: String,
    released: bool,
}

impl RoomLock {
    async fn release(mut self) {
        if let Err(e) = self.repository.release_lock(&self.room_id, &self.token).await {
            warn!(room_id = %self.room_id, error = %e, "Failed to release room lock");
        }
        self.released = true;
    }
}

impl Drop for RoomLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(room_id = %self.room_id, "Room lock left to expire");
            return;
        };
        warn!(room_id = %self.room_id, "Room lock dropped mid-intent");
        let repository = self.repository.clone();
        let room_id = std::mem::take(&mut self.room_id);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(e) = repository.release_lock(&room_id, &token).await {
                warn!(room_id = %room_id, error = %e, "Failed to release room lock");
            }
        });
    }
}

fn timestamp(now_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now)
}

/// Runs every player intent against the persisted room state: lock, reload,
/// resolve expired clocks, validate and apply, persist, unlock.
#[derive(Clone)]
pub struct MatchService {
    repository: Arc<dyn MatchRepository + Send + Sync>,
    bridge: BattleBridge,
    roster: Arc<CreatureRoster>,
    time: Arc<dyn TimeSource>,
    tokens: Arc<dyn PlayerTokenServiceTrait>,
    lock_ttl_ms: i64,
}

impl MatchService {
    pub fn new(
        repository: Arc<dyn MatchRepository + Send + Sync>,
        bridge: BattleBridge,
        roster: Arc<CreatureRoster>,
        time: Arc<dyn TimeSource>,
        tokens: Arc<dyn PlayerTokenServiceTrait>,
    ) -> Self {
        MatchService {
            repository,
            bridge,
            roster,
            time,
            tokens,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
        }
    }

    pub fn with_lock_ttl(mut self, lock_ttl_ms: i64) -> Self {
        self.lock_ttl_ms = lock_ttl_ms;
        self
    }

    /// Creates a fresh match in the room, replacing an ended one.
    pub async fn start_match(
        &self,
        request: StartMatchRequest,
    ) -> Result<StartMatchResponse, MatchServiceError> {
        if request.room_id.is_empty() {
            return Err(MatchServiceError::InvalidRequest(
                "room_id cannot be empty".to_string(),
            ));
        }
        if request.white_player.is_empty() || request.black_player.is_empty() {
            return Err(MatchServiceError::InvalidRequest(
                "both players are required".to_string(),
            ));
        }
        if self.roster.is_empty() {
            return Err(MatchServiceError::InvalidRequest(
                "creature roster is empty".to_string(),
            ));
        }
        request
            .options
            .validate()
            .map_err(MatchServiceError::InvalidRequest)?;
        if self.battle_budget_ms() < request.options.battle_timeout_ms {
            return Err(MatchServiceError::InvalidRequest(format!(
                "battle_timeout_ms must not exceed {}",
                self.battle_budget_ms()
            )));
        }

        let room_id = request.room_id.clone();
        let now = self.time.now_ms();
        self.with_lock(&room_id, now, || async {
            let existing = self.repository.get_match(&room_id).await?;
            if existing.as_ref().is_some_and(MatchSnapshot::is_ongoing) {
                return Err(MatchServiceError::MatchInProgress(room_id.clone()));
            }

            let mut snapshot = self.fresh_snapshot(request, now);
            match existing {
                Some(ended) => {
                    snapshot.version = ended.version + 1;
                    self.repository
                        .update_match(&snapshot, ended.version, &[])
                        .await?;
                }
                None => self.repository.create_match(&snapshot).await?,
            }

            let config = &snapshot.config;
            let white_token =
                self.tokens
                    .issue_token(&config.white_player, &room_id, Color::White)?;
            let black_token =
                self.tokens
                    .issue_token(&config.black_player, &room_id, Color::Black)?;

            info!(
                room_id = %room_id,
                match_id = %config.match_id,
                format = ?config.format,
                "Match started"
            );

            Ok(StartMatchResponse {
                room_id: room_id.clone(),
                match_id: config.match_id.clone(),
                white_token,
                black_token,
                phase: snapshot.phase,
                clock: snapshot.clock.snapshot(now, RoundingMode::Exact),
            })
        })
        .await
    }

    /// Starts a new match in a room whose match has ended, colors swapped.
    pub async fn rematch(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<StartMatchResponse, MatchServiceError> {
        let snapshot = self
            .repository
            .get_match(room_id)
            .await?
            .ok_or_else(|| MatchServiceError::NotFound(room_id.to_string()))?;
        if snapshot.config.player_color(player_id).is_none() {
            return Err(MatchServiceError::NotAPlayer(player_id.to_string()));
        }
        if snapshot.is_ongoing() {
            return Err(MatchServiceError::MatchInProgress(room_id.to_string()));
        }

        let config = snapshot.config;
        self.start_match(StartMatchRequest {
            room_id: config.room_id,
            white_player: config.black_player,
            black_player: config.white_player,
            format: config.format,
            options: config.options,
            seed: None,
        })
        .await
    }

    pub async fn submit_chess_move(
        &self,
        room_id: &str,
        player_id: &str,
        san: &str,
    ) -> Result<IntentOutcome, MatchServiceError> {
        self.run_intent(room_id, Some((player_id, Intent::ChessMove(san.to_string()))))
            .await
    }

    pub async fn submit_battle_move(
        &self,
        room_id: &str,
        player_id: &str,
        choice: &str,
    ) -> Result<IntentOutcome, MatchServiceError> {
        self.run_intent(
            room_id,
            Some((player_id, Intent::BattleMove(choice.to_string()))),
        )
        .await
    }

    pub async fn submit_ban(
        &self,
        room_id: &str,
        player_id: &str,
        index: usize,
    ) -> Result<IntentOutcome, MatchServiceError> {
        self.run_intent(room_id, Some((player_id, Intent::Ban(index))))
            .await
    }

    pub async fn submit_draft_pick(
        &self,
        room_id: &str,
        player_id: &str,
        index: usize,
        square: &str,
    ) -> Result<IntentOutcome, MatchServiceError> {
        self.run_intent(
            room_id,
            Some((
                player_id,
                Intent::DraftPick {
                    index,
                    square: square.to_string(),
                },
            )),
        )
        .await
    }

    pub async fn end_match(
        &self,
        room_id: &str,
        player_id: &str,
        winner: Option<Color>,
        reason: GameEndReason,
    ) -> Result<IntentOutcome, MatchServiceError> {
        self.run_intent(room_id, Some((player_id, Intent::End { winner, reason })))
            .await
    }

    /// Resolves expired clocks without any player intent.
    pub async fn check_and_apply_timeout(
        &self,
        room_id: &str,
    ) -> Result<IntentOutcome, MatchServiceError> {
        self.run_intent(room_id, None).await
    }

    /// Tape entries for `viewer` from `cursor` on, read without the lock. A
    /// cursor past the end of the log restarts from zero.
    pub async fn resync(
        &self,
        room_id: &str,
        viewer: Viewer,
        cursor: usize,
    ) -> Result<ResyncResponse, MatchServiceError> {
        let now = self.time.now_ms();
        let snapshot = self
            .repository
            .get_match(room_id)
            .await?
            .ok_or_else(|| MatchServiceError::NotFound(room_id.to_string()))?;

        let color = viewer.projection();
        let log_len = snapshot.log_len(color);
        let from = if cursor > log_len { 0 } else { cursor };
        let stored = self
            .repository
            .read_log(&snapshot.config.match_id, color, from)
            .await?;

        let mut tape = ResyncTape::resume(from, from);
        for entry in stored.into_iter().take(log_len - from) {
            tape.append_for(color, entry);
        }

        Ok(ResyncResponse {
            match_id: snapshot.config.match_id.clone(),
            phase: snapshot.phase,
            fen: snapshot.fen.clone(),
            cursor: tape.cursor_for(viewer),
            entries: tape.projection_from(viewer, from).cloned().collect(),
            clock: snapshot.clock.snapshot(now, RoundingMode::Exact),
        })
    }

    /// Which projection `player_id` reads in the room's current match.
    pub async fn viewer_of(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<Viewer, MatchServiceError> {
        let snapshot = self
            .repository
            .get_match(room_id)
            .await?
            .ok_or_else(|| MatchServiceError::NotFound(room_id.to_string()))?;
        snapshot
            .config
            .player_color(player_id)
            .map(Viewer::Player)
            .ok_or_else(|| MatchServiceError::NotAPlayer(player_id.to_string()))
    }

    /// Rebuilds the room's state from the white tape alone.
    pub async fn replay(&self, room_id: &str) -> Result<MatchState, MatchServiceError> {
        let snapshot = self
            .repository
            .get_match(room_id)
            .await?
            .ok_or_else(|| MatchServiceError::NotFound(room_id.to_string()))?;
        let mut entries = self
            .repository
            .read_log(&snapshot.config.match_id, Color::White, 0)
            .await?;
        entries.truncate(snapshot.white_log_len);
        Ok(MatchState::replay(snapshot.config, &self.roster, &entries)?)
    }

    /// Reads the persisted state without locking.
    pub async fn load_state(&self, room_id: &str) -> Result<MatchState, MatchServiceError> {
        let snapshot = self
            .repository
            .get_match(room_id)
            .await?
            .ok_or_else(|| MatchServiceError::NotFound(room_id.to_string()))?;
        Ok(MatchState::restore(&snapshot, &self.roster)?)
    }

    fn fresh_snapshot(&self, request: StartMatchRequest, now: i64) -> MatchSnapshot {
        let config = MatchConfig {
            room_id: request.room_id.clone(),
            match_id: Uuid::new_v4().to_string(),
            white_player: request.white_player,
            black_player: request.black_player,
            seed: request.seed.unwrap_or_else(rand::random),
            format: request.format,
            options: request.options,
            started_at: now,
        };

        let state = MatchState::new(config.clone(), &self.roster);
        let mut snapshot = MatchSnapshot {
            room_id: request.room_id,
            version: 0,
            config,
            phase: state.phase(),
            fen: START_FEN.to_string(),
            ply: 0,
            locations: Default::default(),
            captured: Vec::new(),
            bans: Vec::new(),
            pending_battle: None,
            clock: *state.clock(),
            modifiers: Vec::new(),
            white_log_len: 0,
            black_log_len: 0,
            winner: None,
            end_reason: None,
            created_at: timestamp(now),
            updated_at: timestamp(now),
        };
        state.write_snapshot(&mut snapshot);
        snapshot
    }

    async fn with_lock<T, F, Fut>(
        &self,
        room_id: &str,
        now: i64,
        work: F,
    ) -> Result<T, MatchServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MatchServiceError>>,
    {
        let lock_token = Uuid::new_v4().to_string();
        if !self
            .repository
            .acquire_lock(room_id, &lock_token, self.lock_ttl_ms, now)
            .await?
        {
            warn!(room_id, "Room lock contended");
            return Err(MatchServiceError::LockContended(room_id.to_string()));
        }
        let lock = RoomLock {
            repository: self.repository.clone(),
            room_id: room_id.to_string(),
            token: lock_token,
            released: false,
        };

        let result = work().await;

        lock.release().await;
        result
    }

    /// Longest battle run that still leaves the lock's margin.
    fn battle_budget_ms(&self) -> u64 {
        u64::try_from(self.lock_ttl_ms - LOCK_MARGIN_MS).unwrap_or(0)
    }

    async fn run_battle(&self, setup: &BattleSetup) -> Result<BattleReport, MatchServiceError> {
        let budget = self.battle_budget_ms().max(1);
        if setup.timeout_ms <= budget {
            return Ok(self.bridge.run(setup).await?);
        }
        let bounded = BattleSetup {
            timeout_ms: budget,
            ..setup.clone()
        };
        Ok(self.bridge.run(&bounded).await?)
    }

    async fn run_intent(
        &self,
        room_id: &str,
        intent: Option<(&str, Intent)>,
    ) -> Result<IntentOutcome, MatchServiceError> {
        let now = self.time.now_ms();
        self.with_lock(room_id, now, || self.locked_intent(room_id, intent, now))
            .await
    }

    async fn locked_intent(
        &self,
        room_id: &str,
        intent: Option<(&str, Intent)>,
        now: i64,
    ) -> Result<IntentOutcome, MatchServiceError> {
        let snapshot = self
            .repository
            .get_match(room_id)
            .await?
            .ok_or_else(|| MatchServiceError::NotFound(room_id.to_string()))?;
        let intent = match intent {
            Some((player_id, intent)) => {
                let color = snapshot
                    .config
                    .player_color(player_id)
                    .ok_or_else(|| MatchServiceError::NotAPlayer(player_id.to_string()))?;
                Some((color, intent))
            }
            None => None,
        };

        let state = MatchState::restore(&snapshot, &self.roster)?;
        let mut session = Session {
            clock: *state.clock(),
            state,
            tape: ResyncTape::resume(snapshot.white_log_len, snapshot.black_log_len),
            snapshot,
            now,
            dirty: false,
        };

        self.resolve_timeouts(&mut session)?;

        let actor = intent.as_ref().map(|(color, _)| *color);
        let result = match intent {
            Some((color, intent)) => self.dispatch(&mut session, color, intent).await,
            None => Ok(()),
        };

        let outcome = match result {
            Ok(()) if session.has_changes() => self.persist(session).await,
            Ok(()) => Ok(session.into_outcome()),
            Err(err) if err.is_fatal() => {
                error!(room_id, error = %err, "Match state rejected an intent");
                Err(err)
            }
            Err(err) if session.has_changes() => {
                let superseded = !session.tape.is_empty();
                let outcome = self.persist(session).await?;
                if superseded {
                    info!(room_id, error = %err, "Intent superseded by clock expiry");
                    Ok(outcome)
                } else {
                    Err(err)
                }
            }
            Err(err) => {
                info!(room_id, error = %err, "Intent rejected");
                Err(err)
            }
        };
        outcome.map(|outcome| IntentOutcome { actor, ..outcome })
    }

    fn resolve_timeouts(&self, session: &mut Session) -> Result<(), MatchServiceError> {
        for _ in 0..MAX_TIMEOUT_STEPS {
            if session.state.phase() == MatchPhase::Ended {
                break;
            }
            let Some(expired) = session.clock.expired(session.now).any() else {
                break;
            };

            let phase = session.state.phase();
            let entries = session.state.timeout_entries(expired)?;
            info!(
                room_id = %session.snapshot.room_id,
                color = %expired,
                phase = ?phase,
                "Clock expired"
            );
            session.tape.extend(entries);

            if phase == MatchPhase::DraftBan {
                let increment = session.timers().draft_increment_ms;
                session.clock.reset(expired, increment, session.now);
                if session.state.phase() == MatchPhase::ChessTurn {
                    session.start_chess_clock();
                } else {
                    session.clock.start(expired.opposite(), session.now);
                }
            } else {
                session.settle_clock();
            }
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        color: Color,
        intent: Intent,
    ) -> Result<(), MatchServiceError> {
        let room_id = session.snapshot.room_id.clone();
        let now = session.now;
        let timers = session.timers();

        match intent {
            Intent::ChessMove(san) => match session.state.submit_chess_move(color, &san)? {
                ChessMoveOutcome::Moved(entries) => {
                    info!(room_id = %room_id, color = %color, san = %san, "Chess move");
                    session.tape.extend(entries);
                    session.clock.hand_over(color, timers.chess_increment_ms, now);
                    session.settle_clock();
                }
                ChessMoveOutcome::Capture(plan) => {
                    let report = self.run_battle(&plan.setup).await?;
                    info!(room_id = %room_id, color = %color, san = %san, "Capture contested");
                    let entry = session.state.begin_capture(plan)?;
                    session.tape.append(entry);
                    session.append_battle_output(&report);
                    session.clock.start(Color::White, now);
                    session.clock.start(Color::Black, now);
                }
            },
            Intent::BattleMove(choice) => {
                match session.state.plan_battle_choice(color, &choice)? {
                    BattleChoicePlan::Waiting => {
                        info!(room_id = %room_id, color = %color, "Battle choice stored");
                        session.state.record_choice(color, &choice)?;
                        session.clock.pause(color, now);
                        session.dirty = true;
                    }
                    BattleChoicePlan::Ready {
                        turn,
                        setup,
                        forfeit,
                    } => {
                        let report = self.run_battle(&setup).await?;
                        if let Some(rejected) = report.rejected {
                            warn!(room_id = %room_id, color = %rejected, "Battle choice rejected");
                            session.state.clear_choice(rejected)?;
                            session.clock.start(rejected, now);
                            session.dirty = true;
                            return Err(MatchServiceError::ChoiceRejected(rejected));
                        }
                        if forfeit && report.winner.is_none() {
                            return Err(BattleError::NoWinner.into());
                        }

                        let entry = session.state.commit_turn(turn)?;
                        session.tape.append(entry);
                        session.append_battle_output(&report);

                        match report.winner {
                            Some(winner) => {
                                info!(room_id = %room_id, winner = %winner, "Battle resolved");
                                for side in [Color::White, Color::Black] {
                                    session.clock.pause(side, now);
                                    session
                                        .clock
                                        .apply_increment(side, timers.battle_increment_ms);
                                }
                                let entries =
                                    session.state.resolve_battle(winner, &report.field)?;
                                session.tape.extend(entries);
                                session.settle_clock();
                            }
                            None => {
                                session.clock.start(Color::White, now);
                                session.clock.start(Color::Black, now);
                            }
                        }
                    }
                }
            }
            Intent::Ban(index) => {
                let entries = session.state.submit_ban(color, index)?;
                info!(room_id = %room_id, color = %color, index, "Creature banned");
                session.tape.extend(entries);
                session.after_draft_action(color);
            }
            Intent::DraftPick { index, square } => {
                let entries = session.state.submit_draft_pick(color, index, &square)?;
                info!(room_id = %room_id, color = %color, index, square = %square, "Creature drafted");
                session.tape.extend(entries);
                session.after_draft_action(color);
            }
            Intent::End { winner, reason } => {
                let entries = session.state.end_match(color, winner, reason)?;
                info!(room_id = %room_id, reason = ?reason, "Match ended by player");
                session.tape.extend(entries);
                session.settle_clock();
            }
        }
        Ok(())
    }

    /// Commits the session as one conditional write. Loses with a retryable
    /// conflict if another intent committed since the snapshot was loaded.
    async fn persist(&self, mut session: Session) -> Result<IntentOutcome, MatchServiceError> {
        if let Some(entry) = session.state.sync_clock(session.clock)? {
            session.tape.append(entry);
        }

        let appends: Vec<LogAppend> = [Color::White, Color::Black]
            .into_iter()
            .map(|color| LogAppend {
                color,
                start: session.tape.base(color),
                entries: session.tape.pending(color).to_vec(),
            })
            .filter(|append| !append.entries.is_empty())
            .collect();

        let expected_version = session.snapshot.version;
        session.state.write_snapshot(&mut session.snapshot);
        session.snapshot.version = expected_version + 1;
        session.snapshot.white_log_len = session.tape.cursor_for(Viewer::Player(Color::White));
        session.snapshot.black_log_len = session.tape.cursor_for(Viewer::Player(Color::Black));
        session.snapshot.updated_at = timestamp(session.now);
        if let Err(e) = self
            .repository
            .update_match(&session.snapshot, expected_version, &appends)
            .await
        {
            warn!(
                room_id = %session.snapshot.room_id,
                expected_version,
                error = %e,
                "Intent lost the commit"
            );
            return Err(e.into());
        }

        Ok(session.into_outcome())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::match_session::{MatchFormat, MatchOptions};
    use crate::repositories::memory_match_repository::InMemoryMatchRepository;
    use crate::repositories::match_repository::MockMatchRepository;
    use crate::services::auth_service::MockPlayerTokenServiceTrait;
    use crate::services::battle_bridge::{BattleEngine, BattleProcess};
    use crate::services::errors::match_state_errors::MatchStateError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::{mpsc, Notify};

    struct FixedTime(AtomicI64);

    impl TimeSource for FixedTime {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Answers every run with the sentinel and nothing else.
    struct QuietEngine;

    #[async_trait]
    impl BattleEngine for QuietEngine {
        async fn spawn(&self) -> Result<BattleProcess, BattleError> {
            let (input_tx, mut input_rx) = mpsc::channel::<String>(16);
            let (output_tx, output_rx) = mpsc::channel::<String>(16);
            tokio::spawn(async move {
                while input_rx.recv().await.is_some() {}
                let _ = output_tx.send("update\n|chat|replay-end".to_string()).await;
            });
            Ok(BattleProcess {
                input: input_tx,
                output: output_rx,
            })
        }
    }

    /// Signals once spawned, then never answers.
    struct HangingEngine {
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl BattleEngine for HangingEngine {
        async fn spawn(&self) -> Result<BattleProcess, BattleError> {
            let (input_tx, mut input_rx) = mpsc::channel::<String>(16);
            let (output_tx, output_rx) = mpsc::channel::<String>(16);
            tokio::spawn(async move { while input_rx.recv().await.is_some() {} });
            tokio::spawn(async move { output_tx.closed().await });
            self.entered.notify_one();
            Ok(BattleProcess {
                input: input_tx,
                output: output_rx,
            })
        }
    }

    fn tokens() -> Arc<MockPlayerTokenServiceTrait> {
        let mut mock = MockPlayerTokenServiceTrait::new();
        mock.expect_issue_token()
            .returning(|player, _, color| Ok(format!("{}:{}", player, color.code())));
        Arc::new(mock)
    }

    fn service_with(repository: Arc<dyn MatchRepository + Send + Sync>) -> (MatchService, Arc<FixedTime>) {
        service_with_engine(repository, Arc::new(QuietEngine))
    }

    fn service_with_engine(
        repository: Arc<dyn MatchRepository + Send + Sync>,
        engine: Arc<dyn BattleEngine + Send + Sync>,
    ) -> (MatchService, Arc<FixedTime>) {
        let time = Arc::new(FixedTime(AtomicI64::new(1_000_000)));
        let service = MatchService::new(
            repository,
            BattleBridge::new(engine),
            Arc::new(CreatureRoster::builtin()),
            time.clone(),
            tokens(),
        );
        (service, time)
    }

    fn request(format: MatchFormat) -> StartMatchRequest {
        StartMatchRequest {
            room_id: "room-1".to_string(),
            white_player: "alice".to_string(),
            black_player: "bob".to_string(),
            format,
            options: MatchOptions::default(),
            seed: Some(99),
        }
    }

    #[tokio::test]
    async fn test_start_match_issues_tokens_and_starts_white_clock() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));

        let response = service.start_match(request(MatchFormat::Random)).await.unwrap();

        assert_eq!(response.white_token, "alice:w");
        assert_eq!(response.black_token, "bob:b");
        assert_eq!(response.phase, MatchPhase::ChessTurn);
        assert!(response.clock.white.running);
        assert!(!response.clock.black.running);
    }

    #[tokio::test]
    async fn test_start_over_ongoing_match_is_rejected() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        service.start_match(request(MatchFormat::Random)).await.unwrap();

        let result = service.start_match(request(MatchFormat::Random)).await;

        assert!(matches!(result, Err(MatchServiceError::MatchInProgress(_))));
    }

    #[tokio::test]
    async fn test_quiet_move_hands_clock_over() {
        let (service, time) = service_with(Arc::new(InMemoryMatchRepository::new()));
        service.start_match(request(MatchFormat::Random)).await.unwrap();
        time.0.fetch_add(3_000, Ordering::SeqCst);

        let outcome = service
            .submit_chess_move("room-1", "alice", "e4")
            .await
            .unwrap();

        assert_eq!(outcome.white[0], MatchLogEntry::chess(Color::White, "e4", None));
        assert_eq!(outcome.white.len(), 2);
        assert!(outcome.white[1].is_clock());
        assert_eq!(outcome.white, outcome.black);
        assert_eq!(outcome.actor, Some(Color::White));
        assert_eq!(outcome.clock.white.remaining_ms, 600_000 - 3_000 + 5_000);
        assert!(!outcome.clock.white.running);
        assert!(outcome.clock.black.running);
    }

    #[tokio::test]
    async fn test_unknown_player_is_rejected() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        service.start_match(request(MatchFormat::Random)).await.unwrap();

        let result = service.submit_chess_move("room-1", "mallory", "e4").await;

        assert!(matches!(result, Err(MatchServiceError::NotAPlayer(_))));
    }

    #[tokio::test]
    async fn test_contended_lock_is_retryable() {
        let mut repository = MockMatchRepository::new();
        repository
            .expect_acquire_lock()
            .returning(|_, _, _, _| Ok(false));
        let (service, _) = service_with(Arc::new(repository));

        let result = service.submit_chess_move("room-1", "alice", "e4").await;

        let err = result.unwrap_err();
        assert!(matches!(err, MatchServiceError::LockContended(_)));
        assert_eq!(
            err.kind(),
            crate::services::errors::match_service_errors::ErrorKind::Retry
        );
    }

    #[tokio::test]
    async fn test_lock_is_released_after_rejected_intent() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        service.start_match(request(MatchFormat::Random)).await.unwrap();

        assert!(service.submit_chess_move("room-1", "bob", "e5").await.is_err());
        assert!(service.submit_chess_move("room-1", "alice", "e4").await.is_ok());
    }

    #[tokio::test]
    async fn test_out_of_range_options_are_rejected() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        let mut start = request(MatchFormat::Random);
        start.options.weather_wars = true;
        start.options.modifier_interval = 2_147_483_648;

        let result = service.start_match(start).await;

        assert!(matches!(result, Err(MatchServiceError::InvalidRequest(_))));
        assert!(matches!(
            service.submit_chess_move("room-1", "alice", "e4").await,
            Err(MatchServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_battle_timeout_must_fit_inside_the_lock() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        let service = service.with_lock_ttl(20_000);

        let result = service.start_match(request(MatchFormat::Random)).await;
        assert!(matches!(result, Err(MatchServiceError::InvalidRequest(_))));

        let mut start = request(MatchFormat::Random);
        start.options.battle_timeout_ms = 15_000;
        assert!(service.start_match(start).await.is_ok());
    }

    #[tokio::test]
    async fn test_player_cannot_claim_an_engine_decided_end() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        service.start_match(request(MatchFormat::Random)).await.unwrap();

        let result = service
            .end_match("room-1", "bob", Some(Color::Black), GameEndReason::KingCaptured)
            .await;

        assert!(matches!(
            result,
            Err(MatchServiceError::State(MatchStateError::ReservedEndReason(
                GameEndReason::KingCaptured
            )))
        ));
        let state = service.load_state("room-1").await.unwrap();
        assert_eq!(state.phase(), MatchPhase::ChessTurn);
    }

    #[tokio::test]
    async fn test_cancelled_intent_releases_the_lock() {
        let entered = Arc::new(Notify::new());
        let (service, _) = service_with_engine(
            Arc::new(InMemoryMatchRepository::new()),
            Arc::new(HangingEngine {
                entered: entered.clone(),
            }),
        );
        service.start_match(request(MatchFormat::Random)).await.unwrap();
        service.submit_chess_move("room-1", "alice", "d4").await.unwrap();
        service.submit_chess_move("room-1", "bob", "e5").await.unwrap();

        let capture = {
            let service = service.clone();
            tokio::spawn(async move { service.submit_chess_move("room-1", "alice", "dxe5").await })
        };
        entered.notified().await;
        capture.abort();
        assert!(capture.await.unwrap_err().is_cancelled());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let outcome = service
            .submit_chess_move("room-1", "alice", "Nf3")
            .await
            .unwrap();
        assert_eq!(outcome.white[0], MatchLogEntry::chess(Color::White, "Nf3", None));
    }

    #[tokio::test]
    async fn test_rematch_swaps_the_acting_color() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));
        service.start_match(request(MatchFormat::Random)).await.unwrap();
        service
            .end_match("room-1", "alice", None, GameEndReason::HostEndedGame)
            .await
            .unwrap();
        service.rematch("room-1", "alice").await.unwrap();

        let outcome = service
            .submit_chess_move("room-1", "bob", "e4")
            .await
            .unwrap();

        assert_eq!(outcome.actor, Some(Color::White));
    }

    #[tokio::test]
    async fn test_missing_room_is_not_found() {
        let (service, _) = service_with(Arc::new(InMemoryMatchRepository::new()));

        let result = service.check_and_apply_timeout("nowhere").await;

        assert!(matches!(result, Err(MatchServiceError::NotFound(_))));
    }
}
