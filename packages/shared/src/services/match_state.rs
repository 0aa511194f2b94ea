use chess::{Board, Square};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::board::BoardCreatureManager;
use crate::models::clock::MatchClock;
use crate::models::log_entry::{
    BanEntry, ChessEntry, DraftEntry, GameEndReason, GenericEvent, MatchLogEntry, PokemonEvent,
    WeatherEvent,
};
use crate::models::match_session::{
    BattleTurn, MatchConfig, MatchFormat, MatchPhase, MatchSnapshot, PendingBattle,
};
use crate::models::modifier::{ModifierLayer, SquareModifier};
use crate::models::piece::{parse_square, starting_kind, starting_squares, Color, PieceKind};
use crate::models::roster::CreatureRoster;
use crate::models::seed::{rng_for, SeedStream};
use crate::services::battle_bridge::{BattleSetup, FieldReport};
use crate::services::chess_service::{ChessService, ForceAdvance, MoveKind, PositionOutcome};
use crate::services::errors::match_state_errors::MatchStateError;
use crate::services::showdown_protocol::{is_valid_choice, FORFEIT};

/// Number of pieces on a full board.
pub const BOARD_PIECES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftStage {
    Ban,
    Pick,
}

/// A validated capture that has not touched the state yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub entry: MatchLogEntry,
    pub setup: BattleSetup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChessMoveOutcome {
    Moved(Vec<MatchLogEntry>),
    Capture(CapturePlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleChoicePlan {
    /// The opponent has not chosen yet.
    Waiting,
    Ready {
        turn: BattleTurn,
        setup: BattleSetup,
        forfeit: bool,
    },
}

/// The match as a pure state machine. Every change goes through
/// [`MatchState::apply`], so replaying a tape rebuilds the same state the
/// live intents produced.
#[derive(Debug, Clone)]
pub struct MatchState {
    config: MatchConfig,
    chess: ChessService,
    board: Board,
    ply: u32,
    creatures: BoardCreatureManager,
    modifiers: ModifierLayer,
    phase: MatchPhase,
    pending_battle: Option<PendingBattle>,
    winner: Option<Color>,
    end_reason: Option<GameEndReason>,
    clock: MatchClock,
}

fn pool_size(config: &MatchConfig) -> usize {
    match config.format {
        MatchFormat::Random => BOARD_PIECES,
        MatchFormat::Draft => config
            .options
            .draft_pool_size
            .max(BOARD_PIECES.saturating_add(config.options.total_bans())),
    }
}

/// Full budget for both sides with white's clock running from `started_at`.
fn opening_clock(config: &MatchConfig) -> MatchClock {
    let timers = config.options.timers;
    let budget = match config.format {
        MatchFormat::Random => timers.chess_budget_ms,
        MatchFormat::Draft => timers.draft_budget_ms,
    };
    let mut clock = MatchClock::new(budget, config.started_at);
    clock.start(Color::White, config.started_at);
    clock
}

fn corrupt(msg: impl std::fmt::Display) -> MatchStateError {
    MatchStateError::Corrupt(msg.to_string())
}

fn square(name: &str) -> Result<Square, MatchStateError> {
    parse_square(name).ok_or_else(|| MatchStateError::InvalidSquare(name.to_string()))
}

impl MatchState {
    pub fn new(config: MatchConfig, roster: &CreatureRoster) -> Self {
        let pool = roster.draw(config.seed, pool_size(&config));
        let (creatures, phase) = match config.format {
            MatchFormat::Random => (BoardCreatureManager::new_random(pool), MatchPhase::ChessTurn),
            MatchFormat::Draft => (BoardCreatureManager::new_draft(pool), MatchPhase::DraftBan),
        };
        MatchState {
            clock: opening_clock(&config),
            config,
            chess: ChessService::new(),
            board: Board::default(),
            ply: 0,
            creatures,
            modifiers: ModifierLayer::new(),
            phase,
            pending_battle: None,
            winner: None,
            end_reason: None,
        }
    }

    /// Rebuilds the state from the persisted snapshot.
    pub fn restore(snapshot: &MatchSnapshot, roster: &CreatureRoster) -> Result<Self, MatchStateError> {
        let chess = ChessService::new();
        let board = chess.parse_position(&snapshot.fen).map_err(corrupt)?;
        let pool = roster.draw(snapshot.config.seed, pool_size(&snapshot.config));
        let creatures = BoardCreatureManager::restore(
            pool,
            &snapshot.locations,
            snapshot.captured.clone(),
            snapshot.bans.clone(),
            |square| chess.occupant(&board, square),
        )?;

        Ok(MatchState {
            config: snapshot.config.clone(),
            chess,
            board,
            ply: snapshot.ply,
            creatures,
            modifiers: ModifierLayer::from_bytes(&snapshot.modifiers),
            phase: snapshot.phase,
            pending_battle: snapshot.pending_battle.clone(),
            winner: snapshot.winner,
            end_reason: snapshot.end_reason,
            clock: snapshot.clock,
        })
    }

    /// Runs a whole tape through [`MatchState::apply`] from a fresh start.
    pub fn replay<'a>(
        config: MatchConfig,
        roster: &CreatureRoster,
        entries: impl IntoIterator<Item = &'a MatchLogEntry>,
    ) -> Result<Self, MatchStateError> {
        let mut state = MatchState::new(config, roster);
        for entry in entries {
            state.apply(entry)?;
        }
        Ok(state)
    }

    /// Copies the mutable parts of the state into a snapshot.
    pub fn write_snapshot(&self, snapshot: &mut MatchSnapshot) {
        snapshot.phase = self.phase;
        snapshot.fen = self.fen();
        snapshot.ply = self.ply;
        snapshot.locations = self.creatures.indexed_locations();
        snapshot.captured = self.creatures.captured().to_vec();
        snapshot.bans = self.creatures.bans().to_vec();
        snapshot.pending_battle = self.pending_battle.clone();
        snapshot.modifiers = self.modifiers.to_bytes();
        snapshot.winner = self.winner;
        snapshot.end_reason = self.end_reason;
        snapshot.clock = self.clock;
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn fen(&self) -> String {
        self.chess.fen(&self.board)
    }

    pub fn ply(&self) -> u32 {
        self.ply
    }

    pub fn creatures(&self) -> &BoardCreatureManager {
        &self.creatures
    }

    pub fn modifiers(&self) -> &ModifierLayer {
        &self.modifiers
    }

    pub fn pending_battle(&self) -> Option<&PendingBattle> {
        self.pending_battle.as_ref()
    }

    pub fn winner(&self) -> Option<Color> {
        self.winner
    }

    pub fn end_reason(&self) -> Option<GameEndReason> {
        self.end_reason
    }

    /// The clock as of the last recorded clock entry.
    pub fn clock(&self) -> &MatchClock {
        &self.clock
    }

    pub fn draft_turn(&self) -> (DraftStage, Color) {
        let bans = self.creatures.bans().len();
        if bans < self.config.options.total_bans() {
            (DraftStage::Ban, Color::from_parity(bans))
        } else {
            (DraftStage::Pick, Color::from_parity(self.creatures.assigned_count()))
        }
    }

    /// Color expected to act next, `None` once the match is over.
    pub fn current_turn(&self) -> Option<Color> {
        match self.phase {
            MatchPhase::Ended => None,
            MatchPhase::DraftBan => Some(self.draft_turn().1),
            MatchPhase::ChessTurn | MatchPhase::BattlePending => {
                Some(self.board.side_to_move().into())
            }
        }
    }

    fn ensure_turn(&self, phase: MatchPhase, color: Color) -> Result<(), MatchStateError> {
        if self.phase != phase {
            return Err(MatchStateError::WrongPhase(self.phase));
        }
        if self.current_turn() != Some(color) {
            return Err(MatchStateError::NotYourTurn(color));
        }
        Ok(())
    }

    fn ensure_available(&self, index: usize) -> Result<(), MatchStateError> {
        if index >= self.creatures.pool().len() {
            return Err(MatchStateError::UnknownIndex(index));
        }
        if self.creatures.is_consumed(index) {
            return Err(MatchStateError::AlreadyConsumed(index));
        }
        Ok(())
    }

    fn commit(&mut self, entry: MatchLogEntry) -> Result<MatchLogEntry, MatchStateError> {
        self.apply(&entry)?;
        Ok(entry)
    }

    pub fn submit_ban(&mut self, color: Color, index: usize) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        self.ensure_turn(MatchPhase::DraftBan, color)?;
        if self.draft_turn().0 != DraftStage::Ban {
            return Err(MatchStateError::WrongDraftStage);
        }
        self.ensure_available(index)?;
        Ok(vec![self.commit(MatchLogEntry::Ban(BanEntry { color, index }))?])
    }

    pub fn submit_draft_pick(
        &mut self,
        color: Color,
        index: usize,
        square_name: &str,
    ) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        self.ensure_turn(MatchPhase::DraftBan, color)?;
        if self.draft_turn().0 != DraftStage::Pick {
            return Err(MatchStateError::WrongDraftStage);
        }
        self.ensure_available(index)?;
        let target = square(square_name)?;
        let piece = starting_kind(color, target)
            .ok_or_else(|| MatchStateError::InvalidSquare(square_name.to_string()))?;
        if self.creatures.piece_at(target).is_some() {
            return Err(MatchStateError::InvalidSquare(square_name.to_string()));
        }

        Ok(vec![self.commit(MatchLogEntry::Draft(DraftEntry {
            color,
            index,
            square: target.to_string(),
            piece,
        }))?])
    }

    /// Quiet moves are applied at once. Captures come back as a plan that
    /// only mutates the state once [`MatchState::begin_capture`] is called.
    pub fn submit_chess_move(
        &mut self,
        color: Color,
        san: &str,
    ) -> Result<ChessMoveOutcome, MatchStateError> {
        self.ensure_turn(MatchPhase::ChessTurn, color)?;
        let mv = self
            .chess
            .find_move(&self.board, san)
            .map_err(MatchStateError::IllegalMove)?;

        if !mv.is_capture() {
            let mut entries = vec![self.commit(MatchLogEntry::chess(color, mv.san, None))?];
            entries.extend(self.roll_modifiers()?);
            entries.extend(self.position_end()?);
            return Ok(ChessMoveOutcome::Moved(entries));
        }

        let contested = mv.contested_square();
        let attacker = self
            .creatures
            .piece_at(mv.source())
            .filter(|piece| piece.color == color)
            .ok_or_else(|| MatchStateError::MissingCreature(mv.source().to_string()))?;
        let defender = self
            .creatures
            .piece_at(contested)
            .filter(|piece| piece.color == color.opposite())
            .ok_or_else(|| MatchStateError::MissingCreature(contested.to_string()))?;

        let seed = self.battle_seed();
        let entry = MatchLogEntry::Pokemon(PokemonEvent::BattleStart {
            attacker: color,
            san: mv.san.clone(),
            attacker_square: mv.source().to_string(),
            defender_square: contested.to_string(),
            seed,
            attacker_species: attacker.creature.species.clone(),
            defender_species: defender.creature.species.clone(),
        });
        let setup = BattleSetup {
            format_id: self.config.options.battle_format.clone(),
            seed,
            attacker: color,
            attacker_creature: attacker.creature.clone(),
            defender_creature: defender.creature.clone(),
            offense_advantage: self.config.options.offense_advantage.clone(),
            field: self.modifiers.get(contested).copied(),
            history: Vec::new(),
            next: None,
            timeout_ms: self.config.options.battle_timeout_ms,
        };
        Ok(ChessMoveOutcome::Capture(CapturePlan { entry, setup }))
    }

    pub fn begin_capture(&mut self, plan: CapturePlan) -> Result<MatchLogEntry, MatchStateError> {
        self.commit(plan.entry)
    }

    fn battle_seed(&self) -> [u16; 4] {
        let mut rng = rng_for(self.config.seed, SeedStream::Battle, u64::from(self.ply));
        [rng.gen(), rng.gen(), rng.gen(), rng.gen()]
    }

    /// Validates a battle choice. A lone non-forfeit choice waits for the
    /// opponent; a forfeit or a completed pair is ready to simulate.
    pub fn plan_battle_choice(
        &self,
        color: Color,
        choice: &str,
    ) -> Result<BattleChoicePlan, MatchStateError> {
        if self.phase != MatchPhase::BattlePending {
            return Err(MatchStateError::WrongPhase(self.phase));
        }
        if !is_valid_choice(choice) {
            return Err(MatchStateError::InvalidChoice(choice.to_string()));
        }
        let pending = self
            .pending_battle
            .as_ref()
            .ok_or_else(|| corrupt("battle phase without a pending battle"))?;
        if pending.pending(color).is_some() {
            return Err(MatchStateError::ChoiceAlreadySubmitted(color));
        }

        let forfeit = choice == FORFEIT;
        let other = match pending.pending(color.opposite()) {
            Some(other) => other.clone(),
            None if forfeit => "move 1".to_string(),
            None => return Ok(BattleChoicePlan::Waiting),
        };
        let turn = match color {
            Color::White => BattleTurn {
                white: choice.to_string(),
                black: other,
            },
            Color::Black => BattleTurn {
                white: other,
                black: choice.to_string(),
            },
        };
        let setup = self.battle_setup(Some(turn.clone()))?;
        Ok(BattleChoicePlan::Ready {
            turn,
            setup,
            forfeit,
        })
    }

    /// Stores a choice that waits for the opponent. Not part of the tape.
    pub fn record_choice(&mut self, color: Color, choice: &str) -> Result<(), MatchStateError> {
        let pending = self
            .pending_battle
            .as_mut()
            .ok_or(MatchStateError::WrongPhase(self.phase))?;
        pending.set_pending(color, Some(choice.to_string()));
        Ok(())
    }

    /// Drops a stored choice the battle engine refused.
    pub fn clear_choice(&mut self, color: Color) -> Result<(), MatchStateError> {
        let pending = self
            .pending_battle
            .as_mut()
            .ok_or(MatchStateError::WrongPhase(self.phase))?;
        pending.set_pending(color, None);
        Ok(())
    }

    pub fn battle_setup(&self, next: Option<BattleTurn>) -> Result<BattleSetup, MatchStateError> {
        let pending = self
            .pending_battle
            .as_ref()
            .ok_or(MatchStateError::WrongPhase(self.phase))?;
        let attacker_square = square(&pending.attacker_square)?;
        let defender_square = square(&pending.defender_square)?;
        let attacker = self
            .creatures
            .piece_at(attacker_square)
            .ok_or_else(|| MatchStateError::MissingCreature(pending.attacker_square.clone()))?;
        let defender = self
            .creatures
            .piece_at(defender_square)
            .ok_or_else(|| MatchStateError::MissingCreature(pending.defender_square.clone()))?;

        Ok(BattleSetup {
            format_id: self.config.options.battle_format.clone(),
            seed: pending.seed,
            attacker: pending.attacker,
            attacker_creature: attacker.creature.clone(),
            defender_creature: defender.creature.clone(),
            offense_advantage: self.config.options.offense_advantage.clone(),
            field: self.modifiers.get(defender_square).copied(),
            history: pending.history.clone(),
            next,
            timeout_ms: self.config.options.battle_timeout_ms,
        })
    }

    pub fn commit_turn(&mut self, turn: BattleTurn) -> Result<MatchLogEntry, MatchStateError> {
        self.commit(MatchLogEntry::Pokemon(PokemonEvent::TurnCommitted {
            white: turn.white,
            black: turn.black,
        }))
    }

    /// Applies the battle result to the board: exactly one of the two
    /// contesting pieces leaves it.
    pub fn resolve_battle(
        &mut self,
        winner: Color,
        field: &FieldReport,
    ) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        let pending = self
            .pending_battle
            .clone()
            .ok_or(MatchStateError::WrongPhase(self.phase))?;
        let attacker_square = square(&pending.attacker_square)?;
        let defender_square = square(&pending.defender_square)?;
        let attacker_won = winner == pending.attacker;

        let attacker_kind = self.creatures.piece_at(attacker_square).map(|p| p.kind);
        let defender_kind = self.creatures.piece_at(defender_square).map(|p| p.kind);
        let exposed = !attacker_won
            && self
                .chess
                .force_advance(&self.board, attacker_square)
                .map_err(corrupt)?
                == ForceAdvance::KingExposed;

        let mut entries = vec![self.commit(MatchLogEntry::Pokemon(PokemonEvent::Victory {
            color: winner,
        }))?];
        entries.push(self.commit(MatchLogEntry::chess(
            pending.attacker,
            pending.san.clone(),
            Some(!attacker_won),
        ))?);

        let king_lost = if attacker_won {
            defender_kind == Some(PieceKind::King)
        } else {
            exposed || attacker_kind == Some(PieceKind::King)
        };
        if king_lost {
            entries.push(self.commit(MatchLogEntry::game_end(
                Some(winner),
                GameEndReason::KingCaptured,
            ))?);
            return Ok(entries);
        }

        entries.extend(self.tick_entries(defender_square, field)?);
        entries.extend(self.position_end()?);
        Ok(entries)
    }

    /// Decrements the contested square's effects and folds in the field the
    /// battle ended with.
    fn tick_entries(
        &mut self,
        target: Square,
        field: &FieldReport,
    ) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        let current = self.modifiers.get(target).copied().unwrap_or_default();
        let mut layer = self.modifiers.clone();
        layer.tick(target);

        let options = &self.config.options;
        if options.weather_wars {
            let durations = options.modifier_duration_range();
            let mut rng = rng_for(
                self.config.seed,
                SeedStream::Modifiers,
                u64::from(self.ply) * 2 + 1,
            );
            let ticked = layer.get(target).copied().unwrap_or_default();
            match field.weather {
                Some(Some(weather)) if ticked.weather.map(|w| w.effect) != Some(weather) => {
                    layer.set_weather(target, weather, rng.gen_range(durations.clone()));
                }
                Some(None) => layer.set(
                    target,
                    SquareModifier {
                        weather: None,
                        ..ticked
                    },
                ),
                _ => {}
            }
            let ticked = layer.get(target).copied().unwrap_or_default();
            match field.terrain {
                Some(Some(terrain)) if ticked.terrain.map(|t| t.effect) != Some(terrain) => {
                    layer.set_terrain(target, terrain, rng.gen_range(durations));
                }
                Some(None) => layer.set(
                    target,
                    SquareModifier {
                        terrain: None,
                        ..ticked
                    },
                ),
                _ => {}
            }
        }

        let next = layer.get(target).copied().unwrap_or_default();
        if next == current {
            return Ok(Vec::new());
        }
        Ok(vec![self.commit(modifier_entry(target, &next))?])
    }

    /// Ends the match on checkmate or stalemate after a chess transition.
    fn position_end(&mut self) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        let mut entries = Vec::new();
        let mover = Color::from(self.board.side_to_move()).opposite();
        match self.chess.outcome(&self.board) {
            PositionOutcome::Checkmate => entries.push(
                self.commit(MatchLogEntry::game_end(Some(mover), GameEndReason::Checkmate))?,
            ),
            PositionOutcome::Stalemate => entries
                .push(self.commit(MatchLogEntry::game_end(None, GameEndReason::Stalemate))?),
            PositionOutcome::Ongoing => {}
        }
        Ok(entries)
    }

    /// Every `modifier_interval` full moves, when a quiet move hands the
    /// turn to white, spawns fresh effects up to a newly rolled target count.
    fn roll_modifiers(&mut self) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        let options = &self.config.options;
        let cycle = u64::from(options.modifier_interval.max(1)) * 2;
        let white_to_move = Color::from(self.board.side_to_move()) == Color::White;
        if !options.weather_wars
            || self.ply == 0
            || !white_to_move
            || u64::from(self.ply) % cycle != 0
        {
            return Ok(Vec::new());
        }

        let mut rng = rng_for(
            self.config.seed,
            SeedStream::Modifiers,
            u64::from(self.ply) * 2,
        );
        let target = rng.gen_range(options.modifier_target_range()) as usize;
        let mut layer = self.modifiers.clone();
        let created =
            layer.create_new_modifiers(&mut rng, target, options.modifier_duration_range());

        let mut entries = Vec::with_capacity(created.len());
        for created_square in created {
            if let Some(modifier) = layer.get(created_square) {
                entries.push(self.commit(modifier_entry(created_square, modifier))?);
            }
        }
        Ok(entries)
    }

    /// Resolves an expired clock. During the draft the timed-out color gets
    /// a random ban or pick; otherwise the opponent wins.
    pub fn timeout_entries(&mut self, expired: Color) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        match self.phase {
            MatchPhase::Ended => Ok(Vec::new()),
            MatchPhase::DraftBan => {
                let (stage, color) = self.draft_turn();
                let step = (self.creatures.bans().len() + self.creatures.assigned_count()) as u64;
                let mut rng = rng_for(self.config.seed, SeedStream::AutoDraft, step);
                let index = *self
                    .creatures
                    .available_indices()
                    .choose(&mut rng)
                    .ok_or_else(|| corrupt("creature pool exhausted"))?;

                let entry = match stage {
                    DraftStage::Ban => MatchLogEntry::Ban(BanEntry { color, index }),
                    DraftStage::Pick => {
                        let open: Vec<(Square, PieceKind)> = starting_squares(color)
                            .into_iter()
                            .filter(|(candidate, _)| self.creatures.piece_at(*candidate).is_none())
                            .collect();
                        let (target, piece) = *open
                            .choose(&mut rng)
                            .ok_or_else(|| corrupt("no open starting square"))?;
                        MatchLogEntry::Draft(DraftEntry {
                            color,
                            index,
                            square: target.to_string(),
                            piece,
                        })
                    }
                };
                Ok(vec![self.commit(entry)?])
            }
            MatchPhase::ChessTurn | MatchPhase::BattlePending => Ok(vec![self.commit(
                MatchLogEntry::game_end(Some(expired.opposite()), GameEndReason::Timeout),
            )?]),
        }
    }

    /// Ends the match on a player's request. Reasons the engine decides
    /// itself are refused, and a player can only hand the win to the
    /// opponent or to nobody.
    pub fn end_match(
        &mut self,
        requester: Color,
        winner: Option<Color>,
        reason: GameEndReason,
    ) -> Result<Vec<MatchLogEntry>, MatchStateError> {
        if self.phase == MatchPhase::Ended {
            return Err(MatchStateError::WrongPhase(self.phase));
        }
        match reason {
            GameEndReason::HostEndedGame | GameEndReason::PlayerDisconnected => {}
            GameEndReason::KingCaptured
            | GameEndReason::Timeout
            | GameEndReason::Checkmate
            | GameEndReason::Stalemate => return Err(MatchStateError::ReservedEndReason(reason)),
        }
        if winner == Some(requester) {
            return Err(MatchStateError::SelfAwardedWin(requester));
        }
        Ok(vec![self.commit(MatchLogEntry::game_end(winner, reason))?])
    }

    /// Records the clock an intent ended with, if it moved.
    pub fn sync_clock(
        &mut self,
        clock: MatchClock,
    ) -> Result<Option<MatchLogEntry>, MatchStateError> {
        if clock == self.clock {
            return Ok(None);
        }
        self.commit(MatchLogEntry::clock(clock)).map(Some)
    }

    fn require_phase(&self, phase: MatchPhase, entry: &str) -> Result<(), MatchStateError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(corrupt(format!("{} entry during {:?}", entry, self.phase)))
        }
    }

    /// The single transition function shared by live play and replay.
    pub fn apply(&mut self, entry: &MatchLogEntry) -> Result<(), MatchStateError> {
        match entry {
            MatchLogEntry::Ban(ban) => {
                self.require_phase(MatchPhase::DraftBan, "ban")?;
                self.creatures.ban_draft_index(ban.index)?;
            }
            MatchLogEntry::Draft(draft) => {
                self.require_phase(MatchPhase::DraftBan, "draft")?;
                let target = square(&draft.square)?;
                self.creatures
                    .assign_from_draft(draft.index, target, draft.piece, draft.color)?;
                if self.creatures.assigned_count() >= BOARD_PIECES {
                    self.phase = MatchPhase::ChessTurn;
                }
            }
            MatchLogEntry::Chess(chess_entry) => self.apply_chess(chess_entry)?,
            MatchLogEntry::Pokemon(event) => match event {
                PokemonEvent::BattleStart {
                    attacker,
                    san,
                    attacker_square,
                    defender_square,
                    seed,
                    ..
                } => {
                    self.require_phase(MatchPhase::ChessTurn, "battle start")?;
                    self.pending_battle = Some(PendingBattle {
                        san: san.clone(),
                        attacker: *attacker,
                        attacker_square: attacker_square.clone(),
                        defender_square: defender_square.clone(),
                        seed: *seed,
                        history: Vec::new(),
                        pending_white: None,
                        pending_black: None,
                    });
                    self.phase = MatchPhase::BattlePending;
                }
                PokemonEvent::TurnCommitted { white, black } => {
                    let pending = self
                        .pending_battle
                        .as_mut()
                        .ok_or_else(|| corrupt("battle turn without a battle"))?;
                    pending.history.push(BattleTurn {
                        white: white.clone(),
                        black: black.clone(),
                    });
                    pending.pending_white = None;
                    pending.pending_black = None;
                }
                PokemonEvent::StreamOutput { .. } | PokemonEvent::Victory { .. } => {}
            },
            MatchLogEntry::Weather(event) => match event {
                WeatherEvent::Modify {
                    square: name,
                    weather,
                    terrain,
                } => {
                    self.modifiers.set(
                        square(name)?,
                        SquareModifier {
                            weather: *weather,
                            terrain: *terrain,
                        },
                    );
                }
                WeatherEvent::Remove { square: name } => self.modifiers.clear(square(name)?),
            },
            MatchLogEntry::Generic(GenericEvent::GameEnd { color, reason }) => {
                self.phase = MatchPhase::Ended;
                self.winner = *color;
                self.end_reason = Some(*reason);
                self.pending_battle = None;
            }
            MatchLogEntry::Generic(GenericEvent::Clock(clock)) => self.clock = *clock,
        }
        Ok(())
    }

    fn apply_chess(&mut self, entry: &ChessEntry) -> Result<(), MatchStateError> {
        if Color::from(self.board.side_to_move()) != entry.color {
            return Err(corrupt(format!("{} moved out of turn", entry.color)));
        }
        let mv = self
            .chess
            .find_move(&self.board, &entry.san)
            .map_err(corrupt)?;

        match (self.phase, entry.failed) {
            (MatchPhase::ChessTurn, None) => {
                if mv.is_capture() {
                    return Err(corrupt(format!("capture {} without a battle", entry.san)));
                }
                if let Some((rook_from, rook_to)) = mv.rook_relocation() {
                    self.creatures.move_piece(rook_from, rook_to, None)?;
                }
                self.creatures.move_piece(mv.source(), mv.dest(), mv.promotion)?;
                self.board = self.chess.apply(&self.board, &mv);
                self.ply += 1;
            }
            (MatchPhase::BattlePending, Some(failed)) => {
                self.pending_battle = None;
                self.phase = MatchPhase::ChessTurn;
                if failed {
                    self.creatures.remove_piece(mv.source())?;
                    if let ForceAdvance::Advanced(next) = self
                        .chess
                        .force_advance(&self.board, mv.source())
                        .map_err(corrupt)?
                    {
                        self.board = next;
                        self.ply += 1;
                    }
                } else {
                    if mv.kind == MoveKind::EnPassant {
                        self.creatures.remove_piece(mv.contested_square())?;
                    }
                    self.creatures.move_piece(mv.source(), mv.dest(), mv.promotion)?;
                    self.board = self.chess.apply(&self.board, &mv);
                    self.ply += 1;
                }
            }
            (phase, _) => {
                return Err(corrupt(format!(
                    "chess entry {} does not fit phase {:?}",
                    entry.san, phase
                )))
            }
        }
        Ok(())
    }
}

fn modifier_entry(target: Square, modifier: &SquareModifier) -> MatchLogEntry {
    if modifier.is_empty() {
        MatchLogEntry::Weather(WeatherEvent::Remove {
            square: target.to_string(),
        })
    } else {
        MatchLogEntry::Weather(WeatherEvent::Modify {
            square: target.to_string(),
            weather: modifier.weather,
            terrain: modifier.terrain,
        })
    }
}
