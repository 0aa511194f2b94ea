mod common;

use common::{harness, start_request, without_clock, Harness, Outcome, BLACK, ROOM, WHITE};
use shared::models::intent::responses::IntentOutcome;
use shared::models::log_entry::{GameEndReason, MatchLogEntry, PokemonEvent};
use shared::models::match_session::{MatchFormat, MatchOptions, MatchPhase};
use shared::models::piece::{parse_square, Color, PieceKind};
use shared::services::errors::match_service_errors::{ErrorKind, MatchServiceError};
use shared::services::errors::match_state_errors::MatchStateError;

async fn opened_capture(h: &Harness) -> IntentOutcome {
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();
    h.service.submit_chess_move(ROOM, WHITE, "d4").await.unwrap();
    h.service.submit_chess_move(ROOM, BLACK, "e5").await.unwrap();
    h.service.submit_chess_move(ROOM, WHITE, "dxe5").await.unwrap()
}

async fn play_battle_turn(h: &Harness) -> IntentOutcome {
    let waiting = h
        .service
        .submit_battle_move(ROOM, WHITE, "move 1")
        .await
        .unwrap();
    assert!(without_clock(&waiting.white).is_empty());
    assert!(without_clock(&waiting.black).is_empty());
    assert_eq!(waiting.phase, MatchPhase::BattlePending);

    h.service
        .submit_battle_move(ROOM, BLACK, "move 1")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_capture_opens_battle_before_board_changes() {
    let h = harness();

    let outcome = opened_capture(&h).await;

    assert_eq!(outcome.phase, MatchPhase::BattlePending);
    assert!(matches!(
        &outcome.white[0],
        MatchLogEntry::Pokemon(PokemonEvent::BattleStart { attacker: Color::White, san, .. }) if san == "dxe5"
    ));

    let state = h.service.load_state(ROOM).await.unwrap();
    let pending = state.pending_battle().unwrap();
    assert_eq!(pending.attacker, Color::White);
    assert_eq!(pending.attacker_square, "d4");
    assert_eq!(pending.defender_square, "e5");

    let d4 = state.creatures().piece_at(parse_square("d4").unwrap()).unwrap();
    let e5 = state.creatures().piece_at(parse_square("e5").unwrap()).unwrap();
    assert_eq!(d4.color, Color::White);
    assert_eq!(e5.color, Color::Black);
    assert!(state.fen().starts_with("rnbqkbnr/pppp1ppp/8/4p3/3P4/8/PPP1PPPP/RNBQKBNR w"));
}

#[tokio::test]
async fn test_attacker_victory_completes_the_capture() {
    let h = harness();
    opened_capture(&h).await;
    h.engine.set_outcome(Outcome::AttackerWins);

    let outcome = play_battle_turn(&h).await;

    assert!(outcome
        .white
        .contains(&MatchLogEntry::chess(Color::White, "dxe5", Some(false))));
    assert!(outcome
        .black
        .contains(&MatchLogEntry::chess(Color::White, "dxe5", Some(false))));
    assert_eq!(outcome.phase, MatchPhase::ChessTurn);
    assert!(!outcome.white.iter().any(MatchLogEntry::is_game_end));

    let state = h.service.load_state(ROOM).await.unwrap();
    assert!(state.pending_battle().is_none());
    assert_eq!(state.current_turn(), Some(Color::Black));
    assert!(state.creatures().piece_at(parse_square("d4").unwrap()).is_none());
    let e5 = state.creatures().piece_at(parse_square("e5").unwrap()).unwrap();
    assert_eq!(e5.color, Color::White);
    assert_eq!(state.creatures().captured().len(), 1);
    assert_eq!(state.creatures().captured()[0].color, Color::Black);
    assert_eq!(state.creatures().captured()[0].kind, PieceKind::Pawn);
}

#[tokio::test]
async fn test_defender_victory_removes_the_attacker() {
    let h = harness();
    opened_capture(&h).await;
    h.engine.set_outcome(Outcome::DefenderWins);

    let outcome = play_battle_turn(&h).await;

    assert!(outcome
        .white
        .contains(&MatchLogEntry::chess(Color::White, "dxe5", Some(true))));
    assert_eq!(outcome.phase, MatchPhase::ChessTurn);

    let state = h.service.load_state(ROOM).await.unwrap();
    assert_eq!(state.current_turn(), Some(Color::Black));
    assert!(state.creatures().piece_at(parse_square("d4").unwrap()).is_none());
    let e5 = state.creatures().piece_at(parse_square("e5").unwrap()).unwrap();
    assert_eq!(e5.color, Color::Black);
    assert_eq!(state.creatures().captured()[0].color, Color::White);
}

#[tokio::test]
async fn test_undecided_turn_keeps_battle_pending() {
    let h = harness();
    opened_capture(&h).await;
    h.engine.set_outcome(Outcome::Continue);

    let outcome = play_battle_turn(&h).await;

    assert_eq!(outcome.phase, MatchPhase::BattlePending);
    assert!(outcome.white.contains(&MatchLogEntry::Pokemon(
        PokemonEvent::TurnCommitted {
            white: "move 1".to_string(),
            black: "move 1".to_string(),
        }
    )));
    let state = h.service.load_state(ROOM).await.unwrap();
    assert_eq!(state.pending_battle().unwrap().history.len(), 1);
    assert!(outcome.clock.white.running);
    assert!(outcome.clock.black.running);
}

#[tokio::test]
async fn test_forfeit_hands_the_battle_to_the_opponent() {
    let h = harness();
    opened_capture(&h).await;

    let outcome = h
        .service
        .submit_battle_move(ROOM, BLACK, "forfeit")
        .await
        .unwrap();

    assert!(outcome
        .white
        .contains(&MatchLogEntry::chess(Color::White, "dxe5", Some(false))));
    assert_eq!(outcome.phase, MatchPhase::ChessTurn);
}

#[tokio::test]
async fn test_rejected_choice_is_cleared_for_resubmission() {
    let h = harness();
    opened_capture(&h).await;
    h.engine.set_outcome(Outcome::RejectDefender);
    h.service
        .submit_battle_move(ROOM, WHITE, "move 1")
        .await
        .unwrap();

    let result = h.service.submit_battle_move(ROOM, BLACK, "move 4").await;

    assert!(matches!(result, Err(MatchServiceError::ChoiceRejected(Color::Black))));
    let state = h.service.load_state(ROOM).await.unwrap();
    let pending = state.pending_battle().unwrap();
    assert!(pending.pending(Color::Black).is_none());
    assert_eq!(pending.pending(Color::White).map(String::as_str), Some("move 1"));
    assert!(pending.history.is_empty());
}

#[tokio::test]
async fn test_engine_failure_leaves_state_untouched() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();
    h.service.submit_chess_move(ROOM, WHITE, "d4").await.unwrap();
    h.service.submit_chess_move(ROOM, BLACK, "e5").await.unwrap();
    h.engine.set_outcome(Outcome::Crash);

    let err = h
        .service
        .submit_chess_move(ROOM, WHITE, "dxe5")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Simulation);
    let state = h.service.load_state(ROOM).await.unwrap();
    assert_eq!(state.phase(), MatchPhase::ChessTurn);
    assert_eq!(state.ply(), 2);
}

#[tokio::test]
async fn test_expired_clock_ends_the_match() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();
    h.time.advance(600_001);

    let outcome = h.service.check_and_apply_timeout(ROOM).await.unwrap();

    assert_eq!(
        without_clock(&outcome.white),
        vec![MatchLogEntry::game_end(Some(Color::Black), GameEndReason::Timeout)]
    );
    assert!(outcome.white.last().is_some_and(MatchLogEntry::is_clock));
    assert_eq!(outcome.phase, MatchPhase::Ended);
    assert!(!outcome.clock.white.running);
    assert!(!outcome.clock.black.running);

    let err = h
        .service
        .submit_chess_move(ROOM, WHITE, "e4")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MatchServiceError::State(MatchStateError::WrongPhase(MatchPhase::Ended))
    ));
}

#[tokio::test]
async fn test_late_move_is_superseded_by_timeout() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();
    h.time.advance(600_001);

    let outcome = h
        .service
        .submit_chess_move(ROOM, WHITE, "e4")
        .await
        .unwrap();

    assert_eq!(outcome.phase, MatchPhase::Ended);
    let events = without_clock(&outcome.white);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_game_end());
}

#[tokio::test]
async fn test_no_pending_timeout_changes_nothing() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();
    h.time.advance(1_000);

    let outcome = h.service.check_and_apply_timeout(ROOM).await.unwrap();

    assert!(outcome.is_empty());
    assert_eq!(outcome.phase, MatchPhase::ChessTurn);
}

#[tokio::test]
async fn test_host_can_end_and_rematch_swaps_colors() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();

    let ended = h
        .service
        .end_match(ROOM, WHITE, None, GameEndReason::HostEndedGame)
        .await
        .unwrap();
    assert_eq!(ended.phase, MatchPhase::Ended);

    let rematch = h.service.rematch(ROOM, BLACK).await.unwrap();
    assert_eq!(rematch.phase, MatchPhase::ChessTurn);

    let state = h.service.load_state(ROOM).await.unwrap();
    assert_eq!(state.config().white_player, BLACK);
    assert_eq!(state.config().black_player, WHITE);
    assert_eq!(state.config().match_id, rematch.match_id);
    h.service.submit_chess_move(ROOM, BLACK, "e4").await.unwrap();
}

#[tokio::test]
async fn test_draft_timeout_bans_for_the_idle_player() {
    let h = harness();
    let options = MatchOptions {
        bans_per_player: 1,
        ..MatchOptions::default()
    };
    h.service
        .start_match(start_request(MatchFormat::Draft, options))
        .await
        .unwrap();
    h.time.advance(120_001);

    let outcome = h.service.check_and_apply_timeout(ROOM).await.unwrap();

    let events = without_clock(&outcome.white);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        MatchLogEntry::Ban(ban) if ban.color == Color::White
    ));
    assert_eq!(outcome.phase, MatchPhase::DraftBan);
    assert!(outcome.clock.black.running);
    assert!(!outcome.clock.white.running);
}

#[tokio::test]
async fn test_intent_outliving_its_lock_loses_the_commit() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();
    h.service.submit_chess_move(ROOM, WHITE, "d4").await.unwrap();
    h.service.submit_chess_move(ROOM, BLACK, "e5").await.unwrap();
    let gate = h.engine.hold_next_run();

    let capture = {
        let service = h.service.clone();
        tokio::spawn(async move { service.submit_chess_move(ROOM, WHITE, "dxe5").await })
    };
    gate.entered.notified().await;
    h.time.advance(31_000);

    let quiet = h.service.submit_chess_move(ROOM, WHITE, "Nf3").await.unwrap();
    assert_eq!(quiet.white[0], MatchLogEntry::chess(Color::White, "Nf3", None));

    gate.release.notify_one();
    let err = capture.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Retry);

    let state = h.service.load_state(ROOM).await.unwrap();
    assert_eq!(state.phase(), MatchPhase::ChessTurn);
    assert_eq!(state.ply(), 3);
    assert!(state.pending_battle().is_none());
    assert!(state.creatures().piece_at(parse_square("f3").unwrap()).is_some());

    let tape = h.service.replay(ROOM).await.unwrap();
    assert_eq!(tape.fen(), state.fen());
}

#[tokio::test]
async fn test_player_end_cannot_name_themselves_winner() {
    let h = harness();
    h.service
        .start_match(start_request(MatchFormat::Random, MatchOptions::default()))
        .await
        .unwrap();

    let err = h
        .service
        .end_match(ROOM, BLACK, Some(Color::Black), GameEndReason::PlayerDisconnected)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MatchServiceError::State(MatchStateError::SelfAwardedWin(Color::Black))
    ));

    let ended = h
        .service
        .end_match(ROOM, BLACK, Some(Color::White), GameEndReason::PlayerDisconnected)
        .await
        .unwrap();
    assert_eq!(ended.phase, MatchPhase::Ended);
    let state = h.service.load_state(ROOM).await.unwrap();
    assert_eq!(state.winner(), Some(Color::White));
}
