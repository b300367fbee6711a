//! Turn loop, board synchronization and take-back scenarios on the
//! in-memory board.

mod common;

use common::{Harness, ScriptedAgent, config, config_with_sync, layout_after, sq, wait_for};
use std::sync::Arc;
use std::time::Duration;
use strictly_chess::{
    ChessGame, Color, EngineRegistry, GameEvent, Layout, LineupFactory, MemoryBoard, MoveInput,
    PendingState, PlayOutcome, ReadyPhase, START_FEN, ShakmatyRules, in_agreement,
};
use tokio::time::{Instant, timeout};

#[tokio::test]
async fn test_engine_move_waits_for_board_then_passes_turn() {
    let white = ScriptedAgent::new("white", &["e2e4"]);
    let mut h = Harness::start(config(1, 0), vec![("white-0", white.clone())], None).await;

    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    let GameEvent::WaitingBoardSync { record, before, want } = waiting else {
        unreachable!()
    };
    assert_eq!(record.uci(), "e2e4");
    assert_eq!(before, Layout::start());
    assert_eq!(want, layout_after("e4"));
    assert_eq!(h.game.pending_state(), PendingState::WaitBoardSync);
    assert!(h.board.commits().is_empty());

    h.board
        .move_piece(sq("e2"), sq("e4"))
        .expect("Pawn on e2");

    let synced = h.next(|e| matches!(e, GameEvent::BoardSynced { .. })).await;
    assert!(matches!(synced, GameEvent::BoardSynced { record } if record.uci() == "e2e4"));
    let moved = h.next(|e| matches!(e, GameEvent::PlayerMoved { .. })).await;
    assert!(matches!(
        moved,
        GameEvent::PlayerMoved {
            color: Color::White,
            interrupted: false,
            ..
        }
    ));

    h.pending(PendingState::WaitPlayer(Color::Black)).await;
    assert_eq!(h.game.turn(), Color::Black);
    assert_eq!(h.board.commits().len(), 1);
    assert_eq!(white.asked(), 1);
    h.task.abort();
}

#[tokio::test]
async fn test_commit_is_in_agreement_with_board() {
    let white = ScriptedAgent::new("white", &["g1f3"]);
    let mut h = Harness::start(config(1, 0), vec![("white-0", white)], None).await;

    h.next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    h.board.move_piece(sq("g1"), sq("f3"));
    h.next(|e| matches!(e, GameEvent::BoardSynced { .. })).await;

    let commit = h.board.commits().pop().expect("Move committed");
    assert_eq!(commit.color, Color::White);
    assert!(in_agreement(
        h.board.as_ref(),
        commit.color,
        &commit.layout,
        commit.cleared.first().copied(),
    ));
    h.task.abort();
}

#[tokio::test]
async fn test_en_passant_waits_for_captured_pawn_removal() {
    let white = ScriptedAgent::new("white", &["e5d6"]);
    let mut h = Harness::start(
        config(1, 0),
        vec![("white-0", white)],
        Some("e4 a6 e5 d5"),
    )
    .await;

    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    let GameEvent::WaitingBoardSync { record, .. } = waiting else {
        unreachable!()
    };
    assert!(record.flags().en_passant);
    assert_eq!(record.en_passant_square(), Some(sq("d5")));

    // Capturing pawn placed, captured pawn still on the board.
    h.board.move_piece(sq("e5"), sq("d6"));
    h.next(|e| matches!(e, GameEvent::BoardNotSyncChange { .. }))
        .await;
    assert_eq!(h.game.pending_state(), PendingState::WaitBoardSync);
    assert!(h.board.commits().is_empty());

    h.board.remove_piece(sq("d5"));
    h.next(|e| matches!(e, GameEvent::BoardSynced { .. })).await;

    let commit = h.board.commits().pop().expect("Move committed");
    assert_eq!(commit.cleared, vec![sq("d5")]);
    assert!(in_agreement(
        h.board.as_ref(),
        Color::White,
        &commit.layout,
        Some(sq("d5")),
    ));
    h.task.abort();
}

#[tokio::test]
async fn test_sync_ignores_opponent_pieces() {
    let white = ScriptedAgent::new("white", &["e2e4"]);
    let mut h = Harness::start(config(1, 0), vec![("white-0", white)], None).await;

    h.next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    // A black piece knocked over does not block White's sync.
    h.board.remove_piece(sq("a7"));
    h.board.move_piece(sq("e2"), sq("e4"));
    h.next(|e| matches!(e, GameEvent::BoardSynced { .. })).await;
    h.task.abort();
}

#[tokio::test]
async fn test_illegal_move_is_retried_with_same_engine() {
    let first = ScriptedAgent::new("first", &["e2e5", "e2e4"]);
    let second = ScriptedAgent::new("second", &["d2d4"]);
    let mut h = Harness::start(
        config(2, 0),
        vec![("white-0", first.clone()), ("white-1", second.clone())],
        None,
    )
    .await;

    let illegal = h.next(|e| matches!(e, GameEvent::IllegalMove { .. })).await;
    assert!(matches!(
        illegal,
        GameEvent::IllegalMove { color: Color::White, input: MoveInput::Uci(ref mv), .. } if mv == "e2e5"
    ));

    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    assert!(matches!(waiting, GameEvent::WaitingBoardSync { record, .. } if record.uci() == "e2e4"));
    assert_eq!(first.asked(), 2);
    assert_eq!(second.asked(), 0);

    // The retried turn still counts once: the next turn moves on.
    h.board.move_piece(sq("e2"), sq("e4"));
    h.pending(PendingState::WaitPlayer(Color::Black)).await;
    h.board.move_piece(sq("e7"), sq("e5"));
    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    assert!(matches!(waiting, GameEvent::WaitingBoardSync { record, .. } if record.uci() == "d2d4"));
    assert_eq!((first.asked(), second.asked()), (2, 1));
    h.task.abort();
}

#[tokio::test]
async fn test_ensemble_rotation_cycles_back_to_first_engine() {
    let a = ScriptedAgent::new("a", &["e2e4", "f1c4"]);
    let b = ScriptedAgent::new("b", &["d2d4"]);
    let c = ScriptedAgent::new("c", &["g1f3"]);
    let black = ScriptedAgent::new("black", &["e7e5", "d7d6", "b8c6"]);
    let mut h = Harness::start(
        config(3, 1),
        vec![
            ("white-0", a.clone()),
            ("white-1", b.clone()),
            ("white-2", c.clone()),
            ("black-0", black.clone()),
        ],
        None,
    )
    .await;
    let operator = h.spawn_operator();

    let mut white_moves = Vec::new();
    while white_moves.len() < 4 {
        let event = h
            .next(|e| {
                matches!(
                    e,
                    GameEvent::PlayerMoved {
                        color: Color::White,
                        ..
                    }
                )
            })
            .await;
        if let GameEvent::PlayerMoved { record, .. } = event {
            white_moves.push(record.uci());
        }
    }

    assert_eq!(white_moves, ["e2e4", "d2d4", "g1f3", "f1c4"]);
    assert_eq!((a.asked(), b.asked(), c.asked()), (2, 1, 1));
    // Every agent sees every position before the active one searches.
    assert_eq!(a.positions(), 4);
    assert_eq!(b.positions(), 4);
    operator.abort();
    h.task.abort();
}

#[tokio::test]
async fn test_take_back_single_move_rewinds_to_start() {
    let white = ScriptedAgent::new("white", &["e2e4"]);
    let mut h = Harness::start(config(1, 0), vec![("white-0", white.clone())], None).await;

    h.next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    h.board.move_piece(sq("e2"), sq("e4"));
    h.pending(PendingState::WaitPlayer(Color::Black)).await;

    timeout(common::WAIT, h.game.take_back())
        .await
        .expect("Take-back serviced")
        .expect("Take-back accepted");

    let rolled = h.next(|e| matches!(e, GameEvent::TakeBack { .. })).await;
    assert!(matches!(rolled, GameEvent::TakeBack { ref moves } if moves.len() == 1));
    h.next(|e| {
        matches!(
            e,
            GameEvent::WaitingForBoardReady {
                phase: ReadyPhase::TakeBack,
                ..
            }
        )
    })
    .await;

    assert_eq!(h.game.fen(), START_FEN);
    assert_eq!(h.game.history_len(), 0);
    assert_eq!(h.game.pending_state(), PendingState::WaitBoardReady);

    // Dropped while the board is being set up.
    timeout(Duration::from_millis(500), h.game.take_back())
        .await
        .expect("Ignored take-back returns at once")
        .expect("Ignored take-back is not an error");
    assert_eq!(h.game.pending_state(), PendingState::WaitBoardReady);

    white.push("d2d4");
    h.board.place_layout(Layout::start());
    h.next(|e| matches!(e, GameEvent::BoardReady { .. })).await;

    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    assert!(matches!(waiting, GameEvent::WaitingBoardSync { record, .. } if record.uci() == "d2d4"));
    h.task.abort();
}

#[tokio::test]
async fn test_take_back_undoes_exactly_two_half_moves() {
    let mut h = Harness::start(config(0, 0), vec![], Some("e4 e5 Nf3")).await;
    h.pending(PendingState::WaitPlayer(Color::Black)).await;
    assert_eq!(h.game.history_len(), 3);

    timeout(common::WAIT, h.game.take_back())
        .await
        .expect("Take-back serviced")
        .expect("Take-back accepted");

    let rolled = h.next(|e| matches!(e, GameEvent::TakeBack { .. })).await;
    let GameEvent::TakeBack { moves } = rolled else {
        unreachable!()
    };
    let undone: Vec<String> = moves.iter().map(|m| m.uci()).collect();
    assert_eq!(undone, ["g1f3", "e7e5"]);
    assert_eq!(h.game.history_len(), 1);
    assert_eq!(h.game.game_layout(), layout_after("e4"));

    h.board.place_layout(layout_after("e4"));
    h.next(|e| matches!(e, GameEvent::BoardReady { .. })).await;
    // Black, who asked, moves again.
    h.pending(PendingState::WaitPlayer(Color::Black)).await;
    h.task.abort();
}

#[tokio::test]
async fn test_interrupt_during_sync_does_not_commit() {
    let white = ScriptedAgent::new("white", &["e2e4", "d2d4"]);
    let mut h = Harness::start(config(1, 0), vec![("white-0", white)], None).await;

    h.next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    timeout(common::WAIT, h.game.take_back())
        .await
        .expect("Take-back serviced")
        .expect("Take-back accepted");

    let moved = h.next(|e| matches!(e, GameEvent::PlayerMoved { .. })).await;
    assert!(matches!(
        moved,
        GameEvent::PlayerMoved {
            color: Color::White,
            interrupted: true,
            ..
        }
    ));

    // The unsynced move is rolled back and White moves again.
    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    let GameEvent::WaitingBoardSync { record, before, .. } = waiting else {
        unreachable!()
    };
    assert_eq!(record.color(), Color::White);
    assert_eq!(record.uci(), "d2d4");
    assert_eq!(before, Layout::start());
    assert!(h.board.commits().is_empty());
    h.task.abort();
}

#[tokio::test]
async fn test_reset_abandons_game() {
    let mut h = Harness::start(config(0, 0), vec![], None).await;
    h.pending(PendingState::WaitPlayer(Color::White)).await;

    timeout(common::WAIT, h.game.reset())
        .await
        .expect("Reset serviced")
        .expect("Reset accepted");

    let outcome = timeout(common::WAIT, &mut h.task)
        .await
        .expect("Game loop ends")
        .expect("Game task not cancelled")
        .expect("Game loop succeeds");
    assert_eq!(outcome, PlayOutcome::Abandoned);
}

#[tokio::test]
async fn test_second_interrupt_is_rejected_while_pending() {
    let h = Harness::start(config(0, 0), vec![], None).await;
    h.pending(PendingState::WaitPlayer(Color::White)).await;

    let reset = h.game.reset();
    tokio::pin!(reset);
    // The first poll arms the slot, then waits for delivery.
    assert!(futures::poll!(reset.as_mut()).is_pending());

    let err = h.game.take_back().await.unwrap_err();
    assert!(matches!(err, strictly_chess::GameError::InterruptPending));

    timeout(common::WAIT, reset)
        .await
        .expect("Reset serviced")
        .expect("Reset accepted");
}

#[tokio::test]
async fn test_checkmate_ends_game() {
    let white = ScriptedAgent::new("white", &["f2f3", "g2g4"]);
    let black = ScriptedAgent::new("black", &["e7e5", "d8h4"]);
    let mut h = Harness::start(
        config(1, 1),
        vec![("white-0", white), ("black-0", black)],
        None,
    )
    .await;
    let operator = h.spawn_operator();

    let over = h.next(|e| matches!(e, GameEvent::GameOver { .. })).await;
    assert!(matches!(
        over,
        GameEvent::GameOver {
            result: strictly_chess::GameResult::Checkmate {
                winner: Color::Black
            }
        }
    ));
    let outcome = timeout(common::WAIT, &mut h.task)
        .await
        .expect("Game loop ends")
        .expect("Game task not cancelled")
        .expect("Game loop succeeds");
    assert!(matches!(outcome, PlayOutcome::GameOver(_)));
    operator.abort();
}

#[tokio::test]
async fn test_unknown_engine_fails_game_setup() {
    let config = config(1, 0);
    let registry = std::sync::Arc::new(strictly_chess::EngineRegistry::new(
        config.engines().clone(),
    ));
    let game = strictly_chess::ChessGame::new(
        strictly_chess::ShakmatyRules::new(),
        std::sync::Arc::new(strictly_chess::MemoryBoard::start()),
        config.settings().clone(),
    );
    let factory = strictly_chess::LineupFactory::new(config, registry);

    let err = timeout(common::WAIT, game.start(&factory, None, None))
        .await
        .expect("Setup finishes")
        .unwrap_err();
    assert!(matches!(err, strictly_chess::GameError::Config(_)));
}

#[tokio::test]
async fn test_bad_seed_move_is_reported() {
    let config = config(0, 0);
    let registry = std::sync::Arc::new(strictly_chess::EngineRegistry::new(
        config.engines().clone(),
    ));
    let game = strictly_chess::ChessGame::new(
        strictly_chess::ShakmatyRules::new(),
        std::sync::Arc::new(strictly_chess::MemoryBoard::start()),
        config.settings().clone(),
    );
    let factory = strictly_chess::LineupFactory::new(config, registry);

    let err = game
        .new_game(&factory, None, Some("e4 Ke7"))
        .await
        .unwrap_err();
    assert!(matches!(err, strictly_chess::GameError::SeedMove { ref token } if token == "Ke7"));
}

#[tokio::test(start_paused = true)]
async fn test_castling_gets_extra_grace_before_stall_notice() {
    let white = ScriptedAgent::new("white", &["e1g1"]);
    let mut h = Harness::start(
        config_with_sync(1, 0, 1000, 2000),
        vec![("white-0", white)],
        Some("e4 e5 Nf3 Nc6 Bc4 Bc5"),
    )
    .await;

    let waiting = h
        .next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;
    assert!(matches!(waiting, GameEvent::WaitingBoardSync { ref record, .. } if record.flags().is_castle()));

    // King across, rook not yet.
    h.board.move_piece(sq("e1"), sq("g1"));
    let moved_at = Instant::now();
    h.next(|e| matches!(e, GameEvent::BoardNotSyncChange { .. }))
        .await;
    let waited = moved_at.elapsed();
    assert!(waited >= Duration::from_millis(3000), "notice after {waited:?}");
    assert!(waited < Duration::from_millis(4000), "notice after {waited:?}");

    h.board.move_piece(sq("h1"), sq("f1"));
    h.next(|e| matches!(e, GameEvent::BoardSynced { .. })).await;
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_plain_move_stall_notice_uses_debounce_only() {
    let white = ScriptedAgent::new("white", &["e2e4"]);
    let mut h = Harness::start(config_with_sync(1, 0, 1000, 2000), vec![("white-0", white)], None).await;
    h.next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;

    h.board.move_piece(sq("e2"), sq("e3"));
    let moved_at = Instant::now();
    let notice = h
        .next(|e| matches!(e, GameEvent::BoardNotSyncChange { .. }))
        .await;
    let waited = moved_at.elapsed();
    assert!(waited >= Duration::from_millis(1000), "notice after {waited:?}");
    assert!(waited < Duration::from_millis(2000), "notice after {waited:?}");
    assert!(matches!(notice, GameEvent::BoardNotSyncChange { board, before } if board != before));
    h.task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_board_back_at_pre_move_layout_is_not_reported() {
    let white = ScriptedAgent::new("white", &["e2e4"]);
    let mut h = Harness::start(config_with_sync(1, 0, 1000, 0), vec![("white-0", white)], None).await;
    h.next(|e| matches!(e, GameEvent::WaitingBoardSync { .. }))
        .await;

    // Lifted and put back down.
    h.board.move_piece(sq("e2"), sq("e3"));
    h.board.move_piece(sq("e3"), sq("e2"));

    let quiet = timeout(
        Duration::from_secs(3),
        wait_for(&mut h.events, |e| matches!(e, GameEvent::BoardNotSyncChange { .. })),
    )
    .await;
    assert!(quiet.is_err(), "unexpected {quiet:?}");
    assert_eq!(h.game.pending_state(), PendingState::WaitBoardSync);

    h.board.move_piece(sq("e2"), sq("e4"));
    h.next(|e| matches!(e, GameEvent::BoardSynced { .. })).await;
    h.task.abort();
}

#[tokio::test]
async fn test_reset_during_setup_frees_interrupt_slot() {
    let config = config(0, 0);
    let registry = Arc::new(EngineRegistry::new(config.engines().clone()));
    // Nothing on the board: setup waits for the pieces.
    let board = Arc::new(MemoryBoard::new(Layout::empty()));
    let game = ChessGame::new(ShakmatyRules::new(), board, config.settings().clone());
    let mut events = game.subscribe();
    let factory = LineupFactory::new(config, registry);
    let runner = game.clone();
    let task = tokio::spawn(async move { runner.start(&factory, None, None).await });

    wait_for(&mut events, |e| {
        matches!(
            e,
            GameEvent::WaitingForBoardReady {
                phase: ReadyPhase::Start,
                ..
            }
        )
    })
    .await;
    timeout(common::WAIT, game.reset())
        .await
        .expect("Reset serviced")
        .expect("Reset accepted");

    let outcome = timeout(common::WAIT, task)
        .await
        .expect("Setup ends")
        .expect("Game task not cancelled")
        .expect("Setup succeeds");
    assert_eq!(outcome, PlayOutcome::Abandoned);

    timeout(common::WAIT, game.reset())
        .await
        .expect("Reset serviced")
        .expect("Slot is free again");
}
