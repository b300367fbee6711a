//! Strictly Chess - Unified CLI
//!
//! Plays configured games on the in-memory board and replays move lists.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use std::sync::Arc;
use strictly_chess::{
    ChessGame, EngineRegistry, GameConfig, GameEvent, LineupFactory, MemoryBoard, MoveRequest,
    PhysicalBoard, PlayOutcome, RulesEngine, ShakmatyRules, replay_moves,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Play { config, fen, moves } => run_play(config, fen, moves).await,
        Command::Replay { fen, moves } => run_replay(fen, moves),
    }
}

/// Replays `moves` and prints the position reached.
#[instrument]
fn run_replay(fen: Option<String>, moves: String) -> Result<()> {
    let mut rules = match fen {
        Some(fen) => ShakmatyRules::from_fen(&fen)?,
        None => ShakmatyRules::new(),
    };
    let applied = replay_moves(&mut rules, &moves)?;
    info!(applied, "Replay finished");

    println!("{}", rules.fen());
    println!("{}", rules.ascii());
    Ok(())
}

/// Plays one configured game on the in-memory board.
#[instrument]
async fn run_play(path: PathBuf, fen: Option<String>, moves: Option<String>) -> Result<()> {
    let config = GameConfig::from_file(&path)?;
    let start_fen = fen.or_else(|| config.settings().start_fen().clone());
    let moves = moves.or_else(|| config.settings().moves().clone());

    let registry = Arc::new(EngineRegistry::new(config.engines().clone()));
    let board = Arc::new(MemoryBoard::start());
    let game = ChessGame::new(ShakmatyRules::new(), board.clone(), config.settings().clone());

    let operator = tokio::spawn(operate(game.subscribe(), Arc::clone(&board)));
    let console = tokio::spawn(read_console(game.clone(), Arc::clone(&board)));

    info!("Starting game");
    let factory = LineupFactory::new(config, registry);
    let outcome = game
        .start(&factory, start_fen.as_deref(), moves.as_deref())
        .await;

    operator.abort();
    console.abort();

    match outcome? {
        PlayOutcome::GameOver(result) => println!("Game over: {}", result),
        PlayOutcome::Abandoned => println!("Game abandoned"),
    }
    Ok(())
}

/// Stands in for the person handling the pieces: every layout the game
/// waits for is placed on the board.
async fn operate(mut events: broadcast::Receiver<GameEvent>, board: Arc<MemoryBoard>) {
    loop {
        match events.recv().await {
            Ok(GameEvent::WaitingBoardSync { record, want, .. }) => {
                info!(mv = %record.uci(), "Operator moves the pieces");
                board.place_layout(want);
            }
            Ok(GameEvent::WaitingForBoardReady { phase, want, .. }) => {
                info!(?phase, "Operator sets up the board");
                board.place_layout(want);
            }
            Ok(GameEvent::PlayerMoved {
                player,
                record,
                interrupted: false,
                ..
            }) => {
                let notation = record
                    .san()
                    .map(str::to_string)
                    .unwrap_or_else(|| record.uci());
                println!("{}: {}", player, notation);
                println!("{}", board.layout().ascii().join("\n"));
            }
            Ok(GameEvent::IllegalMove { player, input, .. }) => {
                println!("{}: illegal move {:?}, try again", player, input);
            }
            Ok(GameEvent::TakeBack { moves }) => {
                println!("Taking back {} move(s)", moves.len());
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Operator fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Reads human moves and commands from stdin.
async fn read_console(game: ChessGame, board: Arc<MemoryBoard>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "" => {}
            "takeback" => {
                if let Err(e) = game.take_back().await {
                    warn!(error = %e, "Take-back failed");
                }
            }
            "reset" | "quit" => {
                if let Err(e) = game.reset().await {
                    warn!(error = %e, "Reset failed");
                }
            }
            "board" => println!("{}", board.layout().ascii().join("\n")),
            text => match text.parse::<MoveRequest>() {
                Ok(request) => {
                    if board.move_piece(request.from, request.to).is_none() {
                        println!("No piece on {}", request.from);
                    }
                }
                Err(e) => println!("{}: {}", e, text),
            },
        }
    }
}
