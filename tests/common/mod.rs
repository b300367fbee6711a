//! Shared harness for game integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use strictly_chess::{
    AgentError, AgentMove, ChessGame, EngineRegistry, GameConfig, GameError, GameEvent, Layout,
    LineupFactory, MemoryBoard, MoveAgent, PendingState, PlayOutcome, RulesEngine, SearchOptions,
    ShakmatyRules, replay_moves,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Agent answering from a script; once the script runs out it never answers.
pub struct ScriptedAgent {
    name: String,
    moves: Mutex<VecDeque<String>>,
    asked: AtomicUsize,
    positions: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(name: &str, moves: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            moves: Mutex::new(moves.iter().map(|m| m.to_string()).collect()),
            asked: AtomicUsize::new(0),
            positions: AtomicUsize::new(0),
        })
    }

    /// Appends a move to the script.
    pub fn push(&self, mv: &str) {
        self.moves.lock().push_back(mv.to_string());
    }

    /// Number of answered `go` requests.
    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }

    /// Number of `position` requests.
    pub fn positions(&self) -> usize {
        self.positions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MoveAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn position(&self, _fen: &str) -> Result<(), AgentError> {
        self.positions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn go(&self, _options: &SearchOptions, _fen: &str) -> Result<AgentMove, AgentError> {
        let next = self.moves.lock().pop_front();
        match next {
            Some(bestmove) => {
                self.asked.fetch_add(1, Ordering::SeqCst);
                Ok(AgentMove {
                    bestmove,
                    ..AgentMove::default()
                })
            }
            None => std::future::pending().await,
        }
    }
}

/// TOML for one side: a human, or an engine player over `engines` slots.
fn side(color: &str, engines: usize, min_think_ms: u64) -> String {
    if engines == 0 {
        return format!("[{color}]\nkind = \"human\"\nfirst_name = \"{color}\"\n");
    }
    let names: Vec<String> = (0..engines).map(|i| format!("\"scripted-{i}\"")).collect();
    format!(
        "[{color}]\nkind = \"engine\"\nfirst_name = \"{color}\"\nengines = [{}]\nmin_think_ms = {min_think_ms}\n",
        names.join(", ")
    )
}

/// Config with fast debounce and no ensemble shuffling.
pub fn config(white_engines: usize, black_engines: usize) -> GameConfig {
    config_with_think(white_engines, black_engines, 1)
}

/// Like [`config`] with an explicit minimum think time for engine players.
pub fn config_with_think(white_engines: usize, black_engines: usize, min_think_ms: u64) -> GameConfig {
    timed_config(white_engines, black_engines, min_think_ms, 50, 50)
}

/// Like [`config`] with explicit sync debounce and castling grace.
pub fn config_with_sync(
    white_engines: usize,
    black_engines: usize,
    debounce_ms: u64,
    castle_grace_ms: u64,
) -> GameConfig {
    timed_config(white_engines, black_engines, 1, debounce_ms, castle_grace_ms)
}

fn timed_config(
    white_engines: usize,
    black_engines: usize,
    min_think_ms: u64,
    debounce_ms: u64,
    castle_grace_ms: u64,
) -> GameConfig {
    let toml = format!(
        "[settings]\nsync_debounce_ms = {debounce_ms}\ncastle_grace_ms = {castle_grace_ms}\nshuffle_engines = false\n\n{}\n{}",
        side("white", white_engines, min_think_ms),
        side("black", black_engines, min_think_ms),
    );
    GameConfig::from_toml(&toml).expect("Test config should parse")
}

/// Layout reached by replaying `moves` from the start position.
pub fn layout_after(moves: &str) -> Layout {
    let mut rules = ShakmatyRules::new();
    replay_moves(&mut rules, moves).expect("Seed moves should replay");
    rules.layout()
}

/// A running game plus the board and event stream driving it.
pub struct Harness {
    pub game: ChessGame,
    pub board: Arc<MemoryBoard>,
    pub events: broadcast::Receiver<GameEvent>,
    pub task: JoinHandle<Result<PlayOutcome, GameError>>,
}

impl Harness {
    /// Starts a game whose engine slots are served by `agents`, keyed
    /// `"<color>-<slot>"`, and waits until the players exist.
    pub async fn start(
        config: GameConfig,
        agents: Vec<(&str, Arc<ScriptedAgent>)>,
        moves: Option<&str>,
    ) -> Self {
        let registry = Arc::new(EngineRegistry::new(config.engines().clone()));
        for (id, agent) in agents {
            registry.register(id, agent).await;
        }

        let board = Arc::new(MemoryBoard::new(layout_after(moves.unwrap_or(""))));
        let game = ChessGame::new(ShakmatyRules::new(), board.clone(), config.settings().clone());
        let mut events = game.subscribe();

        let factory = LineupFactory::new(config, registry);
        let runner = game.clone();
        let moves = moves.map(str::to_string);
        let task =
            tokio::spawn(async move { runner.start(&factory, None, moves.as_deref()).await });

        wait_for(&mut events, |e| matches!(e, GameEvent::NewGameReady { .. })).await;
        Self {
            game,
            board,
            events,
            task,
        }
    }

    /// Waits for the next event matching `matches`.
    pub async fn next(&mut self, matches: impl FnMut(&GameEvent) -> bool) -> GameEvent {
        wait_for(&mut self.events, matches).await
    }

    /// Waits until the orchestrator is blocked on `state`.
    pub async fn pending(&self, state: PendingState) {
        let game = self.game.clone();
        timeout(WAIT, async move {
            while game.pending_state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for pending state");
    }

    /// Places every layout the game waits for, like a diligent operator.
    pub fn spawn_operator(&self) -> JoinHandle<()> {
        let mut events = self.game.subscribe();
        let board = Arc::clone(&self.board);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GameEvent::WaitingBoardSync { want, .. })
                    | Ok(GameEvent::WaitingForBoardReady { want, .. }) => board.place_layout(want),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Waits for the next event on `events` matching `matches`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<GameEvent>,
    mut matches: impl FnMut(&GameEvent) -> bool,
) -> GameEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("Event bus closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Square by name.
pub fn sq(name: &str) -> strictly_chess::Square {
    name.parse().expect("Valid square name")
}
