//! Strictly Chess - turn orchestration for sensor-board chess
//!
//! This library keeps three views of a chess game in agreement: the logical
//! position held by a rules engine, the piece layout sensed by a physical
//! board, and each player's notion of whose turn it is.
//!
//! # Architecture
//!
//! - **Orchestrator**: [`ChessGame`] runs the turn loop, synchronizes the
//!   board after every move and services take-back and reset interrupts
//! - **Players**: [`HumanPlayer`] waits on board input, [`AutomatedPlayer`]
//!   rotates over an ensemble of [`MoveAgent`]s
//! - **Rules**: [`RulesEngine`] contract with a shakmaty implementation
//! - **Board**: [`PhysicalBoard`] contract with an in-memory [`MemoryBoard`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_chess::{
//!     ChessGame, EngineRegistry, GameConfig, LineupFactory, MemoryBoard, ShakmatyRules,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GameConfig::from_file("chess.toml")?;
//! let registry = Arc::new(EngineRegistry::new(config.engines().clone()));
//! let game = ChessGame::new(
//!     ShakmatyRules::new(),
//!     Arc::new(MemoryBoard::start()),
//!     config.settings().clone(),
//! );
//! let factory = LineupFactory::new(config, registry);
//! let outcome = game.start(&factory, None, None).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod agent;
mod board;
mod config;
mod error;
mod events;
mod interrupt;
mod layout;
mod orchestrator;
mod players;
mod rules;
mod types;

// Crate-level exports - Move-generation agents
pub use agent::{
    AgentMove, EngineRegistry, MoveAgent, RandomAgent, SearchOptions, UciEngine, parse_bestmove,
    parse_info_pv,
};

// Crate-level exports - Physical board
pub use board::{BoardEvent, Commit, MemoryBoard, PhysicalBoard};

// Crate-level exports - Configuration
pub use config::{EngineSpec, GameConfig, GameSettings, PlayerKind, PlayerSpec};

// Crate-level exports - Errors
pub use error::{AgentError, ConfigError, GameError};

// Crate-level exports - Events
pub use events::{EventBus, GameEvent, ReadyPhase};

// Crate-level exports - Interrupts
pub use interrupt::{InterruptSlot, Observed};

// Crate-level exports - Layouts
pub use layout::{
    EMPTY, Layout, LayoutError, START_FEN, START_LAYOUT, is_black, is_empty, is_white, visual_diff,
};

// Crate-level exports - Orchestrator
pub use orchestrator::{ChessGame, GameHandle, PlayOutcome, ReadyOutcome, SyncOutcome, in_agreement};

// Crate-level exports - Players
pub use players::{
    AutomatedPlayer, HumanPlayer, LineupFactory, Player, PlayerCore, PlayerFactory, PlayerInfo,
    TurnGuard, TurnOutcome,
};

// Crate-level exports - Rules
pub use rules::{RulesEngine, RulesError, ShakmatyRules, replay_moves};

// Crate-level exports - Domain types
pub use types::{
    Color, GameResult, InterruptKind, MoveFlags, MoveInput, MoveRecord, MoveRequest,
    PendingState, PieceMove, Promotion, Square,
};
