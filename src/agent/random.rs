use super::{AgentMove, MoveAgent, SearchOptions};
use crate::error::AgentError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shakmaty::fen::Fen;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Position};
use tracing::{debug, instrument};

/// Plays a uniformly random legal move.
#[derive(Debug)]
pub struct RandomAgent {
    name: String,
    rng: Mutex<StdRng>,
}

impl RandomAgent {
    /// Creates an agent seeded from entropy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a reproducible agent.
    pub fn seeded(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn parse(&self, fen: &str) -> Result<Chess, AgentError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|e| AgentError::new(&self.name, format!("bad FEN '{}': {}", fen, e)))?;
        parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| AgentError::new(&self.name, format!("illegal position '{}': {}", fen, e)))
    }
}

#[async_trait]
impl MoveAgent for RandomAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn position(&self, fen: &str) -> Result<(), AgentError> {
        self.parse(fen).map(|_| ())
    }

    #[instrument(skip(self, options), fields(agent = %self.name))]
    async fn go(&self, options: &SearchOptions, fen: &str) -> Result<AgentMove, AgentError> {
        let position = self.parse(fen)?;
        let mut ranked: Vec<String> = position
            .legal_moves()
            .iter()
            .map(|m| Uci::from_move(m, CastlingMode::Standard).to_string())
            .collect();
        ranked.shuffle(&mut *self.rng.lock());
        ranked.truncate(options.multi_pv.max(1) as usize);

        let bestmove = ranked
            .first()
            .cloned()
            .ok_or_else(|| AgentError::new(&self.name, "no legal moves"))?;
        debug!(%bestmove, "random move");
        Ok(AgentMove {
            bestmove,
            pickmove: None,
            ranked,
        })
    }
}
