//! Players built from the game configuration.

use super::{AutomatedPlayer, HumanPlayer, Player, PlayerFactory, PlayerInfo};
use crate::agent::{EngineRegistry, SearchOptions};
use crate::config::{GameConfig, PlayerKind};
use crate::error::GameError;
use crate::orchestrator::GameHandle;
use crate::types::Color;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Creates the configured human or engine player for each color.
///
/// Engine instances are looked up in the registry as `"<color>-<slot>"`,
/// so each side gets its own processes.
#[derive(Debug, Clone)]
pub struct LineupFactory {
    config: GameConfig,
    registry: Arc<EngineRegistry>,
}

impl LineupFactory {
    /// Creates a factory over `config`, starting engines through `registry`.
    pub fn new(config: GameConfig, registry: Arc<EngineRegistry>) -> Self {
        Self { config, registry }
    }

    /// Registry instance id of ensemble slot `slot` for `color`.
    pub fn engine_id(color: Color, slot: usize) -> String {
        format!("{}-{}", color, slot)
    }
}

#[async_trait]
impl PlayerFactory for LineupFactory {
    #[instrument(skip(self, game))]
    async fn create(&self, color: Color, game: GameHandle) -> Result<Arc<dyn Player>, GameError> {
        let spec = self.config.player(color);
        let info = PlayerInfo::from_spec(spec);

        let player: Arc<dyn Player> = match spec.kind() {
            PlayerKind::Human => Arc::new(HumanPlayer::new(color, info, game)?),
            PlayerKind::Engine => {
                let mut engines = Vec::with_capacity(spec.engines().len());
                for (slot, name) in spec.engines().iter().enumerate() {
                    let id = Self::engine_id(color, slot);
                    engines.push(self.registry.init_engine(&id, Some(name)).await?);
                }
                let search = SearchOptions {
                    depth: *spec.depth(),
                    multi_pv: *spec.multi_pv(),
                };
                Arc::new(AutomatedPlayer::new(
                    color,
                    info,
                    engines,
                    search,
                    spec.min_think(),
                    *self.config.settings().shuffle_engines(),
                    game,
                )?)
            }
        };
        info!(%color, player = %player.name(), "player created");
        Ok(player)
    }
}
