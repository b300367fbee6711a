use super::{MoveAgent, RandomAgent, UciEngine};
use crate::config::EngineSpec;
use crate::error::{ConfigError, GameError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Creates engines by configured name and caches them by instance id.
pub struct EngineRegistry {
    specs: HashMap<String, EngineSpec>,
    instances: Mutex<HashMap<String, Arc<dyn MoveAgent>>>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("specs", &self.specs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EngineRegistry {
    /// Creates a registry over the configured engine definitions.
    pub fn new(specs: HashMap<String, EngineSpec>) -> Self {
        Self {
            specs,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Installs a ready-made agent under `id`.
    pub async fn register(&self, id: impl Into<String>, agent: Arc<dyn MoveAgent>) {
        self.instances.lock().await.insert(id.into(), agent);
    }

    /// Returns the engine cached under `id`, starting engine `name` (or `id`
    /// when no name is given) on first use.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str, name: Option<&str>) -> Result<Arc<dyn MoveAgent>, GameError> {
        let name = name.unwrap_or(id);
        let mut instances = self.instances.lock().await;
        if let Some(agent) = instances.get(id) {
            return Ok(Arc::clone(agent));
        }

        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| ConfigError::new(format!("Engine {} is unknown", name)))?;

        info!(engine = name, id, "Creating new engine");
        let agent: Arc<dyn MoveAgent> = match spec {
            EngineSpec::Uci {
                path, pick_rank, ..
            } => Arc::new(UciEngine::spawn(name, path, *pick_rank).await?),
            EngineSpec::Random { seed: Some(seed) } => Arc::new(RandomAgent::seeded(name, *seed)),
            EngineSpec::Random { seed: None } => Arc::new(RandomAgent::new(name)),
        };
        instances.insert(id.to_string(), Arc::clone(&agent));
        Ok(agent)
    }

    /// Gets the engine and prepares it for a new game with its configured
    /// options.
    #[instrument(skip(self))]
    pub async fn init_engine(&self, id: &str, name: Option<&str>) -> Result<Arc<dyn MoveAgent>, GameError> {
        let agent = self.get(id, name).await?;
        let options = self
            .specs
            .get(name.unwrap_or(id))
            .map(EngineSpec::init_options)
            .unwrap_or_default();
        agent.new_game(&options).await?;
        debug!(engine = agent.name(), "engine initialized");
        Ok(agent)
    }
}
