use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::llm::DEFAULT_MAX_TOKENS;
use crate::store::DealStore;
use crate::store::seed;
use crate::workflow::{Controller, Services};

/// Configurable scouting parameters (admins can modify at runtime).
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    /// Sectors offered at the first stage.
    pub sectors: Vec<String>,
    pub num_startups: u32,
    pub max_parallel_assessments: u32,
    pub curated_limit: u32,
    pub max_tokens: u32,
    pub discovery_max_tokens: u32,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            sectors: seed::SECTORS.iter().map(|s| s.to_string()).collect(),
            num_startups: 5,
            max_parallel_assessments: 4,
            curated_limit: 10,
            max_tokens: DEFAULT_MAX_TOKENS,
            discovery_max_tokens: 4000,
        }
    }
}

/// One wizard per Discord user. Each controller is locked for the whole of a transition.
pub struct SessionRegistry {
    services: Services,
    sessions: Mutex<HashMap<u64, Arc<Mutex<Controller>>>>,
}

impl SessionRegistry {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user_id: u64) -> Arc<Mutex<Controller>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Controller::new(&self.services))))
            .clone()
    }

    /// Forget a user's wizard. Returns whether one existed.
    pub async fn remove(&self, user_id: u64) -> bool {
        self.sessions.lock().await.remove(&user_id).is_some()
    }
}

pub struct AppState {
    pub store: Arc<DealStore>,
    pub sessions: SessionRegistry,
    pub admin_ids: HashSet<u64>,
    pub scout_config: Arc<RwLock<ScoutConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;
