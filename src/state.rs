use crate::config::Config;
use crate::services::recommendations::RecommendationService;
use crate::services::session::FeedbackSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub recommendations: Arc<RecommendationService>,
    pub feedback_sessions: Arc<RwLock<HashMap<Uuid, FeedbackSession>>>, // session id -> queue
}

impl AppState {
    pub fn new(config: Config, recommendations: RecommendationService) -> Self {
        Self {
            config: Arc::new(config),
            recommendations: Arc::new(recommendations),
            feedback_sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

pub type SharedState = Arc<AppState>;
