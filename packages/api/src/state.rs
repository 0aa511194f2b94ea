use std::sync::Arc;

use shared::services::auth_service::PlayerTokenService;
use shared::services::match_service::MatchService;

#[derive(Clone)]
pub struct AppState {
    pub match_service: Arc<MatchService>,
    pub tokens: Arc<PlayerTokenService>,
}
