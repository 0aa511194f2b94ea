use axum::{routing::get, Router};
use lambda_http::{run, Error};
use std::env::set_var;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use config::{AppConfig, StorageBackend};
use shared::models::clock::SystemTimeSource;
use shared::models::roster::CreatureRoster;
use shared::repositories::match_repository::{DynamoDbMatchRepository, MatchRepository};
use shared::repositories::memory_match_repository::InMemoryMatchRepository;
use shared::services::auth_service::PlayerTokenService;
use shared::services::battle_bridge::BattleBridge;
use shared::services::match_service::MatchService;
use shared::services::showdown_engine::ShowdownProcessEngine;

#[tokio::main]
async fn main() -> Result<(), Error> {
    set_var("AWS_LAMBDA_HTTP_IGNORE_STAGE_IN_PATH", "true");

    let config = AppConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false)
        .without_time()
        .init();

    // Set up services
    let repository: Arc<dyn MatchRepository + Send + Sync> = match config.storage {
        StorageBackend::DynamoDb => {
            let aws_config = aws_config::load_from_env().await;
            let client = aws_sdk_dynamodb::Client::new(&aws_config);
            Arc::new(DynamoDbMatchRepository::new(
                client,
                config.state_table.clone(),
                config.log_table.clone(),
            ))
        }
        StorageBackend::Memory => Arc::new(InMemoryMatchRepository::new()),
    };

    let engine = ShowdownProcessEngine::from_command_line(&config.showdown_command)?;
    let tokens = Arc::new(PlayerTokenService::with_secret(config.token_secret.clone()));
    let match_service = MatchService::new(
        repository,
        BattleBridge::new(Arc::new(engine)),
        Arc::new(CreatureRoster::builtin()),
        Arc::new(SystemTimeSource),
        tokens.clone(),
    );

    let app_state = state::AppState {
        match_service: Arc::new(match_service),
        tokens,
    };

    // ToDo: restrict origins once the web client has a fixed domain
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::matches::routes())
        .layer(cors)
        .with_state(app_state);

    info!(storage = ?config.storage, "Match API ready");
    run(app).await
}
