use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::ApiError,
    middleware::auth::{viewer_for, RoomPlayer},
    state::AppState,
};
use shared::models::intent::requests::{
    BanRequest, BattleMoveRequest, ChessMoveRequest, DraftPickRequest, EndMatchRequest,
    StartMatchRequest,
};
use shared::models::intent::responses::{
    IntentOutcome, ResyncResponse, StartMatchResponse, ViewerOutcome,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/matches", post(start_match))
        .route("/matches/{room_id}/chess-move", post(chess_move))
        .route("/matches/{room_id}/battle-move", post(battle_move))
        .route("/matches/{room_id}/ban", post(ban))
        .route("/matches/{room_id}/draft-pick", post(draft_pick))
        .route("/matches/{room_id}/end", post(end_match))
        .route("/matches/{room_id}/rematch", post(rematch))
        .route("/matches/{room_id}/timeout", post(check_timeout))
        .route("/matches/{room_id}/resync", get(resync))
}

#[derive(Debug, Deserialize)]
pub struct ResyncQuery {
    #[serde(default)]
    pub cursor: usize,
}

/// Players only get their own side of an outcome, picked by the color the
/// service resolved for them while holding the room lock.
fn own_projection(outcome: IntentOutcome) -> Result<Json<ViewerOutcome>, ApiError> {
    let color = outcome.actor.ok_or(ApiError::Unauthorized)?;
    Ok(Json(outcome.for_color(color)))
}

async fn start_match(
    State(state): State<AppState>,
    Json(payload): Json<StartMatchRequest>,
) -> Result<(StatusCode, Json<StartMatchResponse>), ApiError> {
    let response = state.match_service.start_match(payload).await?;
    info!(room_id = %response.room_id, match_id = %response.match_id, "Match created");
    Ok((StatusCode::CREATED, Json(response)))
}

async fn chess_move(
    State(state): State<AppState>,
    player: RoomPlayer,
    Json(payload): Json<ChessMoveRequest>,
) -> Result<Json<ViewerOutcome>, ApiError> {
    let outcome = state
        .match_service
        .submit_chess_move(&player.room_id, &player.player_id, &payload.san)
        .await?;
    own_projection(outcome)
}

async fn battle_move(
    State(state): State<AppState>,
    player: RoomPlayer,
    Json(payload): Json<BattleMoveRequest>,
) -> Result<Json<ViewerOutcome>, ApiError> {
    let outcome = state
        .match_service
        .submit_battle_move(&player.room_id, &player.player_id, &payload.choice)
        .await?;
    own_projection(outcome)
}

async fn ban(
    State(state): State<AppState>,
    player: RoomPlayer,
    Json(payload): Json<BanRequest>,
) -> Result<Json<ViewerOutcome>, ApiError> {
    let outcome = state
        .match_service
        .submit_ban(&player.room_id, &player.player_id, payload.index)
        .await?;
    own_projection(outcome)
}

async fn draft_pick(
    State(state): State<AppState>,
    player: RoomPlayer,
    Json(payload): Json<DraftPickRequest>,
) -> Result<Json<ViewerOutcome>, ApiError> {
    let outcome = state
        .match_service
        .submit_draft_pick(
            &player.room_id,
            &player.player_id,
            payload.index,
            &payload.square,
        )
        .await?;
    own_projection(outcome)
}

async fn end_match(
    State(state): State<AppState>,
    player: RoomPlayer,
    Json(payload): Json<EndMatchRequest>,
) -> Result<Json<ViewerOutcome>, ApiError> {
    let outcome = state
        .match_service
        .end_match(
            &player.room_id,
            &player.player_id,
            payload.winner,
            payload.reason,
        )
        .await?;
    own_projection(outcome)
}

async fn rematch(
    State(state): State<AppState>,
    player: RoomPlayer,
) -> Result<(StatusCode, Json<StartMatchResponse>), ApiError> {
    let response = state
        .match_service
        .rematch(&player.room_id, &player.player_id)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Lets any viewer push an overdue clock to its consequence.
async fn check_timeout(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ViewerOutcome>, ApiError> {
    let viewer = viewer_for(&state, &headers, &room_id).await?;
    let outcome = state.match_service.check_and_apply_timeout(&room_id).await?;
    Ok(Json(outcome.for_color(viewer.projection())))
}

async fn resync(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<ResyncQuery>,
    headers: HeaderMap,
) -> Result<Json<ResyncResponse>, ApiError> {
    let viewer = viewer_for(&state, &headers, &room_id).await?;
    let response = state
        .match_service
        .resync(&room_id, viewer, query.cursor)
        .await?;
    Ok(Json(response))
}
