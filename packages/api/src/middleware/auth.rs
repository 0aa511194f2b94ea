use axum::{
    extract::{FromRequestParts, Path},
    http::{header, request::Parts, HeaderMap},
};

use crate::{error::ApiError, state::AppState};
use shared::services::auth_service::PlayerClaims;
use shared::services::resync::Viewer;

/// A player authenticated for the room named in the request path.
#[derive(Debug, Clone)]
pub struct RoomPlayer {
    pub player_id: String,
    pub room_id: String,
}

impl From<PlayerClaims> for RoomPlayer {
    fn from(claims: PlayerClaims) -> Self {
        RoomPlayer {
            player_id: claims.sub,
            room_id: claims.room,
        }
    }
}

/// The token from an `Authorization: Bearer` header, if one was sent.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
    value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or(ApiError::Unauthorized)
}

/// Players read their own projection; anyone without a token is a
/// spectator. The color comes from the stored match since a rematch swaps it.
pub async fn viewer_for(
    state: &AppState,
    headers: &HeaderMap,
    room_id: &str,
) -> Result<Viewer, ApiError> {
    match bearer_token(headers)? {
        Some(token) => {
            let claims = state.tokens.verify_for_room(token, room_id)?;
            Ok(state.match_service.viewer_of(room_id, &claims.sub).await?)
        }
        None => Ok(Viewer::Spectator),
    }
}

impl FromRequestParts<AppState> for RoomPlayer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(room_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Unauthorized)?;
        let token = bearer_token(&parts.headers)?.ok_or(ApiError::Unauthorized)?;

        let claims = state.tokens.verify_for_room(token, &room_id)?;
        Ok(RoomPlayer::from(claims))
    }
}
