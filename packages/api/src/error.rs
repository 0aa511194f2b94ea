use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use shared::models::intent::responses::ErrorResponse;
use shared::services::errors::auth_service_errors::AuthServiceError;
use shared::services::errors::match_service_errors::{ErrorKind, MatchServiceError};
use shared::services::errors::match_state_errors::MatchStateError;

/// Seconds a client should wait before retrying a busy room.
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug)]
pub enum ApiError {
    Match(MatchServiceError),
    AuthService(AuthServiceError),
    Unauthorized,
}

impl From<MatchServiceError> for ApiError {
    fn from(error: MatchServiceError) -> Self {
        ApiError::Match(error)
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(error: AuthServiceError) -> Self {
        ApiError::AuthService(error)
    }
}

fn match_status(error: &MatchServiceError) -> StatusCode {
    match error.kind() {
        ErrorKind::Protocol => match error {
            MatchServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            MatchServiceError::NotAPlayer(_) => StatusCode::FORBIDDEN,
            MatchServiceError::InvalidRequest(_)
            | MatchServiceError::State(
                MatchStateError::IllegalMove(_)
                | MatchStateError::InvalidChoice(_)
                | MatchStateError::InvalidSquare(_)
                | MatchStateError::UnknownIndex(_)
                | MatchStateError::ReservedEndReason(_)
                | MatchStateError::SelfAwardedWin(_),
            ) => StatusCode::BAD_REQUEST,
            _ => StatusCode::CONFLICT,
        },
        ErrorKind::Retry => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal | ErrorKind::Simulation => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Match(e) => match_status(e),
            ApiError::AuthService(
                AuthServiceError::InvalidToken | AuthServiceError::ExpiredToken,
            ) => StatusCode::UNAUTHORIZED,
            ApiError::AuthService(AuthServiceError::WrongRoom(_)) => StatusCode::FORBIDDEN,
            ApiError::AuthService(AuthServiceError::JwtError(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Match(e) => e.to_string(),
            ApiError::AuthService(e) => e.to_string(),
            ApiError::Unauthorized => "Missing or malformed bearer token".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(status = %status, error = %self.message(), "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.message(),
        });
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response();
        }
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::match_session::MatchPhase;
    use shared::models::piece::Color;
    use shared::repositories::errors::match_repository_errors::MatchRepositoryError;
    use shared::services::errors::battle_errors::BattleError;

    #[test]
    fn test_match_error_statuses() {
        let cases = [
            (MatchServiceError::NotFound("r".to_string()), StatusCode::NOT_FOUND),
            (MatchServiceError::NotAPlayer("p".to_string()), StatusCode::FORBIDDEN),
            (
                MatchServiceError::State(MatchStateError::InvalidChoice("x".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                MatchServiceError::State(MatchStateError::NotYourTurn(Color::Black)),
                StatusCode::CONFLICT,
            ),
            (
                MatchServiceError::State(MatchStateError::SelfAwardedWin(Color::Black)),
                StatusCode::BAD_REQUEST,
            ),
            (
                MatchServiceError::Repository(MatchRepositoryError::Conflict("r".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                MatchServiceError::State(MatchStateError::WrongPhase(MatchPhase::Ended)),
                StatusCode::CONFLICT,
            ),
            (
                MatchServiceError::LockContended("r".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                MatchServiceError::Repository(MatchRepositoryError::DynamoDb("x".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                MatchServiceError::Battle(BattleError::Incomplete),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_busy_room_sets_retry_after() {
        let response =
            ApiError::from(MatchServiceError::LockContended("r".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn test_token_errors_are_unauthorized() {
        assert_eq!(
            ApiError::from(AuthServiceError::ExpiredToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthServiceError::WrongRoom("r".to_string())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
