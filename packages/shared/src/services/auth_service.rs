use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::piece::Color;
use crate::services::errors::auth_service_errors::AuthServiceError;

#[cfg(test)]
use mockall::automock;

/// Lifetime of a seat token. A match never outlives a day.
const TOKEN_TTL_HOURS: i64 = 24;

/// Claims of a per-match seat token: who plays which color in which room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerClaims {
    pub sub: String,
    pub room: String,
    pub color: Color,
    pub exp: usize,
    pub iat: usize,
}

#[cfg_attr(test, automock)]
pub trait PlayerTokenServiceTrait: Send + Sync {
    fn issue_token(
        &self,
        player_id: &str,
        room_id: &str,
        color: Color,
    ) -> Result<String, AuthServiceError>;
    fn verify_token(&self, token: &str) -> Result<PlayerClaims, AuthServiceError>;
}

pub struct PlayerTokenService {
    jwt_secret: String,
}

impl PlayerTokenService {
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        PlayerTokenService {
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Verifies the token and checks it belongs to `room_id`.
    pub fn verify_for_room(
        &self,
        token: &str,
        room_id: &str,
    ) -> Result<PlayerClaims, AuthServiceError> {
        let claims = self.verify_token(token)?;
        if claims.room != room_id {
            return Err(AuthServiceError::WrongRoom(room_id.to_string()));
        }
        Ok(claims)
    }
}

impl PlayerTokenServiceTrait for PlayerTokenService {
    fn issue_token(
        &self,
        player_id: &str,
        room_id: &str,
        color: Color,
    ) -> Result<String, AuthServiceError> {
        let now = Utc::now();
        let claims = PlayerClaims {
            sub: player_id.to_string(),
            room: room_id.to_string(),
            color,
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(|e| AuthServiceError::JwtError(format!("{:#?}", e)))
    }

    fn verify_token(&self, token: &str) -> Result<PlayerClaims, AuthServiceError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_ref());
        let validation = Validation::default();

        match decode::<PlayerClaims>(token, &decoding_key, &validation) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(AuthServiceError::ExpiredToken)
                }
                _ => Err(AuthServiceError::InvalidToken),
            },
        }
    }
}
