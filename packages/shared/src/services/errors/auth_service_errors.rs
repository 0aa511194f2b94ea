use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthServiceError {
    JwtError(String),
    InvalidToken,
    ExpiredToken,
    /// The token is valid but was issued for another room.
    WrongRoom(String),
}

impl fmt::Display for AuthServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthServiceError::JwtError(msg) => write!(f, "JWT error: {}", msg),
            AuthServiceError::InvalidToken => write!(f, "Invalid JWT token"),
            AuthServiceError::ExpiredToken => write!(f, "JWT token has expired"),
            AuthServiceError::WrongRoom(room) => {
                write!(f, "Token was not issued for room {}", room)
            }
        }
    }
}

impl std::error::Error for AuthServiceError {}
