use crate::models::piece::Color;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::services::errors::auth_service_errors::AuthServiceError;
use crate::services::errors::battle_errors::BattleError;
use crate::services::errors::match_state_errors::MatchStateError;

/// How a caller should react to a failed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected without any state change; resubmit or resync.
    Protocol,
    /// Transient; the same request may succeed later.
    Retry,
    /// The stored match is inconsistent with the request stream.
    Fatal,
    /// The battle engine did not produce a usable result.
    Simulation,
}

#[derive(Debug)]
pub enum MatchServiceError {
    State(MatchStateError),
    Battle(BattleError),
    Repository(MatchRepositoryError),
    Token(AuthServiceError),
    LockContended(String),
    NotFound(String),
    NotAPlayer(String),
    /// The battle engine refused this color's battle choice.
    ChoiceRejected(Color),
    MatchInProgress(String),
    InvalidRequest(String),
}

impl MatchServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchServiceError::State(err) if err.is_fatal() => ErrorKind::Fatal,
            MatchServiceError::State(_) => ErrorKind::Protocol,
            MatchServiceError::Battle(_) => ErrorKind::Simulation,
            MatchServiceError::Repository(MatchRepositoryError::Serialization(_)) => {
                ErrorKind::Fatal
            }
            MatchServiceError::Repository(_) => ErrorKind::Retry,
            MatchServiceError::Token(_) => ErrorKind::Fatal,
            MatchServiceError::LockContended(_) => ErrorKind::Retry,
            MatchServiceError::NotFound(_)
            | MatchServiceError::NotAPlayer(_)
            | MatchServiceError::ChoiceRejected(_)
            | MatchServiceError::MatchInProgress(_)
            | MatchServiceError::InvalidRequest(_) => ErrorKind::Protocol,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

impl std::fmt::Display for MatchServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchServiceError::State(err) => write!(f, "{}", err),
            MatchServiceError::Battle(err) => write!(f, "Battle engine error: {}", err),
            MatchServiceError::Repository(err) => write!(f, "Repository error: {}", err),
            MatchServiceError::Token(err) => write!(f, "Token error: {}", err),
            MatchServiceError::LockContended(room) => {
                write!(f, "Room {} is busy, try again", room)
            }
            MatchServiceError::NotFound(room) => write!(f, "No match in room {}", room),
            MatchServiceError::NotAPlayer(player) => {
                write!(f, "{} is not playing in this match", player)
            }
            MatchServiceError::ChoiceRejected(color) => {
                write!(f, "Battle engine rejected {}'s choice", color)
            }
            MatchServiceError::MatchInProgress(room) => {
                write!(f, "Room {} already has a match in progress", room)
            }
            MatchServiceError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for MatchServiceError {}

impl From<MatchStateError> for MatchServiceError {
    fn from(err: MatchStateError) -> Self {
        MatchServiceError::State(err)
    }
}

impl From<BattleError> for MatchServiceError {
    fn from(err: BattleError) -> Self {
        MatchServiceError::Battle(err)
    }
}

impl From<MatchRepositoryError> for MatchServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        MatchServiceError::Repository(err)
    }
}

impl From<AuthServiceError> for MatchServiceError {
    fn from(err: AuthServiceError) -> Self {
        MatchServiceError::Token(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::board::BoardError;
    use crate::models::match_session::MatchPhase;
    use rstest::rstest;

    #[rstest]
    #[case(MatchServiceError::State(MatchStateError::WrongPhase(MatchPhase::Ended)), ErrorKind::Protocol)]
    #[case(MatchServiceError::State(MatchStateError::AlreadyConsumed(3)), ErrorKind::Protocol)]
    #[case(MatchServiceError::State(MatchStateError::Board(BoardError::IndexConsumed(3))), ErrorKind::Fatal)]
    #[case(MatchServiceError::Battle(BattleError::Incomplete), ErrorKind::Simulation)]
    #[case(MatchServiceError::LockContended("r".to_string()), ErrorKind::Retry)]
    #[case(MatchServiceError::Repository(MatchRepositoryError::DynamoDb("x".to_string())), ErrorKind::Retry)]
    #[case(MatchServiceError::Repository(MatchRepositoryError::Serialization("x".to_string())), ErrorKind::Fatal)]
    #[case(MatchServiceError::ChoiceRejected(Color::White), ErrorKind::Protocol)]
    fn test_error_kinds(#[case] err: MatchServiceError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }
}
