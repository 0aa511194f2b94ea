#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChessServiceError {
    UnmatchedSan(String),
    InvalidPosition(String),
}

impl std::fmt::Display for ChessServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChessServiceError::UnmatchedSan(san) => write!(f, "No legal move matches {}", san),
            ChessServiceError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
        }
    }
}

impl std::error::Error for ChessServiceError {}
