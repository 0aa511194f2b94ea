#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRepositoryError {
    Serialization(String),
    DynamoDb(String),
    /// A conditional write lost against a concurrent writer.
    Conflict(String),
}

impl std::fmt::Display for MatchRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            MatchRepositoryError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
            MatchRepositoryError::Conflict(msg) => write!(f, "Write conflict: {}", msg),
        }
    }
}

impl std::error::Error for MatchRepositoryError {}
