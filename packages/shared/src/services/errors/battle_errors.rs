#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleError {
    Spawn(String),
    Io(String),
    Timeout(u64),
    /// The engine stopped before echoing the replay sentinel.
    Incomplete,
    /// A forfeit was played but the engine declared no winner.
    NoWinner,
}

impl std::fmt::Display for BattleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BattleError::Spawn(msg) => write!(f, "Failed to start battle engine: {}", msg),
            BattleError::Io(msg) => write!(f, "Battle engine I/O error: {}", msg),
            BattleError::Timeout(ms) => write!(f, "Battle engine did not finish within {}ms", ms),
            BattleError::Incomplete => write!(f, "Battle engine output ended early"),
            BattleError::NoWinner => write!(f, "Battle engine declared no winner"),
        }
    }
}

impl std::error::Error for BattleError {}
