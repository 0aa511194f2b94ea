use crate::models::board::BoardError;
use crate::models::log_entry::GameEndReason;
use crate::models::match_session::MatchPhase;
use crate::models::piece::Color;
use crate::services::errors::chess_service_errors::ChessServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStateError {
    WrongPhase(MatchPhase),
    /// A ban while picks are due, or a pick while bans are due.
    WrongDraftStage,
    NotYourTurn(Color),
    IllegalMove(ChessServiceError),
    /// The creature index is already on the board or banned.
    AlreadyConsumed(usize),
    UnknownIndex(usize),
    InvalidSquare(String),
    InvalidChoice(String),
    ChoiceAlreadySubmitted(Color),
    MissingCreature(String),
    /// Only the engine may end a match for this reason.
    ReservedEndReason(GameEndReason),
    /// A player tried to end the match in their own favor.
    SelfAwardedWin(Color),
    /// The creature mapping refused an entry that passed validation.
    Board(BoardError),
    /// An entry cannot be applied to the current state.
    Corrupt(String),
}

impl MatchStateError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MatchStateError::Board(_) | MatchStateError::Corrupt(_))
    }
}

impl std::fmt::Display for MatchStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStateError::WrongPhase(phase) => {
                write!(f, "Intent not accepted during phase {:?}", phase)
            }
            MatchStateError::WrongDraftStage => write!(f, "Intent does not match the draft stage"),
            MatchStateError::NotYourTurn(color) => write!(f, "It is not {}'s turn", color),
            MatchStateError::IllegalMove(err) => write!(f, "Illegal move: {}", err),
            MatchStateError::AlreadyConsumed(index) => {
                write!(f, "Creature {} was already drafted or banned", index)
            }
            MatchStateError::UnknownIndex(index) => write!(f, "Unknown creature index {}", index),
            MatchStateError::InvalidSquare(square) => write!(f, "Invalid square: {}", square),
            MatchStateError::InvalidChoice(choice) => write!(f, "Invalid battle choice: {}", choice),
            MatchStateError::ChoiceAlreadySubmitted(color) => {
                write!(f, "{} already chose a battle move this turn", color)
            }
            MatchStateError::MissingCreature(square) => {
                write!(f, "No creature found on square {}", square)
            }
            MatchStateError::ReservedEndReason(reason) => {
                write!(f, "A player cannot end the match with reason {:?}", reason)
            }
            MatchStateError::SelfAwardedWin(color) => {
                write!(f, "{} cannot end the match as its own winner", color)
            }
            MatchStateError::Board(err) => write!(f, "Creature mapping error: {}", err),
            MatchStateError::Corrupt(msg) => write!(f, "Corrupt match state: {}", msg),
        }
    }
}

impl std::error::Error for MatchStateError {}

impl From<BoardError> for MatchStateError {
    fn from(err: BoardError) -> Self {
        MatchStateError::Board(err)
    }
}
