use chess::Square;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// White moves on even counts, black on odd ones.
    pub fn from_parity(count: usize) -> Color {
        if count % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Color::White => "w",
            Color::Black => "b",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Color::White => "White",
            Color::Black => "Black",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<chess::Color> for Color {
    fn from(color: chess::Color) -> Self {
        match color {
            chess::Color::White => Color::White,
            chess::Color::Black => Color::Black,
        }
    }
}

impl From<Color> for chess::Color {
    fn from(color: Color) -> Self {
        match color {
            Color::White => chess::Color::White,
            Color::Black => chess::Color::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    pub fn symbol(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }
}

impl From<chess::Piece> for PieceKind {
    fn from(piece: chess::Piece) -> Self {
        match piece {
            chess::Piece::Pawn => PieceKind::Pawn,
            chess::Piece::Knight => PieceKind::Knight,
            chess::Piece::Bishop => PieceKind::Bishop,
            chess::Piece::Rook => PieceKind::Rook,
            chess::Piece::Queen => PieceKind::Queen,
            chess::Piece::King => PieceKind::King,
        }
    }
}

impl From<PieceKind> for chess::Piece {
    fn from(kind: PieceKind) -> Self {
        match kind {
            PieceKind::Pawn => chess::Piece::Pawn,
            PieceKind::Knight => chess::Piece::Knight,
            PieceKind::Bishop => chess::Piece::Bishop,
            PieceKind::Rook => chess::Piece::Rook,
            PieceKind::Queen => chess::Piece::Queen,
            PieceKind::King => chess::Piece::King,
        }
    }
}

/// A creature build as handed to the battle engine: the species for display
/// and the packed single-member team the simulator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureSet {
    pub species: String,
    pub packed: String,
}

/// A chess piece together with the creature bound to it. `square` is `None`
/// once the piece has been taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreaturePiece {
    pub kind: PieceKind,
    pub square: Option<Square>,
    pub color: Color,
    pub creature_index: usize,
    pub creature: CreatureSet,
}

/// Off-board record of a taken piece, kept for the "taken pieces" display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPiece {
    pub index: usize,
    pub kind: PieceKind,
    pub color: Color,
}

pub fn parse_square(square: &str) -> Option<Square> {
    Square::from_str(square).ok()
}

/// The sixteen starting squares of a color with the piece that stands there
/// in the standard start position.
pub fn starting_squares(color: Color) -> Vec<(Square, PieceKind)> {
    const BACK_RANK: [PieceKind; 8] = [
        PieceKind::Rook,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Queen,
        PieceKind::King,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Rook,
    ];

    let (back, pawns) = match color {
        Color::White => (chess::Rank::First, chess::Rank::Second),
        Color::Black => (chess::Rank::Eighth, chess::Rank::Seventh),
    };

    let mut squares = Vec::with_capacity(16);
    for (file_index, kind) in BACK_RANK.iter().enumerate() {
        squares.push((
            Square::make_square(back, chess::File::from_index(file_index)),
            *kind,
        ));
    }
    for file_index in 0..8 {
        squares.push((
            Square::make_square(pawns, chess::File::from_index(file_index)),
            PieceKind::Pawn,
        ));
    }
    squares
}

/// Piece kind that starts on `square` for `color`, if any.
pub fn starting_kind(color: Color, square: Square) -> Option<PieceKind> {
    starting_squares(color)
        .into_iter()
        .find(|(candidate, _)| *candidate == square)
        .map(|(_, kind)| kind)
}
