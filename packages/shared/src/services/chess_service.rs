use chess::{
    BitBoard, Board, BoardBuilder, BoardStatus, CastleRights, ChessMove, File, MoveGen, Piece,
    Rank, Square,
};
use std::str::FromStr;

use crate::models::piece::{Color, PieceKind};
use crate::services::errors::chess_service_errors::ChessServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Quiet,
    Capture,
    EnPassant,
    Castle,
}

/// A legal move in the current position together with its SAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    pub mv: ChessMove,
    pub san: String,
    pub kind: MoveKind,
    pub promotion: Option<PieceKind>,
}

impl LegalMove {
    pub fn source(&self) -> Square {
        self.mv.get_source()
    }

    pub fn dest(&self) -> Square {
        self.mv.get_dest()
    }

    pub fn is_capture(&self) -> bool {
        matches!(self.kind, MoveKind::Capture | MoveKind::EnPassant)
    }

    /// The square whose occupant is being taken: the destination, or the
    /// passed pawn's square for en passant.
    pub fn contested_square(&self) -> Square {
        match self.kind {
            MoveKind::EnPassant => {
                Square::make_square(self.source().get_rank(), self.dest().get_file())
            }
            _ => self.dest(),
        }
    }

    /// Rook move that accompanies a castling king move.
    pub fn rook_relocation(&self) -> Option<(Square, Square)> {
        if self.kind != MoveKind::Castle {
            return None;
        }
        let rank = self.source().get_rank();
        if self.dest().get_file() == File::G {
            Some((
                Square::make_square(rank, File::H),
                Square::make_square(rank, File::F),
            ))
        } else {
            Some((
                Square::make_square(rank, File::A),
                Square::make_square(rank, File::D),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceAdvance {
    Advanced(Board),
    /// Vacating the square left the mover's king in check.
    KingExposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    Ongoing,
    Checkmate,
    Stalemate,
}

#[derive(Debug, Clone, Default)]
pub struct ChessService;

impl ChessService {
    pub fn new() -> Self {
        ChessService
    }

    pub fn parse_position(&self, fen: &str) -> Result<Board, ChessServiceError> {
        Board::from_str(fen)
            .map_err(|e| ChessServiceError::InvalidPosition(format!("Invalid FEN: {}", e)))
    }

    pub fn fen(&self, board: &Board) -> String {
        format!("{}", board)
    }

    pub fn occupant(&self, board: &Board, square: Square) -> Option<(PieceKind, Color)> {
        board
            .piece_on(square)
            .zip(board.color_on(square))
            .map(|(piece, color)| (piece.into(), color.into()))
    }

    pub fn legal_moves(&self, board: &Board) -> Vec<LegalMove> {
        let moves: Vec<ChessMove> = MoveGen::new_legal(board).collect();
        moves
            .iter()
            .map(|mv| LegalMove {
                mv: *mv,
                san: san_for(board, *mv, &moves),
                kind: classify(board, *mv),
                promotion: mv.get_promotion().map(PieceKind::from),
            })
            .collect()
    }

    /// Looks a submitted SAN up among the legal moves. Check and annotation
    /// suffixes are ignored, `0-0` is accepted for `O-O`.
    pub fn find_move(&self, board: &Board, san: &str) -> Result<LegalMove, ChessServiceError> {
        let wanted = normalize_san(san);
        self.legal_moves(board)
            .into_iter()
            .find(|candidate| normalize_san(&candidate.san) == wanted)
            .ok_or_else(|| ChessServiceError::UnmatchedSan(san.to_string()))
    }

    pub fn apply(&self, board: &Board, mv: &LegalMove) -> Board {
        board.make_move_new(mv.mv)
    }

    /// Removes the piece on `vacate` and passes the turn without a move.
    pub fn force_advance(
        &self,
        board: &Board,
        vacate: Square,
    ) -> Result<ForceAdvance, ChessServiceError> {
        if board.piece_on(vacate) == Some(Piece::King) {
            return Ok(ForceAdvance::KingExposed);
        }

        let mut builder = BoardBuilder::from(board);
        builder
            .clear_square(vacate)
            .side_to_move(!board.side_to_move())
            .en_passant(None);
        for color in [chess::Color::White, chess::Color::Black] {
            let rights = sanitize_castle_rights(&builder, color);
            builder.castle_rights(color, rights);
        }

        match Board::try_from(&builder) {
            Ok(advanced) => Ok(ForceAdvance::Advanced(advanced)),
            Err(_) => {
                let mover: chess::Color = board.side_to_move();
                if still_has_king(&builder, mover) {
                    Ok(ForceAdvance::KingExposed)
                } else {
                    Err(ChessServiceError::InvalidPosition(format!(
                        "Cannot pass the turn after vacating {}",
                        vacate
                    )))
                }
            }
        }
    }

    pub fn outcome(&self, board: &Board) -> PositionOutcome {
        match board.status() {
            BoardStatus::Ongoing => PositionOutcome::Ongoing,
            BoardStatus::Checkmate => PositionOutcome::Checkmate,
            BoardStatus::Stalemate => PositionOutcome::Stalemate,
        }
    }
}

fn classify(board: &Board, mv: ChessMove) -> MoveKind {
    let source = mv.get_source();
    let dest = mv.get_dest();
    match board.piece_on(source) {
        Some(Piece::King) if file_distance(source, dest) == 2 => MoveKind::Castle,
        Some(Piece::Pawn) if source.get_file() != dest.get_file() && board.piece_on(dest).is_none() => {
            MoveKind::EnPassant
        }
        _ if board.piece_on(dest).is_some() => MoveKind::Capture,
        _ => MoveKind::Quiet,
    }
}

fn file_distance(a: Square, b: Square) -> usize {
    a.get_file().to_index().abs_diff(b.get_file().to_index())
}

fn file_char(file: File) -> char {
    (b'a' + file.to_index() as u8) as char
}

fn rank_char(rank: Rank) -> char {
    (b'1' + rank.to_index() as u8) as char
}

fn piece_letter(piece: Piece) -> char {
    PieceKind::from(piece).symbol()
}

fn san_for(board: &Board, mv: ChessMove, all: &[ChessMove]) -> String {
    let source = mv.get_source();
    let dest = mv.get_dest();
    let piece = board.piece_on(source).unwrap_or(Piece::Pawn);

    let mut san = String::new();
    match classify(board, mv) {
        MoveKind::Castle => {
            san.push_str(if dest.get_file() == File::G { "O-O" } else { "O-O-O" });
        }
        kind => {
            let capture = matches!(kind, MoveKind::Capture | MoveKind::EnPassant);
            if piece == Piece::Pawn {
                if capture {
                    san.push(file_char(source.get_file()));
                }
            } else {
                san.push(piece_letter(piece));
                san.push_str(&disambiguation(board, mv, piece, all));
            }
            if capture {
                san.push('x');
            }
            san.push_str(&dest.to_string());
            if let Some(promotion) = mv.get_promotion() {
                san.push('=');
                san.push(piece_letter(promotion));
            }
        }
    }

    let after = board.make_move_new(mv);
    if after.status() == BoardStatus::Checkmate {
        san.push('#');
    } else if *after.checkers() != BitBoard::new(0) {
        san.push('+');
    }
    san
}

fn disambiguation(board: &Board, mv: ChessMove, piece: Piece, all: &[ChessMove]) -> String {
    let source = mv.get_source();
    let rivals: Vec<Square> = all
        .iter()
        .filter(|other| {
            other.get_dest() == mv.get_dest()
                && other.get_source() != source
                && board.piece_on(other.get_source()) == Some(piece)
        })
        .map(|other| other.get_source())
        .collect();

    if rivals.is_empty() {
        String::new()
    } else if rivals.iter().all(|r| r.get_file() != source.get_file()) {
        file_char(source.get_file()).to_string()
    } else if rivals.iter().all(|r| r.get_rank() != source.get_rank()) {
        rank_char(source.get_rank()).to_string()
    } else {
        source.to_string()
    }
}

fn normalize_san(san: &str) -> String {
    san.trim()
        .trim_end_matches(['+', '#', '!', '?'])
        .replace('0', "O")
}

fn sanitize_castle_rights(builder: &BoardBuilder, color: chess::Color) -> CastleRights {
    let rights = builder.get_castle_rights(color);
    let rank = color.to_my_backrank();
    let has = |file: File, piece: Piece| {
        builder[Square::make_square(rank, file)] == Some((piece, color))
    };
    let king_home = has(File::E, Piece::King);
    let kingside = rights.has_kingside() && king_home && has(File::H, Piece::Rook);
    let queenside = rights.has_queenside() && king_home && has(File::A, Piece::Rook);
    match (kingside, queenside) {
        (true, true) => CastleRights::Both,
        (true, false) => CastleRights::KingSide,
        (false, true) => CastleRights::QueenSide,
        (false, false) => CastleRights::NoRights,
    }
}

fn still_has_king(builder: &BoardBuilder, color: chess::Color) -> bool {
    chess::ALL_SQUARES
        .iter()
        .any(|square| builder[*square] == Some((Piece::King, color)))
}
