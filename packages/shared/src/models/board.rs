use chess::Square;
use std::collections::BTreeMap;

use crate::models::piece::{
    starting_squares, CapturedPiece, Color, CreaturePiece, CreatureSet, PieceKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// The creature index is already on the board or on the ban list.
    IndexConsumed(usize),
    UnknownIndex(usize),
    SquareOccupied(Square),
    EmptySquare(Square),
    InvalidSquare(String),
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::IndexConsumed(index) => {
                write!(f, "Creature index {} has already been drafted or banned", index)
            }
            BoardError::UnknownIndex(index) => write!(f, "Unknown creature index: {}", index),
            BoardError::SquareOccupied(square) => write!(f, "Square {} is occupied", square),
            BoardError::EmptySquare(square) => write!(f, "No creature on square {}", square),
            BoardError::InvalidSquare(name) => write!(f, "Invalid square: {}", name),
        }
    }
}

impl std::error::Error for BoardError {}

/// Maps chess squares to creature pieces and owns the creature pool, the ban
/// list and the history of taken pieces. Creature indices are stable
/// positions in the pool; consuming one marks it, nothing is ever shifted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardCreatureManager {
    pool: Vec<CreatureSet>,
    pieces: Vec<CreaturePiece>,
    bans: Vec<usize>,
    captured: Vec<CapturedPiece>,
}

impl BoardCreatureManager {
    /// Pool awaiting a draft: nothing on the board yet.
    pub fn new_draft(pool: Vec<CreatureSet>) -> Self {
        BoardCreatureManager {
            pool,
            pieces: Vec::new(),
            bans: Vec::new(),
            captured: Vec::new(),
        }
    }

    /// One creature per starting piece, white's sixteen first, in pool order.
    pub fn new_random(pool: Vec<CreatureSet>) -> Self {
        let mut manager = Self::new_draft(pool);
        let layout = starting_squares(Color::White)
            .into_iter()
            .map(|(square, kind)| (square, kind, Color::White))
            .chain(
                starting_squares(Color::Black)
                    .into_iter()
                    .map(|(square, kind)| (square, kind, Color::Black)),
            );

        for (index, (square, kind, color)) in layout.enumerate() {
            if let Some(creature) = manager.pool.get(index).cloned() {
                manager.pieces.push(CreaturePiece {
                    kind,
                    square: Some(square),
                    color,
                    creature_index: index,
                    creature,
                });
            }
        }
        manager
    }

    /// Rebuilds the mapping from its persisted form. `occupant` reports the
    /// piece kind and color standing on a square of the current position.
    pub fn restore<F>(
        pool: Vec<CreatureSet>,
        locations: &BTreeMap<String, usize>,
        captured: Vec<CapturedPiece>,
        bans: Vec<usize>,
        occupant: F,
    ) -> Result<Self, BoardError>
    where
        F: Fn(Square) -> Option<(PieceKind, Color)>,
    {
        let mut manager = Self::new_draft(pool);
        manager.bans = bans;

        for captured_piece in &captured {
            let creature = manager.creature(captured_piece.index)?.clone();
            manager.pieces.push(CreaturePiece {
                kind: captured_piece.kind,
                square: None,
                color: captured_piece.color,
                creature_index: captured_piece.index,
                creature,
            });
        }
        manager.captured = captured;

        for (square_name, index) in locations {
            let square = crate::models::piece::parse_square(square_name)
                .ok_or_else(|| BoardError::InvalidSquare(square_name.clone()))?;
            let (kind, color) = occupant(square).ok_or(BoardError::EmptySquare(square))?;
            let creature = manager.creature(*index)?.clone();
            manager.pieces.push(CreaturePiece {
                kind,
                square: Some(square),
                color,
                creature_index: *index,
                creature,
            });
        }

        Ok(manager)
    }

    fn creature(&self, index: usize) -> Result<&CreatureSet, BoardError> {
        self.pool.get(index).ok_or(BoardError::UnknownIndex(index))
    }

    pub fn pool(&self) -> &[CreatureSet] {
        &self.pool
    }

    pub fn pieces(&self) -> &[CreaturePiece] {
        &self.pieces
    }

    pub fn bans(&self) -> &[usize] {
        &self.bans
    }

    pub fn captured(&self) -> &[CapturedPiece] {
        &self.captured
    }

    /// Number of creatures ever placed on the board.
    pub fn assigned_count(&self) -> usize {
        self.pieces.len()
    }

    pub fn piece_at(&self, square: Square) -> Option<&CreaturePiece> {
        self.pieces
            .iter()
            .find(|piece| piece.square == Some(square))
    }

    fn piece_index_at(&self, square: Square) -> Option<usize> {
        self.pieces
            .iter()
            .position(|piece| piece.square == Some(square))
    }

    pub fn is_consumed(&self, index: usize) -> bool {
        self.bans.contains(&index)
            || self
                .pieces
                .iter()
                .any(|piece| piece.creature_index == index)
    }

    pub fn available_indices(&self) -> Vec<usize> {
        (0..self.pool.len())
            .filter(|index| !self.is_consumed(*index))
            .collect()
    }

    fn ensure_unconsumed(&self, index: usize) -> Result<(), BoardError> {
        if index >= self.pool.len() {
            return Err(BoardError::UnknownIndex(index));
        }
        if self.is_consumed(index) {
            return Err(BoardError::IndexConsumed(index));
        }
        Ok(())
    }

    /// Moves the piece on `from` to `to`, taking whatever stood on `to`.
    /// Returns the taken piece, if any.
    pub fn move_piece(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<Option<CapturedPiece>, BoardError> {
        let moving = self
            .piece_index_at(from)
            .ok_or(BoardError::EmptySquare(from))?;
        let taken = if self.piece_index_at(to).is_some() {
            Some(self.remove_piece(to)?)
        } else {
            None
        };

        let piece = &mut self.pieces[moving];
        piece.square = Some(to);
        if let Some(kind) = promotion {
            piece.kind = kind;
        }
        Ok(taken)
    }

    /// Takes the piece on `square` off the board.
    pub fn remove_piece(&mut self, square: Square) -> Result<CapturedPiece, BoardError> {
        let position = self
            .piece_index_at(square)
            .ok_or(BoardError::EmptySquare(square))?;
        let piece = &mut self.pieces[position];
        piece.square = None;

        let captured = CapturedPiece {
            index: piece.creature_index,
            kind: piece.kind,
            color: piece.color,
        };
        self.captured.push(captured.clone());
        Ok(captured)
    }

    pub fn assign_from_draft(
        &mut self,
        index: usize,
        square: Square,
        kind: PieceKind,
        color: Color,
    ) -> Result<(), BoardError> {
        self.ensure_unconsumed(index)?;
        if self.piece_at(square).is_some() {
            return Err(BoardError::SquareOccupied(square));
        }

        let creature = self.creature(index)?.clone();
        self.pieces.push(CreaturePiece {
            kind,
            square: Some(square),
            color,
            creature_index: index,
            creature,
        });
        Ok(())
    }

    pub fn ban_draft_index(&mut self, index: usize) -> Result<(), BoardError> {
        self.ensure_unconsumed(index)?;
        self.bans.push(index);
        Ok(())
    }

    /// Serializable square -> creature index map of the pieces on the board.
    pub fn indexed_locations(&self) -> BTreeMap<String, usize> {
        self.pieces
            .iter()
            .filter_map(|piece| {
                piece
                    .square
                    .map(|square| (square.to_string(), piece.creature_index))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::piece::parse_square;
    use crate::models::roster::CreatureRoster;
    use std::str::FromStr;

    fn sq(name: &str) -> Square {
        parse_square(name).unwrap()
    }

    fn random_board() -> BoardCreatureManager {
        BoardCreatureManager::new_random(CreatureRoster::builtin().draw(11, 32))
    }

    #[test]
    fn test_random_assignment_fills_every_starting_square() {
        let board = random_board();
        assert_eq!(board.assigned_count(), 32);
        assert_eq!(board.indexed_locations().len(), 32);

        let king = board.piece_at(sq("e8")).unwrap();
        assert_eq!(king.kind, PieceKind::King);
        assert_eq!(king.color, Color::Black);
        assert!(board.piece_at(sq("e4")).is_none());
    }

    #[test]
    fn test_move_piece_takes_occupant() {
        let mut board = random_board();
        let pawn_index = board.piece_at(sq("d2")).unwrap().creature_index;
        let victim_index = board.piece_at(sq("d7")).unwrap().creature_index;

        let taken = board.move_piece(sq("d2"), sq("d7"), None).unwrap();

        assert_eq!(taken.unwrap().index, victim_index);
        assert_eq!(board.piece_at(sq("d7")).unwrap().creature_index, pawn_index);
        assert!(board.piece_at(sq("d2")).is_none());
        assert_eq!(board.captured().len(), 1);
        // the taken piece stays in the piece list, off the board
        assert_eq!(board.pieces().len(), 32);
    }

    #[test]
    fn test_move_piece_applies_promotion() {
        let mut board = random_board();
        board.remove_piece(sq("a7")).unwrap();
        board.remove_piece(sq("a8")).unwrap();
        board.move_piece(sq("a2"), sq("a8"), Some(PieceKind::Queen)).unwrap();
        assert_eq!(board.piece_at(sq("a8")).unwrap().kind, PieceKind::Queen);
    }

    #[test]
    fn test_move_from_empty_square_fails() {
        let mut board = random_board();
        assert_eq!(
            board.move_piece(sq("e4"), sq("e5"), None),
            Err(BoardError::EmptySquare(sq("e4")))
        );
    }

    #[test]
    fn test_draft_and_ban_reject_consumed_indices() {
        let mut board = BoardCreatureManager::new_draft(CreatureRoster::builtin().draw(3, 40));

        board.ban_draft_index(4).unwrap();
        board
            .assign_from_draft(5, sq("e1"), PieceKind::King, Color::White)
            .unwrap();

        assert_eq!(board.ban_draft_index(4), Err(BoardError::IndexConsumed(4)));
        assert_eq!(board.ban_draft_index(5), Err(BoardError::IndexConsumed(5)));
        assert_eq!(
            board.assign_from_draft(4, sq("d1"), PieceKind::Queen, Color::White),
            Err(BoardError::IndexConsumed(4))
        );
        assert_eq!(
            board.assign_from_draft(5, sq("d1"), PieceKind::Queen, Color::White),
            Err(BoardError::IndexConsumed(5))
        );
        assert_eq!(board.ban_draft_index(99), Err(BoardError::UnknownIndex(99)));
        assert!(!board.available_indices().contains(&4));
        assert_eq!(board.available_indices().len(), 38);
    }

    #[test]
    fn test_draft_rejects_occupied_square() {
        let mut board = BoardCreatureManager::new_draft(CreatureRoster::builtin().draw(3, 40));
        board
            .assign_from_draft(0, sq("a1"), PieceKind::Rook, Color::White)
            .unwrap();
        assert_eq!(
            board.assign_from_draft(1, sq("a1"), PieceKind::Rook, Color::White),
            Err(BoardError::SquareOccupied(sq("a1")))
        );
    }

    #[test]
    fn test_restore_round_trips_locations_and_history() {
        let mut board = random_board();
        board.move_piece(sq("e2"), sq("e4"), None).unwrap();
        board.remove_piece(sq("d7")).unwrap();

        let position = chess::Board::from_str(
            "rnbqkbnr/ppp1pppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        )
        .unwrap();
        let restored = BoardCreatureManager::restore(
            board.pool().to_vec(),
            &board.indexed_locations(),
            board.captured().to_vec(),
            board.bans().to_vec(),
            |square| {
                position
                    .piece_on(square)
                    .zip(position.color_on(square))
                    .map(|(piece, color)| (piece.into(), color.into()))
            },
        )
        .unwrap();

        assert_eq!(restored.indexed_locations(), board.indexed_locations());
        assert_eq!(restored.captured(), board.captured());
        assert_eq!(
            restored.piece_at(sq("e4")).unwrap().creature,
            board.piece_at(sq("e4")).unwrap().creature
        );
    }
}
