// src/board.rs
//
// 8x8 mailbox board and the piece model. Row 0 is White's home rank,
// column 0 is the a-file. The board is the single source of truth for
// every piece, kings included; king and en-passant references elsewhere
// are resolved through lookups on it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable per-game identity of a piece. Checked-by bookkeeping tracks
/// attackers by id so that an attacker is resolved at its current square,
/// and a captured attacker simply stops resolving.
pub type PieceId = u32;

// --- Color ---

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Direction pawns of this color advance in (row delta).
    pub fn forward(&self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// The farthest rank for this color, where its pawns promote.
    pub fn promotion_row(&self) -> i8 {
        match self {
            Color::White => 7,
            Color::Black => 0,
        }
    }
}

// --- Piece kinds ---

/// Closed set of piece kinds. Kind-specific state lives on the variant:
/// a pawn knows whether it is currently capturable en passant, a king
/// carries the ids of the enemy pieces attacking it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum PieceKind {
    Pawn { en_passant: bool },
    Knight,
    Bishop,
    Rook,
    Queen,
    King { checked_by: Vec<PieceId> },
}

impl PieceKind {
    pub fn name(&self) -> &'static str {
        match self {
            PieceKind::Pawn { .. } => "pawn",
            PieceKind::Knight => "knight",
            PieceKind::Bishop => "bishop",
            PieceKind::Rook => "rook",
            PieceKind::Queen => "queen",
            PieceKind::King { .. } => "king",
        }
    }

    fn symbol(&self) -> char {
        match self {
            PieceKind::Pawn { .. } => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King { .. } => 'k',
        }
    }
}

// --- Piece ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Piece {
    pub id: PieceId,
    pub kind: PieceKind,
    pub color: Color,
    pub row: i8,
    pub col: i8,
    /// Cleared the first time the piece relocates. Gates the pawn
    /// double-step and castling eligibility.
    pub first_move: bool,
}

impl Piece {
    pub fn new(id: PieceId, kind: PieceKind, color: Color, row: i8, col: i8) -> Self {
        Piece { id, kind, color, row, col, first_move: true }
    }

    pub fn is_pawn(&self) -> bool {
        matches!(self.kind, PieceKind::Pawn { .. })
    }

    pub fn is_king(&self) -> bool {
        matches!(self.kind, PieceKind::King { .. })
    }

    pub fn is_rook(&self) -> bool {
        matches!(self.kind, PieceKind::Rook)
    }

    /// Whether this pawn is currently capturable en passant.
    pub fn en_passant_flag(&self) -> bool {
        matches!(self.kind, PieceKind::Pawn { en_passant: true })
    }

    pub fn set_en_passant(&mut self, value: bool) {
        if let PieceKind::Pawn { en_passant } = &mut self.kind {
            *en_passant = value;
        }
    }

    /// Ids of the enemy pieces attacking this king. Empty for non-kings.
    pub fn checked_by(&self) -> &[PieceId] {
        match &self.kind {
            PieceKind::King { checked_by } => checked_by,
            _ => &[],
        }
    }

    pub fn add_checked_by(&mut self, id: PieceId) {
        if let PieceKind::King { checked_by } = &mut self.kind {
            if !checked_by.contains(&id) {
                checked_by.push(id);
            }
        }
    }

    pub fn set_checked_by(&mut self, ids: Vec<PieceId>) {
        if let PieceKind::King { checked_by } = &mut self.kind {
            *checked_by = ids;
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = self.kind.symbol();
        let symbol = match self.color {
            Color::White => symbol.to_ascii_uppercase(),
            Color::Black => symbol,
        };
        write!(f, "{}", symbol)
    }
}

// --- Board ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    pub fn empty() -> Board {
        Board::default()
    }

    /// Standard starting position. Returns the board together with the
    /// next free piece id, so the owning state can keep allocating ids.
    pub fn starting() -> (Board, PieceId) {
        let mut board = Board::empty();
        let mut next_id: PieceId = 0;
        let mut place = |board: &mut Board, kind: PieceKind, color: Color, row: i8, col: i8| {
            let id = next_id;
            next_id += 1;
            board.squares[row as usize][col as usize] =
                Some(Piece::new(id, kind, color, row, col));
        };

        let back_rank = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King { checked_by: Vec::new() },
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];

        for (col, kind) in back_rank.iter().enumerate() {
            place(&mut board, kind.clone(), Color::White, 0, col as i8);
        }
        for col in 0..8 {
            place(&mut board, PieceKind::Pawn { en_passant: false }, Color::White, 1, col);
        }
        for (col, kind) in back_rank.iter().enumerate() {
            place(&mut board, kind.clone(), Color::Black, 7, col as i8);
        }
        for col in 0..8 {
            place(&mut board, PieceKind::Pawn { en_passant: false }, Color::Black, 6, col);
        }

        (board, next_id)
    }

    pub fn in_bounds(row: i8, col: i8) -> bool {
        (0..8).contains(&row) && (0..8).contains(&col)
    }

    pub fn get(&self, row: i8, col: i8) -> Option<&Piece> {
        if !Board::in_bounds(row, col) {
            return None;
        }
        self.squares[row as usize][col as usize].as_ref()
    }

    pub fn get_mut(&mut self, row: i8, col: i8) -> Option<&mut Piece> {
        if !Board::in_bounds(row, col) {
            return None;
        }
        self.squares[row as usize][col as usize].as_mut()
    }

    /// Removes and returns the occupant of a square.
    pub fn take(&mut self, row: i8, col: i8) -> Option<Piece> {
        if !Board::in_bounds(row, col) {
            return None;
        }
        self.squares[row as usize][col as usize].take()
    }

    /// Places a piece at its own recorded coordinates, replacing any
    /// previous occupant.
    pub fn put(&mut self, piece: Piece) {
        let (row, col) = (piece.row, piece.col);
        if Board::in_bounds(row, col) {
            self.squares[row as usize][col as usize] = Some(piece);
        }
    }

    /// Iterator over all pieces on the board.
    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.squares.iter().flatten().filter_map(|sq| sq.as_ref())
    }

    /// Looks up the king of the given color. `None` means the king has
    /// been captured, which is the game-over condition.
    pub fn find_king(&self, color: Color) -> Option<&Piece> {
        self.pieces().find(|p| p.is_king() && p.color == color)
    }

    pub fn find_king_mut(&mut self, color: Color) -> Option<&mut Piece> {
        self.squares
            .iter_mut()
            .flatten()
            .filter_map(|sq| sq.as_mut())
            .find(|p| p.is_king() && p.color == color)
    }

    /// Resolves a piece id to the piece's current square, if it is still
    /// on the board.
    pub fn piece_by_id(&self, id: PieceId) -> Option<&Piece> {
        self.pieces().find(|p| p.id == id)
    }

    pub fn piece_by_id_mut(&mut self, id: PieceId) -> Option<&mut Piece> {
        self.squares
            .iter_mut()
            .flatten()
            .filter_map(|sq| sq.as_mut())
            .find(|p| p.id == id)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  +-----------------+")?;
        for row in (0..8).rev() {
            write!(f, "{} | ", row + 1)?;
            for col in 0..8 {
                match self.get(row, col) {
                    Some(piece) => write!(f, "{} ", piece)?,
                    None => write!(f, ". ")?,
                }
            }
            writeln!(f, "|")?;
        }
        writeln!(f, "  +-----------------+")?;
        write!(f, "    a b c d e f g h")
    }
}
