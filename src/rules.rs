// src/rules.rs
//
// Pseudo-legal move generation and move classification. "Pseudo-legal"
// means consistent with the piece's movement pattern and occupancy; with
// the exception of the king's checked-by filtering, no self-check
// analysis is performed here.

use crate::board::{Board, Color, Piece, PieceId, PieceKind};
use crate::moves::Move;
use std::collections::HashSet;

/// Outcome of validating a candidate move. A move that matches no class
/// is rejected outright by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveClass {
    Normal,
    EnPassant,
    Castle,
}

const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (-2, -1), (-2, 1), (-1, -2), (-1, 2),
    (1, -2), (1, 2), (2, -1), (2, 1),
];

const KING_OFFSETS: [(i8, i8); 8] = [
    (-1, -1), (-1, 0), (-1, 1), (0, -1),
    (0, 1), (1, -1), (1, 0), (1, 1),
];

// (row delta, col delta, is_diagonal)
const RAY_DIRECTIONS: [(i8, i8, bool); 8] = [
    (1, 0, false), (-1, 0, false), (0, 1, false), (0, -1, false),
    (1, 1, true), (1, -1, true), (-1, 1, true), (-1, -1, true),
];

// --- Pseudo-legal generation ---

/// Enumerates the pseudo-legal moves of the piece at the given square.
/// Returns an empty list for an empty square.
pub fn pseudo_legal_moves(board: &Board, row: i8, col: i8) -> Vec<Move> {
    let piece = match board.get(row, col) {
        Some(p) => p,
        None => return Vec::new(),
    };
    match &piece.kind {
        PieceKind::Pawn { .. } => pawn_moves(board, piece),
        PieceKind::Knight => leaper_moves(board, piece, &KNIGHT_OFFSETS),
        PieceKind::Bishop => ray_moves(board, piece, true, false),
        PieceKind::Rook => ray_moves(board, piece, false, true),
        PieceKind::Queen => ray_moves(board, piece, true, true),
        PieceKind::King { checked_by } => king_moves(board, piece, checked_by),
    }
}

/// Pawn pushes and diagonal captures. Promotion is not special-cased
/// here; the engine flags it after the move lands on the back rank.
fn pawn_moves(board: &Board, piece: &Piece) -> Vec<Move> {
    let mut moves = Vec::new();
    let (row, col) = (piece.row, piece.col);
    let dir = piece.color.forward();

    let one_row = row + dir;
    if !Board::in_bounds(one_row, col) {
        return moves;
    }

    if board.get(one_row, col).is_none() {
        moves.push(Move::new(row, col, one_row, col));
        // Double step only from the start square, through an empty
        // intermediate onto an empty destination.
        let two_row = row + 2 * dir;
        if piece.first_move && Board::in_bounds(two_row, col) && board.get(two_row, col).is_none() {
            moves.push(Move::new(row, col, two_row, col));
        }
    }

    for dc in [-1, 1] {
        let (r, c) = (one_row, col + dc);
        if let Some(target) = board.get(r, c) {
            if target.color != piece.color {
                moves.push(Move::new(row, col, r, c));
            }
        }
    }
    moves
}

fn leaper_moves(board: &Board, piece: &Piece, offsets: &[(i8, i8)]) -> Vec<Move> {
    let mut moves = Vec::new();
    let (row, col) = (piece.row, piece.col);
    for &(dr, dc) in offsets {
        let (r, c) = (row + dr, col + dc);
        if !Board::in_bounds(r, c) {
            continue;
        }
        match board.get(r, c) {
            None => moves.push(Move::new(row, col, r, c)),
            Some(target) if target.color != piece.color => moves.push(Move::new(row, col, r, c)),
            Some(_) => {}
        }
    }
    moves
}

/// Ray-cast along the requested direction sets until blocked. A ray
/// stops before an own piece and stops on (including) an enemy piece.
fn ray_moves(board: &Board, piece: &Piece, diagonals: bool, orthogonals: bool) -> Vec<Move> {
    let mut moves = Vec::new();
    let (row, col) = (piece.row, piece.col);
    for &(dr, dc, is_diagonal) in &RAY_DIRECTIONS {
        if (diagonals && is_diagonal) || (orthogonals && !is_diagonal) {
            let (mut r, mut c) = (row + dr, col + dc);
            while Board::in_bounds(r, c) {
                match board.get(r, c) {
                    None => moves.push(Move::new(row, col, r, c)),
                    Some(target) => {
                        if target.color != piece.color {
                            moves.push(Move::new(row, col, r, c));
                        }
                        break;
                    }
                }
                r += dr;
                c += dc;
            }
        }
    }
    moves
}

/// The eight adjacent squares, minus squares attacked by the pieces on
/// this king's checked-by list. Only those known attackers are
/// consulted, not the full enemy attack map.
fn king_moves(board: &Board, piece: &Piece, checked_by: &[PieceId]) -> Vec<Move> {
    let danger: HashSet<(i8, i8)> = checked_by
        .iter()
        .filter_map(|&id| board.piece_by_id(id))
        .flat_map(|attacker| attack_squares(board, attacker))
        .collect();

    let mut moves = Vec::new();
    let (row, col) = (piece.row, piece.col);
    for &(dr, dc) in &KING_OFFSETS {
        let (r, c) = (row + dr, col + dc);
        if !Board::in_bounds(r, c) {
            continue;
        }
        if let Some(target) = board.get(r, c) {
            if target.color == piece.color {
                continue;
            }
        }
        if danger.contains(&(r, c)) {
            continue;
        }
        moves.push(Move::new(row, col, r, c));
    }
    moves
}

// --- Attack detection ---

/// Squares the given piece attacks. For non-kings this is exactly its
/// pseudo-legal destination set. A king attacker is reduced to its raw
/// neighborhood, which both matches what a king threatens and keeps the
/// computation from chasing mutual king references.
pub fn attack_squares(board: &Board, piece: &Piece) -> Vec<(i8, i8)> {
    if piece.is_king() {
        let mut squares = Vec::new();
        for &(dr, dc) in &KING_OFFSETS {
            let (r, c) = (piece.row + dr, piece.col + dc);
            if !Board::in_bounds(r, c) {
                continue;
            }
            if let Some(target) = board.get(r, c) {
                if target.color == piece.color {
                    continue;
                }
            }
            squares.push((r, c));
        }
        squares
    } else {
        pseudo_legal_moves(board, piece.row, piece.col)
            .iter()
            .map(|m| (m.to_row, m.to_col))
            .collect()
    }
}

/// Whether the piece attacks the given square.
pub fn attacks(board: &Board, piece: &Piece, row: i8, col: i8) -> bool {
    attack_squares(board, piece).contains(&(row, col))
}

/// Whether any piece of the given color attacks the square.
pub fn square_attacked_by(board: &Board, attacker: Color, row: i8, col: i8) -> bool {
    board
        .pieces()
        .filter(|p| p.color == attacker)
        .any(|p| attacks(board, p, row, col))
}

// --- Classification ---

/// Validates a candidate move for the piece at the source square and
/// names its class. Pawns get the en passant check first, kings the
/// castle check; everything else is Normal iff the destination appears
/// in the pseudo-legal set.
pub fn classify(board: &Board, row: i8, col: i8, to_row: i8, to_col: i8) -> Option<MoveClass> {
    let piece = board.get(row, col)?;
    if !Board::in_bounds(to_row, to_col) {
        return None;
    }
    match &piece.kind {
        PieceKind::Pawn { .. } => {
            let dir = piece.color.forward();
            if (to_col - col).abs() == 1 && to_row - row == dir {
                // Diagonal step onto an empty square beside a pawn that
                // just double-stepped.
                if board.get(to_row, to_col).is_none() {
                    if let Some(beside) = board.get(row, to_col) {
                        if beside.en_passant_flag() {
                            return Some(MoveClass::EnPassant);
                        }
                    }
                }
            }
            classify_normal(board, row, col, to_row, to_col)
        }
        PieceKind::King { .. } => {
            let x_move = to_col - col;
            let y_move = to_row - row;
            if x_move.abs() > 2 || y_move.abs() > 1 {
                return None;
            }
            if x_move.abs() == 2 && y_move == 0 && classify_castle(board, piece, to_col) {
                return Some(MoveClass::Castle);
            }
            classify_normal(board, row, col, to_row, to_col)
        }
        _ => classify_normal(board, row, col, to_row, to_col),
    }
}

fn classify_normal(board: &Board, row: i8, col: i8, to_row: i8, to_col: i8) -> Option<MoveClass> {
    let found = pseudo_legal_moves(board, row, col)
        .iter()
        .any(|m| m.to_row == to_row && m.to_col == to_col);
    if found {
        Some(MoveClass::Normal)
    } else {
        None
    }
}

/// Castle validity: an unmoved king on its home file moving two squares
/// laterally, an unmoved rook found by scanning outward with nothing in
/// between, both crossed squares empty, and none of the king's current,
/// crossed, or destination squares attacked.
fn classify_castle(board: &Board, king: &Piece, to_col: i8) -> bool {
    let (row, col) = (king.row, king.col);
    if !(3..=4).contains(&col) {
        return false;
    }
    let x_dir: i8 = if to_col > col { 1 } else { -1 };
    if board.get(row, col + x_dir).is_some() || board.get(row, col + 2 * x_dir).is_some() {
        return false;
    }
    let rook = match castle_rook_square(board, row, col, x_dir)
        .and_then(|(r, c)| board.get(r, c))
    {
        Some(p) => p,
        None => return false,
    };
    if !rook.is_rook() || rook.color != king.color || !rook.first_move || !king.first_move {
        return false;
    }
    let enemy = king.color.opponent();
    !square_attacked_by(board, enemy, row, col)
        && !square_attacked_by(board, enemy, row, col + x_dir)
        && !square_attacked_by(board, enemy, row, col + 2 * x_dir)
}

/// Scans outward from the king's crossing squares and returns the first
/// occupied square. Castling requires that occupant to be the rook; any
/// other piece in the way blocks the castle.
pub fn castle_rook_square(board: &Board, row: i8, king_col: i8, x_dir: i8) -> Option<(i8, i8)> {
    let mut c = king_col + 3 * x_dir;
    while (0..8).contains(&c) {
        if board.get(row, c).is_some() {
            return Some((row, c));
        }
        c += x_dir;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PieceKind;

    fn place(board: &mut Board, id: PieceId, kind: PieceKind, color: Color, row: i8, col: i8) {
        board.put(Piece::new(id, kind, color, row, col));
    }

    fn dests(moves: &[Move]) -> Vec<(i8, i8)> {
        let mut v: Vec<_> = moves.iter().map(|m| (m.to_row, m.to_col)).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn pawn_single_and_double_from_start() {
        let (board, _) = Board::starting();
        let moves = pseudo_legal_moves(&board, 1, 4);
        assert_eq!(dests(&moves), vec![(2, 4), (3, 4)]);
    }

    #[test]
    fn pawn_double_blocked_by_intermediate() {
        let (mut board, next) = Board::starting();
        place(&mut board, next, PieceKind::Knight, Color::Black, 2, 4);
        assert!(pseudo_legal_moves(&board, 1, 4).is_empty());
    }

    #[test]
    fn pawn_diagonal_capture_requires_enemy() {
        let (mut board, next) = Board::starting();
        place(&mut board, next, PieceKind::Knight, Color::Black, 2, 5);
        place(&mut board, next + 1, PieceKind::Knight, Color::White, 2, 3);
        let moves = pseudo_legal_moves(&board, 1, 4);
        assert_eq!(dests(&moves), vec![(2, 4), (2, 5), (3, 4)]);
    }

    #[test]
    fn knight_from_start() {
        let (board, _) = Board::starting();
        let moves = pseudo_legal_moves(&board, 0, 1);
        assert_eq!(dests(&moves), vec![(2, 0), (2, 2)]);
    }

    #[test]
    fn rook_ray_stops_on_capture() {
        let mut board = Board::empty();
        place(&mut board, 0, PieceKind::Rook, Color::White, 0, 0);
        place(&mut board, 1, PieceKind::Pawn { en_passant: false }, Color::Black, 0, 3);
        place(&mut board, 2, PieceKind::Pawn { en_passant: false }, Color::White, 4, 0);
        let moves = pseudo_legal_moves(&board, 0, 0);
        // Right: b1, c1, d1 (capture). Up: a2..a4 stop before own pawn.
        assert_eq!(
            dests(&moves),
            vec![(0, 1), (0, 2), (0, 3), (1, 0), (2, 0), (3, 0)]
        );
    }

    #[test]
    fn queen_on_open_board() {
        let mut board = Board::empty();
        place(&mut board, 0, PieceKind::Queen, Color::White, 3, 3);
        assert_eq!(pseudo_legal_moves(&board, 3, 3).len(), 27);
    }

    #[test]
    fn king_avoids_squares_of_known_attackers_only() {
        let mut board = Board::empty();
        place(
            &mut board,
            0,
            PieceKind::King { checked_by: vec![1] },
            Color::White,
            0,
            4,
        );
        place(&mut board, 1, PieceKind::Rook, Color::Black, 1, 7);
        // Rook 1 sweeps rank 2, so d2/e2/f2 are excluded.
        let moves = pseudo_legal_moves(&board, 0, 4);
        assert_eq!(dests(&moves), vec![(0, 3), (0, 5)]);

        // An attacker not on the checked-by list is ignored.
        let mut unaware = Board::empty();
        place(
            &mut unaware,
            0,
            PieceKind::King { checked_by: Vec::new() },
            Color::White,
            0,
            4,
        );
        place(&mut unaware, 1, PieceKind::Rook, Color::Black, 1, 7);
        assert_eq!(pseudo_legal_moves(&unaware, 0, 4).len(), 5);
    }

    #[test]
    fn classify_en_passant() {
        let mut board = Board::empty();
        place(&mut board, 0, PieceKind::Pawn { en_passant: false }, Color::White, 4, 4);
        place(&mut board, 1, PieceKind::Pawn { en_passant: true }, Color::Black, 4, 3);
        assert_eq!(classify(&board, 4, 4, 5, 3), Some(MoveClass::EnPassant));
        // Without the flag it is a plain (and here invalid) diagonal.
        let mut unflagged = board.clone();
        unflagged.get_mut(4, 3).unwrap().set_en_passant(false);
        assert_eq!(classify(&unflagged, 4, 4, 5, 3), None);
    }

    #[test]
    fn classify_kingside_castle() {
        let (mut board, _) = Board::starting();
        board.take(0, 5);
        board.take(0, 6);
        assert_eq!(classify(&board, 0, 4, 0, 6), Some(MoveClass::Castle));
    }

    #[test]
    fn castle_rejected_after_rook_moved() {
        let (mut board, _) = Board::starting();
        board.take(0, 5);
        board.take(0, 6);
        board.get_mut(0, 7).unwrap().first_move = false;
        assert_eq!(classify(&board, 0, 4, 0, 6), None);
    }

    #[test]
    fn castle_rejected_when_path_attacked() {
        let mut board = Board::empty();
        place(
            &mut board,
            0,
            PieceKind::King { checked_by: Vec::new() },
            Color::White,
            0,
            4,
        );
        place(&mut board, 1, PieceKind::Rook, Color::White, 0, 7);
        place(&mut board, 2, PieceKind::Rook, Color::Black, 5, 5);
        // Black rook holds f1, the square the king crosses.
        assert_eq!(classify(&board, 0, 4, 0, 6), None);
        board.take(5, 5);
        assert_eq!(classify(&board, 0, 4, 0, 6), Some(MoveClass::Castle));
    }

    #[test]
    fn queenside_castle_blocked_by_intervening_piece() {
        let (mut board, _) = Board::starting();
        board.take(0, 2);
        board.take(0, 3);
        // The b1 knight still sits between the rook and the king's path.
        assert_eq!(classify(&board, 0, 4, 0, 2), None);
        board.take(0, 1);
        assert_eq!(classify(&board, 0, 4, 0, 2), Some(MoveClass::Castle));
    }

    #[test]
    fn classify_rejects_empty_source_and_bad_pattern() {
        let (board, _) = Board::starting();
        assert_eq!(classify(&board, 3, 3, 4, 3), None);
        assert_eq!(classify(&board, 0, 0, 5, 5), None);
    }
}
