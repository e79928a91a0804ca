// src/engine.rs
//
// The game engine: owns the board, applies classified moves, keeps the
// check bookkeeping and the en-passant marker, and notifies subscribed
// observers of every applied move. Exactly one thread may own a
// GameState; cross-peer consistency comes from deterministic replay of
// the same move sequence on both sides.

use crate::board::{Board, Color, Piece, PieceId, PieceKind};
use crate::moves::{square_name, Move};
use crate::rules::{self, MoveClass};
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Save files carry a fixed suffix; loading requires the same suffix.
pub const SAVE_SUFFIX: &str = ".chess";

/// Where a move request originates. Only primary (local) moves may be
/// flagged as promotion requests; replayed moves never are, because the
/// promotion result travels separately as a piece message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveOrigin {
    Local,
    Replay,
}

lazy_static! {
    static ref PROMOTION_KINDS: HashMap<&'static str, PieceKind> = {
        let mut kinds = HashMap::new();
        kinds.insert("Queen", PieceKind::Queen);
        kinds.insert("Rook", PieceKind::Rook);
        kinds.insert("Bishop", PieceKind::Bishop);
        kinds.insert("Knight", PieceKind::Knight);
        kinds
    };
}

// --- Game state ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GameState {
    board: Board,
    /// The single pawn currently capturable en passant, if any. Cleared
    /// unconditionally after the next move completes.
    en_passant: Option<PieceId>,
    my_turn: bool,
    next_piece_id: PieceId,
    #[serde(skip)]
    observers: Vec<Sender<Move>>,
}

impl GameState {
    /// New game in the standard starting position.
    pub fn new() -> Self {
        let (board, next_piece_id) = Board::starting();
        GameState {
            board,
            en_passant: None,
            my_turn: false,
            next_piece_id,
            observers: Vec::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn piece_at(&self, row: i8, col: i8) -> Option<&Piece> {
        self.board.get(row, col)
    }

    pub fn is_my_turn(&self) -> bool {
        self.my_turn
    }

    pub fn set_my_turn(&mut self, mine: bool) {
        self.my_turn = mine;
    }

    /// The pawn currently capturable en passant, if it is still on the
    /// board.
    pub fn en_passant_pawn(&self) -> Option<&Piece> {
        self.en_passant.and_then(|id| self.board.piece_by_id(id))
    }

    /// Registers an observer. Every applied move is sent to all channels
    /// subscribed here; disconnected observers are dropped.
    pub fn subscribe(&mut self) -> Receiver<Move> {
        let (tx, rx) = channel();
        self.observers.push(tx);
        rx
    }

    fn notify(&mut self, record: &Move) {
        self.observers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    fn fresh_id(&mut self) -> PieceId {
        let id = self.next_piece_id;
        self.next_piece_id += 1;
        id
    }

    // --- Status queries ---

    /// Whether the given side's king is in check, i.e. its checked-by
    /// set is non-empty. A captured king is never in check.
    pub fn is_checked(&self, color: Color) -> bool {
        self.board
            .find_king(color)
            .map(|king| !king.checked_by().is_empty())
            .unwrap_or(false)
    }

    /// The game ends exactly when a king has been captured.
    pub fn is_game_over(&self) -> bool {
        self.board.find_king(Color::White).is_none() || self.board.find_king(Color::Black).is_none()
    }

    pub fn is_winner(&self, color: Color) -> bool {
        self.board.find_king(color.opponent()).is_none()
    }

    // --- Move application ---

    /// Applies the move from source to destination if it classifies as
    /// legal, returning the move record. Anything else is a silent
    /// rejection: no state change, no emission, `None`.
    pub fn apply_move(
        &mut self,
        from_row: i8,
        from_col: i8,
        to_row: i8,
        to_col: i8,
        origin: MoveOrigin,
    ) -> Option<Move> {
        let class = rules::classify(&self.board, from_row, from_col, to_row, to_col)?;
        let mut record = Move::new(from_row, from_col, to_row, to_col);

        let mover = self.board.get(from_row, from_col)?;
        let mover_id = mover.id;
        let mover_color = mover.color;
        let mover_is_pawn = mover.is_pawn();
        let mover_is_king = mover.is_king();
        let was_first_move = mover.first_move;

        let mut castle_rook_id: Option<PieceId> = None;

        match class {
            MoveClass::Normal => {
                // A captured piece is discarded. If it was a king, its
                // absence from the board is the game-over signal.
                self.board.take(to_row, to_col);
                self.relocate(from_row, from_col, to_row, to_col);
            }
            MoveClass::EnPassant => {
                // The captured pawn stands beside the mover, not on the
                // destination square.
                self.board.take(from_row, to_col);
                self.relocate(from_row, from_col, to_row, to_col);
            }
            MoveClass::Castle => {
                let x_dir: i8 = if to_col > from_col { 1 } else { -1 };
                let (rook_row, rook_col) =
                    rules::castle_rook_square(&self.board, from_row, from_col, x_dir)?;
                self.relocate(from_row, from_col, to_row, to_col);
                castle_rook_id = self.relocate(rook_row, rook_col, to_row, to_col - x_dir);
            }
        }

        // En-passant eligibility lasts exactly one move, captured or not.
        self.clear_en_passant();

        if self.is_game_over() {
            self.notify(&record);
            return Some(record);
        }

        // Check bookkeeping. A king that moved recomputes its own set in
        // full; any other mover is tested as a new attacker of the
        // opposing king. A castle additionally tests the king at its
        // new square.
        if let Some(rook_id) = castle_rook_id {
            self.detect_checker(rook_id, mover_color);
            self.detect_checker(mover_id, mover_color);
        } else if mover_is_king {
            self.recompute_checked_by(mover_color);
        } else {
            self.detect_checker(mover_id, mover_color);
        }

        if mover_is_pawn {
            // Promotion is a separate second step; only the primary
            // caller gets the request flag.
            if to_row == mover_color.promotion_row() && origin == MoveOrigin::Local {
                record.set_promotion(true, None);
            }
            if was_first_move && (to_row - from_row).abs() == 2 {
                if let Some(pawn) = self.board.get_mut(to_row, to_col) {
                    let id = pawn.id;
                    pawn.set_en_passant(true);
                    self.en_passant = Some(id);
                }
            }
        }

        self.notify(&record);
        Some(record)
    }

    /// Moves the occupant of one square to another, updating its
    /// coordinates and clearing its first-move flag. Returns the id.
    fn relocate(&mut self, from_row: i8, from_col: i8, to_row: i8, to_col: i8) -> Option<PieceId> {
        let mut piece = self.board.take(from_row, from_col)?;
        piece.row = to_row;
        piece.col = to_col;
        piece.first_move = false;
        let id = piece.id;
        self.board.put(piece);
        Some(id)
    }

    fn clear_en_passant(&mut self) {
        if let Some(id) = self.en_passant.take() {
            if let Some(pawn) = self.board.piece_by_id_mut(id) {
                pawn.set_en_passant(false);
            }
        }
    }

    /// If the piece attacks the opposing king, adds it to that king's
    /// checked-by set. Entries are never removed here; the set is only
    /// rebuilt when the king itself moves.
    fn detect_checker(&mut self, attacker_id: PieceId, attacker_color: Color) {
        let attacking = {
            let attacker = match self.board.piece_by_id(attacker_id) {
                Some(p) => p,
                None => return,
            };
            match self.board.find_king(attacker_color.opponent()) {
                Some(king) => rules::attacks(&self.board, attacker, king.row, king.col),
                None => false,
            }
        };
        if attacking {
            if let Some(king) = self.board.find_king_mut(attacker_color.opponent()) {
                king.add_checked_by(attacker_id);
            }
        }
    }

    /// Full rebuild of a king's checked-by set against every enemy
    /// piece, run after the king itself has moved.
    fn recompute_checked_by(&mut self, color: Color) {
        let ids: Vec<PieceId> = {
            let king = match self.board.find_king(color) {
                Some(k) => k,
                None => return,
            };
            let (row, col) = (king.row, king.col);
            self.board
                .pieces()
                .filter(|p| p.color != color)
                .filter(|p| rules::attacks(&self.board, p, row, col))
                .map(|p| p.id)
                .collect()
        };
        if let Some(king) = self.board.find_king_mut(color) {
            king.set_checked_by(ids);
        }
    }

    // --- Promotion ---

    /// Replaces the piece at the square with a new piece of the
    /// requested kind, preserving color and position. Unknown kind
    /// names are rejected and logged.
    pub fn promote(&mut self, row: i8, col: i8, kind: &str) -> Option<Piece> {
        let template = match PROMOTION_KINDS.get(kind) {
            Some(k) => k.clone(),
            None => {
                log::error!("invalid promotion kind: {}", kind);
                return None;
            }
        };
        let color = match self.board.get(row, col) {
            Some(piece) => piece.color,
            None => {
                log::error!("no piece to promote at {}", square_name(row, col));
                return None;
            }
        };
        let piece = Piece::new(self.fresh_id(), template, color, row, col);
        self.board.put(piece.clone());
        Some(piece)
    }

    /// Inserts a piece received from the peer at its own recorded
    /// coordinates. The piece gets a fresh local id so it cannot
    /// collide with identities already on this board.
    pub fn add_piece(&mut self, mut piece: Piece) {
        piece.id = self.fresh_id();
        self.board.put(piece);
    }

    // --- Random-move selection ---

    /// Uniform-random pseudo-legal move for the given color, skipping
    /// pawn moves that would land on the promotion rank. This automaton
    /// never promotes.
    pub fn random_move<R: Rng>(&self, color: Color, rng: &mut R) -> Option<Move> {
        let mut moves: Vec<Move> = self
            .board
            .pieces()
            .filter(|p| p.color == color)
            .flat_map(|p| rules::pseudo_legal_moves(&self.board, p.row, p.col))
            .collect();
        moves.shuffle(rng);

        moves.into_iter().find(|m| {
            match self.board.get(m.from_row, m.from_col) {
                Some(p) => !(p.is_pawn() && m.to_row == color.promotion_row()),
                None => false,
            }
        })
    }

    // --- Full-state replacement and persistence ---

    /// Adopts another state wholesale (full-state synchronization or a
    /// loaded save). Observers registered on this instance survive.
    pub fn replace(&mut self, other: GameState) {
        self.board = other.board;
        self.en_passant = other.en_passant;
        self.my_turn = other.my_turn;
        self.next_piece_id = other.next_piece_id;
    }

    /// Snapshot for transmission to the peer.
    pub fn snapshot(&self) -> GameState {
        GameState {
            board: self.board.clone(),
            en_passant: self.en_passant,
            my_turn: self.my_turn,
            next_piece_id: self.next_piece_id,
            observers: Vec::new(),
        }
    }

    /// Writes the full state to `<name>.chess`.
    pub fn save(&self, name: &str) -> Result<(), SaveLoadError> {
        let path = format!("{}{}", name, SAVE_SUFFIX);
        let json = serde_json::to_string_pretty(self).map_err(SaveLoadError::Serialization)?;
        fs::write(&path, json).map_err(|e| SaveLoadError::Io(path.clone(), e))?;
        Ok(())
    }

    /// Loads `<name>.chess` and replaces this state with its contents.
    /// On any failure the in-memory state is left untouched.
    pub fn load(&mut self, name: &str) -> Result<(), SaveLoadError> {
        let path = format!("{}{}", name, SAVE_SUFFIX);
        let data = fs::read_to_string(&path).map_err(|e| SaveLoadError::Io(path.clone(), e))?;
        let loaded: GameState =
            serde_json::from_str(&data).map_err(SaveLoadError::Serialization)?;
        self.replace(loaded);
        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        GameState::new()
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.board)
    }
}

// --- Errors ---

#[derive(Debug)]
pub enum SaveLoadError {
    Serialization(serde_json::Error),
    Io(String, io::Error),
}

impl fmt::Display for SaveLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveLoadError::Serialization(e) => write!(f, "serialization error: {}", e),
            SaveLoadError::Io(file, e) => write!(f, "I/O error with file '{}': {}", file, e),
        }
    }
}

impl Error for SaveLoadError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::parse_square;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mv(state: &mut GameState, from: &str, to: &str) -> Move {
        let (fr, fc) = parse_square(from).unwrap();
        let (tr, tc) = parse_square(to).unwrap();
        state
            .apply_move(fr, fc, tr, tc, MoveOrigin::Local)
            .unwrap_or_else(|| panic!("move {}{} rejected", from, to))
    }

    fn ep_flag_count(state: &GameState) -> usize {
        state
            .board()
            .pieces()
            .filter(|p| p.en_passant_flag())
            .count()
    }

    #[test]
    fn illegal_move_is_silently_rejected() {
        let mut state = GameState::new();
        let before = state.board().clone();
        assert!(state.apply_move(1, 4, 4, 4, MoveOrigin::Local).is_none());
        assert!(state.apply_move(3, 3, 4, 3, MoveOrigin::Local).is_none());
        assert_eq!(state.board(), &before);
    }

    #[test]
    fn normal_move_relocates_the_mover() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        assert!(state.piece_at(1, 4).is_none());
        let pawn = state.piece_at(3, 4).expect("pawn on e4");
        assert!(pawn.is_pawn());
        assert!(!pawn.first_move);
    }

    #[test]
    fn double_step_sets_single_en_passant_marker() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        assert_eq!(ep_flag_count(&state), 1);
        assert_eq!(
            state.en_passant_pawn().map(|p| (p.row, p.col)),
            Some((3, 4))
        );
        // Cleared unconditionally by the next move.
        mv(&mut state, "a7", "a6");
        assert_eq!(ep_flag_count(&state), 0);
        assert!(state.en_passant_pawn().is_none());
        // A single step never sets the marker.
        mv(&mut state, "e4", "e5");
        assert_eq!(ep_flag_count(&state), 0);
    }

    #[test]
    fn en_passant_capture_removes_bypassed_pawn() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        mv(&mut state, "a7", "a6");
        mv(&mut state, "e4", "e5");
        mv(&mut state, "d7", "d5");
        mv(&mut state, "e5", "d6");
        assert!(state.piece_at(4, 3).is_none(), "d5 pawn captured");
        assert!(state.piece_at(4, 4).is_none(), "e5 vacated");
        let pawn = state.piece_at(5, 3).expect("pawn on d6");
        assert!(pawn.is_pawn());
        assert_eq!(pawn.color, Color::White);
    }

    #[test]
    fn kingside_castle_places_king_and_rook() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        mv(&mut state, "c7", "c5");
        mv(&mut state, "g1", "f3");
        mv(&mut state, "d7", "d6");
        mv(&mut state, "f1", "b5");
        mv(&mut state, "b8", "c6");
        mv(&mut state, "e1", "g1");
        let king = state.piece_at(0, 6).expect("king on g1");
        assert!(king.is_king());
        assert!(!king.first_move);
        let rook = state.piece_at(0, 5).expect("rook on f1");
        assert!(rook.is_rook());
        assert!(!rook.first_move);
        assert!(state.piece_at(0, 4).is_none());
        assert!(state.piece_at(0, 7).is_none());
    }

    #[test]
    fn check_is_recorded_and_only_cleared_by_king_move() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        mv(&mut state, "f7", "f6");
        mv(&mut state, "d1", "h5");
        assert!(state.is_checked(Color::Black));
        assert!(!state.is_checked(Color::White));
        // Blocking the line does not clear the set; entries are add-only.
        mv(&mut state, "g7", "g6");
        assert!(state.is_checked(Color::Black));
        // The king moving rebuilds its set from scratch.
        mv(&mut state, "e8", "f7");
        assert!(!state.is_checked(Color::Black));
    }

    #[test]
    fn king_capture_ends_the_game() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        mv(&mut state, "f7", "f6");
        mv(&mut state, "d1", "h5");
        assert!(!state.is_game_over());
        // The checked side ignores the threat; the queen takes the king.
        mv(&mut state, "a7", "a6");
        mv(&mut state, "h5", "e8");
        assert!(state.is_game_over());
        assert!(state.is_winner(Color::White));
        assert!(!state.is_winner(Color::Black));
        assert!(!state.is_checked(Color::Black));
    }

    #[test]
    fn promotion_flagged_for_local_origin_only() {
        let mut state = GameState::new();
        let mut pawn = Piece::new(0, PieceKind::Pawn { en_passant: false }, Color::White, 6, 1);
        pawn.first_move = false;
        state.add_piece(pawn);
        let record = state
            .apply_move(6, 1, 7, 0, MoveOrigin::Local)
            .expect("capture into back rank");
        assert!(record.is_promotion);

        let mut replayed = GameState::new();
        let mut pawn = Piece::new(0, PieceKind::Pawn { en_passant: false }, Color::White, 6, 1);
        pawn.first_move = false;
        replayed.add_piece(pawn);
        let record = replayed
            .apply_move(6, 1, 7, 0, MoveOrigin::Replay)
            .expect("capture into back rank");
        assert!(!record.is_promotion);
    }

    #[test]
    fn promote_replaces_pawn_with_chosen_kind() {
        let mut state = GameState::new();
        let mut pawn = Piece::new(0, PieceKind::Pawn { en_passant: false }, Color::White, 6, 1);
        pawn.first_move = false;
        state.add_piece(pawn);
        state.apply_move(6, 1, 7, 0, MoveOrigin::Local).unwrap();

        let piece = state.promote(7, 0, "Queen").expect("promotion applied");
        assert_eq!(piece.kind, PieceKind::Queen);
        assert_eq!(piece.color, Color::White);
        let on_board = state.piece_at(7, 0).unwrap();
        assert_eq!(on_board.kind, PieceKind::Queen);

        // Unknown kinds are rejected without touching the board.
        assert!(state.promote(7, 0, "Duke").is_none());
        assert_eq!(state.piece_at(7, 0).unwrap().kind, PieceKind::Queen);
    }

    #[test]
    fn random_move_skips_promoting_pawns() {
        let mut rng = StdRng::seed_from_u64(7);
        let state = GameState::new();
        for _ in 0..20 {
            let m = state.random_move(Color::White, &mut rng).expect("a move");
            let mover = state.piece_at(m.from_row, m.from_col).expect("mover");
            assert_eq!(mover.color, Color::White);
        }

        // A lone pawn one step from promotion has no eligible move.
        let mut cornered = GameState::new();
        let bare = GameState {
            board: Board::empty(),
            en_passant: None,
            my_turn: false,
            next_piece_id: 0,
            observers: Vec::new(),
        };
        cornered.replace(bare);
        let mut pawn = Piece::new(0, PieceKind::Pawn { en_passant: false }, Color::White, 6, 0);
        pawn.first_move = false;
        cornered.add_piece(pawn);
        assert!(cornered.random_move(Color::White, &mut rng).is_none());
    }

    #[test]
    fn observers_receive_applied_moves_only() {
        let mut state = GameState::new();
        let rx = state.subscribe();
        mv(&mut state, "e2", "e4");
        let record = rx.try_recv().expect("move emitted");
        assert_eq!((record.from_row, record.from_col), (1, 4));
        assert_eq!((record.to_row, record.to_col), (3, 4));
        // Rejected move emits nothing.
        state.apply_move(1, 0, 4, 0, MoveOrigin::Local);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn save_load_round_trip() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        mv(&mut state, "d7", "d5");
        let name = std::env::temp_dir().join(format!("netchess_roundtrip_{}", std::process::id()));
        let name = name.to_str().unwrap().to_string();
        state.save(&name).expect("save");

        let mut restored = GameState::new();
        restored.load(&name).expect("load");
        assert_eq!(restored.board(), state.board());
        assert_eq!(
            restored.en_passant_pawn().map(|p| p.id),
            state.en_passant_pawn().map(|p| p.id)
        );

        let _ = fs::remove_file(format!("{}{}", name, SAVE_SUFFIX));
    }

    #[test]
    fn load_failure_leaves_state_untouched() {
        let mut state = GameState::new();
        mv(&mut state, "e2", "e4");
        let before = state.board().clone();
        assert!(state.load("/nonexistent/netchess_missing").is_err());
        assert_eq!(state.board(), &before);
    }
}
