// src/moves.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable record of a move. Also the unit of peer synchronization:
/// both engines replay the same coordinates independently.
///
/// Equality requires identical coordinates and identical promotion
/// fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Move {
    pub from_row: i8,
    pub from_col: i8,
    pub to_row: i8,
    pub to_col: i8,
    pub is_promotion: bool,
    /// Carried for wire-format completeness; nothing populates it in
    /// the current flow. The chosen kind reaches the peer as a piece
    /// message after the explicit promotion step.
    pub promoted_kind: Option<String>,
}

impl Move {
    pub fn new(from_row: i8, from_col: i8, to_row: i8, to_col: i8) -> Self {
        Move {
            from_row,
            from_col,
            to_row,
            to_col,
            is_promotion: false,
            promoted_kind: None,
        }
    }

    pub fn set_promotion(&mut self, flag: bool, kind: Option<String>) {
        self.is_promotion = flag;
        self.promoted_kind = kind;
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            square_name(self.from_row, self.from_col),
            square_name(self.to_row, self.to_col)
        )
    }
}

/// Converts coordinates to algebraic notation, e.g. (1, 4) -> "e2".
pub fn square_name(row: i8, col: i8) -> String {
    if !(0..8).contains(&row) || !(0..8).contains(&col) {
        return "??".to_string();
    }
    let file_char = (b'a' + col as u8) as char;
    let rank_char = (b'1' + row as u8) as char;
    format!("{}{}", file_char, rank_char)
}

/// Parses algebraic notation into coordinates, e.g. "e2" -> (1, 4).
pub fn parse_square(s: &str) -> Option<(i8, i8)> {
    let mut chars = s.chars();
    let file_char = chars.next()?;
    let rank_char = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let col = match file_char {
        'a'..='h' => file_char as i8 - 'a' as i8,
        _ => return None,
    };
    let row = match rank_char {
        '1'..='8' => rank_char as i8 - '1' as i8,
        _ => return None,
    };
    Some((row, col))
}
