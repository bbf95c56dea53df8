//! DCG move encoding
//!
//! Every played move takes two big-endian bytes:
//! ```text
//! bits 0-5    destination square (a1 = 0 .. h8 = 63)
//! bits 6-11   origin square
//! bits 12-15  promotion piece (0 none, 2 knight, 3 bishop, 4 rook, 5 queen)
//! ```
//! The highest packed value is `0x5FFF`, so the first byte of a move is always
//! below `0x60`. Structural markers all live at `0x80` and above and can never
//! be confused with a move. Castling is stored as the king's own step
//! (e1g1, e8c8, ...).

use byteorder::{BigEndian, WriteBytesExt};
use shakmaty::{Chess, File, Move, Position, Role, Square};

use crate::error::Result;
use crate::pgn::game::GameMove;

pub const START_VARIATION: u8 = 0x84;
pub const END_VARIATION: u8 = 0x85;
pub const COMMENT: u8 = 0x86;
pub const NAG: u8 = 0x87;
pub const NULL_MOVE: u8 = 0x88;

/// First byte of any packed move is below this
pub const MOVE_BYTE_LIMIT: u8 = 0x60;

fn promotion_code(role: Option<Role>) -> u16 {
    match role {
        Some(Role::Knight) => 2,
        Some(Role::Bishop) => 3,
        Some(Role::Rook) => 4,
        Some(Role::Queen) => 5,
        _ => 0,
    }
}

fn king_destination(king: Square, rook: Square) -> Square {
    let file = if rook > king { File::G } else { File::C };
    Square::from_coords(file, king.rank())
}

/// Pack a move into its 16-bit form
pub fn pack_move(m: &Move) -> u16 {
    let (from, to) = match *m {
        Move::Castle { king, rook } => (king, king_destination(king, rook)),
        _ => (m.from().unwrap_or(m.to()), m.to()),
    };
    u16::from(to) | (u16::from(from) << 6) | (promotion_code(m.promotion()) << 12)
}

/// Human readable form of a packed move, e.g. `e7e8q`
pub fn describe_packed(packed: u16) -> String {
    let to = Square::new(u32::from(packed & 0x3F));
    let from = Square::new(u32::from((packed >> 6) & 0x3F));
    let promotion = match packed >> 12 {
        2 => "n",
        3 => "b",
        4 => "r",
        5 => "q",
        0 => "",
        _ => "?",
    };
    format!("{}{}{}", from, to, promotion)
}

/// Append the encoding of a node's move
pub fn write_move(buf: &mut Vec<u8>, game_move: &GameMove) -> Result<()> {
    match game_move {
        GameMove::Null => buf.push(NULL_MOVE),
        GameMove::Played(m) => buf.write_u16::<BigEndian>(pack_move(m))?,
    }
    Ok(())
}

/// Find the legal move in `position` whose packed form is `packed`
pub fn resolve_move(position: &Chess, packed: u16) -> Option<Move> {
    position
        .legal_moves()
        .into_iter()
        .find(|m| pack_move(m) == packed)
}
