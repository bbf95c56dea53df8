//! DCG game bodies (.dcg)
//!
//! ## Layout of one encoded game
//! ```text
//! [size field]                 bytes that follow, see `length`
//! 0x00                         standard initial position
//!   | 0x01 [size][FEN bytes]   custom starting position
//! [NAG block][comment block]   annotations on the root, optional
//! stream...
//! ```
//! The stream walks the tree mainline first. At every node the mainline child
//! is written inline; each sideline child follows as
//! `START [move][NAGs][comment] ...its own subtree... END`, and only then does
//! the mainline continue with the mainline child's subtree.
//!
//! NAG block: `NAG [count] [code]*`. Comment block: `COMMENT [len] [utf-8]`.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::trace;

use super::length::{append_length, prepend_length, read_length};
use super::moves::{
    describe_packed, resolve_move, write_move, COMMENT, END_VARIATION, MOVE_BYTE_LIMIT, NAG, NULL_MOVE,
    START_VARIATION,
};
use super::{check_magic, MAGIC_LEN};
use crate::error::{Error, Result};
use crate::pgn::game::{Game, GameNode, NodeId, ROOT};

pub const GAMES_MAGIC: &[u8; MAGIC_LEN] = b"SimpleCDbg";

const STANDARD_POSITION: u8 = 0x00;
const CUSTOM_POSITION: u8 = 0x01;

enum Step {
    /// Emit the children of a node that is already written
    Children(NodeId),
    /// Open a sideline and write its first node
    Sideline(NodeId),
    End,
}

fn write_annotations(buf: &mut Vec<u8>, node: &GameNode) -> Result<()> {
    if !node.nags().is_empty() {
        buf.push(NAG);
        append_length(buf, node.nags().len())?;
        buf.extend_from_slice(node.nags());
    }
    if !node.comment().is_empty() {
        buf.push(COMMENT);
        append_length(buf, node.comment().len())?;
        buf.extend_from_slice(node.comment().as_bytes());
    }
    Ok(())
}

fn write_node(buf: &mut Vec<u8>, node: &GameNode) -> Result<()> {
    if let Some(game_move) = node.game_move() {
        write_move(buf, game_move)?;
    }
    write_annotations(buf, node)
}

/// Encode a game into one self-delimiting DCG body
pub fn encode_game(game: &Game) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    if game.starts_from_initial_position() {
        buf.push(STANDARD_POSITION);
    } else {
        let fen = game.starting_fen();
        buf.push(CUSTOM_POSITION);
        append_length(&mut buf, fen.len())?;
        buf.extend_from_slice(fen.as_bytes());
    }
    write_annotations(&mut buf, game.node(ROOT))?;

    let mut steps = vec![Step::Children(ROOT)];
    while let Some(step) = steps.pop() {
        match step {
            Step::Children(id) => {
                let Some((&main, sidelines)) = game.variations(id).split_first() else {
                    continue;
                };
                write_node(&mut buf, game.node(main))?;
                // pushed in reverse: sidelines close before the mainline goes on
                steps.push(Step::Children(main));
                for &side in sidelines.iter().rev() {
                    steps.push(Step::End);
                    steps.push(Step::Children(side));
                    steps.push(Step::Sideline(side));
                }
            }
            Step::Sideline(id) => {
                buf.push(START_VARIATION);
                write_node(&mut buf, game.node(id))?;
            }
            Step::End => buf.push(END_VARIATION),
        }
    }

    prepend_length(&mut buf)?;
    Ok(buf)
}

/// Read a size-prefixed block of raw bytes starting at `*pos`
fn read_block<'a>(data: &'a [u8], pos: &mut usize, what: &str) -> Result<&'a [u8]> {
    let start = *pos;
    let len = read_length(data, pos)?;
    let block = data
        .get(*pos..*pos + len)
        .ok_or_else(|| Error::decode(start, format!("truncated {}", what)))?;
    *pos += len;
    Ok(block)
}

/// Decode one DCG body produced by [`encode_game`].
///
/// The returned game carries no tags; those live in the index and
/// dictionaries.
pub fn decode_game(data: &[u8]) -> Result<Game> {
    let mut pos = 0;
    let declared = read_length(data, &mut pos)?;
    let body_start = pos;
    let available = data.len() - body_start;
    if available < declared {
        return Err(Error::decode(
            data.len(),
            format!("truncated game: {} of {} bytes present", available, declared),
        ));
    }
    if available > declared {
        return Err(Error::decode(
            body_start + declared,
            format!("{} trailing bytes after game", available - declared),
        ));
    }

    let header = pos;
    let mut game = match data.get(pos) {
        Some(&STANDARD_POSITION) => {
            pos += 1;
            Game::new()
        }
        Some(&CUSTOM_POSITION) => {
            pos += 1;
            let fen_bytes = read_block(data, &mut pos, "FEN")?;
            let fen = std::str::from_utf8(fen_bytes)
                .map_err(|_| Error::decode(header, "FEN is not valid UTF-8"))?;
            Game::from_fen(fen).map_err(|e| Error::decode(header, e.to_string()))?
        }
        Some(&other) => {
            return Err(Error::decode(pos, format!("unknown position header 0x{:02X}", other)));
        }
        None => return Err(Error::decode(pos, "missing position header")),
    };

    let mut current = ROOT;
    let mut stack: Vec<NodeId> = Vec::new();

    while pos < data.len() {
        let at = pos;
        let byte = data[pos];
        match byte {
            b if b < MOVE_BYTE_LIMIT => {
                let bytes = data
                    .get(pos..pos + 2)
                    .ok_or_else(|| Error::decode(at, "truncated move"))?;
                let packed = u16::from_be_bytes([bytes[0], bytes[1]]);
                let m = resolve_move(game.node(current).position(), packed).ok_or_else(|| {
                    Error::decode(at, format!("no legal move {} in this position", describe_packed(packed)))
                })?;
                current = game.play_move(current, m);
                pos += 2;
            }
            NULL_MOVE => {
                current = game
                    .play_null(current)
                    .map_err(|e| Error::decode(at, e.to_string()))?;
                pos += 1;
            }
            START_VARIATION => {
                let parent = game
                    .parent(current)
                    .ok_or_else(|| Error::decode(at, "variation start before any move"))?;
                stack.push(current);
                current = parent;
                pos += 1;
            }
            END_VARIATION => {
                current = stack
                    .pop()
                    .ok_or_else(|| Error::decode(at, "variation end without a start"))?;
                pos += 1;
            }
            NAG => {
                pos += 1;
                let nags = read_block(data, &mut pos, "NAG block")?;
                let node = game.node_mut(current);
                for &nag in nags {
                    node.add_nag(nag);
                }
            }
            COMMENT => {
                pos += 1;
                let text = read_block(data, &mut pos, "comment")?;
                let text = std::str::from_utf8(text)
                    .map_err(|_| Error::decode(at, "comment is not valid UTF-8"))?;
                game.node_mut(current).append_comment(text);
            }
            other => {
                return Err(Error::decode(at, format!("unknown marker 0x{:02X}", other)));
            }
        }
    }

    if !stack.is_empty() {
        return Err(Error::decode(
            data.len(),
            format!("{} unterminated variation(s)", stack.len()),
        ));
    }
    trace!(bytes = data.len(), nodes = game.node_count(), "decoded game");
    Ok(game)
}

/// Read access to a .dcg games file
pub struct GameFile {
    reader: BufReader<File>,
    path: PathBuf,
}

impl GameFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        check_magic(&mut reader, &path, GAMES_MAGIC)?;
        Ok(GameFile { reader, path })
    }

    /// Raw encoded bytes (size field included) of the game stored at `offset`
    pub fn game_data(&mut self, offset: u64) -> Result<Vec<u8>> {
        if offset < MAGIC_LEN as u64 {
            return Err(Error::invalid_database(
                &self.path,
                format!("game offset {} points into the magic marker", offset),
            ));
        }
        self.reader.seek(SeekFrom::Start(offset))?;

        let mut data = vec![0u8; 1];
        self.reader.read_exact(&mut data)?;
        let width = match data[0] {
            0x00..=0x7F => 0,
            0x81..=0x84 => (data[0] - 0x80) as usize,
            other => {
                return Err(Error::invalid_database(
                    &self.path,
                    format!("invalid size class 0x{:02X} at offset {}", other, offset),
                ));
            }
        };
        data.resize(1 + width, 0);
        self.reader.read_exact(&mut data[1..])?;

        let mut pos = 0;
        let len = read_length(&data, &mut pos)?;
        data.resize(pos + len, 0);
        self.reader.read_exact(&mut data[pos..])?;
        Ok(data)
    }

    pub fn read_game(&mut self, offset: u64) -> Result<Game> {
        let data = self.game_data(offset)?;
        decode_game(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pgn::reader::PgnReader;

    fn parse(movetext: &str) -> Game {
        PgnReader::from_text(movetext).read_game(0).unwrap()
    }

    fn round_trip(game: &Game) -> Game {
        let bytes = encode_game(game).unwrap();
        decode_game(&bytes).unwrap()
    }

    #[test]
    fn test_empty_game_encoding() {
        let bytes = encode_game(&Game::new()).unwrap();
        assert_eq!(bytes, vec![0x01, STANDARD_POSITION]);
    }

    #[test]
    fn test_mainline_layout() {
        let bytes = encode_game(&parse("1. e4 e5 *\n")).unwrap();
        // e2e4 = 0x031C, e7e5 = 0x0D24
        assert_eq!(bytes, vec![0x05, 0x00, 0x03, 0x1C, 0x0D, 0x24]);
    }

    #[test]
    fn test_sideline_layout() {
        let bytes = encode_game(&parse("1. e4 (1. d4 d5) e5 *\n")).unwrap();
        let expected = vec![
            0x0B, 0x00, // size, standard position
            0x03, 0x1C, // e4
            START_VARIATION, 0x02, 0xDB, // d2d4
            0x0C, 0xE3, // d7d5
            END_VARIATION,
            0x0D, 0x24, // e5
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_sideline_round_trip() {
        let game = parse("1. e4 (1. d4 d5) e5 *\n");
        let decoded = round_trip(&game);
        assert!(decoded.same_tree(&game));

        let root_children = decoded.variations(ROOT);
        assert_eq!(root_children.len(), 2);
        assert_eq!(decoded.variations(root_children[1]).len(), 1);
    }

    #[test]
    fn test_annotations_and_nesting_round_trip() {
        let game = parse(
            "{Prelude} $10 1. e4! {King pawn} e5 (1... c5 $14 2. Nf3 (2. c3 d5 {French-like}) 2... d6) \
             (1... e6?!) 2. Nf3 Nc6 3. Bb5 -- 4. Ba4 Nf6 *\n",
        );
        assert!(round_trip(&game).same_tree(&game));
    }

    #[test]
    fn test_custom_position_round_trip() {
        let fen = "r3k2r/pppq1ppp/8/8/8/8/PPPQ1PPP/R3K2R w KQkq - 4 12";
        let game = parse(&format!("[FEN \"{}\"]\n\n12. O-O-O O-O 13. Qxd7 *\n", fen));
        let bytes = encode_game(&game).unwrap();
        assert_eq!(bytes[1], CUSTOM_POSITION);

        let decoded = decode_game(&bytes).unwrap();
        assert_eq!(decoded.starting_fen(), fen);
        assert!(decoded.same_tree(&game));
    }

    #[test]
    fn test_multibyte_comment_round_trip() {
        let game = parse("1. e4 {Schönes Zentrum, très bien} *\n");
        assert!(round_trip(&game).same_tree(&game));
    }

    #[test]
    fn test_long_game_uses_wider_size_field() {
        let mut text = String::new();
        for _ in 0..20 {
            text.push_str("Nf3 Nf6 Ng1 Ng8 ");
        }
        text.push('*');
        let game = parse(&text);
        let bytes = encode_game(&game).unwrap();
        assert_eq!(bytes[0], 0x81);
        assert!(round_trip(&game).same_tree(&game));
    }

    #[test]
    fn test_decode_rejects_unknown_marker() {
        let data = vec![0x03, 0x00, 0x99, 0x00];
        match decode_game(&data) {
            Err(Error::Decode { offset, message }) => {
                assert_eq!(offset, 2);
                assert!(message.contains("0x99"));
            }
            other => panic!("expected decode error, got {:?}", other.map(|g| g.node_count())),
        }
    }

    #[test]
    fn test_decode_rejects_truncation_and_trailing_bytes() {
        let bytes = encode_game(&parse("1. e4 e5 *\n")).unwrap();
        assert!(matches!(
            decode_game(&bytes[..bytes.len() - 1]),
            Err(Error::Decode { .. })
        ));

        let mut longer = bytes.clone();
        longer.push(0x00);
        assert!(matches!(decode_game(&longer), Err(Error::Decode { offset: 6, .. })));
    }

    #[test]
    fn test_decode_rejects_split_move() {
        // size says 2 bytes: header plus half a move
        assert!(matches!(decode_game(&[0x02, 0x00, 0x03]), Err(Error::Decode { offset: 2, .. })));
    }

    #[test]
    fn test_decode_rejects_unbalanced_variations() {
        let open = vec![0x04, 0x00, 0x03, 0x1C, START_VARIATION];
        assert!(matches!(decode_game(&open), Err(Error::Decode { .. })));

        let close = vec![0x04, 0x00, 0x03, 0x1C, END_VARIATION];
        assert!(matches!(decode_game(&close), Err(Error::Decode { offset: 4, .. })));

        let at_root = vec![0x02, 0x00, START_VARIATION];
        assert!(matches!(decode_game(&at_root), Err(Error::Decode { offset: 2, .. })));
    }

    #[test]
    fn test_decode_rejects_illegal_move() {
        // e2e5
        let data = vec![0x03, 0x00, 0x03, 0x24];
        assert!(matches!(decode_game(&data), Err(Error::Decode { offset: 2, .. })));
    }
}
