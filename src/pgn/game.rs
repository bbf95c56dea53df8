use std::collections::HashMap;

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, FromSetup, Move, Position};

use crate::error::{Error, Result};

/// FEN of the standard initial position
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Index of a node inside its game's arena
pub type NodeId = usize;

/// The root node always lives at index 0
pub const ROOT: NodeId = 0;

/// Shorthand glyphs and their NAG codes
pub const NAG_GOOD_MOVE: u8 = 1;
pub const NAG_MISTAKE: u8 = 2;
pub const NAG_BRILLIANT_MOVE: u8 = 3;
pub const NAG_BLUNDER: u8 = 4;
pub const NAG_SPECULATIVE_MOVE: u8 = 5;
pub const NAG_DUBIOUS_MOVE: u8 = 6;

/// The move that led to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameMove {
    /// Pass: side to move changes, nothing moves
    Null,
    Played(Move),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    #[default]
    Undefined,
}

impl GameResult {
    /// Parse one of the four PGN termination markers
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1-0" => Some(GameResult::WhiteWins),
            "0-1" => Some(GameResult::BlackWins),
            "1/2-1/2" => Some(GameResult::Draw),
            "*" => Some(GameResult::Undefined),
            _ => None,
        }
    }

    /// Result byte used by index records
    pub fn code(self) -> u8 {
        match self {
            GameResult::Undefined => 0,
            GameResult::WhiteWins => 1,
            GameResult::BlackWins => 2,
            GameResult::Draw => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::Undefined => "*",
        }
    }
}

/// One ply of a game tree.
///
/// Children are owned through `variations` (index 0 is the mainline
/// continuation); `parent` is a plain index back into the same arena.
#[derive(Debug, Clone)]
pub struct GameNode {
    game_move: Option<GameMove>,
    position: Chess,
    nags: Vec<u8>,
    comment: String,
    variations: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl GameNode {
    fn root(position: Chess) -> Self {
        GameNode {
            game_move: None,
            position,
            nags: Vec::new(),
            comment: String::new(),
            variations: Vec::new(),
            parent: None,
        }
    }

    /// `None` only for the root
    pub fn game_move(&self) -> Option<&GameMove> {
        self.game_move.as_ref()
    }

    /// Position after this node's move
    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn nags(&self) -> &[u8] {
        &self.nags
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn variations(&self) -> &[NodeId] {
        &self.variations
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn add_nag(&mut self, nag: u8) {
        self.nags.push(nag);
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Attach another comment, keeping any existing text on its own line
    pub fn append_comment(&mut self, comment: &str) {
        if self.comment.is_empty() {
            self.comment = comment.to_string();
        } else {
            self.comment.push('\n');
            self.comment.push_str(comment);
        }
    }
}

/// A parsed game: tag pairs, result and the move tree rooted at [`ROOT`]
#[derive(Debug, Clone)]
pub struct Game {
    nodes: Vec<GameNode>,
    pub tags: HashMap<String, String>,
    result: GameResult,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    /// Game starting from the standard initial position
    pub fn new() -> Self {
        Self::from_position(Chess::default())
    }

    pub fn from_position(position: Chess) -> Self {
        Game {
            nodes: vec![GameNode::root(position)],
            tags: HashMap::new(),
            result: GameResult::Undefined,
        }
    }

    /// Game starting from a custom position; inconsistent positions are rejected
    pub fn from_fen(fen: &str) -> Result<Self> {
        Ok(Self::from_position(position_from_fen(fen)?))
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn node(&self, id: NodeId) -> &GameNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GameNode {
        &mut self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn variations(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].variations
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn set_result(&mut self, result: GameResult) {
        self.result = result;
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|s| s.as_str())
    }

    /// Append a legal move as a new variation of `parent`; the first child becomes the mainline
    pub fn play_move(&mut self, parent: NodeId, m: Move) -> NodeId {
        let mut position = self.nodes[parent].position.clone();
        position.play_unchecked(m.clone());
        self.push_child(parent, GameMove::Played(m), position)
    }

    /// Append a null move as a new variation of `parent`
    pub fn play_null(&mut self, parent: NodeId) -> Result<NodeId> {
        let position = null_move_position(&self.nodes[parent].position)?;
        Ok(self.push_child(parent, GameMove::Null, position))
    }

    fn push_child(&mut self, parent: NodeId, game_move: GameMove, position: Chess) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(GameNode {
            game_move: Some(game_move),
            position,
            nags: Vec::new(),
            comment: String::new(),
            variations: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent].variations.push(id);
        id
    }

    /// Node ids along the main line, excluding the root
    pub fn mainline(&self) -> Vec<NodeId> {
        let mut line = Vec::new();
        let mut current = ROOT;
        while let Some(&next) = self.nodes[current].variations.first() {
            line.push(next);
            current = next;
        }
        line
    }

    pub fn starts_from_initial_position(&self) -> bool {
        self.starting_fen() == STARTING_FEN
    }

    pub fn starting_fen(&self) -> String {
        position_fen(&self.nodes[ROOT].position)
    }

    /// Same starting position and the same tree: moves, NAGs, comments and
    /// variation order. Tags and result are not compared.
    pub fn same_tree(&self, other: &Game) -> bool {
        if self.starting_fen() != other.starting_fen() {
            return false;
        }
        let mut pending = vec![(ROOT, ROOT)];
        while let Some((a, b)) = pending.pop() {
            let (a, b) = (&self.nodes[a], &other.nodes[b]);
            if a.game_move != b.game_move
                || a.nags != b.nags
                || a.comment != b.comment
                || a.variations.len() != b.variations.len()
            {
                return false;
            }
            pending.extend(a.variations.iter().copied().zip(b.variations.iter().copied()));
        }
        true
    }
}

pub fn position_fen(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal).to_string()
}

pub fn position_from_fen(fen: &str) -> Result<Chess> {
    let parsed = fen.trim().parse::<Fen>().map_err(|e| Error::Fen {
        fen: fen.to_string(),
        message: e.to_string(),
    })?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| Error::Fen {
            fen: fen.to_string(),
            message: e.to_string(),
        })
}

fn null_move_position(position: &Chess) -> Result<Chess> {
    let mut setup = position.to_setup(EnPassantMode::Legal);
    setup.turn = !setup.turn;
    setup.ep_square = None;
    Chess::from_setup(setup, CastlingMode::Standard).map_err(|e| Error::Fen {
        fen: position_fen(position),
        message: format!("null move not possible: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::san::San;

    fn san_move(game: &Game, node: NodeId, san: &str) -> Move {
        let san: San = san.parse().unwrap();
        san.to_move(game.node(node).position()).unwrap()
    }

    #[test]
    fn test_new_game_is_initial_position() {
        let game = Game::new();
        assert!(game.starts_from_initial_position());
        assert_eq!(game.node_count(), 1);
        assert!(game.node(ROOT).game_move().is_none());
        assert_eq!(game.result(), GameResult::Undefined);
    }

    #[test]
    fn test_first_child_is_mainline() {
        let mut game = Game::new();
        let e4 = san_move(&game, ROOT, "e4");
        let main = game.play_move(ROOT, e4);
        let d4 = san_move(&game, ROOT, "d4");
        let side = game.play_move(ROOT, d4);

        assert_eq!(game.variations(ROOT), &[main, side]);
        assert_eq!(game.parent(side), Some(ROOT));
        assert_eq!(game.mainline(), vec![main]);
    }

    #[test]
    fn test_null_move_swaps_turn() {
        let mut game = Game::new();
        let id = game.play_null(ROOT).unwrap();
        assert_eq!(game.node(id).game_move(), Some(&GameMove::Null));
        assert_eq!(
            position_fen(game.node(id).position()),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn test_from_fen_rejects_inconsistent_position() {
        // two white kings
        assert!(Game::from_fen("8/8/8/8/8/8/8/KK5k w - - 0 1").is_err());
        assert!(Game::from_fen("not a fen").is_err());
    }

    #[test]
    fn test_custom_position_is_not_initial() {
        let game = Game::from_fen("8/8/8/4k3/8/8/8/4K2R w K - 0 1").unwrap();
        assert!(!game.starts_from_initial_position());
    }

    #[test]
    fn test_append_comment_joins_with_newline() {
        let mut game = Game::new();
        game.node_mut(ROOT).append_comment("first");
        game.node_mut(ROOT).append_comment("second");
        assert_eq!(game.node(ROOT).comment(), "first\nsecond");
    }

    #[test]
    fn test_same_tree_sees_variation_order() {
        let mut a = Game::new();
        let mut b = Game::new();
        for (game, order) in [(&mut a, ["e4", "d4"]), (&mut b, ["d4", "e4"])] {
            for san in order {
                let m = san_move(game, ROOT, san);
                game.play_move(ROOT, m);
            }
        }
        assert!(a.same_tree(&a.clone()));
        assert!(!a.same_tree(&b));
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(GameResult::from_token("1-0").map(GameResult::code), Some(1));
        assert_eq!(GameResult::from_token("0-1").map(GameResult::code), Some(2));
        assert_eq!(GameResult::from_token("1/2-1/2").map(GameResult::code), Some(3));
        assert_eq!(GameResult::from_token("*").map(GameResult::code), Some(0));
        assert_eq!(GameResult::from_token("e4"), None);
    }
}
