pub mod game;
pub mod reader;

pub use game::{Game, GameMove, GameNode, GameResult, NodeId, ROOT};
pub use reader::{HeaderRecord, PgnReader};
