//! PGN to DCG converter library
//!
//! Reads chess games from PGN text and stores them in a DCG database: four
//! files holding encoded move trees (.dcg), fixed-size index records (.dci)
//! and the player (.dcn) and site (.dcs) dictionaries the records point into.

pub mod dcg;
pub mod error;
pub mod pgn;

pub use dcg::{DatabaseWriter, DcgDatabase, ErrorPolicy, ImportOptions, ImportSummary, OpenMode};
pub use error::{Error, Result};
pub use pgn::{Game, PgnReader};
