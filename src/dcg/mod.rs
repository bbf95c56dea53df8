pub mod database;
pub mod games;
pub mod index;
pub mod length;
pub mod moves;
pub mod names;

use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

pub use database::{
    DatabasePaths, DatabaseWriter, DcgDatabase, ErrorPolicy, ImportOptions, ImportSummary, OpenMode,
};
pub use games::{decode_game, encode_game, GameFile};
pub use index::{IndexFile, IndexRecord};
pub use names::{Dictionary, PendingEntries};

/// Every DCG file starts with a 10 byte ASCII marker
pub const MAGIC_LEN: usize = 10;

/// Read and verify the magic marker at the start of a DCG file
pub(crate) fn check_magic<R: Read>(reader: &mut R, path: &Path, expected: &[u8; MAGIC_LEN]) -> Result<()> {
    let mut magic = [0u8; MAGIC_LEN];
    reader.read_exact(&mut magic).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::invalid_database(path, "file shorter than its magic marker"),
        _ => Error::Io(e),
    })?;
    if &magic != expected {
        return Err(Error::invalid_database(
            path,
            format!(
                "expected magic '{}', found {:02x?}",
                String::from_utf8_lossy(expected),
                magic
            ),
        ));
    }
    Ok(())
}
