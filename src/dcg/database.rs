use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::games::{encode_game, GameFile, GAMES_MAGIC};
use super::index::{IndexFile, IndexRecord, INDEX_MAGIC};
use super::names::{Dictionary, PendingEntries, NAMES_MAGIC, NO_MATCH, SITES_MAGIC};
use super::{check_magic, MAGIC_LEN};
use crate::error::{Error, Result};
use crate::pgn::game::{Game, GameResult};
use crate::pgn::reader::PgnReader;

/// The four files of one DCG database
///
/// - **base.dcg**: encoded game bodies
/// - **base.dci**: one 35 byte index record per game
/// - **base.dcn**: player name dictionary
/// - **base.dcs**: site dictionary
///
/// The suffix is appended to the base name, so `games.2024` becomes
/// `games.2024.dcg` and so on.
#[derive(Debug, Clone)]
pub struct DatabasePaths {
    pub games: PathBuf,
    pub index: PathBuf,
    pub names: PathBuf,
    pub sites: PathBuf,
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl DatabasePaths {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        DatabasePaths {
            games: with_suffix(base, ".dcg"),
            index: with_suffix(base, ".dci"),
            names: with_suffix(base, ".dcn"),
            sites: with_suffix(base, ".dcs"),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            self.games.as_path(),
            self.index.as_path(),
            self.names.as_path(),
            self.sites.as_path(),
        ]
    }
}

/// What to do with files already present at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Keep existing games and dictionary entries, add new ones at the end
    #[default]
    Append,
    /// Remove the four files before importing
    Overwrite,
}

/// What to do with a source game that cannot be parsed or encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the import with the error
    #[default]
    Abort,
    /// Log the error, leave the game out and continue
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    mode: OpenMode,
    error_policy: ErrorPolicy,
    max_games: Option<usize>,
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Only look at the first `max` games of the source
    pub fn with_max_games(mut self, max: usize) -> Self {
        self.max_games = Some(max);
        self
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn max_games(&self) -> Option<usize> {
        self.max_games
    }

    fn limit_reached(&self, seen: usize) -> bool {
        self.max_games.is_some_and(|max| seen >= max)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub games_written: usize,
    pub games_skipped: usize,
    pub names_added: usize,
    pub sites_added: usize,
}

/// Dictionary strings referenced by the games of one source file
#[derive(Debug, Default)]
struct ScanResult {
    names: PendingEntries,
    sites: PendingEntries,
    games: usize,
    skipped: usize,
}

fn tag<'a>(game: &'a Game, name: &str) -> &'a str {
    game.tag(name).unwrap_or("?")
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Open a games or index file for appending. Writes the magic into an empty
/// file, checks it in a non-empty one, and returns the current end offset.
fn open_for_append(path: &Path, magic: &[u8; MAGIC_LEN]) -> Result<(BufWriter<File>, u64)> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        file.write_all(magic)?;
        return Ok((BufWriter::new(file), MAGIC_LEN as u64));
    }
    file.rewind()?;
    check_magic(&mut file, path, magic)?;
    Ok((BufWriter::new(file), len))
}

/// Two-pass PGN import into a DCG database.
///
/// ## Passes
/// 1. Scan every game's tag section, collecting player names and sites the
///    dictionaries do not know yet.
/// 2. Append those strings to the .dcn / .dcs files so each has a permanent
///    offset.
/// 3. Scan again, read each game in full, encode it and append the index
///    record and the game body.
///
/// Index records hold dictionary offsets, not strings, which is why every
/// name has to be placed before the first record is written. The same
/// [`ErrorPolicy`] and game limit apply to both scans, so they visit the same
/// games. A game that only fails once its movetext is read (pass 3) may leave
/// its names behind in the dictionaries; no record ever points at a string
/// that is missing.
pub struct DatabaseWriter {
    paths: DatabasePaths,
    options: ImportOptions,
    names: Dictionary,
    sites: Dictionary,
}

impl DatabaseWriter {
    /// Open (or create) the database at `base`
    pub fn open<P: AsRef<Path>>(base: P, options: ImportOptions) -> Result<Self> {
        let paths = DatabasePaths::new(base);

        if options.mode == OpenMode::Overwrite {
            for path in paths.all() {
                remove_if_present(path)?;
            }
        }

        let names = Dictionary::open(&paths.names, NAMES_MAGIC)?;
        let sites = Dictionary::open(&paths.sites, SITES_MAGIC)?;
        info!(
            games = %paths.games.display(),
            names = names.len(),
            sites = sites.len(),
            mode = ?options.mode,
            "opened database"
        );

        Ok(DatabaseWriter {
            paths,
            options,
            names,
            sites,
        })
    }

    pub fn paths(&self) -> &DatabasePaths {
        &self.paths
    }

    pub fn names(&self) -> &Dictionary {
        &self.names
    }

    pub fn sites(&self) -> &Dictionary {
        &self.sites
    }

    /// Import every game of the PGN file at `source`
    pub fn import_pgn<P: AsRef<Path>>(&mut self, source: P) -> Result<ImportSummary> {
        let source = source.as_ref();
        info!(source = %source.display(), "importing");
        let mut reader = PgnReader::open(source)?;
        self.import(&mut reader)
    }

    /// Import from any seekable PGN reader
    pub fn import<R: BufRead + Seek>(&mut self, reader: &mut PgnReader<R>) -> Result<ImportSummary> {
        let mut scan = self.scan_headers(reader)?;
        info!(
            games = scan.games,
            skipped = scan.skipped,
            new_names = scan.names.len(),
            new_sites = scan.sites.len(),
            "scan pass finished"
        );

        let names_added = self.names.resolve(&mut scan.names)?;
        let sites_added = self.sites.resolve(&mut scan.sites)?;
        info!(names_added, sites_added, "dictionaries updated");

        let (games_written, games_skipped) = self.write_games(reader)?;
        let summary = ImportSummary {
            games_written,
            games_skipped,
            names_added,
            sites_added,
        };
        info!(?summary, "import finished");
        Ok(summary)
    }

    /// Handle a per-game failure according to the error policy
    fn on_game_error(&self, offset: u64, error: Error) -> Result<()> {
        if self.options.error_policy == ErrorPolicy::Skip && error.is_game_error() {
            warn!(offset, error = %error, "skipping game");
            Ok(())
        } else {
            Err(error)
        }
    }

    fn scan_headers<R: BufRead + Seek>(&self, reader: &mut PgnReader<R>) -> Result<ScanResult> {
        let mut scan = ScanResult::default();
        let mut cursor = 0u64;

        while !self.options.limit_reached(scan.games + scan.skipped) {
            let start = cursor;
            let header = match reader.read_next_header(&mut cursor) {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    self.on_game_error(start, e)?;
                    scan.skipped += 1;
                    continue;
                }
            };
            scan.games += 1;

            for name in [header.tag("White"), header.tag("Black")].into_iter().flatten() {
                if !self.names.contains(name) {
                    scan.names.insert(name);
                }
            }
            if let Some(site) = header.tag("Site") {
                if !self.sites.contains(site) {
                    scan.sites.insert(site);
                }
            }
        }
        Ok(scan)
    }

    fn lookup(dictionary: &Dictionary, kind: &'static str, value: &str) -> Result<u32> {
        match dictionary.lookup(value) {
            NO_MATCH => Err(Error::Unresolved {
                kind,
                value: value.to_string(),
            }),
            offset => Ok(offset),
        }
    }

    fn write_games<R: BufRead + Seek>(&self, reader: &mut PgnReader<R>) -> Result<(usize, usize)> {
        let (mut games_out, mut game_offset) = open_for_append(&self.paths.games, GAMES_MAGIC)?;
        let (mut index_out, _) = open_for_append(&self.paths.index, INDEX_MAGIC)?;

        let mut cursor = 0u64;
        let mut written = 0;
        let mut skipped = 0;

        while !self.options.limit_reached(written + skipped) {
            let start = cursor;
            let header = match reader.read_next_header(&mut cursor) {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    self.on_game_error(start, e)?;
                    skipped += 1;
                    continue;
                }
            };

            // encode fully before anything reaches disk
            let encoded = reader
                .read_game(header.offset)
                .and_then(|game| encode_game(&game).map(|body| (game, body)));
            let (game, body) = match encoded {
                Ok(encoded) => encoded,
                Err(e) => {
                    self.on_game_error(header.offset, e)?;
                    skipped += 1;
                    continue;
                }
            };

            let white = Self::lookup(&self.names, "player", tag(&game, "White"))?;
            let black = Self::lookup(&self.names, "player", tag(&game, "Black"))?;
            let site = Self::lookup(&self.sites, "site", tag(&game, "Site"))?;
            let record = IndexRecord::from_tags(&game.tags, game_offset, white, black, site);

            index_out.write_all(&record.to_bytes())?;
            games_out.write_all(&body)?;
            game_offset += body.len() as u64;
            written += 1;

            if written % 100 == 0 {
                debug!(written, "games written");
            }
        }

        games_out.flush()?;
        index_out.flush()?;
        Ok((written, skipped))
    }
}

/// Read side of a DCG database, mirroring what [`DatabaseWriter`] produces
pub struct DcgDatabase {
    index: IndexFile,
    names: Dictionary,
    sites: Dictionary,
    games: GameFile,
    paths: DatabasePaths,
}

impl DcgDatabase {
    /// Load a database from its base path (without suffix).
    /// The games and index files must exist; an absent dictionary is empty.
    pub fn load<P: AsRef<Path>>(base: P) -> Result<Self> {
        let paths = DatabasePaths::new(base);

        for (path, what) in [(&paths.index, "Index"), (&paths.games, "Game")] {
            if !path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} file not found: {}", what, path.display()),
                )
                .into());
            }
        }

        let index = IndexFile::load(&paths.index)?;
        let names = Dictionary::open(&paths.names, NAMES_MAGIC)?;
        let sites = Dictionary::open(&paths.sites, SITES_MAGIC)?;
        let games = GameFile::load(&paths.games)?;

        Ok(DcgDatabase {
            index,
            names,
            sites,
            games,
            paths,
        })
    }

    pub fn paths(&self) -> &DatabasePaths {
        &self.paths
    }

    pub fn num_games(&self) -> usize {
        self.index.num_games()
    }

    pub fn record(&self, game_id: usize) -> Option<&IndexRecord> {
        self.index.record(game_id)
    }

    pub fn records(&self) -> &[IndexRecord] {
        self.index.records()
    }

    pub fn player_name(&self, offset: u32) -> Option<&str> {
        self.names.get(offset)
    }

    pub fn site_name(&self, offset: u32) -> Option<&str> {
        self.sites.get(offset)
    }

    pub fn names(&self) -> &Dictionary {
        &self.names
    }

    pub fn sites(&self) -> &Dictionary {
        &self.sites
    }

    /// Decode game `game_id`, with the tags its index record can restore
    pub fn game(&mut self, game_id: usize) -> Result<Game> {
        let record = self
            .index
            .record(game_id)
            .cloned()
            .ok_or_else(|| Error::invalid_database(&self.paths.index, format!("no game {}", game_id)))?;

        let mut game = self.games.read_game(record.game_offset)?;
        let mut set_tag = |name: &str, value: String| {
            game.tags.insert(name.to_string(), value);
        };
        set_tag("White", self.names.get(record.white).unwrap_or("?").to_string());
        set_tag("Black", self.names.get(record.black).unwrap_or("?").to_string());
        set_tag("Site", self.sites.get(record.site).unwrap_or("?").to_string());
        set_tag("Date", record.date_string());
        set_tag("Result", record.result_string().to_string());
        if record.round != 0 {
            set_tag("Round", record.round.to_string());
        }
        if let Some(eco) = record.eco_string() {
            set_tag("ECO", eco.to_string());
        }
        game.set_result(GameResult::from_token(record.result_string()).unwrap_or_default());
        Ok(game)
    }
}
