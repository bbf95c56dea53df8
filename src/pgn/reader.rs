use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek, SeekFrom};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use shakmaty::san::SanPlus;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::pgn::game::{
    Game, GameResult, NodeId, NAG_BLUNDER, NAG_BRILLIANT_MOVE, NAG_DUBIOUS_MOVE, NAG_GOOD_MOVE,
    NAG_MISTAKE, NAG_SPECULATIVE_MOVE, ROOT,
};

/// `[TagName "TagValue"]`, value may contain `\"` and `\\`
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([A-Za-z0-9_]+)\s+"((?:[^"\\]|\\.)*)"\]"#).expect("tag pattern is valid")
});

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Seven tag roster values assumed before any tag of a game is read
const DEFAULT_TAGS: [(&str, &str); 7] = [
    ("Event", "?"),
    ("Site", "?"),
    ("Date", "????.??.??"),
    ("Round", "?"),
    ("White", "?"),
    ("Black", "?"),
    ("Result", "*"),
];

/// Characters that end a movetext word
const WORD_DELIMITERS: &str = "{}();$";

fn default_tags() -> HashMap<String, String> {
    DEFAULT_TAGS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Tag pairs of one line, and where movetext starts on it if it does
#[derive(Debug, PartialEq)]
struct TagLine {
    tags: Vec<(String, String)>,
    movetext: Option<usize>,
}

/// Parse a line holding one or more tag pairs, optionally followed by
/// movetext. `None` when the line does not open with a well formed tag pair
/// or ends in a broken one.
fn parse_tag_line(line: &str) -> Option<TagLine> {
    let mut tags = Vec::new();
    let mut end = 0;
    for caps in TAG_REGEX.captures_iter(line) {
        let whole = caps.get(0)?;
        if !line[end..whole.start()].trim().is_empty() {
            break;
        }
        tags.push((caps[1].to_string(), unescape_tag_value(&caps[2])));
        end = whole.end();
    }
    if tags.is_empty() {
        return None;
    }

    let rest = line[end..].trim_start();
    let movetext = match rest.chars().next() {
        None => None,
        Some('[') => return None,
        Some(_) => Some(line.len() - rest.len()),
    };
    Some(TagLine { tags, movetext })
}

/// One decoded source line
struct Line {
    /// Source byte offset of the first byte of `text`
    start: u64,
    text: String,
    latin1: bool,
}

impl Line {
    /// Source byte offset of the character at byte `index` of `text`
    fn offset_of(&self, index: usize) -> u64 {
        if self.latin1 {
            self.start + self.text[..index].chars().count() as u64
        } else {
            self.start + index as u64
        }
    }
}

/// Tag pairs of one game plus the byte offset of its first tag line.
///
/// Produced by the header scan without building a move tree.
#[derive(Debug, Clone)]
pub struct HeaderRecord {
    pub tags: HashMap<String, String>,
    pub offset: u64,
}

impl HeaderRecord {
    fn with_defaults(offset: u64) -> Self {
        HeaderRecord {
            tags: default_tags(),
            offset,
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|s| s.as_str())
    }
}

/// Line oriented PGN reader addressed by byte offsets into the source.
///
/// Offsets handed out by [`PgnReader::read_next_header`] can be fed back to
/// [`PgnReader::read_game`] on any reader over the same bytes.
pub struct PgnReader<R> {
    reader: R,
    pos: u64,
}

impl PgnReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl PgnReader<Cursor<Vec<u8>>> {
    pub fn from_text(text: &str) -> Self {
        Self::new(Cursor::new(text.as_bytes().to_vec()))
    }
}

impl<R: BufRead + Seek> PgnReader<R> {
    pub fn new(reader: R) -> Self {
        PgnReader { reader, pos: 0 }
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        if offset != self.pos {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        Ok(())
    }

    /// Next line without its terminator; `None` at end of input.
    /// Lines that are not UTF-8 are read as ISO 8859-1. A byte order mark at
    /// the start of the source is dropped.
    fn read_line(&mut self) -> Result<Option<Line>> {
        let mut start = self.pos;
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        if start == 0 && buf.starts_with(UTF8_BOM) {
            buf.drain(..UTF8_BOM.len());
            start = UTF8_BOM.len() as u64;
        }
        let (text, latin1) = match String::from_utf8(buf) {
            Ok(text) => (text, false),
            Err(e) => (e.into_bytes().into_iter().map(char::from).collect(), true),
        };
        Ok(Some(Line { start, text, latin1 }))
    }

    /// Scan the tag section of the next game at or after `*cursor`.
    ///
    /// Returns `Ok(None)` at end of input. On success `*cursor` points just
    /// past the tag section, where the next scan resumes. A malformed tag line
    /// is reported only after the rest of that tag section has been consumed,
    /// so the caller may skip the game and keep scanning.
    pub fn read_next_header(&mut self, cursor: &mut u64) -> Result<Option<HeaderRecord>> {
        self.seek_to(*cursor)?;

        let mut in_comment = false;
        let mut record: Option<HeaderRecord> = None;
        let mut malformed: Option<(u64, String)> = None;

        loop {
            let Some(line) = self.read_line()? else {
                *cursor = self.pos;
                break;
            };
            if line.text.starts_with('%') {
                *cursor = self.pos;
                continue;
            }
            if !in_comment && line.text.starts_with('[') {
                let header = record.get_or_insert_with(|| HeaderRecord::with_defaults(line.start));
                *cursor = self.pos;
                match parse_tag_line(&line.text) {
                    Some(TagLine { tags, movetext }) => {
                        header.tags.extend(tags);
                        if let Some(index) = movetext {
                            // movetext on the tag line; the next scan starts there
                            *cursor = line.offset_of(index);
                            break;
                        }
                    }
                    None => {
                        if malformed.is_none() {
                            malformed = Some((line.start, line.text));
                        }
                    }
                }
                continue;
            }
            if record.is_some() {
                // first movetext line; leave it for the next scan
                break;
            }
            in_comment = comment_state(in_comment, &line.text);
            *cursor = self.pos;
        }

        if let Some((offset, line)) = malformed {
            return Err(Error::parse(offset, format!("malformed tag line '{}'", line)));
        }
        Ok(record)
    }

    /// Parse the full game (tags and movetext) starting at `offset`
    pub fn read_game(&mut self, offset: u64) -> Result<Game> {
        self.seek_to(offset)?;

        let mut tags = default_tags();
        let mut seen_tags = false;
        let mut blank_after_tags = false;
        let mut first_movetext: Option<(u64, String)> = None;

        loop {
            let Some(line) = self.read_line()? else { break };
            if line.text.starts_with('%') {
                continue;
            }
            if line.text.trim().is_empty() {
                blank_after_tags = seen_tags;
                continue;
            }
            if line.text.starts_with('[') {
                if blank_after_tags {
                    // next game's tags: this one has no movetext
                    break;
                }
                let tag_line = parse_tag_line(&line.text).ok_or_else(|| {
                    Error::parse(line.start, format!("malformed tag line '{}'", line.text))
                })?;
                tags.extend(tag_line.tags);
                seen_tags = true;
                if let Some(index) = tag_line.movetext {
                    first_movetext = Some((line.offset_of(index), line.text[index..].to_string()));
                    break;
                }
                continue;
            }
            first_movetext = Some((line.start, line.text));
            break;
        }

        let mut game = match tags.get("FEN") {
            Some(fen) => Game::from_fen(fen)?,
            None => Game::new(),
        };
        game.tags = tags;

        let mut parser = MovetextParser::new(game);
        if let Some((start, text)) = first_movetext {
            parser.feed_line(start, &text)?;
            while !parser.finished {
                let Some(line) = self.read_line()? else { break };
                parser.feed_line(line.start, &line.text)?;
            }
        }
        let game = parser.finish();
        debug!(offset, nodes = game.node_count(), "read game");
        Ok(game)
    }
}

/// Whether a line leaves the scanner inside a brace comment
fn comment_state(in_comment: bool, line: &str) -> bool {
    if (!in_comment && line.contains('{')) || (in_comment && line.contains('}')) {
        line.rfind('{') > line.rfind('}')
    } else {
        in_comment
    }
}

fn glyph_nag(glyph: &str) -> Option<u8> {
    match glyph {
        "!" => Some(NAG_GOOD_MOVE),
        "?" => Some(NAG_MISTAKE),
        "!!" => Some(NAG_BRILLIANT_MOVE),
        "??" => Some(NAG_BLUNDER),
        "!?" => Some(NAG_SPECULATIVE_MOVE),
        "?!" => Some(NAG_DUBIOUS_MOVE),
        _ => None,
    }
}

/// Drop a leading move number such as `12.` or `12...`
fn strip_move_number(word: &str) -> &str {
    let digits = word.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || !word[digits..].starts_with('.') {
        return word;
    }
    word[digits..].trim_start_matches('.')
}

fn normalize_castling(san: &str) -> String {
    match san.trim_end_matches(['+', '#']) {
        "0-0" | "0-0-0" => san.replace('0', "O"),
        _ => san.to_string(),
    }
}

/// Builds the move tree from movetext, one line at a time
struct MovetextParser {
    game: Game,
    current: NodeId,
    stack: Vec<NodeId>,
    open_comment: Option<Vec<String>>,
    found_content: bool,
    finished: bool,
}

impl MovetextParser {
    fn new(game: Game) -> Self {
        MovetextParser {
            game,
            current: ROOT,
            stack: vec![ROOT],
            open_comment: None,
            found_content: false,
            finished: false,
        }
    }

    fn finish(mut self) -> Game {
        self.close_comment();
        self.game
    }

    fn feed_line(&mut self, line_start: u64, line: &str) -> Result<()> {
        let mut rest = line;
        let mut rest_start = 0;

        if let Some(pieces) = self.open_comment.as_mut() {
            if line.trim().is_empty() {
                // a blank line ends an unterminated comment
                self.close_comment();
                return Ok(());
            }
            match line.find('}') {
                Some(end) => {
                    pieces.push(line[..end].trim().to_string());
                    self.close_comment();
                    rest = &line[end + 1..];
                    rest_start = end + 1;
                }
                None => {
                    pieces.push(line.trim().to_string());
                    return Ok(());
                }
            }
        } else {
            if line.starts_with('%') {
                return Ok(());
            }
            if line.trim().is_empty() {
                if self.found_content {
                    self.finished = true;
                }
                return Ok(());
            }
            if line.starts_with('[') && parse_tag_line(line).is_some() {
                // tags of the following game
                self.finished = true;
                return Ok(());
            }
        }

        self.parse_tokens(line_start + rest_start as u64, rest)
    }

    fn close_comment(&mut self) {
        if let Some(pieces) = self.open_comment.take() {
            let text = pieces
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            self.game.node_mut(self.current).append_comment(&text);
        }
    }

    fn parse_tokens(&mut self, base: u64, text: &str) -> Result<()> {
        let bytes = text.as_bytes();
        let mut i = 0;

        while !self.finished {
            let Some(c) = text[i..].chars().next() else { break };
            let offset = base + i as u64;
            match c {
                c if c.is_whitespace() => i += c.len_utf8(),
                '{' => {
                    let body = &text[i + 1..];
                    match body.find('}') {
                        Some(end) => {
                            self.game.node_mut(self.current).append_comment(body[..end].trim());
                            i += end + 2;
                        }
                        None => {
                            self.open_comment = Some(vec![body.trim().to_string()]);
                            return Ok(());
                        }
                    }
                }
                ';' => {
                    self.game.node_mut(self.current).append_comment(text[i + 1..].trim());
                    return Ok(());
                }
                '(' => {
                    let parent = self
                        .game
                        .parent(self.current)
                        .ok_or_else(|| Error::parse(offset, "variation opened before any move"))?;
                    self.stack.push(self.current);
                    self.current = parent;
                    i += 1;
                }
                ')' => {
                    if self.stack.len() > 1 {
                        if let Some(node) = self.stack.pop() {
                            self.current = node;
                        }
                    }
                    i += 1;
                }
                '}' => {
                    trace!(offset, "stray closing brace");
                    i += 1;
                }
                '$' => {
                    let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
                    let nag = text[i + 1..i + 1 + digits]
                        .parse::<u8>()
                        .map_err(|_| Error::parse(offset, format!("invalid NAG '{}'", &text[i..i + 1 + digits])))?;
                    self.game.node_mut(self.current).add_nag(nag);
                    i += 1 + digits;
                }
                _ => {
                    let len = text[i..]
                        .find(|c: char| c.is_whitespace() || WORD_DELIMITERS.contains(c))
                        .unwrap_or(text.len() - i);
                    self.parse_word(offset, &text[i..i + len])?;
                    i += len;
                }
            }
        }
        Ok(())
    }

    fn parse_word(&mut self, offset: u64, word: &str) -> Result<()> {
        if let Some(result) = GameResult::from_token(word) {
            self.game.set_result(result);
            self.found_content = true;
            self.finished = true;
            return Ok(());
        }

        let word = strip_move_number(word);
        if word.is_empty() {
            return Ok(());
        }
        if let Some(nag) = glyph_nag(word) {
            self.game.node_mut(self.current).add_nag(nag);
            return Ok(());
        }

        let san_len = word.trim_end_matches(['!', '?']).len();
        let (san, glyph) = word.split_at(san_len);
        let suffix_nag = match glyph {
            "" => None,
            g => Some(glyph_nag(g).ok_or_else(|| Error::parse(offset, format!("unknown annotation '{}'", g)))?),
        };

        self.current = match san {
            "--" | "Z0" => self.game.play_null(self.current)?,
            _ => {
                let san = normalize_castling(san);
                let illegal = |message: String| Error::IllegalMove {
                    offset,
                    san: san.clone(),
                    message,
                };
                let san_plus: SanPlus = san.parse().map_err(|e: shakmaty::san::ParseSanError| illegal(e.to_string()))?;
                let m = san_plus
                    .san
                    .to_move(self.game.node(self.current).position())
                    .map_err(|e| illegal(e.to_string()))?;
                self.game.play_move(self.current, m)
            }
        };
        self.found_content = true;

        if let Some(nag) = suffix_nag {
            self.game.node_mut(self.current).add_nag(nag);
        }
        Ok(())
    }
}
