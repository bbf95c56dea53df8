use std::collections::HashMap;
use std::fs;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;

use super::MAGIC_LEN;
use crate::error::{Error, Result};
use crate::pgn::game::GameResult;

/// DCG .dci index file
///
/// ## Layout
/// A 10 byte magic (`SimpleCDbi`) followed by one fixed 35 byte record per
/// game, in import order. All integers are big-endian.
/// ```text
/// offset  size  field
///  0      1     status (always 0)
///  1      8     offset of the game body in the .dcg file
///  9      4     white name offset (.dcn)
/// 13      4     black name offset (.dcn)
/// 17      2     round
/// 19      4     site offset (.dcs)
/// 23      2     white Elo
/// 25      2     black Elo
/// 27      1     result (0 unknown, 1 white wins, 2 black wins, 3 draw)
/// 28      3     ECO code, zero filled when absent
/// 31      2     year
/// 33      1     month
/// 34      1     day
/// ```
/// Missing or malformed tags become zero fields; a record is always 35 bytes.
pub const INDEX_MAGIC: &[u8; MAGIC_LEN] = b"SimpleCDbi";

pub const RECORD_SIZE: usize = 35;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRecord {
    pub status: u8,
    pub game_offset: u64,
    pub white: u32,
    pub black: u32,
    pub round: u16,
    pub site: u32,
    pub white_elo: u16,
    pub black_elo: u16,
    pub result: u8,
    pub eco: [u8; 3],
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl IndexRecord {
    /// Build a record from a game's tags and its resolved dictionary offsets
    pub fn from_tags(
        tags: &HashMap<String, String>,
        game_offset: u64,
        white: u32,
        black: u32,
        site: u32,
    ) -> Self {
        let tag = |name: &str| tags.get(name).map(|s| s.as_str()).unwrap_or("");
        let (year, month, day) = parse_date(tag("Date"));

        IndexRecord {
            status: 0,
            game_offset,
            white,
            black,
            round: parse_number(tag("Round")),
            site,
            white_elo: parse_number(tag("WhiteElo")),
            black_elo: parse_number(tag("BlackElo")),
            result: parse_result(tag("Result")),
            eco: parse_eco(tag("ECO")),
            year,
            month,
            day,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0] = self.status;
        BigEndian::write_u64(&mut buf[1..9], self.game_offset);
        BigEndian::write_u32(&mut buf[9..13], self.white);
        BigEndian::write_u32(&mut buf[13..17], self.black);
        BigEndian::write_u16(&mut buf[17..19], self.round);
        BigEndian::write_u32(&mut buf[19..23], self.site);
        BigEndian::write_u16(&mut buf[23..25], self.white_elo);
        BigEndian::write_u16(&mut buf[25..27], self.black_elo);
        buf[27] = self.result;
        buf[28..31].copy_from_slice(&self.eco);
        BigEndian::write_u16(&mut buf[31..33], self.year);
        buf[33] = self.month;
        buf[34] = self.day;
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        IndexRecord {
            status: buf[0],
            game_offset: BigEndian::read_u64(&buf[1..9]),
            white: BigEndian::read_u32(&buf[9..13]),
            black: BigEndian::read_u32(&buf[13..17]),
            round: BigEndian::read_u16(&buf[17..19]),
            site: BigEndian::read_u32(&buf[19..23]),
            white_elo: BigEndian::read_u16(&buf[23..25]),
            black_elo: BigEndian::read_u16(&buf[25..27]),
            result: buf[27],
            eco: [buf[28], buf[29], buf[30]],
            year: BigEndian::read_u16(&buf[31..33]),
            month: buf[33],
            day: buf[34],
        }
    }

    /// Game result as a PGN result token
    pub fn result_string(&self) -> &'static str {
        match self.result {
            1 => "1-0",
            2 => "0-1",
            3 => "1/2-1/2",
            _ => "*",
        }
    }

    /// Date as YYYY.MM.DD with `?` for unknown components
    pub fn date_string(&self) -> String {
        let year = match self.year {
            0 => "????".to_string(),
            y => format!("{:04}", y),
        };
        let month = match self.month {
            0 => "??".to_string(),
            m => format!("{:02}", m),
        };
        let day = match self.day {
            0 => "??".to_string(),
            d => format!("{:02}", d),
        };
        format!("{}.{}.{}", year, month, day)
    }

    pub fn eco_string(&self) -> Option<&str> {
        if self.eco == [0; 3] {
            None
        } else {
            std::str::from_utf8(&self.eco).ok()
        }
    }
}

fn fixed_digits(part: Option<&str>, width: usize) -> Option<u16> {
    let part = part?;
    if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Split a PGN `YYYY.MM.DD` date into (year, month, day).
///
/// Each component is only taken when the ones before it had the exact
/// expected width; anything unknown or out of range is 0.
pub fn parse_date(date: &str) -> (u16, u8, u8) {
    let mut parts = date.trim().split('.');

    let Some(year) = fixed_digits(parts.next(), 4) else {
        return (0, 0, 0);
    };
    let Some(month) = fixed_digits(parts.next(), 2) else {
        return (year, 0, 0);
    };
    let day = fixed_digits(parts.next(), 2).filter(|d| (1..=31).contains(d)).unwrap_or(0);
    let month = if (1..=12).contains(&month) { month } else { 0 };

    (year, month as u8, day as u8)
}

/// Result byte for a PGN result token; unknown tokens map to 0
pub fn parse_result(token: &str) -> u8 {
    GameResult::from_token(token.trim())
        .map(GameResult::code)
        .unwrap_or(0)
}

/// Three ECO bytes, or zeros unless the tag is exactly three bytes long
pub fn parse_eco(eco: &str) -> [u8; 3] {
    match eco.trim().as_bytes() {
        &[a, b, c] => [a, b, c],
        _ => [0; 3],
    }
}

fn parse_number(value: &str) -> u16 {
    value.trim().parse().unwrap_or(0)
}

/// Read access to a .dci index file
pub struct IndexFile {
    records: Vec<IndexRecord>,
}

impl IndexFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;

        if data.len() < MAGIC_LEN || &data[..MAGIC_LEN] != INDEX_MAGIC {
            return Err(Error::invalid_database(path, "missing 'SimpleCDbi' magic"));
        }
        if (data.len() - MAGIC_LEN) % RECORD_SIZE != 0 {
            return Err(Error::invalid_database(
                path,
                format!("length {} is not the magic plus whole {} byte records", data.len(), RECORD_SIZE),
            ));
        }

        let records: Vec<IndexRecord> = data[MAGIC_LEN..]
            .chunks_exact(RECORD_SIZE)
            .filter_map(|chunk| <&[u8; RECORD_SIZE]>::try_from(chunk).ok())
            .map(IndexRecord::from_bytes)
            .collect();

        debug!(path = %path.display(), games = records.len(), "loaded index");
        Ok(IndexFile { records })
    }

    pub fn num_games(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, game_id: usize) -> Option<&IndexRecord> {
        self.records.get(game_id)
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }
}
