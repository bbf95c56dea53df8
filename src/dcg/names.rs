use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::MAGIC_LEN;
use crate::error::{Error, Result};

/// DCG dictionary files (.dcn player names, .dcs sites)
///
/// ## Binary layout
/// ```text
/// magic         10 bytes   "SimpleCDbn" / "SimpleCDbs"
/// entry 0       36 bytes   UTF-8, space padded, at offset 10
/// entry 1       36 bytes   at offset 46
/// ...
/// ```
/// An entry is addressed by its absolute file offset, which is what index
/// records store. Offset 0 is never an entry (the magic lives there) and
/// doubles as the "not yet assigned" marker while an import is collecting
/// new strings. `0xFFFFFFFF` is the "no such entry" answer of a lookup.
///
/// ## Truncation
/// Strings longer than 36 bytes are cut at the last character boundary that
/// fits. Two strings that agree on their first 36 bytes therefore share one
/// entry. This is a limit of the format.
pub const NAMES_MAGIC: &[u8; MAGIC_LEN] = b"SimpleCDbn";
pub const SITES_MAGIC: &[u8; MAGIC_LEN] = b"SimpleCDbs";

pub const ENTRY_SIZE: usize = 36;

/// Offset of a string that has been seen but not written yet
pub const PENDING: u32 = 0;

/// Lookup miss
pub const NO_MATCH: u32 = 0xFFFF_FFFF;

/// Longest prefix of `value` that fits an entry without splitting a character
pub fn truncate_entry(value: &str) -> &str {
    if value.len() <= ENTRY_SIZE {
        return value;
    }
    let mut end = ENTRY_SIZE;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// The string a value is stored and looked up under
pub fn dictionary_key(value: &str) -> String {
    truncate_entry(value).trim_end_matches(' ').to_string()
}

fn pad_entry(key: &str) -> [u8; ENTRY_SIZE] {
    let mut entry = [b' '; ENTRY_SIZE];
    let bytes = truncate_entry(key).as_bytes();
    entry[..bytes.len()].copy_from_slice(bytes);
    entry
}

/// Strings collected during the scan pass that the dictionary does not hold yet.
///
/// Every key starts out at [`PENDING`] and receives its real offset from
/// [`Dictionary::resolve`].
#[derive(Debug, Default)]
pub struct PendingEntries {
    entries: BTreeMap<String, u32>,
}

impl PendingEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `value` unless it is already pending
    pub fn insert(&mut self, value: &str) {
        self.entries.entry(dictionary_key(value)).or_insert(PENDING);
    }

    pub fn get(&self, value: &str) -> Option<u32> {
        self.entries.get(&dictionary_key(value)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unresolved(&self) -> usize {
        self.entries.values().filter(|&&offset| offset == PENDING).count()
    }
}

/// One dictionary file plus its in-memory reverse index
#[derive(Debug)]
pub struct Dictionary {
    path: PathBuf,
    magic: &'static [u8; MAGIC_LEN],
    offsets: HashMap<String, u32>,
    entries: BTreeMap<u32, String>,
    file_len: u64,
}

impl Dictionary {
    /// Load every entry already on disk. A missing or empty file gives an
    /// empty dictionary; the magic is written with the first new entry.
    pub fn open<P: AsRef<Path>>(path: P, magic: &'static [u8; MAGIC_LEN]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut dictionary = Dictionary {
            path,
            magic,
            offsets: HashMap::new(),
            entries: BTreeMap::new(),
            file_len: data.len() as u64,
        };
        if data.is_empty() {
            return Ok(dictionary);
        }

        if data.len() < MAGIC_LEN || &data[..MAGIC_LEN] != magic {
            return Err(Error::invalid_database(
                &dictionary.path,
                format!("missing '{}' magic", String::from_utf8_lossy(magic)),
            ));
        }
        if (data.len() - MAGIC_LEN) % ENTRY_SIZE != 0 {
            return Err(Error::invalid_database(
                &dictionary.path,
                format!(
                    "length {} is not the magic plus whole {} byte entries",
                    data.len(),
                    ENTRY_SIZE
                ),
            ));
        }

        for (i, chunk) in data[MAGIC_LEN..].chunks_exact(ENTRY_SIZE).enumerate() {
            let offset = (MAGIC_LEN + i * ENTRY_SIZE) as u32;
            let value = String::from_utf8_lossy(chunk).trim_end_matches(' ').to_string();
            dictionary.offsets.entry(value.clone()).or_insert(offset);
            dictionary.entries.insert(offset, value);
        }
        debug!(
            path = %dictionary.path.display(),
            entries = dictionary.entries.len(),
            "loaded dictionary"
        );
        Ok(dictionary)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the entry for `value`, or [`NO_MATCH`]
    pub fn lookup(&self, value: &str) -> u32 {
        self.offsets
            .get(&dictionary_key(value))
            .copied()
            .unwrap_or(NO_MATCH)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.lookup(value) != NO_MATCH
    }

    /// Entry stored at `offset`, padding stripped
    pub fn get(&self, offset: u32) -> Option<&str> {
        self.entries.get(&offset).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append every pending entry of `pending` (in key order) and record the
    /// offsets it was given. Keys the dictionary already holds get their
    /// existing offset. Returns how many entries were written.
    pub fn resolve(&mut self, pending: &mut PendingEntries) -> Result<usize> {
        let mut bytes = Vec::new();
        let mut next = self.file_len.max(MAGIC_LEN as u64);
        let mut added = Vec::new();

        if self.file_len == 0 && pending.unresolved() > 0 {
            bytes.extend_from_slice(self.magic);
        }

        for (key, offset) in pending.entries.iter_mut() {
            if *offset != PENDING {
                continue;
            }
            if let Some(&existing) = self.offsets.get(key) {
                *offset = existing;
                continue;
            }
            let assigned = u32::try_from(next)
                .ok()
                .filter(|&o| o < NO_MATCH)
                .ok_or_else(|| Error::OffsetOverflow { path: self.path.clone() })?;
            bytes.extend_from_slice(&pad_entry(key));
            *offset = assigned;
            added.push((assigned, key.clone()));
            next += ENTRY_SIZE as u64;
        }

        if bytes.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        self.file_len += bytes.len() as u64;

        for (offset, key) in &added {
            debug!(path = %self.path.display(), offset, entry = %key, "dictionary entry added");
            self.offsets.insert(key.clone(), *offset);
            self.entries.insert(*offset, key.clone());
        }
        Ok(added.len())
    }
}
