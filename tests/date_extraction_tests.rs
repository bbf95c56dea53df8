//! Date Extraction Tests
//!
//! These tests validate how PGN `Date` tags end up in the year/month/day
//! fields of index records, against the five.pgn dataset and a set of
//! partial and malformed dates.

use std::fs;
use std::path::Path;

use pgn2dcg::dcg::index::{parse_date, IndexRecord};
use pgn2dcg::{DatabaseWriter, DcgDatabase, ImportOptions};
use tempfile::tempdir;

/// Import one game per date and return the decoded (year, month, day) fields
fn imported_dates(dates: &[&str]) -> Vec<(u16, u8, u8)> {
    let dir = tempdir().unwrap();
    let mut pgn = String::new();
    for (i, date) in dates.iter().enumerate() {
        pgn.push_str(&format!("[White \"Player {}\"]\n[Date \"{}\"]\n\n1. e4 *\n\n", i, date));
    }
    let source = dir.path().join("dates.pgn");
    fs::write(&source, pgn).unwrap();

    let base = dir.path().join("dates");
    DatabaseWriter::open(&base, ImportOptions::new())
        .and_then(|mut writer| writer.import_pgn(&source))
        .expect("Import failed");

    let db = DcgDatabase::load(&base).unwrap();
    db.records().iter().map(|r| (r.year, r.month, r.day)).collect()
}

/// Dates of the five.pgn dataset as stored in the index
#[test]
fn test_five_dataset_dates() {
    let pgn_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("test/data/five.pgn");
    let pgn_content = fs::read_to_string(&pgn_path).expect("Failed to read PGN test file");
    assert_eq!(pgn_content.matches("[Date \"").count(), 5, "five.pgn should hold 5 dated games");

    let dir = tempdir().unwrap();
    let base = dir.path().join("five");
    DatabaseWriter::open(&base, ImportOptions::new())
        .and_then(|mut writer| writer.import_pgn(&pgn_path))
        .expect("Import failed");

    let db = DcgDatabase::load(&base).unwrap();
    let dates: Vec<String> = db.records().iter().map(IndexRecord::date_string).collect();
    assert_eq!(
        dates,
        vec!["1960.03.15", "1961.??.??", "1962.05.07", "1963.04.21", "1964.??.??"]
    );
}

#[test]
fn test_complete_dates() {
    assert_eq!(
        imported_dates(&["2022.12.19", "1851.06.21", "2000.01.01"]),
        vec![(2022, 12, 19), (1851, 6, 21), (2000, 1, 1)]
    );
}

/// Unknown components are 0 but never make the record invalid
#[test]
fn test_partial_dates() {
    assert_eq!(
        imported_dates(&["2022.??.??", "2022.12.??", "????.??.??", "????.12.19"]),
        vec![(2022, 0, 0), (2022, 12, 0), (0, 0, 0), (0, 0, 0)]
    );
}

/// Components are only taken at their exact width
#[test]
fn test_malformed_dates() {
    assert_eq!(parse_date("22.12.19"), (0, 0, 0));
    assert_eq!(parse_date("2022.1.19"), (2022, 0, 0));
    assert_eq!(parse_date("2022.12.9"), (2022, 12, 0));
    assert_eq!(parse_date("2022-12-19"), (0, 0, 0));
    assert_eq!(parse_date("20221219"), (0, 0, 0));
    assert_eq!(parse_date("not a date"), (0, 0, 0));
}

/// Out of range values are dropped field by field
#[test]
fn test_out_of_range_components() {
    assert_eq!(
        imported_dates(&["2022.00.10", "2022.13.10", "2022.02.00", "2022.02.32"]),
        vec![(2022, 0, 10), (2022, 0, 10), (2022, 2, 0), (2022, 2, 0)]
    );
}

#[test]
fn test_missing_date_tag_uses_roster_default() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("undated.pgn");
    fs::write(&source, "[White \"Nobody\"]\n\n1. d4 *\n").unwrap();

    let base = dir.path().join("undated");
    DatabaseWriter::open(&base, ImportOptions::new())
        .and_then(|mut writer| writer.import_pgn(&source))
        .expect("Import failed");

    let db = DcgDatabase::load(&base).unwrap();
    let record = db.record(0).unwrap();
    assert_eq!((record.year, record.month, record.day), (0, 0, 0));
    assert_eq!(record.date_string(), "????.??.??");
}
