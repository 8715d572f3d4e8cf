//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use arenadb::{Config, Database, RecordBuf, Schema};
use tempfile::TempDir;

pub const DATE_FIELD: u8 = 0;
pub const TITLE_FIELD: u8 = 1;

/// Route `tracing` output through the test harness (RUST_LOG=arenadb=debug)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// [date: ordered 4 bytes][title: raw 64 bytes]
pub fn article_schema() -> Schema {
    Schema::builder().ordered(4).raw(64).build().unwrap()
}

pub fn temp_db_path() -> (TempDir, PathBuf) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("articles.db");
    (temp_dir, path)
}

/// Article database with the date field indexed
pub fn setup_temp_db() -> (TempDir, Database) {
    setup_temp_db_with_config(Config::default())
}

pub fn setup_temp_db_with_config(config: Config) -> (TempDir, Database) {
    let (temp_dir, path) = temp_db_path();
    let mut db = Database::create_with_config(&path, article_schema(), config).unwrap();
    db.create_index(DATE_FIELD).unwrap();
    (temp_dir, db)
}

pub fn article(db: &Database, date: u64, title: &str) -> RecordBuf {
    let mut record = db.new_record();
    record
        .set_ordered(DATE_FIELD, date)
        .unwrap()
        .set_str(TITLE_FIELD, title)
        .unwrap();
    record
}

pub fn date_key(db: &Database, date: u64) -> Vec<u8> {
    db.schema().ordered_key(DATE_FIELD, date).unwrap()
}

pub fn title_key(title: &str) -> Vec<u8> {
    let mut key = vec![0u8; 64];
    key[..title.len()].copy_from_slice(title.as_bytes());
    key
}

/// Dates packed as YYYYMMDD, big-endian
pub const D1: u64 = 2020_01_01;
pub const D2: u64 = 2020_06_01;
pub const D3: u64 = 2021_01_01;
