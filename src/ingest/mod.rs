//! Bulletin acquisition and parsing.
//!
//! Submodules:
//! - `source`: HTTP retrieval of BOM product files.
//! - `fetch_cache`: per-run, single-flight document cache.
//! - `bom`: observation and précis forecast XML parsers.

pub mod bom;
pub mod fetch_cache;
pub mod source;

pub use fetch_cache::FetchCache;
pub use source::{BulletinSource, HttpBulletinSource};
