//! Indexed random access and band cross-matching for flat-file lightcurve
//! archives.
//!
//! A raw file holds one sky field as `#` header blocks followed by epoch
//! rows. [`index::build_index`] scans it once and writes a catalog plus
//! identifier, partition-range and spatial indices next to it; a
//! [`reader::Reader`] opens those indices to read objects at byte offsets and
//! [`crossmatch::resolve_source`] groups same-position objects across bands.

pub mod config;
pub mod crossmatch;
pub mod error;
pub mod filename;
pub mod geom;
pub mod index;
pub mod kdtree;
pub mod lightcurve;
pub mod objects_list;
pub mod orchestrator;
pub mod photometry;
pub mod reader;
pub mod record;
pub mod scanner;
pub mod siblings;

pub use error::{Error, Result};
