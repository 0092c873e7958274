//! # kudev-hash
//!
//! Content-addressable change detection.
//!
//! [`calculate`] digests every non-excluded file under a root into a short
//! [`SourceDigest`](kudev_core::SourceDigest); [`Tagger`] turns that digest
//! into a stable, parseable image tag.

pub mod calculator;
pub mod error;
pub mod exclude;
pub mod tag;

pub use calculator::{calculate, relative_key, HashCalculator};
pub use error::{HashError, TagError};
pub use exclude::{Exclusions, DEFAULT_EXCLUSIONS};
pub use tag::{compare_hashes, is_kudev_tag, parse_tag, ImageTag, ParsedTag, Tagger, TAG_PREFIX};
