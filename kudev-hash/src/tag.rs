//! Image tags derived from source digests.
//!
//! Format: `kudev-<8 lowercase hex>` with an optional `-YYYYMMDD-HHMMSS`
//! (UTC) suffix. Two tags are content-equivalent when their digest portions
//! match, whatever their timestamps.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use kudev_core::SourceDigest;

use crate::calculator::{HashCalculator, DIGEST_LEN};
use crate::error::{HashError, TagError};
use crate::exclude::Exclusions;

pub const TAG_PREFIX: &str = "kudev";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// An immutable, generated image tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag(pub String);

impl ImageTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Components of a parsed kudev tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTag {
    pub digest: SourceDigest,
    pub has_timestamp: bool,
}

/// Generates tags for one digest.
#[derive(Debug, Clone)]
pub struct Tagger {
    digest: SourceDigest,
}

impl Tagger {
    pub fn new(digest: SourceDigest) -> Self {
        Self { digest }
    }

    /// Digest `root` and build a tagger for it.
    pub fn from_source(root: &Path, exclusions: Exclusions) -> Result<Self, HashError> {
        HashCalculator::new(root, exclusions)
            .calculate()
            .map(Self::new)
    }

    pub fn hash(&self) -> &SourceDigest {
        &self.digest
    }

    /// `kudev-<digest>`, or with a current UTC timestamp when requested.
    ///
    /// Reads the clock only when `with_timestamp` is set.
    pub fn generate_tag(&self, with_timestamp: bool) -> ImageTag {
        if with_timestamp {
            self.generate_tag_at(Utc::now())
        } else {
            ImageTag(format!("{TAG_PREFIX}-{}", self.digest))
        }
    }

    /// Timestamped tag for an explicit instant.
    pub fn generate_tag_at(&self, at: DateTime<Utc>) -> ImageTag {
        ImageTag(format!(
            "{TAG_PREFIX}-{}-{}",
            self.digest,
            at.format(TIMESTAMP_FORMAT)
        ))
    }
}

/// Whether `tag` has exactly the kudev shape.
pub fn is_kudev_tag(tag: &str) -> bool {
    parse_tag(tag).is_ok()
}

/// Split a kudev tag into its digest and whether it carries a timestamp.
pub fn parse_tag(tag: &str) -> Result<ParsedTag, TagError> {
    let malformed = || TagError::Malformed(tag.to_string());

    let rest = tag
        .strip_prefix(TAG_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(malformed)?;

    let (digest, suffix) = match rest.split_once('-') {
        Some((digest, suffix)) => (digest, Some(suffix)),
        None => (rest, None),
    };

    let digest_ok = digest.len() == DIGEST_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !digest_ok {
        return Err(malformed());
    }

    if let Some(suffix) = suffix {
        if !is_timestamp(suffix) {
            return Err(malformed());
        }
    }

    Ok(ParsedTag {
        digest: SourceDigest(digest.to_string()),
        has_timestamp: suffix.is_some(),
    })
}

/// True when both tags are kudev tags with the same digest portion.
pub fn compare_hashes(a: &str, b: &str) -> bool {
    match (parse_tag(a), parse_tag(b)) {
        (Ok(a), Ok(b)) => a.digest == b.digest,
        _ => false,
    }
}

fn is_timestamp(suffix: &str) -> bool {
    suffix.len() == TIMESTAMP_LEN
        && suffix
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 8 { b == b'-' } else { b.is_ascii_digit() })
        && NaiveDateTime::parse_from_str(suffix, TIMESTAMP_FORMAT).is_ok()
}
