//! Exclusion matching shared by the hash calculator and the file watcher.
//!
//! A pattern matches a relative path when it
//! 1. equals one of the path's segments,
//! 2. glob-matches one of the path's segments,
//! 3. glob-matches the whole path, or
//! 4. is a directory prefix of the path (`pattern/...`).
//!
//! Separators are normalised to `/` before matching.

use glob::{MatchOptions, Pattern};

use crate::error::HashError;

/// Always applied, before any caller-supplied pattern.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    ".git",
    ".gitignore",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".cache",
    ".venv",
    ".DS_Store",
    "Thumbs.db",
    "*.log",
    "*.tmp",
    "*.swp",
    "*~",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    raw: String,
    glob: Pattern,
}

impl Rule {
    fn matches(&self, rel: &str) -> bool {
        let segment_match = rel.split('/').any(|segment| {
            segment == self.raw || self.glob.matches_with(segment, MATCH_OPTIONS)
        });
        if segment_match {
            return true;
        }
        if self.glob.matches_with(rel, MATCH_OPTIONS) {
            return true;
        }
        rel.strip_prefix(self.raw.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Compiled exclusion set: defaults plus caller patterns (appended).
#[derive(Debug, Clone)]
pub struct Exclusions {
    rules: Vec<Rule>,
}

impl Exclusions {
    /// Defaults plus `extra`. Fails on a pattern that is not a valid glob.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Result<Self, HashError> {
        let mut rules = Vec::with_capacity(DEFAULT_EXCLUSIONS.len() + extra.len());
        let patterns = DEFAULT_EXCLUSIONS
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref));
        for pattern in patterns {
            let raw = normalize(pattern.trim());
            let raw = raw.trim_end_matches('/').to_string();
            if raw.is_empty() {
                continue;
            }
            let glob = Pattern::new(&raw).map_err(|source| HashError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
            rules.push(Rule { raw, glob });
        }
        Ok(Self { rules })
    }

    /// Only the built-in defaults.
    pub fn defaults() -> Self {
        let rules = DEFAULT_EXCLUSIONS
            .iter()
            .filter_map(|raw| {
                Pattern::new(raw).ok().map(|glob| Rule {
                    raw: (*raw).to_string(),
                    glob,
                })
            })
            .collect();
        Self { rules }
    }

    /// Whether `relative_path` (relative to the hashed/watched root) is excluded.
    pub fn should_exclude(&self, relative_path: &str) -> bool {
        let rel = normalize(relative_path);
        let rel = rel.trim_start_matches("./");
        if rel.is_empty() || rel == "." {
            return false;
        }
        self.rules.iter().any(|rule| rule.matches(rel))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.raw.as_str())
    }
}

impl Default for Exclusions {
    fn default() -> Self {
        Self::defaults()
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}
