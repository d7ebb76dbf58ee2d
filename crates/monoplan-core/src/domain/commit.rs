//! Last-change information for a path.

use serde::{Deserialize, Serialize};

/// Hash reported when no commit information could be obtained.
pub const UNKNOWN_HASH: &str = "0000000000000000000000000000000000000000";

/// The last commit touching a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    /// Commit time, epoch seconds.
    pub timestamp: i64,
}

impl CommitInfo {
    pub fn new(hash: impl Into<String>, timestamp: i64) -> Self {
        Self {
            hash: hash.into(),
            timestamp,
        }
    }

    /// Placeholder used when a dependency's commit cannot be fetched.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_HASH, 0)
    }

    pub fn is_unknown(&self) -> bool {
        self.hash == UNKNOWN_HASH && self.timestamp == 0
    }
}
