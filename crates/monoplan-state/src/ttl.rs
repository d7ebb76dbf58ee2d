//! TTL policy for execution-state records.
//!
//! Running markers expire quickly so that a crashed run cannot block its
//! (app, job) pair for long; success markers are kept for a long window.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Default lifetime of a `running` record.
pub const DEFAULT_RUNNING_TTL_SECS: i64 = 60 * 60;

/// Default lifetime of a `success` record.
pub const DEFAULT_SUCCESS_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Record lifetimes, in seconds, applied when a record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    pub running_secs: i64,
    pub success_secs: i64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            running_secs: DEFAULT_RUNNING_TTL_SECS,
            success_secs: DEFAULT_SUCCESS_TTL_SECS,
        }
    }
}

impl TtlPolicy {
    /// Build a policy from duration strings such as `"1h"` and `"30d"`.
    pub fn from_durations(running: &str, success: &str) -> StorageResult<Self> {
        Ok(Self {
            running_secs: parse_duration(running)?,
            success_secs: parse_duration(success)?,
        })
    }

    /// Absolute expiry (epoch seconds) of a running record written at `now`.
    pub fn running_expiry(&self, now: i64) -> i64 {
        now + self.running_secs
    }

    /// Absolute expiry (epoch seconds) of a success record written at `now`.
    pub fn success_expiry(&self, now: i64) -> i64 {
        now + self.success_secs
    }
}

/// Parse a compact duration like `"2h45m10s"` into seconds.
///
/// Accepted units: `d`, `h`, `m`, `s`. Every unit must be preceded by a
/// number and the whole input must be consumed.
pub fn parse_duration(input: &str) -> StorageResult<i64> {
    let invalid = |reason: String| StorageError::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    if input.is_empty() {
        return Err(invalid("empty duration".to_string()));
    }

    let mut total: i64 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| !c.is_ascii_digit()) {
            unit.push(c);
            chars.next();
        }

        if digits.is_empty() || unit.is_empty() {
            return Err(invalid("expected <number><unit> pairs".to_string()));
        }

        let value: i64 = digits
            .parse()
            .map_err(|_| invalid(format!("number out of range: {digits}")))?;
        let scale = match unit.as_str() {
            "d" => 24 * 60 * 60,
            "h" => 60 * 60,
            "m" => 60,
            "s" => 1,
            other => return Err(invalid(format!("unknown unit '{other}'"))),
        };
        total = value
            .checked_mul(scale)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| invalid("duration overflows".to_string()))?;
    }

    Ok(total)
}
