//! Journal code numbering.
//!
//! Codes look like `JE-202610-0001`: prefix, accounting year and month, and a
//! counter that restarts every month. When the counter store is unavailable a
//! timestamp stands in for the counter (`JE-202610-T1792137600123`), which can
//! never collide with a counter-issued code.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Key of one sequence counter row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    /// Code prefix, e.g. `JE`.
    pub prefix: String,
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-12.
    pub month: u32,
}

impl SequenceKey {
    /// Creates a key.
    pub fn new(prefix: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            prefix: prefix.into(),
            year,
            month,
        }
    }

    /// Key for the month containing `date`.
    pub fn for_date(prefix: impl Into<String>, date: NaiveDate) -> Self {
        Self::new(prefix, date.year(), date.month())
    }

    /// Renders the human-readable code for `number` under this key.
    #[must_use]
    pub fn format_code(&self, number: SequenceNumber) -> String {
        format!("{}-{:04}{:02}-{number}", self.prefix, self.year, self.month)
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:04}-{:02}", self.prefix, self.year, self.month)
    }
}

/// A value handed out by the sequence allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceNumber {
    /// Issued under the counter's row lock; strictly increasing per key.
    Counter(u64),
    /// Degraded mode: milliseconds since the Unix epoch.
    Fallback(i64),
}

impl SequenceNumber {
    /// The raw integer value.
    #[must_use]
    pub fn value(self) -> i64 {
        match self {
            Self::Counter(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Self::Fallback(millis) => millis,
        }
    }

    /// True when issued in degraded mode.
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter(n) => write!(f, "{n:04}"),
            Self::Fallback(millis) => write!(f, "T{millis}"),
        }
    }
}
