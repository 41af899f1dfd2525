//! The in-memory record of one session: ratings in the order they were
//! captured, each stamped with its offset from the session origin.

use crate::clock::Timestamp;
use std::fmt::{self, Display};

/// One non-empty token reported by the rating device. What the token means
/// is up to whoever reads the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rating(String);

impl Rating {
    /// Trims surrounding whitespace (including the line terminator) and
    /// returns `None` if nothing is left.
    pub fn new(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(Self(text.to_owned()))
        }
    }

    /// The token itself.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rating together with when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedRating {
    /// Offset from the session origin.
    pub offset: Timestamp,
    /// What the device said.
    pub value: Rating,
}

impl TimestampedRating {
    /// Pair a rating with its offset.
    pub fn new(offset: impl Into<Timestamp>, value: Rating) -> Self {
        Self {
            offset: offset.into(),
            value,
        }
    }
}

/// Append-only, capture-ordered list of [TimestampedRating]s.
#[derive(Debug, Clone, Default)]
pub struct SessionBuffer {
    records: Vec<TimestampedRating>,
}

impl SessionBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record at the end.
    pub fn push(&mut self, record: TimestampedRating) {
        self.records.push(record);
    }

    /// Forget everything, ready for a new session.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in capture order.
    pub fn records(&self) -> &[TimestampedRating] {
        &self.records
    }

    /// Hand the records over, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<TimestampedRating> {
        std::mem::take(&mut self.records)
    }
}
