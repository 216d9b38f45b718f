//! Shared identifier and timestamp primitives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Identifier for a hunt record, split across the two id spaces.
///
/// A record carries a [`HuntId::Server`] id once the remote authority has
/// acknowledged it, and a [`HuntId::Pending`] id while it exists only on this
/// device. The variants can never collide, so "has this record reached the
/// server" is a plain `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HuntId {
    /// Stable identifier assigned by the remote authority.
    Server(u64),
    /// Temporary identifier assigned locally while the record is unsynced.
    /// Always negative; allocated from a per-session decreasing counter.
    Pending(i64),
}

impl HuntId {
    /// True when this record has never been acknowledged by the server.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// True when this record is backed by the remote authority.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

impl fmt::Display for HuntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(n) => write!(f, "{n}"),
            Self::Pending(n) => write!(f, "t_{n}"),
        }
    }
}

/// Error returned when parsing a [`HuntId`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHuntIdError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseHuntIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hunt id: {:?}", self.input)
    }
}

impl std::error::Error for ParseHuntIdError {}

impl FromStr for HuntId {
    type Err = ParseHuntIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHuntIdError {
            input: s.to_string(),
        };
        if let Some(rest) = s.strip_prefix("t_") {
            rest.parse::<i64>().map(Self::Pending).map_err(|_| err())
        } else {
            s.parse::<u64>().map(Self::Server).map_err(|_| err())
        }
    }
}

// Persisted and wire form is the prefixed string ("17" / "t_-3") so stored
// snapshots stay readable and the pending tag survives round-trips.
impl Serialize for HuntId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HuntId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
