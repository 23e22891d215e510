//! Hybrid logical timestamps and their canonical string form.
//!
//! A [`HybridTimestamp`] is the causal order key of every event. The total
//! order is `physical`, then `logical`, then `node` (lexicographic), which
//! is exactly the field order, so `Ord` is derived.
//!
//! The canonical encoding is `"{physical}:{logical}:{node}"`. Parsing
//! splits on the first two delimiters only, so node ids may contain `:`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Separator between the three fields of the canonical encoding.
pub const DELIMITER: char = ':';

/// Errors produced when decoding a canonical timestamp string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockParseError {
    /// The input has fewer than three delimited fields.
    #[error("timestamp {input:?} is missing its {field} field")]
    MissingField {
        /// The rejected input.
        input: String,
        /// Name of the first absent field.
        field: &'static str,
    },

    /// A numeric field is empty, has non-digit characters, or overflows.
    #[error("timestamp field {field} is not a valid unsigned integer: {value:?}")]
    InvalidNumber {
        /// Name of the offending field.
        field: &'static str,
        /// The raw field text.
        value: String,
    },

    /// The node id field is empty.
    #[error("timestamp {input:?} has an empty node id")]
    EmptyNode {
        /// The rejected input.
        input: String,
    },
}

/// A point in hybrid logical time, attributed to the node that produced it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HybridTimestamp {
    /// Wall-clock milliseconds (the largest value this clock has seen).
    pub physical: u64,
    /// Counter disambiguating events within the same millisecond.
    pub logical: u32,
    /// Producing node; used only as the final tie-break.
    pub node: NodeId,
}

impl HybridTimestamp {
    /// Build a timestamp from its three components.
    pub const fn new(physical: u64, logical: u32, node: NodeId) -> Self {
        Self {
            physical,
            logical,
            node,
        }
    }

    /// Parse the canonical string form.
    ///
    /// # Errors
    ///
    /// Returns [`ClockParseError`] for any malformed input. A default clock
    /// is never produced in place of a parse failure.
    pub fn parse(input: &str) -> Result<Self, ClockParseError> {
        let mut parts = input.splitn(3, DELIMITER);

        let physical_text = parts.next().unwrap_or_default();
        let logical_text = parts.next().ok_or_else(|| ClockParseError::MissingField {
            input: input.to_owned(),
            field: "logical",
        })?;
        let node_text = parts.next().ok_or_else(|| ClockParseError::MissingField {
            input: input.to_owned(),
            field: "node",
        })?;

        let physical = parse_digits::<u64>("physical", physical_text)?;
        let logical = parse_digits::<u32>("logical", logical_text)?;
        let node = NodeId::new(node_text).map_err(|_empty| ClockParseError::EmptyNode {
            input: input.to_owned(),
        })?;

        Ok(Self {
            physical,
            logical,
            node,
        })
    }
}

/// Parse a field that must consist solely of ASCII digits.
///
/// `str::parse` alone would accept a leading `+`, which is not canonical.
fn parse_digits<T: FromStr>(field: &'static str, text: &str) -> Result<T, ClockParseError> {
    let invalid = || ClockParseError::InvalidNumber {
        field,
        value: text.to_owned(),
    };
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    text.parse::<T>().map_err(|_overflow| invalid())
}

impl fmt::Display for HybridTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.physical, self.logical, self.node
        )
    }
}

impl FromStr for HybridTimestamp {
    type Err = ClockParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HybridTimestamp {
    type Error = ClockParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HybridTimestamp> for String {
    fn from(ts: HybridTimestamp) -> Self {
        ts.to_string()
    }
}
