//! Partition descriptor parsing.
//!
//! Kudu reports a tablet's partition as a human-readable descriptor such as
//!
//! ```text
//! HASH (host, metric) PARTITION 2, RANGE (dt) PARTITION "2019-02-15" <= VALUES < "2019-02-16"
//! ```
//!
//! The descriptor holds up to two kinds of clauses:
//!
//! - `HASH (<col-list>) PARTITION <int>` optionally followed by `,` / spaces
//! - `RANGE (<col>) PARTITION <value>` where `<value>` runs to end of input
//!
//! Clauses are found left to right by scanning the whole string. The first
//! clause of each kind is then laid out into the four partition labels
//! depending on how the descriptor starts.

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::digit1;
use nom::combinator::{map, rest, verify};
use nom::error::ErrorKind;
use nom::sequence::preceded;

use crate::error::PartitionParseError;

/// Label names contributed by a `partition` attribute, in schema order.
pub const PARTITION_LABELS: [&str; 4] = [
    "partition_hash_column",
    "partition_hash_index",
    "partition_range_column",
    "partition_range_value",
];

const HASH_OPEN: &str = "HASH (";
const RANGE_OPEN: &str = "RANGE (";
const PARTITION_SEP: &str = ") PARTITION ";

/// Structured partition labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionLabels {
    pub hash_column: String,
    pub hash_index: String,
    pub range_column: String,
    pub range_value: String,
}

impl PartitionLabels {
    /// Values in [`PARTITION_LABELS`] order.
    pub fn values(&self) -> [&str; 4] {
        [
            &self.hash_column,
            &self.hash_index,
            &self.range_column,
            &self.range_value,
        ]
    }
}

/// Parse a partition descriptor into its four labels.
///
/// - Starts with `RANGE`: the range clause fills the last two slots.
/// - Starts with `HASH` and has no `RANGE`: the hash clause fills the
///   first two slots.
/// - Otherwise: the hash clause fills the first two slots and the range
///   clause the last two.
///
/// With several HASH levels the first one is used.
pub fn parse(descriptor: &str) -> Result<PartitionLabels, PartitionParseError> {
    let clauses = scan(descriptor);
    let hash = clauses.iter().find_map(|clause| match *clause {
        Clause::Hash { columns, index } => Some((columns, index)),
        Clause::Range { .. } => None,
    });
    let range = clauses.iter().find_map(|clause| match *clause {
        Clause::Range { column, value } => Some((column, value)),
        Clause::Hash { .. } => None,
    });

    let missing = |clause: &'static str| PartitionParseError {
        descriptor: descriptor.to_string(),
        missing: clause,
    };
    let (hash, range) = if descriptor.starts_with("RANGE") {
        (None, Some(range.ok_or_else(|| missing("RANGE"))?))
    } else if descriptor.starts_with("HASH") && !descriptor.contains("RANGE") {
        (Some(hash.ok_or_else(|| missing("HASH"))?), None)
    } else {
        (
            Some(hash.ok_or_else(|| missing("HASH"))?),
            Some(range.ok_or_else(|| missing("RANGE"))?),
        )
    };

    let (hash_column, hash_index) = hash.unwrap_or_default();
    let (range_column, range_value) = range.unwrap_or_default();
    Ok(PartitionLabels {
        hash_column: hash_column.to_string(),
        hash_index: hash_index.to_string(),
        range_column: range_column.to_string(),
        range_value: range_value.to_string(),
    })
}

/// One matched clause of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause<'a> {
    Hash { columns: &'a str, index: &'a str },
    Range { column: &'a str, value: &'a str },
}

/// Find every clause left to right.
fn scan(input: &str) -> Vec<Clause<'_>> {
    let mut clauses = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() {
        let clause = alt((
            map(hash_clause, |(columns, index)| Clause::Hash { columns, index }),
            map(range_clause, |(column, value)| Clause::Range { column, value }),
        ))(remaining);

        match clause {
            Ok((tail, clause)) => {
                clauses.push(clause);
                remaining = tail;
            }
            Err(_) => {
                let mut chars = remaining.chars();
                chars.next();
                remaining = chars.as_str();
            }
        }
    }

    clauses
}

/// `HASH (<col-list>) PARTITION <digits>[, ]*`
fn hash_clause(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, columns) = preceded(tag(HASH_OPEN), hash_columns)(input)?;
    let (input, index) = preceded(tag(PARTITION_SEP), digit1)(input)?;
    let (input, _) = take_while(|c: char| c == ',' || c == ' ')(input)?;
    Ok((input, (columns, index)))
}

/// The column list may itself contain parentheses; it ends at the first
/// separator that is followed by a bucket number.
fn hash_columns(input: &str) -> IResult<&str, &str> {
    let mut from = 0;
    while let Some(found) = input[from..].find(PARTITION_SEP) {
        let at = from + found;
        let after = &input[at + PARTITION_SEP.len()..];
        if at > 0 && after.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok((&input[at..], &input[..at]));
        }
        from = at + 1;
    }
    Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::TakeUntil)))
}

/// `RANGE (<col>) PARTITION <value>`, value running to end of input.
fn range_clause(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, column) = preceded(tag(RANGE_OPEN), take_while1(|c: char| c != ')'))(input)?;
    let (input, value) = preceded(tag(PARTITION_SEP), verify(rest, |v: &str| !v.is_empty()))(input)?;
    Ok((input, (column, strip_quotes(value))))
}

fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}
