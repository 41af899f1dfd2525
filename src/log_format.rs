//! Reads rating logs back in. Each line looks like
//!
//! ```text
//! HH:MM:SS.ss,rating
//! ```
//!
//! where the rating may be a quoted CSV field. Used to summarise a log
//! after the fact.

use crate::clock::Timestamp;
use crate::session_buffer::{Rating, TimestampedRating};

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{char, digit1, u64},
    combinator::{all_consuming, map, map_opt, map_res, rest, value, verify},
    error::Error,
    multi::fold_many0,
    sequence::{delimited, separated_pair, terminated, tuple},
    Finish, IResult,
};

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    fs::read_to_string,
    io,
    path::Path,
    str::FromStr,
};

fn two_digits(s: &str) -> IResult<&str, u64> {
    map_res(verify(digit1, |d: &str| d.len() == 2), |d: &str| d.parse())(s)
}

fn parse_timestamp(s: &str) -> IResult<&str, Timestamp> {
    map_opt(
        tuple((
            terminated(u64, char(':')),
            terminated(two_digits, char(':')),
            terminated(two_digits, char('.')),
            two_digits,
        )),
        |(h, m, sec, cs)| Timestamp::from_parts(h, m, sec, cs),
    )(s)
}

fn parse_quoted(s: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\""), value("\"", tag("\"\"")))),
            String::new,
            |mut acc, piece: &str| {
                acc.push_str(piece);
                acc
            },
        ),
        char('"'),
    )(s)
}

fn parse_rating(s: &str) -> IResult<&str, Rating> {
    map_res(
        alt((all_consuming(parse_quoted), map(rest, str::to_owned))),
        |text: String| Rating::new(&text).ok_or("empty rating"),
    )(s)
}

fn parse_record(s: &str) -> IResult<&str, TimestampedRating> {
    map(
        separated_pair(parse_timestamp, char(','), parse_rating),
        |(offset, value)| TimestampedRating::new(offset, value),
    )(s)
}

impl FromStr for TimestampedRating {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match all_consuming(parse_record)(s).finish() {
            Ok((_remaining, record)) => Ok(record),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

/// A log line that did not parse.
#[derive(Debug)]
pub enum LogReadError {
    /// The file could not be read.
    Io(io::Error),
    /// Line `line` (1-based) is not a record.
    Malformed { line: usize, text: String },
}

impl Display for LogReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {}", error),
            Self::Malformed { line, text } => write!(f, "line {}: not a record: {:?}", line, text),
        }
    }
}

impl std::error::Error for LogReadError {}

impl From<io::Error> for LogReadError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Parse every record in `text`. Blank lines are skipped.
pub fn parse_log(text: &str) -> Result<Vec<TimestampedRating>, LogReadError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.parse::<TimestampedRating>().map_err(|_| LogReadError::Malformed {
                line: i + 1,
                text: line.to_owned(),
            })
        })
        .collect()
}

/// Read and parse the log at `path`.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<TimestampedRating>, LogReadError> {
    parse_log(&read_to_string(path)?)
}

/// A few numbers about a log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogSummary {
    /// Number of records.
    pub records: usize,
    /// Smallest offset seen.
    pub first: Option<Timestamp>,
    /// Largest offset seen.
    pub last: Option<Timestamp>,
    /// How many times each rating value appears.
    pub histogram: BTreeMap<String, usize>,
}

impl LogSummary {
    /// Tally up `records`.
    pub fn from_records(records: &[TimestampedRating]) -> Self {
        let mut histogram = BTreeMap::new();
        for r in records {
            *histogram.entry(r.value.as_str().to_owned()).or_insert(0) += 1;
        }

        Self {
            records: records.len(),
            first: records.iter().map(|r| r.offset).min(),
            last: records.iter().map(|r| r.offset).max(),
            histogram,
        }
    }
}

impl Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records: {}", self.records)?;
        if let (Some(first), Some(last)) = (self.first, self.last) {
            writeln!(f, "span:    {} .. {}", first, last)?;
        }
        for (value, count) in &self.histogram {
            writeln!(f, "  {:>8} : {}", value, count)?;
        }
        Ok(())
    }
}
