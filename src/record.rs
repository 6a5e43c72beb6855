//! Car records and the line validator that produces them.
//!
//! Input lines look like `Gate 1, Car 3, Arrive 2, Parks 4`. A line that fails to
//! parse is dropped with a diagnostic; it is never turned into a record with
//! default values, and it never stops the remaining lines from being read.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LotResult, ValidationError};

/// Validated description of one car.
///
/// Immutable once built: fields are private and only exposed through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarRecord {
    gate: String,
    car_id: u32,
    arrival_offset: u64,
    hold_duration: u64,
}

impl CarRecord {
    /// Creates a record.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyGate` for a blank gate and
    /// `ValidationError::NonPositiveCarId` when `car_id` is zero.
    pub fn new(
        gate: impl Into<String>,
        car_id: u32,
        arrival_offset: u64,
        hold_duration: u64,
    ) -> Result<Self, ValidationError> {
        let gate = gate.into().trim().to_string();
        if gate.is_empty() {
            return Err(ValidationError::EmptyGate);
        }
        if car_id == 0 {
            return Err(ValidationError::NonPositiveCarId { value: car_id });
        }
        Ok(Self {
            gate,
            car_id,
            arrival_offset,
            hold_duration,
        })
    }

    /// Origin gate.
    #[must_use]
    pub fn gate(&self) -> &str {
        &self.gate
    }

    /// Car identifier (always > 0).
    #[must_use]
    pub const fn car_id(&self) -> u32 {
        self.car_id
    }

    /// Time units before the car attempts to park.
    #[must_use]
    pub const fn arrival_offset(&self) -> u64 {
        self.arrival_offset
    }

    /// Time units the car occupies a spot once parked.
    #[must_use]
    pub const fn hold_duration(&self) -> u64 {
        self.hold_duration
    }
}

impl fmt::Display for CarRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Car {}, Arrive {}, Parks {}",
            self.gate, self.car_id, self.arrival_offset, self.hold_duration
        )
    }
}

/// A line dropped by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the input.
    pub line_no: usize,
    /// Raw line text.
    pub line: String,
    /// Why the line was rejected.
    pub error: ValidationError,
}

/// Result of validating a whole input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedInput {
    /// Records that passed validation, in input order.
    pub records: Vec<CarRecord>,
    /// Lines that were dropped.
    pub rejected: Vec<RejectedLine>,
}

fn field_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    // Only called with the literal patterns below, each compiled by a unit test.
    cell.get_or_init(|| Regex::new(pattern).expect("field pattern is a valid regex"))
}

fn car_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    field_regex(&RE, r"^Car (\d+)$")
}

fn arrival_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    field_regex(&RE, r"^Arrive (\d+)$")
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    field_regex(&RE, r"^Parks (\d+)$")
}

fn capture_number<T: std::str::FromStr>(re: &Regex, token: &str) -> Option<T> {
    re.captures(token)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parses a single input line.
///
/// Fields beyond the fourth are ignored.
///
/// # Errors
///
/// Returns the `ValidationError` describing the first malformed field.
pub fn parse_line(line: &str) -> Result<CarRecord, ValidationError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(ValidationError::FieldCount {
            found: fields.len(),
        });
    }

    let gate = fields[0];
    if gate.is_empty() {
        return Err(ValidationError::EmptyGate);
    }

    let car_id: u32 = capture_number(car_id_regex(), fields[1]).ok_or_else(|| {
        ValidationError::InvalidCarId {
            token: fields[1].to_string(),
        }
    })?;
    let arrival_offset: u64 = capture_number(arrival_regex(), fields[2]).ok_or_else(|| {
        ValidationError::InvalidArrival {
            token: fields[2].to_string(),
        }
    })?;
    let hold_duration: u64 = capture_number(duration_regex(), fields[3]).ok_or_else(|| {
        ValidationError::InvalidDuration {
            token: fields[3].to_string(),
        }
    })?;

    CarRecord::new(gate, car_id, arrival_offset, hold_duration)
}

/// Validates every line of `input`.
///
/// Blank lines are skipped without a diagnostic. Every rejected line is logged
/// at warn level and collected in `ParsedInput::rejected`.
#[must_use]
pub fn parse_records(input: &str) -> ParsedInput {
    let mut parsed = ParsedInput::default();
    for (idx, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(record) => parsed.records.push(record),
            Err(error) => {
                tracing::warn!(line_no = idx + 1, line, %error, "dropping malformed car record");
                parsed.rejected.push(RejectedLine {
                    line_no: idx + 1,
                    line: line.to_string(),
                    error,
                });
            }
        }
    }
    parsed
}

/// Reads and validates a car file.
///
/// # Errors
///
/// Returns `LotError::Io` when the file cannot be read. Malformed lines are not
/// errors; they are reported in `ParsedInput::rejected`.
pub fn load_records(path: impl AsRef<Path>) -> LotResult<ParsedInput> {
    let input = std::fs::read_to_string(path)?;
    Ok(parse_records(&input))
}
