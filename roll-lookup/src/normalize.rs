//! Pure string helpers that turn raw roll attributes into key fragments.
//!
//! Everything here counts Unicode scalar values, never bytes: the extract is
//! transcoded from a single-byte encoding before it gets here, so accented
//! surnames are multi-byte by the time they are truncated.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid truncation width {0}, must be at least 1")]
    InvalidPolicy(usize),
    #[error("malformed date, expected at least two characters")]
    MalformedDate,
}

/// How many characters of a value survive, and from which end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    KeepFirst(usize),
    KeepLast(usize),
    /// First N characters followed by the original last character, which keeps
    /// the control letter some document ids carry.
    KeepFirstPlusLastChar(usize),
    /// The N characters before the last one, followed by the last character.
    KeepLastPlusLastChar(usize),
}

impl Truncation {
    pub fn width(&self) -> usize {
        match *self {
            Truncation::KeepFirst(n)
            | Truncation::KeepLast(n)
            | Truncation::KeepFirstPlusLastChar(n)
            | Truncation::KeepLastPlusLastChar(n) => n,
        }
    }

    pub fn validate(&self) -> Result<(), NormalizeError> {
        match self.width() {
            0 => Err(NormalizeError::InvalidPolicy(0)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Day,
    Year,
}

/// Trims and uppercases. Not meant for dates or numeric codes.
pub fn normalize_case(s: &str) -> String {
    s.trim().to_uppercase()
}

pub fn truncate(s: &str, policy: Truncation) -> Result<String, NormalizeError> {
    policy.validate()?;

    let n = policy.width();
    let len = s.chars().count();
    if n >= len {
        return Ok(s.to_string());
    }

    let truncated = match policy {
        Truncation::KeepFirst(_) => s.chars().take(n).collect(),
        Truncation::KeepLast(_) => s.chars().skip(len - n).collect(),
        Truncation::KeepFirstPlusLastChar(_) => {
            let mut out: String = s.chars().take(n).collect();
            out.extend(s.chars().last());
            out
        }
        Truncation::KeepLastPlusLastChar(_) => {
            // n < len, so the n characters before the last one always exist.
            let body = len - 1;
            let mut out: String = s.chars().take(body).skip(body.saturating_sub(n)).collect();
            out.extend(s.chars().last());
            out
        }
    };

    Ok(truncated)
}

/// Picks the day (first two characters) or the year (last two characters)
/// of a fixed-width `ddmmyy`-like date.
pub fn split_date(date: &str, part: DatePart) -> Result<String, NormalizeError> {
    let date = date.trim();
    let len = date.chars().count();
    if len < 2 {
        return Err(NormalizeError::MalformedDate);
    }

    let picked = match part {
        DatePart::Day => date.chars().take(2).collect(),
        DatePart::Year => date.chars().skip(len - 2).collect(),
    };
    Ok(picked)
}

/// Callers sometimes send `1` for the first of the month.
pub fn pad_day(day: &str) -> String {
    let day = day.trim();
    if day.chars().count() == 1 {
        format!("0{day}")
    } else {
        day.to_string()
    }
}
