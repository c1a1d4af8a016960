//! Compact duration notation used for TTLs
//!
//! Accepts strings such as `300ms`, `5m`, `1.5h` or `2h45m30s`: a sequence of
//! decimal numbers, each with an optional fraction and a mandatory unit suffix.
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.

use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Errors produced when parsing a duration string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("duration cannot be empty")]
    Empty,

    #[error("signed durations are not supported: '{0}'")]
    Signed(String),

    #[error("expected a number in duration '{0}'")]
    MissingNumber(String),

    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("duration out of range: '{0}'")]
    Overflow(String),
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MIN),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

/// Parse a compact duration string.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if trimmed.starts_with('-') || trimmed.starts_with('+') {
        return Err(DurationError::Signed(trimmed.to_string()));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_number) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::MissingNumber(trimmed.to_string()));
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_len);

        if unit.is_empty() {
            return Err(DurationError::MissingUnit(trimmed.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: trimmed.to_string(),
        })?;

        let overflow = || DurationError::Overflow(trimmed.to_string());

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(overflow)?;

        // Digits past nanosecond precision are truncated
        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 = digits.parse().map_err(|_| overflow())?;
            let denominator = 10u128.pow(digits.len() as u32);
            value = value
                .checked_add(numerator * scale / denominator)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(value).ok_or_else(overflow)?;
        if total > u64::MAX as u128 {
            return Err(overflow());
        }

        rest = remainder;
    }

    Ok(Duration::from_nanos(total as u64))
}

/// Largest duration [`parse_duration`] accepts.
pub const MAX_DURATION: Duration = Duration::from_nanos(u64::MAX);

/// Render a duration in the notation accepted by [`parse_duration`].
///
/// Only values up to [`MAX_DURATION`] parse back.
///
/// Values of one second or more use `h`/`m`/`s` components (`1h30m0s`, `5m0s`,
/// `1.5s`); shorter values use the largest fitting sub-second unit (`300ms`).
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SEC {
        let (scale, unit, width) = if nanos < NANOS_PER_MICRO {
            (1, "ns", 0)
        } else if nanos < NANOS_PER_MILLI {
            (NANOS_PER_MICRO, "us", 3)
        } else {
            (NANOS_PER_MILLI, "ms", 6)
        };
        return format!(
            "{}{}",
            decimal(nanos / scale, nanos % scale, width),
            unit
        );
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
    let sub_minute = nanos % NANOS_PER_MIN;
    let seconds = decimal(sub_minute / NANOS_PER_SEC, sub_minute % NANOS_PER_SEC, 9);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn decimal(whole: u128, frac: u128, width: usize) -> String {
    if frac == 0 || width == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
