//! Frequency grammar and axis compatibility rules.
//!
//! Frequencies arrive as strings (`1d`, `30m`, `1mo`, ...) or plain
//! non-negative integers. Calendar units are approximated as fixed spans
//! for range generation: months as 30 days, quarters as 90, years as 365.
//! This matches the behaviour downstream consumers already depend on;
//! switching to true calendar arithmetic would change generated ranges.

use crate::error::{ForecastError, Result};

pub const MICROS_PER_MINUTE: i64 = 60 * 1_000_000;
pub const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
pub const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Kind of the date column a frequency is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateAxisKind {
    /// Whole-day dates (stored as days since epoch).
    Date,
    /// Microsecond timestamps.
    Timestamp,
    /// Plain integer index.
    Integer,
}

/// A parsed frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Fixed or calendar-approximated span in microseconds.
    Interval { micros: i64 },
    /// Integer step for integer-indexed series.
    Step(i64),
}

impl Frequency {
    /// Parse the frequency grammar. Case-insensitive, surrounding
    /// whitespace ignored. Plain non-negative integers are integer steps.
    pub fn parse(raw: &str) -> Result<Frequency> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ForecastError::InvalidInput(
                "frequency cannot be empty".to_string(),
            ));
        }

        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            let step: i64 = trimmed.parse().map_err(|_| {
                ForecastError::InvalidInput(format!("integer frequency '{}' out of range", trimmed))
            })?;
            if step == 0 {
                return Err(ForecastError::InvalidInput(
                    "integer frequency must be positive".to_string(),
                ));
            }
            return Ok(Frequency::Step(step));
        }

        let upper = trimmed.to_ascii_uppercase();
        let micros = match upper.as_str() {
            "1D" | "1DAY" | "1DAYS" => MICROS_PER_DAY,
            "30M" | "30MIN" | "30MINUTE" | "30MINUTES" => 30 * MICROS_PER_MINUTE,
            "1H" | "1HOUR" | "1HOURS" => MICROS_PER_HOUR,
            "1W" | "1WEEK" | "1WEEKS" => 7 * MICROS_PER_DAY,
            // Calendar units use the 30/90/365-day approximation.
            "1MO" | "1MONTH" | "1MONTHS" => 30 * MICROS_PER_DAY,
            "1Q" | "1QUARTER" | "1QUARTERS" => 90 * MICROS_PER_DAY,
            "1Y" | "1YEAR" | "1YEARS" => 365 * MICROS_PER_DAY,
            _ => {
                return Err(ForecastError::InvalidInput(format!(
                    "unrecognized frequency '{}'",
                    raw.trim()
                )))
            }
        };
        Ok(Frequency::Interval { micros })
    }

    /// Check this frequency against the date column kind. DATE columns
    /// reject sub-day intervals and integer steps; INTEGER columns reject
    /// intervals; TIMESTAMP columns accept anything.
    pub fn validate_for_axis(&self, axis: DateAxisKind) -> Result<()> {
        match (axis, self) {
            (DateAxisKind::Date, Frequency::Step(_)) => Err(ForecastError::InvalidInput(
                "DATE column cannot use an integer frequency; use an interval like '1d' or '1w'"
                    .to_string(),
            )),
            (DateAxisKind::Date, Frequency::Interval { micros }) => {
                if *micros < MICROS_PER_DAY {
                    Err(ForecastError::InvalidInput(
                        "DATE column cannot use sub-day intervals like '30m' or '1h'; use '1d' or larger"
                            .to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            (DateAxisKind::Integer, Frequency::Interval { .. }) => {
                Err(ForecastError::InvalidInput(
                    "INTEGER date column can only use an integer frequency, not an interval"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// The step in the axis' native unit (days for DATE, microseconds for
    /// TIMESTAMP, the raw step for INTEGER).
    pub fn step_for_axis(&self, axis: DateAxisKind) -> i64 {
        match (axis, self) {
            (DateAxisKind::Date, Frequency::Interval { micros }) => micros / MICROS_PER_DAY,
            (DateAxisKind::Timestamp, Frequency::Interval { micros }) => *micros,
            (_, Frequency::Step(step)) => *step,
            (DateAxisKind::Integer, Frequency::Interval { micros }) => *micros,
        }
    }
}

/// Generate the dense inclusive range `[min, max]` with the given step.
pub fn generate_range(min: i64, max: i64, step: i64) -> Vec<i64> {
    if min > max || step <= 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(((max - min) / step + 1) as usize);
    let mut current = min;
    while current <= max {
        out.push(current);
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_intervals() {
        assert_eq!(
            Frequency::parse("1d").unwrap(),
            Frequency::Interval { micros: MICROS_PER_DAY }
        );
        assert_eq!(
            Frequency::parse(" 1H ").unwrap(),
            Frequency::Interval { micros: MICROS_PER_HOUR }
        );
        assert_eq!(
            Frequency::parse("30min").unwrap(),
            Frequency::Interval { micros: 30 * MICROS_PER_MINUTE }
        );
        assert_eq!(
            Frequency::parse("1week").unwrap(),
            Frequency::Interval { micros: 7 * MICROS_PER_DAY }
        );
    }

    #[test]
    fn test_parse_calendar_approximation() {
        // Months/quarters/years are day-approximated; these constants are
        // load-bearing for downstream range generation.
        assert_eq!(
            Frequency::parse("1mo").unwrap(),
            Frequency::Interval { micros: 30 * MICROS_PER_DAY }
        );
        assert_eq!(
            Frequency::parse("1quarter").unwrap(),
            Frequency::Interval { micros: 90 * MICROS_PER_DAY }
        );
        assert_eq!(
            Frequency::parse("1Y").unwrap(),
            Frequency::Interval { micros: 365 * MICROS_PER_DAY }
        );
    }

    #[test]
    fn test_parse_integer_step() {
        assert_eq!(Frequency::parse("2").unwrap(), Frequency::Step(2));
        assert_eq!(Frequency::parse(" 10 ").unwrap(), Frequency::Step(10));
        assert!(Frequency::parse("0").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "  ", "2d", "1fortnight", "-3", "1.5h", "monthly"] {
            assert!(Frequency::parse(bad).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn test_axis_compatibility() {
        let day = Frequency::parse("1d").unwrap();
        let hour = Frequency::parse("1h").unwrap();
        let step = Frequency::parse("1").unwrap();

        assert!(day.validate_for_axis(DateAxisKind::Date).is_ok());
        assert!(hour.validate_for_axis(DateAxisKind::Date).is_err());
        assert!(step.validate_for_axis(DateAxisKind::Date).is_err());

        assert!(step.validate_for_axis(DateAxisKind::Integer).is_ok());
        assert!(day.validate_for_axis(DateAxisKind::Integer).is_err());

        assert!(day.validate_for_axis(DateAxisKind::Timestamp).is_ok());
        assert!(hour.validate_for_axis(DateAxisKind::Timestamp).is_ok());
        assert!(step.validate_for_axis(DateAxisKind::Timestamp).is_ok());
    }

    #[test]
    fn test_step_for_axis_units() {
        let week = Frequency::parse("1w").unwrap();
        assert_eq!(week.step_for_axis(DateAxisKind::Date), 7);
        assert_eq!(week.step_for_axis(DateAxisKind::Timestamp), 7 * MICROS_PER_DAY);
    }

    #[test]
    fn test_generate_range() {
        assert_eq!(generate_range(1, 5, 2), vec![1, 3, 5]);
        assert_eq!(generate_range(1, 5, 1), vec![1, 2, 3, 4, 5]);
        assert_eq!(generate_range(5, 1, 1), Vec::<i64>::new());
    }
}
