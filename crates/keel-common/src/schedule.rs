//! Poll schedule validation
//!
//! Schedules use the cron dialect understood by the watcher:
//! - `@every <duration>` with a compact duration (`30s`, `1h30m`, `1.5h`)
//! - predefined descriptors (`@hourly`, `@daily`, `@midnight`, `@weekly`,
//!   `@monthly`, `@yearly`, `@annually`)
//! - six fields `sec min hour day-of-month month day-of-week`
//! - five fields `sec min hour day-of-month month` (day-of-week is `*`)
//!
//! Day-of-week runs 0-6 with Sunday as 0. The `cron` crate numbers days
//! 1-7 from Sunday, so numeric days are shifted before parsing.
//!
//! Validation only answers "would the watcher accept this"; it never
//! computes fire times.

use std::str::FromStr;

use crate::{Error, Result};

const DESCRIPTORS: &[&str] = &[
    "yearly", "annually", "monthly", "weekly", "daily", "midnight", "hourly",
];

/// Duration units and their length in nanoseconds
const DURATION_UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("\u{b5}s", 1e3),
    ("\u{3bc}s", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

/// Check that a poll schedule parses
pub fn validate(schedule: &str) -> Result<()> {
    let trimmed = schedule.trim();
    if trimmed.is_empty() {
        return Err(Error::schedule(schedule, "schedule is empty"));
    }

    if let Some(descriptor) = trimmed.strip_prefix('@') {
        return validate_descriptor(schedule, descriptor);
    }

    let mut fields: Vec<String> = trimmed.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.push("*".to_string()),
        6 => {}
        n => {
            return Err(Error::schedule(
                schedule,
                format!("expected 5 or 6 fields, found {}", n),
            ))
        }
    }
    fields[5] = shift_day_of_week(schedule, &fields[5])?;

    cron::Schedule::from_str(&fields.join(" "))
        .map(|_| ())
        .map_err(|e| Error::schedule(schedule, e.to_string()))
}

fn validate_descriptor(schedule: &str, descriptor: &str) -> Result<()> {
    if let Some(interval) = descriptor.strip_prefix("every ") {
        // sub-second and negative intervals are clamped to one second by the watcher
        return check_interval(interval)
            .map_err(|msg| Error::schedule(schedule, format!("invalid @every duration: {}", msg)));
    }

    if DESCRIPTORS.contains(&descriptor) {
        Ok(())
    } else {
        Err(Error::schedule(
            schedule,
            format!("unrecognized descriptor '@{}'", descriptor),
        ))
    }
}

/// Accept `[+-]<number><unit>...` with optional fractions, e.g. `1h30m`, `.5s`
fn check_interval(interval: &str) -> std::result::Result<(), String> {
    let unsigned = interval.strip_prefix(['+', '-']).unwrap_or(interval);
    if unsigned == "0" {
        return Ok(());
    }
    if unsigned.is_empty() {
        return Err(format!("'{}' is not a duration", interval));
    }

    let mut rest = unsigned;
    let mut total_nanos = 0.0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let value =
            parse_number(number).ok_or_else(|| format!("'{}' is not a duration", interval))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        if unit.is_empty() {
            return Err(format!("missing unit in '{}'", interval));
        }
        let scale = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| format!("unknown unit '{}' in '{}'", unit, interval))?;

        total_nanos += value * scale;
        rest = next;
    }

    if total_nanos > i64::MAX as f64 {
        return Err(format!("'{}' is out of range", interval));
    }
    Ok(())
}

/// Decimal with optional fraction, needing a digit on at least one side of the point
fn parse_number(number: &str) -> Option<f64> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return None;
    }
    let whole = if whole.is_empty() { 0 } else { whole.parse::<u64>().ok()? };
    let fraction = if fraction.is_empty() {
        0.0
    } else {
        format!("0.{}", fraction).parse::<f64>().ok()?
    };
    Some(whole as f64 + fraction)
}

/// Renumber numeric days from 0-6 to 1-7 across lists, ranges and steps
fn shift_day_of_week(schedule: &str, field: &str) -> Result<String> {
    let parts = field
        .split(',')
        .map(|part| -> Result<String> {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = match range.split_once('-') {
                Some((start, end)) => format!(
                    "{}-{}",
                    shift_day(schedule, start)?,
                    shift_day(schedule, end)?
                ),
                None => shift_day(schedule, range)?,
            };
            Ok(match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            })
        })
        .collect::<Result<Vec<String>>>()?;
    Ok(parts.join(","))
}

fn shift_day(schedule: &str, value: &str) -> Result<String> {
    match value.parse::<u8>() {
        Ok(day @ 0..=6) => Ok((day + 1).to_string()),
        Ok(day) => Err(Error::schedule(
            schedule,
            format!("day of week {} is out of range 0-6", day),
        )),
        // names and wildcards need no renumbering
        Err(_) => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_intervals_are_accepted() {
        for s in [
            "@every 1m",
            "@every 5m",
            "@every 30s",
            "@every 1h30m",
            "@every 1.5h",
            "@every .5s",
            "@every 300ms",
            "@every 2h45m30.5s",
        ] {
            assert!(validate(s).is_ok(), "{s} should be valid");
        }
    }

    /// Story: zero intervals are accepted; the watcher polls every second
    #[test]
    fn story_zero_every_is_accepted() {
        assert!(validate("@every 0s").is_ok());
        assert!(validate("@every 0").is_ok());
    }

    #[test]
    fn test_descriptors_are_accepted() {
        for s in ["@hourly", "@daily", "@midnight", "@weekly", "@monthly", "@yearly", "@annually"] {
            assert!(validate(s).is_ok(), "{s} should be valid");
        }
    }

    #[test]
    fn test_field_expressions_are_accepted() {
        // six fields, seconds first
        assert!(validate("0 */5 * * * *").is_ok());
        assert!(validate("0 0 9 * * Mon-Fri").is_ok());
        // five fields, day-of-week defaults to *
        assert!(validate("0 30 * * *").is_ok());
    }

    /// Story: Sunday is day 0, so ranges starting at 0 are valid
    #[test]
    fn story_sunday_is_day_zero() {
        for s in [
            "0 0 9 * * 0",
            "0 0 9 * * 0-6",
            "0 0 9 * * 1,3,5",
            "0 0 9 * * 0/2",
            "0 0 9 * * 6",
            "0 0 9 * * Sun",
        ] {
            assert!(validate(s).is_ok(), "{s} should be valid");
        }
    }

    #[test]
    fn test_day_of_week_seven_is_rejected() {
        let err = validate("0 0 9 * * 7").unwrap_err();
        assert!(err.to_string().contains("out of range 0-6"));
        assert!(validate("0 0 9 * * 1-7").is_err());
    }

    /// Story: an empty schedule label is an explicit override that fails
    #[test]
    fn story_empty_schedule_is_rejected() {
        let err = validate("").unwrap_err();
        assert!(err.to_string().contains("schedule is empty"));
        assert!(validate("   ").is_err());
    }

    #[test]
    fn test_bad_every_durations_are_rejected() {
        for s in [
            "@every",
            "@every banana",
            "@every5m",
            "@every 2 days",
            "@every 5 min",
            "@every 1h 30m",
            "@every  2h",
            "@every 10",
            "@every .",
            "@every 1.2.3s",
            "@every 3d",
        ] {
            assert!(validate(s).is_err(), "{s} should be rejected");
        }
    }

    #[test]
    fn test_every_error_names_the_problem() {
        let err = validate("@every 3d").unwrap_err();
        assert!(err.to_string().contains("unknown unit 'd'"));

        let err = validate("@every 10").unwrap_err();
        assert!(err.to_string().contains("missing unit"));
    }

    #[test]
    fn test_unknown_descriptor_is_rejected() {
        let err = validate("@fortnightly").unwrap_err();
        assert!(err.to_string().contains("@fortnightly"));
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        let err = validate("* * *").unwrap_err();
        assert!(err.to_string().contains("found 3"));
        assert!(validate("0 0 0 1 1 * 2030 extra").is_err());
    }

    #[test]
    fn test_out_of_range_fields_are_rejected() {
        assert!(validate("0 61 * * * *").is_err());
        assert!(validate("not a cron expression at all").is_err());
    }
}
