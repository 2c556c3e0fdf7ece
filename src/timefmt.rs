//! Conversions between the wire/display time formats and the canonical stored
//! instant.
//!
//! Stored instants follow the legacy convention the existing data uses: the
//! studio-local wall-clock time advanced by the studio's UTC offset, formatted
//! with a literal `Z` suffix even though the value is not true UTC. The display
//! path reverses that by subtracting `(offset - home_offset)` hours, where
//! `home_offset` is the operations team's home timezone (3 = Moscow unless
//! reconfigured). Composing the two transforms shifts a wall-clock time by
//! exactly `home_offset` hours; see the round-trip test below.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::error::{AppError, AppResult};

/// Wall-clock format accepted on the wire and shown in chat messages.
pub const INPUT_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
/// Stored canonical format. The `Z` is a literal marker, not a timezone claim.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const DISPLAY_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a studio's stored UTC offset ("3", "-4", "5.5").
pub fn parse_offset_hours(text: &str) -> AppResult<f64> {
    let parsed: f64 = text
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid UTC offset: {:?}", text)))?;
    if !parsed.is_finite() || parsed.abs() > 26.0 {
        return Err(AppError::BadRequest(format!(
            "UTC offset out of range: {:?}",
            text
        )));
    }
    Ok(parsed)
}

/// Fractional offsets are rounded to whole minutes ("5.5" -> 330 minutes).
fn offset_minutes(offset_hours: f64) -> Duration {
    Duration::minutes((offset_hours * 60.0).round() as i64)
}

/// Convert a `DD.MM.YYYY HH:mm:ss` local time into the canonical stored text
/// by advancing it by the studio's UTC offset.
pub fn local_to_canonical(text: &str, offset_hours: f64) -> AppResult<String> {
    let local = NaiveDateTime::parse_from_str(text.trim(), INPUT_FORMAT).map_err(|_| {
        AppError::BadRequest(format!(
            "invalid time {:?}, expected DD.MM.YYYY HH:mm:ss",
            text
        ))
    })?;
    Ok((local + offset_minutes(offset_hours))
        .format(CANONICAL_FORMAT)
        .to_string())
}

/// Parse a canonical stored instant. Tolerates fractional seconds, which some
/// legacy records carry.
pub fn parse_canonical(text: &str) -> AppResult<NaiveDateTime> {
    let trimmed = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| AppError::Validation(format!("invalid stored instant {:?}", text)))
}

/// The instant used for display and for ordering event listings:
/// canonical time shifted back by `(offset - home_offset)` hours.
pub fn shifted_instant(
    canonical: &str,
    offset_hours: f64,
    home_offset_hours: i64,
) -> AppResult<NaiveDateTime> {
    Ok(parse_canonical(canonical)? - offset_minutes(offset_hours)
        + Duration::hours(home_offset_hours))
}

/// Render a stored instant for an event listing.
///
/// Recurring events show their next occurrence: the stored day/time in the
/// current year and month (day clamped to the month's length), formatted as a
/// wall-clock string. Everything else formats as ISO.
pub fn canonical_to_display(
    canonical: &str,
    offset_hours: f64,
    recurring: bool,
    home_offset_hours: i64,
    now: NaiveDateTime,
) -> AppResult<String> {
    let shifted = shifted_instant(canonical, offset_hours, home_offset_hours)?;
    if recurring {
        Ok(with_current_year_month(shifted, now)
            .format(INPUT_FORMAT)
            .to_string())
    } else {
        Ok(shifted.format(DISPLAY_ISO_FORMAT).to_string())
    }
}

/// Format a stored instant for a chat message, falling back to the raw text
/// when a legacy record does not parse.
pub fn message_time(canonical: &str) -> String {
    parse_canonical(canonical)
        .map(|t| t.format(INPUT_FORMAT).to_string())
        .unwrap_or_else(|_| canonical.trim().to_string())
}

/// Current wall-clock time in the home timezone. All sweep due-time
/// comparisons run against this.
pub fn now_home(home_offset_hours: i64) -> NaiveDateTime {
    Utc::now().naive_utc() + Duration::hours(home_offset_hours)
}

fn with_current_year_month(t: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    let day = t.day().min(days_in_month(now.year(), now.month()));
    NaiveDate::from_ymd_opt(now.year(), now.month(), day)
        .expect("clamped day fits the month")
        .and_time(t.time())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is valid")
        .pred_opt()
        .expect("month has a last day")
        .day()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn local_to_canonical_advances_by_offset() {
        let canonical = local_to_canonical("01.05.2025 10:00:00", 5.0).unwrap();
        assert_eq!(canonical, "2025-05-01T15:00:00Z");
    }

    #[test]
    fn fractional_offset_rounds_to_minutes() {
        let canonical = local_to_canonical("01.05.2025 10:00:00", 5.5).unwrap();
        assert_eq!(canonical, "2025-05-01T15:30:00Z");
    }

    #[test]
    fn negative_offset_moves_backwards() {
        let canonical = local_to_canonical("01.05.2025 01:00:00", -2.0).unwrap();
        assert_eq!(canonical, "2025-04-30T23:00:00Z");
    }

    #[test]
    fn rejects_unexpected_input_format() {
        assert!(local_to_canonical("2025-05-01 10:00:00", 3.0).is_err());
        assert!(local_to_canonical("", 3.0).is_err());
    }

    #[test]
    fn round_trip_shifts_by_home_offset() {
        // Composing the store and display transforms moves any wall-clock time
        // forward by exactly the home offset, regardless of the studio offset.
        for offset in [-4.0, 0.0, 3.0, 5.5] {
            let canonical = local_to_canonical("01.05.2025 10:00:00", offset).unwrap();
            let display =
                canonical_to_display(&canonical, offset, false, 3, dt("2025-05-01 00:00:00"))
                    .unwrap();
            assert_eq!(display, "2025-05-01T13:00:00");
        }
    }

    #[test]
    fn parse_canonical_tolerates_fractional_seconds() {
        let t = parse_canonical("2025-05-01T15:00:00.000Z").unwrap();
        assert_eq!(t, dt("2025-05-01 15:00:00"));
    }

    #[test]
    fn recurring_display_uses_current_year_and_month() {
        let display = canonical_to_display(
            "2025-01-31T12:00:00Z",
            3.0,
            true,
            3,
            dt("2026-02-15 00:00:00"),
        )
        .unwrap();
        // Day 31 clamps to February's length.
        assert_eq!(display, "28.02.2026 12:00:00");
    }

    #[test]
    fn message_time_formats_wall_clock() {
        assert_eq!(
            message_time("2025-05-01T15:00:00Z"),
            "01.05.2025 15:00:00"
        );
        // Unparsable legacy values pass through untouched.
        assert_eq!(message_time("garbage"), "garbage");
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(parse_offset_hours(" 5.5 ").unwrap(), 5.5);
        assert_eq!(parse_offset_hours("-4").unwrap(), -4.0);
        assert!(parse_offset_hours("east").is_err());
        assert!(parse_offset_hours("99").is_err());
    }
}
