//! Conversion of user-facing date/time input into absolute instants.
//!
//! Everything here is pure: callers supply the timezone that counts as
//! "local" and, where relevant, the current instant.

use std::time::Duration;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};

use crate::{AppError, Result};

/// AM/PM marker of a 12-hour clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    /// Before noon.
    Am,
    /// Noon and after.
    Pm,
}

impl Meridiem {
    /// Parse `"AM"` or `"PM"`, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` for anything else.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AM" => Ok(Self::Am),
            "PM" => Ok(Self::Pm),
            _ => Err(AppError::MalformedInput(format!(
                "expected AM or PM, got {s:?}"
            ))),
        }
    }
}

/// Convert a 12-hour clock hour (1..=12) to a 24-hour hour (0..=23).
///
/// 12 AM is midnight (0) and 12 PM stays 12.
///
/// # Errors
///
/// Returns `AppError::MalformedInput` if `hour` is outside 1..=12.
pub fn to_24_hour(hour: u32, meridiem: Meridiem) -> Result<u32> {
    if !(1..=12).contains(&hour) {
        return Err(AppError::MalformedInput(format!(
            "12-hour clock hour out of range: {hour}"
        )));
    }
    Ok(match (hour, meridiem) {
        (12, Meridiem::Am) => 0,
        (12, Meridiem::Pm) => 12,
        (h, Meridiem::Am) => h,
        (h, Meridiem::Pm) => h + 12,
    })
}

/// Resolve a wall-clock reading in `tz` to an instant.
///
/// Ambiguous readings (DST fall-back) resolve to the earlier instant.
///
/// # Errors
///
/// Returns `AppError::MalformedInput` if the reading does not exist in `tz`
/// (DST spring-forward gap).
pub fn resolve_local<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(AppError::MalformedInput(format!(
            "{naive} does not exist in the local timezone"
        ))),
    }
}

/// Combine the calendar date of `date_pick` with the hour and minute of
/// `time_pick`, seconds zeroed, in the pickers' timezone.
///
/// No future-time validation happens here.
///
/// # Errors
///
/// Returns `AppError::MalformedInput` if the combined wall-clock time does
/// not exist in the timezone.
pub fn build_from_pickers<Z: TimeZone>(
    date_pick: &DateTime<Z>,
    time_pick: &DateTime<Z>,
) -> Result<DateTime<Utc>> {
    let date = date_pick.date_naive();
    let time = NaiveTime::from_hms_opt(time_pick.hour(), time_pick.minute(), 0)
        .ok_or_else(|| AppError::MalformedInput("invalid picker time".into()))?;
    resolve_local(&date_pick.timezone(), date.and_time(time))
}

/// Build an instant from `"YYYY-MM-DD"`, `"hh:mm"` and `"AM"`/`"PM"` in `tz`.
///
/// # Errors
///
/// Returns `AppError::MalformedInput` if any component has the wrong shape
/// or names an impossible date or time.
pub fn build_from_components<Z: TimeZone>(
    tz: &Z,
    date: &str,
    time: &str,
    ampm: &str,
) -> Result<DateTime<Utc>> {
    let date = parse_date(date)?;
    let (hour12, minute) = parse_clock(time)?;
    let hour = to_24_hour(hour12, Meridiem::parse(ampm)?)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| AppError::MalformedInput(format!("invalid time {hour}:{minute}")))?;
    resolve_local(tz, date.and_time(time))
}

/// Reject `fire_at` unless it is at least `min_lead` after `now`.
///
/// # Errors
///
/// Returns `AppError::PastOrTooSoon` if `fire_at < now + min_lead`, or
/// `AppError::MalformedInput` if `now + min_lead` is not a representable time.
pub fn ensure_future(
    fire_at: DateTime<Utc>,
    now: DateTime<Utc>,
    min_lead: Duration,
) -> Result<()> {
    let lead = chrono::Duration::from_std(min_lead)
        .map_err(|_| AppError::MalformedInput("minimum lead time out of range".into()))?;
    let earliest = now
        .checked_add_signed(lead)
        .ok_or_else(|| AppError::MalformedInput("minimum lead time out of range".into()))?;
    if fire_at < earliest {
        return Err(AppError::PastOrTooSoon(format!(
            "fire time {} is before the earliest allowed {}",
            fire_at.to_rfc3339(),
            earliest.to_rfc3339()
        )));
    }
    Ok(())
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let malformed = || AppError::MalformedInput(format!("expected YYYY-MM-DD, got {s:?}"));

    let mut parts = s.trim().split('-');
    let (Some(year), Some(month), Some(day), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return Err(malformed());
    }
    if ![year, month, day].iter().all(|p| all_digits(p)) {
        return Err(malformed());
    }

    let year: i32 = year.parse().map_err(|_| malformed())?;
    let month: u32 = month.parse().map_err(|_| malformed())?;
    let day: u32 = day.parse().map_err(|_| malformed())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)
}

fn parse_clock(s: &str) -> Result<(u32, u32)> {
    let malformed = || AppError::MalformedInput(format!("expected hh:mm, got {s:?}"));

    let (hour, minute) = s.trim().split_once(':').ok_or_else(malformed)?;
    if !(1..=2).contains(&hour.len()) || minute.len() != 2 {
        return Err(malformed());
    }
    if !all_digits(hour) || !all_digits(minute) {
        return Err(malformed());
    }

    let hour: u32 = hour.parse().map_err(|_| malformed())?;
    let minute: u32 = minute.parse().map_err(|_| malformed())?;
    if minute > 59 {
        return Err(malformed());
    }
    Ok((hour, minute))
}
