//! Yearly recurrence arithmetic for birthdays and the offsets derived from
//! them.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::builder::resolve_local;
use crate::{AppError, Result};

/// A recurring calendar month and day. Feb 29 is allowed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RawMonthDay")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

#[derive(Deserialize)]
struct RawMonthDay {
    month: u32,
    day: u32,
}

impl TryFrom<RawMonthDay> for MonthDay {
    type Error = AppError;

    fn try_from(raw: RawMonthDay) -> Result<Self> {
        Self::new(raw.month, raw.day)
    }
}

impl MonthDay {
    /// Construct a validated month/day.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` if the pair is not a day of any year.
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // 2000 is a leap year, so Feb 29 validates.
        NaiveDate::from_ymd_opt(2000, month, day)
            .map(|_| Self { month, day })
            .ok_or_else(|| {
                AppError::MalformedInput(format!("invalid month/day {month:02}-{day:02}"))
            })
    }

    /// Month, 1-based.
    #[must_use]
    pub fn month(self) -> u32 {
        self.month
    }

    /// Day of month, 1-based.
    #[must_use]
    pub fn day(self) -> u32 {
        self.day
    }

    /// The calendar date of this month/day in `year`. Feb 29 falls back to
    /// Feb 28 in non-leap years.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` if `year` is out of chrono's range.
    pub fn date_in(self, year: i32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .or_else(|| {
                if self.month == 2 && self.day == 29 {
                    NaiveDate::from_ymd_opt(year, 2, 28)
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                AppError::MalformedInput(format!(
                    "{:02}-{:02} has no date in {year}",
                    self.month, self.day
                ))
            })
    }
}

/// Next occurrence of `month_day` at `hour`:00 local that is strictly after
/// `from`. If this year's occurrence has passed, next year's is returned.
///
/// # Errors
///
/// Returns `AppError::MalformedInput` if `hour` is not a valid hour or the
/// local time does not exist in `tz`.
pub fn next_yearly_occurrence<Z: TimeZone>(
    tz: &Z,
    month_day: MonthDay,
    hour: u32,
    from: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| AppError::MalformedInput(format!("invalid hour {hour}")))?;
    let year = from.with_timezone(tz).year();

    for candidate_year in year..=year + 1 {
        let candidate = resolve_local(tz, month_day.date_in(candidate_year)?.and_time(at))?;
        if candidate > from {
            return Ok(candidate);
        }
    }

    Err(AppError::MalformedInput(format!(
        "no occurrence of {:02}-{:02} after {}",
        month_day.month,
        month_day.day,
        from.to_rfc3339()
    )))
}

/// Subtract `days` calendar days from `instant`, keeping the local
/// wall-clock time in `tz`.
///
/// # Errors
///
/// Returns `AppError::MalformedInput` if the result is out of range or does
/// not exist in `tz`.
pub fn minus_days<Z: TimeZone>(tz: &Z, instant: DateTime<Utc>, days: u64) -> Result<DateTime<Utc>> {
    let local = instant.with_timezone(tz).naive_local();
    let shifted = local
        .checked_sub_days(Days::new(days))
        .ok_or_else(|| AppError::MalformedInput(format!("cannot subtract {days} days")))?;
    resolve_local(tz, shifted)
}

/// First instant `lead_days` before a yearly occurrence of `month_day` that
/// is not earlier than `earliest`.
///
/// Starts from the occurrence after `now`; when its offset is already
/// earlier than `earliest` the following year's occurrence is used.
///
/// # Errors
///
/// Propagates errors from [`next_yearly_occurrence`] and [`minus_days`].
pub fn next_lead_occurrence<Z: TimeZone>(
    tz: &Z,
    month_day: MonthDay,
    hour: u32,
    lead_days: u64,
    now: DateTime<Utc>,
    earliest: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let mut occurrence = next_yearly_occurrence(tz, month_day, hour, now)?;
    for _ in 0..=lead_days / 365 + 1 {
        let candidate = minus_days(tz, occurrence, lead_days)?;
        if candidate >= earliest {
            return Ok(candidate);
        }
        occurrence = next_yearly_occurrence(tz, month_day, hour, occurrence)?;
    }

    Err(AppError::MalformedInput(format!(
        "no gift reminder date found {lead_days} days before {:02}-{:02}",
        month_day.month, month_day.day
    )))
}
