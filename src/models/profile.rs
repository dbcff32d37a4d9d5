//! Profile data the scheduling core reads to derive birthday texts and gift
//! reminders. Profiles are owned elsewhere; only the fields needed here are
//! modelled.

use serde::{Deserialize, Serialize};

use crate::time::recurrence::MonthDay;
use crate::Result;

/// Birthday as recorded on a profile. The year is optional.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Birthday {
    /// Recurring month/day.
    pub month_day: MonthDay,
    /// Birth year, when known.
    pub year: Option<i32>,
}

impl Birthday {
    /// Construct a validated birthday.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` if month/day is not a calendar date.
    pub fn new(month: u32, day: u32, year: Option<i32>) -> Result<Self> {
        Ok(Self {
            month_day: MonthDay::new(month, day)?,
            year,
        })
    }
}

/// A person the user keeps track of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Store-assigned profile identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Phone number used for birthday texts.
    pub phone: Option<String>,
    /// Birthday, if recorded.
    pub birthday: Option<Birthday>,
}
