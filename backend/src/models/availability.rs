use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::api::ExceptionId;
use crate::define_text_enum;

/// One weekday entry of the weekly availability template.
///
/// `weekday` uses ISO numbering: 1 = Monday through 7 = Sunday. Times are
/// local to the practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub weekday: u8,
    pub is_open: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl WorkingHours {
    pub fn open(weekday: Weekday, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            weekday: weekday.number_from_monday() as u8,
            is_open: true,
            start_time,
            end_time,
        }
    }

    pub fn closed(weekday: Weekday) -> Self {
        Self {
            weekday: weekday.number_from_monday() as u8,
            is_open: false,
            start_time: NaiveTime::MIN,
            end_time: NaiveTime::MIN,
        }
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        u32::from(self.weekday) == date.weekday().number_from_monday()
    }
}

/// Monday to Friday 09:00-17:00, weekends closed.
pub fn default_working_hours() -> Vec<WorkingHours> {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
    let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN);
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .map(|day| match day {
        Weekday::Sat | Weekday::Sun => WorkingHours::closed(day),
        _ => WorkingHours::open(day, nine, five),
    })
    .collect()
}

define_text_enum!(
    /// Kind of date-specific availability override.
    ExceptionKind {
        Closed => "closed",
        CustomHours => "custom_hours",
        Vacation => "vacation",
    }
);

/// Date-specific override superseding the weekly template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityException {
    pub id: ExceptionId,
    pub kind: ExceptionKind,
    pub start_date: NaiveDate,
    /// Inclusive. Equal to `start_date` for single-day overrides.
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityException {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn overlaps_range(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start_date <= to && from <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAvailabilityException {
    pub kind: ExceptionKind,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl NewAvailabilityException {
    pub fn effective_end_date(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date)
    }
}
