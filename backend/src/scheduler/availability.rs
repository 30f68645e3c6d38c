//! Availability resolution and bookable slot generation.

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AvailabilityException, ExceptionKind, WorkingHours};

/// Calendar years accepted from callers. Time arithmetic inside this range
/// cannot leave chrono's representable span.
pub const SUPPORTED_YEARS: RangeInclusive<i32> = 1900..=9999;

/// Which rule decided a day's availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilitySource {
    /// A `closed` or `custom_hours` override covering the date.
    Exception,
    Vacation,
    WeeklyTemplate,
    /// No rule matched; the day is closed.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Resolved availability of one local date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    /// `None` when the practice is closed.
    pub hours: Option<OpeningHours>,
    pub source: AvailabilitySource,
}

impl DayAvailability {
    fn closed(date: NaiveDate, source: AvailabilitySource) -> Self {
        Self {
            date,
            hours: None,
            source,
        }
    }

    fn open(date: NaiveDate, start: NaiveTime, end: NaiveTime, source: AvailabilitySource) -> Self {
        if start < end {
            Self {
                date,
                hours: Some(OpeningHours { start, end }),
                source,
            }
        } else {
            Self::closed(date, source)
        }
    }

    pub fn is_open(&self) -> bool {
        self.hours.is_some()
    }
}

/// Resolve a date: date-specific override, then vacation, then the weekly
/// template, else closed.
///
/// When several overrides cover the same date the most recently created one
/// wins.
pub fn resolve_day(
    date: NaiveDate,
    template: &[WorkingHours],
    exceptions: &[AvailabilityException],
) -> DayAvailability {
    let override_rule = exceptions
        .iter()
        .filter(|e| e.kind != ExceptionKind::Vacation && e.covers(date))
        .max_by_key(|e| (e.created_at, e.id));

    if let Some(rule) = override_rule {
        return match (rule.kind, rule.start_time, rule.end_time) {
            (ExceptionKind::CustomHours, Some(start), Some(end)) => {
                DayAvailability::open(date, start, end, AvailabilitySource::Exception)
            }
            _ => DayAvailability::closed(date, AvailabilitySource::Exception),
        };
    }

    if exceptions
        .iter()
        .any(|e| e.kind == ExceptionKind::Vacation && e.covers(date))
    {
        return DayAvailability::closed(date, AvailabilitySource::Vacation);
    }

    match template.iter().find(|h| h.applies_to(date)) {
        Some(hours) if hours.is_open => DayAvailability::open(
            date,
            hours.start_time,
            hours.end_time,
            AvailabilitySource::WeeklyTemplate,
        ),
        Some(_) => DayAvailability::closed(date, AvailabilitySource::WeeklyTemplate),
        None => DayAvailability::closed(date, AvailabilitySource::Default),
    }
}

/// Convert a practice-local date and time to UTC.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    (date.and_time(time) - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// A bookable interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Parameters shaping slot generation.
#[derive(Debug, Clone, Copy)]
pub struct SlotRules {
    pub duration: Duration,
    pub step: Duration,
    /// Gap required on both sides of every busy interval.
    pub buffer: Duration,
    /// No slot may start before this instant (minimum notice).
    pub earliest: DateTime<Utc>,
    /// No slot may start after this instant (booking horizon).
    pub latest: Option<DateTime<Utc>>,
}

/// Free slots of a resolved day.
///
/// Candidates start at opening time and advance by `rules.step`; a candidate
/// is kept when it ends by closing time, respects the notice and horizon
/// limits, and stays clear of every busy interval widened by the buffer.
pub fn generate_slots(
    day: &DayAvailability,
    offset: FixedOffset,
    rules: &SlotRules,
    busy: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<TimeSlot> {
    let Some(hours) = day.hours else {
        return Vec::new();
    };
    if rules.duration <= Duration::zero() || rules.step <= Duration::zero() {
        return Vec::new();
    }

    let close = local_to_utc(day.date, hours.end, offset);
    let mut cursor = local_to_utc(day.date, hours.start, offset);
    let mut slots = Vec::new();

    while cursor + rules.duration <= close {
        let end = cursor + rules.duration;
        let too_early = cursor < rules.earliest;
        let too_late = rules.latest.is_some_and(|latest| cursor > latest);
        let blocked = busy
            .iter()
            .any(|(start, stop)| cursor < *stop + rules.buffer && *start - rules.buffer < end);

        if !too_early && !too_late && !blocked {
            slots.push(TimeSlot { start: cursor, end });
        }
        cursor += rules.step;
    }

    slots
}

/// Per-day booking summary used by the month calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOverview {
    pub date: NaiveDate,
    pub open: bool,
    pub free_slots: usize,
}

/// Summaries for every day of `year`/`month`. Returns an empty list for an
/// invalid month.
pub fn month_overview(
    year: i32,
    month: u32,
    template: &[WorkingHours],
    exceptions: &[AvailabilityException],
    offset: FixedOffset,
    rules: &SlotRules,
    busy: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<DayOverview> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| {
            let day = resolve_day(date, template, exceptions);
            let free_slots = generate_slots(&day, offset, rules, busy).len();
            DayOverview {
                date,
                open: day.is_open(),
                free_slots,
            }
        })
        .collect()
}
