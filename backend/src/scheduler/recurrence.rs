//! Recurring appointment series.

use chrono::{DateTime, Duration, FixedOffset, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::define_text_enum;
use crate::models::{Appointment, RecurrencePattern};

/// Upper bound on the number of occurrences a single series may expand to.
pub const MAX_OCCURRENCES: usize = 100;

/// One expanded member of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Start of the `n`-th occurrence (0-based), computed from the series start
/// so that month-end clamping never drifts later occurrences.
fn nth_start(
    local_start: DateTime<FixedOffset>,
    pattern: RecurrencePattern,
    n: u32,
) -> Option<DateTime<FixedOffset>> {
    match pattern {
        RecurrencePattern::Weekly => {
            local_start.checked_add_signed(Duration::weeks(i64::from(n)))
        }
        RecurrencePattern::Biweekly => {
            local_start.checked_add_signed(Duration::weeks(2 * i64::from(n)))
        }
        RecurrencePattern::Monthly => local_start.checked_add_months(Months::new(n)),
    }
}

/// Expand a series starting at `[start, end)` up to and including the local
/// date `until`, capped at [`MAX_OCCURRENCES`].
pub fn expand_occurrences(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pattern: RecurrencePattern,
    until: NaiveDate,
    offset: FixedOffset,
) -> Vec<Occurrence> {
    let duration = end - start;
    let local_start = start.with_timezone(&offset);
    let mut occurrences = Vec::new();

    for n in 0..MAX_OCCURRENCES as u32 {
        let Some(next) = nth_start(local_start, pattern, n) else {
            break;
        };
        if next.date_naive() > until {
            break;
        }
        let next = next.with_timezone(&Utc);
        occurrences.push(Occurrence {
            start: next,
            end: next + duration,
        });
    }

    occurrences
}

/// Day and time-of-day deltas moving one occurrence of a series to a new
/// start, optionally with a new duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesShift {
    pub days: i64,
    /// Signed difference of local times of day, in seconds.
    pub time_seconds: i64,
    /// Replacement duration in seconds; `None` keeps each occurrence's own.
    pub duration_seconds: Option<i64>,
}

impl SeriesShift {
    /// Shift that moves `old_start` onto `new_start`, split into whole local
    /// days plus a time-of-day delta.
    pub fn between(
        old_start: DateTime<Utc>,
        new_start: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        let old = old_start.with_timezone(&offset);
        let new = new_start.with_timezone(&offset);
        let days = (new.date_naive() - old.date_naive()).num_days();
        let time_seconds = (new.time() - old.time()).num_seconds();
        Self {
            days,
            time_seconds,
            duration_seconds: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_seconds = Some(duration.num_seconds());
        self
    }

    pub fn offset(&self) -> Duration {
        Duration::days(self.days) + Duration::seconds(self.time_seconds)
    }

    pub fn is_noop(&self) -> bool {
        self.days == 0 && self.time_seconds == 0 && self.duration_seconds.is_none()
    }

    /// Apply the shift to one occurrence.
    pub fn apply(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Occurrence {
        let duration = self
            .duration_seconds
            .map(Duration::seconds)
            .unwrap_or(end - start);
        let start = start + self.offset();
        Occurrence {
            start,
            end: start + duration,
        }
    }
}

define_text_enum!(
    /// Which members of a series an operation touches.
    SeriesScope {
        Single => "single",
        Following => "following",
        All => "all",
    }
);

impl Default for SeriesScope {
    fn default() -> Self {
        SeriesScope::Single
    }
}

/// Pick the members of `series` addressed by `scope` relative to `reference`.
///
/// `series` may be in any order; the result is ordered by start time. A
/// non-recurring reference always yields just itself.
pub fn select_scope<'a>(
    series: &'a [Appointment],
    reference: &'a Appointment,
    scope: SeriesScope,
) -> Vec<&'a Appointment> {
    if reference.recurring_group_id.is_none() || scope == SeriesScope::Single {
        return vec![reference];
    }

    let mut selected: Vec<&Appointment> = series
        .iter()
        .filter(|a| a.recurring_group_id == reference.recurring_group_id)
        .filter(|a| match scope {
            SeriesScope::Following => a.start_time >= reference.start_time,
            _ => true,
        })
        .collect();
    selected.sort_by_key(|a| a.start_time);
    selected
}
