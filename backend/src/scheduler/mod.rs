//! Calendar rules for the practice.
//!
//! Pure date arithmetic over small in-memory collections, kept free of any
//! repository access so the service layer and the tests can drive it
//! directly:
//!
//! - [`recurrence`]: series expansion and series shifting
//! - [`availability`]: weekly template / override / vacation resolution and
//!   bookable slot generation
//! - [`window`]: meeting access window checks

pub mod availability;
pub mod recurrence;
pub mod window;

pub use availability::{
    generate_slots, local_to_utc, month_overview, resolve_day, AvailabilitySource,
    DayAvailability, DayOverview, OpeningHours, SlotRules, TimeSlot, SUPPORTED_YEARS,
};
pub use recurrence::{
    expand_occurrences, select_scope, Occurrence, SeriesScope, SeriesShift, MAX_OCCURRENCES,
};
pub use window::{access_window, AccessState, AccessWindow};
