//! Public API surface for the practice backend.
//!
//! This file consolidates identifiers and the DTO types shared by the HTTP
//! layer. All types derive Serialize/Deserialize for JSON serialization.

use crate::define_id_type;

define_id_type!(i64, ClientId);
define_id_type!(i64, AppointmentId);
define_id_type!(i64, InvoiceId);
define_id_type!(i64, NoteId);
define_id_type!(i64, ExceptionId);
define_id_type!(i64, EmailId);

pub use crate::models::{
    Appointment, AppointmentChanges, AppointmentFilter, AppointmentStatus, AppointmentType,
    AvailabilityException, Client, ClientChanges, ClientFilter, ClientStatus, EmailFilter,
    EmailKind, EmailStatus, ExceptionKind, Invoice, InvoiceFilter, InvoiceStatus,
    NewAppointment, NewAvailabilityException, NewClient, NewInvoice, NewNote, NewScheduledEmail,
    Note, NoteChanges, Participant, RecurrencePattern, ScheduledEmail, WorkingHours,
};
pub use crate::scheduler::{
    AccessState, AvailabilitySource, DayAvailability, DayOverview, OpeningHours, SeriesScope,
    TimeSlot,
};
pub use crate::services::appointments::{
    CreateAppointmentRequest, CreatedAppointments, RecurrenceRequest, SeriesUpdate,
};
pub use crate::services::booking::{BookingConfirmation, BookingRequest};
pub use crate::services::dashboard::{DashboardStats, MonthlyRevenue, StatusCounts};
pub use crate::services::invoices::{CreateInvoiceRequest, InvoiceChanges};
pub use crate::services::meeting::{MeetingClaims, MeetingContext, MeetingLink, MeetingUser};
pub use crate::services::notifications::DispatchSummary;

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
