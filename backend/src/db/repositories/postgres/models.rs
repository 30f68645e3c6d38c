use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use std::str::FromStr;
use uuid::Uuid;

use super::schema::{
    appointments, availability_exceptions, clients, invoices, notes, scheduled_emails,
    working_hours,
};
use crate::api::*;
use crate::db::repository::{RepositoryError, RepositoryResult};

/// Parse a text column into one of the snake_case enums.
fn parse_text<T: FromStr<Err = String>>(value: &str) -> RepositoryResult<T> {
    T::from_str(value).map_err(RepositoryError::internal)
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = clients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClientRow {
    pub client_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub default_rate_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientRow {
    pub fn into_client(self) -> RepositoryResult<Client> {
        Ok(Client {
            id: ClientId::new(self.client_id),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            status: parse_text(&self.status)?,
            default_rate_cents: self.default_rate_cents,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = clients)]
pub struct NewClientRow {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub default_rate_cents: Option<i64>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = clients)]
pub struct ClientChangeset {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<Option<String>>,
    pub status: Option<String>,
    pub default_rate_cents: Option<Option<i64>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AppointmentRow {
    pub appointment_id: i64,
    pub client_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: String,
    pub status: String,
    pub location: Option<String>,
    pub rate_cents: i64,
    pub host_attended: bool,
    pub client_attended: bool,
    pub recurring_group_id: Option<Uuid>,
    pub recurrence: Option<String>,
    pub meeting_room: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRow {
    pub fn into_appointment(self) -> RepositoryResult<Appointment> {
        Ok(Appointment {
            id: AppointmentId::new(self.appointment_id),
            client_id: ClientId::new(self.client_id),
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            appointment_type: parse_text(&self.appointment_type)?,
            status: parse_text(&self.status)?,
            location: self.location,
            rate_cents: self.rate_cents,
            host_attended: self.host_attended,
            client_attended: self.client_attended,
            recurring_group_id: self.recurring_group_id,
            recurrence: self.recurrence.as_deref().map(parse_text).transpose()?,
            meeting_room: self.meeting_room,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = appointments)]
pub struct NewAppointmentRow {
    pub client_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: String,
    pub status: String,
    pub location: Option<String>,
    pub rate_cents: i64,
    pub recurring_group_id: Option<Uuid>,
    pub recurrence: Option<String>,
    pub meeting_room: Option<String>,
}

impl From<&NewAppointment> for NewAppointmentRow {
    fn from(a: &NewAppointment) -> Self {
        Self {
            client_id: a.client_id.value(),
            title: a.title.clone(),
            description: a.description.clone(),
            start_time: a.start_time,
            end_time: a.end_time,
            appointment_type: a.appointment_type.as_str().to_string(),
            status: AppointmentStatus::Scheduled.as_str().to_string(),
            location: a.location.clone(),
            rate_cents: a.rate_cents,
            recurring_group_id: a.recurring_group_id,
            recurrence: a.recurrence.map(|r| r.as_str().to_string()),
            meeting_room: a.meeting_room.clone(),
        }
    }
}

/// Full overwrite of the mutable appointment columns.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = appointments)]
#[diesel(treat_none_as_null = true)]
pub struct AppointmentChangeset {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: String,
    pub status: String,
    pub location: Option<String>,
    pub rate_cents: i64,
    pub host_attended: bool,
    pub client_attended: bool,
    pub recurring_group_id: Option<Uuid>,
    pub recurrence: Option<String>,
    pub meeting_room: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentChangeset {
    pub fn from_appointment(a: &Appointment, now: DateTime<Utc>) -> Self {
        Self {
            title: a.title.clone(),
            description: a.description.clone(),
            start_time: a.start_time,
            end_time: a.end_time,
            appointment_type: a.appointment_type.as_str().to_string(),
            status: a.status.as_str().to_string(),
            location: a.location.clone(),
            rate_cents: a.rate_cents,
            host_attended: a.host_attended,
            client_attended: a.client_attended,
            recurring_group_id: a.recurring_group_id,
            recurrence: a.recurrence.map(|r| r.as_str().to_string()),
            meeting_room: a.meeting_room.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = invoices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InvoiceRow {
    pub invoice_id: i64,
    pub client_id: i64,
    pub appointment_id: Option<i64>,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub status: String,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
}

impl InvoiceRow {
    pub fn into_invoice(self) -> RepositoryResult<Invoice> {
        Ok(Invoice {
            id: InvoiceId::new(self.invoice_id),
            client_id: ClientId::new(self.client_id),
            appointment_id: self.appointment_id.map(AppointmentId::new),
            invoice_number: self.invoice_number,
            amount_cents: self.amount_cents,
            status: parse_text(&self.status)?,
            description: self.description,
            issued_at: self.issued_at,
            due_date: self.due_date,
            paid_at: self.paid_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invoices)]
pub struct NewInvoiceRow {
    pub client_id: i64,
    pub appointment_id: Option<i64>,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub status: String,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: NaiveDate,
}

impl From<&NewInvoice> for NewInvoiceRow {
    fn from(i: &NewInvoice) -> Self {
        Self {
            client_id: i.client_id.value(),
            appointment_id: i.appointment_id.map(|a| a.value()),
            invoice_number: i.invoice_number.clone(),
            amount_cents: i.amount_cents,
            status: InvoiceStatus::Unpaid.as_str().to_string(),
            description: i.description.clone(),
            issued_at: i.issued_at,
            due_date: i.due_date,
        }
    }
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = invoices)]
#[diesel(treat_none_as_null = true)]
pub struct InvoiceChangeset {
    pub amount_cents: i64,
    pub status: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Invoice> for InvoiceChangeset {
    fn from(i: &Invoice) -> Self {
        Self {
            amount_cents: i.amount_cents,
            status: i.status.as_str().to_string(),
            description: i.description.clone(),
            due_date: i.due_date,
            paid_at: i.paid_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NoteRow {
    pub note_id: i64,
    pub client_id: i64,
    pub appointment_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Note {
            id: NoteId::new(row.note_id),
            client_id: ClientId::new(row.client_id),
            appointment_id: row.appointment_id.map(AppointmentId::new),
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNoteRow {
    pub client_id: i64,
    pub appointment_id: Option<i64>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = notes)]
pub struct NoteChangeset {
    pub title: Option<String>,
    pub content: Option<String>,
    pub appointment_id: Option<Option<i64>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = working_hours)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkingHoursRow {
    pub weekday: i16,
    pub is_open: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl From<WorkingHoursRow> for WorkingHours {
    fn from(row: WorkingHoursRow) -> Self {
        WorkingHours {
            weekday: row.weekday as u8,
            is_open: row.is_open,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

impl From<&WorkingHours> for WorkingHoursRow {
    fn from(h: &WorkingHours) -> Self {
        Self {
            weekday: i16::from(h.weekday),
            is_open: h.is_open,
            start_time: h.start_time,
            end_time: h.end_time,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = availability_exceptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ExceptionRow {
    pub exception_id: i64,
    pub kind: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExceptionRow {
    pub fn into_exception(self) -> RepositoryResult<AvailabilityException> {
        Ok(AvailabilityException {
            id: ExceptionId::new(self.exception_id),
            kind: parse_text(&self.kind)?,
            start_date: self.start_date,
            end_date: self.end_date,
            start_time: self.start_time,
            end_time: self.end_time,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = availability_exceptions)]
#[diesel(treat_none_as_null = true)]
pub struct ExceptionValues {
    pub kind: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = scheduled_emails)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EmailRow {
    pub email_id: i64,
    pub appointment_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub recipient: String,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EmailRow {
    pub fn into_email(self) -> RepositoryResult<ScheduledEmail> {
        Ok(ScheduledEmail {
            id: EmailId::new(self.email_id),
            appointment_id: self.appointment_id.map(AppointmentId::new),
            invoice_id: self.invoice_id.map(InvoiceId::new),
            recipient: self.recipient,
            kind: parse_text(&self.kind)?,
            subject: self.subject,
            body: self.body,
            send_at: self.send_at,
            status: parse_text(&self.status)?,
            sent_at: self.sent_at,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = scheduled_emails)]
pub struct NewEmailRow {
    pub appointment_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub recipient: String,
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub status: String,
}

impl From<&NewScheduledEmail> for NewEmailRow {
    fn from(e: &NewScheduledEmail) -> Self {
        Self {
            appointment_id: e.appointment_id.map(|a| a.value()),
            invoice_id: e.invoice_id.map(|i| i.value()),
            recipient: e.recipient.clone(),
            kind: e.kind.as_str().to_string(),
            subject: e.subject.clone(),
            body: e.body.clone(),
            send_at: e.send_at,
            status: EmailStatus::Pending.as_str().to_string(),
        }
    }
}
