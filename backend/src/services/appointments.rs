//! Calendar operations: creating sessions and series, editing, shifting,
//! cancelling and attendance tracking.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::*;
use crate::scheduler::{
    expand_occurrences, select_scope, Occurrence, SeriesShift, SUPPORTED_YEARS,
};

use super::{invoices, notifications, Practice, ServiceError, ServiceResult};

/// Repetition of a new appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRequest {
    pub pattern: RecurrencePattern,
    /// Last local date an occurrence may start on.
    pub until: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub client_id: ClientId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Defaults to `booking.default_type`.
    #[serde(default)]
    pub appointment_type: Option<AppointmentType>,
    #[serde(default)]
    pub location: Option<String>,
    /// Defaults to the client's rate, then the practice rate.
    #[serde(default)]
    pub rate_cents: Option<i64>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRequest>,
}

/// Move a series member, and others selected by `scope`, to a new start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesUpdate {
    pub new_start: DateTime<Utc>,
    /// New end of the reference occurrence; sets the duration of every
    /// shifted member.
    #[serde(default)]
    pub new_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: SeriesScope,
}

/// Result of [`create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedAppointments {
    pub appointments: Vec<Appointment>,
    pub invoices: Vec<Invoice>,
}

const DEFAULT_TITLE: &str = "Session";

fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> ServiceResult<()> {
    if end <= start {
        return Err(ServiceError::validation(
            "Appointment end time must be after its start time",
        ));
    }
    check_supported(start)?;
    check_supported(end)
}

fn check_supported(at: DateTime<Utc>) -> ServiceResult<()> {
    if SUPPORTED_YEARS.contains(&at.year()) {
        return Ok(());
    }
    Err(ServiceError::validation(format!(
        "Appointment times must fall in the years {} to {}",
        SUPPORTED_YEARS.start(),
        SUPPORTED_YEARS.end()
    )))
}

fn meeting_room() -> String {
    format!("session-{}", Uuid::new_v4().simple())
}

/// Invoices and emails for freshly stored appointments. On failure
/// nothing issued here is left behind.
async fn issue_dependents(
    practice: &Practice,
    client: &Client,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> ServiceResult<Vec<Invoice>> {
    let invoices = if practice.config().booking.auto_invoice {
        invoices::issue_for_appointments(practice, appointments, now).await?
    } else {
        Vec::new()
    };

    let queued = notifications::schedule_for_booking(practice, client, appointments, now).await;
    if let Err(e) = queued {
        let ids: Vec<InvoiceId> = invoices.iter().map(|i| i.id).collect();
        if let Err(cleanup) = practice.repo().delete_invoices(&ids).await {
            tracing::error!(error = %cleanup, "Failed to remove invoices of a failed booking");
        }
        return Err(e);
    }
    Ok(invoices)
}

/// Create a single appointment or a recurring series.
///
/// The series is stored in one repository call, which rejects overlaps
/// with live appointments. With `booking.auto_invoice` one invoice is
/// issued per occurrence. A confirmation and the reminders still ahead are
/// queued. If invoicing or queueing fails the stored appointments are
/// removed again.
pub async fn create(
    practice: &Practice,
    request: CreateAppointmentRequest,
    now: DateTime<Utc>,
) -> ServiceResult<CreatedAppointments> {
    validate_range(request.start_time, request.end_time)?;

    let client = practice.repo().get_client(request.client_id).await?;
    if client.status == ClientStatus::Archived {
        return Err(ServiceError::validation(format!(
            "Client {} is archived",
            client.id
        )));
    }

    let rate_cents = request
        .rate_cents
        .or(client.default_rate_cents)
        .unwrap_or(practice.config().practice.default_rate_cents);
    if rate_cents < 0 {
        return Err(ServiceError::validation("Rate must not be negative"));
    }

    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let appointment_type = request
        .appointment_type
        .unwrap_or(practice.config().booking.default_type);

    let (occurrences, group_id, pattern) = match request.recurrence {
        Some(recurrence) => {
            let first_date = request
                .start_time
                .with_timezone(&practice.offset())
                .date_naive();
            if recurrence.until < first_date {
                return Err(ServiceError::validation(
                    "Recurrence end date is before the first occurrence",
                ));
            }
            let occurrences = expand_occurrences(
                request.start_time,
                request.end_time,
                recurrence.pattern,
                recurrence.until,
                practice.offset(),
            );
            (occurrences, Some(Uuid::new_v4()), Some(recurrence.pattern))
        }
        None => (
            vec![Occurrence {
                start: request.start_time,
                end: request.end_time,
            }],
            None,
            None,
        ),
    };

    let new_appointments: Vec<NewAppointment> = occurrences
        .iter()
        .map(|o| NewAppointment {
            client_id: client.id,
            title: title.clone(),
            description: request.description.clone(),
            start_time: o.start,
            end_time: o.end,
            appointment_type,
            location: request.location.clone(),
            rate_cents,
            recurring_group_id: group_id,
            recurrence: pattern,
            meeting_room: (appointment_type == AppointmentType::Online).then(meeting_room),
        })
        .collect();

    let appointments = practice
        .repo()
        .create_appointments(&new_appointments)
        .await?;

    let invoices = match issue_dependents(practice, &client, &appointments, now).await {
        Ok(invoices) => invoices,
        Err(e) => {
            let ids: Vec<AppointmentId> = appointments.iter().map(|a| a.id).collect();
            if let Err(cleanup) = practice.repo().delete_appointments(&ids).await {
                tracing::error!(
                    error = %cleanup,
                    "Failed to remove appointments of a failed booking"
                );
            }
            tracing::warn!(
                client_id = %client.id,
                error = %e,
                "Appointment creation rolled back"
            );
            return Err(e);
        }
    };

    tracing::info!(
        client_id = %client.id,
        count = appointments.len(),
        recurring = group_id.is_some(),
        "Appointments created"
    );
    Ok(CreatedAppointments {
        appointments,
        invoices,
    })
}

pub async fn get(practice: &Practice, id: AppointmentId) -> ServiceResult<Appointment> {
    Ok(practice.repo().get_appointment(id).await?)
}

pub async fn list(
    practice: &Practice,
    filter: &AppointmentFilter,
) -> ServiceResult<Vec<Appointment>> {
    Ok(practice.repo().list_appointments(filter).await?)
}

async fn save(practice: &Practice, appointments: &[Appointment]) -> ServiceResult<Vec<Appointment>> {
    Ok(practice.repo().save_appointments(appointments).await?)
}

async fn save_one(practice: &Practice, appointment: Appointment) -> ServiceResult<Appointment> {
    save(practice, std::slice::from_ref(&appointment))
        .await?
        .pop()
        .ok_or_else(|| ServiceError::Internal("Appointment was not stored".to_string()))
}

fn require_live(appointment: &Appointment) -> ServiceResult<()> {
    if appointment.is_cancelled() {
        return Err(ServiceError::conflict(format!(
            "Appointment {} is cancelled",
            appointment.id
        )));
    }
    Ok(())
}

/// Edit one appointment.
///
/// A rate change is carried into its open invoices; a time change replaces
/// its pending reminders and notifies the client.
pub async fn update(
    practice: &Practice,
    id: AppointmentId,
    changes: AppointmentChanges,
    now: DateTime<Utc>,
) -> ServiceResult<Appointment> {
    let mut appointment = practice.repo().get_appointment(id).await?;
    require_live(&appointment)?;

    if let Some(title) = changes.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(ServiceError::validation("Title must not be empty"));
        }
        appointment.title = title;
    }
    if let Some(description) = changes.description {
        appointment.description = Some(description);
    }
    if let Some(location) = changes.location {
        appointment.location = Some(location);
    }
    if let Some(appointment_type) = changes.appointment_type {
        appointment.appointment_type = appointment_type;
        match appointment_type {
            AppointmentType::Online if appointment.meeting_room.is_none() => {
                appointment.meeting_room = Some(meeting_room());
            }
            AppointmentType::InPerson => appointment.meeting_room = None,
            AppointmentType::Online => {}
        }
    }

    let rate_changed = match changes.rate_cents {
        Some(rate) if rate < 0 => {
            return Err(ServiceError::validation("Rate must not be negative"));
        }
        Some(rate) if rate != appointment.rate_cents => {
            appointment.rate_cents = rate;
            true
        }
        _ => false,
    };

    let start = changes.start_time.unwrap_or(appointment.start_time);
    let end = changes.end_time.unwrap_or(appointment.end_time);
    let time_changed = start != appointment.start_time || end != appointment.end_time;
    if time_changed {
        validate_range(start, end)?;
        appointment.start_time = start;
        appointment.end_time = end;
    }

    let appointment = save_one(practice, appointment).await?;

    if rate_changed {
        invoices::sync_with_appointment(practice, &appointment).await?;
    }
    if time_changed {
        let client = practice.repo().get_client(appointment.client_id).await?;
        notifications::reschedule_reminders(
            practice,
            &client,
            std::slice::from_ref(&appointment),
            now,
        )
        .await?;
        notifications::notify_rescheduled(practice, &client, &appointment, 1, now).await?;
    }
    Ok(appointment)
}

/// The reference appointment together with every member of its series.
async fn load_series(
    practice: &Practice,
    id: AppointmentId,
) -> ServiceResult<(Appointment, Vec<Appointment>)> {
    let reference = practice.repo().get_appointment(id).await?;
    let series = match reference.recurring_group_id {
        Some(group_id) => practice.repo().list_series(group_id).await?,
        None => vec![reference.clone()],
    };
    Ok((reference, series))
}

/// Shift the reference occurrence onto `update.new_start` and move every
/// live member in scope by the same day and time deltas.
pub async fn reschedule_series(
    practice: &Practice,
    reference_id: AppointmentId,
    update: SeriesUpdate,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<Appointment>> {
    let (reference, series) = load_series(practice, reference_id).await?;
    require_live(&reference)?;
    check_supported(update.new_start)?;

    let mut shift = SeriesShift::between(reference.start_time, update.new_start, practice.offset());
    if let Some(new_end) = update.new_end {
        validate_range(update.new_start, new_end)?;
        shift = shift.with_duration(new_end - update.new_start);
    }
    if shift.is_noop() {
        return Ok(vec![reference]);
    }

    let mut moved: Vec<Appointment> = select_scope(&series, &reference, update.scope)
        .into_iter()
        .filter(|a| !a.is_cancelled())
        .cloned()
        .collect();
    for appointment in moved.iter_mut() {
        let target = shift.apply(appointment.start_time, appointment.end_time);
        appointment.start_time = target.start;
        appointment.end_time = target.end;
    }
    let moved = save(practice, &moved).await?;

    let client = practice.repo().get_client(reference.client_id).await?;
    notifications::reschedule_reminders(practice, &client, &moved, now).await?;
    if let Some(first) = moved.iter().find(|a| a.id == reference.id) {
        notifications::notify_rescheduled(practice, &client, first, moved.len(), now).await?;
    }

    tracing::info!(
        reference_id = %reference.id,
        scope = %update.scope,
        count = moved.len(),
        days = shift.days,
        "Series shifted"
    );
    Ok(moved)
}

/// Cancel the scheduled members in scope, their open invoices and pending
/// emails, and notify the client once.
pub async fn cancel(
    practice: &Practice,
    id: AppointmentId,
    scope: SeriesScope,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<Appointment>> {
    let (reference, series) = load_series(practice, id).await?;
    if reference.status != AppointmentStatus::Scheduled {
        return Err(ServiceError::conflict(format!(
            "Appointment {} is {} and cannot be cancelled",
            reference.id, reference.status
        )));
    }

    let cancelled: Vec<Appointment> = select_scope(&series, &reference, scope)
        .into_iter()
        .filter(|a| a.status == AppointmentStatus::Scheduled)
        .cloned()
        .map(|mut a| {
            a.status = AppointmentStatus::Cancelled;
            a
        })
        .collect();
    let cancelled = save(practice, &cancelled).await?;
    let ids: Vec<AppointmentId> = cancelled.iter().map(|a| a.id).collect();

    invoices::cancel_for_appointments(practice, &ids).await?;
    notifications::cancel_pending(practice, &ids).await?;
    let client = practice.repo().get_client(reference.client_id).await?;
    notifications::notify_cancelled(practice, &client, &cancelled, now).await?;

    tracing::info!(
        reference_id = %reference.id,
        scope = %scope,
        count = cancelled.len(),
        "Appointments cancelled"
    );
    Ok(cancelled)
}

/// Delete the members in scope. Their invoices stay, detached.
///
/// # Returns
/// Number of appointments deleted.
pub async fn delete(
    practice: &Practice,
    id: AppointmentId,
    scope: SeriesScope,
) -> ServiceResult<usize> {
    let (reference, series) = load_series(practice, id).await?;
    let ids: Vec<AppointmentId> = select_scope(&series, &reference, scope)
        .into_iter()
        .map(|a| a.id)
        .collect();

    let deleted = practice.repo().delete_appointments(&ids).await?;
    tracing::info!(reference_id = %reference.id, scope = %scope, deleted, "Appointments deleted");
    Ok(deleted)
}

/// Record one participant's attendance. A no-show is reopened first.
pub async fn mark_attendance(
    practice: &Practice,
    id: AppointmentId,
    participant: Participant,
    attended: bool,
) -> ServiceResult<Appointment> {
    let mut appointment = practice.repo().get_appointment(id).await?;
    require_live(&appointment)?;

    if appointment.status == AppointmentStatus::NoShow {
        appointment.status = AppointmentStatus::Scheduled;
    }
    appointment.record_attendance(participant, attended);
    save_one(practice, appointment).await
}

pub async fn mark_no_show(practice: &Practice, id: AppointmentId) -> ServiceResult<Appointment> {
    let mut appointment = practice.repo().get_appointment(id).await?;
    require_live(&appointment)?;

    appointment.status = AppointmentStatus::NoShow;
    appointment.client_attended = false;
    save_one(practice, appointment).await
}

/// Start and end of live appointments overlapping `[from, to)`, for slot
/// generation.
pub async fn busy_intervals(
    practice: &Practice,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> ServiceResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    Ok(practice
        .repo()
        .list_appointments(&AppointmentFilter::between(from, to))
        .await?
        .into_iter()
        .filter(|a| !a.is_cancelled())
        .map(|a| (a.start_time, a.end_time))
        .collect())
}

/// Length of a session as booked from the public site.
pub fn session_length(practice: &Practice) -> Duration {
    practice.config().booking.session_length()
}
