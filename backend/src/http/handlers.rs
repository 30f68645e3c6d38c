//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the service
//! layer for business logic.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use super::dto::{
    AttendanceRequest, CancelRequest, DateQuery, DateRangeQuery, DeletedResponse,
    HealthResponse, JoinRequest, ListResponse, MonthQuery, NoteRequest, ScopeQuery,
    UpdatedResponse, VerifyTokenRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::*;
use crate::services::{
    appointments, availability, booking, clients, dashboard, invoices, meeting, notes,
    notifications,
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Result type for handlers creating a resource.
pub type CreatedResult<T> = Result<(StatusCode, Json<T>), AppError>;

fn created<T>(value: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(value)))
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match state.practice.repo().health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Public: booking site
// =============================================================================

/// GET /v1/public/availability?date=
pub async fn public_slots(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> HandlerResult<ListResponse<TimeSlot>> {
    let slots = booking::available_slots(&state.practice, query.date, Utc::now()).await?;
    Ok(Json(slots.into()))
}

/// GET /v1/public/availability/month?year=&month=
pub async fn public_month(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> HandlerResult<ListResponse<DayOverview>> {
    let days =
        booking::available_days(&state.practice, query.year, query.month, Utc::now()).await?;
    Ok(Json(days.into()))
}

/// POST /v1/public/bookings
pub async fn public_book(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> CreatedResult<BookingConfirmation> {
    created(booking::book(&state.practice, request, Utc::now()).await?)
}

/// POST /v1/public/meetings/{appointment_id}/join
pub async fn public_join(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<JoinRequest>,
) -> HandlerResult<MeetingLink> {
    let link = meeting::join_as_client(
        &state.practice,
        AppointmentId::new(appointment_id),
        &request.email,
        Utc::now(),
    )
    .await?;
    Ok(Json(link))
}

// =============================================================================
// Admin: clients and notes
// =============================================================================

/// GET /v1/admin/clients?search=&status=
pub async fn list_clients(
    State(state): State<AppState>,
    Query(filter): Query<ClientFilter>,
) -> HandlerResult<ListResponse<Client>> {
    Ok(Json(clients::list(&state.practice, &filter).await?.into()))
}

/// POST /v1/admin/clients
pub async fn create_client(
    State(state): State<AppState>,
    Json(client): Json<NewClient>,
) -> CreatedResult<Client> {
    created(clients::create(&state.practice, client).await?)
}

/// GET /v1/admin/clients/{id}
pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Client> {
    Ok(Json(clients::get(&state.practice, ClientId::new(id)).await?))
}

/// PATCH /v1/admin/clients/{id}
pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<ClientChanges>,
) -> HandlerResult<Client> {
    Ok(Json(
        clients::update(&state.practice, ClientId::new(id), changes).await?,
    ))
}

/// POST /v1/admin/clients/{id}/archive
pub async fn archive_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Client> {
    Ok(Json(clients::archive(&state.practice, ClientId::new(id)).await?))
}

/// DELETE /v1/admin/clients/{id}
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    clients::delete(&state.practice, ClientId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/admin/clients/{id}/notes
pub async fn list_notes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<ListResponse<Note>> {
    Ok(Json(notes::list(&state.practice, ClientId::new(id)).await?.into()))
}

/// POST /v1/admin/clients/{id}/notes
pub async fn create_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<NoteRequest>,
) -> CreatedResult<Note> {
    let note = NewNote {
        client_id: ClientId::new(id),
        appointment_id: body.appointment_id,
        title: body.title,
        content: body.content,
    };
    created(notes::create(&state.practice, note).await?)
}

/// GET /v1/admin/notes/{id}
pub async fn get_note(State(state): State<AppState>, Path(id): Path<i64>) -> HandlerResult<Note> {
    Ok(Json(notes::get(&state.practice, NoteId::new(id)).await?))
}

/// PATCH /v1/admin/notes/{id}
pub async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<NoteChanges>,
) -> HandlerResult<Note> {
    Ok(Json(
        notes::update(&state.practice, NoteId::new(id), changes).await?,
    ))
}

/// DELETE /v1/admin/notes/{id}
pub async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    notes::delete(&state.practice, NoteId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Admin: calendar
// =============================================================================

/// GET /v1/admin/appointments?from=&to=&client_id=&status=
pub async fn list_appointments(
    State(state): State<AppState>,
    Query(filter): Query<AppointmentFilter>,
) -> HandlerResult<ListResponse<Appointment>> {
    Ok(Json(appointments::list(&state.practice, &filter).await?.into()))
}

/// POST /v1/admin/appointments
pub async fn create_appointment(
    State(state): State<AppState>,
    Json(request): Json<CreateAppointmentRequest>,
) -> CreatedResult<CreatedAppointments> {
    created(appointments::create(&state.practice, request, Utc::now()).await?)
}

/// GET /v1/admin/appointments/{id}
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Appointment> {
    Ok(Json(
        appointments::get(&state.practice, AppointmentId::new(id)).await?,
    ))
}

/// PATCH /v1/admin/appointments/{id}
pub async fn update_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<AppointmentChanges>,
) -> HandlerResult<Appointment> {
    let appointment =
        appointments::update(&state.practice, AppointmentId::new(id), changes, Utc::now())
            .await?;
    Ok(Json(appointment))
}

/// DELETE /v1/admin/appointments/{id}?scope=
pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ScopeQuery>,
) -> HandlerResult<DeletedResponse> {
    let deleted =
        appointments::delete(&state.practice, AppointmentId::new(id), query.scope).await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// POST /v1/admin/appointments/{id}/series
pub async fn reschedule_series(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<SeriesUpdate>,
) -> HandlerResult<ListResponse<Appointment>> {
    let moved = appointments::reschedule_series(
        &state.practice,
        AppointmentId::new(id),
        update,
        Utc::now(),
    )
    .await?;
    Ok(Json(moved.into()))
}

/// POST /v1/admin/appointments/{id}/cancel
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<CancelRequest>,
) -> HandlerResult<ListResponse<Appointment>> {
    let cancelled = appointments::cancel(
        &state.practice,
        AppointmentId::new(id),
        request.scope,
        Utc::now(),
    )
    .await?;
    Ok(Json(cancelled.into()))
}

/// POST /v1/admin/appointments/{id}/attendance
pub async fn mark_attendance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AttendanceRequest>,
) -> HandlerResult<Appointment> {
    let appointment = appointments::mark_attendance(
        &state.practice,
        AppointmentId::new(id),
        request.participant,
        request.attended,
    )
    .await?;
    Ok(Json(appointment))
}

/// POST /v1/admin/appointments/{id}/no-show
pub async fn mark_no_show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Appointment> {
    Ok(Json(
        appointments::mark_no_show(&state.practice, AppointmentId::new(id)).await?,
    ))
}

/// POST /v1/admin/appointments/{id}/join
pub async fn host_join(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<MeetingLink> {
    let link = meeting::issue_link(
        &state.practice,
        AppointmentId::new(id),
        Participant::Host,
        Utc::now(),
    )
    .await?;
    Ok(Json(link))
}

/// POST /v1/admin/meetings/verify
pub async fn verify_meeting_token(
    State(state): State<AppState>,
    Json(request): Json<VerifyTokenRequest>,
) -> HandlerResult<MeetingClaims> {
    Ok(Json(meeting::verify_token(
        &state.practice,
        &request.token,
        Utc::now(),
    )?))
}

// =============================================================================
// Admin: availability
// =============================================================================

/// GET /v1/admin/working-hours
pub async fn get_working_hours(
    State(state): State<AppState>,
) -> HandlerResult<Vec<WorkingHours>> {
    Ok(Json(availability::working_hours(&state.practice).await?))
}

/// PUT /v1/admin/working-hours
pub async fn replace_working_hours(
    State(state): State<AppState>,
    Json(hours): Json<Vec<WorkingHours>>,
) -> HandlerResult<Vec<WorkingHours>> {
    Ok(Json(
        availability::replace_working_hours(&state.practice, hours).await?,
    ))
}

/// GET /v1/admin/exceptions?from=&to=
pub async fn list_exceptions(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> HandlerResult<ListResponse<AvailabilityException>> {
    let exceptions =
        availability::list_exceptions(&state.practice, range.from, range.to).await?;
    Ok(Json(exceptions.into()))
}

/// POST /v1/admin/exceptions
pub async fn create_exception(
    State(state): State<AppState>,
    Json(exception): Json<NewAvailabilityException>,
) -> CreatedResult<AvailabilityException> {
    created(availability::create_exception(&state.practice, exception).await?)
}

/// GET /v1/admin/exceptions/{id}
pub async fn get_exception(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<AvailabilityException> {
    Ok(Json(
        availability::get_exception(&state.practice, ExceptionId::new(id)).await?,
    ))
}

/// PUT /v1/admin/exceptions/{id}
pub async fn update_exception(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(exception): Json<NewAvailabilityException>,
) -> HandlerResult<AvailabilityException> {
    Ok(Json(
        availability::update_exception(&state.practice, ExceptionId::new(id), exception).await?,
    ))
}

/// DELETE /v1/admin/exceptions/{id}
pub async fn delete_exception(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    availability::delete_exception(&state.practice, ExceptionId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/admin/availability/day?date=
pub async fn resolved_day(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> HandlerResult<DayAvailability> {
    Ok(Json(availability::day(&state.practice, query.date).await?))
}

// =============================================================================
// Admin: invoices
// =============================================================================

/// GET /v1/admin/invoices?status=&client_id=&appointment_id=
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(filter): Query<InvoiceFilter>,
) -> HandlerResult<ListResponse<Invoice>> {
    Ok(Json(invoices::list(&state.practice, &filter).await?.into()))
}

/// POST /v1/admin/invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> CreatedResult<Invoice> {
    created(invoices::create(&state.practice, request, Utc::now()).await?)
}

/// GET /v1/admin/invoices/{id}
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Invoice> {
    Ok(Json(invoices::get(&state.practice, InvoiceId::new(id)).await?))
}

/// PATCH /v1/admin/invoices/{id}
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<InvoiceChanges>,
) -> HandlerResult<Invoice> {
    let invoice =
        invoices::update(&state.practice, InvoiceId::new(id), changes, Utc::now()).await?;
    Ok(Json(invoice))
}

/// POST /v1/admin/invoices/{id}/pay
pub async fn pay_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Invoice> {
    Ok(Json(
        invoices::mark_paid(&state.practice, InvoiceId::new(id), Utc::now()).await?,
    ))
}

/// POST /v1/admin/invoices/{id}/cancel
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Invoice> {
    Ok(Json(invoices::cancel(&state.practice, InvoiceId::new(id)).await?))
}

/// POST /v1/admin/invoices/refresh-overdue
pub async fn refresh_overdue(State(state): State<AppState>) -> HandlerResult<UpdatedResponse> {
    let today = Utc::now().with_timezone(&state.practice.offset()).date_naive();
    let updated = invoices::refresh_overdue(&state.practice, today).await?;
    Ok(Json(UpdatedResponse {
        updated: updated.len(),
    }))
}

// =============================================================================
// Admin: notifications and dashboard
// =============================================================================

/// GET /v1/admin/emails?status=&kind=&appointment_id=
pub async fn list_emails(
    State(state): State<AppState>,
    Query(filter): Query<EmailFilter>,
) -> HandlerResult<ListResponse<ScheduledEmail>> {
    Ok(Json(
        notifications::list_emails(&state.practice, &filter)
            .await?
            .into(),
    ))
}

/// POST /v1/admin/emails/dispatch
pub async fn dispatch_emails(State(state): State<AppState>) -> HandlerResult<DispatchSummary> {
    Ok(Json(
        notifications::dispatch_due(&state.practice, Utc::now()).await?,
    ))
}

/// GET /v1/admin/dashboard
pub async fn get_dashboard(State(state): State<AppState>) -> HandlerResult<DashboardStats> {
    Ok(Json(dashboard::stats(&state.practice, Utc::now()).await?))
}
