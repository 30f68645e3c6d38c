//! Public booking: free slots, the month calendar and self-service booking.

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::*;
use crate::models::normalize_email;
use crate::scheduler::{
    generate_slots, local_to_utc, month_overview, resolve_day, SlotRules, SUPPORTED_YEARS,
};

use super::appointments::{self, session_length};
use super::{Practice, ServiceError, ServiceResult};

/// A booking submitted from the public site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Must equal the start of a free slot.
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub appointment_type: Option<AppointmentType>,
    /// Free-text message, stored as the appointment description.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub client_id: ClientId,
    pub invoice_number: Option<String>,
}

/// Slot rules at `now`: configured session length, step and buffer, no
/// start inside the minimum notice or beyond the booking horizon.
pub fn slot_rules(practice: &Practice, now: DateTime<Utc>) -> SlotRules {
    let booking = &practice.config().booking;
    SlotRules {
        duration: session_length(practice),
        step: Duration::minutes(booking.slot_step_minutes),
        buffer: Duration::minutes(booking.buffer_minutes),
        earliest: now + Duration::hours(booking.min_notice_hours),
        latest: Some(now + Duration::days(booking.horizon_days)),
    }
}

/// Local dates that can hold a bookable slot at `now`.
fn bookable_dates(practice: &Practice, now: DateTime<Utc>) -> RangeInclusive<NaiveDate> {
    let rules = slot_rules(practice, now);
    let offset = practice.offset();
    let first = rules.earliest.with_timezone(&offset).date_naive();
    let last = rules
        .latest
        .unwrap_or(rules.earliest)
        .with_timezone(&offset)
        .date_naive();
    first..=last
}

fn check_year(year: i32) -> ServiceResult<()> {
    if SUPPORTED_YEARS.contains(&year) {
        Ok(())
    } else {
        Err(ServiceError::validation(format!("Unsupported year: {}", year)))
    }
}

/// UTC bounds of the local dates `[first, last]`, widened by a day on each
/// side so appointments reaching across midnight are seen.
fn busy_window(
    practice: &Practice,
    first: NaiveDate,
    last: NaiveDate,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = practice.offset();
    (
        local_to_utc(first, NaiveTime::MIN, offset) - Duration::days(1),
        local_to_utc(last, NaiveTime::MIN, offset) + Duration::days(2),
    )
}

/// Free slots on the local `date`. Dates outside the notice and horizon
/// limits have none.
pub async fn available_slots(
    practice: &Practice,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<TimeSlot>> {
    check_year(date.year())?;
    if !bookable_dates(practice, now).contains(&date) {
        return Ok(Vec::new());
    }

    let template = practice.repo().get_working_hours().await?;
    let exceptions = practice
        .repo()
        .list_exceptions(Some(date), Some(date))
        .await?;
    let day = resolve_day(date, &template, &exceptions);
    if !day.is_open() {
        return Ok(Vec::new());
    }

    let (from, to) = busy_window(practice, date, date);
    let busy = appointments::busy_intervals(practice, from, to).await?;
    Ok(generate_slots(
        &day,
        practice.offset(),
        &slot_rules(practice, now),
        &busy,
    ))
}

/// Per-day overview of `year`/`month` for the booking calendar.
pub async fn available_days(
    practice: &Practice,
    year: i32,
    month: u32,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<DayOverview>> {
    check_year(year)?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ServiceError::validation(format!("Invalid month: {}-{}", year, month)))?;
    let last = first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| ServiceError::validation(format!("Invalid month: {}-{}", year, month)))?;

    let template = practice.repo().get_working_hours().await?;
    let exceptions = practice
        .repo()
        .list_exceptions(Some(first), Some(last))
        .await?;

    let window = bookable_dates(practice, now);
    if last < *window.start() || first > *window.end() {
        return Ok(first
            .iter_days()
            .take_while(|d| *d <= last)
            .map(|date| DayOverview {
                date,
                open: resolve_day(date, &template, &exceptions).is_open(),
                free_slots: 0,
            })
            .collect());
    }

    let (from, to) = busy_window(practice, first, last);
    let busy = appointments::busy_intervals(practice, from, to).await?;

    Ok(month_overview(
        year,
        month,
        &template,
        &exceptions,
        practice.offset(),
        &slot_rules(practice, now),
        &busy,
    ))
}

fn validate_request(request: &BookingRequest) -> ServiceResult<()> {
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(ServiceError::validation("First and last name are required"));
    }
    let email = request.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ServiceError::validation(format!(
            "Invalid email address: {}",
            email
        ))),
    }
}

/// Book a free slot for a new or returning client.
///
/// Returning clients are matched by email. Archived clients are refused.
pub async fn book(
    practice: &Practice,
    request: BookingRequest,
    now: DateTime<Utc>,
) -> ServiceResult<BookingConfirmation> {
    validate_request(&request)?;

    let date = request
        .start_time
        .with_timezone(&practice.offset())
        .date_naive();
    let slot = available_slots(practice, date, now)
        .await?
        .into_iter()
        .find(|s| s.start == request.start_time)
        .ok_or_else(|| ServiceError::conflict("The requested time is not available"))?;

    let client = match practice
        .repo()
        .find_client_by_email(&normalize_email(&request.email))
        .await?
    {
        Some(client) if client.status == ClientStatus::Archived => {
            return Err(ServiceError::forbidden(
                "Online booking is not available for this client",
            ));
        }
        Some(client) => client,
        None => {
            let client = practice
                .repo()
                .create_client(&NewClient {
                    first_name: request.first_name.trim().to_string(),
                    last_name: request.last_name.trim().to_string(),
                    email: request.email.clone(),
                    phone: request.phone.clone(),
                    default_rate_cents: None,
                })
                .await?;
            tracing::info!(client_id = %client.id, "Client registered through booking");
            client
        }
    };

    let created = appointments::create(
        practice,
        CreateAppointmentRequest {
            client_id: client.id,
            title: Some(format!("Session with {}", client.full_name())),
            description: request.message,
            start_time: slot.start,
            end_time: slot.end,
            appointment_type: request.appointment_type,
            location: None,
            rate_cents: None,
            recurrence: None,
        },
        now,
    )
    .await?;

    let appointment = created
        .appointments
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Internal("Booking created no appointment".to_string()))?;
    Ok(BookingConfirmation {
        appointment,
        client_id: client.id,
        invoice_number: created.invoices.into_iter().next().map(|i| i.invoice_number),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(email: &str) -> BookingRequest {
        BookingRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            phone: None,
            start_time: Utc::now(),
            appointment_type: None,
            message: None,
        }
    }

    #[test]
    fn test_validate_request_email() {
        assert!(validate_request(&request("ada@example.com")).is_ok());
        assert!(validate_request(&request("ada.example.com")).is_err());
        assert!(validate_request(&request("@example.com")).is_err());
        assert!(validate_request(&request("ada@localhost")).is_err());
    }

    #[test]
    fn test_validate_request_names() {
        let mut req = request("ada@example.com");
        req.last_name = "  ".to_string();
        assert!(matches!(
            validate_request(&req),
            Err(ServiceError::Validation(_))
        ));
    }
}
