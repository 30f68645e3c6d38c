//! Invoicing.
//!
//! Invoice numbers have the form `{prefix}-{YYYYMM}-{seq:04}` where the month
//! is the local issue month and the sequence continues after the highest
//! number already issued in that month, so deleted invoices leave gaps. Open invoices (unpaid or overdue) tied to an appointment
//! follow the appointment's rate; paid and cancelled invoices are never
//! rewritten.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::*;
use crate::db::repository::RepositoryError;

use super::{notifications, Practice, ServiceError, ServiceResult};

/// Manual invoice request from the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: ClientId,
    /// Bill a specific session; the amount defaults to its rate.
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the issue date plus `invoices.due_days`.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Editable fields of an open invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceChanges {
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// `{prefix}-{YYYYMM}` for the local month of `issued_at`.
pub fn month_prefix(practice: &Practice, issued_at: DateTime<Utc>) -> String {
    let local = issued_at.with_timezone(&practice.offset());
    format!(
        "{}-{}",
        practice.config().invoices.prefix,
        local.format("%Y%m")
    )
}

pub fn format_invoice_number(month_prefix: &str, sequence: i64) -> String {
    format!("{}-{:04}", month_prefix, sequence)
}

/// The next `count` invoice numbers for invoices issued at `issued_at`.
pub async fn next_invoice_numbers(
    practice: &Practice,
    issued_at: DateTime<Utc>,
    count: usize,
) -> ServiceResult<Vec<String>> {
    let prefix = month_prefix(practice, issued_at);
    let last = practice
        .repo()
        .last_invoice_sequence(&format!("{}-", prefix))
        .await?;
    (1..=count as i64)
        .map(|n| {
            last.checked_add(n)
                .map(|sequence| format_invoice_number(&prefix, sequence))
                .ok_or_else(|| {
                    ServiceError::conflict(format!("Invoice numbers for {} are exhausted", prefix))
                })
        })
        .collect()
}

const NUMBERING_ATTEMPTS: u32 = 3;

/// Number `drafts` and store them in one call.
///
/// A concurrent writer taking the same numbers makes the insert conflict;
/// the drafts are then renumbered.
async fn store_numbered(
    practice: &Practice,
    now: DateTime<Utc>,
    mut drafts: Vec<NewInvoice>,
) -> ServiceResult<Vec<Invoice>> {
    let mut attempt = 1;
    loop {
        let numbers = next_invoice_numbers(practice, now, drafts.len()).await?;
        for (draft, number) in drafts.iter_mut().zip(numbers) {
            draft.invoice_number = number;
        }
        match practice.repo().create_invoices(&drafts).await {
            Err(RepositoryError::Conflict { .. }) if attempt < NUMBERING_ATTEMPTS => {
                tracing::warn!(attempt, "Invoice numbers taken concurrently, renumbering");
                attempt += 1;
            }
            result => return Ok(result?),
        }
    }
}

fn local_date(practice: &Practice, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&practice.offset()).date_naive()
}

fn validate_amount(amount_cents: i64) -> ServiceResult<()> {
    if amount_cents < 0 {
        return Err(ServiceError::validation("Invoice amount must not be negative"));
    }
    Ok(())
}

/// Create a manual invoice and queue the `invoice_issued` email.
pub async fn create(
    practice: &Practice,
    request: CreateInvoiceRequest,
    now: DateTime<Utc>,
) -> ServiceResult<Invoice> {
    let client = practice.repo().get_client(request.client_id).await?;

    let appointment = match request.appointment_id {
        Some(id) => {
            let appointment = practice.repo().get_appointment(id).await?;
            if appointment.client_id != client.id {
                return Err(ServiceError::validation(format!(
                    "Appointment {} does not belong to client {}",
                    id, client.id
                )));
            }
            Some(appointment)
        }
        None => None,
    };

    let amount_cents = match (request.amount_cents, &appointment) {
        (Some(amount), _) => amount,
        (None, Some(appointment)) => appointment.rate_cents,
        (None, None) => {
            return Err(ServiceError::validation(
                "amount_cents is required for an invoice without appointment",
            ))
        }
    };
    validate_amount(amount_cents)?;

    let today = local_date(practice, now);
    let due_date = request
        .due_date
        .unwrap_or(today + Duration::days(practice.config().invoices.due_days));
    if due_date < today {
        return Err(ServiceError::validation("Due date must not be in the past"));
    }

    let draft = NewInvoice {
        client_id: client.id,
        appointment_id: request.appointment_id,
        invoice_number: String::new(),
        amount_cents,
        description: request.description,
        issued_at: now,
        due_date,
    };
    let invoice = store_numbered(practice, now, vec![draft])
        .await?
        .pop()
        .ok_or_else(|| ServiceError::Internal("Invoice was not stored".to_string()))?;

    notifications::notify_invoice_issued(practice, &client, &invoice, now).await?;
    tracing::info!(
        invoice = %invoice.invoice_number,
        client_id = %client.id,
        amount_cents = invoice.amount_cents,
        "Invoice issued"
    );
    Ok(invoice)
}

/// One invoice per appointment, billed at the appointment's rate and due
/// `invoices.due_days` after the session date.
pub async fn issue_for_appointments(
    practice: &Practice,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> ServiceResult<Vec<Invoice>> {
    if appointments.is_empty() {
        return Ok(Vec::new());
    }

    let due_days = Duration::days(practice.config().invoices.due_days);
    let drafts: Vec<NewInvoice> = appointments
        .iter()
        .map(|appointment| {
            let session_date = local_date(practice, appointment.start_time);
            NewInvoice {
                client_id: appointment.client_id,
                appointment_id: Some(appointment.id),
                invoice_number: String::new(),
                amount_cents: appointment.rate_cents,
                description: Some(format!(
                    "{} on {}",
                    appointment.title,
                    session_date.format("%Y-%m-%d")
                )),
                issued_at: now,
                due_date: session_date.max(local_date(practice, now)) + due_days,
            }
        })
        .collect();

    store_numbered(practice, now, drafts).await
}

pub async fn get(practice: &Practice, id: InvoiceId) -> ServiceResult<Invoice> {
    Ok(practice.repo().get_invoice(id).await?)
}

pub async fn list(practice: &Practice, filter: &InvoiceFilter) -> ServiceResult<Vec<Invoice>> {
    Ok(practice.repo().list_invoices(filter).await?)
}

fn require_open(invoice: &Invoice) -> ServiceResult<()> {
    if invoice.is_open() {
        Ok(())
    } else {
        Err(ServiceError::conflict(format!(
            "Invoice {} is {} and can no longer be changed",
            invoice.invoice_number, invoice.status
        )))
    }
}

async fn save_one(practice: &Practice, invoice: Invoice) -> ServiceResult<Invoice> {
    practice
        .repo()
        .save_invoices(std::slice::from_ref(&invoice))
        .await?
        .pop()
        .ok_or_else(|| ServiceError::Internal("Invoice was not stored".to_string()))
}

/// Edit an open invoice. Moving the due date of an overdue invoice to today
/// or later makes it unpaid again.
pub async fn update(
    practice: &Practice,
    id: InvoiceId,
    changes: InvoiceChanges,
    now: DateTime<Utc>,
) -> ServiceResult<Invoice> {
    let mut invoice = practice.repo().get_invoice(id).await?;
    require_open(&invoice)?;

    if let Some(amount) = changes.amount_cents {
        validate_amount(amount)?;
        invoice.amount_cents = amount;
    }
    if let Some(description) = changes.description {
        invoice.description = Some(description);
    }
    if let Some(due_date) = changes.due_date {
        let today = local_date(practice, now);
        invoice.due_date = due_date;
        invoice.status = if due_date < today {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::Unpaid
        };
    }

    save_one(practice, invoice).await
}

pub async fn mark_paid(
    practice: &Practice,
    id: InvoiceId,
    now: DateTime<Utc>,
) -> ServiceResult<Invoice> {
    let mut invoice = practice.repo().get_invoice(id).await?;
    match invoice.status {
        InvoiceStatus::Paid => return Ok(invoice),
        InvoiceStatus::Cancelled => {
            return Err(ServiceError::conflict(format!(
                "Invoice {} is cancelled",
                invoice.invoice_number
            )))
        }
        InvoiceStatus::Unpaid | InvoiceStatus::Overdue => {}
    }

    invoice.status = InvoiceStatus::Paid;
    invoice.paid_at = Some(now);
    let invoice = save_one(practice, invoice).await?;
    tracing::info!(invoice = %invoice.invoice_number, "Invoice paid");
    Ok(invoice)
}

pub async fn cancel(practice: &Practice, id: InvoiceId) -> ServiceResult<Invoice> {
    let mut invoice = practice.repo().get_invoice(id).await?;
    match invoice.status {
        InvoiceStatus::Cancelled => return Ok(invoice),
        InvoiceStatus::Paid => {
            return Err(ServiceError::conflict(format!(
                "Invoice {} is already paid",
                invoice.invoice_number
            )))
        }
        InvoiceStatus::Unpaid | InvoiceStatus::Overdue => {}
    }

    invoice.status = InvoiceStatus::Cancelled;
    save_one(practice, invoice).await
}

/// Mark unpaid invoices whose due date lies before `today` as overdue.
pub async fn refresh_overdue(practice: &Practice, today: NaiveDate) -> ServiceResult<Vec<Invoice>> {
    let filter = InvoiceFilter {
        status: Some(InvoiceStatus::Unpaid),
        ..Default::default()
    };
    let overdue: Vec<Invoice> = practice
        .repo()
        .list_invoices(&filter)
        .await?
        .into_iter()
        .filter(|i| i.is_past_due(today))
        .map(|mut i| {
            i.status = InvoiceStatus::Overdue;
            i
        })
        .collect();

    if overdue.is_empty() {
        return Ok(overdue);
    }
    tracing::info!(count = overdue.len(), "Invoices became overdue");
    Ok(practice.repo().save_invoices(&overdue).await?)
}

/// Bring the open invoices of `appointment` in line with its rate.
///
/// # Returns
/// Number of invoices rewritten.
pub async fn sync_with_appointment(
    practice: &Practice,
    appointment: &Appointment,
) -> ServiceResult<usize> {
    let changed: Vec<Invoice> = practice
        .repo()
        .list_invoices(&InvoiceFilter::for_appointment(appointment.id))
        .await?
        .into_iter()
        .filter(|i| i.is_open() && i.amount_cents != appointment.rate_cents)
        .map(|mut i| {
            i.amount_cents = appointment.rate_cents;
            i
        })
        .collect();

    if !changed.is_empty() {
        practice.repo().save_invoices(&changed).await?;
    }
    Ok(changed.len())
}

/// Cancel the open invoices of the given appointments.
pub async fn cancel_for_appointments(
    practice: &Practice,
    appointment_ids: &[AppointmentId],
) -> ServiceResult<usize> {
    let mut cancelled = Vec::new();
    for id in appointment_ids {
        let open = practice
            .repo()
            .list_invoices(&InvoiceFilter::for_appointment(*id))
            .await?
            .into_iter()
            .filter(Invoice::is_open);
        cancelled.extend(open.map(|mut i| {
            i.status = InvoiceStatus::Cancelled;
            i
        }));
    }

    if !cancelled.is_empty() {
        practice.repo().save_invoices(&cancelled).await?;
    }
    Ok(cancelled.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(format_invoice_number("INV-202603", 7), "INV-202603-0007");
        assert_eq!(format_invoice_number("INV-202603", 12345), "INV-202603-12345");
    }
}
