//! Email scheduling and dispatch.
//!
//! Emails are rendered when they are scheduled and stored as `pending` rows.
//! [`dispatch_due`] hands the due ones to a [`Mailer`] and records the
//! outcome; each email gets exactly one delivery attempt.

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::api::*;
use crate::config::PracticeConfig;
use crate::models::normalize_email;

use super::{Practice, ServiceResult};

/// Outgoing mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ScheduledEmail) -> anyhow::Result<()>;
}

/// Mailer that only logs what it would send.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ScheduledEmail) -> anyhow::Result<()> {
        tracing::info!(
            from = %self.from,
            to = %email.recipient,
            kind = %email.kind,
            subject = %email.subject,
            "Email delivered"
        );
        Ok(())
    }
}

/// Mailer that keeps sent emails in memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<ScheduledEmail>>,
    rejected: Mutex<HashSet<String>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `recipient` fail.
    pub fn reject(&self, recipient: &str) {
        self.rejected.lock().insert(normalize_email(recipient));
    }

    pub fn sent(&self) -> Vec<ScheduledEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &ScheduledEmail) -> anyhow::Result<()> {
        if self.rejected.lock().contains(&email.recipient) {
            anyhow::bail!("Mailbox unavailable: {}", email.recipient);
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn local_time(config: &PracticeConfig, at: DateTime<Utc>) -> String {
    at.with_timezone(&config.practice.offset())
        .format("%A %-d %B %Y at %H:%M")
        .to_string()
}

/// Amount in major units with the practice currency, e.g. `90.00 EUR`.
pub fn format_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}{}.{:02} {}", sign, cents / 100, cents % 100, currency)
}

fn meeting_note(config: &PracticeConfig, appointment: &Appointment) -> String {
    match appointment.appointment_type {
        AppointmentType::Online => format!(
            "This is an online session. The join link opens {} minutes before the start.",
            config.meeting.access_before_minutes
        ),
        AppointmentType::InPerson => match appointment.location.as_deref() {
            Some(location) if !location.trim().is_empty() => {
                format!("The session takes place at {}.", location.trim())
            }
            _ => "The session takes place in person at the practice.".to_string(),
        },
    }
}

fn signature(config: &PracticeConfig) -> String {
    format!(
        "Kind regards,\n{}\n{}",
        config.practice.practitioner_name, config.practice.name
    )
}

fn email(
    appointment_id: Option<AppointmentId>,
    invoice_id: Option<InvoiceId>,
    client: &Client,
    kind: EmailKind,
    subject: String,
    body: String,
    send_at: DateTime<Utc>,
) -> NewScheduledEmail {
    NewScheduledEmail {
        appointment_id,
        invoice_id,
        recipient: client.email.clone(),
        kind,
        subject,
        body,
        send_at,
    }
}

/// Confirmation for a new booking or series, sent immediately. `None` for an
/// empty list.
pub fn booking_confirmation(
    config: &PracticeConfig,
    client: &Client,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> Option<NewScheduledEmail> {
    let first = appointments.iter().min_by_key(|a| a.start_time)?;
    let last = appointments.iter().max_by_key(|a| a.start_time)?;

    let mut body = format!(
        "Dear {},\n\nyour session with {} is confirmed for {}.\n",
        client.first_name,
        config.practice.practitioner_name,
        local_time(config, first.start_time)
    );
    if appointments.len() > 1 {
        body.push_str(&format!(
            "It is the first of {} sessions; the last one is on {}.\n",
            appointments.len(),
            local_time(config, last.start_time)
        ));
    }
    body.push_str(&format!(
        "{}\n\n{}",
        meeting_note(config, first),
        signature(config)
    ));

    Some(email(
        Some(first.id),
        None,
        client,
        EmailKind::BookingConfirmation,
        format!("Your appointment with {} is confirmed", config.practice.name),
        body,
        now,
    ))
}

/// Reminder ahead of one session, or `None` when the reminder time has
/// already passed or the session is not scheduled.
pub fn reminder(
    config: &PracticeConfig,
    client: &Client,
    appointment: &Appointment,
    now: DateTime<Utc>,
) -> Option<NewScheduledEmail> {
    if appointment.status != AppointmentStatus::Scheduled {
        return None;
    }
    let send_at =
        appointment.start_time - Duration::hours(config.notifications.reminder_hours_before);
    if send_at <= now {
        return None;
    }

    let body = format!(
        "Dear {},\n\nthis is a reminder of your session on {}.\n{}\n\n{}",
        client.first_name,
        local_time(config, appointment.start_time),
        meeting_note(config, appointment),
        signature(config)
    );
    Some(email(
        Some(appointment.id),
        None,
        client,
        EmailKind::Reminder,
        format!("Reminder: your appointment with {}", config.practice.name),
        body,
        send_at,
    ))
}

/// Notice that a session (and `moved` sessions in total) moved.
pub fn rescheduled(
    config: &PracticeConfig,
    client: &Client,
    appointment: &Appointment,
    moved: usize,
    now: DateTime<Utc>,
) -> NewScheduledEmail {
    let mut body = format!(
        "Dear {},\n\nyour session has been moved to {}.\n",
        client.first_name,
        local_time(config, appointment.start_time)
    );
    if moved > 1 {
        body.push_str(&format!(
            "The {} following sessions of the series moved accordingly.\n",
            moved - 1
        ));
    }
    body.push_str(&format!(
        "{}\n\n{}",
        meeting_note(config, appointment),
        signature(config)
    ));

    email(
        Some(appointment.id),
        None,
        client,
        EmailKind::Rescheduled,
        format!("Your appointment with {} has moved", config.practice.name),
        body,
        now,
    )
}

/// One cancellation notice covering every cancelled session.
pub fn cancellation(
    config: &PracticeConfig,
    client: &Client,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> Option<NewScheduledEmail> {
    let first = appointments.iter().min_by_key(|a| a.start_time)?;
    let mut starts: Vec<DateTime<Utc>> = appointments.iter().map(|a| a.start_time).collect();
    starts.sort();

    let mut body = format!("Dear {},\n\n", client.first_name);
    if starts.len() == 1 {
        body.push_str(&format!(
            "your session on {} has been cancelled.\n",
            local_time(config, first.start_time)
        ));
    } else {
        body.push_str("the following sessions have been cancelled:\n");
        for start in &starts {
            body.push_str(&format!("  - {}\n", local_time(config, *start)));
        }
    }
    body.push_str(&format!("\n{}", signature(config)));

    Some(email(
        Some(first.id),
        None,
        client,
        EmailKind::Cancellation,
        format!("Your appointment with {} was cancelled", config.practice.name),
        body,
        now,
    ))
}

pub fn invoice_issued(
    config: &PracticeConfig,
    client: &Client,
    invoice: &Invoice,
    now: DateTime<Utc>,
) -> NewScheduledEmail {
    let body = format!(
        "Dear {},\n\ninvoice {} over {} has been issued and is due on {}.\n\n{}",
        client.first_name,
        invoice.invoice_number,
        format_amount(invoice.amount_cents, &config.practice.currency),
        invoice.due_date.format("%-d %B %Y"),
        signature(config)
    );
    email(
        invoice.appointment_id,
        Some(invoice.id),
        client,
        EmailKind::InvoiceIssued,
        format!("Invoice {}", invoice.invoice_number),
        body,
        now,
    )
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

async fn enqueue(practice: &Practice, emails: Vec<NewScheduledEmail>) -> ServiceResult<usize> {
    if !practice.config().notifications.enabled || emails.is_empty() {
        return Ok(0);
    }
    let queued = practice.repo().enqueue_emails(&emails).await?;
    Ok(queued.len())
}

/// Queue the confirmation and a reminder per session still far enough ahead.
pub async fn schedule_for_booking(
    practice: &Practice,
    client: &Client,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> ServiceResult<usize> {
    let config = practice.config();
    let mut emails: Vec<NewScheduledEmail> =
        booking_confirmation(config, client, appointments, now)
            .into_iter()
            .collect();
    emails.extend(
        appointments
            .iter()
            .filter_map(|a| reminder(config, client, a, now)),
    );
    enqueue(practice, emails).await
}

/// Replace the pending reminders of `appointments` with ones matching their
/// current start times.
pub async fn reschedule_reminders(
    practice: &Practice,
    client: &Client,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> ServiceResult<usize> {
    let ids: Vec<AppointmentId> = appointments.iter().map(|a| a.id).collect();
    practice
        .repo()
        .cancel_pending_emails(&ids, Some(&[EmailKind::Reminder][..]))
        .await?;

    let config = practice.config();
    let reminders = appointments
        .iter()
        .filter_map(|a| reminder(config, client, a, now))
        .collect();
    enqueue(practice, reminders).await
}

/// Cancel every pending email of the given appointments.
pub async fn cancel_pending(
    practice: &Practice,
    appointment_ids: &[AppointmentId],
) -> ServiceResult<usize> {
    if appointment_ids.is_empty() {
        return Ok(0);
    }
    Ok(practice
        .repo()
        .cancel_pending_emails(appointment_ids, None)
        .await?)
}

pub async fn notify_rescheduled(
    practice: &Practice,
    client: &Client,
    appointment: &Appointment,
    moved: usize,
    now: DateTime<Utc>,
) -> ServiceResult<usize> {
    let notice = rescheduled(practice.config(), client, appointment, moved, now);
    enqueue(practice, vec![notice]).await
}

pub async fn notify_cancelled(
    practice: &Practice,
    client: &Client,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> ServiceResult<usize> {
    let notice = cancellation(practice.config(), client, appointments, now);
    enqueue(practice, notice.into_iter().collect()).await
}

pub async fn notify_invoice_issued(
    practice: &Practice,
    client: &Client,
    invoice: &Invoice,
    now: DateTime<Utc>,
) -> ServiceResult<usize> {
    let notice = invoice_issued(practice.config(), client, invoice, now);
    enqueue(practice, vec![notice]).await
}

pub async fn list_emails(
    practice: &Practice,
    filter: &EmailFilter,
) -> ServiceResult<Vec<ScheduledEmail>> {
    Ok(practice.repo().list_emails(filter).await?)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Deliver pending emails due at `now`, one attempt each.
///
/// Runs are serialized per [`Practice`]. Failing to record an outcome is
/// logged and does not stop the rest of the batch.
pub async fn dispatch_due(
    practice: &Practice,
    now: DateTime<Utc>,
) -> ServiceResult<DispatchSummary> {
    let _running = practice.dispatch_lock().lock().await;
    let batch = practice.config().notifications.dispatch_batch_size;
    let due = practice.repo().due_emails(now, batch).await?;

    let mut summary = DispatchSummary::default();
    for email in &due {
        summary.attempted += 1;
        let recorded = match practice.mailer().send(email).await {
            Ok(()) => {
                summary.sent += 1;
                practice
                    .repo()
                    .mark_email(email.id, EmailStatus::Sent, Some(now), None)
                    .await
            }
            Err(e) => {
                tracing::warn!(
                    email_id = %email.id,
                    recipient = %email.recipient,
                    error = %e,
                    "Email delivery failed"
                );
                summary.failed += 1;
                practice
                    .repo()
                    .mark_email(email.id, EmailStatus::Failed, None, Some(e.to_string()))
                    .await
            }
        };
        if let Err(e) = recorded {
            tracing::error!(email_id = %email.id, error = %e, "Failed to record email outcome");
        }
    }

    if summary.attempted > 0 {
        tracing::info!(
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            "Email dispatch finished"
        );
    }
    Ok(summary)
}

/// Run [`dispatch_due`] every `notifications.dispatch_interval_secs` until
/// the returned task is aborted.
pub fn spawn_dispatcher(practice: Practice) -> JoinHandle<()> {
    let period =
        StdDuration::from_secs(practice.config().notifications.dispatch_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = dispatch_due(&practice, Utc::now()).await {
                tracing::error!(error = %e, "Email dispatch run failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client() -> Client {
        Client {
            id: ClientId::new(1),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            status: ClientStatus::Active,
            default_rate_cents: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn appointment(id: i64, start: DateTime<Utc>) -> Appointment {
        Appointment {
            id: AppointmentId::new(id),
            client_id: ClientId::new(1),
            title: "Session".to_string(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(50),
            appointment_type: AppointmentType::InPerson,
            status: AppointmentStatus::Scheduled,
            location: Some("Room 2".to_string()),
            rate_cents: 9000,
            host_attended: false,
            client_attended: false,
            recurring_group_id: None,
            recurrence: None,
            meeting_room: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(9000, "EUR"), "90.00 EUR");
        assert_eq!(format_amount(1205, "USD"), "12.05 USD");
        assert_eq!(format_amount(-50, "EUR"), "-0.50 EUR");
    }

    #[test]
    fn test_reminder_skipped_when_too_late() {
        let config = PracticeConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let appt = appointment(1, start);

        let early = start - Duration::hours(48);
        let email = reminder(&config, &client(), &appt, early).unwrap();
        assert_eq!(email.send_at, start - Duration::hours(24));
        assert_eq!(email.kind, EmailKind::Reminder);

        let late = start - Duration::hours(2);
        assert!(reminder(&config, &client(), &appt, late).is_none());
    }

    #[test]
    fn test_confirmation_mentions_series_length() {
        let config = PracticeConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let appts = vec![
            appointment(1, start),
            appointment(2, start + Duration::weeks(1)),
            appointment(3, start + Duration::weeks(2)),
        ];
        let email = booking_confirmation(&config, &client(), &appts, start).unwrap();
        assert!(email.body.contains("first of 3 sessions"));
        assert!(email.body.contains("Room 2"));
        assert_eq!(email.appointment_id, Some(AppointmentId::new(1)));
    }

    #[test]
    fn test_cancellation_lists_every_session() {
        let config = PracticeConfig::default();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let appts = vec![appointment(1, start), appointment(2, start + Duration::weeks(1))];
        let email = cancellation(&config, &client(), &appts, start).unwrap();
        assert_eq!(email.body.matches("  - ").count(), 2);
        assert!(cancellation(&config, &client(), &[], start).is_none());
    }
}
