//! Integration tests for the service layer running on the in-memory
//! repository: calendar, booking, invoicing, email dispatch, meeting links
//! and the dashboard.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use practice_backend::api::*;
use practice_backend::config::PracticeConfig;
use practice_backend::db::repositories::LocalRepository;
use practice_backend::db::repository::FullRepository;
use practice_backend::services::{
    appointments, availability, booking, clients, dashboard, invoices, meeting, notes,
    notifications, Mailer, MemoryMailer, Practice, ServiceError,
};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Sunday morning before the first test week.
fn now() -> DateTime<Utc> {
    utc(2026, 3, 1, 8, 0)
}

fn practice_with(config: PracticeConfig) -> Practice {
    let repo = Arc::new(LocalRepository::new()) as Arc<dyn FullRepository>;
    Practice::new(repo, config)
}

fn practice() -> Practice {
    practice_with(PracticeConfig::default())
}

fn new_client(first: &str, email: &str) -> NewClient {
    NewClient {
        first_name: first.to_string(),
        last_name: "Tester".to_string(),
        email: email.to_string(),
        phone: None,
        default_rate_cents: None,
    }
}

fn session(client_id: ClientId, start: DateTime<Utc>) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        client_id,
        title: None,
        description: None,
        start_time: start,
        end_time: start + Duration::minutes(50),
        appointment_type: None,
        location: None,
        rate_cents: None,
        recurrence: None,
    }
}

/// Four Monday sessions, 9 to 30 March 2026.
async fn weekly_series(practice: &Practice, client_id: ClientId) -> CreatedAppointments {
    let mut request = session(client_id, utc(2026, 3, 9, 10, 0));
    request.recurrence = Some(RecurrenceRequest {
        pattern: RecurrencePattern::Weekly,
        until: date(2026, 3, 30),
    });
    appointments::create(practice, request, now()).await.unwrap()
}

async fn emails_of(practice: &Practice, kind: EmailKind, status: EmailStatus) -> Vec<ScheduledEmail> {
    notifications::list_emails(
        practice,
        &EmailFilter {
            status: Some(status),
            kind: Some(kind),
            appointment_id: None,
        },
    )
    .await
    .unwrap()
}

// =========================================================
// Calendar
// =========================================================

#[tokio::test]
async fn test_series_creation_issues_invoices_and_emails() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Ana", "Ana@Example.com"))
        .await
        .unwrap();
    assert_eq!(client.email, "ana@example.com");

    let created = weekly_series(&practice, client.id).await;
    assert_eq!(created.appointments.len(), 4);
    assert_eq!(created.invoices.len(), 4);

    let group = created.appointments[0].recurring_group_id;
    assert!(group.is_some());
    for appointment in &created.appointments {
        assert_eq!(appointment.recurring_group_id, group);
        assert_eq!(appointment.rate_cents, 9000);
        assert!(appointment.meeting_room.is_some());
    }
    for invoice in &created.invoices {
        assert_eq!(invoice.amount_cents, 9000);
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert!(invoice.invoice_number.starts_with("INV-202603-"));
    }
    let mut numbers: Vec<_> = created.invoices.iter().map(|i| &i.invoice_number).collect();
    numbers.dedup();
    assert_eq!(numbers.len(), 4);

    let confirmations = emails_of(&practice, EmailKind::BookingConfirmation, EmailStatus::Pending).await;
    assert_eq!(confirmations.len(), 1);
    let reminders = emails_of(&practice, EmailKind::Reminder, EmailStatus::Pending).await;
    assert_eq!(reminders.len(), 4);
    assert!(reminders
        .iter()
        .any(|e| e.send_at == utc(2026, 3, 8, 10, 0)));
}

#[tokio::test]
async fn test_client_rate_overrides_practice_default() {
    let practice = practice();
    let mut new = new_client("Ben", "ben@example.com");
    new.default_rate_cents = Some(7500);
    let client = clients::create(&practice, new).await.unwrap();

    let created = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap();
    assert_eq!(created.appointments[0].rate_cents, 7500);
    assert_eq!(created.invoices[0].amount_cents, 7500);
}

#[tokio::test]
async fn test_overlapping_appointment_is_rejected() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Cleo", "cleo@example.com"))
        .await
        .unwrap();
    appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap();

    let err = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 30)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_moving_onto_a_taken_slot_is_rejected() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Cleo", "cleo@example.com"))
        .await
        .unwrap();
    appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap();
    let later = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 13, 0)), now())
        .await
        .unwrap();
    let id = later.appointments[0].id;

    let err = appointments::update(
        &practice,
        id,
        AppointmentChanges {
            start_time: Some(utc(2026, 3, 2, 9, 20)),
            end_time: Some(utc(2026, 3, 2, 10, 10)),
            ..Default::default()
        },
        now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    let unchanged = appointments::get(&practice, id).await.unwrap();
    assert_eq!(unchanged.start_time, utc(2026, 3, 2, 13, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_one_slot_book_it_once() {
    for round in 0..20 {
        let practice = practice();
        let mut handles = Vec::new();
        for n in 0..4 {
            let practice = practice.clone();
            handles.push(tokio::spawn(async move {
                let email = format!("racer{}-{}@example.com", round, n);
                let client = clients::create(&practice, new_client("Racer", &email))
                    .await
                    .unwrap();
                appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 0)), now())
                    .await
            }));
        }

        let mut booked = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => booked += 1,
                Err(err) => assert!(matches!(err, ServiceError::Conflict(_))),
            }
        }
        assert_eq!(booked, 1);
        let stored = appointments::list(&practice, &AppointmentFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }
}

#[tokio::test]
async fn test_archived_client_cannot_get_appointments() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Dora", "dora@example.com"))
        .await
        .unwrap();
    clients::archive(&practice, client.id).await.unwrap();

    let err = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_rate_change_updates_open_invoices_only() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Eli", "eli@example.com"))
        .await
        .unwrap();
    let created = weekly_series(&practice, client.id).await;

    let paid = &created.invoices[0];
    invoices::mark_paid(&practice, paid.id, now()).await.unwrap();

    let first = &created.appointments[0];
    let second = &created.appointments[1];
    for appointment in [first, second] {
        appointments::update(
            &practice,
            appointment.id,
            AppointmentChanges {
                rate_cents: Some(12000),
                ..Default::default()
            },
            now(),
        )
        .await
        .unwrap();
    }

    let paid = invoices::get(&practice, paid.id).await.unwrap();
    assert_eq!(paid.amount_cents, 9000);
    assert_eq!(paid.status, InvoiceStatus::Paid);

    let open = invoices::list(&practice, &InvoiceFilter::for_appointment(second.id))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].amount_cents, 12000);
}

#[tokio::test]
async fn test_moving_one_appointment_replaces_its_reminder() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Fay", "fay@example.com"))
        .await
        .unwrap();
    let created = appointments::create(&practice, session(client.id, utc(2026, 3, 4, 14, 0)), now())
        .await
        .unwrap();
    let id = created.appointments[0].id;

    let moved = appointments::update(
        &practice,
        id,
        AppointmentChanges {
            start_time: Some(utc(2026, 3, 5, 15, 0)),
            end_time: Some(utc(2026, 3, 5, 15, 50)),
            ..Default::default()
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(moved.start_time, utc(2026, 3, 5, 15, 0));

    let reminders = emails_of(&practice, EmailKind::Reminder, EmailStatus::Pending).await;
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].send_at, utc(2026, 3, 4, 15, 0));
    assert_eq!(
        emails_of(&practice, EmailKind::Reminder, EmailStatus::Cancelled)
            .await
            .len(),
        1
    );
    assert_eq!(
        emails_of(&practice, EmailKind::Rescheduled, EmailStatus::Pending)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_shift_following_moves_rest_of_series() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Gus", "gus@example.com"))
        .await
        .unwrap();
    let created = weekly_series(&practice, client.id).await;
    let reference = &created.appointments[1];

    // One day later, half an hour earlier
    let moved = appointments::reschedule_series(
        &practice,
        reference.id,
        SeriesUpdate {
            new_start: utc(2026, 3, 17, 9, 30),
            new_end: None,
            scope: SeriesScope::Following,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(moved.len(), 3);

    let starts: Vec<_> = moved.iter().map(|a| a.start_time).collect();
    assert_eq!(
        starts,
        vec![
            utc(2026, 3, 17, 9, 30),
            utc(2026, 3, 24, 9, 30),
            utc(2026, 3, 31, 9, 30),
        ]
    );
    assert!(moved.iter().all(|a| a.duration() == Duration::minutes(50)));

    let untouched = appointments::get(&practice, created.appointments[0].id)
        .await
        .unwrap();
    assert_eq!(untouched.start_time, utc(2026, 3, 9, 10, 0));

    let rescheduled = emails_of(&practice, EmailKind::Rescheduled, EmailStatus::Pending).await;
    assert_eq!(rescheduled.len(), 1);
    assert_eq!(rescheduled[0].appointment_id, Some(reference.id));
}

#[tokio::test]
async fn test_shift_with_new_duration_applies_to_all() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Hal", "hal@example.com"))
        .await
        .unwrap();
    let created = weekly_series(&practice, client.id).await;
    let reference = &created.appointments[2];

    let moved = appointments::reschedule_series(
        &practice,
        reference.id,
        SeriesUpdate {
            new_start: reference.start_time,
            new_end: Some(reference.start_time + Duration::minutes(80)),
            scope: SeriesScope::All,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(moved.len(), 4);
    assert!(moved.iter().all(|a| a.duration() == Duration::minutes(80)));
}

#[tokio::test]
async fn test_cancel_series_cancels_invoices_and_reminders() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Ida", "ida@example.com"))
        .await
        .unwrap();
    let created = weekly_series(&practice, client.id).await;

    let cancelled = appointments::cancel(
        &practice,
        created.appointments[0].id,
        SeriesScope::All,
        now(),
    )
    .await
    .unwrap();
    assert_eq!(cancelled.len(), 4);
    assert!(cancelled.iter().all(Appointment::is_cancelled));

    let open = invoices::list(
        &practice,
        &InvoiceFilter {
            client_id: Some(client.id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(open.iter().all(|i| i.status == InvoiceStatus::Cancelled));

    assert!(emails_of(&practice, EmailKind::Reminder, EmailStatus::Pending)
        .await
        .is_empty());
    assert_eq!(
        emails_of(&practice, EmailKind::Cancellation, EmailStatus::Pending)
            .await
            .len(),
        1
    );

    // The slot is free again
    appointments::create(&practice, session(client.id, utc(2026, 3, 16, 10, 0)), now())
        .await
        .unwrap();

    let err = appointments::cancel(&practice, created.appointments[0].id, SeriesScope::Single, now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_delete_keeps_invoices_detached() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Jon", "jon@example.com"))
        .await
        .unwrap();
    let created = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 11, 0)), now())
        .await
        .unwrap();

    let deleted = appointments::delete(&practice, created.appointments[0].id, SeriesScope::Single)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let invoice = invoices::get(&practice, created.invoices[0].id).await.unwrap();
    assert_eq!(invoice.appointment_id, None);
    let err = appointments::get(&practice, created.appointments[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_attendance_and_no_show() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Kim", "kim@example.com"))
        .await
        .unwrap();
    let created = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 12, 0)), now())
        .await
        .unwrap();
    let id = created.appointments[0].id;

    let no_show = appointments::mark_no_show(&practice, id).await.unwrap();
    assert_eq!(no_show.status, AppointmentStatus::NoShow);

    appointments::mark_attendance(&practice, id, Participant::Host, true)
        .await
        .unwrap();
    let attended = appointments::mark_attendance(&practice, id, Participant::Client, true)
        .await
        .unwrap();
    assert!(attended.host_attended && attended.client_attended);
    assert_eq!(attended.status, AppointmentStatus::Attended);
}

// =========================================================
// Booking
// =========================================================

fn booking_request(email: &str, start: DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        first_name: "Lea".to_string(),
        last_name: "Booker".to_string(),
        email: email.to_string(),
        phone: None,
        start_time: start,
        appointment_type: None,
        message: Some("First session".to_string()),
    }
}

#[tokio::test]
async fn test_booking_flow_registers_client_and_takes_slot() {
    let practice = practice();
    let tuesday = date(2026, 3, 3);

    let slots = booking::available_slots(&practice, tuesday, now()).await.unwrap();
    assert_eq!(slots.len(), 8);
    assert_eq!(slots[0].start, utc(2026, 3, 3, 9, 0));

    let confirmation = booking::book(&practice, booking_request("lea@example.com", slots[0].start), now())
        .await
        .unwrap();
    assert_eq!(confirmation.appointment.start_time, slots[0].start);
    assert_eq!(confirmation.appointment.end_time, slots[0].end);
    assert_eq!(
        confirmation.appointment.description.as_deref(),
        Some("First session")
    );
    assert!(confirmation.invoice_number.is_some());

    let slots = booking::available_slots(&practice, tuesday, now()).await.unwrap();
    assert_eq!(slots.len(), 7);
    assert_eq!(slots[0].start, utc(2026, 3, 3, 10, 0));

    let err = booking::book(&practice, booking_request("max@example.com", utc(2026, 3, 3, 9, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Returning clients are matched by email
    let again = booking::book(&practice, booking_request("LEA@example.com", utc(2026, 3, 3, 11, 0)), now())
        .await
        .unwrap();
    assert_eq!(again.client_id, confirmation.client_id);
}

#[tokio::test]
async fn test_booking_respects_notice_and_closed_days() {
    let practice = practice();

    // Inside the minimum notice
    let err = booking::book(&practice, booking_request("neo@example.com", utc(2026, 3, 2, 7, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Saturday
    assert!(booking::available_slots(&practice, date(2026, 3, 7), now())
        .await
        .unwrap()
        .is_empty());

    let err = booking::book(&practice, booking_request("not-an-email", utc(2026, 3, 3, 9, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_archived_client_cannot_book() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Ola", "ola@example.com"))
        .await
        .unwrap();
    clients::archive(&practice, client.id).await.unwrap();

    let err = booking::book(&practice, booking_request("ola@example.com", utc(2026, 3, 3, 9, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn test_vacation_closes_month_days() {
    let practice = practice();
    availability::create_exception(
        &practice,
        NewAvailabilityException {
            kind: ExceptionKind::Vacation,
            start_date: date(2026, 3, 9),
            end_date: Some(date(2026, 3, 13)),
            start_time: None,
            end_time: None,
            reason: Some("Holiday".to_string()),
        },
    )
    .await
    .unwrap();

    let days = booking::available_days(&practice, 2026, 3, now()).await.unwrap();
    assert_eq!(days.len(), 31);
    let vacation = date(2026, 3, 9)..=date(2026, 3, 13);
    for day in days.iter().filter(|d| vacation.contains(&d.date)) {
        assert!(!day.open, "{} should be closed", day.date);
        assert_eq!(day.free_slots, 0);
    }
    let tuesday = days.iter().find(|d| d.date == date(2026, 3, 3)).unwrap();
    assert!(tuesday.open);
    assert_eq!(tuesday.free_slots, 8);

    let err = booking::available_days(&practice, 2026, 13, now()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_dates_far_from_today_have_no_slots() {
    let practice = practice();

    let err = booking::available_days(&practice, NaiveDate::MIN.year(), 1, now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = booking::available_days(&practice, NaiveDate::MAX.year(), 12, now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = booking::available_slots(&practice, NaiveDate::MIN, now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    // Beyond the booking horizon the calendar still shows opening days
    let days = booking::available_days(&practice, 2030, 1, now()).await.unwrap();
    assert_eq!(days.len(), 31);
    assert!(days.iter().all(|d| d.free_slots == 0));
    let monday = days.iter().find(|d| d.date == date(2030, 1, 7)).unwrap();
    assert!(monday.open);
    assert!(booking::available_slots(&practice, date(2030, 1, 7), now())
        .await
        .unwrap()
        .is_empty());

    let client = clients::create(&practice, new_client("Zed", "zed@example.com"))
        .await
        .unwrap();
    let err = appointments::create(&practice, session(client.id, utc(10000, 1, 3, 9, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

// =========================================================
// Invoices
// =========================================================

#[tokio::test]
async fn test_manual_invoice_lifecycle() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Pia", "pia@example.com"))
        .await
        .unwrap();

    let invoice = invoices::create(
        &practice,
        CreateInvoiceRequest {
            client_id: client.id,
            appointment_id: None,
            amount_cents: Some(4500),
            description: Some("Report".to_string()),
            due_date: None,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(invoice.due_date, date(2026, 3, 15));
    assert_eq!(
        emails_of(&practice, EmailKind::InvoiceIssued, EmailStatus::Pending)
            .await
            .len(),
        1
    );

    let overdue = invoices::refresh_overdue(&practice, date(2026, 3, 16)).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].status, InvoiceStatus::Overdue);

    let extended = invoices::update(
        &practice,
        invoice.id,
        InvoiceChanges {
            due_date: Some(date(2026, 4, 1)),
            ..Default::default()
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(extended.status, InvoiceStatus::Unpaid);

    let paid = invoices::mark_paid(&practice, invoice.id, now()).await.unwrap();
    assert_eq!(paid.paid_at, Some(now()));
    let err = invoices::cancel(&practice, invoice.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn test_invoice_numbers_continue_after_client_deletion() {
    let practice = practice();
    let first = clients::create(&practice, new_client("Ines", "ines@example.com"))
        .await
        .unwrap();
    let second = clients::create(&practice, new_client("Joel", "joel@example.com"))
        .await
        .unwrap();
    let third = clients::create(&practice, new_client("Kira", "kira@example.com"))
        .await
        .unwrap();

    let a = appointments::create(&practice, session(first.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap();
    let b = appointments::create(&practice, session(second.id, utc(2026, 3, 2, 11, 0)), now())
        .await
        .unwrap();
    assert_eq!(a.invoices[0].invoice_number, "INV-202603-0001");
    assert_eq!(b.invoices[0].invoice_number, "INV-202603-0002");

    clients::delete(&practice, first.id).await.unwrap();

    let c = appointments::create(&practice, session(third.id, utc(2026, 3, 2, 13, 0)), now())
        .await
        .unwrap();
    assert_eq!(c.invoices[0].invoice_number, "INV-202603-0003");

    let manual = invoices::create(
        &practice,
        CreateInvoiceRequest {
            client_id: third.id,
            appointment_id: None,
            amount_cents: Some(4500),
            description: Some("Report".to_string()),
            due_date: None,
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(manual.invoice_number, "INV-202603-0004");
}

#[tokio::test]
async fn test_failed_invoicing_leaves_no_appointment_behind() {
    let repo = Arc::new(LocalRepository::new()) as Arc<dyn FullRepository>;
    let practice = Practice::new(repo.clone(), PracticeConfig::default());
    let client = clients::create(&practice, new_client("Lena", "lena@example.com"))
        .await
        .unwrap();
    practice
        .repo()
        .create_invoices(&[NewInvoice {
            client_id: client.id,
            appointment_id: None,
            invoice_number: format!("INV-202603-{}", i64::MAX),
            amount_cents: 100,
            description: None,
            issued_at: now(),
            due_date: date(2026, 3, 15),
        }])
        .await
        .unwrap();

    let err = appointments::create(&practice, session(client.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let stored = appointments::list(&practice, &AppointmentFilter::default())
        .await
        .unwrap();
    assert!(stored.is_empty());
    let queued = notifications::list_emails(&practice, &EmailFilter::default())
        .await
        .unwrap();
    assert!(queued.is_empty());

    // The slot is free again
    let mut config = PracticeConfig::default();
    config.booking.auto_invoice = false;
    let without_invoices = Practice::new(repo, config);
    let retry = appointments::create(
        &without_invoices,
        session(client.id, utc(2026, 3, 2, 9, 0)),
        now(),
    )
    .await
    .unwrap();
    assert!(retry.invoices.is_empty());
}

#[tokio::test]
async fn test_invoice_for_foreign_appointment_is_rejected() {
    let practice = practice();
    let owner = clients::create(&practice, new_client("Quin", "quin@example.com"))
        .await
        .unwrap();
    let other = clients::create(&practice, new_client("Rae", "rae@example.com"))
        .await
        .unwrap();
    let created = appointments::create(&practice, session(owner.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap();

    let err = invoices::create(
        &practice,
        CreateInvoiceRequest {
            client_id: other.id,
            appointment_id: Some(created.appointments[0].id),
            amount_cents: None,
            description: None,
            due_date: None,
        },
        now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

// =========================================================
// Notes
// =========================================================

#[tokio::test]
async fn test_note_must_reference_own_appointment() {
    let practice = practice();
    let owner = clients::create(&practice, new_client("Sam", "sam@example.com"))
        .await
        .unwrap();
    let other = clients::create(&practice, new_client("Tia", "tia@example.com"))
        .await
        .unwrap();
    let created = appointments::create(&practice, session(owner.id, utc(2026, 3, 2, 9, 0)), now())
        .await
        .unwrap();
    let appointment_id = created.appointments[0].id;

    let note = notes::create(
        &practice,
        NewNote {
            client_id: owner.id,
            appointment_id: Some(appointment_id),
            title: "Intake".to_string(),
            content: "Goals discussed".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(notes::list(&practice, owner.id).await.unwrap(), vec![note]);

    let err = notes::create(
        &practice,
        NewNote {
            client_id: other.id,
            appointment_id: Some(appointment_id),
            title: "Wrong".to_string(),
            content: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

// =========================================================
// Email dispatch
// =========================================================

#[tokio::test]
async fn test_dispatch_sends_due_emails_once() {
    let mailer = Arc::new(MemoryMailer::new());
    let practice = practice().with_mailer(mailer.clone());

    let good = clients::create(&practice, new_client("Uma", "uma@example.com"))
        .await
        .unwrap();
    let bad = clients::create(&practice, new_client("Vic", "vic@example.com"))
        .await
        .unwrap();
    mailer.reject("vic@example.com");

    appointments::create(&practice, session(good.id, utc(2026, 3, 3, 9, 0)), now())
        .await
        .unwrap();
    appointments::create(&practice, session(bad.id, utc(2026, 3, 3, 10, 0)), now())
        .await
        .unwrap();

    let summary = notifications::dispatch_due(&practice, now()).await.unwrap();
    assert_eq!(
        summary,
        notifications::DispatchSummary {
            attempted: 2,
            sent: 1,
            failed: 1
        }
    );
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(mailer.sent()[0].recipient, "uma@example.com");

    let failed = emails_of(&practice, EmailKind::BookingConfirmation, EmailStatus::Failed).await;
    assert_eq!(failed.len(), 1);
    assert!(failed[0].last_error.is_some());

    // Nothing else is due yet; failures are not retried
    let summary = notifications::dispatch_due(&practice, now()).await.unwrap();
    assert_eq!(summary.attempted, 0);

    // Reminders become due a day before the sessions
    let summary = notifications::dispatch_due(&practice, utc(2026, 3, 2, 10, 0))
        .await
        .unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.sent, 1);
}

/// Mailer that empties the repository during its first delivery, so the
/// outcome can no longer be recorded.
struct WipingMailer {
    repo: LocalRepository,
    inner: Arc<MemoryMailer>,
}

#[async_trait]
impl Mailer for WipingMailer {
    async fn send(&self, email: &ScheduledEmail) -> anyhow::Result<()> {
        self.repo.clear();
        self.inner.send(email).await
    }
}

#[tokio::test]
async fn test_dispatch_finishes_batch_when_outcome_cannot_be_recorded() {
    let repo = LocalRepository::new();
    let inner = Arc::new(MemoryMailer::new());
    let practice = Practice::new(
        Arc::new(repo.clone()) as Arc<dyn FullRepository>,
        PracticeConfig::default(),
    )
    .with_mailer(Arc::new(WipingMailer {
        repo,
        inner: inner.clone(),
    }));

    for (name, hour) in [("Mia", 9), ("Noa", 11)] {
        let email = format!("{}@example.com", name.to_lowercase());
        let client = clients::create(&practice, new_client(name, &email))
            .await
            .unwrap();
        appointments::create(&practice, session(client.id, utc(2026, 3, 3, hour, 0)), now())
            .await
            .unwrap();
    }

    let summary = notifications::dispatch_due(&practice, now()).await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.sent, 2);
    assert_eq!(inner.sent().len(), 2);
}

#[tokio::test]
async fn test_overlapping_dispatch_runs_send_each_email_once() {
    let mailer = Arc::new(MemoryMailer::new());
    let practice = practice().with_mailer(mailer.clone());
    for (name, hour) in [("Oda", 9), ("Pia", 11)] {
        let email = format!("{}@example.com", name.to_lowercase());
        let client = clients::create(&practice, new_client(name, &email))
            .await
            .unwrap();
        appointments::create(&practice, session(client.id, utc(2026, 3, 3, hour, 0)), now())
            .await
            .unwrap();
    }

    let (first, second) = tokio::join!(
        notifications::dispatch_due(&practice, now()),
        notifications::dispatch_due(&practice, now())
    );
    let attempted = first.unwrap().attempted + second.unwrap().attempted;
    assert_eq!(attempted, 2);
    assert_eq!(mailer.sent().len(), 2);
}

#[tokio::test]
async fn test_disabled_notifications_queue_nothing() {
    let mut config = PracticeConfig::default();
    config.notifications.enabled = false;
    let practice = practice_with(config);
    let client = clients::create(&practice, new_client("Wes", "wes@example.com"))
        .await
        .unwrap();
    appointments::create(&practice, session(client.id, utc(2026, 3, 3, 9, 0)), now())
        .await
        .unwrap();

    let emails = notifications::list_emails(&practice, &EmailFilter::default())
        .await
        .unwrap();
    assert!(emails.is_empty());
}

// =========================================================
// Meeting links
// =========================================================

fn meeting_practice() -> Practice {
    let mut config = PracticeConfig::default();
    config.meeting.app_secret = "meeting-secret".to_string();
    config.meeting.domain = "meet.practice.test".to_string();
    practice_with(config)
}

#[tokio::test]
async fn test_client_join_checks_email_and_window() {
    let practice = meeting_practice();
    let client = clients::create(&practice, new_client("Xia", "xia@example.com"))
        .await
        .unwrap();
    let start = utc(2026, 3, 2, 9, 0);
    let created = appointments::create(&practice, session(client.id, start), now())
        .await
        .unwrap();
    let appointment = &created.appointments[0];
    let during = start + Duration::minutes(5);

    let err = meeting::join_as_client(&practice, appointment.id, "someone@example.com", during)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = meeting::join_as_client(&practice, appointment.id, "xia@example.com", now())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let link = meeting::join_as_client(&practice, appointment.id, " XIA@example.com ", during)
        .await
        .unwrap();
    let room = appointment.meeting_room.clone().unwrap();
    assert_eq!(link.room, room);
    assert!(!link.moderator);
    assert!(link
        .url
        .starts_with(&format!("https://meet.practice.test/{}?jwt=", room)));
    assert_eq!(link.opens_at, start - Duration::minutes(15));
    assert_eq!(link.expires_at, appointment.end_time + Duration::minutes(15));

    let claims = meeting::verify_token(&practice, &link.token, during).unwrap();
    assert_eq!(claims.room, room);
    assert_eq!(claims.context.user.email, "xia@example.com");

    let host = meeting::issue_link(&practice, appointment.id, Participant::Host, during)
        .await
        .unwrap();
    assert!(host.moderator);
}

#[tokio::test]
async fn test_in_person_sessions_have_no_link() {
    let practice = meeting_practice();
    let client = clients::create(&practice, new_client("Yan", "yan@example.com"))
        .await
        .unwrap();
    let start = utc(2026, 3, 2, 9, 0);
    let mut request = session(client.id, start);
    request.appointment_type = Some(AppointmentType::InPerson);
    let created = appointments::create(&practice, request, now()).await.unwrap();
    assert!(created.appointments[0].meeting_room.is_none());

    let err = meeting::issue_link(&practice, created.appointments[0].id, Participant::Host, start)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

// =========================================================
// Availability and dashboard
// =========================================================

#[tokio::test]
async fn test_custom_hours_shape_the_day() {
    let practice = practice();
    availability::create_exception(
        &practice,
        NewAvailabilityException {
            kind: ExceptionKind::CustomHours,
            start_date: date(2026, 3, 3),
            end_date: None,
            start_time: chrono::NaiveTime::from_hms_opt(13, 0, 0),
            end_time: chrono::NaiveTime::from_hms_opt(15, 0, 0),
            reason: None,
        },
    )
    .await
    .unwrap();

    let day = availability::day(&practice, date(2026, 3, 3)).await.unwrap();
    assert_eq!(day.source, AvailabilitySource::Exception);
    let slots = booking::available_slots(&practice, date(2026, 3, 3), now())
        .await
        .unwrap();
    let starts: Vec<_> = slots.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![utc(2026, 3, 3, 13, 0), utc(2026, 3, 3, 14, 0)]);
}

#[tokio::test]
async fn test_dashboard_reflects_activity() {
    let practice = practice();
    let client = clients::create(&practice, new_client("Zoe", "zoe@example.com"))
        .await
        .unwrap();
    let created = weekly_series(&practice, client.id).await;
    invoices::mark_paid(&practice, created.invoices[0].id, utc(2026, 3, 9, 12, 0))
        .await
        .unwrap();

    let stats = dashboard::stats(&practice, utc(2026, 3, 10, 8, 0)).await.unwrap();
    assert_eq!(stats.total_clients, 1);
    assert_eq!(stats.active_clients, 1);
    assert_eq!(stats.month_appointments.total(), 4);
    assert_eq!(stats.revenue_this_month_cents, 9000);
    assert_eq!(stats.outstanding_cents, 27000);
    assert_eq!(stats.upcoming_week, 1);
    assert_eq!(stats.currency, "EUR");
    assert_eq!(stats.revenue_series.len(), dashboard::REVENUE_MONTHS as usize);
    assert_eq!(stats.revenue_series.last().map(|m| m.revenue_cents), Some(9000));
}
