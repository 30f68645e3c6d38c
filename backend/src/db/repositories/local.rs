//! In-memory local repository implementation.
//!
//! All data lives in ordered maps behind a single `parking_lot::RwLock`, so
//! every trait method is one critical section and multi-row writes are
//! all-or-nothing. Suitable for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::*;
use crate::db::repository::*;
use crate::models::{default_working_hours, normalize_email};

/// In-memory local repository.
///
/// # Example
/// ```ignore
/// use practice_backend::db::repositories::LocalRepository;
///
/// #[tokio::test]
/// async fn test_client_storage() {
///     let repo = LocalRepository::new();
///     let client = repo.create_client(&new_client).await.unwrap();
///     assert_eq!(repo.client_count(), 1);
/// }
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    clients: BTreeMap<ClientId, Client>,
    appointments: BTreeMap<AppointmentId, Appointment>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    notes: BTreeMap<NoteId, Note>,
    working_hours: Option<Vec<WorkingHours>>,
    exceptions: BTreeMap<ExceptionId, AvailabilityException>,
    emails: BTreeMap<EmailId, ScheduledEmail>,

    // ID counters
    next_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            clients: BTreeMap::new(),
            appointments: BTreeMap::new(),
            invoices: BTreeMap::new(),
            notes: BTreeMap::new(),
            working_hours: None,
            exceptions: BTreeMap::new(),
            emails: BTreeMap::new(),
            next_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_health(&self) -> RepositoryResult<()> {
        if !self.is_healthy {
            return Err(RepositoryError::connection("Repository is not healthy"));
        }
        Ok(())
    }

    fn require_client(&self, id: ClientId) -> RepositoryResult<&Client> {
        self.clients
            .get(&id)
            .ok_or_else(|| not_found("client", id.value()))
    }

    /// First live appointment outside `ignore` overlapping `[start, end)`.
    fn overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ignore: &[AppointmentId],
    ) -> Option<&Appointment> {
        self.appointments
            .values()
            .find(|a| !a.is_cancelled() && !ignore.contains(&a.id) && a.overlaps(start, end))
    }
}

fn sequence_after(number: &str, prefix: &str) -> Option<i64> {
    number.strip_prefix(prefix)?.parse().ok()
}

fn not_found(entity: &str, id: i64) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::default()
            .with_entity(entity)
            .with_entity_id(id),
    )
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        let is_healthy = data.is_healthy;
        *data = LocalData {
            is_healthy,
            ..Default::default()
        };
    }

    pub fn client_count(&self) -> usize {
        self.data.read().clients.len()
    }

    pub fn appointment_count(&self) -> usize {
        self.data.read().appointments.len()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn create_client(&self, client: &NewClient) -> RepositoryResult<Client> {
        let mut data = self.data.write();
        data.check_health()?;

        let email = normalize_email(&client.email);
        if data.clients.values().any(|c| c.email == email) {
            return Err(RepositoryError::conflict_with_context(
                format!("A client with email {} already exists", email),
                ErrorContext::new("create_client").with_entity("client"),
            ));
        }

        let now = Utc::now();
        let id = ClientId::new(data.allocate_id());
        let stored = Client {
            id,
            first_name: client.first_name.clone(),
            last_name: client.last_name.clone(),
            email,
            phone: client.phone.clone(),
            status: ClientStatus::Active,
            default_rate_cents: client.default_rate_cents,
            created_at: now,
            updated_at: now,
        };
        data.clients.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_client(&self, id: ClientId) -> RepositoryResult<Client> {
        let data = self.data.read();
        data.check_health()?;
        data.require_client(id).cloned()
    }

    async fn find_client_by_email(&self, email: &str) -> RepositoryResult<Option<Client>> {
        let data = self.data.read();
        data.check_health()?;
        let email = normalize_email(email);
        Ok(data.clients.values().find(|c| c.email == email).cloned())
    }

    async fn list_clients(&self, filter: &ClientFilter) -> RepositoryResult<Vec<Client>> {
        let data = self.data.read();
        data.check_health()?;
        let mut clients: Vec<Client> = data
            .clients
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        clients.sort_by(|a, b| {
            (a.last_name.to_lowercase(), a.first_name.to_lowercase())
                .cmp(&(b.last_name.to_lowercase(), b.first_name.to_lowercase()))
        });
        Ok(clients)
    }

    async fn update_client(
        &self,
        id: ClientId,
        changes: &ClientChanges,
    ) -> RepositoryResult<Client> {
        let mut data = self.data.write();
        data.check_health()?;
        data.require_client(id)?;

        let email = changes.email.as_deref().map(normalize_email);
        if let Some(ref email) = email {
            if data.clients.values().any(|c| c.id != id && &c.email == email) {
                return Err(RepositoryError::conflict_with_context(
                    format!("A client with email {} already exists", email),
                    ErrorContext::new("update_client")
                        .with_entity("client")
                        .with_entity_id(id),
                ));
            }
        }

        let client = data
            .clients
            .get_mut(&id)
            .ok_or_else(|| not_found("client", id.value()))?;
        if let Some(ref first_name) = changes.first_name {
            client.first_name = first_name.clone();
        }
        if let Some(ref last_name) = changes.last_name {
            client.last_name = last_name.clone();
        }
        if let Some(email) = email {
            client.email = email;
        }
        if let Some(ref phone) = changes.phone {
            client.phone = Some(phone.clone()).filter(|p| !p.is_empty());
        }
        if let Some(status) = changes.status {
            client.status = status;
        }
        if let Some(rate) = changes.default_rate_cents {
            client.default_rate_cents = Some(rate);
        }
        client.updated_at = Utc::now();
        Ok(client.clone())
    }

    async fn delete_client(&self, id: ClientId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check_health()?;
        data.require_client(id)?;

        let appointment_ids: Vec<AppointmentId> = data
            .appointments
            .values()
            .filter(|a| a.client_id == id)
            .map(|a| a.id)
            .collect();
        let invoice_ids: Vec<InvoiceId> = data
            .invoices
            .values()
            .filter(|i| i.client_id == id)
            .map(|i| i.id)
            .collect();
        let email = data.clients.get(&id).map(|c| c.email.clone());

        data.appointments.retain(|_, a| a.client_id != id);
        data.invoices.retain(|_, i| i.client_id != id);
        data.notes.retain(|_, n| n.client_id != id);
        data.emails.retain(|_, e| {
            let linked = e.appointment_id.is_some_and(|a| appointment_ids.contains(&a))
                || e.invoice_id.is_some_and(|i| invoice_ids.contains(&i))
                || Some(&e.recipient) == email.as_ref();
            !(linked && e.status == EmailStatus::Pending)
        });
        data.clients.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AppointmentRepository for LocalRepository {
    async fn create_appointments(
        &self,
        appointments: &[NewAppointment],
    ) -> RepositoryResult<Vec<Appointment>> {
        let mut data = self.data.write();
        data.check_health()?;
        for (idx, new) in appointments.iter().enumerate() {
            data.require_client(new.client_id)?;
            if let Some(existing) = data.overlapping(new.start_time, new.end_time, &[]) {
                return Err(slot_taken(existing.id, existing.start_time));
            }
            if let Some(earlier) = appointments[..idx]
                .iter()
                .find(|o| o.start_time < new.end_time && new.start_time < o.end_time)
            {
                return Err(RepositoryError::conflict_with_context(
                    format!(
                        "Appointments starting {} and {} overlap",
                        earlier.start_time, new.start_time
                    ),
                    ErrorContext::new("create_appointments").with_entity("appointment"),
                ));
            }
        }

        let now = Utc::now();
        let mut stored = Vec::with_capacity(appointments.len());
        for new in appointments {
            let id = AppointmentId::new(data.allocate_id());
            let appointment = Appointment {
                id,
                client_id: new.client_id,
                title: new.title.clone(),
                description: new.description.clone(),
                start_time: new.start_time,
                end_time: new.end_time,
                appointment_type: new.appointment_type,
                status: AppointmentStatus::Scheduled,
                location: new.location.clone(),
                rate_cents: new.rate_cents,
                host_attended: false,
                client_attended: false,
                recurring_group_id: new.recurring_group_id,
                recurrence: new.recurrence,
                meeting_room: new.meeting_room.clone(),
                created_at: now,
                updated_at: now,
            };
            data.appointments.insert(id, appointment.clone());
            stored.push(appointment);
        }
        Ok(stored)
    }

    async fn get_appointment(&self, id: AppointmentId) -> RepositoryResult<Appointment> {
        let data = self.data.read();
        data.check_health()?;
        data.appointments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("appointment", id.value()))
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> RepositoryResult<Vec<Appointment>> {
        let data = self.data.read();
        data.check_health()?;
        let mut appointments: Vec<Appointment> = data
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.start_time, a.id));
        Ok(appointments)
    }

    async fn list_series(&self, group_id: Uuid) -> RepositoryResult<Vec<Appointment>> {
        let data = self.data.read();
        data.check_health()?;
        let mut series: Vec<Appointment> = data
            .appointments
            .values()
            .filter(|a| a.recurring_group_id == Some(group_id))
            .cloned()
            .collect();
        series.sort_by_key(|a| (a.start_time, a.id));
        Ok(series)
    }

    async fn save_appointments(
        &self,
        appointments: &[Appointment],
    ) -> RepositoryResult<Vec<Appointment>> {
        let mut data = self.data.write();
        data.check_health()?;
        if let Some(missing) = appointments
            .iter()
            .find(|a| !data.appointments.contains_key(&a.id))
        {
            return Err(not_found("appointment", missing.id.value()));
        }

        let batch: Vec<AppointmentId> = appointments.iter().map(|a| a.id).collect();
        for appointment in appointments.iter().filter(|a| !a.is_cancelled()) {
            let moved = data.appointments.get(&appointment.id).is_some_and(|existing| {
                existing.start_time != appointment.start_time
                    || existing.end_time != appointment.end_time
            });
            if !moved {
                continue;
            }
            if let Some(existing) =
                data.overlapping(appointment.start_time, appointment.end_time, &batch)
            {
                return Err(slot_taken(existing.id, existing.start_time));
            }
        }

        let now = Utc::now();
        let mut stored = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let mut updated = appointment.clone();
            if let Some(existing) = data.appointments.get(&appointment.id) {
                updated.created_at = existing.created_at;
                updated.client_id = existing.client_id;
            }
            updated.updated_at = now;
            data.appointments.insert(updated.id, updated.clone());
            stored.push(updated);
        }
        Ok(stored)
    }

    async fn delete_appointments(&self, ids: &[AppointmentId]) -> RepositoryResult<usize> {
        let mut data = self.data.write();
        data.check_health()?;

        let mut removed = 0;
        for id in ids {
            if data.appointments.remove(id).is_some() {
                removed += 1;
            }
        }
        for invoice in data.invoices.values_mut() {
            if invoice.appointment_id.is_some_and(|a| ids.contains(&a)) {
                invoice.appointment_id = None;
            }
        }
        for note in data.notes.values_mut() {
            if note.appointment_id.is_some_and(|a| ids.contains(&a)) {
                note.appointment_id = None;
            }
        }
        data.emails.retain(|_, e| {
            !(e.status == EmailStatus::Pending
                && e.appointment_id.is_some_and(|a| ids.contains(&a)))
        });
        Ok(removed)
    }
}

#[async_trait]
impl BillingRepository for LocalRepository {
    async fn create_invoices(&self, invoices: &[NewInvoice]) -> RepositoryResult<Vec<Invoice>> {
        let mut data = self.data.write();
        data.check_health()?;

        for (idx, new) in invoices.iter().enumerate() {
            data.require_client(new.client_id)?;
            let taken = data
                .invoices
                .values()
                .any(|i| i.invoice_number == new.invoice_number)
                || invoices[..idx]
                    .iter()
                    .any(|i| i.invoice_number == new.invoice_number);
            if taken {
                return Err(RepositoryError::conflict_with_context(
                    format!("Invoice number {} already exists", new.invoice_number),
                    ErrorContext::new("create_invoices").with_entity("invoice"),
                ));
            }
        }

        let mut stored = Vec::with_capacity(invoices.len());
        for new in invoices {
            let id = InvoiceId::new(data.allocate_id());
            let invoice = Invoice {
                id,
                client_id: new.client_id,
                appointment_id: new.appointment_id,
                invoice_number: new.invoice_number.clone(),
                amount_cents: new.amount_cents,
                status: InvoiceStatus::Unpaid,
                description: new.description.clone(),
                issued_at: new.issued_at,
                due_date: new.due_date,
                paid_at: None,
            };
            data.invoices.insert(id, invoice.clone());
            stored.push(invoice);
        }
        Ok(stored)
    }

    async fn get_invoice(&self, id: InvoiceId) -> RepositoryResult<Invoice> {
        let data = self.data.read();
        data.check_health()?;
        data.invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("invoice", id.value()))
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> RepositoryResult<Vec<Invoice>> {
        let data = self.data.read();
        data.check_health()?;
        let mut invoices: Vec<Invoice> = data
            .invoices
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| (b.issued_at, b.id).cmp(&(a.issued_at, a.id)));
        Ok(invoices)
    }

    async fn last_invoice_sequence(&self, prefix: &str) -> RepositoryResult<i64> {
        let data = self.data.read();
        data.check_health()?;
        Ok(data
            .invoices
            .values()
            .filter_map(|i| sequence_after(&i.invoice_number, prefix))
            .max()
            .unwrap_or(0))
    }

    async fn save_invoices(&self, invoices: &[Invoice]) -> RepositoryResult<Vec<Invoice>> {
        let mut data = self.data.write();
        data.check_health()?;
        if let Some(missing) = invoices
            .iter()
            .find(|i| !data.invoices.contains_key(&i.id))
        {
            return Err(not_found("invoice", missing.id.value()));
        }

        let mut stored = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            if let Some(existing) = data.invoices.get_mut(&invoice.id) {
                existing.amount_cents = invoice.amount_cents;
                existing.status = invoice.status;
                existing.description = invoice.description.clone();
                existing.due_date = invoice.due_date;
                existing.paid_at = invoice.paid_at;
                stored.push(existing.clone());
            }
        }
        Ok(stored)
    }

    async fn delete_invoices(&self, ids: &[InvoiceId]) -> RepositoryResult<usize> {
        let mut data = self.data.write();
        data.check_health()?;
        let before = data.invoices.len();
        data.invoices.retain(|id, _| !ids.contains(id));
        for email in data.emails.values_mut() {
            if email.invoice_id.is_some_and(|i| ids.contains(&i)) {
                email.invoice_id = None;
            }
        }
        Ok(before - data.invoices.len())
    }
}

#[async_trait]
impl NoteRepository for LocalRepository {
    async fn create_note(&self, note: &NewNote) -> RepositoryResult<Note> {
        let mut data = self.data.write();
        data.check_health()?;
        data.require_client(note.client_id)?;

        let now = Utc::now();
        let id = NoteId::new(data.allocate_id());
        let stored = Note {
            id,
            client_id: note.client_id,
            appointment_id: note.appointment_id,
            title: note.title.clone(),
            content: note.content.clone(),
            created_at: now,
            updated_at: now,
        };
        data.notes.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_note(&self, id: NoteId) -> RepositoryResult<Note> {
        let data = self.data.read();
        data.check_health()?;
        data.notes
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("note", id.value()))
    }

    async fn list_notes(&self, client_id: ClientId) -> RepositoryResult<Vec<Note>> {
        let data = self.data.read();
        data.check_health()?;
        let mut notes: Vec<Note> = data
            .notes
            .values()
            .filter(|n| n.client_id == client_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(notes)
    }

    async fn update_note(&self, id: NoteId, changes: &NoteChanges) -> RepositoryResult<Note> {
        let mut data = self.data.write();
        data.check_health()?;
        let note = data
            .notes
            .get_mut(&id)
            .ok_or_else(|| not_found("note", id.value()))?;
        if let Some(ref title) = changes.title {
            note.title = title.clone();
        }
        if let Some(ref content) = changes.content {
            note.content = content.clone();
        }
        if let Some(appointment_id) = changes.appointment_id {
            note.appointment_id = Some(appointment_id);
        }
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn delete_note(&self, id: NoteId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check_health()?;
        data.notes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("note", id.value()))
    }
}

#[async_trait]
impl AvailabilityRepository for LocalRepository {
    async fn get_working_hours(&self) -> RepositoryResult<Vec<WorkingHours>> {
        let data = self.data.read();
        data.check_health()?;
        Ok(data
            .working_hours
            .clone()
            .unwrap_or_else(default_working_hours))
    }

    async fn replace_working_hours(
        &self,
        hours: &[WorkingHours],
    ) -> RepositoryResult<Vec<WorkingHours>> {
        let mut data = self.data.write();
        data.check_health()?;
        let mut hours = hours.to_vec();
        hours.sort_by_key(|h| h.weekday);
        data.working_hours = Some(hours.clone());
        Ok(hours)
    }

    async fn create_exception(
        &self,
        exception: &NewAvailabilityException,
    ) -> RepositoryResult<AvailabilityException> {
        let mut data = self.data.write();
        data.check_health()?;
        let id = ExceptionId::new(data.allocate_id());
        let stored = AvailabilityException {
            id,
            kind: exception.kind,
            start_date: exception.start_date,
            end_date: exception.effective_end_date(),
            start_time: exception.start_time,
            end_time: exception.end_time,
            reason: exception.reason.clone(),
            created_at: Utc::now(),
        };
        data.exceptions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_exception(&self, id: ExceptionId) -> RepositoryResult<AvailabilityException> {
        let data = self.data.read();
        data.check_health()?;
        data.exceptions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("exception", id.value()))
    }

    async fn list_exceptions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> RepositoryResult<Vec<AvailabilityException>> {
        let data = self.data.read();
        data.check_health()?;
        let mut exceptions: Vec<AvailabilityException> = data
            .exceptions
            .values()
            .filter(|e| from.is_none_or(|f| e.end_date >= f) && to.is_none_or(|t| e.start_date <= t))
            .cloned()
            .collect();
        exceptions.sort_by_key(|e| (e.start_date, e.id));
        Ok(exceptions)
    }

    async fn save_exception(
        &self,
        exception: &AvailabilityException,
    ) -> RepositoryResult<AvailabilityException> {
        let mut data = self.data.write();
        data.check_health()?;
        let existing = data
            .exceptions
            .get_mut(&exception.id)
            .ok_or_else(|| not_found("exception", exception.id.value()))?;
        let created_at = existing.created_at;
        *existing = AvailabilityException {
            created_at,
            ..exception.clone()
        };
        Ok(existing.clone())
    }

    async fn delete_exception(&self, id: ExceptionId) -> RepositoryResult<()> {
        let mut data = self.data.write();
        data.check_health()?;
        data.exceptions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("exception", id.value()))
    }
}

#[async_trait]
impl NotificationRepository for LocalRepository {
    async fn enqueue_emails(
        &self,
        emails: &[NewScheduledEmail],
    ) -> RepositoryResult<Vec<ScheduledEmail>> {
        let mut data = self.data.write();
        data.check_health()?;
        let now = Utc::now();
        let mut stored = Vec::with_capacity(emails.len());
        for new in emails {
            let id = EmailId::new(data.allocate_id());
            let email = ScheduledEmail {
                id,
                appointment_id: new.appointment_id,
                invoice_id: new.invoice_id,
                recipient: new.recipient.clone(),
                kind: new.kind,
                subject: new.subject.clone(),
                body: new.body.clone(),
                send_at: new.send_at,
                status: EmailStatus::Pending,
                sent_at: None,
                last_error: None,
                created_at: now,
            };
            data.emails.insert(id, email.clone());
            stored.push(email);
        }
        Ok(stored)
    }

    async fn list_emails(&self, filter: &EmailFilter) -> RepositoryResult<Vec<ScheduledEmail>> {
        let data = self.data.read();
        data.check_health()?;
        let mut emails: Vec<ScheduledEmail> = data
            .emails
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        emails.sort_by_key(|e| (e.send_at, e.id));
        Ok(emails)
    }

    async fn due_emails(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> RepositoryResult<Vec<ScheduledEmail>> {
        let data = self.data.read();
        data.check_health()?;
        let mut due: Vec<ScheduledEmail> = data
            .emails
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.send_at, e.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_email(
        &self,
        id: EmailId,
        status: EmailStatus,
        sent_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> RepositoryResult<ScheduledEmail> {
        let mut data = self.data.write();
        data.check_health()?;
        let email = data
            .emails
            .get_mut(&id)
            .ok_or_else(|| not_found("email", id.value()))?;
        email.status = status;
        email.sent_at = sent_at;
        email.last_error = last_error;
        Ok(email.clone())
    }

    async fn cancel_pending_emails(
        &self,
        appointment_ids: &[AppointmentId],
        kinds: Option<&[EmailKind]>,
    ) -> RepositoryResult<usize> {
        let mut data = self.data.write();
        data.check_health()?;
        let mut cancelled = 0;
        for email in data.emails.values_mut() {
            let matches = email.status == EmailStatus::Pending
                && email
                    .appointment_id
                    .is_some_and(|a| appointment_ids.contains(&a))
                && kinds.is_none_or(|k| k.contains(&email.kind));
            if matches {
                email.status = EmailStatus::Cancelled;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_client(email: &str) -> NewClient {
        NewClient {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            phone: None,
            default_rate_cents: None,
        }
    }

    fn new_appointment(client_id: ClientId, hour: u32) -> NewAppointment {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap();
        NewAppointment {
            client_id,
            title: "Session".to_string(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(50),
            appointment_type: AppointmentType::InPerson,
            location: None,
            rate_cents: 9000,
            recurring_group_id: None,
            recurrence: None,
            meeting_room: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let repo = LocalRepository::new();
        repo.create_client(&new_client("ada@example.com"))
            .await
            .unwrap();
        let err = repo
            .create_client(&new_client("  ADA@example.com "))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_create_appointments_is_all_or_nothing() {
        let repo = LocalRepository::new();
        let client = repo
            .create_client(&new_client("ada@example.com"))
            .await
            .unwrap();
        let batch = vec![
            new_appointment(client.id, 9),
            new_appointment(ClientId::new(999), 10),
        ];
        let err = repo.create_appointments(&batch).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(repo.appointment_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_appointments_detaches_invoices() {
        let repo = LocalRepository::new();
        let client = repo
            .create_client(&new_client("ada@example.com"))
            .await
            .unwrap();
        let stored = repo
            .create_appointments(&[new_appointment(client.id, 9)])
            .await
            .unwrap();
        let invoices = repo
            .create_invoices(&[NewInvoice {
                client_id: client.id,
                appointment_id: Some(stored[0].id),
                invoice_number: "INV-202603-0001".to_string(),
                amount_cents: 9000,
                description: None,
                issued_at: Utc::now(),
                due_date: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
            }])
            .await
            .unwrap();

        let note = repo
            .create_note(&NewNote {
                client_id: client.id,
                appointment_id: Some(stored[0].id),
                title: "Session notes".to_string(),
                content: "Discussed sleep".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(repo.delete_appointments(&[stored[0].id]).await.unwrap(), 1);
        let invoice = repo.get_invoice(invoices[0].id).await.unwrap();
        assert_eq!(invoice.appointment_id, None);
        let note = repo.get_note(note.id).await.unwrap();
        assert_eq!(note.appointment_id, None);
    }

    #[tokio::test]
    async fn test_overlapping_appointments_are_rejected() {
        let repo = LocalRepository::new();
        let client = repo
            .create_client(&new_client("ada@example.com"))
            .await
            .unwrap();
        let stored = repo
            .create_appointments(&[new_appointment(client.id, 9)])
            .await
            .unwrap();

        let mut clash = new_appointment(client.id, 9);
        clash.start_time += Duration::minutes(30);
        clash.end_time += Duration::minutes(30);
        let err = repo.create_appointments(&[clash]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));

        let batch = vec![new_appointment(client.id, 11), new_appointment(client.id, 11)];
        let err = repo.create_appointments(&batch).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        assert_eq!(repo.appointment_count(), 1);

        let later = repo
            .create_appointments(&[new_appointment(client.id, 12)])
            .await
            .unwrap();
        let mut moved = later[0].clone();
        moved.start_time = stored[0].start_time;
        moved.end_time = stored[0].end_time;
        let err = repo.save_appointments(&[moved.clone()]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));

        // A cancelled appointment frees its slot.
        let mut cancelled = stored[0].clone();
        cancelled.status = AppointmentStatus::Cancelled;
        repo.save_appointments(&[cancelled]).await.unwrap();
        let saved = repo.save_appointments(&[moved]).await.unwrap();
        assert_eq!(saved[0].start_time, stored[0].start_time);
    }

    #[tokio::test]
    async fn test_invoice_sequence_survives_deletions() {
        let repo = LocalRepository::new();
        let client = repo
            .create_client(&new_client("ada@example.com"))
            .await
            .unwrap();
        let invoice = |number: &str| NewInvoice {
            client_id: client.id,
            appointment_id: None,
            invoice_number: number.to_string(),
            amount_cents: 9000,
            description: None,
            issued_at: Utc::now(),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
        };
        let stored = repo
            .create_invoices(&[invoice("INV-202603-0001"), invoice("INV-202603-0002")])
            .await
            .unwrap();

        assert_eq!(repo.delete_invoices(&[stored[0].id]).await.unwrap(), 1);
        assert_eq!(repo.last_invoice_sequence("INV-202603-").await.unwrap(), 2);
        assert_eq!(repo.last_invoice_sequence("INV-202604-").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_client_cascades() {
        let repo = LocalRepository::new();
        let client = repo
            .create_client(&new_client("ada@example.com"))
            .await
            .unwrap();
        repo.create_appointments(&[new_appointment(client.id, 9)])
            .await
            .unwrap();
        repo.create_note(&NewNote {
            client_id: client.id,
            appointment_id: None,
            title: "Intake".to_string(),
            content: "First session".to_string(),
        })
        .await
        .unwrap();

        repo.delete_client(client.id).await.unwrap();
        assert_eq!(repo.client_count(), 0);
        assert_eq!(repo.appointment_count(), 0);
        assert!(repo.list_notes(client.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_repository_errors() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        let err = repo.list_clients(&ClientFilter::default()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_working_hours_default_until_replaced() {
        let repo = LocalRepository::new();
        assert_eq!(repo.get_working_hours().await.unwrap().len(), 7);
        let hours = vec![WorkingHours::closed(chrono::Weekday::Mon)];
        repo.replace_working_hours(&hours).await.unwrap();
        assert_eq!(repo.get_working_hours().await.unwrap(), hours);
    }

    #[tokio::test]
    async fn test_due_emails_respects_limit_and_order() {
        let repo = LocalRepository::new();
        let now = Utc::now();
        let email = |offset: i64| NewScheduledEmail {
            appointment_id: None,
            invoice_id: None,
            recipient: "ada@example.com".to_string(),
            kind: EmailKind::Reminder,
            subject: "s".to_string(),
            body: "b".to_string(),
            send_at: now + Duration::minutes(offset),
        };
        repo.enqueue_emails(&[email(-5), email(-10), email(30)])
            .await
            .unwrap();

        let due = repo.due_emails(now, 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due[0].send_at < due[1].send_at);
        assert_eq!(repo.due_emails(now, 1).await.unwrap().len(), 1);
    }
}
