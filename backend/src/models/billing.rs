use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AppointmentId, ClientId, InvoiceId};
use crate::define_text_enum;

define_text_enum!(
    InvoiceStatus {
        Unpaid => "unpaid",
        Paid => "paid",
        Overdue => "overdue",
        Cancelled => "cancelled",
    }
);

/// A billing record tied to a client and optionally an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub client_id: ClientId,
    pub appointment_id: Option<AppointmentId>,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Unpaid and overdue invoices still track their appointment.
    pub fn is_open(&self) -> bool {
        matches!(self.status, InvoiceStatus::Unpaid | InvoiceStatus::Overdue)
    }

    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Unpaid && self.due_date < today
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub client_id: ClientId,
    pub appointment_id: Option<AppointmentId>,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
}

impl InvoiceFilter {
    pub fn for_appointment(appointment_id: AppointmentId) -> Self {
        Self {
            appointment_id: Some(appointment_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.status.is_none_or(|s| invoice.status == s)
            && self.client_id.is_none_or(|c| invoice.client_id == c)
            && self
                .appointment_id
                .is_none_or(|a| invoice.appointment_id == Some(a))
    }
}
