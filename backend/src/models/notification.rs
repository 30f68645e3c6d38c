use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AppointmentId, EmailId, InvoiceId};
use crate::define_text_enum;

define_text_enum!(
    EmailKind {
        BookingConfirmation => "booking_confirmation",
        Reminder => "reminder",
        Cancellation => "cancellation",
        Rescheduled => "rescheduled",
        InvoiceIssued => "invoice_issued",
    }
);

define_text_enum!(
    EmailStatus {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

/// An outgoing email waiting for (or past) its send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEmail {
    pub id: EmailId,
    pub appointment_id: Option<AppointmentId>,
    pub invoice_id: Option<InvoiceId>,
    pub recipient: String,
    pub kind: EmailKind,
    pub subject: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
    pub status: EmailStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledEmail {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EmailStatus::Pending && self.send_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScheduledEmail {
    pub appointment_id: Option<AppointmentId>,
    pub invoice_id: Option<InvoiceId>,
    pub recipient: String,
    pub kind: EmailKind,
    pub subject: String,
    pub body: String,
    pub send_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailFilter {
    #[serde(default)]
    pub status: Option<EmailStatus>,
    #[serde(default)]
    pub kind: Option<EmailKind>,
    #[serde(default)]
    pub appointment_id: Option<AppointmentId>,
}

impl EmailFilter {
    pub fn matches(&self, email: &ScheduledEmail) -> bool {
        self.status.is_none_or(|s| email.status == s)
            && self.kind.is_none_or(|k| email.kind == k)
            && self
                .appointment_id
                .is_none_or(|a| email.appointment_id == Some(a))
    }
}
