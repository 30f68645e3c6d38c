use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{AppointmentId, ClientId};
use crate::define_text_enum;

define_text_enum!(
    /// Where a session takes place.
    AppointmentType {
        Online => "online",
        InPerson => "in_person",
    }
);

define_text_enum!(
    AppointmentStatus {
        Scheduled => "scheduled",
        Attended => "attended",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
);

define_text_enum!(
    /// Repetition interval of an appointment series.
    RecurrencePattern {
        Weekly => "weekly",
        Biweekly => "biweekly",
        Monthly => "monthly",
    }
);

define_text_enum!(
    /// One side of a session.
    Participant {
        Host => "host",
        Client => "client",
    }
);

/// A scheduled session between the practitioner and a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub client_id: ClientId,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub location: Option<String>,
    pub rate_cents: i64,
    pub host_attended: bool,
    pub client_attended: bool,
    /// Shared by every member of a recurring series.
    pub recurring_group_id: Option<Uuid>,
    pub recurrence: Option<RecurrencePattern>,
    /// Conference room name, present for online sessions.
    pub meeting_room: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == AppointmentStatus::Cancelled
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring_group_id.is_some()
    }

    /// Half-open interval overlap against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    /// Record attendance for one participant.
    ///
    /// The appointment becomes attended only once both sides attended;
    /// clearing a flag on an attended appointment reverts it to scheduled.
    pub fn record_attendance(&mut self, participant: Participant, attended: bool) {
        match participant {
            Participant::Host => self.host_attended = attended,
            Participant::Client => self.client_attended = attended,
        }

        if self.host_attended && self.client_attended {
            self.status = AppointmentStatus::Attended;
        } else if self.status == AppointmentStatus::Attended {
            self.status = AppointmentStatus::Scheduled;
        }
    }
}

/// Row payload for inserting an appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub client_id: ClientId,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub location: Option<String>,
    pub rate_cents: i64,
    pub recurring_group_id: Option<Uuid>,
    pub recurrence: Option<RecurrencePattern>,
    pub meeting_room: Option<String>,
}

/// Partial update of a single appointment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub appointment_type: Option<AppointmentType>,
    #[serde(default)]
    pub rate_cents: Option<i64>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Calendar query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilter {
    /// Appointments ending after this instant.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Appointments starting before this instant.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        if let Some(from) = self.from {
            if appointment.end_time <= from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if appointment.start_time >= to {
                return false;
            }
        }
        if let Some(client_id) = self.client_id {
            if appointment.client_id != client_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if appointment.status != status {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn appointment() -> Appointment {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        Appointment {
            id: AppointmentId::new(1),
            client_id: ClientId::new(1),
            title: "Session".to_string(),
            description: None,
            start_time: start,
            end_time: start + Duration::minutes(50),
            appointment_type: AppointmentType::Online,
            status: AppointmentStatus::Scheduled,
            location: None,
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
    fn test_attended_requires_both_participants() {
        let mut appt = appointment();
        appt.record_attendance(Participant::Host, true);
        assert_eq!(appt.status, AppointmentStatus::Scheduled);

        appt.record_attendance(Participant::Client, true);
        assert_eq!(appt.status, AppointmentStatus::Attended);
    }

    #[test]
    fn test_clearing_attendance_reverts_status() {
        let mut appt = appointment();
        appt.record_attendance(Participant::Host, true);
        appt.record_attendance(Participant::Client, true);
        appt.record_attendance(Participant::Client, false);
        assert_eq!(appt.status, AppointmentStatus::Scheduled);
        assert!(appt.host_attended);
    }

    #[test]
    fn test_overlap_is_half_open() {
        let appt = appointment();
        let end = appt.end_time;
        assert!(!appt.overlaps(end, end + Duration::minutes(30)));
        assert!(appt.overlaps(end - Duration::minutes(1), end + Duration::minutes(30)));
    }

    #[test]
    fn test_filter_range() {
        let appt = appointment();
        let filter = AppointmentFilter::between(
            appt.end_time,
            appt.end_time + Duration::hours(1),
        );
        assert!(!filter.matches(&appt));

        let filter = AppointmentFilter::between(
            appt.start_time - Duration::hours(1),
            appt.start_time + Duration::minutes(1),
        );
        assert!(filter.matches(&appt));
    }

    #[test]
    fn test_type_serde_names() {
        let json = serde_json::to_string(&AppointmentType::InPerson).unwrap();
        assert_eq!(json, "\"in_person\"");
    }
}
