//! Dashboard analytics.
//!
//! [`compute_stats`] is a pure function over loaded records; [`stats`]
//! fetches what it needs from the repository.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::*;
use crate::scheduler::local_to_utc;

use super::{Practice, ServiceResult};

/// Months covered by the revenue series, the current one included.
pub const REVENUE_MONTHS: i32 = 6;
/// Length of the "next appointments" list.
pub const NEXT_APPOINTMENTS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub scheduled: usize,
    pub attended: usize,
    pub cancelled: usize,
    pub no_show: usize,
}

impl StatusCounts {
    fn add(&mut self, status: AppointmentStatus) {
        match status {
            AppointmentStatus::Scheduled => self.scheduled += 1,
            AppointmentStatus::Attended => self.attended += 1,
            AppointmentStatus::Cancelled => self.cancelled += 1,
            AppointmentStatus::NoShow => self.no_show += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.scheduled + self.attended + self.cancelled + self.no_show
    }

    /// attended / (attended + no_show), or 0 when neither occurred.
    pub fn attendance_rate(&self) -> f64 {
        let decided = self.attended + self.no_show;
        if decided == 0 {
            0.0
        } else {
            self.attended as f64 / decided as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub year: i32,
    pub month: u32,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_clients: usize,
    pub active_clients: usize,
    /// Appointments starting in the current local month.
    pub month_appointments: StatusCounts,
    pub attendance_rate: f64,
    /// Scheduled appointments starting within the next 7 days.
    pub upcoming_week: usize,
    /// Paid invoices by `paid_at` in the current local month.
    pub revenue_this_month_cents: i64,
    /// Unpaid and overdue invoices.
    pub outstanding_cents: i64,
    pub overdue_invoices: usize,
    /// Paid revenue per month, oldest first.
    pub revenue_series: Vec<MonthlyRevenue>,
    pub next_appointments: Vec<Appointment>,
    pub currency: String,
}

/// `(year, month)` moved by `delta` months.
fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// UTC bounds `[start, end)` of a local calendar month.
fn month_bounds(year: i32, month: u32, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let (next_year, next_month) = shift_month(year, month, 1);
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN);
    let next = NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap_or(NaiveDate::MAX);
    (
        local_to_utc(first, NaiveTime::MIN, offset),
        local_to_utc(next, NaiveTime::MIN, offset),
    )
}

fn paid_between(invoices: &[Invoice], start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    invoices
        .iter()
        .filter(|i| i.status == InvoiceStatus::Paid)
        .filter(|i| i.paid_at.is_some_and(|at| start <= at && at < end))
        .map(|i| i.amount_cents)
        .sum()
}

pub fn compute_stats(
    clients: &[Client],
    appointments: &[Appointment],
    invoices: &[Invoice],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> DashboardStats {
    let local_today = now.with_timezone(&offset).date_naive();
    let (year, month) = (local_today.year(), local_today.month());
    let (month_start, month_end) = month_bounds(year, month, offset);

    let mut month_appointments = StatusCounts::default();
    appointments
        .iter()
        .filter(|a| month_start <= a.start_time && a.start_time < month_end)
        .for_each(|a| month_appointments.add(a.status));

    let week_end = now + Duration::days(7);
    let upcoming_week = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Scheduled)
        .filter(|a| now <= a.start_time && a.start_time < week_end)
        .count();

    let mut next_appointments: Vec<Appointment> = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Scheduled && a.start_time >= now)
        .cloned()
        .collect();
    next_appointments.sort_by_key(|a| a.start_time);
    next_appointments.truncate(NEXT_APPOINTMENTS);

    let open = invoices.iter().filter(|i| i.is_open());
    let outstanding_cents = open.clone().map(|i| i.amount_cents).sum();
    let overdue_invoices = open
        .filter(|i| i.status == InvoiceStatus::Overdue || i.is_past_due(local_today))
        .count();

    let revenue_series = (0..REVENUE_MONTHS)
        .rev()
        .map(|back| {
            let (y, m) = shift_month(year, month, -back);
            let (start, end) = month_bounds(y, m, offset);
            MonthlyRevenue {
                year: y,
                month: m,
                revenue_cents: paid_between(invoices, start, end),
            }
        })
        .collect();

    DashboardStats {
        total_clients: clients.len(),
        active_clients: clients
            .iter()
            .filter(|c| c.status == ClientStatus::Active)
            .count(),
        attendance_rate: month_appointments.attendance_rate(),
        month_appointments,
        upcoming_week,
        revenue_this_month_cents: paid_between(invoices, month_start, month_end),
        outstanding_cents,
        overdue_invoices,
        revenue_series,
        next_appointments,
        currency: String::new(),
    }
}

pub async fn stats(practice: &Practice, now: DateTime<Utc>) -> ServiceResult<DashboardStats> {
    let offset = practice.offset();
    let local_today = now.with_timezone(&offset).date_naive();
    let (month_start, _) = month_bounds(local_today.year(), local_today.month(), offset);

    let clients = practice.repo().list_clients(&ClientFilter::default()).await?;
    let appointments = practice
        .repo()
        .list_appointments(&AppointmentFilter {
            from: Some(month_start.min(now)),
            ..Default::default()
        })
        .await?;
    let invoices = practice
        .repo()
        .list_invoices(&InvoiceFilter::default())
        .await?;

    let mut stats = compute_stats(&clients, &appointments, &invoices, now, offset);
    stats.currency = practice.config().practice.currency.clone();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_shift_month_wraps_years() {
        assert_eq!(shift_month(2026, 1, -1), (2025, 12));
        assert_eq!(shift_month(2026, 12, 1), (2027, 1));
        assert_eq!(shift_month(2026, 3, -5), (2025, 10));
    }

    #[test]
    fn test_month_bounds_respect_offset() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        let (start, end) = month_bounds(2026, 3, offset);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 28, 23, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 31, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_attendance_rate_ignores_open_sessions() {
        let counts = StatusCounts {
            scheduled: 4,
            attended: 3,
            cancelled: 2,
            no_show: 1,
        };
        assert_eq!(counts.total(), 10);
        assert!((counts.attendance_rate() - 0.75).abs() < 1e-9);
        assert_eq!(StatusCounts::default().attendance_rate(), 0.0);
    }

    #[test]
    fn test_empty_stats() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let stats = compute_stats(&[], &[], &[], now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(stats.total_clients, 0);
        assert_eq!(stats.revenue_series.len(), 6);
        assert_eq!(stats.revenue_series[5].month, 3);
        assert_eq!(stats.revenue_series[0].month, 10);
        assert!(stats.next_appointments.is_empty());
    }
}
