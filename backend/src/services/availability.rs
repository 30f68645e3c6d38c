//! Working-hours template and date exceptions.

use chrono::NaiveDate;

use crate::api::*;
use crate::scheduler::resolve_day;

use super::{Practice, ServiceError, ServiceResult};

/// The weekly template, Monday first.
pub async fn working_hours(practice: &Practice) -> ServiceResult<Vec<WorkingHours>> {
    let mut hours = practice.repo().get_working_hours().await?;
    hours.sort_by_key(|h| h.weekday);
    Ok(hours)
}

/// Check that `hours` names every ISO weekday exactly once and that open
/// days close after they open.
pub fn validate_template(hours: &[WorkingHours]) -> ServiceResult<()> {
    let mut seen = [false; 7];
    for entry in hours {
        let index = match entry.weekday {
            1..=7 => usize::from(entry.weekday - 1),
            other => {
                return Err(ServiceError::validation(format!(
                    "Weekday must be between 1 (Monday) and 7 (Sunday), got {}",
                    other
                )))
            }
        };
        if std::mem::replace(&mut seen[index], true) {
            return Err(ServiceError::validation(format!(
                "Weekday {} appears more than once",
                entry.weekday
            )));
        }
        if entry.is_open && entry.start_time >= entry.end_time {
            return Err(ServiceError::validation(format!(
                "Weekday {}: opening time must be before closing time",
                entry.weekday
            )));
        }
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(ServiceError::validation(format!(
            "Weekday {} is missing from the template",
            missing + 1
        )));
    }
    Ok(())
}

pub async fn replace_working_hours(
    practice: &Practice,
    mut hours: Vec<WorkingHours>,
) -> ServiceResult<Vec<WorkingHours>> {
    validate_template(&hours)?;
    hours.sort_by_key(|h| h.weekday);
    let stored = practice.repo().replace_working_hours(&hours).await?;
    tracing::info!(
        open_days = stored.iter().filter(|h| h.is_open).count(),
        "Working hours replaced"
    );
    Ok(stored)
}

/// Normalize and check an exception: end date defaults to the start date,
/// times only apply to `custom_hours`.
fn prepare_exception(
    mut exception: NewAvailabilityException,
) -> ServiceResult<NewAvailabilityException> {
    let end_date = exception.effective_end_date();
    if end_date < exception.start_date {
        return Err(ServiceError::validation(
            "Exception end date must not be before its start date",
        ));
    }
    exception.end_date = Some(end_date);

    match exception.kind {
        ExceptionKind::CustomHours => match (exception.start_time, exception.end_time) {
            (Some(start), Some(end)) if start < end => {}
            (Some(_), Some(_)) => {
                return Err(ServiceError::validation(
                    "Custom hours must open before they close",
                ))
            }
            _ => {
                return Err(ServiceError::validation(
                    "Custom hours require start_time and end_time",
                ))
            }
        },
        ExceptionKind::Closed | ExceptionKind::Vacation => {
            exception.start_time = None;
            exception.end_time = None;
        }
    }
    Ok(exception)
}

pub async fn create_exception(
    practice: &Practice,
    exception: NewAvailabilityException,
) -> ServiceResult<AvailabilityException> {
    let exception = prepare_exception(exception)?;
    let created = practice.repo().create_exception(&exception).await?;
    tracing::info!(
        exception_id = %created.id,
        kind = %created.kind,
        start = %created.start_date,
        end = %created.end_date,
        "Availability exception added"
    );
    Ok(created)
}

pub async fn get_exception(
    practice: &Practice,
    id: ExceptionId,
) -> ServiceResult<AvailabilityException> {
    Ok(practice.repo().get_exception(id).await?)
}

pub async fn list_exceptions(
    practice: &Practice,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ServiceResult<Vec<AvailabilityException>> {
    if let (Some(from), Some(to)) = (from, to) {
        if to < from {
            return Err(ServiceError::validation("Range end is before its start"));
        }
    }
    Ok(practice.repo().list_exceptions(from, to).await?)
}

/// Replace the rule of an existing exception.
pub async fn update_exception(
    practice: &Practice,
    id: ExceptionId,
    changes: NewAvailabilityException,
) -> ServiceResult<AvailabilityException> {
    let mut exception = practice.repo().get_exception(id).await?;
    let changes = prepare_exception(changes)?;

    exception.end_date = changes.effective_end_date();
    exception.kind = changes.kind;
    exception.start_date = changes.start_date;
    exception.start_time = changes.start_time;
    exception.end_time = changes.end_time;
    exception.reason = changes.reason;
    Ok(practice.repo().save_exception(&exception).await?)
}

pub async fn delete_exception(practice: &Practice, id: ExceptionId) -> ServiceResult<()> {
    Ok(practice.repo().delete_exception(id).await?)
}

/// Resolved availability of the local `date`.
pub async fn day(practice: &Practice, date: NaiveDate) -> ServiceResult<DayAvailability> {
    let template = practice.repo().get_working_hours().await?;
    let exceptions = practice
        .repo()
        .list_exceptions(Some(date), Some(date))
        .await?;
    Ok(resolve_day(date, &template, &exceptions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_working_hours;
    use chrono::NaiveTime;

    fn time(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_default_template_is_valid() {
        assert!(validate_template(&default_working_hours()).is_ok());
    }

    #[test]
    fn test_template_rejects_duplicate_and_missing_days() {
        let mut hours = default_working_hours();
        hours[6].weekday = 1;
        let err = validate_template(&hours).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let hours = default_working_hours()[..6].to_vec();
        let err = validate_template(&hours).unwrap_err();
        assert!(err.to_string().contains("Weekday 7 is missing"));
    }

    #[test]
    fn test_template_rejects_inverted_hours() {
        let mut hours = default_working_hours();
        hours[0].start_time = time(18);
        assert!(validate_template(&hours).is_err());
    }

    #[test]
    fn test_custom_hours_require_times() {
        let exception = NewAvailabilityException {
            kind: ExceptionKind::CustomHours,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            end_date: None,
            start_time: Some(time(10)),
            end_time: None,
            reason: None,
        };
        assert!(prepare_exception(exception).is_err());
    }

    #[test]
    fn test_vacation_drops_times_and_fills_end_date() {
        let start = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let exception = NewAvailabilityException {
            kind: ExceptionKind::Vacation,
            start_date: start,
            end_date: None,
            start_time: Some(time(10)),
            end_time: Some(time(12)),
            reason: Some("Summer".to_string()),
        };
        let prepared = prepare_exception(exception).unwrap();
        assert_eq!(prepared.end_date, Some(start));
        assert!(prepared.start_time.is_none());
    }
}
