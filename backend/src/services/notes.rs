//! Session notes kept per client.

use crate::api::*;

use super::{Practice, ServiceError, ServiceResult};

/// A referenced appointment must belong to the note's client.
async fn check_appointment(
    practice: &Practice,
    client_id: ClientId,
    appointment_id: Option<AppointmentId>,
) -> ServiceResult<()> {
    let Some(appointment_id) = appointment_id else {
        return Ok(());
    };
    let appointment = practice.repo().get_appointment(appointment_id).await?;
    if appointment.client_id != client_id {
        return Err(ServiceError::validation(format!(
            "Appointment {} belongs to another client",
            appointment_id
        )));
    }
    Ok(())
}

pub async fn create(practice: &Practice, note: NewNote) -> ServiceResult<Note> {
    if note.title.trim().is_empty() {
        return Err(ServiceError::validation("Note title must not be empty"));
    }
    practice.repo().get_client(note.client_id).await?;
    check_appointment(practice, note.client_id, note.appointment_id).await?;

    Ok(practice.repo().create_note(&note).await?)
}

pub async fn get(practice: &Practice, id: NoteId) -> ServiceResult<Note> {
    Ok(practice.repo().get_note(id).await?)
}

/// Notes of one client, newest first.
pub async fn list(practice: &Practice, client_id: ClientId) -> ServiceResult<Vec<Note>> {
    practice.repo().get_client(client_id).await?;
    Ok(practice.repo().list_notes(client_id).await?)
}

pub async fn update(practice: &Practice, id: NoteId, changes: NoteChanges) -> ServiceResult<Note> {
    if changes
        .title
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        return Err(ServiceError::validation("Note title must not be empty"));
    }
    let note = practice.repo().get_note(id).await?;
    check_appointment(practice, note.client_id, changes.appointment_id).await?;

    Ok(practice.repo().update_note(id, &changes).await?)
}

pub async fn delete(practice: &Practice, id: NoteId) -> ServiceResult<()> {
    Ok(practice.repo().delete_note(id).await?)
}
