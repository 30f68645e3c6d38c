//! Client notes.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{ClientId, NewNote, Note, NoteChanges, NoteId};

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create_note(&self, note: &NewNote) -> RepositoryResult<Note>;

    async fn get_note(&self, id: NoteId) -> RepositoryResult<Note>;

    /// Notes of one client, newest first.
    async fn list_notes(&self, client_id: ClientId) -> RepositoryResult<Vec<Note>>;

    async fn update_note(&self, id: NoteId, changes: &NoteChanges) -> RepositoryResult<Note>;

    async fn delete_note(&self, id: NoteId) -> RepositoryResult<()>;
}
