//! Invoices.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{Invoice, InvoiceFilter, InvoiceId, NewInvoice};

#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Insert invoices with status `unpaid`.
    ///
    /// Invoice numbers are unique; a duplicate yields
    /// `RepositoryError::Conflict` and nothing is written.
    async fn create_invoices(&self, invoices: &[NewInvoice]) -> RepositoryResult<Vec<Invoice>>;

    async fn get_invoice(&self, id: InvoiceId) -> RepositoryResult<Invoice>;

    /// Invoices matching `filter`, newest first.
    async fn list_invoices(&self, filter: &InvoiceFilter) -> RepositoryResult<Vec<Invoice>>;

    /// Highest numeric suffix among invoice numbers starting with `prefix`,
    /// or 0 when there are none.
    async fn last_invoice_sequence(&self, prefix: &str) -> RepositoryResult<i64>;

    /// Overwrite amount, status, description, due date and paid_at.
    async fn save_invoices(&self, invoices: &[Invoice]) -> RepositoryResult<Vec<Invoice>>;

    /// Remove invoices outright. Emails that referenced them are kept.
    ///
    /// # Returns
    /// Number of invoices removed.
    async fn delete_invoices(&self, ids: &[InvoiceId]) -> RepositoryResult<usize>;
}
