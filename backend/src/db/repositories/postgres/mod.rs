//! Postgres repository implementation using Diesel.
//!
//! This module implements the repository traits against the schema created
//! by the embedded migrations under `migrations/`.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Multi-row writes inside a single transaction
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task;
use uuid::Uuid;

use crate::api::*;
use crate::db::repository::{
    slot_taken, AppointmentRepository, AvailabilityRepository, BillingRepository,
    ClientRepository, ErrorContext, NoteRepository, NotificationRepository, RepositoryError,
    RepositoryResult,
};
use crate::models::{default_working_hours, normalize_email};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
    /// - `PG_POOL_MAX`: Maximum pool size (default: 10)
    /// - `PG_POOL_MIN`: Minimum pool size (default: 1)
    /// - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
    /// - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
    /// - `PG_MAX_RETRIES`: Maximum retry attempts (default: 3)
    /// - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let max_pool_size = std::env::var("PG_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let min_pool_size = std::env::var("PG_POOL_MIN")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let connection_timeout_sec = std::env::var("PG_CONN_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_sec = std::env::var("PG_IDLE_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);

        let max_retries = std::env::var("PG_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let retry_delay_ms = std::env::var("PG_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100);

        Ok(Self {
            database_url,
            max_pool_size,
            min_pool_size,
            connection_timeout_sec,
            idle_timeout_sec,
            max_retries,
            retry_delay_ms,
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total successful queries executed
    pub total_queries: u64,
    /// Total failed queries
    pub failed_queries: u64,
    /// Total retried operations
    pub retried_operations: u64,
}

/// Diesel-backed repository for Postgres.
///
/// This repository implementation provides:
/// - Connection pooling with configurable limits
/// - Automatic retry for transient failures
/// - Health monitoring and statistics
/// - Automatic schema migrations
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    // Metrics counters
    total_queries: std::sync::Arc<AtomicU64>,
    failed_queries: std::sync::Arc<AtomicU64>,
    retried_operations: std::sync::Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    ///
    /// # Returns
    /// * `Ok(PostgresRepository)` on success
    /// * `Err(RepositoryError)` if connection or migration fails
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true) // Validate connections before use
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        // Run migrations once during initialization
        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: std::sync::Arc::new(AtomicU64::new(0)),
            failed_queries: std::sync::Arc::new(AtomicU64::new(0)),
            retried_operations: std::sync::Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient failures.
    ///
    /// This method will retry the operation up to `max_retries` times if a
    /// retryable error occurs (connection errors, timeouts, serialization failures).
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2; // Exponential backoff
                }

                // Get connection
                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                // Execute the operation
                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Get pool health statistics.
    ///
    /// Returns current pool state and query statistics for monitoring.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn not_found(entity: &str, id: i64) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::default()
            .with_entity(entity)
            .with_entity_id(id),
    )
}

/// Serialize writers that check for overlapping appointments. Readers are
/// not blocked.
fn lock_appointments(conn: &mut PgConnection) -> RepositoryResult<()> {
    sql_query("LOCK TABLE appointments IN SHARE ROW EXCLUSIVE MODE").execute(conn)?;
    Ok(())
}

/// Fail with a conflict when a live appointment outside `ignore` overlaps
/// `[start, end)`.
fn check_overlap(
    conn: &mut PgConnection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    ignore: &[i64],
) -> RepositoryResult<()> {
    let clash: Option<(i64, DateTime<Utc>)> = appointments::table
        .filter(appointments::start_time.lt(end))
        .filter(appointments::end_time.gt(start))
        .filter(appointments::status.ne(AppointmentStatus::Cancelled.as_str()))
        .filter(appointments::appointment_id.ne_all(ignore))
        .select((appointments::appointment_id, appointments::start_time))
        .first(conn)
        .optional()?;
    match clash {
        Some((id, start)) => Err(slot_taken(AppointmentId::new(id), start)),
        None => Ok(()),
    }
}

fn sequence_after(number: &str, prefix: &str) -> Option<i64> {
    number.strip_prefix(prefix)?.parse().ok()
}

fn collect_rows<R, T>(
    rows: Vec<R>,
    convert: impl Fn(R) -> RepositoryResult<T>,
) -> RepositoryResult<Vec<T>> {
    rows.into_iter().map(convert).collect()
}

#[async_trait]
impl ClientRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn create_client(&self, client: &NewClient) -> RepositoryResult<Client> {
        let row = NewClientRow {
            first_name: client.first_name.clone(),
            last_name: client.last_name.clone(),
            email: normalize_email(&client.email),
            phone: client.phone.clone(),
            status: ClientStatus::Active.as_str().to_string(),
            default_rate_cents: client.default_rate_cents,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(clients::table)
                .values(&row)
                .returning(ClientRow::as_returning())
                .get_result(conn)
                .map_err(|e| map_diesel_error(e).with_operation("create_client"))?
                .into_client()
        })
        .await
    }

    async fn get_client(&self, id: ClientId) -> RepositoryResult<Client> {
        self.with_conn(move |conn| {
            clients::table
                .find(id.value())
                .select(ClientRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("client", id.value()))?
                .into_client()
        })
        .await
    }

    async fn find_client_by_email(&self, email: &str) -> RepositoryResult<Option<Client>> {
        let email = normalize_email(email);
        self.with_conn(move |conn| {
            clients::table
                .filter(clients::email.eq(&email))
                .select(ClientRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(ClientRow::into_client)
                .transpose()
        })
        .await
    }

    async fn list_clients(&self, filter: &ClientFilter) -> RepositoryResult<Vec<Client>> {
        let status = filter.status;
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));
        self.with_conn(move |conn| {
            let mut query = clients::table.select(ClientRow::as_select()).into_boxed();
            if let Some(status) = status {
                query = query.filter(clients::status.eq(status.as_str()));
            }
            if let Some(pattern) = search {
                query = query.filter(
                    clients::first_name
                        .ilike(pattern.clone())
                        .or(clients::last_name.ilike(pattern.clone()))
                        .or(clients::email.like(pattern)),
                );
            }
            let rows = query
                .order((clients::last_name.asc(), clients::first_name.asc()))
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, ClientRow::into_client)
        })
        .await
    }

    async fn update_client(
        &self,
        id: ClientId,
        changes: &ClientChanges,
    ) -> RepositoryResult<Client> {
        let changeset = ClientChangeset {
            first_name: changes.first_name.clone(),
            last_name: changes.last_name.clone(),
            email: changes.email.as_deref().map(normalize_email),
            phone: changes
                .phone
                .clone()
                .map(|p| Some(p).filter(|p| !p.is_empty())),
            status: changes.status.map(|s| s.as_str().to_string()),
            default_rate_cents: changes.default_rate_cents.map(Some),
            updated_at: Some(Utc::now()),
        };
        self.with_conn(move |conn| {
            diesel::update(clients::table.find(id.value()))
                .set(&changeset)
                .returning(ClientRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(|e| map_diesel_error(e).with_operation("update_client"))?
                .ok_or_else(|| not_found("client", id.value()))?
                .into_client()
        })
        .await
    }

    async fn delete_client(&self, id: ClientId) -> RepositoryResult<()> {
        let client_id = id.value();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                let email: String = clients::table
                    .find(client_id)
                    .select(clients::email)
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| not_found("client", client_id))?;
                let appointment_ids: Vec<i64> = appointments::table
                    .filter(appointments::client_id.eq(client_id))
                    .select(appointments::appointment_id)
                    .load(conn)?;
                let invoice_ids: Vec<i64> = invoices::table
                    .filter(invoices::client_id.eq(client_id))
                    .select(invoices::invoice_id)
                    .load(conn)?;

                diesel::delete(
                    scheduled_emails::table
                        .filter(scheduled_emails::status.eq(EmailStatus::Pending.as_str()))
                        .filter(
                            scheduled_emails::appointment_id
                                .eq_any(&appointment_ids)
                                .or(scheduled_emails::invoice_id.eq_any(&invoice_ids))
                                .or(scheduled_emails::recipient.eq(&email)),
                        ),
                )
                .execute(conn)?;
                diesel::delete(notes::table.filter(notes::client_id.eq(client_id)))
                    .execute(conn)?;
                diesel::delete(invoices::table.filter(invoices::client_id.eq(client_id)))
                    .execute(conn)?;
                diesel::delete(appointments::table.filter(appointments::client_id.eq(client_id)))
                    .execute(conn)?;
                diesel::delete(clients::table.find(client_id)).execute(conn)?;
                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl AppointmentRepository for PostgresRepository {
    async fn create_appointments(
        &self,
        appointments: &[NewAppointment],
    ) -> RepositoryResult<Vec<Appointment>> {
        let rows: Vec<NewAppointmentRow> = appointments.iter().map(Into::into).collect();
        let client_ids: Vec<i64> = rows
            .iter()
            .map(|r| r.client_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                let known: Vec<i64> = clients::table
                    .filter(clients::client_id.eq_any(&client_ids))
                    .select(clients::client_id)
                    .load(conn)?;
                if let Some(missing) = client_ids.iter().find(|id| !known.contains(id)) {
                    return Err(not_found("client", *missing));
                }
                lock_appointments(conn)?;
                for (idx, row) in rows.iter().enumerate() {
                    check_overlap(conn, row.start_time, row.end_time, &[])?;
                    if rows[..idx]
                        .iter()
                        .any(|o| o.start_time < row.end_time && row.start_time < o.end_time)
                    {
                        return Err(RepositoryError::conflict_with_context(
                            format!("Appointments starting {} overlap", row.start_time),
                            ErrorContext::new("create_appointments").with_entity("appointment"),
                        ));
                    }
                }
                let stored: Vec<AppointmentRow> = diesel::insert_into(appointments::table)
                    .values(&rows)
                    .returning(AppointmentRow::as_returning())
                    .get_results(conn)?;
                collect_rows(stored, AppointmentRow::into_appointment)
            })
        })
        .await
    }

    async fn get_appointment(&self, id: AppointmentId) -> RepositoryResult<Appointment> {
        self.with_conn(move |conn| {
            appointments::table
                .find(id.value())
                .select(AppointmentRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("appointment", id.value()))?
                .into_appointment()
        })
        .await
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> RepositoryResult<Vec<Appointment>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut query = appointments::table
                .select(AppointmentRow::as_select())
                .into_boxed();
            if let Some(from) = filter.from {
                query = query.filter(appointments::end_time.gt(from));
            }
            if let Some(to) = filter.to {
                query = query.filter(appointments::start_time.lt(to));
            }
            if let Some(client_id) = filter.client_id {
                query = query.filter(appointments::client_id.eq(client_id.value()));
            }
            if let Some(status) = filter.status {
                query = query.filter(appointments::status.eq(status.as_str()));
            }
            let rows = query
                .order((appointments::start_time.asc(), appointments::appointment_id.asc()))
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, AppointmentRow::into_appointment)
        })
        .await
    }

    async fn list_series(&self, group_id: Uuid) -> RepositoryResult<Vec<Appointment>> {
        self.with_conn(move |conn| {
            let rows = appointments::table
                .filter(appointments::recurring_group_id.eq(group_id))
                .select(AppointmentRow::as_select())
                .order((appointments::start_time.asc(), appointments::appointment_id.asc()))
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, AppointmentRow::into_appointment)
        })
        .await
    }

    async fn save_appointments(
        &self,
        appointments: &[Appointment],
    ) -> RepositoryResult<Vec<Appointment>> {
        let now = Utc::now();
        let changes: Vec<(i64, AppointmentChangeset)> = appointments
            .iter()
            .map(|a| (a.id.value(), AppointmentChangeset::from_appointment(a, now)))
            .collect();
        let live: Vec<(i64, DateTime<Utc>, DateTime<Utc>)> = appointments
            .iter()
            .filter(|a| !a.is_cancelled())
            .map(|a| (a.id.value(), a.start_time, a.end_time))
            .collect();
        let batch: Vec<i64> = appointments.iter().map(|a| a.id.value()).collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                lock_appointments(conn)?;
                let current: Vec<(i64, DateTime<Utc>, DateTime<Utc>)> = appointments::table
                    .filter(appointments::appointment_id.eq_any(&batch))
                    .select((
                        appointments::appointment_id,
                        appointments::start_time,
                        appointments::end_time,
                    ))
                    .load(conn)?;
                for (id, start, end) in &live {
                    let moved = current
                        .iter()
                        .any(|(cid, cstart, cend)| cid == id && (cstart != start || cend != end));
                    if moved {
                        check_overlap(conn, *start, *end, &batch)?;
                    }
                }

                let mut stored = Vec::with_capacity(changes.len());
                for (id, changeset) in &changes {
                    let row = diesel::update(appointments::table.find(*id))
                        .set(changeset)
                        .returning(AppointmentRow::as_returning())
                        .get_result(conn)
                        .optional()?
                        .ok_or_else(|| not_found("appointment", *id))?;
                    stored.push(row.into_appointment()?);
                }
                Ok(stored)
            })
        })
        .await
    }

    async fn delete_appointments(&self, ids: &[AppointmentId]) -> RepositoryResult<usize> {
        let ids: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                diesel::delete(
                    scheduled_emails::table
                        .filter(scheduled_emails::status.eq(EmailStatus::Pending.as_str()))
                        .filter(scheduled_emails::appointment_id.eq_any(&ids)),
                )
                .execute(conn)?;
                diesel::update(invoices::table.filter(invoices::appointment_id.eq_any(&ids)))
                    .set(invoices::appointment_id.eq(None::<i64>))
                    .execute(conn)?;
                let removed = diesel::delete(
                    appointments::table.filter(appointments::appointment_id.eq_any(&ids)),
                )
                .execute(conn)?;
                Ok(removed)
            })
        })
        .await
    }
}

#[async_trait]
impl BillingRepository for PostgresRepository {
    async fn create_invoices(&self, invoices: &[NewInvoice]) -> RepositoryResult<Vec<Invoice>> {
        let rows: Vec<NewInvoiceRow> = invoices.iter().map(Into::into).collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                let stored: Vec<InvoiceRow> = diesel::insert_into(invoices::table)
                    .values(&rows)
                    .returning(InvoiceRow::as_returning())
                    .get_results(conn)?;
                collect_rows(stored, InvoiceRow::into_invoice)
            })
        })
        .await
    }

    async fn get_invoice(&self, id: InvoiceId) -> RepositoryResult<Invoice> {
        self.with_conn(move |conn| {
            invoices::table
                .find(id.value())
                .select(InvoiceRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("invoice", id.value()))?
                .into_invoice()
        })
        .await
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> RepositoryResult<Vec<Invoice>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut query = invoices::table.select(InvoiceRow::as_select()).into_boxed();
            if let Some(status) = filter.status {
                query = query.filter(invoices::status.eq(status.as_str()));
            }
            if let Some(client_id) = filter.client_id {
                query = query.filter(invoices::client_id.eq(client_id.value()));
            }
            if let Some(appointment_id) = filter.appointment_id {
                query = query.filter(invoices::appointment_id.eq(appointment_id.value()));
            }
            let rows = query
                .order((invoices::issued_at.desc(), invoices::invoice_id.desc()))
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, InvoiceRow::into_invoice)
        })
        .await
    }

    async fn last_invoice_sequence(&self, prefix: &str) -> RepositoryResult<i64> {
        let prefix = prefix.to_string();
        let pattern = format!("{}%", prefix);
        self.with_conn(move |conn| {
            let numbers: Vec<String> = invoices::table
                .filter(invoices::invoice_number.like(&pattern))
                .select(invoices::invoice_number)
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(numbers
                .iter()
                .filter_map(|n| sequence_after(n, &prefix))
                .max()
                .unwrap_or(0))
        })
        .await
    }

    async fn save_invoices(&self, invoices: &[Invoice]) -> RepositoryResult<Vec<Invoice>> {
        let changes: Vec<(i64, InvoiceChangeset)> = invoices
            .iter()
            .map(|i| (i.id.value(), InvoiceChangeset::from(i)))
            .collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                let mut stored = Vec::with_capacity(changes.len());
                for (id, changeset) in &changes {
                    let row = diesel::update(invoices::table.find(*id))
                        .set(changeset)
                        .returning(InvoiceRow::as_returning())
                        .get_result(conn)
                        .optional()?
                        .ok_or_else(|| not_found("invoice", *id))?;
                    stored.push(row.into_invoice()?);
                }
                Ok(stored)
            })
        })
        .await
    }

    async fn delete_invoices(&self, ids: &[InvoiceId]) -> RepositoryResult<usize> {
        let ids: Vec<i64> = ids.iter().map(|id| id.value()).collect();
        self.with_conn(move |conn| {
            diesel::delete(invoices::table.filter(invoices::invoice_id.eq_any(&ids)))
                .execute(conn)
                .map_err(map_diesel_error)
        })
        .await
    }
}

#[async_trait]
impl NoteRepository for PostgresRepository {
    async fn create_note(&self, note: &NewNote) -> RepositoryResult<Note> {
        let row = NewNoteRow {
            client_id: note.client_id.value(),
            appointment_id: note.appointment_id.map(|a| a.value()),
            title: note.title.clone(),
            content: note.content.clone(),
        };
        self.with_conn(move |conn| {
            let exists: i64 = clients::table
                .find(row.client_id)
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            if exists == 0 {
                return Err(not_found("client", row.client_id));
            }
            diesel::insert_into(notes::table)
                .values(&row)
                .returning(NoteRow::as_returning())
                .get_result(conn)
                .map(Note::from)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn get_note(&self, id: NoteId) -> RepositoryResult<Note> {
        self.with_conn(move |conn| {
            notes::table
                .find(id.value())
                .select(NoteRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(Note::from)
                .ok_or_else(|| not_found("note", id.value()))
        })
        .await
    }

    async fn list_notes(&self, client_id: ClientId) -> RepositoryResult<Vec<Note>> {
        self.with_conn(move |conn| {
            notes::table
                .filter(notes::client_id.eq(client_id.value()))
                .select(NoteRow::as_select())
                .order((notes::created_at.desc(), notes::note_id.desc()))
                .load(conn)
                .map(|rows| rows.into_iter().map(Note::from).collect())
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn update_note(&self, id: NoteId, changes: &NoteChanges) -> RepositoryResult<Note> {
        let changeset = NoteChangeset {
            title: changes.title.clone(),
            content: changes.content.clone(),
            appointment_id: changes.appointment_id.map(|a| Some(a.value())),
            updated_at: Some(Utc::now()),
        };
        self.with_conn(move |conn| {
            diesel::update(notes::table.find(id.value()))
                .set(&changeset)
                .returning(NoteRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(Note::from)
                .ok_or_else(|| not_found("note", id.value()))
        })
        .await
    }

    async fn delete_note(&self, id: NoteId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let removed = diesel::delete(notes::table.find(id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if removed == 0 {
                return Err(not_found("note", id.value()));
            }
            Ok(())
        })
        .await
    }
}

fn exception_values(
    kind: ExceptionKind,
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: Option<chrono::NaiveTime>,
    end_time: Option<chrono::NaiveTime>,
    reason: Option<String>,
) -> ExceptionValues {
    ExceptionValues {
        kind: kind.as_str().to_string(),
        start_date,
        end_date,
        start_time,
        end_time,
        reason,
    }
}

#[async_trait]
impl AvailabilityRepository for PostgresRepository {
    async fn get_working_hours(&self) -> RepositoryResult<Vec<WorkingHours>> {
        self.with_conn(|conn| {
            let rows: Vec<WorkingHoursRow> = working_hours::table
                .select(WorkingHoursRow::as_select())
                .order(working_hours::weekday.asc())
                .load(conn)
                .map_err(map_diesel_error)?;
            if rows.is_empty() {
                return Ok(default_working_hours());
            }
            Ok(rows.into_iter().map(WorkingHours::from).collect())
        })
        .await
    }

    async fn replace_working_hours(
        &self,
        hours: &[WorkingHours],
    ) -> RepositoryResult<Vec<WorkingHours>> {
        let rows: Vec<WorkingHoursRow> = hours.iter().map(Into::into).collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|conn| {
                diesel::delete(working_hours::table).execute(conn)?;
                diesel::insert_into(working_hours::table)
                    .values(&rows)
                    .execute(conn)?;
                let stored: Vec<WorkingHoursRow> = working_hours::table
                    .select(WorkingHoursRow::as_select())
                    .order(working_hours::weekday.asc())
                    .load(conn)?;
                Ok(stored.into_iter().map(WorkingHours::from).collect())
            })
        })
        .await
    }

    async fn create_exception(
        &self,
        exception: &NewAvailabilityException,
    ) -> RepositoryResult<AvailabilityException> {
        let values = exception_values(
            exception.kind,
            exception.start_date,
            exception.effective_end_date(),
            exception.start_time,
            exception.end_time,
            exception.reason.clone(),
        );
        self.with_conn(move |conn| {
            diesel::insert_into(availability_exceptions::table)
                .values(&values)
                .returning(ExceptionRow::as_returning())
                .get_result(conn)
                .map_err(map_diesel_error)?
                .into_exception()
        })
        .await
    }

    async fn get_exception(&self, id: ExceptionId) -> RepositoryResult<AvailabilityException> {
        self.with_conn(move |conn| {
            availability_exceptions::table
                .find(id.value())
                .select(ExceptionRow::as_select())
                .first(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("exception", id.value()))?
                .into_exception()
        })
        .await
    }

    async fn list_exceptions(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> RepositoryResult<Vec<AvailabilityException>> {
        self.with_conn(move |conn| {
            let mut query = availability_exceptions::table
                .select(ExceptionRow::as_select())
                .into_boxed();
            if let Some(from) = from {
                query = query.filter(availability_exceptions::end_date.ge(from));
            }
            if let Some(to) = to {
                query = query.filter(availability_exceptions::start_date.le(to));
            }
            let rows = query
                .order((
                    availability_exceptions::start_date.asc(),
                    availability_exceptions::exception_id.asc(),
                ))
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, ExceptionRow::into_exception)
        })
        .await
    }

    async fn save_exception(
        &self,
        exception: &AvailabilityException,
    ) -> RepositoryResult<AvailabilityException> {
        let id = exception.id.value();
        let values = exception_values(
            exception.kind,
            exception.start_date,
            exception.end_date,
            exception.start_time,
            exception.end_time,
            exception.reason.clone(),
        );
        self.with_conn(move |conn| {
            diesel::update(availability_exceptions::table.find(id))
                .set(&values)
                .returning(ExceptionRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("exception", id))?
                .into_exception()
        })
        .await
    }

    async fn delete_exception(&self, id: ExceptionId) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            let removed = diesel::delete(availability_exceptions::table.find(id.value()))
                .execute(conn)
                .map_err(map_diesel_error)?;
            if removed == 0 {
                return Err(not_found("exception", id.value()));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl NotificationRepository for PostgresRepository {
    async fn enqueue_emails(
        &self,
        emails: &[NewScheduledEmail],
    ) -> RepositoryResult<Vec<ScheduledEmail>> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<NewEmailRow> = emails.iter().map(Into::into).collect();
        self.with_conn(move |conn| {
            let stored: Vec<EmailRow> = diesel::insert_into(scheduled_emails::table)
                .values(&rows)
                .returning(EmailRow::as_returning())
                .get_results(conn)
                .map_err(map_diesel_error)?;
            collect_rows(stored, EmailRow::into_email)
        })
        .await
    }

    async fn list_emails(&self, filter: &EmailFilter) -> RepositoryResult<Vec<ScheduledEmail>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut query = scheduled_emails::table
                .select(EmailRow::as_select())
                .into_boxed();
            if let Some(status) = filter.status {
                query = query.filter(scheduled_emails::status.eq(status.as_str()));
            }
            if let Some(kind) = filter.kind {
                query = query.filter(scheduled_emails::kind.eq(kind.as_str()));
            }
            if let Some(appointment_id) = filter.appointment_id {
                query = query.filter(scheduled_emails::appointment_id.eq(appointment_id.value()));
            }
            let rows = query
                .order((scheduled_emails::send_at.asc(), scheduled_emails::email_id.asc()))
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, EmailRow::into_email)
        })
        .await
    }

    async fn due_emails(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> RepositoryResult<Vec<ScheduledEmail>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let rows = scheduled_emails::table
                .filter(scheduled_emails::status.eq(EmailStatus::Pending.as_str()))
                .filter(scheduled_emails::send_at.le(now))
                .select(EmailRow::as_select())
                .order((scheduled_emails::send_at.asc(), scheduled_emails::email_id.asc()))
                .limit(limit)
                .load(conn)
                .map_err(map_diesel_error)?;
            collect_rows(rows, EmailRow::into_email)
        })
        .await
    }

    async fn mark_email(
        &self,
        id: EmailId,
        status: EmailStatus,
        sent_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> RepositoryResult<ScheduledEmail> {
        self.with_conn(move |conn| {
            diesel::update(scheduled_emails::table.find(id.value()))
                .set((
                    scheduled_emails::status.eq(status.as_str()),
                    scheduled_emails::sent_at.eq(sent_at),
                    scheduled_emails::last_error.eq(last_error.clone()),
                ))
                .returning(EmailRow::as_returning())
                .get_result(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| not_found("email", id.value()))?
                .into_email()
        })
        .await
    }

    async fn cancel_pending_emails(
        &self,
        appointment_ids: &[AppointmentId],
        kinds: Option<&[EmailKind]>,
    ) -> RepositoryResult<usize> {
        let ids: Vec<i64> = appointment_ids.iter().map(|id| id.value()).collect();
        let kinds: Option<Vec<String>> =
            kinds.map(|k| k.iter().map(|kind| kind.as_str().to_string()).collect());
        self.with_conn(move |conn| {
            let pending = scheduled_emails::table
                .filter(scheduled_emails::status.eq(EmailStatus::Pending.as_str()))
                .filter(scheduled_emails::appointment_id.eq_any(&ids));
            let cancelled = scheduled_emails::status.eq(EmailStatus::Cancelled.as_str());
            let updated = match kinds {
                Some(ref kinds) => {
                    diesel::update(pending.filter(scheduled_emails::kind.eq_any(kinds)))
                        .set(cancelled)
                        .execute(conn)
                }
                None => diesel::update(pending).set(cancelled).execute(conn),
            };
            updated.map_err(map_diesel_error)
        })
        .await
    }
}
