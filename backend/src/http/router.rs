//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing,
//! the admin guard), and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::auth::require_admin;
use super::handlers;
use super::state::AppState;

/// Routes used by the public booking site.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/availability", get(handlers::public_slots))
        .route("/availability/month", get(handlers::public_month))
        .route("/bookings", post(handlers::public_book))
        .route(
            "/meetings/{appointment_id}/join",
            post(handlers::public_join),
        )
}

/// Routes used by the admin dashboard; every one requires the admin token.
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Clients and notes
        .route(
            "/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route(
            "/clients/{id}",
            get(handlers::get_client)
                .patch(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .route("/clients/{id}/archive", post(handlers::archive_client))
        .route(
            "/clients/{id}/notes",
            get(handlers::list_notes).post(handlers::create_note),
        )
        .route(
            "/notes/{id}",
            get(handlers::get_note)
                .patch(handlers::update_note)
                .delete(handlers::delete_note),
        )
        // Calendar
        .route(
            "/appointments",
            get(handlers::list_appointments).post(handlers::create_appointment),
        )
        .route(
            "/appointments/{id}",
            get(handlers::get_appointment)
                .patch(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/appointments/{id}/series", post(handlers::reschedule_series))
        .route("/appointments/{id}/cancel", post(handlers::cancel_appointment))
        .route(
            "/appointments/{id}/attendance",
            post(handlers::mark_attendance),
        )
        .route("/appointments/{id}/no-show", post(handlers::mark_no_show))
        .route("/appointments/{id}/join", post(handlers::host_join))
        .route("/meetings/verify", post(handlers::verify_meeting_token))
        // Availability
        .route(
            "/working-hours",
            get(handlers::get_working_hours).put(handlers::replace_working_hours),
        )
        .route(
            "/exceptions",
            get(handlers::list_exceptions).post(handlers::create_exception),
        )
        .route(
            "/exceptions/{id}",
            get(handlers::get_exception)
                .put(handlers::update_exception)
                .delete(handlers::delete_exception),
        )
        .route("/availability/day", get(handlers::resolved_day))
        // Invoices
        .route(
            "/invoices",
            get(handlers::list_invoices).post(handlers::create_invoice),
        )
        .route("/invoices/refresh-overdue", post(handlers::refresh_overdue))
        .route(
            "/invoices/{id}",
            get(handlers::get_invoice).patch(handlers::update_invoice),
        )
        .route("/invoices/{id}/pay", post(handlers::pay_invoice))
        .route("/invoices/{id}/cancel", post(handlers::cancel_invoice))
        // Notifications and dashboard
        .route("/emails", get(handlers::list_emails))
        .route("/emails/dispatch", post(handlers::dispatch_emails))
        .route("/dashboard", get(handlers::get_dashboard))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive for development, should be restricted in production
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        .nest("/public", public_routes())
        .nest("/admin", admin_routes(state.clone()));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
