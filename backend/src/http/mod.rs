//! HTTP server module for the practice backend.
//!
//! This module provides an axum-based HTTP server that exposes the service
//! layer as a REST API with two route trees: `/v1/public` for the booking
//! site and `/v1/admin` for the dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  HTTP Layer (axum handlers)                              │
//! │  - Request parsing and validation                        │
//! │  - Admin bearer-token guard                              │
//! │  - CORS, compression, error handling                     │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Service Layer (crate::services)                         │
//! │  - Booking, calendar, invoicing, meetings, email         │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Repository Layer (crate::db)                            │
//! │  - LocalRepository / PostgresRepository                  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
