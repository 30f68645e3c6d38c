//! # Practice Backend
//!
//! Backend for a solo therapy practice: public booking, the practitioner's
//! calendar with recurring series, availability rules, client records and
//! notes, invoicing, video-meeting links and email notifications.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`api`]: identifiers and the types shared with HTTP clients
//! - [`models`]: domain records
//! - [`scheduler`]: pure calendar rules (recurrence, availability, slots,
//!   meeting access window)
//! - [`db`]: repository traits and the in-memory / Postgres backends
//! - [`services`]: business operations over a [`services::Practice`]
//! - [`config`]: `practice.toml` and environment configuration
//! - [`http`]: Axum-based HTTP server and request handlers
//!

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;

pub mod db;
pub mod models;

pub mod scheduler;

pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
