//! Domain records for the practice.
//!
//! Every record mirrors a relational row. Times are stored in UTC, money in
//! integer cents, and enumerated fields as snake_case text.

pub mod macros;

pub mod appointment;
pub mod availability;
pub mod billing;
pub mod client;
pub mod note;
pub mod notification;

pub use appointment::*;
pub use availability::*;
pub use billing::*;
pub use client::*;
pub use note::*;
pub use notification::*;
