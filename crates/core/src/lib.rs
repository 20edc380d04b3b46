//! # Care Core
//!
//! Core logic for the clinical care coordination system.
//!
//! This crate holds the domain records, the services that act on them, and the store they
//! are persisted in:
//! - People, patients and the care relationships between them
//! - Appointment booking with slot-conflict detection and a status lifecycle
//! - Nurse tasks with an append-only status history
//! - Vital signs, prescriptions and medical records
//!
//! **No transport concerns**: authentication and request handling belong in the caller.
//! Every entry point on [`CareCoordinator`] takes an already-resolved [`IdentityContext`].

pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod pagination;
pub mod records;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::CoreConfig;
pub use coordinator::CareCoordinator;
pub use error::{CareError, CareResult, ErrorKind};
pub use identity::IdentityContext;
pub use pagination::{Page, PageRequest};
