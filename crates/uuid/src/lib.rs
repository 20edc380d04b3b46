//! Canonical record identifiers.
//!
//! Every record in the care coordination store is keyed by an opaque, globally unique
//! identifier. To keep identifiers comparable and safe to embed in logs, file names and
//! CLI arguments, the workspace uses a *canonical* UUID representation: **32 lowercase
//! hexadecimal characters** (no hyphens).
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`RecordId::parse`]; callers outside the core must normalise before passing ids in.
//!
//! `RecordId` orders by its canonical string, which gives listings a deterministic
//! tie-break when their primary sort key is equal.

mod record_id;

pub use record_id::{RecordId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
