//! Constants used throughout the care coordination core.

/// Default directory for the store snapshot when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "care_data";

/// Filename of the JSON snapshot written by the reference store.
pub const STORE_SNAPSHOT_FILENAME: &str = "store.json";

/// Snapshot format version written into every snapshot.
pub const STORE_SNAPSHOT_VERSION: u32 = 1;

/// Page size used when a caller does not supply one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Upper bound on caller-supplied page sizes.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Appointment time slots sit on a grid of this many minutes.
pub const DEFAULT_SLOT_GRANULARITY_MINUTES: u32 = 15;

/// How long the reference store waits for a collection lock before reporting unavailability.
pub const DEFAULT_STORE_LOCK_TIMEOUT_MS: u64 = 2_000;

/// Number of stripes in the booking lock table.
pub const SLOT_LOCK_STRIPES: usize = 64;

/// Audit note written when a task is created.
pub const TASK_CREATED_NOTE: &str = "Task created";

/// Audit note written when a task update supplies no note of its own.
pub const TASK_UPDATED_NOTE: &str = "Task updated";

/// Audit note written when a task is deleted.
pub const TASK_DELETED_NOTE: &str = "Task deleted";

/// Cancellation reason recorded when a patient cancels without giving one.
pub const PATIENT_CANCELLATION_REASON: &str = "Cancelled by patient";

/// Cancellation reason recorded when a doctor rejects without giving one.
pub const DOCTOR_REJECTION_REASON: &str = "Rejected by doctor";
