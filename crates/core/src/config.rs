//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services as `Arc<CoreConfig>`. Environment variables are read by the
//! binaries only; the `*_from_env_value` helpers here take the raw value so that request
//! handling never touches process-wide state.

use crate::constants::{
    DEFAULT_PAGE_LIMIT, DEFAULT_SLOT_GRANULARITY_MINUTES, DEFAULT_STORE_LOCK_TIMEOUT_MS,
    MAX_PAGE_LIMIT, STORE_SNAPSHOT_FILENAME,
};
use crate::{CareError, CareResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    default_page_limit: u32,
    max_page_limit: u32,
    slot_granularity_minutes: u32,
    store_lock_timeout: Duration,
    enforce_task_relationship: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::InvalidInput`] if:
    /// - either page limit is zero, or the default exceeds the maximum,
    /// - the slot granularity is zero or does not divide an hour evenly,
    /// - the store lock timeout is zero.
    pub fn new(
        data_dir: PathBuf,
        default_page_limit: u32,
        max_page_limit: u32,
        slot_granularity_minutes: u32,
        store_lock_timeout: Duration,
        enforce_task_relationship: bool,
    ) -> CareResult<Self> {
        if default_page_limit == 0 || max_page_limit == 0 {
            return Err(CareError::invalid("page limits must be at least 1"));
        }
        if default_page_limit > max_page_limit {
            return Err(CareError::invalid(format!(
                "default page limit {default_page_limit} exceeds maximum {max_page_limit}"
            )));
        }
        if slot_granularity_minutes == 0 || 60 % slot_granularity_minutes != 0 {
            return Err(CareError::invalid(
                "slot granularity must be a non-zero divisor of 60 minutes",
            ));
        }
        if store_lock_timeout.is_zero() {
            return Err(CareError::invalid("store lock timeout cannot be zero"));
        }

        Ok(Self {
            data_dir,
            default_page_limit,
            max_page_limit,
            slot_granularity_minutes,
            store_lock_timeout,
            enforce_task_relationship,
        })
    }

    /// Configuration with every tunable at its default.
    pub fn with_defaults(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
            store_lock_timeout: Duration::from_millis(DEFAULT_STORE_LOCK_TIMEOUT_MS),
            enforce_task_relationship: true,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(STORE_SNAPSHOT_FILENAME)
    }

    pub fn default_page_limit(&self) -> u32 {
        self.default_page_limit
    }

    pub fn max_page_limit(&self) -> u32 {
        self.max_page_limit
    }

    pub fn slot_granularity_minutes(&self) -> u32 {
        self.slot_granularity_minutes
    }

    pub fn store_lock_timeout(&self) -> Duration {
        self.store_lock_timeout
    }

    /// Whether task creation requires the patient to be connected to the nurse.
    pub fn enforce_task_relationship(&self) -> bool {
        self.enforce_task_relationship
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a page limit from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_PAGE_LIMIT`].
pub fn page_limit_from_env_value(value: Option<String>) -> CareResult<u32> {
    match trimmed(value) {
        None => Ok(DEFAULT_PAGE_LIMIT),
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| CareError::invalid(format!("page limit must be a positive integer: {v}"))),
    }
}

/// Parse the slot granularity (minutes) from an optional string value.
pub fn slot_granularity_from_env_value(value: Option<String>) -> CareResult<u32> {
    match trimmed(value) {
        None => Ok(DEFAULT_SLOT_GRANULARITY_MINUTES),
        Some(v) => v.parse::<u32>().map_err(|_| {
            CareError::invalid(format!("slot granularity must be a whole number of minutes: {v}"))
        }),
    }
}

/// Parse the store lock timeout (milliseconds) from an optional string value.
pub fn store_lock_timeout_from_env_value(value: Option<String>) -> CareResult<Duration> {
    match trimmed(value) {
        None => Ok(Duration::from_millis(DEFAULT_STORE_LOCK_TIMEOUT_MS)),
        Some(v) => v
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| CareError::invalid(format!("store timeout must be milliseconds: {v}"))),
    }
}

/// Parse a boolean flag; accepts `true/false`, `1/0`, `yes/no`, `on/off`.
///
/// `None` or empty yields `default`.
pub fn flag_from_env_value(value: Option<String>, default: bool) -> CareResult<bool> {
    match trimmed(value).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(CareError::invalid(format!("expected a boolean flag, got: {v}"))),
        },
    }
}
