//! Record types held in the entity store.
//!
//! Each type implements [`crate::store::Record`], naming its collection, exposing the fields
//! the services query on, and declaring its uniqueness constraints. Enumerations serialise
//! to the lowercase wire names used throughout the system (`in_progress`, `follow-up`, ...)
//! and parse from the same names via `FromStr`.

pub mod appointment;
pub mod documents;
pub mod patient;
pub mod person;
pub mod task;
pub mod vital;

pub use appointment::{Appointment, AppointmentStatus, AppointmentType, TimeSlot};
pub use documents::{
    Diagnosis, MedicalRecord, MedicalRecordStatus, Medication, Prescription, PrescriptionStatus,
};
pub use patient::{LegacyDiagnosis, LegacyVital, Patient};
pub use person::{Person, Role};
pub use task::{Task, TaskPriority, TaskStatus, TaskStatusEvent, TaskType};
pub use vital::{BloodPressure, Measurements, Vital};

use crate::store::FieldValue;
use crate::{CareError, CareResult};

/// Renders a closed enumeration as its wire name and parses it back.
pub trait WireName: Sized + Copy + 'static {
    /// Entity label used in error messages, e.g. `"appointment type"`.
    const LABEL: &'static str;
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse_wire(input: &str) -> CareResult<Self> {
        let needle = input.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                CareError::invalid(format!(
                    "unknown {} '{}' (expected one of: {})",
                    Self::LABEL,
                    input,
                    allowed.join(", ")
                ))
            })
    }

    fn field_value(&self) -> FieldValue {
        FieldValue::Text(self.as_str().to_string())
    }
}

/// Implements `Display` and `FromStr` for a [`WireName`] enum.
macro_rules! wire_name_traits {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::records::WireName::as_str(self))
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::CareError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as $crate::records::WireName>::parse_wire(s)
            }
        }
    };
}

pub(crate) use wire_name_traits;
