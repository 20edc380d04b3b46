//! Prescriptions and medical records.
//!
//! These are leaf documents: coordination logic reads them for context but only the
//! documents service writes them.

use super::{wire_name_traits, WireName};
use crate::store::{FieldValue, Record};
use care_types::NonEmptyText;
use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrescriptionStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl WireName for PrescriptionStatus {
    const LABEL: &'static str = "prescription status";
    const ALL: &'static [Self] = &[
        PrescriptionStatus::Active,
        PrescriptionStatus::Completed,
        PrescriptionStatus::Cancelled,
        PrescriptionStatus::Expired,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Active => "active",
            PrescriptionStatus::Completed => "completed",
            PrescriptionStatus::Cancelled => "cancelled",
            PrescriptionStatus::Expired => "expired",
        }
    }
}

wire_name_traits!(PrescriptionStatus);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: NonEmptyText,
    pub dosage: NonEmptyText,
    pub frequency: NonEmptyText,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub medication: Medication,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub status: PrescriptionStatus,
    #[serde(default)]
    pub refills_remaining: u32,
    pub created_at: DateTime<Utc>,
}

impl Record for Prescription {
    const COLLECTION: &'static str = "prescriptions";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "patient_id" => Some(self.patient_id.into()),
            "doctor_id" => Some(self.doctor_id.into()),
            "status" => Some(self.status.field_value()),
            "start_date" => Some(self.start_date.into()),
            "created_at" => Some(self.created_at.into()),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicalRecordStatus {
    Draft,
    Completed,
    Reviewed,
}

impl WireName for MedicalRecordStatus {
    const LABEL: &'static str = "medical record status";
    const ALL: &'static [Self] = &[
        MedicalRecordStatus::Draft,
        MedicalRecordStatus::Completed,
        MedicalRecordStatus::Reviewed,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            MedicalRecordStatus::Draft => "draft",
            MedicalRecordStatus::Completed => "completed",
            MedicalRecordStatus::Reviewed => "reviewed",
        }
    }
}

wire_name_traits!(MedicalRecordStatus);

impl MedicalRecordStatus {
    /// Records move `draft -> completed -> reviewed` and never back.
    pub fn can_transition_to(&self, next: MedicalRecordStatus) -> bool {
        use MedicalRecordStatus::*;
        *self == next || matches!((*self, next), (Draft, Completed) | (Completed, Reviewed))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub visit_date: DateTime<Utc>,
    #[serde(default)]
    pub diagnosis: Diagnosis,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub vitals_id: Option<RecordId>,
    #[serde(default)]
    pub prescription_ids: Vec<RecordId>,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    pub status: MedicalRecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for MedicalRecord {
    const COLLECTION: &'static str = "medical_records";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "patient_id" => Some(self.patient_id.into()),
            "doctor_id" => Some(self.doctor_id.into()),
            "visit_date" => Some(self.visit_date.into()),
            "status" => Some(self.status.field_value()),
            _ => None,
        }
    }
}
