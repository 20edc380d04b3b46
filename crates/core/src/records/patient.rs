use crate::store::{FieldValue, Record};
use care_types::NonEmptyText;
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Clinical profile of a patient-role person.
///
/// `medical_history` and `vitals` are the embedded arrays written by older deployments. They
/// are append-only and read alongside the standalone [`super::Vital`] collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: RecordId,
    pub person_id: RecordId,
    pub patient_code: NonEmptyText,
    #[serde(default)]
    pub assigned_doctor_id: Option<RecordId>,
    #[serde(default)]
    pub assigned_nurse_ids: BTreeSet<RecordId>,
    #[serde(default)]
    pub medical_history: Vec<LegacyDiagnosis>,
    #[serde(default)]
    pub vitals: Vec<LegacyVital>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyDiagnosis {
    pub date: DateTime<Utc>,
    pub diagnosis: String,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub prescription: Option<String>,
    pub doctor_id: RecordId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Vital sign entry embedded in a legacy patient document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyVital {
    pub id: RecordId,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub blood_pressure: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub nurse_id: Option<RecordId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Patient {
    pub fn new(person_id: RecordId, patient_code: NonEmptyText) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            person_id,
            patient_code,
            assigned_doctor_id: None,
            assigned_nurse_ids: BTreeSet::new(),
            medical_history: Vec::new(),
            vitals: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Patient {
    const COLLECTION: &'static str = "patients";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "person_id" => Some(self.person_id.into()),
            "patient_code" => Some(self.patient_code.as_str().into()),
            "assigned_doctor_id" => Some(self.assigned_doctor_id.into()),
            "assigned_nurse_ids" => Some(FieldValue::List(
                self.assigned_nurse_ids.iter().map(FieldValue::from).collect(),
            )),
            "created_at" => Some(self.created_at.into()),
            _ => None,
        }
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![
            ("person_id", self.person_id.to_string()),
            ("patient_code", self.patient_code.as_str().to_string()),
        ]
    }
}
