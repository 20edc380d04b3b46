//! Vital sign recording and retrieval.
//!
//! New observations are written to the `vitals` collection. Older patient documents still
//! embed a `vitals` array; readings come from both sources, deduplicated by id, with the
//! standalone record winning when an id appears in both.

use crate::pagination::{Page, PageRequest};
use crate::records::{BloodPressure, LegacyVital, Measurements, Patient, Vital};
use crate::store::{EntityStore, Filter, Query};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalSource {
    Record,
    Legacy,
}

/// A vital sign reading from either source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VitalReading {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub nurse_id: Option<RecordId>,
    pub measurements: Measurements,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub source: VitalSource,
}

impl From<Vital> for VitalReading {
    fn from(vital: Vital) -> Self {
        Self {
            id: vital.id,
            patient_id: vital.patient_id,
            nurse_id: Some(vital.nurse_id),
            measurements: vital.measurements,
            notes: vital.notes,
            recorded_at: vital.recorded_at,
            source: VitalSource::Record,
        }
    }
}

impl VitalReading {
    fn from_legacy(patient_id: RecordId, legacy: &LegacyVital) -> Self {
        Self {
            id: legacy.id,
            patient_id,
            nurse_id: legacy.nurse_id,
            measurements: Measurements {
                blood_pressure: legacy
                    .blood_pressure
                    .as_deref()
                    .and_then(parse_blood_pressure),
                heart_rate: legacy.heart_rate,
                temperature: legacy.temperature,
                ..Default::default()
            },
            notes: legacy.notes.clone(),
            recorded_at: legacy.date,
            source: VitalSource::Legacy,
        }
    }
}

/// Parses the legacy `"systolic/diastolic"` text form.
fn parse_blood_pressure(text: &str) -> Option<BloodPressure> {
    let (systolic, diastolic) = text.split_once('/')?;
    match (systolic.trim().parse(), diastolic.trim().parse()) {
        (Ok(systolic), Ok(diastolic)) => Some(BloodPressure {
            systolic,
            diastolic,
        }),
        _ => {
            tracing::debug!("unreadable legacy blood pressure '{text}'");
            None
        }
    }
}

pub struct VitalsService<S> {
    store: Arc<S>,
}

impl<S> Clone for VitalsService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> VitalsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records a set of observations for a patient.
    ///
    /// # Errors
    ///
    /// - [`CareError::InvalidInput`] if no measurement is given or one is out of range.
    /// - [`CareError::NotFound`] if the patient does not exist.
    pub fn record(
        &self,
        patient_id: &RecordId,
        nurse_id: &RecordId,
        measurements: Measurements,
        notes: Option<String>,
    ) -> CareResult<Vital> {
        check(&measurements)?;
        if self.store.get::<Patient>(patient_id)?.is_none() {
            return Err(CareError::not_found("patient"));
        }

        let vital = self.store.create(Vital {
            id: RecordId::new(),
            patient_id: *patient_id,
            nurse_id: *nurse_id,
            measurements,
            notes,
            recorded_at: Utc::now(),
        })?;
        tracing::info!("recorded vitals {} for patient {}", vital.id, vital.patient_id);
        Ok(vital)
    }

    /// Replaces the measurements (and notes, if given) of an existing reading.
    pub fn update(
        &self,
        vital_id: &RecordId,
        measurements: Measurements,
        notes: Option<String>,
    ) -> CareResult<Vital> {
        check(&measurements)?;
        self.store
            .update_by_id::<Vital, _>(vital_id, |vital| {
                vital.measurements = measurements;
                if notes.is_some() {
                    vital.notes = notes;
                }
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("vital record"))
    }

    pub fn get(&self, vital_id: &RecordId) -> CareResult<Vital> {
        self.store
            .get(vital_id)?
            .ok_or_else(|| CareError::not_found("vital record"))
    }

    /// All readings for a patient, newest first.
    pub fn list_for_patient(
        &self,
        patient_id: &RecordId,
        page: PageRequest,
    ) -> CareResult<Page<VitalReading>> {
        let patient: Patient = self
            .store
            .get(patient_id)?
            .ok_or_else(|| CareError::not_found("patient"))?;

        let records: Vec<Vital> = self
            .store
            .find(&Query::new().filter(Filter::eq("patient_id", patient_id)))?;
        let seen: HashSet<RecordId> = records.iter().map(|v| v.id).collect();

        let mut readings: Vec<VitalReading> =
            records.into_iter().map(VitalReading::from).collect();
        readings.extend(
            patient
                .vitals
                .iter()
                .filter(|legacy| !seen.contains(&legacy.id))
                .map(|legacy| VitalReading::from_legacy(patient.id, legacy)),
        );
        readings.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = readings.len();
        Ok(Page::new(page.window(readings), page, total))
    }
}

fn check(measurements: &Measurements) -> CareResult<()> {
    if measurements.is_empty() {
        return Err(CareError::invalid("at least one measurement is required"));
    }
    measurements.validate()
}
