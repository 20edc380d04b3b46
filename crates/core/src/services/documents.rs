//! Prescriptions and medical records.

use crate::pagination::{Page, PageRequest};
use crate::records::{
    Diagnosis, LegacyDiagnosis, MedicalRecord, MedicalRecordStatus, Medication, Patient,
    Prescription, PrescriptionStatus,
};
use crate::store::{EntityStore, Filter, Query, Sort};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct NewPrescription {
    pub medication: Medication,
    /// Defaults to today.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub refills: u32,
}

/// Which prescriptions to list. Defaults to active ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrescriptionFilter {
    #[default]
    Active,
    Status(PrescriptionStatus),
    All,
}

#[derive(Clone, Debug, Default)]
pub struct NewMedicalRecord {
    pub visit_date: Option<DateTime<Utc>>,
    pub diagnosis: Diagnosis,
    pub symptoms: Vec<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub vitals_id: Option<RecordId>,
    pub prescription_ids: Vec<RecordId>,
    pub follow_up_date: Option<NaiveDate>,
    pub status: Option<MedicalRecordStatus>,
}

/// Partial medical record update. Absent fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct MedicalRecordChanges {
    pub diagnosis: Option<Diagnosis>,
    pub symptoms: Option<Vec<String>>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub status: Option<MedicalRecordStatus>,
}

pub struct DocumentService<S> {
    store: Arc<S>,
}

impl<S> Clone for DocumentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> DocumentService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Issues an active prescription.
    ///
    /// # Errors
    ///
    /// - [`CareError::InvalidInput`] if the end date precedes the start date.
    /// - [`CareError::NotFound`] if the patient does not exist.
    pub fn prescribe(
        &self,
        doctor_id: &RecordId,
        patient_id: &RecordId,
        new: NewPrescription,
    ) -> CareResult<Prescription> {
        let now = Utc::now();
        let start_date = new.start_date.unwrap_or_else(|| now.date_naive());
        if let Some(end) = new.end_date {
            if end < start_date {
                return Err(CareError::invalid(format!(
                    "prescription ends ({end}) before it starts ({start_date})"
                )));
            }
        }
        self.require_patient(patient_id)?;

        let prescription = self.store.create(Prescription {
            id: RecordId::new(),
            patient_id: *patient_id,
            doctor_id: *doctor_id,
            medication: new.medication,
            start_date,
            end_date: new.end_date,
            status: PrescriptionStatus::Active,
            refills_remaining: new.refills,
            created_at: now,
        })?;
        tracing::info!(
            "prescribed {} to patient {}",
            prescription.medication.name,
            prescription.patient_id
        );
        Ok(prescription)
    }

    /// A patient's prescriptions, newest first.
    pub fn list_prescriptions(
        &self,
        patient_id: &RecordId,
        filter: PrescriptionFilter,
    ) -> CareResult<Vec<Prescription>> {
        let mut query = Query::new().filter(Filter::eq("patient_id", patient_id));
        let status = match filter {
            PrescriptionFilter::Active => Some(PrescriptionStatus::Active),
            PrescriptionFilter::Status(status) => Some(status),
            PrescriptionFilter::All => None,
        };
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status.to_string()));
        }
        self.store.find(
            &query
                .sort_by(Sort::desc("created_at"))
                .sort_by(Sort::asc("id")),
        )
    }

    /// One prescription, only if it belongs to `patient_id`.
    pub fn prescription_details(
        &self,
        prescription_id: &RecordId,
        patient_id: &RecordId,
    ) -> CareResult<Prescription> {
        self.store
            .find_one(&Query::by_id(prescription_id).filter(Filter::eq("patient_id", patient_id)))?
            .ok_or_else(|| CareError::not_found("prescription"))
    }

    /// Opens a medical record for a visit. Status defaults to `draft`.
    pub fn create_record(
        &self,
        doctor_id: &RecordId,
        patient_id: &RecordId,
        new: NewMedicalRecord,
    ) -> CareResult<MedicalRecord> {
        self.require_patient(patient_id)?;
        for id in &new.prescription_ids {
            self.prescription_details(id, patient_id)?;
        }

        let now = Utc::now();
        let record = self.store.create(MedicalRecord {
            id: RecordId::new(),
            patient_id: *patient_id,
            doctor_id: *doctor_id,
            visit_date: new.visit_date.unwrap_or(now),
            diagnosis: new.diagnosis,
            symptoms: new.symptoms,
            treatment: new.treatment,
            notes: new.notes,
            vitals_id: new.vitals_id,
            prescription_ids: new.prescription_ids,
            follow_up_date: new.follow_up_date,
            status: new.status.unwrap_or(MedicalRecordStatus::Draft),
            created_at: now,
            updated_at: now,
        })?;
        tracing::info!(
            "opened medical record {} for patient {}",
            record.id,
            record.patient_id
        );
        Ok(record)
    }

    /// Amends a record written by `doctor_id`.
    ///
    /// # Errors
    ///
    /// - [`CareError::NotFound`] if the record does not exist or was written by another doctor.
    /// - [`CareError::InvalidTransition`] if the status would move backwards.
    pub fn update_record(
        &self,
        record_id: &RecordId,
        doctor_id: &RecordId,
        changes: MedicalRecordChanges,
    ) -> CareResult<MedicalRecord> {
        self.amend(
            &Query::by_id(record_id).filter(Filter::eq("doctor_id", doctor_id)),
            changes,
        )
    }

    /// Amends a record belonging to `patient_id`, whoever wrote it.
    ///
    /// Used when a nurse assists with a doctor's record; the caller is expected to have
    /// checked the nurse's connection to the patient.
    ///
    /// # Errors
    ///
    /// - [`CareError::NotFound`] if the record does not exist or belongs to another patient.
    /// - [`CareError::InvalidTransition`] if the status would move backwards.
    pub fn update_record_for_patient(
        &self,
        record_id: &RecordId,
        patient_id: &RecordId,
        changes: MedicalRecordChanges,
    ) -> CareResult<MedicalRecord> {
        self.amend(
            &Query::by_id(record_id).filter(Filter::eq("patient_id", patient_id)),
            changes,
        )
    }

    fn amend(&self, query: &Query, changes: MedicalRecordChanges) -> CareResult<MedicalRecord> {
        self.store
            .update_one::<MedicalRecord, _>(query, |record| {
                if let Some(next) = changes.status {
                    if !record.status.can_transition_to(next) {
                        return Err(CareError::InvalidTransition {
                            entity: "medical record",
                            from: record.status.to_string(),
                            to: next.to_string(),
                        });
                    }
                    record.status = next;
                }
                if let Some(diagnosis) = changes.diagnosis {
                    record.diagnosis = diagnosis;
                }
                if let Some(symptoms) = changes.symptoms {
                    record.symptoms = symptoms;
                }
                if changes.treatment.is_some() {
                    record.treatment = changes.treatment;
                }
                if changes.notes.is_some() {
                    record.notes = changes.notes;
                }
                if changes.follow_up_date.is_some() {
                    record.follow_up_date = changes.follow_up_date;
                }
                record.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("medical record"))
    }

    /// A patient's records with a visit date in `[from, to]`, most recent visit first.
    pub fn list_records(
        &self,
        patient_id: &RecordId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> CareResult<Page<MedicalRecord>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(CareError::invalid("visit date range starts after it ends"));
            }
        }

        let query = Query::new()
            .filter(Filter::eq("patient_id", patient_id))
            .filter(Filter::within(
                "visit_date",
                from.map(Into::into),
                to.map(Into::into),
            ));
        let total = self.store.count::<MedicalRecord>(&query)?;
        let items = self.store.find(
            &query
                .sort_by(Sort::desc("visit_date"))
                .sort_by(Sort::asc("id"))
                .skip(page.offset())
                .limit(page.limit() as usize),
        )?;
        Ok(Page::new(items, page, total))
    }

    /// One record, only if it belongs to `patient_id`.
    pub fn record_details(
        &self,
        record_id: &RecordId,
        patient_id: &RecordId,
    ) -> CareResult<MedicalRecord> {
        self.store
            .find_one(&Query::by_id(record_id).filter(Filter::eq("patient_id", patient_id)))?
            .ok_or_else(|| CareError::not_found("medical record"))
    }

    /// Diagnoses embedded in the patient document by older deployments, most recent first.
    ///
    /// These predate [`MedicalRecord`] and are never written by this crate.
    pub fn legacy_diagnoses(&self, patient_id: &RecordId) -> CareResult<Vec<LegacyDiagnosis>> {
        let patient: Patient = self
            .store
            .get(patient_id)?
            .ok_or_else(|| CareError::not_found("patient"))?;
        let mut history = patient.medical_history;
        history.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(history)
    }

    pub fn record(&self, record_id: &RecordId) -> CareResult<MedicalRecord> {
        self.store
            .get(record_id)?
            .ok_or_else(|| CareError::not_found("medical record"))
    }

    fn require_patient(&self, patient_id: &RecordId) -> CareResult<()> {
        match self.store.get::<Patient>(patient_id)? {
            Some(_) => Ok(()),
            None => Err(CareError::not_found("patient")),
        }
    }
}
