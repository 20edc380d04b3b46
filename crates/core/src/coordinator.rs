//! Role-scoped entry point.
//!
//! [`CareCoordinator`] is what a transport calls. Every operation takes the caller's
//! [`IdentityContext`], checks the role, resolves the caller's own records, and then
//! delegates to a service. Calls from the wrong role, and calls on patients the caller is not
//! connected to, fail with `NotFound` so that the existence of a record is never revealed.

use crate::config::CoreConfig;
use crate::identity::IdentityContext;
use crate::pagination::{Page, PageRequest};
use crate::records::{
    Appointment, AppointmentStatus, LegacyDiagnosis, MedicalRecord, Measurements, Patient,
    Person, Prescription, Role, Task, TaskStatus, TaskStatusEvent, Vital,
};
use crate::services::{
    AppointmentChanges, BookingRequest, CareTeamMember, ConnectedPatient, DirectoryService,
    DocumentService, MedicalRecordChanges, NewMedicalRecord, NewPrescription, NewTask,
    PrescriptionFilter, Recorded, RelationshipResolver, SchedulingEngine, TaskChanges, TaskEngine,
    VitalReading, VitalsService,
};
use crate::store::EntityStore;
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

const CLINICIANS: &[Role] = &[Role::Doctor, Role::Nurse];

pub struct CareCoordinator<S> {
    cfg: Arc<CoreConfig>,
    directory: DirectoryService<S>,
    resolver: RelationshipResolver<S>,
    scheduling: SchedulingEngine<S>,
    tasks: TaskEngine<S>,
    vitals: VitalsService<S>,
    documents: DocumentService<S>,
}

impl<S: EntityStore> CareCoordinator<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self {
            directory: DirectoryService::new(Arc::clone(&store)),
            resolver: RelationshipResolver::new(Arc::clone(&store)),
            scheduling: SchedulingEngine::new(Arc::clone(&cfg), Arc::clone(&store)),
            tasks: TaskEngine::new(Arc::clone(&store)),
            vitals: VitalsService::new(Arc::clone(&store)),
            documents: DocumentService::new(store),
            cfg,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    fn page(&self, page: Option<u32>, limit: Option<u32>) -> CareResult<PageRequest> {
        PageRequest::new(page, limit, &self.cfg)
    }

    /// The patient profile owned by a patient-role caller.
    fn own_patient(&self, ctx: &IdentityContext) -> CareResult<Patient> {
        ctx.require(&[Role::Patient], "patient")?;
        self.directory.patient_for_person(&ctx.actor_id)
    }

    /// Checks the caller may see `patient_id`'s records.
    ///
    /// Administrators may see everyone, patients only themselves, clinicians only the
    /// patients they are connected to.
    fn authorize_patient(&self, ctx: &IdentityContext, patient_id: &RecordId) -> CareResult<()> {
        let allowed = match ctx.role {
            Role::Admin => true,
            Role::Patient => self
                .directory
                .patient_for_person(&ctx.actor_id)
                .map(|own| own.id == *patient_id)
                .or_else(|err| match err {
                    CareError::NotFound(_) => Ok(false),
                    other => Err(other),
                })?,
            Role::Doctor | Role::Nurse => {
                self.resolver.is_connected(&ctx.actor_id, ctx.role, patient_id)?
            }
        };

        if allowed {
            Ok(())
        } else {
            tracing::debug!(
                "{} {} is not connected to patient {}",
                ctx.role,
                ctx.actor_id,
                patient_id
            );
            Err(CareError::not_found("patient"))
        }
    }

    // Directory ------------------------------------------------------------------------

    pub fn register_person(
        &self,
        ctx: &IdentityContext,
        email: &str,
        role: Role,
        first_name: &str,
        last_name: &str,
    ) -> CareResult<Person> {
        ctx.require(&[Role::Admin], "person")?;
        self.directory
            .register_person(email, role, first_name, last_name)
    }

    pub fn admit_patient(
        &self,
        ctx: &IdentityContext,
        person_id: &RecordId,
        patient_code: &str,
    ) -> CareResult<Patient> {
        ctx.require(&[Role::Admin], "person")?;
        self.directory.admit_patient(person_id, patient_code)
    }

    pub fn assign_doctor(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        doctor_id: &RecordId,
    ) -> CareResult<Patient> {
        ctx.require(&[Role::Admin], "patient")?;
        self.directory.assign_doctor(patient_id, doctor_id)
    }

    pub fn assign_nurse(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        nurse_id: &RecordId,
    ) -> CareResult<Patient> {
        ctx.require(&[Role::Admin], "patient")?;
        self.directory.assign_nurse(patient_id, nurse_id)
    }

    pub fn unassign_nurse(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        nurse_id: &RecordId,
    ) -> CareResult<Patient> {
        ctx.require(&[Role::Admin], "patient")?;
        self.directory.unassign_nurse(patient_id, nurse_id)
    }

    pub fn deactivate_person(
        &self,
        ctx: &IdentityContext,
        person_id: &RecordId,
    ) -> CareResult<Person> {
        ctx.require(&[Role::Admin], "person")?;
        if *person_id == ctx.actor_id {
            return Err(CareError::invalid("administrators cannot deactivate themselves"));
        }
        self.directory.deactivate_person(person_id)
    }

    /// Stamps the caller's last login.
    pub fn record_login(&self, ctx: &IdentityContext, at: DateTime<Utc>) -> CareResult<Person> {
        self.directory.record_login(&ctx.actor_id, at)
    }

    pub fn list_people(
        &self,
        ctx: &IdentityContext,
        role: Option<Role>,
        search: Option<&str>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> CareResult<Page<Person>> {
        ctx.require(&[Role::Admin], "people")?;
        self.directory
            .list_people(role, search, self.page(page, limit)?)
    }

    pub fn my_profile(&self, ctx: &IdentityContext) -> CareResult<Patient> {
        self.own_patient(ctx)
    }

    // Relationships --------------------------------------------------------------------

    pub fn list_connected_patients(
        &self,
        ctx: &IdentityContext,
        search: Option<&str>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> CareResult<Page<ConnectedPatient>> {
        ctx.require(CLINICIANS, "patients")?;
        self.resolver.list_connected_patients(
            &ctx.actor_id,
            ctx.role,
            search,
            self.page(page, limit)?,
        )
    }

    pub fn care_team(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
    ) -> CareResult<Vec<CareTeamMember>> {
        self.authorize_patient(ctx, patient_id)?;
        self.resolver.list_care_team(patient_id)
    }

    // Appointments ---------------------------------------------------------------------

    pub fn book_appointment(
        &self,
        ctx: &IdentityContext,
        request: BookingRequest,
    ) -> CareResult<Appointment> {
        let patient = self.own_patient(ctx)?;
        if let Some(doctor_id) = &request.doctor_id {
            self.directory.require_active(doctor_id, Role::Doctor)?;
        }
        self.scheduling.book(&patient.id, request)
    }

    pub fn update_appointment(
        &self,
        ctx: &IdentityContext,
        appointment_id: &RecordId,
        fields: &Map<String, Value>,
    ) -> CareResult<Appointment> {
        let patient = self.own_patient(ctx)?;
        self.scheduling
            .update_as_patient(appointment_id, &patient.id, fields)
    }

    pub fn cancel_appointment(
        &self,
        ctx: &IdentityContext,
        appointment_id: &RecordId,
        reason: Option<String>,
    ) -> CareResult<Appointment> {
        let patient = self.own_patient(ctx)?;
        self.scheduling.cancel(appointment_id, &patient.id, reason)
    }

    pub fn my_appointments(
        &self,
        ctx: &IdentityContext,
        status: Option<AppointmentStatus>,
        upcoming_from: Option<NaiveDate>,
    ) -> CareResult<Vec<Appointment>> {
        let patient = self.own_patient(ctx)?;
        self.scheduling
            .list_for_patient(&patient.id, status, upcoming_from)
    }

    pub fn approve_appointment(
        &self,
        ctx: &IdentityContext,
        appointment_id: &RecordId,
    ) -> CareResult<Appointment> {
        ctx.require(&[Role::Doctor], "appointment")?;
        self.scheduling.approve(appointment_id, &ctx.actor_id)
    }

    pub fn reject_appointment(
        &self,
        ctx: &IdentityContext,
        appointment_id: &RecordId,
        reason: Option<String>,
    ) -> CareResult<Appointment> {
        ctx.require(&[Role::Doctor], "appointment")?;
        self.scheduling.reject(appointment_id, &ctx.actor_id, reason)
    }

    pub fn modify_appointment(
        &self,
        ctx: &IdentityContext,
        appointment_id: &RecordId,
        changes: AppointmentChanges,
    ) -> CareResult<Appointment> {
        ctx.require(&[Role::Doctor], "appointment")?;
        self.scheduling.modify(appointment_id, &ctx.actor_id, changes)
    }

    pub fn complete_appointment(
        &self,
        ctx: &IdentityContext,
        appointment_id: &RecordId,
    ) -> CareResult<Appointment> {
        ctx.require(&[Role::Doctor], "appointment")?;
        self.scheduling.complete(appointment_id, &ctx.actor_id)
    }

    pub fn doctor_calendar(
        &self,
        ctx: &IdentityContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CareResult<Vec<Appointment>> {
        ctx.require(&[Role::Doctor], "appointments")?;
        self.scheduling.calendar(&ctx.actor_id, from, to)
    }

    // Tasks ----------------------------------------------------------------------------

    /// Assigns a task to a nurse.
    ///
    /// The nurse must be active and the patient must exist. While
    /// [`CoreConfig::enforce_task_relationship`] is on, the patient must also be assigned to
    /// the nurse.
    pub fn create_task(&self, ctx: &IdentityContext, new: NewTask) -> CareResult<Recorded<Task>> {
        ctx.require(&[Role::Doctor], "task")?;
        self.directory.require_active(&new.nurse_id, Role::Nurse)?;
        self.directory.patient(&new.patient_id)?;

        if self.cfg.enforce_task_relationship()
            && !self
                .resolver
                .is_connected(&new.nurse_id, Role::Nurse, &new.patient_id)?
        {
            tracing::warn!(
                "rejected task for patient {}: not in the care of nurse {}",
                new.patient_id,
                new.nurse_id
            );
            return Err(CareError::invalid(format!(
                "patient {} is not in the care of nurse {}",
                new.patient_id, new.nurse_id
            )));
        }

        self.tasks.create(&ctx.actor_id, new)
    }

    pub fn update_task(
        &self,
        ctx: &IdentityContext,
        task_id: &RecordId,
        changes: TaskChanges,
    ) -> CareResult<Recorded<Task>> {
        ctx.require(&[Role::Nurse, Role::Doctor, Role::Admin], "task")?;
        self.tasks.update(task_id, ctx, changes)
    }

    pub fn delete_task(&self, ctx: &IdentityContext, task_id: &RecordId) -> CareResult<Recorded<Task>> {
        ctx.require(&[Role::Doctor, Role::Admin], "task")?;
        self.tasks.delete(task_id, ctx)
    }

    pub fn task_details(&self, ctx: &IdentityContext, task_id: &RecordId) -> CareResult<Task> {
        self.tasks.get(task_id, ctx)
    }

    pub fn list_daily_tasks(
        &self,
        ctx: &IdentityContext,
        as_of: NaiveDate,
    ) -> CareResult<Vec<Task>> {
        ctx.require(&[Role::Nurse], "tasks")?;
        self.tasks.list_daily(&ctx.actor_id, as_of)
    }

    pub fn list_task_status_history(
        &self,
        ctx: &IdentityContext,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> CareResult<Vec<TaskStatusEvent>> {
        ctx.require(&[Role::Nurse], "task history")?;
        self.tasks.list_status_history(&ctx.actor_id, start, end)
    }

    pub fn list_assigned_tasks(
        &self,
        ctx: &IdentityContext,
        status: Option<TaskStatus>,
    ) -> CareResult<Vec<Task>> {
        ctx.require(&[Role::Doctor], "tasks")?;
        self.tasks.list_assigned_by_doctor(&ctx.actor_id, status)
    }

    // Vitals ---------------------------------------------------------------------------

    pub fn record_vitals(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        measurements: Measurements,
        notes: Option<String>,
    ) -> CareResult<Vital> {
        ctx.require(&[Role::Nurse], "patient")?;
        self.authorize_patient(ctx, patient_id)?;
        self.vitals
            .record(patient_id, &ctx.actor_id, measurements, notes)
    }

    pub fn update_vitals(
        &self,
        ctx: &IdentityContext,
        vital_id: &RecordId,
        measurements: Measurements,
        notes: Option<String>,
    ) -> CareResult<Vital> {
        ctx.require(&[Role::Nurse], "vital record")?;
        let existing = self.vitals.get(vital_id)?;
        self.authorize_patient(ctx, &existing.patient_id)?;
        self.vitals.update(vital_id, measurements, notes)
    }

    pub fn patient_vitals(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> CareResult<Page<VitalReading>> {
        self.authorize_patient(ctx, patient_id)?;
        self.vitals
            .list_for_patient(patient_id, self.page(page, limit)?)
    }

    // Documents ------------------------------------------------------------------------

    pub fn prescribe(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        new: NewPrescription,
    ) -> CareResult<Prescription> {
        ctx.require(&[Role::Doctor], "patient")?;
        self.authorize_patient(ctx, patient_id)?;
        self.documents.prescribe(&ctx.actor_id, patient_id, new)
    }

    pub fn list_prescriptions(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        filter: PrescriptionFilter,
    ) -> CareResult<Vec<Prescription>> {
        self.authorize_patient(ctx, patient_id)?;
        self.documents.list_prescriptions(patient_id, filter)
    }

    pub fn prescription_details(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        prescription_id: &RecordId,
    ) -> CareResult<Prescription> {
        self.authorize_patient(ctx, patient_id)?;
        self.documents
            .prescription_details(prescription_id, patient_id)
    }

    /// Opens a medical record.
    ///
    /// Doctors write under their own id. Nurses write on behalf of `on_behalf_of`, or of the
    /// patient's assigned doctor when none is named.
    pub fn create_medical_record(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        on_behalf_of: Option<RecordId>,
        new: NewMedicalRecord,
    ) -> CareResult<MedicalRecord> {
        ctx.require(CLINICIANS, "patient")?;
        self.authorize_patient(ctx, patient_id)?;

        let doctor_id = match ctx.role {
            Role::Doctor => ctx.actor_id,
            _ => {
                let doctor_id = match on_behalf_of {
                    Some(id) => id,
                    None => self
                        .directory
                        .patient(patient_id)?
                        .assigned_doctor_id
                        .ok_or_else(|| {
                            CareError::invalid(
                                "patient has no assigned doctor; name one to write on behalf of",
                            )
                        })?,
                };
                self.directory.require_active(&doctor_id, Role::Doctor)?;
                doctor_id
            }
        };
        self.documents.create_record(&doctor_id, patient_id, new)
    }

    /// Doctors amend their own records. A nurse may amend any record of a patient they are
    /// connected to.
    pub fn update_medical_record(
        &self,
        ctx: &IdentityContext,
        record_id: &RecordId,
        changes: MedicalRecordChanges,
    ) -> CareResult<MedicalRecord> {
        ctx.require(CLINICIANS, "medical record")?;
        match ctx.role {
            Role::Doctor => self
                .documents
                .update_record(record_id, &ctx.actor_id, changes),
            _ => {
                let record = self.documents.record(record_id)?;
                self.authorize_patient(ctx, &record.patient_id)?;
                self.documents
                    .update_record_for_patient(record_id, &record.patient_id, changes)
            }
        }
    }

    pub fn list_medical_records(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> CareResult<Page<MedicalRecord>> {
        self.authorize_patient(ctx, patient_id)?;
        self.documents
            .list_records(patient_id, from, to, self.page(page, limit)?)
    }

    pub fn medical_record_details(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
        record_id: &RecordId,
    ) -> CareResult<MedicalRecord> {
        self.authorize_patient(ctx, patient_id)?;
        self.documents.record_details(record_id, patient_id)
    }

    pub fn legacy_diagnoses(
        &self,
        ctx: &IdentityContext,
        patient_id: &RecordId,
    ) -> CareResult<Vec<LegacyDiagnosis>> {
        self.authorize_patient(ctx, patient_id)?;
        self.documents.legacy_diagnoses(patient_id)
    }
}
