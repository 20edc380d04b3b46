//! Who is connected to whom.
//!
//! A clinician is connected to a patient through either of two independent derivations:
//!
//! - **assignment**: the patient names the doctor as `assigned_doctor_id`, or lists the nurse
//!   in `assigned_nurse_ids`;
//! - **appointment history**: the patient has at least one appointment with the doctor. Only
//!   doctors are connected this way.
//!
//! Each derivation returns patient ids tagged with where they came from. The merge
//! deduplicates by patient id and keeps every tag, so callers can tell an assigned patient
//! from one who merely booked once. Appointment statistics are attached only when the
//! appointment derivation contributed.

use crate::pagination::{Page, PageRequest};
use crate::records::{Appointment, Patient, Person, Role};
use crate::services::directory::name_or_email_contains;
use crate::store::{EntityStore, Filter, Query, Sort};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Assignment,
    AppointmentHistory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AppointmentStats {
    pub total_appointments: u32,
    pub last_appointment: NaiveDate,
}

/// One patient id produced by a derivation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Derived {
    pub id: RecordId,
    pub provenance: Provenance,
    pub stats: Option<AppointmentStats>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactDetails {
    pub person_id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&Person> for ContactDetails {
    fn from(person: &Person) -> Self {
        Self {
            person_id: person.id,
            first_name: person.first_name.to_string(),
            last_name: person.last_name.to_string(),
            email: person.email.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectedPatient {
    pub patient_id: RecordId,
    pub patient_code: String,
    pub created_at: DateTime<Utc>,
    /// `None` if the owning person record is missing.
    pub contact: Option<ContactDetails>,
    pub provenance: Vec<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_appointments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_appointment: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CareTeamMember {
    pub person_id: RecordId,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub provenance: Vec<Provenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_appointments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_appointment: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Merged {
    provenance: BTreeSet<Provenance>,
    stats: Option<AppointmentStats>,
}

/// Merges derivation outputs, deduplicating by id and keeping every provenance tag.
pub fn merge_derivations(
    derivations: impl IntoIterator<Item = Vec<Derived>>,
) -> BTreeMap<RecordId, (Vec<Provenance>, Option<AppointmentStats>)> {
    let mut merged: BTreeMap<RecordId, Merged> = BTreeMap::new();
    for derived in derivations.into_iter().flatten() {
        let entry = merged.entry(derived.id).or_default();
        entry.provenance.insert(derived.provenance);
        if derived.stats.is_some() {
            entry.stats = derived.stats;
        }
    }
    merged
        .into_iter()
        .map(|(id, m)| (id, (m.provenance.into_iter().collect(), m.stats)))
        .collect()
}

/// Groups appointments by `key`, counting them and tracking the latest date.
fn appointment_stats(
    appointments: &[Appointment],
    key: impl Fn(&Appointment) -> RecordId,
) -> BTreeMap<RecordId, AppointmentStats> {
    let mut stats: BTreeMap<RecordId, AppointmentStats> = BTreeMap::new();
    for appointment in appointments {
        stats
            .entry(key(appointment))
            .and_modify(|s| {
                s.total_appointments += 1;
                s.last_appointment = s.last_appointment.max(appointment.date);
            })
            .or_insert(AppointmentStats {
                total_appointments: 1,
                last_appointment: appointment.date,
            });
    }
    stats
}

pub struct RelationshipResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for RelationshipResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> RelationshipResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Patients connected to a doctor or nurse.
    ///
    /// # Arguments
    ///
    /// * `actor_id` - The doctor or nurse.
    /// * `actor_role` - Must be [`Role::Doctor`] or [`Role::Nurse`].
    /// * `search` - Optional case-insensitive substring on the patient's first name, last
    ///   name or email. Applied before either derivation runs.
    /// * `page` - Page window, applied after sorting.
    ///
    /// # Returns
    ///
    /// Patients sorted by profile creation time, newest first, ties broken by id. An actor id
    /// that does not resolve to a person with `actor_role` yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::InvalidInput`] for any other role, and store errors unchanged.
    pub fn list_connected_patients(
        &self,
        actor_id: &RecordId,
        actor_role: Role,
        search: Option<&str>,
        page: PageRequest,
    ) -> CareResult<Page<ConnectedPatient>> {
        if !actor_role.is_clinician() {
            return Err(CareError::invalid(format!(
                "connected patients are defined for doctors and nurses, not {actor_role}"
            )));
        }

        match self.store.get::<Person>(actor_id)? {
            Some(person) if person.role == actor_role => {}
            _ => {
                tracing::debug!("no {actor_role} {actor_id}; returning no connected patients");
                return Ok(Page::empty(page));
            }
        }

        let scope = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let scope = self.search_scope(needle)?;
                if scope.is_empty() {
                    return Ok(Page::empty(page));
                }
                Some(scope)
            }
            None => None,
        };

        let mut derivations = vec![self.assigned_patients(actor_id, actor_role, scope.as_ref())?];
        if actor_role == Role::Doctor {
            derivations.push(self.patients_with_appointments(actor_id, scope.as_ref())?);
        }
        let merged = merge_derivations(derivations);
        if merged.is_empty() {
            return Ok(Page::empty(page));
        }

        let query = Query::new().filter(Filter::is_in("id", merged.keys().copied()));
        let total = self.store.count::<Patient>(&query)?;
        if total < merged.len() {
            tracing::warn!(
                "{} connected patient ids for {} have no patient record",
                merged.len() - total,
                actor_id
            );
        }

        let patients: Vec<Patient> = self.store.find(
            &query
                .sort_by(Sort::desc("created_at"))
                .sort_by(Sort::asc("id"))
                .skip(page.offset())
                .limit(page.limit() as usize),
        )?;

        let contacts = self.contacts_for(&patients)?;
        let items = patients
            .into_iter()
            .filter_map(|patient| {
                let (provenance, stats) = merged.get(&patient.id)?.clone();
                Some(ConnectedPatient {
                    contact: contacts.get(&patient.person_id).map(ContactDetails::from),
                    patient_id: patient.id,
                    patient_code: patient.patient_code.to_string(),
                    created_at: patient.created_at,
                    provenance,
                    total_appointments: stats.map(|s| s.total_appointments),
                    last_appointment: stats.map(|s| s.last_appointment),
                })
            })
            .collect();

        Ok(Page::new(items, page, total))
    }

    /// Patient ids whose owning person matches the search.
    fn search_scope(&self, needle: &str) -> CareResult<Vec<RecordId>> {
        let people: Vec<Person> = self.store.find(
            &Query::new()
                .filter(Filter::eq("role", Role::Patient.to_string()))
                .filter(name_or_email_contains(needle)),
        )?;
        if people.is_empty() {
            return Ok(Vec::new());
        }

        let patients: Vec<Patient> = self.store.find(
            &Query::new().filter(Filter::is_in("person_id", people.iter().map(|p| p.id))),
        )?;
        Ok(patients.into_iter().map(|p| p.id).collect())
    }

    /// Derivation 1: explicit assignment on the patient profile.
    pub fn assigned_patients(
        &self,
        actor_id: &RecordId,
        actor_role: Role,
        scope: Option<&Vec<RecordId>>,
    ) -> CareResult<Vec<Derived>> {
        let field = match actor_role {
            Role::Doctor => "assigned_doctor_id",
            Role::Nurse => "assigned_nurse_ids",
            _ => return Ok(Vec::new()),
        };
        let mut query = Query::new().filter(Filter::eq(field, actor_id));
        if let Some(scope) = scope {
            query = query.filter(Filter::is_in("id", scope.iter().copied()));
        }

        let patients: Vec<Patient> = self.store.find(&query)?;
        Ok(patients
            .into_iter()
            .map(|p| Derived {
                id: p.id,
                provenance: Provenance::Assignment,
                stats: None,
            })
            .collect())
    }

    /// Derivation 2: any appointment with the doctor, whatever its status.
    pub fn patients_with_appointments(
        &self,
        doctor_id: &RecordId,
        scope: Option<&Vec<RecordId>>,
    ) -> CareResult<Vec<Derived>> {
        let mut query = Query::new().filter(Filter::eq("doctor_id", doctor_id));
        if let Some(scope) = scope {
            query = query.filter(Filter::is_in("patient_id", scope.iter().copied()));
        }

        let appointments: Vec<Appointment> = self.store.find(&query)?;
        Ok(appointment_stats(&appointments, |a| a.patient_id)
            .into_iter()
            .map(|(id, stats)| Derived {
                id,
                provenance: Provenance::AppointmentHistory,
                stats: Some(stats),
            })
            .collect())
    }

    /// Doctors and nurses connected to a patient, sorted by last name, first name, then id.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::NotFound`] if the patient does not exist.
    pub fn list_care_team(&self, patient_id: &RecordId) -> CareResult<Vec<CareTeamMember>> {
        let patient: Patient = self
            .store
            .get(patient_id)?
            .ok_or_else(|| CareError::not_found("patient"))?;

        let assigned: Vec<Derived> = patient
            .assigned_doctor_id
            .iter()
            .chain(patient.assigned_nurse_ids.iter())
            .map(|id| Derived {
                id: *id,
                provenance: Provenance::Assignment,
                stats: None,
            })
            .collect();

        let appointments: Vec<Appointment> = self
            .store
            .find(&Query::new().filter(Filter::eq("patient_id", patient_id)))?;
        let history: Vec<Derived> = appointment_stats(&appointments, |a| a.doctor_id)
            .into_iter()
            .map(|(id, stats)| Derived {
                id,
                provenance: Provenance::AppointmentHistory,
                stats: Some(stats),
            })
            .collect();

        let merged = merge_derivations([assigned, history]);
        let people: Vec<Person> = self
            .store
            .find(&Query::new().filter(Filter::is_in("id", merged.keys().copied())))?;

        let mut team: Vec<CareTeamMember> = people
            .into_iter()
            .filter_map(|person| {
                let (provenance, stats) = merged.get(&person.id)?.clone();
                Some(CareTeamMember {
                    person_id: person.id,
                    role: person.role,
                    first_name: person.first_name.to_string(),
                    last_name: person.last_name.to_string(),
                    email: person.email.to_string(),
                    provenance,
                    total_appointments: stats.map(|s| s.total_appointments),
                    last_appointment: stats.map(|s| s.last_appointment),
                })
            })
            .collect();
        team.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(team)
    }

    /// Whether `actor_id` is connected to `patient_id` through either derivation.
    ///
    /// A missing patient is simply not connected.
    pub fn is_connected(
        &self,
        actor_id: &RecordId,
        actor_role: Role,
        patient_id: &RecordId,
    ) -> CareResult<bool> {
        let Some(patient) = self.store.get::<Patient>(patient_id)? else {
            return Ok(false);
        };

        match actor_role {
            Role::Nurse => Ok(patient.assigned_nurse_ids.contains(actor_id)),
            Role::Doctor => {
                if patient.assigned_doctor_id.as_ref() == Some(actor_id) {
                    return Ok(true);
                }
                let query = Query::new()
                    .filter(Filter::eq("doctor_id", actor_id))
                    .filter(Filter::eq("patient_id", patient_id));
                Ok(self.store.count::<Appointment>(&query)? > 0)
            }
            Role::Admin | Role::Patient => Ok(false),
        }
    }

    fn contacts_for(&self, patients: &[Patient]) -> CareResult<BTreeMap<RecordId, Person>> {
        if patients.is_empty() {
            return Ok(BTreeMap::new());
        }
        let people: Vec<Person> = self.store.find(
            &Query::new().filter(Filter::is_in("id", patients.iter().map(|p| p.person_id))),
        )?;
        Ok(people.into_iter().map(|p| (p.id, p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AppointmentStatus, AppointmentType, TimeSlot};
    use crate::test_support::{test_cfg, Ward};

    fn appointment(patient_id: RecordId, doctor_id: RecordId, date: &str) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: RecordId::new(),
            patient_id,
            doctor_id,
            date: date.parse().unwrap(),
            time_slot: TimeSlot::parse("09:00", 15).unwrap(),
            appointment_type: AppointmentType::Consultation,
            status: AppointmentStatus::Completed,
            reason: None,
            notes: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn first_page() -> PageRequest {
        PageRequest::first(&test_cfg())
    }

    #[test]
    fn assignment_and_history_merge_into_one_item() {
        let ward = Ward::new();
        let resolver = RelationshipResolver::new(Arc::clone(&ward.store));
        let doctor = ward.doctor("House");
        let (_, patient) = ward.patient("Ada", "Lovelace");
        ward.directory.assign_doctor(&patient.id, &doctor.id).unwrap();

        ward.store
            .create(appointment(patient.id, doctor.id, "2026-03-01"))
            .unwrap();
        ward.store
            .create(appointment(patient.id, doctor.id, "2026-04-15"))
            .unwrap();

        let page = resolver
            .list_connected_patients(&doctor.id, Role::Doctor, None, first_page())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);

        let item = &page.items[0];
        assert_eq!(item.patient_id, patient.id);
        assert_eq!(
            item.provenance,
            vec![Provenance::Assignment, Provenance::AppointmentHistory]
        );
        assert_eq!(item.total_appointments, Some(2));
        assert_eq!(item.last_appointment, Some("2026-04-15".parse().unwrap()));
        assert_eq!(item.contact.as_ref().unwrap().first_name, "Ada");
    }

    #[test]
    fn assignment_only_carries_no_statistics() {
        let ward = Ward::new();
        let resolver = RelationshipResolver::new(Arc::clone(&ward.store));
        let nurse = ward.nurse("Cavell");
        let (_, patient) = ward.patient("Ada", "Lovelace");
        ward.directory.assign_nurse(&patient.id, &nurse.id).unwrap();

        let page = resolver
            .list_connected_patients(&nurse.id, Role::Nurse, None, first_page())
            .unwrap();
        assert_eq!(page.items[0].provenance, vec![Provenance::Assignment]);
        assert_eq!(page.items[0].total_appointments, None);
        assert_eq!(page.items[0].last_appointment, None);
    }

    #[test]
    fn unknown_or_mismatched_actor_yields_empty_page() {
        let ward = Ward::new();
        let resolver = RelationshipResolver::new(Arc::clone(&ward.store));
        let nurse = ward.nurse("Cavell");

        let page = resolver
            .list_connected_patients(&RecordId::new(), Role::Doctor, None, first_page())
            .unwrap();
        assert_eq!(page.total, 0);

        let page = resolver
            .list_connected_patients(&nurse.id, Role::Doctor, None, first_page())
            .unwrap();
        assert!(page.items.is_empty());

        assert!(resolver
            .list_connected_patients(&nurse.id, Role::Patient, None, first_page())
            .is_err());
    }

    #[test]
    fn search_applies_before_derivations_and_pages_are_stable() {
        let ward = Ward::new();
        let resolver = RelationshipResolver::new(Arc::clone(&ward.store));
        let doctor = ward.doctor("House");

        let mut ids = Vec::new();
        for (first, last) in [("Ada", "Lovelace"), ("Alan", "Turing"), ("Grace", "Hopper")] {
            let (_, patient) = ward.patient(first, last);
            ward.directory.assign_doctor(&patient.id, &doctor.id).unwrap();
            ids.push(patient.id);
        }

        let page = resolver
            .list_connected_patients(&doctor.id, Role::Doctor, Some("TURING"), first_page())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].patient_id, ids[1]);

        let page = resolver
            .list_connected_patients(&doctor.id, Role::Doctor, Some("nobody"), first_page())
            .unwrap();
        assert_eq!(page.total, 0);

        let cfg = test_cfg();
        let second = PageRequest::new(Some(2), Some(2), &cfg).unwrap();
        let a = resolver
            .list_connected_patients(&doctor.id, Role::Doctor, None, second)
            .unwrap();
        let b = resolver
            .list_connected_patients(&doctor.id, Role::Doctor, None, second)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total, 3);
        assert_eq!(a.pages, 2);
        assert_eq!(a.items.len(), 1);
    }

    #[test]
    fn care_team_and_connection_checks() {
        let ward = Ward::new();
        let resolver = RelationshipResolver::new(Arc::clone(&ward.store));
        let assigned = ward.doctor("Assigned");
        let visiting = ward.doctor("Visiting");
        let nurse = ward.nurse("Cavell");
        let stranger = ward.nurse("Stranger");
        let (_, patient) = ward.patient("Ada", "Lovelace");
        ward.directory.assign_doctor(&patient.id, &assigned.id).unwrap();
        ward.directory.assign_nurse(&patient.id, &nurse.id).unwrap();
        ward.store
            .create(appointment(patient.id, visiting.id, "2026-05-01"))
            .unwrap();

        let team = resolver.list_care_team(&patient.id).unwrap();
        let ids: Vec<RecordId> = team.iter().map(|m| m.person_id).collect();
        assert_eq!(ids, vec![assigned.id, nurse.id, visiting.id]);
        assert_eq!(team[2].provenance, vec![Provenance::AppointmentHistory]);

        assert!(resolver.is_connected(&visiting.id, Role::Doctor, &patient.id).unwrap());
        assert!(resolver.is_connected(&nurse.id, Role::Nurse, &patient.id).unwrap());
        assert!(!resolver.is_connected(&stranger.id, Role::Nurse, &patient.id).unwrap());

        let err = resolver.list_care_team(&RecordId::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
