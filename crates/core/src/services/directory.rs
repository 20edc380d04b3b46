//! People and patient profiles.
//!
//! Administrator-side bookkeeping: registering people, admitting patients and maintaining
//! the explicit doctor/nurse assignments that the relationship resolver reads. Credentials
//! are handled outside the core.

use crate::pagination::{Page, PageRequest};
use crate::records::{Patient, Person, Role};
use crate::store::{EntityStore, Filter, Query, Sort};
use crate::{CareError, CareResult};
use care_types::{EmailAddress, NonEmptyText};
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Service for person and patient records.
pub struct DirectoryService<S> {
    store: Arc<S>,
}

impl<S> Clone for DirectoryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> DirectoryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers a new person.
    ///
    /// The email is normalised to lowercase before the store's uniqueness check.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed email or blank name, and
    /// [`CareError::Conflict`] if the email is already registered.
    pub fn register_person(
        &self,
        email: &str,
        role: Role,
        first_name: &str,
        last_name: &str,
    ) -> CareResult<Person> {
        let person = Person::new(
            EmailAddress::parse(email)?,
            role,
            NonEmptyText::new(first_name)?,
            NonEmptyText::new(last_name)?,
        );
        let person = self.store.create(person)?;
        tracing::info!("registered {} {}", person.role, person.id);
        Ok(person)
    }

    /// Creates the patient profile for a patient-role person.
    ///
    /// # Errors
    ///
    /// - [`CareError::NotFound`] if the person does not exist or is not a patient.
    /// - [`CareError::Conflict`] if the person already has a profile or the code is taken.
    pub fn admit_patient(&self, person_id: &RecordId, patient_code: &str) -> CareResult<Patient> {
        let code = NonEmptyText::new(patient_code)?;
        self.require_active(person_id, Role::Patient)?;

        let patient = self.store.create(Patient::new(*person_id, code))?;
        tracing::info!("admitted patient {} for person {}", patient.id, person_id);
        Ok(patient)
    }

    pub fn assign_doctor(&self, patient_id: &RecordId, doctor_id: &RecordId) -> CareResult<Patient> {
        self.require_active(doctor_id, Role::Doctor)?;
        self.update_patient(patient_id, |patient| {
            patient.assigned_doctor_id = Some(*doctor_id);
        })
    }

    pub fn assign_nurse(&self, patient_id: &RecordId, nurse_id: &RecordId) -> CareResult<Patient> {
        self.require_active(nurse_id, Role::Nurse)?;
        self.update_patient(patient_id, |patient| {
            patient.assigned_nurse_ids.insert(*nurse_id);
        })
    }

    /// Removes a nurse assignment. Removing a nurse who was not assigned is a no-op.
    pub fn unassign_nurse(&self, patient_id: &RecordId, nurse_id: &RecordId) -> CareResult<Patient> {
        self.update_patient(patient_id, |patient| {
            patient.assigned_nurse_ids.remove(nurse_id);
        })
    }

    /// Marks a person inactive. People are never deleted.
    pub fn deactivate_person(&self, person_id: &RecordId) -> CareResult<Person> {
        let person = self
            .store
            .update_by_id::<Person, _>(person_id, |person| {
                person.active = false;
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("person"))?;
        tracing::info!("deactivated {} {}", person.role, person.id);
        Ok(person)
    }

    pub fn record_login(&self, person_id: &RecordId, at: DateTime<Utc>) -> CareResult<Person> {
        self.store
            .update_by_id::<Person, _>(person_id, |person| {
                person.last_login = Some(at);
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("person"))
    }

    pub fn person(&self, person_id: &RecordId) -> CareResult<Person> {
        self.store
            .get(person_id)?
            .ok_or_else(|| CareError::not_found("person"))
    }

    pub fn patient(&self, patient_id: &RecordId) -> CareResult<Patient> {
        self.store
            .get(patient_id)?
            .ok_or_else(|| CareError::not_found("patient"))
    }

    /// Resolves the patient profile owned by a patient-role person.
    pub fn patient_for_person(&self, person_id: &RecordId) -> CareResult<Patient> {
        self.store
            .find_one(&Query::new().filter(Filter::eq("person_id", person_id)))?
            .ok_or_else(|| CareError::not_found("patient"))
    }

    /// Lists people, newest first, optionally restricted to a role and a name/email search.
    pub fn list_people(
        &self,
        role: Option<Role>,
        search: Option<&str>,
        page: PageRequest,
    ) -> CareResult<Page<Person>> {
        let mut query = Query::new();
        if let Some(role) = role {
            query = query.filter(Filter::eq("role", role.to_string()));
        }
        if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(name_or_email_contains(needle));
        }

        let total = self.store.count::<Person>(&query)?;
        let items = self.store.find(
            &query
                .sort_by(Sort::desc("created_at"))
                .sort_by(Sort::asc("id"))
                .skip(page.offset())
                .limit(page.limit() as usize),
        )?;
        Ok(Page::new(items, page, total))
    }

    /// Loads a person and checks they are active and hold `role`.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::NotFound`] naming the role otherwise.
    pub fn require_active(&self, person_id: &RecordId, role: Role) -> CareResult<Person> {
        match self.store.get::<Person>(person_id)? {
            Some(person) if person.active && person.role == role => Ok(person),
            Some(person) => {
                tracing::debug!(
                    "person {} is {} (active: {}), expected active {}",
                    person.id,
                    person.role,
                    person.active,
                    role
                );
                Err(CareError::not_found(role.to_string()))
            }
            None => Err(CareError::not_found(role.to_string())),
        }
    }

    fn update_patient(
        &self,
        patient_id: &RecordId,
        apply: impl FnOnce(&mut Patient),
    ) -> CareResult<Patient> {
        let patient = self
            .store
            .update_by_id::<Patient, _>(patient_id, |patient| {
                apply(patient);
                patient.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("patient"))?;
        tracing::info!("updated care assignments for patient {}", patient.id);
        Ok(patient)
    }
}

/// Case-insensitive substring match on first name, last name or email.
pub(crate) fn name_or_email_contains(needle: &str) -> Filter {
    Filter::Any(vec![
        Filter::contains("first_name", needle),
        Filter::contains("last_name", needle),
        Filter::contains("email", needle),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Ward;
    use crate::ErrorKind;

    #[test]
    fn register_normalises_and_enforces_unique_email() {
        let ward = Ward::new();
        let person = ward
            .directory
            .register_person("Mary.Seacole@Ward.Test", Role::Nurse, "Mary", "Seacole")
            .unwrap();
        assert_eq!(person.email.as_str(), "mary.seacole@ward.test");

        let err = ward
            .directory
            .register_person("MARY.SEACOLE@ward.test", Role::Doctor, "M", "S")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ward
            .directory
            .register_person("not-an-email", Role::Doctor, "M", "S")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn admission_requires_a_patient_role_person_once() {
        let ward = Ward::new();
        let nurse = ward.nurse("Cavell");
        let err = ward.directory.admit_patient(&nurse.id, "P-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let (person, patient) = ward.patient("Ada", "Lovelace");
        assert_eq!(ward.directory.patient_for_person(&person.id).unwrap(), patient);

        let err = ward.directory.admit_patient(&person.id, "P-other").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn assignments_check_role_and_activity() {
        let ward = Ward::new();
        let (_, patient) = ward.patient("Ada", "Lovelace");
        let doctor = ward.doctor("House");
        let nurse = ward.nurse("Cavell");

        let err = ward.directory.assign_doctor(&patient.id, &nurse.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let updated = ward.directory.assign_doctor(&patient.id, &doctor.id).unwrap();
        assert_eq!(updated.assigned_doctor_id, Some(doctor.id));

        let updated = ward.directory.assign_nurse(&patient.id, &nurse.id).unwrap();
        assert!(updated.assigned_nurse_ids.contains(&nurse.id));
        let updated = ward.directory.unassign_nurse(&patient.id, &nurse.id).unwrap();
        assert!(updated.assigned_nurse_ids.is_empty());

        ward.directory.deactivate_person(&nurse.id).unwrap();
        let err = ward.directory.assign_nurse(&patient.id, &nurse.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn list_people_filters_by_role_and_search() {
        let ward = Ward::new();
        ward.doctor("House");
        ward.doctor("Quinn");
        ward.nurse("Quincy");

        let cfg = crate::test_support::test_cfg();
        let page = ward
            .directory
            .list_people(Some(Role::Doctor), Some("qui"), PageRequest::first(&cfg))
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].last_name.as_str(), "Quinn");
    }
}
