//! Appointment booking and lifecycle.
//!
//! Double booking is prevented per `(doctor_id, date, time_slot)`: at most one appointment
//! in that slot may be pending or confirmed. The check and the insert run under a striped
//! mutex keyed by the slot, so two concurrent bookings of the same slot serialise while
//! bookings of different slots mostly do not contend. Every other mutation is a single
//! conditional `update_one` against the store.

use crate::config::CoreConfig;
use crate::constants::{DOCTOR_REJECTION_REASON, PATIENT_CANCELLATION_REASON, SLOT_LOCK_STRIPES};
use crate::records::{Appointment, AppointmentStatus, AppointmentType, TimeSlot};
use crate::store::{EntityStore, Filter, Query, Sort};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Fields a patient may change on their own appointment.
pub const PATIENT_EDITABLE_FIELDS: [&str; 2] = ["reason", "notes"];

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: RecordId,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
}

/// Fixed table of mutexes; a slot key always hashes to the same stripe.
#[derive(Debug)]
pub struct SlotLocks {
    stripes: Vec<Mutex<()>>,
}

impl SlotLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, key: &SlotKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// The guard protects no data, so a poisoned stripe is still safe to reuse.
    pub fn lock(&self, key: &SlotKey) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A booking as submitted by a patient. Type and slot arrive unparsed.
#[derive(Clone, Debug, Default)]
pub struct BookingRequest {
    pub doctor_id: Option<RecordId>,
    pub date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub appointment_type: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Doctor-side reschedule. Absent fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct AppointmentChanges {
    pub date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub notes: Option<String>,
}

pub struct SchedulingEngine<S> {
    cfg: Arc<CoreConfig>,
    store: Arc<S>,
    locks: Arc<SlotLocks>,
}

impl<S> Clone for SchedulingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            cfg: Arc::clone(&self.cfg),
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S: EntityStore> SchedulingEngine<S> {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<S>) -> Self {
        Self {
            cfg,
            store,
            locks: Arc::new(SlotLocks::new(SLOT_LOCK_STRIPES)),
        }
    }

    /// Books an appointment in `pending` status.
    ///
    /// # Errors
    ///
    /// - [`CareError::InvalidInput`] if the doctor, date, slot or type is missing or
    ///   malformed, or the slot is off the configured grid.
    /// - [`CareError::Conflict`] ("slot already booked") if a pending or confirmed
    ///   appointment already holds the slot. Nothing is created in that case.
    pub fn book(&self, patient_id: &RecordId, request: BookingRequest) -> CareResult<Appointment> {
        let doctor_id = request
            .doctor_id
            .ok_or_else(|| CareError::invalid("doctor_id is required"))?;
        let date = request
            .date
            .ok_or_else(|| CareError::invalid("date is required"))?;
        let appointment_type: AppointmentType = request
            .appointment_type
            .as_deref()
            .ok_or_else(|| CareError::invalid("type is required"))?
            .parse()?;
        let time_slot = TimeSlot::parse(
            request
                .time_slot
                .as_deref()
                .ok_or_else(|| CareError::invalid("time_slot is required"))?,
            self.cfg.slot_granularity_minutes(),
        )?;

        let key = SlotKey {
            doctor_id,
            date,
            time_slot,
        };
        let _guard = self.locks.lock(&key);

        if let Some(existing) = self.find_active_in_slot(&key, None)? {
            tracing::warn!(
                "rejected booking for doctor {} on {} at {}: held by appointment {}",
                key.doctor_id,
                key.date,
                key.time_slot,
                existing.id
            );
            return Err(CareError::Conflict("slot already booked".into()));
        }

        let now = Utc::now();
        let appointment = self.store.create(Appointment {
            id: RecordId::new(),
            patient_id: *patient_id,
            doctor_id: key.doctor_id,
            date: key.date,
            time_slot: key.time_slot,
            appointment_type,
            status: AppointmentStatus::Pending,
            reason: request.reason,
            notes: request.notes,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        })?;

        tracing::info!(
            "booked appointment {} with doctor {} on {} at {}",
            appointment.id,
            appointment.doctor_id,
            appointment.date,
            appointment.time_slot
        );
        Ok(appointment)
    }

    /// Cancels a patient's own pending or confirmed appointment.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::NotFound`] if the appointment does not exist, belongs to someone
    /// else, or is already completed or cancelled.
    pub fn cancel(
        &self,
        appointment_id: &RecordId,
        patient_id: &RecordId,
        reason: Option<String>,
    ) -> CareResult<Appointment> {
        let reason = non_blank(reason).unwrap_or_else(|| PATIENT_CANCELLATION_REASON.to_string());
        let query = Query::by_id(appointment_id)
            .filter(Filter::eq("patient_id", patient_id))
            .filter(Filter::is_in(
                "status",
                AppointmentStatus::ACTIVE.map(|s| s.to_string()),
            ));

        let appointment = self
            .store
            .update_one::<Appointment, _>(&query, |a| a.cancel(reason, Utc::now()))?
            .ok_or_else(|| CareError::not_found("appointment"))?;
        tracing::info!("appointment {} cancelled by patient", appointment.id);
        Ok(appointment)
    }

    /// Applies a patient's edit to their own appointment.
    ///
    /// Only `reason` and `notes` are applied. Any other field in `fields` is dropped without
    /// error. Applied fields must be strings or null.
    pub fn update_as_patient(
        &self,
        appointment_id: &RecordId,
        patient_id: &RecordId,
        fields: &Map<String, Value>,
    ) -> CareResult<Appointment> {
        let mut reason = None;
        let mut notes = None;
        for (name, value) in fields {
            let slot = match name.as_str() {
                "reason" => &mut reason,
                "notes" => &mut notes,
                other => {
                    tracing::debug!(
                        "dropping field '{}' from patient update of appointment {}",
                        other,
                        appointment_id
                    );
                    continue;
                }
            };
            *slot = Some(match value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                _ => {
                    return Err(CareError::invalid(format!(
                        "appointment field '{name}' must be a string or null"
                    )))
                }
            });
        }

        let query = Query::by_id(appointment_id).filter(Filter::eq("patient_id", patient_id));
        self.store
            .update_one::<Appointment, _>(&query, |a| {
                if let Some(reason) = reason {
                    a.reason = reason;
                }
                if let Some(notes) = notes {
                    a.notes = notes;
                }
                a.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("appointment"))
    }

    /// `pending -> confirmed`.
    pub fn approve(&self, appointment_id: &RecordId, doctor_id: &RecordId) -> CareResult<Appointment> {
        let appointment = self.transition_as_doctor(appointment_id, doctor_id, |a| {
            a.status = a.status.transition_to(AppointmentStatus::Confirmed)?;
            Ok(())
        })?;
        tracing::info!("appointment {} confirmed", appointment.id);
        Ok(appointment)
    }

    /// `pending -> cancelled`. Confirmed appointments cannot be rejected.
    pub fn reject(
        &self,
        appointment_id: &RecordId,
        doctor_id: &RecordId,
        reason: Option<String>,
    ) -> CareResult<Appointment> {
        let reason = non_blank(reason).unwrap_or_else(|| DOCTOR_REJECTION_REASON.to_string());
        let appointment = self.transition_as_doctor(appointment_id, doctor_id, |a| {
            if a.status != AppointmentStatus::Pending {
                return Err(CareError::InvalidTransition {
                    entity: "appointment",
                    from: a.status.to_string(),
                    to: AppointmentStatus::Cancelled.to_string(),
                });
            }
            a.cancel(reason, Utc::now())
        })?;
        tracing::info!("appointment {} rejected", appointment.id);
        Ok(appointment)
    }

    /// `confirmed -> completed`.
    pub fn complete(&self, appointment_id: &RecordId, doctor_id: &RecordId) -> CareResult<Appointment> {
        let appointment = self.transition_as_doctor(appointment_id, doctor_id, |a| {
            a.status = a.status.transition_to(AppointmentStatus::Completed)?;
            Ok(())
        })?;
        tracing::info!("appointment {} completed", appointment.id);
        Ok(appointment)
    }

    /// Moves a pending or confirmed appointment, or edits its notes.
    ///
    /// A change of date or slot re-runs the conflict check against the target slot, ignoring
    /// the appointment itself, under the same slot lock as [`Self::book`].
    ///
    /// # Errors
    ///
    /// - [`CareError::NotFound`] if the doctor does not own the appointment.
    /// - [`CareError::InvalidTransition`] if the appointment is completed or cancelled.
    /// - [`CareError::Conflict`] if the target slot is taken, or the appointment was moved
    ///   or closed between being read and being written.
    pub fn modify(
        &self,
        appointment_id: &RecordId,
        doctor_id: &RecordId,
        changes: AppointmentChanges,
    ) -> CareResult<Appointment> {
        let owned = Query::by_id(appointment_id).filter(Filter::eq("doctor_id", doctor_id));
        let current: Appointment = self
            .store
            .find_one(&owned)?
            .ok_or_else(|| CareError::not_found("appointment"))?;
        if current.status.is_terminal() {
            return Err(CareError::InvalidTransition {
                entity: "appointment",
                from: current.status.to_string(),
                to: "rescheduled".into(),
            });
        }

        let time_slot = match changes.time_slot.as_deref() {
            Some(raw) => TimeSlot::parse(raw, self.cfg.slot_granularity_minutes())?,
            None => current.time_slot.clone(),
        };
        let target = SlotKey {
            doctor_id: current.doctor_id,
            date: changes.date.unwrap_or(current.date),
            time_slot,
        };
        let moving = target.date != current.date || target.time_slot != current.time_slot;

        let _guard = moving.then(|| self.locks.lock(&target));
        if moving && self.find_active_in_slot(&target, Some(appointment_id))?.is_some() {
            tracing::warn!(
                "rejected move of appointment {} to {} at {}: slot taken",
                appointment_id,
                target.date,
                target.time_slot
            );
            return Err(CareError::Conflict("slot already booked".into()));
        }

        // Only write if the row still holds the slot and status that were read above.
        let unchanged = owned
            .clone()
            .filter(Filter::eq("date", current.date))
            .filter(Filter::eq("time_slot", current.time_slot.as_str()))
            .filter(Filter::is_in(
                "status",
                AppointmentStatus::ACTIVE.map(|s| s.to_string()),
            ));
        let notes = changes.notes;
        let updated = self.store.update_one::<Appointment, _>(&unchanged, |a| {
            if moving {
                a.date = target.date;
                a.time_slot = target.time_slot.clone();
            }
            if notes.is_some() {
                a.notes = notes;
            }
            a.updated_at = Utc::now();
            Ok(())
        })?;
        let appointment = match updated {
            Some(appointment) => appointment,
            None if self.store.find_one::<Appointment>(&owned)?.is_some() => {
                tracing::warn!(
                    "appointment {} changed while being modified; edit not applied",
                    appointment_id
                );
                return Err(CareError::Conflict(
                    "appointment was changed concurrently".into(),
                ));
            }
            None => return Err(CareError::not_found("appointment")),
        };

        tracing::info!(
            "appointment {} now on {} at {}",
            appointment.id,
            appointment.date,
            appointment.time_slot
        );
        Ok(appointment)
    }

    /// A doctor's appointments between two dates inclusive, by date then slot.
    pub fn calendar(
        &self,
        doctor_id: &RecordId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CareResult<Vec<Appointment>> {
        if from > to {
            return Err(CareError::invalid(format!(
                "calendar range starts after it ends ({from} > {to})"
            )));
        }
        self.store.find(
            &Query::new()
                .filter(Filter::eq("doctor_id", doctor_id))
                .filter(Filter::within("date", Some(from.into()), Some(to.into())))
                .sort_by(Sort::asc("date"))
                .sort_by(Sort::asc("time_slot")),
        )
    }

    /// A patient's appointments by date then slot, optionally narrowed by status and to
    /// dates on or after `upcoming_from`.
    pub fn list_for_patient(
        &self,
        patient_id: &RecordId,
        status: Option<AppointmentStatus>,
        upcoming_from: Option<NaiveDate>,
    ) -> CareResult<Vec<Appointment>> {
        let mut query = Query::new().filter(Filter::eq("patient_id", patient_id));
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status.to_string()));
        }
        if let Some(from) = upcoming_from {
            query = query.filter(Filter::within("date", Some(from.into()), None));
        }
        self.store.find(
            &query
                .sort_by(Sort::asc("date"))
                .sort_by(Sort::asc("time_slot")),
        )
    }

    fn find_active_in_slot(
        &self,
        key: &SlotKey,
        excluding: Option<&RecordId>,
    ) -> CareResult<Option<Appointment>> {
        let mut query = Query::new()
            .filter(Filter::eq("doctor_id", key.doctor_id))
            .filter(Filter::eq("date", key.date))
            .filter(Filter::eq("time_slot", key.time_slot.as_str()))
            .filter(Filter::is_in(
                "status",
                AppointmentStatus::ACTIVE.map(|s| s.to_string()),
            ));
        if let Some(id) = excluding {
            query = query.filter(Filter::not_in("id", [*id]));
        }
        self.store.find_one(&query)
    }

    fn transition_as_doctor(
        &self,
        appointment_id: &RecordId,
        doctor_id: &RecordId,
        apply: impl FnOnce(&mut Appointment) -> CareResult<()>,
    ) -> CareResult<Appointment> {
        let query = Query::by_id(appointment_id).filter(Filter::eq("doctor_id", doctor_id));
        self.store
            .update_one::<Appointment, _>(&query, |a| {
                apply(a)?;
                a.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("appointment"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Record};
    use crate::test_support::{test_cfg, test_store};
    use crate::ErrorKind;
    use serde_json::json;
    use std::sync::Barrier;

    fn engine() -> (SchedulingEngine<MemoryStore>, Arc<MemoryStore>) {
        let store = test_store();
        (SchedulingEngine::new(test_cfg(), Arc::clone(&store)), store)
    }

    fn request(doctor_id: RecordId, date: &str, slot: &str) -> BookingRequest {
        BookingRequest {
            doctor_id: Some(doctor_id),
            date: Some(date.parse().unwrap()),
            time_slot: Some(slot.into()),
            appointment_type: Some("consultation".into()),
            reason: Some("checkup".into()),
            notes: None,
        }
    }

    #[test]
    fn concurrent_bookings_of_one_slot_admit_exactly_one() {
        const ATTEMPTS: usize = 16;
        let (engine, store) = engine();
        let doctor = RecordId::new();
        let barrier = Barrier::new(ATTEMPTS);

        let results: Vec<CareResult<Appointment>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..ATTEMPTS)
                .map(|_| {
                    let engine = engine.clone();
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let patient = RecordId::new();
                        barrier.wait();
                        engine.book(&patient, request(doctor, "2026-06-01", "10:00"))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("booking thread panicked"))
                .collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, ATTEMPTS - 1);

        let stored: Vec<Appointment> = store
            .find(&Query::new().filter(Filter::eq("doctor_id", doctor)))
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn booking_validates_input() {
        let (engine, _) = engine();
        let patient = RecordId::new();
        let doctor = RecordId::new();

        let mut missing_type = request(doctor, "2026-06-01", "10:00");
        missing_type.appointment_type = None;
        assert_eq!(
            engine.book(&patient, missing_type).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut missing_date = request(doctor, "2026-06-01", "10:00");
        missing_date.date = None;
        assert_eq!(
            engine.book(&patient, missing_date).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let off_grid = request(doctor, "2026-06-01", "10:07");
        assert_eq!(
            engine.book(&patient, off_grid).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let booked = engine
            .book(&patient, request(doctor, "2026-06-01", "10:15"))
            .unwrap();
        assert_eq!(booked.status, AppointmentStatus::Pending);
    }

    #[test]
    fn cancelled_slot_can_be_booked_again() {
        let (engine, _) = engine();
        let patient = RecordId::new();
        let doctor = RecordId::new();

        let first = engine
            .book(&patient, request(doctor, "2026-06-01", "10:00"))
            .unwrap();
        engine.cancel(&first.id, &patient, None).unwrap();

        let second = engine
            .book(&RecordId::new(), request(doctor, "2026-06-01", "10:00"))
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn patient_update_applies_only_allowed_fields() {
        let (engine, _) = engine();
        let patient = RecordId::new();
        let booked = engine
            .book(&patient, request(RecordId::new(), "2026-06-01", "10:00"))
            .unwrap();

        let fields = json!({ "status": "confirmed", "reason": "x", "doctor_id": "ignored" });
        let updated = engine
            .update_as_patient(&booked.id, &patient, fields.as_object().unwrap())
            .unwrap();
        assert_eq!(updated.status, AppointmentStatus::Pending);
        assert_eq!(updated.reason.as_deref(), Some("x"));
        assert_eq!(updated.doctor_id, booked.doctor_id);

        let err = engine
            .update_as_patient(&booked.id, &RecordId::new(), fields.as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let bad = json!({ "notes": 42 });
        let err = engine
            .update_as_patient(&booked.id, &patient, bad.as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn cancelling_terminal_appointments_is_not_found() {
        let (engine, _) = engine();
        let patient = RecordId::new();
        let doctor = RecordId::new();

        let done = engine
            .book(&patient, request(doctor, "2026-06-01", "09:00"))
            .unwrap();
        engine.approve(&done.id, &doctor).unwrap();
        engine.complete(&done.id, &doctor).unwrap();
        let err = engine.cancel(&done.id, &patient, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let cancelled = engine
            .book(&patient, request(doctor, "2026-06-01", "09:30"))
            .unwrap();
        let first = engine
            .cancel(&cancelled.id, &patient, Some("  ".into()))
            .unwrap();
        assert_eq!(
            first.cancellation_reason.as_deref(),
            Some(PATIENT_CANCELLATION_REASON)
        );
        assert!(first.cancelled_at.is_some());
        let err = engine.cancel(&cancelled.id, &patient, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn doctor_transitions_follow_the_lifecycle() {
        let (engine, _) = engine();
        let patient = RecordId::new();
        let doctor = RecordId::new();
        let booked = engine
            .book(&patient, request(doctor, "2026-06-02", "11:00"))
            .unwrap();

        let err = engine.approve(&booked.id, &RecordId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine.complete(&booked.id, &doctor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        engine.approve(&booked.id, &doctor).unwrap();
        let err = engine.reject(&booked.id, &doctor, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let other = engine
            .book(&patient, request(doctor, "2026-06-02", "11:15"))
            .unwrap();
        let rejected = engine.reject(&other.id, &doctor, None).unwrap();
        assert_eq!(rejected.status, AppointmentStatus::Cancelled);
        assert_eq!(
            rejected.cancellation_reason.as_deref(),
            Some(DOCTOR_REJECTION_REASON)
        );
    }

    #[test]
    fn modify_rechecks_conflicts_excluding_itself() {
        let (engine, _) = engine();
        let doctor = RecordId::new();
        let a = engine
            .book(&RecordId::new(), request(doctor, "2026-06-03", "08:00"))
            .unwrap();
        let b = engine
            .book(&RecordId::new(), request(doctor, "2026-06-03", "08:15"))
            .unwrap();

        let err = engine
            .modify(
                &b.id,
                &doctor,
                AppointmentChanges {
                    time_slot: Some("08:00".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Notes-only edit keeps the slot it already holds.
        let edited = engine
            .modify(
                &a.id,
                &doctor,
                AppointmentChanges {
                    notes: Some("bring results".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(edited.time_slot.as_str(), "08:00");

        let moved = engine
            .modify(
                &b.id,
                &doctor,
                AppointmentChanges {
                    date: Some("2026-06-04".parse().unwrap()),
                    time_slot: Some("08:00".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(moved.date, "2026-06-04".parse::<NaiveDate>().unwrap());
    }

    /// Runs `interleave` once, just before the first appointment update reaches the store.
    struct Interleaved {
        inner: Arc<MemoryStore>,
        interleave: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl EntityStore for Interleaved {
        fn find<T: Record>(&self, query: &Query) -> CareResult<Vec<T>> {
            self.inner.find(query)
        }

        fn count<T: Record>(&self, query: &Query) -> CareResult<usize> {
            self.inner.count::<T>(query)
        }

        fn get<T: Record>(&self, id: &RecordId) -> CareResult<Option<T>> {
            self.inner.get(id)
        }

        fn create<T: Record>(&self, record: T) -> CareResult<T> {
            self.inner.create(record)
        }

        fn update_one<T, F>(&self, query: &Query, mutate: F) -> CareResult<Option<T>>
        where
            T: Record,
            F: FnOnce(&mut T) -> CareResult<()>,
        {
            if T::COLLECTION == Appointment::COLLECTION {
                let pending = self.interleave.lock().unwrap().take();
                if let Some(run) = pending {
                    run();
                }
            }
            self.inner.update_one(query, mutate)
        }

        fn delete_one<T: Record>(&self, query: &Query) -> CareResult<Option<T>> {
            self.inner.delete_one(query)
        }
    }

    #[test]
    fn notes_edit_does_not_revert_a_concurrent_move() {
        let inner = test_store();
        let direct = SchedulingEngine::new(test_cfg(), Arc::clone(&inner));
        let doctor = RecordId::new();
        let a = direct
            .book(&RecordId::new(), request(doctor, "2026-06-05", "08:00"))
            .unwrap();

        let other = direct.clone();
        let a_id = a.id;
        let store = Arc::new(Interleaved {
            inner: Arc::clone(&inner),
            interleave: Mutex::new(Some(Box::new(move || {
                other
                    .modify(
                        &a_id,
                        &doctor,
                        AppointmentChanges {
                            time_slot: Some("09:00".into()),
                            ..Default::default()
                        },
                    )
                    .expect("move should succeed");
                other
                    .book(&RecordId::new(), request(doctor, "2026-06-05", "08:00"))
                    .expect("freed slot should be bookable");
            }))),
        });
        let engine = SchedulingEngine::new(test_cfg(), store);

        let err = engine
            .modify(
                &a.id,
                &doctor,
                AppointmentChanges {
                    notes: Some("fasting".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let in_eight: Vec<Appointment> = inner
            .find(
                &Query::new()
                    .filter(Filter::eq("doctor_id", doctor))
                    .filter(Filter::eq("date", "2026-06-05".parse::<NaiveDate>().unwrap()))
                    .filter(Filter::eq("time_slot", "08:00"))
                    .filter(Filter::is_in(
                        "status",
                        AppointmentStatus::ACTIVE.map(|s| s.to_string()),
                    )),
            )
            .unwrap();
        assert_eq!(in_eight.len(), 1);
        assert_ne!(in_eight[0].id, a.id);

        let moved: Appointment = inner.get(&a.id).unwrap().unwrap();
        assert_eq!(moved.time_slot.as_str(), "09:00");
        assert_eq!(moved.notes, None);
    }

    #[test]
    fn calendar_and_patient_listing_are_ordered() {
        let (engine, _) = engine();
        let doctor = RecordId::new();
        let patient = RecordId::new();
        let late = engine
            .book(&patient, request(doctor, "2026-07-02", "09:00"))
            .unwrap();
        let early = engine
            .book(&patient, request(doctor, "2026-07-01", "14:00"))
            .unwrap();
        let morning = engine
            .book(&patient, request(doctor, "2026-07-01", "08:30"))
            .unwrap();

        let from: NaiveDate = "2026-07-01".parse().unwrap();
        let calendar = engine.calendar(&doctor, from, from).unwrap();
        let ids: Vec<RecordId> = calendar.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![morning.id, early.id]);

        assert!(engine
            .calendar(&doctor, "2026-07-02".parse().unwrap(), from)
            .is_err());

        let upcoming = engine
            .list_for_patient(&patient, None, Some("2026-07-02".parse().unwrap()))
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, late.id);
    }
}
