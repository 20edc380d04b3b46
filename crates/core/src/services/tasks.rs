//! Nursing tasks and the per-nurse audit trail.
//!
//! Every create, update and delete of a task appends a [`TaskStatusEvent`] to the
//! `task_status_events` collection, keyed by the task's nurse. Events are never updated or
//! removed. The append happens after the task mutation has committed; if it fails, the
//! mutation stands and the caller is told the audit trail is degraded.

use crate::constants::{TASK_CREATED_NOTE, TASK_DELETED_NOTE, TASK_UPDATED_NOTE};
use crate::identity::IdentityContext;
use crate::records::{Role, Task, TaskPriority, TaskStatus, TaskStatusEvent, TaskType};
use crate::store::{EntityStore, Filter, Query, Sort};
use crate::{CareError, CareResult};
use care_types::NonEmptyText;
use care_uuid::RecordId;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of appending to the audit trail.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuditStatus {
    Appended { event: TaskStatusEvent },
    Degraded { reason: String },
}

/// A committed task mutation together with what happened to its audit event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recorded<T> {
    pub record: T,
    pub audit: AuditStatus,
}

impl<T> Recorded<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self.audit, AuditStatus::Degraded { .. })
    }
}

#[derive(Clone, Debug)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub patient_id: RecordId,
    pub nurse_id: RecordId,
    pub task_type: TaskType,
    pub priority: Option<TaskPriority>,
    pub due_time: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Partial task update. `note` goes to the audit event, `notes` onto the task.
#[derive(Clone, Debug, Default)]
pub struct TaskChanges {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub note: Option<String>,
}

pub struct TaskEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for TaskEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> TaskEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Creates a pending task and appends its "Task created" event.
    pub fn create(&self, doctor_id: &RecordId, new: NewTask) -> CareResult<Recorded<Task>> {
        let now = Utc::now();
        let task = self.store.create(Task {
            id: RecordId::new(),
            title: NonEmptyText::new(&new.title)?,
            description: NonEmptyText::new(&new.description)?,
            patient_id: new.patient_id,
            nurse_id: new.nurse_id,
            doctor_id: *doctor_id,
            task_type: new.task_type,
            priority: new.priority.unwrap_or_default(),
            status: TaskStatus::Pending,
            due_time: new.due_time,
            completed_at: None,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        })?;
        tracing::info!(
            "created {} task {} for nurse {}",
            task.priority,
            task.id,
            task.nurse_id
        );

        let audit = self.append(TaskStatusEvent::new(
            &task,
            TaskStatus::Pending,
            TASK_CREATED_NOTE,
        ));
        Ok(Recorded { record: task, audit })
    }

    /// Updates a task the caller owns and appends an event with the resulting status.
    ///
    /// Moving to `completed` stamps `completed_at`.
    ///
    /// # Errors
    ///
    /// - [`CareError::NotFound`] if the task does not exist or the caller does not own it.
    /// - [`CareError::InvalidTransition`] for a status change the lifecycle forbids.
    pub fn update(
        &self,
        task_id: &RecordId,
        ctx: &IdentityContext,
        changes: TaskChanges,
    ) -> CareResult<Recorded<Task>> {
        let query = owned_task(task_id, ctx)?;
        let TaskChanges {
            status,
            priority,
            due_time,
            notes,
            note,
        } = changes;

        let task = self
            .store
            .update_one::<Task, _>(&query, |task| {
                let now = Utc::now();
                if let Some(next) = status {
                    task.status = task.status.transition_to(next)?;
                    if next == TaskStatus::Completed {
                        task.completed_at = Some(now);
                    }
                }
                if let Some(priority) = priority {
                    task.priority = priority;
                }
                if let Some(due_time) = due_time {
                    task.due_time = due_time;
                }
                if notes.is_some() {
                    task.notes = notes;
                }
                task.updated_at = now;
                Ok(())
            })?
            .ok_or_else(|| CareError::not_found("task"))?;
        tracing::info!("task {} is now {}", task.id, task.status);

        let note = note
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| TASK_UPDATED_NOTE.to_string());
        let audit = self.append(TaskStatusEvent::new(&task, task.status, note));
        Ok(Recorded { record: task, audit })
    }

    /// Removes a task and appends a "Task deleted" event with status `cancelled`.
    pub fn delete(&self, task_id: &RecordId, ctx: &IdentityContext) -> CareResult<Recorded<Task>> {
        let query = owned_task(task_id, ctx)?;
        let task: Task = self
            .store
            .delete_one(&query)?
            .ok_or_else(|| CareError::not_found("task"))?;
        tracing::info!("deleted task {}", task.id);

        let audit = self.append(TaskStatusEvent::new(
            &task,
            TaskStatus::Cancelled,
            TASK_DELETED_NOTE,
        ));
        Ok(Recorded { record: task, audit })
    }

    pub fn get(&self, task_id: &RecordId, ctx: &IdentityContext) -> CareResult<Task> {
        self.store
            .find_one(&owned_task(task_id, ctx)?)?
            .ok_or_else(|| CareError::not_found("task"))
    }

    /// Tasks due on `as_of` (UTC day), most urgent first, then earliest due.
    pub fn list_daily(&self, nurse_id: &RecordId, as_of: NaiveDate) -> CareResult<Vec<Task>> {
        let start = as_of.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = start
            .checked_add_days(Days::new(1))
            .ok_or_else(|| CareError::invalid(format!("date {as_of} is out of range")))?;

        self.store.find(
            &Query::new()
                .filter(Filter::eq("nurse_id", nurse_id))
                .filter(Filter::between("due_time", start, end))
                .sort_by(Sort::desc("priority_rank"))
                .sort_by(Sort::asc("due_time"))
                .sort_by(Sort::asc("id")),
        )
    }

    /// A nurse's audit trail between inclusive bounds, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::InvalidInput`] if `start` is after `end`.
    pub fn list_status_history(
        &self,
        nurse_id: &RecordId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> CareResult<Vec<TaskStatusEvent>> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(CareError::invalid(format!(
                    "history range starts after it ends ({start} > {end})"
                )));
            }
        }

        self.store.find(
            &Query::new()
                .filter(Filter::eq("nurse_id", nurse_id))
                .filter(Filter::within(
                    "timestamp",
                    start.map(Into::into),
                    end.map(Into::into),
                ))
                .sort_by(Sort::desc("timestamp")),
        )
    }

    /// Tasks a doctor has assigned, earliest due first.
    pub fn list_assigned_by_doctor(
        &self,
        doctor_id: &RecordId,
        status: Option<TaskStatus>,
    ) -> CareResult<Vec<Task>> {
        let mut query = Query::new().filter(Filter::eq("doctor_id", doctor_id));
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status.to_string()));
        }
        self.store.find(
            &query
                .sort_by(Sort::asc("due_time"))
                .sort_by(Sort::asc("id")),
        )
    }

    fn append(&self, event: TaskStatusEvent) -> AuditStatus {
        match self.store.create(event) {
            Ok(event) => AuditStatus::Appended { event },
            Err(err) => {
                tracing::error!("failed to append task audit event: {}", err);
                AuditStatus::Degraded {
                    reason: err.user_message(),
                }
            }
        }
    }
}

/// Scopes a task lookup to what the caller may touch.
///
/// Nurses reach the tasks assigned to them, doctors the tasks they created, administrators
/// any task. Patients reach none.
fn owned_task(task_id: &RecordId, ctx: &IdentityContext) -> CareResult<Query> {
    let query = Query::by_id(task_id);
    match ctx.role {
        Role::Nurse => Ok(query.filter(Filter::eq("nurse_id", ctx.actor_id))),
        Role::Doctor => Ok(query.filter(Filter::eq("doctor_id", ctx.actor_id))),
        Role::Admin => Ok(query),
        Role::Patient => Err(CareError::not_found("task")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldValue, MemoryStore, Record};
    use crate::test_support::test_store;
    use crate::ErrorKind;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn new_task(nurse_id: RecordId, priority: TaskPriority, due: DateTime<Utc>) -> NewTask {
        NewTask {
            title: "Obs".into(),
            description: "Routine observations".into(),
            patient_id: RecordId::new(),
            nurse_id,
            task_type: TaskType::CheckVitals,
            priority: Some(priority),
            due_time: due,
            notes: None,
        }
    }

    fn nurse_ctx(id: RecordId) -> IdentityContext {
        IdentityContext::new(id, Role::Nurse)
    }

    #[test]
    fn daily_list_sorts_by_priority_then_due_time() {
        let engine = TaskEngine::new(test_store());
        let doctor = RecordId::new();
        let nurse = RecordId::new();

        let high_nine = engine
            .create(&doctor, new_task(nurse, TaskPriority::High, at(10, 9)))
            .unwrap()
            .record;
        let urgent_ten = engine
            .create(&doctor, new_task(nurse, TaskPriority::Urgent, at(10, 10)))
            .unwrap()
            .record;
        let high_eight = engine
            .create(&doctor, new_task(nurse, TaskPriority::High, at(10, 8)))
            .unwrap()
            .record;
        // Outside the day, and another nurse's task.
        engine
            .create(&doctor, new_task(nurse, TaskPriority::Urgent, at(11, 0)))
            .unwrap();
        engine
            .create(&doctor, new_task(RecordId::new(), TaskPriority::Urgent, at(10, 7)))
            .unwrap();

        let day: NaiveDate = "2026-03-10".parse().unwrap();
        let daily = engine.list_daily(&nurse, day).unwrap();
        let ids: Vec<RecordId> = daily.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![urgent_ten.id, high_eight.id, high_nine.id]);

        // Repeated calls give the same order.
        let again: Vec<RecordId> = engine
            .list_daily(&nurse, day)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn audit_trail_is_complete_and_prior_events_never_change() {
        let store = test_store();
        let engine = TaskEngine::new(Arc::clone(&store));
        let doctor = RecordId::new();
        let nurse = RecordId::new();

        let created = engine
            .create(&doctor, new_task(nurse, TaskPriority::Medium, at(12, 9)))
            .unwrap();
        assert!(!created.is_degraded());
        let task_id = created.record.id;

        let snapshot_events = || -> Vec<serde_json::Value> {
            let events: Vec<TaskStatusEvent> = store
                .find(&Query::new().filter(Filter::eq("task_id", task_id)))
                .unwrap();
            events
                .iter()
                .map(|e| serde_json::to_value(e).unwrap())
                .collect()
        };
        let after_create = snapshot_events();

        engine
            .update(
                &task_id,
                &nurse_ctx(nurse),
                TaskChanges {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();
        let after_start = snapshot_events();
        assert_eq!(after_start[..1], after_create[..]);

        let completed = engine
            .update(
                &task_id,
                &nurse_ctx(nurse),
                TaskChanges {
                    status: Some(TaskStatus::Completed),
                    note: Some("Obs within range".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(completed.record.completed_at.is_some());
        let after_complete = snapshot_events();
        assert_eq!(after_complete[..2], after_start[..]);

        engine
            .delete(&task_id, &IdentityContext::new(doctor, Role::Doctor))
            .unwrap();
        let after_delete = snapshot_events();
        assert_eq!(after_delete[..3], after_complete[..]);

        let events: Vec<TaskStatusEvent> = store
            .find(
                &Query::new()
                    .filter(Filter::eq("task_id", task_id))
                    .sort_by(Sort::asc("timestamp")),
            )
            .unwrap();
        let trail: Vec<(TaskStatus, &str)> =
            events.iter().map(|e| (e.status, e.note.as_str())).collect();
        assert_eq!(
            trail,
            vec![
                (TaskStatus::Pending, TASK_CREATED_NOTE),
                (TaskStatus::InProgress, TASK_UPDATED_NOTE),
                (TaskStatus::Completed, "Obs within range"),
                (TaskStatus::Cancelled, TASK_DELETED_NOTE),
            ]
        );
        assert!(events.iter().all(|e| e.nurse_id == nurse));

        let history = engine.list_status_history(&nurse, None, None).unwrap();
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn illegal_and_unowned_updates_are_rejected() {
        let engine = TaskEngine::new(test_store());
        let doctor = RecordId::new();
        let nurse = RecordId::new();
        let task = engine
            .create(&doctor, new_task(nurse, TaskPriority::Low, at(12, 9)))
            .unwrap()
            .record;

        let skip = TaskChanges {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let err = engine
            .update(&task.id, &nurse_ctx(nurse), skip.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = engine
            .update(&task.id, &nurse_ctx(RecordId::new()), skip)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine
            .delete(&task.id, &IdentityContext::new(RecordId::new(), Role::Patient))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn history_rejects_inverted_range() {
        let engine = TaskEngine::new(test_store());
        let err = engine
            .list_status_history(&RecordId::new(), Some(at(12, 0)), Some(at(11, 0)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn assigned_by_doctor_filters_by_status() {
        let engine = TaskEngine::new(test_store());
        let doctor = RecordId::new();
        let nurse = RecordId::new();
        let later = engine
            .create(&doctor, new_task(nurse, TaskPriority::Low, at(14, 9)))
            .unwrap()
            .record;
        let sooner = engine
            .create(&doctor, new_task(nurse, TaskPriority::Low, at(13, 9)))
            .unwrap()
            .record;
        engine
            .update(
                &later.id,
                &nurse_ctx(nurse),
                TaskChanges {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap();

        let all: Vec<RecordId> = engine
            .list_assigned_by_doctor(&doctor, None)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(all, vec![sooner.id, later.id]);

        let pending = engine
            .list_assigned_by_doctor(&doctor, Some(TaskStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, sooner.id);
    }

    /// Delegates to a real store but refuses audit events.
    struct AuditOutage(Arc<MemoryStore>);

    impl EntityStore for AuditOutage {
        fn find<T: Record>(&self, query: &Query) -> CareResult<Vec<T>> {
            self.0.find(query)
        }

        fn count<T: Record>(&self, query: &Query) -> CareResult<usize> {
            self.0.count::<T>(query)
        }

        fn get<T: Record>(&self, id: &RecordId) -> CareResult<Option<T>> {
            self.0.get(id)
        }

        fn create<T: Record>(&self, record: T) -> CareResult<T> {
            if T::COLLECTION == TaskStatusEvent::COLLECTION {
                return Err(CareError::StoreUnavailable("audit collection offline".into()));
            }
            self.0.create(record)
        }

        fn update_one<T, F>(&self, query: &Query, mutate: F) -> CareResult<Option<T>>
        where
            T: Record,
            F: FnOnce(&mut T) -> CareResult<()>,
        {
            self.0.update_one(query, mutate)
        }

        fn delete_one<T: Record>(&self, query: &Query) -> CareResult<Option<T>> {
            self.0.delete_one(query)
        }
    }

    #[test]
    fn audit_failure_keeps_the_committed_mutation() {
        let inner = test_store();
        let engine = TaskEngine::new(Arc::new(AuditOutage(Arc::clone(&inner))));
        let nurse = RecordId::new();

        let created = engine
            .create(&RecordId::new(), new_task(nurse, TaskPriority::High, at(15, 9)))
            .expect("primary mutation should still succeed");
        assert!(created.is_degraded());
        match &created.audit {
            AuditStatus::Degraded { reason } => assert!(!reason.contains("offline")),
            other => panic!("expected degraded audit, got {other:?}"),
        }

        let stored: Option<Task> = inner.get(&created.record.id).unwrap();
        assert!(stored.is_some());
        assert_eq!(
            inner
                .count::<TaskStatusEvent>(
                    &Query::new().filter(Filter::eq("nurse_id", FieldValue::Id(nurse)))
                )
                .unwrap(),
            0
        );
    }
}
