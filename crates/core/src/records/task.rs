use super::{wire_name_traits, WireName};
use crate::store::{FieldValue, Record};
use crate::{CareError, CareResult};
use care_types::NonEmptyText;
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CheckVitals,
    AdministerMedication,
    MonitorPatient,
    ReportStatus,
    Custom,
}

impl WireName for TaskType {
    const LABEL: &'static str = "task type";
    const ALL: &'static [Self] = &[
        TaskType::CheckVitals,
        TaskType::AdministerMedication,
        TaskType::MonitorPatient,
        TaskType::ReportStatus,
        TaskType::Custom,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TaskType::CheckVitals => "check_vitals",
            TaskType::AdministerMedication => "administer_medication",
            TaskType::MonitorPatient => "monitor_patient",
            TaskType::ReportStatus => "report_status",
            TaskType::Custom => "custom",
        }
    }
}

wire_name_traits!(TaskType);

/// Task urgency. Declaration order is rank order, so `Urgent` compares greatest.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl WireName for TaskPriority {
    const LABEL: &'static str = "task priority";
    const ALL: &'static [Self] = &[
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Urgent,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

wire_name_traits!(TaskPriority);

impl TaskPriority {
    pub fn rank(&self) -> i64 {
        match self {
            TaskPriority::Low => 0,
            TaskPriority::Medium => 1,
            TaskPriority::High => 2,
            TaskPriority::Urgent => 3,
        }
    }
}

/// Task lifecycle.
///
/// `pending -> in_progress -> completed`; any non-terminal status may move to `cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl WireName for TaskStatus {
    const LABEL: &'static str = "task status";
    const ALL: &'static [Self] = &[
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

wire_name_traits!(TaskStatus);

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Same-status updates are accepted so that notes can be amended without a move.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        *self == next
            || matches!(
                (*self, next),
                (Pending, InProgress) | (InProgress, Completed) | (Pending | InProgress, Cancelled)
            )
    }

    pub fn transition_to(&self, next: TaskStatus) -> CareResult<TaskStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CareError::InvalidTransition {
                entity: "task",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    pub title: NonEmptyText,
    pub description: NonEmptyText,
    pub patient_id: RecordId,
    pub nurse_id: RecordId,
    pub doctor_id: RecordId,
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_time: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Task {
    const COLLECTION: &'static str = "tasks";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "patient_id" => Some(self.patient_id.into()),
            "nurse_id" => Some(self.nurse_id.into()),
            "doctor_id" => Some(self.doctor_id.into()),
            "task_type" => Some(self.task_type.field_value()),
            "priority" => Some(self.priority.field_value()),
            "priority_rank" => Some(FieldValue::Int(self.priority.rank())),
            "status" => Some(self.status.field_value()),
            "due_time" => Some(self.due_time.into()),
            "created_at" => Some(self.created_at.into()),
            _ => None,
        }
    }
}

/// One entry in a nurse's append-only task audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    pub id: RecordId,
    pub nurse_id: RecordId,
    pub task_id: RecordId,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

impl TaskStatusEvent {
    pub fn new(task: &Task, status: TaskStatus, note: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            nurse_id: task.nurse_id,
            task_id: task.id,
            status,
            timestamp: Utc::now(),
            note: note.into(),
        }
    }
}

impl Record for TaskStatusEvent {
    const COLLECTION: &'static str = "task_status_events";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "nurse_id" => Some(self.nurse_id.into()),
            "task_id" => Some(self.task_id.into()),
            "status" => Some(self.status.field_value()),
            "timestamp" => Some(self.timestamp.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_urgent_first_when_descending() {
        let mut priorities = vec![
            TaskPriority::Medium,
            TaskPriority::Urgent,
            TaskPriority::Low,
            TaskPriority::High,
        ];
        priorities.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            priorities,
            vec![
                TaskPriority::Urgent,
                TaskPriority::High,
                TaskPriority::Medium,
                TaskPriority::Low
            ]
        );
        assert!(TaskPriority::Urgent.rank() > TaskPriority::High.rank());
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn status_machine_rejects_skips_and_reopening() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!(
            serde_json::to_value(TaskType::AdministerMedication).unwrap(),
            serde_json::json!("administer_medication")
        );
    }
}
