use super::{wire_name_traits, WireName};
use crate::store::{FieldValue, Record};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentType {
    #[serde(rename = "consultation")]
    Consultation,
    #[serde(rename = "follow-up")]
    FollowUp,
    #[serde(rename = "emergency")]
    Emergency,
}

impl WireName for AppointmentType {
    const LABEL: &'static str = "appointment type";
    const ALL: &'static [Self] = &[
        AppointmentType::Consultation,
        AppointmentType::FollowUp,
        AppointmentType::Emergency,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Consultation => "consultation",
            AppointmentType::FollowUp => "follow-up",
            AppointmentType::Emergency => "emergency",
        }
    }
}

wire_name_traits!(AppointmentType);

/// Appointment lifecycle.
///
/// `pending -> confirmed -> completed`, and `pending | confirmed -> cancelled`.
/// `completed` and `cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl WireName for AppointmentStatus {
    const LABEL: &'static str = "appointment status";
    const ALL: &'static [Self] = &[
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

wire_name_traits!(AppointmentStatus);

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 2] =
        [AppointmentStatus::Pending, AppointmentStatus::Confirmed];
    pub const TERMINAL: [AppointmentStatus; 2] =
        [AppointmentStatus::Completed, AppointmentStatus::Cancelled];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirmed) | (Confirmed, Completed) | (Pending | Confirmed, Cancelled)
        )
    }

    /// Checks `self -> next` against the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::InvalidTransition`] if the move is not allowed.
    pub fn transition_to(&self, next: AppointmentStatus) -> CareResult<AppointmentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CareError::InvalidTransition {
                entity: "appointment",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// An `HH:MM` slot label on the booking grid.
///
/// Labels are zero-padded, so lexical order is chronological order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSlot(String);

impl TimeSlot {
    /// Parses `input` and checks it sits on a `granularity_minutes` grid.
    ///
    /// # Errors
    ///
    /// Returns [`CareError::InvalidInput`] for anything other than a zero-padded 24-hour
    /// `HH:MM` whose minutes are a multiple of the granularity.
    pub fn parse(input: &str, granularity_minutes: u32) -> CareResult<Self> {
        let trimmed = input.trim();
        let malformed = || CareError::invalid(format!("time slot '{input}' must be HH:MM"));

        let (hours, minutes) = trimmed.split_once(':').ok_or_else(malformed)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(hours) || !two_digits(minutes) {
            return Err(malformed());
        }
        let hours: u32 = hours.parse().map_err(|_| malformed())?;
        let minutes: u32 = minutes.parse().map_err(|_| malformed())?;
        if hours > 23 || minutes > 59 {
            return Err(malformed());
        }
        if granularity_minutes == 0 || minutes % granularity_minutes != 0 {
            return Err(CareError::invalid(format!(
                "time slot '{input}' is not on the {granularity_minutes}-minute grid"
            )));
        }

        Ok(Self(format!("{hours:02}:{minutes:02}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Cancels the appointment, stamping when and why.
    pub fn cancel(&mut self, reason: String, at: DateTime<Utc>) -> CareResult<()> {
        self.status = self.status.transition_to(AppointmentStatus::Cancelled)?;
        self.cancelled_at = Some(at);
        self.cancellation_reason = Some(reason);
        self.updated_at = at;
        Ok(())
    }
}

impl Record for Appointment {
    const COLLECTION: &'static str = "appointments";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "patient_id" => Some(self.patient_id.into()),
            "doctor_id" => Some(self.doctor_id.into()),
            "date" => Some(self.date.into()),
            "time_slot" => Some(self.time_slot.as_str().into()),
            "type" => Some(self.appointment_type.field_value()),
            "status" => Some(self.status.field_value()),
            "created_at" => Some(self.created_at.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_allows_only_forward_moves() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));

        let err = Completed.transition_to(Confirmed).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[test]
    fn time_slots_must_sit_on_the_grid() {
        assert_eq!(TimeSlot::parse("09:45", 15).unwrap().as_str(), "09:45");
        assert_eq!(TimeSlot::parse(" 14:00 ", 30).unwrap().as_str(), "14:00");

        assert!(TimeSlot::parse("09:40", 15).is_err());
        assert!(TimeSlot::parse("9:45", 15).is_err());
        assert!(TimeSlot::parse("24:00", 15).is_err());
        assert!(TimeSlot::parse("noon", 15).is_err());
    }

    #[test]
    fn type_uses_hyphenated_wire_name() {
        let parsed: AppointmentType = "follow-up".parse().unwrap();
        assert_eq!(parsed, AppointmentType::FollowUp);
        assert_eq!(
            serde_json::to_value(parsed).unwrap(),
            serde_json::json!("follow-up")
        );
        assert!("checkup".parse::<AppointmentType>().is_err());
    }
}
