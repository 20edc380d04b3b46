use super::{wire_name_traits, WireName};
use crate::store::{FieldValue, Record};
use care_types::{EmailAddress, NonEmptyText};
use care_uuid::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System role of a person. Only an administrator changes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Patient,
}

impl WireName for Role {
    const LABEL: &'static str = "role";
    const ALL: &'static [Self] = &[Role::Admin, Role::Doctor, Role::Nurse, Role::Patient];

    fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
        }
    }
}

wire_name_traits!(Role);

impl Role {
    pub fn is_clinician(&self) -> bool {
        matches!(self, Role::Doctor | Role::Nurse)
    }
}

/// A registered user of the system.
///
/// People are deactivated, never deleted, so that references from appointments and tasks
/// stay resolvable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: RecordId,
    pub email: EmailAddress,
    pub role: Role,
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    pub active: bool,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn new(
        email: EmailAddress,
        role: Role,
        first_name: NonEmptyText,
        last_name: NonEmptyText,
    ) -> Self {
        Self {
            id: RecordId::new(),
            email,
            role,
            first_name,
            last_name,
            active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Record for Person {
    const COLLECTION: &'static str = "persons";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "email" => Some(self.email.as_str().into()),
            "role" => Some(self.role.field_value()),
            "first_name" => Some(self.first_name.as_str().into()),
            "last_name" => Some(self.last_name.as_str().into()),
            "active" => Some(self.active.into()),
            "created_at" => Some(self.created_at.into()),
            _ => None,
        }
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("email", self.email.as_str().to_string())]
    }
}
