//! Domain services.
//!
//! Each service owns one area of behaviour and talks to the store through
//! [`crate::store::EntityStore`]. None of them checks who is calling beyond ownership
//! filters on the records themselves; role gating lives in [`crate::CareCoordinator`].

pub mod directory;
pub mod documents;
pub mod relationships;
pub mod scheduling;
pub mod tasks;
pub mod vitals;

pub use directory::DirectoryService;
pub use documents::{
    DocumentService, MedicalRecordChanges, NewMedicalRecord, NewPrescription, PrescriptionFilter,
};
pub use relationships::{
    CareTeamMember, ConnectedPatient, ContactDetails, Provenance, RelationshipResolver,
};
pub use scheduling::{AppointmentChanges, BookingRequest, SchedulingEngine, SlotKey, SlotLocks};
pub use tasks::{AuditStatus, NewTask, Recorded, TaskChanges, TaskEngine};
pub use vitals::{VitalReading, VitalSource, VitalsService};
