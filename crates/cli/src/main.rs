use anyhow::Context;
use care_core::config::{
    flag_from_env_value, page_limit_from_env_value, slot_granularity_from_env_value,
    store_lock_timeout_from_env_value,
};
use care_core::constants::{DEFAULT_DATA_DIR, MAX_PAGE_LIMIT};
use care_core::records::{
    AppointmentStatus, Diagnosis, MedicalRecordStatus, Measurements, Medication,
    PrescriptionStatus, Role, TaskPriority, TaskStatus, TaskType,
};
use care_core::services::{
    AppointmentChanges, BookingRequest, DirectoryService, MedicalRecordChanges, NewMedicalRecord,
    NewPrescription, NewTask, PrescriptionFilter, TaskChanges,
};
use care_core::store::{snapshot, MemoryStore};
use care_core::{CareCoordinator, CoreConfig, IdentityContext, PageRequest};
use care_uuid::RecordId;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "care")]
#[command(about = "Clinical care coordination CLI")]
struct Cli {
    /// Id of the person making the call
    #[arg(long, global = true)]
    actor: Option<RecordId>,
    /// Role of the person making the call
    #[arg(long, global = true)]
    role: Option<Role>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the first administrator in an empty store
    BootstrapAdmin {
        email: String,
        first_name: String,
        last_name: String,
    },
    /// Register a person (admin)
    Register {
        email: String,
        /// admin, doctor, nurse or patient
        person_role: Role,
        first_name: String,
        last_name: String,
    },
    /// Create the patient profile for a registered person (admin)
    Admit {
        person_id: RecordId,
        patient_code: String,
    },
    /// Set a patient's assigned doctor (admin)
    AssignDoctor {
        patient_id: RecordId,
        doctor_id: RecordId,
    },
    /// Add a nurse to a patient's care team (admin)
    AssignNurse {
        patient_id: RecordId,
        nurse_id: RecordId,
    },
    /// Remove a nurse from a patient's care team (admin)
    UnassignNurse {
        patient_id: RecordId,
        nurse_id: RecordId,
    },
    /// Deactivate a person's account (admin)
    Deactivate { person_id: RecordId },
    /// List people (admin)
    People {
        #[arg(long)]
        person_role: Option<Role>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List the caller's connected patients (doctor or nurse)
    Patients {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show the clinicians connected to a patient
    CareTeam { patient_id: RecordId },
    /// Book an appointment (patient)
    Book {
        doctor_id: RecordId,
        date: NaiveDate,
        /// Start time as HH:MM
        time_slot: String,
        #[arg(long = "type")]
        appointment_type: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel one of the caller's appointments (patient)
    Cancel {
        appointment_id: RecordId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List the caller's appointments (patient)
    Appointments {
        #[arg(long)]
        status: Option<AppointmentStatus>,
        #[arg(long)]
        from: Option<NaiveDate>,
    },
    /// Edit the reason or notes of one of the caller's appointments (patient)
    UpdateAppointment {
        appointment_id: RecordId,
        /// Fields as JSON, e.g. '{"reason":"follow-up on results"}'
        fields: String,
    },
    /// Move an appointment or edit its notes (doctor)
    ModifyAppointment {
        appointment_id: RecordId,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Start time as HH:MM
        #[arg(long)]
        time_slot: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Approve a pending appointment (doctor)
    Approve { appointment_id: RecordId },
    /// Reject a pending appointment (doctor)
    Reject {
        appointment_id: RecordId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mark an appointment completed (doctor)
    Complete { appointment_id: RecordId },
    /// Show the caller's appointments between two dates (doctor)
    Calendar { from: NaiveDate, to: NaiveDate },
    /// Create a task for a nurse (doctor)
    CreateTask {
        patient_id: RecordId,
        nurse_id: RecordId,
        task_type: TaskType,
        title: String,
        description: String,
        /// RFC 3339 timestamp
        due_time: DateTime<Utc>,
        #[arg(long)]
        priority: Option<TaskPriority>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Update a task's status, priority, due time or notes
    UpdateTask {
        task_id: RecordId,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<TaskPriority>,
        #[arg(long)]
        due_time: Option<DateTime<Utc>>,
        #[arg(long)]
        notes: Option<String>,
        /// Note stored on the status history entry
        #[arg(long)]
        note: Option<String>,
    },
    /// Show one task
    Task { task_id: RecordId },
    /// Delete a task (doctor or admin)
    DeleteTask { task_id: RecordId },
    /// List the caller's tasks due up to a day (nurse)
    DailyTasks {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List the caller's task status history (nurse)
    TaskHistory {
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// List tasks the caller has assigned (doctor)
    AssignedTasks {
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Record vital signs for a patient (nurse)
    RecordVitals {
        patient_id: RecordId,
        /// Measurements as JSON, e.g. '{"heart_rate":72}'
        measurements: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Replace the measurements of a reading the caller took (nurse)
    UpdateVitals {
        vital_id: RecordId,
        /// Measurements as JSON, e.g. '{"temperature":37.5}'
        measurements: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List a patient's vital signs
    Vitals {
        patient_id: RecordId,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Prescribe a medication (doctor)
    Prescribe {
        patient_id: RecordId,
        /// Medication as JSON with name, dosage and frequency
        medication: String,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long, default_value_t = 0)]
        refills: u32,
    },
    /// List a patient's prescriptions
    Prescriptions {
        patient_id: RecordId,
        #[arg(long)]
        status: Option<PrescriptionStatus>,
        /// Include every status
        #[arg(long)]
        all: bool,
    },
    /// Open a medical record (doctor, or nurse on a doctor's behalf)
    CreateMedicalRecord {
        patient_id: RecordId,
        /// Doctor a nurse writes for; defaults to the patient's assigned doctor
        #[arg(long)]
        on_behalf_of: Option<RecordId>,
        #[arg(long)]
        diagnosis: Option<String>,
        #[arg(long = "symptom")]
        symptoms: Vec<String>,
        #[arg(long)]
        treatment: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        status: Option<MedicalRecordStatus>,
    },
    /// Amend a medical record (doctor, or connected nurse)
    UpdateMedicalRecord {
        record_id: RecordId,
        #[arg(long)]
        diagnosis: Option<String>,
        #[arg(long = "symptom")]
        symptoms: Vec<String>,
        #[arg(long)]
        treatment: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        follow_up_date: Option<NaiveDate>,
        #[arg(long)]
        status: Option<MedicalRecordStatus>,
    },
    /// List a patient's medical records by visit date
    MedicalRecords {
        patient_id: RecordId,
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// List diagnoses kept on the patient document by older deployments
    LegacyDiagnoses { patient_id: RecordId },
}

impl Commands {
    fn mutates(&self) -> bool {
        !matches!(
            self,
            Commands::People { .. }
                | Commands::Patients { .. }
                | Commands::CareTeam { .. }
                | Commands::Appointments { .. }
                | Commands::Calendar { .. }
                | Commands::DailyTasks { .. }
                | Commands::TaskHistory { .. }
                | Commands::AssignedTasks { .. }
                | Commands::Vitals { .. }
                | Commands::Prescriptions { .. }
                | Commands::Task { .. }
                | Commands::MedicalRecords { .. }
                | Commands::LegacyDiagnoses { .. }
        )
    }
}

/// Builds the core configuration from `CARE_*` environment variables.
///
/// # Environment Variables
/// - `CARE_DATA_DIR`: directory holding the store snapshot (default: "care_data")
/// - `CARE_PAGE_LIMIT`: default page size
/// - `CARE_SLOT_MINUTES`: appointment slot granularity in minutes
/// - `CARE_STORE_TIMEOUT_MS`: how long a store call waits for the lock
/// - `CARE_ENFORCE_TASK_RELATIONSHIP`: require task nurses to be on the patient's care team
fn config_from_env() -> anyhow::Result<CoreConfig> {
    let data_dir = std::env::var("CARE_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let page_limit = page_limit_from_env_value(std::env::var("CARE_PAGE_LIMIT").ok())?;
    let cfg = CoreConfig::new(
        PathBuf::from(data_dir),
        page_limit,
        MAX_PAGE_LIMIT.max(page_limit),
        slot_granularity_from_env_value(std::env::var("CARE_SLOT_MINUTES").ok())?,
        store_lock_timeout_from_env_value(std::env::var("CARE_STORE_TIMEOUT_MS").ok())?,
        flag_from_env_value(std::env::var("CARE_ENFORCE_TASK_RELATIONSHIP").ok(), true)?,
    )?;
    Ok(cfg)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("care=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'care --help' for commands");
        return Ok(());
    };

    let cfg = Arc::new(config_from_env()?);
    let snapshot_path = cfg.snapshot_path();
    let store = Arc::new(
        snapshot::load_or_empty(&snapshot_path, cfg.store_lock_timeout())
            .with_context(|| format!("loading {}", snapshot_path.display()))?,
    );

    let mutates = command.mutates();
    if let Commands::BootstrapAdmin {
        email,
        first_name,
        last_name,
    } = &command
    {
        let directory = DirectoryService::new(Arc::clone(&store));
        let admins = directory.list_people(Some(Role::Admin), None, PageRequest::first(&cfg))?;
        if admins.total > 0 {
            anyhow::bail!("an administrator already exists");
        }
        let admin = directory.register_person(email, Role::Admin, first_name, last_name)?;
        print_json(&admin)?;
    } else {
        let (Some(actor), Some(role)) = (cli.actor, cli.role) else {
            anyhow::bail!("--actor and --role are required for this command");
        };
        tracing::debug!("acting as {role} {actor}");
        let ctx = IdentityContext::new(actor, role);
        let coordinator = CareCoordinator::new(Arc::clone(&cfg), Arc::clone(&store));
        run(&coordinator, &ctx, command)?;
    }

    if mutates {
        snapshot::save(&store, &snapshot_path)?;
    }
    Ok(())
}

fn run(
    coordinator: &CareCoordinator<MemoryStore>,
    ctx: &IdentityContext,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::BootstrapAdmin { .. } => anyhow::bail!("bootstrap-admin takes no identity"),
        Commands::Register {
            email,
            person_role,
            first_name,
            last_name,
        } => print_json(&coordinator.register_person(
            ctx,
            &email,
            person_role,
            &first_name,
            &last_name,
        )?),
        Commands::Admit {
            person_id,
            patient_code,
        } => print_json(&coordinator.admit_patient(ctx, &person_id, &patient_code)?),
        Commands::AssignDoctor {
            patient_id,
            doctor_id,
        } => print_json(&coordinator.assign_doctor(ctx, &patient_id, &doctor_id)?),
        Commands::AssignNurse {
            patient_id,
            nurse_id,
        } => print_json(&coordinator.assign_nurse(ctx, &patient_id, &nurse_id)?),
        Commands::UnassignNurse {
            patient_id,
            nurse_id,
        } => print_json(&coordinator.unassign_nurse(ctx, &patient_id, &nurse_id)?),
        Commands::Deactivate { person_id } => {
            print_json(&coordinator.deactivate_person(ctx, &person_id)?)
        }
        Commands::People {
            person_role,
            search,
            page,
            limit,
        } => print_json(&coordinator.list_people(
            ctx,
            person_role,
            search.as_deref(),
            page,
            limit,
        )?),
        Commands::Patients {
            search,
            page,
            limit,
        } => print_json(&coordinator.list_connected_patients(
            ctx,
            search.as_deref(),
            page,
            limit,
        )?),
        Commands::CareTeam { patient_id } => {
            print_json(&coordinator.care_team(ctx, &patient_id)?)
        }
        Commands::Book {
            doctor_id,
            date,
            time_slot,
            appointment_type,
            reason,
            notes,
        } => print_json(&coordinator.book_appointment(
            ctx,
            BookingRequest {
                doctor_id: Some(doctor_id),
                date: Some(date),
                time_slot: Some(time_slot),
                appointment_type,
                reason,
                notes,
            },
        )?),
        Commands::Cancel {
            appointment_id,
            reason,
        } => print_json(&coordinator.cancel_appointment(ctx, &appointment_id, reason)?),
        Commands::Appointments { status, from } => {
            print_json(&coordinator.my_appointments(ctx, status, from)?)
        }
        Commands::UpdateAppointment {
            appointment_id,
            fields,
        } => {
            let fields: Map<String, Value> =
                serde_json::from_str(&fields).context("parsing appointment fields")?;
            print_json(&coordinator.update_appointment(ctx, &appointment_id, &fields)?)
        }
        Commands::ModifyAppointment {
            appointment_id,
            date,
            time_slot,
            notes,
        } => print_json(&coordinator.modify_appointment(
            ctx,
            &appointment_id,
            AppointmentChanges {
                date,
                time_slot,
                notes,
            },
        )?),
        Commands::Approve { appointment_id } => {
            print_json(&coordinator.approve_appointment(ctx, &appointment_id)?)
        }
        Commands::Reject {
            appointment_id,
            reason,
        } => print_json(&coordinator.reject_appointment(ctx, &appointment_id, reason)?),
        Commands::Complete { appointment_id } => {
            print_json(&coordinator.complete_appointment(ctx, &appointment_id)?)
        }
        Commands::Calendar { from, to } => {
            print_json(&coordinator.doctor_calendar(ctx, from, to)?)
        }
        Commands::CreateTask {
            patient_id,
            nurse_id,
            task_type,
            title,
            description,
            due_time,
            priority,
            notes,
        } => print_json(&coordinator.create_task(
            ctx,
            NewTask {
                title,
                description,
                patient_id,
                nurse_id,
                task_type,
                priority,
                due_time,
                notes,
            },
        )?),
        Commands::UpdateTask {
            task_id,
            status,
            priority,
            due_time,
            notes,
            note,
        } => print_json(&coordinator.update_task(
            ctx,
            &task_id,
            TaskChanges {
                status,
                priority,
                due_time,
                notes,
                note,
            },
        )?),
        Commands::Task { task_id } => print_json(&coordinator.task_details(ctx, &task_id)?),
        Commands::DeleteTask { task_id } => print_json(&coordinator.delete_task(ctx, &task_id)?),
        Commands::DailyTasks { date } => {
            let as_of = date.unwrap_or_else(|| Utc::now().date_naive());
            print_json(&coordinator.list_daily_tasks(ctx, as_of)?)
        }
        Commands::TaskHistory { start, end } => {
            print_json(&coordinator.list_task_status_history(ctx, start, end)?)
        }
        Commands::AssignedTasks { status } => {
            print_json(&coordinator.list_assigned_tasks(ctx, status)?)
        }
        Commands::RecordVitals {
            patient_id,
            measurements,
            notes,
        } => {
            let measurements: Measurements =
                serde_json::from_str(&measurements).context("parsing measurements")?;
            print_json(&coordinator.record_vitals(ctx, &patient_id, measurements, notes)?)
        }
        Commands::UpdateVitals {
            vital_id,
            measurements,
            notes,
        } => {
            let measurements: Measurements =
                serde_json::from_str(&measurements).context("parsing measurements")?;
            print_json(&coordinator.update_vitals(ctx, &vital_id, measurements, notes)?)
        }
        Commands::Vitals {
            patient_id,
            page,
            limit,
        } => print_json(&coordinator.patient_vitals(ctx, &patient_id, page, limit)?),
        Commands::Prescribe {
            patient_id,
            medication,
            start_date,
            end_date,
            refills,
        } => {
            let medication: Medication =
                serde_json::from_str(&medication).context("parsing medication")?;
            print_json(&coordinator.prescribe(
                ctx,
                &patient_id,
                NewPrescription {
                    medication,
                    start_date,
                    end_date,
                    refills,
                },
            )?)
        }
        Commands::Prescriptions {
            patient_id,
            status,
            all,
        } => {
            let filter = match (all, status) {
                (true, _) => PrescriptionFilter::All,
                (false, Some(status)) => PrescriptionFilter::Status(status),
                (false, None) => PrescriptionFilter::Active,
            };
            print_json(&coordinator.list_prescriptions(ctx, &patient_id, filter)?)
        }
        Commands::CreateMedicalRecord {
            patient_id,
            on_behalf_of,
            diagnosis,
            symptoms,
            treatment,
            notes,
            status,
        } => print_json(&coordinator.create_medical_record(
            ctx,
            &patient_id,
            on_behalf_of,
            NewMedicalRecord {
                diagnosis: Diagnosis {
                    primary: diagnosis,
                    secondary: Vec::new(),
                },
                symptoms,
                treatment,
                notes,
                status,
                ..Default::default()
            },
        )?),
        Commands::UpdateMedicalRecord {
            record_id,
            diagnosis,
            symptoms,
            treatment,
            notes,
            follow_up_date,
            status,
        } => print_json(&coordinator.update_medical_record(
            ctx,
            &record_id,
            MedicalRecordChanges {
                diagnosis: diagnosis.map(|primary| Diagnosis {
                    primary: Some(primary),
                    secondary: Vec::new(),
                }),
                symptoms: (!symptoms.is_empty()).then_some(symptoms),
                treatment,
                notes,
                follow_up_date,
                status,
            },
        )?),
        Commands::MedicalRecords {
            patient_id,
            from,
            to,
            page,
            limit,
        } => print_json(&coordinator.list_medical_records(
            ctx,
            &patient_id,
            from,
            to,
            page,
            limit,
        )?),
        Commands::LegacyDiagnoses { patient_id } => {
            print_json(&coordinator.legacy_diagnoses(ctx, &patient_id)?)
        }
    }
}
