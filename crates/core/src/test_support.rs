//! Shared fixtures for unit tests.

use crate::config::CoreConfig;
use crate::records::{Patient, Person, Role};
use crate::services::DirectoryService;
use crate::store::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) fn test_cfg() -> Arc<CoreConfig> {
    Arc::new(
        CoreConfig::new(
            PathBuf::from("/tmp/care-test-unused"),
            10,
            100,
            15,
            Duration::from_millis(500),
            true,
        )
        .expect("CoreConfig::new should succeed"),
    )
}

pub(crate) fn test_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Duration::from_millis(500)))
}

static SEQ: AtomicUsize = AtomicUsize::new(0);

/// A store pre-seeded through the directory service.
pub(crate) struct Ward {
    pub store: Arc<MemoryStore>,
    pub directory: DirectoryService<MemoryStore>,
}

impl Ward {
    pub fn new() -> Self {
        let store = test_store();
        Self {
            directory: DirectoryService::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn person(&self, role: Role, first: &str, last: &str) -> Person {
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        let email = format!("{}.{}.{n}@ward.test", first.to_lowercase(), last.to_lowercase());
        self.directory
            .register_person(&email, role, first, last)
            .expect("register_person should succeed")
    }

    pub fn doctor(&self, last: &str) -> Person {
        self.person(Role::Doctor, "Doc", last)
    }

    pub fn nurse(&self, last: &str) -> Person {
        self.person(Role::Nurse, "Nurse", last)
    }

    /// Registers a patient-role person and admits them.
    pub fn patient(&self, first: &str, last: &str) -> (Person, Patient) {
        let person = self.person(Role::Patient, first, last);
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        let patient = self
            .directory
            .admit_patient(&person.id, &format!("P-{n:05}"))
            .expect("admit_patient should succeed");
        (person, patient)
    }
}
