//! Persistence boundary.
//!
//! The core never talks to a database directly. Everything it reads or writes goes through
//! [`EntityStore`], a document-store style interface with structured queries. The crate ships
//! one adapter, [`MemoryStore`], which backs the tests and the CLI and can be snapshotted to
//! disk; production deployments are expected to provide their own.
//!
//! Store adapters are responsible for:
//! - per-record atomicity of `update_one` / `delete_one` (the closure runs under the store's
//!   write lock, so read-modify-write cannot interleave with another writer),
//! - the uniqueness constraints declared by [`Record::unique_keys`],
//! - surfacing timeouts and transient failures as [`crate::CareError::StoreUnavailable`].

pub mod memory;
pub mod query;
pub mod snapshot;

pub use memory::MemoryStore;
pub use query::{Direction, FieldValue, Filter, Query, Sort};

use crate::CareResult;
use care_uuid::RecordId;
use serde::{de::DeserializeOwned, Serialize};

/// A document that lives in a named store collection.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name. Must be unique across record types.
    const COLLECTION: &'static str;

    fn id(&self) -> &RecordId;

    /// Queryable view of a field by name. Unknown fields return `None`.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// `(constraint, value)` pairs that must be unique within the collection.
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Document-store interface consumed by the core.
pub trait EntityStore: Send + Sync {
    /// All records matching `query`, sorted and windowed.
    fn find<T: Record>(&self, query: &Query) -> CareResult<Vec<T>>;

    /// Number of records matching `query`'s filters, ignoring its window.
    fn count<T: Record>(&self, query: &Query) -> CareResult<usize>;

    fn get<T: Record>(&self, id: &RecordId) -> CareResult<Option<T>>;

    /// Inserts a new record.
    ///
    /// Fails with `Conflict` if the id or any unique key is already taken.
    fn create<T: Record>(&self, record: T) -> CareResult<T>;

    /// Atomically applies `mutate` to the first record matching `query`.
    ///
    /// Returns `Ok(None)` when nothing matches. If `mutate` returns an error, nothing is
    /// written and the error is propagated.
    fn update_one<T, F>(&self, query: &Query, mutate: F) -> CareResult<Option<T>>
    where
        T: Record,
        F: FnOnce(&mut T) -> CareResult<()>;

    /// Atomically removes and returns the first record matching `query`.
    fn delete_one<T: Record>(&self, query: &Query) -> CareResult<Option<T>>;

    fn find_one<T: Record>(&self, query: &Query) -> CareResult<Option<T>> {
        let mut query = query.clone();
        query.limit = Some(1);
        Ok(self.find::<T>(&query)?.into_iter().next())
    }

    fn update_by_id<T, F>(&self, id: &RecordId, mutate: F) -> CareResult<Option<T>>
    where
        T: Record,
        F: FnOnce(&mut T) -> CareResult<()>,
    {
        self.update_one(&Query::by_id(id), mutate)
    }

    fn delete_by_id<T: Record>(&self, id: &RecordId) -> CareResult<Option<T>> {
        self.delete_one::<T>(&Query::by_id(id))
    }
}
