//! In-process reference implementation of [`EntityStore`].
//!
//! Documents are held as `serde_json::Value` per collection, in insertion order, which is
//! what a document database hands back to the core anyway. All collections share one
//! `RwLock`: listings take the read side and run concurrently, every mutation takes the write
//! side, which is what makes `update_one` / `delete_one` atomic per record.
//!
//! Lock acquisition is bounded by the configured timeout. A timed-out or poisoned lock is
//! reported as [`CareError::StoreUnavailable`] so callers can retry.

use super::query::{FieldValue, Query};
use super::snapshot::{SnapshotRow, UniqueKey};
use super::{EntityStore, Record};
use crate::{CareError, CareResult};
use care_uuid::RecordId;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub(crate) struct StoredRow {
    pub(crate) id: RecordId,
    pub(crate) unique: Vec<UniqueKey>,
    pub(crate) document: Value,
}

#[derive(Debug, Default)]
pub(crate) struct CollectionData {
    next_seq: u64,
    rows: BTreeMap<u64, StoredRow>,
    ids: HashMap<RecordId, u64>,
    unique: HashMap<UniqueKey, RecordId>,
}

impl CollectionData {
    fn insert_row(&mut self, name: &str, row: StoredRow) -> CareResult<()> {
        if self.ids.contains_key(&row.id) {
            return Err(CareError::Conflict(format!(
                "{name} record {} already exists",
                row.id
            )));
        }
        self.check_unique(name, &row.id, &row.unique)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.ids.insert(row.id, seq);
        for key in &row.unique {
            self.unique.insert(key.clone(), row.id);
        }
        self.rows.insert(seq, row);
        Ok(())
    }

    fn check_unique(&self, name: &str, id: &RecordId, keys: &[UniqueKey]) -> CareResult<()> {
        for key in keys {
            if let Some(owner) = self.unique.get(key) {
                if owner != id {
                    return Err(CareError::Conflict(format!(
                        "{name} {} '{}' is already in use",
                        key.constraint, key.value
                    )));
                }
            }
        }
        Ok(())
    }

    fn remove_row(&mut self, seq: u64) -> Option<StoredRow> {
        let row = self.rows.remove(&seq)?;
        self.ids.remove(&row.id);
        for key in &row.unique {
            self.unique.remove(key);
        }
        Some(row)
    }

    /// First row (in insertion order) whose typed record matches `query`.
    fn first_match<T: Record>(&self, query: &Query) -> CareResult<Option<(u64, T)>> {
        // Fast path: an id filter pins the row without scanning.
        if let Some(id) = pinned_id(query) {
            let Some(seq) = self.ids.get(&id) else {
                return Ok(None);
            };
            let record: T = decode(&self.rows[seq].document)?;
            return Ok(query
                .matches(&|name| accessor(&record, name))
                .then_some((*seq, record)));
        }

        for (seq, row) in &self.rows {
            let record: T = decode(&row.document)?;
            if query.matches(&|name| accessor(&record, name)) {
                return Ok(Some((*seq, record)));
            }
        }
        Ok(None)
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &StoredRow> {
        self.rows.values()
    }
}

type Collections = HashMap<String, CollectionData>;

/// Thread-safe in-memory document store.
#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Rebuilds a store from snapshot rows, re-checking ids and unique keys.
    pub(crate) fn from_rows(
        collections: BTreeMap<String, Vec<SnapshotRow>>,
        lock_timeout: Duration,
    ) -> CareResult<Self> {
        let mut data: Collections = HashMap::new();
        for (name, rows) in collections {
            let collection = data.entry(name.clone()).or_default();
            for row in rows {
                collection.insert_row(
                    &name,
                    StoredRow {
                        id: row.id,
                        unique: row.unique,
                        document: row.document,
                    },
                )?;
            }
        }

        Ok(Self {
            collections: RwLock::new(data),
            lock_timeout,
        })
    }

    /// Copies every collection out in insertion order.
    pub(crate) fn export_rows(&self) -> CareResult<BTreeMap<String, Vec<SnapshotRow>>> {
        let guard = self.read()?;
        Ok(guard
            .iter()
            .map(|(name, collection)| {
                let rows = collection
                    .rows()
                    .map(|row| SnapshotRow {
                        id: row.id,
                        unique: row.unique.clone(),
                        document: row.document.clone(),
                    })
                    .collect();
                (name.clone(), rows)
            })
            .collect())
    }

    fn read(&self) -> CareResult<RwLockReadGuard<'_, Collections>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.collections.try_read() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(CareError::StoreUnavailable("store lock poisoned".into()))
                }
                Err(TryLockError::WouldBlock) => self.wait_until(deadline)?,
            }
        }
    }

    fn write(&self) -> CareResult<RwLockWriteGuard<'_, Collections>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.collections.try_write() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(CareError::StoreUnavailable("store lock poisoned".into()))
                }
                Err(TryLockError::WouldBlock) => self.wait_until(deadline)?,
            }
        }
    }

    fn wait_until(&self, deadline: Instant) -> CareResult<()> {
        if Instant::now() >= deadline {
            tracing::warn!(
                "store lock not acquired within {:?}; reporting unavailable",
                self.lock_timeout
            );
            return Err(CareError::StoreUnavailable(format!(
                "timed out after {:?} waiting for store lock",
                self.lock_timeout
            )));
        }
        std::thread::sleep(Duration::from_micros(50));
        Ok(())
    }
}

fn decode<T: Record>(document: &Value) -> CareResult<T> {
    T::deserialize(document).map_err(CareError::Deserialization)
}

fn encode<T: Record>(record: &T) -> CareResult<StoredRow> {
    let document = serde_json::to_value(record).map_err(CareError::Serialization)?;
    Ok(StoredRow {
        id: *record.id(),
        unique: unique_keys(record),
        document,
    })
}

fn unique_keys<T: Record>(record: &T) -> Vec<UniqueKey> {
    record
        .unique_keys()
        .into_iter()
        .map(|(constraint, value)| UniqueKey {
            constraint: constraint.to_string(),
            value,
        })
        .collect()
}

/// Serves `id` from the record itself so that individual records need not.
fn accessor<T: Record>(record: &T, name: &str) -> Option<FieldValue> {
    if name == "id" {
        return Some(FieldValue::Id(*record.id()));
    }
    record.field(name)
}

fn pinned_id(query: &Query) -> Option<RecordId> {
    query.filters.iter().find_map(|f| match f {
        super::query::Filter::Eq("id", FieldValue::Id(id)) => Some(*id),
        _ => None,
    })
}

impl EntityStore for MemoryStore {
    fn find<T: Record>(&self, query: &Query) -> CareResult<Vec<T>> {
        let mut matched: Vec<T> = {
            let guard = self.read()?;
            let Some(collection) = guard.get(T::COLLECTION) else {
                return Ok(Vec::new());
            };

            let mut matched = Vec::new();
            for row in collection.rows() {
                let record: T = decode(&row.document)?;
                if query.matches(&|name| accessor(&record, name)) {
                    matched.push(record);
                }
            }
            matched
        };

        if !query.sort.is_empty() {
            // Stable: equal keys keep insertion order.
            matched.sort_by(|a, b| {
                query.compare(&|name| accessor(a, name), &|name| accessor(b, name))
            });
        }

        let window = matched.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => window.take(limit).collect(),
            None => window.collect(),
        })
    }

    fn count<T: Record>(&self, query: &Query) -> CareResult<usize> {
        let guard = self.read()?;
        let Some(collection) = guard.get(T::COLLECTION) else {
            return Ok(0);
        };

        let mut count = 0;
        for row in collection.rows() {
            let record: T = decode(&row.document)?;
            if query.matches(&|name| accessor(&record, name)) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn get<T: Record>(&self, id: &RecordId) -> CareResult<Option<T>> {
        let guard = self.read()?;
        let Some(collection) = guard.get(T::COLLECTION) else {
            return Ok(None);
        };
        match collection.ids.get(id) {
            Some(seq) => decode(&collection.rows[seq].document).map(Some),
            None => Ok(None),
        }
    }

    fn create<T: Record>(&self, record: T) -> CareResult<T> {
        let row = encode(&record)?;
        let mut guard = self.write()?;
        guard
            .entry(T::COLLECTION.to_string())
            .or_default()
            .insert_row(T::COLLECTION, row)?;
        Ok(record)
    }

    fn update_one<T, F>(&self, query: &Query, mutate: F) -> CareResult<Option<T>>
    where
        T: Record,
        F: FnOnce(&mut T) -> CareResult<()>,
    {
        let mut guard = self.write()?;
        let Some(collection) = guard.get_mut(T::COLLECTION) else {
            return Ok(None);
        };
        let Some((seq, mut record)) = collection.first_match::<T>(query)? else {
            return Ok(None);
        };

        let original_id = *record.id();
        mutate(&mut record)?;
        if *record.id() != original_id {
            return Err(CareError::invalid(format!(
                "{} record identifiers are immutable",
                T::COLLECTION
            )));
        }

        let row = encode(&record)?;
        collection.check_unique(T::COLLECTION, &row.id, &row.unique)?;

        if let Some(previous) = collection.rows.get(&seq) {
            for key in &previous.unique {
                collection.unique.remove(key);
            }
        }
        for key in &row.unique {
            collection.unique.insert(key.clone(), row.id);
        }
        collection.rows.insert(seq, row);

        Ok(Some(record))
    }

    fn delete_one<T: Record>(&self, query: &Query) -> CareResult<Option<T>> {
        let mut guard = self.write()?;
        let Some(collection) = guard.get_mut(T::COLLECTION) else {
            return Ok(None);
        };
        let Some((seq, record)) = collection.first_match::<T>(query)? else {
            return Ok(None);
        };
        collection.remove_row(seq);
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::{Filter, Sort};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: RecordId,
        code: String,
        rank: i64,
    }

    impl Record for Widget {
        const COLLECTION: &'static str = "widgets";

        fn id(&self) -> &RecordId {
            &self.id
        }

        fn field(&self, name: &str) -> Option<FieldValue> {
            match name {
                "code" => Some(self.code.clone().into()),
                "rank" => Some(FieldValue::Int(self.rank)),
                _ => None,
            }
        }

        fn unique_keys(&self) -> Vec<(&'static str, String)> {
            vec![("code", self.code.clone())]
        }
    }

    fn widget(code: &str, rank: i64) -> Widget {
        Widget {
            id: RecordId::new(),
            code: code.into(),
            rank,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(Duration::from_millis(500))
    }

    #[test]
    fn find_sorts_stably_and_windows() {
        let store = store();
        let a = store.create(widget("a", 2)).unwrap();
        let b = store.create(widget("b", 1)).unwrap();
        let c = store.create(widget("c", 2)).unwrap();

        let sorted: Vec<Widget> = store
            .find(&Query::new().sort_by(Sort::desc("rank")))
            .unwrap();
        assert_eq!(sorted, vec![a.clone(), c.clone(), b.clone()]);

        let page: Vec<Widget> = store
            .find(&Query::new().sort_by(Sort::desc("rank")).skip(1).limit(1))
            .unwrap();
        assert_eq!(page, vec![c]);

        assert_eq!(
            store
                .count::<Widget>(&Query::new().filter(Filter::eq("rank", FieldValue::Int(2))))
                .unwrap(),
            2
        );
    }

    #[test]
    fn unique_keys_are_enforced_on_create_and_update() {
        let store = store();
        store.create(widget("a", 1)).unwrap();
        let b = store.create(widget("b", 1)).unwrap();

        let err = store.create(widget("a", 5)).expect_err("duplicate code");
        assert!(matches!(err, CareError::Conflict(_)));

        let err = store
            .update_by_id::<Widget, _>(&b.id, |w| {
                w.code = "a".into();
                Ok(())
            })
            .expect_err("update into taken code");
        assert!(matches!(err, CareError::Conflict(_)));

        // The failed update left the record untouched.
        let stored: Widget = store.get(&b.id).unwrap().unwrap();
        assert_eq!(stored.code, "b");
    }

    #[test]
    fn update_releases_old_unique_key() {
        let store = store();
        let a = store.create(widget("a", 1)).unwrap();
        store
            .update_by_id::<Widget, _>(&a.id, |w| {
                w.code = "z".into();
                Ok(())
            })
            .unwrap();

        store.create(widget("a", 2)).expect("old code should be free again");
    }

    #[test]
    fn failing_mutation_writes_nothing() {
        let store = store();
        let a = store.create(widget("a", 1)).unwrap();

        let err = store
            .update_by_id::<Widget, _>(&a.id, |w| {
                w.rank = 99;
                Err(CareError::invalid("nope"))
            })
            .expect_err("mutation error should propagate");
        assert!(matches!(err, CareError::InvalidInput(_)));

        let stored: Widget = store.get(&a.id).unwrap().unwrap();
        assert_eq!(stored.rank, 1);
    }

    #[test]
    fn conditional_update_misses_return_none() {
        let store = store();
        let a = store.create(widget("a", 1)).unwrap();

        let query = Query::by_id(&a.id).filter(Filter::eq("rank", FieldValue::Int(7)));
        let updated = store
            .update_one::<Widget, _>(&query, |w| {
                w.rank = 8;
                Ok(())
            })
            .unwrap();
        assert!(updated.is_none());
    }

    #[test]
    fn delete_frees_id_and_unique_key() {
        let store = store();
        let a = store.create(widget("a", 1)).unwrap();

        let removed: Widget = store.delete_by_id(&a.id).unwrap().unwrap();
        assert_eq!(removed, a);
        assert!(store.get::<Widget>(&a.id).unwrap().is_none());
        assert!(store.delete_by_id::<Widget>(&a.id).unwrap().is_none());
        store.create(widget("a", 3)).unwrap();
    }

    #[test]
    fn poisoned_lock_reports_store_unavailable() {
        let store = std::sync::Arc::new(store());
        let a = store.create(widget("a", 1)).unwrap();

        let poisoner = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _ = poisoner.update_by_id::<Widget, _>(&a.id, |_| panic!("boom"));
        })
        .join();

        let err = store.get::<Widget>(&a.id).expect_err("poisoned lock");
        assert!(err.is_retryable());
    }

    #[test]
    fn lock_timeout_reports_store_unavailable() {
        let store = MemoryStore::new(Duration::from_millis(20));
        let a = store.create(widget("a", 1)).unwrap();
        let holding = std::sync::Barrier::new(2);
        let released = std::sync::Barrier::new(2);

        let err = std::thread::scope(|scope| {
            scope.spawn(|| {
                store
                    .update_by_id::<Widget, _>(&a.id, |w| {
                        holding.wait();
                        released.wait();
                        w.rank = 2;
                        Ok(())
                    })
                    .expect("writer should commit once released");
            });

            holding.wait();
            let err = store
                .get::<Widget>(&a.id)
                .expect_err("read should time out while the writer holds the lock");
            released.wait();
            err
        });

        assert!(err.is_retryable());
        assert!(matches!(err, CareError::StoreUnavailable(_)));
        let stored: Widget = store.get(&a.id).unwrap().unwrap();
        assert_eq!(stored.rank, 2);
    }
}
