//! # redb Store
//!
//! One redb table per record type, keyed by the record id and holding the
//! postcard encoding of the record. Ids come from a per-kind sequence table.
//!
//! Mutations go through [`Store::write`]: the closure receives a [`WriteTx`]
//! and the transaction commits only if the closure returns `Ok`. Any error
//! aborts the transaction, so a multi-step reconciliation either lands as a
//! whole or not at all.

use crate::error::Result;
use crate::types::{
    Comment, Contribution, Crop, CropElement, FileRecord, GeometryFeature, LegacyCrop,
    LegacyCropElement, SuitabilityLevel, User,
};
use crate::Error;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Table holding the last id handed out per record kind.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// RECORD TRAIT
// =============================================================================

/// A type persisted in its own table.
pub trait Record: Serialize + DeserializeOwned {
    /// The table holding records of this type.
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;

    /// Human-readable kind, used in errors and as the sequence key.
    const KIND: &'static str;

    /// The primary key of this record.
    fn key(&self) -> u64;
}

macro_rules! impl_record {
    ($ty:ty, $table:literal, $kind:literal) => {
        impl Record for $ty {
            const TABLE: TableDefinition<'static, u64, &'static [u8]> =
                TableDefinition::new($table);
            const KIND: &'static str = $kind;

            fn key(&self) -> u64 {
                self.id.0
            }
        }
    };
}

impl_record!(Crop, "crops", "crop");
impl_record!(CropElement, "crop_elements", "crop element");
impl_record!(SuitabilityLevel, "suitability_levels", "suitability level");
impl_record!(User, "users", "user");
impl_record!(Contribution, "contributions", "contribution");
impl_record!(GeometryFeature, "geometry_features", "geometry feature");
impl_record!(Comment, "comments", "comment");
impl_record!(FileRecord, "files", "file");
impl_record!(LegacyCrop, "legacy_crops", "legacy crop");
impl_record!(LegacyCropElement, "legacy_crop_elements", "legacy crop element");

fn encode<R: Record>(record: &R) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(record)?)
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R> {
    Ok(postcard::from_bytes(bytes)?)
}

fn read_one<R, T>(table: &T, id: u64) -> Result<Option<R>>
where
    R: Record,
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn read_all<R, T>(table: &T) -> Result<Vec<R>>
where
    R: Record,
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(decode(value.value())?);
    }
    Ok(records)
}

// =============================================================================
// READER TRAIT
// =============================================================================

/// Read access shared by read and write transactions.
///
/// Scans return records in ascending id order.
pub trait Reader {
    /// Fetch a record by id.
    fn get<R: Record>(&self, id: u64) -> Result<Option<R>>;

    /// All records of a type, in id order.
    fn scan<R: Record>(&self) -> Result<Vec<R>>;

    /// Number of records of a type.
    fn count<R: Record>(&self) -> Result<u64>;

    /// Fetch a record by id, or fail with [`Error::NotFound`].
    fn require<R: Record>(&self, id: u64) -> Result<R> {
        self.get(id)?.ok_or(Error::NotFound { kind: R::KIND, id })
    }

    /// Records matching a predicate, in id order.
    fn filter<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<Vec<R>> {
        Ok(self
            .scan::<R>()?
            .into_iter()
            .filter(|record| predicate(record))
            .collect())
    }

    /// First record (lowest id) matching a predicate.
    fn find<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<Option<R>> {
        Ok(self.scan::<R>()?.into_iter().find(|record| predicate(record)))
    }

    /// Whether any record matches a predicate.
    fn any<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> Result<bool> {
        Ok(self.find(predicate)?.is_some())
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// A read-only MVCC snapshot.
pub struct ReadTx {
    txn: ReadTransaction,
}

impl Reader for ReadTx {
    fn get<R: Record>(&self, id: u64) -> Result<Option<R>> {
        let table = self.txn.open_table(R::TABLE)?;
        read_one(&table, id)
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let table = self.txn.open_table(R::TABLE)?;
        read_all(&table)
    }

    fn count<R: Record>(&self) -> Result<u64> {
        let table = self.txn.open_table(R::TABLE)?;
        Ok(table.len()?)
    }
}

/// The write transaction of one request.
pub struct WriteTx {
    txn: WriteTransaction,
}

impl WriteTx {
    /// Reserve the next id for a record type.
    pub fn next_id<R: Record>(&mut self) -> Result<u64> {
        let mut sequences = self.txn.open_table(SEQUENCES)?;
        let current = sequences.get(R::KIND)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current.saturating_add(1);
        sequences.insert(R::KIND, next)?;
        Ok(next)
    }

    /// Insert or replace a record.
    pub fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        let bytes = encode(record)?;
        let mut table = self.txn.open_table(R::TABLE)?;
        table.insert(record.key(), bytes.as_slice())?;
        Ok(())
    }

    /// Delete a record. Returns whether it existed.
    pub fn delete<R: Record>(&mut self, id: u64) -> Result<bool> {
        let mut table = self.txn.open_table(R::TABLE)?;
        let existed = table.remove(id)?.is_some();
        Ok(existed)
    }
}

impl Reader for WriteTx {
    fn get<R: Record>(&self, id: u64) -> Result<Option<R>> {
        let table = self.txn.open_table(R::TABLE)?;
        read_one(&table, id)
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let table = self.txn.open_table(R::TABLE)?;
        read_all(&table)
    }

    fn count<R: Record>(&self) -> Result<u64> {
        let table = self.txn.open_table(R::TABLE)?;
        Ok(table.len()?)
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Record counts, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub crops: u64,
    pub crop_elements: u64,
    pub suitability_levels: u64,
    pub users: u64,
    pub contributions: u64,
    pub geometry_features: u64,
    pub comments: u64,
    pub files: u64,
    pub legacy_crops: u64,
    pub legacy_crop_elements: u64,
}

/// The database handle. Cheap to share behind an `Arc`.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) a database file and make sure every table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;
        let store = Self { db };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(SEQUENCES)?;
            txn.open_table(Crop::TABLE)?;
            txn.open_table(CropElement::TABLE)?;
            txn.open_table(SuitabilityLevel::TABLE)?;
            txn.open_table(User::TABLE)?;
            txn.open_table(Contribution::TABLE)?;
            txn.open_table(GeometryFeature::TABLE)?;
            txn.open_table(Comment::TABLE)?;
            txn.open_table(FileRecord::TABLE)?;
            txn.open_table(LegacyCrop::TABLE)?;
            txn.open_table(LegacyCropElement::TABLE)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Run a closure against a consistent read snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T>) -> Result<T> {
        let tx = ReadTx {
            txn: self.db.begin_read()?,
        };
        f(&tx)
    }

    /// Run a closure inside a write transaction.
    ///
    /// Commits when the closure succeeds, aborts when it fails.
    pub fn write<T>(&self, f: impl FnOnce(&mut WriteTx) -> Result<T>) -> Result<T> {
        let mut tx = WriteTx {
            txn: self.db.begin_write()?,
        };
        match f(&mut tx) {
            Ok(value) => {
                tx.txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = tx.txn.abort() {
                    tracing::warn!(error = %abort_err, "failed to abort write transaction");
                }
                Err(err)
            }
        }
    }

    /// Count the records of every table.
    pub fn counts(&self) -> Result<StoreCounts> {
        self.read(|tx| {
            Ok(StoreCounts {
                crops: tx.count::<Crop>()?,
                crop_elements: tx.count::<CropElement>()?,
                suitability_levels: tx.count::<SuitabilityLevel>()?,
                users: tx.count::<User>()?,
                contributions: tx.count::<Contribution>()?,
                geometry_features: tx.count::<GeometryFeature>()?,
                comments: tx.count::<Comment>()?,
                files: tx.count::<FileRecord>()?,
                legacy_crops: tx.count::<LegacyCrop>()?,
                legacy_crop_elements: tx.count::<LegacyCropElement>()?,
            })
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::CropId;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let store = Store::open(dir.path().join("store.redb"))
            .unwrap_or_else(|e| unreachable!("open: {e}"));
        (dir, store)
    }

    fn crop(id: u64, name: &str) -> Crop {
        Crop {
            id: CropId(id),
            name: name.to_string(),
            published: false,
            is_deleted: false,
        }
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (_dir, store) = open_temp();

        let id = store
            .write(|tx| {
                let id = tx.next_id::<Crop>()?;
                tx.put(&crop(id, "Coffee"))?;
                Ok(id)
            })
            .ok();
        assert_eq!(id, Some(1));

        let loaded = store.read(|tx| tx.get::<Crop>(1)).ok().flatten();
        assert_eq!(loaded.map(|c| c.name), Some("Coffee".to_string()));
    }

    #[test]
    fn failed_write_rolls_back() {
        let (_dir, store) = open_temp();

        let result: Result<()> = store.write(|tx| {
            let id = tx.next_id::<Crop>()?;
            tx.put(&crop(id, "Banana"))?;
            Err(Error::invalid("name", "forced failure"))
        });
        assert!(result.is_err());

        let count = store.read(|tx| tx.count::<Crop>()).ok();
        assert_eq!(count, Some(0));

        // The sequence bump was rolled back too.
        let id = store.write(|tx| tx.next_id::<Crop>()).ok();
        assert_eq!(id, Some(1));
    }

    #[test]
    fn require_reports_kind() {
        let (_dir, store) = open_temp();
        let err = store.read(|tx| tx.require::<Crop>(42)).err();
        assert!(matches!(
            err,
            Some(Error::NotFound { kind: "crop", id: 42 })
        ));
    }

    #[test]
    fn scan_is_id_ordered() {
        let (_dir, store) = open_temp();
        let written = store.write(|tx| {
            tx.put(&crop(3, "Corn"))?;
            tx.put(&crop(1, "Cacao"))?;
            tx.put(&crop(2, "Coconut"))?;
            Ok(())
        });
        assert!(written.is_ok());

        let names: Vec<String> = store
            .read(|tx| tx.scan::<Crop>())
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Cacao", "Coconut", "Corn"]);
    }

    #[test]
    fn delete_reports_existence() {
        let (_dir, store) = open_temp();
        let outcome = store.write(|tx| {
            tx.put(&crop(1, "Coffee"))?;
            let first = tx.delete::<Crop>(1)?;
            let second = tx.delete::<Crop>(1)?;
            Ok((first, second))
        });
        assert_eq!(outcome.ok(), Some((true, false)));
    }
}
