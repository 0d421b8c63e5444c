//! # Storage Module
//!
//! Transactional record storage using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions (one write transaction per request)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)

mod redb_store;

pub use redb_store::{ReadTx, Reader, Record, Store, StoreCounts, WriteTx};
