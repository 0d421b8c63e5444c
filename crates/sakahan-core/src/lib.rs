//! # Sakahan Core
//!
//! The contribution lifecycle and crop taxonomy engine of the Sakahan
//! land-suitability mapping platform.
//!
//! ## Architecture
//!
//! - [`storage`]: redb tables of postcard-encoded records, accessed through
//!   request-scoped read and write transactions.
//! - [`taxonomy`]: reconciliation of free-text crop and crop element names
//!   (reuse, revive, rename, fork, release) and geometry layer refresh.
//! - [`contribution`]: create, edit, destroy and review of contributions.
//! - [`comments`], [`files`], [`users`], [`suitability`]: the satellite
//!   records around a contribution.
//! - [`legacy`]: the read-only crop list of the pre-crowdsourcing dataset.
//!
//! Every mutating operation takes a `&mut WriteTx` and is meant to be run
//! inside [`Store::write`], which commits on success and rolls back on any
//! error.
//!
//! ## Example
//!
//! ```no_run
//! use sakahan_core::{suitability, Store};
//!
//! # fn main() -> sakahan_core::Result<()> {
//! let store = Store::open("sakahan.redb")?;
//! store.write(suitability::seed)?;
//! let levels = store.read(|tx| suitability::list(tx))?;
//! assert_eq!(levels.len(), suitability::seed_len());
//! # Ok(())
//! # }
//! ```

pub mod comments;
pub mod contribution;
pub mod error;
pub mod files;
pub mod geometry;
pub mod legacy;
pub mod primitives;
pub mod storage;
pub mod suitability;
pub mod taxonomy;
pub mod types;
pub mod users;

pub use contribution::{ContributionDraft, ContributionQuery, Destroyed, Page, Tab};
pub use error::{Error, FieldErrors, Result};
pub use files::{FileSync, FileUpload};
pub use geometry::{Polygon, Position};
pub use primitives::*;
pub use storage::{ReadTx, Reader, Record, Store, StoreCounts, WriteTx};
pub use taxonomy::{CropPatch, ElementPatch, TaxonRef};
pub use types::{
    Comment, Contribution, ContributionStatus, Crop, CropElement, FileRecord, GeometryFeature,
    LegacyCrop, LegacyCropElement, Role, SuitabilityLevel, User,
};
