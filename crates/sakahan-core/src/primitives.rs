//! # Primitives
//!
//! Record identifiers and the hard limits enforced by the engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Identifier of a [`crate::Crop`].
    CropId
);
record_id!(
    /// Identifier of a [`crate::CropElement`].
    CropElementId
);
record_id!(
    /// Identifier of a [`crate::SuitabilityLevel`].
    SuitabilityLevelId
);
record_id!(
    /// Identifier of a [`crate::Contribution`].
    ContributionId
);
record_id!(
    /// Identifier of a [`crate::GeometryFeature`].
    GeometryId
);
record_id!(
    /// Identifier of a [`crate::Comment`].
    CommentId
);
record_id!(
    /// Identifier of a [`crate::FileRecord`].
    FileId
);
record_id!(
    /// Identifier of a [`crate::User`], as issued by the token service.
    UserId
);
record_id!(
    /// Identifier of a [`crate::LegacyCrop`].
    LegacyCropId
);
record_id!(
    /// Identifier of a [`crate::LegacyCropElement`].
    LegacyCropElementId
);

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum length (in characters) of a crop or crop element name.
pub const MAX_TAXON_NAME_LEN: usize = 50;

/// Maximum length of a contribution title.
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum length of a contribution address.
pub const MAX_ADDRESS_LEN: usize = 255;

/// Maximum number of attachments per contribution.
pub const MAX_FILES_PER_CONTRIBUTION: usize = 5;

/// Maximum attachment size in bytes (5 MiB).
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// The only accepted attachment content type.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Default page size for contribution listings.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Upper bound for a requested page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// Minimum number of positions in a closed polygon ring.
pub const MIN_RING_POSITIONS: usize = 4;
