//! # Record Types
//!
//! The persisted records of the platform. All of them are stored
//! postcard-encoded in redb tables keyed by their numeric id.

use crate::geometry::Polygon;
use crate::primitives::{
    CommentId, ContributionId, CropElementId, CropId, FileId, GeometryId, LegacyCropElementId,
    LegacyCropId, SuitabilityLevelId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Normalize a taxonomy name into its map code.
///
/// `"Lowland Rice"` becomes `"lowland_rice"`.
#[must_use]
pub fn taxon_code(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

// =============================================================================
// TAXONOMY
// =============================================================================

/// A named agricultural category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub id: CropId,
    pub name: String,
    /// Set once a contribution referencing the crop is approved.
    pub published: bool,
    /// Set when the crop was rejected and no pending contribution needs it.
    pub is_deleted: bool,
}

impl Crop {
    /// The map code of this crop.
    #[must_use]
    pub fn code(&self) -> String {
        taxon_code(&self.name)
    }
}

/// A named sub-variant of a crop (e.g. a cultivar or a season).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropElement {
    pub id: CropElementId,
    pub name: String,
    pub category: CropId,
    pub published: bool,
    pub is_deleted: bool,
}

impl CropElement {
    /// The map code of this element: `<element>_<crop>`.
    #[must_use]
    pub fn code(&self, category: &Crop) -> String {
        format!("{}_{}", taxon_code(&self.name), category.code())
    }
}

/// A crop of the pre-crowdsourcing dataset. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCrop {
    pub id: LegacyCropId,
    pub name: String,
    pub published: bool,
}

impl LegacyCrop {
    #[must_use]
    pub fn code(&self) -> String {
        taxon_code(&self.name)
    }
}

/// An element of a [`LegacyCrop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCropElement {
    pub id: LegacyCropElementId,
    pub name: String,
    pub category: LegacyCropId,
    pub published: bool,
}

impl LegacyCropElement {
    #[must_use]
    pub fn code(&self, category: &LegacyCrop) -> String {
        format!("{}_{}", taxon_code(&self.name), category.code())
    }
}

/// A fixed suitability grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuitabilityLevel {
    pub id: SuitabilityLevelId,
    pub name: String,
    pub label: String,
    pub gridcode: i32,
    pub color: String,
}

// =============================================================================
// USERS
// =============================================================================

/// Role carried by the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Contributor,
    Administrator,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contributor => "Contributor",
            Self::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contributor" | "0" => Ok(Self::Contributor),
            "administrator" | "admin" | "1" => Ok(Self::Administrator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A platform user, recorded from verified token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

// =============================================================================
// CONTRIBUTIONS
// =============================================================================

/// Review state of a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContributionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ContributionStatus {
    /// Numeric code used by the review client (0, 1, 2).
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Approved => 1,
            Self::Rejected => 2,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Approved),
            2 => Some(Self::Rejected),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ContributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContributionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(Self::from_code)
                .ok_or_else(|| format!("\"{}\" is not a valid status.", other)),
        }
    }
}

/// A user-authored land-suitability claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub author: UserId,
    pub title: String,
    pub address: String,
    pub description: String,
    pub crop: CropId,
    pub crop_element: Option<CropElementId>,
    pub suitability_level: SuitabilityLevelId,
    pub status: ContributionStatus,
    /// Users other than the author who edited the contribution.
    pub contributors: BTreeSet<UserId>,
    pub date_published: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// One polygon of a contribution, as served to the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFeature {
    pub id: GeometryId,
    pub reference: ContributionId,
    /// `<element>_<crop>` or `<crop>`; the map filters on it.
    pub layer: String,
    /// Suitability gridcode; drives the map colour ramp.
    pub gridcode: i32,
    /// False once the owning contribution is rejected.
    pub published: bool,
    pub polygon: Polygon,
}

// =============================================================================
// CHILD RECORDS
// =============================================================================

/// A discussion message on a contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub contribution: ContributionId,
    pub author: UserId,
    pub content: String,
    pub date_created: DateTime<Utc>,
}

/// Metadata of an attachment; the blob lives in the media directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub contribution: ContributionId,
    pub uploaded_by: UserId,
    pub file_identifier: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    /// Path relative to the media directory.
    pub path: String,
    pub date_uploaded: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_code_lowercases_and_joins() {
        let crop = Crop {
            id: CropId(1),
            name: "Lowland Rice".to_string(),
            published: false,
            is_deleted: false,
        };
        assert_eq!(crop.code(), "lowland_rice");
    }

    #[test]
    fn element_code_includes_category() {
        let crop = Crop {
            id: CropId(1),
            name: "Corn".to_string(),
            published: true,
            is_deleted: false,
        };
        let element = CropElement {
            id: CropElementId(4),
            name: "Dry Season".to_string(),
            category: crop.id,
            published: true,
            is_deleted: false,
        };
        assert_eq!(element.code(&crop), "dry_season_corn");
    }

    #[test]
    fn status_parses_names_and_codes() {
        assert_eq!("Approved".parse(), Ok(ContributionStatus::Approved));
        assert_eq!("2".parse(), Ok(ContributionStatus::Rejected));
        assert!("Accepted".parse::<ContributionStatus>().is_err());
        assert_eq!(ContributionStatus::from_code(9), None);
        assert_eq!(ContributionStatus::Pending.code(), 0);
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("admin".parse(), Ok(Role::Administrator));
        assert_eq!("Contributor".parse(), Ok(Role::Contributor));
        assert!("root".parse::<Role>().is_err());
    }
}
