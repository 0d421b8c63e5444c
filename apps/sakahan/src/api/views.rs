//! # Representations
//!
//! JSON shapes served by the API. Contributions are expanded with their
//! author, crop, crop element, suitability level, contributors and a GeoJSON
//! `FeatureCollection` of their geometries.

use chrono::{DateTime, Utc};
use sakahan_core::contribution::geometries_of;
use sakahan_core::{
    users, Comment, CommentId, Contribution, ContributionId, Crop, CropElement, CropElementId,
    CropId, FileRecord, GeometryFeature, GeometryId, LegacyCrop, LegacyCropElement,
    LegacyCropElementId, LegacyCropId, Position, Reader, Result, SuitabilityLevel, User, UserId,
};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// USERS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_str().to_string(),
        }
    }
}

fn user_view(r: &impl Reader, id: UserId) -> Result<UserView> {
    Ok(match users::get(r, id)? {
        Some(user) => UserView::from(&user),
        None => UserView {
            id,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role: String::new(),
        },
    })
}

// =============================================================================
// TAXONOMY
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CropView {
    pub id: CropId,
    pub name: String,
    pub code: String,
    pub published: bool,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
}

impl From<&Crop> for CropView {
    fn from(crop: &Crop) -> Self {
        Self {
            id: crop.id,
            name: crop.name.clone(),
            code: crop.code(),
            published: crop.published,
            is_deleted: crop.is_deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementView {
    pub id: CropElementId,
    pub name: String,
    pub code: String,
    pub category: CropView,
    pub published: bool,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
}

impl ElementView {
    pub fn new(element: &CropElement, category: &Crop) -> Self {
        Self {
            id: element.id,
            name: element.name.clone(),
            code: element.code(category),
            category: CropView::from(category),
            published: element.published,
            is_deleted: element.is_deleted,
        }
    }

    /// Load the element's category and build the view.
    pub fn load(r: &impl Reader, element: &CropElement) -> Result<Self> {
        let category = r.require::<Crop>(element.category.0)?;
        Ok(Self::new(element, &category))
    }
}

// =============================================================================
// LEGACY TAXONOMY
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LegacyCropView {
    pub id: LegacyCropId,
    pub name: String,
    pub code: String,
    pub published: bool,
}

impl From<&LegacyCrop> for LegacyCropView {
    fn from(crop: &LegacyCrop) -> Self {
        Self {
            id: crop.id,
            name: crop.name.clone(),
            code: crop.code(),
            published: crop.published,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacyElementView {
    pub id: LegacyCropElementId,
    pub name: String,
    pub code: String,
    pub category: LegacyCropView,
    pub published: bool,
}

impl LegacyElementView {
    pub fn new(element: &LegacyCropElement, category: &LegacyCrop) -> Self {
        Self {
            id: element.id,
            name: element.name.clone(),
            code: element.code(category),
            category: LegacyCropView::from(category),
            published: element.published,
        }
    }
}

// =============================================================================
// GEOJSON
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub coordinates: Vec<Vec<Position>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureProperties {
    pub reference: ContributionId,
    pub layer: String,
    pub gridcode: i32,
    pub published: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: GeometryId,
    pub geometry: PolygonGeometry,
    pub properties: FeatureProperties,
}

impl From<&GeometryFeature> for Feature {
    fn from(feature: &GeometryFeature) -> Self {
        Self {
            kind: "Feature",
            id: feature.id,
            geometry: PolygonGeometry {
                kind: "Polygon",
                coordinates: vec![feature.polygon.ring.clone()],
            },
            properties: FeatureProperties {
                reference: feature.reference,
                layer: feature.layer.clone(),
                gridcode: feature.gridcode,
                published: feature.published,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: &[GeometryFeature]) -> Self {
        Self {
            kind: "FeatureCollection",
            features: features.iter().map(Feature::from).collect(),
        }
    }
}

// =============================================================================
// CONTRIBUTIONS
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ContributionView {
    pub id: ContributionId,
    pub title: String,
    pub address: String,
    pub description: String,
    pub author: UserView,
    pub crop: CropView,
    pub crop_element: Option<ElementView>,
    pub suitability_level: SuitabilityLevel,
    pub status: &'static str,
    pub contributors: Vec<UserView>,
    pub date_published: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub geometries: FeatureCollection,
}

impl ContributionView {
    pub fn load(r: &impl Reader, contribution: &Contribution) -> Result<Self> {
        let crop = r.require::<Crop>(contribution.crop.0)?;
        let crop_element = match contribution.crop_element {
            Some(id) => {
                let element = r.require::<CropElement>(id.0)?;
                Some(ElementView::new(&element, &crop))
            }
            None => None,
        };
        let contributors = contribution
            .contributors
            .iter()
            .map(|id| user_view(r, *id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: contribution.id,
            title: contribution.title.clone(),
            address: contribution.address.clone(),
            description: contribution.description.clone(),
            author: user_view(r, contribution.author)?,
            crop: CropView::from(&crop),
            crop_element,
            suitability_level: r.require::<SuitabilityLevel>(contribution.suitability_level.0)?,
            status: contribution.status.as_str(),
            contributors,
            date_published: contribution.date_published,
            last_modified: contribution.last_modified,
            geometries: FeatureCollection::new(&geometries_of(r, contribution.id)?),
        })
    }
}

// =============================================================================
// COMMENTS & FILES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub contribution: ContributionId,
    pub author: UserView,
    pub content: String,
    pub date_created: DateTime<Utc>,
}

impl CommentView {
    pub fn load(r: &impl Reader, comment: &Comment) -> Result<Self> {
        Ok(Self {
            id: comment.id,
            contribution: comment.contribution,
            author: user_view(r, comment.author)?,
            content: comment.content.clone(),
            date_created: comment.date_created,
        })
    }
}

/// Comments keyed by `YYYY-MM-DD`.
pub fn grouped_comments(
    r: &impl Reader,
    grouped: BTreeMap<chrono::NaiveDate, Vec<Comment>>,
) -> Result<BTreeMap<String, Vec<CommentView>>> {
    let mut out = BTreeMap::new();
    for (day, comments) in grouped {
        let views = comments
            .iter()
            .map(|comment| CommentView::load(r, comment))
            .collect::<Result<Vec<_>>>()?;
        out.insert(day.format("%Y-%m-%d").to_string(), views);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub record: FileRecord,
    /// Public URL of the blob.
    pub file: String,
}

impl From<FileRecord> for FileView {
    fn from(record: FileRecord) -> Self {
        let file = format!("/media/{}", record.path);
        Self { record, file }
    }
}
