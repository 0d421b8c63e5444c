//! # Taxonomy Reconciliation
//!
//! Crops and crop elements are created on the fly from the free-text names
//! users type into contributions. This module decides, for every name that
//! arrives, whether to reuse an existing record, rename one in place, or
//! fork a new one, and when a record that nobody points at any more may be
//! deleted.
//!
//! ## Rules
//!
//! - A name that matches an existing record (deleted or not) reuses it and
//!   clears its `is_deleted` flag.
//! - On edit, an unpublished record is renamed in place.
//! - A published record's name never changes; edits fork a new record.
//! - Records are hard-deleted only when no contribution references them,
//!   and soft-deleted on rejection only when no *pending* contribution does.
//! - Geometry layer names are recomputed whenever a referenced record
//!   changes name or category.

use crate::error::{Error, Result};
use crate::primitives::{ContributionId, CropElementId, CropId, MAX_TAXON_NAME_LEN};
use crate::storage::{Reader, WriteTx};
use crate::types::{Contribution, ContributionStatus, Crop, CropElement, GeometryFeature};
use serde::Deserialize;
use std::collections::BTreeSet;

/// How a contribution refers to a crop or crop element: by id, or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TaxonRef {
    Id(u64),
    Name(String),
}

impl TaxonRef {
    /// Treat a blank name as "no reference".
    #[must_use]
    pub fn non_blank(self) -> Option<Self> {
        match self {
            Self::Name(name) if name.trim().is_empty() => None,
            other => Some(other),
        }
    }
}

/// Trim and length-check a taxonomy name.
pub fn clean_name(field: &str, raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::invalid(field, "This field may not be blank."));
    }
    if name.chars().count() > MAX_TAXON_NAME_LEN {
        return Err(Error::invalid(
            field,
            format!(
                "Ensure this field has no more than {} characters.",
                MAX_TAXON_NAME_LEN
            ),
        ));
    }
    Ok(name.to_string())
}

// =============================================================================
// QUERIES
// =============================================================================

/// Look up a crop by exact name, including soft-deleted ones.
pub fn crop_named(r: &impl Reader, name: &str) -> Result<Option<Crop>> {
    r.find::<Crop>(|crop| crop.name == name)
}

/// Look up a crop element by exact name within a category.
pub fn element_named(r: &impl Reader, name: &str, category: CropId) -> Result<Option<CropElement>> {
    r.find::<CropElement>(|element| element.name == name && element.category == category)
}

/// All crops, ordered by name.
pub fn list_crops(r: &impl Reader) -> Result<Vec<Crop>> {
    let mut crops = r.scan::<Crop>()?;
    crops.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(crops)
}

/// Crop elements, optionally restricted to one category, in id order.
pub fn list_elements(r: &impl Reader, category: Option<CropId>) -> Result<Vec<CropElement>> {
    match category {
        Some(category) => r.filter::<CropElement>(|element| element.category == category),
        None => r.scan::<CropElement>(),
    }
}

/// Whether any contribution other than `except` points at the crop.
pub fn crop_referenced(r: &impl Reader, crop: CropId, except: Option<ContributionId>) -> Result<bool> {
    r.any::<Contribution>(|c| c.crop == crop && Some(c.id) != except)
}

/// Whether any contribution other than `except` points at the element.
pub fn element_referenced(
    r: &impl Reader,
    element: CropElementId,
    except: Option<ContributionId>,
) -> Result<bool> {
    r.any::<Contribution>(|c| c.crop_element == Some(element) && Some(c.id) != except)
}

fn pending_crop_elsewhere(r: &impl Reader, crop: CropId, except: ContributionId) -> Result<bool> {
    r.any::<Contribution>(|c| {
        c.crop == crop && c.id != except && c.status == ContributionStatus::Pending
    })
}

fn pending_element_elsewhere(
    r: &impl Reader,
    element: CropElementId,
    except: ContributionId,
) -> Result<bool> {
    r.any::<Contribution>(|c| {
        c.crop_element == Some(element) && c.id != except && c.status == ContributionStatus::Pending
    })
}

/// The layer code of a contribution's geometries.
pub fn layer_for(r: &impl Reader, contribution: &Contribution) -> Result<String> {
    let crop = r.require::<Crop>(contribution.crop.0)?;
    match contribution.crop_element {
        Some(element) => {
            let element = r.require::<CropElement>(element.0)?;
            Ok(element.code(&crop))
        }
        None => Ok(crop.code()),
    }
}

// =============================================================================
// PRIMITIVE MUTATIONS
// =============================================================================

fn insert_crop(tx: &mut WriteTx, name: String) -> Result<Crop> {
    let crop = Crop {
        id: CropId(tx.next_id::<Crop>()?),
        name,
        published: false,
        is_deleted: false,
    };
    tx.put(&crop)?;
    tracing::info!(crop = %crop.id, name = %crop.name, "created crop");
    Ok(crop)
}

fn insert_element(tx: &mut WriteTx, name: String, category: CropId) -> Result<CropElement> {
    let element = CropElement {
        id: CropElementId(tx.next_id::<CropElement>()?),
        name,
        category,
        published: false,
        is_deleted: false,
    };
    tx.put(&element)?;
    tracing::info!(
        element = %element.id,
        category = %category,
        name = %element.name,
        "created crop element"
    );
    Ok(element)
}

fn revive_crop(tx: &mut WriteTx, mut crop: Crop) -> Result<Crop> {
    if crop.is_deleted {
        crop.is_deleted = false;
        tx.put(&crop)?;
        tracing::debug!(crop = %crop.id, "revived crop");
    }
    Ok(crop)
}

fn revive_element(tx: &mut WriteTx, mut element: CropElement) -> Result<CropElement> {
    if element.is_deleted {
        element.is_deleted = false;
        tx.put(&element)?;
        tracing::debug!(element = %element.id, "revived crop element");
    }
    Ok(element)
}

/// Mark a crop (and its element) visible on the map.
pub(crate) fn publish_crop(tx: &mut WriteTx, mut crop: Crop) -> Result<Crop> {
    if !crop.published || crop.is_deleted {
        crop.published = true;
        crop.is_deleted = false;
        tx.put(&crop)?;
        tracing::info!(crop = %crop.id, "published crop");
    }
    Ok(crop)
}

pub(crate) fn publish_element(tx: &mut WriteTx, mut element: CropElement) -> Result<CropElement> {
    if !element.published || element.is_deleted {
        element.published = true;
        element.is_deleted = false;
        tx.put(&element)?;
        tracing::info!(element = %element.id, "published crop element");
    }
    Ok(element)
}

/// Soft-delete an unpublished crop that no other pending contribution needs.
pub(crate) fn retire_crop(tx: &mut WriteTx, mut crop: Crop, rejected: ContributionId) -> Result<bool> {
    if crop.published || crop.is_deleted || pending_crop_elsewhere(&*tx, crop.id, rejected)? {
        return Ok(false);
    }
    crop.is_deleted = true;
    tx.put(&crop)?;
    tracing::info!(crop = %crop.id, "soft-deleted crop");
    Ok(true)
}

pub(crate) fn retire_element(
    tx: &mut WriteTx,
    mut element: CropElement,
    rejected: ContributionId,
) -> Result<bool> {
    if element.published
        || element.is_deleted
        || pending_element_elsewhere(&*tx, element.id, rejected)?
    {
        return Ok(false);
    }
    element.is_deleted = true;
    tx.put(&element)?;
    tracing::info!(element = %element.id, "soft-deleted crop element");
    Ok(true)
}

/// Hard-delete a crop (and its elements) once no contribution references it.
///
/// Returns whether anything was deleted. Never fails on references.
pub fn release_crop(tx: &mut WriteTx, crop: CropId) -> Result<bool> {
    if tx.get::<Crop>(crop.0)?.is_none() || crop_referenced(&*tx, crop, None)? {
        return Ok(false);
    }
    let elements = list_elements(&*tx, Some(crop))?;
    for element in &elements {
        if element_referenced(&*tx, element.id, None)? {
            return Ok(false);
        }
    }
    for element in &elements {
        tx.delete::<CropElement>(element.id.0)?;
    }
    tx.delete::<Crop>(crop.0)?;
    tracing::info!(crop = %crop, elements = elements.len(), "deleted unreferenced crop");
    Ok(true)
}

/// Hard-delete a crop element once no contribution references it.
pub fn release_element(tx: &mut WriteTx, element: CropElementId) -> Result<bool> {
    if tx.get::<CropElement>(element.0)?.is_none() || element_referenced(&*tx, element, None)? {
        return Ok(false);
    }
    tx.delete::<CropElement>(element.0)?;
    tracing::info!(element = %element, "deleted unreferenced crop element");
    Ok(true)
}

/// Recompute the layer of every geometry whose contribution points at one
/// of the given crops or elements. Returns the number of geometries changed.
pub fn refresh_layers(
    tx: &mut WriteTx,
    crops: &BTreeSet<CropId>,
    elements: &BTreeSet<CropElementId>,
) -> Result<usize> {
    let affected = tx.filter::<Contribution>(|c| {
        crops.contains(&c.crop) || c.crop_element.is_some_and(|e| elements.contains(&e))
    })?;

    let mut changed = 0usize;
    for contribution in affected {
        let layer = layer_for(&*tx, &contribution)?;
        let stale = tx.filter::<GeometryFeature>(|g| g.reference == contribution.id && g.layer != layer)?;
        for mut geometry in stale {
            geometry.layer = layer.clone();
            tx.put(&geometry)?;
            changed = changed.saturating_add(1);
        }
    }

    if changed > 0 {
        tracing::debug!(changed, "refreshed geometry layers");
    }
    Ok(changed)
}

// =============================================================================
// RESOLUTION (contribution create)
// =============================================================================

/// Resolve the crop of a new contribution: reuse-and-revive or create.
pub fn resolve_crop(tx: &mut WriteTx, reference: &TaxonRef) -> Result<Crop> {
    match reference {
        TaxonRef::Id(id) => {
            let crop = tx.require::<Crop>(*id)?;
            revive_crop(tx, crop)
        }
        TaxonRef::Name(raw) => {
            let name = clean_name("crop", raw)?;
            match crop_named(&*tx, &name)? {
                Some(existing) => revive_crop(tx, existing),
                None => insert_crop(tx, name),
            }
        }
    }
}

/// Resolve the crop element of a new contribution within `crop`.
pub fn resolve_element(
    tx: &mut WriteTx,
    reference: Option<&TaxonRef>,
    crop: &Crop,
) -> Result<Option<CropElement>> {
    let Some(reference) = reference else {
        return Ok(None);
    };
    match reference {
        TaxonRef::Id(id) => element_by_id(tx, *id, crop).map(Some),
        TaxonRef::Name(raw) => {
            let name = clean_name("crop_element", raw)?;
            let element = match element_named(&*tx, &name, crop.id)? {
                Some(existing) => revive_element(tx, existing)?,
                None => insert_element(tx, name, crop.id)?,
            };
            Ok(Some(element))
        }
    }
}

fn element_by_id(tx: &mut WriteTx, id: u64, crop: &Crop) -> Result<CropElement> {
    let element = tx.require::<CropElement>(id)?;
    if element.category != crop.id {
        return Err(Error::invalid(
            "crop_element",
            format!(
                "Crop element \"{}\" does not belong to crop \"{}\".",
                element.name, crop.name
            ),
        ));
    }
    revive_element(tx, element)
}

// =============================================================================
// RECONCILIATION (contribution update)
// =============================================================================

/// Reconcile the crop of an edited contribution against its current crop.
pub fn reconcile_crop(tx: &mut WriteTx, reference: &TaxonRef, original: &Crop) -> Result<Crop> {
    let name = match reference {
        TaxonRef::Id(_) => return resolve_crop(tx, reference),
        TaxonRef::Name(raw) => clean_name("crop", raw)?,
    };

    if name == original.name {
        return revive_crop(tx, original.clone());
    }
    if let Some(existing) = crop_named(&*tx, &name)? {
        return revive_crop(tx, existing);
    }
    if !original.published {
        let mut renamed = original.clone();
        renamed.name = name;
        renamed.is_deleted = false;
        tx.put(&renamed)?;
        tracing::info!(crop = %renamed.id, from = %original.name, to = %renamed.name, "renamed crop");
        return Ok(renamed);
    }
    insert_crop(tx, name)
}

/// Reconcile the crop element of an edited contribution.
///
/// `crop` is the already reconciled crop; `contribution` is the
/// contribution being edited.
pub fn reconcile_element(
    tx: &mut WriteTx,
    reference: Option<&TaxonRef>,
    crop: &Crop,
    original: Option<&CropElement>,
    contribution: ContributionId,
) -> Result<Option<CropElement>> {
    let name = match reference {
        None => return Ok(None),
        Some(TaxonRef::Id(id)) => return element_by_id(tx, *id, crop).map(Some),
        Some(TaxonRef::Name(raw)) => clean_name("crop_element", raw)?,
    };

    if let Some(original) = original {
        if original.name == name && original.category == crop.id {
            return revive_element(tx, original.clone()).map(Some);
        }
    }
    if let Some(existing) = element_named(&*tx, &name, crop.id)? {
        return revive_element(tx, existing).map(Some);
    }
    if let Some(original) = original {
        let movable = original.category == crop.id
            || !element_referenced(&*tx, original.id, Some(contribution))?;
        if !original.published && movable {
            let mut renamed = original.clone();
            renamed.name = name;
            renamed.category = crop.id;
            renamed.is_deleted = false;
            tx.put(&renamed)?;
            tracing::info!(
                element = %renamed.id,
                from = %original.name,
                to = %renamed.name,
                category = %renamed.category,
                "renamed crop element"
            );
            return Ok(Some(renamed));
        }
    }
    insert_element(tx, name, crop.id).map(Some)
}

// =============================================================================
// DIRECT TAXONOMY EDITS
// =============================================================================

/// Partial update of a crop.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CropPatch {
    pub name: Option<String>,
    pub published: Option<bool>,
}

/// Partial update of a crop element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementPatch {
    pub name: Option<String>,
    pub category: Option<CropId>,
    pub published: Option<bool>,
}

/// Create a crop by name. Fails if the name is taken.
pub fn create_crop(tx: &mut WriteTx, name: &str) -> Result<Crop> {
    let name = clean_name("name", name)?;
    if crop_named(&*tx, &name)?.is_some() {
        return Err(Error::invalid("name", "A crop with this name already exists."));
    }
    insert_crop(tx, name)
}

/// Create a crop element under an existing crop.
pub fn create_element(tx: &mut WriteTx, name: &str, category: CropId) -> Result<CropElement> {
    let name = clean_name("name", name)?;
    if tx.get::<Crop>(category.0)?.is_none() {
        return Err(Error::invalid(
            "category",
            format!("Invalid pk \"{}\" - object does not exist.", category),
        ));
    }
    if element_named(&*tx, &name, category)?.is_some() {
        return Err(Error::invalid(
            "non_field_errors",
            "The fields name, category must make a unique set.",
        ));
    }
    insert_element(tx, name, category)
}

/// Apply a partial update to a crop.
pub fn update_crop(tx: &mut WriteTx, id: CropId, patch: CropPatch) -> Result<Crop> {
    let mut crop = tx.require::<Crop>(id.0)?;
    let mut renamed = false;

    if let Some(raw) = patch.name {
        let name = clean_name("name", &raw)?;
        if name != crop.name {
            if crop.published {
                return Err(Error::invalid(
                    "name",
                    "The name of a published crop cannot be changed.",
                ));
            }
            if crop_named(&*tx, &name)?.is_some() {
                return Err(Error::invalid("name", "A crop with this name already exists."));
            }
            crop.name = name;
            renamed = true;
        }
    }
    if let Some(published) = patch.published {
        crop.published = published;
    }

    tx.put(&crop)?;
    if renamed {
        refresh_layers(tx, &BTreeSet::from([crop.id]), &BTreeSet::new())?;
    }
    Ok(crop)
}

/// Apply a partial update to a crop element.
pub fn update_element(tx: &mut WriteTx, id: CropElementId, patch: ElementPatch) -> Result<CropElement> {
    let mut element = tx.require::<CropElement>(id.0)?;
    let name = match patch.name {
        Some(raw) => clean_name("name", &raw)?,
        None => element.name.clone(),
    };
    let category = patch.category.unwrap_or(element.category);
    let relabelled = name != element.name || category != element.category;

    if relabelled {
        if element.published {
            return Err(Error::invalid(
                "name",
                "The name of a published crop element cannot be changed.",
            ));
        }
        if category != element.category {
            if tx.get::<Crop>(category.0)?.is_none() {
                return Err(Error::invalid(
                    "category",
                    format!("Invalid pk \"{}\" - object does not exist.", category),
                ));
            }
            if element_referenced(&*tx, element.id, None)? {
                return Err(Error::invalid(
                    "category",
                    "A crop element referenced by contributions cannot change crop.",
                ));
            }
        }
        if element_named(&*tx, &name, category)?.is_some_and(|other| other.id != element.id) {
            return Err(Error::invalid(
                "non_field_errors",
                "The fields name, category must make a unique set.",
            ));
        }
        element.name = name;
        element.category = category;
    }
    if let Some(published) = patch.published {
        element.published = published;
    }

    tx.put(&element)?;
    if relabelled {
        refresh_layers(tx, &BTreeSet::new(), &BTreeSet::from([element.id]))?;
    }
    Ok(element)
}

/// Delete a crop and its elements. Refused while any contribution refers
/// to the crop or one of its elements.
pub fn delete_crop(tx: &mut WriteTx, id: CropId) -> Result<Crop> {
    let crop = tx.require::<Crop>(id.0)?;
    let references = tx.filter::<Contribution>(|c| c.crop == id)?.len();
    if references > 0 {
        return Err(Error::Protected(format!(
            "Cannot delete crop \"{}\": it is referenced by {} contribution(s).",
            crop.name, references
        )));
    }
    let elements = list_elements(&*tx, Some(id))?;
    for element in &elements {
        if element_referenced(&*tx, element.id, None)? {
            return Err(Error::Protected(format!(
                "Cannot delete crop \"{}\": its element \"{}\" is still referenced.",
                crop.name, element.name
            )));
        }
    }
    for element in &elements {
        tx.delete::<CropElement>(element.id.0)?;
    }
    tx.delete::<Crop>(id.0)?;
    tracing::info!(crop = %id, "deleted crop");
    Ok(crop)
}

/// Delete a crop element. Refused while any contribution refers to it.
pub fn delete_element(tx: &mut WriteTx, id: CropElementId) -> Result<CropElement> {
    let element = tx.require::<CropElement>(id.0)?;
    let references = tx.filter::<Contribution>(|c| c.crop_element == Some(id))?.len();
    if references > 0 {
        return Err(Error::Protected(format!(
            "Cannot delete crop element \"{}\": it is referenced by {} contribution(s).",
            element.name, references
        )));
    }
    tx.delete::<CropElement>(id.0)?;
    tracing::info!(element = %id, "deleted crop element");
    Ok(element)
}

// =============================================================================
// TESTS
// =============================================================================
