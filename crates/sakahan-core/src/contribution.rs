//! # Contribution Lifecycle
//!
//! Create, edit, destroy and review contributions. Every operation here runs
//! inside the caller's [`WriteTx`], so the taxonomy reconciliation, geometry
//! rewrite and cascade deletes of one request commit together or not at all.
//!
//! ```text
//! Pending ──approve──> Approved
//!    └─────reject────> Rejected
//! ```

use crate::error::{Error, FieldErrors, Result};
use crate::geometry::{validate_polygons, Polygon};
use crate::primitives::{
    ContributionId, CropElementId, GeometryId, SuitabilityLevelId, UserId,
    DEFAULT_PAGE_SIZE, MAX_ADDRESS_LEN, MAX_PAGE_SIZE, MAX_TITLE_LEN,
};
use crate::storage::{Reader, WriteTx};
use crate::taxonomy::{self, TaxonRef};
use crate::types::{
    Comment, Contribution, ContributionStatus, Crop, CropElement, FileRecord, GeometryFeature,
    SuitabilityLevel, User,
};
use crate::users;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

// =============================================================================
// INPUT
// =============================================================================

/// The body of a contribution create or update.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributionDraft {
    pub title: String,
    pub address: String,
    pub description: String,
    pub crop: TaxonRef,
    #[serde(default)]
    pub crop_element: Option<TaxonRef>,
    pub suitability_level: SuitabilityLevelId,
    pub geom: Vec<Polygon>,
}

impl ContributionDraft {
    fn element_ref(&self) -> Option<TaxonRef> {
        self.crop_element.clone().and_then(TaxonRef::non_blank)
    }
}

fn check_text(errors: &mut FieldErrors, field: &str, value: &str, max: Option<usize>) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if let Some(max) = max {
        if value.chars().count() > max {
            errors.add(
                field,
                format!("Ensure this field has no more than {} characters.", max),
            );
        }
    }
}

/// Validate the plain fields of a draft and load its suitability level.
fn validate(r: &impl Reader, draft: &ContributionDraft) -> Result<SuitabilityLevel> {
    let mut errors = FieldErrors::new();
    check_text(&mut errors, "title", &draft.title, Some(MAX_TITLE_LEN));
    check_text(&mut errors, "address", &draft.address, Some(MAX_ADDRESS_LEN));
    check_text(&mut errors, "description", &draft.description, None);
    validate_polygons(&draft.geom, &mut errors);

    let level = r.get::<SuitabilityLevel>(draft.suitability_level.0)?;
    if level.is_none() {
        errors.add(
            "suitability_level",
            format!(
                "Invalid pk \"{}\" - object does not exist.",
                draft.suitability_level
            ),
        );
    }

    errors.into_result()?;
    level.ok_or(Error::not_found("suitability level", draft.suitability_level.0))
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// The geometries of a contribution, in id order.
pub fn geometries_of(r: &impl Reader, contribution: ContributionId) -> Result<Vec<GeometryFeature>> {
    r.filter::<GeometryFeature>(|g| g.reference == contribution)
}

fn drop_geometries(tx: &mut WriteTx, contribution: ContributionId) -> Result<usize> {
    let stale = geometries_of(&*tx, contribution)?;
    for geometry in &stale {
        tx.delete::<GeometryFeature>(geometry.id.0)?;
    }
    Ok(stale.len())
}

fn insert_geometries(
    tx: &mut WriteTx,
    contribution: &Contribution,
    layer: &str,
    gridcode: i32,
    polygons: &[Polygon],
) -> Result<()> {
    let published = contribution.status != ContributionStatus::Rejected;
    for polygon in polygons {
        let geometry = GeometryFeature {
            id: GeometryId(tx.next_id::<GeometryFeature>()?),
            reference: contribution.id,
            layer: layer.to_string(),
            gridcode,
            published,
            polygon: polygon.clone(),
        };
        tx.put(&geometry)?;
    }
    Ok(())
}

fn layer_code(crop: &Crop, element: Option<&CropElement>) -> String {
    match element {
        Some(element) => element.code(crop),
        None => crop.code(),
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Create a pending contribution authored by `author`.
pub fn create(
    tx: &mut WriteTx,
    author: &User,
    draft: ContributionDraft,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    users::remember(tx, author)?;
    let level = validate(&*tx, &draft)?;

    let crop = taxonomy::resolve_crop(tx, &draft.crop)?;
    let element_ref = draft.element_ref();
    let element = taxonomy::resolve_element(tx, element_ref.as_ref(), &crop)?;

    let contribution = Contribution {
        id: ContributionId(tx.next_id::<Contribution>()?),
        author: author.id,
        title: draft.title.trim().to_string(),
        address: draft.address.trim().to_string(),
        description: draft.description,
        crop: crop.id,
        crop_element: element.as_ref().map(|e| e.id),
        suitability_level: level.id,
        status: ContributionStatus::Pending,
        contributors: BTreeSet::new(),
        date_published: now,
        last_modified: now,
    };
    tx.put(&contribution)?;

    let layer = layer_code(&crop, element.as_ref());
    insert_geometries(tx, &contribution, &layer, level.gridcode, &draft.geom)?;

    tracing::info!(
        contribution = %contribution.id,
        author = %author.id,
        layer = %layer,
        polygons = draft.geom.len(),
        "created contribution"
    );
    Ok(contribution)
}

/// Apply an edit to a contribution.
///
/// Crop and element names are reconciled against the current records,
/// records the contribution stops pointing at are released, polygons are
/// replaced and every affected layer is recomputed. Status is untouched.
pub fn update(
    tx: &mut WriteTx,
    id: ContributionId,
    editor: &User,
    draft: ContributionDraft,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    users::remember(tx, editor)?;
    let mut contribution = tx.require::<Contribution>(id.0)?;
    let level = validate(&*tx, &draft)?;

    let original_crop = tx.require::<Crop>(contribution.crop.0)?;
    let original_element = match contribution.crop_element {
        Some(element) => Some(tx.require::<CropElement>(element.0)?),
        None => None,
    };

    let crop = taxonomy::reconcile_crop(tx, &draft.crop, &original_crop)?;
    let element_ref = draft.element_ref();
    let element = taxonomy::reconcile_element(
        tx,
        element_ref.as_ref(),
        &crop,
        original_element.as_ref(),
        id,
    )?;

    contribution.title = draft.title.trim().to_string();
    contribution.address = draft.address.trim().to_string();
    contribution.description = draft.description;
    contribution.crop = crop.id;
    contribution.crop_element = element.as_ref().map(|e| e.id);
    contribution.suitability_level = level.id;
    contribution.last_modified = now;
    if editor.id != contribution.author {
        contribution.contributors.insert(editor.id);
    }
    tx.put(&contribution)?;

    if let Some(old) = &original_element {
        if contribution.crop_element != Some(old.id) {
            taxonomy::release_element(tx, old.id)?;
        }
    }
    if original_crop.id != crop.id {
        taxonomy::release_crop(tx, original_crop.id)?;
    }

    drop_geometries(tx, id)?;
    let layer = layer_code(&crop, element.as_ref());
    insert_geometries(tx, &contribution, &layer, level.gridcode, &draft.geom)?;

    let crops = BTreeSet::from([original_crop.id, crop.id]);
    let elements: BTreeSet<CropElementId> = original_element
        .iter()
        .map(|e| e.id)
        .chain(element.iter().map(|e| e.id))
        .collect();
    taxonomy::refresh_layers(tx, &crops, &elements)?;

    tracing::info!(
        contribution = %id,
        editor = %editor.id,
        layer = %layer,
        "updated contribution"
    );
    Ok(contribution)
}

/// What a destroy removed; the caller deletes the attachment blobs.
#[derive(Debug, Clone)]
pub struct Destroyed {
    pub contribution: Contribution,
    pub files: Vec<FileRecord>,
}

/// Delete a contribution with its geometries, comments and files, then
/// release its crop and element if nothing else references them.
pub fn destroy(tx: &mut WriteTx, id: ContributionId, actor: &User) -> Result<Destroyed> {
    let contribution = tx.require::<Contribution>(id.0)?;
    if actor.id != contribution.author && !actor.is_admin() {
        return Err(Error::Forbidden(
            "Only the author or an administrator can delete this contribution.".to_string(),
        ));
    }

    let geometries = drop_geometries(tx, id)?;
    let comments = tx.filter::<Comment>(|c| c.contribution == id)?;
    for comment in &comments {
        tx.delete::<Comment>(comment.id.0)?;
    }
    let files = tx.filter::<FileRecord>(|f| f.contribution == id)?;
    for file in &files {
        tx.delete::<FileRecord>(file.id.0)?;
    }
    tx.delete::<Contribution>(id.0)?;

    if let Some(element) = contribution.crop_element {
        taxonomy::release_element(tx, element)?;
    }
    taxonomy::release_crop(tx, contribution.crop)?;

    tracing::info!(
        contribution = %id,
        actor = %actor.id,
        geometries,
        comments = comments.len(),
        files = files.len(),
        "destroyed contribution"
    );
    Ok(Destroyed {
        contribution,
        files,
    })
}

/// Review a pending contribution.
pub fn set_status(
    tx: &mut WriteTx,
    id: ContributionId,
    status: ContributionStatus,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<Contribution> {
    if !actor.is_admin() {
        return Err(Error::Forbidden(
            "Only administrators can change the status of a contribution.".to_string(),
        ));
    }
    users::remember(tx, actor)?;

    let mut contribution = tx.require::<Contribution>(id.0)?;
    if contribution.status != ContributionStatus::Pending || status == ContributionStatus::Pending {
        return Err(Error::InvalidTransition {
            from: contribution.status,
            to: status,
        });
    }

    let approved = status == ContributionStatus::Approved;
    for mut geometry in geometries_of(&*tx, id)? {
        if geometry.published != approved {
            geometry.published = approved;
            tx.put(&geometry)?;
        }
    }

    let crop = tx.require::<Crop>(contribution.crop.0)?;
    let element = match contribution.crop_element {
        Some(element) => Some(tx.require::<CropElement>(element.0)?),
        None => None,
    };
    if approved {
        taxonomy::publish_crop(tx, crop)?;
        if let Some(element) = element {
            taxonomy::publish_element(tx, element)?;
        }
    } else {
        taxonomy::retire_crop(tx, crop, id)?;
        if let Some(element) = element {
            taxonomy::retire_element(tx, element, id)?;
        }
    }

    let from = contribution.status;
    contribution.status = status;
    contribution.last_modified = now;
    tx.put(&contribution)?;

    tracing::info!(
        contribution = %id,
        reviewer = %actor.id,
        from = %from,
        to = %status,
        "contribution status changed"
    );
    Ok(contribution)
}

// =============================================================================
// LISTING
// =============================================================================

/// Which side of the author split to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Mine,
    Others,
}

impl FromStr for Tab {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "My Contributions" => Ok(Self::Mine),
            "Other Contributions" => Ok(Self::Others),
            other => Err(Error::invalid(
                "tab",
                format!("\"{}\" is not a valid choice.", other),
            )),
        }
    }
}

/// Parse the `filter` parameter. `All` means no status filter.
pub fn parse_status_filter(raw: &str) -> Result<Option<ContributionStatus>> {
    if raw == "All" {
        return Ok(None);
    }
    raw.parse::<ContributionStatus>()
        .map(Some)
        .map_err(|message| Error::invalid("filter", message))
}

/// Listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionQuery {
    pub tab: Option<Tab>,
    pub user: Option<UserId>,
    pub status: Option<ContributionStatus>,
    /// One-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ContributionQuery {
    fn default() -> Self {
        Self {
            tab: None,
            user: None,
            status: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Convert the results while keeping the paging fields. Stops at the
    /// first error.
    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        Ok(Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect::<Result<Vec<_>>>()?,
        })
    }
}

/// List contributions newest first.
pub fn list(r: &impl Reader, query: &ContributionQuery) -> Result<Page<Contribution>> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);

    let mut matching = r.filter::<Contribution>(|c| {
        let tab_ok = match (query.tab, query.user) {
            (Some(Tab::Mine), Some(user)) => c.author == user,
            (Some(Tab::Mine), None) => false,
            (Some(Tab::Others), Some(user)) => c.author != user,
            (Some(Tab::Others), None) | (None, _) => true,
        };
        tab_ok && query.status.is_none_or(|status| c.status == status)
    })?;
    matching.sort_by(|a, b| {
        b.date_published
            .cmp(&a.date_published)
            .then(b.id.cmp(&a.id))
    });

    let count = matching.len();
    let skip = (page - 1).saturating_mul(page_size);
    let results = matching.into_iter().skip(skip).take(page_size).collect();
    Ok(Page {
        count,
        page,
        page_size,
        results,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::SuitabilityLevelId;
    use crate::storage::Store;
    use crate::suitability;
    use crate::types::Role;
    use chrono::TimeZone;

    fn setup() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let store = Store::open(dir.path().join("contributions.redb"))
            .unwrap_or_else(|e| unreachable!("open: {e}"));
        let seeded = store.write(suitability::seed);
        assert!(seeded.is_ok());
        (dir, store)
    }

    fn user(id: u64, role: Role) -> User {
        User {
            id: UserId(id),
            email: format!("user{id}@example.org"),
            first_name: "Test".to_string(),
            last_name: format!("User {id}"),
            role,
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0)
            .single()
            .unwrap_or_default()
    }

    fn draft(crop: &str) -> ContributionDraft {
        ContributionDraft {
            title: "Upland plot".to_string(),
            address: "Los Baños, Laguna".to_string(),
            description: "Well drained loam".to_string(),
            crop: TaxonRef::Name(crop.to_string()),
            crop_element: None,
            suitability_level: SuitabilityLevelId(1),
            geom: vec![Polygon::new(vec![
                [121.0, 14.0],
                [121.1, 14.0],
                [121.1, 14.1],
                [121.0, 14.0],
            ])],
        }
    }

    #[test]
    fn blank_fields_are_reported_together() {
        let (_dir, store) = setup();
        let mut bad = draft("Coffee");
        bad.title = "   ".to_string();
        bad.geom.clear();
        bad.suitability_level = SuitabilityLevelId(99);

        let err = store
            .write(|tx| create(tx, &user(1, Role::Contributor), bad, at(0)))
            .err();
        match err {
            Some(Error::Validation(fields)) => {
                assert!(fields.get("title").is_some());
                assert!(fields.get("geom").is_some());
                assert!(fields.get("suitability_level").is_some());
            }
            other => unreachable!("expected validation error, got {other:?}"),
        }
        assert_eq!(store.read(|tx| tx.count::<Crop>()).ok(), Some(0));
    }

    #[test]
    fn only_admins_change_status() {
        let (_dir, store) = setup();
        let author = user(1, Role::Contributor);
        let created = store.write(|tx| create(tx, &author, draft("Coffee"), at(0)));
        let id = created.map(|c| c.id).unwrap_or(ContributionId(0));

        let denied = store.write(|tx| set_status(tx, id, ContributionStatus::Approved, &author, at(1)));
        assert!(matches!(denied, Err(Error::Forbidden(_))));
    }

    #[test]
    fn reviewed_contribution_cannot_transition_again() {
        let (_dir, store) = setup();
        let admin = user(9, Role::Administrator);
        let created = store.write(|tx| create(tx, &user(1, Role::Contributor), draft("Corn"), at(0)));
        let id = created.map(|c| c.id).unwrap_or(ContributionId(0));

        let approved = store.write(|tx| set_status(tx, id, ContributionStatus::Approved, &admin, at(1)));
        assert!(approved.is_ok());
        let again = store.write(|tx| set_status(tx, id, ContributionStatus::Rejected, &admin, at(2)));
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn editor_joins_contributors_once() {
        let (_dir, store) = setup();
        let author = user(1, Role::Contributor);
        let editor = user(2, Role::Contributor);
        let created = store.write(|tx| create(tx, &author, draft("Cacao"), at(0)));
        let id = created.map(|c| c.id).unwrap_or(ContributionId(0));

        let _ = store.write(|tx| update(tx, id, &editor, draft("Cacao"), at(1)));
        let _ = store.write(|tx| update(tx, id, &author, draft("Cacao"), at(2)));
        let edited = store.write(|tx| update(tx, id, &editor, draft("Cacao"), at(3)));

        let contributors = edited.map(|c| c.contributors).unwrap_or_default();
        assert_eq!(contributors, BTreeSet::from([UserId(2)]));
    }

    #[test]
    fn listing_splits_by_tab_and_pages() {
        let (_dir, store) = setup();
        let ana = user(1, Role::Contributor);
        let ben = user(2, Role::Contributor);
        for minute in 0..3 {
            let _ = store.write(|tx| create(tx, &ana, draft("Coffee"), at(minute)));
        }
        let _ = store.write(|tx| create(tx, &ben, draft("Coffee"), at(10)));

        let mine = ContributionQuery {
            tab: Some(Tab::Mine),
            user: Some(ana.id),
            page_size: 2,
            ..ContributionQuery::default()
        };
        let page = store.read(|tx| list(tx, &mine)).ok();
        assert_eq!(page.as_ref().map(|p| p.count), Some(3));
        assert_eq!(page.as_ref().map(|p| p.results.len()), Some(2));
        let newest = page.and_then(|p| p.results.first().map(|c| c.date_published));
        assert_eq!(newest, Some(at(2)));

        let others = ContributionQuery {
            tab: Some(Tab::Others),
            user: Some(ana.id),
            ..ContributionQuery::default()
        };
        let page = store.read(|tx| list(tx, &others)).ok();
        assert_eq!(page.map(|p| p.count), Some(1));

        let beyond = ContributionQuery {
            page: 5,
            ..ContributionQuery::default()
        };
        let page = store.read(|tx| list(tx, &beyond)).ok();
        assert_eq!(page.map(|p| (p.count, p.results.len())), Some((4, 0)));
    }

    #[test]
    fn filter_and_tab_parsing() {
        assert_eq!(parse_status_filter("All").ok(), Some(None));
        assert_eq!(
            parse_status_filter("Rejected").ok(),
            Some(Some(ContributionStatus::Rejected))
        );
        assert!(parse_status_filter("Done").is_err());
        assert_eq!("My Contributions".parse::<Tab>().ok(), Some(Tab::Mine));
        assert!("Everything".parse::<Tab>().is_err());
    }
}
