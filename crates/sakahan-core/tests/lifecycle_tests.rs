//! Integration tests for the contribution lifecycle and taxonomy
//! reconciliation.
//!
//! Every test runs against a fresh redb database in a temp directory.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use sakahan_core::{
    contribution, suitability, taxonomy, Contribution, ContributionDraft, ContributionId,
    ContributionStatus, Crop, CropElement, Error, GeometryFeature, Polygon, Reader, Role, Store,
    SuitabilityLevelId, TaxonRef, User, UserId,
};
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn setup() -> (TempDir, Store) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = Store::open(dir.path().join("sakahan.redb")).expect("Failed to open store");
    store.write(suitability::seed).expect("Failed to seed levels");
    (dir, store)
}

fn contributor(id: u64) -> User {
    User {
        id: UserId(id),
        email: format!("farmer{id}@example.org"),
        first_name: "Farmer".to_string(),
        last_name: id.to_string(),
        role: Role::Contributor,
    }
}

fn admin() -> User {
    User {
        id: UserId(100),
        email: "admin@example.org".to_string(),
        first_name: "Admin".to_string(),
        last_name: "User".to_string(),
        role: Role::Administrator,
    }
}

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap()
}

fn draft(crop: &str, element: Option<&str>) -> ContributionDraft {
    ContributionDraft {
        title: "Hillside plot".to_string(),
        address: "Lipa, Batangas".to_string(),
        description: "Clay loam, moderate slope".to_string(),
        crop: TaxonRef::Name(crop.to_string()),
        crop_element: element.map(|e| TaxonRef::Name(e.to_string())),
        suitability_level: SuitabilityLevelId(3),
        geom: vec![
            Polygon::new(vec![[121.1, 13.9], [121.2, 13.9], [121.2, 14.0], [121.1, 13.9]]),
            Polygon::new(vec![[121.3, 13.9], [121.4, 13.9], [121.4, 14.0], [121.3, 13.9]]),
        ],
    }
}

fn create(store: &Store, author: &User, draft: ContributionDraft, minute: u32) -> Contribution {
    store
        .write(|tx| contribution::create(tx, author, draft, at(minute)))
        .unwrap()
}

fn crop(store: &Store, id: sakahan_core::CropId) -> Option<Crop> {
    store.read(|tx| tx.get::<Crop>(id.0)).unwrap()
}

fn element(store: &Store, id: sakahan_core::CropElementId) -> Option<CropElement> {
    store.read(|tx| tx.get::<CropElement>(id.0)).unwrap()
}

fn layers(store: &Store, id: ContributionId) -> Vec<String> {
    store
        .read(|tx| contribution::geometries_of(tx, id))
        .unwrap()
        .into_iter()
        .map(|g| g.layer)
        .collect()
}

// =============================================================================
// CREATE
// =============================================================================

#[test]
fn test_same_new_crop_name_yields_one_crop() {
    let (_dir, store) = setup();
    let first = create(&store, &contributor(1), draft("Coffee", None), 0);
    let second = create(&store, &contributor(2), draft("Coffee", None), 1);

    assert_eq!(first.crop, second.crop);
    assert_eq!(store.read(|tx| tx.count::<Crop>()).unwrap(), 1);
}

#[test]
fn test_create_derives_layers_and_gridcode() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Lowland Rice", Some("Wet Season")), 0);

    let geometries = store
        .read(|tx| contribution::geometries_of(tx, created.id))
        .unwrap();
    assert_eq!(geometries.len(), 2);
    for geometry in geometries {
        assert_eq!(geometry.layer, "wet_season_lowland_rice");
        assert_eq!(geometry.gridcode, 22);
        assert!(geometry.published);
    }
    assert_eq!(created.status, ContributionStatus::Pending);
}

#[test]
fn test_create_revives_soft_deleted_crop() {
    let (_dir, store) = setup();
    let rejected = create(&store, &contributor(1), draft("Durian", None), 0);
    store
        .write(|tx| {
            contribution::set_status(tx, rejected.id, ContributionStatus::Rejected, &admin(), at(1))
        })
        .unwrap();
    assert!(crop(&store, rejected.crop).unwrap().is_deleted);

    let revived = create(&store, &contributor(2), draft("Durian", None), 2);
    assert_eq!(revived.crop, rejected.crop);
    assert!(!crop(&store, revived.crop).unwrap().is_deleted);
}

#[test]
fn test_crop_by_unknown_id_is_not_found() {
    let (_dir, store) = setup();
    let mut bad = draft("Coffee", None);
    bad.crop = TaxonRef::Id(404);

    let result = store.write(|tx| contribution::create(tx, &contributor(1), bad, at(0)));
    assert!(matches!(result, Err(Error::NotFound { kind: "crop", id: 404 })));
    assert_eq!(store.read(|tx| tx.count::<Contribution>()).unwrap(), 0);
}

// =============================================================================
// UPDATE
// =============================================================================

#[test]
fn test_rename_unpublished_crop_in_place_refreshes_layers() {
    let (_dir, store) = setup();
    let first = create(&store, &contributor(1), draft("Cofee", Some("Arabica")), 0);
    let second = create(&store, &contributor(2), draft("Cofee", None), 1);

    let edited = store
        .write(|tx| {
            contribution::update(tx, first.id, &contributor(1), draft("Coffee", Some("Arabica")), at(2))
        })
        .unwrap();

    assert_eq!(edited.crop, first.crop);
    assert_eq!(crop(&store, first.crop).unwrap().name, "Coffee");
    assert!(layers(&store, first.id).iter().all(|l| l == "arabica_coffee"));
    assert!(layers(&store, second.id).iter().all(|l| l == "coffee"));
}

#[test]
fn test_rename_published_crop_forks_new_record() {
    let (_dir, store) = setup();
    let approved = create(&store, &contributor(1), draft("Mango", None), 0);
    create(&store, &contributor(2), draft("Mango", None), 1);
    store
        .write(|tx| {
            contribution::set_status(tx, approved.id, ContributionStatus::Approved, &admin(), at(2))
        })
        .unwrap();

    let edited = store
        .write(|tx| contribution::update(tx, approved.id, &contributor(1), draft("Carabao Mango", None), at(3)))
        .unwrap();

    assert_ne!(edited.crop, approved.crop);
    let original = crop(&store, approved.crop).unwrap();
    assert_eq!(original.name, "Mango");
    assert!(original.published);
    assert_eq!(crop(&store, edited.crop).unwrap().name, "Carabao Mango");
    assert!(layers(&store, approved.id).iter().all(|l| l == "carabao_mango"));
    // Approved geometries stay published after an edit.
    let published = store
        .read(|tx| contribution::geometries_of(tx, approved.id))
        .unwrap()
        .iter()
        .all(|g| g.published);
    assert!(published);
}

#[test]
fn test_clearing_element_deletes_unreferenced_element() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Corn", Some("Dry Season")), 0);
    let element = created.crop_element.unwrap();

    store
        .write(|tx| contribution::update(tx, created.id, &contributor(1), draft("Corn", None), at(1)))
        .unwrap();

    let remaining = store.read(|tx| tx.get::<CropElement>(element.0)).unwrap();
    assert!(remaining.is_none());
    assert!(layers(&store, created.id).iter().all(|l| l == "corn"));
}

#[test]
fn test_switching_to_existing_crop_releases_old_one() {
    let (_dir, store) = setup();
    let banana = create(&store, &contributor(1), draft("Banana", None), 0);
    let cacao = create(&store, &contributor(2), draft("Cacao", None), 1);

    let edited = store
        .write(|tx| contribution::update(tx, cacao.id, &contributor(2), draft("Banana", None), at(2)))
        .unwrap();

    assert_eq!(edited.crop, banana.crop);
    assert!(crop(&store, cacao.crop).is_none());
}

#[test]
fn test_unshared_element_follows_forked_crop() {
    let (_dir, store) = setup();
    let other = create(&store, &contributor(2), draft("Coconut", None), 0);
    store
        .write(|tx| {
            contribution::set_status(tx, other.id, ContributionStatus::Approved, &admin(), at(1))
        })
        .unwrap();
    let created = create(&store, &contributor(1), draft("Coconut", Some("Tall")), 1);

    let edited = store
        .write(|tx| {
            contribution::update(tx, created.id, &contributor(1), draft("Abaca", Some("Tall")), at(2))
        })
        .unwrap();

    // Coconut is published, so Abaca is a new crop.
    assert_ne!(edited.crop, other.crop);
    assert_eq!(edited.crop_element, created.crop_element);
    let element = store
        .read(|tx| tx.require::<CropElement>(edited.crop_element.unwrap().0))
        .unwrap();
    assert_eq!(element.category, edited.crop);
}

#[test]
fn test_rename_unpublished_element_in_place_refreshes_shared_layers() {
    let (_dir, store) = setup();
    let first = create(&store, &contributor(1), draft("Coffee", Some("Arabca")), 0);
    let second = create(&store, &contributor(2), draft("Coffee", Some("Arabca")), 1);
    assert_eq!(first.crop_element, second.crop_element);

    let edited = store
        .write(|tx| {
            contribution::update(tx, first.id, &contributor(1), draft("Coffee", Some("Arabica")), at(2))
        })
        .unwrap();

    assert_eq!(edited.crop_element, first.crop_element);
    let renamed = element(&store, first.crop_element.unwrap()).unwrap();
    assert_eq!(renamed.name, "Arabica");
    assert_eq!(renamed.category, first.crop);
    assert_eq!(store.read(|tx| tx.count::<CropElement>()).unwrap(), 1);
    assert!(layers(&store, first.id).iter().all(|l| l == "arabica_coffee"));
    assert!(layers(&store, second.id).iter().all(|l| l == "arabica_coffee"));
}

#[test]
fn test_rename_published_element_forks_new_record() {
    let (_dir, store) = setup();
    let approved = create(&store, &contributor(1), draft("Coffee", Some("Robusta")), 0);
    let pending = create(&store, &contributor(2), draft("Coffee", Some("Robusta")), 1);
    store
        .write(|tx| {
            contribution::set_status(tx, approved.id, ContributionStatus::Approved, &admin(), at(2))
        })
        .unwrap();

    let edited = store
        .write(|tx| {
            contribution::update(tx, approved.id, &contributor(1), draft("Coffee", Some("Liberica")), at(3))
        })
        .unwrap();

    assert_eq!(edited.crop, approved.crop);
    assert_ne!(edited.crop_element, approved.crop_element);

    let original = element(&store, approved.crop_element.unwrap()).unwrap();
    assert_eq!(original.name, "Robusta");
    assert!(original.published);
    let forked = element(&store, edited.crop_element.unwrap()).unwrap();
    assert_eq!(forked.name, "Liberica");
    assert_eq!(forked.category, approved.crop);
    assert!(layers(&store, approved.id).iter().all(|l| l == "liberica_coffee"));
    assert!(layers(&store, pending.id).iter().all(|l| l == "robusta_coffee"));
}

#[test]
fn test_shared_element_is_forked_not_moved_across_crops() {
    let (_dir, store) = setup();
    let banana = create(&store, &contributor(3), draft("Banana", None), 0);
    let first = create(&store, &contributor(1), draft("Cacao", Some("Criollo")), 1);
    let second = create(&store, &contributor(2), draft("Cacao", Some("Criollo")), 2);

    let edited = store
        .write(|tx| {
            contribution::update(tx, first.id, &contributor(1), draft("Banana", Some("Criollo")), at(3))
        })
        .unwrap();

    assert_eq!(edited.crop, banana.crop);
    assert_ne!(edited.crop_element, first.crop_element);

    let kept = element(&store, first.crop_element.unwrap()).unwrap();
    assert_eq!(kept.name, "Criollo");
    assert_eq!(kept.category, first.crop);
    let forked = element(&store, edited.crop_element.unwrap()).unwrap();
    assert_eq!(forked.name, "Criollo");
    assert_eq!(forked.category, banana.crop);

    assert!(layers(&store, first.id).iter().all(|l| l == "criollo_banana"));
    assert!(layers(&store, second.id).iter().all(|l| l == "criollo_cacao"));
}

#[test]
fn test_failed_update_leaves_store_unchanged() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Pineapple", None), 0);

    let mut bad = draft("Queen Pineapple", None);
    bad.crop_element = Some(TaxonRef::Id(999));
    let result = store.write(|tx| contribution::update(tx, created.id, &contributor(1), bad, at(1)));
    assert!(result.is_err());

    assert_eq!(crop(&store, created.crop).unwrap().name, "Pineapple");
    assert_eq!(store.read(|tx| tx.count::<Crop>()).unwrap(), 1);
    assert!(layers(&store, created.id).iter().all(|l| l == "pineapple"));
}

// =============================================================================
// STATUS
// =============================================================================

#[test]
fn test_approve_publishes_crop_element_and_geometries() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Coffee", Some("Robusta")), 0);

    let approved = store
        .write(|tx| {
            contribution::set_status(tx, created.id, ContributionStatus::Approved, &admin(), at(1))
        })
        .unwrap();
    assert_eq!(approved.status, ContributionStatus::Approved);

    assert!(crop(&store, created.crop).unwrap().published);
    let element = store
        .read(|tx| tx.require::<CropElement>(created.crop_element.unwrap().0))
        .unwrap();
    assert!(element.published);
    let geometries = store.read(|tx| tx.scan::<GeometryFeature>()).unwrap();
    assert!(geometries.iter().all(|g| g.published));
}

#[test]
fn test_reject_only_pending_soft_deletes_crop() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Rambutan", Some("Seedless")), 0);

    store
        .write(|tx| {
            contribution::set_status(tx, created.id, ContributionStatus::Rejected, &admin(), at(1))
        })
        .unwrap();

    assert!(crop(&store, created.crop).unwrap().is_deleted);
    let element = store
        .read(|tx| tx.require::<CropElement>(created.crop_element.unwrap().0))
        .unwrap();
    assert!(element.is_deleted);
    let geometries = store
        .read(|tx| contribution::geometries_of(tx, created.id))
        .unwrap();
    assert!(geometries.iter().all(|g| !g.published));
}

#[test]
fn test_reject_one_of_two_pending_keeps_crop() {
    let (_dir, store) = setup();
    let first = create(&store, &contributor(1), draft("Lanzones", None), 0);
    create(&store, &contributor(2), draft("Lanzones", None), 1);

    store
        .write(|tx| {
            contribution::set_status(tx, first.id, ContributionStatus::Rejected, &admin(), at(2))
        })
        .unwrap();

    assert!(!crop(&store, first.crop).unwrap().is_deleted);
}

#[test]
fn test_reject_keeps_published_crop() {
    let (_dir, store) = setup();
    let approved = create(&store, &contributor(1), draft("Cassava", None), 0);
    let pending = create(&store, &contributor(2), draft("Cassava", None), 1);
    store
        .write(|tx| {
            contribution::set_status(tx, approved.id, ContributionStatus::Approved, &admin(), at(2))
        })
        .unwrap();
    store
        .write(|tx| {
            contribution::set_status(tx, pending.id, ContributionStatus::Rejected, &admin(), at(3))
        })
        .unwrap();

    let cassava = crop(&store, approved.crop).unwrap();
    assert!(cassava.published);
    assert!(!cassava.is_deleted);
}

#[test]
fn test_back_to_pending_is_invalid() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Coffee", None), 0);
    let result = store.write(|tx| {
        contribution::set_status(tx, created.id, ContributionStatus::Pending, &admin(), at(1))
    });
    assert!(matches!(result, Err(Error::InvalidTransition { .. })));
}

// =============================================================================
// DESTROY
// =============================================================================

#[test]
fn test_destroy_last_reference_deletes_crop() {
    let (_dir, store) = setup();
    let author = contributor(1);
    let created = create(&store, &author, draft("Jackfruit", Some("Sweet")), 0);

    let destroyed = store
        .write(|tx| contribution::destroy(tx, created.id, &author))
        .unwrap();
    assert_eq!(destroyed.contribution.id, created.id);

    assert!(crop(&store, created.crop).is_none());
    assert_eq!(store.read(|tx| tx.count::<CropElement>()).unwrap(), 0);
    assert_eq!(store.read(|tx| tx.count::<GeometryFeature>()).unwrap(), 0);
}

#[test]
fn test_destroy_keeps_shared_crop() {
    let (_dir, store) = setup();
    let author = contributor(1);
    let created = create(&store, &author, draft("Calamansi", None), 0);
    create(&store, &contributor(2), draft("Calamansi", None), 1);

    store
        .write(|tx| contribution::destroy(tx, created.id, &author))
        .unwrap();
    assert!(crop(&store, created.crop).is_some());
}

#[test]
fn test_stranger_cannot_destroy() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Coffee", None), 0);
    let result = store.write(|tx| contribution::destroy(tx, created.id, &contributor(2)));
    assert!(matches!(result, Err(Error::Forbidden(_))));
}

// =============================================================================
// DIRECT TAXONOMY EDITS
// =============================================================================

#[test]
fn test_deleting_referenced_crop_is_protected() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Sugarcane", None), 0);

    let result = store.write(|tx| taxonomy::delete_crop(tx, created.crop));
    assert!(matches!(result, Err(Error::Protected(_))));
    assert!(crop(&store, created.crop).is_some());
}

#[test]
fn test_renaming_unpublished_crop_directly_refreshes_layers() {
    let (_dir, store) = setup();
    let created = create(&store, &contributor(1), draft("Peanut", None), 0);

    store
        .write(|tx| {
            taxonomy::update_crop(
                tx,
                created.crop,
                sakahan_core::CropPatch {
                    name: Some("Groundnut".to_string()),
                    published: None,
                },
            )
        })
        .unwrap();

    assert!(layers(&store, created.id).iter().all(|l| l == "groundnut"));
}
