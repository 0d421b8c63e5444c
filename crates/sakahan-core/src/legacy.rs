//! # Legacy Taxonomy
//!
//! The crop list of the dataset that predates crowdsourcing. It lives in its
//! own tables, never takes part in reconciliation, and is served read-only.
//! Rows are added by import tooling through [`add_crop`] and [`add_element`].

use crate::error::{Error, Result};
use crate::primitives::{LegacyCropElementId, LegacyCropId};
use crate::storage::{Reader, WriteTx};
use crate::taxonomy::clean_name;
use crate::types::{LegacyCrop, LegacyCropElement};

/// Insert a legacy crop. Names are unique.
pub fn add_crop(tx: &mut WriteTx, name: &str, published: bool) -> Result<LegacyCrop> {
    let name = clean_name("name", name)?;
    if tx.any::<LegacyCrop>(|crop| crop.name == name)? {
        return Err(Error::invalid(
            "name",
            "legacy crop with this name already exists.",
        ));
    }
    let crop = LegacyCrop {
        id: LegacyCropId(tx.next_id::<LegacyCrop>()?),
        name,
        published,
    };
    tx.put(&crop)?;
    tracing::debug!(crop = %crop.id, name = %crop.name, "added legacy crop");
    Ok(crop)
}

/// Insert a legacy element under an existing legacy crop. Names are unique
/// within a crop.
pub fn add_element(
    tx: &mut WriteTx,
    name: &str,
    category: LegacyCropId,
    published: bool,
) -> Result<LegacyCropElement> {
    let name = clean_name("name", name)?;
    tx.require::<LegacyCrop>(category.0)?;
    if tx.any::<LegacyCropElement>(|element| {
        element.category == category && element.name == name
    })? {
        return Err(Error::invalid(
            "name",
            "legacy crop element with this name and category already exists.",
        ));
    }
    let element = LegacyCropElement {
        id: LegacyCropElementId(tx.next_id::<LegacyCropElement>()?),
        name,
        category,
        published,
    };
    tx.put(&element)?;
    tracing::debug!(element = %element.id, crop = %category, "added legacy crop element");
    Ok(element)
}

/// Every legacy crop, in id order.
pub fn crops(r: &impl Reader) -> Result<Vec<LegacyCrop>> {
    r.scan::<LegacyCrop>()
}

/// Every legacy element paired with its crop, in id order.
pub fn elements(r: &impl Reader) -> Result<Vec<(LegacyCropElement, LegacyCrop)>> {
    r.scan::<LegacyCropElement>()?
        .into_iter()
        .map(|element| {
            let category = r.require::<LegacyCrop>(element.category.0)?;
            Ok((element, category))
        })
        .collect()
}

/// One legacy element with its crop.
pub fn element(r: &impl Reader, id: u64) -> Result<(LegacyCropElement, LegacyCrop)> {
    let element = r.require::<LegacyCropElement>(id)?;
    let category = r.require::<LegacyCrop>(element.category.0)?;
    Ok((element, category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::Crop;

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let store = Store::open(dir.path().join("legacy.redb"))
            .unwrap_or_else(|e| unreachable!("open: {e}"));
        (dir, store)
    }

    #[test]
    fn elements_carry_their_crop_code() {
        let (_dir, store) = open_temp();
        store
            .write(|tx| {
                let rice = add_crop(tx, "Upland Rice", true)?;
                add_element(tx, "Dry Season", rice.id, true)?;
                add_element(tx, "Wet Season", rice.id, false)?;
                Ok(())
            })
            .unwrap_or_else(|e| unreachable!("seed: {e}"));

        let listed = store
            .read(|tx| elements(tx))
            .unwrap_or_else(|e| unreachable!("elements: {e}"));
        let codes: Vec<String> = listed.iter().map(|(e, c)| e.code(c)).collect();
        assert_eq!(codes, vec!["dry_season_upland_rice", "wet_season_upland_rice"]);
        assert!(!listed[1].0.published);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (_dir, store) = open_temp();
        let (rice, corn) = store
            .write(|tx| Ok((add_crop(tx, "Rice", true)?, add_crop(tx, "Corn", true)?)))
            .unwrap_or_else(|e| unreachable!("seed: {e}"));

        assert!(matches!(
            store.write(|tx| add_crop(tx, " Rice ", false)),
            Err(Error::Validation(_))
        ));

        assert!(store.write(|tx| add_element(tx, "Hybrid", rice.id, true)).is_ok());
        assert!(matches!(
            store.write(|tx| add_element(tx, "Hybrid", rice.id, true)),
            Err(Error::Validation(_))
        ));
        assert!(store.write(|tx| add_element(tx, "Hybrid", corn.id, true)).is_ok());

        let missing = store.write(|tx| add_element(tx, "Hybrid", LegacyCropId(99), true));
        assert!(matches!(missing, Err(Error::NotFound { id: 99, .. })));
    }

    #[test]
    fn legacy_records_stay_out_of_the_live_taxonomy() {
        let (_dir, store) = open_temp();
        store
            .write(|tx| add_crop(tx, "Coffee", true))
            .unwrap_or_else(|e| unreachable!("seed: {e}"));

        let counts = store.counts().unwrap_or_else(|e| unreachable!("counts: {e}"));
        assert_eq!(counts.legacy_crops, 1);
        assert_eq!(counts.crops, 0);
        assert_eq!(store.read(|tx| tx.count::<Crop>()).ok(), Some(0));
    }
}
