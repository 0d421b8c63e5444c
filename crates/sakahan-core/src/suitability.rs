//! # Suitability Levels
//!
//! The fixed grading scale. Levels are seeded once at `init` and are read-only
//! afterwards. The gridcode encodes the grade (`1`, `2`, `3`) in its tens digit
//! and the limiting factors in its units digit.

use crate::error::Result;
use crate::primitives::SuitabilityLevelId;
use crate::storage::{Reader, WriteTx};
use crate::types::SuitabilityLevel;

/// `(label, name, gridcode, color)` of every seeded level.
const SEED: [(&str, &str, i32, &str); 15] = [
    ("S1", "Highly suitable", 10, "#1d6400"),
    ("S2 e", "Moderately suitable with limitation in elevation", 21, "#2c9d00"),
    ("S2 t", "Moderately suitable with limitation in slope", 22, "#c6ff58"),
    ("S2 s", "Moderately suitable with limitation in soil", 23, "#e2e700"),
    ("S2 et", "Moderately suitable with limitation in elevation and slope", 24, "#9900e3"),
    ("S2 ts", "Moderately suitable with limitation in slope and soil", 25, "#f55ba8"),
    ("S2 es", "Moderately suitable with limitation in elevation and soil", 26, "#9bff00"),
    ("S2 ets", "Moderately suitable with limitation in elevation, slope and soil", 27, "#df3500"),
    ("S3 e", "Marginally suitable with limitation in elevation", 31, "#5d9d00"),
    ("S3 t", "Marginally suitable with limitation in slope", 32, "#3ee900"),
    ("S3 s", "Marginally suitable with limitation in soil", 33, "#ffff00"),
    ("S3 et", "Marginally suitable with limitation in elevation and slope", 34, "#e0009b"),
    ("S3 ts", "Marginally suitable with limitation in slope and soil", 35, "#ffabe3"),
    ("S3 es", "Marginally suitable with limitation in elevation and soil", 36, "#87e700"),
    ("S3 ets", "Marginally suitable with limitation in elevation, slope and soil", 37, "#e00000"),
];

/// Insert every level whose gridcode is not yet stored. Returns how many
/// were inserted.
pub fn seed(tx: &mut WriteTx) -> Result<usize> {
    let existing = tx.scan::<SuitabilityLevel>()?;
    let mut inserted = 0usize;
    for (label, name, gridcode, color) in SEED {
        if existing.iter().any(|level| level.gridcode == gridcode) {
            continue;
        }
        let level = SuitabilityLevel {
            id: SuitabilityLevelId(tx.next_id::<SuitabilityLevel>()?),
            name: name.to_string(),
            label: label.to_string(),
            gridcode,
            color: color.to_string(),
        };
        tx.put(&level)?;
        inserted = inserted.saturating_add(1);
    }
    if inserted > 0 {
        tracing::info!(inserted, "seeded suitability levels");
    }
    Ok(inserted)
}

/// All levels ordered by gridcode.
pub fn list(r: &impl Reader) -> Result<Vec<SuitabilityLevel>> {
    let mut levels = r.scan::<SuitabilityLevel>()?;
    levels.sort_by_key(|level| level.gridcode);
    Ok(levels)
}

/// Number of levels `seed` installs on an empty database.
#[must_use]
pub fn seed_len() -> usize {
    SEED.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    #[test]
    fn seeding_is_idempotent() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let store = Store::open(dir.path().join("levels.redb"))
            .unwrap_or_else(|e| unreachable!("open: {e}"));

        assert_eq!(store.write(seed).ok(), Some(seed_len()));
        assert_eq!(store.write(seed).ok(), Some(0));

        let levels = store.read(|tx| list(tx)).unwrap_or_default();
        assert_eq!(levels.len(), seed_len());
        assert_eq!(levels.first().map(|l| l.label.as_str()), Some("S1"));
        assert_eq!(levels.last().map(|l| l.gridcode), Some(37));
    }

    #[test]
    fn gridcode_tens_digit_matches_label_grade() {
        for (label, _, gridcode, _) in SEED {
            let grade = label.chars().nth(1).and_then(|c| c.to_digit(10));
            assert_eq!(grade.map(|g| g as i32), Some(gridcode / 10));
        }
    }
}
