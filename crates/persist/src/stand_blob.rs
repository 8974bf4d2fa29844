// ---------------------------------------------------------------------------
// stand_blob – Stand-scoped tree/sapling blob (§4.11 "stand-scoped state",
// §6 "Binary stand-snapshot blobs begin with a 32-bit magic 0xFFEEEEDD")
// ---------------------------------------------------------------------------
//
// A stand-snapshot blob is a lighter-weight sibling of the full landscape
// snapshot in `snapshot.rs`: it carries only the trees and saplings of the
// resource units wholly contained in one stand, addressed by stand id
// rather than by raster position. Loading a blob first replaces (not merges)
// the trees/saplings of every resource unit it names.
//
// A resource unit only has a single overlap fraction with its stand (no
// per-tree ground position is tracked beyond the owning resource unit), so
// a stand's blob is built from the resource units it fully contains
// (overlap fraction ~1.0); partially overlapping resource units are left to
// the full landscape snapshot rather than split at an ambiguous boundary.

use crate::save_error::SaveError;
use bitcode::{Decode, Encode};
use forest_core::model::Model;
use forest_core::sapling::SaplingCell;
use forest_core::stand_grid::StandIndexEntry;
use forest_core::tree::Tree;

/// Magic bytes identifying a stand-snapshot blob (§6).
pub const STAND_BLOB_MAGIC: u32 = 0xFFEE_EEDD;

const FULL_OVERLAP_THRESHOLD: f64 = 1.0 - 1e-6;

/// One resource unit's worth of state within a stand blob.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct StandUnitBlob {
    pub ru_index: usize,
    pub trees: Vec<Tree>,
    pub saplings: Vec<SaplingCell>,
}

/// A stand-scoped binary blob (§4.11).
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct StandBlob {
    pub stand_id: i32,
    pub units: Vec<StandUnitBlob>,
}

impl StandBlob {
    /// Captures the resource units `entry` reports as fully inside
    /// `stand_id` (§4.10 "RU overlap index").
    pub fn capture(model: &Model, stand_id: i32, entry: &StandIndexEntry) -> Self {
        let units = entry
            .ru_overlaps
            .iter()
            .filter(|(_, fraction)| *fraction >= FULL_OVERLAP_THRESHOLD)
            .filter_map(|(ru_index, _)| model.resource_units.get(*ru_index))
            .map(|ru| StandUnitBlob {
                ru_index: ru.index,
                trees: ru.trees.clone(),
                saplings: ru.saplings.clone(),
            })
            .collect();

        Self { stand_id, units }
    }

    /// Replaces the trees and saplings of every named resource unit with
    /// this blob's contents (§4.11 "remove then stream back").
    pub fn restore_into(&self, model: &mut Model) {
        for unit in &self.units {
            if let Some(ru) = model.resource_units.get_mut(unit.ru_index) {
                ru.trees = unit.trees.clone();
                ru.saplings = unit.saplings.clone();
            }
        }
    }

    /// Encode to bytes: a 4-byte magic header followed by the bitcode
    /// payload. No checksum or compression — stand blobs are small and
    /// short-lived compared to a full landscape snapshot.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&STAND_BLOB_MAGIC.to_le_bytes());
        out.extend_from_slice(&bitcode::encode(self));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SaveError> {
        if bytes.len() < 4 {
            return Err(SaveError::Decode("stand blob is shorter than the magic header".to_string()));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != STAND_BLOB_MAGIC {
            return Err(SaveError::Decode(format!(
                "stand blob has wrong magic bytes (expected {STAND_BLOB_MAGIC:#010X}, got {magic:#010X})"
            )));
        }
        bitcode::decode(&bytes[4..]).map_err(|e| SaveError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forest_core::stand_grid::{StandGrid, StandIndex};
    use forest_core::test_harness::monoculture_landscape;

    fn single_ru_stand_index(model: &forest_core::Model) -> StandIndex {
        let rect = model.ru_grid.rect();
        let ids = forest_core::grid::Grid::new(
            model.ru_grid.size_x() * 10,
            model.ru_grid.size_y() * 10,
            10.0,
            rect.x,
            rect.y,
            1,
        );
        StandGrid::new(ids).build_index(|_, _| Some(0))
    }

    #[test]
    fn capture_only_includes_fully_overlapping_resource_units() {
        let model = monoculture_landscape(100.0, 100.0, 20.0, 3, 12.0);
        let index = single_ru_stand_index(&model);
        let entry = index.entry(1).unwrap();
        let blob = StandBlob::capture(&model, 1, entry);
        assert_eq!(blob.units.len(), 1);
        assert_eq!(blob.units[0].trees.len(), 3);
    }

    #[test]
    fn encode_decode_roundtrips_and_checks_magic() {
        let model = monoculture_landscape(100.0, 100.0, 20.0, 2, 10.0);
        let index = single_ru_stand_index(&model);
        let entry = index.entry(1).unwrap();
        let blob = StandBlob::capture(&model, 1, entry);

        let bytes = blob.encode();
        let decoded = StandBlob::decode(&bytes).unwrap();
        assert_eq!(decoded.stand_id, 1);
        assert_eq!(decoded.units.len(), blob.units.len());

        let mut corrupted = bytes.clone();
        corrupted[0] ^= 0xFF;
        assert!(StandBlob::decode(&corrupted).is_err());
    }

    #[test]
    fn restore_replaces_named_resource_units_trees() {
        let model = monoculture_landscape(100.0, 100.0, 20.0, 4, 10.0);
        let index = single_ru_stand_index(&model);
        let entry = index.entry(1).unwrap();
        let blob = StandBlob::capture(&model, 1, entry);

        let mut fresh = monoculture_landscape(100.0, 100.0, 20.0, 0, 0.0);
        blob.restore_into(&mut fresh);
        assert_eq!(fresh.resource_units[0].trees.len(), 4);
    }
}
