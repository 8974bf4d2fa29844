// ---------------------------------------------------------------------------
// snapshot – Whole-landscape save/load (§4.11 "Snapshot I/O", §6 "Snapshot
// file format")
// ---------------------------------------------------------------------------
//
// Two artifacts make up a landscape snapshot:
//   1. a binary data store holding, per resource unit, the tables {trees,
//      saplings, soil, snag} (dead trees travel inside `Snag::dead_trees`,
//      so there is no separate dead-tree table);
//   2. a 100 m integer raster of RU indices, so a load can line a saved RU
//      up with the RU occupying the same ground in the current landscape
//      even if resource units were built in a different order.
//
// Encoding: each resource unit's tables already derive `bitcode::Encode` /
// `Decode` directly (the same bitcode-derive-on-the-domain-type pattern used
// throughout `forest-core`). The metadata and the body are encoded as two
// separate bitcode trees, length-prefixed and concatenated, so that
// `LandscapeSnapshot::read_metadata_only` can decode the metadata without
// paying for the (potentially large) body. The combined bytes are
// lz4-compressed, then wrapped with the file header from `file_header`
// (magic, format version, checksum).

use crate::file_header::{self, UnwrapResult};
use crate::save_error::SaveError;
use crate::save_metadata::SnapshotMetadata;
use bitcode::{Decode, Encode};
use forest_core::model::Model;
use forest_core::resource_unit::ResourceUnit;
use forest_core::sapling::SaplingCell;
use forest_core::snag::Snag;
use forest_core::soil::Soil;
use forest_core::tree::Tree;
#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::io::Write;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

/// Geographic placement of the RU-index raster: a 100 m grid, matched
/// against the loading landscape's own RU grid before any RU is restored.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
struct RasterHeader {
    size_x: i32,
    size_y: i32,
    cell_size: f64,
    origin_x: f64,
    origin_y: f64,
}

/// The saved state of a single resource unit (§4.11 "stand-scoped state").
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct RuSnapshot {
    pub trees: Vec<Tree>,
    pub saplings: Vec<SaplingCell>,
    pub soil: Option<Soil>,
    pub snag: Option<Snag>,
}

impl RuSnapshot {
    fn from_ru(ru: &ResourceUnit) -> Self {
        Self {
            trees: ru.trees.clone(),
            saplings: ru.saplings.clone(),
            soil: ru.soil.clone(),
            snag: ru.snag.clone(),
        }
    }

    fn apply_to(&self, ru: &mut ResourceUnit) {
        ru.trees = self.trees.clone();
        ru.saplings = self.saplings.clone();
        ru.soil = self.soil.clone();
        ru.snag = self.snag.clone();
    }
}

/// Everything in a landscape snapshot besides the quick-access metadata,
/// encoded as its own bitcode tree so a metadata-only read never has to
/// touch the (potentially large) tree/sapling/soil/snag tables.
#[derive(Debug, Clone, Encode, Decode)]
struct SnapshotBody {
    raster: RasterHeader,
    /// Parallel to the raster: `-1` for an unoccupied cell, otherwise an
    /// index into `units`.
    ru_index: Vec<i32>,
    units: Vec<RuSnapshot>,
}

/// A full landscape snapshot: metadata, the RU-index raster, and one
/// [`RuSnapshot`] per occupied raster cell.
#[derive(Debug, Clone)]
pub struct LandscapeSnapshot {
    pub metadata: SnapshotMetadata,
    body: SnapshotBody,
}

impl LandscapeSnapshot {
    /// Capture every resource unit of `model` (§4.11 "save").
    pub fn capture(model: &Model) -> Self {
        let rect = model.ru_grid.rect();
        let raster = RasterHeader {
            size_x: model.ru_grid.size_x(),
            size_y: model.ru_grid.size_y(),
            cell_size: model.ru_grid.cell_size(),
            origin_x: rect.x,
            origin_y: rect.y,
        };

        let units: Vec<RuSnapshot> = model.resource_units.iter().map(RuSnapshot::from_ru).collect();
        let ru_index: Vec<i32> = model
            .ru_grid
            .iter()
            .map(|slot| slot.map(|i| i as i32).unwrap_or(-1))
            .collect();

        let live_tree_count: u64 = model.resource_units.iter().map(|ru| ru.live_tree_count() as u64).sum();
        let metadata = SnapshotMetadata {
            year: model.year,
            width_m: model.config.model.world.width,
            height_m: model.config.model.world.height,
            ru_size_m: raster.cell_size,
            random_seed: model.config.model.settings.random_seed,
            species_count: model.species_sets.first().map(|s| s.len() as u32).unwrap_or(0),
            live_tree_count,
        };

        Self {
            metadata,
            body: SnapshotBody { raster, ru_index, units },
        }
    }

    /// Restore every resource unit of `model` from this snapshot (§4.11
    /// "load"). Requires the snapshot's RU raster to share cell size and
    /// origin with `model`'s own grid; a mismatched origin or resource-unit
    /// size would silently mislocate stands, so it is rejected instead.
    pub fn restore_into(&self, model: &mut Model) -> Result<(), SaveError> {
        let raster = &self.body.raster;
        let rect = model.ru_grid.rect();
        if (raster.cell_size - model.ru_grid.cell_size()).abs() > f64::EPSILON {
            return Err(SaveError::MigrationFailed(format!(
                "snapshot resource-unit size {} m does not match landscape resource-unit size {} m",
                raster.cell_size,
                model.ru_grid.cell_size()
            )));
        }
        if (raster.origin_x - rect.x).abs() > f64::EPSILON || (raster.origin_y - rect.y).abs() > f64::EPSILON {
            return Err(SaveError::MigrationFailed(format!(
                "snapshot raster origin ({}, {}) is not aligned with the landscape origin ({}, {})",
                raster.origin_x, raster.origin_y, rect.x, rect.y
            )));
        }

        for y in 0..raster.size_y.min(model.ru_grid.size_y()) {
            for x in 0..raster.size_x.min(model.ru_grid.size_x()) {
                let raster_pos = (y * raster.size_x + x) as usize;
                let Some(&source_idx) = self.body.ru_index.get(raster_pos) else {
                    continue;
                };
                if source_idx < 0 {
                    continue;
                }
                let Some(unit) = self.body.units.get(source_idx as usize) else {
                    continue;
                };
                if let Some(current_idx) = model.ru_grid.get(x, y).copied().flatten() {
                    unit.apply_to(&mut model.resource_units[current_idx]);
                }
            }
        }
        Ok(())
    }

    /// Encode to bytes: `[u32 metadata length][metadata][body]`, lz4
    /// compressed, then wrapped with the file header.
    pub fn encode(&self) -> Vec<u8> {
        let meta_bytes = self.metadata.encode();
        let body_bytes = bitcode::encode(&self.body);
        let mut combined = Vec::with_capacity(4 + meta_bytes.len() + body_bytes.len());
        combined.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        combined.extend_from_slice(&meta_bytes);
        combined.extend_from_slice(&body_bytes);

        let compressed = lz4_flex::compress_prepend_size(&combined);
        file_header::wrap_with_header(&compressed)
    }

    /// Decode from bytes produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, SaveError> {
        let combined = Self::decompressed_payload(bytes)?;
        let (meta_bytes, body_bytes) = Self::split_sections(&combined)?;
        let metadata = SnapshotMetadata::decode(meta_bytes).map_err(|e| SaveError::Decode(e.to_string()))?;
        let body = bitcode::decode(body_bytes).map_err(|e| SaveError::Decode(e.to_string()))?;
        Ok(Self { metadata, body })
    }

    /// Reads only the metadata section, skipping the (possibly large) body.
    /// Still has to decompress the lz4 stream, but avoids the bitcode
    /// decode of every resource unit's trees and saplings.
    pub fn read_metadata_only(bytes: &[u8]) -> Result<SnapshotMetadata, SaveError> {
        let combined = Self::decompressed_payload(bytes)?;
        let (meta_bytes, _) = Self::split_sections(&combined)?;
        SnapshotMetadata::decode(meta_bytes).map_err(|e| SaveError::Decode(e.to_string()))
    }

    fn decompressed_payload(bytes: &[u8]) -> Result<Vec<u8>, SaveError> {
        let payload = match file_header::unwrap_header(bytes).map_err(SaveError::MigrationFailed)? {
            UnwrapResult::WithHeader { payload, .. } => payload,
            UnwrapResult::Legacy(payload) => payload,
        };
        lz4_flex::decompress_size_prepended(payload).map_err(|e| SaveError::Decode(format!("snapshot decompression failed: {e}")))
    }

    fn split_sections(combined: &[u8]) -> Result<(&[u8], &[u8]), SaveError> {
        if combined.len() < 4 {
            return Err(SaveError::Decode("snapshot payload shorter than its metadata length prefix".to_string()));
        }
        let meta_len = u32::from_le_bytes([combined[0], combined[1], combined[2], combined[3]]) as usize;
        let rest = &combined[4..];
        if rest.len() < meta_len {
            return Err(SaveError::Decode("snapshot metadata section is truncated".to_string()));
        }
        Ok(rest.split_at(meta_len))
    }

    /// Writes this snapshot's encoded bytes to `path` using the write-temp-
    /// then-rename pattern: write to `{path}.tmp`, `sync_all()` to flush to
    /// disk, then `rename` onto the final path. A crash mid-write leaves the
    /// previous snapshot at `path` untouched.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn write_to_file(&self, path: &Path) -> Result<(), SaveError> {
        let bytes = self.encode();
        let tmp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Reads and decodes a snapshot previously written by [`Self::write_to_file`].
    #[cfg(not(target_arch = "wasm32"))]
    pub fn read_from_file(path: &Path) -> Result<Self, SaveError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forest_core::test_harness::monoculture_landscape;

    #[test]
    fn capture_then_restore_preserves_tree_counts() {
        let model = monoculture_landscape(200.0, 100.0, 20.0, 3, 15.0);
        let snapshot = LandscapeSnapshot::capture(&model);

        let mut fresh = monoculture_landscape(200.0, 100.0, 20.0, 0, 0.0);
        snapshot.restore_into(&mut fresh).unwrap();

        for (original, restored) in model.resource_units.iter().zip(fresh.resource_units.iter()) {
            assert_eq!(original.trees.len(), restored.trees.len());
        }
    }

    #[test]
    fn encode_decode_roundtrips_through_bytes() {
        let model = monoculture_landscape(100.0, 100.0, 20.0, 2, 10.0);
        let snapshot = LandscapeSnapshot::capture(&model);
        let bytes = snapshot.encode();
        let decoded = LandscapeSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded.metadata.live_tree_count, snapshot.metadata.live_tree_count);
    }

    #[test]
    fn mismatched_origin_is_rejected() {
        let model = monoculture_landscape(100.0, 100.0, 20.0, 1, 10.0);
        let mut snapshot = LandscapeSnapshot::capture(&model);
        snapshot.body.raster.origin_x += 100.0;

        let mut fresh = monoculture_landscape(100.0, 100.0, 20.0, 0, 0.0);
        assert!(snapshot.restore_into(&mut fresh).is_err());
    }

    #[test]
    fn write_then_read_from_file_roundtrips() {
        let dir = format!("/tmp/forest_snapshot_write_test_{}", std::process::id());
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = std::path::Path::new(&dir).join("landscape.snap");

        let model = monoculture_landscape(100.0, 100.0, 20.0, 2, 10.0);
        let snapshot = LandscapeSnapshot::capture(&model);
        snapshot.write_to_file(&path).unwrap();

        assert!(!path.with_extension("tmp").exists());
        let loaded = LandscapeSnapshot::read_from_file(&path).unwrap();
        assert_eq!(loaded.metadata.live_tree_count, snapshot.metadata.live_tree_count);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_to_file_overwrites_existing() {
        let dir = format!("/tmp/forest_snapshot_overwrite_test_{}", std::process::id());
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = std::path::Path::new(&dir).join("landscape.snap");

        let first = LandscapeSnapshot::capture(&monoculture_landscape(100.0, 100.0, 20.0, 1, 10.0));
        first.write_to_file(&path).unwrap();
        let second = LandscapeSnapshot::capture(&monoculture_landscape(100.0, 100.0, 20.0, 3, 10.0));
        second.write_to_file(&path).unwrap();

        let loaded = LandscapeSnapshot::read_from_file(&path).unwrap();
        assert_eq!(loaded.metadata.live_tree_count, second.metadata.live_tree_count);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
