// ---------------------------------------------------------------------------
// save_metadata – Quick-access metadata for landscape snapshot headers
// ---------------------------------------------------------------------------
//
// SnapshotMetadata is a small, self-contained section encoded between the
// file header and the main snapshot payload. It carries summary information
// (simulated year, landscape extent, seed, live tree count) that a caller
// can read without fully decoding the snapshot's trees/saplings/soil/snag
// tables.
//
// File layout:
//   [Header 28 bytes] [Metadata (variable)] [Data payload]

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Quick-access metadata for a landscape snapshot (§4.11 "Snapshot I/O").
///
/// Encoded separately from the main snapshot tables so a caller inspecting a
/// file (e.g. to list available snapshots) doesn't need to decode the full
/// tree/sapling/soil/snag payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct SnapshotMetadata {
    /// Simulated year the snapshot was taken after.
    pub year: u32,
    /// Landscape width in meters (excludes the buffer).
    pub width_m: f64,
    /// Landscape height in meters (excludes the buffer).
    pub height_m: f64,
    /// Resource unit size in meters; snapshots only load into a landscape
    /// with a matching resource-unit size (§4.11 "same resource-unit size").
    pub ru_size_m: f64,
    /// RNG seed the run was started with.
    pub random_seed: u64,
    /// Number of species in the active species set.
    pub species_count: u32,
    /// Live tree count across the whole landscape at save time.
    pub live_tree_count: u64,
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            year: 0,
            width_m: 0.0,
            height_m: 0.0,
            ru_size_m: 100.0,
            random_seed: 0,
            species_count: 0,
            live_tree_count: 0,
        }
    }
}

impl SnapshotMetadata {
    /// Encode metadata to bytes using bitcode.
    pub fn encode(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    /// Decode metadata from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bitcode::Error> {
        bitcode::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bitcode() {
        let meta = SnapshotMetadata {
            year: 42,
            width_m: 500.0,
            height_m: 300.0,
            ru_size_m: 100.0,
            random_seed: 7,
            species_count: 3,
            live_tree_count: 12_345,
        };
        let bytes = meta.encode();
        let decoded = SnapshotMetadata::decode(&bytes).unwrap();
        assert_eq!(meta, decoded);
    }

    #[test]
    fn default_has_zero_counters() {
        let meta = SnapshotMetadata::default();
        assert_eq!(meta.year, 0);
        assert_eq!(meta.live_tree_count, 0);
    }
}
