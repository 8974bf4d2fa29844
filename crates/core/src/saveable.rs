//! Registry of resources that know how to serialize themselves into a
//! landscape snapshot (§4.11, §3 "Snapshot").
//!
//! Mirrors the teacher's `Saveable`/`SaveableRegistry` pattern: each
//! snapshot-eligible resource declares a stable string key and round-trips
//! itself to bytes, and a single registry (populated by each module's
//! `Plugin::build`) drives the generic save/load pass without the snapshot
//! writer needing to know about every resource type.

use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// A resource that can be captured into, and restored from, a landscape
/// snapshot.
pub trait Saveable: Resource {
    /// Stable identifier used as the key inside the snapshot's table map.
    /// Renaming this breaks old snapshots, so treat it as part of the file
    /// format.
    const SAVE_KEY: &'static str;

    /// Encode this resource's state. Returning `None` skips writing an
    /// entry (used for resources with nothing worth persisting, e.g. an
    /// empty optional submodel).
    fn save_to_bytes(&self) -> Option<Vec<u8>>;

    /// Decode a previously-saved byte blob back into this resource. Must be
    /// able to round-trip anything `save_to_bytes` produced for any earlier
    /// minor version still accepted by the snapshot format version check.
    fn load_from_bytes(bytes: &[u8]) -> Self;
}

type SaveFn = fn(&World) -> Option<(String, Vec<u8>)>;
type LoadFn = fn(&mut World, &[u8]);

/// Process-wide table of encode/decode functions, one pair per registered
/// `Saveable` resource type, keyed by `SAVE_KEY`. Built once at landscape
/// setup; never mutated mid-year (§9 "process-wide state").
#[derive(Resource, Default)]
pub struct SaveableRegistry {
    entries: BTreeMap<&'static str, (SaveFn, LoadFn)>,
}

impl SaveableRegistry {
    pub fn register<T: Saveable>(&mut self) {
        let save: SaveFn = |world| {
            world
                .get_resource::<T>()
                .and_then(|r| r.save_to_bytes())
                .map(|bytes| (T::SAVE_KEY.to_string(), bytes))
        };
        let load: LoadFn = |world, bytes| {
            world.insert_resource(T::load_from_bytes(bytes));
        };
        self.entries.insert(T::SAVE_KEY, (save, load));
    }

    /// Encode every registered resource present in `world` into a
    /// key -> bytes map, in deterministic (`SAVE_KEY`-sorted) order.
    pub fn save_all(&self, world: &World) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        for (save, _) in self.entries.values() {
            if let Some((key, bytes)) = save(world) {
                out.insert(key, bytes);
            }
        }
        out
    }

    /// Restore every entry present in `tables` whose key matches a
    /// registered resource. Unknown keys (e.g. from a newer build) are
    /// ignored rather than treated as an error, so older cores can still
    /// open partially-newer snapshots.
    pub fn load_all(&self, world: &mut World, tables: &BTreeMap<String, Vec<u8>>) {
        for (key, (_, load)) in &self.entries {
            if let Some(bytes) = tables.get(*key) {
                load(world, bytes);
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcode::{Decode, Encode};

    #[derive(Resource, Encode, Decode, PartialEq, Debug, Clone)]
    struct Counter(u32);

    impl Saveable for Counter {
        const SAVE_KEY: &'static str = "counter";

        fn save_to_bytes(&self) -> Option<Vec<u8>> {
            Some(bitcode::encode(self))
        }

        fn load_from_bytes(bytes: &[u8]) -> Self {
            bitcode::decode(bytes).unwrap_or(Counter(0))
        }
    }

    #[test]
    fn roundtrip_through_registry() {
        let mut registry = SaveableRegistry::default();
        registry.register::<Counter>();

        let mut world = World::new();
        world.insert_resource(Counter(7));
        let saved = registry.save_all(&world);
        assert_eq!(saved.len(), 1);
        assert!(saved.contains_key("counter"));

        let mut fresh = World::new();
        registry.load_all(&mut fresh, &saved);
        assert_eq!(fresh.resource::<Counter>(), &Counter(7));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let registry = SaveableRegistry::default();
        let mut tables = BTreeMap::new();
        tables.insert("nonexistent".to_string(), vec![1, 2, 3]);
        let mut world = World::new();
        // Should not panic.
        registry.load_all(&mut world, &tables);
    }
}
