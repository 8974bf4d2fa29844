//! Resource unit: the 100x100 m owning cell for trees, saplings, soil,
//! snag and water state (§3 "Resource unit (RU)").
//!
//! Cross-entity relationships that the specification describes as borrows
//! (RU -> Climate, RU -> SpeciesSet) are modeled as dense indices into the
//! landscape's `Vec<ClimateTable>` / `Vec<SpeciesSet>` arenas rather than
//! Rust references, so that a `ResourceUnit` has no lifetime parameter and
//! can be stored, saved and sent across worker threads freely.

use crate::sapling::SaplingCell;
use crate::snag::Snag;
use crate::soil::Soil;
use crate::tree::Tree;
use crate::water::WaterCycle;
use serde::{Deserialize, Serialize};

pub const SAPLING_CELLS_PER_RU: usize = 2500;

/// Per-species accumulators recomputed every year (§3 "Resource unit (RU)"
/// "Aggregates per-species statistics").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpeciesAggregate {
    pub basal_area_m2: f64,
    pub stem_count: u32,
    pub leaf_area_m2: f64,
    pub npp_kg: f64,
}

/// Microclimate submodel at 10 m resolution within the RU (§3 "Resource
/// unit (RU)"). Holds per-cell temperature offsets relative to the RU
/// mean; populated by the optional microclimate analysis stage (§4.1
/// step 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Microclimate {
    pub temperature_offset_c: Vec<f32>,
}

/// A 100x100 m resource unit (§3 "Resource unit (RU)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUnit {
    /// Dense position in the landscape's RU vector.
    pub index: usize,
    /// Opaque id; `-1` excludes the RU from simulation.
    pub id: i64,
    pub climate_index: usize,
    pub species_set_index: usize,

    pub trees: Vec<Tree>,
    pub saplings: Vec<SaplingCell>,
    pub soil: Option<Soil>,
    pub snag: Option<Snag>,
    pub water: WaterCycle,
    pub microclimate: Option<Microclimate>,

    pub species_aggregates: Vec<SpeciesAggregate>,
    /// Stockable area in m^2, counted once at setup from valid 10 m cells.
    pub stockable_area_m2: f64,
    /// Stocked area in m^2, recomputed each year from the height grid.
    pub stocked_area_m2: f64,
    pub leaf_area_index: f64,
}

impl ResourceUnit {
    pub fn new(index: usize, id: i64, climate_index: usize, species_set_index: usize) -> Self {
        Self {
            index,
            id,
            climate_index,
            species_set_index,
            trees: Vec::new(),
            saplings: vec![SaplingCell::default(); SAPLING_CELLS_PER_RU],
            soil: None,
            snag: None,
            water: WaterCycle::new(150.0, 40.0, 800.0),
            microclimate: None,
            species_aggregates: Vec::new(),
            stockable_area_m2: 0.0,
            stocked_area_m2: 0.0,
            leaf_area_index: 0.0,
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.id == -1
    }

    /// §4.1 step 4: "compact tree lists (remove dead)". Dead trees remain
    /// in the vector until this is called (§3 "Tree" invariant), at which
    /// point any external tree address becomes invalid (§9 "Exclusive
    /// ownership").
    pub fn compact_dead_trees(&mut self) {
        self.trees.retain(|t| !t.is_dead());
    }

    pub fn live_tree_count(&self) -> usize {
        self.trees.iter().filter(|t| !t.is_dead()).count()
    }

    /// Total basal area (m^2) over all live trees, used by stocked-area
    /// blending (§4.2) and SVD admixture (§4.9).
    pub fn basal_area_m2(&self) -> f64 {
        self.trees
            .iter()
            .filter(|t| !t.is_dead())
            .map(|t| std::f64::consts::PI * (t.dbh_cm / 200.0).powi(2))
            .sum()
    }

    /// Reset per-RU statistics at the start of a year (§4.1 step 4).
    pub fn reset_year_statistics(&mut self) {
        self.species_aggregates.clear();
        self.stocked_area_m2 = 0.0;
    }

    /// Recompute per-species aggregates from the current live tree list.
    pub fn recompute_species_aggregates(&mut self, species_count: usize) {
        self.species_aggregates = vec![SpeciesAggregate::default(); species_count];
        for tree in self.trees.iter().filter(|t| !t.is_dead()) {
            if let Some(agg) = self.species_aggregates.get_mut(tree.species_index) {
                agg.basal_area_m2 += std::f64::consts::PI * (tree.dbh_cm / 200.0).powi(2);
                agg.stem_count += 1;
                agg.leaf_area_m2 += tree.leaf_area_m2;
            }
        }
        self.leaf_area_index = if self.stockable_area_m2 > 0.0 {
            self.species_aggregates.iter().map(|a| a.leaf_area_m2).sum::<f64>() / self.stockable_area_m2
        } else {
            0.0
        };
    }

    /// `calculateInterceptedArea` (§4.3 step 2): the RU's effective area
    /// times each tree's share of the summed `leafArea * lightResponse`.
    pub fn intercepted_area_per_tree(&self, beer_lambert_k: f64) -> Vec<f64> {
        let effective_area =
            self.stocked_area_m2 * (1.0 - (-beer_lambert_k * self.leaf_area_index).exp());
        let sum_weighted: f64 = self
            .trees
            .iter()
            .filter(|t| !t.is_dead())
            .map(|t| t.leaf_area_m2 * t.light_response)
            .sum();
        if sum_weighted <= 0.0 {
            return vec![0.0; self.trees.len()];
        }
        self.trees
            .iter()
            .map(|t| {
                if t.is_dead() {
                    0.0
                } else {
                    effective_area * (t.leaf_area_m2 * t.light_response) / sum_weighted
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeFlags;

    #[test]
    fn compaction_removes_only_dead_trees() {
        let mut ru = ResourceUnit::new(0, 1, 0, 0);
        ru.trees.push(Tree::new(1, 0, 0, 10.0, 5.0));
        let mut dead = Tree::new(2, 0, 0, 10.0, 5.0);
        dead.kill(TreeFlags::empty());
        ru.trees.push(dead);
        ru.compact_dead_trees();
        assert_eq!(ru.trees.len(), 1);
        assert_eq!(ru.trees[0].id, 1);
    }

    #[test]
    fn intercepted_area_is_distributed_proportionally() {
        let mut ru = ResourceUnit::new(0, 1, 0, 0);
        ru.stocked_area_m2 = 1000.0;
        ru.leaf_area_index = 2.0;
        let mut a = Tree::new(1, 0, 0, 20.0, 10.0);
        a.leaf_area_m2 = 10.0;
        a.light_response = 1.0;
        let mut b = Tree::new(2, 0, 0, 10.0, 5.0);
        b.leaf_area_m2 = 5.0;
        b.light_response = 1.0;
        ru.trees.push(a);
        ru.trees.push(b);
        let areas = ru.intercepted_area_per_tree(0.5);
        assert!(areas[0] > areas[1]);
        assert!((areas[0] - 2.0 * areas[1]).abs() < 1e-9);
    }

    #[test]
    fn excluded_ru_has_id_negative_one() {
        let ru = ResourceUnit::new(0, -1, 0, 0);
        assert!(ru.is_excluded());
    }
}
