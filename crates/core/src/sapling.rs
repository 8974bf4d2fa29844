//! Sapling cells and the establishment/growth/promotion pipeline (§3
//! "SaplingCell", §4.7).

use crate::tree::Tree;
use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

pub const NSAPCELLS: usize = 5;
/// Height (m) at which a sapling is promoted to a full tree.
pub const RECRUITMENT_HEIGHT_M: f64 = 4.0;
/// Saplings at or below this height count separately in statistics.
pub const SMALL_SAPLING_HEIGHT_M: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Encode, Decode)]
pub enum SaplingCellState {
    #[default]
    Empty,
    Grass,
    Occupied,
}

/// One slot within a `SaplingCell` (§3 "SaplingCell").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Encode, Decode)]
pub struct SaplingTree {
    /// Species index within the owning RU's species set; negative (`None`)
    /// marks the slot free.
    pub species_index: Option<usize>,
    pub age: u32,
    pub height_m: f64,
    pub stress_years: u32,
    pub browsed: bool,
}

impl Default for SaplingTree {
    fn default() -> Self {
        Self {
            species_index: None,
            age: 0,
            height_m: 0.0,
            stress_years: 0,
            browsed: false,
        }
    }
}

impl SaplingTree {
    pub fn is_occupied(&self) -> bool {
        self.species_index.is_some()
    }
}

/// A 2 m cell holding up to `NSAPCELLS` sapling slots (§3 "SaplingCell").
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct SaplingCell {
    pub slots: [SaplingTree; NSAPCELLS],
    pub state: SaplingCellState,
}

impl Default for SaplingCell {
    fn default() -> Self {
        Self {
            slots: Default::default(),
            state: SaplingCellState::Empty,
        }
    }
}

impl SaplingCell {
    pub fn max_height(&self) -> f64 {
        self.slots
            .iter()
            .filter(|s| s.is_occupied())
            .map(|s| s.height_m)
            .fold(0.0, f64::max)
    }

    pub fn free_slot_index(&self) -> Option<usize> {
        if self.state == SaplingCellState::Grass {
            return None;
        }
        self.slots.iter().position(|s| !s.is_occupied())
    }

    /// Establishment (§4.7): place at most one new sapling into the first
    /// free slot if `probability` beats a draw from `rng`.
    pub fn try_establish<R: rand::Rng>(
        &mut self,
        rng: &mut R,
        species_index: usize,
        probability: f64,
    ) -> bool {
        if rng.gen::<f64>() >= probability.clamp(0.0, 1.0) {
            return false;
        }
        if let Some(slot) = self.free_slot_index() {
            self.slots[slot] = SaplingTree {
                species_index: Some(species_index),
                age: 0,
                height_m: 0.02,
                stress_years: 0,
                browsed: false,
            };
            self.state = SaplingCellState::Occupied;
            true
        } else {
            false
        }
    }

    /// Sapling growth (§4.7): height increment from `hd_sapling` and local
    /// light availability; promotes to a full tree (returned) and clears
    /// the slot when the recruitment threshold is passed.
    pub fn grow_slot(
        &mut self,
        slot: usize,
        hd_sapling: f64,
        light_availability: f64,
        lif_index: usize,
        tree_id_seed: u64,
    ) -> Option<Tree> {
        let s = &mut self.slots[slot];
        if !s.is_occupied() {
            return None;
        }
        let browse_factor = if s.browsed { 0.5 } else { 1.0 };
        let growth = 0.01 * hd_sapling.max(1.0) / 100.0 * light_availability.clamp(0.0, 1.0) * browse_factor;
        s.height_m += growth;
        s.age += 1;
        if light_availability < 0.2 {
            s.stress_years += 1;
        } else {
            s.stress_years = 0;
        }

        if s.height_m >= RECRUITMENT_HEIGHT_M {
            let species_index = s.species_index.unwrap();
            let height = s.height_m;
            *s = SaplingTree::default();
            if self.slots.iter().all(|sl| !sl.is_occupied()) {
                self.state = SaplingCellState::Empty;
            }
            let mut tree = Tree::new(tree_id_seed, species_index, lif_index, 2.0, height);
            tree.age = 0;
            Some(tree)
        } else {
            None
        }
    }

    /// "Kill saplings" stand operation (§4.7): clears a slot, e.g. selected
    /// externally via an expression evaluated per slot.
    pub fn kill_slot(&mut self, slot: usize) {
        self.slots[slot] = SaplingTree::default();
        if self.slots.iter().all(|s| !s.is_occupied()) {
            self.state = SaplingCellState::Empty;
        }
    }

    pub fn small_sapling_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.is_occupied() && s.height_m <= SMALL_SAPLING_HEIGHT_M)
            .count()
    }
}

/// Represented-stem-number via a species-specific Reineke curve applied to
/// occupied-slot heights (§4.7 "Sapling statistics").
pub fn represented_stem_number(heights_m: &[f64], reineke_r: f64) -> f64 {
    if heights_m.is_empty() {
        return 0.0;
    }
    let sum: f64 = heights_m.iter().map(|h| reineke_r * h.max(0.01).powf(-1.605)).sum();
    sum / heights_m.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn establishment_fills_first_free_slot() {
        let mut cell = SaplingCell::default();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        assert!(cell.try_establish(&mut rng, 0, 1.0));
        assert_eq!(cell.state, SaplingCellState::Occupied);
    }

    #[test]
    fn grass_state_blocks_establishment() {
        let mut cell = SaplingCell::default();
        cell.state = SaplingCellState::Grass;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        assert!(!cell.try_establish(&mut rng, 0, 1.0));
    }

    #[test]
    fn growth_promotes_to_tree_past_recruitment_height() {
        let mut cell = SaplingCell::default();
        cell.slots[0] = SaplingTree {
            species_index: Some(0),
            age: 5,
            height_m: 3.99,
            stress_years: 0,
            browsed: false,
        };
        cell.state = SaplingCellState::Occupied;
        let mut promoted = None;
        for _ in 0..50 {
            if let Some(t) = cell.grow_slot(0, 100.0, 1.0, 42, 1) {
                promoted = Some(t);
                break;
            }
        }
        assert!(promoted.is_some());
        assert!(!cell.slots[0].is_occupied());
    }
}
