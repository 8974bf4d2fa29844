//! Standing deadwood pools, individually tracked dead trees, and the
//! "other wood" rolling buffer (§3 "Snag", "DeadTree", §4.4).

use crate::soil::{CNPair, CNPool};
use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// One of the three DBH-classed standing-snag cohorts (§3 "Snag").
#[derive(Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct SnagClass {
    pub pool: CNPool,
    pub stem_count: f64,
    pub avg_dbh_cm: f64,
    pub avg_height_m: f64,
    pub avg_volume_m3: f64,
    pub mean_years_since_death: f64,
    pub weighted_ksw: f64,
    pub weighted_halflife: f64,
}

/// New-this-year addition to a snag class before merging (§4.4 step 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct SnagAddition {
    pub carbon_kg_ha: f64,
    pub nitrogen_kg_ha: f64,
    pub stem_count: f64,
    pub dbh_cm: f64,
    pub height_m: f64,
    pub volume_m3: f64,
    pub ksw: f64,
    pub halflife: f64,
}

impl SnagClass {
    /// Merge this year's additions with stem-number-weighted averaging of
    /// size attributes and C-weighted averaging of `Ksw` (§4.4 step 1).
    pub fn merge_addition(&mut self, add: SnagAddition) {
        let stems_before = self.stem_count;
        let stems_after = stems_before + add.stem_count;
        if stems_after <= 0.0 {
            return;
        }
        self.avg_dbh_cm = (self.avg_dbh_cm * stems_before + add.dbh_cm * add.stem_count) / stems_after;
        self.avg_height_m = (self.avg_height_m * stems_before + add.height_m * add.stem_count) / stems_after;
        self.avg_volume_m3 = (self.avg_volume_m3 * stems_before + add.volume_m3 * add.stem_count) / stems_after;
        self.weighted_halflife =
            (self.weighted_halflife * stems_before + add.halflife * add.stem_count) / stems_after;

        let c_before = self.pool.pair.c;
        self.pool.pair.c += add.carbon_kg_ha;
        self.pool.pair.n += add.nitrogen_kg_ha;
        let c_after = self.pool.pair.c;
        if c_after > 0.0 {
            self.weighted_ksw = (self.weighted_ksw * c_before + add.ksw * add.carbon_kg_ha) / c_after;
        }
        self.stem_count = stems_after;
    }

    /// One year of decay + fall-down + empty-out (§4.4 steps 2-4). Returns
    /// the carbon/nitrogen routed to the soil refractory pool this year.
    pub fn advance_year(&mut self, climate_factor_re: f64, is_smallest_class: bool) -> CNPair {
        if self.stem_count <= 0.0 || self.pool.pair.c <= 0.0 {
            return CNPair::default();
        }

        // Decay: carbon lost to atmosphere, nitrogen retained (CN rises).
        let survive_rate = (-self.weighted_ksw * climate_factor_re).exp();
        self.pool.pair.c *= survive_rate;

        // Fall-down.
        let halflife_eff = self.weighted_halflife / climate_factor_re.max(1e-6);
        let mut rate = -std::f64::consts::LN_2 / halflife_eff.max(1e-6);
        if is_smallest_class {
            rate *= 2.0;
        }
        let fall_fraction = 1.0 - rate.exp();
        let fallen_c = self.pool.pair.c * fall_fraction;
        let fallen_n = self.pool.pair.n * fall_fraction;
        self.pool.pair.c -= fallen_c;
        self.pool.pair.n -= fallen_n;
        self.stem_count *= 1.0 - fall_fraction;
        self.mean_years_since_death += 1.0;

        // Empty-out: clear negligible remainders to the soil flux.
        let per_stem_threshold = 0.01 * self.avg_volume_m3.max(0.001);
        let per_stem_c = if self.stem_count > 0.0 {
            self.pool.pair.c / self.stem_count
        } else {
            0.0
        };
        let mut extra = CNPair::default();
        if self.stem_count < 0.5 || per_stem_c < per_stem_threshold {
            extra.c = self.pool.pair.c;
            extra.n = self.pool.pair.n;
            *self = SnagClass::default();
        }

        CNPair {
            c: fallen_c + extra.c,
            n: fallen_n + extra.n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum DeathReason {
    Normal,
    BarkBeetle,
    Wind,
    Fire,
    Management,
}

/// An individually tracked standing or downed dead tree, above the
/// single-tree DBH threshold (§3 "DeadTree", §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct DeadTree {
    pub x_m: f64,
    pub y_m: f64,
    pub species_index: usize,
    pub death_reason: DeathReason,
    pub initial_biomass_kg: f64,
    pub remaining_biomass_kg: f64,
    pub crown_radius_m: f64,
    pub years_standing: u32,
    pub years_downed: u32,
    pub is_downed: bool,
    pub removed: bool,
}

impl DeadTree {
    /// Decay-class 1..5 from the remaining-fraction threshold vector
    /// (monotone, 4 values) (§3 "DeadTree").
    pub fn decay_class(&self, thresholds: &[f64; 4]) -> u8 {
        let fraction = if self.initial_biomass_kg > 0.0 {
            self.remaining_biomass_kg / self.initial_biomass_kg
        } else {
            0.0
        };
        for (i, t) in thresholds.iter().enumerate() {
            if fraction <= *t {
                return (i + 1) as u8;
            }
        }
        5
    }

    /// One year of standing decay with `snag_ksw`, fall probability
    /// `p = ln2 / (halflife/re)`, and the downed→refractory transition
    /// with `snag_kyr` (§4.4).
    pub fn advance_year<R: rand::Rng>(
        &mut self,
        rng: &mut R,
        snag_ksw: f64,
        snag_kyr: f64,
        halflife: f64,
        climate_factor_re: f64,
    ) -> CNPair {
        if self.removed {
            return CNPair::default();
        }
        let k = if self.is_downed { snag_kyr } else { snag_ksw };
        let lost = self.remaining_biomass_kg * (1.0 - (-k * climate_factor_re).exp());
        self.remaining_biomass_kg -= lost;

        let mut to_soil = CNPair::default();
        if !self.is_downed {
            self.years_standing += 1;
            let halflife_eff = halflife / climate_factor_re.max(1e-6);
            let p_fall = std::f64::consts::LN_2 / halflife_eff.max(1e-6);
            if rng.gen::<f64>() < p_fall {
                self.is_downed = true;
                to_soil.c = self.remaining_biomass_kg * 0.5;
            }
        } else {
            self.years_downed += 1;
        }

        let remaining_fraction = if self.initial_biomass_kg > 0.0 {
            self.remaining_biomass_kg / self.initial_biomass_kg
        } else {
            0.0
        };
        if remaining_fraction < 0.05 {
            self.removed = true;
        }
        to_soil
    }
}

/// Five-slot rolling buffer for branches + coarse roots; one slot empties
/// into the soil refractory pool each year (§3 "Snag", §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct OtherWoodBuffer {
    slots: [CNPool; 5],
    aboveground_fraction: [f64; 5],
    cursor: usize,
}

impl OtherWoodBuffer {
    pub fn add(&mut self, biomass_kg_ha: f64, cn_ratio: f64, parameter: f64, ag_fraction: f64) {
        let idx = self.cursor;
        self.slots[idx].add_biomass(biomass_kg_ha, cn_ratio, parameter);
        self.aboveground_fraction[idx] = ag_fraction;
    }

    /// Empty the oldest slot into the refractory flux and advance the
    /// cursor; the other slots decay at their own parameter.
    pub fn advance_year(&mut self, climate_factor_re: f64) -> CNPair {
        let empty_idx = (self.cursor + 1) % 5;
        let emptied = self.slots[empty_idx].pair;
        self.slots[empty_idx] = CNPool::default();
        self.aboveground_fraction[empty_idx] = 0.0;

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i == empty_idx {
                continue;
            }
            let decay = (slot.parameter * climate_factor_re).clamp(0.0, 1.0);
            slot.pair.c *= 1.0 - decay;
        }
        self.cursor = empty_idx;
        emptied
    }
}

/// Per-RU snag state: three DBH-classed pools, individually tracked dead
/// trees, and the other-wood buffer (§3 "Snag").
#[derive(Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct Snag {
    pub classes: [SnagClass; 3],
    pub other_wood: OtherWoodBuffer,
    pub dead_trees: Vec<DeadTree>,
    pub total_to_disturbance: CNPair,
}

impl Snag {
    pub fn total_carbon(&self) -> f64 {
        self.classes.iter().map(|c| c.pool.pair.c).sum::<f64>()
            + self.dead_trees.iter().map(|d| d.remaining_biomass_kg * 0.5).sum::<f64>()
    }

    /// Disturbance removal (§4.4): scale down all standing pools by
    /// `1 - factor`, routing the removed carbon to `total_to_disturbance`.
    pub fn remove_carbon(&mut self, factor: f64) {
        let factor = factor.clamp(0.0, 1.0);
        for class in &mut self.classes {
            let removed_c = class.pool.pair.c * factor;
            let removed_n = class.pool.pair.n * factor;
            class.pool.pair.c -= removed_c;
            class.pool.pair.n -= removed_n;
            self.total_to_disturbance.c += removed_c;
            self.total_to_disturbance.n += removed_n;
        }
    }

    /// Compact the dead-tree list, dropping entries marked `removed`.
    pub fn compact_dead_trees(&mut self) {
        self.dead_trees.retain(|d| !d.removed);
    }
}

/// Climate factor `re` (§4.4): mean over days of `f_T(T_d) * f_W(month)`.
pub fn climate_factor_re(daily_tissue_temp_c: &[f64], monthly_precip_mm: &[f64; 12], monthly_pet_mm: &[f64; 12]) -> f64 {
    if daily_tissue_temp_c.is_empty() {
        return 0.0;
    }
    let f_t = |t: f64| -> f64 {
        if t < -20.0 {
            0.0
        } else {
            (308.56 * (1.0 / 56.02 - 1.0 / (t - 227.13 + 273.0))).exp()
        }
    };
    let f_w = |month: usize| -> f64 {
        let pet = monthly_pet_mm[month].max(1e-6);
        1.0 / (1.0 + 30.0 * (-8.5 * monthly_precip_mm[month] / pet).exp())
    };
    let days_per_month = daily_tissue_temp_c.len() as f64 / 12.0;
    let sum: f64 = daily_tissue_temp_c
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let month = ((i as f64 / days_per_month.max(1.0)) as usize).min(11);
            f_t(t) * f_w(month)
        })
        .sum();
    sum / daily_tissue_temp_c.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn scenario_snag_fall_and_decay() {
        // §9 scenario 3: 40cm snag class 2, halflife=10, ksw=0.05, re=1.
        let mut class = SnagClass {
            pool: CNPool {
                pair: CNPair { c: 1000.0, n: 2.0 },
                parameter: 0.0,
            },
            stem_count: 1.0,
            avg_dbh_cm: 40.0,
            avg_height_m: 20.0,
            avg_volume_m3: 1.0,
            mean_years_since_death: 0.0,
            weighted_ksw: 0.05,
            weighted_halflife: 10.0,
        };
        let before = class.pool.pair.c;
        class.advance_year(1.0, false);
        let expected_after_decay = before * (-0.05f64).exp();
        assert!(class.pool.pair.c <= expected_after_decay + 1e-6);
    }

    #[test]
    fn dead_tree_removed_below_5_percent_remaining() {
        let mut dt = DeadTree {
            x_m: 0.0,
            y_m: 0.0,
            species_index: 0,
            death_reason: DeathReason::Normal,
            initial_biomass_kg: 100.0,
            remaining_biomass_kg: 4.0,
            crown_radius_m: 2.0,
            years_standing: 5,
            years_downed: 2,
            is_downed: true,
            removed: false,
        };
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        dt.advance_year(&mut rng, 0.05, 0.05, 10.0, 1.0);
        assert!(dt.removed);
    }

    #[test]
    fn other_wood_buffer_empties_one_slot_per_year() {
        let mut buf = OtherWoodBuffer::default();
        buf.add(100.0, 100.0, 0.05, 0.5);
        let emptied_first = buf.advance_year(1.0);
        assert_eq!(emptied_first.c, 0.0);
    }
}
