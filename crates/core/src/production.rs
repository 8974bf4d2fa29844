//! 3-PG production, NPP partitioning and the aging-weighted average
//! (§4.3 steps 3-4, 7).

use crate::soil::Soil;
use crate::tree::Tree;
use crate::water::WaterCycle;

/// Species-level environmental response multipliers feeding 3-PG
/// production (§4.3 step 3: "VPD, temperature, soil water, nutrient").
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentalResponses {
    pub vpd_response: f64,
    pub temperature_response: f64,
    pub soil_water_response: f64,
    pub nutrient_response: f64,
}

impl EnvironmentalResponses {
    pub fn combined(&self) -> f64 {
        (self.vpd_response * self.temperature_response * self.soil_water_response * self.nutrient_response)
            .clamp(0.0, 1.0)
    }

    /// Derives the four multipliers from a resource unit's annual climate
    /// aggregate and its water cycle's current soil water potential (§4.6),
    /// rather than fixed constants, so production tracks the climate table
    /// and the daily water balance it drove.
    pub fn from_state(mean_annual_temp: f64, mean_vpd: f64, water: &WaterCycle, soil: Option<&Soil>) -> Self {
        const VPD_SENSITIVITY: f64 = 0.1;
        const TEMP_OPTIMUM_C: f64 = 20.0;
        const NITROGEN_HALF_SATURATION_KG_HA: f64 = 50.0;

        let vpd_response = (-VPD_SENSITIVITY * mean_vpd).exp().clamp(0.0, 1.0);
        let temperature_response = (mean_annual_temp / TEMP_OPTIMUM_C).clamp(0.0, 1.0);
        // psi_sat_kpa and psi_kpa() are both negative; their ratio is 1 at
        // saturation and falls toward 0 as the soil dries.
        let soil_water_response = (water.psi_sat_kpa / water.psi_kpa()).clamp(0.0, 1.0);
        let nutrient_response = soil
            .map(|s| s.available_nitrogen / (s.available_nitrogen + NITROGEN_HALF_SATURATION_KG_HA))
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);

        Self {
            vpd_response,
            temperature_response,
            soil_water_response,
            nutrient_response,
        }
    }
}

/// 3-PG `production` (§4.3 step 3): converts intercepted area into GPP and
/// NPP at stand x species level. `light_use_efficiency` (epsilon) and
/// `npp_fraction` (NPP/GPP) are species parameters.
pub fn gross_and_net_primary_production(
    intercepted_radiation_mj: f64,
    light_use_efficiency: f64,
    responses: EnvironmentalResponses,
    npp_fraction: f64,
) -> (f64, f64) {
    let gpp = intercepted_radiation_mj * light_use_efficiency * responses.combined();
    let npp = gpp * npp_fraction.clamp(0.0, 1.0);
    (gpp, npp)
}

/// Fractional allocation of per-tree NPP to the five compartments (§4.3
/// step 4). Fractions should sum to <= 1; the remainder (if any) accrues
/// to the NPP reserve.
#[derive(Debug, Clone, Copy)]
pub struct PartitioningFractions {
    pub foliage: f64,
    pub fine_root: f64,
    pub branch: f64,
    pub coarse_root: f64,
    pub stem: f64,
}

impl PartitioningFractions {
    /// Stress-driven adjustment (§4.3 step 4): a tree under higher stress
    /// shifts allocation toward roots and away from stem, by shaving a
    /// `stress_index`-proportional share off stem into fine roots.
    pub fn stress_adjusted(self, stress_index: f64) -> Self {
        let shift = (stress_index.clamp(0.0, 1.0)) * 0.2 * self.stem;
        Self {
            stem: self.stem - shift,
            fine_root: self.fine_root + shift,
            ..self
        }
    }
}

/// Partitions `npp_kg` per `fractions`, returns `(foliage, fine_root,
/// branch, coarse_root, stem, reserve_delta)` and applies the stem/reserve
/// split onto the tree's biomass (§4.3 step 4).
pub fn partition_npp(tree: &mut Tree, npp_kg: f64, fractions: PartitioningFractions) -> f64 {
    let fractions = fractions.stress_adjusted(tree.stress_index);
    let d_foliage = npp_kg * fractions.foliage;
    let d_fine_root = npp_kg * fractions.fine_root;
    let d_branch = npp_kg * fractions.branch;
    let d_coarse_root = npp_kg * fractions.coarse_root;
    let d_stem = npp_kg * fractions.stem;

    tree.biomass.foliage += d_foliage;
    tree.biomass.fine_roots += d_fine_root;
    tree.biomass.branches += d_branch;
    tree.biomass.coarse_roots += d_coarse_root;

    let allocated = d_foliage + d_fine_root + d_branch + d_coarse_root + d_stem;
    let to_reserve = (npp_kg - allocated).max(0.0);
    tree.biomass.npp_reserve += to_reserve;

    d_stem
}

/// Aging-weighted average across an RU's live trees (§4.3 "Aging-weighted
/// average"): leaf-area-weighted aging, bounded 0..1. Values outside the
/// range are a diagnostic the caller should log, never panic on.
pub fn leaf_area_weighted_aging(trees: &[Tree], max_age: u32, max_height_m: f64) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for tree in trees.iter().filter(|t| !t.is_dead()) {
        let contribution = tree.aging_contribution(max_age, max_height_m);
        weighted_sum += contribution;
        weight_total += tree.leaf_area_m2;
    }
    if weight_total > 0.0 {
        (weighted_sum / weight_total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_scales_with_intercepted_radiation() {
        let responses = EnvironmentalResponses {
            vpd_response: 0.9,
            temperature_response: 0.8,
            soil_water_response: 1.0,
            nutrient_response: 1.0,
        };
        let (gpp_low, npp_low) = gross_and_net_primary_production(10.0, 0.4, responses, 0.47);
        let (gpp_high, npp_high) = gross_and_net_primary_production(20.0, 0.4, responses, 0.47);
        assert!(gpp_high > gpp_low);
        assert!(npp_high > npp_low);
    }

    #[test]
    fn stress_shifts_allocation_toward_roots() {
        let fractions = PartitioningFractions {
            foliage: 0.2,
            fine_root: 0.2,
            branch: 0.1,
            coarse_root: 0.1,
            stem: 0.4,
        };
        let unstressed = fractions.stress_adjusted(0.0);
        let stressed = fractions.stress_adjusted(1.0);
        assert!(stressed.fine_root > unstressed.fine_root);
        assert!(stressed.stem < unstressed.stem);
    }

    #[test]
    fn partition_npp_credits_stem_delta_and_reserve() {
        let mut tree = Tree::new(1, 0, 0, 10.0, 5.0);
        let fractions = PartitioningFractions {
            foliage: 0.2,
            fine_root: 0.2,
            branch: 0.1,
            coarse_root: 0.1,
            stem: 0.3,
        };
        let stem_delta = partition_npp(&mut tree, 10.0, fractions);
        assert!(stem_delta > 0.0);
        assert!(tree.biomass.foliage > 0.0);
        assert!(tree.biomass.npp_reserve >= 0.0);
    }
}
