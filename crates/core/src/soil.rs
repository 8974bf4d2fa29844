//! Carbon/nitrogen pools and the ICBM/2N soil model (§3 "Soil",
//! "CNPair / CNPool", §4.5).

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Static biomass-to-carbon fraction used by `CNPair::add_biomass`.
pub const BIOMASS_C_FRACTION: f64 = 0.5;

/// A (C, N) pair in kg/ha (§3 "CNPair / CNPool").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Encode, Decode)]
pub struct CNPair {
    pub c: f64,
    pub n: f64,
}

impl CNPair {
    /// Adds `biomass * BIOMASS_C_FRACTION` to C and the same divided by
    /// `cn_ratio` to N.
    pub fn add_biomass(&mut self, biomass_kg_ha: f64, cn_ratio: f64) {
        let added_c = biomass_kg_ha * BIOMASS_C_FRACTION;
        self.c += added_c;
        if cn_ratio > 0.0 {
            self.n += added_c / cn_ratio;
        }
    }

    pub fn cn_ratio(&self) -> f64 {
        if self.n <= 0.0 {
            0.0
        } else {
            self.c / self.n
        }
    }
}

impl std::ops::Add for CNPair {
    type Output = CNPair;
    fn add(self, rhs: CNPair) -> CNPair {
        CNPair {
            c: self.c + rhs.c,
            n: self.n + rhs.n,
        }
    }
}

/// `CNPair` plus a weighted decomposition-rate parameter, updated whenever
/// biomass is added by weighting the old and new parameter by C content
/// before/after the addition (§3 "CNPair / CNPool").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Encode, Decode)]
pub struct CNPool {
    pub pair: CNPair,
    pub parameter: f64,
}

impl CNPool {
    pub fn add_biomass(&mut self, biomass_kg_ha: f64, cn_ratio: f64, parameter: f64) {
        let c_before = self.pair.c;
        self.pair.add_biomass(biomass_kg_ha, cn_ratio);
        let c_after = self.pair.c;
        if c_after > 0.0 {
            self.parameter = (self.parameter * c_before + parameter * (c_after - c_before)) / c_after;
        } else {
            self.parameter = parameter;
        }
    }

    /// Weight-averages the parameter when combining two pools.
    pub fn combine(self, other: CNPool) -> CNPool {
        let c_total = self.pair.c + other.pair.c;
        let parameter = if c_total > 0.0 {
            (self.parameter * self.pair.c + other.parameter * other.pair.c) / c_total
        } else {
            0.0
        };
        CNPool {
            pair: self.pair + other.pair,
            parameter,
        }
    }
}

/// Per-RU ICBM/2N soil state: labile (yL), refractory (yR) and SOM pools,
/// plant-available nitrogen, and aboveground-fraction book-keeping (§3
/// "Soil", §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct Soil {
    pub young_labile: CNPool,
    pub young_refractory: CNPool,
    pub som: CNPool,
    pub available_nitrogen: f64,
    pub yl_ag_fraction: f64,
    pub yr_ag_fraction: f64,
    pub flux_to_atmosphere: CNPair,
    pub flux_to_disturbance: CNPair,
}

impl Soil {
    pub fn is_nonnegative(&self) -> bool {
        self.young_labile.pair.c >= 0.0
            && self.young_labile.pair.n >= 0.0
            && self.young_refractory.pair.c >= 0.0
            && self.young_refractory.pair.n >= 0.0
            && self.som.pair.c >= 0.0
            && self.som.pair.n >= 0.0
    }

    fn clamp_nonnegative(&mut self) {
        self.young_labile.pair.c = self.young_labile.pair.c.max(0.0);
        self.young_labile.pair.n = self.young_labile.pair.n.max(0.0);
        self.young_refractory.pair.c = self.young_refractory.pair.c.max(0.0);
        self.young_refractory.pair.n = self.young_refractory.pair.n.max(0.0);
        self.som.pair.c = self.som.pair.c.max(0.0);
        self.som.pair.n = self.som.pair.n.max(0.0);
    }

    /// Add aboveground-tagged input, weight-averaging the aboveground
    /// fraction the way §4.5 requires for fire/management targeting.
    pub fn add_labile_input(&mut self, biomass_kg_ha: f64, cn_ratio: f64, kyl: f64, ag_fraction: f64) {
        let c_before = self.young_labile.pair.c;
        self.young_labile.add_biomass(biomass_kg_ha, cn_ratio, kyl);
        let c_after = self.young_labile.pair.c;
        if c_after > 0.0 {
            self.yl_ag_fraction =
                (self.yl_ag_fraction * c_before + ag_fraction * (c_after - c_before)) / c_after;
        }
    }

    pub fn add_refractory_input(&mut self, biomass_kg_ha: f64, cn_ratio: f64, kyr: f64, ag_fraction: f64) {
        let c_before = self.young_refractory.pair.c;
        self.young_refractory.add_biomass(biomass_kg_ha, cn_ratio, kyr);
        let c_after = self.young_refractory.pair.c;
        if c_after > 0.0 {
            self.yr_ag_fraction =
                (self.yr_ag_fraction * c_before + ag_fraction * (c_after - c_before)) / c_after;
        }
    }

    /// One year of ICBM/2N analytical decomposition (§4.5): the labile and
    /// refractory pools decay at `re * parameter`, the freed carbon
    /// (scaled by humification rate `h`) enters SOM, the rest is
    /// respired to the atmosphere; SOM itself decays at `re * ko`.
    pub fn advance_year(&mut self, re: f64, humification_rate: f64, ko: f64, n_deposition: f64) {
        let yl_decay = (self.young_labile.parameter * re).clamp(0.0, 1.0);
        let yr_decay = (self.young_refractory.parameter * re).clamp(0.0, 1.0);
        let som_decay = (ko * re).clamp(0.0, 1.0);

        let yl_lost = self.young_labile.pair.c * yl_decay;
        let yr_lost = self.young_refractory.pair.c * yr_decay;
        let som_lost = self.som.pair.c * som_decay;

        let to_som = (yl_lost + yr_lost) * humification_rate;
        let to_atmosphere = (yl_lost + yr_lost) * (1.0 - humification_rate) + som_lost;

        self.young_labile.pair.c -= yl_lost;
        self.young_refractory.pair.c -= yr_lost;
        self.som.pair.c += to_som - som_lost;
        self.flux_to_atmosphere.c += to_atmosphere;

        self.available_nitrogen += n_deposition;
        self.clamp_nonnegative();
    }

    /// Disturbance removal of DWD/litter/SOM fractions, routed to
    /// `flux_to_disturbance` (§4.5).
    pub fn apply_disturbance(&mut self, dwd_fraction: f64, litter_fraction: f64, soil_fraction: f64) {
        let removed_yr = self.young_refractory.pair.c * dwd_fraction.clamp(0.0, 1.0);
        let removed_yl = self.young_labile.pair.c * litter_fraction.clamp(0.0, 1.0);
        let removed_som = self.som.pair.c * soil_fraction.clamp(0.0, 1.0);
        self.young_refractory.pair.c -= removed_yr;
        self.young_labile.pair.c -= removed_yl;
        self.som.pair.c -= removed_som;
        self.flux_to_disturbance.c += removed_yr + removed_yl + removed_som;
        self.clamp_nonnegative();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_biomass_splits_into_c_and_n() {
        let mut pair = CNPair::default();
        pair.add_biomass(100.0, 50.0);
        assert_eq!(pair.c, 50.0);
        assert_eq!(pair.n, 1.0);
    }

    #[test]
    fn disturbance_scenario_moves_dwd_to_refractory_flux() {
        // §9 scenario 4: yL=10, yR=20, SOM=100; disturbance(DWD=0.5).
        let mut soil = Soil {
            young_labile: CNPool {
                pair: CNPair { c: 10.0, n: 1.0 },
                parameter: 0.5,
            },
            young_refractory: CNPool {
                pair: CNPair { c: 20.0, n: 1.0 },
                parameter: 0.05,
            },
            som: CNPool {
                pair: CNPair { c: 100.0, n: 5.0 },
                parameter: 0.02,
            },
            ..Default::default()
        };
        soil.apply_disturbance(0.5, 0.0, 0.0);
        assert_eq!(soil.young_refractory.pair.c, 10.0);
        assert_eq!(soil.young_labile.pair.c, 10.0);
        assert_eq!(soil.som.pair.c, 100.0);
        assert_eq!(soil.flux_to_disturbance.c, 10.0);
    }

    #[test]
    fn advance_year_keeps_pools_nonnegative() {
        let mut soil = Soil {
            young_labile: CNPool {
                pair: CNPair { c: 5.0, n: 0.1 },
                parameter: 0.3,
            },
            ..Default::default()
        };
        soil.advance_year(1.0, 0.15, 0.02, 0.0);
        assert!(soil.is_nonnegative());
    }
}
