//! Daily water-balance cycle and the optional permafrost submodel (§3
//! "WaterCycle", "Permafrost", §4.6).

use crate::climate::ClimateDay;
use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Canopy interception state (§3 "WaterCycle").
#[derive(Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct CanopyInterception {
    pub lai_needle: f64,
    pub lai_broadleaf: f64,
    pub max_canopy_conductance: f64,
    pub daily_interception_mm: f64,
    pub daily_evaporation_mm: f64,
    pub monthly_reference_et_mm: [f64; 12],
}

/// Per-RU daily water balance (§3 "WaterCycle", §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct WaterCycle {
    pub content_mm: f64,
    pub field_capacity_mm: f64,
    pub permanent_wilting_point_mm: f64,
    pub soil_depth_mm: f64,
    pub snow_pack_mm: f64,
    /// Soil water potential ψ (kPa), indexed by DOY-1.
    pub psi_by_doy: Vec<f64>,
    pub interception: CanopyInterception,
    pub psi_sat_kpa: f64,
    pub psi_kappa: f64,
    pub permafrost: Option<Permafrost>,
}

impl WaterCycle {
    pub fn new(field_capacity_mm: f64, pwp_mm: f64, soil_depth_mm: f64) -> Self {
        Self {
            content_mm: field_capacity_mm,
            field_capacity_mm,
            permanent_wilting_point_mm: pwp_mm,
            soil_depth_mm,
            snow_pack_mm: 0.0,
            psi_by_doy: vec![0.0; 365],
            interception: CanopyInterception::default(),
            psi_sat_kpa: -5.0,
            psi_kappa: 5.0,
            permafrost: None,
        }
    }

    /// Soil water potential from content via a power curve (§3 "WaterCycle").
    pub fn psi_kpa(&self) -> f64 {
        let saturation = (self.content_mm / self.field_capacity_mm.max(1e-6)).clamp(1e-6, 1.0);
        self.psi_sat_kpa * saturation.powf(-self.psi_kappa)
    }

    /// One day of the water-balance loop: snow pack, throughfall, canopy
    /// ET, soil bucket, lateral outflow (§4.6).
    pub fn advance_day(&mut self, doy: usize, day: &ClimateDay, effective_lai: f64) {
        const SNOW_THRESHOLD_C: f64 = 0.0;
        const SNOW_MELT_MM_PER_DEGREE: f64 = 3.0;

        let mut rain_mm = day.precipitation;
        if day.mean_temp <= SNOW_THRESHOLD_C {
            self.snow_pack_mm += rain_mm;
            rain_mm = 0.0;
        } else if self.snow_pack_mm > 0.0 {
            let melt = (day.mean_temp * SNOW_MELT_MM_PER_DEGREE).min(self.snow_pack_mm);
            self.snow_pack_mm -= melt;
            rain_mm += melt;
        }

        let interception_capacity = 0.2 * effective_lai;
        let intercepted = rain_mm.min(interception_capacity);
        self.interception.daily_interception_mm = intercepted;
        let throughfall = rain_mm - intercepted;

        // Penman-Monteith-like ET driven by VPD, temperature and a soil
        // water response multiplier, scaled by the canopy conductance.
        let vpd_response = (1.0 - (day.vpd / 3.0).clamp(0.0, 1.0)).max(0.1);
        let temp_response = ((day.mean_temp - 0.0) / 20.0).clamp(0.0, 1.0);
        let water_fraction = ((self.content_mm - self.permanent_wilting_point_mm)
            / (self.field_capacity_mm - self.permanent_wilting_point_mm).max(1e-6))
        .clamp(0.0, 1.0);
        let et = self.interception.max_canopy_conductance.max(0.01)
            * vpd_response
            * temp_response
            * water_fraction
            * effective_lai.max(0.01);
        self.interception.daily_evaporation_mm = et;

        self.content_mm += throughfall - et;
        if self.content_mm > self.field_capacity_mm {
            self.content_mm = self.field_capacity_mm; // lateral outflow
        }
        self.content_mm = self.content_mm.max(0.0);

        if let Some(psi) = self.psi_by_doy.get_mut(doy) {
            *psi = self.psi_sat_kpa
                * (self.content_mm / self.field_capacity_mm.max(1e-6))
                    .clamp(1e-6, 1.0)
                    .powf(-self.psi_kappa);
        }

        if let Some(permafrost) = &mut self.permafrost {
            permafrost.advance_day(day, self.soil_depth_mm / 1000.0);
        }
    }
}

/// Optional permafrost submodel (§3 "Permafrost", §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Permafrost {
    pub top_m: f64,
    pub bottom_m: f64,
    pub top_frozen: bool,
    pub freeze_back_depth_m: f64,
    pub current_frozen_depth_m: f64,
    pub current_water_frozen_mm: f64,
    pub deep_soil_base_temp_c: f64,
    pub moss_biomass_kg_m2: f64,
    pub organic_layer_depth_m: f64,
    pub max_permafrost_depth_m: f64,
    pub max_freeze_thaw_per_day_m: f64,
    pub pct_sand: f64,
    pub pct_clay: f64,
}

impl Permafrost {
    pub fn new(max_permafrost_depth_m: f64, pct_sand: f64, pct_clay: f64) -> Self {
        Self {
            top_m: 0.0,
            bottom_m: 0.0,
            top_frozen: false,
            freeze_back_depth_m: 0.0,
            current_frozen_depth_m: 0.0,
            current_water_frozen_mm: 0.0,
            deep_soil_base_temp_c: 0.0,
            moss_biomass_kg_m2: 0.1,
            organic_layer_depth_m: 0.05,
            max_permafrost_depth_m,
            max_freeze_thaw_per_day_m: 0.02,
            pct_sand,
            pct_clay,
        }
    }

    /// Thermal conductivity via Farouki (1981) scaling with sand/clay
    /// fraction and saturation (§4.6).
    fn thermal_conductivity(&self, frozen: bool, saturation: f64) -> f64 {
        let dry_k = 0.135 * (1.0 - 0.4 * self.pct_clay) + 0.0265 * self.pct_sand;
        let wet_k = if frozen { 2.2 } else { 0.6 };
        dry_k + (wet_k - dry_k) * saturation.clamp(0.0, 1.0)
    }

    /// One day of freeze/thaw progression (§4.6): converts an energy flux
    /// into frozen/thawed water depth, capped at `max_freeze_thaw_per_day_m`.
    pub fn advance_day(&mut self, day: &ClimateDay, soil_saturation: f64) {
        let air_temp = day.mean_temp;
        let ground_temp = self.deep_soil_base_temp_c;
        let delta_t = air_temp - ground_temp;

        let k_unfrozen = self.thermal_conductivity(false, soil_saturation);
        let k_frozen = self.thermal_conductivity(true, soil_saturation);
        let k_soil = if self.top_frozen { k_frozen } else { k_unfrozen };
        let r_total = (self.organic_layer_depth_m / 0.1) + (self.bottom_m - self.top_m).max(0.01) / k_soil.max(0.01);
        let flux = delta_t / r_total.max(1e-6);

        // Latent heat of fusion ~ 334 kJ/kg; crude conversion of flux (deg/unit-R)
        // into an equivalent water depth frozen/thawed per day.
        let depth_change_m = (flux.abs() * 0.001).min(self.max_freeze_thaw_per_day_m);

        if air_temp < 0.0 {
            self.top_m = (self.top_m + depth_change_m).min(self.bottom_m.max(self.top_m));
            self.top_frozen = true;
            self.current_frozen_depth_m = (self.current_frozen_depth_m + depth_change_m)
                .min(self.max_permafrost_depth_m);
        } else {
            self.top_m = (self.top_m - depth_change_m).max(0.0);
            self.current_frozen_depth_m = (self.current_frozen_depth_m - depth_change_m).max(0.0);
            if self.current_frozen_depth_m <= 0.0 {
                self.top_frozen = false;
            }
        }
        self.bottom_m = self.bottom_m.max(self.top_m).min(self.max_permafrost_depth_m);

        self.deep_soil_base_temp_c =
            (self.deep_soil_base_temp_c * 9.0 + air_temp) / 10.0; // 10-year-ish running average proxy
    }

    /// Yearly moss-layer growth (§4.6): light- and litter-limited net
    /// production feeding the soil labile pool.
    pub fn grow_moss_year(&mut self, lai_canopy: f64, lai_moss: f64, fresh_deciduous_litter_kg: f64) -> f64 {
        const K: f64 = 0.5;
        const LIGHT_COMP: f64 = 0.05;
        const LIGHT_SAT: f64 = 0.4;
        const SLA: f64 = 20.0;
        const AMAX: f64 = 0.02;
        const Q: f64 = 0.02;
        const B: f64 = 0.01;
        const R: f64 = 0.1;

        let f_l = (((-K * (lai_canopy + lai_moss)).exp() - LIGHT_COMP) / (LIGHT_SAT - LIGHT_COMP))
            .clamp(0.0, 1.0);
        let f_d = (-R * fresh_deciduous_litter_kg).exp();
        let net_production = SLA * AMAX * f_l * f_d * self.moss_biomass_kg_m2
            - self.moss_biomass_kg_m2 * (Q + B);
        self.moss_biomass_kg_m2 = (self.moss_biomass_kg_m2 + net_production).max(0.0);
        self.organic_layer_depth_m = 0.05 + self.moss_biomass_kg_m2 * 0.01;
        net_production.max(0.0) // turnover available to feed the soil labile pool
    }

    pub fn mass_balance_ok(&self) -> bool {
        self.top_m >= 0.0
            && self.top_m <= self.bottom_m
            && self.bottom_m <= self.max_permafrost_depth_m
            && self.current_water_frozen_mm >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_day() -> ClimateDay {
        ClimateDay {
            year: 2020,
            month: 6,
            day: 1,
            min_temp: 8.0,
            max_temp: 20.0,
            mean_temp: 14.0,
            delayed_temp: 14.0,
            precipitation: 5.0,
            radiation: 18.0,
            vpd: 0.8,
        }
    }

    #[test]
    fn water_content_stays_within_bucket_bounds() {
        let mut wc = WaterCycle::new(150.0, 40.0, 800.0);
        wc.interception.max_canopy_conductance = 0.2;
        for doy in 0..10 {
            wc.advance_day(doy, &uniform_day(), 2.0);
            assert!(wc.content_mm >= 0.0 && wc.content_mm <= wc.field_capacity_mm);
        }
    }

    #[test]
    fn permafrost_mass_balance_holds_after_a_year() {
        let mut pf = Permafrost::new(3.0, 0.4, 0.3);
        let mut day = uniform_day();
        for d in 0..365 {
            day.mean_temp = 10.0 * ((d as f64) / 365.0 * std::f64::consts::TAU).sin();
            pf.advance_day(&day, 0.5);
        }
        assert!(pf.mass_balance_ok());
    }
}
