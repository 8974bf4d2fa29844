//! Builders for small synthetic landscapes, reused by unit tests across this
//! crate and by integration tests in sibling crates (§4.16 "Test harness").
//!
//! Grounded in the teacher's `test_harness.rs`, which wraps a headless `App`
//! with a handful of fluent builder methods rather than hand-assembling
//! fixture state in every test. Nothing here needs a bevy `App`: a `Model` is
//! plain owned data, so the builders just construct one directly.

use crate::climate::{ClimateDay, ClimateTable};
use crate::config::ProjectConfig;
use crate::model::Model;
use crate::species::{Species, SpeciesSet};
use crate::tree::Tree;

/// A single-species set holding one generic conifer, "PISY", with round
/// allometric constants chosen for readable test assertions rather than
/// botanical accuracy.
pub fn single_species_set() -> SpeciesSet {
    let mut set = SpeciesSet::default();
    set.push(Species {
        id: "PISY".to_string(),
        phenology_group: 0,
        is_coniferous: true,
        is_evergreen: true,
        bm_foliage_a: 0.1,
        bm_foliage_b: 2.0,
        bm_woody_a: 0.05,
        bm_woody_b: 2.4,
        bm_root_a: 0.03,
        bm_root_b: 2.2,
        specific_leaf_area: 6.0,
        hd_sapling: 80.0,
        cn_foliage: 60.0,
        cn_fineroot: 60.0,
        cn_wood: 400.0,
        snag_ksw: 0.05,
        snag_kyl: 0.3,
        snag_kyr: 0.05,
        snag_halflife: 10.0,
        stamps: Default::default(),
    });
    set
}

/// A single climate year of `days` identical days (§8 scenario 1 uses a flat
/// climate so growth differences come only from tree state, not weather).
pub fn uniform_climate_table(days: usize, temp: f64, precip: f64, rad: f64) -> ClimateTable {
    let mut month = 1u8;
    let mut day_of_month = 1u8;
    let mut series = Vec::with_capacity(days);
    for _ in 0..days {
        series.push(ClimateDay {
            year: 2020,
            month,
            day: day_of_month,
            min_temp: temp - 3.0,
            max_temp: temp + 3.0,
            mean_temp: temp,
            delayed_temp: temp,
            precipitation: precip,
            radiation: rad,
            vpd: 0.5,
        });
        day_of_month += 1;
        if day_of_month > 28 {
            day_of_month = 1;
            month = (month % 12) + 1;
        }
    }
    ClimateTable::from_years("uniform".to_string(), vec![series], 48.0, vec![], false, vec![]).unwrap()
}

/// A flat, single-species landscape pre-populated with `trees_per_ru`
/// same-sized trees in every resource unit (§8 scenario 1 "monoculture
/// growth").
pub fn monoculture_landscape(width: f64, height: f64, buffer: f64, trees_per_ru: usize, dbh_cm: f64) -> Model {
    let config = ProjectConfig::from_toml_str(&format!(
        r#"
        [model.world]
        width = {width}
        height = {height}
        buffer = {buffer}
    "#
    ))
    .unwrap();

    let mut model = Model::load_project(config, single_species_set(), uniform_climate_table(365, 12.0, 3.0, 10.0)).unwrap();

    for ru in &mut model.resource_units {
        for i in 0..trees_per_ru {
            ru.trees.push(Tree::new(i as u64, 0, 0, dbh_cm, dbh_cm / 2.0));
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monoculture_landscape_seeds_every_ru_uniformly() {
        let model = monoculture_landscape(200.0, 100.0, 20.0, 4, 20.0);
        assert_eq!(model.resource_units.len(), 2);
        for ru in &model.resource_units {
            assert_eq!(ru.trees.len(), 4);
        }
    }

    #[test]
    fn uniform_climate_table_wraps_months_correctly() {
        let table = uniform_climate_table(60, 10.0, 2.0, 8.0);
        assert_eq!(table.year_count(), 1);
    }
}
