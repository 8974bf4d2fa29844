//! Species parameters, species sets, and light-influence stamps (§3
//! "Species / species set", "Stamp").

use serde::{Deserialize, Serialize};

/// Small square raster of per-cell light-influence contributions, shared
/// immutably by every tree of a given (species, size-class) once loaded
/// (§3 "Stamp").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stamp {
    /// Side length in cells; always odd so there is a center cell.
    pub size: usize,
    pub values: Vec<f32>,
    /// Crown radius (m) of the paired reader stamp.
    pub reader_crown_radius: f32,
}

impl Stamp {
    pub fn new(size: usize, reader_crown_radius: f32) -> Self {
        assert!(size % 2 == 1, "stamp size must be odd to have a center cell");
        Self {
            size,
            values: vec![0.0; size * size],
            reader_crown_radius,
        }
    }

    pub fn center_offset(&self) -> i32 {
        (self.size / 2) as i32
    }

    pub fn get(&self, dx: i32, dy: i32) -> f32 {
        let c = self.center_offset();
        let x = dx + c;
        let y = dy + c;
        if x < 0 || y < 0 || x as usize >= self.size || y as usize >= self.size {
            0.0
        } else {
            self.values[y as usize * self.size + x as usize]
        }
    }

    pub fn set(&mut self, dx: i32, dy: i32, value: f32) {
        let c = self.center_offset();
        let x = dx + c;
        let y = dy + c;
        if x >= 0 && y >= 0 && (x as usize) < self.size && (y as usize) < self.size {
            self.values[y as usize * self.size + x as usize] = value;
        }
    }
}

/// A (dbh, height) keyed lookup of pre-rendered stamps. Lookup picks the
/// nearest available size class rather than interpolating, matching the
/// "stamp pointer selected from species by size" contract of §3.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StampTable {
    entries: Vec<(f32, Stamp)>,
}

impl StampTable {
    pub fn insert(&mut self, dbh: f32, stamp: Stamp) {
        self.entries.push((dbh, stamp));
        self.entries
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    }

    pub fn lookup(&self, dbh: f32) -> Option<&Stamp> {
        self.entries
            .iter()
            .min_by(|a, b| (a.0 - dbh).abs().partial_cmp(&(b.0 - dbh).abs()).unwrap())
            .map(|(_, s)| s)
    }
}

/// Allometric, phenological and decomposition parameters for one species
/// (§3 "Species / species set").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    /// Stable short code, e.g. "PISY", "FASY".
    pub id: String,
    pub phenology_group: i32,
    pub is_coniferous: bool,
    pub is_evergreen: bool,

    // Allometry.
    pub bm_foliage_a: f64,
    pub bm_foliage_b: f64,
    pub bm_woody_a: f64,
    pub bm_woody_b: f64,
    pub bm_root_a: f64,
    pub bm_root_b: f64,
    pub specific_leaf_area: f64,
    pub hd_sapling: f64,

    // CN ratios.
    pub cn_foliage: f64,
    pub cn_fineroot: f64,
    pub cn_wood: f64,

    // Snag decomposition.
    pub snag_ksw: f64,
    pub snag_kyl: f64,
    pub snag_kyr: f64,
    pub snag_halflife: f64,

    #[serde(default)]
    pub stamps: StampTable,
}

impl Species {
    /// Evaluate the normalized light response curve from a raw light index
    /// in [0,1] (§4.3 step 1). A simple species-specific power curve stands
    /// in for the tabulated response class: shade-tolerant species (low
    /// `light_response_class`) flatten the curve near full light.
    pub fn light_response(&self, raw_light_index: f64, light_response_class: f64) -> f64 {
        raw_light_index.clamp(0.0, 1.0).powf(light_response_class.max(0.01))
    }
}

/// An ordered (by dense index) collection of species, with an active
/// sub-list (§3 "Species / species set").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpeciesSet {
    species: Vec<Species>,
    active: Vec<bool>,
}

impl SpeciesSet {
    pub fn push(&mut self, species: Species) -> usize {
        self.species.push(species);
        self.active.push(true);
        self.species.len() - 1
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, index: usize) -> &Species {
        &self.species[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.species.iter().position(|s| s.id == id)
    }

    pub fn set_active(&mut self, index: usize, active: bool) {
        self.active[index] = active;
    }

    pub fn active_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter(|(_, &a)| a)
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_species(id: &str) -> Species {
        Species {
            id: id.to_string(),
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
            stamps: StampTable::default(),
        }
    }

    #[test]
    fn stamp_lookup_picks_nearest_class() {
        let mut table = StampTable::default();
        table.insert(10.0, Stamp::new(5, 1.0));
        table.insert(30.0, Stamp::new(9, 2.0));
        let stamp = table.lookup(28.0).unwrap();
        assert_eq!(stamp.size, 9);
    }

    #[test]
    fn stamp_get_set_roundtrips_and_clips_offgrid() {
        let mut stamp = Stamp::new(3, 1.0);
        stamp.set(0, 0, 0.5);
        stamp.set(-1, 1, 0.25);
        assert_eq!(stamp.get(0, 0), 0.5);
        assert_eq!(stamp.get(-1, 1), 0.25);
        assert_eq!(stamp.get(5, 5), 0.0);
    }

    #[test]
    fn species_set_tracks_active_subset() {
        let mut set = SpeciesSet::default();
        let a = set.push(sample_species("PISY"));
        let b = set.push(sample_species("FASY"));
        set.set_active(b, false);
        let active: Vec<usize> = set.active_indices().collect();
        assert_eq!(active, vec![a]);
    }

    #[test]
    fn light_response_is_monotone_in_light_index() {
        let species = sample_species("PISY");
        let low = species.light_response(0.2, 2.0);
        let high = species.light_response(0.8, 2.0);
        assert!(high > low);
    }
}
