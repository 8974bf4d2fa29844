//! The individual tree: state, flags, growth and mortality (§3 "Tree",
//! §4.3).

use bitcode::__private::{Buffer, Decoder, Encoder, View};
use bitcode::{Decode, Encode};
use core::num::NonZeroUsize;
use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Per-tree status bitset (§3 "Tree" flags list).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct TreeFlags: u16 {
        const DEAD                 = 1 << 0;
        const DEBUGGING             = 1 << 1;
        const DEAD_BARK_BEETLE       = 1 << 2;
        const DEAD_WIND              = 1 << 3;
        const DEAD_FIRE              = 1 << 4;
        const DEAD_KILL_AND_DROP      = 1 << 5;
        const HARVESTED             = 1 << 6;
        const MARK_FOR_CUT           = 1 << 7;
        const MARK_FOR_HARVEST       = 1 << 8;
        const MARK_CROP_TREE         = 1 << 9;
        const MARK_CROP_COMPETITOR   = 1 << 10;
        const AFFECTED_BITE          = 1 << 11;
        const MARK_NO_HARVEST        = 1 << 12;
    }
}

/// Encodes/decodes [`TreeFlags`] as its underlying `u16` bit pattern, since
/// `bitcode`'s derive macro can't see through the `bitflags!`-generated type.
#[derive(Default)]
pub struct TreeFlagsEncoder(<u16 as Encode>::Encoder);

impl Buffer for TreeFlagsEncoder {
    fn collect_into(&mut self, out: &mut Vec<u8>) {
        self.0.collect_into(out);
    }
    fn reserve(&mut self, additional: NonZeroUsize) {
        self.0.reserve(additional);
    }
}

impl Encoder<TreeFlags> for TreeFlagsEncoder {
    fn encode(&mut self, t: &TreeFlags) {
        self.0.encode(&t.bits());
    }
}

impl Encode for TreeFlags {
    type Encoder = TreeFlagsEncoder;
}

#[derive(Default)]
pub struct TreeFlagsDecoder<'a>(<u16 as Decode<'a>>::Decoder);

impl<'a> View<'a> for TreeFlagsDecoder<'a> {
    fn populate(&mut self, input: &mut &'a [u8], length: usize) -> bitcode::__private::Result<()> {
        self.0.populate(input, length)
    }
}

impl<'a> Decoder<'a, TreeFlags> for TreeFlagsDecoder<'a> {
    fn decode(&mut self) -> TreeFlags {
        TreeFlags::from_bits_retain(self.0.decode())
    }
}

impl<'a> Decode<'a> for TreeFlags {
    type Decoder = TreeFlagsDecoder<'a>;
}

/// Dry-mass biomass compartments in kg (§3 "Tree").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Encode, Decode)]
pub struct BiomassCompartments {
    pub foliage: f64,
    pub stem: f64,
    pub branches: f64,
    pub fine_roots: f64,
    pub coarse_roots: f64,
    /// NPP reserve. Conceptually part of the stem; kept separate in memory
    /// and summed only when reporting total stem biomass (§9 open question c).
    pub npp_reserve: f64,
}

impl BiomassCompartments {
    pub fn total_stem_including_reserve(&self) -> f64 {
        self.stem + self.npp_reserve
    }
}

/// Exclusively owned by its `ResourceUnit`'s tree vector (§3 "Tree", §9
/// "Exclusive ownership").
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Tree {
    pub id: u64,
    pub species_index: usize,
    /// Index into the owning RU's 2 m LIF grid.
    pub lif_index: usize,
    pub age: u32,
    pub dbh_cm: f64,
    pub height_m: f64,
    pub leaf_area_m2: f64,
    pub crown_opacity: f64,
    pub biomass: BiomassCompartments,
    /// Raw light influence field reading at the tree's position.
    pub light_resource_index: f64,
    pub light_response: f64,
    pub stress_index: f64,
    pub flags: TreeFlags,
}

impl Tree {
    pub fn new(id: u64, species_index: usize, lif_index: usize, dbh_cm: f64, height_m: f64) -> Self {
        debug_assert!(dbh_cm >= 0.0 && height_m >= 0.0);
        Self {
            id,
            species_index,
            lif_index,
            age: 0,
            dbh_cm,
            height_m,
            leaf_area_m2: 0.0,
            crown_opacity: 1.0,
            biomass: BiomassCompartments::default(),
            light_resource_index: 1.0,
            light_response: 1.0,
            stress_index: 0.0,
            flags: TreeFlags::empty(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(TreeFlags::DEAD)
    }

    /// Marks the tree dead for `reason`, freezing its age per §4.3 step 6.
    pub fn kill(&mut self, reason: TreeFlags) {
        self.flags.insert(TreeFlags::DEAD | reason);
    }

    /// `calcLightResponse` (§4.3 step 1): transform the raw light index
    /// through the species' light response curve.
    pub fn update_light_response(&mut self, response_class: f64) {
        self.light_response = self.light_resource_index.clamp(0.0, 1.0).powf(response_class.max(0.01));
    }

    /// Aging-weighted contribution of this tree to the RU's aging
    /// accumulator (§4.3 "Aging-weighted average"): `leafArea * aging`.
    /// `aging` is a bounded 0..1 function of height and age; outside the
    /// range is a diagnostic error the caller should log, not panic on.
    pub fn aging_contribution(&self, max_age: u32, max_height_m: f64) -> f64 {
        let age_term = (self.age as f64 / max_age.max(1) as f64).clamp(0.0, 1.0);
        let height_term = (self.height_m / max_height_m.max(0.01)).clamp(0.0, 1.0);
        let aging = (age_term * height_term).clamp(0.0, 1.0);
        self.leaf_area_m2 * aging
    }

    /// §4.3 step 5: diameter/height growth driven by stem NPP and a
    /// relative height-growth function scaled by light.
    pub fn grow_from_stem_npp(&mut self, stem_npp_kg: f64, height_growth_species_b: f64) {
        if stem_npp_kg <= 0.0 {
            return;
        }
        self.biomass.stem += stem_npp_kg;
        // dDBH proportional to cube-root of added stem mass, a coarse stand-
        // in for the species allometric inverse used in the original model.
        let d_dbh = (stem_npp_kg.max(0.0)).cbrt() * 0.05;
        self.dbh_cm += d_dbh;
        let d_height = d_dbh * height_growth_species_b * self.light_response;
        self.height_m += d_height.max(0.0);
    }

    /// §4.3 step 6: intrinsic aging plus stress-driven mortality
    /// probability, drawn from the supplied RNG (per-RU substream, §9).
    pub fn evaluate_mortality<R: rand::Rng>(&mut self, rng: &mut R, intrinsic_p: f64, stress_p_scale: f64) {
        if self.is_dead() {
            return;
        }
        let p = (intrinsic_p + self.stress_index * stress_p_scale).clamp(0.0, 1.0);
        if rng.gen::<f64>() < p {
            self.kill(TreeFlags::empty());
        } else {
            self.age += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn kill_sets_dead_and_reason_flags() {
        let mut t = Tree::new(1, 0, 0, 10.0, 5.0);
        t.kill(TreeFlags::DEAD_FIRE);
        assert!(t.is_dead());
        assert!(t.flags.contains(TreeFlags::DEAD_FIRE));
    }

    #[test]
    fn dead_trees_do_not_age_further_under_mortality() {
        let mut t = Tree::new(1, 0, 0, 10.0, 5.0);
        t.kill(TreeFlags::empty());
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
        let age_before = t.age;
        t.evaluate_mortality(&mut rng, 1.0, 0.0);
        assert_eq!(t.age, age_before);
    }

    #[test]
    fn growth_increases_dbh_and_height_with_positive_npp() {
        let mut t = Tree::new(1, 0, 0, 10.0, 5.0);
        t.light_response = 1.0;
        let dbh_before = t.dbh_cm;
        let height_before = t.height_m;
        t.grow_from_stem_npp(2.0, 0.3);
        assert!(t.dbh_cm > dbh_before);
        assert!(t.height_m > height_before);
    }

    #[test]
    fn aging_contribution_is_zero_for_seedling() {
        let t = Tree::new(1, 0, 0, 1.0, 0.2);
        assert_eq!(t.aging_contribution(200, 40.0), 0.0);
    }
}
