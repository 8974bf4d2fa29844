//! State-and-variable-dynamics (SVD) forest-state classifier (§4.9 "SVD
//! state output"), grounded on the original `SVDState` struct (composition
//! string, structure/function classes, dominant + up to 5 admixed species).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureResolution {
    TwoMeter,
    FourMeter,
}

impl StructureResolution {
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "2m" => StructureResolution::TwoMeter,
            _ => StructureResolution::FourMeter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionResolution {
    ThreeBin,
    FiveBin,
}

impl FunctionResolution {
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "5" => FunctionResolution::FiveBin,
            _ => FunctionResolution::ThreeBin,
        }
    }
}

/// One species contribution to a state's composition (§4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesShare {
    pub species_id: String,
    pub basal_area_fraction: f64,
}

/// A classified forest state: composition, structure, function, and the
/// dominant + up to 5 admixed species (§4.9, original `SVDState`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvdState {
    pub id: u32,
    pub structure_class: u8,
    pub function_class: u8,
    pub dominant_species: String,
    pub admixed_species: Vec<String>,
    pub composition: String,
    pub state_label: String,
}

/// Classifies an RU's top-height/LAI/species-basal-area profile into a
/// `(structure, function, dominant, admixed)` tuple and looks it up (or
/// registers a new one) in a process-wide state table (§4.9).
#[derive(Debug, Default)]
pub struct SvdClassifier {
    states_by_key: HashMap<String, u32>,
    states: Vec<SvdState>,
}

/// Height classification per §4.9: "4 m" = 21 classes of 4 m + 6
/// irregular; "2 m" = 31 classes of 2 m + 8 irregular. Irregular = median
/// of 10 m dominant-height cells < 50% of the RU's 90th-percentile top
/// height.
fn structure_class(resolution: StructureResolution, p90_top_height_m: f64, median_dominant_height_m: f64) -> u8 {
    let (class_size, irregular_base) = match resolution {
        StructureResolution::FourMeter => (4.0, 21u8),
        StructureResolution::TwoMeter => (2.0, 31u8),
    };
    if median_dominant_height_m < 0.5 * p90_top_height_m {
        let irregular_index = ((median_dominant_height_m / class_size).floor() as u8).min(
            match resolution {
                StructureResolution::FourMeter => 5,
                StructureResolution::TwoMeter => 7,
            },
        );
        irregular_base + irregular_index
    } else {
        (p90_top_height_m / class_size).floor() as u8
    }
}

fn function_class(resolution: FunctionResolution, lai: f64) -> u8 {
    match resolution {
        FunctionResolution::ThreeBin => {
            if lai < 2.0 {
                0
            } else if lai <= 4.0 {
                1
            } else {
                2
            }
        }
        FunctionResolution::FiveBin => (lai.floor() as u8).min(4),
    }
}

/// Species admixture from total basal area including saplings: dominant
/// contributes >66% BA, admixed species >=20% BA (§4.9).
fn admixture(shares: &[SpeciesShare]) -> (Option<&SpeciesShare>, Vec<&SpeciesShare>) {
    let dominant = shares
        .iter()
        .max_by(|a, b| a.basal_area_fraction.partial_cmp(&b.basal_area_fraction).unwrap());
    let dominant = dominant.filter(|d| d.basal_area_fraction > 0.66);
    let admixed: Vec<&SpeciesShare> = shares
        .iter()
        .filter(|s| s.basal_area_fraction >= 0.20 && Some(*s) != dominant)
        .take(5)
        .collect();
    (dominant, admixed)
}

impl SvdClassifier {
    pub fn classify(
        &mut self,
        structure_resolution: StructureResolution,
        function_resolution: FunctionResolution,
        p90_top_height_m: f64,
        median_dominant_height_m: f64,
        lai: f64,
        species_shares: &[SpeciesShare],
    ) -> SvdState {
        let structure = structure_class(structure_resolution, p90_top_height_m, median_dominant_height_m);
        let function = function_class(function_resolution, lai);
        let (dominant, admixed) = admixture(species_shares);

        let dominant_id = dominant.map(|d| d.species_id.clone()).unwrap_or_default();
        let admixed_ids: Vec<String> = admixed.iter().map(|s| s.species_id.to_lowercase()).collect();
        let composition = if admixed_ids.is_empty() {
            dominant_id.clone()
        } else {
            format!("{} {}", dominant_id, admixed_ids.join(" "))
        };

        let height_band = height_band_label(structure_resolution, structure);
        let function_band = function_band_label(function_resolution, function);
        let state_label = format!("{composition} {height_band} {function_band}");

        let key = format!("{structure}|{function}|{composition}");
        let id = *self
            .states_by_key
            .entry(key)
            .or_insert_with(|| self.states.len() as u32);

        let state = SvdState {
            id,
            structure_class: structure,
            function_class: function,
            dominant_species: dominant_id,
            admixed_species: admixed.iter().map(|s| s.species_id.clone()).collect(),
            composition,
            state_label,
        };
        if (id as usize) == self.states.len() {
            self.states.push(state.clone());
        }
        state
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

fn height_band_label(resolution: StructureResolution, class: u8) -> String {
    let class_size = match resolution {
        StructureResolution::FourMeter => 4,
        StructureResolution::TwoMeter => 2,
    };
    let lo = class as u32 * class_size;
    let hi = lo + class_size;
    format!("{lo}m-{hi}m")
}

fn function_band_label(resolution: FunctionResolution, class: u8) -> String {
    match resolution {
        FunctionResolution::ThreeBin => match class {
            0 => "0-2".to_string(),
            1 => "2-4".to_string(),
            _ => "4+".to_string(),
        },
        FunctionResolution::FiveBin => format!("{class}-{}", class + 1),
    }
}

/// Tracks per-RU state transitions: current/previous state id and years
/// spent in each (§4.9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuStateHistory {
    pub current_state_id: Option<u32>,
    pub years_in_current_state: u32,
    pub previous_state_id: Option<u32>,
    pub years_in_previous_state: u32,
}

impl RuStateHistory {
    pub fn advance(&mut self, new_state_id: u32) -> bool {
        match self.current_state_id {
            Some(id) if id == new_state_id => {
                self.years_in_current_state += 1;
                false
            }
            _ => {
                self.previous_state_id = self.current_state_id;
                self.years_in_previous_state = self.years_in_current_state;
                self.current_state_id = Some(new_state_id);
                self.years_in_current_state = 1;
                true
            }
        }
    }
}

/// Eight-cell (local) and 37-cell-disc (mid-distance) neighborhood species
/// shares per RU; per-state contribution follows the fixed-weight rules of
/// §4.9.
pub fn neighborhood_weights(dominant_count: usize, other_count: usize) -> Vec<f64> {
    match (dominant_count, other_count) {
        (1, 0) => vec![1.0],
        (1, 1) => vec![0.67, 0.33],
        (0, 1) => vec![0.5],
        (0, 2) => vec![0.5, 0.5],
        (0, 3) => vec![1.0 / 3.0; 3],
        (0, 4) => vec![0.25; 4],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_svd_state_classifier() {
        // §9 scenario 5.
        let mut classifier = SvdClassifier::default();
        let shares = vec![
            SpeciesShare {
                species_id: "PISY".to_string(),
                basal_area_fraction: 0.70,
            },
            SpeciesShare {
                species_id: "FASY".to_string(),
                basal_area_fraction: 0.22,
            },
            SpeciesShare {
                species_id: "PIAB".to_string(),
                basal_area_fraction: 0.05,
            },
        ];
        let state = classifier.classify(
            StructureResolution::FourMeter,
            FunctionResolution::ThreeBin,
            12.0,
            12.0,
            2.5,
            &shares,
        );
        assert_eq!(state.structure_class, 3);
        assert_eq!(state.function_class, 1);
        assert_eq!(state.dominant_species, "PISY");
        assert_eq!(state.admixed_species, vec!["FASY".to_string()]);
        assert_eq!(state.composition, "PISY fasy");
        assert!(state.state_label.starts_with("PISY fasy "));
        assert!(state.state_label.contains("8m-12m"));
        assert!(state.state_label.contains("2-4"));
    }

    #[test]
    fn identical_composition_and_structure_share_state_id() {
        let mut classifier = SvdClassifier::default();
        let shares = vec![SpeciesShare {
            species_id: "PISY".to_string(),
            basal_area_fraction: 1.0,
        }];
        let a = classifier.classify(StructureResolution::FourMeter, FunctionResolution::ThreeBin, 12.0, 12.0, 1.0, &shares);
        let b = classifier.classify(StructureResolution::FourMeter, FunctionResolution::ThreeBin, 12.0, 12.0, 1.0, &shares);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn history_tracks_previous_state_on_transition() {
        let mut history = RuStateHistory::default();
        history.advance(1);
        history.advance(1);
        let transitioned = history.advance(2);
        assert!(transitioned);
        assert_eq!(history.previous_state_id, Some(1));
        assert_eq!(history.years_in_previous_state, 2);
    }
}
