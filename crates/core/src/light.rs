//! Light competition engine: stamping the LIF, reading it back, and
//! stocked-area derivation (§4.2).

use crate::grid::{Grid, HeightCell, HeightFlags, LightGrid};
use crate::species::Stamp;
use crate::tree::Tree;

/// `applyLIP` (§4.2): multiplicatively subtracts the tree's stamp,
/// weighted by crown opacity, from the LIF cells around its position.
/// Off-grid stamp cells are clipped in non-torus mode; in torus mode the
/// coordinates wrap modulo the grid dimensions.
pub fn apply_light_influence_pattern(lif: &mut LightGrid, tree: &Tree, stamp: &Stamp, center_x: i32, center_y: i32, torus: bool) {
    let half = stamp.center_offset();
    for dy in -half..=half {
        for dx in -half..=half {
            let value = stamp.get(dx, dy);
            if value <= 0.0 {
                continue;
            }
            let factor = 1.0 - value * tree.crown_opacity as f32;
            let (x, y) = (center_x + dx, center_y + dy);
            if torus {
                let idx = lif.index_of_torus(x, y);
                let cell = lif.get_by_index_mut(idx);
                *cell *= factor.max(0.0);
            } else if let Some(cell) = lif.get_mut(x, y) {
                *cell *= factor.max(0.0);
            }
        }
    }
}

/// `heightGrid` (§4.2): writes the tree's height into every 10 m cell the
/// crown radius covers, taking the maximum (idempotent under races, per
/// §5 "Shared resources").
pub fn write_height_grid(height_grid: &mut Grid<HeightCell>, tree: &Tree, crown_radius_m: f32, center_x_m: f64, center_y_m: f64, cell_size_m: f64) {
    let radius_cells = (crown_radius_m as f64 / cell_size_m).ceil() as i32;
    let (cx, cy) = height_grid.cell_of(center_x_m, center_y_m);
    for dy in -radius_cells..=radius_cells {
        for dx in -radius_cells..=radius_cells {
            if let Some(cell) = height_grid.get_mut(cx + dx, cy + dy) {
                if !cell.flags.contains(HeightFlags::VALID) {
                    continue;
                }
                cell.stem_height = cell.stem_height.max(tree.height_m as f32);
                cell.stocked_pixels = cell.stocked_pixels.saturating_add(1);
                cell.flags.insert(HeightFlags::RADIATING);
            }
        }
    }
}

/// `readLIF` (§4.2): averages, via the reader stamp, LIF values inside the
/// tree's crown footprint relative to the stamp's center.
pub fn read_light_influence_field(lif: &LightGrid, reader: &Stamp, center_x: i32, center_y: i32, torus: bool) -> f64 {
    let half = reader.center_offset();
    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for dy in -half..=half {
        for dx in -half..=half {
            let w = reader.get(dx, dy) as f64;
            if w <= 0.0 {
                continue;
            }
            let (x, y) = (center_x + dx, center_y + dy);
            let value = if torus {
                *lif.get_by_index(lif.index_of_torus(x, y)) as f64
            } else {
                lif.get(x, y).copied().unwrap_or(1.0) as f64
            };
            sum += value * w;
            weight += w;
        }
    }
    if weight > 0.0 {
        sum / weight
    } else {
        1.0
    }
}

/// Stocked-area derivation (§4.2): count 10 m cells with a nonzero
/// stocked-pixel counter; below LAI 3, blend with the sum of individual
/// crown areas (linear interpolation between LAI=1 and LAI=3) to avoid
/// over-estimating cover in sparse stands.
pub fn stocked_area_m2(height_grid: &Grid<HeightCell>, ru_cells: impl Iterator<Item = usize>, lai: f64, sum_crown_area_m2: f64, cell_area_m2: f64) -> f64 {
    let pixel_based: f64 = ru_cells
        .filter(|&idx| height_grid.get_by_index(idx).stocked_pixels > 0)
        .count() as f64
        * cell_area_m2;

    if lai >= 3.0 {
        pixel_based
    } else if lai <= 1.0 {
        sum_crown_area_m2.min(pixel_based.max(sum_crown_area_m2))
    } else {
        let blend = (lai - 1.0) / 2.0;
        sum_crown_area_m2 * (1.0 - blend) + pixel_based * blend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::species::Stamp;

    #[test]
    fn apply_pattern_reduces_lif_values() {
        let mut lif: LightGrid = Grid::new(20, 20, 2.0, 0.0, 0.0, 1.0);
        let mut stamp = Stamp::new(3, 2.0);
        stamp.set(0, 0, 0.5);
        let tree = Tree::new(1, 0, 0, 30.0, 15.0);
        apply_light_influence_pattern(&mut lif, &tree, &stamp, 10, 10, false);
        assert!(*lif.get(10, 10).unwrap() < 1.0);
    }

    #[test]
    fn read_lif_averages_within_reader_footprint() {
        let mut lif: LightGrid = Grid::new(20, 20, 2.0, 0.0, 0.0, 0.8);
        let mut reader = Stamp::new(3, 2.0);
        for dy in -1..=1 {
            for dx in -1..=1 {
                reader.set(dx, dy, 1.0);
            }
        }
        let value = read_light_influence_field(&lif, &reader, 10, 10, false);
        assert!((value - 0.8).abs() < 1e-6);
        lif.set(10, 10, 0.0);
        let value2 = read_light_influence_field(&lif, &reader, 10, 10, false);
        assert!(value2 < 0.8);
    }

    #[test]
    fn stocked_area_blends_below_lai_three() {
        let height_grid: Grid<crate::grid::HeightCell> = Grid::new(5, 5, 10.0, 0.0, 0.0, crate::grid::HeightCell::default());
        let area = stocked_area_m2(&height_grid, std::iter::empty(), 2.0, 500.0, 100.0);
        assert!(area > 0.0 && area <= 500.0);
    }
}
