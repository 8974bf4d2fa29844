//! 10 m stand/map grid: bounding rectangles, RU overlap index, tree/dead-
//! tree iteration and per-stand concurrency locks (§3 "Stand grid / map
//! grid", §4.10).

use crate::grid::{Grid, MetricRect};
use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};

/// A 10 m integer raster of stand ids, clipped to the world (§4.10).
#[derive(Debug, Clone)]
pub struct StandGrid {
    pub ids: Grid<i32>,
}

/// Precomputed per-stand-id index: bounding rectangle, area, and which
/// resource units it overlaps with what area fraction (§4.10).
#[derive(Debug, Clone, Default)]
pub struct StandIndexEntry {
    pub bounding_rect: Option<MetricRect>,
    pub area_m2: f64,
    /// (RU dense index, area fraction 0..1) pairs.
    pub ru_overlaps: Vec<(usize, f64)>,
}

#[derive(Debug, Default)]
pub struct StandIndex {
    entries: HashMap<i32, StandIndexEntry>,
    /// 4-connected neighbor relation, computed lazily.
    neighbors: Option<HashMap<i32, HashSet<i32>>>,
}

impl StandGrid {
    pub fn new(ids: Grid<i32>) -> Self {
        Self { ids }
    }

    /// Builds the stand index: bounding rect/area per id and, given a
    /// function mapping a 10 m cell to its owning RU's dense index, the
    /// per-RU overlap fractions (§4.10).
    pub fn build_index(&self, ru_of_cell: impl Fn(i32, i32) -> Option<usize>) -> StandIndex {
        let mut entries: HashMap<i32, StandIndexEntry> = HashMap::new();
        let cell_area = self.ids.cell_size() * self.ids.cell_size();
        let mut ru_cell_counts: HashMap<(i32, usize), u64> = HashMap::new();
        let mut stand_cell_counts: HashMap<i32, u64> = HashMap::new();

        for y in 0..self.ids.size_y() {
            for x in 0..self.ids.size_x() {
                let id = *self.ids.get(x, y).unwrap();
                if id <= 0 {
                    continue; // ids <= 0 reserved and excluded (§9 open question b)
                }
                let entry = entries.entry(id).or_default();
                let (ox, oy) = self.ids.cell_origin(x, y);
                let cell_rect = MetricRect::new(ox, oy, self.ids.cell_size(), self.ids.cell_size());
                entry.bounding_rect = Some(union_rect(entry.bounding_rect, cell_rect));
                entry.area_m2 += cell_area;
                *stand_cell_counts.entry(id).or_insert(0) += 1;
                if let Some(ru) = ru_of_cell(x, y) {
                    *ru_cell_counts.entry((id, ru)).or_insert(0) += 1;
                }
            }
        }

        for ((id, ru), count) in ru_cell_counts {
            let total = *stand_cell_counts.get(&id).unwrap_or(&1) as f64;
            let fraction = count as f64 / total.max(1.0);
            entries.entry(id).or_default().ru_overlaps.push((ru, fraction));
        }

        StandIndex {
            entries,
            neighbors: None,
        }
    }
}

fn union_rect(existing: Option<MetricRect>, cell: MetricRect) -> MetricRect {
    match existing {
        None => cell,
        Some(r) => {
            let min_x = r.x.min(cell.x);
            let min_y = r.y.min(cell.y);
            let max_x = (r.x + r.width).max(cell.x + cell.width);
            let max_y = (r.y + r.height).max(cell.y + cell.height);
            MetricRect::new(min_x, min_y, max_x - min_x, max_y - min_y)
        }
    }
}

impl StandIndex {
    pub fn entry(&self, stand_id: i32) -> Option<&StandIndexEntry> {
        self.entries.get(&stand_id)
    }

    pub fn stand_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.keys().copied()
    }

    /// Lazily computes the 4-connected stand-neighbor relation by scanning
    /// the id grid once (§4.10).
    pub fn neighbors(&mut self, grid: &StandGrid) -> &HashMap<i32, HashSet<i32>> {
        if self.neighbors.is_none() {
            let mut map: HashMap<i32, HashSet<i32>> = HashMap::new();
            for y in 0..grid.ids.size_y() {
                for x in 0..grid.ids.size_x() {
                    let id = *grid.ids.get(x, y).unwrap();
                    if id <= 0 {
                        continue;
                    }
                    for n in grid.ids.neighbors4(x, y).into_iter().flatten() {
                        let nid = *grid.ids.get_by_index(n);
                        if nid > 0 && nid != id {
                            map.entry(id).or_default().insert(nid);
                            map.entry(nid).or_default().insert(id);
                        }
                    }
                }
            }
            self.neighbors = Some(map);
        }
        self.neighbors.as_ref().unwrap()
    }
}

/// Concurrency-safe serialization helper (§4.10): at most one worker at a
/// time may hold the set of RUs belonging to a given stand id, but workers
/// on disjoint RU sets proceed concurrently.
#[derive(Default)]
pub struct StandLockTable {
    locked_rus: Mutex<HashSet<usize>>,
    cv: Condvar,
}

pub struct StandLockGuard<'a> {
    table: &'a StandLockTable,
    rus: Vec<usize>,
}

impl StandLockTable {
    /// Blocks until none of `rus` are currently locked by another worker,
    /// then locks them all and returns a guard that releases on drop.
    pub fn lock_rus(&self, rus: Vec<usize>) -> StandLockGuard<'_> {
        let mut locked = self.locked_rus.lock().unwrap();
        loop {
            if rus.iter().all(|r| !locked.contains(r)) {
                locked.extend(rus.iter().copied());
                break;
            }
            locked = self.cv.wait(locked).unwrap();
        }
        StandLockGuard { table: self, rus }
    }
}

impl Drop for StandLockGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.table.locked_rus.lock().unwrap();
        for r in &self.rus {
            locked.remove(r);
        }
        self.table.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stand_index_excludes_nonpositive_ids() {
        let mut ids: Grid<i32> = Grid::new(4, 4, 10.0, 0.0, 0.0, 0);
        ids.set(0, 0, 1);
        ids.set(1, 0, 0);
        ids.set(2, 0, -1);
        let grid = StandGrid::new(ids);
        let index = grid.build_index(|_, _| None);
        assert!(index.entry(1).is_some());
        assert!(index.entry(0).is_none());
        assert!(index.entry(-1).is_none());
    }

    #[test]
    fn neighbor_relation_is_bidirectional() {
        let mut ids: Grid<i32> = Grid::new(2, 1, 10.0, 0.0, 0.0, 0);
        ids.set(0, 0, 1);
        ids.set(1, 0, 2);
        let grid = StandGrid::new(ids);
        let mut index = grid.build_index(|_, _| None);
        let neighbors = index.neighbors(&grid);
        assert!(neighbors[&1].contains(&2));
        assert!(neighbors[&2].contains(&1));
    }

    #[test]
    fn disjoint_ru_sets_do_not_block_each_other() {
        let table = StandLockTable::default();
        let _g1 = table.lock_rus(vec![1, 2]);
        let g2 = table.lock_rus(vec![3, 4]);
        drop(g2);
    }
}
