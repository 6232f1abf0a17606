//! Uniform hash grid for proximity queries over moving points.

use bevy::math::Vec2;
use std::collections::HashMap;
use std::hash::Hash;

/// Smallest usable cell size, guards against zero-length scales.
const MIN_CELL_SIZE: f32 = 1e-4;

/// Spatial hash grid. Keys are (cell_x, cell_y).
///
/// Items are small copyable keys (edge ids, `(edge, point)` pairs). Results
/// are always sorted so callers never observe hash iteration order.
#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    cell_size: f32,
    cell_to_items: HashMap<(i32, i32), Vec<(T, Vec2)>>,
    item_to_cell: HashMap<T, (i32, i32)>,
    min_cell: (i32, i32),
    max_cell: (i32, i32),
}

impl<T: Copy + Ord + Hash> SpatialGrid<T> {
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() {
            cell_size.max(MIN_CELL_SIZE)
        } else {
            MIN_CELL_SIZE
        };
        Self {
            cell_size,
            cell_to_items: HashMap::new(),
            item_to_cell: HashMap::new(),
            min_cell: (i32::MAX, i32::MAX),
            max_cell: (i32::MIN, i32::MIN),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.item_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_to_cell.is_empty()
    }

    pub fn world_to_cell(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    /// Inserts or moves an item.
    pub fn insert(&mut self, item: T, pos: Vec2) {
        self.remove(item);
        let cell = self.world_to_cell(pos);
        self.item_to_cell.insert(item, cell);
        self.cell_to_items.entry(cell).or_default().push((item, pos));
        self.min_cell = (self.min_cell.0.min(cell.0), self.min_cell.1.min(cell.1));
        self.max_cell = (self.max_cell.0.max(cell.0), self.max_cell.1.max(cell.1));
    }

    pub fn remove(&mut self, item: T) {
        if let Some(cell) = self.item_to_cell.remove(&item) {
            if let Some(items) = self.cell_to_items.get_mut(&cell) {
                items.retain(|(i, _)| *i != item);
                if items.is_empty() {
                    self.cell_to_items.remove(&cell);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.cell_to_items.clear();
        self.item_to_cell.clear();
        self.min_cell = (i32::MAX, i32::MAX);
        self.max_cell = (i32::MIN, i32::MIN);
    }

    /// Replaces the whole content, used between relaxation passes.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (T, Vec2)>) {
        self.clear();
        for (item, pos) in items {
            self.insert(item, pos);
        }
    }

    fn cells_in_box(&self, min: Vec2, max: Vec2) -> ((i32, i32), (i32, i32)) {
        let lo = self.world_to_cell(min);
        let hi = self.world_to_cell(max);
        (
            (lo.0.max(self.min_cell.0), lo.1.max(self.min_cell.1)),
            (hi.0.min(self.max_cell.0), hi.1.min(self.max_cell.1)),
        )
    }

    fn visit_cells(&self, lo: (i32, i32), hi: (i32, i32), mut f: impl FnMut(&(T, Vec2))) {
        if lo.0 > hi.0 || lo.1 > hi.1 {
            return;
        }
        let box_cells = (hi.0 as i64 - lo.0 as i64 + 1) as u64 * (hi.1 as i64 - lo.1 as i64 + 1) as u64;
        if box_cells > self.cell_to_items.len() as u64 {
            for (cell, items) in &self.cell_to_items {
                if (lo.0..=hi.0).contains(&cell.0) && (lo.1..=hi.1).contains(&cell.1) {
                    items.iter().for_each(&mut f);
                }
            }
        } else {
            for cx in lo.0..=hi.0 {
                for cy in lo.1..=hi.1 {
                    if let Some(items) = self.cell_to_items.get(&(cx, cy)) {
                        items.iter().for_each(&mut f);
                    }
                }
            }
        }
    }

    /// All items within `radius` of `center`, sorted by item.
    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<(T, f32)> {
        let mut out = Vec::new();
        if self.is_empty() || !(radius >= 0.0) {
            return out;
        }
        if radius.is_infinite() {
            for items in self.cell_to_items.values() {
                out.extend(items.iter().map(|(item, pos)| (*item, pos.distance(center))));
            }
        } else {
            let r = Vec2::splat(radius);
            let (lo, hi) = self.cells_in_box(center - r, center + r);
            let r2 = radius * radius;
            self.visit_cells(lo, hi, |(item, pos)| {
                let d2 = pos.distance_squared(center);
                if d2 <= r2 {
                    out.push((*item, d2.sqrt()));
                }
            });
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Up to `k` items accepted by `filter`, nearest first, no farther than
    /// `max_radius`. Ties break on item order.
    pub fn nearest(
        &self,
        center: Vec2,
        k: usize,
        max_radius: f32,
        mut filter: impl FnMut(T) -> bool,
    ) -> Vec<(T, f32)> {
        let mut found: Vec<(T, f32)> = Vec::new();
        if k == 0 || self.is_empty() || !(max_radius >= 0.0) {
            return found;
        }
        let origin = self.world_to_cell(center);
        let reach = origin
            .0
            .saturating_sub(self.min_cell.0)
            .max(self.max_cell.0.saturating_sub(origin.0))
            .max(origin.1.saturating_sub(self.min_cell.1))
            .max(self.max_cell.1.saturating_sub(origin.1))
            .max(0);

        let mut collect = |items: &[(T, Vec2)], found: &mut Vec<(T, f32)>| {
            for (item, pos) in items {
                let d = pos.distance(center);
                if d <= max_radius && filter(*item) {
                    found.push((*item, d));
                }
            }
        };

        let side = 2 * reach as u64 + 1;
        if side.saturating_mul(side) > 16 * self.cell_to_items.len() as u64 {
            // Sparse grid: a scan is cheaper than walking empty rings.
            for items in self.cell_to_items.values() {
                collect(items, &mut found);
            }
            sort_by_distance(&mut found);
            found.truncate(k);
            return found;
        }

        let mut visit = |cell: (i32, i32), found: &mut Vec<(T, f32)>| {
            if let Some(items) = self.cell_to_items.get(&cell) {
                collect(items, found);
            }
        };

        for ring in 0..=reach {
            if ring == 0 {
                visit(origin, &mut found);
            } else {
                for dx in -ring..=ring {
                    visit((origin.0 + dx, origin.1 - ring), &mut found);
                    visit((origin.0 + dx, origin.1 + ring), &mut found);
                }
                for dy in (-ring + 1)..ring {
                    visit((origin.0 - ring, origin.1 + dy), &mut found);
                    visit((origin.0 + ring, origin.1 + dy), &mut found);
                }
            }
            // Everything closer than `covered` has been seen. One ring of
            // slack absorbs rounding in `world_to_cell`.
            let covered = ring.saturating_sub(1) as f32 * self.cell_size;
            if covered > max_radius {
                break;
            }
            if found.len() >= k {
                sort_by_distance(&mut found);
                if found[k - 1].1 < covered {
                    break;
                }
            }
        }

        sort_by_distance(&mut found);
        found.truncate(k);
        found
    }
}

fn sort_by_distance<T: Ord>(items: &mut [(T, f32)]) {
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
}
