//! Spatial grid index over `latlongring` rules.
//!
//! Rules with a ring condition are bucketed into 1° lat/lon cells covering
//! their pre-computed bounding box; per point, only ring rules whose cells
//! intersect the point's cell are considered. Rules without a ring condition
//! are always candidates, so enabling the index never changes which rules
//! can match.

use std::collections::HashMap;

use crate::rules::RuleSet;

/// Grid cell size in degrees (~60 nm of latitude).
pub const GRID_CELL_DEG: f64 = 1.0;

#[derive(Debug, Default)]
pub struct RuleGrid {
    /// (cell_lat, cell_lon) → ring-rule indices, ascending.
    cells: HashMap<(i32, i32), Vec<usize>>,
    /// Rules with no ring condition, ascending. Always candidates.
    unindexed: Vec<usize>,
}

impl RuleGrid {
    pub fn build(rules: &RuleSet) -> RuleGrid {
        let mut grid = RuleGrid::default();

        for (idx, rule) in rules.iter().enumerate() {
            let Some((min_lat, max_lat, min_lon, max_lon)) = rule.ring_bbox else {
                grid.unindexed.push(idx);
                continue;
            };

            let lat_lo = cell_coord(min_lat);
            let lat_hi = cell_coord(max_lat);
            let lon_lo = cell_coord(min_lon);
            let lon_hi = cell_coord(max_lon);
            for cell_lat in lat_lo..=lat_hi {
                for cell_lon in lon_lo..=lon_hi {
                    grid.cells.entry((cell_lat, cell_lon)).or_default().push(idx);
                }
            }
        }
        grid
    }

    /// Candidate rule indices for a point, in rule-declaration order.
    pub fn candidates(&self, lat: f64, lon: f64) -> Vec<usize> {
        let cell = (cell_coord(lat), cell_coord(lon));
        let ringed = self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[]);

        // Merge two ascending index lists.
        let mut out = Vec::with_capacity(self.unindexed.len() + ringed.len());
        let (mut i, mut j) = (0, 0);
        while i < self.unindexed.len() || j < ringed.len() {
            match (self.unindexed.get(i), ringed.get(j)) {
                (Some(&a), Some(&b)) if a < b => {
                    out.push(a);
                    i += 1;
                }
                (Some(_), Some(&b)) => {
                    out.push(b);
                    j += 1;
                }
                (Some(&a), None) => {
                    out.push(a);
                    i += 1;
                }
                (None, Some(&b)) => {
                    out.push(b);
                    j += 1;
                }
                (None, None) => unreachable!(),
            }
        }
        out
    }
}

fn cell_coord(deg: f64) -> i32 {
    (deg / GRID_CELL_DEG).floor() as i32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
