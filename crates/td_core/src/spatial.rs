//! Uniform bucket grid over creep positions.
//!
//! Rebuilt once per tick after movement; towers and blasts query it for
//! candidates instead of scanning every creep. Results are creep indices
//! into the state's creep list, always in ascending order.

use crate::components::Creep;
use crate::math::Vec2;

/// Bucket edge length in pixels.
pub const BUCKET_SIZE: f64 = 40.0;

/// Spatial index of creep indices.
#[derive(Debug, Clone, Default)]
pub struct CreepIndex {
    cols: i32,
    rows: i32,
    buckets: Vec<Vec<usize>>,
}

impl CreepIndex {
    /// Create an empty index covering a board of the given pixel size.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        let cols = ((width / BUCKET_SIZE).ceil() as i32).max(1);
        let rows = ((height / BUCKET_SIZE).ceil() as i32).max(1);
        Self {
            cols,
            rows,
            buckets: vec![Vec::new(); (cols * rows) as usize],
        }
    }

    /// Bucket coordinates of a point, clamped onto the board.
    fn bucket_of(&self, pos: Vec2) -> (i32, i32) {
        let bx = ((pos.x / BUCKET_SIZE).floor() as i32).clamp(0, self.cols - 1);
        let by = ((pos.y / BUCKET_SIZE).floor() as i32).clamp(0, self.rows - 1);
        (bx, by)
    }

    /// Re-insert every targetable creep.
    pub fn rebuild(&mut self, creeps: &[Creep]) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for (i, creep) in creeps.iter().enumerate() {
            if !creep.is_targetable() {
                continue;
            }
            let (bx, by) = self.bucket_of(creep.pos);
            self.buckets[(by * self.cols + bx) as usize].push(i);
        }
    }

    /// Indices of targetable creeps within `radius` of `center`, ascending.
    ///
    /// Positions are read from `creeps` at query time, so the list must be
    /// the one the index was built from.
    #[must_use]
    pub fn query(&self, creeps: &[Creep], center: Vec2, radius: f64) -> Vec<usize> {
        let mut out = Vec::new();
        if self.buckets.is_empty() || radius < 0.0 {
            return out;
        }
        let (x0, y0) = self.bucket_of(Vec2::new(center.x - radius, center.y - radius));
        let (x1, y1) = self.bucket_of(Vec2::new(center.x + radius, center.y + radius));
        let r2 = radius * radius;
        for by in y0..=y1 {
            for bx in x0..=x1 {
                for &i in &self.buckets[(by * self.cols + bx) as usize] {
                    let Some(creep) = creeps.get(i) else {
                        continue;
                    };
                    if creep.is_targetable() && creep.pos.distance_squared(center) <= r2 {
                        out.push(i);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}
