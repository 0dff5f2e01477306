//! Chunk grid positions.
//!
//! A position identifies one chunk slot in the world grid. It is a plain
//! `IVec3` value: equality and hashing are by value, so it is used directly
//! as a map key throughout the pipeline.

use glam::IVec3;
use smallvec::SmallVec;

/// Integer chunk coordinate in the world grid.
pub type Position = IVec3;

/// Ordered list of positions a task needs before it may run.
///
/// Inline capacity covers single-chunk stages and face neighborhoods without
/// allocating; full 3x3x3 neighborhoods spill to the heap.
pub type Requirements = SmallVec<[Position; 8]>;

/// All positions in the cube of `radius` chunks around `center`, center
/// included.
///
/// Iteration order is X-slowest, Z-fastest, matching the sample layout used
/// elsewhere in the engine. `radius = 1` yields the 27 positions a light
/// merging stage reads.
pub fn neighborhood(center: Position, radius: i32) -> Requirements {
  let radius = radius.max(0);
  let mut positions = Requirements::new();
  for dx in -radius..=radius {
    for dy in -radius..=radius {
      for dz in -radius..=radius {
        positions.push(center + IVec3::new(dx, dy, dz));
      }
    }
  }
  positions
}

/// The six face-adjacent neighbors of `center` (-X, +X, -Y, +Y, -Z, +Z).
pub fn face_neighbors(center: Position) -> [Position; 6] {
  [
    center - IVec3::X,
    center + IVec3::X,
    center - IVec3::Y,
    center + IVec3::Y,
    center - IVec3::Z,
    center + IVec3::Z,
  ]
}

/// Squared distance between two chunk positions, in chunks.
///
/// Used by distance-based task priorities; squared to stay in integers.
#[inline]
pub fn distance_squared(a: Position, b: Position) -> i64 {
  let d = a.as_i64vec3() - b.as_i64vec3();
  d.x * d.x + d.y * d.y + d.z * d.z
}

#[cfg(test)]
#[path = "position_test.rs"]
mod position_test;
