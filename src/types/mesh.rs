//! Surface mesh container.

use serde::{Deserialize, Serialize};

/// A triangulated surface mesh for one region.
///
/// Points are in the source frame (voxel or physical units depending on the
/// producer); the finalization pipeline scales and reorients them. Topology is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    /// Vertex positions.
    pub points: Vec<[f64; 3]>,
    /// Triangle faces as indices into `points`.
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    /// Create a mesh from points and triangle indices.
    pub fn new(points: Vec<[f64; 3]>, triangles: Vec<[u32; 3]>) -> Self {
        Self { points, triangles }
    }

    /// Whether the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
