//! Region descriptors for the structure hierarchy.

use serde::{Deserialize, Serialize};

/// One anatomical region in the structure hierarchy.
///
/// `structure_id_path` lists ancestor ids from the root down to the region
/// itself; the parent is the second-to-last entry. A root region carries a
/// single-element path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Region id; annotation voxel values refer to these.
    pub id: u32,
    /// Short name, e.g. "VISp".
    pub acronym: String,
    /// Full name, e.g. "Primary visual area".
    pub name: String,
    /// Ancestor ids from the root down to this region (inclusive).
    pub structure_id_path: Vec<u32>,
    /// Display color.
    #[serde(default = "default_rgb")]
    pub rgb_triplet: [u8; 3],
}

fn default_rgb() -> [u8; 3] {
    [255, 255, 255]
}

impl Region {
    /// Create a region with the default display color.
    pub fn new(
        id: u32,
        acronym: impl Into<String>,
        name: impl Into<String>,
        structure_id_path: Vec<u32>,
    ) -> Self {
        Self {
            id,
            acronym: acronym.into(),
            name: name.into(),
            structure_id_path,
            rgb_triplet: default_rgb(),
        }
    }

    /// Parent region id, `None` for a root.
    pub fn parent_id(&self) -> Option<u32> {
        let n = self.structure_id_path.len();
        if n >= 2 {
            Some(self.structure_id_path[n - 2])
        } else {
            None
        }
    }

    /// Whether this region is a hierarchy root.
    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }
}
