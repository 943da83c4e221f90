//! # atlas-forge
//!
//! Deterministic finalization of brain-atlas source data.
//!
//! The pipeline answers one question:
//!
//! > Given volumes in arbitrary orientations, per-region meshes, and a
//! > structure hierarchy, what is the one canonical, validated, packaged
//! > atlas they describe?
//!
//! ## Core Contract
//!
//! 1. Prune the structure hierarchy to regions actually present in the
//!    annotation volume (directly or through a descendant)
//! 2. Reorient every stack and mesh into one canonical frame, losslessly
//! 3. Validate the written artifact by re-opening it as a consumer would
//! 4. Package it under a deterministic, versioned directory name
//!
//! ## Architecture
//!
//! ```text
//! sources → StructureFilter → AnatomicalSpace → stacks/ meshes/ metadata
//!                                 ↓
//!                         Atlas (re-opened) → validation → tar.gz
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Reorientation is pure axis permutation and flips; voxel values survive
//!   byte-identically and the transform is invertible
//! - Filtering preserves input order and never removes a region silently
//! - The destination directory name is a pure function of
//!   `(name, resolution, version, minor_version)`; collisions are errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atlas;
pub mod descriptors;
pub mod filter;
pub mod hierarchy;
pub mod meshes;
pub mod metadata;
pub mod packaging;
pub mod pipeline;
pub mod space;
pub mod stacks;
pub mod types;
pub mod validation;

// Re-exports
pub use atlas::{Atlas, AtlasError};
pub use descriptors::{
    atlas_base_name, atlas_dir_name, AtlasRepr, ATLAS_FORMAT_VERSION, ATLAS_ORIENTATION,
};
pub use filter::filter_structures_not_present;
pub use hierarchy::{check_consistency, HierarchyError, StructureTree};
pub use meshes::{read_mesh, write_mesh, MeshError, MeshSource};
pub use metadata::{AtlasMetadata, InvalidMetadataError};
pub use packaging::{PackagingError, WrapupOutput};
pub use pipeline::{AtlasWrapup, WrapupError, WrapupReport};
pub use space::{AnatomicalSpace, AxisDirection, Orientation, OrientationError};
pub use stacks::{read_volume, StackError, StackSource};
pub use types::{Mesh, Region};
pub use validation::{validate_atlas, CheckFault, CheckOutcome, ValidationReport};
