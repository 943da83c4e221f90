//! Canonical descriptors for the finalized atlas layout.
//!
//! Directory naming follows `"<name>_<resolution><unit>_v<major>.<minor>"`,
//! e.g. `example_mouse_25um_v1.2`. The unversioned base name
//! `"<name>_<resolution>"` identifies an atlas independent of version and is
//! what consumers resolve against a local root directory.

use crate::space::Orientation;

/// Canonical orientation all persisted atlas data share.
pub const ATLAS_ORIENTATION: Orientation = Orientation::ASR;

/// Default format version. Bump on breaking changes to the atlas layout;
/// pipelines may override it per run.
pub const ATLAS_FORMAT_VERSION: u32 = 1;

/// Physical resolution unit embedded in directory names.
pub const RESOLUTION_UNIT: &str = "um";

/// Reference volume file name.
pub const REFERENCE_FILENAME: &str = "reference.vol";
/// Annotation volume file name.
pub const ANNOTATION_FILENAME: &str = "annotation.vol";
/// Hemisphere-mask volume file name (absent for symmetric atlases).
pub const HEMISPHERES_FILENAME: &str = "hemispheres.vol";
/// Subdirectory holding one mesh per surviving region.
pub const MESHES_DIRNAME: &str = "meshes";
/// Serialized region hierarchy.
pub const STRUCTURES_FILENAME: &str = "structures.json";
/// Human-readable region table.
pub const STRUCTURES_CSV_FILENAME: &str = "structures.csv";
/// Canonical metadata record.
pub const METADATA_FILENAME: &str = "metadata.json";
/// Human-readable metadata summary.
pub const README_FILENAME: &str = "README.txt";

/// Format a resolution value without a trailing `.0` for whole numbers.
pub fn format_resolution(resolution: f64) -> String {
    if resolution.fract() == 0.0 {
        format!("{}", resolution as i64)
    } else {
        format!("{resolution}")
    }
}

/// Versioned directory name for a finalized atlas.
pub fn atlas_dir_name(name: &str, resolution: f64, version: u32, minor_version: u32) -> String {
    format!(
        "{name}_{}{RESOLUTION_UNIT}_v{version}.{minor_version}",
        format_resolution(resolution)
    )
}

/// Unversioned base name, used to resolve a freshly written atlas.
pub fn atlas_base_name(name: &str, resolution: f64) -> String {
    format!("{name}_{}", format_resolution(resolution))
}

/// Description parsed back out of a versioned directory name.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRepr {
    /// Atlas name, e.g. `example_mouse`.
    pub name: String,
    /// Leading resolution component, e.g. `25`.
    pub resolution: f64,
    /// Format (major) version.
    pub major_version: u32,
    /// Atlas (minor) version.
    pub minor_version: u32,
}

impl AtlasRepr {
    /// Parse a versioned directory name. Returns `None` for names that do
    /// not match the `"<name>_<res><unit>_v<major>.<minor>"` layout.
    pub fn from_dir_name(dir_name: &str) -> Option<Self> {
        let mut parts: Vec<&str> = dir_name.split('_').collect();
        if parts.len() < 3 {
            return None;
        }

        let version_part = parts.pop()?;
        let version_str = version_part.strip_prefix('v')?;
        let (major, minor) = version_str.split_once('.')?;
        let major_version: u32 = major.parse().ok()?;
        let minor_version: u32 = minor.parse().ok()?;

        let resolution_part = parts.pop()?;
        let resolution_str = resolution_part.strip_suffix(RESOLUTION_UNIT)?;
        let resolution: f64 = resolution_str.parse().ok()?;

        if parts.is_empty() {
            return None;
        }
        Some(Self {
            name: parts.join("_"),
            resolution,
            major_version,
            minor_version,
        })
    }

    /// The unversioned base name for this description.
    pub fn base_name(&self) -> String {
        atlas_base_name(&self.name, self.resolution)
    }
}
