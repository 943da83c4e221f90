//! Read-only handle over a finalized, on-disk atlas.
//!
//! Validation opens the written artifact through this type rather than
//! reusing the in-memory objects of the generation run, so checks exercise
//! exactly what a downstream consumer would load.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::descriptors::{
    AtlasRepr, ANNOTATION_FILENAME, HEMISPHERES_FILENAME, MESHES_DIRNAME, METADATA_FILENAME,
    REFERENCE_FILENAME, STRUCTURES_FILENAME,
};
use crate::metadata::AtlasMetadata;
use crate::stacks::{self, StackError};
use crate::types::Region;

/// Error type for opening a finalized atlas.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    /// No versioned directory for `name` under the root.
    #[error("no atlas named {name:?} found under {root}")]
    NotFound {
        /// Unversioned base name searched for.
        name: String,
        /// Directory searched.
        root: PathBuf,
    },
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Metadata or structures file failed to parse.
    #[error("malformed atlas file: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Volume payload failed to load.
    #[error(transparent)]
    Stack(#[from] StackError),
}

/// A finalized atlas opened from disk.
#[derive(Debug)]
pub struct Atlas {
    dir: PathBuf,
    metadata: AtlasMetadata,
    structures: Vec<Region>,
}

impl Atlas {
    /// Open the atlas with unversioned base name `name` (e.g.
    /// `example_mouse_25`) under `root_dir`, picking the highest version if
    /// several are present.
    ///
    /// `check_latest` is accepted for interface parity with remote-aware
    /// loaders; no version registry is consulted here.
    pub fn load(name: &str, root_dir: &Path, check_latest: bool) -> Result<Self, AtlasError> {
        if check_latest {
            tracing::debug!(name, "no version registry available, loading local copy");
        }

        let mut best: Option<(AtlasRepr, PathBuf)> = None;
        for entry in std::fs::read_dir(root_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name();
            let Some(repr) = dir_name.to_str().and_then(AtlasRepr::from_dir_name) else {
                continue;
            };
            if repr.base_name() != name {
                continue;
            }
            let newer = match &best {
                Some((current, _)) => {
                    (repr.major_version, repr.minor_version)
                        > (current.major_version, current.minor_version)
                }
                None => true,
            };
            if newer {
                best = Some((repr, entry.path()));
            }
        }

        let Some((_, dir)) = best else {
            return Err(AtlasError::NotFound {
                name: name.to_string(),
                root: root_dir.to_path_buf(),
            });
        };

        let metadata: AtlasMetadata =
            serde_json::from_reader(BufReader::new(File::open(dir.join(METADATA_FILENAME))?))?;
        let structures: Vec<Region> =
            serde_json::from_reader(BufReader::new(File::open(dir.join(STRUCTURES_FILENAME))?))?;

        Ok(Self {
            dir,
            metadata,
            structures,
        })
    }

    /// The atlas directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The canonical metadata record.
    pub fn metadata(&self) -> &AtlasMetadata {
        &self.metadata
    }

    /// The surviving region hierarchy.
    pub fn structures(&self) -> &[Region] {
        &self.structures
    }

    /// Load the reference volume.
    pub fn reference(&self) -> Result<Array3<u16>, StackError> {
        stacks::read_volume(&self.dir.join(REFERENCE_FILENAME))
    }

    /// Load the annotation volume.
    pub fn annotation(&self) -> Result<Array3<u32>, StackError> {
        stacks::read_volume(&self.dir.join(ANNOTATION_FILENAME))
    }

    /// Load the hemisphere mask; `None` for symmetric atlases.
    pub fn hemispheres(&self) -> Result<Option<Array3<u8>>, StackError> {
        let path = self.dir.join(HEMISPHERES_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(stacks::read_volume(&path)?))
    }

    /// Load a named secondary reference volume.
    pub fn additional_reference(&self, name: &str) -> Result<Array3<u16>, StackError> {
        stacks::read_volume(&self.dir.join(stacks::secondary_reference_filename(name)))
    }

    /// The meshes directory.
    pub fn meshes_dir(&self) -> PathBuf {
        self.dir.join(MESHES_DIRNAME)
    }

    /// Path of the mesh file for one region.
    pub fn mesh_path(&self, region_id: u32) -> PathBuf {
        self.meshes_dir().join(format!("{region_id}.obj"))
    }
}
