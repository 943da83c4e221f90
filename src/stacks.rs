//! Volume stack inputs and per-role persistence.
//!
//! Stacks arrive either in memory or as a path to be read; [`StackSource`]
//! carries both shapes through one `resolve` call. On disk a volume is a
//! bincode-encoded `ndarray`, one file per role under the destination
//! directory. Secondary references are name-parameterized and may never
//! collide with the fixed role file names.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::descriptors::{
    ANNOTATION_FILENAME, HEMISPHERES_FILENAME, REFERENCE_FILENAME,
};

/// Error type for volume I/O.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Volume payload failed to encode or decode.
    #[error("volume codec error: {0}")]
    Codec(#[from] bincode::Error),
    /// Secondary reference name collides with a fixed role file.
    #[error("secondary reference name {0:?} is reserved")]
    ReservedSecondaryName(String),
}

/// A volume passed either in memory or as a location to load from.
#[derive(Debug, Clone)]
pub enum StackSource<T> {
    /// Already-loaded stack.
    Array(Array3<T>),
    /// Path to a serialized stack, read on resolve.
    File(PathBuf),
}

impl<T: DeserializeOwned> StackSource<T> {
    /// Produce the in-memory stack, reading from disk if needed.
    pub fn resolve(self) -> Result<Array3<T>, StackError> {
        match self {
            Self::Array(stack) => Ok(stack),
            Self::File(path) => read_volume(&path),
        }
    }
}

impl<T> From<Array3<T>> for StackSource<T> {
    fn from(stack: Array3<T>) -> Self {
        Self::Array(stack)
    }
}

impl<T> From<PathBuf> for StackSource<T> {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl<T> From<&Path> for StackSource<T> {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

/// Read a serialized volume from `path`.
pub fn read_volume<T: DeserializeOwned>(path: &Path) -> Result<Array3<T>, StackError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

/// Write a volume to `path`.
pub fn write_volume<T: Serialize>(stack: &Array3<T>, path: &Path) -> Result<(), StackError> {
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, stack)?;
    Ok(())
}

/// Save the reference volume under `dest_dir`.
pub fn save_reference(stack: &Array3<u16>, dest_dir: &Path) -> Result<(), StackError> {
    tracing::debug!(dest = %dest_dir.display(), "saving reference volume");
    write_volume(stack, &dest_dir.join(REFERENCE_FILENAME))
}

/// Save the annotation volume under `dest_dir`.
pub fn save_annotation(stack: &Array3<u32>, dest_dir: &Path) -> Result<(), StackError> {
    tracing::debug!(dest = %dest_dir.display(), "saving annotation volume");
    write_volume(stack, &dest_dir.join(ANNOTATION_FILENAME))
}

/// Save the hemisphere mask under `dest_dir`.
pub fn save_hemispheres(stack: &Array3<u8>, dest_dir: &Path) -> Result<(), StackError> {
    tracing::debug!(dest = %dest_dir.display(), "saving hemispheres volume");
    write_volume(stack, &dest_dir.join(HEMISPHERES_FILENAME))
}

/// File name for a named secondary reference.
pub fn secondary_reference_filename(name: &str) -> String {
    format!("{name}.vol")
}

/// Save a named secondary reference under `dest_dir`.
///
/// The name must not be empty or shadow a fixed role file.
pub fn save_secondary_reference(
    stack: &Array3<u16>,
    name: &str,
    dest_dir: &Path,
) -> Result<(), StackError> {
    let filename = secondary_reference_filename(name);
    if name.is_empty()
        || filename == REFERENCE_FILENAME
        || filename == ANNOTATION_FILENAME
        || filename == HEMISPHERES_FILENAME
    {
        return Err(StackError::ReservedSecondaryName(name.to_string()));
    }
    tracing::debug!(name, dest = %dest_dir.display(), "saving secondary reference");
    write_volume(stack, &dest_dir.join(filename))
}
