//! Destination layout, archiving, and cleanup.
//!
//! The destination directory name is a pure function of the atlas name,
//! leading resolution, and version, so re-runs collide loudly instead of
//! silently merging into stale partial output. The existence check is
//! check-then-act: concurrent runs against the same working directory are
//! not supported.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

/// Error type for packaging operations.
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    /// The computed destination directory already exists.
    #[error("destination directory already exists: {0}")]
    DestinationExists(PathBuf),
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Unambiguous reference to what one finalization run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapupOutput {
    /// The uncompressed atlas directory.
    Directory(PathBuf),
    /// The compressed archive.
    Archive(PathBuf),
}

impl WrapupOutput {
    /// The produced path, whichever variant it is.
    pub fn path(&self) -> &Path {
        match self {
            Self::Directory(path) | Self::Archive(path) => path,
        }
    }
}

/// Create the destination directory `working_dir/dir_name`.
///
/// Fails with [`PackagingError::DestinationExists`] if it is already there;
/// an old partial run must never masquerade as a fresh one.
pub fn create_dest_dir(working_dir: &Path, dir_name: &str) -> Result<PathBuf, PackagingError> {
    let dest_dir = working_dir.join(dir_name);
    if dest_dir.exists() {
        return Err(PackagingError::DestinationExists(dest_dir));
    }
    std::fs::create_dir_all(working_dir)?;
    std::fs::create_dir(&dest_dir)?;
    Ok(dest_dir)
}

/// Compress `dest_dir` into a sibling `<dir-name>.tar.gz` whose sole root
/// entry is the directory's own name, so extraction reproduces the layout
/// exactly. Returns the archive path.
pub fn compress_atlas_dir(dest_dir: &Path) -> Result<PathBuf, PackagingError> {
    let dir_name = dest_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PackagingError::Io(std::io::Error::other(format!(
                "destination {} has no valid directory name",
                dest_dir.display()
            )))
        })?;
    let parent = dest_dir.parent().unwrap_or_else(|| Path::new("."));
    let archive_path = parent.join(format!("{dir_name}.tar.gz"));

    tracing::info!(archive = %archive_path.display(), "saving compressed atlas data");
    let encoder = GzEncoder::new(File::create(&archive_path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(dir_name, dest_dir)?;
    builder.into_inner()?.finish()?;
    Ok(archive_path)
}

/// Remove the uncompressed working copy.
pub fn remove_atlas_dir(dest_dir: &Path) -> Result<(), PackagingError> {
    tracing::info!(dir = %dest_dir.display(), "cleaning up atlas data");
    std::fs::remove_dir_all(dest_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    #[test]
    fn test_create_dest_dir() {
        let work = tempdir().unwrap();
        let dest = create_dest_dir(work.path(), "atlas_10um_v1.0").unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn test_existing_destination_refused() {
        let work = tempdir().unwrap();
        create_dest_dir(work.path(), "atlas_10um_v1.0").unwrap();

        let err = create_dest_dir(work.path(), "atlas_10um_v1.0").unwrap_err();
        assert!(matches!(err, PackagingError::DestinationExists(_)));
    }

    #[test]
    fn test_archive_root_entry_is_dir_name() {
        let work = tempdir().unwrap();
        let dest = create_dest_dir(work.path(), "atlas_10um_v1.0").unwrap();
        std::fs::write(dest.join("metadata.json"), "{}").unwrap();
        std::fs::create_dir(dest.join("meshes")).unwrap();
        std::fs::write(dest.join("meshes").join("1.obj"), "v 0 0 0\n").unwrap();

        let archive_path = compress_atlas_dir(&dest).unwrap();
        assert!(archive_path.ends_with("atlas_10um_v1.0.tar.gz"));

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&archive_path).unwrap()));
        let entries: BTreeSet<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(entries
            .iter()
            .any(|e| e.trim_end_matches('/') == "atlas_10um_v1.0"));
        assert!(entries.contains("atlas_10um_v1.0/metadata.json"));
        assert!(entries.contains("atlas_10um_v1.0/meshes/1.obj"));
        assert!(entries.iter().all(|e| e.starts_with("atlas_10um_v1.0")));
    }

    #[test]
    fn test_remove_atlas_dir() {
        let work = tempdir().unwrap();
        let dest = create_dest_dir(work.path(), "atlas_10um_v1.0").unwrap();
        std::fs::write(dest.join("metadata.json"), "{}").unwrap();

        remove_atlas_dir(&dest).unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn test_output_path_accessor() {
        let dir = WrapupOutput::Directory(PathBuf::from("/tmp/a"));
        let tar = WrapupOutput::Archive(PathBuf::from("/tmp/a.tar.gz"));
        assert_eq!(dir.path(), Path::new("/tmp/a"));
        assert_eq!(tar.path(), Path::new("/tmp/a.tar.gz"));
    }
}
