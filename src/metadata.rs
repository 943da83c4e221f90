//! Canonical metadata assembly and human-readable metadata files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::descriptors::{METADATA_FILENAME, README_FILENAME, STRUCTURES_CSV_FILENAME};
use crate::space::Orientation;
use crate::types::Region;

/// Error type for malformed metadata inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidMetadataError {
    /// A resolution component is zero or negative.
    #[error("resolution must be positive on every axis, got {0:?}")]
    NonPositiveResolution([f64; 3]),
    /// Atlas name is empty.
    #[error("atlas name must not be empty")]
    EmptyName,
    /// Atlas name contains whitespace.
    #[error("atlas name {0:?} must not contain whitespace")]
    InvalidName(String),
    /// Species is empty.
    #[error("species must not be empty")]
    EmptySpecies,
}

/// The canonical metadata record, immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasMetadata {
    /// Atlas name in the form `author_species`.
    pub name: String,
    /// Citation, or `"unpublished"`.
    pub citation: String,
    /// URL for the source atlas.
    pub atlas_link: String,
    /// Species as `"CommonName (Genus species)"`.
    pub species: String,
    /// Whether the atlas lacks a hemisphere mask and is treated as
    /// mirror-symmetric.
    pub symmetric: bool,
    /// Physical units per voxel.
    pub resolution: [f64; 3],
    /// Canonical orientation code of all persisted data.
    pub orientation: String,
    /// `"<major>.<minor>"` version string.
    pub version: String,
    /// Physical extent of the canonical volume.
    pub shape: [f64; 3],
    /// Names of the secondary reference volumes shipped with the atlas.
    pub additional_references: Vec<String>,
    /// Credit for whoever packaged the atlas.
    pub atlas_packager: Option<String>,
    /// UTC date this record was generated.
    pub generation_date: String,
}

impl AtlasMetadata {
    /// Assemble and validate the metadata record. Pure except for reading
    /// the clock for `generation_date`.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        name: &str,
        citation: &str,
        atlas_link: &str,
        species: &str,
        symmetric: bool,
        resolution: [f64; 3],
        orientation: Orientation,
        version: String,
        shape: [f64; 3],
        additional_references: Vec<String>,
        atlas_packager: Option<String>,
    ) -> Result<Self, InvalidMetadataError> {
        if resolution.iter().any(|&r| r <= 0.0) {
            return Err(InvalidMetadataError::NonPositiveResolution(resolution));
        }
        if name.is_empty() {
            return Err(InvalidMetadataError::EmptyName);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(InvalidMetadataError::InvalidName(name.to_string()));
        }
        if species.is_empty() {
            return Err(InvalidMetadataError::EmptySpecies);
        }

        Ok(Self {
            name: name.to_string(),
            citation: citation.to_string(),
            atlas_link: atlas_link.to_string(),
            species: species.to_string(),
            symmetric,
            resolution,
            orientation: orientation.code(),
            version,
            shape,
            additional_references,
            atlas_packager,
            generation_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        })
    }
}

/// Write `metadata.json`, `README.txt`, and `structures.csv` under
/// `dest_dir`. Extra key/value pairs are merged into the JSON record.
pub fn create_metadata_files(
    dest_dir: &Path,
    metadata: &AtlasMetadata,
    structures: &[Region],
    root_id: u32,
    additional_metadata: &BTreeMap<String, serde_json::Value>,
) -> Result<(), std::io::Error> {
    write_metadata_json(dest_dir, metadata, additional_metadata)?;
    write_readme(dest_dir, metadata, structures, root_id)?;
    write_structures_csv(dest_dir, structures)?;
    Ok(())
}

fn write_metadata_json(
    dest_dir: &Path,
    metadata: &AtlasMetadata,
    additional_metadata: &BTreeMap<String, serde_json::Value>,
) -> Result<(), std::io::Error> {
    let mut record = serde_json::to_value(metadata).map_err(std::io::Error::other)?;
    if let Some(map) = record.as_object_mut() {
        for (key, value) in additional_metadata {
            map.insert(key.clone(), value.clone());
        }
    }
    let writer = BufWriter::new(File::create(dest_dir.join(METADATA_FILENAME))?);
    serde_json::to_writer_pretty(writer, &record).map_err(std::io::Error::other)?;
    Ok(())
}

fn write_readme(
    dest_dir: &Path,
    metadata: &AtlasMetadata,
    structures: &[Region],
    root_id: u32,
) -> Result<(), std::io::Error> {
    let mut writer = BufWriter::new(File::create(dest_dir.join(README_FILENAME))?);
    writeln!(writer, "{} (v{})", metadata.name, metadata.version)?;
    writeln!(writer)?;
    writeln!(writer, "species:     {}", metadata.species)?;
    writeln!(writer, "citation:    {}", metadata.citation)?;
    writeln!(writer, "link:        {}", metadata.atlas_link)?;
    writeln!(writer, "orientation: {}", metadata.orientation)?;
    writeln!(writer, "symmetric:   {}", metadata.symmetric)?;
    writeln!(writer, "resolution:  {:?}", metadata.resolution)?;
    writeln!(writer, "shape:       {:?}", metadata.shape)?;
    writeln!(writer, "generated:   {}", metadata.generation_date)?;
    if let Some(packager) = &metadata.atlas_packager {
        writeln!(writer, "packager:    {packager}")?;
    }
    if !metadata.additional_references.is_empty() {
        writeln!(
            writer,
            "additional references: {}",
            metadata.additional_references.join(", ")
        )?;
    }
    writeln!(writer)?;
    writeln!(
        writer,
        "structures:  {} regions under root {}",
        structures.len(),
        root_id
    )?;
    writer.flush()
}

fn write_structures_csv(dest_dir: &Path, structures: &[Region]) -> Result<(), std::io::Error> {
    let mut writer = BufWriter::new(File::create(dest_dir.join(STRUCTURES_CSV_FILENAME))?);
    writeln!(writer, "id,acronym,name,parent_id")?;
    for region in structures {
        let parent = region
            .parent_id()
            .map(|p| p.to_string())
            .unwrap_or_default();
        writeln!(
            writer,
            "{},{},\"{}\",{}",
            region.id, region.acronym, region.name, parent
        )?;
    }
    writer.flush()
}
