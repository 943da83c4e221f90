//! One-shot atlas finalization pipeline.
//!
//! [`AtlasWrapup`] collects heterogeneous source data (volumes in arbitrary
//! orientations, per-region meshes, a structure hierarchy) and produces one
//! canonical, validated, packaged atlas directory or archive.
//!
//! ## Stage order
//!
//! 1. Resolve stacks, check hierarchy consistency, filter structures against
//!    the annotation content
//! 2. Reorient and persist every stack through one shared [`AnatomicalSpace`]
//! 3. Scale (optionally) and reorient every surviving region mesh
//! 4. Assemble and persist metadata
//! 5. Re-open the written atlas and run validation
//! 6. Archive and clean up
//!
//! Stages run strictly in sequence; any failure aborts the run and leaves the
//! destination directory in a partial state the caller must discard.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use crate::atlas::{Atlas, AtlasError};
use crate::descriptors::{
    atlas_base_name, atlas_dir_name, ATLAS_FORMAT_VERSION, ATLAS_ORIENTATION, MESHES_DIRNAME,
    STRUCTURES_FILENAME,
};
use crate::filter::filter_structures_not_present;
use crate::hierarchy::{check_consistency, HierarchyError};
use crate::meshes::{self, MeshError, MeshSource};
use crate::metadata::{create_metadata_files, AtlasMetadata, InvalidMetadataError};
use crate::packaging::{
    compress_atlas_dir, create_dest_dir, remove_atlas_dir, PackagingError, WrapupOutput,
};
use crate::space::{AnatomicalSpace, Orientation, OrientationError};
use crate::stacks::{self, StackError, StackSource};
use crate::types::Region;
use crate::validation::{validate_atlas, CheckFault, ValidationReport};

/// Error type for a finalization run.
#[derive(Debug, thiserror::Error)]
pub enum WrapupError {
    /// A required input was never supplied to the builder.
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    /// Invalid orientation code.
    #[error(transparent)]
    Orientation(#[from] OrientationError),
    /// Malformed structure hierarchy.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    /// Malformed metadata inputs.
    #[error(transparent)]
    Metadata(#[from] InvalidMetadataError),
    /// Volume I/O failure.
    #[error(transparent)]
    Stack(#[from] StackError),
    /// Mesh I/O or processing failure.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// Packaging failure.
    #[error(transparent)]
    Packaging(#[from] PackagingError),
    /// The finalized atlas could not be re-opened for validation.
    #[error(transparent)]
    Atlas(#[from] AtlasError),
    /// A validation check hit a non-assertion fault.
    #[error(transparent)]
    ValidationFault(#[from] CheckFault),
    /// A stack does not share the annotation's spatial shape.
    #[error("{role} stack shape {actual:?} does not match {expected:?}")]
    ShapeMismatch {
        /// Which stack disagreed.
        role: &'static str,
        /// Shape of the reference stack.
        expected: (usize, usize, usize),
        /// Shape actually found.
        actual: (usize, usize, usize),
    },
    /// Structures list failed to serialize.
    #[error("failed to serialize structures list: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Filesystem failure outside the collaborator modules.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything one finalization run produced.
#[derive(Debug)]
pub struct WrapupReport {
    /// The packaged artifact.
    pub output: WrapupOutput,
    /// Per-check validation outcomes.
    pub validation: ValidationReport,
}

/// Builder for one atlas finalization run.
///
/// Required inputs: atlas name, species, resolution, source orientation,
/// root id, working directory, reference stack, annotation stack, and the
/// structure list. Everything else has a default.
pub struct AtlasWrapup {
    atlas_name: String,
    atlas_minor_version: u32,
    citation: String,
    atlas_link: String,
    species: String,
    resolution: [f64; 3],
    orientation: String,
    root_id: u32,
    reference_stack: Option<StackSource<u16>>,
    annotation_stack: Option<StackSource<u32>>,
    structures: Vec<Region>,
    meshes: BTreeMap<u32, MeshSource>,
    working_dir: PathBuf,
    atlas_packager: Option<String>,
    hemispheres_stack: Option<StackSource<u8>>,
    cleanup_files: bool,
    compress: bool,
    scale_meshes: bool,
    resolution_mapping: Option<[usize; 3]>,
    additional_references: BTreeMap<String, StackSource<u16>>,
    additional_metadata: BTreeMap<String, serde_json::Value>,
    format_version: u32,
}

impl AtlasWrapup {
    /// Start a run for `atlas_name` (form `author_species`), with the source
    /// resolution and orientation code, the hierarchy root id, and the
    /// working directory the atlas folder will be created in.
    pub fn new(
        atlas_name: impl Into<String>,
        resolution: [f64; 3],
        orientation: impl Into<String>,
        root_id: u32,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            atlas_name: atlas_name.into(),
            atlas_minor_version: 0,
            citation: "unpublished".to_string(),
            atlas_link: String::new(),
            species: String::new(),
            resolution,
            orientation: orientation.into(),
            root_id,
            reference_stack: None,
            annotation_stack: None,
            structures: Vec::new(),
            meshes: BTreeMap::new(),
            working_dir: working_dir.into(),
            atlas_packager: None,
            hemispheres_stack: None,
            cleanup_files: false,
            compress: true,
            scale_meshes: false,
            resolution_mapping: None,
            additional_references: BTreeMap::new(),
            additional_metadata: BTreeMap::new(),
            format_version: ATLAS_FORMAT_VERSION,
        }
    }

    /// Minor version of this particular atlas (default 0).
    pub fn minor_version(mut self, minor: u32) -> Self {
        self.atlas_minor_version = minor;
        self
    }

    /// Citation, or `"unpublished"` (the default).
    pub fn citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = citation.into();
        self
    }

    /// URL for the source atlas.
    pub fn atlas_link(mut self, link: impl Into<String>) -> Self {
        self.atlas_link = link.into();
        self
    }

    /// Species as `"CommonName (Genus species)"`. Required.
    pub fn species(mut self, species: impl Into<String>) -> Self {
        self.species = species.into();
        self
    }

    /// The reference stack. Required.
    pub fn reference_stack(mut self, stack: impl Into<StackSource<u16>>) -> Self {
        self.reference_stack = Some(stack.into());
        self
    }

    /// The annotation stack. Required.
    pub fn annotation_stack(mut self, stack: impl Into<StackSource<u32>>) -> Self {
        self.annotation_stack = Some(stack.into());
        self
    }

    /// The full structure hierarchy. Required.
    pub fn structures(mut self, structures: Vec<Region>) -> Self {
        self.structures = structures;
        self
    }

    /// Register the mesh for one region.
    pub fn mesh(mut self, region_id: u32, mesh: impl Into<MeshSource>) -> Self {
        self.meshes.insert(region_id, mesh.into());
        self
    }

    /// Register meshes for many regions at once.
    pub fn meshes(mut self, meshes: BTreeMap<u32, MeshSource>) -> Self {
        self.meshes.extend(meshes);
        self
    }

    /// Credit for whoever packaged the atlas.
    pub fn packager(mut self, packager: impl Into<String>) -> Self {
        self.atlas_packager = Some(packager.into());
        self
    }

    /// Hemisphere mask; leaving it unset marks the atlas symmetric.
    pub fn hemispheres_stack(mut self, stack: impl Into<StackSource<u8>>) -> Self {
        self.hemispheres_stack = Some(stack.into());
        self
    }

    /// Remove the uncompressed directory after successful archiving
    /// (default false). Ignored unless compression is enabled.
    pub fn cleanup_files(mut self, cleanup: bool) -> Self {
        self.cleanup_files = cleanup;
        self
    }

    /// Produce a `tar.gz` archive of the atlas directory (default true).
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Scale mesh points by the resolution so they end up in physical units
    /// (default false).
    pub fn scale_meshes(mut self, scale: bool) -> Self {
        self.scale_meshes = scale;
        self
    }

    /// Mapping from canonical-space axis index to source-space axis index;
    /// required for mesh scaling of anisotropic atlases.
    pub fn resolution_mapping(mut self, mapping: [usize; 3]) -> Self {
        self.resolution_mapping = Some(mapping);
        self
    }

    /// Register a named secondary reference stack.
    pub fn additional_reference(
        mut self,
        name: impl Into<String>,
        stack: impl Into<StackSource<u16>>,
    ) -> Self {
        self.additional_references.insert(name.into(), stack.into());
        self
    }

    /// Merge an extra key/value pair into `metadata.json`.
    pub fn additional_metadata(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.additional_metadata.insert(key.into(), value);
        self
    }

    /// Override the atlas format (major) version for this run.
    pub fn format_version(mut self, version: u32) -> Self {
        self.format_version = version;
        self
    }

    /// Execute the finalization run.
    pub fn run(self) -> Result<WrapupReport, WrapupError> {
        let source_orientation = Orientation::parse(&self.orientation)?;
        let target = ATLAS_ORIENTATION;

        let reference = self
            .reference_stack
            .ok_or(WrapupError::MissingInput("reference_stack"))?
            .resolve()?;
        let annotation = self
            .annotation_stack
            .ok_or(WrapupError::MissingInput("annotation_stack"))?
            .resolve()?;
        if self.structures.is_empty() {
            return Err(WrapupError::MissingInput("structures"));
        }
        if reference.dim() != annotation.dim() {
            return Err(WrapupError::ShapeMismatch {
                role: "annotation",
                expected: reference.dim(),
                actual: annotation.dim(),
            });
        }

        // If no hemisphere stack is given, the atlas is assumed symmetric.
        let symmetric = self.hemispheres_stack.is_none();

        check_consistency(&self.structures)?;
        let structures = filter_structures_not_present(&self.structures, &annotation)?;
        tracing::info!(
            kept = structures.len(),
            total = self.structures.len(),
            "filtered structure hierarchy against annotation"
        );

        // One space for the whole run, sized in physical units so mesh points
        // flip about the correct extents. With a resolution mapping, the
        // resolution tuple (canonical-axis order) is permuted back to source
        // axes first.
        let source_resolution = match self.resolution_mapping {
            Some(map) => [
                self.resolution[map[0]],
                self.resolution[map[1]],
                self.resolution[map[2]],
            ],
            None => self.resolution,
        };
        let (s0, s1, s2) = reference.dim();
        let physical_shape = [
            s0 as f64 * source_resolution[0],
            s1 as f64 * source_resolution[1],
            s2 as f64 * source_resolution[2],
        ];
        let space = AnatomicalSpace::new(source_orientation, physical_shape);

        let dir_name = atlas_dir_name(
            &self.atlas_name,
            self.resolution[0],
            self.format_version,
            self.atlas_minor_version,
        );
        let dest_dir = create_dest_dir(&self.working_dir, &dir_name)?;
        tracing::info!(dest = %dest_dir.display(), "finalizing atlas");

        // Reorient and persist stacks. All stacks share one shape, so the
        // final voxel shape is recorded once from the annotation.
        let annotation = space.map_stack_to(target, &annotation);
        let final_dim = annotation.dim();
        stacks::save_annotation(&annotation, &dest_dir)?;

        let reference = space.map_stack_to(target, &reference);
        stacks::save_reference(&reference, &dest_dir)?;

        if let Some(hemispheres) = self.hemispheres_stack {
            let hemispheres = hemispheres.resolve()?;
            if hemispheres.dim() != (s0, s1, s2) {
                return Err(WrapupError::ShapeMismatch {
                    role: "hemispheres",
                    expected: (s0, s1, s2),
                    actual: hemispheres.dim(),
                });
            }
            let hemispheres = space.map_stack_to(target, &hemispheres);
            stacks::save_hemispheres(&hemispheres, &dest_dir)?;
        }

        let mut additional_reference_names = Vec::new();
        for (name, stack) in self.additional_references {
            let stack = stack.resolve()?;
            let stack = space.map_stack_to(target, &stack);
            stacks::save_secondary_reference(&stack, &name, &dest_dir)?;
            additional_reference_names.push(name);
        }

        // Scale factors are resolved once; scaling happens before
        // reorientation, in source-space axis order.
        let scale = if self.scale_meshes {
            Some(meshes::scale_factors(
                self.resolution,
                self.resolution_mapping,
            )?)
        } else {
            None
        };

        let mesh_dest_dir = dest_dir.join(MESHES_DIRNAME);
        std::fs::create_dir(&mesh_dest_dir)?;
        let surviving: std::collections::HashSet<u32> =
            structures.iter().map(|r| r.id).collect();
        for (region_id, source) in self.meshes {
            if !surviving.contains(&region_id) {
                tracing::debug!(region_id, "skipping mesh for filtered-out region");
                continue;
            }
            let mesh = source.resolve()?;
            let mesh = meshes::process_mesh(&mesh, scale, &space, target);
            meshes::write_mesh(&mesh_dest_dir.join(format!("{region_id}.obj")), &mesh)?;
        }

        let structures_file =
            BufWriter::new(File::create(dest_dir.join(STRUCTURES_FILENAME))?);
        serde_json::to_writer(structures_file, &structures)?;

        let final_shape = [
            final_dim.0 as f64 * self.resolution[0],
            final_dim.1 as f64 * self.resolution[1],
            final_dim.2 as f64 * self.resolution[2],
        ];
        let metadata = AtlasMetadata::assemble(
            &self.atlas_name,
            &self.citation,
            &self.atlas_link,
            &self.species,
            symmetric,
            self.resolution,
            target,
            format!("{}.{}", self.format_version, self.atlas_minor_version),
            final_shape,
            additional_reference_names,
            self.atlas_packager,
        )?;
        create_metadata_files(
            &dest_dir,
            &metadata,
            &structures,
            self.root_id,
            &self.additional_metadata,
        )?;

        // Validation exercises exactly what a consumer would load: the
        // written directory, opened fresh.
        let base_name = atlas_base_name(&self.atlas_name, self.resolution[0]);
        let atlas = Atlas::load(&base_name, &self.working_dir, false)?;
        let validation = validate_atlas(&atlas)?;

        let output = if self.compress {
            let archive_path = compress_atlas_dir(&dest_dir)?;
            if self.cleanup_files {
                remove_atlas_dir(&dest_dir)?;
            }
            WrapupOutput::Archive(archive_path)
        } else {
            if self.cleanup_files {
                tracing::warn!(
                    "cleanup_files requested without compression, keeping the directory"
                );
            }
            WrapupOutput::Directory(dest_dir)
        };

        Ok(WrapupReport { output, validation })
    }
}
