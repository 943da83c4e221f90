//! Integration tests for the atlas finalization pipeline.
//!
//! These exercise the end-to-end wrapup:
//! 1. Structure filtering against annotation content
//! 2. Canonical reorientation of stacks and meshes
//! 3. Metadata assembly
//! 4. Post-hoc validation of the written artifact
//! 5. Packaging (archive, cleanup, collision refusal)

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::Array3;

use atlas_forge::{
    AtlasWrapup, CheckOutcome, Mesh, Region, WrapupError, WrapupOutput,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Surface pipeline logs in test output (`RUST_LOG=info cargo test -- --nocapture`).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn region(id: u32, path: Vec<u32>) -> Region {
    Region::new(id, format!("r{id}"), format!("region {id}"), path)
}

/// Hierarchy root=1 -> {2, 3}; the annotation only labels 1 and 2.
fn test_structures() -> Vec<Region> {
    vec![
        region(1, vec![1]),
        region(2, vec![1, 2]),
        region(3, vec![1, 3]),
    ]
}

/// 10x10x10 annotation containing only values {0, 1, 2}.
fn test_annotation() -> Array3<u32> {
    let mut stack = Array3::zeros((10, 10, 10));
    for i in 0..10 {
        stack[[i, 0, 0]] = 1;
        stack[[i, 1, 0]] = 2;
    }
    stack
}

fn test_reference() -> Array3<u16> {
    Array3::from_elem((10, 10, 10), 128)
}

fn test_mesh() -> Mesh {
    Mesh::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![[0, 1, 2]],
    )
}

fn base_wrapup(working_dir: &Path) -> AtlasWrapup {
    AtlasWrapup::new(
        "example_mouse",
        [25.0, 25.0, 25.0],
        "asr",
        1,
        working_dir,
    )
    .species("Mouse (Mus musculus)")
    .citation("unpublished")
    .atlas_link("https://example.org/atlas")
    .packager("Test Packager")
    .reference_stack(test_reference())
    .annotation_stack(test_annotation())
    .structures(test_structures())
    .mesh(1, test_mesh())
    .mesh(2, test_mesh())
    .mesh(3, test_mesh())
}

fn dir_entries(dir: &Path) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for entry in walk(dir) {
        let rel = entry.strip_prefix(dir).unwrap();
        out.insert(rel.to_string_lossy().into_owned());
    }
    out
}

fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(walk(&path));
        } else {
            files.push(path);
        }
    }
    files
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-end: filtering, metadata, structures file
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_wrapup_filters_structures_and_records_metadata() {
    init_tracing();
    let work = tempfile::tempdir().unwrap();
    let report = base_wrapup(work.path()).compress(false).run().unwrap();

    assert!(report.validation.all_passed());
    let WrapupOutput::Directory(dest) = &report.output else {
        panic!("uncompressed run must return the directory");
    };
    assert_eq!(
        dest.file_name().unwrap().to_str().unwrap(),
        "example_mouse_25um_v1.0"
    );

    // Region 3 is absent from the annotation and must be filtered out.
    let structures: Vec<Region> =
        serde_json::from_reader(File::open(dest.join("structures.json")).unwrap()).unwrap();
    let ids: Vec<u32> = structures.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);

    // Shape is the physical extent of the canonical volume.
    let metadata: serde_json::Value =
        serde_json::from_reader(File::open(dest.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["shape"], serde_json::json!([250.0, 250.0, 250.0]));
    assert_eq!(metadata["symmetric"], serde_json::json!(true));
    assert_eq!(metadata["orientation"], "asr");
    assert_eq!(metadata["version"], "1.0");

    // Only surviving regions get meshes.
    assert!(dest.join("meshes").join("1.obj").is_file());
    assert!(dest.join("meshes").join("2.obj").is_file());
    assert!(!dest.join("meshes").join("3.obj").exists());
}

#[test]
fn test_symmetric_run_never_writes_hemispheres() {
    let work = tempfile::tempdir().unwrap();
    let report = base_wrapup(work.path()).compress(false).run().unwrap();

    let dest = report.output.path();
    assert!(!dest.join("hemispheres.vol").exists());

    let metadata: serde_json::Value =
        serde_json::from_reader(File::open(dest.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["symmetric"], serde_json::json!(true));
}

#[test]
fn test_asymmetric_run_writes_hemispheres() {
    let work = tempfile::tempdir().unwrap();
    let hemispheres: Array3<u8> = Array3::from_elem((10, 10, 10), 1);
    let report = base_wrapup(work.path())
        .hemispheres_stack(hemispheres)
        .compress(false)
        .run()
        .unwrap();

    let dest = report.output.path();
    assert!(dest.join("hemispheres.vol").is_file());

    let metadata: serde_json::Value =
        serde_json::from_reader(File::open(dest.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["symmetric"], serde_json::json!(false));
    assert!(report.validation.all_passed());
}

#[test]
fn test_reoriented_stacks_round_canonical() {
    // Source data in "psr": flipped on the first axis relative to "asr".
    let work = tempfile::tempdir().unwrap();
    let mut annotation: Array3<u32> = Array3::zeros((10, 10, 10));
    annotation[[0, 0, 0]] = 1;
    annotation[[0, 1, 0]] = 2;

    let report = AtlasWrapup::new("example_fish", [25.0, 25.0, 25.0], "psr", 1, work.path())
        .species("Fish (Danio rerio)")
        .reference_stack(test_reference())
        .annotation_stack(annotation)
        .structures(test_structures())
        .mesh(1, test_mesh())
        .mesh(2, test_mesh())
        .compress(false)
        .run()
        .unwrap();

    let atlas = atlas_forge::Atlas::load("example_fish_25", work.path(), false).unwrap();
    let canonical = atlas.annotation().unwrap();
    // The voxel at source index 0 lands at canonical index 9 on the flipped axis.
    assert_eq!(canonical[[9, 0, 0]], 1);
    assert_eq!(canonical[[9, 1, 0]], 2);
    assert!(report.validation.all_passed());
}

#[test]
fn test_additional_references_written_under_their_names() {
    let work = tempfile::tempdir().unwrap();
    let nissl: Array3<u16> = Array3::from_elem((10, 10, 10), 9);
    let report = base_wrapup(work.path())
        .additional_reference("nissl", nissl)
        .compress(false)
        .run()
        .unwrap();

    let dest = report.output.path();
    assert!(dest.join("nissl.vol").is_file());

    let metadata: serde_json::Value =
        serde_json::from_reader(File::open(dest.join("metadata.json")).unwrap()).unwrap();
    assert_eq!(
        metadata["additional_references"],
        serde_json::json!(["nissl"])
    );
    assert!(report.validation.all_passed());
}

// ─────────────────────────────────────────────────────────────────────────────
// Packaging: archive layout, cleanup, collision refusal
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_compressed_archive_reproduces_directory_layout() {
    let work = tempfile::tempdir().unwrap();
    let report = base_wrapup(work.path()).compress(true).run().unwrap();

    let WrapupOutput::Archive(archive_path) = &report.output else {
        panic!("compressed run must return the archive");
    };
    assert!(archive_path.is_file());

    let dest = work.path().join("example_mouse_25um_v1.0");
    assert!(dest.is_dir(), "directory kept without cleanup_files");

    // Extract next to the original and compare the file layout.
    let extract_root = tempfile::tempdir().unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive_path).unwrap()));
    archive.unpack(extract_root.path()).unwrap();

    let extracted = extract_root.path().join("example_mouse_25um_v1.0");
    assert_eq!(dir_entries(&extracted), dir_entries(&dest));
}

#[test]
fn test_cleanup_removes_directory_but_keeps_archive() {
    let work = tempfile::tempdir().unwrap();
    let report = base_wrapup(work.path())
        .compress(true)
        .cleanup_files(true)
        .run()
        .unwrap();

    let WrapupOutput::Archive(archive_path) = &report.output else {
        panic!("compressed run must return the archive");
    };
    assert!(archive_path.is_file());
    assert!(!work.path().join("example_mouse_25um_v1.0").exists());
}

#[test]
fn test_existing_destination_refused() {
    let work = tempfile::tempdir().unwrap();
    std::fs::create_dir(work.path().join("example_mouse_25um_v1.0")).unwrap();

    let err = base_wrapup(work.path()).run().unwrap_err();
    assert!(matches!(
        err,
        WrapupError::Packaging(atlas_forge::PackagingError::DestinationExists(_))
    ));
    // Nothing was written outside (or inside) the pre-existing directory.
    let leftovers: Vec<_> = std::fs::read_dir(work.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure modes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_orientation_aborts() {
    let work = tempfile::tempdir().unwrap();
    let err = AtlasWrapup::new("a_b", [25.0; 3], "abc", 1, work.path())
        .species("Mouse")
        .reference_stack(test_reference())
        .annotation_stack(test_annotation())
        .structures(test_structures())
        .run()
        .unwrap_err();
    assert!(matches!(err, WrapupError::Orientation(_)));
}

#[test]
fn test_dangling_parent_aborts_before_writing() {
    let work = tempfile::tempdir().unwrap();
    let broken = vec![region(1, vec![1]), region(2, vec![42, 2])];
    let err = base_wrapup(work.path()).structures(broken).run().unwrap_err();
    assert!(matches!(err, WrapupError::Hierarchy(_)));
    assert!(!work.path().join("example_mouse_25um_v1.0").exists());
}

#[test]
fn test_anisotropic_mesh_scaling_needs_mapping() {
    let work = tempfile::tempdir().unwrap();
    let err = AtlasWrapup::new("a_b", [25.0, 25.0, 50.0], "asr", 1, work.path())
        .species("Mouse")
        .reference_stack(test_reference())
        .annotation_stack(test_annotation())
        .structures(test_structures())
        .mesh(1, test_mesh())
        .mesh(2, test_mesh())
        .scale_meshes(true)
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        WrapupError::Mesh(atlas_forge::MeshError::MissingResolutionMapping(_))
    ));
}

#[test]
fn test_shape_mismatch_rejected() {
    let work = tempfile::tempdir().unwrap();
    let small: Array3<u32> = Array3::zeros((5, 5, 5));
    let err = base_wrapup(work.path())
        .annotation_stack(small)
        .run()
        .unwrap_err();
    assert!(matches!(err, WrapupError::ShapeMismatch { .. }));
}

#[test]
fn test_missing_inputs_reported() {
    let work = tempfile::tempdir().unwrap();
    let err = AtlasWrapup::new("a_b", [25.0; 3], "asr", 1, work.path())
        .species("Mouse")
        .run()
        .unwrap_err();
    assert!(matches!(err, WrapupError::MissingInput("reference_stack")));
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation through the re-opened artifact
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_validation_reports_missing_mesh_as_failure() {
    // Meshes only for region 1; region 2 survives without one. The run still
    // completes: check failures are data, not control flow.
    init_tracing();
    let work = tempfile::tempdir().unwrap();
    let report = AtlasWrapup::new("example_rat", [25.0; 3], "asr", 1, work.path())
        .species("Rat (Rattus norvegicus)")
        .reference_stack(test_reference())
        .annotation_stack(test_annotation())
        .structures(test_structures())
        .mesh(1, test_mesh())
        .compress(false)
        .run()
        .unwrap();

    assert!(!report.validation.all_passed());
    let failures = report.validation.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "catch_missing_mesh_files");
    assert!(failures[0].1.contains('2'));

    let outcomes: Vec<_> = report
        .validation
        .iter()
        .filter(|(name, _)| *name != "catch_missing_mesh_files")
        .map(|(_, outcome)| outcome.clone())
        .collect();
    assert!(outcomes.iter().all(|o| *o == CheckOutcome::Pass));
}
