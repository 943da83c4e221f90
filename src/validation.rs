//! Post-hoc validation of a finalized atlas.
//!
//! Every registered check runs against a freshly opened [`Atlas`]. A check
//! that finds a consistency violation fails with an assertion, which becomes
//! a `Fail` row in the report; any other failure (I/O, corrupt payloads) is a
//! fault and aborts the run. Failures are data, faults are control flow.

use std::collections::{BTreeMap, HashSet};

use crate::atlas::Atlas;
use crate::stacks::StackError;

/// Outcome of a single validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check completed without violations.
    Pass,
    /// The check found a consistency violation.
    Fail(String),
}

/// Error type produced by a validation check.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// A consistency violation; recorded in the report, never propagated.
    #[error("assertion failed: {0}")]
    Assertion(String),
    /// Anything else; propagated, aborting the run.
    #[error(transparent)]
    Fault(#[from] CheckFault),
}

/// Unexpected failure inside a validation check.
#[derive(Debug, thiserror::Error)]
pub enum CheckFault {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Volume payload failed to load.
    #[error(transparent)]
    Stack(#[from] StackError),
}

impl From<std::io::Error> for CheckError {
    fn from(e: std::io::Error) -> Self {
        Self::Fault(CheckFault::Io(e))
    }
}

impl From<StackError> for CheckError {
    fn from(e: StackError) -> Self {
        Self::Fault(CheckFault::Stack(e))
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), CheckError> {
    if condition {
        Ok(())
    } else {
        Err(CheckError::Assertion(message()))
    }
}

/// Aggregated validation outcomes, keyed by check name in stable order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    outcomes: BTreeMap<String, CheckOutcome>,
}

impl ValidationReport {
    /// Record one check outcome.
    pub fn record(&mut self, check: &str, outcome: CheckOutcome) {
        self.outcomes.insert(check.to_string(), outcome);
    }

    /// Whether every check passed.
    pub fn all_passed(&self) -> bool {
        self.outcomes
            .values()
            .all(|outcome| *outcome == CheckOutcome::Pass)
    }

    /// Failing checks with their messages.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                CheckOutcome::Pass => None,
                CheckOutcome::Fail(message) => Some((name.as_str(), message.as_str())),
            })
            .collect()
    }

    /// All outcomes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CheckOutcome)> {
        self.outcomes
            .iter()
            .map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// Log a single pass/fail summary plus one line per failing check.
    pub fn log_summary(&self) {
        if self.all_passed() {
            tracing::info!("this atlas is valid");
        } else {
            tracing::warn!("these validation checks have failed:");
            for (name, message) in self.failures() {
                tracing::warn!("- {name}: {message}");
            }
        }
    }
}

/// Signature of a registered validation check.
pub type ValidationFn = fn(&Atlas) -> Result<(), CheckError>;

/// The registered validation checks, in execution order.
pub fn validation_functions() -> Vec<(&'static str, ValidationFn)> {
    vec![
        ("validate_atlas_files", validate_atlas_files),
        ("validate_metadata_shape", validate_metadata_shape),
        ("catch_missing_structures", catch_missing_structures),
        ("catch_missing_mesh_files", catch_missing_mesh_files),
        (
            "validate_reference_image_pixels",
            validate_reference_image_pixels,
        ),
        (
            "validate_additional_references",
            validate_additional_references,
        ),
    ]
}

/// Run every registered check against `atlas` and aggregate the outcomes.
///
/// Assertion failures become report rows; faults propagate immediately.
pub fn validate_atlas(atlas: &Atlas) -> Result<ValidationReport, CheckFault> {
    tracing::info!(dir = %atlas.dir().display(), "running atlas validation");

    let mut report = ValidationReport::default();
    for (name, check) in validation_functions() {
        match check(atlas) {
            Ok(()) => report.record(name, CheckOutcome::Pass),
            Err(CheckError::Assertion(message)) => {
                report.record(name, CheckOutcome::Fail(message));
            }
            Err(CheckError::Fault(fault)) => return Err(fault),
        }
    }
    report.log_summary();
    Ok(report)
}

fn validate_atlas_files(atlas: &Atlas) -> Result<(), CheckError> {
    use crate::descriptors::{
        ANNOTATION_FILENAME, HEMISPHERES_FILENAME, METADATA_FILENAME, REFERENCE_FILENAME,
        STRUCTURES_FILENAME,
    };

    for filename in [
        REFERENCE_FILENAME,
        ANNOTATION_FILENAME,
        METADATA_FILENAME,
        STRUCTURES_FILENAME,
    ] {
        ensure(atlas.dir().join(filename).is_file(), || {
            format!("missing required file {filename}")
        })?;
    }
    ensure(atlas.meshes_dir().is_dir(), || {
        "missing meshes directory".to_string()
    })?;

    let hemispheres_present = atlas.dir().join(HEMISPHERES_FILENAME).is_file();
    ensure(
        hemispheres_present != atlas.metadata().symmetric,
        || {
            if atlas.metadata().symmetric {
                "symmetric atlas ships a hemispheres volume".to_string()
            } else {
                "asymmetric atlas lacks a hemispheres volume".to_string()
            }
        },
    )
}

fn validate_metadata_shape(atlas: &Atlas) -> Result<(), CheckError> {
    let annotation = atlas.annotation()?;
    let (d0, d1, d2) = annotation.dim();
    let resolution = atlas.metadata().resolution;
    let expected = [
        d0 as f64 * resolution[0],
        d1 as f64 * resolution[1],
        d2 as f64 * resolution[2],
    ];
    let recorded = atlas.metadata().shape;
    let matches = expected
        .iter()
        .zip(recorded.iter())
        .all(|(e, r)| (e - r).abs() < 1e-6);
    ensure(matches, || {
        format!("metadata shape {recorded:?} does not match annotation extent {expected:?}")
    })
}

fn catch_missing_structures(atlas: &Atlas) -> Result<(), CheckError> {
    let annotation = atlas.annotation()?;
    let known: HashSet<u32> = atlas.structures().iter().map(|r| r.id).collect();
    let mut missing: Vec<u32> = annotation
        .iter()
        .copied()
        .filter(|&v| v != 0 && !known.contains(&v))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    missing.sort_unstable();
    ensure(missing.is_empty(), || {
        format!("annotation ids missing from structures list: {missing:?}")
    })
}

fn catch_missing_mesh_files(atlas: &Atlas) -> Result<(), CheckError> {
    let mut missing: Vec<u32> = atlas
        .structures()
        .iter()
        .map(|r| r.id)
        .filter(|&id| !atlas.mesh_path(id).is_file())
        .collect();
    missing.sort_unstable();
    ensure(missing.is_empty(), || {
        format!("structures without mesh files: {missing:?}")
    })
}

fn validate_reference_image_pixels(atlas: &Atlas) -> Result<(), CheckError> {
    let reference = atlas.reference()?;
    ensure(reference.iter().any(|&v| v != 0), || {
        "reference volume is entirely zero".to_string()
    })
}

fn validate_additional_references(atlas: &Atlas) -> Result<(), CheckError> {
    let mut missing: Vec<&str> = atlas
        .metadata()
        .additional_references
        .iter()
        .map(String::as_str)
        .filter(|name| {
            !atlas
                .dir()
                .join(crate::stacks::secondary_reference_filename(name))
                .is_file()
        })
        .collect();
    missing.sort_unstable();
    ensure(missing.is_empty(), || {
        format!("additional references listed in metadata but not on disk: {missing:?}")
    })
}
