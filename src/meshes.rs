//! Mesh processing: optional scaling, mandatory reorientation, OBJ I/O.
//!
//! Scaling runs strictly before reorientation. Scale factors are defined in
//! source-space axis order; reorienting first would permute and flip the axes
//! out from under the scale vector and silently corrupt the geometry.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::space::{AnatomicalSpace, Orientation};
use crate::types::Mesh;

/// Error type for mesh I/O and processing.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// OBJ payload could not be parsed.
    #[error("malformed OBJ data at {path}:{line}: {message}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// Anisotropic resolution requires an explicit mapping to recover the
    /// source-axis scale vector.
    #[error("anisotropic resolution {0:?} requires a resolution mapping")]
    MissingResolutionMapping([f64; 3]),
}

/// A mesh passed either in memory or as a location to load from.
#[derive(Debug, Clone)]
pub enum MeshSource {
    /// Already-loaded mesh.
    Mesh(Mesh),
    /// Path to an OBJ file, read on resolve.
    File(PathBuf),
}

impl MeshSource {
    /// Produce the in-memory mesh, reading from disk if needed.
    pub fn resolve(self) -> Result<Mesh, MeshError> {
        match self {
            Self::Mesh(mesh) => Ok(mesh),
            Self::File(path) => read_mesh(&path),
        }
    }
}

impl From<Mesh> for MeshSource {
    fn from(mesh: Mesh) -> Self {
        Self::Mesh(mesh)
    }
}

impl From<PathBuf> for MeshSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Resolve the per-axis mesh scale factors for `resolution`.
///
/// Isotropic resolutions scale directly. Anisotropic resolutions are given in
/// target-space order and need `mapping` (target axis index -> source axis
/// index) to recover the source-axis vector; omitting it is a hard error
/// rather than a silently wrong isotropic fallback.
pub fn scale_factors(
    resolution: [f64; 3],
    mapping: Option<[usize; 3]>,
) -> Result<[f64; 3], MeshError> {
    match mapping {
        Some(map) => Ok([
            resolution[map[0]],
            resolution[map[1]],
            resolution[map[2]],
        ]),
        None => {
            let isotropic =
                resolution[0] == resolution[1] && resolution[1] == resolution[2];
            if isotropic {
                Ok(resolution)
            } else {
                Err(MeshError::MissingResolutionMapping(resolution))
            }
        }
    }
}

/// Scale (optionally) and reorient one region mesh into the canonical frame.
///
/// Topology is passed through unmodified.
pub fn process_mesh(
    mesh: &Mesh,
    scale: Option<[f64; 3]>,
    space: &AnatomicalSpace,
    target: Orientation,
) -> Mesh {
    let points: Vec<[f64; 3]> = match scale {
        Some(factors) => mesh
            .points
            .iter()
            .map(|p| [p[0] * factors[0], p[1] * factors[1], p[2] * factors[2]])
            .collect(),
        None => mesh.points.clone(),
    };
    Mesh {
        points: space.map_points_to(target, &points),
        triangles: mesh.triangles.clone(),
    }
}

/// Read a mesh from a Wavefront OBJ file.
///
/// Only `v` and `f` records are interpreted; faces must be triangles.
pub fn read_mesh(path: &Path) -> Result<Mesh, MeshError> {
    let parse_err = |line: usize, message: String| MeshError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let reader = BufReader::new(File::open(path)?);
    let mut points = Vec::new();
    let mut triangles = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let mut point = [0.0f64; 3];
                for coord in &mut point {
                    let field = fields
                        .next()
                        .ok_or_else(|| parse_err(lineno, "vertex needs 3 coordinates".into()))?;
                    *coord = field
                        .parse()
                        .map_err(|_| parse_err(lineno, format!("bad coordinate {field:?}")))?;
                }
                points.push(point);
            }
            Some("f") => {
                let mut tri = [0u32; 3];
                for corner in &mut tri {
                    let field = fields
                        .next()
                        .ok_or_else(|| parse_err(lineno, "face needs 3 vertices".into()))?;
                    // Face corners may carry /texture/normal references.
                    let vertex = field.split('/').next().unwrap_or(field);
                    let one_based: u32 = vertex
                        .parse()
                        .map_err(|_| parse_err(lineno, format!("bad vertex index {field:?}")))?;
                    if one_based == 0 || one_based as usize > points.len() {
                        return Err(parse_err(lineno, format!("vertex index {one_based} out of range")));
                    }
                    *corner = one_based - 1;
                }
                if fields.next().is_some() {
                    return Err(parse_err(lineno, "only triangle faces are supported".into()));
                }
                triangles.push(tri);
            }
            _ => {}
        }
    }
    Ok(Mesh { points, triangles })
}

/// Write a mesh as a Wavefront OBJ file.
pub fn write_mesh(path: &Path, mesh: &Mesh) -> Result<(), MeshError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for p in &mesh.points {
        writeln!(writer, "v {} {} {}", p[0], p[1], p[2])?;
    }
    for t in &mesh.triangles {
        writeln!(writer, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1)?;
    }
    writer.flush()?;
    Ok(())
}
