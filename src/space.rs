//! Anatomical coordinate spaces and lossless reorientation.
//!
//! An [`Orientation`] names the anatomical direction each array axis starts
//! from, as a three-letter code ("asr", "lps", ...). Mapping one orientation
//! onto another is a pure axis permutation plus per-axis flips: no resampling,
//! no interpolation. [`AnatomicalSpace`] binds an orientation to the physical
//! extent of a volume so that point sets (which live in physical units) can be
//! flipped about the correct extent.
//!
//! ## Determinism Guarantees
//!
//! - `map_stack_to` only transposes and reverses axes; voxel values are
//!   preserved exactly and the transform is invertible.
//! - `map_points_to` applies the same permutation with extent-offset flips;
//!   applying the inverse mapping recovers the input up to float rounding.

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three anatomical body axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnatomicalAxis {
    /// Anterior <-> posterior.
    AnteroPosterior,
    /// Superior <-> inferior.
    SuperoInferior,
    /// Left <-> right.
    LeftRight,
}

/// The anatomical side an array axis starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisDirection {
    /// Axis runs anterior to posterior.
    Anterior,
    /// Axis runs posterior to anterior.
    Posterior,
    /// Axis runs superior to inferior.
    Superior,
    /// Axis runs inferior to superior.
    Inferior,
    /// Axis runs left to right.
    Left,
    /// Axis runs right to left.
    Right,
}

impl AxisDirection {
    /// Parse a single orientation letter.
    pub fn from_char(c: char) -> Result<Self, OrientationError> {
        match c.to_ascii_lowercase() {
            'a' => Ok(Self::Anterior),
            'p' => Ok(Self::Posterior),
            's' => Ok(Self::Superior),
            'i' => Ok(Self::Inferior),
            'l' => Ok(Self::Left),
            'r' => Ok(Self::Right),
            other => Err(OrientationError::UnknownAxis(other)),
        }
    }

    /// The body axis this direction lies on.
    pub fn axis(&self) -> AnatomicalAxis {
        match self {
            Self::Anterior | Self::Posterior => AnatomicalAxis::AnteroPosterior,
            Self::Superior | Self::Inferior => AnatomicalAxis::SuperoInferior,
            Self::Left | Self::Right => AnatomicalAxis::LeftRight,
        }
    }

    /// The opposite polarity on the same axis.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Anterior => Self::Posterior,
            Self::Posterior => Self::Anterior,
            Self::Superior => Self::Inferior,
            Self::Inferior => Self::Superior,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    fn code(&self) -> char {
        match self {
            Self::Anterior => 'a',
            Self::Posterior => 'p',
            Self::Superior => 's',
            Self::Inferior => 'i',
            Self::Left => 'l',
            Self::Right => 'r',
        }
    }
}

/// Error type for orientation parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrientationError {
    /// Code is not exactly three letters.
    #[error("orientation code must have exactly three letters, got {0:?}")]
    BadLength(String),
    /// Letter outside the a/p/s/i/l/r alphabet.
    #[error("unknown axis letter {0:?} (expected one of a, p, s, i, l, r)")]
    UnknownAxis(char),
    /// The three letters do not cover the three body axes exactly once.
    #[error("orientation {0:?} does not cover the three anatomical axes exactly once")]
    IncompleteAxes(String),
}

/// An axis convention: the anatomical side each of the three array axes
/// starts from, e.g. `asr` = (anterior, superior, right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Orientation([AxisDirection; 3]);

impl Orientation {
    /// Anterior-superior-right, the canonical target convention.
    pub const ASR: Self = Self([
        AxisDirection::Anterior,
        AxisDirection::Superior,
        AxisDirection::Right,
    ]);

    /// Parse a three-letter orientation code.
    ///
    /// Fails unless the code is a valid permutation of the three body axes
    /// with explicit polarity per axis.
    pub fn parse(code: &str) -> Result<Self, OrientationError> {
        let chars: Vec<char> = code.chars().collect();
        if chars.len() != 3 {
            return Err(OrientationError::BadLength(code.to_string()));
        }
        let dirs = [
            AxisDirection::from_char(chars[0])?,
            AxisDirection::from_char(chars[1])?,
            AxisDirection::from_char(chars[2])?,
        ];
        let covers_all = [
            AnatomicalAxis::AnteroPosterior,
            AnatomicalAxis::SuperoInferior,
            AnatomicalAxis::LeftRight,
        ]
        .iter()
        .all(|ax| dirs.iter().filter(|d| d.axis() == *ax).count() == 1);
        if !covers_all {
            return Err(OrientationError::IncompleteAxes(code.to_string()));
        }
        Ok(Self(dirs))
    }

    /// The per-axis directions.
    pub fn axes(&self) -> [AxisDirection; 3] {
        self.0
    }

    /// The three-letter code for this orientation.
    pub fn code(&self) -> String {
        self.0.iter().map(|d| d.code()).collect()
    }

    /// Compute the permutation and flips mapping this orientation onto
    /// `target`: target axis `t` reads source axis `perm[t]`, reversed when
    /// `flip[t]` is set.
    fn mapping_to(&self, target: Orientation) -> AxisMapping {
        let mut perm = [0usize; 3];
        let mut flip = [false; 3];
        for (t, td) in target.0.iter().enumerate() {
            let s = self
                .0
                .iter()
                .position(|sd| sd.axis() == td.axis())
                .expect("validated orientations cover every body axis");
            perm[t] = s;
            flip[t] = self.0[s] != *td;
        }
        AxisMapping { perm, flip }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Orientation {
    type Err = OrientationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Axis permutation with per-axis flips.
#[derive(Debug, Clone, Copy)]
struct AxisMapping {
    perm: [usize; 3],
    flip: [bool; 3],
}

/// A source orientation bound to the physical extent of a volume.
///
/// Instantiated once per finalization run and reused for every stack and mesh
/// so that all outputs share one consistent frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnatomicalSpace {
    orientation: Orientation,
    shape: [f64; 3],
}

impl AnatomicalSpace {
    /// Create a space from an orientation and the physical shape of the
    /// volume along the source axes (voxel counts times resolution).
    pub fn new(orientation: Orientation, shape: [f64; 3]) -> Self {
        Self { orientation, shape }
    }

    /// Create a space from a three-letter orientation code.
    pub fn from_code(code: &str, shape: [f64; 3]) -> Result<Self, OrientationError> {
        Ok(Self::new(Orientation::parse(code)?, shape))
    }

    /// The source orientation.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The physical shape along the source axes.
    pub fn shape(&self) -> [f64; 3] {
        self.shape
    }

    /// The physical shape permuted into `target` axis order.
    pub fn target_shape(&self, target: Orientation) -> [f64; 3] {
        let m = self.orientation.mapping_to(target);
        [
            self.shape[m.perm[0]],
            self.shape[m.perm[1]],
            self.shape[m.perm[2]],
        ]
    }

    /// Reorient a stack into `target`, by axis transposition and reversal
    /// only. Voxel values are untouched.
    pub fn map_stack_to<T: Clone>(&self, target: Orientation, stack: &Array3<T>) -> Array3<T> {
        let m = self.orientation.mapping_to(target);
        let mut view = stack.view().permuted_axes(m.perm);
        for (axis, &reversed) in m.flip.iter().enumerate() {
            if reversed {
                view.invert_axis(Axis(axis));
            }
        }
        view.to_owned()
    }

    /// Reorient a point set into `target`. Flipped axes are mirrored about
    /// the physical extent, so points must be in physical units.
    pub fn map_points_to(&self, target: Orientation, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let m = self.orientation.mapping_to(target);
        points
            .iter()
            .map(|p| {
                let mut out = [0.0; 3];
                for t in 0..3 {
                    let s = m.perm[t];
                    out[t] = if m.flip[t] { self.shape[s] - p[s] } else { p[s] };
                }
                out
            })
            .collect()
    }
}
