//! Beam, XYZ, and ENU coordinate transforms.
//!
//! The beam to XYZ matrix comes either from the calibration matrix embedded in
//! a head configuration block, or from a table of beam directions assembled
//! into unit vectors and inverted. Rotating XYZ into ENU permutes and flips
//! axes according to the mounting orientation.

use ndarray::{Array2, s};
use thiserror::Error;

/// Residue below which matrix entries are snapped to zero.
pub const SNAP_THRESHOLD: f64 = 1e-15;

/// Mounting orientation of the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// X axis pointing up.
    NoseUp,
    /// X axis pointing down.
    NoseDown,
    /// Z axis pointing down.
    ZDown,
}

impl Orientation {
    /// Interpret the orientation field of a next-generation status word.
    pub fn from_status(code: u8) -> Result<Self, TransformError> {
        match code {
            0 => Ok(Orientation::NoseUp),
            1 => Ok(Orientation::NoseDown),
            5 => Ok(Orientation::ZDown),
            _ => Err(TransformError::InvalidOrientation(Some(code))),
        }
    }
}

/// Direction of one physical beam, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamVector {
    pub beam: u8,
    /// Angle from the instrument's Z axis.
    pub theta: f64,
    /// Azimuth in the XY plane.
    pub phi: f64,
}

/// Beam directions of the next-generation multi-beam profiler.
pub const AD2CP_GEOMETRY: [BeamVector; 5] = [
    BeamVector {
        beam: 1,
        theta: 25.0,
        phi: 0.0,
    },
    BeamVector {
        beam: 2,
        theta: 25.0,
        phi: -90.0,
    },
    BeamVector {
        beam: 3,
        theta: 25.0,
        phi: 180.0,
    },
    BeamVector {
        beam: 4,
        theta: 25.0,
        phi: 90.0,
    },
    BeamVector {
        beam: 5,
        theta: 0.0,
        phi: 0.0,
    },
];

/// An error building a coordinate transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The head carries no calibration matrix.
    #[error("No calibration matrix available.")]
    MissingCalibration,
    /// The orientation is unknown or unsupported.
    #[error("Invalid or unknown orientation ({0:?}).")]
    InvalidOrientation(Option<u8>),
    /// Only three- and four-beam geometries can be transformed.
    #[error("Unsupported beam count ({0}).")]
    BeamCount(usize),
    /// A beam is missing from the geometry table.
    #[error("No geometry for beam {0}.")]
    UnknownBeam(u8),
}

/// Matrices relating beam, XYZ, and ENU coordinates, with the orientation
/// used to build them.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateTransform {
    pub orientation: Orientation,
    pub beam_to_xyz: Array2<f64>,
    pub xyz_to_beam: Array2<f64>,
    pub beam_to_enu: Array2<f64>,
    pub enu_to_beam: Array2<f64>,
}

impl CoordinateTransform {
    /// Build transforms from an embedded calibration (beam to XYZ) matrix.
    pub fn from_calibration(
        matrix: Option<&Array2<f64>>,
        orientation: Option<Orientation>,
    ) -> Result<Self, TransformError> {
        let beam_to_xyz = matrix.ok_or(TransformError::MissingCalibration)?.clone();
        let n = beam_to_xyz.nrows();

        if beam_to_xyz.ncols() != n || !(3..=4).contains(&n) {
            Err(TransformError::BeamCount(n))?;
        }

        let xyz_to_beam = snap(pseudo_inverse(&beam_to_xyz));
        Self::oriented(beam_to_xyz, xyz_to_beam, orientation)
    }

    /// Build transforms from beam directions, for the physical beams in data
    /// order.
    pub fn from_geometry(
        table: &[BeamVector],
        beams: &[u8],
        orientation: Option<Orientation>,
    ) -> Result<Self, TransformError> {
        let xyz_to_beam = snap(beam_vectors(table, beams)?);
        let beam_to_xyz = snap(pseudo_inverse(&xyz_to_beam));
        Self::oriented(beam_to_xyz, xyz_to_beam, orientation)
    }

    fn oriented(
        beam_to_xyz: Array2<f64>,
        xyz_to_beam: Array2<f64>,
        orientation: Option<Orientation>,
    ) -> Result<Self, TransformError> {
        let orientation = orientation.ok_or(TransformError::InvalidOrientation(None))?;

        let beam_to_enu = snap(permutation(orientation, beam_to_xyz.nrows()).dot(&beam_to_xyz));
        let enu_to_beam = snap(pseudo_inverse(&beam_to_enu));

        Ok(Self {
            orientation,
            beam_to_xyz,
            xyz_to_beam,
            beam_to_enu,
            enu_to_beam,
        })
    }
}

/// Assemble the unit vectors of the given physical beams, one row per beam.
///
/// Three beams yield `[x, y, z]` rows. Four beams yield `[x, y, z1, z2]` rows,
/// estimating vertical velocity separately from each opposing beam pair.
pub fn beam_vectors(table: &[BeamVector], beams: &[u8]) -> Result<Array2<f64>, TransformError> {
    let n = beams.len();

    if !(3..=4).contains(&n) {
        Err(TransformError::BeamCount(n))?;
    }

    let mut m = Array2::zeros((n, n));

    for (row, &beam) in beams.iter().enumerate() {
        let v = table
            .iter()
            .find(|v| v.beam == beam)
            .ok_or(TransformError::UnknownBeam(beam))?;

        let (theta, phi) = (v.theta.to_radians(), v.phi.to_radians());

        m[[row, 0]] = theta.sin() * phi.cos();
        m[[row, 1]] = theta.sin() * phi.sin();

        let z = if n == 4 && beam % 2 == 0 { 3 } else { 2 };
        m[[row, z]] = theta.cos();
    }

    Ok(m)
}

/// Axis permutation taking XYZ to ENU for an orientation.
fn permutation(orientation: Orientation, n: usize) -> Array2<f64> {
    let mut p = Array2::zeros((n, n));

    match orientation {
        Orientation::NoseUp => {
            p[[0, 2]] = 1.0;
            p[[1, 1]] = -1.0;
            p[[2, 0]] = 1.0;
        }
        Orientation::NoseDown => {
            p[[0, 2]] = -1.0;
            p[[1, 1]] = 1.0;
            p[[2, 0]] = 1.0;
        }
        Orientation::ZDown => {
            p[[0, 0]] = 1.0;
            p.slice_mut(s![1.., 1..]).diag_mut().fill(-1.0);
        }
    }

    p
}

/// Compute the Moore-Penrose pseudo-inverse by Newton-Schulz iteration.
///
/// Starting from a scaled transpose, the iteration converges for any matrix,
/// including rank-deficient ones. A zero matrix yields zeros.
pub fn pseudo_inverse(a: &Array2<f64>) -> Array2<f64> {
    const MAX_ITERATIONS: usize = 256;

    let norm_1 = a
        .columns()
        .into_iter()
        .map(|c| c.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let norm_inf = a
        .rows()
        .into_iter()
        .map(|r| r.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max);

    if norm_1 == 0.0 || norm_inf == 0.0 {
        return Array2::zeros(a.t().raw_dim());
    }

    let mut x = a.t().mapv(|v| v / (norm_1 * norm_inf));

    for _ in 0..MAX_ITERATIONS {
        let next = &x * 2.0 - x.dot(a).dot(&x);

        let change = (&next - &x).fold(0.0, |m: f64, d| m.max(d.abs()));
        let scale = next.fold(0.0, |m: f64, v| m.max(v.abs()));

        x = next;

        if change <= f64::EPSILON * scale {
            break;
        }
    }

    x
}

/// Snap entries below the noise threshold to zero.
pub fn snap(m: Array2<f64>) -> Array2<f64> {
    m.mapv_into(|v| if v.abs() < SNAP_THRESHOLD { 0.0 } else { v })
}
