use ndarray::{Array2, array};

use nortek_decode::sans::transform::{
    AD2CP_GEOMETRY, BeamVector, CoordinateTransform, Orientation, TransformError, beam_vectors,
    pseudo_inverse,
};

fn close(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    a.dim() == b.dim() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
}

fn identity(n: usize) -> Array2<f64> {
    Array2::eye(n)
}

fn three_beams() -> Vec<BeamVector> {
    [0.0, 120.0, 240.0]
        .into_iter()
        .zip(1..)
        .map(|(phi, beam)| BeamVector {
            beam,
            theta: 25.0,
            phi,
        })
        .collect()
}

#[test]
fn invert_three_beam_geometry() {
    let table = three_beams();
    let t = CoordinateTransform::from_geometry(&table, &[1, 2, 3], Some(Orientation::ZDown))
        .unwrap();

    let vectors = beam_vectors(&table, &[1, 2, 3]).unwrap();
    assert!(close(&t.xyz_to_beam, &vectors));
    assert!(close(&t.xyz_to_beam.dot(&t.beam_to_xyz), &identity(3)));
    assert!(close(&t.beam_to_xyz.dot(&t.xyz_to_beam), &identity(3)));
}

#[test]
fn invert_enu_transform() {
    for orientation in [Orientation::NoseUp, Orientation::NoseDown, Orientation::ZDown] {
        let t = CoordinateTransform::from_geometry(&three_beams(), &[1, 2, 3], Some(orientation))
            .unwrap();

        assert_eq!(t.orientation, orientation);
        assert!(close(&t.beam_to_enu.dot(&t.enu_to_beam), &identity(3)));
    }
}

#[test]
fn four_beams_estimate_two_vertical_velocities() {
    let m = beam_vectors(&AD2CP_GEOMETRY, &[1, 2, 3, 4]).unwrap();

    let cos = 25f64.to_radians().cos();
    assert!((m[[0, 2]] - cos).abs() < 1e-12);
    assert!((m[[1, 3]] - cos).abs() < 1e-12);
    assert_eq!(m[[0, 3]], 0.0);
    assert_eq!(m[[1, 2]], 0.0);

    let z = Some(Orientation::ZDown);
    let t = CoordinateTransform::from_geometry(&AD2CP_GEOMETRY, &[1, 2, 3, 4], z).unwrap();
    assert!(close(&t.beam_to_xyz.dot(&t.xyz_to_beam), &identity(4)));
}

#[test]
fn snap_cancelled_components() {
    let z = Some(Orientation::ZDown);
    let t = CoordinateTransform::from_geometry(&AD2CP_GEOMETRY, &[1, 2, 3, 4], z).unwrap();

    // Beams at right angles to an axis leave exact zeros.
    assert_eq!(t.xyz_to_beam[[1, 0]], 0.0);
    assert_eq!(t.xyz_to_beam[[0, 1]], 0.0);
}

#[test]
fn nose_orientations_swap_axes() {
    let calibration = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 10.0]];

    let up = CoordinateTransform::from_calibration(Some(&calibration), Some(Orientation::NoseUp))
        .unwrap();
    assert_eq!(up.beam_to_enu.row(0), calibration.row(2));
    assert_eq!(up.beam_to_enu.row(1), calibration.row(1).mapv(|v| -v));
    assert_eq!(up.beam_to_enu.row(2), calibration.row(0));

    let down =
        CoordinateTransform::from_calibration(Some(&calibration), Some(Orientation::NoseDown))
            .unwrap();
    assert_eq!(down.beam_to_enu.row(0), calibration.row(2).mapv(|v| -v));
    assert_eq!(down.beam_to_enu.row(1), calibration.row(1));
}

#[test]
fn reject_unsupported_inputs() {
    let table = AD2CP_GEOMETRY;
    let z = Some(Orientation::ZDown);

    assert_eq!(
        CoordinateTransform::from_geometry(&table, &[1, 2, 3, 4, 5], z),
        Err(TransformError::BeamCount(5))
    );
    assert_eq!(
        CoordinateTransform::from_geometry(&table, &[1, 2], z),
        Err(TransformError::BeamCount(2))
    );
    assert_eq!(
        CoordinateTransform::from_geometry(&table, &[1, 2, 7], z),
        Err(TransformError::UnknownBeam(7))
    );
    assert_eq!(
        CoordinateTransform::from_calibration(None, z),
        Err(TransformError::MissingCalibration)
    );
    assert_eq!(
        CoordinateTransform::from_calibration(Some(&Array2::zeros((2, 3))), z),
        Err(TransformError::BeamCount(2))
    );
    assert_eq!(
        CoordinateTransform::from_calibration(Some(&identity(3)), None),
        Err(TransformError::InvalidOrientation(None))
    );
}

#[test]
fn decode_status_orientation() {
    assert_eq!(Orientation::from_status(0), Ok(Orientation::NoseUp));
    assert_eq!(Orientation::from_status(1), Ok(Orientation::NoseDown));
    assert_eq!(Orientation::from_status(5), Ok(Orientation::ZDown));
    assert_eq!(
        Orientation::from_status(3),
        Err(TransformError::InvalidOrientation(Some(3)))
    );
}

#[test]
fn pseudo_inverse_of_tall_matrix() {
    let a = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
    let expected = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    assert!(close(&pseudo_inverse(&a), &expected));
}
