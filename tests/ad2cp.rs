mod common;

use nortek_decode::{
    avec::{self, DecodeOptions},
    sans::{
        config::Family,
        frame::Diagnostic,
        layout::{self, LayoutError},
        record::{RecordKind, Scalar, Triple},
        transform::{Orientation, TransformError},
    },
};

use common::Ad2cp;

const RECORD: usize = 10 + Ad2cp::HEADER + 4 * 8;

fn bursts(n: u32) -> Vec<u8> {
    (0..n)
        .flat_map(|ensemble| {
            Ad2cp {
                ensemble,
                ..Default::default()
            }
            .record()
        })
        .collect()
}

#[test]
fn header_shape_follows_version() {
    assert_eq!(layout::ad2cp_header(1).unwrap().len(), 44);
    assert_eq!(layout::ad2cp_header(2).unwrap().len(), 68);
    assert_eq!(layout::ad2cp_header(3).unwrap().len(), 76);

    assert_eq!(
        layout::ad2cp_header(4),
        Err(LayoutError::UnsupportedVersion(4))
    );
}

#[test]
fn decode_bursts_and_averages() {
    common::init();

    let mut r = vec![0, 1, 2];
    r.extend(bursts(4));
    r.extend(
        Ad2cp {
            id: 0x16,
            cells: 3,
            ..Default::default()
        }
        .record(),
    );
    r.extend(common::ad2cp_text("Signature1000"));

    let file = avec::decode_slice(&r, &DecodeOptions::default()).unwrap();

    assert_eq!(file.family, Family::Ad2cp);
    assert!(file.configuration.is_none());
    assert!(file.diagnostics.is_empty());
    assert_eq!(file.dataset.text, ["Signature1000"]);

    let burst = file.dataset.velocity.unwrap();
    assert_eq!(burst.kind, RecordKind::Burst);
    assert_eq!(burst.count_valid(), 4);
    assert_eq!((burst.cells(), burst.beams()), (2, 4));
    assert!((burst.velocity.as_ref().unwrap()[[1, 3, 3]] - 0.5).abs() < 1e-12);
    assert_eq!(burst.correlation.as_ref().unwrap()[[0, 0, 0]], 80.0);

    let ensemble = burst.scalar(Scalar::Ensemble).unwrap();
    assert_eq!(ensemble.to_vec(), [0.0, 1.0, 2.0, 3.0]);

    assert_eq!(burst.scalar(Scalar::Time).unwrap()[0], 1705307400.5);
    assert_eq!(burst.scalar(Scalar::SoundSpeed).unwrap()[0], 1500.0);
    assert_eq!(burst.scalar(Scalar::Pressure).unwrap()[0], 10.25);
    assert_eq!(burst.scalar(Scalar::Heading).unwrap()[0], 90.0);

    let accelerometer = burst.triple(Triple::Accelerometer).unwrap();
    assert_eq!(accelerometer.dim(), (3, 4));
    assert_eq!(accelerometer[[2, 0]], 1.0);

    let average = file.dataset.average.unwrap();
    assert_eq!(average.len(), 1);
    assert_eq!(average.cells(), 3);

    let transform = file.transform.unwrap();
    assert_eq!(transform.orientation, Orientation::ZDown);
    assert_eq!(transform.xyz_to_beam.dim(), (4, 4));
}

#[test]
fn override_reported_orientation() {
    let r = bursts(1);

    let options = DecodeOptions::default().with_orientation(Orientation::NoseDown);
    let transform = avec::decode_slice(&r, &options).unwrap().transform.unwrap();

    assert_eq!(transform.orientation, Orientation::NoseDown);
}

#[test]
fn report_unknown_orientation() {
    let mut r = vec![0; 5];
    r.extend(
        Ad2cp {
            orientation: 3,
            ..Default::default()
        }
        .record(),
    );

    let failure = avec::decode_slice(&r, &DecodeOptions::default())
        .unwrap()
        .transform
        .unwrap_err();

    assert_eq!(failure.offset, 5);
    assert_eq!(failure.source, TransformError::InvalidOrientation(Some(3)));
}

#[test]
fn report_missing_beam_data() {
    let r = common::ad2cp_text("no data");

    let file = avec::decode_slice(&r, &DecodeOptions::default()).unwrap();

    assert!(file.dataset.velocity.is_none());
    assert_eq!(
        file.transform.unwrap_err().source,
        TransformError::BeamCount(0)
    );
}

#[test]
fn skip_unsupported_version() {
    common::init();

    let mut data = Ad2cp::default().data();
    data[0] = 4;

    let mut r = bursts(1);
    r.extend(common::framed(0x15, &data));
    r.extend(bursts(1));

    let file = avec::decode_slice(&r, &DecodeOptions::default()).unwrap();

    assert_eq!(
        file.diagnostics,
        [Diagnostic::UnsupportedLayout {
            offset: RECORD,
            kind: RecordKind::Burst,
            source: LayoutError::UnsupportedVersion(4),
        }]
    );
    assert_eq!(file.dataset.velocity.unwrap().count_valid(), 2);
}

#[test]
fn keep_records_before_truncation() {
    let mut r = bursts(3);
    r.truncate(r.len() - 10);

    let file = avec::decode_slice(&r, &DecodeOptions::default()).unwrap();

    assert_eq!(
        file.diagnostics,
        [Diagnostic::TruncatedRecord {
            offset: 2 * RECORD,
            expected: RECORD,
            remaining: RECORD - 10,
        }]
    );
    assert_eq!(file.dataset.velocity.unwrap().count_valid(), 2);
}

#[test]
fn skip_corrupted_data_section() {
    let mut r = bursts(3);
    r[RECORD + 10 + Ad2cp::HEADER] ^= 0x01;

    let file = avec::decode_slice(&r, &DecodeOptions::default()).unwrap();

    assert!(matches!(
        file.diagnostics.first(),
        Some(Diagnostic::ChecksumMismatch {
            offset,
            kind: Some(RecordKind::Burst),
            ..
        }) if *offset == RECORD
    ));

    let burst = file.dataset.velocity.unwrap();
    assert_eq!(burst.count_valid(), 2);
    assert_eq!(burst.scalar(Scalar::Ensemble).unwrap()[1], 2.0);
}
