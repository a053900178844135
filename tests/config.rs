mod common;

use std::io::{Cursor, Write};

use chrono::NaiveDate;

use nortek_decode::{
    avec::{self, DecodeOptions, reader, slice},
    sans::{
        check::ChecksumError,
        config::{self, Block, ConfigError, CoordinateSystem, Family, PowerLevel, SampleMode},
    },
};

use common::{DATA, User};

fn aquadopp(user: &User) -> Vec<u8> {
    let head = common::head(3, &common::identity(3));
    common::classic("AQD 2468", false, &head, user, &[])
}

#[test]
fn decode_configuration_blocks() {
    let user = User {
        coordinate_system: 0,
        cells: 20,
        ..Default::default()
    };

    let c = config::decode(&aquadopp(&user)).unwrap();

    assert_eq!((c.offset, c.end), (0, DATA));
    assert_eq!(c.family, Family::AquadoppProfiler);

    assert_eq!(c.hardware.serial_number, "AQD 2468");
    assert!(c.hardware.recorder_installed);
    assert!(c.hardware.compass_installed);
    assert_eq!(c.hardware.frequency, 2000);
    assert_eq!(c.hardware.firmware_version, "3.37");
    assert!(!c.hardware.high_resolution);

    assert!(c.head.pressure_sensor && c.head.magnetometer && c.head.tilt_sensor);
    assert!(!c.head.tilt_down);
    assert_eq!(c.head.serial_number, "A1234");
    assert_eq!(c.head.beams, 3);
    assert_eq!(c.head.transformation_matrix.unwrap().dim(), (3, 3));
    assert_eq!(c.head.distance_to_sample_volume, None);

    assert_eq!(c.user.coordinate_system, CoordinateSystem::Enu);
    assert_eq!(c.user.cells, 20);
    assert_eq!(c.user.deployment_name, "TEST");
    assert_eq!(
        c.user.deployment_start,
        NaiveDate::from_ymd_opt(2015, 6, 17).and_then(|d| d.and_hms_opt(12, 30, 45))
    );
    assert_eq!(c.user.lags, (150, 300));
    assert_eq!(c.user.lag_seconds, None);
}

#[test]
fn skip_bytes_before_hardware_block() {
    let mut r = vec![0xA5, 0x11, 0x07];
    r.extend(aquadopp(&User::default()));

    let c = config::decode(&r).unwrap();

    assert_eq!(c.offset, 3);
    assert_eq!(c.end, 3 + DATA);
    assert_eq!(c.block_offset(Block::Head), 51);
    assert_eq!(c.block_offset(Block::User), 275);
}

#[test]
fn zero_matrix_is_missing() {
    let head = common::head(3, &[]);
    let r = common::classic("AQD 2468", false, &head, &User::default(), &[]);

    assert!(config::decode(&r).unwrap().head.transformation_matrix.is_none());
}

#[test]
fn derive_power_level() {
    let matching = User {
        timing: 3 << 5,
        power: 3 << 5,
        ..Default::default()
    };
    let c = config::decode(&aquadopp(&matching)).unwrap();
    assert_eq!(c.user.power_level, Some(PowerLevel::Low));

    let mismatched = User {
        timing: 2 << 5,
        power: 1 << 5,
        ..Default::default()
    };
    let c = config::decode(&aquadopp(&mismatched)).unwrap();
    assert_eq!(c.user.power_level, None);
}

#[test]
fn derive_vector_sampling() {
    let user = User {
        average_interval: 32,
        software_version: 31700,
        ..Default::default()
    };

    let head = common::head(3, &common::identity(3));
    let r = common::classic("VEC 1357", false, &head, &user, &[]);
    let c = config::decode(&r).unwrap();

    assert_eq!(c.family, Family::Vector);
    assert_eq!(c.user.sample_mode, SampleMode::Continuous);
    assert_eq!(c.user.samples_per_burst, None);
    assert_eq!(c.user.sample_rate, Some(16.0));
    assert_eq!(c.user.lag_seconds, Some((150.0 / 480000.0, 300.0 / 480000.0)));
    assert_eq!(c.user.software_version, "3.17");
}

#[test]
fn reject_unknown_family() {
    let head = common::head(3, &[]);
    let r = common::classic("XYZ123", false, &head, &User::default(), &[]);

    let err = avec::decode_slice(&r, &DecodeOptions::default()).unwrap_err();

    assert!(matches!(
        err,
        slice::Error::Config(ConfigError::UnknownFamily { ref serial, offset: 0 }) if serial == "XYZ123"
    ));
}

#[test]
fn reject_corrupt_user_block() {
    let mut r = aquadopp(&User::default());
    r[48 + 224 + 100] ^= 0x10;

    assert!(matches!(
        config::decode(&r),
        Err(ConfigError::Checksum {
            block: Block::User,
            offset: 272,
            source: ChecksumError::Mismatch { .. },
        })
    ));
}

#[test]
fn reject_missing_configuration() {
    assert!(matches!(config::decode(&[]), Err(ConfigError::Missing)));
    assert!(matches!(
        config::decode(&[0x00, 0x5A, 0xA5]),
        Err(ConfigError::Missing)
    ));

    assert!(matches!(
        avec::decode_slice(&[], &DecodeOptions::default()),
        Err(slice::Error::Config(ConfigError::Missing))
    ));
}

#[test]
fn reject_truncated_head() {
    let mut r = common::hardware("VNO 1234", false);
    r.extend_from_slice(&common::head(4, &[])[..100]);

    assert!(matches!(
        config::decode(&r),
        Err(ConfigError::Truncated {
            block: Block::Head,
            offset: 48,
        })
    ));
}

#[test]
fn reject_misplaced_block() {
    let mut r = common::hardware("VNO 1234", false);
    r.extend(User::default().block());

    assert!(matches!(
        config::decode(&r),
        Err(ConfigError::Unexpected {
            block: Block::Head,
            offset: 48,
        })
    ));
}

#[test]
fn decode_from_reader() {
    common::init();

    let r = aquadopp(&User::default());

    let file = avec::decode_reader(&mut Cursor::new(&r), &DecodeOptions::default()).unwrap();
    assert_eq!(file.family, Family::AquadoppProfiler);
    assert_eq!(file.size, r.len());

    let err = avec::decode_reader(&mut Cursor::new(&r[..60]), &DecodeOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        reader::Error::Decode(slice::Error::Config(ConfigError::Truncated { .. }))
    ));
}

#[test]
fn decode_from_path() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(&aquadopp(&User::default())).unwrap();

    let file = avec::decode_path(f.path(), &DecodeOptions::default()).unwrap();
    assert_eq!(file.family, Family::AquadoppProfiler);

    let missing = f.path().with_extension("missing");
    assert!(matches!(
        avec::decode_path(missing, &DecodeOptions::default()),
        Err(reader::Error::Io(_))
    ));
}
