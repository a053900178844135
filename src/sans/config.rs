//! Configuration blocks heading classic instrument files.
//!
//! A classic file opens with three contiguous blocks: hardware (`A5 05`, 48
//! bytes), head (`A5 04`, 224 bytes), and user (`A5 00`, 512 bytes). Together
//! they identify the instrument family and fix the parameters that govern
//! decoding of every later record.

use ndarray::Array2;
use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{I16, U16, U32};

use super::{
    SYNC,
    check::{ChecksumError, verify},
    clock::bcd_clock,
};

/// Length of the hardware configuration block.
pub const HARDWARE_LEN: usize = 48;
/// Length of the head configuration block.
pub const HEAD_LEN: usize = 224;
/// Length of the user configuration block.
pub const USER_LEN: usize = 512;

/// Instrument family, which fixes the record types a file may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Single-point acoustic probe.
    Vectrino,
    /// Single-point velocimeter.
    Vector,
    /// Profiling current meter.
    AquadoppProfiler,
    /// High-resolution variant of the profiling current meter.
    HrProfiler,
    /// Wave and current profiler.
    Awac,
    /// Next-generation multi-beam profiler.
    Ad2cp,
}

impl Family {
    /// Human-readable family name.
    pub fn name(self) -> &'static str {
        match self {
            Family::Vectrino => "Vectrino",
            Family::Vector => "Vector",
            Family::AquadoppProfiler => "Aquadopp Profiler",
            Family::HrProfiler => "HR Profiler",
            Family::Awac => "AWAC",
            Family::Ad2cp => "AD2CP",
        }
    }

    /// Whether this family measures a single point rather than a profile.
    pub fn is_single_point(self) -> bool {
        matches!(self, Family::Vectrino | Family::Vector)
    }

    /// Identify a classic family from a hardware serial number.
    ///
    /// Profiling current meters carrying the high-resolution marker are
    /// reported as [`Family::HrProfiler`].
    pub fn from_serial(serial: &str, high_resolution: bool) -> Option<Self> {
        if serial.contains("VNO") {
            Some(Family::Vectrino)
        } else if serial.contains("VEC") {
            Some(Family::Vector)
        } else if serial.contains("AQD") {
            Some(if high_resolution {
                Family::HrProfiler
            } else {
                Family::AquadoppProfiler
            })
        } else if serial.contains("WPR") {
            Some(Family::Awac)
        } else {
            None
        }
    }
}

/// One of the three configuration blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Hardware,
    Head,
    User,
}

impl Block {
    /// The type identifier following the sync byte.
    pub fn id(self) -> u8 {
        match self {
            Block::Hardware => 0x05,
            Block::Head => 0x04,
            Block::User => 0x00,
        }
    }
}

/// An error decoding the configuration blocks.
///
/// Every variant is fatal: no record following a rejected block is decoded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No hardware configuration block was found.
    #[error("No hardware configuration block found.")]
    Missing,
    /// A block runs past the end of the file.
    #[error("The {block:?} configuration block at offset {offset} is truncated.")]
    Truncated { block: Block, offset: usize },
    /// A block is absent from its expected position.
    #[error("Expected the {block:?} configuration block at offset {offset}.")]
    Unexpected { block: Block, offset: usize },
    /// A block failed checksum validation.
    #[error("The {block:?} configuration block at offset {offset} is invalid: {source}")]
    Checksum {
        block: Block,
        offset: usize,
        source: ChecksumError,
    },
    /// The serial number matched no known family.
    #[error("Unknown instrument family for serial number {serial:?} at offset {offset}.")]
    UnknownFamily { serial: String, offset: usize },
}

/// Coordinate system velocities are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    Enu,
    Xyz,
    Beam,
}

impl CoordinateSystem {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => CoordinateSystem::Enu,
            1 => CoordinateSystem::Xyz,
            _ => CoordinateSystem::Beam,
        }
    }
}

/// Transmit power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    High,
    HighMinus,
    LowPlus,
    Low,
}

/// Sampling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    Continuous,
    Burst,
}

/// Decoded hardware configuration block.
#[derive(Debug, Clone)]
pub struct HardwareConfiguration {
    pub serial_number: String,
    pub recorder_installed: bool,
    pub compass_installed: bool,
    pub frequency: u16,
    pub pic_version: u16,
    pub hardware_revision: u16,
    pub recorder_size: u16,
    pub status: u16,
    pub firmware_version: String,
    /// Set when the board reports the high-resolution profiler marker.
    pub high_resolution: bool,
}

/// Decoded head configuration block.
#[derive(Debug, Clone)]
pub struct HeadConfiguration {
    pub pressure_sensor: bool,
    pub magnetometer: bool,
    pub tilt_sensor: bool,
    pub tilt_down: bool,
    /// Acoustic frequency (Hz).
    pub frequency: u32,
    pub head_type: u16,
    pub serial_number: String,
    /// Beam to XYZ calibration matrix, when the head carries one.
    pub transformation_matrix: Option<Array2<f64>>,
    /// Distance from the probe to the sample volume (mm, single-point probe
    /// only).
    pub distance_to_sample_volume: Option<f64>,
    pub beams: u16,
}

/// Decoded user configuration block.
#[derive(Debug, Clone)]
pub struct UserConfiguration {
    pub transmit_pulse_length: u16,
    pub blanking_distance: u16,
    pub receive_length: u16,
    pub time_between_pings: u16,
    pub time_between_bursts: u16,
    pub pings: u16,
    pub average_interval: u16,
    pub beams: u16,
    pub timing_control: u16,
    pub power_control: u16,
    pub compass_update_rate: u16,
    pub coordinate_system: CoordinateSystem,
    pub cells: u16,
    pub cell_size: u16,
    pub measurement_interval: u16,
    pub deployment_name: String,
    pub wrap_mode: u16,
    pub deployment_start: Option<chrono::NaiveDateTime>,
    pub diagnostics_interval: u32,
    pub mode: u16,
    pub sound_speed_adjustment: u16,
    pub diagnostics_samples: u16,
    pub diagnostics_cells: u16,
    pub diagnostics_pings: u16,
    pub analog_input_address: u16,
    pub software_version: String,
    pub comments: String,
    pub wave_mode: u16,
    pub wave_cell_position: u16,
    pub wave_samples: u16,
    pub analog_output_scale: u16,
    pub correlation_threshold: u16,
    pub second_lag_pulse_length: u16,
    /// Raw lag counts.
    pub lags: (u16, u16),

    /// Power level, when the timing and power registers agree.
    pub power_level: Option<PowerLevel>,
    pub sample_mode: SampleMode,
    /// Sample rate (Hz), for families that derive one.
    pub sample_rate: Option<f64>,
    /// Velocity resolution in millimetres per second per count.
    pub velocity_scaling: f64,
    /// Lags (s), for the single-point families.
    pub lag_seconds: Option<(f64, f64)>,
    /// Samples per burst (velocimeter only, absent when continuous).
    pub samples_per_burst: Option<u16>,
}

/// The three configuration blocks of a classic file.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Offset of the hardware block.
    pub offset: usize,
    /// Offset of the first byte following the user block.
    pub end: usize,
    pub family: Family,
    pub hardware: HardwareConfiguration,
    pub head: HeadConfiguration,
    pub user: UserConfiguration,
}

impl Configuration {
    /// Offset of a block within the file.
    pub fn block_offset(&self, block: Block) -> usize {
        match block {
            Block::Hardware => self.offset,
            Block::Head => self.offset + HARDWARE_LEN,
            Block::User => self.offset + HARDWARE_LEN + HEAD_LEN,
        }
    }
}

/// Decode the configuration blocks of a classic file.
///
/// Bytes preceding the first hardware block are skipped.
pub fn decode(r: &[u8]) -> Result<Configuration, ConfigError> {
    let offset = r
        .windows(2)
        .position(|w| w == [SYNC, Block::Hardware.id()])
        .ok_or(ConfigError::Missing)?;

    let mut i = offset;

    let (family, hardware) = decode_hardware(block(r, &mut i, Block::Hardware)?, offset)?;
    let head = decode_head(block(r, &mut i, Block::Head)?, family);
    let user = decode_user(block(r, &mut i, Block::User)?, family);

    Ok(Configuration {
        offset,
        end: i,
        family,
        hardware,
        head,
        user,
    })
}

/// Take and verify a block of an exact length, advancing the offset.
fn block<const N: usize>(r: &[u8], i: &mut usize, block: Block) -> Result<[u8; N], ConfigError> {
    let offset = *i;

    let bytes: [u8; N] = r
        .get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(ConfigError::Truncated { block, offset })?;

    if bytes[..2] != [SYNC, block.id()] {
        Err(ConfigError::Unexpected { block, offset })?;
    }

    verify(&bytes).map_err(|source| ConfigError::Checksum {
        block,
        offset,
        source,
    })?;

    *i += N;
    Ok(bytes)
}

fn decode_hardware(
    r: [u8; HARDWARE_LEN],
    offset: usize,
) -> Result<(Family, HardwareConfiguration), ConfigError> {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawHardware {
        sync: u8,
        id: u8,
        size: U16,
        serial: [u8; 14],
        config: U16,
        frequency: U16,
        pic_version: U16,
        hardware_revision: U16,
        recorder_size: U16,
        status: U16,
        marker: [u8; 2],
        spare: [u8; 10],
        firmware: [u8; 4],
        checksum: U16,
    }

    bitfield! {
        struct BoardConfig(u16) {
            [0] recorder,
            [1] compass,
        }
    }

    let RawHardware {
        serial,
        config,
        frequency,
        pic_version,
        hardware_revision,
        recorder_size,
        status,
        marker,
        firmware,
        ..
    } = zerocopy::transmute!(r);

    let serial_number = text(&serial);
    let high_resolution = marker == [0x67, 0x67];

    let family = Family::from_serial(&serial_number, high_resolution).ok_or_else(|| {
        ConfigError::UnknownFamily {
            serial: serial_number.clone(),
            offset,
        }
    })?;

    let config = BoardConfig(config.get());
    let recorder_installed = config.recorder();

    let hardware = HardwareConfiguration {
        serial_number,
        recorder_installed,
        compass_installed: config.compass(),
        frequency: frequency.get(),
        pic_version: pic_version.get(),
        hardware_revision: hardware_revision.get(),
        recorder_size: if recorder_installed || family == Family::Vectrino {
            recorder_size.get()
        } else {
            0
        },
        status: status.get(),
        firmware_version: text(&firmware),
        high_resolution,
    };

    Ok((family, hardware))
}

fn decode_head(r: [u8; HEAD_LEN], family: Family) -> HeadConfiguration {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawHead {
        sync: u8,
        id: u8,
        size: U16,
        config: U16,
        frequency: U16,
        head_type: U16,
        serial: [u8; 12],
        system1: [u8; 8],
        matrix: [I16; 16],
        system2: [u8; 136],
        distance: U16,
        spare: [u8; 20],
        beams: U16,
        checksum: U16,
    }

    bitfield! {
        struct HeadConfig(u16) {
            [0] pressure,
            [1] magnetometer,
            [2] tilt,
            [3] tilt_down,
        }
    }

    let RawHead {
        config,
        frequency,
        head_type,
        serial,
        matrix,
        distance,
        beams,
        ..
    } = zerocopy::transmute!(r);

    let config = HeadConfig(config.get());
    let beams = beams.get();

    // The calibration matrix is square in the number of beams.
    let n = if family == Family::Vectrino {
        4
    } else {
        usize::from(beams).clamp(3, 4)
    };

    let words = &matrix[..n * n];
    let transformation_matrix = if words.iter().all(|w| w.get() == 0) {
        None
    } else {
        Some(Array2::from_shape_fn((n, n), |(row, col)| {
            f64::from(words[row * n + col].get()) / 4096.0
        }))
    };

    let distance_to_sample_volume = (family == Family::Vectrino).then(|| {
        let d = 1.5 * f64::from(distance.get());
        (10.0 * 0.5 * (d * d - 622.98) / (d - 5.7)).round() / 10.0
    });

    HeadConfiguration {
        pressure_sensor: config.pressure(),
        magnetometer: config.magnetometer(),
        tilt_sensor: config.tilt(),
        tilt_down: config.tilt_down(),
        frequency: u32::from(frequency.get()) * 1000,
        head_type: head_type.get(),
        serial_number: text(&serial),
        transformation_matrix,
        distance_to_sample_volume,
        beams,
    }
}

fn decode_user(r: [u8; USER_LEN], family: Family) -> UserConfiguration {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawUser {
        sync: u8,
        id: u8,
        size: U16,
        t: [U16; 5],
        pings: U16,
        average_interval: U16,
        beams: U16,
        timing_control: U16,
        power_control: U16,
        a1: U16,
        b0: U16,
        b1: U16,
        compass_update_rate: U16,
        coordinate_system: U16,
        cells: U16,
        cell_size: U16,
        measurement_interval: U16,
        deployment_name: [u8; 6],
        wrap_mode: U16,
        deployment_start: [u8; 6],
        diagnostics_interval: U32,
        mode: U16,
        sound_speed_adjustment: U16,
        diagnostics_samples: U16,
        diagnostics_cells: U16,
        diagnostics_pings: U16,
        mode_test: U16,
        analog_input_address: U16,
        software_version: U16,
        spare1: U16,
        velocity_adjustment: [u8; 180],
        comments: [u8; 180],
        wave_mode: U16,
        wave_cell_position: U16,
        wave_t: [U16; 3],
        wave_samples: U16,
        a1_2: U16,
        b0_2: U16,
        b1_2: U16,
        spare2: U16,
        analog_output_scale: U16,
        correlation_threshold: U16,
        spare3: U16,
        second_lag_pulse_length: U16,
        spare4: [u8; 16],
        lag1: U16,
        lag2: U16,
        spare5: [u8; 10],
        filter_constants: [u8; 16],
        checksum: U16,
    }

    bitfield! {
        struct TimingControl(u16) {
            [1] burst,
            [5..7] power: u8,
        }
    }

    bitfield! {
        struct PowerControl(u16) {
            [5..7] power: u8,
        }
    }

    bitfield! {
        struct ModeWord(u16) {
            [4] fine_velocity,
        }
    }

    let raw: RawUser = zerocopy::transmute!(r);

    let [t1, t2, t3, t4, t5] = raw.t.map(|t| t.get());
    let average_interval = raw.average_interval.get();
    let timing_control = raw.timing_control.get();
    let power_control = raw.power_control.get();
    let mode = raw.mode.get();
    let lags = (raw.lag1.get(), raw.lag2.get());

    let timing = TimingControl(timing_control);
    let power = PowerControl(power_control);

    let power_level = if timing.power() == power.power() {
        match timing.power() {
            0 => Some(PowerLevel::High),
            1 => Some(PowerLevel::HighMinus),
            2 => Some(PowerLevel::LowPlus),
            3 => Some(PowerLevel::Low),
            _ => None,
        }
    } else {
        None
    };

    let sample_mode = if timing.burst() {
        SampleMode::Burst
    } else {
        SampleMode::Continuous
    };

    let ratio = |n: f64, d: u16| (d != 0).then(|| n / f64::from(d));

    let sample_rate = match family {
        Family::Vectrino => ratio(50000.0, average_interval).map(f64::round),
        Family::Vector => ratio(512.0, average_interval),
        Family::HrProfiler => ratio(512.0, t5),
        _ => None,
    };

    let velocity_scaling = match family {
        Family::Vector | Family::HrProfiler | Family::Vectrino
            if ModeWord(mode).fine_velocity() =>
        {
            0.1
        }
        _ => 1.0,
    };

    let lag_seconds = match family {
        Family::Vector => Some((f64::from(lags.0) / 480000.0, f64::from(lags.1) / 480000.0)),
        Family::Vectrino => Some((f64::from(lags.0) / 1e6, f64::from(lags.1) / 1e6)),
        _ => None,
    };

    let b1_2 = raw.b1_2.get();
    let samples_per_burst = (family == Family::Vector && b1_2 > 0).then_some(b1_2);

    UserConfiguration {
        transmit_pulse_length: t1,
        blanking_distance: t2,
        receive_length: t3,
        time_between_pings: t4,
        time_between_bursts: t5,
        pings: raw.pings.get(),
        average_interval,
        beams: raw.beams.get(),
        timing_control,
        power_control,
        compass_update_rate: raw.compass_update_rate.get(),
        coordinate_system: CoordinateSystem::from_code(raw.coordinate_system.get()),
        cells: raw.cells.get(),
        cell_size: raw.cell_size.get(),
        measurement_interval: raw.measurement_interval.get(),
        deployment_name: text(&raw.deployment_name),
        wrap_mode: raw.wrap_mode.get(),
        deployment_start: bcd_clock(raw.deployment_start),
        diagnostics_interval: raw.diagnostics_interval.get(),
        mode,
        sound_speed_adjustment: raw.sound_speed_adjustment.get(),
        diagnostics_samples: raw.diagnostics_samples.get(),
        diagnostics_cells: raw.diagnostics_cells.get(),
        diagnostics_pings: raw.diagnostics_pings.get(),
        analog_input_address: raw.analog_input_address.get(),
        software_version: software_version(raw.software_version.get()),
        comments: text(&raw.comments),
        wave_mode: raw.wave_mode.get(),
        wave_cell_position: raw.wave_cell_position.get(),
        wave_samples: raw.wave_samples.get(),
        analog_output_scale: raw.analog_output_scale.get(),
        correlation_threshold: raw.correlation_threshold.get(),
        second_lag_pulse_length: raw.second_lag_pulse_length.get(),
        lags,
        power_level,
        sample_mode,
        sample_rate,
        velocity_scaling,
        lag_seconds,
        samples_per_burst,
    }
}

/// Format a packed firmware version, e.g. `31702` as `3.17.2`.
fn software_version(v: u16) -> String {
    let (major, minor, patch) = (v / 10000, (v % 10000) / 100, v % 100);

    if patch != 0 {
        format!("{major}.{minor}.{patch}")
    } else {
        format!("{major}.{minor}")
    }
}

/// Decode a fixed-width text field, dropping padding.
pub(crate) fn text(r: &[u8]) -> String {
    let end = r.iter().position(|b| *b == 0).unwrap_or(r.len());
    String::from_utf8_lossy(&r[..end]).trim().into()
}
