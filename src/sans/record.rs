//! Record kinds, per-family dispatch, and typed record decoding.

use std::rc::Rc;

use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{I16, U16};

use super::{
    clock::{bcd_clock, calendar, seconds},
    config::{Family, UserConfiguration, text},
    ensemble::CounterRule,
    layout::{FieldName, RecordShape, ShapeKey},
};

/// Length of a next-generation record header.
pub const AD2CP_HEADER_LEN: usize = 10;
/// Family byte of next-generation record headers.
pub const AD2CP_FAMILY: u8 = 0x10;

/// Kind of a data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// Single-point probe velocity header (`0x50`).
    VectrinoVelocityHeader,
    /// Single-point probe velocity sample (`0x51`).
    VectrinoVelocity,
    /// Single-point probe amplitude profile check (`0x07`).
    ProbeCheck,
    /// Single-point probe boundary distance (`0x02`).
    VectrinoDistance,
    /// Single-point probe file information (`0x0F`).
    FileInfo,
    /// Velocimeter velocity sample (`0x10`).
    VectorVelocity,
    /// Velocimeter system sample (`0x11`).
    VectorSystem,
    /// Velocimeter burst header (`0x12`).
    VectorVelocityHeader,
    /// Wave profiler current profile (`0x20`).
    AwacProfile,
    /// Current meter profile (`0x21`).
    AquadoppProfile,
    /// High-resolution profile (`0x2A`).
    HrProfile,
    /// Next-generation burst data (`0x15`).
    Burst,
    /// Next-generation average data (`0x16`).
    Average,
    /// Next-generation string (`0xA0`).
    Text,
}

impl RecordKind {
    /// Type identifier of this kind.
    pub fn id(self) -> u8 {
        match self {
            RecordKind::VectrinoVelocityHeader => 0x50,
            RecordKind::VectrinoVelocity => 0x51,
            RecordKind::ProbeCheck => 0x07,
            RecordKind::VectrinoDistance => 0x02,
            RecordKind::FileInfo => 0x0F,
            RecordKind::VectorVelocity => 0x10,
            RecordKind::VectorSystem => 0x11,
            RecordKind::VectorVelocityHeader => 0x12,
            RecordKind::AwacProfile => 0x20,
            RecordKind::AquadoppProfile => 0x21,
            RecordKind::HrProfile => 0x2A,
            RecordKind::Burst => 0x15,
            RecordKind::Average => 0x16,
            RecordKind::Text => 0xA0,
        }
    }

    /// Human-readable name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::VectrinoVelocityHeader => "Vectrino velocity header",
            RecordKind::VectrinoVelocity => "Vectrino velocity data",
            RecordKind::ProbeCheck => "Vectrino probe check",
            RecordKind::VectrinoDistance => "Vectrino distance measurement",
            RecordKind::FileInfo => "Vectrino file information",
            RecordKind::VectorVelocity => "Vector velocity data",
            RecordKind::VectorSystem => "Vector system data",
            RecordKind::VectorVelocityHeader => "Vector velocity header",
            RecordKind::AwacProfile => "AWAC velocity profile data",
            RecordKind::AquadoppProfile => "Aquadopp profiler velocity data",
            RecordKind::HrProfile => "HR profiler data",
            RecordKind::Burst => "AD2CP burst data",
            RecordKind::Average => "AD2CP average data",
            RecordKind::Text => "AD2CP string",
        }
    }

    /// Look up a next-generation kind by the identifier in its header.
    pub fn from_ad2cp(id: u8) -> Option<Self> {
        match id {
            0x15 => Some(RecordKind::Burst),
            0x16 => Some(RecordKind::Average),
            0xA0 => Some(RecordKind::Text),
            _ => None,
        }
    }

    /// Rule reconstructing ensemble indices for this kind.
    ///
    /// Single-point velocity samples carry a wrapping 8-bit counter. Every
    /// other kind advances by one per accepted record.
    pub fn counter_rule(self) -> CounterRule {
        match self {
            RecordKind::VectrinoVelocity | RecordKind::VectorVelocity => CounterRule::Wrapping {
                period: 255,
                fold: true,
            },
            _ => CounterRule::Sequential,
        }
    }
}

/// How the framer should size a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A record of fixed length.
    Fixed(RecordKind, usize),
    /// A record shaped by configuration-derived dimensions.
    Shaped(RecordKind, ShapeKey),
    /// A next-generation record, identified after its header is read.
    Ad2cp,
}

/// Maps the type identifiers of one family to their record kinds.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTable {
    family: Family,
    beams: u8,
    cells: u16,
}

impl DispatchTable {
    /// Build the table of a family, taking profile dimensions from its user
    /// configuration (if any).
    pub fn new(family: Family, user: Option<&UserConfiguration>) -> Self {
        let (beams, cells) = user
            .map(|u| (u8::try_from(u.beams).unwrap_or(u8::MAX), u.cells))
            .unwrap_or_default();

        Self {
            family,
            beams,
            cells,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Resolve the byte following a sync byte.
    pub fn resolve(&self, id: u8) -> Option<Resolution> {
        use RecordKind::*;
        use Resolution::*;

        let fixed = |kind: RecordKind, len| Some(Fixed(kind, len));
        let shaped = |kind| Some(Shaped(kind, ShapeKey::profile(self.beams, self.cells)));

        match (self.family, id) {
            (Family::Vectrino, 0x50) => fixed(VectrinoVelocityHeader, 42),
            (Family::Vectrino, 0x51) => fixed(VectrinoVelocity, 22),
            (Family::Vectrino, 0x07) => fixed(ProbeCheck, 2064),
            (Family::Vectrino, 0x02) => fixed(VectrinoDistance, 16),
            (Family::Vectrino, 0x0F) => fixed(FileInfo, 26),
            (Family::Vector, 0x10) => fixed(VectorVelocity, 24),
            (Family::Vector, 0x11) => fixed(VectorSystem, 28),
            (Family::Vector, 0x12) => fixed(VectorVelocityHeader, 42),
            (Family::AquadoppProfiler, 0x21) => shaped(AquadoppProfile),
            (Family::Awac, 0x20) => shaped(AwacProfile),
            (Family::HrProfiler, 0x2A) => Some(Shaped(
                HrProfile,
                ShapeKey::high_resolution(self.beams, self.cells),
            )),
            // Next-generation records put their header length after the sync byte.
            (Family::Ad2cp, 0x0A) => Some(Ad2cp),
            _ => None,
        }
    }
}

/// A shape and the key it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub key: ShapeKey,
    pub shape: Rc<RecordShape>,
}

/// Channel holding one value per ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    /// Seconds since the Unix epoch.
    Time,
    Error,
    Status,
    /// Volts.
    Battery,
    /// Metres per second.
    SoundSpeed,
    /// Degrees.
    Heading,
    /// Degrees.
    Pitch,
    /// Degrees.
    Roll,
    /// Decibar.
    Pressure,
    /// Degrees Celsius.
    Temperature,
    Analog1,
    Analog2,
    /// Millimetres.
    Distance,
    DistanceQuality,
    Ensemble,
    /// Degrees Celsius.
    MagnetometerTemperature,
    /// Degrees Celsius.
    RtcTemperature,
    /// Metres per second.
    Ambiguity,
    TransmitEnergy,
}

/// Channel holding three axes per ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Triple {
    /// Raw counts.
    Magnetometer,
    /// Standard gravity.
    Accelerometer,
}

/// Values of one ensemble-bearing record.
///
/// Planes are beam-major: element `(beam, cell)` sits at index
/// `beam * cells + cell`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Raw wrapping counter, for kinds that carry one.
    pub counter: Option<u8>,
    pub beams: usize,
    pub cells: usize,
    pub velocity: Option<Vec<i16>>,
    pub amplitude: Option<Vec<u8>>,
    pub correlation: Option<Vec<u8>>,
    /// Metres per second per velocity count.
    pub velocity_scale: f64,
    pub scalars: Vec<(Scalar, f64)>,
    pub triples: Vec<(Triple, [f64; 3])>,
    /// Physical beam number of each data beam, when described.
    pub physical_beams: Vec<u8>,
    /// Reported mounting orientation code, when present.
    pub orientation: Option<u8>,
}

impl Sample {
    /// Look up a scalar channel.
    pub fn scalar(&self, channel: Scalar) -> Option<f64> {
        self.scalars
            .iter()
            .find_map(|(c, v)| (*c == channel).then_some(*v))
    }
}

/// Single-point probe velocity header.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityHeader {
    /// Distance to the boundary (mm).
    pub distance: f64,
    pub distance_quality: u16,
    pub lags: (u16, u16),
    pub noise_amplitude: [u8; 4],
    pub noise_correlation: [u8; 4],
    /// Degrees Celsius.
    pub temperature: f64,
    /// Metres per second.
    pub sound_speed: f64,
    pub sample_volume_amplitude: [u8; 4],
    pub boundary_amplitude: [u8; 4],
    pub z0_lag1: [u8; 4],
    pub z0_lag2: [u8; 4],
}

/// Velocimeter burst header.
#[derive(Debug, Clone, PartialEq)]
pub struct BurstHeader {
    /// Seconds since the Unix epoch.
    pub time: Option<f64>,
    pub records: u16,
    pub noise_amplitude: [u8; 4],
    pub noise_correlation: [u8; 4],
}

/// Single-point probe amplitude profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeCheck {
    pub samples_per_beam: u16,
    pub first_sample: u16,
    /// Four beams of 512 samples, beam-major.
    pub amplitude: Vec<u8>,
}

/// Samples stored per beam in a probe check record.
pub const PROBE_CHECK_SAMPLES: usize = 512;

/// A decoded data record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Sample(Sample),
    VelocityHeader(VelocityHeader),
    BurstHeader(BurstHeader),
    ProbeCheck(ProbeCheck),
    Text(String),
}

/// An error decoding a framed record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The span does not match the record's length.
    #[error("{} of {len} bytes does not match its layout.", .kind.name())]
    Length { kind: RecordKind, len: usize },
    /// A shaped record was framed without its layout.
    #[error("{} requires a layout.", .kind.name())]
    MissingLayout { kind: RecordKind },
}

/// Decode a framed record.
///
/// `r` spans the record as framed: the whole record for classic kinds, or the
/// data section for next-generation kinds. `velocity_scaling` is the user
/// configuration's resolution in millimetres per second per count.
pub fn decode(
    kind: RecordKind,
    r: &[u8],
    layout: Option<&Layout>,
    velocity_scaling: f64,
) -> Result<Record, RecordError> {
    let scale = velocity_scaling / 1000.0;

    Ok(match kind {
        RecordKind::VectrinoVelocityHeader => Record::VelocityHeader(vectrino_header(take(kind, r)?)),
        RecordKind::VectrinoVelocity => Record::Sample(vectrino_velocity(take(kind, r)?, scale)),
        RecordKind::ProbeCheck => Record::ProbeCheck(probe_check(take(kind, r)?)),
        RecordKind::VectrinoDistance => Record::Sample(vectrino_distance(take(kind, r)?)),
        RecordKind::FileInfo => Record::Text(file_info(take(kind, r)?)),
        RecordKind::VectorVelocity => Record::Sample(vector_velocity(take(kind, r)?, scale)),
        RecordKind::VectorSystem => Record::Sample(vector_system(take(kind, r)?)),
        RecordKind::VectorVelocityHeader => Record::BurstHeader(vector_header(take(kind, r)?)),
        RecordKind::AwacProfile | RecordKind::AquadoppProfile | RecordKind::HrProfile => {
            let layout = layout.ok_or(RecordError::MissingLayout { kind })?;
            Record::Sample(profile(kind, r, layout, scale)?)
        }
        RecordKind::Burst | RecordKind::Average => {
            let layout = layout.ok_or(RecordError::MissingLayout { kind })?;
            Record::Sample(ad2cp(kind, r, layout)?)
        }
        RecordKind::Text => Record::Text(ad2cp_text(r)),
    })
}

/// Take a record of an exact length.
fn take<const N: usize>(kind: RecordKind, r: &[u8]) -> Result<[u8; N], RecordError> {
    r.try_into()
        .map_err(|_| RecordError::Length { kind, len: r.len() })
}

fn vectrino_header(r: [u8; 42]) -> VelocityHeader {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawVelocityHeader {
        sync: u8,
        id: u8,
        size: U16,
        distance: U16,
        distance_quality: U16,
        lag1: U16,
        lag2: U16,
        noise_amplitude: [u8; 4],
        noise_correlation: [u8; 4],
        temperature: I16,
        sound_speed: U16,
        sample_volume_amplitude: [u8; 4],
        boundary_amplitude: [u8; 4],
        z0_lag1: [u8; 4],
        z0_lag2: [u8; 4],
        checksum: U16,
    }

    let RawVelocityHeader {
        distance,
        distance_quality,
        lag1,
        lag2,
        noise_amplitude,
        noise_correlation,
        temperature,
        sound_speed,
        sample_volume_amplitude,
        boundary_amplitude,
        z0_lag1,
        z0_lag2,
        ..
    } = zerocopy::transmute!(r);

    VelocityHeader {
        distance: f64::from(distance.get()) / 10.0,
        distance_quality: distance_quality.get(),
        lags: (lag1.get(), lag2.get()),
        noise_amplitude,
        noise_correlation,
        temperature: f64::from(temperature.get()) / 100.0,
        sound_speed: f64::from(sound_speed.get()) / 10.0,
        sample_volume_amplitude,
        boundary_amplitude,
        z0_lag1,
        z0_lag2,
    }
}

fn vectrino_velocity(r: [u8; 22], scale: f64) -> Sample {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawVelocity {
        sync: u8,
        id: u8,
        status: u8,
        count: u8,
        velocity: [I16; 4],
        amplitude: [u8; 4],
        correlation: [u8; 4],
        checksum: U16,
    }

    let RawVelocity {
        status,
        count,
        velocity,
        amplitude,
        correlation,
        ..
    } = zerocopy::transmute!(r);

    Sample {
        counter: Some(count),
        beams: 4,
        cells: 1,
        velocity: Some(velocity.iter().map(|v| v.get()).collect()),
        amplitude: Some(amplitude.to_vec()),
        correlation: Some(correlation.to_vec()),
        velocity_scale: scale,
        scalars: vec![(Scalar::Status, f64::from(status))],
        ..Default::default()
    }
}

fn probe_check(r: [u8; 2064]) -> ProbeCheck {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawProbeCheck {
        sync: u8,
        id: u8,
        size: U16,
        samples_per_beam: U16,
        first_sample: U16,
        spare: [I16; 3],
        amplitude: [[u8; PROBE_CHECK_SAMPLES]; 4],
        checksum: U16,
    }

    let RawProbeCheck {
        samples_per_beam,
        first_sample,
        amplitude,
        ..
    } = zerocopy::transmute!(r);

    ProbeCheck {
        samples_per_beam: samples_per_beam.get(),
        first_sample: first_sample.get(),
        amplitude: amplitude.concat(),
    }
}

fn vectrino_distance(r: [u8; 16]) -> Sample {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawDistance {
        sync: u8,
        id: u8,
        size: U16,
        temperature: I16,
        sound_speed: U16,
        distance: U16,
        quality: U16,
        spare: U16,
        checksum: U16,
    }

    let RawDistance {
        temperature,
        sound_speed,
        distance,
        quality,
        ..
    } = zerocopy::transmute!(r);

    Sample {
        scalars: vec![
            (Scalar::Temperature, f64::from(temperature.get()) / 100.0),
            (Scalar::SoundSpeed, f64::from(sound_speed.get()) / 10.0),
            (Scalar::Distance, f64::from(distance.get()) / 10.0),
            (Scalar::DistanceQuality, f64::from(quality.get())),
        ],
        ..Default::default()
    }
}

fn file_info(r: [u8; 26]) -> String {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawFileInfo {
        sync: u8,
        id: u8,
        size: U16,
        spare: [U16; 3],
        info: [u8; 14],
        checksum: U16,
    }

    let RawFileInfo { info, .. } = zerocopy::transmute!(r);
    text(&info)
}

fn vector_velocity(r: [u8; 24], scale: f64) -> Sample {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawVelocity {
        sync: u8,
        id: u8,
        analog2_lsb: u8,
        count: u8,
        pressure_msb: u8,
        analog2_msb: u8,
        pressure_lsw: U16,
        analog1: U16,
        velocity: [I16; 3],
        amplitude: [u8; 3],
        correlation: [u8; 3],
        checksum: U16,
    }

    let RawVelocity {
        analog2_lsb,
        count,
        pressure_msb,
        analog2_msb,
        pressure_lsw,
        analog1,
        velocity,
        amplitude,
        correlation,
        ..
    } = zerocopy::transmute!(r);

    let analog2 = u16::from_le_bytes([analog2_lsb, analog2_msb]);

    Sample {
        counter: Some(count),
        beams: 3,
        cells: 1,
        velocity: Some(velocity.iter().map(|v| v.get()).collect()),
        amplitude: Some(amplitude.to_vec()),
        correlation: Some(correlation.to_vec()),
        velocity_scale: scale,
        scalars: vec![
            (Scalar::Pressure, pressure(pressure_msb, pressure_lsw.get())),
            (Scalar::Analog1, f64::from(analog1.get())),
            (Scalar::Analog2, f64::from(analog2)),
        ],
        ..Default::default()
    }
}

fn vector_system(r: [u8; 28]) -> Sample {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawSystem {
        sync: u8,
        id: u8,
        size: U16,
        clock: [u8; 6],
        battery: U16,
        sound_speed: U16,
        heading: I16,
        pitch: I16,
        roll: I16,
        temperature: I16,
        error: u8,
        status: u8,
        analog: U16,
        checksum: U16,
    }

    let RawSystem {
        clock,
        battery,
        sound_speed,
        heading,
        pitch,
        roll,
        temperature,
        error,
        status,
        analog,
        ..
    } = zerocopy::transmute!(r);

    let mut scalars = vec![
        (Scalar::Battery, f64::from(battery.get()) / 10.0),
        (Scalar::SoundSpeed, f64::from(sound_speed.get()) / 10.0),
        (Scalar::Heading, f64::from(heading.get()) / 10.0),
        (Scalar::Pitch, f64::from(pitch.get()) / 10.0),
        (Scalar::Roll, f64::from(roll.get()) / 10.0),
        (Scalar::Temperature, f64::from(temperature.get()) / 100.0),
        (Scalar::Error, f64::from(error)),
        (Scalar::Status, f64::from(status)),
        (Scalar::Analog1, f64::from(analog.get())),
    ];

    if let Some(t) = bcd_clock(clock) {
        scalars.push((Scalar::Time, seconds(t)));
    }

    Sample {
        scalars,
        ..Default::default()
    }
}

fn vector_header(r: [u8; 42]) -> BurstHeader {
    #[repr(C)]
    #[derive(FromBytes)]
    struct RawBurstHeader {
        sync: u8,
        id: u8,
        size: U16,
        clock: [u8; 6],
        records: U16,
        noise_amplitude: [u8; 4],
        noise_correlation: [u8; 4],
        spare: [u8; 20],
        checksum: U16,
    }

    let RawBurstHeader {
        clock,
        records,
        noise_amplitude,
        noise_correlation,
        ..
    } = zerocopy::transmute!(r);

    BurstHeader {
        time: bcd_clock(clock).map(seconds),
        records: records.get(),
        noise_amplitude,
        noise_correlation,
    }
}

/// Decode a classic or high-resolution profile through its layout.
fn profile(kind: RecordKind, r: &[u8], layout: &Layout, scale: f64) -> Result<Sample, RecordError> {
    let shape = &layout.shape;

    if r.len() != shape.len() {
        Err(RecordError::Length { kind, len: r.len() })?;
    }

    let get = |name| shape.get(name, r).unwrap_or_default() as f64;

    let mut scalars = vec![
        (Scalar::Error, get(FieldName::Error)),
        (Scalar::Battery, get(FieldName::Battery) / 10.0),
        (Scalar::SoundSpeed, get(FieldName::SoundSpeed) / 10.0),
        (Scalar::Heading, get(FieldName::Heading) / 10.0),
        (Scalar::Pitch, get(FieldName::Pitch) / 10.0),
        (Scalar::Roll, get(FieldName::Roll) / 10.0),
        (Scalar::Status, get(FieldName::Status)),
        (Scalar::Temperature, get(FieldName::Temperature) / 100.0),
        (Scalar::Analog1, get(FieldName::Analog1)),
        (
            Scalar::Pressure,
            pressure(get(FieldName::PressureMsb) as u8, get(FieldName::PressureLsw) as u16),
        ),
    ];

    if shape.field(FieldName::Analog2).is_some() {
        scalars.push((Scalar::Analog2, get(FieldName::Analog2)));
    }

    let clock = shape
        .bytes(FieldName::Clock, r)
        .and_then(|b| b.try_into().ok())
        .and_then(bcd_clock);

    if let Some(t) = clock {
        let ms = get(FieldName::Milliseconds);
        scalars.push((Scalar::Time, seconds(t) + ms / 1000.0));
    }

    Ok(Sample {
        beams: usize::from(layout.key.beams),
        cells: usize::from(layout.key.cells),
        velocity_scale: scale,
        scalars,
        ..planes(shape, r)
    })
}

/// Decode a next-generation data section through its layout.
fn ad2cp(kind: RecordKind, r: &[u8], layout: &Layout) -> Result<Sample, RecordError> {
    let shape = &layout.shape;

    if r.len() < shape.len() {
        Err(RecordError::Length { kind, len: r.len() })?;
    }

    let raw = |name| shape.get(name, r);
    let get = |name| raw(name).unwrap_or_default() as f64;

    let mut scalars = vec![
        (Scalar::SoundSpeed, get(FieldName::SoundSpeed) / 10.0),
        (Scalar::Temperature, get(FieldName::Temperature) / 100.0),
        (Scalar::Pressure, get(FieldName::Pressure) / 1000.0),
        (Scalar::Heading, get(FieldName::Heading) / 100.0),
        (Scalar::Pitch, get(FieldName::Pitch) / 100.0),
        (Scalar::Roll, get(FieldName::Roll) / 100.0),
        (Scalar::Error, get(FieldName::Error)),
        (Scalar::Status, get(FieldName::Status)),
        (Scalar::Battery, get(FieldName::Battery) / 10.0),
    ];

    let byte = |name| raw(name).and_then(|v| u8::try_from(v).ok()).unwrap_or_default();
    let time = calendar(
        byte(FieldName::Year),
        byte(FieldName::Month),
        byte(FieldName::Day),
        byte(FieldName::Hour),
        byte(FieldName::Minute),
        byte(FieldName::Second),
        raw(FieldName::Subseconds).unwrap_or_default() as u32 * 100,
    );

    if let Some(t) = time {
        scalars.push((Scalar::Time, seconds(t)));
    }

    // Velocities and the ambiguity velocity share a power-of-ten scale.
    let exponent = raw(FieldName::VelocityScaling).unwrap_or_default() as i32;
    let velocity_scale = 10f64.powi(exponent);

    let optional = [
        (Scalar::Ensemble, FieldName::Ensemble, 1.0),
        (Scalar::Ambiguity, FieldName::Ambiguity, velocity_scale),
        (Scalar::TransmitEnergy, FieldName::TransmitEnergy, 1.0),
        (Scalar::MagnetometerTemperature, FieldName::MagnetometerTemperature, 1e-3),
        (Scalar::RtcTemperature, FieldName::RtcTemperature, 1e-2),
    ];

    for (channel, name, factor) in optional {
        if let Some(v) = raw(name) {
            scalars.push((channel, v as f64 * factor));
        }
    }

    let mut triples = Vec::new();

    if let (Some(x), Some(y), Some(z)) = (
        raw(FieldName::MagnetometerX),
        raw(FieldName::MagnetometerY),
        raw(FieldName::MagnetometerZ),
    ) {
        triples.push((Triple::Magnetometer, [x as f64, y as f64, z as f64]));
    }

    if let (Some(x), Some(y), Some(z)) = (
        raw(FieldName::AccelerometerX),
        raw(FieldName::AccelerometerY),
        raw(FieldName::AccelerometerZ),
    ) {
        let g = |a: i64| a as f64 / 16384.0;
        triples.push((Triple::Accelerometer, [g(x), g(y), g(z)]));
    }

    bitfield! {
        struct DatasetDescription(u16) {
            [0..3] first: u8,
            [3..6] second: u8,
            [6..9] third: u8,
            [9..12] fourth: u8,
            [12..15] fifth: u8,
        }
    }

    let physical_beams = raw(FieldName::DatasetDescription)
        .map(|v| {
            let d = DatasetDescription(v as u16);
            [d.first(), d.second(), d.third(), d.fourth(), d.fifth()]
                .into_iter()
                .filter(|b| *b != 0)
                .collect()
        })
        .unwrap_or_default();

    bitfield! {
        struct Status(u32) {
            [25..28] orientation: u8,
        }
    }

    // Only the 32-bit status word reports orientation.
    let orientation = shape
        .field(FieldName::Status)
        .filter(|f| f.width() == 4)
        .and(raw(FieldName::Status))
        .map(|v| Status(v as u32).orientation());

    Ok(Sample {
        beams: usize::from(layout.key.beams),
        cells: usize::from(layout.key.cells),
        velocity_scale,
        scalars,
        triples,
        physical_beams,
        orientation,
        ..planes(shape, r)
    })
}

/// Read whichever data planes a shape holds.
fn planes(shape: &RecordShape, r: &[u8]) -> Sample {
    let velocity = shape
        .values(FieldName::Velocity, r)
        .map(|v| v.map(|x| x as i16).collect());
    let amplitude = shape
        .values(FieldName::Amplitude, r)
        .map(|v| v.map(|x| x as u8).collect());
    let correlation = shape
        .values(FieldName::Correlation, r)
        .map(|v| v.map(|x| x as u8).collect());

    Sample {
        velocity,
        amplitude,
        correlation,
        ..Default::default()
    }
}

/// Decode a next-generation string record: an identifier byte, then
/// NUL-terminated text.
fn ad2cp_text(r: &[u8]) -> String {
    text(r.get(1..).unwrap_or_default())
}

/// Combine the split pressure words (dbar).
fn pressure(msb: u8, lsw: u16) -> f64 {
    (f64::from(msb) * 65536.0 + f64::from(lsw)) / 1000.0
}
