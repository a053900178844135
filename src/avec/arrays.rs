//! Output arrays, and the receivers counting and filling them.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Array3};

use crate::sans::{
    frame::{Diagnostic, Frame},
    record::{
        BurstHeader, PROBE_CHECK_SAMPLES, ProbeCheck, Record, RecordKind, Sample, Scalar, Triple,
        VelocityHeader,
    },
};

use super::Receiver;

/// Sound speed assumed when no velocity header reports one (m/s).
pub const DEFAULT_SOUND_SPEED: f64 = 1500.0;

/// Channels of one ensemble-bearing record kind.
///
/// Planes are indexed `[cell, ensemble, beam]`, scalars `[ensemble]`, and
/// triples `[axis, ensemble]`. Ensembles never received hold NaN and are not
/// marked valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub kind: RecordKind,
    pub valid: Array1<bool>,
    /// Metres per second.
    pub velocity: Option<Array3<f64>>,
    pub amplitude: Option<Array3<f64>>,
    pub correlation: Option<Array3<f64>>,
    /// Decibels, where a noise floor is known.
    pub snr: Option<Array3<f64>>,
    pub scalars: BTreeMap<Scalar, Array1<f64>>,
    pub triples: BTreeMap<Triple, Array2<f64>>,
}

impl Series {
    /// Number of ensemble slots.
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Number of ensembles received.
    pub fn count_valid(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Number of beams of the planes.
    pub fn beams(&self) -> usize {
        self.planes().next().map_or(0, |a| a.dim().2)
    }

    /// Number of cells of the planes.
    pub fn cells(&self) -> usize {
        self.planes().next().map_or(0, |a| a.dim().0)
    }

    pub fn scalar(&self, channel: Scalar) -> Option<&Array1<f64>> {
        self.scalars.get(&channel)
    }

    pub fn triple(&self, channel: Triple) -> Option<&Array2<f64>> {
        self.triples.get(&channel)
    }

    fn planes(&self) -> impl Iterator<Item = &Array3<f64>> {
        [&self.velocity, &self.amplitude, &self.correlation]
            .into_iter()
            .flatten()
    }

    fn fill(&mut self, index: usize, sample: &Sample) {
        if index >= self.len() {
            return;
        }

        self.valid[index] = true;

        let (beams, cells) = (sample.beams, sample.cells);
        let scale = sample.velocity_scale;

        if let (Some(a), Some(v)) = (&mut self.velocity, &sample.velocity) {
            plane(a, index, beams, cells, v.iter().map(|x| f64::from(*x) * scale));
        }
        if let (Some(a), Some(v)) = (&mut self.amplitude, &sample.amplitude) {
            plane(a, index, beams, cells, v.iter().map(|x| f64::from(*x)));
        }
        if let (Some(a), Some(v)) = (&mut self.correlation, &sample.correlation) {
            plane(a, index, beams, cells, v.iter().map(|x| f64::from(*x)));
        }

        for (channel, v) in channels(sample) {
            if let Some(a) = self.scalars.get_mut(&channel) {
                a[index] = v;
            }
        }

        for (channel, v) in &sample.triples {
            if let Some(a) = self.triples.get_mut(channel) {
                for (axis, v) in v.iter().enumerate() {
                    a[[axis, index]] = *v;
                }
            }
        }
    }

    /// Derive SNR from amplitude and a per-beam noise floor.
    fn signal_to_noise(&mut self, noise: [u8; 4]) {
        let Some(amplitude) = &self.amplitude else {
            return;
        };

        self.snr = Some(Array3::from_shape_fn(amplitude.raw_dim(), |(c, e, b)| {
            match noise.get(b) {
                Some(&n) if n > 0 => 20.0 * amplitude[[c, e, b]].log10() - f64::from(n).log10(),
                _ => f64::NAN,
            }
        }));
    }
}

/// Write a beam-major plane into one ensemble of a `[cell, ensemble, beam]`
/// array.
fn plane(
    a: &mut Array3<f64>,
    index: usize,
    beams: usize,
    cells: usize,
    values: impl Iterator<Item = f64>,
) {
    if cells == 0 {
        return;
    }

    for (i, v) in values.take(beams * cells).enumerate() {
        if let Some(x) = a.get_mut([i % cells, index, i / cells]) {
            *x = v;
        }
    }
}

/// Scalar channels of a sample, with the raw counter as its ensemble number.
fn channels(sample: &Sample) -> impl Iterator<Item = (Scalar, f64)> + '_ {
    let counter = sample
        .counter
        .map(|c| (Scalar::Ensemble, f64::from(c)));

    sample.scalars.iter().copied().chain(counter)
}

/// Amplitude profiles of the single-point probe's probe checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeChecks {
    /// Indexed `[beam, sample, check]`.
    pub amplitude: Array3<f64>,
    /// Distance from the probe of each sample (mm), indexed `[sample, check]`.
    pub range: Array2<f64>,
}

impl ProbeChecks {
    const BEAMS: usize = 4;

    fn new(checks: usize) -> Self {
        Self {
            amplitude: Array3::from_elem((Self::BEAMS, PROBE_CHECK_SAMPLES, checks), f64::NAN),
            range: Array2::from_elem((PROBE_CHECK_SAMPLES, checks), f64::NAN),
        }
    }

    /// Number of probe checks.
    pub fn len(&self) -> usize {
        self.range.dim().1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fill(&mut self, index: usize, check: &ProbeCheck, sound_speed: f64) {
        if index >= self.len() {
            return;
        }

        let samples = usize::from(check.samples_per_beam).min(PROBE_CHECK_SAMPLES);

        for (beam, profile) in check.amplitude.chunks(PROBE_CHECK_SAMPLES).enumerate() {
            for (sample, a) in profile.iter().take(samples).enumerate() {
                self.amplitude[[beam, sample, index]] = f64::from(*a);
            }
        }

        for sample in 0..samples {
            self.range[[sample, index]] = probe_range(sample, sound_speed);
        }
    }
}

/// Distance to the sampled volume of a probe check sample (mm).
///
/// The receivers sit 24.3 mm to the side of and 5.7 mm above the transmitter.
/// Samples closer than the receiver offset have no defined range.
pub fn probe_range(sample: usize, sound_speed: f64) -> f64 {
    const VERTICAL: f64 = 5.7;
    const HORIZONTAL: f64 = 24.3;

    let offset = HORIZONTAL * HORIZONTAL + VERTICAL * VERTICAL;
    let total = sample as f64 * sound_speed / 1000.0;

    if total < offset.sqrt() {
        return f64::NAN;
    }

    0.5 * (total * total - offset) / (total - VERTICAL)
}

/// Decoded arrays of a file.
///
/// A file holds one family's records, so each slot receives at most one
/// record kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Velocity samples and profiles (including next-generation burst data).
    pub velocity: Option<Series>,
    /// Next-generation average data.
    pub average: Option<Series>,
    /// Velocimeter system samples.
    pub system: Option<Series>,
    /// Single-point probe boundary distances.
    pub distance: Option<Series>,
    pub probe_checks: Option<ProbeChecks>,
    /// The last single-point probe velocity header.
    pub velocity_header: Option<VelocityHeader>,
    /// The last velocimeter burst header.
    pub burst_header: Option<BurstHeader>,
    /// File information and string records, in file order.
    pub text: Vec<String>,
}

impl Dataset {
    /// The series receiving a record kind, if allocated.
    pub fn series(&self, kind: RecordKind) -> Option<&Series> {
        match kind {
            RecordKind::VectrinoVelocity
            | RecordKind::VectorVelocity
            | RecordKind::AwacProfile
            | RecordKind::AquadoppProfile
            | RecordKind::HrProfile
            | RecordKind::Burst => self.velocity.as_ref(),
            RecordKind::Average => self.average.as_ref(),
            RecordKind::VectorSystem => self.system.as_ref(),
            RecordKind::VectrinoDistance => self.distance.as_ref(),
            _ => None,
        }
        .filter(|s| s.kind == kind)
    }

    fn slot_mut(&mut self, kind: RecordKind) -> Option<&mut Option<Series>> {
        match kind {
            RecordKind::VectrinoVelocity
            | RecordKind::VectorVelocity
            | RecordKind::AwacProfile
            | RecordKind::AquadoppProfile
            | RecordKind::HrProfile
            | RecordKind::Burst => Some(&mut self.velocity),
            RecordKind::Average => Some(&mut self.average),
            RecordKind::VectorSystem => Some(&mut self.system),
            RecordKind::VectrinoDistance => Some(&mut self.distance),
            _ => None,
        }
    }

    /// Allocate every array counted in the first pass.
    pub(crate) fn allocate(census: &Census) -> Self {
        let mut dataset = Self::default();

        for (&kind, extent) in &census.extents {
            debug!(
                "Allocating {} ensembles of {} ({} beams, {} cells).",
                extent.ensembles,
                kind.name(),
                extent.beams,
                extent.cells,
            );

            if let Some(slot) = dataset.slot_mut(kind) {
                *slot = Some(extent.allocate(kind));
            }
        }

        if census.probe_checks > 0 {
            dataset.probe_checks = Some(ProbeChecks::new(census.probe_checks));
        }

        dataset
    }

    /// Derive channels depending on more than one record.
    pub(crate) fn finish(&mut self) {
        let noise = self
            .velocity_header
            .as_ref()
            .map(|h| h.noise_amplitude)
            .or(self.burst_header.as_ref().map(|h| h.noise_amplitude));

        if let (Some(series), Some(noise)) = (&mut self.velocity, noise) {
            series.signal_to_noise(noise);
        }
    }

    fn sound_speed(&self) -> f64 {
        self.velocity_header
            .as_ref()
            .map(|h| h.sound_speed)
            .filter(|s| *s > 0.0)
            .unwrap_or(DEFAULT_SOUND_SPEED)
    }
}

impl Receiver for Dataset {
    fn add_record(&mut self, frame: &Frame, index: Option<usize>, record: &Record) {
        match (record, index) {
            (Record::Sample(sample), Some(index)) => {
                if let Some(series) = self.slot_mut(frame.kind).and_then(Option::as_mut) {
                    series.fill(index, sample);
                }
            }
            (Record::ProbeCheck(check), Some(index)) => {
                let sound_speed = self.sound_speed();

                if let Some(checks) = &mut self.probe_checks {
                    checks.fill(index, check, sound_speed);
                }
            }
            (Record::VelocityHeader(header), _) => self.velocity_header = Some(header.clone()),
            (Record::BurstHeader(header), _) => self.burst_header = Some(header.clone()),
            (Record::Text(text), _) => self.text.push(text.clone()),
            _ => {}
        }
    }
}

/// Dimensions of one record kind's series, gathered in the first pass.
#[derive(Debug, Clone, Default)]
struct Extent {
    ensembles: usize,
    beams: usize,
    cells: usize,
    velocity: bool,
    amplitude: bool,
    correlation: bool,
    scalars: BTreeSet<Scalar>,
    triples: BTreeSet<Triple>,
}

impl Extent {
    fn add(&mut self, index: usize, sample: &Sample) {
        self.ensembles = self.ensembles.max(index + 1);
        self.beams = self.beams.max(sample.beams);
        self.cells = self.cells.max(sample.cells);

        self.velocity |= sample.velocity.is_some();
        self.amplitude |= sample.amplitude.is_some();
        self.correlation |= sample.correlation.is_some();

        self.scalars.extend(channels(sample).map(|(c, _)| c));
        self.triples.extend(sample.triples.iter().map(|(c, _)| *c));
    }

    fn allocate(&self, kind: RecordKind) -> Series {
        let n = self.ensembles;
        let plane = |present: bool| {
            present.then(|| Array3::from_elem((self.cells, n, self.beams), f64::NAN))
        };

        Series {
            kind,
            valid: Array1::from_elem(n, false),
            velocity: plane(self.velocity),
            amplitude: plane(self.amplitude),
            correlation: plane(self.correlation),
            snr: None,
            scalars: self
                .scalars
                .iter()
                .map(|c| (*c, Array1::from_elem(n, f64::NAN)))
                .collect(),
            triples: self
                .triples
                .iter()
                .map(|c| (*c, Array2::from_elem((3, n), f64::NAN)))
                .collect(),
        }
    }
}

/// Beam description of the first next-generation data record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub offset: usize,
    pub beams: usize,
    pub physical_beams: Vec<u8>,
    pub orientation: Option<u8>,
}

/// First-pass receiver: counts ensembles and collects diagnostics.
#[derive(Debug, Clone, Default)]
pub(crate) struct Census {
    extents: BTreeMap<RecordKind, Extent>,
    probe_checks: usize,
    pub geometry: Option<Geometry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Receiver for Census {
    fn add_record(&mut self, frame: &Frame, index: Option<usize>, record: &Record) {
        match (record, index) {
            (Record::Sample(sample), Some(index)) => {
                self.extents
                    .entry(frame.kind)
                    .or_default()
                    .add(index, sample);

                if matches!(frame.kind, RecordKind::Burst | RecordKind::Average)
                    && self.geometry.is_none()
                {
                    self.geometry = Some(Geometry {
                        offset: frame.offset,
                        beams: sample.beams,
                        physical_beams: sample.physical_beams.clone(),
                        orientation: sample.orientation,
                    });
                }
            }
            (Record::ProbeCheck(_), Some(index)) => {
                self.probe_checks = self.probe_checks.max(index + 1);
            }
            _ => {}
        }
    }

    fn add_diagnostic(&mut self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::ChecksumMismatch { .. } => warn!("{diagnostic}"),
            Diagnostic::TruncatedRecord { .. } => info!("{diagnostic}"),
            _ => debug!("{diagnostic}"),
        }

        self.diagnostics.push(diagnostic.clone());
    }
}
