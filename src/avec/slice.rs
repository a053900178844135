//! Slice-based decoder implementation.

use std::collections::HashMap;

use either::Either::{self, Left, Right};
use log::debug;
use thiserror::Error;

use crate::sans::{
    SYNC,
    config::{self, Block, ConfigError, Configuration, Family},
    ensemble::EnsembleCounter,
    frame::{Diagnostic, Event, Framer, ShapeCache},
    record::{self, AD2CP_FAMILY, AD2CP_HEADER_LEN, DispatchTable, Record, RecordKind},
    transform::{CoordinateTransform, Orientation, TransformError},
};

use super::{
    DecodeOptions, Receiver,
    arrays::{Census, Dataset, Geometry},
};

/// Errors occurring while decoding from a slice.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration blocks could not be decoded.
    #[error("Incorrect configuration: {0}")]
    Config(#[from] ConfigError),
}

/// A coordinate transform that could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No coordinate transform from offset {offset}: {source}")]
pub struct TransformFailure {
    /// Offset of the block or record the transform was built from.
    pub offset: usize,
    pub source: TransformError,
}

/// A decoded file.
#[derive(Debug, Clone)]
pub struct InstrumentFile {
    pub family: Family,
    /// File size in bytes.
    pub size: usize,
    /// Configuration blocks, absent for next-generation files.
    pub configuration: Option<Configuration>,
    pub dataset: Dataset,
    pub transform: Result<CoordinateTransform, TransformFailure>,
    /// Conditions met while scanning, in file order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Decode a file held in a slice.
///
/// Only a missing, corrupt, or unrecognized configuration is fatal. Corrupt,
/// unrecognized, and truncated data records are reported in
/// [`InstrumentFile::diagnostics`], keeping every ensemble decoded before
/// them.
///
/// This method is also re-exported as `nortek_decode::avec::decode_slice`.
pub fn decode(r: &[u8], options: &DecodeOptions) -> Result<InstrumentFile, Error> {
    let (configuration, start) = begin(r)?;
    let (family, table, scaling) = dispatch(configuration.as_ref());

    debug!("Counting {} records from offset {start}.", family.name());

    let mut census = Census::default();
    let shapes = scan(r, start, table, ShapeCache::new(), scaling, &mut census);

    let mut dataset = Dataset::allocate(&census);

    debug!("Filling {} records from offset {start}.", family.name());

    scan(r, start, table, shapes, scaling, &mut dataset);
    dataset.finish();

    let transform = match &configuration {
        Some(c) => CoordinateTransform::from_calibration(
            c.head.transformation_matrix.as_ref(),
            options.orientation,
        )
        .map_err(|source| TransformFailure {
            offset: c.block_offset(Block::Head),
            source,
        }),
        None => geometric(census.geometry.as_ref(), start, options),
    };

    Ok(InstrumentFile {
        family,
        size: r.len(),
        configuration,
        dataset,
        transform,
        diagnostics: census.diagnostics,
    })
}

/// Decode the records of a file in a single pass, publishing to a receiver.
///
/// Returns the file's configuration, absent for next-generation files.
pub fn publish(r: &[u8], o: &mut impl Receiver) -> Result<Option<Configuration>, Error> {
    let (configuration, start) = begin(r)?;
    let (_, table, scaling) = dispatch(configuration.as_ref());

    scan(r, start, table, ShapeCache::new(), scaling, o);

    Ok(configuration)
}

/// Decode any configuration, returning it with the offset of the first data
/// record.
fn begin(r: &[u8]) -> Result<(Option<Configuration>, usize), ConfigError> {
    Ok(match detect(r)? {
        Left(configuration) => {
            let end = configuration.end;
            (Some(configuration), end)
        }
        Right(start) => (None, start),
    })
}

/// Derive the family, dispatch table, and velocity scaling (mm/s per count)
/// of a file.
fn dispatch(configuration: Option<&Configuration>) -> (Family, DispatchTable, f64) {
    let family = configuration.map_or(Family::Ad2cp, |c| c.family);
    let user = configuration.map(|c| &c.user);

    (
        family,
        DispatchTable::new(family, user),
        user.map_or(1.0, |u| u.velocity_scaling),
    )
}

/// Find where data records begin: after the configuration blocks of a classic
/// file, or at the first record header of a next-generation file.
fn detect(r: &[u8]) -> Result<Either<Configuration, usize>, ConfigError> {
    let classic = r
        .windows(2)
        .position(|w| w == [SYNC, Block::Hardware.id()]);

    let ad2cp = r.windows(4).position(|w| {
        w[0] == SYNC
            && usize::from(w[1]) == AD2CP_HEADER_LEN
            && RecordKind::from_ad2cp(w[2]).is_some()
            && w[3] == AD2CP_FAMILY
    });

    Ok(match (classic, ad2cp) {
        (Some(c), Some(a)) if a < c => Right(a),
        (None, Some(a)) => Right(a),
        _ => Left(config::decode(r)?),
    })
}

/// Run one pass over the records of a file, publishing to a receiver.
///
/// Returns the layouts built, for reuse by a later pass.
fn scan(
    r: &[u8],
    start: usize,
    table: DispatchTable,
    shapes: ShapeCache,
    scaling: f64,
    o: &mut impl Receiver,
) -> ShapeCache {
    let mut counters: HashMap<RecordKind, EnsembleCounter> = HashMap::new();
    let mut framer = Framer::with_shapes(r, start, table, shapes);

    for event in framer.by_ref() {
        let frame = match event {
            Event::Record(frame) => frame,
            Event::Diagnostic(diagnostic) => {
                o.add_diagnostic(&diagnostic);
                continue;
            }
        };

        let record = match record::decode(frame.kind, frame.bytes, frame.layout.as_ref(), scaling) {
            Ok(record) => record,
            Err(source) => {
                o.add_diagnostic(&Diagnostic::MalformedRecord {
                    offset: frame.offset,
                    source,
                });
                continue;
            }
        };

        // Only ensemble-bearing records advance a counter.
        let counter = match &record {
            Record::Sample(sample) => Some(sample.counter),
            Record::ProbeCheck(_) => Some(None),
            _ => None,
        };

        let index = counter.map(|raw| {
            counters
                .entry(frame.kind)
                .or_insert_with(|| EnsembleCounter::new(frame.kind.counter_rule()))
                .advance(raw)
        });

        o.add_record(&frame, index, &record);
    }

    framer.into_shapes()
}

/// Build a next-generation transform from the beams of its first data record.
fn geometric(
    geometry: Option<&Geometry>,
    start: usize,
    options: &DecodeOptions,
) -> Result<CoordinateTransform, TransformFailure> {
    let Some(geometry) = geometry else {
        return Err(TransformFailure {
            offset: start,
            source: TransformError::BeamCount(0),
        });
    };

    let fail = |source| TransformFailure {
        offset: geometry.offset,
        source,
    };

    let orientation = match (options.orientation, geometry.orientation) {
        (Some(o), _) => Some(o),
        (None, Some(code)) => Some(Orientation::from_status(code).map_err(fail)?),
        (None, None) => None,
    };

    // Without a dataset description, data beams are taken to be the first
    // physical beams in order.
    let beams: Vec<u8> = if geometry.physical_beams.is_empty() {
        (1..=u8::try_from(geometry.beams).unwrap_or(u8::MAX)).collect()
    } else {
        geometry.physical_beams.clone()
    };

    CoordinateTransform::from_geometry(&options.geometry, &beams, orientation).map_err(fail)
}
