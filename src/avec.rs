//! Convenience interfaces for decoding whole files.
//!
//! The functions in this module decode a file in two passes over the same
//! bytes. The first pass counts ensembles and collects diagnostics, the
//! arrays of a [`Dataset`] are then allocated once, and the second pass fills
//! them. Both passes publish decoded records to the [`Receiver`] trait.

pub mod arrays;
pub mod reader;
pub mod slice;

pub use arrays::{Dataset, ProbeChecks, Series};
pub use reader::{decode as decode_reader, decode_path};
pub use slice::{InstrumentFile, decode as decode_slice, publish};

use crate::sans::{
    frame::{Diagnostic, Frame},
    record::Record,
    transform::{AD2CP_GEOMETRY, BeamVector, Orientation},
};

/// Options adjusting how a file is decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    /// Mounting orientation, overriding any the instrument reports.
    pub orientation: Option<Orientation>,
    /// Beam directions used when no calibration matrix is embedded.
    pub geometry: Vec<BeamVector>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            orientation: None,
            geometry: AD2CP_GEOMETRY.to_vec(),
        }
    }
}

impl DecodeOptions {
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_geometry(mut self, geometry: impl Into<Vec<BeamVector>>) -> Self {
        self.geometry = geometry.into();
        self
    }
}

/// Receive the records of a file.
///
/// Records are published in file order, once per pass. Ensemble-bearing
/// records carry their reconstructed ensemble index.
///
/// The default implementation of [`add_diagnostic`](Receiver::add_diagnostic)
/// ignores diagnostics.
pub trait Receiver {
    /// Add a decoded record.
    fn add_record(&mut self, frame: &Frame, index: Option<usize>, record: &Record);
    /// Add a condition met while scanning.
    fn add_diagnostic(&mut self, _: &Diagnostic) {}
}
