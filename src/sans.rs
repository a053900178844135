//! I/O-free building blocks for implementing decoders.
//!
//! This module is intended for applications that need fine control over
//! decoder internals. See [`crate::avec`] for the two-pass decoder covering
//! whole files.
//!
//! # Architecture
//!
//! A file is decoded in stages, each owning one concern:
//!
//! - [`config`] decodes the hardware, head, and user configuration blocks of
//! classic files and identifies the instrument family.
//!
//! - [`record`] maps a family's type identifiers to record kinds and sizes,
//! and decodes framed records into typed values.
//!
//! - [`layout`] builds the field table of variable-shape records from beam
//! count, cell count, protocol version, and the planes present.
//!
//! - [`frame`] walks a byte slice, finding sync bytes, dispatching on type
//! identifiers, verifying checksums, and resynchronizing after corruption.
//!
//! - [`ensemble`] reconstructs monotonic ensemble indices from wrapping
//! per-record counters.
//!
//! - [`transform`] derives beam, XYZ, and ENU transform matrices.
//!
//! Every stage is deterministic, so two passes over the same bytes produce
//! identical frames. The checksum helpers in [`check`] are shared by all.

pub mod check;
pub mod clock;
pub mod config;
pub mod ensemble;
pub mod frame;
pub mod layout;
pub mod record;
pub mod transform;

/// Marker byte preceding every record's type identifier.
pub const SYNC: u8 = 0xA5;
