//! A two-pass decoder for Nortek current profiler and velocimeter data files.
//!
//! Nortek-decode reads the binary files recorded by single-point probes and
//! velocimeters (Vectrino, Vector), profiling current meters (Aquadopp
//! profiler, HR profiler, AWAC), and next-generation multi-beam profilers
//! (AD2CP), producing dense arrays indexed by cell, ensemble, and beam.
//!
//! Most users should begin with the functions in the [`avec`] module, which
//! decode a whole file from a slice, a reader, or a path. If these prove
//! insufficient, the framer, layout builder, and record decoders they are
//! built from are exposed in the [`sans`] module.

pub mod avec;
pub mod sans;
