//! Reader-based decoder implementation.
//!
//! Both passes run over the same bytes, so the reader is drained into memory
//! once before decoding.

use std::{fs::File, io::Read, path::Path};

use log::debug;
use thiserror::Error;

use super::{DecodeOptions, slice};

/// Errors occurring while decoding from a reader.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the supplied reader.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An error decoding the bytes read.
    #[error(transparent)]
    Decode(#[from] slice::Error),
}

/// Decode a file from a reader.
///
/// This method is also re-exported as `nortek_decode::avec::decode_reader`.
pub fn decode(r: &mut impl Read, options: &DecodeOptions) -> Result<slice::InstrumentFile, Error> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;

    debug!("Read {} bytes.", buf.len());

    Ok(slice::decode(&buf, options)?)
}

/// Decode the file at a path.
pub fn decode_path(
    path: impl AsRef<Path>,
    options: &DecodeOptions,
) -> Result<slice::InstrumentFile, Error> {
    let path = path.as_ref();
    debug!("Decoding {}.", path.display());

    decode(&mut File::open(path)?, options)
}
