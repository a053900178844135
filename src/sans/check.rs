//! Helpers for computing and verifying record checksums.
//!
//! Every record (including the three configuration blocks) ends in a 16-bit
//! checksum: the sum of the record's little-endian words, excluding the
//! checksum itself, added to [`SEED`] modulo 65536.

use thiserror::Error;

/// Initial value of every checksum accumulation.
pub const SEED: u16 = 0xB58C;

/// An error verifying a checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChecksumError {
    /// Calculated and found checksum values do not match.
    #[error("Calculated ({calculated:#06x}) and found ({found:#06x}) checksum values do not match.")]
    Mismatch { found: u16, calculated: u16 },
    /// The span cannot hold a whole number of words and a trailing checksum.
    #[error("Span of {0} bytes is not a whole number of words ending in a checksum.")]
    Length(usize),
}

/// Accumulate a slice of bytes into a checksum value.
///
/// Bytes are summed as little-endian words. A trailing odd byte is added as
/// the high byte of a final word.
pub fn compute_checksum(init: u16, r: &[u8]) -> u16 {
    r.chunks(2).fold(init, |acc, w| {
        let word = match *w {
            [lo, hi] => u16::from_le_bytes([lo, hi]),
            [hi] => u16::from(hi) << 8,
            _ => 0,
        };

        acc.wrapping_add(word)
    })
}

/// Verify a record whose last two bytes hold its checksum.
///
/// Returns the calculated checksum on success.
pub fn verify(r: &[u8]) -> Result<u16, ChecksumError> {
    let (body, found) = split(r)?;
    verify_with(body, found)
}

/// Verify a span against a checksum stored elsewhere.
pub fn verify_with(body: &[u8], found: u16) -> Result<u16, ChecksumError> {
    let calculated = compute_checksum(SEED, body);

    if found != calculated {
        Err(ChecksumError::Mismatch { found, calculated })?;
    }

    Ok(calculated)
}

/// Overwrite the last two bytes of a record with its checksum.
///
/// Returns the written checksum.
pub fn seal(r: &mut [u8]) -> Result<u16, ChecksumError> {
    let n = r.len();
    split(r)?;

    let calculated = compute_checksum(SEED, &r[..n - 2]);
    r[n - 2..].copy_from_slice(&calculated.to_le_bytes());

    Ok(calculated)
}

fn split(r: &[u8]) -> Result<(&[u8], u16), ChecksumError> {
    let n = r.len();

    if n < 2 || n % 2 != 0 {
        Err(ChecksumError::Length(n))?;
    }

    let (body, tail) = r.split_at(n - 2);
    Ok((body, u16::from_le_bytes([tail[0], tail[1]])))
}
