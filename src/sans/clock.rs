//! Instrument clock encodings.

use chrono::{NaiveDate, NaiveDateTime};

/// Decode a packed binary-coded decimal byte.
pub fn bcd(b: u8) -> Option<u8> {
    let (hi, lo) = (b >> 4, b & 0x0F);

    if hi > 9 || lo > 9 {
        return None;
    }

    Some(hi * 10 + lo)
}

/// Decode the six-byte BCD clock carried by classic records and the user
/// configuration block.
///
/// Bytes are ordered minute, second, day, hour, year (since 2000), month.
pub fn bcd_clock(r: [u8; 6]) -> Option<NaiveDateTime> {
    let [minute, second, day, hour, year, month] = r.map(bcd);

    NaiveDate::from_ymd_opt(2000 + i32::from(year?), u32::from(month?), u32::from(day?))?
        .and_hms_opt(u32::from(hour?), u32::from(minute?), u32::from(second?))
}

/// Build a timestamp from the binary calendar fields of next-generation
/// records.
///
/// The year counts from 1900 and the month from zero.
pub fn calendar(
    year: u8,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1900 + i32::from(year), u32::from(month) + 1, u32::from(day))?
        .and_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros)
}

/// Convert a timestamp to fractional seconds since the Unix epoch.
pub fn seconds(t: NaiveDateTime) -> f64 {
    t.and_utc().timestamp_micros() as f64 / 1e6
}
