#![allow(dead_code)]

use nortek_decode::sans::check::{SEED, compute_checksum, seal};

pub const SYNC: u8 = 0xA5;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn put_u16(r: &mut [u8], offset: usize, v: u16) {
    r[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_i16(r: &mut [u8], offset: usize, v: i16) {
    r[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u32(r: &mut [u8], offset: usize, v: u32) {
    r[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

/// A sealed record of `len` bytes, with its size in words after the type.
fn record(id: u8, len: usize, f: impl FnOnce(&mut [u8])) -> Vec<u8> {
    let mut r = vec![0; len];
    r[0] = SYNC;
    r[1] = id;
    put_u16(&mut r, 2, (len / 2) as u16);
    f(&mut r);
    seal(&mut r).unwrap();
    r
}

/// Adjust a free byte until the checksum of a sealed record holds no sync
/// value, so scanning from inside it never finds a false sync.
fn clear_sync(mut r: Vec<u8>, free: usize) -> Vec<u8> {
    let n = r.len();
    while r[n - 2..].contains(&SYNC) {
        r[free] = r[free].wrapping_add(1);
        seal(&mut r).unwrap();
    }
    r
}

pub fn hardware(serial: &str, high_resolution: bool) -> Vec<u8> {
    record(0x05, 48, |r| {
        r[4..4 + serial.len()].copy_from_slice(serial.as_bytes());
        put_u16(r, 18, 0b11);
        put_u16(r, 20, 2000);
        if high_resolution {
            r[30..32].copy_from_slice(&[0x67, 0x67]);
        }
        r[42..46].copy_from_slice(b"3.37");
    })
}

pub fn head(beams: u16, matrix: &[i16]) -> Vec<u8> {
    record(0x04, 224, |r| {
        put_u16(r, 4, 0b0111);
        put_u16(r, 6, 2000);
        r[10..16].copy_from_slice(b"A1234 ");
        for (i, w) in matrix.iter().enumerate() {
            put_i16(r, 30 + 2 * i, *w);
        }
        put_u16(r, 198, 20);
        put_u16(r, 220, beams);
    })
}

/// User configuration settings written by [`User::block`].
#[derive(Debug, Clone)]
pub struct User {
    pub beams: u16,
    pub cells: u16,
    pub average_interval: u16,
    pub t5: u16,
    pub timing: u16,
    pub power: u16,
    pub coordinate_system: u16,
    pub mode: u16,
    pub software_version: u16,
    pub samples_per_burst: u16,
}

impl Default for User {
    fn default() -> Self {
        Self {
            beams: 3,
            cells: 1,
            average_interval: 100,
            t5: 0,
            timing: 0,
            power: 0,
            coordinate_system: 2,
            mode: 0,
            software_version: 31702,
            samples_per_burst: 0,
        }
    }
}

impl User {
    pub fn block(&self) -> Vec<u8> {
        record(0x00, 512, |r| {
            put_u16(r, 12, self.t5);
            put_u16(r, 16, self.average_interval);
            put_u16(r, 18, self.beams);
            put_u16(r, 20, self.timing);
            put_u16(r, 22, self.power);
            put_u16(r, 32, self.coordinate_system);
            put_u16(r, 34, self.cells);
            r[40..44].copy_from_slice(b"TEST");
            // Deployment start 2015-06-17 12:30:45.
            r[48..54].copy_from_slice(&[0x30, 0x45, 0x17, 0x12, 0x15, 0x06]);
            put_u16(r, 58, self.mode);
            put_u16(r, 72, self.software_version);
            put_u16(r, 452, self.samples_per_burst);
            put_u16(r, 480, 150);
            put_u16(r, 482, 300);
        })
    }
}

/// Three configuration blocks followed by data records.
pub fn classic(
    serial: &str,
    high_resolution: bool,
    head: &[u8],
    user: &User,
    records: &[Vec<u8>],
) -> Vec<u8> {
    let mut r = hardware(serial, high_resolution);
    r.extend_from_slice(head);
    r.extend(user.block());
    for record in records {
        r.extend_from_slice(record);
    }
    r
}

/// Offset of the first data record of a classic file.
pub const DATA: usize = 48 + 224 + 512;

/// Rows of a unit calibration matrix, scaled by 4096.
pub fn identity(n: usize) -> Vec<i16> {
    (0..n * n)
        .map(|i| if i / n == i % n { 4096 } else { 0 })
        .collect()
}

pub fn vectrino_velocity(count: u8, velocity: [i16; 4], amplitude: [u8; 4]) -> Vec<u8> {
    let mut r = vec![0; 22];
    r[0] = SYNC;
    r[1] = 0x51;
    r[3] = count;
    for (i, v) in velocity.iter().enumerate() {
        put_i16(&mut r, 4 + 2 * i, *v);
    }
    r[12..16].copy_from_slice(&amplitude);
    r[16..20].copy_from_slice(&[90, 91, 92, 93]);
    seal(&mut r).unwrap();
    clear_sync(r, 2)
}

pub fn vectrino_header(noise: [u8; 4], sound_speed: u16) -> Vec<u8> {
    record(0x50, 42, |r| {
        put_u16(r, 4, 715);
        r[12..16].copy_from_slice(&noise);
        put_i16(r, 20, 1850);
        put_u16(r, 22, sound_speed);
    })
}

pub fn probe_check(amplitude: u8) -> Vec<u8> {
    record(0x07, 2064, |r| {
        put_u16(r, 4, 512);
        put_u16(r, 6, 1);
        r[14..14 + 4 * 512].fill(amplitude);
    })
}

pub fn vectrino_distance(distance: u16) -> Vec<u8> {
    record(0x02, 16, |r| {
        put_i16(r, 4, 1850);
        put_u16(r, 6, 14800);
        put_u16(r, 8, distance);
        put_u16(r, 10, 1);
    })
}

pub fn file_info(text: &str) -> Vec<u8> {
    record(0x0F, 26, |r| {
        r[10..10 + text.len()].copy_from_slice(text.as_bytes());
    })
}

pub fn vector_velocity(count: u8, velocity: [i16; 3]) -> Vec<u8> {
    let mut r = vec![0; 24];
    r[0] = SYNC;
    r[1] = 0x10;
    r[3] = count;
    r[4] = 1;
    put_u16(&mut r, 6, 2345);
    for (i, v) in velocity.iter().enumerate() {
        put_i16(&mut r, 10 + 2 * i, *v);
    }
    r[16..19].copy_from_slice(&[120, 121, 122]);
    r[19..22].copy_from_slice(&[80, 81, 82]);
    seal(&mut r).unwrap();
    clear_sync(r, 2)
}

pub fn vector_system(heading: i16) -> Vec<u8> {
    record(0x11, 28, |r| {
        r[4..10].copy_from_slice(&[0x30, 0x45, 0x17, 0x12, 0x15, 0x06]);
        put_u16(r, 10, 132);
        put_u16(r, 12, 15000);
        put_i16(r, 14, heading);
    })
}

pub fn vector_header(noise: [u8; 4]) -> Vec<u8> {
    record(0x12, 42, |r| {
        r[4..10].copy_from_slice(&[0x30, 0x45, 0x17, 0x12, 0x15, 0x06]);
        put_u16(r, 10, 4);
        r[12..16].copy_from_slice(&noise);
    })
}

/// A classic profile record (`0x20` or `0x21`) of velocity and amplitude.
pub fn profile(id: u8, beams: usize, cells: usize, velocity: i16, heading: i16) -> Vec<u8> {
    let n = beams * cells;
    let len = 30 + 3 * n + n % 2 + 2;

    let r = record(id, len, |r| {
        r[4..10].copy_from_slice(&[0x30, 0x45, 0x17, 0x12, 0x15, 0x06]);
        put_u16(r, 16, 15000);
        put_i16(r, 18, heading);
        r[24] = 1;
        put_u16(r, 26, 2345);
        put_i16(r, 28, 1850);
        for i in 0..n {
            put_i16(r, 30 + 2 * i, velocity);
            r[30 + 2 * n + i] = 100;
        }
    });

    // Analog input 1 is free.
    clear_sync(r, 12)
}

/// A high-resolution profile record.
pub fn hr_profile(beams: u8, cells: u8, velocity: i16) -> Vec<u8> {
    let (b, n) = (usize::from(beams), usize::from(beams) * usize::from(cells));
    let len = 44 + 4 * b + 4 * n;

    let r = record(0x2A, len, |r| {
        r[4..10].copy_from_slice(&[0x30, 0x45, 0x17, 0x12, 0x15, 0x06]);
        put_u16(r, 10, 250);
        put_u16(r, 16, 15000);
        r[34] = beams;
        r[35] = cells;
        let data = 36 + 4 * b + 6;
        for i in 0..n {
            put_i16(r, data + 2 * i, velocity);
            r[data + 2 * n + i] = 110;
            r[data + 3 * n + i] = 70;
        }
    });

    // The first reserved byte is free.
    clear_sync(r, 36 + 4 * b)
}

/// Settings of a version 3 next-generation data record.
#[derive(Debug, Clone)]
pub struct Ad2cp {
    pub id: u8,
    pub beams: u8,
    pub cells: u16,
    pub physical_beams: [u8; 5],
    pub orientation: u8,
    pub velocity: i16,
    pub exponent: i8,
    pub ensemble: u32,
}

impl Default for Ad2cp {
    fn default() -> Self {
        Self {
            id: 0x15,
            beams: 4,
            cells: 2,
            physical_beams: [1, 2, 3, 4, 0],
            orientation: 5,
            velocity: 500,
            exponent: -3,
            ensemble: 0,
        }
    }
}

impl Ad2cp {
    pub const HEADER: usize = 76;

    pub fn data(&self) -> Vec<u8> {
        let n = usize::from(self.beams) * usize::from(self.cells);
        let mut r = vec![0; Self::HEADER + 4 * n];

        r[0] = 3;
        r[1] = Self::HEADER as u8;
        put_u16(&mut r, 2, 0b1110_0000);
        put_u32(&mut r, 4, 100123);
        // 2024-01-15 08:30:00.5
        r[8..14].copy_from_slice(&[124, 0, 15, 8, 30, 0]);
        put_u16(&mut r, 14, 5000);
        put_u16(&mut r, 16, 15000);
        put_i16(&mut r, 18, 1850);
        put_u32(&mut r, 20, 10250);
        put_u16(&mut r, 24, 9000);
        put_u16(
            &mut r,
            30,
            self.cells | (2 << 10) | (u16::from(self.beams) << 12),
        );
        put_i16(&mut r, 46, 0);
        put_i16(&mut r, 48, 0);
        put_i16(&mut r, 50, 16384);

        let [a, b, c, d, e] = self.physical_beams.map(u16::from);
        put_u16(&mut r, 54, a | b << 3 | c << 6 | d << 9 | e << 12);

        r[58] = self.exponent as u8;
        put_u32(&mut r, 68, u32::from(self.orientation) << 25);
        put_u32(&mut r, 72, self.ensemble);

        for i in 0..n {
            put_i16(&mut r, Self::HEADER + 2 * i, self.velocity);
            r[Self::HEADER + 2 * n + i] = 100;
            r[Self::HEADER + 3 * n + i] = 80;
        }

        r
    }

    pub fn record(&self) -> Vec<u8> {
        framed(self.id, &self.data())
    }
}

/// Frame a next-generation data section behind a sealed record header.
pub fn framed(id: u8, data: &[u8]) -> Vec<u8> {
    let mut r = vec![SYNC, 10, id, 0x10];
    r.extend((data.len() as u16).to_le_bytes());
    r.extend(compute_checksum(SEED, data).to_le_bytes());
    r.extend([0, 0]);
    seal(&mut r).unwrap();
    r.extend_from_slice(data);
    r
}

/// A next-generation string record.
pub fn ad2cp_text(text: &str) -> Vec<u8> {
    let mut data = vec![0x10];
    data.extend_from_slice(text.as_bytes());
    data.push(0);
    framed(0xA0, &data)
}
