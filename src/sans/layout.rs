//! Runtime construction of variable-shape record layouts.
//!
//! Profile records of the current meters, the high-resolution profiler, and
//! the next-generation profiler have no static layout. Their shape follows
//! from beam count, cell count, a protocol version selecting the fixed
//! header, and a mask of the data planes present. The builders in this
//! module are pure: equal keys always produce equal shapes, so a shape is
//! built once per file and reused for every record.

use tartan_bitfield::bitfield;
use thiserror::Error;

/// Name of a field within a record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    Sync,
    Id,
    Size,
    Clock,
    Milliseconds,
    Error,
    Analog1,
    Analog2,
    Battery,
    SoundSpeed,
    Heading,
    Pitch,
    Roll,
    PressureMsb,
    Status,
    PressureLsw,
    Temperature,
    Beams,
    Cells,
    VelocityLag2,
    AmplitudeLag2,
    CorrelationLag2,
    Fill,
    Checksum,

    Version,
    OffsetToData,
    Serial,
    Configuration,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Subseconds,
    Pressure,
    CellsCoordinatesBeams,
    CellSize,
    Blanking,
    VelocityRange,
    VelocityScaling,
    PowerLevel,
    MagnetometerX,
    MagnetometerY,
    MagnetometerZ,
    AccelerometerX,
    AccelerometerY,
    AccelerometerZ,
    Ambiguity,
    DatasetDescription,
    TransmitEnergy,
    MagnetometerTemperature,
    RtcTemperature,
    Ensemble,

    Velocity,
    Amplitude,
    Correlation,

    Reserved,
}

/// Storage type of a field element (all multi-byte types are little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    /// Six-byte BCD clock.
    Bcd,
}

impl FieldType {
    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 => 4,
            FieldType::Bcd => 6,
        }
    }

    fn read(self, r: &[u8]) -> Option<i64> {
        Some(match self {
            FieldType::U8 => i64::from(*r.first()?),
            FieldType::I8 => i64::from(*r.first()? as i8),
            FieldType::U16 => i64::from(u16::from_le_bytes(r.get(..2)?.try_into().ok()?)),
            FieldType::I16 => i64::from(i16::from_le_bytes(r.get(..2)?.try_into().ok()?)),
            FieldType::U32 => i64::from(u32::from_le_bytes(r.get(..4)?.try_into().ok()?)),
            FieldType::Bcd => None?,
        })
    }
}

/// A named, typed run of elements at a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: FieldName,
    pub offset: usize,
    pub ty: FieldType,
    pub count: usize,
}

impl Field {
    /// Width of the whole field in bytes.
    pub fn width(&self) -> usize {
        self.ty.size() * self.count
    }

    /// Offset of the first byte following the field.
    pub fn end(&self) -> usize {
        self.offset + self.width()
    }
}

/// Ordered field table of a record, with its total length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    fields: Vec<Field>,
    len: usize,
}

impl RecordShape {
    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: FieldName) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Read the first element of a numeric field.
    pub fn get(&self, name: FieldName, r: &[u8]) -> Option<i64> {
        let f = self.field(name)?;
        f.ty.read(r.get(f.offset..f.end())?)
    }

    /// Borrow the raw bytes of a field.
    pub fn bytes<'a>(&self, name: FieldName, r: &'a [u8]) -> Option<&'a [u8]> {
        let f = self.field(name)?;
        r.get(f.offset..f.end())
    }

    /// Iterate the elements of a numeric field.
    pub fn values<'a>(&self, name: FieldName, r: &'a [u8]) -> Option<Values<'a>> {
        let f = self.field(name)?;

        if f.ty == FieldType::Bcd {
            return None;
        }

        Some(Values {
            r: r.get(f.offset..f.end())?,
            ty: f.ty,
        })
    }
}

/// Iterator over the elements of a field.
#[derive(Debug, Clone)]
pub struct Values<'a> {
    r: &'a [u8],
    ty: FieldType,
}

impl Iterator for Values<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let value = self.ty.read(self.r)?;
        self.r = &self.r[self.ty.size()..];
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.r.len() / self.ty.size();
        (n, Some(n))
    }
}

impl ExactSizeIterator for Values<'_> {}

/// Data planes present in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Planes {
    pub velocity: bool,
    pub amplitude: bool,
    pub correlation: bool,
}

impl Planes {
    /// Velocity and amplitude, as carried by classic profile records.
    pub const PROFILE: Self = Self {
        velocity: true,
        amplitude: true,
        correlation: false,
    };

    /// All three planes.
    pub const ALL: Self = Self {
        velocity: true,
        amplitude: true,
        correlation: true,
    };
}

/// Family of record shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Current meter and wave profiler profile records.
    Profile,
    /// High-resolution profile records.
    HighResolution,
    /// Next-generation data sections, by header version. The data block
    /// starts at `data_offset`, or directly after the header when zero.
    Ad2cp { version: u8, data_offset: u16 },
}

/// Inputs fully determining a record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub format: Format,
    pub beams: u8,
    pub cells: u16,
    pub planes: Planes,
}

impl ShapeKey {
    pub fn profile(beams: u8, cells: u16) -> Self {
        Self {
            format: Format::Profile,
            beams,
            cells,
            planes: Planes::PROFILE,
        }
    }

    pub fn high_resolution(beams: u8, cells: u16) -> Self {
        Self {
            format: Format::HighResolution,
            beams,
            cells,
            planes: Planes::ALL,
        }
    }
}

/// An error building a record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// No header shape exists for this protocol version.
    #[error("Unsupported protocol version ({0}).")]
    UnsupportedVersion(u8),
    /// Beam or cell count cannot describe a data block.
    #[error("Invalid dimensions ({beams} beams, {cells} cells).")]
    Dimensions { beams: u8, cells: u16 },
    /// The data block would begin inside the fixed header.
    #[error("Data offset ({0}) falls inside the record header.")]
    DataOffset(u16),
}

/// Maximum beams in any record.
pub const MAX_BEAMS: u8 = 5;

/// Build the shape of a whole record.
///
/// For classic formats the shape spans the record from sync byte to
/// checksum. For next-generation records it spans the data section following
/// the record header.
pub fn record(key: ShapeKey) -> Result<RecordShape, LayoutError> {
    let ShapeKey {
        format,
        beams,
        cells,
        planes,
    } = key;

    let n = dimensions(beams, cells)?;
    let b = usize::from(beams);

    use FieldName::*;
    use FieldType::*;

    Ok(match format {
        Format::Profile => {
            let block = data_block(planes, beams, cells)?;
            let fill = usize::from(block.len % 2 != 0);

            ShapeBuilder::default()
                .push(Sync, U8, 1)
                .push(Id, U8, 1)
                .push(Size, U16, 1)
                .push(Clock, Bcd, 1)
                .push(Error, I16, 1)
                .push(Analog1, U16, 1)
                .push(Battery, U16, 1)
                .push(SoundSpeed, U16, 1)
                .push(Heading, I16, 1)
                .push(Pitch, I16, 1)
                .push(Roll, I16, 1)
                .push(PressureMsb, U8, 1)
                .push(Status, U8, 1)
                .push(PressureLsw, U16, 1)
                .push(Temperature, I16, 1)
                .extend(&block)
                .push(Fill, U8, fill)
                .push(Checksum, U16, 1)
                .finish()
        }
        Format::HighResolution => ShapeBuilder::default()
            .push(Sync, U8, 1)
            .push(Id, U8, 1)
            .push(Size, U16, 1)
            .push(Clock, Bcd, 1)
            .push(Milliseconds, U16, 1)
            .push(Error, I16, 1)
            .push(Battery, U16, 1)
            .push(SoundSpeed, U16, 1)
            .push(Heading, I16, 1)
            .push(Pitch, I16, 1)
            .push(Roll, I16, 1)
            .push(PressureMsb, U8, 1)
            .push(Status, U8, 1)
            .push(PressureLsw, U16, 1)
            .push(Temperature, I16, 1)
            .push(Analog1, U16, 1)
            .push(Analog2, U16, 1)
            .push(Beams, U8, 1)
            .push(Cells, U8, 1)
            .push(VelocityLag2, I16, b)
            .push(AmplitudeLag2, U8, b)
            .push(CorrelationLag2, U8, b)
            .push(Reserved, I16, 3)
            .push(Velocity, I16, n)
            .push(Amplitude, U8, n)
            .push(Correlation, U8, n)
            .push(Checksum, U16, 1)
            .finish(),
        Format::Ad2cp {
            version,
            data_offset,
        } => {
            let header = ad2cp_header(version)?;
            let start = match usize::from(data_offset) {
                0 => header.len,
                s if s < header.len => Err(LayoutError::DataOffset(data_offset))?,
                s => s,
            };

            ShapeBuilder::from(header)
                .at(start)
                .extend(&data_block(planes, beams, cells)?)
                .finish()
        }
    })
}

/// Build the shape of a variable-length data block.
///
/// Only the planes present are laid out, in the order velocity, amplitude,
/// correlation. Each plane is beam-major: element `(beam, cell)` sits at
/// index `beam * cells + cell`.
pub fn data_block(planes: Planes, beams: u8, cells: u16) -> Result<RecordShape, LayoutError> {
    let n = dimensions(beams, cells)?;
    let present = |p: bool| if p { n } else { 0 };

    Ok(ShapeBuilder::default()
        .push(FieldName::Velocity, FieldType::I16, present(planes.velocity))
        .push(FieldName::Amplitude, FieldType::U8, present(planes.amplitude))
        .push(FieldName::Correlation, FieldType::U8, present(planes.correlation))
        .finish())
}

/// Build the fixed header shape of a next-generation data section.
pub fn ad2cp_header(version: u8) -> Result<RecordShape, LayoutError> {
    use FieldName::*;
    use FieldType::*;

    let calendar = |s: ShapeBuilder| {
        s.push(Year, U8, 1)
            .push(Month, U8, 1)
            .push(Day, U8, 1)
            .push(Hour, U8, 1)
            .push(Minute, U8, 1)
            .push(Second, U8, 1)
    };

    let attitude = |s: ShapeBuilder| {
        s.push(Pressure, U32, 1)
            .push(Heading, U16, 1)
            .push(Pitch, I16, 1)
            .push(Roll, I16, 1)
    };

    let motion = |s: ShapeBuilder| {
        s.push(MagnetometerX, I16, 1)
            .push(MagnetometerY, I16, 1)
            .push(MagnetometerZ, I16, 1)
            .push(AccelerometerX, I16, 1)
            .push(AccelerometerY, I16, 1)
            .push(AccelerometerZ, I16, 1)
            .push(Ambiguity, U16, 1)
            .push(DatasetDescription, U16, 1)
            .push(TransmitEnergy, U16, 1)
            .push(VelocityScaling, I8, 1)
            .push(PowerLevel, I8, 1)
    };

    let s = ShapeBuilder::default().push(Version, U8, 1);

    Ok(match version {
        1 => {
            let s = calendar(s.push(Configuration, U16, 1))
                .push(Reserved, U8, 1)
                .push(Subseconds, U16, 1)
                .push(SoundSpeed, U16, 1)
                .push(Temperature, I16, 1);

            attitude(s)
                .push(Error, U16, 1)
                .push(Status, U16, 1)
                .push(CellsCoordinatesBeams, U16, 1)
                .push(CellSize, U16, 1)
                .push(Blanking, U16, 1)
                .push(VelocityRange, U16, 1)
                .push(VelocityScaling, I8, 1)
                .push(Reserved, U8, 1)
                .push(Battery, U16, 1)
                .push(Reserved, U8, 2)
                .finish()
        }
        2 => {
            let s = s
                .push(OffsetToData, U8, 1)
                .push(Serial, U32, 1)
                .push(Configuration, U16, 1);

            let s = calendar(s)
                .push(Subseconds, U16, 1)
                .push(SoundSpeed, U16, 1)
                .push(Temperature, I16, 1);

            let s = attitude(s)
                .push(Error, U16, 1)
                .push(Status, U16, 1)
                .push(CellsCoordinatesBeams, U16, 1)
                .push(CellSize, U16, 1)
                .push(Blanking, U16, 1)
                .push(VelocityRange, U16, 1)
                .push(Battery, U16, 1);

            motion(s).push(Reserved, U8, 4).finish()
        }
        3 => {
            let s = s
                .push(OffsetToData, U8, 1)
                .push(Configuration, U16, 1)
                .push(Serial, U32, 1);

            let s = calendar(s)
                .push(Subseconds, U16, 1)
                .push(SoundSpeed, U16, 1)
                .push(Temperature, I16, 1);

            let s = attitude(s)
                .push(CellsCoordinatesBeams, U16, 1)
                .push(CellSize, U16, 1)
                .push(Blanking, U16, 1)
                .push(Reserved, U16, 1)
                .push(Battery, U16, 1);

            motion(s)
                .push(MagnetometerTemperature, I16, 1)
                .push(RtcTemperature, I16, 1)
                .push(Error, U16, 1)
                .push(Reserved, U16, 1)
                .push(Status, U32, 1)
                .push(Ensemble, U32, 1)
                .finish()
        }
        _ => Err(LayoutError::UnsupportedVersion(version))?,
    })
}

bitfield! {
    /// Configuration word of next-generation records.
    struct Ad2cpConfiguration(u16) {
        [0] pressure_valid,
        [1] temperature_valid,
        [2] compass_valid,
        [3] tilt_valid,
        [5] velocity,
        [6] amplitude,
        [7] correlation,
    }
}

bitfield! {
    /// Packed cell count, coordinate system, and beam count.
    struct CellsCoordinatesBeams(u16) {
        [0..10] cells: u16,
        [10..12] coordinate_system: u8,
        [12..16] beams: u8,
    }
}

/// Derive the shape key of a next-generation data section from its header.
pub fn ad2cp_key(r: &[u8]) -> Result<ShapeKey, LayoutError> {
    let version = r.first().copied().unwrap_or(0);
    let header = ad2cp_header(version)?;

    let word = |name| header.get(name, r).unwrap_or(0) as u16;

    let config = Ad2cpConfiguration(word(FieldName::Configuration));
    let ccb = CellsCoordinatesBeams(word(FieldName::CellsCoordinatesBeams));

    Ok(ShapeKey {
        format: Format::Ad2cp {
            version,
            data_offset: word(FieldName::OffsetToData),
        },
        beams: ccb.beams(),
        cells: ccb.cells(),
        planes: Planes {
            velocity: config.velocity(),
            amplitude: config.amplitude(),
            correlation: config.correlation(),
        },
    })
}

fn dimensions(beams: u8, cells: u16) -> Result<usize, LayoutError> {
    if beams == 0 || beams > MAX_BEAMS || cells == 0 {
        Err(LayoutError::Dimensions { beams, cells })?;
    }

    Ok(usize::from(beams) * usize::from(cells))
}

/// Accumulates fields at increasing offsets.
#[derive(Debug, Default)]
struct ShapeBuilder {
    fields: Vec<Field>,
    offset: usize,
}

impl From<RecordShape> for ShapeBuilder {
    fn from(shape: RecordShape) -> Self {
        Self {
            fields: shape.fields,
            offset: shape.len,
        }
    }
}

impl ShapeBuilder {
    /// Append a field of `count` elements. Empty fields are omitted.
    fn push(mut self, name: FieldName, ty: FieldType, count: usize) -> Self {
        if count > 0 {
            self.fields.push(Field {
                name,
                offset: self.offset,
                ty,
                count,
            });
            self.offset += ty.size() * count;
        }
        self
    }

    /// Move the cursor forward to an absolute offset, padding the gap.
    fn at(self, offset: usize) -> Self {
        let gap = offset.saturating_sub(self.offset);
        self.push(FieldName::Reserved, FieldType::U8, gap)
    }

    /// Append every field of another shape.
    fn extend(mut self, shape: &RecordShape) -> Self {
        let base = self.offset;
        self.fields.extend(shape.fields.iter().map(|f| Field {
            offset: base + f.offset,
            ..*f
        }));
        self.offset += shape.len;
        self
    }

    fn finish(self) -> RecordShape {
        RecordShape {
            fields: self.fields,
            len: self.offset,
        }
    }
}
