//! Byte scanner and record framer.
//!
//! The framer walks a byte slice as a small state machine:
//!
//! - `SeekSync` advances byte by byte to the next sync byte, finishing
//! cleanly when none remains.
//! - `ReadType` reads the type identifier following the sync byte, finishing
//! cleanly if the slice ends first.
//! - `Dispatch` resolves the identifier through the family's
//! [`DispatchTable`], sizes the record, and verifies its checksum.
//!
//! An unrecognized identifier resumes scanning after the sync and type bytes.
//! A checksum failure resumes one byte past the failing sync byte, so scanning
//! always progresses. A record running past the end of the slice stops
//! scanning. Each of these is reported as a [`Diagnostic`] carrying the
//! offset where the record began.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::U16;

use super::{
    SYNC,
    check::{ChecksumError, verify, verify_with},
    layout::{FieldName, LayoutError, ShapeKey, ad2cp_key, record},
    record::{
        AD2CP_FAMILY, AD2CP_HEADER_LEN, DispatchTable, Layout, RecordError,
        RecordKind, Resolution,
    },
};

/// A non-fatal condition met while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// A record failed checksum validation.
    #[error("Checksum failure at offset {offset}: {source}")]
    ChecksumMismatch {
        offset: usize,
        kind: Option<RecordKind>,
        source: ChecksumError,
    },
    /// A sync byte was followed by an identifier the family does not use.
    #[error("Unrecognized record type ({id:#04x}) at offset {offset}.")]
    UnrecognizedRecordType { offset: usize, id: u8 },
    /// Fewer bytes remain than the record declares.
    #[error("Truncated record at offset {offset}: {remaining} of {expected} bytes remain.")]
    TruncatedRecord {
        offset: usize,
        expected: usize,
        remaining: usize,
    },
    /// No layout can be built for a record.
    #[error("No layout for {} at offset {offset}: {source}", .kind.name())]
    UnsupportedLayout {
        offset: usize,
        kind: RecordKind,
        source: LayoutError,
    },
    /// A record's shape differs from the first record of its kind.
    #[error("{} at offset {offset} changes shape.", .kind.name())]
    InconsistentShape { offset: usize, kind: RecordKind },
    /// A verified record does not fit its layout.
    #[error("Malformed record at offset {offset}: {source}")]
    MalformedRecord { offset: usize, source: RecordError },
}

impl Diagnostic {
    /// Offset of the record the condition was met in.
    pub fn offset(&self) -> usize {
        match *self {
            Diagnostic::ChecksumMismatch { offset, .. }
            | Diagnostic::UnrecognizedRecordType { offset, .. }
            | Diagnostic::TruncatedRecord { offset, .. }
            | Diagnostic::UnsupportedLayout { offset, .. }
            | Diagnostic::InconsistentShape { offset, .. }
            | Diagnostic::MalformedRecord { offset, .. } => offset,
        }
    }
}

/// Layouts built for each record kind of a file.
///
/// The first record of a kind fixes its layout. Later records with an equal
/// key reuse it without rebuilding.
#[derive(Debug, Clone, Default)]
pub struct ShapeCache {
    layouts: HashMap<RecordKind, Layout>,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the layout for a key, building it on first use.
    ///
    /// Also returns whether the key matches the kind's first layout.
    pub fn lookup(&mut self, kind: RecordKind, key: ShapeKey) -> Result<(Layout, bool), LayoutError> {
        let build = || -> Result<Layout, LayoutError> {
            Ok(Layout {
                key,
                shape: Rc::new(record(key)?),
            })
        };

        Ok(match self.layouts.get(&kind) {
            Some(layout) if layout.key == key => (layout.clone(), true),
            Some(_) => (build()?, false),
            None => {
                let layout = build()?;
                self.layouts.insert(kind, layout.clone());
                (layout, true)
            }
        })
    }

    /// The layout fixed for a kind, if any.
    pub fn get(&self, kind: RecordKind) -> Option<&Layout> {
        self.layouts.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

/// A framed, verified record.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    /// Offset of the record's sync byte.
    pub offset: usize,
    pub kind: RecordKind,
    /// The whole record for classic kinds, or the data section following
    /// the header for next-generation kinds.
    pub bytes: &'a [u8],
    pub layout: Option<Layout>,
}

/// Output of the framer.
#[derive(Debug, Clone)]
pub enum Event<'a> {
    Record(Frame<'a>),
    Diagnostic(Diagnostic),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekSync,
    ReadType,
    Dispatch(u8),
    Done,
}

/// Where scanning continues after a diagnostic.
enum Resume {
    At(usize),
    Stop,
}

/// A sized record, relative to its offset.
struct Measured {
    kind: RecordKind,
    len: usize,
    data: usize,
    layout: Option<Layout>,
    consistent: bool,
}

type Stop = (Diagnostic, Resume);

/// Iterator over the records and diagnostics of a byte slice.
#[derive(Debug)]
pub struct Framer<'a> {
    r: &'a [u8],
    i: usize,
    state: State,
    table: DispatchTable,
    shapes: ShapeCache,
}

impl<'a> Framer<'a> {
    /// Begin scanning at an offset with an empty shape cache.
    pub fn new(r: &'a [u8], start: usize, table: DispatchTable) -> Self {
        Self::with_shapes(r, start, table, ShapeCache::new())
    }

    /// Begin scanning at an offset, reusing layouts from an earlier pass.
    pub fn with_shapes(r: &'a [u8], start: usize, table: DispatchTable, shapes: ShapeCache) -> Self {
        Self {
            r,
            i: start,
            state: State::SeekSync,
            table,
            shapes,
        }
    }

    /// Offset of the next byte to scan.
    pub fn offset(&self) -> usize {
        self.i
    }

    /// Release the shape cache for a later pass.
    pub fn into_shapes(self) -> ShapeCache {
        self.shapes
    }

    fn dispatch(&mut self, offset: usize, id: u8) -> Event<'a> {
        match self.measure(offset, id) {
            Ok(m) => {
                self.i = offset + m.len;

                if !m.consistent {
                    return Event::Diagnostic(Diagnostic::InconsistentShape {
                        offset,
                        kind: m.kind,
                    });
                }

                let r = self.r;
                Event::Record(Frame {
                    offset,
                    kind: m.kind,
                    bytes: &r[offset + m.data..offset + m.len],
                    layout: m.layout,
                })
            }
            Err((diagnostic, resume)) => {
                match resume {
                    Resume::At(i) => self.i = i,
                    Resume::Stop => self.state = State::Done,
                }
                Event::Diagnostic(diagnostic)
            }
        }
    }

    fn measure(&mut self, offset: usize, id: u8) -> Result<Measured, Stop> {
        let r = self.r;
        let r = &r[offset..];

        let resolution = self.table.resolve(id).ok_or((
            Diagnostic::UnrecognizedRecordType { offset, id },
            Resume::At(offset + 2),
        ))?;

        let (kind, len, layout, consistent) = match resolution {
            Resolution::Fixed(kind, len) => (kind, len, None, true),
            Resolution::Shaped(kind, key) => {
                let (layout, consistent) = self.shape(offset, kind, key, offset + 2)?;
                (kind, layout.shape.len(), Some(layout), consistent)
            }
            Resolution::Ad2cp => return self.ad2cp(offset),
        };

        let bytes = r.get(..len).ok_or_else(|| truncated(offset, len, r.len()))?;
        verify(bytes).map_err(|source| mismatch(offset, Some(kind), source))?;

        // Counts carried inside a verified record must agree with its layout.
        let consistent = consistent && layout.as_ref().is_none_or(|l| described(l, bytes));

        Ok(Measured {
            kind,
            len,
            data: 0,
            layout,
            consistent,
        })
    }

    fn ad2cp(&mut self, offset: usize) -> Result<Measured, Stop> {
        #[repr(C)]
        #[derive(FromBytes)]
        struct RecordHeader {
            sync: u8,
            header_size: u8,
            id: u8,
            family: u8,
            data_size: U16,
            data_checksum: U16,
            header_checksum: U16,
        }

        let r = self.r;
        let r = &r[offset..];

        let header: [u8; AD2CP_HEADER_LEN] = r
            .get(..AD2CP_HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| truncated(offset, AD2CP_HEADER_LEN, r.len()))?;

        verify(&header).map_err(|source| mismatch(offset, None, source))?;

        let RecordHeader {
            id,
            family,
            data_size,
            data_checksum,
            ..
        } = zerocopy::transmute!(header);

        let kind = RecordKind::from_ad2cp(id)
            .filter(|_| family == AD2CP_FAMILY)
            .ok_or((
                Diagnostic::UnrecognizedRecordType { offset, id },
                Resume::At(offset + 2),
            ))?;

        let len = AD2CP_HEADER_LEN + usize::from(data_size.get());
        let data = r
            .get(AD2CP_HEADER_LEN..len)
            .ok_or_else(|| truncated(offset, len, r.len()))?;

        verify_with(data, data_checksum.get())
            .map_err(|source| mismatch(offset, Some(kind), source))?;

        let (layout, consistent) = if kind == RecordKind::Text {
            (None, true)
        } else {
            let key = ad2cp_key(data).map_err(|source| {
                (
                    Diagnostic::UnsupportedLayout {
                        offset,
                        kind,
                        source,
                    },
                    Resume::At(offset + len),
                )
            })?;

            let (layout, consistent) = self.shape(offset, kind, key, offset + len)?;

            if layout.shape.len() > data.len() {
                Err((
                    Diagnostic::MalformedRecord {
                        offset,
                        source: RecordError::Length {
                            kind,
                            len: data.len(),
                        },
                    },
                    Resume::At(offset + len),
                ))?;
            }

            (Some(layout), consistent)
        };

        Ok(Measured {
            kind,
            len,
            data: AD2CP_HEADER_LEN,
            layout,
            consistent,
        })
    }

    fn shape(
        &mut self,
        offset: usize,
        kind: RecordKind,
        key: ShapeKey,
        resume: usize,
    ) -> Result<(Layout, bool), Stop> {
        self.shapes.lookup(kind, key).map_err(|source| {
            (
                Diagnostic::UnsupportedLayout {
                    offset,
                    kind,
                    source,
                },
                Resume::At(resume),
            )
        })
    }
}

impl<'a> Iterator for Framer<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        loop {
            self.state = match self.state {
                State::SeekSync => {
                    match self.r.get(self.i..).and_then(|r| r.iter().position(|b| *b == SYNC)) {
                        Some(p) => {
                            self.i += p;
                            State::ReadType
                        }
                        None => {
                            self.i = self.r.len();
                            State::Done
                        }
                    }
                }
                State::ReadType => match self.r.get(self.i + 1) {
                    Some(&id) => State::Dispatch(id),
                    None => State::Done,
                },
                State::Dispatch(id) => {
                    let offset = self.i;
                    self.state = State::SeekSync;
                    return Some(self.dispatch(offset, id));
                }
                State::Done => return None,
            };
        }
    }
}

/// Whether the beam and cell counts a record reports, if any, match its
/// layout.
fn described(layout: &Layout, r: &[u8]) -> bool {
    let reports = |name, expected: usize| {
        layout
            .shape
            .get(name, r)
            .is_none_or(|v| usize::try_from(v) == Ok(expected))
    };

    reports(FieldName::Beams, usize::from(layout.key.beams))
        && reports(FieldName::Cells, usize::from(layout.key.cells))
}

fn truncated(offset: usize, expected: usize, remaining: usize) -> Stop {
    (
        Diagnostic::TruncatedRecord {
            offset,
            expected,
            remaining,
        },
        Resume::Stop,
    )
}

fn mismatch(offset: usize, kind: Option<RecordKind>, source: ChecksumError) -> Stop {
    (
        Diagnostic::ChecksumMismatch {
            offset,
            kind,
            source,
        },
        Resume::At(offset + 1),
    )
}
