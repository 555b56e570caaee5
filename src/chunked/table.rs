//! The compressed chunk table and its wire protocol.
//!
//! Compressed data starts with an 8-byte pointer to the table; the table
//! itself sits after all chunks and holds, per chunk, the point count
//! (variable-size chunks only) and the byte length, both delta-coded
//! through the predictive integer codec.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::coder::{RangeDecoder, RangeEncoder};
use crate::errors::LazError;
use crate::predictive::{IntCompressor, IntDecompressor};

/// Context indices of the integer codec while coding table entries.
const POINT_COUNT_CONTEXT: u32 = 0;
const BYTE_COUNT_CONTEXT: u32 = 1;

/// The table format version this implementation reads and writes.
const TABLE_VERSION: u32 = 0;

/// Pointer value indicating the real table position was appended after the
/// table because the writer could not seek back.
pub(crate) const OFFSET_AT_END: i64 = -1;

/// One chunk: how many points it holds and how many compressed bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkEntry {
    pub point_count: u64,
    pub byte_count: u64,
}

/// Where the 8-byte pointer said the chunk table is.
#[derive(Debug, Copy, Clone)]
pub(crate) enum TableLocation {
    /// The writer was interrupted before it could write a table.
    Missing,
    /// The pointer itself is the sentinel; the real position sits in the
    /// last 8 bytes of the stream.
    AtEnd,
    At(u64),
}

#[derive(Default, Debug, Clone)]
pub struct ChunkTable {
    entries: Vec<ChunkEntry>,
}

impl ChunkTable {
    /// Size of the table-position pointer preceding the chunks.
    pub const OFFSET_SIZE: u64 = 8;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: ChunkEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    pub fn total_byte_count(&self) -> u64 {
        self.entries.iter().map(|e| e.byte_count).sum()
    }

    pub fn total_point_count(&self) -> u64 {
        self.entries.iter().map(|e| e.point_count).sum()
    }

    /// Reads the 8-byte pointer sitting right before the chunks.
    ///
    /// Leaves the source positioned after the pointer, at the first chunk.
    pub(crate) fn read_offset<R: Read + Seek>(
        src: &mut R,
    ) -> std::io::Result<(u64, TableLocation)> {
        let pointer = src.read_i64::<LittleEndian>()?;
        let chunks_start = src.seek(SeekFrom::Current(0))?;

        let location = if pointer.wrapping_add(8) == chunks_start as i64 {
            // pointer still points at itself: the writer never came back
            TableLocation::Missing
        } else if pointer == OFFSET_AT_END {
            TableLocation::AtEnd
        } else {
            TableLocation::At(pointer as u64)
        };
        Ok((chunks_start, location))
    }

    /// Decodes the table payload at the current source position.
    ///
    /// `with_point_counts` must match how the table was written; fixed-size
    /// chunk tables omit the per-chunk point count.
    pub(crate) fn read_payload<R: Read + Seek>(
        src: &mut R,
        with_point_counts: bool,
    ) -> Result<Self, LazError> {
        let version = src.read_u32::<LittleEndian>()?;
        if version != TABLE_VERSION {
            return Err(LazError::CorruptChunkTable);
        }
        let chunk_count = src.read_u32::<LittleEndian>()?;

        let mut table = ChunkTable::with_capacity(chunk_count as usize);
        if chunk_count == 0 {
            return Ok(table);
        }

        let mut decoder = RangeDecoder::new(src);
        decoder.read_init_bytes()?;
        let mut codec = IntDecompressor::new(32, 2).initialized();

        let mut previous = ChunkEntry::default();
        for _ in 0..chunk_count {
            let mut entry = ChunkEntry::default();
            if with_point_counts {
                entry.point_count = codec.decompress(
                    &mut decoder,
                    previous.point_count as i32,
                    POINT_COUNT_CONTEXT,
                )? as u32 as u64;
            }
            entry.byte_count = codec.decompress(
                &mut decoder,
                previous.byte_count as i32,
                BYTE_COUNT_CONTEXT,
            )? as u32 as u64;

            // chunk starts are prefix sums of the byte counts; a start
            // that fails to strictly increase marks the table corrupt
            if entry.byte_count == 0 {
                return Err(LazError::CorruptChunkTable);
            }
            table.entries.push(entry);
            previous = entry;
        }
        Ok(table)
    }

    /// Encodes and writes the table payload at the current position.
    pub(crate) fn write_payload<W: Write>(
        &self,
        dst: &mut W,
        with_point_counts: bool,
    ) -> std::io::Result<()> {
        dst.write_u32::<LittleEndian>(TABLE_VERSION)?;
        dst.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        if self.entries.is_empty() {
            return Ok(());
        }

        let mut encoder = RangeEncoder::new(dst);
        let mut codec = IntCompressor::new(32, 2).initialized();

        let mut previous = ChunkEntry::default();
        for entry in &self.entries {
            if with_point_counts {
                codec.compress(
                    &mut encoder,
                    previous.point_count as i32,
                    entry.point_count as i32,
                    POINT_COUNT_CONTEXT,
                )?;
            }
            codec.compress(
                &mut encoder,
                previous.byte_count as i32,
                entry.byte_count as i32,
                BYTE_COUNT_CONTEXT,
            )?;
            previous = *entry;
        }
        encoder.done()?;
        Ok(())
    }

    /// Finds the chunk containing `point_index`.
    ///
    /// Returns the chunk index, the byte offset of the chunk relative to
    /// the start of the chunks, and the in-chunk point offset.
    pub fn locate_point(&self, point_index: u64) -> Option<(usize, u64, u64)> {
        let mut byte_offset = 0u64;
        let mut points_before = 0u64;
        for (index, entry) in self.entries.iter().enumerate() {
            if point_index < points_before + entry.point_count {
                return Some((index, byte_offset, point_index - points_before));
            }
            byte_offset += entry.byte_count;
            points_before += entry.point_count;
        }
        None
    }
}

/// Rewrites the 8-byte table pointer at `pointer_position` with the current
/// stream position, then seeks back.
pub(crate) fn update_table_offset<W: Write + Seek>(
    dst: &mut W,
    pointer_position: u64,
) -> std::io::Result<()> {
    let table_position = dst.seek(SeekFrom::Current(0))?;
    dst.seek(SeekFrom::Start(pointer_position))?;
    dst.write_i64::<LittleEndian>(table_position as i64)?;
    dst.seek(SeekFrom::Start(table_position))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn example_table() -> ChunkTable {
        let mut table = ChunkTable::with_capacity(3);
        table.push(ChunkEntry {
            point_count: 100,
            byte_count: 1234,
        });
        table.push(ChunkEntry {
            point_count: 100,
            byte_count: 987,
        });
        table.push(ChunkEntry {
            point_count: 37,
            byte_count: 660,
        });
        table
    }

    #[test]
    fn payload_round_trip_with_point_counts() {
        let table = example_table();
        let mut raw = Cursor::new(Vec::new());
        table.write_payload(&mut raw, true).unwrap();
        raw.set_position(0);
        let read_back = ChunkTable::read_payload(&mut raw, true).unwrap();
        assert_eq!(read_back.entries(), table.entries());
    }

    #[test]
    fn payload_round_trip_without_point_counts() {
        let table = example_table();
        let mut raw = Cursor::new(Vec::new());
        table.write_payload(&mut raw, false).unwrap();
        raw.set_position(0);
        let read_back = ChunkTable::read_payload(&mut raw, false).unwrap();
        let byte_counts: Vec<u64> = read_back.entries().iter().map(|e| e.byte_count).collect();
        assert_eq!(byte_counts, vec![1234, 987, 660]);
        assert!(read_back.entries().iter().all(|e| e.point_count == 0));
    }

    #[test]
    fn zero_byte_chunk_is_rejected() {
        let mut table = ChunkTable::default();
        table.push(ChunkEntry {
            point_count: 10,
            byte_count: 0,
        });
        let mut raw = Cursor::new(Vec::new());
        table.write_payload(&mut raw, false).unwrap();
        raw.set_position(0);
        match ChunkTable::read_payload(&mut raw, false) {
            Err(LazError::CorruptChunkTable) => {}
            other => panic!("expected CorruptChunkTable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut raw = Cursor::new(Vec::new());
        raw.write_u32::<LittleEndian>(1).unwrap();
        raw.write_u32::<LittleEndian>(0).unwrap();
        raw.set_position(0);
        assert!(ChunkTable::read_payload(&mut raw, false).is_err());
    }

    #[test]
    fn locate_point_walks_prefix_sums() {
        let table = example_table();
        assert_eq!(table.locate_point(0), Some((0, 0, 0)));
        assert_eq!(table.locate_point(99), Some((0, 0, 99)));
        assert_eq!(table.locate_point(100), Some((1, 1234, 0)));
        assert_eq!(table.locate_point(236), Some((2, 2221, 36)));
        assert_eq!(table.locate_point(237), None);
    }
}
