//! The decompressing side of the chunked stream.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::table::{ChunkTable, TableLocation};
use super::{CompressorKind, RecordSchema};
use crate::errors::LazError;
use crate::point::selective::DecompressionSelection;
use crate::record::RecordDecompressor;
use crate::Result;

/// Growth step of the reconstructed chunk list when the writer was
/// interrupted before emitting a table. Inherited policy constant, not a
/// format invariant.
const CHUNK_TABLE_GROWTH: usize = 256;

/// Reads point records back out of a compressed, chunked stream.
///
/// The chunk table is read (or recovered) when the reader is created; every
/// chunk boundary resets the codec state, verifies the stream position
/// against the table and, on mismatch, resynchronizes at the next recorded
/// chunk start.
pub struct PointReader<R: Read + Seek> {
    schema: RecordSchema,
    records: RecordDecompressor<R>,
    record_size: usize,

    /// Absolute start position of every known chunk; in fallback mode the
    /// list grows as chunks are scanned.
    chunk_starts: Vec<u64>,
    /// Per-chunk point counts; only filled for variable-size chunks read
    /// from a complete table.
    point_counts: Vec<u64>,
    /// Whether `chunk_starts` covers the whole stream.
    table_complete: bool,
    /// Where the table itself sits, when known.
    table_position: Option<u64>,

    /// Position of the first chunk (right after the table pointer).
    chunks_start: u64,
    current_chunk: usize,
    chunk_armed: bool,
    points_in_chunk: u64,
    chunk_points_read: u64,
    /// Absolute index of the next record to be read.
    current: u64,
}

impl<R: Read + Seek> PointReader<R> {
    /// Creates a reader that decompresses every field.
    pub fn new(src: R, schema: RecordSchema) -> Result<Self> {
        Self::selective(src, schema, DecompressionSelection::all())
    }

    /// Creates a reader that only decompresses the selected sub-streams
    /// (layered formats; other formats decode everything regardless).
    pub fn selective(
        mut src: R,
        schema: RecordSchema,
        selection: DecompressionSelection,
    ) -> Result<Self> {
        let record_size = schema.record_size() as usize;

        let mut chunk_starts = Vec::new();
        let mut point_counts = Vec::new();
        let mut table_complete = false;
        let mut table_position = None;
        let mut chunks_start = src.seek(SeekFrom::Current(0))?;

        match schema.compressor() {
            CompressorKind::None | CompressorKind::PointWise => {}
            CompressorKind::PointWiseChunked | CompressorKind::LayeredChunked => {
                let (start, location) = ChunkTable::read_offset(&mut src)?;
                chunks_start = start;

                let resolved = match location {
                    TableLocation::Missing => None,
                    TableLocation::AtEnd => {
                        src.seek(SeekFrom::End(-8))?;
                        let position = src.read_i64::<LittleEndian>()?;
                        if position > chunks_start as i64 {
                            Some(position as u64)
                        } else {
                            None
                        }
                    }
                    TableLocation::At(position) => Some(position),
                };

                let decoded = match resolved {
                    Some(position) => {
                        src.seek(SeekFrom::Start(position))?;
                        match ChunkTable::read_payload(&mut src, schema.uses_variable_chunks()) {
                            Ok(table) => Some((position, table)),
                            Err(_) => {
                                log::warn!(
                                    "chunk table at offset {} is corrupt, \
                                     falling back to a linear chunk scan",
                                    position
                                );
                                None
                            }
                        }
                    }
                    None => {
                        log::warn!(
                            "stream carries no chunk table, \
                             falling back to a linear chunk scan"
                        );
                        None
                    }
                };

                match decoded {
                    Some((position, table)) => {
                        table_position = Some(position);
                        table_complete = true;
                        let mut start = chunks_start;
                        chunk_starts.reserve(table.len() + 1);
                        for entry in table.entries() {
                            chunk_starts.push(start);
                            start += entry.byte_count;
                            point_counts.push(entry.point_count);
                        }
                        // one-past-the-end start, checked when the last
                        // chunk finishes
                        chunk_starts.push(start);
                    }
                    None => {
                        // without a table, variable-size chunks only work
                        // when every chunk embeds its own point count
                        if schema.uses_variable_chunks()
                            && schema.compressor() != CompressorKind::LayeredChunked
                        {
                            return Err(LazError::MissingChunkTable);
                        }
                        chunk_starts = Vec::with_capacity(CHUNK_TABLE_GROWTH);
                    }
                }
                src.seek(SeekFrom::Start(chunks_start))?;
            }
        }

        let records = RecordDecompressor::with_record_layout(src, schema.items(), selection)?;
        let points_in_chunk = match schema.compressor() {
            CompressorKind::PointWise => u64::max_value(),
            _ => 0,
        };
        // pointwise streams are one endless chunk, armed by the record
        // decompressor itself on the first record
        let chunk_armed = schema.compressor() == CompressorKind::PointWise;

        Ok(Self {
            schema,
            records,
            record_size,
            chunk_starts,
            point_counts,
            table_complete,
            table_position,
            chunks_start,
            current_chunk: 0,
            chunk_armed,
            points_in_chunk,
            chunk_points_read: 0,
            current: 0,
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Uncompressed size of one record, the unit of the `out` buffers.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Index of the next record to be read.
    pub fn position(&self) -> u64 {
        self.current
    }

    /// The chunk table as far as it is known.
    pub fn chunk_starts(&self) -> &[u64] {
        &self.chunk_starts
    }

    /// Decompresses the next record into `out`.
    ///
    /// A stream-position mismatch at a chunk boundary reports the finished
    /// chunk as [`LazError::CorruptChunk`] and leaves the reader positioned
    /// at the next recorded chunk start, ready to continue.
    pub fn read_next(&mut self, out: &mut [u8]) -> Result<()> {
        if self.schema.compressor() == CompressorKind::None {
            self.records.get_mut().read_exact(&mut out[..self.record_size])?;
            self.current += 1;
            return Ok(());
        }

        if !self.chunk_armed || self.chunk_points_read == self.points_in_chunk {
            self.begin_next_chunk()?;
        }

        self.records
            .decompress_next(&mut out[..self.record_size])
            .map_err(|source| LazError::TruncatedChunk {
                index: self.current_chunk as u64,
                source,
            })?;
        self.chunk_points_read += 1;
        self.current += 1;

        if self.chunk_points_read == 1 {
            self.points_in_chunk = self.current_chunk_point_count();
        }
        Ok(())
    }

    /// Decompresses as many records as `out` holds.
    pub fn read_many(&mut self, out: &mut [u8]) -> Result<()> {
        if out.len() % self.record_size != 0 {
            return Err(LazError::BufferLenNotMultipleOfPointSize {
                buffer_len: out.len(),
                point_size: self.record_size,
            });
        }
        for record in out.chunks_exact_mut(self.record_size) {
            self.read_next(record)?;
        }
        Ok(())
    }

    /// Positions the reader on `target` so the next read returns that
    /// record.
    ///
    /// Uncompressed streams seek directly; compressed streams jump to the
    /// containing chunk and decode forward to the exact offset. A target
    /// beyond the data leaves the stream at its end, so the next read
    /// reports the end of the stream.
    pub fn seek(&mut self, target: u64) -> Result<()> {
        match self.schema.compressor() {
            CompressorKind::None => {
                let offset = self.chunks_start + self.record_size as u64 * target;
                self.records.get_mut().seek(SeekFrom::Start(offset))?;
                self.current = target;
                Ok(())
            }
            CompressorKind::PointWise => {
                if target < self.current {
                    self.records.get_mut().seek(SeekFrom::Start(self.chunks_start))?;
                    self.rearm_records()?;
                    self.current = 0;
                    self.chunk_points_read = 0;
                }
                self.discard_until(target, false)
            }
            CompressorKind::PointWiseChunked | CompressorKind::LayeredChunked => {
                self.seek_chunked(target)
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.records.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.records.get_mut()
    }

    fn seek_chunked(&mut self, target: u64) -> Result<()> {
        let in_last_known_chunk;

        if self.schema.uses_variable_chunks() {
            if !self.table_complete {
                return Err(LazError::MissingChunkTable);
            }
            let mut points_before = 0u64;
            let mut target_chunk = None;
            for (index, count) in self.point_counts.iter().enumerate() {
                if target < points_before + count {
                    target_chunk = Some((index, points_before));
                    break;
                }
                points_before += count;
            }
            let (chunk, chunk_first_point) = match target_chunk {
                Some(found) => found,
                None => {
                    // past the end: park the stream at its end so the
                    // next read reports truncation
                    self.records.get_mut().seek(SeekFrom::End(0))?;
                    self.current = target;
                    self.chunk_points_read = 0;
                    self.points_in_chunk = u64::max_value();
                    self.chunk_armed = true;
                    return Ok(());
                }
            };
            if chunk != self.current_chunk || target < self.current {
                self.load_chunk(chunk, chunk_first_point)?;
            }
            in_last_known_chunk = chunk + 1 == self.point_counts.len();
        } else {
            let chunk_size = u64::from(self.schema.chunk_size());
            let target_chunk = (target / chunk_size) as usize;
            let known = self.known_chunks();

            if target_chunk >= known {
                // beyond the table: jump to the last known chunk and
                // decode forward across boundaries
                if known > 0 && (self.current_chunk < known - 1 || target < self.current) {
                    let last = known - 1;
                    self.load_chunk(last, last as u64 * chunk_size)?;
                }
            } else if target_chunk != self.current_chunk || target < self.current {
                self.load_chunk(target_chunk, target_chunk as u64 * chunk_size)?;
            }
            in_last_known_chunk = self.table_complete && target_chunk + 1 >= self.known_chunks();
        }

        let guard_against_table = in_last_known_chunk
            && self.schema.compressor() != CompressorKind::LayeredChunked;
        self.discard_until(target, guard_against_table)
    }

    /// Number of chunks whose start is known (excluding the end marker of
    /// a complete table).
    fn known_chunks(&self) -> usize {
        if self.table_complete {
            self.chunk_starts.len().saturating_sub(1)
        } else {
            self.chunk_starts.len()
        }
    }

    /// Decode-and-discard until `current` reaches `target`.
    fn discard_until(&mut self, target: u64, guard_against_table: bool) -> Result<()> {
        let mut scratch = vec![0u8; self.record_size];
        while self.current < target {
            if guard_against_table {
                // the requested point may not exist; stop before the chunk
                // table gets decoded as if it were point data (a valid
                // chunk never consumes past its recorded end)
                if let Some(table_position) = self.table_position {
                    let here = self.records.get_mut().seek(SeekFrom::Current(0))?;
                    if here > table_position {
                        self.records.get_mut().seek(SeekFrom::End(0))?;
                        self.current = target;
                        return Ok(());
                    }
                }
            }
            self.read_next(&mut scratch)?;
        }
        Ok(())
    }

    /// Moves the stream to a recorded chunk start and re-arms the codecs.
    fn load_chunk(&mut self, index: usize, first_point: u64) -> Result<()> {
        let start = self.chunk_starts[index];
        self.records.get_mut().seek(SeekFrom::Start(start))?;
        self.rearm_records()?;
        self.current_chunk = index;
        self.current = first_point;
        self.chunk_points_read = 0;
        self.points_in_chunk = u64::max_value();
        self.chunk_armed = true;
        Ok(())
    }

    /// Crosses a chunk boundary: verifies the previous chunk ended where
    /// the table says, learns unseen chunk starts in fallback mode, and
    /// resets the codec state.
    fn begin_next_chunk(&mut self) -> Result<()> {
        if self.chunk_armed {
            let next = self.current_chunk + 1;
            if next < self.chunk_starts.len() {
                let here = self.records.get_mut().seek(SeekFrom::Current(0))?;
                if self.chunk_starts[next] != here {
                    // the finished chunk did not end at the recorded next
                    // start; resynchronize there so the caller can go on
                    self.records
                        .get_mut()
                        .seek(SeekFrom::Start(self.chunk_starts[next]))?;
                    return Err(LazError::CorruptChunk {
                        index: self.current_chunk as u64,
                    });
                }
            }
            self.current_chunk = next;
        }

        self.rearm_records()?;

        let here = self.records.get_mut().seek(SeekFrom::Current(0))?;
        if !self.table_complete && self.current_chunk == self.chunk_starts.len() {
            if self.chunk_starts.len() == self.chunk_starts.capacity() {
                self.chunk_starts.reserve(CHUNK_TABLE_GROWTH);
            }
            self.chunk_starts.push(here);
        }

        self.chunk_points_read = 0;
        self.points_in_chunk = u64::max_value();
        self.chunk_armed = true;
        Ok(())
    }

    fn rearm_records(&mut self) -> Result<()> {
        self.records.reset();
        self.records.set_layout(self.schema.items())?;
        Ok(())
    }

    /// Point count of the chunk that was just entered; called after its
    /// first record so layered chunks have read their embedded count.
    fn current_chunk_point_count(&self) -> u64 {
        if self.schema.compressor() == CompressorKind::PointWise {
            return u64::max_value();
        }
        if self.schema.uses_variable_chunks() {
            if self.table_complete {
                self.point_counts[self.current_chunk]
            } else {
                self.records
                    .chunk_point_count()
                    .map(u64::from)
                    .unwrap_or(u64::max_value())
            }
        } else {
            u64::from(self.schema.chunk_size())
        }
    }
}
