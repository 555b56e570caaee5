//! The compressing side of the chunked stream.

use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::table::{update_table_offset, ChunkEntry, ChunkTable};
use super::{CompressorKind, RecordSchema};
use crate::errors::LazError;
use crate::record::RecordCompressor;
use crate::Result;

/// Writes point records as a compressed, chunked stream.
///
/// Records go in one at a time through [`PointWriter::write_next`]; chunk
/// boundaries fall automatically every `chunk_size` records, or wherever
/// the caller puts them via [`PointWriter::finish_chunk`] when the schema
/// uses variable-size chunks. [`PointWriter::done`] seals the stream and
/// writes the chunk table.
pub struct PointWriter<W: Write + Seek> {
    schema: RecordSchema,
    records: RecordCompressor<W>,
    table: ChunkTable,
    /// Points written into the open chunk.
    chunk_point_count: u32,
    /// Stream position where the open chunk began.
    chunk_start: u64,
    /// Stream position of the 8-byte table pointer.
    pointer_position: u64,
    started: bool,
}

impl<W: Write + Seek> PointWriter<W> {
    pub fn new(dst: W, schema: RecordSchema) -> Result<Self> {
        let records = RecordCompressor::with_record_layout(dst, schema.items())?;
        Ok(Self {
            schema,
            records,
            table: ChunkTable::default(),
            chunk_point_count: 0,
            chunk_start: 0,
            pointer_position: 0,
            started: false,
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Reserves the chunk-table pointer; called automatically on the first
    /// record.
    ///
    /// The placeholder is the pointer's own position; a stream where the
    /// writer was interrupted before `done` is recognizable by exactly
    /// that signature.
    pub fn reserve_table_pointer(&mut self) -> std::io::Result<()> {
        debug_assert!(!self.started);
        let dst = self.records.get_mut();
        self.pointer_position = dst.seek(SeekFrom::Current(0))?;
        dst.write_i64::<LittleEndian>(self.pointer_position as i64)?;
        self.chunk_start = self.pointer_position + ChunkTable::OFFSET_SIZE;
        self.started = true;
        Ok(())
    }

    pub fn write_next(&mut self, record: &[u8]) -> Result<()> {
        if self.schema.compressor() == CompressorKind::None {
            // raw pass-through, no chunking, no table
            self.records.get_mut().write_all(record)?;
            return Ok(());
        }

        if !self.started && self.schema.compressor().is_chunked() {
            self.reserve_table_pointer()?;
        }

        if self.schema.compressor().is_chunked()
            && !self.schema.uses_variable_chunks()
            && self.chunk_point_count == self.schema.chunk_size()
        {
            self.finish_chunk()?;
        }

        self.records.compress_next(record)?;
        self.chunk_point_count += 1;
        Ok(())
    }

    /// Compresses every record in `records`, which must be a whole number
    /// of records.
    pub fn write_many(&mut self, records: &[u8]) -> Result<()> {
        let record_size = self.schema.record_size() as usize;
        if records.len() % record_size != 0 {
            return Err(LazError::BufferLenNotMultipleOfPointSize {
                buffer_len: records.len(),
                point_size: record_size,
            });
        }
        for record in records.chunks_exact(record_size) {
            self.write_next(record)?;
        }
        Ok(())
    }

    /// Closes the open chunk and starts a fresh one.
    ///
    /// With variable-size chunks this is how the caller places chunk
    /// boundaries; with fixed-size chunks it happens automatically.
    pub fn finish_chunk(&mut self) -> Result<()> {
        if self.chunk_point_count == 0 {
            return Ok(());
        }
        self.records.done()?;
        self.record_finished_chunk()?;
        self.records.reset();
        self.records.set_layout(self.schema.items())?;
        self.chunk_point_count = 0;
        Ok(())
    }

    /// Seals the stream: closes the last chunk, points the table pointer
    /// at the table and writes it.
    pub fn done(&mut self) -> Result<()> {
        if self.schema.compressor() == CompressorKind::None {
            self.records.get_mut().flush()?;
            return Ok(());
        }
        if !self.started && self.schema.compressor().is_chunked() {
            // an empty stream still carries its pointer and empty table
            self.reserve_table_pointer()?;
        }

        match self.schema.compressor() {
            CompressorKind::PointWise => {
                self.records.done()?;
                Ok(())
            }
            _ => {
                if self.chunk_point_count > 0 {
                    self.records.done()?;
                    self.record_finished_chunk()?;
                }
                self.write_table()
            }
        }
    }

    pub fn into_inner(self) -> W {
        self.records.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.records.get_mut()
    }

    fn record_finished_chunk(&mut self) -> std::io::Result<()> {
        let position = self.records.get_mut().seek(SeekFrom::Current(0))?;
        self.table.push(ChunkEntry {
            point_count: u64::from(self.chunk_point_count),
            byte_count: position - self.chunk_start,
        });
        self.chunk_start = position;
        Ok(())
    }

    fn write_table(&mut self) -> Result<()> {
        let variable = self.schema.uses_variable_chunks();
        let dst = self.records.get_mut();
        update_table_offset(dst, self.pointer_position)?;
        self.table.write_payload(dst, variable)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chunked::{ItemKind, SchemaBuilder};
    use std::io::Cursor;

    #[test]
    fn empty_stream_still_has_pointer_and_table() {
        let schema = SchemaBuilder::new().item(ItemKind::Point10).build();
        let mut writer = PointWriter::new(Cursor::new(Vec::new()), schema).unwrap();
        writer.done().unwrap();
        let data = writer.into_inner().into_inner();
        // 8-byte pointer + empty table header
        assert_eq!(data.len(), 8 + 8);
        let pointer = i64::from_le_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]);
        assert!(pointer > 0);
    }

    #[test]
    fn uncompressed_records_pass_through() {
        let schema = SchemaBuilder::new()
            .item(ItemKind::Point10)
            .uncompressed()
            .build();
        let mut writer = PointWriter::new(Cursor::new(Vec::new()), schema).unwrap();
        let record = [7u8; 20];
        writer.write_next(&record).unwrap();
        writer.write_next(&record).unwrap();
        writer.done().unwrap();
        let data = writer.into_inner().into_inner();
        assert_eq!(data.len(), 40);
        assert!(data.iter().all(|byte| *byte == 7));
    }
}
