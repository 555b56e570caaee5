//! Lossless predictive compression of LIDAR point records.
//!
//! The crate implements the LASzip compression scheme: an adaptive range
//! coder drives per-attribute predictive codecs, and a chunked stream
//! layer provides random access through a compressed chunk table.
//!
//! [`PointWriter`] and [`PointReader`] are the two types most users need.
//!
//! # Compressing
//!
//! ```
//! use lidarzip::{ItemKind, PointWriter, SchemaBuilder};
//!
//! # fn main() -> lidarzip::Result<()> {
//! // a Cursor works here, so does a std::fs::File
//! let mut output = std::io::Cursor::new(Vec::new());
//!
//! let schema = SchemaBuilder::new()
//!     .item(ItemKind::Point10)
//!     .item(ItemKind::Rgb12)
//!     .chunk_size(5_000)
//!     .build();
//!
//! let mut writer = PointWriter::new(&mut output, schema)?;
//! let record = vec![0u8; 26];
//! writer.write_next(&record)?;
//! writer.done()?; // don't forget: this writes the chunk table
//! # Ok(())
//! # }
//! ```
//!
//! # Decompressing
//!
//! ```
//! use lidarzip::{ItemKind, PointReader, PointWriter, SchemaBuilder};
//!
//! # fn main() -> lidarzip::Result<()> {
//! # let schema = SchemaBuilder::new().item(ItemKind::Point10).build();
//! # let mut stream = std::io::Cursor::new(Vec::new());
//! # {
//! #     let mut writer = PointWriter::new(&mut stream, schema.clone())?;
//! #     writer.write_next(&[0u8; 20])?;
//! #     writer.done()?;
//! # }
//! # stream.set_position(0);
//! // the schema travels with the stream, stored by the container format
//! let mut reader = PointReader::new(stream, schema)?;
//! let mut record = vec![0u8; reader.record_size()];
//! reader.read_next(&mut record)?;
//! # Ok(())
//! # }
//! ```
//!
//! Records cross the API as raw little-endian byte buffers laid out
//! exactly as in a LAS file; the container format owning the records is
//! out of scope here.

pub(crate) mod coder;
pub(crate) mod predictive;

pub mod chunked;
pub mod errors;
pub mod packers;
pub mod point;
pub mod record;

pub use chunked::{
    CompressorKind, ItemKind, PointReader, PointWriter, RecordItem, RecordSchema, SchemaBuilder,
};
pub use errors::LazError;
pub use point::DecompressionSelection;

pub type Result<T> = std::result::Result<T, LazError>;

use std::io::Cursor;

/// Compresses a whole record buffer in one call.
///
/// The output is the standard layout: chunk-table pointer, compressed
/// chunks, chunk table.
pub fn compress_buffer<W: std::io::Write + std::io::Seek>(
    dst: &mut W,
    records: &[u8],
    schema: RecordSchema,
) -> Result<()> {
    let mut writer = PointWriter::new(dst, schema)?;
    writer.write_many(records)?;
    writer.done()
}

/// Decompresses records until `out` is full.
pub fn decompress_buffer(compressed: &[u8], out: &mut [u8], schema: RecordSchema) -> Result<()> {
    let src = Cursor::new(compressed);
    let mut reader = PointReader::new(src, schema)?;
    reader.read_many(out)
}
