//! Chunked stream orchestration: the record schema describing what is
//! compressed and how, the compressed chunk table, and the reader/writer
//! pair that sequences per-attribute codecs over a byte stream.

pub mod reader;
pub mod table;
pub mod writer;

pub use reader::PointReader;
pub use table::{ChunkEntry, ChunkTable};
pub use writer::PointWriter;

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::LazError;
use crate::point::{Nir, Point10, Point14, Rgb, Wavepacket};

/// Number of points per chunk when the caller does not choose one.
pub const DEFAULT_CHUNK_SIZE: u32 = 50_000;

/// Sentinel chunk size meaning chunks end where the caller says they end.
pub const VARIABLE_CHUNK_SIZE: u32 = u32::max_value();

/// How the compressed point stream is organized.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompressorKind {
    /// Raw records, no entropy coding, no chunk table.
    None = 0,
    /// One single entropy-coded run over all points.
    PointWise = 1,
    /// Entropy-coded chunks of `chunk_size` points plus a chunk table.
    PointWiseChunked = 2,
    /// Chunked, with each attribute group in its own sub-stream per chunk.
    LayeredChunked = 3,
}

impl CompressorKind {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(CompressorKind::None),
            1 => Some(CompressorKind::PointWise),
            2 => Some(CompressorKind::PointWiseChunked),
            3 => Some(CompressorKind::LayeredChunked),
            _ => None,
        }
    }

    pub fn is_chunked(self) -> bool {
        match self {
            CompressorKind::PointWiseChunked | CompressorKind::LayeredChunked => true,
            _ => false,
        }
    }
}

/// The attribute groups a record can be made of.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ItemKind {
    /// Opaque extra bytes (legacy point formats).
    Byte(u16),
    /// Core fields of point formats 0-5.
    Point10,
    GpsTime,
    Rgb12,
    /// Waveform descriptor of point formats 4-5.
    Wavepacket13,
    /// Core fields of the extended point formats 6-10.
    Point14,
    Rgb14,
    RgbNir14,
    /// Waveform descriptor of point formats 9-10.
    Wavepacket14,
    /// Opaque extra bytes (extended point formats).
    Byte14(u16),
}

impl ItemKind {
    /// Size of the attribute group on the wire (uncompressed).
    pub fn size(&self) -> u16 {
        match self {
            ItemKind::Byte(count) => *count,
            ItemKind::Point10 => Point10::SIZE as u16,
            ItemKind::GpsTime => std::mem::size_of::<f64>() as u16,
            ItemKind::Rgb12 => Rgb::SIZE as u16,
            ItemKind::Wavepacket13 => Wavepacket::SIZE as u16,
            ItemKind::Point14 => Point14::SIZE as u16,
            ItemKind::Rgb14 => Rgb::SIZE as u16,
            ItemKind::RgbNir14 => (Rgb::SIZE + Nir::SIZE) as u16,
            ItemKind::Wavepacket14 => Wavepacket::SIZE as u16,
            ItemKind::Byte14(count) => *count,
        }
    }

    fn default_version(&self) -> u16 {
        match self {
            ItemKind::Byte(_)
            | ItemKind::Point10
            | ItemKind::GpsTime
            | ItemKind::Rgb12
            | ItemKind::Wavepacket13 => 2,
            ItemKind::Point14
            | ItemKind::Rgb14
            | ItemKind::RgbNir14
            | ItemKind::Wavepacket14
            | ItemKind::Byte14(_) => 3,
        }
    }
}

impl From<ItemKind> for u16 {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Byte(_) => 0,
            ItemKind::Point10 => 6,
            ItemKind::GpsTime => 7,
            ItemKind::Rgb12 => 8,
            ItemKind::Wavepacket13 => 9,
            ItemKind::Point14 => 10,
            ItemKind::Rgb14 => 11,
            ItemKind::RgbNir14 => 12,
            ItemKind::Wavepacket14 => 13,
            ItemKind::Byte14(_) => 14,
        }
    }
}

/// One attribute-group descriptor of the record schema: what it is, its
/// wire size, and the compression revision used for it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RecordItem {
    pub kind: ItemKind,
    pub size: u16,
    pub version: u16,
}

impl RecordItem {
    pub fn new(kind: ItemKind, version: u16) -> Self {
        Self {
            kind,
            size: kind.size(),
            version,
        }
    }

    fn read_from<R: Read>(src: &mut R) -> Result<Self, LazError> {
        let type_tag = src.read_u16::<LittleEndian>()?;
        let size = src.read_u16::<LittleEndian>()?;
        let kind = match type_tag {
            0 => ItemKind::Byte(size),
            6 => ItemKind::Point10,
            7 => ItemKind::GpsTime,
            8 => ItemKind::Rgb12,
            9 => ItemKind::Wavepacket13,
            10 => ItemKind::Point14,
            11 => ItemKind::Rgb14,
            12 => ItemKind::RgbNir14,
            13 => ItemKind::Wavepacket14,
            14 => ItemKind::Byte14(size),
            _ => return Err(LazError::UnknownItemType(type_tag)),
        };
        Ok(Self {
            kind,
            size,
            version: src.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(u16::from(self.kind))?;
        dst.write_u16::<LittleEndian>(self.size)?;
        dst.write_u16::<LittleEndian>(self.version)?;
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Version {
    major: u8,
    minor: u8,
    revision: u16,
}

impl Version {
    fn current() -> Self {
        Self {
            major: 2,
            minor: 2,
            revision: 0,
        }
    }

    fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            major: src.read_u8()?,
            minor: src.read_u8()?,
            revision: src.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u8(self.major)?;
        dst.write_u8(self.minor)?;
        dst.write_u16::<LittleEndian>(self.revision)?;
        Ok(())
    }
}

/// The compression configuration record.
///
/// The surrounding container stores this next to the compressed stream; it
/// carries everything needed to build the codecs again on read: compressor
/// kind, chunking policy and the ordered attribute-group descriptors.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordSchema {
    compressor: CompressorKind,
    /// 0 is the range coder, the only coder there is.
    coder: u16,
    version: Version,
    options: u32,
    chunk_size: u32,
    /// Bookkeeping for special extended records of the container, -1 when
    /// unused; carried through verbatim.
    number_of_special_evlrs: i64,
    offset_to_special_evlrs: i64,
    items: Vec<RecordItem>,
}

impl RecordSchema {
    /// Builds a schema with the default chunking from the given items; the
    /// compressor kind follows the revision of the first item.
    pub fn from_items(items: Vec<RecordItem>) -> Self {
        let first = items
            .first()
            .expect("a record schema needs at least one item");
        let compressor = match first.version {
            1 | 2 => CompressorKind::PointWiseChunked,
            3 | 4 => CompressorKind::LayeredChunked,
            _ => CompressorKind::PointWiseChunked,
        };
        Self {
            compressor,
            coder: 0,
            version: Version::current(),
            options: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            number_of_special_evlrs: -1,
            offset_to_special_evlrs: -1,
            items,
        }
    }

    pub fn read_from<R: Read>(src: &mut R) -> Result<Self, LazError> {
        let compressor_tag = src.read_u16::<LittleEndian>()?;
        let compressor = CompressorKind::from_u16(compressor_tag)
            .ok_or(LazError::UnknownCompressorKind(compressor_tag))?;
        let coder = src.read_u16::<LittleEndian>()?;
        if coder != 0 {
            return Err(LazError::UnknownCoder(coder));
        }
        let version = Version::read_from(src)?;
        let options = src.read_u32::<LittleEndian>()?;
        let chunk_size = src.read_u32::<LittleEndian>()?;
        let number_of_special_evlrs = src.read_i64::<LittleEndian>()?;
        let offset_to_special_evlrs = src.read_i64::<LittleEndian>()?;

        let item_count = src.read_u16::<LittleEndian>()?;
        let mut items = Vec::with_capacity(usize::from(item_count));
        for _ in 0..item_count {
            items.push(RecordItem::read_from(src)?);
        }

        Ok(Self {
            compressor,
            coder,
            version,
            options,
            chunk_size,
            number_of_special_evlrs,
            offset_to_special_evlrs,
            items,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.compressor as u16)?;
        dst.write_u16::<LittleEndian>(self.coder)?;
        self.version.write_to(dst)?;
        dst.write_u32::<LittleEndian>(self.options)?;
        dst.write_u32::<LittleEndian>(self.chunk_size)?;
        dst.write_i64::<LittleEndian>(self.number_of_special_evlrs)?;
        dst.write_i64::<LittleEndian>(self.offset_to_special_evlrs)?;
        dst.write_u16::<LittleEndian>(self.items.len() as u16)?;
        for item in &self.items {
            item.write_to(dst)?;
        }
        Ok(())
    }

    pub fn compressor(&self) -> CompressorKind {
        self.compressor
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn uses_variable_chunks(&self) -> bool {
        self.chunk_size == VARIABLE_CHUNK_SIZE
    }

    pub fn items(&self) -> &[RecordItem] {
        &self.items
    }

    /// Uncompressed size of one whole record.
    pub fn record_size(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.size)).sum()
    }
}

/// Step-by-step construction of a [`RecordSchema`].
pub struct SchemaBuilder {
    items: Vec<RecordItem>,
    chunk_size: u32,
    compressor: Option<CompressorKind>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            compressor: None,
        }
    }

    /// Adds an item compressed with the default revision for its kind.
    pub fn item(mut self, kind: ItemKind) -> Self {
        self.items
            .push(RecordItem::new(kind, kind.default_version()));
        self
    }

    pub fn item_with_version(mut self, kind: ItemKind, version: u16) -> Self {
        self.items.push(RecordItem::new(kind, version));
        self
    }

    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Chunks end on explicit [`PointWriter::finish_chunk`] calls.
    pub fn variable_chunks(mut self) -> Self {
        self.chunk_size = VARIABLE_CHUNK_SIZE;
        self
    }

    /// Store the records without entropy coding.
    pub fn uncompressed(mut self) -> Self {
        self.compressor = Some(CompressorKind::None);
        self
    }

    /// A single entropy-coded run instead of chunks.
    pub fn point_wise(mut self) -> Self {
        self.compressor = Some(CompressorKind::PointWise);
        self
    }

    /// The default item set for a LAS point format id.
    pub fn for_point_format(format_id: u8, num_extra_bytes: u16) -> Result<Self, LazError> {
        let mut builder = Self::new();
        builder = match format_id {
            0 => builder.item(ItemKind::Point10),
            1 => builder.item(ItemKind::Point10).item(ItemKind::GpsTime),
            2 => builder.item(ItemKind::Point10).item(ItemKind::Rgb12),
            3 => builder
                .item(ItemKind::Point10)
                .item(ItemKind::GpsTime)
                .item(ItemKind::Rgb12),
            4 => builder
                .item(ItemKind::Point10)
                .item(ItemKind::GpsTime)
                .item(ItemKind::Wavepacket13),
            5 => builder
                .item(ItemKind::Point10)
                .item(ItemKind::GpsTime)
                .item(ItemKind::Rgb12)
                .item(ItemKind::Wavepacket13),
            6 => builder.item(ItemKind::Point14),
            7 => builder.item(ItemKind::Point14).item(ItemKind::Rgb14),
            8 => builder.item(ItemKind::Point14).item(ItemKind::RgbNir14),
            9 => builder.item(ItemKind::Point14).item(ItemKind::Wavepacket14),
            10 => builder
                .item(ItemKind::Point14)
                .item(ItemKind::RgbNir14)
                .item(ItemKind::Wavepacket14),
            other => return Err(LazError::UnsupportedPointFormat(other)),
        };
        if num_extra_bytes > 0 {
            builder = match format_id {
                0..=5 => builder.item(ItemKind::Byte(num_extra_bytes)),
                _ => builder.item(ItemKind::Byte14(num_extra_bytes)),
            };
        }
        Ok(builder)
    }

    pub fn build(self) -> RecordSchema {
        let mut schema = RecordSchema::from_items(self.items);
        schema.chunk_size = self.chunk_size;
        if let Some(compressor) = self.compressor {
            schema.compressor = compressor;
        }
        schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn schema_wire_round_trip() {
        let schema = SchemaBuilder::new()
            .item(ItemKind::Point10)
            .item(ItemKind::GpsTime)
            .item(ItemKind::Byte(4))
            .chunk_size(1000)
            .build();

        let mut raw = Vec::new();
        schema.write_to(&mut raw).unwrap();
        let read_back = RecordSchema::read_from(&mut std::io::Cursor::new(raw)).unwrap();
        assert_eq!(read_back, schema);
    }

    #[test]
    fn layered_items_pick_layered_compressor() {
        let schema = SchemaBuilder::new().item(ItemKind::Point14).build();
        assert_eq!(schema.compressor(), CompressorKind::LayeredChunked);
        assert_eq!(schema.record_size(), 30);
    }

    #[test]
    fn unknown_item_type_fails_closed() {
        let mut raw = Vec::new();
        SchemaBuilder::new()
            .item(ItemKind::Point10)
            .build()
            .write_to(&mut raw)
            .unwrap();
        // tamper with the item type tag
        let item_offset = raw.len() - 6;
        raw[item_offset] = 42;
        match RecordSchema::read_from(&mut std::io::Cursor::new(raw)) {
            Err(LazError::UnknownItemType(42)) => {}
            other => panic!("expected UnknownItemType, got {:?}", other.map(|_| ())),
        }
    }
}
