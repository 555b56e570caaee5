//! Composition of per-attribute codecs into whole-record codecs.
//!
//! A record is the concatenation of its attribute groups; each group is
//! handled by one field codec selected from the record schema. Codec
//! selection is a closed enum per compression family, so an unsupported
//! (item kind, revision) pair is rejected exhaustively at setup time and
//! never at coding time.

use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunked::{ItemKind, RecordItem};
use crate::coder::{RangeDecoder, RangeEncoder};
use crate::errors::LazError;
use crate::point::selective::DecompressionSelection;
use crate::point::{color, core, extended, extra, gps, nir, wave};

/***************************************************************************************************
                    Field codec traits
***************************************************************************************************/

/// One attribute group of a pointwise-compressed record.
pub trait FieldCompressor<W: Write> {
    fn item_size(&self) -> usize;

    /// The first record of a chunk is stored raw; it seeds the predictors.
    fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()>;

    fn compress_next(&mut self, encoder: &mut RangeEncoder<W>, buf: &[u8])
        -> std::io::Result<()>;
}

pub trait FieldDecompressor<R: Read> {
    fn item_size(&self) -> usize;

    fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()>;

    fn decompress_next(
        &mut self,
        decoder: &mut RangeDecoder<R>,
        buf: &mut [u8],
    ) -> std::io::Result<()>;
}

/// One attribute group of a layered record; its symbols go to in-memory
/// layers that are flushed as independent sub-streams at chunk end.
pub trait LayeredFieldCompressor<W: Write> {
    fn item_size(&self) -> usize;

    fn init_first_point(
        &mut self,
        dst: &mut W,
        first: &[u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()>;

    fn write_layer_sizes(&mut self, dst: &mut W) -> std::io::Result<()>;
    fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()>;
}

pub trait LayeredFieldDecompressor<R: Read + Seek> {
    fn item_size(&self) -> usize;

    fn init_first_point(
        &mut self,
        src: &mut R,
        first: &mut [u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn decompress_field(
        &mut self,
        current_point: &mut [u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn read_layer_sizes(&mut self, src: &mut R) -> std::io::Result<()>;
    fn read_layers(&mut self, src: &mut R) -> std::io::Result<()>;
}

/***************************************************************************************************
                    Closed codec enums
***************************************************************************************************/

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr, [$($variant:ident),+ $(,)?]) => {
        match $self {
            $(Self::$variant($inner) => $body,)+
        }
    };
}

/// Every supported (item kind, revision) pair of the pointwise family.
pub(crate) enum FieldCodec {
    CoreV1(core::v1::Point10Compressor),
    CoreV2(core::v2::Point10Compressor),
    GpsV1(gps::v1::GpsTimeCompressor),
    GpsV2(gps::v2::GpsTimeCompressor),
    RgbV1(color::v1::RgbCompressor),
    RgbV2(color::v2::RgbCompressor),
    ExtraV1(extra::v1::ExtraBytesCompressor),
    WaveV1(wave::v1::WavepacketCompressor),
}

impl FieldCodec {
    fn for_item(item: &RecordItem) -> Result<Self, LazError> {
        match (item.kind, item.version) {
            (ItemKind::Point10, 1) => Ok(Self::CoreV1(core::v1::Point10Compressor::new())),
            (ItemKind::Point10, 2) => Ok(Self::CoreV2(core::v2::Point10Compressor::new())),
            (ItemKind::GpsTime, 1) => Ok(Self::GpsV1(gps::v1::GpsTimeCompressor::new())),
            (ItemKind::GpsTime, 2) => Ok(Self::GpsV2(gps::v2::GpsTimeCompressor::new())),
            (ItemKind::Rgb12, 1) => Ok(Self::RgbV1(color::v1::RgbCompressor::new())),
            (ItemKind::Rgb12, 2) => Ok(Self::RgbV2(color::v2::RgbCompressor::new())),
            (ItemKind::Byte(n), 1) | (ItemKind::Byte(n), 2) => {
                Ok(Self::ExtraV1(extra::v1::ExtraBytesCompressor::new(n as usize)))
            }
            (ItemKind::Wavepacket13, 1) | (ItemKind::Wavepacket13, 2) => {
                Ok(Self::WaveV1(wave::v1::WavepacketCompressor::new()))
            }
            (kind, version) => Err(LazError::UnsupportedItemVersion(kind, version)),
        }
    }

    fn item_size(&self) -> usize {
        dispatch!(self, c => FieldCompressor::<&mut [u8]>::item_size(c),
            [CoreV1, CoreV2, GpsV1, GpsV2, RgbV1, RgbV2, ExtraV1, WaveV1])
    }

    fn compress_first<W: Write>(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
        dispatch!(self, c => c.compress_first(dst, buf),
            [CoreV1, CoreV2, GpsV1, GpsV2, RgbV1, RgbV2, ExtraV1, WaveV1])
    }

    fn compress_next<W: Write>(
        &mut self,
        encoder: &mut RangeEncoder<W>,
        buf: &[u8],
    ) -> std::io::Result<()> {
        dispatch!(self, c => c.compress_next(encoder, buf),
            [CoreV1, CoreV2, GpsV1, GpsV2, RgbV1, RgbV2, ExtraV1, WaveV1])
    }
}

pub(crate) enum FieldDecodec {
    CoreV1(core::v1::Point10Decompressor),
    CoreV2(core::v2::Point10Decompressor),
    GpsV1(gps::v1::GpsTimeDecompressor),
    GpsV2(gps::v2::GpsTimeDecompressor),
    RgbV1(color::v1::RgbDecompressor),
    RgbV2(color::v2::RgbDecompressor),
    ExtraV1(extra::v1::ExtraBytesDecompressor),
    WaveV1(wave::v1::WavepacketDecompressor),
}

impl FieldDecodec {
    fn for_item(item: &RecordItem) -> Result<Self, LazError> {
        match (item.kind, item.version) {
            (ItemKind::Point10, 1) => Ok(Self::CoreV1(core::v1::Point10Decompressor::new())),
            (ItemKind::Point10, 2) => Ok(Self::CoreV2(core::v2::Point10Decompressor::new())),
            (ItemKind::GpsTime, 1) => Ok(Self::GpsV1(gps::v1::GpsTimeDecompressor::new())),
            (ItemKind::GpsTime, 2) => Ok(Self::GpsV2(gps::v2::GpsTimeDecompressor::new())),
            (ItemKind::Rgb12, 1) => Ok(Self::RgbV1(color::v1::RgbDecompressor::new())),
            (ItemKind::Rgb12, 2) => Ok(Self::RgbV2(color::v2::RgbDecompressor::new())),
            (ItemKind::Byte(n), 1) | (ItemKind::Byte(n), 2) => Ok(Self::ExtraV1(
                extra::v1::ExtraBytesDecompressor::new(n as usize),
            )),
            (ItemKind::Wavepacket13, 1) | (ItemKind::Wavepacket13, 2) => {
                Ok(Self::WaveV1(wave::v1::WavepacketDecompressor::new()))
            }
            (kind, version) => Err(LazError::UnsupportedItemVersion(kind, version)),
        }
    }

    fn item_size(&self) -> usize {
        dispatch!(self, d => FieldDecompressor::<&[u8]>::item_size(d),
            [CoreV1, CoreV2, GpsV1, GpsV2, RgbV1, RgbV2, ExtraV1, WaveV1])
    }

    fn decompress_first<R: Read>(
        &mut self,
        src: &mut R,
        first: &mut [u8],
    ) -> std::io::Result<()> {
        dispatch!(self, d => d.decompress_first(src, first),
            [CoreV1, CoreV2, GpsV1, GpsV2, RgbV1, RgbV2, ExtraV1, WaveV1])
    }

    fn decompress_next<R: Read>(
        &mut self,
        decoder: &mut RangeDecoder<R>,
        buf: &mut [u8],
    ) -> std::io::Result<()> {
        dispatch!(self, d => d.decompress_next(decoder, buf),
            [CoreV1, CoreV2, GpsV1, GpsV2, RgbV1, RgbV2, ExtraV1, WaveV1])
    }
}

/// Every supported (item kind, revision) pair of the layered family.
/// Version 4 streams are coded identically to version 3.
pub(crate) enum LayerCodec {
    Point14V3(extended::v3::Point14Compressor),
    Rgb14V3(color::v3::RgbCompressor),
    Nir14V3(nir::v3::NirCompressor),
    Wave14V3(wave::v3::WavepacketCompressor),
    Extra14V3(extra::v3::ExtraBytesCompressor),
}

impl LayerCodec {
    fn for_item(item: &RecordItem) -> Result<Vec<Self>, LazError> {
        match (item.kind, item.version) {
            (ItemKind::Point14, 3) | (ItemKind::Point14, 4) => {
                Ok(vec![Self::Point14V3(extended::v3::Point14Compressor::new())])
            }
            (ItemKind::Rgb14, 3) | (ItemKind::Rgb14, 4) => {
                Ok(vec![Self::Rgb14V3(color::v3::RgbCompressor::new())])
            }
            (ItemKind::RgbNir14, 3) | (ItemKind::RgbNir14, 4) => Ok(vec![
                Self::Rgb14V3(color::v3::RgbCompressor::new()),
                Self::Nir14V3(nir::v3::NirCompressor::new()),
            ]),
            (ItemKind::Wavepacket14, 3) | (ItemKind::Wavepacket14, 4) => {
                Ok(vec![Self::Wave14V3(wave::v3::WavepacketCompressor::new())])
            }
            (ItemKind::Byte14(n), 3) | (ItemKind::Byte14(n), 4) => Ok(vec![Self::Extra14V3(
                extra::v3::ExtraBytesCompressor::new(n as usize),
            )]),
            (kind, version) => Err(LazError::UnsupportedItemVersion(kind, version)),
        }
    }

    fn item_size(&self) -> usize {
        dispatch!(self, c => LayeredFieldCompressor::<&mut [u8]>::item_size(c),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn init_first_point<W: Write>(
        &mut self,
        dst: &mut W,
        first: &[u8],
        context: &mut usize,
    ) -> std::io::Result<()> {
        dispatch!(self, c => c.init_first_point(dst, first, context),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
        dispatch!(self, c => LayeredFieldCompressor::<&mut [u8]>::compress_field(c, buf, context),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn write_layer_sizes<W: Write>(&mut self, dst: &mut W) -> std::io::Result<()> {
        dispatch!(self, c => c.write_layer_sizes(dst),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn write_layers<W: Write>(&mut self, dst: &mut W) -> std::io::Result<()> {
        dispatch!(self, c => c.write_layers(dst),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }
}

pub(crate) enum LayerDecodec {
    Point14V3(extended::v3::Point14Decompressor),
    Rgb14V3(color::v3::RgbDecompressor),
    Nir14V3(nir::v3::NirDecompressor),
    Wave14V3(wave::v3::WavepacketDecompressor),
    Extra14V3(extra::v3::ExtraBytesDecompressor),
}

impl LayerDecodec {
    fn for_item(
        item: &RecordItem,
        selection: DecompressionSelection,
    ) -> Result<Vec<Self>, LazError> {
        match (item.kind, item.version) {
            (ItemKind::Point14, 3) | (ItemKind::Point14, 4) => Ok(vec![Self::Point14V3(
                extended::v3::Point14Decompressor::selective(selection),
            )]),
            (ItemKind::Rgb14, 3) | (ItemKind::Rgb14, 4) => Ok(vec![Self::Rgb14V3(
                color::v3::RgbDecompressor::new(selection.wants_rgb()),
            )]),
            (ItemKind::RgbNir14, 3) | (ItemKind::RgbNir14, 4) => Ok(vec![
                Self::Rgb14V3(color::v3::RgbDecompressor::new(selection.wants_rgb())),
                Self::Nir14V3(nir::v3::NirDecompressor::new(selection.wants_nir())),
            ]),
            (ItemKind::Wavepacket14, 3) | (ItemKind::Wavepacket14, 4) => {
                Ok(vec![Self::Wave14V3(wave::v3::WavepacketDecompressor::new(
                    selection.wants_wavepacket(),
                ))])
            }
            (ItemKind::Byte14(n), 3) | (ItemKind::Byte14(n), 4) => {
                Ok(vec![Self::Extra14V3(extra::v3::ExtraBytesDecompressor::new(
                    n as usize,
                    selection.wants_extra_bytes(),
                ))])
            }
            (kind, version) => Err(LazError::UnsupportedItemVersion(kind, version)),
        }
    }

    fn item_size(&self) -> usize {
        dispatch!(self, d => LayeredFieldDecompressor::<std::io::Cursor<&[u8]>>::item_size(d),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn init_first_point<R: Read + Seek>(
        &mut self,
        src: &mut R,
        first: &mut [u8],
        context: &mut usize,
    ) -> std::io::Result<()> {
        dispatch!(self, d => d.init_first_point(src, first, context),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn decompress_field(
        &mut self,
        current_point: &mut [u8],
        context: &mut usize,
    ) -> std::io::Result<()> {
        dispatch!(
            self,
            d => LayeredFieldDecompressor::<std::io::Cursor<&[u8]>>::decompress_field(
                d, current_point, context),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn read_layer_sizes<R: Read + Seek>(&mut self, src: &mut R) -> std::io::Result<()> {
        dispatch!(self, d => d.read_layer_sizes(src),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }

    fn read_layers<R: Read + Seek>(&mut self, src: &mut R) -> std::io::Result<()> {
        dispatch!(self, d => d.read_layers(src),
            [Point14V3, Rgb14V3, Nir14V3, Wave14V3, Extra14V3])
    }
}

/***************************************************************************************************
                    Record compressors
***************************************************************************************************/

/// Pointwise whole-record compressor: one shared range coder, the first
/// record of each chunk raw.
pub struct PointwiseRecordCompressor<W: Write> {
    encoder: RangeEncoder<W>,
    fields: Vec<FieldCodec>,
    record_size: usize,
    first_record: bool,
}

impl<W: Write> PointwiseRecordCompressor<W> {
    pub fn new(dst: W) -> Self {
        Self {
            encoder: RangeEncoder::new(dst),
            fields: Vec::new(),
            record_size: 0,
            first_record: true,
        }
    }

    pub fn set_layout(&mut self, items: &[RecordItem]) -> Result<(), LazError> {
        for item in items {
            let codec = FieldCodec::for_item(item)?;
            self.record_size += codec.item_size();
            self.fields.push(codec);
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn compress_next(&mut self, input: &[u8]) -> std::io::Result<()> {
        let mut start = 0;
        if self.first_record {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.compress_first(self.encoder.get_mut(), &input[start..end])?;
                start = end;
            }
            self.first_record = false;
        } else {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.compress_next(&mut self.encoder, &input[start..end])?;
                start = end;
            }
        }
        Ok(())
    }

    pub fn done(&mut self) -> std::io::Result<()> {
        self.encoder.done()
    }

    pub fn reset(&mut self) {
        self.encoder.reinit();
        self.fields.clear();
        self.record_size = 0;
        self.first_record = true;
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.encoder.get_mut()
    }

    pub fn get_ref(&self) -> &W {
        self.encoder.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.encoder.into_inner()
    }
}

/// Layered whole-record compressor: fields write into in-memory layers,
/// flushed as `point count + layer sizes + layer payloads` at chunk end.
pub struct LayeredRecordCompressor<W: Write> {
    dst: W,
    fields: Vec<LayerCodec>,
    record_size: usize,
    point_count: u32,
}

impl<W: Write> LayeredRecordCompressor<W> {
    pub fn new(dst: W) -> Self {
        Self {
            dst,
            fields: Vec::new(),
            record_size: 0,
            point_count: 0,
        }
    }

    pub fn set_layout(&mut self, items: &[RecordItem]) -> Result<(), LazError> {
        for item in items {
            for codec in LayerCodec::for_item(item)? {
                self.record_size += codec.item_size();
                self.fields.push(codec);
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn compress_next(&mut self, input: &[u8]) -> std::io::Result<()> {
        let mut context = 0usize;
        let mut start = 0;
        if self.point_count == 0 {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.init_first_point(&mut self.dst, &input[start..end], &mut context)?;
                start = end;
            }
        } else {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.compress_field(&input[start..end], &mut context)?;
                start = end;
            }
        }
        self.point_count += 1;
        Ok(())
    }

    pub fn done(&mut self) -> std::io::Result<()> {
        if self.point_count > 0 {
            self.dst.write_u32::<LittleEndian>(self.point_count)?;
            for field in &mut self.fields {
                field.write_layer_sizes(&mut self.dst)?;
            }
            for field in &mut self.fields {
                field.write_layers(&mut self.dst)?;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.fields.clear();
        self.record_size = 0;
        self.point_count = 0;
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dst
    }

    pub fn get_ref(&self) -> &W {
        &self.dst
    }

    pub fn into_inner(self) -> W {
        self.dst
    }
}

/// The two compression families behind one face; picked from the revision
/// of the first schema item.
pub enum RecordCompressor<W: Write> {
    Pointwise(PointwiseRecordCompressor<W>),
    Layered(LayeredRecordCompressor<W>),
}

impl<W: Write> RecordCompressor<W> {
    /// Builds the right compressor family for `items` and arms it.
    pub fn with_record_layout(dst: W, items: &[RecordItem]) -> Result<Self, LazError> {
        let first = items
            .first()
            .expect("a record layout needs at least one item");
        let mut compressor = match first.version {
            1 | 2 => RecordCompressor::Pointwise(PointwiseRecordCompressor::new(dst)),
            3 | 4 => RecordCompressor::Layered(LayeredRecordCompressor::new(dst)),
            _ => {
                return Err(LazError::UnsupportedItemVersion(first.kind, first.version));
            }
        };
        compressor.set_layout(items)?;
        Ok(compressor)
    }

    pub fn set_layout(&mut self, items: &[RecordItem]) -> Result<(), LazError> {
        match self {
            RecordCompressor::Pointwise(c) => c.set_layout(items),
            RecordCompressor::Layered(c) => c.set_layout(items),
        }
    }

    pub fn record_size(&self) -> usize {
        match self {
            RecordCompressor::Pointwise(c) => c.record_size(),
            RecordCompressor::Layered(c) => c.record_size(),
        }
    }

    pub fn compress_next(&mut self, input: &[u8]) -> std::io::Result<()> {
        match self {
            RecordCompressor::Pointwise(c) => c.compress_next(input),
            RecordCompressor::Layered(c) => c.compress_next(input),
        }
    }

    pub fn done(&mut self) -> std::io::Result<()> {
        match self {
            RecordCompressor::Pointwise(c) => c.done(),
            RecordCompressor::Layered(c) => c.done(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            RecordCompressor::Pointwise(c) => c.reset(),
            RecordCompressor::Layered(c) => c.reset(),
        }
    }

    pub fn get_mut(&mut self) -> &mut W {
        match self {
            RecordCompressor::Pointwise(c) => c.get_mut(),
            RecordCompressor::Layered(c) => c.get_mut(),
        }
    }

    pub fn get_ref(&self) -> &W {
        match self {
            RecordCompressor::Pointwise(c) => c.get_ref(),
            RecordCompressor::Layered(c) => c.get_ref(),
        }
    }

    pub fn into_inner(self) -> W {
        match self {
            RecordCompressor::Pointwise(c) => c.into_inner(),
            RecordCompressor::Layered(c) => c.into_inner(),
        }
    }
}

/***************************************************************************************************
                    Record decompressors
***************************************************************************************************/

pub struct PointwiseRecordDecompressor<R: Read> {
    decoder: RangeDecoder<R>,
    fields: Vec<FieldDecodec>,
    record_size: usize,
    first_record: bool,
}

impl<R: Read> PointwiseRecordDecompressor<R> {
    pub fn new(src: R) -> Self {
        Self {
            decoder: RangeDecoder::new(src),
            fields: Vec::new(),
            record_size: 0,
            first_record: true,
        }
    }

    pub fn set_layout(&mut self, items: &[RecordItem]) -> Result<(), LazError> {
        for item in items {
            let codec = FieldDecodec::for_item(item)?;
            self.record_size += codec.item_size();
            self.fields.push(codec);
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        let mut start = 0;
        if self.first_record {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.decompress_first(self.decoder.get_mut(), &mut out[start..end])?;
                start = end;
            }
            self.first_record = false;
            // arm the coder only after the raw first record
            self.decoder.read_init_bytes()?;
        } else {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.decompress_next(&mut self.decoder, &mut out[start..end])?;
                start = end;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.decoder.reinit();
        self.fields.clear();
        self.record_size = 0;
        self.first_record = true;
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.decoder.get_mut()
    }

    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }
}

pub struct LayeredRecordDecompressor<R: Read + Seek> {
    src: R,
    fields: Vec<LayerDecodec>,
    record_size: usize,
    first_record: bool,
    chunk_point_count: u32,
    selection: DecompressionSelection,
}

impl<R: Read + Seek> LayeredRecordDecompressor<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            fields: Vec::new(),
            record_size: 0,
            first_record: true,
            chunk_point_count: 0,
            selection: DecompressionSelection::all(),
        }
    }

    pub fn set_selection(&mut self, selection: DecompressionSelection) {
        self.selection = selection;
    }

    pub fn set_layout(&mut self, items: &[RecordItem]) -> Result<(), LazError> {
        for item in items {
            for codec in LayerDecodec::for_item(item, self.selection)? {
                self.record_size += codec.item_size();
                self.fields.push(codec);
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of points the current chunk declared in its header; valid
    /// after the first record of the chunk was read.
    pub fn chunk_point_count(&self) -> u32 {
        self.chunk_point_count
    }

    pub fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        let mut context = 0usize;
        let mut start = 0;
        if self.first_record {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.init_first_point(&mut self.src, &mut out[start..end], &mut context)?;
                start = end;
            }
            self.chunk_point_count = self.src.read_u32::<LittleEndian>()?;
            for field in &mut self.fields {
                field.read_layer_sizes(&mut self.src)?;
            }
            for field in &mut self.fields {
                field.read_layers(&mut self.src)?;
            }
            self.first_record = false;
        } else {
            for field in &mut self.fields {
                let end = start + field.item_size();
                field.decompress_field(&mut out[start..end], &mut context)?;
                start = end;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.fields.clear();
        self.record_size = 0;
        self.first_record = true;
        self.chunk_point_count = 0;
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.src
    }

    pub fn into_inner(self) -> R {
        self.src
    }
}

pub enum RecordDecompressor<R: Read + Seek> {
    Pointwise(PointwiseRecordDecompressor<R>),
    Layered(LayeredRecordDecompressor<R>),
}

impl<R: Read + Seek> RecordDecompressor<R> {
    pub fn with_record_layout(
        src: R,
        items: &[RecordItem],
        selection: DecompressionSelection,
    ) -> Result<Self, LazError> {
        let first = items
            .first()
            .expect("a record layout needs at least one item");
        let mut decompressor = match first.version {
            1 | 2 => RecordDecompressor::Pointwise(PointwiseRecordDecompressor::new(src)),
            3 | 4 => {
                let mut layered = LayeredRecordDecompressor::new(src);
                layered.set_selection(selection);
                RecordDecompressor::Layered(layered)
            }
            _ => {
                return Err(LazError::UnsupportedItemVersion(first.kind, first.version));
            }
        };
        decompressor.set_layout(items)?;
        Ok(decompressor)
    }

    pub fn set_layout(&mut self, items: &[RecordItem]) -> Result<(), LazError> {
        match self {
            RecordDecompressor::Pointwise(d) => d.set_layout(items),
            RecordDecompressor::Layered(d) => d.set_layout(items),
        }
    }

    pub fn record_size(&self) -> usize {
        match self {
            RecordDecompressor::Pointwise(d) => d.record_size(),
            RecordDecompressor::Layered(d) => d.record_size(),
        }
    }

    pub fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        match self {
            RecordDecompressor::Pointwise(d) => d.decompress_next(out),
            RecordDecompressor::Layered(d) => d.decompress_next(out),
        }
    }

    /// For layered chunks, the point count embedded in the chunk header.
    pub fn chunk_point_count(&self) -> Option<u32> {
        match self {
            RecordDecompressor::Pointwise(_) => None,
            RecordDecompressor::Layered(d) => Some(d.chunk_point_count()),
        }
    }

    pub fn reset(&mut self) {
        match self {
            RecordDecompressor::Pointwise(d) => d.reset(),
            RecordDecompressor::Layered(d) => d.reset(),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        match self {
            RecordDecompressor::Pointwise(d) => d.get_mut(),
            RecordDecompressor::Layered(d) => d.get_mut(),
        }
    }

    pub fn into_inner(self) -> R {
        match self {
            RecordDecompressor::Pointwise(d) => d.into_inner(),
            RecordDecompressor::Layered(d) => d.into_inner(),
        }
    }
}
