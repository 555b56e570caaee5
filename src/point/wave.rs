//! Waveform-packet descriptor codecs.
//!
//! The descriptor tells consumers where a point's waveform samples live in
//! an external store (byte offset + size) plus the return point location
//! and the sampling direction vector. The codec never touches the sample
//! store itself.

use crate::packers::Packable;

/// The 29-byte on-wire waveform packet descriptor.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Wavepacket {
    pub descriptor_index: u8,
    /// Byte offset into the external waveform store.
    pub offset: u64,
    /// Size in bytes of the packet inside the store.
    pub size: u32,
    pub return_point: f32,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

impl Wavepacket {
    pub const SIZE: usize = 29;
}

impl Packable for Wavepacket {
    fn unpack_from(input: &[u8]) -> Self {
        Self {
            descriptor_index: input[0],
            offset: u64::unpack_from(&input[1..9]),
            size: u32::unpack_from(&input[9..13]),
            return_point: f32::unpack_from(&input[13..17]),
            dx: f32::unpack_from(&input[17..21]),
            dy: f32::unpack_from(&input[21..25]),
            dz: f32::unpack_from(&input[25..29]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        output[0] = self.descriptor_index;
        self.offset.pack_into(&mut output[1..9]);
        self.size.pack_into(&mut output[9..13]);
        self.return_point.pack_into(&mut output[13..17]);
        self.dx.pack_into(&mut output[17..21]);
        self.dy.pack_into(&mut output[21..25]);
        self.dz.pack_into(&mut output[25..29]);
    }
}

/// Offset delta classifications; the model for the next classification is
/// selected by the previous one.
const OFFSET_UNCHANGED: u32 = 0;
const OFFSET_ADVANCED_BY_SIZE: u32 = 1;
const OFFSET_SMALL_DELTA: u32 = 2;
const OFFSET_LITERAL: u32 = 3;

const DX_CONTEXT: u32 = 0;
const DY_CONTEXT: u32 = 1;
const DZ_CONTEXT: u32 = 2;

mod state {
    use std::io::{Read, Write};

    use super::*;
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::predictive::{IntCompressor, IntDecompressor};

    fn offset_diff_models() -> [SymbolModel; 4] {
        [
            SymbolModel::new(4),
            SymbolModel::new(4),
            SymbolModel::new(4),
            SymbolModel::new(4),
        ]
    }

    pub(super) struct WaveCompressState {
        pub(super) last: Wavepacket,
        last_offset_diff: i32,
        sym_last_offset_diff: u32,

        packet_index: SymbolModel,
        offset_diff: [SymbolModel; 4],

        ic_offset_diff: IntCompressor,
        ic_packet_size: IntCompressor,
        ic_return_point: IntCompressor,
        ic_xyz: IntCompressor,
    }

    impl WaveCompressState {
        pub(super) fn from_last(last: Wavepacket) -> Self {
            Self {
                last,
                last_offset_diff: 0,
                sym_last_offset_diff: 0,
                packet_index: SymbolModel::new(256),
                offset_diff: offset_diff_models(),
                ic_offset_diff: IntCompressor::new(32, 1).initialized(),
                ic_packet_size: IntCompressor::new(32, 1).initialized(),
                ic_return_point: IntCompressor::new(32, 1).initialized(),
                ic_xyz: IntCompressor::new(32, 3).initialized(),
            }
        }

        pub(super) fn compress_one<W: Write>(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            current: &Wavepacket,
        ) -> std::io::Result<()> {
            encoder.encode_symbol(&mut self.packet_index, u32::from(current.descriptor_index))?;

            let offset_diff_64 = current.offset.wrapping_sub(self.last.offset) as i64;
            let offset_diff_32 = offset_diff_64 as i32;

            if offset_diff_64 == i64::from(offset_diff_32) {
                let sym = if offset_diff_32 == 0 {
                    OFFSET_UNCHANGED
                } else if offset_diff_32 == self.last.size as i32 {
                    OFFSET_ADVANCED_BY_SIZE
                } else {
                    OFFSET_SMALL_DELTA
                };
                encoder.encode_symbol(
                    &mut self.offset_diff[self.sym_last_offset_diff as usize],
                    sym,
                )?;
                if sym == OFFSET_SMALL_DELTA {
                    self.ic_offset_diff.compress(
                        encoder,
                        self.last_offset_diff,
                        offset_diff_32,
                        0,
                    )?;
                    self.last_offset_diff = offset_diff_32;
                }
                self.sym_last_offset_diff = sym;
            } else {
                encoder.encode_symbol(
                    &mut self.offset_diff[self.sym_last_offset_diff as usize],
                    OFFSET_LITERAL,
                )?;
                self.sym_last_offset_diff = OFFSET_LITERAL;
                encoder.write_u64(current.offset)?;
            }

            self.ic_packet_size.compress(
                encoder,
                self.last.size as i32,
                current.size as i32,
                0,
            )?;
            self.ic_return_point.compress(
                encoder,
                self.last.return_point.to_bits() as i32,
                current.return_point.to_bits() as i32,
                0,
            )?;
            self.ic_xyz.compress(
                encoder,
                self.last.dx.to_bits() as i32,
                current.dx.to_bits() as i32,
                DX_CONTEXT,
            )?;
            self.ic_xyz.compress(
                encoder,
                self.last.dy.to_bits() as i32,
                current.dy.to_bits() as i32,
                DY_CONTEXT,
            )?;
            self.ic_xyz.compress(
                encoder,
                self.last.dz.to_bits() as i32,
                current.dz.to_bits() as i32,
                DZ_CONTEXT,
            )?;

            self.last = *current;
            Ok(())
        }
    }

    pub(super) struct WaveDecompressState {
        pub(super) last: Wavepacket,
        last_offset_diff: i32,
        sym_last_offset_diff: u32,

        packet_index: SymbolModel,
        offset_diff: [SymbolModel; 4],

        ic_offset_diff: IntDecompressor,
        ic_packet_size: IntDecompressor,
        ic_return_point: IntDecompressor,
        ic_xyz: IntDecompressor,
    }

    impl WaveDecompressState {
        pub(super) fn from_last(last: Wavepacket) -> Self {
            Self {
                last,
                last_offset_diff: 0,
                sym_last_offset_diff: 0,
                packet_index: SymbolModel::new(256),
                offset_diff: offset_diff_models(),
                ic_offset_diff: IntDecompressor::new(32, 1).initialized(),
                ic_packet_size: IntDecompressor::new(32, 1).initialized(),
                ic_return_point: IntDecompressor::new(32, 1).initialized(),
                ic_xyz: IntDecompressor::new(32, 3).initialized(),
            }
        }

        pub(super) fn decompress_one<R: Read>(
            &mut self,
            decoder: &mut RangeDecoder<R>,
        ) -> std::io::Result<Wavepacket> {
            let mut current = Wavepacket::default();
            current.descriptor_index = decoder.decode_symbol(&mut self.packet_index)? as u8;

            self.sym_last_offset_diff = decoder
                .decode_symbol(&mut self.offset_diff[self.sym_last_offset_diff as usize])?;

            match self.sym_last_offset_diff {
                OFFSET_UNCHANGED => {
                    current.offset = self.last.offset;
                }
                OFFSET_ADVANCED_BY_SIZE => {
                    current.offset = self.last.offset.wrapping_add(u64::from(self.last.size));
                }
                OFFSET_SMALL_DELTA => {
                    self.last_offset_diff =
                        self.ic_offset_diff
                            .decompress(decoder, self.last_offset_diff, 0)?;
                    current.offset = self
                        .last
                        .offset
                        .wrapping_add(self.last_offset_diff as i64 as u64);
                }
                _ => {
                    current.offset = decoder.read_u64()?;
                }
            }

            current.size =
                self.ic_packet_size
                    .decompress(decoder, self.last.size as i32, 0)? as u32;
            current.return_point = f32::from_bits(self.ic_return_point.decompress(
                decoder,
                self.last.return_point.to_bits() as i32,
                0,
            )? as u32);
            current.dx = f32::from_bits(self.ic_xyz.decompress(
                decoder,
                self.last.dx.to_bits() as i32,
                DX_CONTEXT,
            )? as u32);
            current.dy = f32::from_bits(self.ic_xyz.decompress(
                decoder,
                self.last.dy.to_bits() as i32,
                DY_CONTEXT,
            )? as u32);
            current.dz = f32::from_bits(self.ic_xyz.decompress(
                decoder,
                self.last.dz.to_bits() as i32,
                DZ_CONTEXT,
            )? as u32);

            self.last = current;
            Ok(current)
        }
    }
}

/// v2 wavepackets compress exactly like v1.
pub use v1 as v2;

pub mod v1 {
    //! Pointwise wavepacket codec.

    use std::io::{Read, Write};

    use super::state::{WaveCompressState, WaveDecompressState};
    use super::Wavepacket;
    use crate::coder::{RangeDecoder, RangeEncoder};
    use crate::packers::Packable;
    use crate::point::utils::read_and_unpack;
    use crate::record::{FieldCompressor, FieldDecompressor};

    pub struct WavepacketCompressor {
        state: WaveCompressState,
    }

    impl WavepacketCompressor {
        pub fn new() -> Self {
            Self {
                state: WaveCompressState::from_last(Wavepacket::default()),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for WavepacketCompressor {
        fn item_size(&self) -> usize {
            Wavepacket::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.state.last = Wavepacket::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = Wavepacket::unpack_from(buf);
            self.state.compress_one(encoder, &current)
        }
    }

    pub struct WavepacketDecompressor {
        state: WaveDecompressState,
    }

    impl WavepacketDecompressor {
        pub fn new() -> Self {
            Self {
                state: WaveDecompressState::from_last(Wavepacket::default()),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for WavepacketDecompressor {
        fn item_size(&self) -> usize {
            Wavepacket::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.state.last = read_and_unpack::<_, Wavepacket>(src, first)?;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let current = self.state.decompress_one(decoder)?;
            current.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v3 {
    //! Layered wavepacket codec: the v1 algorithm under four
    //! scanner-channel contexts with its own per-chunk layer.

    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    use super::state::{WaveCompressState, WaveDecompressState};
    use super::Wavepacket;
    use crate::packers::Packable;
    use crate::point::utils::{
        copy_layer_to, layer_len, load_layer, new_layer_decoder, new_layer_encoder,
        read_and_unpack, LayerDecoder, LayerEncoder,
    };
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    pub struct WavepacketCompressor {
        encoder: LayerEncoder,
        wavepacket_changed: bool,
        contexts: [Option<WaveCompressState>; 4],
        last_context: usize,
    }

    impl WavepacketCompressor {
        pub fn new() -> Self {
            Self {
                encoder: new_layer_encoder(),
                wavepacket_changed: false,
                contexts: [None, None, None, None],
                last_context: 0,
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for WavepacketCompressor {
        fn item_size(&self) -> usize {
            Wavepacket::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            dst.write_all(first)?;
            self.contexts[*context] =
                Some(WaveCompressState::from_last(Wavepacket::unpack_from(first)));
            self.last_context = *context;
            Ok(())
        }

        fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            let current = Wavepacket::unpack_from(buf);

            if self.last_context != *context {
                if self.contexts[*context].is_none() {
                    let seed = self.contexts[self.last_context].as_ref().unwrap().last;
                    self.contexts[*context] = Some(WaveCompressState::from_last(seed));
                }
                self.last_context = *context;
            }

            let state = self.contexts[self.last_context]
                .as_mut()
                .expect("wavepacket context must be initialized");
            if state.last != current {
                self.wavepacket_changed = true;
            }
            state.compress_one(&mut self.encoder, &current)
        }

        fn write_layer_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.wavepacket_changed {
                self.encoder.done()?;
                dst.write_u32::<LittleEndian>(layer_len(&self.encoder) as u32)
            } else {
                dst.write_u32::<LittleEndian>(0)
            }
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.wavepacket_changed {
                copy_layer_to(&mut self.encoder, dst)?;
            }
            Ok(())
        }
    }

    pub struct WavepacketDecompressor {
        decoder: LayerDecoder,
        wavepacket_changed: bool,
        requested: bool,
        layer_size: u32,
        contexts: [Option<WaveDecompressState>; 4],
        last_context: usize,
    }

    impl WavepacketDecompressor {
        pub fn new(requested: bool) -> Self {
            Self {
                decoder: new_layer_decoder(),
                wavepacket_changed: false,
                requested,
                layer_size: 0,
                contexts: [None, None, None, None],
                last_context: 0,
            }
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for WavepacketDecompressor {
        fn item_size(&self) -> usize {
            Wavepacket::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            for slot in &mut self.contexts {
                *slot = None;
            }
            let first_packet = read_and_unpack::<_, Wavepacket>(src, first)?;
            self.contexts[*context] = Some(WaveDecompressState::from_last(first_packet));
            self.last_context = *context;
            Ok(())
        }

        fn decompress_field(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            if self.last_context != *context {
                if self.contexts[*context].is_none() {
                    let seed = self.contexts[self.last_context].as_ref().unwrap().last;
                    self.contexts[*context] = Some(WaveDecompressState::from_last(seed));
                }
                self.last_context = *context;
            }

            let state = self.contexts[self.last_context]
                .as_mut()
                .expect("wavepacket context must be initialized");
            if self.wavepacket_changed {
                let current = state.decompress_one(&mut self.decoder)?;
                current.pack_into(current_point);
            } else {
                state.last.pack_into(current_point);
            }
            Ok(())
        }

        fn read_layer_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layer_size = src.read_u32::<LittleEndian>()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            self.wavepacket_changed = load_layer(
                self.requested,
                self.layer_size as usize,
                &mut self.decoder,
                src,
            )?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wavepacket_wire_layout() {
        let packet = Wavepacket {
            descriptor_index: 3,
            offset: 0x0102_0304_0506_0708,
            size: 4096,
            return_point: 1.5,
            dx: 0.5,
            dy: -0.5,
            dz: 2.0,
        };
        let mut buf = [0u8; Wavepacket::SIZE];
        packet.pack_into(&mut buf);
        assert_eq!(buf[0], 3);
        assert_eq!(Wavepacket::unpack_from(&buf), packet);
    }
}
