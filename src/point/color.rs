/*
===============================================================================

  CONTENTS:
    RGB color codecs

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free
    Software Foundation.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

===============================================================================
*/

use crate::packers::Packable;
use crate::point::utils::{lower_byte, upper_byte};

/// A 16-bit-per-channel color sample.
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct Rgb {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl Rgb {
    pub const SIZE: usize = 6;
}

impl Packable for Rgb {
    fn unpack_from(input: &[u8]) -> Self {
        Self {
            red: u16::unpack_from(&input[0..2]),
            green: u16::unpack_from(&input[2..4]),
            blue: u16::unpack_from(&input[4..6]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.red.pack_into(&mut output[0..2]);
        self.green.pack_into(&mut output[2..4]);
        self.blue.pack_into(&mut output[4..6]);
    }
}

/// Which of the six channel bytes changed, plus (bit 6) whether the three
/// channels differ from each other at all.
pub(crate) struct ByteUsedMask(pub(crate) u8);

impl ByteUsedMask {
    pub(crate) fn between(current: &Rgb, last: &Rgb) -> Self {
        let inter_channel = lower_byte(current.red) != lower_byte(current.green)
            || lower_byte(current.red) != lower_byte(current.blue)
            || upper_byte(current.red) != upper_byte(current.green)
            || upper_byte(current.red) != upper_byte(current.blue);
        let mask = (lower_byte(last.red) != lower_byte(current.red)) as u8
            | ((upper_byte(last.red) != upper_byte(current.red)) as u8) << 1
            | ((lower_byte(last.green) != lower_byte(current.green)) as u8) << 2
            | ((upper_byte(last.green) != upper_byte(current.green)) as u8) << 3
            | ((lower_byte(last.blue) != lower_byte(current.blue)) as u8) << 4
            | ((upper_byte(last.blue) != upper_byte(current.blue)) as u8) << 5
            | (inter_channel as u8) << 6;
        Self(mask)
    }

    pub(crate) fn lower_red(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    pub(crate) fn upper_red(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    pub(crate) fn lower_green(&self) -> bool {
        self.0 & (1 << 2) != 0
    }

    pub(crate) fn upper_green(&self) -> bool {
        self.0 & (1 << 3) != 0
    }

    pub(crate) fn lower_blue(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    pub(crate) fn upper_blue(&self) -> bool {
        self.0 & (1 << 5) != 0
    }

    pub(crate) fn channels_differ(&self) -> bool {
        self.0 & (1 << 6) != 0
    }
}

pub mod v1 {
    //! First-generation color codec: every changed byte is coded through
    //! the predictive integer codec with one context per channel byte.

    use std::io::{Read, Write};

    use super::{ByteUsedMask, Rgb};
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::packers::Packable;
    use crate::point::utils::{lower_byte, read_and_unpack, upper_byte};
    use crate::predictive::{IntCompressor, IntDecompressor};
    use crate::record::{FieldCompressor, FieldDecompressor};

    const LOWER_RED: u32 = 0;
    const UPPER_RED: u32 = 1;
    const LOWER_GREEN: u32 = 2;
    const UPPER_GREEN: u32 = 3;
    const LOWER_BLUE: u32 = 4;
    const UPPER_BLUE: u32 = 5;

    pub struct RgbCompressor {
        last: Rgb,
        byte_used: SymbolModel,
        ic_rgb: IntCompressor,
    }

    impl RgbCompressor {
        pub fn new() -> Self {
            Self {
                last: Rgb::default(),
                byte_used: SymbolModel::new(64),
                ic_rgb: IntCompressor::new(8, 6).initialized(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for RgbCompressor {
        fn item_size(&self) -> usize {
            Rgb::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.last = Rgb::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = Rgb::unpack_from(buf);
            // v1 has no inter-channel bit, only the six byte flags
            let mask = ByteUsedMask::between(&current, &self.last).0 & 0x3F;
            encoder.encode_symbol(&mut self.byte_used, u32::from(mask))?;
            let mask = ByteUsedMask(mask);

            if mask.lower_red() {
                self.ic_rgb.compress(
                    encoder,
                    i32::from(lower_byte(self.last.red)),
                    i32::from(lower_byte(current.red)),
                    LOWER_RED,
                )?;
            }
            if mask.upper_red() {
                self.ic_rgb.compress(
                    encoder,
                    i32::from(upper_byte(self.last.red)),
                    i32::from(upper_byte(current.red)),
                    UPPER_RED,
                )?;
            }
            if mask.lower_green() {
                self.ic_rgb.compress(
                    encoder,
                    i32::from(lower_byte(self.last.green)),
                    i32::from(lower_byte(current.green)),
                    LOWER_GREEN,
                )?;
            }
            if mask.upper_green() {
                self.ic_rgb.compress(
                    encoder,
                    i32::from(upper_byte(self.last.green)),
                    i32::from(upper_byte(current.green)),
                    UPPER_GREEN,
                )?;
            }
            if mask.lower_blue() {
                self.ic_rgb.compress(
                    encoder,
                    i32::from(lower_byte(self.last.blue)),
                    i32::from(lower_byte(current.blue)),
                    LOWER_BLUE,
                )?;
            }
            if mask.upper_blue() {
                self.ic_rgb.compress(
                    encoder,
                    i32::from(upper_byte(self.last.blue)),
                    i32::from(upper_byte(current.blue)),
                    UPPER_BLUE,
                )?;
            }
            self.last = current;
            Ok(())
        }
    }

    pub struct RgbDecompressor {
        last: Rgb,
        byte_used: SymbolModel,
        ic_rgb: IntDecompressor,
    }

    impl RgbDecompressor {
        pub fn new() -> Self {
            Self {
                last: Rgb::default(),
                byte_used: SymbolModel::new(64),
                ic_rgb: IntDecompressor::new(8, 6).initialized(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for RgbDecompressor {
        fn item_size(&self) -> usize {
            Rgb::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.last = read_and_unpack::<_, Rgb>(src, first)?;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let mask = ByteUsedMask(decoder.decode_symbol(&mut self.byte_used)? as u8);

            if mask.lower_red() {
                let byte = self.ic_rgb.decompress(
                    decoder,
                    i32::from(lower_byte(self.last.red)),
                    LOWER_RED,
                )?;
                self.last.red = byte as u16 | (self.last.red & 0xFF00);
            }
            if mask.upper_red() {
                let byte = self.ic_rgb.decompress(
                    decoder,
                    i32::from(upper_byte(self.last.red)),
                    UPPER_RED,
                )?;
                self.last.red = (byte as u16) << 8 | (self.last.red & 0x00FF);
            }
            if mask.lower_green() {
                let byte = self.ic_rgb.decompress(
                    decoder,
                    i32::from(lower_byte(self.last.green)),
                    LOWER_GREEN,
                )?;
                self.last.green = byte as u16 | (self.last.green & 0xFF00);
            }
            if mask.upper_green() {
                let byte = self.ic_rgb.decompress(
                    decoder,
                    i32::from(upper_byte(self.last.green)),
                    UPPER_GREEN,
                )?;
                self.last.green = (byte as u16) << 8 | (self.last.green & 0x00FF);
            }
            if mask.lower_blue() {
                let byte = self.ic_rgb.decompress(
                    decoder,
                    i32::from(lower_byte(self.last.blue)),
                    LOWER_BLUE,
                )?;
                self.last.blue = byte as u16 | (self.last.blue & 0xFF00);
            }
            if mask.upper_blue() {
                let byte = self.ic_rgb.decompress(
                    decoder,
                    i32::from(upper_byte(self.last.blue)),
                    UPPER_BLUE,
                )?;
                self.last.blue = (byte as u16) << 8 | (self.last.blue & 0x00FF);
            }

            self.last.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v2 {
    //! Second-generation color codec with chained channel prediction: the
    //! green and blue bytes are predicted from the already-coded red delta.

    use std::io::{Read, Write};

    use super::{ByteUsedMask, Rgb};
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::packers::Packable;
    use crate::point::utils::{lower_byte, read_and_unpack, u8_clamp, upper_byte};
    use crate::record::{FieldCompressor, FieldDecompressor};

    pub(crate) struct RgbModels {
        byte_used: SymbolModel,
        lower_red: SymbolModel,
        upper_red: SymbolModel,
        lower_green: SymbolModel,
        upper_green: SymbolModel,
        lower_blue: SymbolModel,
        upper_blue: SymbolModel,
    }

    impl Default for RgbModels {
        fn default() -> Self {
            Self {
                byte_used: SymbolModel::new(128),
                lower_red: SymbolModel::new(256),
                upper_red: SymbolModel::new(256),
                lower_green: SymbolModel::new(256),
                upper_green: SymbolModel::new(256),
                lower_blue: SymbolModel::new(256),
                upper_blue: SymbolModel::new(256),
            }
        }
    }

    pub(crate) fn compress_rgb_with<W: Write>(
        encoder: &mut RangeEncoder<W>,
        models: &mut RgbModels,
        current: &Rgb,
        last: &Rgb,
    ) -> std::io::Result<()> {
        let mask = ByteUsedMask::between(current, last);
        encoder.encode_symbol(&mut models.byte_used, u32::from(mask.0))?;

        let mut diff_l = 0i32;
        let mut diff_h = 0i32;

        if mask.lower_red() {
            diff_l = i32::from(lower_byte(current.red)) - i32::from(lower_byte(last.red));
            encoder.encode_symbol(&mut models.lower_red, u32::from(diff_l as u8))?;
        }
        if mask.upper_red() {
            diff_h = i32::from(upper_byte(current.red)) - i32::from(upper_byte(last.red));
            encoder.encode_symbol(&mut models.upper_red, u32::from(diff_h as u8))?;
        }
        if mask.channels_differ() {
            if mask.lower_green() {
                let corr = i32::from(lower_byte(current.green))
                    - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last.green))));
                encoder.encode_symbol(&mut models.lower_green, u32::from(corr as u8))?;
            }
            if mask.lower_blue() {
                diff_l = (diff_l + i32::from(lower_byte(current.green))
                    - i32::from(lower_byte(last.green)))
                    / 2;
                let corr = i32::from(lower_byte(current.blue))
                    - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last.blue))));
                encoder.encode_symbol(&mut models.lower_blue, u32::from(corr as u8))?;
            }
            if mask.upper_green() {
                let corr = i32::from(upper_byte(current.green))
                    - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last.green))));
                encoder.encode_symbol(&mut models.upper_green, u32::from(corr as u8))?;
            }
            if mask.upper_blue() {
                diff_h = (diff_h + i32::from(upper_byte(current.green))
                    - i32::from(upper_byte(last.green)))
                    / 2;
                let corr = i32::from(upper_byte(current.blue))
                    - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last.blue))));
                encoder.encode_symbol(&mut models.upper_blue, u32::from(corr as u8))?;
            }
        }
        Ok(())
    }

    pub(crate) fn decompress_rgb_with<R: Read>(
        decoder: &mut RangeDecoder<R>,
        models: &mut RgbModels,
        last: &Rgb,
    ) -> std::io::Result<Rgb> {
        let mask = ByteUsedMask(decoder.decode_symbol(&mut models.byte_used)? as u8);
        let mut current = Rgb::default();

        if mask.lower_red() {
            let corr = decoder.decode_symbol(&mut models.lower_red)? as u8;
            current.red = u16::from(corr.wrapping_add(lower_byte(last.red)));
        } else {
            current.red = last.red & 0x00FF;
        }
        if mask.upper_red() {
            let corr = decoder.decode_symbol(&mut models.upper_red)? as u8;
            current.red |= u16::from(corr.wrapping_add(upper_byte(last.red))) << 8;
        } else {
            current.red |= last.red & 0xFF00;
        }

        if mask.channels_differ() {
            let mut diff = i32::from(lower_byte(current.red)) - i32::from(lower_byte(last.red));
            if mask.lower_green() {
                let corr = decoder.decode_symbol(&mut models.lower_green)? as u8;
                current.green = u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.green)))),
                );
            } else {
                current.green = last.green & 0x00FF;
            }
            if mask.lower_blue() {
                let corr = decoder.decode_symbol(&mut models.lower_blue)? as u8;
                diff = (diff + i32::from(lower_byte(current.green))
                    - i32::from(lower_byte(last.green)))
                    / 2;
                current.blue = u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.blue)))),
                );
            } else {
                current.blue = last.blue & 0x00FF;
            }

            let mut diff = i32::from(upper_byte(current.red)) - i32::from(upper_byte(last.red));
            if mask.upper_green() {
                let corr = decoder.decode_symbol(&mut models.upper_green)? as u8;
                current.green |= u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.green)))),
                ) << 8;
            } else {
                current.green |= last.green & 0xFF00;
            }
            if mask.upper_blue() {
                let corr = decoder.decode_symbol(&mut models.upper_blue)? as u8;
                diff = (diff + i32::from(upper_byte(current.green))
                    - i32::from(upper_byte(last.green)))
                    / 2;
                current.blue |= u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.blue)))),
                ) << 8;
            } else {
                current.blue |= last.blue & 0xFF00;
            }
        } else {
            current.green = current.red;
            current.blue = current.red;
        }
        Ok(current)
    }

    pub struct RgbCompressor {
        last: Rgb,
        models: RgbModels,
    }

    impl RgbCompressor {
        pub fn new() -> Self {
            Self {
                last: Rgb::default(),
                models: RgbModels::default(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for RgbCompressor {
        fn item_size(&self) -> usize {
            Rgb::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.last = Rgb::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = Rgb::unpack_from(buf);
            compress_rgb_with(encoder, &mut self.models, &current, &self.last)?;
            self.last = current;
            Ok(())
        }
    }

    pub struct RgbDecompressor {
        last: Rgb,
        models: RgbModels,
    }

    impl RgbDecompressor {
        pub fn new() -> Self {
            Self {
                last: Rgb::default(),
                models: RgbModels::default(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for RgbDecompressor {
        fn item_size(&self) -> usize {
            Rgb::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.last = read_and_unpack::<_, Rgb>(src, first)?;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let current = decompress_rgb_with(decoder, &mut self.models, &self.last)?;
            self.last = current;
            current.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v3 {
    //! Layered color codec: the v2 algorithm under four scanner-channel
    //! contexts, writing one independent color layer per chunk.

    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    use super::v2::{compress_rgb_with, decompress_rgb_with, RgbModels};
    use super::Rgb;
    use crate::packers::Packable;
    use crate::point::utils::{
        copy_layer_to, layer_len, load_layer, new_layer_decoder, new_layer_encoder,
        read_and_unpack, LayerDecoder, LayerEncoder,
    };
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    pub struct RgbCompressor {
        encoder: LayerEncoder,
        rgb_changed: bool,
        contexts: [Option<RgbModels>; 4],
        // the last values deliberately keep tracking the slot of the
        // previous context after a switch to an already-seen channel; the
        // stream format behaves that way
        last_rgbs: [Rgb; 4],
        last_context: usize,
    }

    impl RgbCompressor {
        pub fn new() -> Self {
            Self {
                encoder: new_layer_encoder(),
                rgb_changed: false,
                contexts: [None, None, None, None],
                last_rgbs: [Rgb::default(); 4],
                last_context: 0,
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for RgbCompressor {
        fn item_size(&self) -> usize {
            Rgb::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            dst.write_all(first)?;
            self.contexts[*context] = Some(RgbModels::default());
            self.last_rgbs[*context] = Rgb::unpack_from(first);
            self.last_context = *context;
            Ok(())
        }

        fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            let current = Rgb::unpack_from(buf);
            let mut last_slot = self.last_context;

            if self.last_context != *context {
                if self.contexts[*context].is_none() {
                    self.contexts[*context] = Some(RgbModels::default());
                    self.last_rgbs[*context] = self.last_rgbs[last_slot];
                    last_slot = *context;
                }
                self.last_context = *context;
            }

            if self.last_rgbs[last_slot] != current {
                self.rgb_changed = true;
            }
            let models = self.contexts[self.last_context]
                .as_mut()
                .expect("color context must be initialized");
            compress_rgb_with(&mut self.encoder, models, &current, &self.last_rgbs[last_slot])?;
            self.last_rgbs[last_slot] = current;
            Ok(())
        }

        fn write_layer_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.rgb_changed {
                self.encoder.done()?;
                dst.write_u32::<LittleEndian>(layer_len(&self.encoder) as u32)
            } else {
                dst.write_u32::<LittleEndian>(0)
            }
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.rgb_changed {
                copy_layer_to(&mut self.encoder, dst)?;
            }
            Ok(())
        }
    }

    pub struct RgbDecompressor {
        decoder: LayerDecoder,
        rgb_changed: bool,
        requested: bool,
        layer_size: u32,
        contexts: [Option<RgbModels>; 4],
        last_rgbs: [Rgb; 4],
        last_context: usize,
    }

    impl RgbDecompressor {
        pub fn new(requested: bool) -> Self {
            Self {
                decoder: new_layer_decoder(),
                rgb_changed: false,
                requested,
                layer_size: 0,
                contexts: [None, None, None, None],
                last_rgbs: [Rgb::default(); 4],
                last_context: 0,
            }
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for RgbDecompressor {
        fn item_size(&self) -> usize {
            Rgb::SIZE
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
            self.last_rgbs[*context] = read_and_unpack::<_, Rgb>(src, first)?;
            self.contexts[*context] = Some(RgbModels::default());
            self.last_context = *context;
            Ok(())
        }

        fn decompress_field(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let mut last_slot = self.last_context;

            if self.last_context != *context {
                self.last_context = *context;
                if self.contexts[*context].is_none() {
                    self.contexts[*context] = Some(RgbModels::default());
                    self.last_rgbs[*context] = self.last_rgbs[last_slot];
                    last_slot = *context;
                }
            }

            if self.rgb_changed {
                let models = self.contexts[self.last_context]
                    .as_mut()
                    .expect("color context must be initialized");
                let fresh =
                    decompress_rgb_with(&mut self.decoder, models, &self.last_rgbs[last_slot])?;
                fresh.pack_into(current_point);
                self.last_rgbs[last_slot] = fresh;
            } else {
                self.last_rgbs[last_slot].pack_into(current_point);
            }
            Ok(())
        }

        fn read_layer_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layer_size = src.read_u32::<LittleEndian>()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            self.rgb_changed = load_layer(
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
    fn byte_used_mask_flags() {
        let base = Rgb::default();
        let red_low = Rgb {
            red: 1,
            ..Default::default()
        };
        let mask = ByteUsedMask::between(&red_low, &base);
        assert!(mask.lower_red());
        assert!(mask.channels_differ());
        assert_eq!(mask.0, 0b0100_0001);

        let gray = Rgb {
            red: 0x0102,
            green: 0x0102,
            blue: 0x0102,
        };
        let mask = ByteUsedMask::between(&gray, &base);
        assert!(!mask.channels_differ());
    }
}
