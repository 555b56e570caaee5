//! Near-infrared channel codec (layered formats only).

use crate::packers::Packable;

/// The 16-bit near-infrared sample of LAS point formats 8 and 10.
#[derive(Default, Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Nir(pub u16);

impl Nir {
    pub const SIZE: usize = 2;
}

impl Packable for Nir {
    fn unpack_from(input: &[u8]) -> Self {
        Self(u16::unpack_from(input))
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.0.pack_into(output)
    }
}

pub mod v3 {
    //! The NIR channel is coded like one extra color channel: a 2-bit
    //! byte-used mask, then a folded difference per changed byte, under
    //! four scanner-channel contexts and its own layer.

    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    use super::Nir;
    use crate::coder::SymbolModel;
    use crate::packers::Packable;
    use crate::point::utils::{
        copy_layer_to, layer_len, load_layer, lower_byte, new_layer_decoder, new_layer_encoder,
        read_and_unpack, upper_byte, LayerDecoder, LayerEncoder,
    };
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    struct NirModels {
        byte_used: SymbolModel,
        lower_diff: SymbolModel,
        upper_diff: SymbolModel,
    }

    impl Default for NirModels {
        fn default() -> Self {
            Self {
                byte_used: SymbolModel::new(4),
                lower_diff: SymbolModel::new(256),
                upper_diff: SymbolModel::new(256),
            }
        }
    }

    pub struct NirCompressor {
        encoder: LayerEncoder,
        nir_changed: bool,
        contexts: [Option<NirModels>; 4],
        last_nirs: [u16; 4],
        last_context: usize,
    }

    impl NirCompressor {
        pub fn new() -> Self {
            Self {
                encoder: new_layer_encoder(),
                nir_changed: false,
                contexts: [None, None, None, None],
                last_nirs: [0; 4],
                last_context: 0,
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for NirCompressor {
        fn item_size(&self) -> usize {
            Nir::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            dst.write_all(first)?;
            self.contexts[*context] = Some(NirModels::default());
            self.last_nirs[*context] = Nir::unpack_from(first).0;
            self.last_context = *context;
            Ok(())
        }

        fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            let current = Nir::unpack_from(buf).0;

            if self.last_context != *context {
                if self.contexts[*context].is_none() {
                    self.contexts[*context] = Some(NirModels::default());
                    self.last_nirs[*context] = self.last_nirs[self.last_context];
                }
                self.last_context = *context;
            }
            let last = self.last_nirs[self.last_context];
            if last != current {
                self.nir_changed = true;
            }

            let mask = (lower_byte(last) != lower_byte(current)) as u32
                | ((upper_byte(last) != upper_byte(current)) as u32) << 1;
            let models = self.contexts[self.last_context]
                .as_mut()
                .expect("nir context must be initialized");
            self.encoder.encode_symbol(&mut models.byte_used, mask)?;

            if mask & 1 != 0 {
                let corr = lower_byte(current).wrapping_sub(lower_byte(last));
                self.encoder
                    .encode_symbol(&mut models.lower_diff, u32::from(corr))?;
            }
            if mask & 2 != 0 {
                let corr = upper_byte(current).wrapping_sub(upper_byte(last));
                self.encoder
                    .encode_symbol(&mut models.upper_diff, u32::from(corr))?;
            }

            self.last_nirs[self.last_context] = current;
            Ok(())
        }

        fn write_layer_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.nir_changed {
                self.encoder.done()?;
                dst.write_u32::<LittleEndian>(layer_len(&self.encoder) as u32)
            } else {
                dst.write_u32::<LittleEndian>(0)
            }
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.nir_changed {
                copy_layer_to(&mut self.encoder, dst)?;
            }
            Ok(())
        }
    }

    pub struct NirDecompressor {
        decoder: LayerDecoder,
        nir_changed: bool,
        requested: bool,
        layer_size: u32,
        contexts: [Option<NirModels>; 4],
        last_nirs: [u16; 4],
        last_context: usize,
    }

    impl NirDecompressor {
        pub fn new(requested: bool) -> Self {
            Self {
                decoder: new_layer_decoder(),
                nir_changed: false,
                requested,
                layer_size: 0,
                contexts: [None, None, None, None],
                last_nirs: [0; 4],
                last_context: 0,
            }
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for NirDecompressor {
        fn item_size(&self) -> usize {
            Nir::SIZE
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
            self.last_nirs[*context] = read_and_unpack::<_, Nir>(src, first)?.0;
            self.contexts[*context] = Some(NirModels::default());
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
                    self.contexts[*context] = Some(NirModels::default());
                    self.last_nirs[*context] = self.last_nirs[self.last_context];
                }
                self.last_context = *context;
            }

            if self.nir_changed {
                let last = self.last_nirs[self.last_context];
                let models = self.contexts[self.last_context]
                    .as_mut()
                    .expect("nir context must be initialized");
                let mask = self.decoder.decode_symbol(&mut models.byte_used)?;

                let mut fresh: u16;
                if mask & 1 != 0 {
                    let corr = self.decoder.decode_symbol(&mut models.lower_diff)? as u8;
                    fresh = u16::from(corr.wrapping_add(lower_byte(last)));
                } else {
                    fresh = last & 0x00FF;
                }
                if mask & 2 != 0 {
                    let corr = self.decoder.decode_symbol(&mut models.upper_diff)? as u8;
                    fresh |= u16::from(corr.wrapping_add(upper_byte(last))) << 8;
                } else {
                    fresh |= last & 0xFF00;
                }
                self.last_nirs[self.last_context] = fresh;
            }

            Nir(self.last_nirs[self.last_context]).pack_into(current_point);
            Ok(())
        }

        fn read_layer_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layer_size = src.read_u32::<LittleEndian>()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            self.nir_changed = load_layer(
                self.requested,
                self.layer_size as usize,
                &mut self.decoder,
                src,
            )?;
            Ok(())
        }
    }
}
