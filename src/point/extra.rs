/*
===============================================================================

  CONTENTS:
    Codecs for the opaque extra bytes appended to point records

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free
    Software Foundation.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

===============================================================================
*/

/// v2 extra bytes compress exactly like v1.
pub use v1 as v2;

pub mod v1 {
    //! Every extra byte is coded as the difference to the same byte of the
    //! previous record, each through its own 256-symbol model.

    use std::io::{Read, Write};

    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::record::{FieldCompressor, FieldDecompressor};

    pub struct ExtraBytesCompressor {
        count: usize,
        last: Vec<u8>,
        models: Vec<SymbolModel>,
    }

    impl ExtraBytesCompressor {
        pub fn new(count: usize) -> Self {
            Self {
                count,
                last: vec![0; count],
                models: (0..count).map(|_| SymbolModel::new(256)).collect(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for ExtraBytesCompressor {
        fn item_size(&self) -> usize {
            self.count
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.last.copy_from_slice(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            for ((current, last), model) in buf
                .iter()
                .zip(self.last.iter_mut())
                .zip(self.models.iter_mut())
            {
                let diff = current.wrapping_sub(*last);
                encoder.encode_symbol(model, u32::from(diff))?;
                *last = *current;
            }
            Ok(())
        }
    }

    pub struct ExtraBytesDecompressor {
        count: usize,
        last: Vec<u8>,
        models: Vec<SymbolModel>,
    }

    impl ExtraBytesDecompressor {
        pub fn new(count: usize) -> Self {
            Self {
                count,
                last: vec![0; count],
                models: (0..count).map(|_| SymbolModel::new(256)).collect(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for ExtraBytesDecompressor {
        fn item_size(&self) -> usize {
            self.count
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            src.read_exact(first)?;
            self.last.copy_from_slice(first);
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            for (i, model) in self.models.iter_mut().enumerate() {
                let diff = decoder.decode_symbol(model)? as u8;
                self.last[i] = self.last[i].wrapping_add(diff);
                buf[i] = self.last[i];
            }
            Ok(())
        }
    }
}

pub mod v3 {
    //! Same per-byte differencing as v1, but each byte gets its own layer
    //! and the state splits into four scanner-channel contexts. Layers of
    //! bytes that never change within a chunk are emitted empty.

    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    use crate::coder::SymbolModel;
    use crate::point::utils::{
        copy_layer_to, layer_len, load_layer, new_layer_decoder, new_layer_encoder, LayerDecoder,
        LayerEncoder,
    };
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    struct ExtraBytesContext {
        last: Vec<u8>,
        models: Vec<SymbolModel>,
    }

    impl ExtraBytesContext {
        fn new(count: usize) -> Self {
            Self {
                last: vec![0; count],
                models: (0..count).map(|_| SymbolModel::new(256)).collect(),
            }
        }
    }

    pub struct ExtraBytesCompressor {
        count: usize,
        encoders: Vec<LayerEncoder>,
        byte_changed: Vec<bool>,
        contexts: [Option<ExtraBytesContext>; 4],
        last_context: usize,
    }

    impl ExtraBytesCompressor {
        pub fn new(count: usize) -> Self {
            Self {
                count,
                encoders: (0..count).map(|_| new_layer_encoder()).collect(),
                byte_changed: vec![false; count],
                contexts: [None, None, None, None],
                last_context: 0,
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for ExtraBytesCompressor {
        fn item_size(&self) -> usize {
            self.count
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            dst.write_all(first)?;
            let mut fresh = ExtraBytesContext::new(self.count);
            fresh.last.copy_from_slice(first);
            self.contexts[*context] = Some(fresh);
            self.last_context = *context;
            Ok(())
        }

        fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            if self.last_context != *context {
                if self.contexts[*context].is_none() {
                    let mut fresh = ExtraBytesContext::new(self.count);
                    fresh
                        .last
                        .copy_from_slice(&self.contexts[self.last_context].as_ref().unwrap().last);
                    self.contexts[*context] = Some(fresh);
                }
                self.last_context = *context;
            }

            let the_context = self.contexts[self.last_context]
                .as_mut()
                .expect("extra bytes context must be initialized");
            for i in 0..self.count {
                let diff = buf[i].wrapping_sub(the_context.last[i]);
                self.encoders[i].encode_symbol(&mut the_context.models[i], u32::from(diff))?;
                if diff != 0 {
                    self.byte_changed[i] = true;
                    the_context.last[i] = buf[i];
                }
            }
            Ok(())
        }

        fn write_layer_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            for (encoder, changed) in self.encoders.iter_mut().zip(&self.byte_changed) {
                if *changed {
                    encoder.done()?;
                    dst.write_u32::<LittleEndian>(layer_len(encoder) as u32)?;
                } else {
                    dst.write_u32::<LittleEndian>(0)?;
                }
            }
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            for (encoder, changed) in self.encoders.iter_mut().zip(&self.byte_changed) {
                if *changed {
                    copy_layer_to(encoder, dst)?;
                }
            }
            Ok(())
        }
    }

    pub struct ExtraBytesDecompressor {
        count: usize,
        decoders: Vec<LayerDecoder>,
        layer_sizes: Vec<u32>,
        byte_changed: Vec<bool>,
        requested: bool,
        contexts: [Option<ExtraBytesContext>; 4],
        last_context: usize,
    }

    impl ExtraBytesDecompressor {
        pub fn new(count: usize, requested: bool) -> Self {
            Self {
                count,
                decoders: (0..count).map(|_| new_layer_decoder()).collect(),
                layer_sizes: vec![0; count],
                byte_changed: vec![false; count],
                requested,
                contexts: [None, None, None, None],
                last_context: 0,
            }
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for ExtraBytesDecompressor {
        fn item_size(&self) -> usize {
            self.count
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
            src.read_exact(first)?;
            let mut fresh = ExtraBytesContext::new(self.count);
            fresh.last.copy_from_slice(first);
            self.contexts[*context] = Some(fresh);
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
                    let mut fresh = ExtraBytesContext::new(self.count);
                    fresh
                        .last
                        .copy_from_slice(&self.contexts[self.last_context].as_ref().unwrap().last);
                    self.contexts[*context] = Some(fresh);
                }
                self.last_context = *context;
            }

            let the_context = self.contexts[self.last_context]
                .as_mut()
                .expect("extra bytes context must be initialized");
            for i in 0..self.count {
                if self.byte_changed[i] {
                    let diff = self.decoders[i].decode_symbol(&mut the_context.models[i])? as u8;
                    the_context.last[i] = the_context.last[i].wrapping_add(diff);
                }
            }
            current_point.copy_from_slice(&the_context.last);
            Ok(())
        }

        fn read_layer_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            for size in &mut self.layer_sizes {
                *size = src.read_u32::<LittleEndian>()?;
            }
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            for i in 0..self.count {
                self.byte_changed[i] = load_layer(
                    self.requested,
                    self.layer_sizes[i] as usize,
                    &mut self.decoders[i],
                    src,
                )?;
            }
            Ok(())
        }
    }
}
