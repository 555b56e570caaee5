/*
===============================================================================

  CONTENTS:
    Predictive integer codec

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free
    Software Foundation.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

===============================================================================
*/

//! Coding of prediction correctors.
//!
//! Every predicted field goes through the same scheme: the signed difference
//! between the actual and the predicted value (the corrector) is folded into
//! the interval implied by the configured bit width, then coded as a
//! magnitude class `k` (the number of significant bits) through an adaptive
//! model, followed by the exact value within that class. Small classes are
//! one modeled symbol; for classes above `bits_high` the value splits into a
//! modeled high part and raw low bits.
//!
//! The last coded `k` is exposed so that callers can chain precision between
//! related fields (the per-point codecs use the `k` of the X delta to pick
//! the context of the Y delta, and so on).

use std::io::{Read, Write};

use crate::coder::{BitModel, RangeDecoder, RangeEncoder, SymbolModel};

pub const DEFAULT_BITS_HIGH: u32 = 8;

/// Context index used by callers that only ever use one context.
pub const SINGLE_CONTEXT: u32 = 0;

/// Corrector interval derived from a bit width or an explicit range.
#[derive(Debug, Copy, Clone)]
struct CorrectorBounds {
    bits: u32,
    range: u32,
    min: i32,
    max: i32,
}

impl CorrectorBounds {
    fn new(bits: u32, mut range: u32) -> Self {
        if range != 0 {
            // explicit range: significant bits of the range value
            let mut corr_bits = 0u32;
            let corr_range = range;
            while range != 0 {
                range >>= 1;
                corr_bits += 1;
            }
            if corr_range == (1u32 << (corr_bits - 1)) {
                corr_bits -= 1;
            }
            let min = -((corr_range / 2) as i32);
            Self {
                bits: corr_bits,
                range: corr_range,
                min,
                max: min + (corr_range - 1) as i32,
            }
        } else if bits >= 1 && bits < 32 {
            let corr_range = 1u32 << bits;
            let min = -((corr_range / 2) as i32);
            Self {
                bits,
                range: corr_range,
                min,
                max: min + (corr_range - 1) as i32,
            }
        } else {
            // unbounded: the corrector spans the full 32-bit space
            Self {
                bits: 32,
                range: 0,
                min: i32::min_value(),
                max: i32::max_value(),
            }
        }
    }
}

fn build_models(
    bounds: &CorrectorBounds,
    contexts: u32,
    bits_high: u32,
) -> (Vec<SymbolModel>, Vec<SymbolModel>) {
    let k_models = (0..contexts)
        .map(|_| SymbolModel::new(bounds.bits + 1))
        .collect();
    let corr_models = (1..=bounds.bits)
        .map(|k| {
            let symbols = if k <= bits_high {
                1u32 << k
            } else {
                1u32 << bits_high
            };
            SymbolModel::new(symbols)
        })
        .collect();
    (k_models, corr_models)
}

/// Compressing side of the predictive integer codec.
#[derive(Debug)]
pub struct IntCompressor {
    k: u32,
    contexts: u32,
    bits_high: u32,
    bounds: CorrectorBounds,

    k_models: Vec<SymbolModel>,
    zero_bit: BitModel,
    corr_models: Vec<SymbolModel>,
}

impl IntCompressor {
    /// A codec for correctors of the given bit width with `contexts`
    /// independent model sets.
    ///
    /// Panics when `contexts` is zero.
    pub fn new(bits: u32, contexts: u32) -> Self {
        Self::with_settings(bits, contexts, DEFAULT_BITS_HIGH, 0)
    }

    pub fn with_settings(bits: u32, contexts: u32, bits_high: u32, range: u32) -> Self {
        assert!(contexts >= 1, "integer codec needs at least one context");
        Self {
            k: 0,
            contexts,
            bits_high,
            bounds: CorrectorBounds::new(bits, range),
            k_models: Vec::new(),
            zero_bit: BitModel::new(),
            corr_models: Vec::new(),
        }
    }

    /// Creates the adaptive models; no-op when already initialized.
    pub fn init(&mut self) {
        if self.k_models.is_empty() {
            let (k_models, corr_models) =
                build_models(&self.bounds, self.contexts, self.bits_high);
            self.k_models = k_models;
            self.corr_models = corr_models;
        }
    }

    pub fn initialized(mut self) -> Self {
        self.init();
        self
    }

    /// Magnitude class of the last coded corrector.
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn compress<W: Write>(
        &mut self,
        encoder: &mut RangeEncoder<W>,
        predicted: i32,
        actual: i32,
        context: u32,
    ) -> std::io::Result<()> {
        let mut corr = actual.wrapping_sub(predicted);
        // fold into [min, max]
        if corr < self.bounds.min {
            corr += self.bounds.range as i32;
        } else if corr > self.bounds.max {
            corr -= self.bounds.range as i32;
        }

        // tightest interval [-(2^k - 1), 2^k] containing the corrector,
        // adjusted for the asymmetric positive end
        let mut c = corr;
        let mut magnitude = (if c <= 0 { c.wrapping_neg() } else { c - 1 }) as u32;
        self.k = 0;
        while magnitude != 0 {
            magnitude >>= 1;
            self.k += 1;
        }

        encoder.encode_symbol(&mut self.k_models[context as usize], self.k)?;

        if self.k == 0 {
            // corrector is 0 or 1
            debug_assert!(c == 0 || c == 1);
            encoder.encode_bit(&mut self.zero_bit, c as u32)?;
        } else if self.k < 32 {
            // translate into [0, 2^k - 1]
            if c >= 0 {
                c -= 1;
            } else {
                c += ((1u32 << self.k) - 1) as i32;
            }

            if self.k <= self.bits_high {
                encoder.encode_symbol(&mut self.corr_models[self.k as usize - 1], c as u32)?;
            } else {
                // high part through the model, low bits raw
                let low_bits = self.k - self.bits_high;
                let low = (c & ((1u32 << low_bits) - 1) as i32) as u32;
                c >>= low_bits;
                encoder.encode_symbol(&mut self.corr_models[self.k as usize - 1], c as u32)?;
                encoder.write_bits(low_bits, low)?;
            }
        }
        // k == 32 signals the unrepresentable corrector; the class alone
        // tells the decoder to reconstruct the interval minimum
        Ok(())
    }
}

/// Decompressing side of the predictive integer codec.
#[derive(Debug)]
pub struct IntDecompressor {
    k: u32,
    contexts: u32,
    bits_high: u32,
    bounds: CorrectorBounds,

    k_models: Vec<SymbolModel>,
    zero_bit: BitModel,
    corr_models: Vec<SymbolModel>,
}

impl IntDecompressor {
    /// Panics when `contexts` is zero.
    pub fn new(bits: u32, contexts: u32) -> Self {
        Self::with_settings(bits, contexts, DEFAULT_BITS_HIGH, 0)
    }

    pub fn with_settings(bits: u32, contexts: u32, bits_high: u32, range: u32) -> Self {
        assert!(contexts >= 1, "integer codec needs at least one context");
        Self {
            k: 0,
            contexts,
            bits_high,
            bounds: CorrectorBounds::new(bits, range),
            k_models: Vec::new(),
            zero_bit: BitModel::new(),
            corr_models: Vec::new(),
        }
    }

    pub fn init(&mut self) {
        if self.k_models.is_empty() {
            let (k_models, corr_models) =
                build_models(&self.bounds, self.contexts, self.bits_high);
            self.k_models = k_models;
            self.corr_models = corr_models;
        }
    }

    pub fn initialized(mut self) -> Self {
        self.init();
        self
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn decompress<R: Read>(
        &mut self,
        decoder: &mut RangeDecoder<R>,
        predicted: i32,
        context: u32,
    ) -> std::io::Result<i32> {
        self.k = decoder.decode_symbol(&mut self.k_models[context as usize])?;

        let corr: i32 = if self.k == 0 {
            decoder.decode_bit(&mut self.zero_bit)? as i32
        } else if self.k < 32 {
            let mut c: i32;
            if self.k <= self.bits_high {
                c = decoder.decode_symbol(&mut self.corr_models[self.k as usize - 1])? as i32;
            } else {
                let low_bits = self.k - self.bits_high;
                let high =
                    decoder.decode_symbol(&mut self.corr_models[self.k as usize - 1])? as i32;
                let low = decoder.read_bits(low_bits)? as i32;
                c = (high << low_bits) | low;
            }

            // translate back into [-(2^k - 1), -(2^(k-1))] or [2^(k-1) + 1, 2^k]
            if c >= (1u32 << (self.k - 1)) as i32 {
                c = c.wrapping_add(1);
            } else {
                c = c.wrapping_sub(((1u32 << self.k) - 1) as i32);
            }
            c
        } else {
            self.bounds.min
        };

        let mut real = predicted.wrapping_add(corr);
        if real < 0 {
            real = real.wrapping_add(self.bounds.range as i32);
        } else if self.bounds.range != 0 && real >= self.bounds.range as i32 {
            real = real.wrapping_sub(self.bounds.range as i32);
        }
        Ok(real)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn round_trip(bits: u32, pairs: &[(i32, i32)]) {
        let mut compressor = IntCompressor::new(bits, 2).initialized();
        let mut encoder = RangeEncoder::new(Cursor::new(Vec::new()));
        for (predicted, actual) in pairs {
            compressor
                .compress(&mut encoder, *predicted, *actual, 1)
                .unwrap();
        }
        encoder.done().unwrap();
        let compressed = encoder.into_inner().into_inner();

        let mut decompressor = IntDecompressor::new(bits, 2).initialized();
        let mut decoder = RangeDecoder::new(Cursor::new(compressed));
        decoder.read_init_bytes().unwrap();
        for (predicted, actual) in pairs {
            let value = decompressor.decompress(&mut decoder, *predicted, 1).unwrap();
            assert_eq!(value, *actual);
        }
    }

    #[test]
    fn small_correctors_16_bits() {
        round_trip(
            16,
            &[(0, 0), (0, 1), (10, 9), (500, 1000), (1000, 500), (42, 42)],
        );
    }

    #[test]
    fn wide_correctors_32_bits() {
        round_trip(
            32,
            &[
                (0, i32::max_value()),
                (0, i32::min_value()),
                (i32::min_value(), i32::max_value()),
                (-1, 1),
                (7, 7),
            ],
        );
    }

    #[test]
    fn eight_bit_values_wrap_in_range() {
        round_trip(8, &[(0, 255), (255, 0), (128, 127), (1, 254)]);
    }

    #[test]
    #[should_panic]
    fn zero_contexts_is_a_programmer_error() {
        let _ = IntCompressor::new(16, 0);
    }
}
