/*
===============================================================================

  CONTENTS:
    Range decoder

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2019 by Amir Said (said@ieee.org) &
                William A. Pearlman (pearlw@ecse.rpi.edu)

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free
    Software Foundation.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

===============================================================================
*/

use std::io::Read;

use byteorder::ReadBytesExt;

use super::models::{BitModel, SymbolModel, BM_LENGTH_SHIFT, SM_LENGTH_SHIFT};
use super::{MAX_INTERVAL, MIN_INTERVAL};

/// The decoding half of the 32-bit range coder.
///
/// Construction does not touch the source; [`RangeDecoder::read_init_bytes`]
/// primes the 4-byte code window. The layered point formats exploit this by
/// building decoders over in-memory layer buffers that are only armed when
/// the layer was requested.
pub struct RangeDecoder<R: Read> {
    source: R,
    value: u32,
    length: u32,
}

impl<R: Read> RangeDecoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            value: 0,
            length: MAX_INTERVAL,
        }
    }

    /// Resets the registers; the next [`read_init_bytes`] starts a stream.
    ///
    /// [`read_init_bytes`]: RangeDecoder::read_init_bytes
    pub fn reinit(&mut self) {
        self.value = 0;
        self.length = MAX_INTERVAL;
    }

    /// Primes the code value with the first four stream bytes.
    pub fn read_init_bytes(&mut self) -> std::io::Result<()> {
        let mut first = [0u8; 4];
        self.source.read_exact(&mut first)?;
        self.value = u32::from_be_bytes(first);
        Ok(())
    }

    pub fn decode_bit(&mut self, model: &mut BitModel) -> std::io::Result<u32> {
        // product: length x p0
        let x = model.zero_prob * (self.length >> BM_LENGTH_SHIFT);
        let bit = (self.value >= x) as u32;

        if bit == 0 {
            self.length = x;
            model.zero_count += 1;
        } else {
            self.value -= x;
            self.length -= x;
        }

        if self.length < MIN_INTERVAL {
            self.renormalize()?;
        }
        model.until_update -= 1;
        if model.until_update == 0 {
            model.update();
        }
        Ok(bit)
    }

    pub fn decode_symbol(&mut self, model: &mut SymbolModel) -> std::io::Result<u32> {
        let mut sym;
        let mut upper;
        let mut x;
        // when the last symbol is hit, the interval top is the full length
        let mut y = self.length;

        if model.lookup.is_empty() {
            // pure bisection over the cumulative distribution
            x = 0;
            sym = 0;
            self.length >>= SM_LENGTH_SHIFT;
            upper = model.symbols;

            let mut mid = upper >> 1;
            loop {
                let z = self.length * model.cdf[mid as usize];
                if z > self.value {
                    upper = mid;
                    y = z;
                } else {
                    sym = mid;
                    x = z;
                }
                mid = (sym + upper) >> 1;
                if mid == sym {
                    break;
                }
            }
        } else {
            // table look-up seeds the bisection
            self.length >>= SM_LENGTH_SHIFT;
            let dv = self.value / self.length;
            let t = (dv >> model.table_shift) as usize;

            sym = model.lookup[t];
            upper = model.lookup[t + 1] + 1;

            while upper > sym + 1 {
                let mid = (sym + upper) >> 1;
                if model.cdf[mid as usize] > dv {
                    upper = mid;
                } else {
                    sym = mid;
                }
            }

            x = model.cdf[sym as usize] * self.length;
            if sym != model.last_symbol {
                y = model.cdf[sym as usize + 1] * self.length;
            }
        }

        self.value -= x;
        self.length = y - x;

        if self.length < MIN_INTERVAL {
            self.renormalize()?;
        }
        model.counts[sym as usize] += 1;
        model.until_update -= 1;
        if model.until_update == 0 {
            model.update();
        }
        Ok(sym)
    }

    pub fn read_bit(&mut self) -> std::io::Result<u32> {
        self.length >>= 1;
        let bit = self.value / self.length;
        self.value -= self.length * bit;

        if self.length < MIN_INTERVAL {
            self.renormalize()?;
        }
        Ok(bit)
    }

    pub fn read_bits(&mut self, mut bits: u32) -> std::io::Result<u32> {
        debug_assert!(bits >= 1 && bits <= 32);
        if bits > 19 {
            let low = u32::from(self.read_u16()?);
            bits -= 16;
            let high = self.read_bits(bits)? << 16;
            return Ok(high | low);
        }

        self.length >>= bits;
        let sym = self.value / self.length;
        self.value -= self.length * sym;

        if self.length < MIN_INTERVAL {
            self.renormalize()?;
        }
        Ok(sym)
    }

    pub fn read_u8(&mut self) -> std::io::Result<u8> {
        self.length >>= 8;
        let sym = self.value / self.length;
        self.value -= self.length * sym;

        if self.length < MIN_INTERVAL {
            self.renormalize()?;
        }
        debug_assert!(sym < (1 << 8));
        Ok(sym as u8)
    }

    pub fn read_u16(&mut self) -> std::io::Result<u16> {
        self.length >>= 16;
        let sym = self.value / self.length;
        self.value -= self.length * sym;

        if self.length < MIN_INTERVAL {
            self.renormalize()?;
        }
        debug_assert!(sym < (1 << 16));
        Ok(sym as u16)
    }

    pub fn read_u32(&mut self) -> std::io::Result<u32> {
        let low = u32::from(self.read_u16()?);
        let high = u32::from(self.read_u16()?);
        Ok(high << 16 | low)
    }

    pub fn read_u64(&mut self) -> std::io::Result<u64> {
        let low = u64::from(self.read_u32()?);
        let high = u64::from(self.read_u32()?);
        Ok(high << 32 | low)
    }

    pub fn read_f32(&mut self) -> std::io::Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> std::io::Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn renormalize(&mut self) -> std::io::Result<()> {
        loop {
            self.value = (self.value << 8) | u32::from(self.source.read_u8()?);
            self.length <<= 8;
            if self.length >= MIN_INTERVAL {
                break;
            }
        }
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}
