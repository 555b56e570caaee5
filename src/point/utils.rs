/*
===============================================================================

  CONTENTS:
    Shared helpers for the per-attribute point codecs

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free
    Software Foundation.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

===============================================================================
*/

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use num_traits::Zero;

use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
use crate::packers::Packable;

/// A rolling median over the last five pushed values.
///
/// Insertion keeps the five-slot window sorted and alternates which end
/// drops out, which is what the reference tracker does; the median is then
/// always the middle slot.
#[derive(Debug, Copy, Clone)]
pub struct StreamingMedian<T: Zero + Copy + PartialOrd> {
    values: [T; 5],
    high: bool,
}

impl<T: Zero + Copy + PartialOrd> StreamingMedian<T> {
    pub fn new() -> Self {
        Self {
            values: [T::zero(); 5],
            high: true,
        }
    }

    pub fn add(&mut self, v: T) {
        let s = &mut self.values;
        if self.high {
            if v < s[2] {
                s[4] = s[3];
                s[3] = s[2];
                if v < s[0] {
                    s[2] = s[1];
                    s[1] = s[0];
                    s[0] = v;
                } else if v < s[1] {
                    s[2] = s[1];
                    s[1] = v;
                } else {
                    s[2] = v;
                }
            } else {
                if v < s[3] {
                    s[4] = s[3];
                    s[3] = v;
                } else {
                    s[4] = v;
                }
                self.high = false;
            }
        } else {
            if s[2] < v {
                s[0] = s[1];
                s[1] = s[2];
                if s[4] < v {
                    s[2] = s[3];
                    s[3] = s[4];
                    s[4] = v;
                } else if s[3] < v {
                    s[2] = s[3];
                    s[3] = v;
                } else {
                    s[2] = v;
                }
            } else {
                if s[1] < v {
                    s[0] = s[1];
                    s[1] = v;
                } else {
                    s[0] = v;
                }
                self.high = true;
            }
        }
    }

    pub fn get(&self) -> T {
        self.values[2]
    }
}

#[inline(always)]
pub(crate) fn lower_byte(n: u16) -> u8 {
    (n & 0x00FF) as u8
}

#[inline(always)]
pub(crate) fn upper_byte(n: u16) -> u8 {
    (n >> 8) as u8
}

#[inline]
pub(crate) fn u8_clamp(n: i32) -> u8 {
    num_traits::clamp(n, i32::from(u8::min_value()), i32::from(u8::max_value())) as u8
}

/// Clears the lowest bit; used to halve the k-bit contexts of the
/// coordinate codecs.
#[inline]
pub(crate) fn even(n: u32) -> u32 {
    n & 0xFFFF_FFFE
}

/// Rounds to the nearest integer, away from zero on ties.
#[inline]
pub(crate) fn i32_quantize(n: f32) -> i32 {
    if n >= 0.0f32 {
        (n + 0.5f32) as i32
    } else {
        (n - 0.5f32) as i32
    }
}

/// Reads the raw first record of a chunk and unpacks it in one go.
#[inline(always)]
pub(crate) fn read_and_unpack<R: Read, P: Packable>(
    src: &mut R,
    buf: &mut [u8],
) -> std::io::Result<P> {
    src.read_exact(buf)?;
    Ok(P::unpack_from(buf))
}

/// Fetches the per-previous-value model for `index`, creating it on first
/// use.
#[inline]
pub(crate) fn lazy_model(
    models: &mut [Option<SymbolModel>],
    index: usize,
    symbols: u32,
) -> &mut SymbolModel {
    models[index].get_or_insert_with(|| SymbolModel::new(symbols))
}

/// In-memory entropy stream used by one layer of the layered formats.
pub(crate) type LayerEncoder = RangeEncoder<Cursor<Vec<u8>>>;
pub(crate) type LayerDecoder = RangeDecoder<Cursor<Vec<u8>>>;

pub(crate) fn new_layer_encoder() -> LayerEncoder {
    RangeEncoder::new(Cursor::new(Vec::new()))
}

pub(crate) fn new_layer_decoder() -> LayerDecoder {
    RangeDecoder::new(Cursor::new(Vec::new()))
}

/// Loads one layer's bytes into its in-memory decoder, or skips them when
/// the layer was not requested. Returns whether the layer carries data and
/// was armed.
pub(crate) fn load_layer<R: Read + Seek>(
    requested: bool,
    num_bytes: usize,
    decoder: &mut LayerDecoder,
    src: &mut R,
) -> std::io::Result<bool> {
    let backing = decoder.get_mut();
    backing.set_position(0);
    let inner = backing.get_mut();
    if requested {
        if num_bytes > 0 {
            inner.resize(num_bytes, 0);
            src.read_exact(&mut inner[..num_bytes])?;
            decoder.reinit();
            decoder.read_init_bytes()?;
            Ok(true)
        } else {
            inner.clear();
            Ok(false)
        }
    } else {
        if num_bytes > 0 {
            src.seek(SeekFrom::Current(num_bytes as i64))?;
        }
        Ok(false)
    }
}

/// Number of bytes a layer encoder has produced so far.
pub(crate) fn layer_len(encoder: &LayerEncoder) -> usize {
    encoder.get_ref().get_ref().len()
}

/// Appends a finished layer's bytes to the chunk payload.
pub(crate) fn copy_layer_to<W: Write>(
    encoder: &mut LayerEncoder,
    dst: &mut W,
) -> std::io::Result<()> {
    dst.write_all(encoder.get_mut().get_ref())
}

// For files with correctly populated return numbers (1 <= r <= n <= 7) only
// the upper-left triangle of this table would be needed; files in the wild
// also ship zero-based or swapped r/n, so the table maps every combination
// to some context.
pub const NUMBER_RETURN_MAP: [[u8; 8]; 8] = [
    [15, 14, 13, 12, 11, 10, 9, 8],
    [14, 0, 1, 3, 6, 10, 10, 9],
    [13, 1, 2, 4, 7, 11, 11, 10],
    [12, 3, 4, 5, 8, 12, 12, 11],
    [11, 6, 7, 8, 9, 13, 13, 12],
    [10, 10, 11, 12, 13, 14, 14, 13],
    [9, 10, 11, 12, 13, 14, 15, 14],
    [8, 9, 10, 11, 12, 13, 14, 15],
];

// Level of penetration (n - r for well-formed input), completed the same
// way for out-of-spec r/n combinations.
pub const NUMBER_RETURN_LEVEL: [[u8; 8]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7],
    [1, 0, 1, 2, 3, 4, 5, 6],
    [2, 1, 0, 1, 2, 3, 4, 5],
    [3, 2, 1, 0, 1, 2, 3, 4],
    [4, 3, 2, 1, 0, 1, 2, 3],
    [5, 4, 3, 2, 1, 0, 1, 2],
    [6, 5, 4, 3, 2, 1, 0, 1],
    [7, 6, 5, 4, 3, 2, 1, 0],
];

// 16x16 variants for the extended point formats (4-bit r and n), simplified
// down to 6 contexts.
pub const NUMBER_RETURN_MAP_6CTX: [[u8; 16]; 16] = [
    [0, 1, 2, 3, 4, 5, 3, 4, 4, 5, 5, 5, 5, 5, 5, 5],
    [1, 0, 1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3],
    [2, 1, 2, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3],
    [3, 3, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [3, 3, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 4, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5],
];

// Penetration level for the extended formats, capped at 8 contexts.
pub const NUMBER_RETURN_LEVEL_8CTX: [[u8; 16]; 16] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7],
    [1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7],
    [2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7],
    [3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7],
    [4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7],
    [5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7],
    [6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7],
    [7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7],
    [7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7],
    [7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6],
    [7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5],
    [7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4],
    [7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3],
    [7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2],
    [7, 7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1],
    [7, 7, 7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0],
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn median_of_five() {
        let mut median = StreamingMedian::<i32>::new();
        for v in [10, 2, 8, 4, 6].iter() {
            median.add(*v);
        }
        assert_eq!(median.get(), 6);
    }

    #[test]
    fn median_starts_at_zero() {
        let median = StreamingMedian::<i32>::new();
        assert_eq!(median.get(), 0);
    }

    #[test]
    fn byte_helpers() {
        assert_eq!(lower_byte(0xAB_CD), 0xCD);
        assert_eq!(upper_byte(0xAB_CD), 0xAB);
        assert_eq!(even(7), 6);
        assert_eq!(i32_quantize(1.5), 2);
        assert_eq!(i32_quantize(-1.5), -2);
    }
}
