/*
===============================================================================

  CONTENTS:
    GPS time codecs

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

pub(crate) const GPS_TIME_MULTI: i32 = 500;
pub(crate) const GPS_TIME_MULTI_MINUS: i32 = -10;

/// A GPS time stamp.
///
/// The LAS field is an `f64`, but prediction works on the raw bit pattern
/// reinterpreted as an `i64`; this wrapper keeps the two views apart.
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct GpsTime(pub i64);

impl GpsTime {
    pub fn from_f64(time: f64) -> Self {
        Self(time.to_bits() as i64)
    }

    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0 as u64)
    }
}

impl Packable for GpsTime {
    fn unpack_from(input: &[u8]) -> Self {
        Self(i64::unpack_from(input))
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.0.pack_into(output)
    }
}

pub mod v1 {
    //! Single-sequence GPS time codec.

    use std::io::{Read, Write};

    use super::GpsTime;
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::packers::Packable;
    use crate::point::utils::read_and_unpack;
    use crate::predictive::{IntCompressor, IntDecompressor};
    use crate::record::{FieldCompressor, FieldDecompressor};

    const MULTI_MAX: u32 = 512;

    struct State {
        last_gps: i64,
        last_diff: i32,
        multi_extreme_count: i32,
        multi_model: SymbolModel,
        zero_diff_model: SymbolModel,
    }

    impl State {
        fn new() -> Self {
            Self {
                last_gps: 0,
                last_diff: 0,
                multi_extreme_count: 0,
                multi_model: SymbolModel::new(MULTI_MAX),
                zero_diff_model: SymbolModel::new(3),
            }
        }
    }

    pub struct GpsTimeCompressor {
        state: State,
        ic_gps_time: IntCompressor,
    }

    impl GpsTimeCompressor {
        pub fn new() -> Self {
            Self {
                state: State::new(),
                ic_gps_time: IntCompressor::new(32, 6).initialized(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for GpsTimeCompressor {
        fn item_size(&self) -> usize {
            std::mem::size_of::<f64>()
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.state.last_gps = GpsTime::unpack_from(buf).0;
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let state = &mut self.state;
            let current = GpsTime::unpack_from(buf).0;

            if state.last_diff == 0 {
                if current == state.last_gps {
                    encoder.encode_symbol(&mut state.zero_diff_model, 0)?;
                } else {
                    let diff_64 = current.wrapping_sub(state.last_gps);
                    let diff_32 = diff_64 as i32;
                    if diff_64 == i64::from(diff_32) {
                        encoder.encode_symbol(&mut state.zero_diff_model, 1)?;
                        self.ic_gps_time.compress(encoder, 0, diff_32, 0)?;
                        state.last_diff = diff_32;
                    } else {
                        encoder.encode_symbol(&mut state.zero_diff_model, 2)?;
                        encoder.write_u64(current as u64)?;
                    }
                }
            } else if current == state.last_gps {
                // the time has not moved, one dedicated symbol
                encoder.encode_symbol(&mut state.multi_model, MULTI_MAX - 1)?;
            } else {
                let diff_64 = current.wrapping_sub(state.last_gps);
                let diff_32 = diff_64 as i32;
                if diff_64 == i64::from(diff_32) {
                    let multi = num_traits::clamp(
                        ((diff_32 as f32 / state.last_diff as f32) + 0.5f32) as i32,
                        0,
                        MULTI_MAX as i32 - 3,
                    );
                    encoder.encode_symbol(&mut state.multi_model, multi as u32)?;
                    if multi == 1 {
                        self.ic_gps_time
                            .compress(encoder, state.last_diff, diff_32, 1)?;
                        state.last_diff = diff_32;
                        state.multi_extreme_count = 0;
                    } else if multi == 0 {
                        self.ic_gps_time
                            .compress(encoder, state.last_diff / 4, diff_32, 2)?;
                        state.multi_extreme_count += 1;
                        if state.multi_extreme_count > 3 {
                            state.last_diff = diff_32;
                            state.multi_extreme_count = 0;
                        }
                    } else {
                        let context = if multi < 10 {
                            3
                        } else if multi < 50 {
                            4
                        } else {
                            5
                        };
                        self.ic_gps_time.compress(
                            encoder,
                            state.last_diff.wrapping_mul(multi),
                            diff_32,
                            context,
                        )?;
                        if multi == MULTI_MAX as i32 - 3 {
                            state.multi_extreme_count += 1;
                            if state.multi_extreme_count > 3 {
                                state.last_diff = diff_32;
                                state.multi_extreme_count = 0;
                            }
                        }
                    }
                } else {
                    encoder.encode_symbol(&mut state.multi_model, MULTI_MAX - 2)?;
                    encoder.write_u64(current as u64)?;
                }
            }
            state.last_gps = current;
            Ok(())
        }
    }

    pub struct GpsTimeDecompressor {
        state: State,
        ic_gps_time: IntDecompressor,
    }

    impl GpsTimeDecompressor {
        pub fn new() -> Self {
            Self {
                state: State::new(),
                ic_gps_time: IntDecompressor::new(32, 6).initialized(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for GpsTimeDecompressor {
        fn item_size(&self) -> usize {
            std::mem::size_of::<f64>()
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.state.last_gps = read_and_unpack::<_, GpsTime>(src, first)?.0;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let state = &mut self.state;

            if state.last_diff == 0 {
                let multi = decoder.decode_symbol(&mut state.zero_diff_model)?;
                if multi == 1 {
                    state.last_diff = self.ic_gps_time.decompress(decoder, 0, 0)?;
                    state.last_gps = state.last_gps.wrapping_add(i64::from(state.last_diff));
                } else if multi == 2 {
                    state.last_gps = decoder.read_u64()? as i64;
                }
            } else {
                let multi = decoder.decode_symbol(&mut state.multi_model)?;
                if multi < MULTI_MAX - 2 {
                    let diff: i32;
                    if multi == 1 {
                        diff = self
                            .ic_gps_time
                            .decompress(decoder, state.last_diff, 1)?;
                        state.last_diff = diff;
                        state.multi_extreme_count = 0;
                    } else if multi == 0 {
                        diff = self
                            .ic_gps_time
                            .decompress(decoder, state.last_diff / 4, 2)?;
                        state.multi_extreme_count += 1;
                        if state.multi_extreme_count > 3 {
                            state.last_diff = diff;
                            state.multi_extreme_count = 0;
                        }
                    } else {
                        let context = if multi < 10 {
                            3
                        } else if multi < 50 {
                            4
                        } else {
                            5
                        };
                        diff = self.ic_gps_time.decompress(
                            decoder,
                            state.last_diff.wrapping_mul(multi as i32),
                            context,
                        )?;
                        if multi == MULTI_MAX - 3 {
                            state.multi_extreme_count += 1;
                            if state.multi_extreme_count > 3 {
                                state.last_diff = diff;
                                state.multi_extreme_count = 0;
                            }
                        }
                    }
                    state.last_gps = state.last_gps.wrapping_add(i64::from(diff));
                } else if multi < MULTI_MAX - 1 {
                    state.last_gps = decoder.read_u64()? as i64;
                }
            }
            GpsTime(state.last_gps).pack_into(buf);
            Ok(())
        }
    }
}

pub mod v2 {
    //! Multi-sequence GPS time codec.
    //!
    //! Up to four interleaved time sequences are tracked in a ring so that
    //! multi-return pulses and interleaved flight lines do not destroy the
    //! delta prediction. Switching sequences re-enters the coding decision
    //! with the new sequence active; the retry is a bounded loop.

    use std::io::{Read, Write};

    use super::{GpsTime, GPS_TIME_MULTI, GPS_TIME_MULTI_MINUS};
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::packers::Packable;
    use crate::point::utils::{i32_quantize, read_and_unpack};
    use crate::predictive::{IntCompressor, IntDecompressor};
    use crate::record::{FieldCompressor, FieldDecompressor};

    const MULTI_UNCHANGED: i32 = GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS + 1; // 511
    const MULTI_CODE_FULL: i32 = GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS + 2; // 512
    const MULTI_TOTAL: i32 = GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS + 6; // 516

    pub(crate) struct SequenceState {
        pub(crate) multi_model: SymbolModel,
        pub(crate) zero_diff_model: SymbolModel,
        pub(crate) last: usize,
        pub(crate) next: usize,
        pub(crate) last_gps: [GpsTime; 4],
        pub(crate) last_diffs: [i32; 4],
        pub(crate) multi_extreme_counts: [i32; 4],
    }

    impl SequenceState {
        fn new() -> Self {
            Self {
                multi_model: SymbolModel::new(MULTI_TOTAL as u32),
                zero_diff_model: SymbolModel::new(6),
                last: 0,
                next: 0,
                last_gps: [GpsTime::default(); 4],
                last_diffs: [0; 4],
                multi_extreme_counts: [0; 4],
            }
        }
    }

    pub struct GpsTimeCompressor {
        state: SequenceState,
        ic_gps_time: IntCompressor,
    }

    impl GpsTimeCompressor {
        pub fn new() -> Self {
            Self {
                state: SequenceState::new(),
                ic_gps_time: IntCompressor::new(32, 9).initialized(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for GpsTimeCompressor {
        fn item_size(&self) -> usize {
            std::mem::size_of::<i64>()
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.state.last_gps[0] = GpsTime::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = GpsTime::unpack_from(buf);
            let state = &mut self.state;

            // sequence switches re-enter the decision with a new `last`
            loop {
                debug_assert!(state.last < 4);
                if state.last_diffs[state.last] == 0 {
                    if current.0 == state.last_gps[state.last].0 {
                        encoder.encode_symbol(&mut state.zero_diff_model, 0)?;
                        break;
                    }
                    let diff_64 = current.0.wrapping_sub(state.last_gps[state.last].0);
                    let diff_32 = diff_64 as i32;
                    if diff_64 == i64::from(diff_32) {
                        encoder.encode_symbol(&mut state.zero_diff_model, 1)?;
                        self.ic_gps_time.compress(encoder, 0, diff_32, 0)?;
                        state.last_diffs[state.last] = diff_32;
                        state.multi_extreme_counts[state.last] = 0;
                        state.last_gps[state.last] = current;
                        break;
                    }
                    // the jump is huge, maybe another tracked sequence fits
                    if let Some(i) = (1..4).find(|i| {
                        let other = current.0.wrapping_sub(state.last_gps[(state.last + i) & 3].0);
                        other == i64::from(other as i32)
                    }) {
                        encoder.encode_symbol(&mut state.zero_diff_model, (i + 2) as u32)?;
                        state.last = (state.last + i) & 3;
                        continue;
                    }
                    // no sequence fits, open a fresh one with a full literal
                    encoder.encode_symbol(&mut state.zero_diff_model, 2)?;
                    self.ic_gps_time.compress(
                        encoder,
                        (state.last_gps[state.last].0 >> 32) as i32,
                        (current.0 >> 32) as i32,
                        8,
                    )?;
                    encoder.write_u32(current.0 as u32)?;
                    state.next = (state.next + 1) & 3;
                    state.last = state.next;
                    state.last_diffs[state.last] = 0;
                    state.multi_extreme_counts[state.last] = 0;
                    state.last_gps[state.last] = current;
                    break;
                }

                // the last difference was non-zero
                if current.0 == state.last_gps[state.last].0 {
                    encoder.encode_symbol(&mut state.multi_model, MULTI_UNCHANGED as u32)?;
                    break;
                }
                let diff_64 = current.0.wrapping_sub(state.last_gps[state.last].0);
                let diff_32 = diff_64 as i32;
                if diff_64 == i64::from(diff_32) {
                    let multi =
                        i32_quantize(diff_32 as f32 / state.last_diffs[state.last] as f32);

                    if multi == 1 {
                        // the common case of regularly spaced pulses
                        encoder.encode_symbol(&mut state.multi_model, 1)?;
                        self.ic_gps_time.compress(
                            encoder,
                            state.last_diffs[state.last],
                            diff_32,
                            1,
                        )?;
                        state.multi_extreme_counts[state.last] = 0;
                    } else if multi > 0 {
                        if multi < GPS_TIME_MULTI {
                            encoder.encode_symbol(&mut state.multi_model, multi as u32)?;
                            let context = if multi < 10 { 2 } else { 3 };
                            self.ic_gps_time.compress(
                                encoder,
                                multi.wrapping_mul(state.last_diffs[state.last]),
                                diff_32,
                                context,
                            )?;
                        } else {
                            encoder
                                .encode_symbol(&mut state.multi_model, GPS_TIME_MULTI as u32)?;
                            self.ic_gps_time.compress(
                                encoder,
                                GPS_TIME_MULTI.wrapping_mul(state.last_diffs[state.last]),
                                diff_32,
                                4,
                            )?;
                            state.multi_extreme_counts[state.last] += 1;
                            if state.multi_extreme_counts[state.last] > 3 {
                                state.last_diffs[state.last] = diff_32;
                                state.multi_extreme_counts[state.last] = 0;
                            }
                        }
                    } else if multi < 0 {
                        if multi > GPS_TIME_MULTI_MINUS {
                            encoder.encode_symbol(
                                &mut state.multi_model,
                                (GPS_TIME_MULTI - multi) as u32,
                            )?;
                            self.ic_gps_time.compress(
                                encoder,
                                multi.wrapping_mul(state.last_diffs[state.last]),
                                diff_32,
                                5,
                            )?;
                        } else {
                            encoder.encode_symbol(
                                &mut state.multi_model,
                                (GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS) as u32,
                            )?;
                            self.ic_gps_time.compress(
                                encoder,
                                GPS_TIME_MULTI_MINUS.wrapping_mul(state.last_diffs[state.last]),
                                diff_32,
                                6,
                            )?;
                            state.multi_extreme_counts[state.last] += 1;
                            if state.multi_extreme_counts[state.last] > 3 {
                                state.last_diffs[state.last] = diff_32;
                                state.multi_extreme_counts[state.last] = 0;
                            }
                        }
                    } else {
                        encoder.encode_symbol(&mut state.multi_model, 0)?;
                        self.ic_gps_time.compress(encoder, 0, diff_32, 7)?;
                        state.multi_extreme_counts[state.last] += 1;
                        if state.multi_extreme_counts[state.last] > 3 {
                            state.last_diffs[state.last] = diff_32;
                            state.multi_extreme_counts[state.last] = 0;
                        }
                    }
                    state.last_gps[state.last] = current;
                    break;
                }

                // huge difference, try the other sequences first
                if let Some(i) = (1..4).find(|i| {
                    let other = current.0.wrapping_sub(state.last_gps[(state.last + i) & 3].0);
                    other == i64::from(other as i32)
                }) {
                    encoder.encode_symbol(
                        &mut state.multi_model,
                        (MULTI_CODE_FULL + i as i32) as u32,
                    )?;
                    state.last = (state.last + i) & 3;
                    continue;
                }
                encoder.encode_symbol(&mut state.multi_model, MULTI_CODE_FULL as u32)?;
                self.ic_gps_time.compress(
                    encoder,
                    (state.last_gps[state.last].0 >> 32) as i32,
                    (current.0 >> 32) as i32,
                    8,
                )?;
                encoder.write_u32(current.0 as u32)?;
                state.next = (state.next + 1) & 3;
                state.last = state.next;
                state.last_diffs[state.last] = 0;
                state.multi_extreme_counts[state.last] = 0;
                state.last_gps[state.last] = current;
                break;
            }
            Ok(())
        }
    }

    pub struct GpsTimeDecompressor {
        state: SequenceState,
        ic_gps_time: IntDecompressor,
    }

    impl GpsTimeDecompressor {
        pub fn new() -> Self {
            Self {
                state: SequenceState::new(),
                ic_gps_time: IntDecompressor::new(32, 9).initialized(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for GpsTimeDecompressor {
        fn item_size(&self) -> usize {
            std::mem::size_of::<i64>()
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.state.last_gps[0] = read_and_unpack::<_, GpsTime>(src, first)?;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let state = &mut self.state;

            loop {
                debug_assert!(state.last < 4);
                if state.last_diffs[state.last] == 0 {
                    let multi = decoder.decode_symbol(&mut state.zero_diff_model)? as i32;
                    if multi == 1 {
                        state.last_diffs[state.last] =
                            self.ic_gps_time.decompress(decoder, 0, 0)?;
                        state.last_gps[state.last].0 = state.last_gps[state.last]
                            .0
                            .wrapping_add(i64::from(state.last_diffs[state.last]));
                        state.multi_extreme_counts[state.last] = 0;
                    } else if multi == 2 {
                        state.next = (state.next + 1) & 3;
                        let mut fresh = i64::from(self.ic_gps_time.decompress(
                            decoder,
                            (state.last_gps[state.last].0 >> 32) as i32,
                            8,
                        )?);
                        fresh <<= 32;
                        fresh |= i64::from(decoder.read_u32()?);
                        state.last_gps[state.next] = GpsTime(fresh);
                        state.last = state.next;
                        state.last_diffs[state.last] = 0;
                        state.multi_extreme_counts[state.last] = 0;
                    } else if multi > 2 {
                        state.last = (state.last + multi as usize - 2) & 3;
                        continue;
                    }
                    break;
                }

                let mut multi = decoder.decode_symbol(&mut state.multi_model)? as i32;
                if multi == 1 {
                    let diff = self.ic_gps_time.decompress(
                        decoder,
                        state.last_diffs[state.last],
                        1,
                    )?;
                    state.last_gps[state.last].0 =
                        state.last_gps[state.last].0.wrapping_add(i64::from(diff));
                    state.multi_extreme_counts[state.last] = 0;
                } else if multi < MULTI_UNCHANGED {
                    let diff: i32;
                    if multi == 0 {
                        diff = self.ic_gps_time.decompress(decoder, 0, 7)?;
                        state.multi_extreme_counts[state.last] += 1;
                        if state.multi_extreme_counts[state.last] > 3 {
                            state.last_diffs[state.last] = diff;
                            state.multi_extreme_counts[state.last] = 0;
                        }
                    } else if multi < GPS_TIME_MULTI {
                        let context = if multi < 10 { 2 } else { 3 };
                        diff = self.ic_gps_time.decompress(
                            decoder,
                            multi.wrapping_mul(state.last_diffs[state.last]),
                            context,
                        )?;
                    } else if multi == GPS_TIME_MULTI {
                        diff = self.ic_gps_time.decompress(
                            decoder,
                            multi.wrapping_mul(state.last_diffs[state.last]),
                            4,
                        )?;
                        state.multi_extreme_counts[state.last] += 1;
                        if state.multi_extreme_counts[state.last] > 3 {
                            state.last_diffs[state.last] = diff;
                            state.multi_extreme_counts[state.last] = 0;
                        }
                    } else {
                        multi = GPS_TIME_MULTI - multi;
                        if multi > GPS_TIME_MULTI_MINUS {
                            diff = self.ic_gps_time.decompress(
                                decoder,
                                multi.wrapping_mul(state.last_diffs[state.last]),
                                5,
                            )?;
                        } else {
                            diff = self.ic_gps_time.decompress(
                                decoder,
                                GPS_TIME_MULTI_MINUS.wrapping_mul(state.last_diffs[state.last]),
                                6,
                            )?;
                            state.multi_extreme_counts[state.last] += 1;
                            if state.multi_extreme_counts[state.last] > 3 {
                                state.last_diffs[state.last] = diff;
                                state.multi_extreme_counts[state.last] = 0;
                            }
                        }
                    }
                    state.last_gps[state.last].0 =
                        state.last_gps[state.last].0.wrapping_add(i64::from(diff));
                } else if multi == MULTI_CODE_FULL {
                    state.next = (state.next + 1) & 3;
                    let mut fresh = i64::from(self.ic_gps_time.decompress(
                        decoder,
                        (state.last_gps[state.last].0 >> 32) as i32,
                        8,
                    )?);
                    fresh <<= 32;
                    fresh |= i64::from(decoder.read_u32()?);
                    state.last_gps[state.next] = GpsTime(fresh);
                    state.last = state.next;
                    state.last_diffs[state.last] = 0;
                    state.multi_extreme_counts[state.last] = 0;
                } else if multi > MULTI_CODE_FULL {
                    state.last = (state.last + (multi - MULTI_CODE_FULL) as usize) & 3;
                    continue;
                }
                // multi == MULTI_UNCHANGED falls through, nothing to update
                break;
            }

            state.last_gps[state.last].pack_into(buf);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gps_time_is_a_bit_pattern() {
        let time = GpsTime::from_f64(123.456);
        assert_eq!(time.to_f64(), 123.456);

        let mut buf = [0u8; 8];
        time.pack_into(&mut buf);
        assert_eq!(GpsTime::unpack_from(&buf), time);
    }
}
