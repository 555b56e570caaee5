/*
===============================================================================

  CONTENTS:
    Core point fields (LAS point format 0) and their codecs

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

/// The 20 core bytes every legacy LAS point starts with.
#[derive(Default, Copy, Clone, PartialEq, Debug)]
pub struct Point10 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,

    /// 3 bits on the wire.
    pub return_number: u8,
    /// 3 bits on the wire.
    pub number_of_returns: u8,
    pub scan_direction_flag: bool,
    pub edge_of_flight_line: bool,

    pub classification: u8,
    pub scan_angle_rank: i8,
    pub user_data: u8,
    pub point_source_id: u16,
}

impl Point10 {
    pub const SIZE: usize = 20;

    pub fn set_flags_byte(&mut self, byte: u8) {
        self.return_number = byte & 0x7;
        self.number_of_returns = (byte >> 3) & 0x7;
        self.scan_direction_flag = (byte >> 6) & 0x1 != 0;
        self.edge_of_flight_line = (byte >> 7) & 0x1 != 0;
    }

    pub fn flags_byte(&self) -> u8 {
        (self.edge_of_flight_line as u8) << 7
            | (self.scan_direction_flag as u8) << 6
            | (self.number_of_returns & 0x7) << 3
            | (self.return_number & 0x7)
    }
}

impl Packable for Point10 {
    fn unpack_from(input: &[u8]) -> Self {
        let mut point = Point10 {
            x: i32::unpack_from(&input[0..4]),
            y: i32::unpack_from(&input[4..8]),
            z: i32::unpack_from(&input[8..12]),
            intensity: u16::unpack_from(&input[12..14]),
            classification: input[15],
            scan_angle_rank: input[16] as i8,
            user_data: input[17],
            point_source_id: u16::unpack_from(&input[18..20]),
            ..Default::default()
        };
        point.set_flags_byte(input[14]);
        point
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.x.pack_into(&mut output[0..4]);
        self.y.pack_into(&mut output[4..8]);
        self.z.pack_into(&mut output[8..12]);
        self.intensity.pack_into(&mut output[12..14]);
        output[14] = self.flags_byte();
        output[15] = self.classification;
        output[16] = self.scan_angle_rank as u8;
        output[17] = self.user_data;
        self.point_source_id.pack_into(&mut output[18..20]);
    }
}

/// Median of the last three recorded differences.
fn median_of_three(diffs: &[i32; 3]) -> i32 {
    if diffs[0] < diffs[1] {
        if diffs[1] < diffs[2] {
            diffs[1]
        } else if diffs[0] < diffs[2] {
            diffs[2]
        } else {
            diffs[0]
        }
    } else if diffs[0] < diffs[2] {
        diffs[0]
    } else if diffs[1] < diffs[2] {
        diffs[2]
    } else {
        diffs[1]
    }
}

pub mod v1 {
    //! First-generation core point codec: median-of-three X/Y prediction
    //! and a single changed-fields symbol.

    use std::io::{Read, Write};

    use super::{median_of_three, Point10};
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::packers::Packable;
    use crate::point::utils::{lazy_model, read_and_unpack};
    use crate::predictive::{IntCompressor, IntDecompressor, SINGLE_CONTEXT};
    use crate::record::{FieldCompressor, FieldDecompressor};

    const CHANGED_INTENSITY: i32 = 32;
    const CHANGED_FLAGS: i32 = 16;
    const CHANGED_CLASSIFICATION: i32 = 8;
    const CHANGED_SCAN_ANGLE: i32 = 4;
    const CHANGED_USER_DATA: i32 = 2;
    const CHANGED_POINT_SOURCE: i32 = 1;

    pub struct Point10Compressor {
        last: Point10,

        x_diffs: [i32; 3],
        y_diffs: [i32; 3],
        diff_slot: usize,

        ic_dx: IntCompressor,
        ic_dy: IntCompressor,
        ic_dz: IntCompressor,
        ic_intensity: IntCompressor,
        ic_scan_angle: IntCompressor,
        ic_point_source: IntCompressor,

        changed_values: SymbolModel,
        flags_models: Vec<Option<SymbolModel>>,
        classification_models: Vec<Option<SymbolModel>>,
        user_data_models: Vec<Option<SymbolModel>>,
    }

    impl Point10Compressor {
        pub fn new() -> Self {
            Self {
                last: Point10::default(),
                x_diffs: [0; 3],
                y_diffs: [0; 3],
                diff_slot: 0,
                ic_dx: IntCompressor::new(32, 1).initialized(),
                ic_dy: IntCompressor::new(32, 20).initialized(),
                ic_dz: IntCompressor::new(32, 20).initialized(),
                ic_intensity: IntCompressor::new(16, 1).initialized(),
                ic_scan_angle: IntCompressor::new(8, 2).initialized(),
                ic_point_source: IntCompressor::new(16, 1).initialized(),
                changed_values: SymbolModel::new(64),
                flags_models: (0..256).map(|_| None).collect(),
                classification_models: (0..256).map(|_| None).collect(),
                user_data_models: (0..256).map(|_| None).collect(),
            }
        }

        fn record_diffs(&mut self, x_diff: i32, y_diff: i32) {
            self.x_diffs[self.diff_slot] = x_diff;
            self.y_diffs[self.diff_slot] = y_diff;
            self.diff_slot += 1;
            if self.diff_slot > 2 {
                self.diff_slot = 0;
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for Point10Compressor {
        fn item_size(&self) -> usize {
            Point10::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.last = Point10::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = Point10::unpack_from(buf);

            let median_x = median_of_three(&self.x_diffs);
            let median_y = median_of_three(&self.y_diffs);
            let x_diff = current.x.wrapping_sub(self.last.x);
            let y_diff = current.y.wrapping_sub(self.last.y);

            self.ic_dx
                .compress(encoder, median_x, x_diff, SINGLE_CONTEXT)?;
            let k_bits = self.ic_dx.k();
            self.ic_dy
                .compress(encoder, median_y, y_diff, k_bits.min(19))?;
            let k_bits = (k_bits + self.ic_dy.k()) / 2;
            self.ic_dz
                .compress(encoder, self.last.z, current.z, k_bits.min(19))?;

            let changed = ((self.last.intensity != current.intensity) as i32) << 5
                | ((self.last.flags_byte() != current.flags_byte()) as i32) << 4
                | ((self.last.classification != current.classification) as i32) << 3
                | ((self.last.scan_angle_rank != current.scan_angle_rank) as i32) << 2
                | ((self.last.user_data != current.user_data) as i32) << 1
                | (self.last.point_source_id != current.point_source_id) as i32;

            encoder.encode_symbol(&mut self.changed_values, changed as u32)?;

            if changed & CHANGED_INTENSITY != 0 {
                self.ic_intensity.compress(
                    encoder,
                    i32::from(self.last.intensity),
                    i32::from(current.intensity),
                    SINGLE_CONTEXT,
                )?;
            }
            if changed & CHANGED_FLAGS != 0 {
                let model = lazy_model(
                    &mut self.flags_models,
                    self.last.flags_byte() as usize,
                    256,
                );
                encoder.encode_symbol(model, u32::from(current.flags_byte()))?;
            }
            if changed & CHANGED_CLASSIFICATION != 0 {
                let model = lazy_model(
                    &mut self.classification_models,
                    self.last.classification as usize,
                    256,
                );
                encoder.encode_symbol(model, u32::from(current.classification))?;
            }
            if changed & CHANGED_SCAN_ANGLE != 0 {
                self.ic_scan_angle.compress(
                    encoder,
                    i32::from(self.last.scan_angle_rank),
                    i32::from(current.scan_angle_rank),
                    (k_bits < 3) as u32,
                )?;
            }
            if changed & CHANGED_USER_DATA != 0 {
                let model = lazy_model(
                    &mut self.user_data_models,
                    self.last.user_data as usize,
                    256,
                );
                encoder.encode_symbol(model, u32::from(current.user_data))?;
            }
            if changed & CHANGED_POINT_SOURCE != 0 {
                self.ic_point_source.compress(
                    encoder,
                    i32::from(self.last.point_source_id),
                    i32::from(current.point_source_id),
                    SINGLE_CONTEXT,
                )?;
            }

            self.record_diffs(x_diff, y_diff);
            self.last = current;
            Ok(())
        }
    }

    pub struct Point10Decompressor {
        last: Point10,

        x_diffs: [i32; 3],
        y_diffs: [i32; 3],
        diff_slot: usize,

        ic_dx: IntDecompressor,
        ic_dy: IntDecompressor,
        ic_dz: IntDecompressor,
        ic_intensity: IntDecompressor,
        ic_scan_angle: IntDecompressor,
        ic_point_source: IntDecompressor,

        changed_values: SymbolModel,
        flags_models: Vec<Option<SymbolModel>>,
        classification_models: Vec<Option<SymbolModel>>,
        user_data_models: Vec<Option<SymbolModel>>,
    }

    impl Point10Decompressor {
        pub fn new() -> Self {
            Self {
                last: Point10::default(),
                x_diffs: [0; 3],
                y_diffs: [0; 3],
                diff_slot: 0,
                ic_dx: IntDecompressor::new(32, 1).initialized(),
                ic_dy: IntDecompressor::new(32, 20).initialized(),
                ic_dz: IntDecompressor::new(32, 20).initialized(),
                ic_intensity: IntDecompressor::new(16, 1).initialized(),
                ic_scan_angle: IntDecompressor::new(8, 2).initialized(),
                ic_point_source: IntDecompressor::new(16, 1).initialized(),
                changed_values: SymbolModel::new(64),
                flags_models: (0..256).map(|_| None).collect(),
                classification_models: (0..256).map(|_| None).collect(),
                user_data_models: (0..256).map(|_| None).collect(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for Point10Decompressor {
        fn item_size(&self) -> usize {
            Point10::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.last = read_and_unpack::<_, Point10>(src, first)?;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let median_x = median_of_three(&self.x_diffs);
            let median_y = median_of_three(&self.y_diffs);

            let x_diff = self.ic_dx.decompress(decoder, median_x, SINGLE_CONTEXT)?;
            self.last.x = self.last.x.wrapping_add(x_diff);
            let k_bits = self.ic_dx.k();
            let y_diff = self.ic_dy.decompress(decoder, median_y, k_bits.min(19))?;
            self.last.y = self.last.y.wrapping_add(y_diff);
            let k_bits = (k_bits + self.ic_dy.k()) / 2;
            self.last.z = self
                .ic_dz
                .decompress(decoder, self.last.z, k_bits.min(19))?;

            let changed = decoder.decode_symbol(&mut self.changed_values)? as i32;

            if changed != 0 {
                if changed & CHANGED_INTENSITY != 0 {
                    self.last.intensity = self.ic_intensity.decompress(
                        decoder,
                        i32::from(self.last.intensity),
                        SINGLE_CONTEXT,
                    )? as u16;
                }
                if changed & CHANGED_FLAGS != 0 {
                    let model = lazy_model(
                        &mut self.flags_models,
                        self.last.flags_byte() as usize,
                        256,
                    );
                    let byte = decoder.decode_symbol(model)? as u8;
                    self.last.set_flags_byte(byte);
                }
                if changed & CHANGED_CLASSIFICATION != 0 {
                    let model = lazy_model(
                        &mut self.classification_models,
                        self.last.classification as usize,
                        256,
                    );
                    self.last.classification = decoder.decode_symbol(model)? as u8;
                }
                if changed & CHANGED_SCAN_ANGLE != 0 {
                    self.last.scan_angle_rank = self.ic_scan_angle.decompress(
                        decoder,
                        i32::from(self.last.scan_angle_rank),
                        (k_bits < 3) as u32,
                    )? as i8;
                }
                if changed & CHANGED_USER_DATA != 0 {
                    let model = lazy_model(
                        &mut self.user_data_models,
                        self.last.user_data as usize,
                        256,
                    );
                    self.last.user_data = decoder.decode_symbol(model)? as u8;
                }
                if changed & CHANGED_POINT_SOURCE != 0 {
                    self.last.point_source_id = self.ic_point_source.decompress(
                        decoder,
                        i32::from(self.last.point_source_id),
                        SINGLE_CONTEXT,
                    )? as u16;
                }
            }

            self.x_diffs[self.diff_slot] = x_diff;
            self.y_diffs[self.diff_slot] = y_diff;
            self.diff_slot += 1;
            if self.diff_slot > 2 {
                self.diff_slot = 0;
            }

            self.last.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v2 {
    //! Second-generation core point codec: rolling median-of-five X/Y
    //! prediction keyed by a return-number/return-count context bucket and
    //! per-level Z prediction.

    use std::io::{Read, Write};

    use super::Point10;
    use crate::coder::{RangeDecoder, RangeEncoder, SymbolModel};
    use crate::packers::Packable;
    use crate::point::utils::{
        even, lazy_model, read_and_unpack, StreamingMedian, NUMBER_RETURN_LEVEL,
        NUMBER_RETURN_MAP,
    };
    use crate::predictive::{IntCompressor, IntDecompressor};
    use crate::record::{FieldCompressor, FieldDecompressor};

    struct ChangedMask(i32);

    impl ChangedMask {
        // relative to v1, the flag bits for intensity and the bit fields
        // are swapped
        fn from_points(current: &Point10, last: &Point10, last_intensity: u16) -> Self {
            let flags_changed = (last.return_number ^ current.return_number) != 0
                || (last.number_of_returns ^ current.number_of_returns) != 0
                || last.scan_direction_flag != current.scan_direction_flag
                || last.edge_of_flight_line != current.edge_of_flight_line;
            let value = (flags_changed as i32) << 5
                | (((last_intensity ^ current.intensity) != 0) as i32) << 4
                | (((last.classification ^ current.classification) != 0) as i32) << 3
                | (((last.scan_angle_rank ^ current.scan_angle_rank) != 0) as i32) << 2
                | (((last.user_data ^ current.user_data) != 0) as i32) << 1
                | ((last.point_source_id ^ current.point_source_id) != 0) as i32;
            Self(value)
        }

        fn flags_changed(&self) -> bool {
            self.0 & (1 << 5) != 0
        }

        fn intensity_changed(&self) -> bool {
            self.0 & (1 << 4) != 0
        }

        fn classification_changed(&self) -> bool {
            self.0 & (1 << 3) != 0
        }

        fn scan_angle_changed(&self) -> bool {
            self.0 & (1 << 2) != 0
        }

        fn user_data_changed(&self) -> bool {
            self.0 & (1 << 1) != 0
        }

        fn point_source_changed(&self) -> bool {
            self.0 & 1 != 0
        }
    }

    /// Prediction state shared by the compressor and the decompressor.
    struct Context {
        last: Point10,
        last_intensity: [u16; 16],
        x_diff_median: [StreamingMedian<i32>; 16],
        y_diff_median: [StreamingMedian<i32>; 16],
        last_height: [i32; 8],

        changed_values: SymbolModel,
        scan_angle_models: [SymbolModel; 2],
        flags_models: Vec<Option<SymbolModel>>,
        classification_models: Vec<Option<SymbolModel>>,
        user_data_models: Vec<Option<SymbolModel>>,
    }

    impl Context {
        fn new() -> Self {
            Self {
                last: Point10::default(),
                last_intensity: [0; 16],
                x_diff_median: [StreamingMedian::new(); 16],
                y_diff_median: [StreamingMedian::new(); 16],
                last_height: [0; 8],
                changed_values: SymbolModel::new(64),
                scan_angle_models: [SymbolModel::new(256), SymbolModel::new(256)],
                flags_models: (0..256).map(|_| None).collect(),
                classification_models: (0..256).map(|_| None).collect(),
                user_data_models: (0..256).map(|_| None).collect(),
            }
        }
    }

    pub struct Point10Compressor {
        ic_intensity: IntCompressor,
        ic_point_source: IntCompressor,
        ic_dx: IntCompressor,
        ic_dy: IntCompressor,
        ic_z: IntCompressor,
        state: Context,
    }

    impl Point10Compressor {
        pub fn new() -> Self {
            Self {
                ic_intensity: IntCompressor::new(16, 4).initialized(),
                ic_point_source: IntCompressor::new(16, 1).initialized(),
                ic_dx: IntCompressor::new(32, 2).initialized(),
                ic_dy: IntCompressor::new(32, 22).initialized(),
                ic_z: IntCompressor::new(32, 20).initialized(),
                state: Context::new(),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for Point10Compressor {
        fn item_size(&self) -> usize {
            Point10::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
            self.state.last = Point10::unpack_from(buf);
            dst.write_all(buf)
        }

        fn compress_next(
            &mut self,
            encoder: &mut RangeEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = Point10::unpack_from(buf);
            let state = &mut self.state;

            let r = current.return_number;
            let n = current.number_of_returns;
            let m = NUMBER_RETURN_MAP[n as usize][r as usize] as usize;
            let l = NUMBER_RETURN_LEVEL[n as usize][r as usize] as usize;

            let changed =
                ChangedMask::from_points(&current, &state.last, state.last_intensity[m]);
            encoder.encode_symbol(&mut state.changed_values, changed.0 as u32)?;

            if changed.flags_changed() {
                let model = lazy_model(
                    &mut state.flags_models,
                    state.last.flags_byte() as usize,
                    256,
                );
                encoder.encode_symbol(model, u32::from(current.flags_byte()))?;
            }
            if changed.intensity_changed() {
                self.ic_intensity.compress(
                    encoder,
                    i32::from(state.last_intensity[m]),
                    i32::from(current.intensity),
                    (m as u32).min(3),
                )?;
                state.last_intensity[m] = current.intensity;
            }
            if changed.classification_changed() {
                let model = lazy_model(
                    &mut state.classification_models,
                    state.last.classification as usize,
                    256,
                );
                encoder.encode_symbol(model, u32::from(current.classification))?;
            }
            if changed.scan_angle_changed() {
                let diff = (current.scan_angle_rank as u8)
                    .wrapping_sub(state.last.scan_angle_rank as u8);
                encoder.encode_symbol(
                    &mut state.scan_angle_models[current.scan_direction_flag as usize],
                    u32::from(diff),
                )?;
            }
            if changed.user_data_changed() {
                let model = lazy_model(
                    &mut state.user_data_models,
                    state.last.user_data as usize,
                    256,
                );
                encoder.encode_symbol(model, u32::from(current.user_data))?;
            }
            if changed.point_source_changed() {
                self.ic_point_source.compress(
                    encoder,
                    i32::from(state.last.point_source_id),
                    i32::from(current.point_source_id),
                    0,
                )?;
            }

            // x
            let median = state.x_diff_median[m].get();
            let diff = current.x.wrapping_sub(state.last.x);
            self.ic_dx
                .compress(encoder, median, diff, (n == 1) as u32)?;
            state.x_diff_median[m].add(diff);

            // y, context refined by the number of x corrector bits
            let k_bits = self.ic_dx.k();
            let median = state.y_diff_median[m].get();
            let diff = current.y.wrapping_sub(state.last.y);
            let context = (n == 1) as u32 + if k_bits < 20 { even(k_bits) } else { 20 };
            self.ic_dy.compress(encoder, median, diff, context)?;
            state.y_diff_median[m].add(diff);

            // z, predicted from the last height seen at this level
            let k_bits = (self.ic_dx.k() + self.ic_dy.k()) / 2;
            let context = (n == 1) as u32 + if k_bits < 18 { even(k_bits) } else { 18 };
            self.ic_z
                .compress(encoder, state.last_height[l], current.z, context)?;
            state.last_height[l] = current.z;

            state.last = current;
            Ok(())
        }
    }

    pub struct Point10Decompressor {
        ic_intensity: IntDecompressor,
        ic_point_source: IntDecompressor,
        ic_dx: IntDecompressor,
        ic_dy: IntDecompressor,
        ic_z: IntDecompressor,
        state: Context,
    }

    impl Point10Decompressor {
        pub fn new() -> Self {
            Self {
                ic_intensity: IntDecompressor::new(16, 4).initialized(),
                ic_point_source: IntDecompressor::new(16, 1).initialized(),
                ic_dx: IntDecompressor::new(32, 2).initialized(),
                ic_dy: IntDecompressor::new(32, 22).initialized(),
                ic_z: IntDecompressor::new(32, 20).initialized(),
                state: Context::new(),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for Point10Decompressor {
        fn item_size(&self) -> usize {
            Point10::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first: &mut [u8]) -> std::io::Result<()> {
            self.state.last = read_and_unpack::<_, Point10>(src, first)?;
            // the intensity context array starts zeroed on both sides
            self.state.last.intensity = 0;
            Ok(())
        }

        fn decompress_next(
            &mut self,
            decoder: &mut RangeDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let state = &mut self.state;
            let changed = ChangedMask(decoder.decode_symbol(&mut state.changed_values)? as i32);

            let (m, l) = if changed.0 != 0 {
                if changed.flags_changed() {
                    let model = lazy_model(
                        &mut state.flags_models,
                        state.last.flags_byte() as usize,
                        256,
                    );
                    let byte = decoder.decode_symbol(model)? as u8;
                    state.last.set_flags_byte(byte);
                }

                let r = state.last.return_number;
                let n = state.last.number_of_returns;
                let m = NUMBER_RETURN_MAP[n as usize][r as usize] as usize;
                let l = NUMBER_RETURN_LEVEL[n as usize][r as usize] as usize;

                if changed.intensity_changed() {
                    state.last.intensity = self.ic_intensity.decompress(
                        decoder,
                        i32::from(state.last_intensity[m]),
                        (m as u32).min(3),
                    )? as u16;
                    state.last_intensity[m] = state.last.intensity;
                } else {
                    state.last.intensity = state.last_intensity[m];
                }
                if changed.classification_changed() {
                    let model = lazy_model(
                        &mut state.classification_models,
                        state.last.classification as usize,
                        256,
                    );
                    state.last.classification = decoder.decode_symbol(model)? as u8;
                }
                if changed.scan_angle_changed() {
                    let diff = decoder.decode_symbol(
                        &mut state.scan_angle_models[state.last.scan_direction_flag as usize],
                    )? as u8;
                    state.last.scan_angle_rank =
                        (state.last.scan_angle_rank as u8).wrapping_add(diff) as i8;
                }
                if changed.user_data_changed() {
                    let model = lazy_model(
                        &mut state.user_data_models,
                        state.last.user_data as usize,
                        256,
                    );
                    state.last.user_data = decoder.decode_symbol(model)? as u8;
                }
                if changed.point_source_changed() {
                    state.last.point_source_id = self.ic_point_source.decompress(
                        decoder,
                        i32::from(state.last.point_source_id),
                        0,
                    )? as u16;
                }
                (m, l)
            } else {
                let r = state.last.return_number;
                let n = state.last.number_of_returns;
                (
                    NUMBER_RETURN_MAP[n as usize][r as usize] as usize,
                    NUMBER_RETURN_LEVEL[n as usize][r as usize] as usize,
                )
            };

            // x
            let median = state.x_diff_median[m].get();
            let n = state.last.number_of_returns;
            let diff = self
                .ic_dx
                .decompress(decoder, median, (n == 1) as u32)?;
            state.last.x = state.last.x.wrapping_add(diff);
            state.x_diff_median[m].add(diff);

            // y
            let median = state.y_diff_median[m].get();
            let k_bits = self.ic_dx.k();
            let context = (n == 1) as u32 + if k_bits < 20 { even(k_bits) } else { 20 };
            let diff = self.ic_dy.decompress(decoder, median, context)?;
            state.last.y = state.last.y.wrapping_add(diff);
            state.y_diff_median[m].add(diff);

            // z
            let k_bits = (self.ic_dx.k() + self.ic_dy.k()) / 2;
            let context = (n == 1) as u32 + if k_bits < 18 { even(k_bits) } else { 18 };
            state.last.z = self
                .ic_z
                .decompress(decoder, state.last_height[l], context)?;
            state.last_height[l] = state.last.z;

            state.last.pack_into(buf);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_byte_round_trip() {
        let mut point = Point10::default();
        point.return_number = 5;
        point.number_of_returns = 7;
        point.scan_direction_flag = true;
        let byte = point.flags_byte();

        let mut other = Point10::default();
        other.set_flags_byte(byte);
        assert_eq!(other.return_number, 5);
        assert_eq!(other.number_of_returns, 7);
        assert!(other.scan_direction_flag);
        assert!(!other.edge_of_flight_line);
    }

    #[test]
    fn median_of_three_cases() {
        assert_eq!(median_of_three(&[1, 2, 3]), 2);
        assert_eq!(median_of_three(&[3, 2, 1]), 2);
        assert_eq!(median_of_three(&[2, 3, 1]), 2);
        assert_eq!(median_of_three(&[5, 5, 5]), 5);
        assert_eq!(median_of_three(&[-4, 0, 4]), 0);
    }
}
