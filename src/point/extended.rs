//! Extended point record (LAS 1.4 formats 6 to 10) and its layered codec.

use crate::packers::Packable;

/// The 30 core bytes of the extended point formats.
///
/// `return_number` and `number_of_returns` grow to 4 bits each, the scan
/// angle to 16 bits, and every point carries a GPS time stamp and a 2-bit
/// scanner channel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point14 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,

    /// Return number (low nibble) and number of returns (high nibble).
    pub returns: u8,
    /// Classification flags (low nibble), scanner channel (bits 4-5),
    /// scan direction (bit 6), edge of flight line (bit 7).
    pub flags: u8,

    pub classification: u8,
    pub user_data: u8,
    /// An `i16` on the wire.
    pub scan_angle: u16,
    pub point_source_id: u16,
    pub gps_time: f64,

    /// Whether the GPS time moved on the last coded point. Codec state,
    /// never written to the wire.
    pub(crate) gps_time_changed: bool,
}

impl Default for Point14 {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            intensity: 0,
            returns: 0,
            flags: 0,
            classification: 0,
            user_data: 0,
            scan_angle: 0,
            point_source_id: 0,
            gps_time: 0.0,
            gps_time_changed: false,
        }
    }
}

impl Point14 {
    pub const SIZE: usize = 30;

    pub fn return_number(&self) -> u8 {
        self.returns & 0x0F
    }

    pub fn number_of_returns(&self) -> u8 {
        (self.returns >> 4) & 0x0F
    }

    pub fn set_return_number(&mut self, value: u8) {
        self.returns = (self.returns & 0xF0) | (value & 0x0F);
    }

    pub fn set_number_of_returns(&mut self, value: u8) {
        self.returns = (self.returns & 0x0F) | ((value << 4) & 0xF0);
    }

    pub fn classification_flags(&self) -> u8 {
        self.flags & 0x0F
    }

    pub fn scanner_channel(&self) -> u8 {
        (self.flags >> 4) & 0x03
    }

    pub fn set_scanner_channel(&mut self, value: u8) {
        self.flags = (self.flags & !0x30) | ((value << 4) & 0x30);
    }

    pub fn scan_direction_flag(&self) -> bool {
        self.flags & 0x40 != 0
    }

    pub fn edge_of_flight_line(&self) -> bool {
        self.flags & 0x80 != 0
    }
}

impl Packable for Point14 {
    fn unpack_from(input: &[u8]) -> Self {
        Self {
            x: i32::unpack_from(&input[0..4]),
            y: i32::unpack_from(&input[4..8]),
            z: i32::unpack_from(&input[8..12]),
            intensity: u16::unpack_from(&input[12..14]),
            returns: input[14],
            flags: input[15],
            classification: input[16],
            user_data: input[17],
            scan_angle: u16::unpack_from(&input[18..20]),
            point_source_id: u16::unpack_from(&input[20..22]),
            gps_time: f64::unpack_from(&input[22..30]),
            gps_time_changed: false,
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.x.pack_into(&mut output[0..4]);
        self.y.pack_into(&mut output[4..8]);
        self.z.pack_into(&mut output[8..12]);
        self.intensity.pack_into(&mut output[12..14]);
        output[14] = self.returns;
        output[15] = self.flags;
        output[16] = self.classification;
        output[17] = self.user_data;
        self.scan_angle.pack_into(&mut output[18..20]);
        self.point_source_id.pack_into(&mut output[20..22]);
        self.gps_time.pack_into(&mut output[22..30]);
    }
}

pub mod v3 {
    //! Layered codec for the extended point.
    //!
    //! Nine independent sub-streams (channel/returns/XY, Z, classification,
    //! flags, intensity, scan angle, user data, point source, GPS time)
    //! allow selective decompression; four scanner-channel contexts each
    //! hold the complete prediction state and are switched per point.

    use std::io::{Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    use super::Point14;
    use crate::coder::SymbolModel;
    use crate::packers::Packable;
    use crate::point::gps::{GpsTime, GPS_TIME_MULTI, GPS_TIME_MULTI_MINUS};
    use crate::point::selective::DecompressionSelection;
    use crate::point::utils::{
        even, lazy_model, load_layer, layer_len, copy_layer_to, new_layer_decoder,
        new_layer_encoder, LayerDecoder, LayerEncoder, StreamingMedian,
        NUMBER_RETURN_LEVEL_8CTX, NUMBER_RETURN_MAP_6CTX,
    };
    use crate::predictive::{IntCompressor, IntDecompressor};
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    const GPS_MULTI_CODE_FULL: i32 = GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS + 1; // 511
    const GPS_MULTI_TOTAL: i32 = GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS + 5; // 515

    const CHANGED_POINT_SOURCE: u32 = 1 << 5;
    const CHANGED_GPS_TIME: u32 = 1 << 4;
    const CHANGED_SCAN_ANGLE: u32 = 1 << 3;
    const CHANGED_NUMBER_OF_RETURNS: u32 = 1 << 2;

    /// Per-channel multi-sequence GPS state (models and ring buffers; the
    /// integer codec lives next to it in the owning context).
    struct GpsState {
        last: usize,
        next: usize,
        last_times: [GpsTime; 4],
        last_diffs: [i32; 4],
        extreme_counts: [i32; 4],
        multi_model: SymbolModel,
        zero_diff_model: SymbolModel,
    }

    impl GpsState {
        fn from_time(time: f64) -> Self {
            let mut state = Self {
                last: 0,
                next: 0,
                last_times: [GpsTime::default(); 4],
                last_diffs: [0; 4],
                extreme_counts: [0; 4],
                multi_model: SymbolModel::new(GPS_MULTI_TOTAL as u32),
                zero_diff_model: SymbolModel::new(5),
            };
            state.last_times[0] = GpsTime::from_f64(time);
            state
        }
    }

    /// Context of the last-point-return state: single/first/last/
    /// intermediate return crossed with whether the GPS time moved.
    fn last_point_return_context(last: &Point14) -> usize {
        let mut lpr = (last.return_number() == 1) as usize;
        if last.return_number() >= last.number_of_returns() {
            lpr += 2;
        }
        if last.gps_time_changed {
            lpr += 4;
        }
        lpr
    }

    /// Current-point-return context: first/last return bits.
    fn current_point_return_context(r: u32, n: u32) -> u32 {
        let mut cpr = if r == 1 { 2 } else { 0 };
        if r >= n {
            cpr += 1;
        }
        cpr
    }

    macro_rules! point14_context {
        ($name:ident, $int_codec:ty) => {
            struct $name {
                last: Point14,
                last_intensities: [u16; 8],
                x_diff_median: [StreamingMedian<i32>; 12],
                y_diff_median: [StreamingMedian<i32>; 12],
                last_z: [i32; 8],

                changed_values_models: Vec<SymbolModel>, // 8 x 128
                scanner_channel_model: SymbolModel,
                number_of_returns_models: Vec<Option<SymbolModel>>, // 16 x 16
                return_number_models: Vec<Option<SymbolModel>>,     // 16 x 16
                return_number_gps_same: SymbolModel,
                classification_models: Vec<Option<SymbolModel>>, // 64 x 256
                flags_models: Vec<Option<SymbolModel>>,          // 64 x 64
                user_data_models: Vec<Option<SymbolModel>>,      // 64 x 256

                ic_dx: $int_codec,
                ic_dy: $int_codec,
                ic_z: $int_codec,
                ic_intensity: $int_codec,
                ic_scan_angle: $int_codec,
                ic_point_source: $int_codec,
                ic_gps_time: $int_codec,
                gps: GpsState,
            }

            impl $name {
                fn from_last_point(point: &Point14) -> Self {
                    let mut context = Self {
                        last: *point,
                        last_intensities: [point.intensity; 8],
                        x_diff_median: [StreamingMedian::new(); 12],
                        y_diff_median: [StreamingMedian::new(); 12],
                        last_z: [point.z; 8],
                        changed_values_models: (0..8).map(|_| SymbolModel::new(128)).collect(),
                        scanner_channel_model: SymbolModel::new(3),
                        number_of_returns_models: (0..16).map(|_| None).collect(),
                        return_number_models: (0..16).map(|_| None).collect(),
                        return_number_gps_same: SymbolModel::new(13),
                        classification_models: (0..64).map(|_| None).collect(),
                        flags_models: (0..64).map(|_| None).collect(),
                        user_data_models: (0..64).map(|_| None).collect(),
                        ic_dx: <$int_codec>::new(32, 2).initialized(),
                        ic_dy: <$int_codec>::new(32, 22).initialized(),
                        ic_z: <$int_codec>::new(32, 20).initialized(),
                        ic_intensity: <$int_codec>::new(16, 4).initialized(),
                        ic_scan_angle: <$int_codec>::new(16, 2).initialized(),
                        ic_point_source: <$int_codec>::new(16, 1).initialized(),
                        ic_gps_time: <$int_codec>::new(32, 9).initialized(),
                        gps: GpsState::from_time(point.gps_time),
                    };
                    context.last.gps_time_changed = false;
                    context
                }
            }
        };
    }

    point14_context!(CompressContext, IntCompressor);
    point14_context!(DecompressContext, IntDecompressor);

    /// Byte counts of the nine sub-streams, as stored in the chunk header.
    #[derive(Default, Copy, Clone, Debug)]
    struct LayerSizes {
        channel_returns_xy: u32,
        z: u32,
        classification: u32,
        flags: u32,
        intensity: u32,
        scan_angle: u32,
        user_data: u32,
        point_source: u32,
        gps_time: u32,
    }

    impl LayerSizes {
        fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
            Ok(Self {
                channel_returns_xy: src.read_u32::<LittleEndian>()?,
                z: src.read_u32::<LittleEndian>()?,
                classification: src.read_u32::<LittleEndian>()?,
                flags: src.read_u32::<LittleEndian>()?,
                intensity: src.read_u32::<LittleEndian>()?,
                scan_angle: src.read_u32::<LittleEndian>()?,
                user_data: src.read_u32::<LittleEndian>()?,
                point_source: src.read_u32::<LittleEndian>()?,
                gps_time: src.read_u32::<LittleEndian>()?,
            })
        }
    }

    fn compress_gps_time(
        encoder: &mut LayerEncoder,
        context: &mut CompressContext,
        time: GpsTime,
    ) -> std::io::Result<()> {
        let gps = &mut context.gps;
        let ic = &mut context.ic_gps_time;

        loop {
            if gps.last_diffs[gps.last] == 0 {
                let diff_64 = time.0.wrapping_sub(gps.last_times[gps.last].0);
                let diff_32 = diff_64 as i32;
                if diff_64 == i64::from(diff_32) {
                    encoder.encode_symbol(&mut gps.zero_diff_model, 0)?;
                    ic.compress(encoder, 0, diff_32, 0)?;
                    gps.last_diffs[gps.last] = diff_32;
                    gps.extreme_counts[gps.last] = 0;
                    gps.last_times[gps.last] = time;
                    return Ok(());
                }
                if let Some(i) = (1..4).find(|i| {
                    let other = time.0.wrapping_sub(gps.last_times[(gps.last + i) & 3].0);
                    other == i64::from(other as i32)
                }) {
                    encoder.encode_symbol(&mut gps.zero_diff_model, (i + 1) as u32)?;
                    gps.last = (gps.last + i) & 3;
                    continue;
                }
                encoder.encode_symbol(&mut gps.zero_diff_model, 1)?;
                ic.compress(
                    encoder,
                    (gps.last_times[gps.last].0 >> 32) as i32,
                    (time.0 >> 32) as i32,
                    8,
                )?;
                encoder.write_u32(time.0 as u32)?;
                gps.next = (gps.next + 1) & 3;
                gps.last = gps.next;
                gps.last_diffs[gps.last] = 0;
                gps.extreme_counts[gps.last] = 0;
                gps.last_times[gps.last] = time;
                return Ok(());
            }

            let diff_64 = time.0.wrapping_sub(gps.last_times[gps.last].0);
            let diff_32 = diff_64 as i32;
            if diff_64 == i64::from(diff_32) {
                let multi = crate::point::utils::i32_quantize(
                    diff_32 as f32 / gps.last_diffs[gps.last] as f32,
                );
                if multi == 1 {
                    encoder.encode_symbol(&mut gps.multi_model, 1)?;
                    ic.compress(encoder, gps.last_diffs[gps.last], diff_32, 1)?;
                    gps.extreme_counts[gps.last] = 0;
                } else if multi > 0 {
                    if multi < GPS_TIME_MULTI {
                        encoder.encode_symbol(&mut gps.multi_model, multi as u32)?;
                        let ic_context = if multi < 10 { 2 } else { 3 };
                        ic.compress(
                            encoder,
                            multi.wrapping_mul(gps.last_diffs[gps.last]),
                            diff_32,
                            ic_context,
                        )?;
                    } else {
                        encoder.encode_symbol(&mut gps.multi_model, GPS_TIME_MULTI as u32)?;
                        ic.compress(
                            encoder,
                            GPS_TIME_MULTI.wrapping_mul(gps.last_diffs[gps.last]),
                            diff_32,
                            4,
                        )?;
                        gps.extreme_counts[gps.last] += 1;
                        if gps.extreme_counts[gps.last] > 3 {
                            gps.last_diffs[gps.last] = diff_32;
                            gps.extreme_counts[gps.last] = 0;
                        }
                    }
                } else if multi < 0 {
                    if multi > GPS_TIME_MULTI_MINUS {
                        encoder
                            .encode_symbol(&mut gps.multi_model, (GPS_TIME_MULTI - multi) as u32)?;
                        ic.compress(
                            encoder,
                            multi.wrapping_mul(gps.last_diffs[gps.last]),
                            diff_32,
                            5,
                        )?;
                    } else {
                        encoder.encode_symbol(
                            &mut gps.multi_model,
                            (GPS_TIME_MULTI - GPS_TIME_MULTI_MINUS) as u32,
                        )?;
                        ic.compress(
                            encoder,
                            GPS_TIME_MULTI_MINUS.wrapping_mul(gps.last_diffs[gps.last]),
                            diff_32,
                            6,
                        )?;
                        gps.extreme_counts[gps.last] += 1;
                        if gps.extreme_counts[gps.last] > 3 {
                            gps.last_diffs[gps.last] = diff_32;
                            gps.extreme_counts[gps.last] = 0;
                        }
                    }
                } else {
                    encoder.encode_symbol(&mut gps.multi_model, 0)?;
                    ic.compress(encoder, 0, diff_32, 7)?;
                    gps.extreme_counts[gps.last] += 1;
                    if gps.extreme_counts[gps.last] > 3 {
                        gps.last_diffs[gps.last] = diff_32;
                        gps.extreme_counts[gps.last] = 0;
                    }
                }
                gps.last_times[gps.last] = time;
                return Ok(());
            }

            if let Some(i) = (1..4).find(|i| {
                let other = time.0.wrapping_sub(gps.last_times[(gps.last + i) & 3].0);
                other == i64::from(other as i32)
            }) {
                encoder.encode_symbol(
                    &mut gps.multi_model,
                    (GPS_MULTI_CODE_FULL + i as i32) as u32,
                )?;
                gps.last = (gps.last + i) & 3;
                continue;
            }
            encoder.encode_symbol(&mut gps.multi_model, GPS_MULTI_CODE_FULL as u32)?;
            ic.compress(
                encoder,
                (gps.last_times[gps.last].0 >> 32) as i32,
                (time.0 >> 32) as i32,
                8,
            )?;
            encoder.write_u32(time.0 as u32)?;
            gps.next = (gps.next + 1) & 3;
            gps.last = gps.next;
            gps.last_diffs[gps.last] = 0;
            gps.extreme_counts[gps.last] = 0;
            gps.last_times[gps.last] = time;
            return Ok(());
        }
    }

    fn decompress_gps_time(
        decoder: &mut LayerDecoder,
        context: &mut DecompressContext,
    ) -> std::io::Result<()> {
        let gps = &mut context.gps;
        let ic = &mut context.ic_gps_time;

        loop {
            if gps.last_diffs[gps.last] == 0 {
                let multi = decoder.decode_symbol(&mut gps.zero_diff_model)? as i32;
                if multi == 0 {
                    gps.last_diffs[gps.last] = ic.decompress(decoder, 0, 0)?;
                    gps.last_times[gps.last].0 = gps.last_times[gps.last]
                        .0
                        .wrapping_add(i64::from(gps.last_diffs[gps.last]));
                    gps.extreme_counts[gps.last] = 0;
                } else if multi == 1 {
                    gps.next = (gps.next + 1) & 3;
                    let mut fresh = i64::from(ic.decompress(
                        decoder,
                        (gps.last_times[gps.last].0 >> 32) as i32,
                        8,
                    )?);
                    fresh <<= 32;
                    fresh |= i64::from(decoder.read_u32()?);
                    gps.last_times[gps.next] = GpsTime(fresh);
                    gps.last = gps.next;
                    gps.last_diffs[gps.last] = 0;
                    gps.extreme_counts[gps.last] = 0;
                } else {
                    gps.last = (gps.last + multi as usize - 1) & 3;
                    continue;
                }
                return Ok(());
            }

            let mut multi = decoder.decode_symbol(&mut gps.multi_model)? as i32;
            if multi == 1 {
                let diff = ic.decompress(decoder, gps.last_diffs[gps.last], 1)?;
                gps.last_times[gps.last].0 =
                    gps.last_times[gps.last].0.wrapping_add(i64::from(diff));
                gps.extreme_counts[gps.last] = 0;
            } else if multi < GPS_MULTI_CODE_FULL {
                let diff: i32;
                if multi == 0 {
                    diff = ic.decompress(decoder, 0, 7)?;
                    gps.extreme_counts[gps.last] += 1;
                    if gps.extreme_counts[gps.last] > 3 {
                        gps.last_diffs[gps.last] = diff;
                        gps.extreme_counts[gps.last] = 0;
                    }
                } else if multi < GPS_TIME_MULTI {
                    let ic_context = if multi < 10 { 2 } else { 3 };
                    diff = ic.decompress(
                        decoder,
                        multi.wrapping_mul(gps.last_diffs[gps.last]),
                        ic_context,
                    )?;
                } else if multi == GPS_TIME_MULTI {
                    diff = ic.decompress(
                        decoder,
                        GPS_TIME_MULTI.wrapping_mul(gps.last_diffs[gps.last]),
                        4,
                    )?;
                    gps.extreme_counts[gps.last] += 1;
                    if gps.extreme_counts[gps.last] > 3 {
                        gps.last_diffs[gps.last] = diff;
                        gps.extreme_counts[gps.last] = 0;
                    }
                } else {
                    multi = GPS_TIME_MULTI - multi;
                    if multi > GPS_TIME_MULTI_MINUS {
                        diff = ic.decompress(
                            decoder,
                            multi.wrapping_mul(gps.last_diffs[gps.last]),
                            5,
                        )?;
                    } else {
                        diff = ic.decompress(
                            decoder,
                            GPS_TIME_MULTI_MINUS.wrapping_mul(gps.last_diffs[gps.last]),
                            6,
                        )?;
                        gps.extreme_counts[gps.last] += 1;
                        if gps.extreme_counts[gps.last] > 3 {
                            gps.last_diffs[gps.last] = diff;
                            gps.extreme_counts[gps.last] = 0;
                        }
                    }
                }
                gps.last_times[gps.last].0 =
                    gps.last_times[gps.last].0.wrapping_add(i64::from(diff));
            } else if multi == GPS_MULTI_CODE_FULL {
                gps.next = (gps.next + 1) & 3;
                let mut fresh = i64::from(ic.decompress(
                    decoder,
                    (gps.last_times[gps.last].0 >> 32) as i32,
                    8,
                )?);
                fresh <<= 32;
                fresh |= i64::from(decoder.read_u32()?);
                gps.last_times[gps.next] = GpsTime(fresh);
                gps.last = gps.next;
                gps.last_diffs[gps.last] = 0;
                gps.extreme_counts[gps.last] = 0;
            } else {
                gps.last = (gps.last + (multi - GPS_MULTI_CODE_FULL) as usize) & 3;
                continue;
            }
            return Ok(());
        }
    }

    pub struct Point14Compressor {
        enc_channel_returns_xy: LayerEncoder,
        enc_z: LayerEncoder,
        enc_classification: LayerEncoder,
        enc_flags: LayerEncoder,
        enc_intensity: LayerEncoder,
        enc_scan_angle: LayerEncoder,
        enc_user_data: LayerEncoder,
        enc_point_source: LayerEncoder,
        enc_gps_time: LayerEncoder,

        changed_z: bool,
        changed_classification: bool,
        changed_flags: bool,
        changed_intensity: bool,
        changed_scan_angle: bool,
        changed_user_data: bool,
        changed_point_source: bool,
        changed_gps_time: bool,

        current_context: usize,
        contexts: [Option<CompressContext>; 4],
    }

    impl Point14Compressor {
        pub fn new() -> Self {
            Self {
                enc_channel_returns_xy: new_layer_encoder(),
                enc_z: new_layer_encoder(),
                enc_classification: new_layer_encoder(),
                enc_flags: new_layer_encoder(),
                enc_intensity: new_layer_encoder(),
                enc_scan_angle: new_layer_encoder(),
                enc_user_data: new_layer_encoder(),
                enc_point_source: new_layer_encoder(),
                enc_gps_time: new_layer_encoder(),
                changed_z: false,
                changed_classification: false,
                changed_flags: false,
                changed_intensity: false,
                changed_scan_angle: false,
                changed_user_data: false,
                changed_point_source: false,
                changed_gps_time: false,
                current_context: 0,
                contexts: [None, None, None, None],
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for Point14Compressor {
        fn item_size(&self) -> usize {
            Point14::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            dst.write_all(first)?;
            let point = Point14::unpack_from(first);
            for slot in &mut self.contexts {
                *slot = None;
            }
            self.current_context = point.scanner_channel() as usize;
            *context = self.current_context;
            self.contexts[self.current_context] =
                Some(CompressContext::from_last_point(&point));
            Ok(())
        }

        fn compress_field(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            let current = Point14::unpack_from(buf);

            let channel = current.scanner_channel() as usize;
            let channel_changed = channel != self.current_context;

            // the change bits compare against the last point of the target
            // channel when that channel was already seen
            let reference = if channel_changed && self.contexts[channel].is_some() {
                channel
            } else {
                self.current_context
            };

            let (changed_values, lpr) = {
                let reference_last = &self.contexts[reference].as_ref().unwrap().last;
                let point_source_changed =
                    reference_last.point_source_id != current.point_source_id;
                let gps_time_changed =
                    reference_last.gps_time.to_bits() != current.gps_time.to_bits();
                let scan_angle_changed = reference_last.scan_angle != current.scan_angle;
                let last_n = reference_last.number_of_returns();
                let last_r = reference_last.return_number();
                let n = current.number_of_returns();
                let r = current.return_number();

                let return_code: u32 = if r == last_r {
                    0
                } else if r == (last_r + 1) % 16 {
                    1
                } else if r == (last_r + 15) % 16 {
                    2
                } else {
                    3
                };

                let changed_values = (channel_changed as u32) << 6
                    | (point_source_changed as u32) << 5
                    | (gps_time_changed as u32) << 4
                    | (scan_angle_changed as u32) << 3
                    | ((n != last_n) as u32) << 2
                    | return_code;

                let lpr =
                    last_point_return_context(&self.contexts[self.current_context].as_ref().unwrap().last);
                (changed_values, lpr)
            };

            {
                let the_context = self.contexts[self.current_context].as_mut().unwrap();
                self.enc_channel_returns_xy
                    .encode_symbol(&mut the_context.changed_values_models[lpr], changed_values)?;

                if channel_changed {
                    let diff = (channel + 4 - self.current_context - 1) % 4;
                    self.enc_channel_returns_xy
                        .encode_symbol(&mut the_context.scanner_channel_model, diff as u32)?;
                }
            }
            if channel_changed {
                if self.contexts[channel].is_none() {
                    let seed = self.contexts[self.current_context].as_ref().unwrap().last;
                    self.contexts[channel] = Some(CompressContext::from_last_point(&seed));
                }
                self.current_context = channel;
            }
            *context = self.current_context;

            let gps_time_changed = changed_values & CHANGED_GPS_TIME != 0;
            let the_context = self.contexts[self.current_context].as_mut().unwrap();
            let last = &the_context.last;

            let last_n = last.number_of_returns();
            let last_r = last.return_number();
            let n = current.number_of_returns();
            let r = current.return_number();

            if changed_values & CHANGED_NUMBER_OF_RETURNS != 0 {
                let model = lazy_model(
                    &mut the_context.number_of_returns_models,
                    last_n as usize,
                    16,
                );
                self.enc_channel_returns_xy
                    .encode_symbol(model, u32::from(n))?;
            }
            if changed_values & 3 == 3 {
                if gps_time_changed {
                    let model =
                        lazy_model(&mut the_context.return_number_models, last_r as usize, 16);
                    self.enc_channel_returns_xy
                        .encode_symbol(model, u32::from(r))?;
                } else {
                    let sym = (u32::from(r) + 16 - u32::from(last_r + 2)) % 16;
                    self.enc_channel_returns_xy
                        .encode_symbol(&mut the_context.return_number_gps_same, sym)?;
                }
            }

            let m = NUMBER_RETURN_MAP_6CTX[n as usize][r as usize] as usize;
            let l = NUMBER_RETURN_LEVEL_8CTX[n as usize][r as usize] as usize;
            let cpr = current_point_return_context(u32::from(r), u32::from(n));

            // x
            let idx = (m << 1) | gps_time_changed as usize;
            let median = the_context.x_diff_median[idx].get();
            let diff = current.x.wrapping_sub(the_context.last.x);
            the_context.ic_dx.compress(
                &mut self.enc_channel_returns_xy,
                median,
                diff,
                (n == 1) as u32,
            )?;
            the_context.x_diff_median[idx].add(diff);

            // y
            let median = the_context.y_diff_median[idx].get();
            let k_bits = the_context.ic_dx.k();
            let diff = current.y.wrapping_sub(the_context.last.y);
            let ctx = (n == 1) as u32 + if k_bits < 20 { even(k_bits) } else { 20 };
            the_context
                .ic_dy
                .compress(&mut self.enc_channel_returns_xy, median, diff, ctx)?;
            the_context.y_diff_median[idx].add(diff);

            // z goes into its own layer, always coded
            let k_bits = (the_context.ic_dx.k() + the_context.ic_dy.k()) / 2;
            let ctx = (n == 1) as u32 + if k_bits < 18 { even(k_bits) } else { 18 };
            the_context
                .ic_z
                .compress(&mut self.enc_z, the_context.last_z[l], current.z, ctx)?;
            the_context.last_z[l] = current.z;
            if current.z != the_context.last.z {
                self.changed_z = true;
            }

            // classification
            let ccc = ((the_context.last.classification as usize & 0x1F) << 1)
                + (cpr == 3) as usize;
            let model = lazy_model(&mut the_context.classification_models, ccc, 256);
            self.enc_classification
                .encode_symbol(model, u32::from(current.classification))?;
            if current.classification != the_context.last.classification {
                self.changed_classification = true;
            }

            // flags
            let last_flags = (the_context.last.edge_of_flight_line() as usize) << 5
                | (the_context.last.scan_direction_flag() as usize) << 4
                | the_context.last.classification_flags() as usize;
            let current_flags = (current.edge_of_flight_line() as u32) << 5
                | (current.scan_direction_flag() as u32) << 4
                | u32::from(current.classification_flags());
            let model = lazy_model(&mut the_context.flags_models, last_flags, 64);
            self.enc_flags.encode_symbol(model, current_flags)?;
            if current_flags != last_flags as u32 {
                self.changed_flags = true;
            }

            // intensity
            let idx = (cpr << 1 | gps_time_changed as u32) as usize;
            the_context.ic_intensity.compress(
                &mut self.enc_intensity,
                i32::from(the_context.last_intensities[idx]),
                i32::from(current.intensity),
                cpr,
            )?;
            the_context.last_intensities[idx] = current.intensity;
            if current.intensity != the_context.last.intensity {
                self.changed_intensity = true;
            }

            // scan angle, only when it moved
            if changed_values & CHANGED_SCAN_ANGLE != 0 {
                the_context.ic_scan_angle.compress(
                    &mut self.enc_scan_angle,
                    i32::from(the_context.last.scan_angle),
                    i32::from(current.scan_angle),
                    gps_time_changed as u32,
                )?;
                self.changed_scan_angle = true;
            }

            // user data
            let model = lazy_model(
                &mut the_context.user_data_models,
                (the_context.last.user_data / 4) as usize,
                256,
            );
            self.enc_user_data
                .encode_symbol(model, u32::from(current.user_data))?;
            if current.user_data != the_context.last.user_data {
                self.changed_user_data = true;
            }

            // point source, only when it moved
            if changed_values & CHANGED_POINT_SOURCE != 0 {
                the_context.ic_point_source.compress(
                    &mut self.enc_point_source,
                    i32::from(the_context.last.point_source_id),
                    i32::from(current.point_source_id),
                    0,
                )?;
                self.changed_point_source = true;
            }

            // gps time, only when it moved
            if gps_time_changed {
                compress_gps_time(
                    &mut self.enc_gps_time,
                    the_context,
                    GpsTime::from_f64(current.gps_time),
                )?;
                self.changed_gps_time = true;
            }

            let the_context = self.contexts[self.current_context].as_mut().unwrap();
            the_context.last = current;
            the_context.last.set_scanner_channel(self.current_context as u8);
            the_context.last.gps_time_changed = gps_time_changed;
            Ok(())
        }

        fn write_layer_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            self.enc_channel_returns_xy.done()?;
            dst.write_u32::<LittleEndian>(layer_len(&self.enc_channel_returns_xy) as u32)?;

            let layers: [(&mut LayerEncoder, bool); 8] = [
                (&mut self.enc_z, self.changed_z),
                (&mut self.enc_classification, self.changed_classification),
                (&mut self.enc_flags, self.changed_flags),
                (&mut self.enc_intensity, self.changed_intensity),
                (&mut self.enc_scan_angle, self.changed_scan_angle),
                (&mut self.enc_user_data, self.changed_user_data),
                (&mut self.enc_point_source, self.changed_point_source),
                (&mut self.enc_gps_time, self.changed_gps_time),
            ];
            for (encoder, changed) in layers {
                if changed {
                    encoder.done()?;
                    dst.write_u32::<LittleEndian>(layer_len(encoder) as u32)?;
                } else {
                    dst.write_u32::<LittleEndian>(0)?;
                }
            }
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            copy_layer_to(&mut self.enc_channel_returns_xy, dst)?;
            let layers: [(&mut LayerEncoder, bool); 8] = [
                (&mut self.enc_z, self.changed_z),
                (&mut self.enc_classification, self.changed_classification),
                (&mut self.enc_flags, self.changed_flags),
                (&mut self.enc_intensity, self.changed_intensity),
                (&mut self.enc_scan_angle, self.changed_scan_angle),
                (&mut self.enc_user_data, self.changed_user_data),
                (&mut self.enc_point_source, self.changed_point_source),
                (&mut self.enc_gps_time, self.changed_gps_time),
            ];
            for (encoder, changed) in layers {
                if changed {
                    copy_layer_to(encoder, dst)?;
                }
            }
            Ok(())
        }
    }

    pub struct Point14Decompressor {
        dec_channel_returns_xy: LayerDecoder,
        dec_z: LayerDecoder,
        dec_classification: LayerDecoder,
        dec_flags: LayerDecoder,
        dec_intensity: LayerDecoder,
        dec_scan_angle: LayerDecoder,
        dec_user_data: LayerDecoder,
        dec_point_source: LayerDecoder,
        dec_gps_time: LayerDecoder,

        changed_z: bool,
        changed_classification: bool,
        changed_flags: bool,
        changed_intensity: bool,
        changed_scan_angle: bool,
        changed_user_data: bool,
        changed_point_source: bool,
        changed_gps_time: bool,

        layer_sizes: LayerSizes,
        selection: DecompressionSelection,

        current_context: usize,
        contexts: [Option<DecompressContext>; 4],
    }

    impl Point14Decompressor {
        pub fn new() -> Self {
            Self::selective(DecompressionSelection::all())
        }

        pub fn selective(selection: DecompressionSelection) -> Self {
            Self {
                dec_channel_returns_xy: new_layer_decoder(),
                dec_z: new_layer_decoder(),
                dec_classification: new_layer_decoder(),
                dec_flags: new_layer_decoder(),
                dec_intensity: new_layer_decoder(),
                dec_scan_angle: new_layer_decoder(),
                dec_user_data: new_layer_decoder(),
                dec_point_source: new_layer_decoder(),
                dec_gps_time: new_layer_decoder(),
                changed_z: false,
                changed_classification: false,
                changed_flags: false,
                changed_intensity: false,
                changed_scan_angle: false,
                changed_user_data: false,
                changed_point_source: false,
                changed_gps_time: false,
                layer_sizes: LayerSizes::default(),
                selection,
                current_context: 0,
                contexts: [None, None, None, None],
            }
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for Point14Decompressor {
        fn item_size(&self) -> usize {
            Point14::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            src.read_exact(first)?;
            let point = Point14::unpack_from(first);
            for slot in &mut self.contexts {
                *slot = None;
            }
            self.current_context = point.scanner_channel() as usize;
            *context = self.current_context;
            self.contexts[self.current_context] =
                Some(DecompressContext::from_last_point(&point));
            Ok(())
        }

        fn decompress_field(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let changed_values = {
                let the_context = self.contexts[self.current_context].as_mut().unwrap();
                let lpr = last_point_return_context(&the_context.last);
                self.dec_channel_returns_xy
                    .decode_symbol(&mut the_context.changed_values_models[lpr])?
            };

            if changed_values & (1 << 6) != 0 {
                let diff = {
                    let the_context = self.contexts[self.current_context].as_mut().unwrap();
                    self.dec_channel_returns_xy
                        .decode_symbol(&mut the_context.scanner_channel_model)?
                };
                let channel = (self.current_context + diff as usize + 1) % 4;
                if self.contexts[channel].is_none() {
                    let seed = self.contexts[self.current_context].as_ref().unwrap().last;
                    self.contexts[channel] = Some(DecompressContext::from_last_point(&seed));
                }
                self.current_context = channel;
            }
            *context = self.current_context;

            let point_source_changed = changed_values & CHANGED_POINT_SOURCE != 0;
            let gps_time_changed = changed_values & CHANGED_GPS_TIME != 0;
            let scan_angle_changed = changed_values & CHANGED_SCAN_ANGLE != 0;

            {
                let the_context = self.contexts[self.current_context].as_mut().unwrap();
                the_context
                    .last
                    .set_scanner_channel(self.current_context as u8);

                let last_n = the_context.last.number_of_returns();
                let last_r = the_context.last.return_number();

                let n = if changed_values & CHANGED_NUMBER_OF_RETURNS != 0 {
                    let model = lazy_model(
                        &mut the_context.number_of_returns_models,
                        last_n as usize,
                        16,
                    );
                    self.dec_channel_returns_xy.decode_symbol(model)? as u8
                } else {
                    last_n
                };
                the_context.last.set_number_of_returns(n);

                let r = match changed_values & 3 {
                    0 => last_r,
                    1 => (last_r + 1) % 16,
                    2 => (last_r + 15) % 16,
                    _ => {
                        if gps_time_changed {
                            let model = lazy_model(
                                &mut the_context.return_number_models,
                                last_r as usize,
                                16,
                            );
                            self.dec_channel_returns_xy.decode_symbol(model)? as u8
                        } else {
                            let sym = self
                                .dec_channel_returns_xy
                                .decode_symbol(&mut the_context.return_number_gps_same)?;
                            ((u32::from(last_r) + sym + 2) % 16) as u8
                        }
                    }
                };
                the_context.last.set_return_number(r);

                let m = NUMBER_RETURN_MAP_6CTX[n as usize][r as usize] as usize;
                let l = NUMBER_RETURN_LEVEL_8CTX[n as usize][r as usize] as usize;
                let cpr = current_point_return_context(u32::from(r), u32::from(n));

                // x
                let idx = (m << 1) | gps_time_changed as usize;
                let median = the_context.x_diff_median[idx].get();
                let diff = the_context.ic_dx.decompress(
                    &mut self.dec_channel_returns_xy,
                    median,
                    (n == 1) as u32,
                )?;
                the_context.last.x = the_context.last.x.wrapping_add(diff);
                the_context.x_diff_median[idx].add(diff);

                // y
                let median = the_context.y_diff_median[idx].get();
                let k_bits = the_context.ic_dx.k();
                let ctx = (n == 1) as u32 + if k_bits < 20 { even(k_bits) } else { 20 };
                let diff = the_context.ic_dy.decompress(
                    &mut self.dec_channel_returns_xy,
                    median,
                    ctx,
                )?;
                the_context.last.y = the_context.last.y.wrapping_add(diff);
                the_context.y_diff_median[idx].add(diff);

                // z
                if self.changed_z {
                    let k_bits = (the_context.ic_dx.k() + the_context.ic_dy.k()) / 2;
                    let ctx = (n == 1) as u32 + if k_bits < 18 { even(k_bits) } else { 18 };
                    the_context.last.z =
                        the_context
                            .ic_z
                            .decompress(&mut self.dec_z, the_context.last_z[l], ctx)?;
                    the_context.last_z[l] = the_context.last.z;
                }

                // classification
                if self.changed_classification {
                    let ccc = ((the_context.last.classification as usize & 0x1F) << 1)
                        + (cpr == 3) as usize;
                    let model = lazy_model(&mut the_context.classification_models, ccc, 256);
                    the_context.last.classification =
                        self.dec_classification.decode_symbol(model)? as u8;
                }

                // flags
                if self.changed_flags {
                    let last_flags = (the_context.last.edge_of_flight_line() as usize) << 5
                        | (the_context.last.scan_direction_flag() as usize) << 4
                        | the_context.last.classification_flags() as usize;
                    let model = lazy_model(&mut the_context.flags_models, last_flags, 64);
                    let flags = self.dec_flags.decode_symbol(model)?;
                    the_context.last.flags = ((flags >> 5 & 1) << 7
                        | (flags >> 4 & 1) << 6
                        | (self.current_context as u32) << 4
                        | (flags & 0x0F)) as u8;
                }

                // intensity
                if self.changed_intensity {
                    let idx = (cpr << 1 | gps_time_changed as u32) as usize;
                    the_context.last.intensity = the_context.ic_intensity.decompress(
                        &mut self.dec_intensity,
                        i32::from(the_context.last_intensities[idx]),
                        cpr,
                    )? as u16;
                    the_context.last_intensities[idx] = the_context.last.intensity;
                }

                // scan angle
                if self.changed_scan_angle && scan_angle_changed {
                    the_context.last.scan_angle = the_context.ic_scan_angle.decompress(
                        &mut self.dec_scan_angle,
                        i32::from(the_context.last.scan_angle),
                        gps_time_changed as u32,
                    )? as u16;
                }

                // user data
                if self.changed_user_data {
                    let model = lazy_model(
                        &mut the_context.user_data_models,
                        (the_context.last.user_data / 4) as usize,
                        256,
                    );
                    the_context.last.user_data =
                        self.dec_user_data.decode_symbol(model)? as u8;
                }

                // point source
                if self.changed_point_source && point_source_changed {
                    the_context.last.point_source_id = the_context.ic_point_source.decompress(
                        &mut self.dec_point_source,
                        i32::from(the_context.last.point_source_id),
                        0,
                    )? as u16;
                }

                the_context.last.gps_time_changed = gps_time_changed;
            }

            if self.changed_gps_time && gps_time_changed {
                let the_context = self.contexts[self.current_context].as_mut().unwrap();
                decompress_gps_time(&mut self.dec_gps_time, the_context)?;
                the_context.last.gps_time =
                    the_context.gps.last_times[the_context.gps.last].to_f64();
            }

            self.contexts[self.current_context]
                .as_ref()
                .unwrap()
                .last
                .pack_into(current_point);
            Ok(())
        }

        fn read_layer_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layer_sizes = LayerSizes::read_from(src)?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            let sizes = self.layer_sizes;

            // the channel/returns/xy backbone is never skippable
            load_layer(
                true,
                sizes.channel_returns_xy as usize,
                &mut self.dec_channel_returns_xy,
                src,
            )?;
            self.changed_z = load_layer(
                self.selection.wants_z(),
                sizes.z as usize,
                &mut self.dec_z,
                src,
            )?;
            self.changed_classification = load_layer(
                self.selection.wants_classification(),
                sizes.classification as usize,
                &mut self.dec_classification,
                src,
            )?;
            self.changed_flags = load_layer(
                self.selection.wants_flags(),
                sizes.flags as usize,
                &mut self.dec_flags,
                src,
            )?;
            self.changed_intensity = load_layer(
                self.selection.wants_intensity(),
                sizes.intensity as usize,
                &mut self.dec_intensity,
                src,
            )?;
            self.changed_scan_angle = load_layer(
                self.selection.wants_scan_angle(),
                sizes.scan_angle as usize,
                &mut self.dec_scan_angle,
                src,
            )?;
            self.changed_user_data = load_layer(
                self.selection.wants_user_data(),
                sizes.user_data as usize,
                &mut self.dec_user_data,
                src,
            )?;
            self.changed_point_source = load_layer(
                self.selection.wants_point_source(),
                sizes.point_source as usize,
                &mut self.dec_point_source,
                src,
            )?;
            self.changed_gps_time = load_layer(
                self.selection.wants_gps_time(),
                sizes.gps_time as usize,
                &mut self.dec_gps_time,
                src,
            )?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn last_point_return_contexts() {
            let mut point = Point14::default();
            point.set_return_number(1);
            point.set_number_of_returns(1);
            assert_eq!(last_point_return_context(&point), 3);
            point.gps_time_changed = true;
            assert_eq!(last_point_return_context(&point), 7);
            point.set_return_number(2);
            point.set_number_of_returns(3);
            assert_eq!(last_point_return_context(&point), 4);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn packed_nibbles() {
        let mut point = Point14::default();
        point.set_return_number(5);
        point.set_number_of_returns(12);
        point.set_scanner_channel(2);
        assert_eq!(point.return_number(), 5);
        assert_eq!(point.number_of_returns(), 12);
        assert_eq!(point.scanner_channel(), 2);

        let mut buf = [0u8; Point14::SIZE];
        point.pack_into(&mut buf);
        let other = Point14::unpack_from(&buf);
        assert_eq!(other.returns, point.returns);
        assert_eq!(other.flags, point.flags);
    }
}
