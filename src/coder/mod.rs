//! The entropy-coding layer: a 32-bit range coder and the adaptive
//! probability models that drive it.
//!
//! The coder follows the Said/Pearlman "fast arithmetic coding"
//! construction: 32-bit registers, 32-bit products, periodic model
//! updates and table-assisted symbol decoding.

pub mod decoder;
pub mod encoder;
pub mod models;

pub use decoder::RangeDecoder;
pub use encoder::RangeEncoder;
pub use models::{BitModel, SymbolModel};

/// Maximum length of the coding interval.
pub(crate) const MAX_INTERVAL: u32 = 0xFFFF_FFFF;
/// Renormalization threshold; once the interval shrinks below this a byte
/// is shifted out (encoder) or in (decoder).
pub(crate) const MIN_INTERVAL: u32 = 0x0100_0000;

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn encode_mixed_sequence() -> Vec<u8> {
        let mut encoder = RangeEncoder::new(Cursor::new(Vec::new()));
        let mut bit_model = BitModel::new();
        let mut small = SymbolModel::new(4);
        let mut wide = SymbolModel::new(256);

        for i in 0u32..500 {
            encoder.encode_bit(&mut bit_model, i & 1).unwrap();
            encoder.encode_symbol(&mut small, i % 4).unwrap();
            encoder.encode_symbol(&mut wide, (i * 7) % 256).unwrap();
            encoder.write_bit(i & 1).unwrap();
            encoder.write_bits(13, i % (1 << 13)).unwrap();
            encoder.write_u32(i.wrapping_mul(0x9E37_79B9)).unwrap();
        }
        encoder.write_u64(0xDEAD_BEEF_CAFE_F00D).unwrap();
        encoder.write_f32(3.5f32).unwrap();
        encoder.write_f64(-0.125f64).unwrap();
        encoder.done().unwrap();
        encoder.into_inner().into_inner()
    }

    #[test]
    fn interleaved_operations_round_trip() {
        let compressed = encode_mixed_sequence();

        let mut decoder = RangeDecoder::new(Cursor::new(compressed));
        decoder.read_init_bytes().unwrap();
        let mut bit_model = BitModel::new();
        let mut small = SymbolModel::new(4);
        let mut wide = SymbolModel::new(256);

        for i in 0u32..500 {
            assert_eq!(decoder.decode_bit(&mut bit_model).unwrap(), i & 1);
            assert_eq!(decoder.decode_symbol(&mut small).unwrap(), i % 4);
            assert_eq!(decoder.decode_symbol(&mut wide).unwrap(), (i * 7) % 256);
            assert_eq!(decoder.read_bit().unwrap(), i & 1);
            assert_eq!(decoder.read_bits(13).unwrap(), i % (1 << 13));
            assert_eq!(decoder.read_u32().unwrap(), i.wrapping_mul(0x9E37_79B9));
        }
        assert_eq!(decoder.read_u64().unwrap(), 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(decoder.read_f32().unwrap(), 3.5f32);
        assert_eq!(decoder.read_f64().unwrap(), -0.125f64);
    }

    #[test]
    fn encoded_byte_count_is_deterministic() {
        assert_eq!(encode_mixed_sequence(), encode_mixed_sequence());
    }

    #[test]
    fn table_assisted_and_bisection_decoding_agree() {
        let symbols: Vec<u32> = (0u32..2000).map(|i| (i * 31 + i * i) % 256).collect();

        let mut encoder = RangeEncoder::new(Cursor::new(Vec::new()));
        let mut model = SymbolModel::new(256);
        for symbol in &symbols {
            encoder.encode_symbol(&mut model, *symbol).unwrap();
        }
        encoder.done().unwrap();
        let compressed = encoder.into_inner().into_inner();

        // normal decode, lookup table armed
        let mut decoder = RangeDecoder::new(Cursor::new(compressed.clone()));
        decoder.read_init_bytes().unwrap();
        let mut with_table = SymbolModel::new(256);
        let decoded_fast: Vec<u32> = (0..symbols.len())
            .map(|_| decoder.decode_symbol(&mut with_table).unwrap())
            .collect();

        // same decode forced through the pure bisection path
        let mut decoder = RangeDecoder::new(Cursor::new(compressed));
        decoder.read_init_bytes().unwrap();
        let mut without_table = SymbolModel::new(256);
        without_table.lookup.clear();
        without_table.table_size = 0;
        let decoded_slow: Vec<u32> = (0..symbols.len())
            .map(|_| decoder.decode_symbol(&mut without_table).unwrap())
            .collect();

        assert_eq!(decoded_fast, symbols);
        assert_eq!(decoded_slow, symbols);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let compressed = encode_mixed_sequence();
        let truncated = compressed[..compressed.len() / 2].to_vec();

        let mut decoder = RangeDecoder::new(Cursor::new(truncated));
        decoder.read_init_bytes().unwrap();
        let mut wide = SymbolModel::new(256);
        let mut result = Ok(0);
        for _ in 0..100_000 {
            result = decoder.decode_symbol(&mut wide);
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err());
    }
}
