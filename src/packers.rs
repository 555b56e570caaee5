//! Fixed little-endian packing of record fields.
//!
//! Point records travel through the codec as raw byte buffers; every codec
//! unpacks the fields it predicts and packs them back after decoding. All
//! on-wire layouts are little endian regardless of the host.

/// A value with a fixed little-endian wire layout.
pub trait Packable {
    /// Reads `Self` from the start of `input`.
    ///
    /// Panics when `input` is shorter than the wire size; record slicing is
    /// the caller's responsibility and a short buffer is a programming
    /// error.
    fn unpack_from(input: &[u8]) -> Self;

    /// Writes `self` to the start of `output`.
    fn pack_into(&self, output: &mut [u8]);
}

macro_rules! packable_int {
    ($ty:ty) => {
        impl Packable for $ty {
            fn unpack_from(input: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&input[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(raw)
            }

            fn pack_into(&self, output: &mut [u8]) {
                output[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

packable_int!(u8);
packable_int!(i8);
packable_int!(u16);
packable_int!(i16);
packable_int!(u32);
packable_int!(i32);
packable_int!(u64);
packable_int!(i64);

impl Packable for f32 {
    fn unpack_from(input: &[u8]) -> Self {
        f32::from_bits(u32::unpack_from(input))
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.to_bits().pack_into(output)
    }
}

impl Packable for f64 {
    fn unpack_from(input: &[u8]) -> Self {
        f64::from_bits(u64::unpack_from(input))
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.to_bits().pack_into(output)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn i32_round_trip() {
        let mut buf = [0u8; 4];
        for value in [-25i32, 0, 1, i32::min_value(), i32::max_value()].iter() {
            value.pack_into(&mut buf);
            assert_eq!(i32::unpack_from(&buf), *value);
        }
    }

    #[test]
    fn packing_is_little_endian() {
        let mut buf = [0u8; 4];
        0x0403_0201u32.pack_into(&mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn short_buffer_panics() {
        let buf = [0u8; 2];
        let _ = u32::unpack_from(&buf);
    }
}
