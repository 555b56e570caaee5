//! Caller-facing selection of which sub-streams to decompress.

/// Bitmask over the sub-streams of the layered point formats.
///
/// Only the layered (LAS 1.4) formats honor the selection; the older
/// pointwise formats always decode every field. A deselected sub-stream is
/// seeked over instead of decoded, and the matching record fields keep
/// their last decoded value.
///
/// X, Y, the return counts and the scanner channel are the backbone of the
/// prediction contexts and can never be skipped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DecompressionSelection(pub u32);

impl DecompressionSelection {
    pub const ALL: u32 = u32::max_value();

    pub const Z: u32 = 1 << 0;
    pub const CLASSIFICATION: u32 = 1 << 1;
    pub const FLAGS: u32 = 1 << 2;
    pub const INTENSITY: u32 = 1 << 3;
    pub const SCAN_ANGLE: u32 = 1 << 4;
    pub const USER_DATA: u32 = 1 << 5;
    pub const POINT_SOURCE: u32 = 1 << 6;
    pub const GPS_TIME: u32 = 1 << 7;
    pub const RGB: u32 = 1 << 8;
    pub const NIR: u32 = 1 << 9;
    pub const WAVEPACKET: u32 = 1 << 10;
    pub const EXTRA_BYTES: u32 = 1 << 11;

    /// Decompress every sub-stream.
    pub fn all() -> Self {
        Self(Self::ALL)
    }

    /// Only the mandatory backbone: X, Y, returns, scanner channel.
    pub fn base() -> Self {
        Self(0)
    }

    pub fn with(self, mask: u32) -> Self {
        Self(self.0 | mask)
    }

    pub fn without(self, mask: u32) -> Self {
        Self(self.0 & !mask)
    }

    pub(crate) fn wants(self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    pub(crate) fn wants_z(self) -> bool {
        self.wants(Self::Z)
    }

    pub(crate) fn wants_classification(self) -> bool {
        self.wants(Self::CLASSIFICATION)
    }

    pub(crate) fn wants_flags(self) -> bool {
        self.wants(Self::FLAGS)
    }

    pub(crate) fn wants_intensity(self) -> bool {
        self.wants(Self::INTENSITY)
    }

    pub(crate) fn wants_scan_angle(self) -> bool {
        self.wants(Self::SCAN_ANGLE)
    }

    pub(crate) fn wants_user_data(self) -> bool {
        self.wants(Self::USER_DATA)
    }

    pub(crate) fn wants_point_source(self) -> bool {
        self.wants(Self::POINT_SOURCE)
    }

    pub(crate) fn wants_gps_time(self) -> bool {
        self.wants(Self::GPS_TIME)
    }

    pub(crate) fn wants_rgb(self) -> bool {
        self.wants(Self::RGB)
    }

    pub(crate) fn wants_nir(self) -> bool {
        self.wants(Self::NIR)
    }

    pub(crate) fn wants_wavepacket(self) -> bool {
        self.wants(Self::WAVEPACKET)
    }

    pub(crate) fn wants_extra_bytes(self) -> bool {
        self.wants(Self::EXTRA_BYTES)
    }
}

impl Default for DecompressionSelection {
    fn default() -> Self {
        Self::all()
    }
}
