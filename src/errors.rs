//! The error type of the crate.

use std::fmt;

use crate::chunked::{CompressorKind, ItemKind};

/// Everything that can go wrong while compressing or decompressing.
///
/// Configuration problems (unknown or unsupported schema entries) are
/// reported at setup time, before any stream I/O. Mid-stream problems carry
/// the index of the offending chunk; records decoded before it stay valid.
#[derive(Debug)]
#[non_exhaustive]
pub enum LazError {
    /// The schema names an attribute-group type this crate does not know.
    UnknownItemType(u16),
    /// The (attribute group, compression revision) pair is not supported.
    UnsupportedItemVersion(ItemKind, u16),
    /// The schema's compressor tag is not a known organization.
    UnknownCompressorKind(u16),
    /// The compressor kind exists but cannot be used here.
    UnsupportedCompressorKind(CompressorKind),
    /// The schema asks for an entropy coder other than the range coder.
    UnknownCoder(u16),
    /// No default item layout exists for this point format id.
    UnsupportedPointFormat(u8),
    /// The operation needs a chunk table and the stream has none.
    MissingChunkTable,
    /// The chunk table failed to decode or its offsets do not increase.
    CorruptChunkTable,
    /// A chunk did not end at the position the chunk table records; the
    /// reader is left at the next recorded chunk start.
    CorruptChunk { index: u64 },
    /// The stream ended inside a chunk.
    TruncatedChunk { index: u64, source: std::io::Error },
    /// A record buffer does not hold a whole number of records.
    BufferLenNotMultipleOfPointSize {
        buffer_len: usize,
        point_size: usize,
    },
    IoError(std::io::Error),
}

impl From<std::io::Error> for LazError {
    fn from(error: std::io::Error) -> Self {
        LazError::IoError(error)
    }
}

impl fmt::Display for LazError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LazError::UnknownItemType(tag) => {
                write!(f, "record item with type code {} is unknown", tag)
            }
            LazError::UnsupportedItemVersion(kind, version) => write!(
                f,
                "item {:?} with compression revision {} is not supported",
                kind, version
            ),
            LazError::UnknownCompressorKind(tag) => {
                write!(f, "compressor kind {} is not valid", tag)
            }
            LazError::UnsupportedCompressorKind(kind) => {
                write!(f, "compressor kind {:?} is not supported here", kind)
            }
            LazError::UnknownCoder(tag) => {
                write!(f, "entropy coder {} is not supported", tag)
            }
            LazError::UnsupportedPointFormat(id) => {
                write!(f, "point format {} is not supported", id)
            }
            LazError::MissingChunkTable => {
                write!(f, "the chunk table is required but could not be found")
            }
            LazError::CorruptChunkTable => write!(f, "the chunk table is corrupt"),
            LazError::CorruptChunk { index } => {
                write!(f, "chunk {} is corrupt", index)
            }
            LazError::TruncatedChunk { index, source } => {
                write!(f, "the stream ended inside chunk {}: {}", index, source)
            }
            LazError::BufferLenNotMultipleOfPointSize {
                buffer_len,
                point_size,
            } => write!(
                f,
                "buffer of {} bytes is not a multiple of the {} byte record size",
                buffer_len, point_size
            ),
            LazError::IoError(error) => write!(f, "io error: {}", error),
        }
    }
}

impl std::error::Error for LazError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LazError::IoError(error) | LazError::TruncatedChunk { source: error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }
}
