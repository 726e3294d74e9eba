//! Framed serialization shared by the teleplay file formats.
//!
//! Both the per-episode recording (`.epr`) and the store archive (`.tps`) are
//! laid out the same way on disk:
//!
//! ```text,ignore
//! FileHeader { magic: [u8; 4], version: u32-le, compression: u8 }
//! payload_len: u64-le
//! payload: `bincode`-encoded value, lz4-block-compressed when enabled
//! ```
//!
//! The magic bytes distinguish the two formats; the version is bumped on any
//! incompatible payload change.

use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Serialize};

// ----------------------------------------------------------------------------

/// On failure to serialize or write a framed payload.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("Failed to write: {0}")]
    Write(std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// On failure to read or deserialize a framed payload.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Not a valid teleplay file: bad magic (expected {expected:?}, found {found:?})")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("Unsupported file format version: {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },

    #[error("Unknown compression marker: {0}")]
    UnknownCompression(u8),

    #[error("Failed to read: {0}")]
    Read(std::io::Error),

    #[error("lz4 error: {0}")]
    Lz4(lz4_flex::block::DecompressError),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

// ----------------------------------------------------------------------------

/// Whether the payload block is lz4-compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Off = 0,
    Lz4 = 1,
}

/// The fixed-size header at the start of every teleplay file.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub compression: Compression,
}

impl FileHeader {
    pub const SIZE: usize = 9;

    pub fn encode(&self, write: &mut impl Write) -> Result<(), EncodeError> {
        let Self {
            magic,
            version,
            compression,
        } = self;
        let mut buf = [0_u8; Self::SIZE];
        buf[0..4].copy_from_slice(magic);
        buf[4..8].copy_from_slice(&version.to_le_bytes());
        buf[8] = *compression as u8;
        write.write_all(&buf).map_err(EncodeError::Write)
    }

    pub fn decode(
        read: &mut impl Read,
        expected_magic: [u8; 4],
        expected_version: u32,
    ) -> Result<Self, DecodeError> {
        let mut buf = [0_u8; Self::SIZE];
        read.read_exact(&mut buf).map_err(DecodeError::Read)?;

        let mut magic = [0_u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != expected_magic {
            return Err(DecodeError::BadMagic {
                expected: expected_magic,
                found: magic,
            });
        }

        let mut version_bytes = [0_u8; 4];
        version_bytes.copy_from_slice(&buf[4..8]);
        let version = u32::from_le_bytes(version_bytes);
        if version != expected_version {
            return Err(DecodeError::UnsupportedVersion {
                expected: expected_version,
                found: version,
            });
        }

        let compression = match buf[8] {
            0 => Compression::Off,
            1 => Compression::Lz4,
            unknown => return Err(DecodeError::UnknownCompression(unknown)),
        };

        Ok(Self {
            magic,
            version,
            compression,
        })
    }
}

// ----------------------------------------------------------------------------

/// Serialize `value` as a single framed payload.
pub fn encode_framed<T: Serialize>(
    write: &mut impl Write,
    magic: [u8; 4],
    version: u32,
    compression: Compression,
    value: &T,
) -> Result<(), EncodeError> {
    FileHeader {
        magic,
        version,
        compression,
    }
    .encode(write)?;

    let uncompressed = bincode::serialize(value)?;
    let payload = match compression {
        Compression::Off => uncompressed,
        Compression::Lz4 => lz4_flex::block::compress_prepend_size(&uncompressed),
    };

    write
        .write_all(&(payload.len() as u64).to_le_bytes())
        .map_err(EncodeError::Write)?;
    write.write_all(&payload).map_err(EncodeError::Write)?;

    Ok(())
}

/// Read back a single framed payload written by [`encode_framed`].
pub fn decode_framed<T: DeserializeOwned>(
    read: &mut impl Read,
    expected_magic: [u8; 4],
    expected_version: u32,
) -> Result<T, DecodeError> {
    let header = FileHeader::decode(read, expected_magic, expected_version)?;

    let mut len = [0_u8; 8];
    read.read_exact(&mut len).map_err(DecodeError::Read)?;
    let len = u64::from_le_bytes(len) as usize;

    let mut payload = vec![0_u8; len];
    read.read_exact(&mut payload).map_err(DecodeError::Read)?;

    let uncompressed = match header.compression {
        Compression::Off => payload,
        Compression::Lz4 => {
            lz4_flex::block::decompress_size_prepended(&payload).map_err(DecodeError::Lz4)?
        }
    };

    Ok(bincode::deserialize(&uncompressed)?)
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = *b"TPXX";

    #[test]
    fn roundtrip_compressed_and_not() {
        let value: (String, Vec<f32>) = ("hello".to_owned(), vec![0.0, 1.5, -2.0]);

        for compression in [Compression::Off, Compression::Lz4] {
            let mut bytes = Vec::new();
            encode_framed(&mut bytes, MAGIC, 1, compression, &value).unwrap();

            let decoded: (String, Vec<f32>) =
                decode_framed(&mut bytes.as_slice(), MAGIC, 1).unwrap();
            similar_asserts::assert_eq!(value, decoded);
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Vec::new();
        encode_framed(&mut bytes, MAGIC, 1, Compression::Lz4, &42_u32).unwrap();

        let result: Result<u32, _> = decode_framed(&mut bytes.as_slice(), *b"NOPE", 1);
        assert!(matches!(result, Err(DecodeError::BadMagic { .. })));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = Vec::new();
        encode_framed(&mut bytes, MAGIC, 2, Compression::Lz4, &42_u32).unwrap();

        let result: Result<u32, _> = decode_framed(&mut bytes.as_slice(), MAGIC, 1);
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedVersion {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = Vec::new();
        encode_framed(&mut bytes, MAGIC, 1, Compression::Lz4, &vec![0_u8; 1024]).unwrap();
        bytes.truncate(bytes.len() - 1);

        let result: Result<Vec<u8>, _> = decode_framed(&mut bytes.as_slice(), MAGIC, 1);
        assert!(matches!(result, Err(DecodeError::Read(_))));
    }
}
