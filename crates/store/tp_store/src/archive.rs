//! The single-file store archive format (`.tps`).
//!
//! One archive per source directory: magic `TPST`, a format version, then the
//! whole [`ColumnarStore`] as one framed lz4 + bincode payload. Low-dim data
//! round-trips byte-for-byte (lz4 is lossless); image frames round-trip as
//! their exact compressed blobs.

use std::path::Path;

use tp_encoding::Compression;

use crate::ColumnarStore;

pub const ARCHIVE_MAGIC: [u8; 4] = *b"TPST";
pub const ARCHIVE_VERSION: u32 = 1;

// ----------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("failed to access archive {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Encode(#[from] tp_encoding::EncodeError),

    #[error(transparent)]
    Decode(#[from] tp_encoding::DecodeError),
}

// ----------------------------------------------------------------------------

/// Serialize the whole store into a single portable archive file.
pub fn write_archive(path: &Path, store: &ColumnarStore) -> Result<(), ArchiveError> {
    let mut file = std::fs::File::create(path).map_err(|source| ArchiveError::Io {
        path: path.to_owned(),
        source,
    })?;

    tp_encoding::encode_framed(
        &mut file,
        ARCHIVE_MAGIC,
        ARCHIVE_VERSION,
        Compression::Lz4,
        store,
    )?;

    Ok(())
}

/// Deserialize an archive fully back into memory.
pub fn read_archive(path: &Path) -> Result<ColumnarStore, ArchiveError> {
    let mut file = std::fs::File::open(path).map_err(|source| ArchiveError::Io {
        path: path.to_owned(),
        source,
    })?;

    Ok(tp_encoding::decode_framed(
        &mut file,
        ARCHIVE_MAGIC,
        ARCHIVE_VERSION,
    )?)
}
