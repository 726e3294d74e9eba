//! The teleplay columnar training store.
//!
//! Conversion of per-episode recordings into a single random-access
//! [`ColumnarStore`], JPEG transcoding of camera streams, the single-file
//! `.tps` archive format, and the build-once/reuse-forever cache layer.

mod archive;
mod builder;
mod cache;
mod lock;
mod store;
mod transcode;

pub use archive::{read_archive, write_archive, ArchiveError, ARCHIVE_MAGIC, ARCHIVE_VERSION};
pub use builder::{build_store, ACTION_FIELD};
pub use cache::{
    get_or_build, CacheBacking, CacheError, CacheGuard, DiskBacking, MemoryBacking,
    ARCHIVE_FILE_NAME,
};
pub use store::{ColumnarStore, FieldColumn, JpegColumn};
pub use transcode::{encode_frames, resize_frames, TranscodeConfig};

// ----------------------------------------------------------------------------

/// Errors produced while building or reading a [`ColumnarStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Episode(#[from] tp_episode::EpisodeError),

    #[error("no episode files found in {0:?}")]
    NoEpisodes(std::path::PathBuf),

    #[error("episode {index} is missing: expected {path:?} (episodes must be numbered without gaps)")]
    MissingEpisode {
        index: usize,
        path: std::path::PathBuf,
    },

    #[error("frame {frame} of field {field:?} failed encode verification")]
    EncodeVerificationFailed { field: String, frame: usize },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("malformed store: {reason}")]
    Malformed { reason: String },
}
