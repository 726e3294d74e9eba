//! # Teleplay: teleoperation episodes in, training batches out
//!
//! The umbrella crate for the teleplay pipeline. Record episodes with
//! [`episode`], convert them into a compressed columnar store with [`store`]
//! (built once per source directory, cached behind a file lock), then sample
//! fixed-length training windows with [`dataset`].
//!
//! ```no_run
//! use teleplay::{DatasetConfig, FieldKind, ReplayDataset, ShapeMeta};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shape_meta = ShapeMeta::new(
//!     [10],
//!     [
//!         ("ee_pos".to_owned(), FieldKind::LowDim, vec![3]),
//!         ("cam".to_owned(), FieldKind::Rgb, vec![3, 96, 96]),
//!     ],
//! )?;
//!
//! let mut config = DatasetConfig::new("data/pick_place", shape_meta);
//! config.horizon = 16;
//! config.pad_before = 1;
//! config.pad_after = 7;
//!
//! let dataset = ReplayDataset::new(config)?;
//! let sample = dataset.get_item(0)?;
//! println!("action window: {:?}", sample.action.shape());
//! # Ok(()) }
//! ```

pub use tp_dataset as dataset;
pub use tp_encoding as encoding;
pub use tp_episode as episode;
pub use tp_store as store;

pub use tp_error::format as format_error;

#[cfg(feature = "log_setup")]
pub use tp_log::setup_logging;

// ----------------------------------------------------------------------------
// The everyday surface, flattened:

pub use tp_dataset::{
    val_mask, DatasetConfig, Normalizer, NormalizerScheme, ReplayDataset, Sample, SequenceSampler,
};
pub use tp_episode::{
    canonicalize_actions, decanonicalize_actions, FieldKind, RawEpisode, RotationRep,
    RotationTransformer, ShapeMeta,
};
pub use tp_store::{
    build_store, get_or_build, ColumnarStore, DiskBacking, MemoryBacking, TranscodeConfig,
};
