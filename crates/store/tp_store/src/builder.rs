//! Conversion of a directory of episode recordings into one [`ColumnarStore`].
//!
//! Two phases: every episode is read, canonicalized and resized in ascending
//! numeric order (so offsets and concatenation order are reproducible), then
//! each field is concatenated across episodes and written out in one go —
//! low-dim fields as a single dense chunk, image fields through the
//! compressing transcoder.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array4, ArrayD, Axis};

use tp_episode::{
    canonicalize_actions, read_episode, EpisodeError, RotationTransformer, ShapeMeta,
};

use crate::{
    encode_frames, resize_frames, ColumnarStore, FieldColumn, StoreError, TranscodeConfig,
};

/// The field name the canonical action column is stored under.
pub const ACTION_FIELD: &str = "action";

// ----------------------------------------------------------------------------

/// Count the `episode_<k>.epr` files in `source_dir`.
fn count_episodes(source_dir: &Path) -> Result<usize, StoreError> {
    let entries = std::fs::read_dir(source_dir).map_err(|source| {
        StoreError::Episode(EpisodeError::Io {
            path: source_dir.to_owned(),
            source,
        })
    })?;

    let mut count = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(stem) = name.strip_prefix("episode_").and_then(|n| n.strip_suffix(".epr")) {
            if stem.parse::<usize>().is_ok() {
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Convert every episode under `source_dir` into a single columnar store.
pub fn build_store(
    source_dir: &Path,
    shape_meta: &ShapeMeta,
    transformer: &RotationTransformer,
    config: &TranscodeConfig,
) -> Result<ColumnarStore, StoreError> {
    let num_episodes = count_episodes(source_dir)?;
    if num_episodes == 0 {
        return Err(StoreError::NoEpisodes(source_dir.to_owned()));
    }

    tp_log::info!("converting {num_episodes} episodes from {source_dir:?}");

    let mut episode_ends: Vec<i64> = Vec::with_capacity(num_episodes);
    let mut prev_end = 0_i64;
    let mut lowdim_parts: BTreeMap<String, Vec<ArrayD<f32>>> = BTreeMap::new();
    let mut rgb_parts: BTreeMap<String, Vec<Array4<u8>>> = BTreeMap::new();

    for index in 0..num_episodes {
        let path = source_dir.join(format!("episode_{index}.epr"));
        if !path.is_file() {
            return Err(StoreError::MissingEpisode { index, path });
        }

        let mut episode = read_episode(&path, shape_meta)?;
        let steps = episode.num_steps();
        prev_end += steps as i64;
        episode_ends.push(prev_end);

        let actions =
            canonicalize_actions(&episode.actions, transformer, shape_meta.action_dim())?;
        lowdim_parts
            .entry(ACTION_FIELD.to_owned())
            .or_default()
            .push(actions.into_dyn());

        for field in shape_meta.lowdim_fields() {
            let data = episode.lowdim.remove(&field.name).ok_or_else(|| {
                EpisodeError::MissingField {
                    field: field.name.clone(),
                }
            })?;
            lowdim_parts.entry(field.name.clone()).or_default().push(data);
        }

        for field in shape_meta.rgb_fields() {
            let raw = episode.images.remove(&field.name).ok_or_else(|| {
                EpisodeError::MissingField {
                    field: field.name.clone(),
                }
            })?;
            let target_hw = field.image_size().expect("rgb fields declare (3, H, W)");
            let resized = resize_frames(raw.view(), target_hw)?;
            rgb_parts.entry(field.name.clone()).or_default().push(resized);
        }
    }

    let mut data = BTreeMap::new();

    tp_log::debug!("concatenating {} low-dim fields", lowdim_parts.len());
    for (name, parts) in lowdim_parts {
        let views: Vec<_> = parts.iter().map(|part| part.view()).collect();
        let concatenated =
            ndarray::concatenate(Axis(0), &views).map_err(|err| StoreError::Malformed {
                reason: format!("field {name:?}: {err}"),
            })?;
        data.insert(name, FieldColumn::LowDim(concatenated));
    }

    tp_log::debug!("transcoding {} image fields", rgb_parts.len());
    for (name, parts) in rgb_parts {
        let views: Vec<_> = parts.iter().map(|part| part.view()).collect();
        let concatenated =
            ndarray::concatenate(Axis(0), &views).map_err(|err| StoreError::Malformed {
                reason: format!("field {name:?}: {err}"),
            })?;
        let column = encode_frames(&name, concatenated.view(), config)?;
        data.insert(name, FieldColumn::Rgb(column));
    }

    ColumnarStore::new(episode_ends, data)
}
