//! Full-pipeline tests: episode files on disk through conversion, caching,
//! sampling and normalization.

use std::path::Path;

use ndarray::{Array, Array2, Array4};

use tp_dataset::{DatasetConfig, ReplayDataset};
use tp_episode::{write_episode, FieldKind, RawEpisode, ShapeMeta};
use tp_store::{TranscodeConfig, ARCHIVE_FILE_NAME};

// ----------------------------------------------------------------------------

fn test_meta() -> ShapeMeta {
    ShapeMeta::new(
        [10],
        [
            ("ee_pos".to_owned(), FieldKind::LowDim, vec![3]),
            ("cam".to_owned(), FieldKind::Rgb, vec![3, 6, 8]),
        ],
    )
    .unwrap()
}

fn write_source_dir(dir: &Path, episode_steps: &[usize]) {
    for (index, &steps) in episode_steps.iter().enumerate() {
        let actions = Array2::from_shape_fn((steps, 7), |(t, d)| {
            (index * 100 + t) as f32 * 0.01 + d as f32 * 0.1
        });
        let ee_pos =
            Array::from_shape_fn((steps, 3), |(t, d)| (index * 10 + t) as f32 + d as f32)
                .into_dyn();
        let cam = Array4::from_shape_fn((steps, 12, 16, 3), |(t, y, x, c)| {
            (index * 13 + t * 31 + y * 7 + x * 3 + c) as u8
        });

        let episode = RawEpisode {
            actions,
            lowdim: [("ee_pos".to_owned(), ee_pos)].into(),
            images: [("cam".to_owned(), cam)].into(),
        };
        write_episode(&dir.join(format!("episode_{index}.epr")), &episode).unwrap();
    }
}

fn test_config(source_dir: &Path) -> DatasetConfig {
    let mut config = DatasetConfig::new(source_dir, test_meta());
    config.horizon = 4;
    config.pad_before = 1;
    config.pad_after = 1;
    config.transcode = TranscodeConfig {
        n_workers: 2,
        max_inflight: 4,
        ..Default::default()
    };
    config
}

// ----------------------------------------------------------------------------

#[test]
fn end_to_end_samples_have_training_layout() {
    let dir = tempfile::tempdir().unwrap();
    write_source_dir(dir.path(), &[5, 3]);

    let dataset = ReplayDataset::new(test_config(dir.path())).unwrap();

    // episode_ends deltas equal the per-episode step counts.
    assert_eq!(dataset.store().episode_ends(), &[5, 8]);
    assert_eq!(dataset.len(), 10);

    let sample = dataset.get_item(2).unwrap();
    assert_eq!(sample.action.shape(), &[4, 10]);
    assert_eq!(sample.obs["ee_pos"].shape(), &[4, 3]);

    // Images come out channels-first and scaled to [0, 1].
    let cam = &sample.obs["cam"];
    assert_eq!(cam.shape(), &[4, 3, 6, 8]);
    assert!(cam.iter().all(|&v| (0.0..=1.0).contains(&v)));

    // The fitted image transform applies to the sampled window layout as-is.
    let normalizer = dataset.normalizer().unwrap();
    let normalized = normalizer.normalize("cam", cam).unwrap();
    assert_eq!(normalized.shape(), cam.shape());
}

#[test]
fn cached_and_direct_builds_sample_identically() {
    let dir = tempfile::tempdir().unwrap();
    write_source_dir(dir.path(), &[5, 3]);

    let direct = {
        let mut config = test_config(dir.path());
        config.use_cache = false;
        ReplayDataset::new(config).unwrap()
    };
    assert!(!dir.path().join(ARCHIVE_FILE_NAME).exists());

    let cached = ReplayDataset::new(test_config(dir.path())).unwrap();
    assert!(dir.path().join(ARCHIVE_FILE_NAME).is_file());

    // Third run loads the archive written by the second.
    let reloaded = ReplayDataset::new(test_config(dir.path())).unwrap();

    assert_eq!(direct.len(), reloaded.len());
    for index in [0, 3, 9] {
        let a = direct.get_item(index).unwrap();
        let b = cached.get_item(index).unwrap();
        let c = reloaded.get_item(index).unwrap();
        similar_asserts::assert_eq!(a, b);
        similar_asserts::assert_eq!(b, c);
    }
}
