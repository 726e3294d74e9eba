//! Image transcoding: resize + per-frame JPEG encoding.
//!
//! Frames are encoded concurrently by a pool of worker threads fed through a
//! bounded channel: once `max_inflight` tasks are queued, submission blocks
//! until at least one completion comes back. Each worker immediately re-decodes
//! its own output — a frame that cannot be decoded invalidates the whole store,
//! so the first failure aborts the build.

use ndarray::{Array3, Array4, ArrayView4, Axis};

use crate::{JpegColumn, StoreError};

// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Number of encode worker threads.
    pub n_workers: usize,

    /// Maximum number of queued-but-unfinished encode tasks.
    pub max_inflight: usize,

    /// Fixed JPEG quality (0–100) for every frame.
    pub jpeg_quality: u8,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        let n_workers = std::thread::available_parallelism().map_or(4, usize::from);
        Self {
            n_workers,
            max_inflight: n_workers * 5,
            jpeg_quality: 85,
        }
    }
}

// ----------------------------------------------------------------------------

/// Resize raw frames `(N, H_raw, W_raw, 3)` to `(N, H, W, 3)`.
///
/// Uses a box (area-averaging) filter, the appropriate choice for the
/// downscaling this pipeline does.
pub fn resize_frames(
    frames: ArrayView4<'_, u8>,
    target_hw: (usize, usize),
) -> Result<Array4<u8>, StoreError> {
    let (n, _h_raw, _w_raw, channels) = frames.dim();
    let (height, width) = target_hw;

    if channels != 3 {
        return Err(StoreError::Malformed {
            reason: format!("expected 3-channel frames, got {channels}"),
        });
    }

    let mut resized = Array4::<u8>::zeros((n, height, width, 3));
    for (index, frame) in frames.axis_iter(Axis(0)).enumerate() {
        let (h_raw, w_raw, _) = frame.dim();
        let (pixels, _) = frame.to_owned().into_raw_vec_and_offset();
        let img = image::RgbImage::from_raw(w_raw as u32, h_raw as u32, pixels).ok_or_else(
            || StoreError::Malformed {
                reason: format!("frame {index} has inconsistent pixel count"),
            },
        )?;

        let small = image::imageops::thumbnail(&img, width as u32, height as u32);
        if index == 0 {
            assert_eq!(
                (small.height() as usize, small.width() as usize),
                (height, width),
                "resize produced the wrong frame size"
            );
        }

        let small = Array3::from_shape_vec((height, width, 3), small.into_raw()).map_err(
            |err| StoreError::Malformed {
                reason: format!("frame {index}: {err}"),
            },
        )?;
        resized.index_axis_mut(Axis(0), index).assign(&small);
    }

    Ok(resized)
}

// ----------------------------------------------------------------------------

/// Encode resized frames `(N, H, W, 3)` into a [`JpegColumn`], one chunk per
/// frame, using the bounded worker pool described at the module level.
///
/// The output is a pure function of the input: any `max_inflight`/`n_workers`
/// combination produces byte-identical blobs.
pub fn encode_frames(
    field: &str,
    frames: ArrayView4<'_, u8>,
    config: &TranscodeConfig,
) -> Result<JpegColumn, StoreError> {
    let (n, height, width, channels) = frames.dim();
    if channels != 3 {
        return Err(StoreError::Malformed {
            reason: format!("expected 3-channel frames, got {channels}"),
        });
    }

    let n_workers = config.n_workers.max(1);
    let max_inflight = config.max_inflight.max(1);
    let quality = config.jpeg_quality;

    tp_log::debug!(
        "encoding {n} frames of {field:?} ({n_workers} workers, {max_inflight} in flight)"
    );

    let (task_tx, task_rx) = crossbeam::channel::bounded::<(usize, Vec<u8>)>(max_inflight);
    let (result_tx, result_rx) =
        crossbeam::channel::unbounded::<(usize, Result<Vec<u8>, StoreError>)>();

    let mut blobs: Vec<Option<Vec<u8>>> = vec![None; n];
    let mut first_error: Option<StoreError> = None;

    std::thread::scope(|scope| {
        for _ in 0..n_workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let field = field.to_owned();
            scope.spawn(move || {
                while let Ok((frame, raw)) = task_rx.recv() {
                    let result = encode_and_verify(&field, frame, &raw, (height, width), quality);
                    if result_tx.send((frame, result)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        fn settle(
            blobs: &mut [Option<Vec<u8>>],
            first_error: &mut Option<StoreError>,
            (frame, result): (usize, Result<Vec<u8>, StoreError>),
        ) {
            match result {
                Ok(blob) => blobs[frame] = Some(blob),
                Err(err) => {
                    if first_error.is_none() {
                        *first_error = Some(err);
                    }
                }
            }
        }

        let mut submitted = 0_usize;
        let mut completed = 0_usize;

        'submission: for frame in 0..n {
            let (pixels, _) = frames
                .index_axis(Axis(0), frame)
                .to_owned()
                .into_raw_vec_and_offset();
            let mut payload = (frame, pixels);

            loop {
                if first_error.is_some() {
                    // fail fast: a corrupted frame invalidates the store
                    break 'submission;
                }
                match task_tx.try_send(payload) {
                    Ok(()) => {
                        submitted += 1;
                        break;
                    }
                    Err(crossbeam::channel::TrySendError::Full(returned)) => {
                        payload = returned;
                        // at the cap: wait for at least one completion
                        if let Ok(done) = result_rx.recv() {
                            completed += 1;
                            settle(&mut blobs, &mut first_error, done);
                        }
                    }
                    Err(crossbeam::channel::TrySendError::Disconnected(_)) => {
                        break 'submission;
                    }
                }
            }
        }
        drop(task_tx);

        while completed < submitted {
            match result_rx.recv() {
                Ok(done) => {
                    completed += 1;
                    settle(&mut blobs, &mut first_error, done);
                }
                Err(_) => break,
            }
        }
    });

    if let Some(err) = first_error {
        return Err(err);
    }

    let frames = blobs
        .into_iter()
        .enumerate()
        .map(|(frame, blob)| {
            blob.ok_or_else(|| StoreError::Malformed {
                reason: format!("frame {frame} was never encoded"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(JpegColumn {
        height,
        width,
        channels: 3,
        frames,
    })
}

/// Encode one frame and immediately check that the result decodes back to the
/// expected size. Decodability, not bit-equality: the codec is lossy.
fn encode_and_verify(
    field: &str,
    frame: usize,
    raw: &[u8],
    (height, width): (usize, usize),
    quality: u8,
) -> Result<Vec<u8>, StoreError> {
    let mut blob = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut blob, quality);
    encoder.encode(
        raw,
        width as u32,
        height as u32,
        image::ExtendedColorType::Rgb8,
    )?;

    let verification_failed = || StoreError::EncodeVerificationFailed {
        field: field.to_owned(),
        frame,
    };

    let decoded = image::load_from_memory_with_format(&blob, image::ImageFormat::Jpeg)
        .map_err(|_| verification_failed())?;
    if (decoded.height() as usize, decoded.width() as usize) != (height, width) {
        return Err(verification_failed());
    }

    Ok(blob)
}

// ----------------------------------------------------------------------------
