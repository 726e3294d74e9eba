//! Reproducible train/validation episode masks.

use rand::rngs::StdRng;
use rand::SeedableRng as _;

/// Pick the validation episodes: a seeded, uniformly random subset of
/// `round(n_episodes * val_ratio)` episodes, clamped so that both splits are
/// non-empty whenever `n_episodes >= 2`.
///
/// The same `(n_episodes, val_ratio, seed)` triple always yields the same
/// mask. The train mask is the complement.
pub fn val_mask(n_episodes: usize, val_ratio: f32, seed: u64) -> Vec<bool> {
    let mut mask = vec![false; n_episodes];
    if val_ratio <= 0.0 || n_episodes < 2 {
        return mask;
    }

    let n_val = (((n_episodes as f32) * val_ratio).round() as usize).clamp(1, n_episodes - 1);

    let mut rng = StdRng::seed_from_u64(seed);
    for index in rand::seq::index::sample(&mut rng, n_episodes, n_val) {
        mask[index] = true;
    }

    tp_log::debug!("validation mask: {n_val}/{n_episodes} episodes (seed {seed})");

    mask
}

// ----------------------------------------------------------------------------
