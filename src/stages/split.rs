//! Stage 3: Dataset Splitter

use crate::error::{MidiVelError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// Number of items assigned to the test set: `ceil(test_ratio * n)`
pub fn test_count(n: usize, test_ratio: f64) -> usize {
    let raw = test_ratio * n as f64;
    // Float noise around a whole count (0.1 * 30) must not add a sample;
    // any positive share of a non-empty pool still yields at least one
    let nearest = raw.round();
    let raw = if nearest >= 1.0 && (raw - nearest).abs() < 1e-9 {
        nearest
    } else {
        raw
    };
    (raw.ceil() as usize).min(n)
}

fn check_ratio(test_ratio: f64) -> Result<()> {
    if !test_ratio.is_finite() || test_ratio <= 0.0 || test_ratio >= 1.0 {
        return Err(MidiVelError::InvalidConfiguration(format!(
            "test ratio must be in (0, 1), got {}",
            test_ratio
        )));
    }
    Ok(())
}

/// Randomly partition `pool` into `(train, test)` using the given RNG
///
/// The pool is shuffled; the first `test_count` items form the test set and the
/// rest the train set, both in shuffled order.
pub fn split_with_rng<T, R: Rng + ?Sized>(
    mut pool: Vec<T>,
    test_ratio: f64,
    rng: &mut R,
) -> Result<(Vec<T>, Vec<T>)> {
    check_ratio(test_ratio)?;

    let n_test = test_count(pool.len(), test_ratio);
    if pool.is_empty() {
        warn!("splitting an empty sample pool");
    } else if n_test == pool.len() {
        warn!(samples = pool.len(), "every sample went to the test set");
    }

    pool.shuffle(rng);
    let train = pool.split_off(n_test);
    Ok((train, pool))
}

/// Randomly partition `pool` into `(train, test)`
///
/// A fixed `seed` gives the same membership for the same pool and ratio; `None`
/// seeds from OS entropy.
pub fn split<T>(pool: Vec<T>, test_ratio: f64, seed: Option<u64>) -> Result<(Vec<T>, Vec<T>)> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    split_with_rng(pool, test_ratio, &mut rng)
}
