use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Result, SampleSet, TrainError};

pub type Batch = SampleSet;

/// Row indices of the training and held-out subsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// Shuffles `0..n` with `seed` and holds out `ceil(val_fraction * n)` rows.
pub fn split(n: usize, val_fraction: f64, seed: u64) -> Result<Split> {
    if !(val_fraction > 0.0 && val_fraction < 1.0) {
        return Err(TrainError::InvalidConfig(format!(
            "validation fraction must lie strictly between 0 and 1, got {val_fraction}"
        )));
    }
    let n_val = (val_fraction * n as f64).ceil() as usize;
    if n_val == 0 || n_val >= n {
        return Err(TrainError::InvalidConfig(format!(
            "cannot split {n} samples with validation fraction {val_fraction}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let val = indices.split_off(n - n_val);
    Ok(Split {
        train: indices,
        val,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub drop_incomplete: bool,
}

impl BatchConfig {
    /// Shuffled; a short final batch is dropped to keep batch-norm statistics stable.
    pub fn training(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: true,
            drop_incomplete: true,
        }
    }

    /// Fixed order; every held-out row is covered.
    pub fn validation(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            drop_incomplete: false,
        }
    }
}

/// Groups `indices` into batches. `seed` only matters when shuffling.
pub fn plan_batches(indices: &[usize], config: BatchConfig, seed: u64) -> Result<Vec<Vec<usize>>> {
    if config.batch_size == 0 {
        return Err(TrainError::InvalidConfig("batch size must be positive".to_string()));
    }
    let mut order = indices.to_vec();
    if config.shuffle {
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    }
    Ok(order
        .chunks(config.batch_size)
        .filter(|chunk| !config.drop_incomplete || chunk.len() == config.batch_size)
        .map(<[usize]>::to_vec)
        .collect())
}

pub fn batches<'a>(
    samples: &'a SampleSet,
    plan: &'a [Vec<usize>],
) -> impl Iterator<Item = Batch> + 'a {
    plan.iter().map(|indices| samples.select(indices))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn split_is_deterministic_per_seed() {
        let a = split(500, 0.2, 42).unwrap();
        let b = split(500, 0.2, 42).unwrap();
        assert_eq!(a, b);

        let c = split(500, 0.2, 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn split_partitions_all_rows() {
        let Split { train, val } = split(101, 0.3, 7).unwrap();
        assert_eq!(val.len(), 31);
        assert_eq!(train.len(), 70);
        let all: HashSet<_> = train.iter().chain(&val).copied().collect();
        assert_eq!(all, (0..101).collect());
    }

    #[test]
    fn split_rejects_fractions_outside_open_interval() {
        for bad in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                split(100, bad, 42),
                Err(TrainError::InvalidConfig(_))
            ));
        }
        for good in [0.01, 0.2, 0.5, 0.99] {
            assert!(split(100, good, 42).is_ok());
        }
    }

    #[test]
    fn split_rejects_sets_too_small_to_split() {
        assert!(matches!(split(1, 0.5, 0), Err(TrainError::InvalidConfig(_))));
        assert!(matches!(split(0, 0.5, 0), Err(TrainError::InvalidConfig(_))));
    }

    #[test]
    fn training_batches_drop_the_short_tail() {
        let indices: Vec<usize> = (0..650).collect();
        let plan = plan_batches(&indices, BatchConfig::training(64), 1).unwrap();
        assert_eq!(plan.len(), 10);
        assert!(plan.iter().all(|b| b.len() == 64));
        assert_ne!(plan[0], (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn validation_batches_keep_order_and_tail() {
        let indices: Vec<usize> = (0..160).collect();
        let plan = plan_batches(&indices, BatchConfig::validation(64), 1).unwrap();
        assert_eq!(
            plan.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![64, 64, 32]
        );
        assert_eq!(plan.concat(), indices);
    }

    #[test]
    fn training_shuffle_depends_on_seed() {
        let indices: Vec<usize> = (0..256).collect();
        let a = plan_batches(&indices, BatchConfig::training(64), 3).unwrap();
        let b = plan_batches(&indices, BatchConfig::training(64), 3).unwrap();
        let c = plan_batches(&indices, BatchConfig::training(64), 4).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let indices: Vec<usize> = (0..10).collect();
        for config in [BatchConfig::training(0), BatchConfig::validation(0)] {
            assert!(matches!(
                plan_batches(&indices, config, 0),
                Err(TrainError::InvalidConfig(_))
            ));
        }
    }
}
