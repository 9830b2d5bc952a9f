//! Property-based tests for batch generation using proptest.

use proptest::prelude::*;
use std::collections::HashSet;

use transferkit_ml::data::{
    BatchGenerator, GeneratorConfig, PixelTransform, RemainderPolicy, SampleId, SampleShape, argmax_rows, one_hot,
};

// Batch positions never touch the files, so the paths need not exist.
fn generator(n: usize, batch_size: usize, remainder: RemainderPolicy, shuffle: bool, seed: u64) -> BatchGenerator {
    let samples = (0..n)
        .map(|i| SampleId::new(format!("/nonexistent/sample_{i}.png")).unwrap())
        .collect();
    let labels = (0..n).map(|i| i % 3).collect();
    BatchGenerator::new(
        samples,
        labels,
        GeneratorConfig {
            batch_size,
            shape: SampleShape::new(4, 4, 3),
            num_classes: 3,
            shuffle,
            remainder,
            transform: PixelTransform::UnitScale,
            seed: Some(seed),
        },
    )
    .unwrap()
}

proptest! {
    #[test]
    fn drop_policy_batch_count_is_floor(n in 1usize..200, b in 1usize..32, seed in any::<u64>()) {
        let g = generator(n, b, RemainderPolicy::Drop, true, seed);
        prop_assert_eq!(g.batch_count(), n / b);
    }

    #[test]
    fn pad_policy_batch_count_is_ceil(n in 1usize..200, b in 1usize..32, seed in any::<u64>()) {
        let g = generator(n, b, RemainderPolicy::Pad, true, seed);
        prop_assert_eq!(g.batch_count(), n.div_ceil(b));
    }

    #[test]
    fn epoch_positions_are_distinct(n in 1usize..200, b in 1usize..32, seed in any::<u64>()) {
        let g = generator(n, b, RemainderPolicy::Drop, true, seed);
        let mut seen = HashSet::new();
        let mut total = 0;
        for i in 0..g.batch_count() {
            let positions = g.batch_positions(i).unwrap();
            prop_assert_eq!(positions.len(), b);
            for p in positions {
                prop_assert!(p < n);
                prop_assert!(seen.insert(p));
                total += 1;
            }
        }
        prop_assert_eq!(total, b * g.batch_count());
    }

    #[test]
    fn padded_epoch_covers_every_sample(n in 1usize..200, b in 1usize..32, seed in any::<u64>()) {
        let g = generator(n, b, RemainderPolicy::Pad, true, seed);
        let seen: HashSet<usize> = (0..g.batch_count())
            .flat_map(|i| g.batch_positions(i).unwrap())
            .collect();
        prop_assert_eq!(seen.len(), n);
    }

    #[test]
    fn one_hot_rows_decode_to_label(labels in proptest::collection::vec(0usize..7, 1..64)) {
        let encoded = one_hot(&labels, 7);
        for row in encoded.rows() {
            prop_assert_eq!(row.sum(), 1.0);
        }
        prop_assert_eq!(argmax_rows(&encoded), labels);
    }

    #[test]
    fn shuffled_epochs_differ(n in 12usize..100, seed in any::<u64>()) {
        let mut g = generator(n, 4, RemainderPolicy::Drop, true, seed);
        let first = g.permutation().to_vec();
        g.on_epoch_end();
        let second = g.permutation().to_vec();

        let mut sorted = second.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..n).collect::<Vec<_>>());
        prop_assert_ne!(first, second);
    }

    #[test]
    fn unshuffled_order_is_identity(n in 1usize..100, seed in any::<u64>()) {
        let mut g = generator(n, 4, RemainderPolicy::Drop, false, seed);
        g.on_epoch_end();
        prop_assert_eq!(g.permutation().to_vec(), (0..n).collect::<Vec<_>>());
    }
}

#[test]
fn out_of_range_batch_is_rejected() {
    let g = generator(10, 4, RemainderPolicy::Drop, true, 7);
    assert_eq!(g.batch_count(), 2);
    assert!(g.batch_positions(2).is_err());
}
