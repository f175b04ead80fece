//! Property tests: the hierarchical scan matches a sequential prefix sum

#![cfg(feature = "cpu")]

mod common;

use common::{create_cpu_backend, reference_scan};
use proptest::prelude::*;
use scanr::config::ScanConfig;
use scanr::scan::{ScanPlan, Scanner};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_scan_matches_sequential(
        values in proptest::collection::vec(-100i32..100, 0..3000),
        block_size in 2usize..300,
    ) {
        let input: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        let backend = create_cpu_backend();
        let scanner = Scanner::new(&backend, ScanConfig::new(block_size)).unwrap();

        let out = scanner.scan(&input).unwrap();

        prop_assert_eq!(out, reference_scan(&input));
    }

    #[test]
    fn prop_plan_shrinks_to_one_block(len in 1usize..1_000_000, block_size in 2usize..1025) {
        let plan = ScanPlan::new(len, block_size).unwrap();
        let levels = plan.levels();

        prop_assert_eq!(levels[0].len, len);
        prop_assert_eq!(levels[levels.len() - 1].block_count, 1);
        for pair in levels.windows(2) {
            prop_assert_eq!(pair[1].len, pair[0].block_count);
            prop_assert!(pair[1].len < pair[0].len);
        }
    }
}
