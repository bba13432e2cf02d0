use culprit_core::{
    Algorithm, CacheScope, ComponentSet, ConflictSearch, Enumerator, ImcsEngine, ImcsSearch,
    Oracle, PlantedOracle, Session, SteppedEnumeration,
};
use proptest::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::num::NonZeroUsize;

// A universe of `n` integers with one planted conflict of up to four members.
fn universe_with_conflict() -> impl Strategy<Value = (u32, ComponentSet<u32>)> {
    (1u32..80).prop_flat_map(|n| {
        let max_size = (n as usize).min(4);
        (Just(n), prop::collection::btree_set(0..n, 1..=max_size))
    })
}

fn searches(threshold: usize) -> Vec<Box<dyn ConflictSearch<u32>>> {
    let threshold = NonZeroUsize::new(threshold).unwrap_or(NonZeroUsize::MIN);
    let mut all: Vec<Box<dyn ConflictSearch<u32>>> = Algorithm::ALL
        .into_iter()
        .map(|algorithm| algorithm.build(threshold, true))
        .collect();
    all.push(Algorithm::Imcs.build(threshold, false));
    all
}

fn fails(oracle: &mut PlantedOracle<u32>, subset: &ComponentSet<u32>) -> bool {
    oracle.evaluate(subset).unwrap().is_fail()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn planted_oracle_is_monotone(
        conflict in prop::collection::btree_set(0u32..32, 1..4),
        smaller in prop::collection::btree_set(0u32..32, 0..16),
        extra in prop::collection::btree_set(0u32..32, 0..16),
    ) {
        let mut oracle = PlantedOracle::new(vec![conflict]);
        let larger: ComponentSet<u32> = smaller.union(&extra).copied().collect();
        if fails(&mut oracle, &smaller) {
            prop_assert!(fails(&mut oracle, &larger));
        }
    }

    #[test]
    fn every_algorithm_returns_exactly_the_planted_conflict(
        (n, planted) in universe_with_conflict(),
        threshold in 1usize..64,
    ) {
        let universe: ComponentSet<u32> = (0..n).collect();
        for search in searches(threshold) {
            let mut oracle = PlantedOracle::new(vec![planted.clone()]);
            let found = search.find_conflict_set(&mut oracle, &universe).unwrap();

            prop_assert!(fails(&mut oracle, &found), "{} result does not fail", search.name());
            for member in &found {
                let mut without = found.clone();
                without.remove(member);
                prop_assert!(
                    !fails(&mut oracle, &without),
                    "{} result is not minimal: {:?} is redundant",
                    search.name(),
                    member
                );
            }
            prop_assert_eq!(&found, &planted, "{} missed the planted set", search.name());
        }
    }

    #[test]
    fn cache_never_changes_results_or_adds_calls(
        (n, planted) in universe_with_conflict(),
    ) {
        let universe: ComponentSet<u32> = (0..n).collect();
        for search in searches(8) {
            let plain = Session::new(false)
                .run(search.as_ref(), &mut PlantedOracle::new(vec![planted.clone()]), &universe)
                .unwrap();
            let cached = Session::new(true)
                .run(search.as_ref(), &mut PlantedOracle::new(vec![planted.clone()]), &universe)
                .unwrap();
            prop_assert_eq!(&plain.conflict_set, &cached.conflict_set);
            prop_assert!(cached.invocations <= plain.invocations);
        }
    }

    #[test]
    fn enumerator_finds_every_disjoint_conflict(
        sizes in prop::collection::vec(1usize..4, 1..5),
        seed in any::<u64>(),
    ) {
        let universe: Vec<u32> = (0..64).collect();
        let planted = PlantedOracle::random_disjoint(
            &universe,
            &sizes,
            &mut ChaCha8Rng::seed_from_u64(seed),
        )
        .unwrap();
        let mut expected = planted.conflicts().to_vec();
        expected.sort();

        for scope in [CacheScope::Shared, CacheScope::PerSearch, CacheScope::Disabled] {
            let mut oracle = planted.clone();
            let mut found = Enumerator::new(scope)
                .find_all_conflicts(&mut oracle, &universe.iter().copied().collect())
                .unwrap()
                .conflict_sets;
            found.sort();
            prop_assert_eq!(&found, &expected);
        }

        let mut stepped = SteppedEnumeration::new(universe.iter().copied().collect());
        let mut found = stepped.run_with(&mut planted.clone()).unwrap().to_vec();
        found.sort();
        prop_assert_eq!(&found, &expected);
        prop_assert!(stepped.is_finished());
    }

    #[test]
    fn stepped_engine_matches_direct_search(
        (n, planted) in universe_with_conflict(),
    ) {
        let universe: ComponentSet<u32> = (0..n).collect();
        let direct = ImcsSearch::without_precheck()
            .find_conflict_set(&mut PlantedOracle::new(vec![planted.clone()]), &universe)
            .unwrap();
        let mut engine = ImcsEngine::new(universe);
        let stepped = engine
            .run_with(&mut PlantedOracle::new(vec![planted.clone()]))
            .unwrap();
        prop_assert_eq!(&stepped, &direct);
        prop_assert_eq!(engine.step_count(), engine.execution_log().len());
    }
}
