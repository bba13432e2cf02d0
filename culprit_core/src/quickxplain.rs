use crate::component::{Component, ComponentSet, snapshot, union_with};
use crate::oracle::Oracle;
use crate::search::{ConflictSearch, SearchError, fails, split_point};
use tracing::trace;

/// Junker's QuickXplain: divide-and-conquer conflict explanation.
///
/// The filter pass looks for what is essential in the second half while the
/// whole first half is present; the refine pass then looks for what is essential
/// in the first half with only that essential part present. Under monotonicity
/// the union of both passes is exactly minimal, without an outer loop.
#[derive(Debug, Default, Clone)]
pub struct QuickXplain;

impl QuickXplain {
    pub fn new() -> Self {
        QuickXplain
    }

    /// Returns the part of `candidates` needed, on top of `background`, to fail.
    ///
    /// `candidates` must be sorted; it is split at its midpoint.
    pub fn explain<C: Component, O: Oracle<C> + ?Sized>(
        &self,
        oracle: &mut O,
        background: &ComponentSet<C>,
        candidates: &[C],
    ) -> Result<ComponentSet<C>, SearchError> {
        if candidates.is_empty() || fails(oracle, background)? {
            return Ok(ComponentSet::new());
        }
        if let [only] = candidates {
            trace!(element = ?only, "single candidate explains the failure");
            return Ok(ComponentSet::from([only.clone()]));
        }

        let (first, second) = candidates.split_at(split_point(candidates.len()));
        let essential_second = self.explain(oracle, &union_with(background, first), second)?;

        let mut refined_background = background.clone();
        refined_background.extend(essential_second.iter().cloned());
        let mut essential = self.explain(oracle, &refined_background, first)?;

        essential.extend(essential_second);
        Ok(essential)
    }
}

impl<C: Component> ConflictSearch<C> for QuickXplain {
    fn name(&self) -> &'static str {
        "quickxplain"
    }

    fn find_conflict_set(
        &self,
        oracle: &mut dyn Oracle<C>,
        pool: &ComponentSet<C>,
    ) -> Result<ComponentSet<C>, SearchError> {
        if !fails(oracle, pool)? {
            return Ok(ComponentSet::new());
        }
        self.explain(oracle, &ComponentSet::new(), &snapshot(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CountingOracle, PlantedOracle};

    #[test]
    fn explains_planted_conflict() {
        let planted: ComponentSet<u32> = [0, 9, 10, 31].into_iter().collect();
        let mut oracle = PlantedOracle::new(vec![planted.clone()]);
        let found = QuickXplain::new()
            .find_conflict_set(&mut oracle, &(0..32).collect())
            .unwrap();
        assert_eq!(found, planted);
    }

    #[test]
    fn failing_background_needs_no_candidates() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([1u32]));
        let background: ComponentSet<u32> = [1].into_iter().collect();
        let found = QuickXplain::new()
            .explain(&mut oracle, &background, &[2u32, 3, 4])
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(oracle.invocations(), 1);
    }

    #[test]
    fn lone_candidate_is_returned_after_background_check() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([7u32]));
        let found = QuickXplain::new()
            .explain(&mut oracle, &ComponentSet::new(), &[7u32])
            .unwrap();
        assert_eq!(found, [7].into_iter().collect());
        assert_eq!(oracle.invocations(), 1);
    }

    #[test]
    fn empty_candidates_cost_nothing() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([7u32]));
        let found = QuickXplain::new()
            .explain(&mut oracle, &ComponentSet::new(), &[0u32; 0])
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(oracle.invocations(), 0);
    }

    #[test]
    fn clean_pool_returns_empty_after_one_call() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([99u32]));
        let found = QuickXplain::new()
            .find_conflict_set(&mut oracle, &(0..16).collect())
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(oracle.invocations(), 1);
    }
}
