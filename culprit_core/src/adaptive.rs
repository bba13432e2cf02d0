use crate::additive::find_one_culprit;
use crate::component::{Component, ComponentSet, snapshot, union_with};
use crate::oracle::Oracle;
use crate::search::{ConflictSearch, SearchError, fails, split_point};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// Candidate count at or below which the hybrid switches to QuickXplain steps.
pub const DEFAULT_ADAPTIVE_THRESHOLD: usize = 50;

/// A hybrid of QuickXplain and additive peeling.
///
/// Small candidate pools (at most `threshold`) are split QuickXplain-style,
/// which pays off when conflicts are dense. Larger pools peel one culprit by
/// binary search, fold it into the background and continue with the rest,
/// which is cheaper when conflicts are sparse.
#[derive(Debug, Clone)]
pub struct AdaptiveSearch {
    threshold: NonZeroUsize,
}

impl Default for AdaptiveSearch {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_ADAPTIVE_THRESHOLD).unwrap_or(NonZeroUsize::MIN))
    }
}

impl AdaptiveSearch {
    pub fn new(threshold: NonZeroUsize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> NonZeroUsize {
        self.threshold
    }

    /// Same contract as [`QuickXplain::explain`](crate::quickxplain::QuickXplain::explain).
    pub fn explain<C: Component, O: Oracle<C> + ?Sized>(
        &self,
        oracle: &mut O,
        background: &ComponentSet<C>,
        candidates: &[C],
    ) -> Result<ComponentSet<C>, SearchError> {
        if candidates.is_empty() || fails(oracle, background)? {
            return Ok(ComponentSet::new());
        }

        if candidates.len() <= self.threshold.get() {
            if let [only] = candidates {
                return Ok(ComponentSet::from([only.clone()]));
            }
            let (first, second) = candidates.split_at(split_point(candidates.len()));
            let essential_second =
                self.explain(oracle, &union_with(background, first), second)?;
            let mut refined_background = background.clone();
            refined_background.extend(essential_second.iter().cloned());
            let mut essential = self.explain(oracle, &refined_background, first)?;
            essential.extend(essential_second);
            return Ok(essential);
        }

        // Background plus candidates is known to fail here, so some candidate must be guilty.
        let Some(culprit) = find_one_culprit(oracle, background, candidates)? else {
            warn!(
                background = background.len(),
                candidates = candidates.len(),
                "failing candidates yielded no culprit"
            );
            return Err(SearchError::ContractViolation {
                algorithm: "adaptive",
                detail: format!(
                    "background of {} plus {} candidates failed but no single candidate is guilty",
                    background.len(),
                    candidates.len()
                ),
            });
        };
        debug!(?culprit, remaining = candidates.len() - 1, "peeled culprit");

        let remaining: Vec<C> = candidates
            .iter()
            .filter(|c| **c != culprit)
            .cloned()
            .collect();
        let mut extended_background = background.clone();
        extended_background.insert(culprit.clone());

        let mut essential = self.explain(oracle, &extended_background, &remaining)?;
        essential.insert(culprit);
        Ok(essential)
    }
}

impl<C: Component> ConflictSearch<C> for AdaptiveSearch {
    fn name(&self) -> &'static str {
        "adaptive"
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
