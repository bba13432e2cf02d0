use crate::component::{Component, ComponentSet, snapshot};
use crate::oracle::Oracle;
use crate::search::{ConflictSearch, SearchError, fails};
use tracing::{debug, info};

/// Classic subtractive delta debugging.
///
/// Starts from the failing pool and removes chunks while the remainder keeps
/// failing. Chunks are formed round-robin over the sorted working set:
/// chunk `i` holds the elements at positions `i, i + g, i + 2g, ...` for
/// granularity `g`.
#[derive(Debug, Default, Clone)]
pub struct Ddmin;

impl Ddmin {
    pub fn new() -> Self {
        Ddmin
    }
}

fn round_robin_chunks<C: Component>(sorted: &[C], granularity: usize) -> Vec<Vec<C>> {
    (0..granularity)
        .map(|offset| {
            sorted
                .iter()
                .skip(offset)
                .step_by(granularity)
                .cloned()
                .collect()
        })
        .collect()
}

impl<C: Component> ConflictSearch<C> for Ddmin {
    fn name(&self) -> &'static str {
        "ddmin"
    }

    fn find_conflict_set(
        &self,
        oracle: &mut dyn Oracle<C>,
        pool: &ComponentSet<C>,
    ) -> Result<ComponentSet<C>, SearchError> {
        if !fails(oracle, pool)? {
            return Ok(ComponentSet::new());
        }

        let mut working = pool.clone();
        let mut granularity = 2usize;
        while working.len() >= 2 {
            let chunks = round_robin_chunks(&snapshot(&working), granularity);

            let mut reduced = None;
            for chunk in chunks.iter().filter(|chunk| !chunk.is_empty()) {
                let mut complement = working.clone();
                for component in chunk {
                    complement.remove(component);
                }
                if fails(oracle, &complement)? {
                    reduced = Some(complement);
                    break;
                }
            }

            match reduced {
                Some(complement) => {
                    debug!(
                        from = working.len(),
                        to = complement.len(),
                        "complement still fails, shrinking working set"
                    );
                    working = complement;
                    granularity = 2;
                }
                None if granularity < working.len() => {
                    granularity = (granularity * 2).min(working.len());
                    debug!(granularity, "no chunk removable, refining granularity");
                }
                None => break,
            }
        }

        info!(size = working.len(), "ddmin converged");
        Ok(working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CountingOracle, PlantedOracle};

    #[test]
    fn chunks_are_round_robin() {
        let sorted: Vec<u32> = (0..7).collect();
        let chunks = round_robin_chunks(&sorted, 3);
        assert_eq!(chunks, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn chunks_may_be_empty_when_granularity_exceeds_len() {
        let chunks = round_robin_chunks(&[1u32], 2);
        assert_eq!(chunks, vec![vec![1], vec![]]);
    }

    #[test]
    fn converges_on_four_element_conflict() {
        let planted: ComponentSet<u32> = [1, 6, 13, 17].into_iter().collect();
        let mut oracle = PlantedOracle::new(vec![planted.clone()]);
        let found = Ddmin::new()
            .find_conflict_set(&mut oracle, &(0..20).collect())
            .unwrap();
        assert_eq!(found, planted);
    }

    #[test]
    fn single_culprit_in_five() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([2u32]));
        let found = Ddmin::new()
            .find_conflict_set(&mut oracle, &(0..5).collect())
            .unwrap();
        assert_eq!(found, [2].into_iter().collect());
        assert_eq!(oracle.invocations(), 4);
    }

    #[test]
    fn clean_pool_returns_empty() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([42u32]));
        let found = Ddmin::new()
            .find_conflict_set(&mut oracle, &(0..10).collect())
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(oracle.invocations(), 1);
    }

    #[test]
    fn whole_pool_is_the_conflict() {
        let planted: ComponentSet<u32> = (0..6).collect();
        let mut oracle = PlantedOracle::new(vec![planted.clone()]);
        let found = Ddmin::new().find_conflict_set(&mut oracle, &planted).unwrap();
        assert_eq!(found, planted);
    }
}
