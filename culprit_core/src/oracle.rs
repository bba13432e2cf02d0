use crate::component::{Component, ComponentSet};
use rand::seq::SliceRandom;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::debug;

/// Outcome of a single oracle evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// The tested subset does not reproduce the failure.
    Good,
    /// The tested subset reproduces the failure.
    Fail,
}

impl Verdict {
    pub fn is_fail(self) -> bool {
        matches!(self, Verdict::Fail)
    }

    pub fn from_failed(failed: bool) -> Self {
        if failed { Verdict::Fail } else { Verdict::Good }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Good => f.write_str("GOOD"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Errors raised while embedding an oracle, never by the monotone predicate itself.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The external test process could not be started.
    #[error("Failed to spawn oracle command {command:?}: {reason}")]
    Spawn { command: Vec<String>, reason: String },

    /// Delivering the subset to the test, or waiting for it, failed.
    #[error("Oracle I/O error: {0}")]
    Io(String),

    /// The oracle configuration cannot produce a usable test.
    #[error("Invalid oracle setup: {0}")]
    InvalidSetup(String),

    /// Planting simulated conflicts was impossible with the given universe.
    #[error("Cannot plant conflicts: {0}")]
    Planting(String),
}

impl From<std::io::Error> for OracleError {
    fn from(err: std::io::Error) -> Self {
        OracleError::Io(err.to_string())
    }
}

/// The expensive binary test a search is minimizing against.
///
/// Implementations must be monotone: if `evaluate(S)` fails then every superset
/// of `S` fails as well. Searches rely on this and report a contract violation
/// when the answers they observe contradict it.
pub trait Oracle<C: Component> {
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// Runs the test with exactly the components in `subset` present.
    ///
    /// # Returns
    /// `Verdict::Fail` if the failure reproduces, `Verdict::Good` otherwise, or an
    /// `OracleError` if the test could not be carried out at all.
    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError>;
}

impl<C: Component, O: Oracle<C> + ?Sized> Oracle<C> for &mut O {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        (**self).evaluate(subset)
    }
}

impl<C: Component, O: Oracle<C> + ?Sized> Oracle<C> for Box<O> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        (**self).evaluate(subset)
    }
}

/// Counts every evaluation that reaches the wrapped oracle.
///
/// Place it directly around the real oracle (beneath any cache) so that the
/// counter reflects real, expensive invocations.
#[derive(Debug)]
pub struct CountingOracle<O> {
    inner: O,
    invocations: u64,
}

impl<O> CountingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            invocations: 0,
        }
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<C: Component, O: Oracle<C>> Oracle<C> for CountingOracle<O> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        self.invocations += 1;
        let verdict = self.inner.evaluate(subset)?;
        debug!(
            oracle = self.inner.name(),
            test = self.invocations,
            size = subset.len(),
            %verdict,
            "evaluated subset"
        );
        Ok(verdict)
    }
}

/// An in-process oracle backed by a closure returning `true` on failure.
pub struct FnOracle<C, F> {
    predicate: F,
    _marker: PhantomData<fn(&ComponentSet<C>)>,
}

impl<C, F> FnOracle<C, F>
where
    C: Component,
    F: FnMut(&ComponentSet<C>) -> bool,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _marker: PhantomData,
        }
    }
}

impl<C, F> Oracle<C> for FnOracle<C, F>
where
    C: Component,
    F: FnMut(&ComponentSet<C>) -> bool,
{
    fn name(&self) -> &'static str {
        "FnOracle"
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        Ok(Verdict::from_failed((self.predicate)(subset)))
    }
}

/// A simulated oracle that knows the planted minimal conflict sets.
///
/// It fails iff the tested subset contains at least one planted set entirely,
/// which is monotone by construction.
#[derive(Debug, Clone)]
pub struct PlantedOracle<C: Component> {
    conflicts: Vec<ComponentSet<C>>,
}

impl<C: Component> PlantedOracle<C> {
    pub fn new(conflicts: Vec<ComponentSet<C>>) -> Self {
        Self { conflicts }
    }

    /// Convenience constructor for a single planted conflict.
    pub fn single(conflict: impl IntoIterator<Item = C>) -> Self {
        Self::new(vec![conflict.into_iter().collect()])
    }

    /// Plants pairwise-disjoint random conflicts with the requested sizes.
    ///
    /// # Arguments
    /// * `universe`: the components to draw from. Duplicates are ignored.
    /// * `sizes`: one entry per conflict to plant; every size must be non-zero.
    /// * `rng`: source of randomness, typically a seeded `ChaCha8Rng` for reproducible runs.
    pub fn random_disjoint(
        universe: &[C],
        sizes: &[usize],
        rng: &mut dyn RngCore,
    ) -> Result<Self, OracleError> {
        let mut available: Vec<C> = universe.to_vec();
        available.sort();
        available.dedup();

        if sizes.contains(&0) {
            return Err(OracleError::Planting(
                "conflict sizes must be non-zero".to_string(),
            ));
        }
        let needed: usize = sizes.iter().sum();
        if needed > available.len() {
            return Err(OracleError::Planting(format!(
                "{needed} components needed but the universe only has {}",
                available.len()
            )));
        }

        available.shuffle(rng);
        let mut conflicts = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &size in sizes {
            conflicts.push(available[start..start + size].iter().cloned().collect());
            start += size;
        }
        Ok(Self { conflicts })
    }

    pub fn conflicts(&self) -> &[ComponentSet<C>] {
        &self.conflicts
    }
}

impl<C: Component> Oracle<C> for PlantedOracle<C> {
    fn name(&self) -> &'static str {
        "PlantedOracle"
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        let failed = self
            .conflicts
            .iter()
            .any(|conflict| conflict.is_subset(subset));
        Ok(Verdict::from_failed(failed))
    }
}
