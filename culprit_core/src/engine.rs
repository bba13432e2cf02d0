use crate::component::{Component, ComponentSet, snapshot, union_with};
use crate::history::{CompletedTest, ExecutionLog, UndoStack};
use crate::oracle::{Oracle, OracleError, Verdict};
use crate::search::split_point;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by the step-driven engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Every test has been answered; there is nothing left to plan.
    #[error("The search is already complete")]
    SearchComplete,

    /// A result was submitted while no plan was committed.
    #[error("No active test plan to submit a result for")]
    NoActivePlan,

    /// A plan is committed and must be answered or invalidated first.
    #[error("A test is already in progress and must be completed or invalidated")]
    TestInProgress,

    /// The submitted verdict contradicts earlier answers. The engine state is
    /// left as it was, so the verdict can be corrected and resubmitted.
    #[error("Verdict contradicts earlier results: {0}")]
    ContractViolation(String),

    /// The current round has not finished, so there is no conflict set to archive.
    #[error("The current round must complete before the search can continue")]
    RoundInProgress,

    /// The oracle driving [`ImcsEngine::run_with`] could not be evaluated.
    #[error("Oracle evaluation failed: {0}")]
    Oracle(#[from] OracleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Part of the binary search for the next conflict element.
    Bisection,
    /// Tests the confirmed conflict elements on their own.
    Verification,
}

/// One subset the engine wants tested next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan<C: Component> {
    pub subset: ComponentSet<C>,
    pub kind: PlanKind,
}

impl<C: Component> TestPlan<C> {
    pub fn bisection(subset: ComponentSet<C>) -> Self {
        Self {
            subset,
            kind: PlanKind::Bisection,
        }
    }

    pub fn verification(subset: ComponentSet<C>) -> Self {
        Self {
            subset,
            kind: PlanKind::Verification,
        }
    }

    pub fn is_verification(&self) -> bool {
        self.kind == PlanKind::Verification
    }
}

/// Local context of the binary search for the next conflict element.
///
/// `background` holds the confirmed conflict elements plus every half proven
/// safe so far in this round; `candidates` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BisectionFrame<C: Component> {
    pub background: ComponentSet<C>,
    pub candidates: Vec<C>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase<C: Component> {
    Bisecting(BisectionFrame<C>),
    Verifying,
    Complete,
}

/// A complete, self-contained snapshot of an IMCS search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState<C: Component> {
    /// Number of components taking part in the search, confirmed or not.
    pub universe_size: usize,
    /// Elements confirmed to belong to the conflict set.
    pub conflict_set: ComponentSet<C>,
    /// Sorted components that are neither confirmed nor excluded yet.
    pub candidates: Vec<C>,
    pub phase: Phase<C>,
    pub last_found: Option<C>,
}

impl<C: Component> SearchState<C> {
    pub fn initial(universe: &ComponentSet<C>) -> Self {
        let candidates = snapshot(universe);
        let phase = if candidates.is_empty() {
            Phase::Complete
        } else {
            Phase::Bisecting(BisectionFrame {
                background: ComponentSet::new(),
                candidates: candidates.clone(),
            })
        };
        Self {
            universe_size: universe.len(),
            conflict_set: ComponentSet::new(),
            candidates,
            phase,
            last_found: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete)
    }

    /// The test this state asks for, `None` once complete.
    pub fn next_plan(&self) -> Option<TestPlan<C>> {
        match &self.phase {
            Phase::Complete => None,
            Phase::Verifying => Some(TestPlan::verification(self.conflict_set.clone())),
            Phase::Bisecting(frame) => {
                let subset = match frame.candidates.as_slice() {
                    [only] => union_with(&frame.background, std::slice::from_ref(only)),
                    candidates => {
                        let (first, _) = candidates.split_at(split_point(candidates.len()));
                        union_with(&frame.background, first)
                    }
                };
                Some(TestPlan::bisection(subset))
            }
        }
    }

    /// Computes the state that follows `verdict` on [`next_plan`](Self::next_plan).
    ///
    /// Returns a description of the contradiction if the verdict is impossible for
    /// a monotone test given what this state already implies.
    fn apply(&self, verdict: Verdict) -> Result<SearchState<C>, String> {
        let mut next = self.clone();
        match (&self.phase, verdict) {
            (Phase::Complete, _) => return Err("the search is already complete".to_string()),
            (Phase::Verifying, Verdict::Fail) => next.phase = Phase::Complete,
            (Phase::Verifying, Verdict::Good) => {
                if self.candidates.is_empty() {
                    return Err(format!(
                        "the {} confirmed elements do not fail on their own and no candidates remain",
                        self.conflict_set.len()
                    ));
                }
                next.phase = Phase::Bisecting(BisectionFrame {
                    background: self.conflict_set.clone(),
                    candidates: self.candidates.clone(),
                });
            }
            (Phase::Bisecting(frame), verdict) => match frame.candidates.as_slice() {
                [only] => match verdict {
                    Verdict::Fail => next.confirm(only.clone()),
                    Verdict::Good if self.conflict_set.is_empty() => next.phase = Phase::Complete,
                    Verdict::Good => {
                        return Err(format!(
                            "{only:?} was the last candidate, but the subset already known to fail now passes"
                        ));
                    }
                },
                candidates => {
                    let (first, second) = candidates.split_at(split_point(candidates.len()));
                    match (verdict, first) {
                        (Verdict::Fail, [culprit]) => next.confirm(culprit.clone()),
                        (Verdict::Fail, _) => {
                            next.phase = Phase::Bisecting(BisectionFrame {
                                background: frame.background.clone(),
                                candidates: first.to_vec(),
                            })
                        }
                        (Verdict::Good, _) => {
                            next.phase = Phase::Bisecting(BisectionFrame {
                                background: union_with(&frame.background, first),
                                candidates: second.to_vec(),
                            })
                        }
                    }
                }
            },
        }
        Ok(next)
    }

    fn confirm(&mut self, element: C) {
        if let Ok(idx) = self.candidates.binary_search(&element) {
            self.candidates.remove(idx);
        }
        self.conflict_set.insert(element.clone());
        self.last_found = Some(element);
        self.phase = Phase::Verifying;
    }

    /// Starts the bisection for the next element over all remaining candidates,
    /// verifying the confirmed elements first if there are any.
    fn restart_round(&mut self) {
        self.phase = if !self.conflict_set.is_empty() {
            Phase::Verifying
        } else if self.candidates.is_empty() {
            Phase::Complete
        } else {
            Phase::Bisecting(BisectionFrame {
                background: ComponentSet::new(),
                candidates: self.candidates.clone(),
            })
        };
    }

    /// Drops `removals` from the conflict set, the candidates and the current
    /// bisection frame. Returns whether anything was dropped.
    ///
    /// Losing a confirmed element, or every candidate of the frame, voids what
    /// the round had established, so the round starts over.
    fn prune(&mut self, removals: &ComponentSet<C>) -> bool {
        let conflict_before = self.conflict_set.len();
        let candidates_before = self.candidates.len();
        self.conflict_set.retain(|c| !removals.contains(c));
        self.candidates.retain(|c| !removals.contains(c));
        let conflict_shrank = self.conflict_set.len() != conflict_before;
        let mut changed = conflict_shrank || self.candidates.len() != candidates_before;

        let mut frame_exhausted = false;
        if let Phase::Bisecting(frame) = &mut self.phase {
            let frame_before = frame.background.len() + frame.candidates.len();
            frame.background.retain(|c| !removals.contains(c));
            frame.candidates.retain(|c| !removals.contains(c));
            changed |= frame.background.len() + frame.candidates.len() != frame_before;
            frame_exhausted = frame.candidates.is_empty();
        }

        if self.last_found.as_ref().is_some_and(|c| removals.contains(c)) {
            self.last_found = None;
        }
        if conflict_shrank || frame_exhausted {
            self.restart_round();
        }
        self.universe_size = self.conflict_set.len() + self.candidates.len();
        changed
    }

    /// Adds new components to the global candidate pool. The current bisection
    /// frame is left alone; they take part from the next round on.
    fn add_candidates(&mut self, additions: &ComponentSet<C>) -> usize {
        let mut added = 0;
        for component in additions {
            if self.conflict_set.contains(component) {
                continue;
            }
            if let Err(idx) = self.candidates.binary_search(component) {
                self.candidates.insert(idx, component.clone());
                added += 1;
            }
        }
        self.universe_size = self.conflict_set.len() + self.candidates.len();
        added
    }
}

/// IMCS driven one test at a time, for oracles answered out of band.
///
/// The caller asks for a plan, runs the test however it likes (a human
/// launching a program and watching it crash is the typical case), then
/// submits the verdict. Every applied verdict can be undone.
#[derive(Debug, Clone)]
pub struct ImcsEngine<C: Component> {
    universe: ComponentSet<C>,
    state: SearchState<C>,
    active_plan: Option<TestPlan<C>>,
    undo_stack: UndoStack<C>,
    execution_log: ExecutionLog<C>,
    /// Components joining the search once the current round is verified.
    pending_additions: ComponentSet<C>,
}

impl<C: Component> ImcsEngine<C> {
    pub fn new(universe: ComponentSet<C>) -> Self {
        info!(components = universe.len(), "starting step-driven search");
        Self {
            state: SearchState::initial(&universe),
            universe,
            active_plan: None,
            undo_stack: UndoStack::new(),
            execution_log: ExecutionLog::new(),
            pending_additions: ComponentSet::new(),
        }
    }

    /// Discards all progress and history and starts over on the same universe.
    /// Pending additions join it.
    pub fn restart(&mut self) {
        let pending = std::mem::take(&mut self.pending_additions);
        self.universe.extend(pending);
        info!(components = self.universe.len(), "restarting search");
        self.state = SearchState::initial(&self.universe);
        self.active_plan = None;
        self.undo_stack.clear();
        self.execution_log.clear();
    }

    /// Previews the next plan without committing to it.
    pub fn current_test_plan(&self) -> Result<TestPlan<C>, EngineError> {
        if self.active_plan.is_some() {
            return Err(EngineError::TestInProgress);
        }
        self.state.next_plan().ok_or(EngineError::SearchComplete)
    }

    /// Commits to the next plan; results submitted afterwards apply to it.
    pub fn plan_next_test(&mut self) -> Result<TestPlan<C>, EngineError> {
        let plan = self.current_test_plan()?;
        debug!(
            size = plan.subset.len(),
            verification = plan.is_verification(),
            "committed to test plan"
        );
        self.active_plan = Some(plan.clone());
        Ok(plan)
    }

    pub fn active_plan(&self) -> Option<&TestPlan<C>> {
        self.active_plan.as_ref()
    }

    /// Applies `verdict` to the active plan and advances the search.
    pub fn submit_result(&mut self, verdict: Verdict) -> Result<(), EngineError> {
        let Some(plan) = self.active_plan.as_ref() else {
            warn!(%verdict, "result submitted without an active test plan");
            return Err(EngineError::NoActivePlan);
        };

        // Pending additions are folded in at the verification that closes a round.
        let merging = plan.is_verification() && !self.pending_additions.is_empty();
        let next = if merging {
            let mut base = self.state.clone();
            base.add_candidates(&self.pending_additions);
            base.apply(verdict)
        } else {
            self.state.apply(verdict)
        }
        .map_err(|detail| {
            warn!(%verdict, %detail, "rejected contradictory verdict");
            EngineError::ContractViolation(detail)
        })?;

        let found = (next.conflict_set.len() > self.state.conflict_set.len())
            .then(|| next.last_found.clone())
            .flatten();

        self.execution_log.log(CompletedTest {
            plan: plan.clone(),
            verdict,
            state_before: self.state.clone(),
        });
        let previous = std::mem::replace(&mut self.state, next);
        self.undo_stack.push(previous);
        self.active_plan = None;

        if merging {
            let pending = std::mem::take(&mut self.pending_additions);
            info!(count = pending.len(), "merged pending components into the candidate pool");
            self.universe.extend(pending);
        }

        if let Some(element) = found {
            info!(?element, conflict = self.state.conflict_set.len(), "found conflict element");
        }
        if self.state.is_complete() {
            info!(conflict = ?self.state.conflict_set, "search complete");
        }
        Ok(())
    }

    /// Drops the committed plan, typically because the setup it assumed changed.
    /// Returns whether a plan was active.
    pub fn invalidate_active_plan(&mut self) -> bool {
        let was_active = self.active_plan.take().is_some();
        if was_active {
            warn!("invalidating active test plan");
        }
        was_active
    }

    /// Reverts the most recently applied verdict. The active plan, if any, is dropped.
    /// Returns `false` if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                self.state = previous;
                self.active_plan = None;
                info!(step = self.step_count(), "reverted to previous state");
                true
            }
            None => {
                warn!("nothing to undo");
                false
            }
        }
    }

    /// Brings the search in line with `valid`, the components that may take part.
    ///
    /// Components no longer valid are removed right away from every part of the
    /// state. New ones are deferred until the current round is verified, so the
    /// bisection in progress keeps its assumptions. The active plan is dropped.
    pub fn reconcile(&mut self, valid: &ComponentSet<C>) {
        self.invalidate_active_plan();

        let mut current: ComponentSet<C> = self.state.candidates.iter().cloned().collect();
        current.extend(self.state.conflict_set.iter().cloned());
        current.extend(self.pending_additions.iter().cloned());

        let removals: ComponentSet<C> = current.difference(valid).cloned().collect();
        let additions: ComponentSet<C> = valid.difference(&current).cloned().collect();

        if !removals.is_empty() {
            info!(count = removals.len(), "reconcile removed components from the search");
            self.pending_additions.retain(|c| !removals.contains(c));
            self.remove_candidates(&removals);
        }
        if !additions.is_empty() {
            info!(count = additions.len(), "reconcile deferred new components");
            self.pending_additions.extend(additions);
        }
    }

    /// Prunes `removals` from the conflict set, the candidates and the bisection
    /// in progress. Returns whether the state changed, in which case the active
    /// plan is dropped.
    pub fn remove_candidates(&mut self, removals: &ComponentSet<C>) -> bool {
        self.universe.retain(|c| !removals.contains(c));
        let changed = self.state.prune(removals);
        if changed {
            debug!(count = removals.len(), "pruned components from search state");
            self.invalidate_active_plan();
        }
        changed
    }

    /// Adds components to the candidate pool for the following rounds.
    /// Returns how many were new.
    pub fn add_candidates(&mut self, additions: &ComponentSet<C>) -> usize {
        self.universe.extend(additions.iter().cloned());
        self.state.add_candidates(additions)
    }

    /// Moves every pending addition into the candidate pool now.
    pub fn merge_pending_additions(&mut self) -> usize {
        if self.pending_additions.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut self.pending_additions);
        info!(count = pending.len(), "merging pending components into the candidate pool");
        self.add_candidates(&pending)
    }

    pub fn pending_additions(&self) -> &ComponentSet<C> {
        &self.pending_additions
    }

    pub fn was_last_test_verification(&self) -> bool {
        self.execution_log
            .last()
            .is_some_and(|test| test.plan.is_verification())
    }

    pub fn state(&self) -> &SearchState<C> {
        &self.state
    }

    pub fn conflict_set(&self) -> &ComponentSet<C> {
        &self.state.conflict_set
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    pub fn execution_log(&self) -> &ExecutionLog<C> {
        &self.execution_log
    }

    /// Number of applied verdicts on the current path, i.e. excluding undone ones.
    pub fn step_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Upper bound on the total number of tests, `found * (ceil(log2 n) + 1)`.
    ///
    /// It grows as conflict elements are found: while the search is running at
    /// least one element is assumed.
    pub fn estimated_max_tests(&self) -> usize {
        let universe = self.state.universe_size;
        let mut found = self.state.conflict_set.len();
        if found == 0 && !self.state.is_complete() {
            found = 1;
        }
        if universe == 0 || found == 0 {
            return 0;
        }
        let ceil_log2 = universe.next_power_of_two().trailing_zeros() as usize;
        found * (ceil_log2 + 1)
    }

    /// Drives the engine to completion with a synchronous oracle.
    ///
    /// An already committed plan is answered first. The sequence of tested subsets
    /// is the one [`ImcsSearch::without_precheck`](crate::imcs::ImcsSearch::without_precheck)
    /// evaluates.
    pub fn run_with<O: Oracle<C> + ?Sized>(
        &mut self,
        oracle: &mut O,
    ) -> Result<ComponentSet<C>, EngineError> {
        while !self.is_complete() {
            let plan = match self.active_plan.clone() {
                Some(plan) => plan,
                None => self.plan_next_test()?,
            };
            let verdict = oracle.evaluate(&plan.subset)?;
            self.submit_result(verdict)?;
        }
        Ok(self.state.conflict_set.clone())
    }
}

/// Step-driven enumeration of disjoint conflict sets.
///
/// Each round is one [`ImcsEngine`]. Once a round completes with a conflict,
/// [`continue_search`](Self::continue_search) archives it and starts the next
/// round on everything the finished round had not confirmed.
#[derive(Debug, Clone)]
pub struct SteppedEnumeration<C: Component> {
    universe: ComponentSet<C>,
    engine: ImcsEngine<C>,
    found: Vec<ComponentSet<C>>,
    archived_log: ExecutionLog<C>,
    round: usize,
}

impl<C: Component> SteppedEnumeration<C> {
    pub fn new(universe: ComponentSet<C>) -> Self {
        Self {
            engine: ImcsEngine::new(universe.clone()),
            universe,
            found: Vec::new(),
            archived_log: ExecutionLog::new(),
            round: 1,
        }
    }

    pub fn engine(&self) -> &ImcsEngine<C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ImcsEngine<C> {
        &mut self.engine
    }

    /// One-based number of the round in progress.
    pub fn round(&self) -> usize {
        self.round
    }

    /// Conflict sets archived by earlier rounds, in the order they were found.
    pub fn conflict_sets(&self) -> &[ComponentSet<C>] {
        &self.found
    }

    /// True once a round has completed without finding anything.
    pub fn is_finished(&self) -> bool {
        self.engine.is_complete() && self.engine.conflict_set().is_empty()
    }

    /// Archives the conflict set of the completed round and starts the next one.
    ///
    /// # Returns
    /// The number of candidates in the new round.
    pub fn continue_search(&mut self) -> Result<usize, EngineError> {
        if !self.engine.is_complete() {
            return Err(EngineError::RoundInProgress);
        }
        let conflict = self.engine.conflict_set().clone();
        if conflict.is_empty() {
            return Err(EngineError::SearchComplete);
        }

        let mut next_pool: ComponentSet<C> =
            self.engine.state().candidates.iter().cloned().collect();
        next_pool.extend(self.engine.pending_additions().iter().cloned());

        self.archived_log.append(self.engine.execution_log());
        info!(round = self.round, conflict = ?conflict, "archived conflict set");
        self.found.push(conflict);

        self.round += 1;
        let candidates = next_pool.len();
        self.engine = ImcsEngine::new(next_pool);
        info!(round = self.round, candidates, "starting next round");
        Ok(candidates)
    }

    /// Reconciles the round in progress with `valid`. Members of archived
    /// conflict sets never rejoin the search.
    pub fn reconcile(&mut self, valid: &ComponentSet<C>) {
        let valid: ComponentSet<C> = valid
            .iter()
            .filter(|c| !self.found.iter().any(|set| set.contains(*c)))
            .cloned()
            .collect();
        self.engine.reconcile(&valid);
    }

    /// Every answered test across all rounds, archived rounds first.
    pub fn combined_execution_log(&self) -> impl Iterator<Item = &CompletedTest<C>> {
        self.archived_log
            .entries()
            .iter()
            .chain(self.engine.execution_log().entries())
    }

    /// Forgets every round and starts over on the original universe.
    pub fn reset(&mut self) {
        info!(components = self.universe.len(), "resetting enumeration");
        self.engine = ImcsEngine::new(self.universe.clone());
        self.found.clear();
        self.archived_log.clear();
        self.round = 1;
    }

    /// Runs every remaining round with a synchronous oracle.
    pub fn run_with<O: Oracle<C> + ?Sized>(
        &mut self,
        oracle: &mut O,
    ) -> Result<&[ComponentSet<C>], EngineError> {
        loop {
            if self.engine.run_with(oracle)?.is_empty() {
                return Ok(&self.found);
            }
            self.continue_search()?;
        }
    }
}
