use crate::component::{Component, ComponentSet};
use serde::Serialize;
use std::fmt::{self, Display};

/// One conflict set as it is shown to the user.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    /// Member names in sorted order.
    pub members: Vec<String>,
    pub size: usize,
    /// md5 hex digest of the newline-joined members. Identifies the same conflict
    /// across runs regardless of discovery order.
    pub fingerprint: String,
}

impl ConflictReport {
    pub fn new<C: Component + Display>(conflict: &ComponentSet<C>) -> Self {
        let members: Vec<String> = conflict.iter().map(|c| c.to_string()).collect();
        let fingerprint = format!("{:x}", md5::compute(members.join("\n").as_bytes()));
        Self {
            size: members.len(),
            members,
            fingerprint,
        }
    }
}

/// Everything a finished run reports.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub algorithm: String,
    pub conflict_sets: Vec<ConflictReport>,
    /// Real oracle invocations, excluding cache hits.
    pub invocations: u64,
}

impl SearchReport {
    pub fn new<C: Component + Display>(
        algorithm: &str,
        conflict_sets: &[ComponentSet<C>],
        invocations: u64,
    ) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            conflict_sets: conflict_sets
                .iter()
                .filter(|set| !set.is_empty())
                .map(ConflictReport::new)
                .collect(),
            invocations,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} finished after {} oracle invocation(s)",
            self.algorithm, self.invocations
        )?;
        if self.conflict_sets.is_empty() {
            return writeln!(f, "No conflict found: the full set does not fail.");
        }
        for (index, conflict) in self.conflict_sets.iter().enumerate() {
            writeln!(
                f,
                "Conflict #{} ({} member(s), {}):",
                index + 1,
                conflict.size,
                &conflict.fingerprint[..8]
            )?;
            for member in &conflict.members {
                writeln!(f, "  - {member}")?;
            }
        }
        Ok(())
    }
}
