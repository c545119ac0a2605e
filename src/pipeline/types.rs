use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::cnf::Cnf;

/// Identifies one input problem as it travels through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProblemId(pub String);

impl ProblemId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ProblemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    /// Satisfiable, with a model as a list of signed literals.
    Satisfiable(Vec<i32>),
    Unsatisfiable,
    /// The engine gave up or failed; the reason is kept for the report.
    Unknown(String),
}

impl Verdict {
    /// The status line a SAT solver prints for this verdict.
    pub fn status_line(&self) -> &'static str {
        match self {
            Verdict::Satisfiable(_) => "s SATISFIABLE",
            Verdict::Unsatisfiable => "s UNSATISFIABLE",
            Verdict::Unknown(_) => "s UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolveStats {
    pub variables: u32,
    pub clauses: usize,
    pub elapsed_ms: u64,
}

impl SolveStats {
    pub fn absorb(&mut self, other: &SolveStats) {
        self.variables = self.variables.max(other.variables);
        self.clauses += other.clauses;
        self.elapsed_ms += other.elapsed_ms;
    }
}

/// Messages exchanged between roles. The transport carries them as opaque
/// `bincode` frames.
///
/// - `Formula`: Simplify -> Split, one per input problem.
/// - `Job`: Split -> Solve, one per subproblem (`index` of `total`).
/// - `Outcome`: Solve -> Gather, one per job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineMessage {
    Formula {
        problem: ProblemId,
        name: String,
        cnf: Cnf,
    },

    Job {
        problem: ProblemId,
        index: u32,
        total: u32,
        cnf: Cnf,
    },

    Outcome {
        problem: ProblemId,
        index: u32,
        total: u32,
        verdict: Verdict,
        stats: SolveStats,
    },
}

impl PipelineMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PipelineMessage::Formula { .. } => "formula",
            PipelineMessage::Job { .. } => "job",
            PipelineMessage::Outcome { .. } => "outcome",
        }
    }

    pub fn problem(&self) -> &ProblemId {
        match self {
            PipelineMessage::Formula { problem, .. }
            | PipelineMessage::Job { problem, .. }
            | PipelineMessage::Outcome { problem, .. } => problem,
        }
    }
}

/// What Gather reports once a problem is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemReport {
    pub problem: ProblemId,
    pub name: String,
    pub verdict: Verdict,
    pub stats: SolveStats,
    /// Subproblems answered before the verdict was settled.
    pub answered: u32,
    pub total: u32,
}
