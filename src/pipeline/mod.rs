//! SAT Pipeline Roles
//!
//! The processes that use the bootstrap layer. A problem flows
//! Simplify -> Split -> Solve -> Gather, where Simplify and Gather live in the
//! same process so that the verdict comes back to whoever submitted the formula.
//!
//! | Role            | Binds                              | Connects to                  |
//! |-----------------|------------------------------------|------------------------------|
//! | Simplify/Gather | `GATHER` (receive), `SIMPLIFY` (send) | -                         |
//! | Split           | `SPLIT` (send)                     | `SIMPLIFY` (receive)         |
//! | Solve           | -                                  | `SPLIT` (receive), `GATHER` (send) |
//!
//! ## Submodules
//! - **`cnf`**: DIMACS parsing and the `Cnf` formula type.
//! - **`types`**: wire messages, verdicts and reports.
//! - **`processing`**: the simplify/split/solve collaborators and outcome aggregation.
//! - **`roles`**: the role state machines and the `run_role` driver.

pub mod cnf;
pub mod processing;
pub mod roles;
pub mod types;

pub use cnf::{Cnf, CnfError};
pub use processing::{
    BasicSimplifier, CubeSplitter, OutcomeAggregator, Simplifier, SolverEngine, Splitter,
    SplrEngine,
};
pub use roles::{
    PipelineRole, ProblemInput, RoleState, SimplifyGatherRole, SolveRole, SplitRole,
    StepOutcome, bootstrap_or_shutdown, run_role,
};
pub use types::{PipelineMessage, ProblemId, ProblemReport, SolveStats, Verdict};
