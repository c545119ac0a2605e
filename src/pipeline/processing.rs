//! Processing collaborators
//!
//! The roles only move messages around; what happens to a formula at each hop
//! is delegated to the traits below, so the solving stack can be swapped
//! without touching the pipeline wiring.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use splr::Certificate;

use super::cnf::Cnf;
use super::types::{ProblemId, ProblemReport, SolveStats, Verdict};

/// Upper bound on the split depth (`2^MAX_SPLIT_DEPTH` subproblems).
pub const MAX_SPLIT_DEPTH: u32 = 12;

pub trait Simplifier: Send + Sync {
    fn simplify(&self, cnf: Cnf) -> Cnf;
}

pub trait Splitter: Send + Sync {
    /// Subproblems whose disjunction is equisatisfiable with `cnf`.
    fn split(&self, cnf: &Cnf) -> Vec<Cnf>;
}

pub trait SolverEngine: Send + Sync {
    fn solve(&self, cnf: &Cnf) -> Verdict;
}

/// Removes tautologies, repeated literals and repeated clauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSimplifier;

impl Simplifier for BasicSimplifier {
    fn simplify(&self, cnf: Cnf) -> Cnf {
        let before = cnf.num_clauses();
        let mut seen = HashSet::new();
        let mut clauses = Vec::with_capacity(before);

        for mut clause in cnf.clauses {
            clause.sort_unstable_by_key(|lit| (lit.abs(), *lit));
            clause.dedup();

            let tautology = clause.windows(2).any(|pair| pair[0] == -pair[1]);
            if tautology {
                continue;
            }
            if seen.insert(clause.clone()) {
                clauses.push(clause);
            }
        }

        tracing::debug!("Simplified {} clauses down to {}", before, clauses.len());
        Cnf::new(cnf.num_vars, clauses)
    }
}

/// Splits on the `depth` most frequent variables, producing one cube per
/// assignment of those variables. Depth 0 forwards the formula unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CubeSplitter {
    pub depth: u32,
}

impl CubeSplitter {
    pub fn new(depth: u32) -> Self {
        Self {
            depth: depth.min(MAX_SPLIT_DEPTH),
        }
    }

    fn branching_vars(&self, cnf: &Cnf) -> Vec<i32> {
        let mut occurrences: HashMap<i32, usize> = HashMap::new();
        for lit in cnf.clauses.iter().flatten() {
            *occurrences.entry(lit.abs()).or_default() += 1;
        }

        let mut vars: Vec<(i32, usize)> = occurrences.into_iter().collect();
        vars.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        vars.into_iter()
            .take(self.depth as usize)
            .map(|(var, _)| var)
            .collect()
    }
}

impl Splitter for CubeSplitter {
    fn split(&self, cnf: &Cnf) -> Vec<Cnf> {
        let vars = self.branching_vars(cnf);
        if vars.is_empty() {
            return vec![cnf.clone()];
        }

        (0u32..1 << vars.len())
            .map(|mask| {
                let cube: Vec<i32> = vars
                    .iter()
                    .enumerate()
                    .map(|(bit, &var)| if mask & (1 << bit) == 0 { var } else { -var })
                    .collect();
                cnf.with_assumptions(&cube)
            })
            .collect()
    }
}

/// CDCL solving through `splr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplrEngine;

impl SolverEngine for SplrEngine {
    fn solve(&self, cnf: &Cnf) -> Verdict {
        if cnf.has_empty_clause() {
            return Verdict::Unsatisfiable;
        }
        if cnf.clauses.is_empty() {
            return Verdict::Satisfiable(Vec::new());
        }

        match Certificate::try_from(cnf.clauses.clone()) {
            Ok(Certificate::SAT(model)) => Verdict::Satisfiable(model),
            Ok(Certificate::UNSAT) => Verdict::Unsatisfiable,
            Err(e) => Verdict::Unknown(format!("{:?}", e)),
        }
    }
}

/// Runs `engine` on `cnf` and measures it.
pub fn solve_with_stats(engine: &dyn SolverEngine, cnf: &Cnf) -> (Verdict, SolveStats) {
    let started = Instant::now();
    let verdict = engine.solve(cnf);
    let stats = SolveStats {
        variables: cnf.num_vars,
        clauses: cnf.num_clauses(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    (verdict, stats)
}

/// Collects the outcomes of one problem's subproblems.
///
/// Settles as SAT on the first satisfiable cube, otherwise once every cube has
/// answered: UNSAT if all were unsatisfiable, UNKNOWN if any was unknown.
#[derive(Debug)]
pub struct OutcomeAggregator {
    problem: ProblemId,
    name: String,
    total: Option<u32>,
    answered: HashSet<u32>,
    unknown: Option<String>,
    stats: SolveStats,
}

impl OutcomeAggregator {
    /// The number of subproblems is learnt from the first outcome.
    pub fn new(problem: ProblemId, name: impl Into<String>) -> Self {
        Self {
            problem,
            name: name.into(),
            total: None,
            answered: HashSet::new(),
            unknown: None,
            stats: SolveStats::default(),
        }
    }

    pub fn problem(&self) -> &ProblemId {
        &self.problem
    }

    /// Records one outcome; returns the report once the problem is settled.
    pub fn absorb(
        &mut self,
        index: u32,
        total: u32,
        verdict: Verdict,
        stats: &SolveStats,
    ) -> Option<ProblemReport> {
        let expected = *self.total.get_or_insert(total);
        if total != expected {
            tracing::warn!(
                "Outcome for {} claims {} subproblems, expected {}; using the larger",
                self.problem,
                total,
                expected
            );
            self.total = Some(expected.max(total));
        }
        if !self.answered.insert(index) {
            tracing::warn!("Duplicate outcome {} for {}", index, self.problem);
            return None;
        }
        self.stats.absorb(stats);

        match verdict {
            Verdict::Satisfiable(model) => return Some(self.report(Verdict::Satisfiable(model))),
            Verdict::Unknown(reason) => {
                self.unknown.get_or_insert(reason);
            }
            Verdict::Unsatisfiable => {}
        }

        if self.answered.len() as u32 >= self.total.unwrap_or(total) {
            let verdict = match self.unknown.take() {
                Some(reason) => Verdict::Unknown(reason),
                None => Verdict::Unsatisfiable,
            };
            return Some(self.report(verdict));
        }
        None
    }

    fn report(&self, verdict: Verdict) -> ProblemReport {
        ProblemReport {
            problem: self.problem.clone(),
            name: self.name.clone(),
            verdict,
            stats: self.stats.clone(),
            answered: self.answered.len() as u32,
            total: self.total.unwrap_or_default(),
        }
    }
}
