use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use super::cnf::Cnf;
use super::processing::{OutcomeAggregator, Simplifier, SolverEngine, Splitter, solve_with_stats};
use super::types::{PipelineMessage, ProblemId, ProblemReport};
use crate::bootstrap::{Advertised, ConnectionBootstrapper};
use crate::discovery::types::ServiceKind;
use crate::error::{BootstrapError, TransportError};
use crate::transport::{BoundEndpoint, ConnectedEndpoint, Direction};

/// Lifecycle shared by every role.
///
/// `Init -> Bound -> Connected -> Running -> TornDown`, where `TornDown` can
/// also be reached from any earlier state when something fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Init,
    Bound,
    Connected,
    Running,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One receive -> process -> send step completed.
    Processed,
    /// No step was taken: there is no more input, or the upstream role went away.
    Exhausted,
}

#[derive(Debug)]
struct Lifecycle {
    role: &'static str,
    state: RoleState,
}

impl Lifecycle {
    fn new(role: &'static str) -> Self {
        Self {
            role,
            state: RoleState::Init,
        }
    }

    fn advance(&mut self, next: RoleState) {
        if self.state != next {
            tracing::info!("[{}] {:?} -> {:?}", self.role, self.state, next);
            self.state = next;
        }
    }
}

#[async_trait]
pub trait PipelineRole: Send {
    fn name(&self) -> &'static str;

    fn state(&self) -> RoleState;

    async fn step(&mut self) -> Result<StepOutcome>;

    /// Withdraws every advertisement this role made and closes its endpoints.
    /// Calling it twice is harmless.
    fn teardown(&mut self) -> Result<()>;
}

/// Steps `role` until it is exhausted, `max_steps` steps were taken, or
/// `shutdown` resolves, then tears it down. Teardown also runs when a step fails.
pub async fn run_role<R, F>(role: &mut R, max_steps: Option<u64>, shutdown: F) -> Result<u64>
where
    R: PipelineRole + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut steps = 0u64;

    let result = loop {
        if max_steps.is_some_and(|max| steps >= max) {
            tracing::info!("[{}] Reached the limit of {} step(s)", role.name(), steps);
            break Ok(steps);
        }

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("[{}] Shutdown requested after {} step(s)", role.name(), steps);
                break Ok(steps);
            }
            outcome = role.step() => match outcome {
                Ok(StepOutcome::Processed) => steps += 1,
                Ok(StepOutcome::Exhausted) => break Ok(steps),
                Err(e) => {
                    tracing::error!("[{}] Step failed: {:#}", role.name(), e);
                    break Err(e);
                }
            },
        }
    };

    let torn_down = role.teardown();
    let steps = result?;
    torn_down?;
    Ok(steps)
}

/// Runs a role's `bootstrap` unless `shutdown` resolves first, in which case
/// the half-built role is dropped, withdrawing whatever it already advertised.
pub async fn bootstrap_or_shutdown<T, B, F>(bootstrap: B, shutdown: F) -> Result<Option<T>, BootstrapError>
where
    B: Future<Output = Result<T, BootstrapError>>,
    F: Future<Output = ()>,
{
    tokio::select! {
        result = bootstrap => result.map(Some),
        _ = shutdown => {
            tracing::info!("Shutdown requested during bootstrap");
            Ok(None)
        }
    }
}

fn release_all<const N: usize>(slots: [&mut Option<Advertised>; N]) -> Result<()> {
    let mut result = Ok(());
    for advertised in slots.into_iter().filter_map(Option::take) {
        if let Err(e) = advertised.release() {
            tracing::warn!("Teardown could not unregister: {}", e);
            result = Err(e.into());
        }
    }
    result
}

fn bound(slot: &mut Option<Advertised>) -> Result<&mut BoundEndpoint> {
    match slot {
        Some(advertised) => Ok(&mut advertised.endpoint),
        None => bail!("endpoint already torn down"),
    }
}

fn connected(slot: &mut Option<ConnectedEndpoint>) -> Result<&mut ConnectedEndpoint> {
    match slot {
        Some(endpoint) => Ok(endpoint),
        None => bail!("endpoint already torn down"),
    }
}

/// A named formula waiting to enter the pipeline.
#[derive(Debug, Clone)]
pub struct ProblemInput {
    pub name: String,
    pub cnf: Cnf,
}

impl ProblemInput {
    pub fn new(name: impl Into<String>, cnf: Cnf) -> Self {
        Self {
            name: name.into(),
            cnf,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(path.display().to_string(), Cnf::from_file(path)?))
    }
}

// ============================================================
// SIMPLIFY / GATHER
// ============================================================

/// Head and tail of the pipeline: simplifies each input problem, sends it to
/// the splitter, and gathers the solvers' outcomes into a verdict.
pub struct SimplifyGatherRole {
    lifecycle: Lifecycle,
    gather: Option<Advertised>,
    simplify: Option<Advertised>,
    simplifier: Arc<dyn Simplifier>,
    problems: VecDeque<ProblemInput>,
    reports: Vec<ProblemReport>,
}

impl SimplifyGatherRole {
    pub async fn bootstrap(
        boot: &ConnectionBootstrapper,
        problems: Vec<ProblemInput>,
        simplifier: Arc<dyn Simplifier>,
    ) -> Result<Self, BootstrapError> {
        let mut lifecycle = Lifecycle::new("simplify");

        let gather = boot
            .bind_and_advertise(ServiceKind::Gather, Direction::Receive)
            .await?;
        let simplify = boot
            .bind_and_advertise(ServiceKind::Simplify, Direction::Send)
            .await?;
        lifecycle.advance(RoleState::Bound);
        lifecycle.advance(RoleState::Connected);

        Ok(Self {
            lifecycle,
            gather: Some(gather),
            simplify: Some(simplify),
            simplifier,
            problems: problems.into(),
            reports: Vec::new(),
        })
    }

    pub fn reports(&self) -> &[ProblemReport] {
        &self.reports
    }

    pub fn pending_problems(&self) -> usize {
        self.problems.len()
    }

    async fn gather_outcomes(&mut self, problem: ProblemId, name: String) -> Result<ProblemReport> {
        let mut aggregator = OutcomeAggregator::new(problem, name);
        let gather = bound(&mut self.gather)?;

        loop {
            let bytes = gather.receive().await?;
            match PipelineMessage::decode(&bytes)? {
                PipelineMessage::Outcome {
                    problem,
                    index,
                    total,
                    verdict,
                    stats,
                } => {
                    if &problem != aggregator.problem() {
                        tracing::debug!("Discarding late outcome {} of {}", index, problem);
                        continue;
                    }
                    tracing::info!(
                        "[gather][receive] <-- outcome {}/{} of {}: {}",
                        index + 1,
                        total,
                        problem,
                        verdict.status_line()
                    );
                    if let Some(report) = aggregator.absorb(index, total, verdict, &stats) {
                        return Ok(report);
                    }
                }
                other => {
                    tracing::warn!("[gather] Ignoring unexpected {} message", other.kind_name());
                }
            }
        }
    }
}

#[async_trait]
impl PipelineRole for SimplifyGatherRole {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn state(&self) -> RoleState {
        self.lifecycle.state
    }

    async fn step(&mut self) -> Result<StepOutcome> {
        let Some(input) = self.problems.pop_front() else {
            return Ok(StepOutcome::Exhausted);
        };
        self.lifecycle.advance(RoleState::Running);

        let cnf = self.simplifier.simplify(input.cnf);
        let problem = ProblemId::new();
        tracing::info!(
            "[simplify][send] --> {} as {} ({} vars, {} clauses)",
            input.name,
            problem,
            cnf.num_vars,
            cnf.num_clauses()
        );

        let message = PipelineMessage::Formula {
            problem: problem.clone(),
            name: input.name.clone(),
            cnf,
        };
        bound(&mut self.simplify)?.send(&message.encode()?).await?;

        let report = self.gather_outcomes(problem, input.name).await?;
        tracing::info!("[gather] {} settled: {}", report.name, report.verdict.status_line());
        self.reports.push(report);

        Ok(StepOutcome::Processed)
    }

    fn teardown(&mut self) -> Result<()> {
        if self.lifecycle.state == RoleState::TornDown {
            return Ok(());
        }
        let result = release_all([&mut self.gather, &mut self.simplify]);
        self.lifecycle.advance(RoleState::TornDown);
        result
    }
}

// ============================================================
// SPLIT
// ============================================================

/// Pulls formulas from Simplify and pushes their subproblems to the solvers.
pub struct SplitRole {
    lifecycle: Lifecycle,
    solvers: Option<Advertised>,
    simplify: Option<ConnectedEndpoint>,
    splitter: Arc<dyn Splitter>,
}

impl SplitRole {
    pub async fn bootstrap(
        boot: &ConnectionBootstrapper,
        splitter: Arc<dyn Splitter>,
    ) -> Result<Self, BootstrapError> {
        let mut lifecycle = Lifecycle::new("split");

        let solvers = boot
            .bind_and_advertise(ServiceKind::Split, Direction::Send)
            .await?;
        lifecycle.advance(RoleState::Bound);

        let simplify = boot
            .connect_with_retry(ServiceKind::Simplify, Direction::Receive)
            .await?;
        lifecycle.advance(RoleState::Connected);

        Ok(Self {
            lifecycle,
            solvers: Some(solvers),
            simplify: Some(simplify),
            splitter,
        })
    }
}

#[async_trait]
impl PipelineRole for SplitRole {
    fn name(&self) -> &'static str {
        "split"
    }

    fn state(&self) -> RoleState {
        self.lifecycle.state
    }

    async fn step(&mut self) -> Result<StepOutcome> {
        let bytes = match connected(&mut self.simplify)?.receive().await {
            Ok(bytes) => bytes,
            Err(TransportError::Closed) => {
                tracing::info!("[split] Simplify closed the connection");
                return Ok(StepOutcome::Exhausted);
            }
            Err(e) => return Err(e.into()),
        };
        self.lifecycle.advance(RoleState::Running);

        let (problem, cnf) = match PipelineMessage::decode(&bytes)? {
            PipelineMessage::Formula { problem, name, cnf } => {
                tracing::info!("[split][receive] <-- {} ({})", problem, name);
                (problem, cnf)
            }
            other => {
                tracing::warn!("[split] Ignoring unexpected {} message", other.kind_name());
                return Ok(StepOutcome::Processed);
            }
        };

        let cubes = self.splitter.split(&cnf);
        let total = cubes.len() as u32;
        let solvers = bound(&mut self.solvers)?;

        for (index, cube) in cubes.into_iter().enumerate() {
            let job = PipelineMessage::Job {
                problem: problem.clone(),
                index: index as u32,
                total,
                cnf: cube,
            };
            solvers.send(&job.encode()?).await?;
            tracing::info!("[split][send] --> job {}/{} of {}", index + 1, total, problem);
        }

        Ok(StepOutcome::Processed)
    }

    fn teardown(&mut self) -> Result<()> {
        if self.lifecycle.state == RoleState::TornDown {
            return Ok(());
        }
        self.simplify.take();
        let result = release_all([&mut self.solvers]);
        self.lifecycle.advance(RoleState::TornDown);
        result
    }
}

// ============================================================
// SOLVE
// ============================================================

/// Solves the jobs it pulls from Split and pushes the outcomes to Gather.
pub struct SolveRole {
    lifecycle: Lifecycle,
    split: Option<ConnectedEndpoint>,
    gather: Option<ConnectedEndpoint>,
    engine: Arc<dyn SolverEngine>,
}

impl SolveRole {
    pub async fn bootstrap(
        boot: &ConnectionBootstrapper,
        engine: Arc<dyn SolverEngine>,
    ) -> Result<Self, BootstrapError> {
        let mut lifecycle = Lifecycle::new("solve");
        lifecycle.advance(RoleState::Bound);

        let split = boot
            .connect_with_retry(ServiceKind::Split, Direction::Receive)
            .await?;
        let gather = boot
            .connect_with_retry(ServiceKind::Gather, Direction::Send)
            .await?;
        lifecycle.advance(RoleState::Connected);

        Ok(Self {
            lifecycle,
            split: Some(split),
            gather: Some(gather),
            engine,
        })
    }
}

#[async_trait]
impl PipelineRole for SolveRole {
    fn name(&self) -> &'static str {
        "solve"
    }

    fn state(&self) -> RoleState {
        self.lifecycle.state
    }

    async fn step(&mut self) -> Result<StepOutcome> {
        let bytes = match connected(&mut self.split)?.receive().await {
            Ok(bytes) => bytes,
            Err(TransportError::Closed) => {
                tracing::info!("[solve] Split closed the connection");
                return Ok(StepOutcome::Exhausted);
            }
            Err(e) => return Err(e.into()),
        };
        self.lifecycle.advance(RoleState::Running);

        let (problem, index, total, cnf) = match PipelineMessage::decode(&bytes)? {
            PipelineMessage::Job {
                problem,
                index,
                total,
                cnf,
            } => (problem, index, total, cnf),
            other => {
                tracing::warn!("[solve] Ignoring unexpected {} message", other.kind_name());
                return Ok(StepOutcome::Processed);
            }
        };
        tracing::info!("[solve][receive] <-- job {}/{} of {}", index + 1, total, problem);

        let engine = self.engine.clone();
        let (verdict, stats) =
            tokio::task::spawn_blocking(move || solve_with_stats(engine.as_ref(), &cnf))
                .await
                .context("Solver task panicked")?;

        tracing::info!(
            "[solve][send] --> {} for job {}/{} of {} in {} ms",
            verdict.status_line(),
            index + 1,
            total,
            problem,
            stats.elapsed_ms
        );
        let outcome = PipelineMessage::Outcome {
            problem,
            index,
            total,
            verdict,
            stats,
        };
        connected(&mut self.gather)?.send(&outcome.encode()?).await?;

        Ok(StepOutcome::Processed)
    }

    fn teardown(&mut self) -> Result<()> {
        self.split.take();
        self.gather.take();
        self.lifecycle.advance(RoleState::TornDown);
        Ok(())
    }
}
