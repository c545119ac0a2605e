//! `sat-pipeline` binary: one subcommand per pipeline role, plus registry housekeeping.
//!
//! ```bash
//! sat-pipeline --registry /shared/registry init
//! sat-pipeline --registry /shared/registry split --depth 2 &
//! sat-pipeline --registry /shared/registry solve &
//! sat-pipeline --registry /shared/registry simplify problem.cnf
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sat_pipeline::config::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_EVICTION_GRACE_MS, DEFAULT_HOSTNAME, DEFAULT_REGISTRY_DIR,
    RegistryConfig, RoleConfig, check_input_file,
};
use sat_pipeline::discovery::registry::{FsRegistry, ServiceRegistry};
use sat_pipeline::discovery::retry::DEFAULT_DISCOVERY_TIMEOUT_SECS;
use sat_pipeline::discovery::types::{ServiceKind, ServiceRecord};
use sat_pipeline::pipeline::{
    BasicSimplifier, CubeSplitter, ProblemInput, ProblemReport, SimplifyGatherRole, SolveRole,
    SplitRole, SplrEngine, Verdict, bootstrap_or_shutdown, run_role,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sat-pipeline",
    version = env!("CARGO_PKG_VERSION"),
    about = "Distributed SAT solving over a shared-directory service registry"
)]
struct Cli {
    /// Registry root shared by every host.
    #[arg(long, env = "SAT_PIPELINE_REGISTRY", default_value = DEFAULT_REGISTRY_DIR)]
    registry: PathBuf,

    /// Hostname advertised to the other roles.
    #[arg(long, env = "SAT_PIPELINE_HOSTNAME", default_value = DEFAULT_HOSTNAME)]
    hostname: String,

    /// Address listening endpoints bind to.
    #[arg(long, default_value = "0.0.0.0")]
    bind_ip: IpAddr,

    #[arg(long, default_value_t = DEFAULT_DISCOVERY_TIMEOUT_SECS)]
    discovery_timeout_secs: u32,

    /// Unreachable records younger than this are left in the registry.
    #[arg(long, default_value_t = DEFAULT_EVICTION_GRACE_MS)]
    eviction_grace_ms: u64,

    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    connect_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the registry directories.
    Init,

    /// Print the advertised services.
    List {
        #[arg(long)]
        kind: Option<ServiceKind>,

        #[arg(long)]
        json: bool,
    },

    /// Run Simplify/Gather on the given DIMACS problems, then exit.
    Simplify {
        #[arg(required = true)]
        problems: Vec<PathBuf>,
    },

    /// Run a splitter until interrupted.
    Split {
        /// Split on this many variables (2^depth subproblems).
        #[arg(long, default_value_t = 1)]
        depth: u32,

        /// Stop after this many formulas.
        #[arg(long)]
        steps: Option<u64>,
    },

    /// Run a solver until interrupted.
    Solve {
        /// Stop after this many subproblems.
        #[arg(long)]
        steps: Option<u64>,
    },
}

impl Cli {
    fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            root: self.registry.clone(),
            discovery_timeout_secs: self.discovery_timeout_secs,
        }
    }

    fn role_config(&self) -> RoleConfig {
        RoleConfig {
            registry: self.registry_config(),
            hostname: self.hostname.clone(),
            bind_ip: self.bind_ip,
            eviction_grace: Duration::from_millis(self.eviction_grace_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let invocation: Vec<String> = std::env::args().collect();
    tracing::info!("Invoked as: {}", invocation.join(" "));

    let cli = Cli::parse();

    match &cli.command {
        Command::Init => run_init(&cli),
        Command::List { kind, json } => run_list(&cli, *kind, *json),
        Command::Simplify { problems } => run_simplify(&cli, problems).await,
        Command::Split { depth, steps } => run_split(&cli, *depth, *steps).await,
        Command::Solve { steps } => run_solve(&cli, *steps).await,
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn run_init(cli: &Cli) -> Result<()> {
    FsRegistry::init(&cli.registry)?;
    println!("Initialised registry at {}", cli.registry.display());
    Ok(())
}

fn run_list(cli: &Cli, kind: Option<ServiceKind>, json: bool) -> Result<()> {
    let registry = cli.registry_config().open()?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => ServiceKind::ALL.to_vec(),
    };

    let mut records: Vec<ServiceRecord> = Vec::new();
    for kind in kinds {
        records.extend(registry.list_all(kind)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No services registered");
    }
    for record in &records {
        let age = registry
            .registered_at(record)?
            .and_then(|at| at.elapsed().ok())
            .map(|age| format!("{}s", age.as_secs()))
            .unwrap_or_else(|| "?".to_string());
        println!("{:<8} {}:{}  (age {})", record.kind, record.hostname, record.port, age);
    }
    Ok(())
}

async fn run_simplify(cli: &Cli, paths: &[PathBuf]) -> Result<()> {
    let mut problems = Vec::with_capacity(paths.len());
    for path in paths {
        check_input_file("Problem", path)?;
        problems.push(ProblemInput::from_file(path)?);
    }

    let boot = cli.role_config().bootstrapper()?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let bootstrap = SimplifyGatherRole::bootstrap(&boot, problems, Arc::new(BasicSimplifier));
    let Some(mut role) = bootstrap_or_shutdown(bootstrap, shutdown.as_mut()).await? else {
        return Ok(());
    };

    let result = run_role(&mut role, None, shutdown.as_mut()).await;
    for report in role.reports() {
        print_report(report);
    }
    if role.pending_problems() > 0 {
        tracing::warn!("{} problem(s) were not processed", role.pending_problems());
    }
    result.map(|_| ())
}

async fn run_split(cli: &Cli, depth: u32, steps: Option<u64>) -> Result<()> {
    let boot = cli.role_config().bootstrapper()?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let bootstrap = SplitRole::bootstrap(&boot, Arc::new(CubeSplitter::new(depth)));
    let Some(mut role) = bootstrap_or_shutdown(bootstrap, shutdown.as_mut()).await? else {
        return Ok(());
    };

    let processed = run_role(&mut role, steps, shutdown.as_mut()).await?;
    tracing::info!("Split {} formula(s)", processed);
    Ok(())
}

async fn run_solve(cli: &Cli, steps: Option<u64>) -> Result<()> {
    let boot = cli.role_config().bootstrapper()?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let bootstrap = SolveRole::bootstrap(&boot, Arc::new(SplrEngine));
    let Some(mut role) = bootstrap_or_shutdown(bootstrap, shutdown.as_mut()).await? else {
        return Ok(());
    };

    let processed = run_role(&mut role, steps, shutdown.as_mut()).await?;
    tracing::info!("Solved {} subproblem(s)", processed);
    Ok(())
}

fn print_report(report: &ProblemReport) {
    println!("c problem {} ({})", report.name, report.problem);
    println!("{}", report.verdict.status_line());
    match &report.verdict {
        Verdict::Satisfiable(model) => {
            let literals: Vec<String> = model.iter().map(|lit| lit.to_string()).collect();
            println!("v {} 0", literals.join(" "));
        }
        Verdict::Unknown(reason) => println!("c reason: {}", reason),
        Verdict::Unsatisfiable => {}
    }
    println!(
        "c subproblems answered: {}/{}",
        report.answered, report.total
    );
    println!(
        "c variables: {}, clauses solved: {}, solver time: {} ms",
        report.stats.variables, report.stats.clauses, report.stats.elapsed_ms
    );
}
