// crates/pr_cli/src/args.rs
//
// Command-line surface. One invocation replays the state file, applies at most one
// command and writes the state back.
//
// Rules:
// - Local paths only (no scheme://).
// - Lot decision references: columns as `list:<id>` / `union_list:<id>`, cells as
//   `<election>/<column>`, candidates by id.
// - Every write goes through the state file named by --state.

use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand};

use pr_algo::{CellRef, ColumnKey};
use pr_core::ids::{CandidateId, CountingCircleId, ElectionId, ListId, ResultDigest, UnionId};
use pr_core::variables::ResultPhase;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "pr",
    disable_help_subcommand = true,
    about = "Offline end-result engine for proportional elections"
)]
pub struct Args {
    /// State file (scenario + event log). Created by `init`.
    #[arg(long, global = true, default_value = "pr-state.json")]
    pub state: PathBuf,

    /// Engine configuration JSON (settings, solver limits, phase, log filter).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Result phase; overrides the configuration.
    #[arg(long, global = true, value_parser = parse_phase)]
    pub phase: Option<ResultPhase>,

    /// Log filter directive (e.g. `debug`, `pr_pipeline=trace`); overrides RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Cmd,
}

/// Exactly one owner of a double proportional result.
#[derive(Debug, Clone, ClapArgs)]
#[group(required = true, multiple = false)]
pub struct Target {
    #[arg(long)]
    pub election: Option<ElectionId>,
    #[arg(long)]
    pub union: Option<UnionId>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Cmd {
    /// Define every election and union of a scenario and record its audited counting circles.
    Init {
        #[arg(long)]
        scenario: PathBuf,
    },
    /// Reset an audited counting circle.
    Reset {
        #[arg(long)]
        election: ElectionId,
        #[arg(long)]
        counting_circle: CountingCircleId,
    },
    /// Start the mandate distribution of an election or a union.
    Start {
        #[command(flatten)]
        target: Target,
    },
    /// Resolve a super-apportionment tie.
    SuperLot {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        number: u32,
        #[arg(long = "winner", required = true)]
        winners: Vec<ColumnKey>,
        #[arg(long = "loser")]
        losers: Vec<ColumnKey>,
        /// Basis digest the decision was taken on.
        #[arg(long)]
        basis: Option<ResultDigest>,
    },
    /// Resolve a sub-apportionment tie.
    SubLot {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        number: u32,
        #[arg(long = "winner", required = true)]
        winners: Vec<CellRef>,
        #[arg(long = "loser")]
        losers: Vec<CellRef>,
        #[arg(long)]
        basis: Option<ResultDigest>,
    },
    /// Resolve a candidate tie on one list.
    ListLot {
        #[arg(long)]
        election: ElectionId,
        #[arg(long)]
        list: ListId,
        #[arg(long = "winner", required = true)]
        winners: Vec<CandidateId>,
        #[arg(long = "loser")]
        losers: Vec<CandidateId>,
    },
    /// Enter the manual end result of one list.
    Manual {
        #[arg(long)]
        election: ElectionId,
        #[arg(long)]
        list: ListId,
        #[arg(long)]
        elected: Vec<CandidateId>,
        #[arg(long)]
        not_elected: Vec<CandidateId>,
    },
    Finalize {
        #[arg(long)]
        election: ElectionId,
        #[arg(long)]
        second_factor: Option<String>,
    },
    RevertFinalization {
        #[arg(long)]
        election: ElectionId,
    },
    RevertDistribution {
        #[command(flatten)]
        target: Target,
    },
    /// Print the end result of an election, or the double proportional result of a union.
    Show {
        #[command(flatten)]
        target: Target,
        /// Print the election's double proportional result instead of its end result.
        #[arg(long)]
        double_proportional: bool,
    },
    /// Print the lot decisions currently open for an election.
    LotDecisions {
        #[arg(long)]
        election: ElectionId,
    },
}

impl Cmd {
    /// Queries never write the state file.
    pub fn is_query(&self) -> bool {
        matches!(self, Cmd::Show { .. } | Cmd::LotDecisions { .. })
    }
}

/// Errors surfaced by argument checks. Messages stay short and stable for scripts.
#[derive(Debug)]
pub enum CliError {
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::NonLocalPath(p) => write!(f, "path must be local file (no scheme): {p}"),
            CliError::NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}
impl std::error::Error for CliError {}

pub fn parse_phase(s: &str) -> Result<ResultPhase, String> {
    ResultPhase::from_token(s.trim()).ok_or_else(|| format!("unknown phase {s:?} (expected testing or live)"))
}

#[inline]
fn has_scheme(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("file:")
}

fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    match p.to_str() {
        Some(s) if has_scheme(s) => Err(CliError::NonLocalPath(s.to_string())),
        _ => Ok(()),
    }
}

fn ensure_local_file(p: &Path) -> Result<(), CliError> {
    ensure_local_path(p)?;
    if !p.is_file() {
        return Err(CliError::NotFound(p.display().to_string()));
    }
    Ok(())
}

/// Entry point used by main.rs.
pub fn parse_and_validate() -> Result<Args, CliError> {
    validate(Args::parse())
}

pub fn validate(args: Args) -> Result<Args, CliError> {
    ensure_local_path(&args.state)?;
    if let Some(c) = &args.config {
        ensure_local_file(c)?;
    }
    match &args.command {
        Cmd::Init { scenario } => ensure_local_file(scenario)?,
        _ => ensure_local_file(&args.state)?,
    }
    Ok(args)
}
