// crates/pr_cli/src/main.rs
//
// One run: parse → config → logging → replay state → one command or query → save.
// Commands print the appended events; queries print their view. Both as canonical JSON.

mod args;
mod state;

mod exitcodes {
    pub const OK: i32 = 0;
    /// Bad input: arguments, files, definitions, lot decisions, unknown ids.
    pub const VALIDATION: i32 = 2;
    /// The end result is not in a state that allows the command.
    pub const PRECONDITION: i32 = 3;
    /// The command was decided on data that changed since.
    pub const STALE: i32 = 4;
    pub const COMPUTATION: i32 = 5;
    pub const IO: i32 = 6;
}

use std::io::Write;
use std::process::ExitCode;

use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{parse_and_validate as parse_cli, Args, Cmd, Target};
use state::StateFile;

use pr_algo::ranking::{CandidateLotDecisionEntry, CandidateState, ManualCandidateEntry};
use pr_algo::LotDecisionEntry;
use pr_core::variables::ResultPhase;
use pr_io::canonical_json::to_canonical_bytes_of;
use pr_io::config::{load_config, EngineConfig};
use pr_io::loader::{load_scenario, Scenario};
use pr_io::IoError;
use pr_pipeline::service::KnownTransactions;
use pr_pipeline::{
    Command, DpTarget, ElectionKey, EndResultError, EndResultService, InMemoryEventStore, StoreError, UnionKey,
};

type Service = EndResultService<InMemoryEventStore, KnownTransactions>;

/// Central error type for CLI → exit-code mapping.
#[derive(Debug)]
enum MainError {
    Validation(String),
    Precondition(String),
    Stale(String),
    Computation(String),
    Io(String),
}

impl std::fmt::Display for MainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainError::Validation(m)
            | MainError::Precondition(m)
            | MainError::Stale(m)
            | MainError::Computation(m)
            | MainError::Io(m) => f.write_str(m),
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_cli() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("pr: error: {e}");
            return ExitCode::from(exitcodes::VALIDATION as u8);
        }
    };

    let rc = match run(&args) {
        Ok(()) => exitcodes::OK,
        Err(e) => {
            eprintln!("pr: error: {e}");
            map_error(&e)
        }
    };
    ExitCode::from(rc as u8)
}

fn map_error(e: &MainError) -> i32 {
    match e {
        MainError::Validation(_) => exitcodes::VALIDATION,
        MainError::Precondition(_) => exitcodes::PRECONDITION,
        MainError::Stale(_) => exitcodes::STALE,
        MainError::Computation(_) => exitcodes::COMPUTATION,
        MainError::Io(_) => exitcodes::IO,
    }
}

fn map_io_err(e: IoError) -> MainError {
    match e {
        IoError::Json { .. } | IoError::Invalid(_) => MainError::Validation(e.to_string()),
        IoError::Path(_) | IoError::Hash(_) | IoError::Limit { .. } => MainError::Io(e.to_string()),
    }
}

fn map_store_err(e: StoreError) -> MainError {
    MainError::Io(format!("state file: {e}"))
}

fn map_pipeline_err(e: EndResultError) -> MainError {
    let msg = e.to_string();
    match e {
        EndResultError::Validation(_) | EndResultError::NotFound(_) => MainError::Validation(msg),
        EndResultError::Precondition(_) => MainError::Precondition(msg),
        EndResultError::Stale(_) => MainError::Stale(msg),
        EndResultError::Computation(_) => MainError::Computation(msg),
        EndResultError::Store(_) => MainError::Io(msg),
    }
}

// ---- Logging ----

/// `--log-level` beats `RUST_LOG`, which beats the configured filter. Logs go to stderr.
fn init_tracing(args: &Args, cfg: &EngineConfig) {
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter)),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().without_time().with_writer(std::io::stderr))
        .try_init();
}

// ---- Run ----

fn run(args: &Args) -> Result<(), MainError> {
    let cfg = load_config(args.config.as_deref()).map_err(map_io_err)?;
    init_tracing(args, &cfg);
    let phase = args.phase.unwrap_or(cfg.phase);
    debug!(state = %args.state.display(), phase = phase.as_token(), "starting");

    if let Cmd::Init { scenario } = &args.command {
        let scenario = load_scenario(scenario).map_err(map_io_err)?;
        let state = init_state(scenario, &cfg, phase)?;
        state.save(&args.state).map_err(map_io_err)?;
        info!(events = state.events.len(), "state initialized");
        return print_json(&serde_json::json!({ "events": state.events.len() }));
    }

    let state = StateFile::load(&args.state).map_err(map_io_err)?;
    let mut service = open_service(&state, &cfg)?;

    if args.command.is_query() {
        return query(&service, &args.command, phase);
    }

    let command = to_command(&args.command, phase)?;
    let name = command.name();
    let appended = service.handle(command).map_err(map_pipeline_err)?;
    info!(command = name, events = appended.len(), "command applied");

    let next = StateFile { scenario: state.scenario, events: service.into_store().into_log() };
    next.save(&args.state).map_err(map_io_err)?;
    print_json(&appended)
}

fn open_service(state: &StateFile, cfg: &EngineConfig) -> Result<Service, MainError> {
    let store = state.store().map_err(map_store_err)?;
    EndResultService::new(store, state.verifier(), cfg.settings, cfg.solver).map_err(map_pipeline_err)
}

/// Definitions first (elections before the unions referring to them), then audited counting circles.
fn init_state(scenario: Scenario, cfg: &EngineConfig, phase: ResultPhase) -> Result<StateFile, MainError> {
    let mut state = StateFile::new(scenario);
    let mut service = open_service(&state, cfg)?;
    let sc = &state.scenario;

    let commands = sc
        .elections
        .iter()
        .map(|e| Command::DefineElection { phase, election: e.clone() })
        .chain(sc.unions.iter().map(|u| Command::DefineUnion { phase, union: u.clone() }))
        .chain(sc.counting_circles.iter().map(|cc| Command::RecordCountingCircleAudited {
            key: ElectionKey::new(cc.election_id.clone(), phase),
            snapshot: cc.snapshot.clone(),
        }));
    for command in commands {
        service.handle(command).map_err(map_pipeline_err)?;
    }

    state.events = service.into_store().into_log();
    Ok(state)
}

fn query(service: &Service, cmd: &Cmd, phase: ResultPhase) -> Result<(), MainError> {
    match cmd {
        Cmd::Show { target, double_proportional } => match dp_target(target, phase)? {
            DpTarget::Election(key) if !double_proportional => {
                print_json(&service.end_result(&key).map_err(map_pipeline_err)?)
            }
            t => print_json(service.double_proportional_result(&t).map_err(map_pipeline_err)?),
        },
        Cmd::LotDecisions { election } => {
            let key = ElectionKey::new(election.clone(), phase);
            print_json(&service.available_lot_decisions(&key).map_err(map_pipeline_err)?)
        }
        _ => Err(MainError::Validation(format!("{cmd:?} is not a query"))),
    }
}

fn dp_target(t: &Target, phase: ResultPhase) -> Result<DpTarget, MainError> {
    match (&t.election, &t.union) {
        (Some(e), None) => Ok(DpTarget::Election(ElectionKey::new(e.clone(), phase))),
        (None, Some(u)) => Ok(DpTarget::Union(UnionKey::new(u.clone(), phase))),
        _ => Err(MainError::Validation("pass exactly one of --election and --union".into())),
    }
}

fn entries<R: Clone>(winners: &[R], losers: &[R]) -> Vec<LotDecisionEntry<R>> {
    winners
        .iter()
        .map(|r| LotDecisionEntry { reference: r.clone(), winning: true })
        .chain(losers.iter().map(|r| LotDecisionEntry { reference: r.clone(), winning: false }))
        .collect()
}

fn to_command(cmd: &Cmd, phase: ResultPhase) -> Result<Command, MainError> {
    let key = |e: &pr_core::ids::ElectionId| ElectionKey::new(e.clone(), phase);
    let command = match cmd {
        Cmd::Reset { election, counting_circle } => {
            Command::RecordCountingCircleReset { key: key(election), counting_circle_id: counting_circle.clone() }
        }
        Cmd::Start { target } => match dp_target(target, phase)? {
            DpTarget::Election(key) => Command::StartMandateDistribution { key },
            DpTarget::Union(key) => Command::StartUnionMandateDistribution { key },
        },
        Cmd::SuperLot { target, number, winners, losers, basis } => Command::ApplySuperApportionmentLotDecision {
            target: dp_target(target, phase)?,
            number: *number,
            entries: entries(winners, losers),
            expected_basis: basis.clone(),
        },
        Cmd::SubLot { target, number, winners, losers, basis } => Command::ApplySubApportionmentLotDecision {
            target: dp_target(target, phase)?,
            number: *number,
            entries: entries(winners, losers),
            expected_basis: basis.clone(),
        },
        Cmd::ListLot { election, list, winners, losers } => {
            let entries: Vec<CandidateLotDecisionEntry> = entries(winners, losers);
            Command::ApplyListLotDecision { key: key(election), list_id: list.clone(), entries }
        }
        Cmd::Manual { election, list, elected, not_elected } => {
            let entries = elected
                .iter()
                .map(|c| ManualCandidateEntry { candidate_id: c.clone(), state: CandidateState::Elected })
                .chain(
                    not_elected
                        .iter()
                        .map(|c| ManualCandidateEntry { candidate_id: c.clone(), state: CandidateState::NotElected }),
                )
                .collect();
            Command::EnterManualListEndResult { key: key(election), list_id: list.clone(), entries }
        }
        Cmd::Finalize { election, second_factor } => {
            Command::Finalize { key: key(election), second_factor_transaction_id: second_factor.clone() }
        }
        Cmd::RevertFinalization { election } => Command::RevertFinalization { key: key(election) },
        Cmd::RevertDistribution { target } => match dp_target(target, phase)? {
            DpTarget::Election(key) => Command::RevertMandateDistribution { key },
            DpTarget::Union(key) => Command::RevertUnionMandateDistribution { key },
        },
        Cmd::Init { .. } | Cmd::Show { .. } | Cmd::LotDecisions { .. } => {
            return Err(MainError::Validation(format!("{cmd:?} does not change the end result")))
        }
    };
    Ok(command)
}

// ---- Output ----

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), MainError> {
    let mut bytes = to_canonical_bytes_of(value).map_err(|e| MainError::Computation(format!("serialize: {e}")))?;
    bytes.push(b'\n');
    std::io::stdout().write_all(&bytes).map_err(|e| MainError::Io(format!("stdout: {e}")))
}
