//! The mcmini command-line driver.

use clap::{ArgAction, Parser};
use mcmini::checker::{Callbacks, CheckerConfig, ClassicDpor, TraceSnapshot, Violation};
use mcmini::cli::ExitCode;
use mcmini::coordinator::{default_registry, Coordinator};
use mcmini::model::ProgramState;
use mcmini::remote::{env, ForkProcessSource};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mcmini",
    version,
    about = "Stateless model checker for pthread programs"
)]
struct Cli {
    /// Bound the number of transitions any single thread may execute
    #[arg(short = 'm', long = "max-depth-per-thread", value_name = "N")]
    max_depth_per_thread: Option<usize>,

    /// Stop at the first deadlock found
    #[arg(short = 'f', long = "first-deadlock", action = ArgAction::SetTrue)]
    first_deadlock: bool,

    /// Checkpoint the target every SECONDS instead of model checking
    #[arg(short = 'r', long = "record", value_name = "SECONDS")]
    record: Option<u64>,

    /// Print the trace with the given id during exploration
    #[arg(short = 'p', long = "print-at-trace-id", value_name = "N")]
    print_at_trace_id: Option<u64>,

    /// Keep exploring after undefined behavior is found
    #[arg(long = "continue-after-undefined", action = ArgAction::SetTrue)]
    continue_after_undefined: bool,

    /// Report threads that never progress within the depth bound
    #[arg(long = "check-forward-progress", action = ArgAction::SetTrue)]
    check_forward_progress: bool,

    /// Interposition library preloaded into the target
    #[arg(long = "preload", value_name = "PATH", default_value = "libmcmini.so")]
    preload: PathBuf,

    /// Per-step timeout in seconds waiting on the target
    #[arg(long = "step-timeout", value_name = "SECONDS")]
    step_timeout: Option<u64>,

    /// Emit the final report as JSON on stdout
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbosity: u8,

    /// Suppress per-trace output
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Target executable
    target: PathBuf,

    /// Arguments passed to the target
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    target_args: Vec<OsString>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    std::process::exit(run(cli));
}

fn init_tracing(cli: &Cli) {
    let default = if cli.quiet {
        "mcmini=warn"
    } else {
        match cli.verbosity {
            0 => "mcmini=info",
            1 => "mcmini=debug",
            _ => "mcmini=trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> i32 {
    if let Some(interval) = cli.record {
        return run_record(interval, &cli.target, &cli.target_args);
    }

    let mut source = ForkProcessSource::new(&cli.target, &cli.preload)
        .args(cli.target_args.iter().cloned())
        .step_timeout(cli.step_timeout.map(Duration::from_secs));
    if let Some(bound) = cli.max_depth_per_thread {
        source = source.env(env::ENV_MAX_DEPTH_PER_THREAD, bound.to_string());
    }
    if cli.first_deadlock {
        source = source.env(env::ENV_FIRST_DEADLOCK, "1");
    }
    if cli.quiet {
        source = source.env(env::ENV_QUIET, "1");
    }

    let mut coordinator = match Coordinator::new(
        ProgramState::with_main_thread(),
        default_registry(),
        Box::new(source),
    ) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            eprintln!("mcmini: {err}");
            return ExitCode::USER_ERROR;
        }
    };

    let config = CheckerConfig::new()
        .max_depth_per_thread(cli.max_depth_per_thread)
        .first_deadlock(cli.first_deadlock)
        .halt_on_undefined_behavior(!cli.continue_after_undefined)
        .check_forward_progress(cli.check_forward_progress);

    let verbose = cli.verbosity > 0 && !cli.quiet;
    let print_at = cli.print_at_trace_id;
    let mut callbacks = Callbacks::none();
    callbacks.trace_completed = Some(Box::new(move |snapshot: &TraceSnapshot| {
        if verbose || print_at == Some(snapshot.trace_id) {
            println!("{snapshot}");
        }
    }));
    callbacks.violation = Some(Box::new(|violation: &Violation| {
        match violation {
            Violation::Deadlock { snapshot } => {
                eprintln!("DEADLOCK:");
                eprint!("{snapshot}");
            }
            Violation::UndefinedBehavior { message, snapshot, .. } => {
                eprintln!("UNDEFINED BEHAVIOR:\n{message}");
                eprint!("{snapshot}");
            }
            Violation::Starvation { runner, snapshot } => {
                eprintln!("POSSIBLE STARVATION of thread {runner}:");
                eprint!("{snapshot}");
            }
        }
    }));

    let checker = ClassicDpor::new(config);
    let report = match checker.verify(&mut coordinator, &mut callbacks) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("mcmini: fatal: {err}");
            return ExitCode::FATAL_ERROR;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report.to_json()) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => {
                eprintln!("mcmini: could not render report: {err}");
                return ExitCode::INTERNAL_ERROR;
            }
        }
    } else if !cli.quiet {
        println!(
            "Model checking completed: {} traces, {} transitions, {} deadlock(s), {} \
             undefined-behavior report(s)",
            report.traces_explored,
            report.transitions_executed,
            report.deadlock_count(),
            report.undefined_behavior_count(),
        );
    }

    if report.deadlock_count() > 0 {
        ExitCode::DEADLOCK_FOUND
    } else if report.undefined_behavior_count() > 0 {
        ExitCode::UNDEFINED_BEHAVIOR_FOUND
    } else if report.has_violations() {
        ExitCode::STARVATION_FOUND
    } else {
        ExitCode::SUCCESS
    }
}

/// `--record`: delegate to the external checkpoint tool instead of model
/// checking.
fn run_record(interval: u64, target: &PathBuf, args: &[OsString]) -> i32 {
    let status = Command::new("dmtcp_launch")
        .arg("--interval")
        .arg(interval.to_string())
        .arg(target)
        .args(args)
        .status();
    match status {
        Ok(status) if status.success() => ExitCode::SUCCESS,
        Ok(status) => status.code().unwrap_or(ExitCode::FATAL_ERROR),
        Err(err) => {
            eprintln!("mcmini: could not invoke dmtcp_launch: {err}");
            ExitCode::USER_ERROR
        }
    }
}
