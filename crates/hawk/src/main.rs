use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser};
use hawk_runner::{
    clean_byproducts, discover_tests, filter_tests, run_regression, run_single, RegressionPlan,
    RegressionSummary, RunConfig, RunContext, ShellDriver, ToolchainConfig,
};

mod report;
mod util;

/// Exit code when at least one test failed or its log went missing.
const EXIT_TESTS_FAILED: u8 = 10;

#[derive(Parser, Debug)]
#[command(name = "hawk")]
#[command(about = "Compile-once, simulate-many UVM regression runner.", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the tests dir, build byproducts and the sim output tree.
    #[arg(short = 'C', long, global = true, value_name = "DIR", default_value = ".")]
    work_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Compile (optionally) and simulate a single test from KEY=VALUE parameters.
    Run(RunArgs),
    /// Run every discovered test: compile once, then simulate each test in turn.
    Regress(RegressArgs),
    /// Remove known compile/simulate byproducts.
    Clean(CleanArgs),
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
    /// Print the machine-readable report on stdout (progress moves to stderr).
    #[arg(
        long,
        action = clap::ArgAction::Set,
        value_name = "BOOL",
        value_parser = clap::value_parser!(bool),
        default_value = "false"
    )]
    json: bool,

    #[arg(long, value_name = "PATH")]
    report_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ToolchainArgs {
    /// Directory whose entries define the test set.
    #[arg(long, value_name = "DIR")]
    tests_dir: Option<PathBuf>,

    /// Kill a job that runs longer than this and mark its test missing.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[command(flatten)]
    toolchain: ToolchainArgs,

    #[command(flatten)]
    report: ReportArgs,

    /// Run parameters: TEST, FSDB, COMPILE, SIMARGS, DBG, CLEAN, GUI.
    #[arg(value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct RegressArgs {
    #[command(flatten)]
    toolchain: ToolchainArgs,

    #[command(flatten)]
    report: ReportArgs,

    #[arg(long, value_name = "SUBSTR")]
    filter: Option<String>,

    #[arg(long)]
    exact: bool,

    /// Print the selected tests and exit.
    #[arg(long)]
    list: bool,

    /// Parameters applied to every test. TEST and COMPILE are set per test.
    #[arg(value_name = "KEY=VALUE")]
    params: Vec<String>,
}

#[derive(Debug, Clone, Args)]
struct CleanArgs {
    #[command(flatten)]
    report: ReportArgs,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => cmd_run(&cli.work_dir, args),
        Command::Regress(args) => cmd_regress(&cli.work_dir, args),
        Command::Clean(args) => cmd_clean(&cli.work_dir, args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_toolchain(work_dir: &Path, args: &ToolchainArgs) -> Result<ToolchainConfig> {
    let mut toolchain = ToolchainConfig::load(work_dir)?;
    if let Some(dir) = &args.tests_dir {
        toolchain.tests_dir = dir.clone();
    }
    if let Some(ms) = args.timeout_ms {
        toolchain.timeout_ms = Some(ms);
    }
    tracing::debug!("toolchain: {toolchain:?}");
    Ok(toolchain)
}

/// Progress goes to stdout unless stdout carries the JSON report.
fn progress_sink(json: bool) -> Box<dyn Write> {
    if json {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    }
}

fn cmd_run(work_dir: &Path, args: RunArgs) -> Result<std::process::ExitCode> {
    let toolchain = load_toolchain(work_dir, &args.toolchain)?;
    let cfg = RunConfig::resolve(&args.params);

    let driver = ShellDriver;
    let ctx = RunContext {
        work_dir,
        toolchain: &toolchain,
        driver: &driver,
        echo_commands: true,
    };
    let mut progress = progress_sink(args.report.json);
    let result = run_single(&ctx, cfg, &mut *progress)?;
    writeln!(progress, "{}", result.verdict_line())?;
    progress.flush()?;

    let mut invocation = report::InvocationInfo::current(work_dir);
    invocation.overrides = args.params.clone();
    let report = report::RunReport::new(invocation, &result)?;
    let json = report::write_report_file(&report, args.report.report_out.as_deref())?;
    if args.report.json {
        print!("{json}");
    }

    Ok(if result.verdict.is_pass() {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::from(EXIT_TESTS_FAILED)
    })
}

fn cmd_regress(work_dir: &Path, args: RegressArgs) -> Result<std::process::ExitCode> {
    let started = Instant::now();
    let toolchain = load_toolchain(work_dir, &args.toolchain)?;

    let tests_dir = work_dir.join(&toolchain.tests_dir);
    let tests = discover_tests(&tests_dir, &toolchain.base_test)?;
    let tests = filter_tests(tests, args.filter.as_deref(), args.exact);

    if args.list {
        for t in &tests {
            println!("{t}");
        }
        return Ok(std::process::ExitCode::SUCCESS);
    }
    if tests.is_empty() {
        tracing::warn!("no tests selected from {}", tests_dir.display());
    }

    let driver = ShellDriver;
    let ctx = RunContext {
        work_dir,
        toolchain: &toolchain,
        driver: &driver,
        echo_commands: false,
    };
    let plan = RegressionPlan {
        tests,
        overrides: args.params.clone(),
    };
    let mut progress = progress_sink(args.report.json);
    let results = run_regression(&ctx, &plan, &mut *progress)?;
    progress.flush()?;

    let mut invocation = report::InvocationInfo::current(work_dir);
    invocation.tests_dir = Some(util::display_path(&tests_dir));
    invocation.overrides = args.params.clone();
    invocation.filter = args.filter.clone();
    let report = report::RegressReport::new(invocation, started.elapsed(), &results)?;
    let json = report::write_report_file(&report, args.report.report_out.as_deref())?;

    let summary: &RegressionSummary = &report.summary.counts;
    let exit_code = if summary.all_passed() {
        0
    } else {
        EXIT_TESTS_FAILED
    };

    if args.report.json {
        print!("{json}");
    }
    if args.report.report_out.is_some() || args.report.json {
        eprintln!(
            "hawk regress: passed={} failed={} missing={} job_failures={} (exit={})",
            summary.passed, summary.failed, summary.missing, summary.job_failures, exit_code
        );
    }

    Ok(std::process::ExitCode::from(exit_code))
}

fn cmd_clean(work_dir: &Path, args: CleanArgs) -> Result<std::process::ExitCode> {
    let toolchain = ToolchainConfig::load(work_dir)?;
    let report = clean_byproducts(work_dir, &toolchain.sim_root);
    let mut progress = progress_sink(args.report.json);
    for name in &report.removed {
        writeln!(progress, "Removed {name}")?;
    }
    for skip in &report.skipped {
        eprintln!("skipped {}: {}", skip.name, skip.reason);
    }
    progress.flush()?;

    let json = report::write_report_file(
        &report::CleanJsonReport::from(report),
        args.report.report_out.as_deref(),
    )?;
    if args.report.json {
        print!("{json}");
    }
    Ok(std::process::ExitCode::SUCCESS)
}
