use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::classify::{classify_log, Verdict};
use crate::clean::{clean_byproducts, remove_dir_all_if_exists, CleanReport};
use crate::command::{plan_commands, CommandPlan};
use crate::config::{validate_test_id, RunConfig};
use crate::job_runner::{JobDriver, JobOutput, JobSpec};
use crate::toolchain::ToolchainConfig;

/// Lifecycle of one test. `Classified` and `Missing` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Pending,
    Compiling,
    Simulating,
    LogWritten,
    Classified,
    Missing,
}

/// What every test of an invocation shares.
pub struct RunContext<'a> {
    pub work_dir: &'a Path,
    pub toolchain: &'a ToolchainConfig,
    pub driver: &'a dyn JobDriver,
    /// Print each rendered command before launching it.
    pub echo_commands: bool,
}

impl RunContext<'_> {
    fn timeout(&self) -> Option<Duration> {
        self.toolchain.timeout_ms.map(Duration::from_millis)
    }
}

/// Jobs executed for one test, before classification.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub config: RunConfig,
    pub plan: CommandPlan,
    pub clean: Option<CleanReport>,
    pub compile: Option<JobOutput>,
    pub simulate: JobOutput,
    /// Absolute path of the expected log artifact.
    pub log_path: PathBuf,
    /// Written when the simulator left no log behind.
    pub fallback_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TestResult {
    pub test: String,
    pub verdict: Verdict,
    pub state: TestState,
    pub run: TestRun,
    pub duration: Duration,
}

impl TestResult {
    /// The line printed after a test finishes.
    pub fn verdict_line(&self) -> String {
        match self.verdict {
            Verdict::Missing if self.run.simulate.timed_out => {
                format!("FAILED...timed out ({})", self.run.log_path.display())
            }
            Verdict::Missing => format!("FAILED...couldn't find {}", self.run.log_path.display()),
            v => v.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegressionSummary {
    pub passed: u64,
    pub failed: u64,
    pub missing: u64,
    /// Jobs that exited non-zero, timed out, or never started. Does not affect verdicts.
    pub job_failures: u64,
    pub issues: u64,
}

impl RegressionSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut out = RegressionSummary::default();
        for r in results {
            match r.verdict {
                Verdict::Passed => out.passed += 1,
                Verdict::FailedWithIssues { count } => {
                    out.failed += 1;
                    out.issues += count;
                }
                Verdict::Missing => out.missing += 1,
            }
            let compile_failed = r.run.compile.as_ref().is_some_and(|c| !c.success());
            if compile_failed || !r.run.simulate.success() {
                out.job_failures += 1;
            }
        }
        out
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.missing == 0
    }
}

/// Runs the jobs of one test: optional clean, optional compile, then simulate.
///
/// Job failures are recorded in the returned run; only harness failures are errors.
pub fn execute_test(
    ctx: &RunContext<'_>,
    cfg: RunConfig,
    progress: &mut dyn Write,
) -> Result<TestRun> {
    validate_test_id(&cfg.test)?;
    let test = cfg.test.clone();
    tracing::debug!("{test}: {:?}", TestState::Pending);

    let clean = if cfg.clean {
        let report = clean_byproducts(ctx.work_dir, &ctx.toolchain.sim_root);
        for name in &report.removed {
            writeln!(progress, "Removed {name}")?;
        }
        Some(report)
    } else {
        None
    };

    let plan = plan_commands(ctx.toolchain, &cfg);
    let run_dir = ctx.work_dir.join(&plan.run_dir);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("create run dir: {}", run_dir.display()))?;

    let compile = match &plan.compile {
        Some(cmd) => {
            tracing::debug!("{test}: {:?}", TestState::Compiling);
            let spec = JobSpec::shell(format!("{test}:compile"), &cmd.command, ctx.work_dir)
                .with_timeout(ctx.timeout());
            Some(launch(ctx, &spec, progress)?)
        }
        None => None,
    };
    if let Some(out) = compile.as_ref().filter(|c| !c.success()) {
        tracing::warn!(
            "{test}: compile exited with status {} (timed_out={})",
            out.exit_status,
            out.timed_out
        );
    }

    tracing::debug!("{test}: {:?}", TestState::Simulating);
    let spec = JobSpec::shell(format!("{test}:sim"), &plan.simulate.command, ctx.work_dir)
        .with_timeout(ctx.timeout());
    let simulate = launch(ctx, &spec, progress)?;

    let log_path = ctx.work_dir.join(&plan.log_path);
    let fallback_path = if log_path.is_file() {
        tracing::debug!("{test}: {:?}", TestState::LogWritten);
        None
    } else {
        let path = run_dir.join(format!("{test}.stdout"));
        std::fs::write(&path, &simulate.output)
            .with_context(|| format!("write fallback output: {}", path.display()))?;
        tracing::warn!(
            "{test}: no log at {}, captured output saved to {}",
            log_path.display(),
            path.display()
        );
        Some(path)
    };

    Ok(TestRun {
        config: cfg,
        plan,
        clean,
        compile,
        simulate,
        log_path,
        fallback_path,
    })
}

fn launch(ctx: &RunContext<'_>, spec: &JobSpec, progress: &mut dyn Write) -> Result<JobOutput> {
    let shown = spec.display_command();
    if ctx.echo_commands {
        writeln!(progress, "Running cmd: {shown}")?;
        progress.flush()?;
    }
    tracing::info!("launching {}: {shown}", spec.label);
    ctx.driver
        .run_job(spec)
        .with_context(|| format!("run job {}", spec.label))
}

/// Classifies a finished run. A timed-out simulation is `Missing` whatever it logged.
pub fn classify_run(run: &TestRun) -> Result<(Verdict, TestState)> {
    let verdict = if run.simulate.timed_out {
        Verdict::Missing
    } else {
        classify_log(&run.log_path)?
    };
    let state = match verdict {
        Verdict::Missing => TestState::Missing,
        _ => TestState::Classified,
    };
    tracing::debug!("{}: {state:?} ({verdict:?})", run.config.test);
    Ok((verdict, state))
}

pub fn run_single(
    ctx: &RunContext<'_>,
    cfg: RunConfig,
    progress: &mut dyn Write,
) -> Result<TestResult> {
    let started = Instant::now();
    let test = cfg.test.clone();
    let run = execute_test(ctx, cfg, progress)?;
    let (verdict, state) = classify_run(&run)?;
    Ok(TestResult {
        test,
        verdict,
        state,
        run,
        duration: started.elapsed(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct RegressionPlan {
    pub tests: Vec<String>,
    /// `KEY=VALUE` tokens applied to every test. `TEST` and `COMPILE` are decided per test.
    pub overrides: Vec<String>,
}

/// Per-test configs in run order. Only the first test compiles (and may clean); the rest
/// reuse its compiled artifact.
pub fn regression_configs(plan: &RegressionPlan) -> Vec<RunConfig> {
    let base = RunConfig::resolve(&plan.overrides);
    if base.gui {
        tracing::warn!("GUI is ignored during regressions");
    }
    plan.tests
        .iter()
        .enumerate()
        .map(|(idx, test)| {
            let first = idx == 0;
            RunConfig {
                test: test.clone(),
                compile: first,
                clean: base.clean && first,
                gui: false,
                ..base.clone()
            }
        })
        .collect()
}

/// Runs every test in order, one at a time, after wiping the aggregate sim directory.
pub fn run_regression(
    ctx: &RunContext<'_>,
    plan: &RegressionPlan,
    progress: &mut dyn Write,
) -> Result<Vec<TestResult>> {
    let sim_root = ctx.work_dir.join(&ctx.toolchain.sim_root);
    if remove_dir_all_if_exists(&sim_root)
        .with_context(|| format!("remove sim dir: {}", sim_root.display()))?
    {
        tracing::info!("removed {}", sim_root.display());
    }

    let mut out = Vec::with_capacity(plan.tests.len());
    for cfg in regression_configs(plan) {
        let shown = progress_tokens(&cfg);
        write!(progress, "Running: {shown}...")?;
        progress.flush()?;

        let result = run_single(ctx, cfg, progress)?;
        writeln!(progress, "{}", result.verdict_line())?;
        out.push(result);
    }
    Ok(out)
}

fn progress_tokens(cfg: &RunConfig) -> String {
    cfg.to_tokens().join(" ")
}
