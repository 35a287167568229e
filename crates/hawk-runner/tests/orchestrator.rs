use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use hawk_runner::{
    run_regression, run_single, JobDriver, JobOutput, JobSpec, RegressionPlan,
    RegressionSummary, RunConfig, RunContext, TestState, ToolchainConfig, Verdict,
};

const PASS_LOG: &str = "\
UVM_INFO @ 0: reporter [RNTST] Running test\n\
--- UVM Report Summary ---\n\
UVM_INFO :    4\n\
UVM_WARNING :    0\n\
UVM_ERROR :    0\n\
UVM_FATAL :    0\n";

const FAIL_LOG: &str = "\
UVM_ERROR top.sv(12) @ 10: bad thing\n\
--- UVM Report Summary ---\n\
UVM_WARNING :    2\n\
UVM_ERROR :    3\n\
UVM_FATAL :    0\n";

/// Records every job and plays the simulator: writes `logs[test]` to the run dir unless the
/// test has no entry, in which case it only prints to its output stream.
struct FakeDriver {
    logs: BTreeMap<String, &'static str>,
    jobs: RefCell<Vec<JobSpec>>,
    sim_root_seen_empty: RefCell<Vec<bool>>,
}

impl FakeDriver {
    fn new(logs: &[(&str, &'static str)]) -> Self {
        Self {
            logs: logs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            jobs: RefCell::new(Vec::new()),
            sim_root_seen_empty: RefCell::new(Vec::new()),
        }
    }

    fn labels(&self) -> Vec<String> {
        self.jobs.borrow().iter().map(|j| j.label.clone()).collect()
    }
}

impl JobDriver for FakeDriver {
    fn run_job(&self, spec: &JobSpec) -> Result<JobOutput> {
        self.jobs.borrow_mut().push(spec.clone());
        let stale = spec.cwd.join("sim/stale");
        self.sim_root_seen_empty.borrow_mut().push(!stale.exists());

        let Some(test) = spec.label.strip_suffix(":sim") else {
            return Ok(JobOutput {
                output: b"compiled\n".to_vec(),
                ..JobOutput::default()
            });
        };
        match self.logs.get(test) {
            Some(log) => {
                std::fs::write(spec.cwd.join("sim").join(test).join("logfile"), log)?;
                Ok(JobOutput::default())
            }
            None => Ok(JobOutput {
                exit_status: 139,
                output: format!("{test}: simulator crashed\n").into_bytes(),
                ..JobOutput::default()
            }),
        }
    }
}

fn local_toolchain() -> ToolchainConfig {
    ToolchainConfig {
        compile_launcher: String::new(),
        sim_launcher: String::new(),
        modules: Vec::new(),
        ..ToolchainConfig::default()
    }
}

fn context<'a>(
    work_dir: &'a Path,
    toolchain: &'a ToolchainConfig,
    driver: &'a FakeDriver,
) -> RunContext<'a> {
    RunContext {
        work_dir,
        toolchain,
        driver,
        echo_commands: false,
    }
}

#[test]
fn first_test_compiles_rest_reuse_and_sim_dir_is_wiped_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sim/stale")).unwrap();
    let toolchain = local_toolchain();
    let driver = FakeDriver::new(&[("a", PASS_LOG), ("b", FAIL_LOG), ("c", PASS_LOG)]);
    let ctx = context(dir.path(), &toolchain, &driver);

    let plan = RegressionPlan {
        tests: vec!["a".into(), "b".into(), "c".into()],
        overrides: Vec::new(),
    };
    let mut progress = Vec::new();
    let results = run_regression(&ctx, &plan, &mut progress).unwrap();

    assert_eq!(driver.labels(), vec!["a:compile", "a:sim", "b:sim", "c:sim"]);
    assert_eq!(*driver.sim_root_seen_empty.borrow(), vec![true; 4]);
    // Logs of earlier tests survive later ones: the wipe happened only once.
    for t in ["a", "b", "c"] {
        assert!(dir.path().join("sim").join(t).join("logfile").is_file());
    }

    let jobs = driver.jobs.borrow();
    assert!(jobs[0].display_command().starts_with("vcs -CFLAGS '-DVCS' -full64"));
    assert_eq!(
        jobs[2].display_command(),
        "simv -l sim/b/logfile +UVM_TESTNAME=b_test_c +UVM_NO_RELNOTES"
    );

    assert!(results[0].run.config.compile);
    assert!(!results[1].run.config.compile);
    assert!(!results[2].run.config.compile);
    assert!(results[0].run.compile.is_some());
    assert!(results[1].run.compile.is_none());

    let verdicts: Vec<Verdict> = results.iter().map(|r| r.verdict).collect();
    assert_eq!(
        verdicts,
        vec![
            Verdict::Passed,
            Verdict::FailedWithIssues { count: 5 },
            Verdict::Passed
        ]
    );

    let text = String::from_utf8(progress).unwrap();
    assert_eq!(
        text,
        "Running: TEST=a...PASSED\n\
         Running: TEST=b COMPILE=0...FAILED with 5 issues.\n\
         Running: TEST=c COMPILE=0...PASSED\n"
    );

    let summary = RegressionSummary::from_results(&results);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.issues, 5);
    assert_eq!(summary.job_failures, 0);
    assert!(!summary.all_passed());
}

#[test]
fn missing_log_writes_fallback_and_reports_missing() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = local_toolchain();
    let driver = FakeDriver::new(&[("ok", PASS_LOG)]);
    let ctx = context(dir.path(), &toolchain, &driver);

    let plan = RegressionPlan {
        tests: vec!["crash".into(), "ok".into()],
        overrides: vec!["SIMARGS=+seed".into()],
    };
    let mut progress = Vec::new();
    let results = run_regression(&ctx, &plan, &mut progress).unwrap();

    let crash = &results[0];
    assert_eq!(crash.verdict, Verdict::Missing);
    assert_eq!(crash.state, TestState::Missing);
    let fallback = crash.run.fallback_path.as_ref().expect("fallback written");
    assert_eq!(fallback, &dir.path().join("sim/crash/crash.stdout"));
    assert_eq!(
        std::fs::read_to_string(fallback).unwrap(),
        "crash: simulator crashed\n"
    );

    // The second test still runs, without compiling.
    assert_eq!(results[1].verdict, Verdict::Passed);
    assert_eq!(results[1].state, TestState::Classified);
    assert!(results[1].run.fallback_path.is_none());
    assert_eq!(driver.labels(), vec!["crash:compile", "crash:sim", "ok:sim"]);

    let text = String::from_utf8(progress).unwrap();
    let first = text.lines().next().unwrap();
    assert!(
        first.starts_with("Running: TEST=crash SIMARGS=+seed...FAILED...couldn't find "),
        "{first}"
    );

    let summary = RegressionSummary::from_results(&results);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.job_failures, 1);
}

#[test]
fn format_error_stops_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = local_toolchain();
    let driver = FakeDriver::new(&[
        ("a", "--- UVM Report Summary ---\nUVM_ERROR :\n"),
        ("b", PASS_LOG),
    ]);
    let ctx = context(dir.path(), &toolchain, &driver);
    let plan = RegressionPlan {
        tests: vec!["a".into(), "b".into()],
        overrides: Vec::new(),
    };
    let err = run_regression(&ctx, &plan, &mut Vec::new()).unwrap_err();
    assert!(format!("{err:#}").contains("malformed report summary"), "{err:#}");
    assert_eq!(driver.labels(), vec!["a:compile", "a:sim"]);
}

#[test]
fn single_run_echoes_commands_and_cleans_first() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ucli.key"), b"").unwrap();
    let toolchain = local_toolchain();
    let driver = FakeDriver::new(&[("smoke", PASS_LOG)]);
    let ctx = RunContext {
        echo_commands: true,
        ..context(dir.path(), &toolchain, &driver)
    };

    let cfg = RunConfig::resolve(["TEST=smoke", "CLEAN=1", "COMPILE=0", "FSDB=1"]);
    let mut progress = Vec::new();
    let result = run_single(&ctx, cfg, &mut progress).unwrap();

    assert_eq!(result.verdict, Verdict::Passed);
    assert!(!dir.path().join("ucli.key").exists());
    assert_eq!(
        result.run.clean.as_ref().map(|c| c.removed.clone()),
        Some(vec!["ucli.key".to_string()])
    );
    let text = String::from_utf8(progress).unwrap();
    assert_eq!(
        text,
        "Removed ucli.key\n\
         Running cmd: simv -l sim/smoke/logfile +UVM_TESTNAME=smoke_test_c +UVM_NO_RELNOTES \
         +fsdb_trace=1 +fsdb_outfile=sim/smoke/waves.fsdb\n"
    );
}

#[test]
fn invalid_test_id_is_rejected_before_any_job() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = local_toolchain();
    let driver = FakeDriver::new(&[]);
    let ctx = context(dir.path(), &toolchain, &driver);
    let cfg = RunConfig::resolve(["TEST=a;rm"]);
    assert!(run_single(&ctx, cfg, &mut Vec::new()).is_err());
    assert!(driver.labels().is_empty());
    assert!(!dir.path().join("sim").exists());
}
