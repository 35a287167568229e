//! Compile-then-simulate regression harness for UVM test suites.
//!
//! Every test goes through the same pipeline: resolve a [`RunConfig`] from `KEY=VALUE`
//! tokens, render the external commands, run them through a [`JobDriver`], and classify
//! the resulting log into a [`Verdict`].

mod classify;
mod clean;
mod command;
mod config;
mod discover;
mod job_runner;
mod orchestrator;
mod toolchain;

pub use classify::{
    classify_log, classify_reader, ClassifyError, LogFormatError, Verdict, REPORT_SUMMARY_MARKER,
    SEVERITY_PREFIXES,
};
pub use clean::{
    clean_byproducts, remove_dir_all_if_exists, CleanReport, CleanSkip, BYPRODUCT_DIRS,
    BYPRODUCT_FILES,
};
pub use command::{
    compile_command, plan_commands, sim_job_name, simulate_command, CommandPlan, RenderedCommand,
    LOGFILE_NAME, TEST_ENTRY_SUFFIX, WAVES_FILE_NAME,
};
pub use config::{validate_test_id, RunConfig};
pub use discover::{discover_tests, filter_tests};
pub use job_runner::{
    hard_kill_pid_and_group, read_to_end_capped, run_process_job, JobDriver, JobOutput, JobSpec,
    ShellDriver, DEFAULT_MAX_OUTPUT_BYTES, SPAWN_FAILURE_EXIT_STATUS,
};
pub use orchestrator::{
    classify_run, execute_test, regression_configs, run_regression, run_single,
    RegressionPlan, RegressionSummary, RunContext, TestResult, TestRun, TestState,
};
pub use toolchain::{
    ToolchainConfig, ENV_COMPILER, ENV_COMPILE_LAUNCHER, ENV_FILE_LIST, ENV_MODULES,
    ENV_SIMULATOR, ENV_SIM_LAUNCHER, ENV_SIM_ROOT, ENV_TIMEOUT_MS,
};
