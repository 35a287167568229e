//! Rendering of the external compile and simulate commands.
//!
//! Rendering is pure: the same inputs always produce byte-identical strings.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::RunConfig;
use crate::toolchain::ToolchainConfig;

pub const LOGFILE_NAME: &str = "logfile";
pub const WAVES_FILE_NAME: &str = "waves.fsdb";
pub const TEST_ENTRY_SUFFIX: &str = "_test_c";
pub const COMPILE_JOB_NAME: &str = "compile";

const COMPILE_FLAGS: &[&str] = &[
    "-CFLAGS",
    "'-DVCS'",
    "-full64",
    "-o",
    "simv",
    "-kdb",
    "-lca",
    "-debug_all",
    "-f",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedCommand {
    /// Job name passed to the launcher (`compile`, `sim_<test>`).
    pub job_name: String,
    /// The full shell command line.
    pub command: String,
}

/// Both phases of one test, rendered ahead of launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandPlan {
    pub compile: Option<RenderedCommand>,
    pub simulate: RenderedCommand,
    pub run_dir: PathBuf,
    pub log_path: PathBuf,
}

pub fn plan_commands(toolchain: &ToolchainConfig, cfg: &RunConfig) -> CommandPlan {
    let run_dir = toolchain.run_dir(&cfg.test);
    CommandPlan {
        compile: cfg.compile.then(|| compile_command(toolchain)),
        simulate: simulate_command(toolchain, cfg),
        log_path: run_dir.join(LOGFILE_NAME),
        run_dir,
    }
}

/// The compile step is identical for every test; the run config only gates it.
pub fn compile_command(toolchain: &ToolchainConfig) -> RenderedCommand {
    let mut script = module_prelude(&toolchain.modules);
    script.push_str(&toolchain.compiler);
    for flag in COMPILE_FLAGS {
        script.push(' ');
        script.push_str(flag);
    }
    script.push(' ');
    script.push_str(&toolchain.file_list);

    wrap_for_launcher(&toolchain.compile_launcher, COMPILE_JOB_NAME, script)
}

pub fn simulate_command(toolchain: &ToolchainConfig, cfg: &RunConfig) -> RenderedCommand {
    let run_dir = toolchain.run_dir(&cfg.test);
    let run_dir = run_dir.display();

    let mut parts: Vec<String> = vec![
        toolchain.simulator.clone(),
        "-l".to_string(),
        format!("{run_dir}/{LOGFILE_NAME}"),
        format!("+UVM_TESTNAME={}{TEST_ENTRY_SUFFIX}", cfg.test),
    ];
    let simargs = cfg.simargs.trim();
    if !simargs.is_empty() {
        parts.push(simargs.to_string());
    }
    if cfg.fsdb {
        parts.push("+fsdb_trace=1".to_string());
        parts.push(format!("+fsdb_outfile={run_dir}/{WAVES_FILE_NAME}"));
    }
    if cfg.dbg != 0 {
        parts.push(format!("+UVM_VERBOSITY={}", cfg.dbg));
    }
    if cfg.gui {
        parts.push("-verdi".to_string());
    }

    let mut script = module_prelude(&toolchain.modules);
    script.push_str(&parts.join(" "));

    wrap_for_launcher(&toolchain.sim_launcher, &sim_job_name(&cfg.test), script)
}

pub fn sim_job_name(test: &str) -> String {
    format!("sim_{test}")
}

fn module_prelude(modules: &[String]) -> String {
    let mut out = String::new();
    for m in modules {
        out.push_str("module load ");
        out.push_str(m);
        out.push_str("; ");
    }
    out
}

fn wrap_for_launcher(launcher: &str, job_name: &str, script: String) -> RenderedCommand {
    let launcher = launcher.trim();
    let command = if launcher.is_empty() {
        script
    } else {
        format!("{launcher} -N {job_name} \"{}\"", escape_double_quoted(&script))
    };
    RenderedCommand {
        job_name: job_name.to_string(),
        command,
    }
}

fn escape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
