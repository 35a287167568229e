use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_COMPILE_LAUNCHER: &str = "HAWK_COMPILE_LAUNCHER";
pub const ENV_SIM_LAUNCHER: &str = "HAWK_SIM_LAUNCHER";
pub const ENV_MODULES: &str = "HAWK_MODULES";
pub const ENV_COMPILER: &str = "HAWK_COMPILER";
pub const ENV_SIMULATOR: &str = "HAWK_SIMULATOR";
pub const ENV_FILE_LIST: &str = "HAWK_FILE_LIST";
pub const ENV_SIM_ROOT: &str = "HAWK_SIM_ROOT";
pub const ENV_TIMEOUT_MS: &str = "HAWK_TIMEOUT_MS";

pub const DEFAULT_COMPILE_LAUNCHER: &str = "qrsh -q verilog -l lic_cmp_vcs=1";
pub const DEFAULT_SIM_LAUNCHER: &str = "qrsh -q verilog -l lic_sim_vcs=1";
pub const DEFAULT_MODULES: &[&str] = &[
    "synopsys-vcs_mx/K-2015.09-SP1",
    "synopsys-verdi/K-2015.09-SP1",
];
pub const DEFAULT_COMPILER: &str = "vcs";
pub const DEFAULT_SIMULATOR: &str = "simv";
pub const DEFAULT_FILE_LIST: &str = "vcs.flist";
pub const DEFAULT_SIM_ROOT: &str = "sim";
pub const DEFAULT_TESTS_DIR: &str = "tests";
pub const DEFAULT_BASE_TEST: &str = "base_test";

/// Describes the external compile/simulate tools shared by every test of an invocation.
///
/// An empty launcher runs the rendered script locally instead of submitting it to the
/// job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub compile_launcher: String,
    pub sim_launcher: String,
    pub modules: Vec<String>,
    pub compiler: String,
    pub simulator: String,
    pub file_list: String,
    pub sim_root: PathBuf,
    pub tests_dir: PathBuf,
    pub base_test: String,
    pub timeout_ms: Option<u64>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compile_launcher: DEFAULT_COMPILE_LAUNCHER.to_string(),
            sim_launcher: DEFAULT_SIM_LAUNCHER.to_string(),
            modules: DEFAULT_MODULES.iter().map(|m| m.to_string()).collect(),
            compiler: DEFAULT_COMPILER.to_string(),
            simulator: DEFAULT_SIMULATOR.to_string(),
            file_list: DEFAULT_FILE_LIST.to_string(),
            sim_root: PathBuf::from(DEFAULT_SIM_ROOT),
            tests_dir: PathBuf::from(DEFAULT_TESTS_DIR),
            base_test: DEFAULT_BASE_TEST.to_string(),
            timeout_ms: None,
        }
    }
}

impl ToolchainConfig {
    /// Defaults, then `<work_dir>/hawk.json` if present, then `HAWK_*` environment variables.
    pub fn load(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(hawk_contracts::HAWK_TOOLCHAIN_CONFIG_FILE);
        let base = if path.is_file() {
            tracing::debug!("loading toolchain config: {}", path.display());
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        base.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read toolchain config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse toolchain config JSON: {}", path.display()))
    }

    /// Applies `HAWK_*` overrides looked up through `get`, so tests can supply a fake
    /// environment.
    pub fn with_env_overrides<F>(mut self, get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get(ENV_COMPILE_LAUNCHER) {
            self.compile_launcher = v.trim().to_string();
        }
        if let Some(v) = get(ENV_SIM_LAUNCHER) {
            self.sim_launcher = v.trim().to_string();
        }
        if let Some(v) = get(ENV_MODULES) {
            self.modules = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get(ENV_COMPILER) {
            self.compiler = v;
        }
        if let Some(v) = get(ENV_SIMULATOR) {
            self.simulator = v;
        }
        if let Some(v) = get(ENV_FILE_LIST) {
            self.file_list = v;
        }
        if let Some(v) = get(ENV_SIM_ROOT) {
            self.sim_root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_TIMEOUT_MS) {
            let v = v.trim();
            self.timeout_ms = if v.is_empty() {
                None
            } else {
                Some(
                    v.parse()
                        .with_context(|| format!("invalid {ENV_TIMEOUT_MS}={v:?}"))?,
                )
            };
        }
        Ok(self)
    }

    /// Per-test working directory: `<sim_root>/<test>`.
    pub fn run_dir(&self, test: &str) -> PathBuf {
        self.sim_root.join(test)
    }
}
