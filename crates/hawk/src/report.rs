use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use hawk_contracts::{
    HAWK_CLEAN_REPORT_SCHEMA_VERSION, HAWK_REGRESS_REPORT_SCHEMA_VERSION,
    HAWK_RUN_REPORT_SCHEMA_VERSION,
};
use hawk_runner::{
    CleanReport, CleanSkip, JobOutput, RegressionSummary, RenderedCommand, RunConfig, TestResult,
    TestState,
};
use serde::Serialize;

use crate::util::{display_path, sha256_file};

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    fn current() -> Self {
        Self {
            name: "hawk".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationInfo {
    pub argv: Vec<String>,
    pub cwd: String,
    pub work_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl InvocationInfo {
    pub fn current(work_dir: &Path) -> Self {
        Self {
            argv: std::env::args().collect(),
            cwd: std::env::current_dir()
                .map(display_path)
                .unwrap_or_else(|_| ".".to_string()),
            work_dir: display_path(work_dir),
            tests_dir: None,
            overrides: Vec::new(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    #[serde(flatten)]
    pub counts: RegressionSummary,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSection {
    pub job_name: String,
    pub command: String,
    pub ok: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub output_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
    pub output_b64: String,
}

impl JobSection {
    fn new(cmd: &RenderedCommand, out: &JobOutput) -> Self {
        let b64 = base64::engine::general_purpose::STANDARD;
        Self {
            job_name: cmd.job_name.clone(),
            command: cmd.command.clone(),
            ok: out.success(),
            exit_code: out.exit_status,
            timed_out: out.timed_out,
            output_truncated: out.output_truncated,
            spawn_error: out.spawn_error.clone(),
            output_b64: b64.encode(&out.output),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCaseReport {
    pub id: String,
    pub status: String,
    pub state: TestState,
    pub issues: u64,
    pub duration_ms: u64,
    pub config: RunConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile: Option<JobSection>,
    pub simulate: JobSection,
    pub log_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_path: Option<String>,
}

impl TestCaseReport {
    pub fn from_result(r: &TestResult) -> Result<Self> {
        let run = &r.run;
        let compile = match (&run.plan.compile, &run.compile) {
            (Some(cmd), Some(out)) => Some(JobSection::new(cmd, out)),
            _ => None,
        };
        Ok(Self {
            id: r.test.clone(),
            status: r.verdict.as_str().to_string(),
            state: r.state,
            issues: r.verdict.issue_count(),
            duration_ms: duration_ms(r.duration),
            config: run.config.clone(),
            compile,
            simulate: JobSection::new(&run.plan.simulate, &run.simulate),
            log_path: display_path(&run.log_path),
            log_sha256: sha256_file(&run.log_path)?,
            fallback_path: run.fallback_path.as_ref().map(display_path),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegressReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub invocation: InvocationInfo,
    pub summary: Summary,
    pub tests: Vec<TestCaseReport>,
}

impl RegressReport {
    pub fn new(
        invocation: InvocationInfo,
        elapsed: Duration,
        results: &[TestResult],
    ) -> Result<Self> {
        let tests = results
            .iter()
            .map(TestCaseReport::from_result)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema_version: HAWK_REGRESS_REPORT_SCHEMA_VERSION.to_string(),
            tool: ToolInfo::current(),
            invocation,
            summary: Summary {
                counts: RegressionSummary::from_results(results),
                duration_ms: duration_ms(elapsed),
            },
            tests,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub invocation: InvocationInfo,
    pub test: TestCaseReport,
}

impl RunReport {
    pub fn new(invocation: InvocationInfo, result: &TestResult) -> Result<Self> {
        Ok(Self {
            schema_version: HAWK_RUN_REPORT_SCHEMA_VERSION.to_string(),
            tool: ToolInfo::current(),
            invocation,
            test: TestCaseReport::from_result(result)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanJsonReport {
    pub schema_version: String,
    pub removed: Vec<String>,
    pub skipped: Vec<CleanSkip>,
}

impl From<CleanReport> for CleanJsonReport {
    fn from(r: CleanReport) -> Self {
        Self {
            schema_version: HAWK_CLEAN_REPORT_SCHEMA_VERSION.to_string(),
            removed: r.removed,
            skipped: r.skipped,
        }
    }
}

/// Serializes `report` with a trailing newline, writing it to `out_path` when given.
pub fn write_report_file<T: Serialize>(report: &T, out_path: Option<&Path>) -> Result<String> {
    let json = serde_json::to_string(report)? + "\n";
    if let Some(out_path) = out_path {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create report dir: {}", parent.display()))?;
        }
        std::fs::write(out_path, json.as_bytes())
            .with_context(|| format!("write report: {}", out_path.display()))?;
    }
    Ok(json)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
