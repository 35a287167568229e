use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Exit status reported when the job could not be started at all.
pub const SPAWN_FAILURE_EXIT_STATUS: i32 = 127;

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub label: String,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
    pub max_output_bytes: usize,
}

impl JobSpec {
    /// A rendered command line, run through `sh -c`.
    pub fn shell(label: impl Into<String>, command: &str, cwd: &Path) -> Self {
        Self {
            label: label.into(),
            argv: vec!["sh".to_string(), "-c".to_string(), command.to_string()],
            cwd: cwd.to_path_buf(),
            timeout: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command text as a user would type it (the `sh -c` payload for shell jobs).
    pub fn display_command(&self) -> String {
        match self.argv.as_slice() {
            [sh, flag, script] if sh == "sh" && flag == "-c" => script.clone(),
            argv => argv.join(" "),
        }
    }
}

/// Outcome of one external job. Combined stdout+stderr lives in `output`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobOutput {
    pub exit_status: i32,
    pub timed_out: bool,
    #[serde(skip)]
    pub output: Vec<u8>,
    pub output_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
}

impl JobOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0 && !self.timed_out && self.spawn_error.is_none()
    }

    fn spawn_failed(err: &std::io::Error) -> Self {
        Self {
            exit_status: SPAWN_FAILURE_EXIT_STATUS,
            spawn_error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Launches a job and blocks until it exits.
///
/// A non-zero exit is an `Ok` outcome; `Err` is reserved for failures of the harness
/// itself (pipes, waiting).
pub trait JobDriver {
    fn run_job(&self, spec: &JobSpec) -> Result<JobOutput>;
}

impl<D: JobDriver + ?Sized> JobDriver for &D {
    fn run_job(&self, spec: &JobSpec) -> Result<JobOutput> {
        (**self).run_job(spec)
    }
}

/// Runs jobs as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellDriver;

impl JobDriver for ShellDriver {
    fn run_job(&self, spec: &JobSpec) -> Result<JobOutput> {
        run_process_job(spec)
    }
}

pub fn run_process_job(spec: &JobSpec) -> Result<JobOutput> {
    let (program, args) = spec
        .argv
        .split_first()
        .with_context(|| format!("job {}: empty argv", spec.label))?;

    let (reader, writer) = std::io::pipe().context("create output pipe")?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.current_dir(&spec.cwd);
    cmd.stdin(Stdio::null());
    cmd.stdout(writer.try_clone().context("clone output pipe")?);
    cmd.stderr(writer);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 && libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let spawned = cmd.spawn();
    // The command keeps the write ends open until dropped; the reader would never see EOF.
    drop(cmd);
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!("job {}: spawn {program:?} failed: {err}", spec.label);
            return Ok(JobOutput::spawn_failed(&err));
        }
    };
    tracing::debug!("job {}: spawned pid {}", spec.label, child.id());

    let cap = spec.max_output_bytes;
    let reader_thread =
        std::thread::spawn(move || -> std::io::Result<(Vec<u8>, bool)> {
            read_to_end_capped(reader, cap)
        });

    let (status, timed_out) = match spec.timeout {
        Some(timeout) => wait_child_with_timeout(&mut child, timeout)?,
        None => (child.wait().context("wait child")?, false),
    };
    if timed_out {
        tracing::warn!(
            "job {}: timed out after {} ms, killed",
            spec.label,
            spec.timeout.unwrap_or_default().as_millis()
        );
    }

    let (output, output_truncated) = reader_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))
        .with_context(|| format!("job {}: read output", spec.label))?;

    let exit_status = exit_status_code(&status);
    tracing::debug!(
        "job {}: exit status {exit_status}, {} output bytes",
        spec.label,
        output.len()
    );

    Ok(JobOutput {
        exit_status,
        timed_out,
        output,
        output_truncated,
        spawn_error: None,
    })
}

fn wait_child_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<(std::process::ExitStatus, bool)> {
    let deadline = Instant::now().checked_add(timeout.max(Duration::from_millis(1)));

    loop {
        if let Some(status) = child.try_wait().context("try_wait child")? {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            hard_kill_pid_and_group(child.id());
            let _ = child.kill();
            let status = child.wait().context("wait child after kill")?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn exit_status_code(status: &std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    match status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    }
}

pub fn hard_kill_pid_and_group(pid: u32) {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return;
        };
        unsafe {
            let _ = libc::kill(-pid, libc::SIGKILL);
            let _ = libc::kill(pid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Reads until EOF, keeping at most `cap` bytes. The rest is drained so the writer
/// never blocks on a full pipe.
pub fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }

        if truncated {
            continue;
        }

        let remaining = cap.saturating_sub(buf.len());
        if n <= remaining {
            buf.extend_from_slice(&tmp[..n]);
        } else {
            buf.extend_from_slice(&tmp[..remaining]);
            truncated = true;
        }
    }

    Ok((buf, truncated))
}
