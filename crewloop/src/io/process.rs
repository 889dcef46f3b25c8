//! Child processes with a wall-clock timeout and bounded output capture.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        with_notice(&self.stdout, self.stdout_truncated)
    }

    pub fn stderr_text(&self) -> String {
        with_notice(&self.stderr, self.stderr_truncated)
    }
}

fn with_notice(bytes: &[u8], truncated: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[truncated {truncated} bytes]\n"));
    }
    text
}

/// Build a [`Command`] from an argv-style slice.
pub fn command_from_argv(argv: &[String], workdir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must be non-empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(workdir);
    Ok(cmd)
}

/// How long readers may keep draining once the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Bytes read from one pipe so far.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

type Sink = Arc<Mutex<Captured>>;

/// Run `cmd` with a timeout, draining stdout/stderr on reader threads so a chatty
/// child cannot deadlock on a full pipe.
///
/// On unix the child leads its own process group, and the whole group is killed
/// once the child is gone, so processes it started cannot outlive the run or
/// hold the pipes open. Readers get [`DRAIN_GRACE`] after that; whatever they
/// captured by then is returned.
///
/// On timeout the child is killed and `timed_out` is set; that is not an error.
/// Bytes past `output_limit_bytes` are counted and discarded.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();
    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let (stdout_sink, stdout_handle) = spawn_reader(stdout, output_limit_bytes);
    let (stderr_sink, stderr_handle) = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            debug!("command still running at timeout, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };
    #[cfg(unix)]
    kill_process_group(child.id());

    let drain_deadline = Instant::now() + DRAIN_GRACE;
    let (stdout, stdout_truncated) =
        collect_reader(&stdout_sink, stdout_handle, drain_deadline).context("join stdout")?;
    let (stderr, stderr_truncated) =
        collect_reader(&stderr_sink, stderr_handle, drain_deadline).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    let elapsed = started.elapsed();
    debug!(exit_code = ?status.code(), timed_out, elapsed_ms = elapsed.as_millis() as u64, "command finished");
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        elapsed,
    })
}

/// Kill every process left in the group led by `pgid`.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let target = format!("-{pgid}");
    let result = Command::new("kill")
        .args(["-KILL", "--", &target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pgid, "killed leftover processes in group"),
        // Nothing left in the group.
        Ok(_) => {}
        Err(err) => warn!(pgid, err = %err, "failed to kill process group"),
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    limit: usize,
) -> (Sink, thread::JoinHandle<Result<()>>) {
    let sink = Sink::default();
    let thread_sink = Arc::clone(&sink);
    let handle = thread::spawn(move || read_limited(reader, limit, &thread_sink));
    (sink, handle)
}

fn collect_reader(
    sink: &Sink,
    handle: thread::JoinHandle<Result<()>>,
    deadline: Instant,
) -> Result<(Vec<u8>, usize)> {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if handle.is_finished() {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(anyhow!("output reader thread panicked")),
        }
    } else {
        warn!("output pipe still open after the child exited; keeping what was read");
    }
    let mut captured = sink
        .lock()
        .map_err(|_| anyhow!("output buffer lock poisoned"))?;
    let captured = std::mem::take(&mut *captured);
    Ok((captured.bytes, captured.truncated))
}

fn read_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer lock poisoned"))?;
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }

    Ok(())
}
