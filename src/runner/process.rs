//! Spawning one agent process and collecting its output.
//!
//! The child runs in its own process group (Unix) so timeout and cancellation
//! can take down anything it spawned. Termination sends SIGTERM to the group,
//! waits a short grace period, then SIGKILLs the group, so a child that
//! ignores SIGTERM still dies within the grace period.
//!
//! Both streams are read on helper threads into buffers capped at
//! `max_output_bytes`; bytes past the cap are drained and discarded so the
//! child never blocks on a full pipe.

use super::cancel::CancelToken;
use super::command::CommandSpec;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How often the wait loop checks exit status, cancellation and the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 8 * 1024;

/// Captured result of a process that ran to completion.
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

/// Why a process did not produce a [`ProcessOutput`].
#[derive(Debug)]
pub enum ProcessError {
    /// Spawn failed (not found, permission denied, ...).
    Launch(io::Error),
    /// Polling the child failed after it started.
    Wait(io::Error),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Captured = (Stream, Vec<u8>, bool);

/// Run `spec` to completion, timeout or cancellation.
pub fn run(
    spec: &CommandSpec,
    env: &BTreeMap<String, String>,
    working_dir: Option<&Path>,
    timeout: Duration,
    max_output_bytes: usize,
    cancel: &CancelToken,
) -> Result<ProcessOutput, ProcessError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(ProcessError::Launch)?;
    debug!(pid = child.id(), program = %spec.program, "spawned agent process");

    if let (Some(mut stdin), Some(input)) = (child.stdin.take(), spec.stdin.clone()) {
        thread::spawn(move || {
            // The agent may exit without reading its input
            if let Err(e) = stdin.write_all(input.as_bytes())
                && e.kind() != io::ErrorKind::BrokenPipe
            {
                debug!(error = %e, "failed to write prompt to agent stdin");
            }
        });
    }

    let (tx, rx) = mpsc::channel::<Captured>();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            let (bytes, truncated) = read_capped(stdout, max_output_bytes);
            let _ = tx.send((Stream::Stdout, bytes, truncated));
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || {
            let (bytes, truncated) = read_capped(stderr, max_output_bytes);
            let _ = tx.send((Stream::Stderr, bytes, truncated));
        });
    }
    drop(tx);

    let (status, stdout, stderr) = wait(&mut child, &rx, start, timeout, cancel)?;

    Ok(ProcessOutput {
        stdout: stdout.0,
        stdout_truncated: stdout.1,
        stderr: stderr.0,
        stderr_truncated: stderr.1,
        exit_code: status.code(),
        duration: start.elapsed(),
    })
}

/// Wait until the child has exited and both streams are closed.
///
/// A stream still open after exit (a grandchild holding the pipe) keeps the
/// call alive until the same deadline.
fn wait(
    child: &mut Child,
    rx: &Receiver<Captured>,
    start: Instant,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<(ExitStatus, (Vec<u8>, bool), (Vec<u8>, bool)), ProcessError> {
    let mut status = None;
    let mut stdout = None;
    let mut stderr = None;
    let mut open_streams = 2;

    loop {
        if status.is_none() {
            match child.try_wait() {
                Ok(Some(exit)) => status = Some(exit),
                Ok(None) => {}
                Err(e) => {
                    terminate(child);
                    return Err(ProcessError::Wait(e));
                }
            }
        }

        if let Some(exit) = status
            && open_streams == 0
        {
            return Ok((
                exit,
                stdout.unwrap_or_default(),
                stderr.unwrap_or_default(),
            ));
        }

        if cancel.is_cancelled() {
            terminate(child);
            return Err(ProcessError::Cancelled);
        }
        if start.elapsed() >= timeout {
            terminate(child);
            return Err(ProcessError::TimedOut);
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((Stream::Stdout, bytes, truncated)) => {
                stdout = Some((bytes, truncated));
                open_streams -= 1;
            }
            Ok((Stream::Stderr, bytes, truncated)) => {
                stderr = Some((bytes, truncated));
                open_streams -= 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Every reader has reported or was never started
            Err(RecvTimeoutError::Disconnected) => {
                open_streams = 0;
                if status.is_none() {
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

/// Stop the child and everything in its process group.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Ok(raw) = i32::try_from(child.id()) {
            let group = Pid::from_raw(raw);
            let _ = killpg(group, Signal::SIGTERM);

            let deadline = Instant::now() + KILL_GRACE;
            while Instant::now() < deadline {
                if let Ok(Some(_)) = child.try_wait() {
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }

            // Descendants may outlive the leader; take the whole group down
            let _ = killpg(group, Signal::SIGKILL);
        }
    }

    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
    let _ = child.kill();
    let _ = child.wait();
}

/// Read to EOF, keeping at most `cap` bytes. Returns the bytes and whether
/// anything was discarded.
fn read_capped<R: Read>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(buf.len());
                if n > room {
                    buf.extend_from_slice(&chunk[..room]);
                    truncated = true;
                } else {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    (buf, truncated)
}
