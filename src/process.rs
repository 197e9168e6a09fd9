//! Bounded-time subprocess execution.
//!
//! Both collaborator processes (the LM command and the render host) run
//! through here so every external call carries a timeout. On unix the child
//! gets its own process group. The group is killed on timeout, and again once
//! the child exits so helpers it left behind cannot hold the output pipes.
//! Output collection is bounded by the same deadline.
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Time allowed to drain output after the child is gone, even past the deadline.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type ReaderResult = io::Result<Vec<u8>>;

/// Captured result of one bounded run.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawn `command`, feed it `stdin`, and wait at most `timeout`.
///
/// Errors only when the process cannot be spawned or waited on; a timeout is
/// reported through [`ProcessOutput::timed_out`].
pub fn run_with_timeout(
    mut command: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> io::Result<ProcessOutput> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let start = Instant::now();
    let mut child = command.spawn()?;

    // The writer is never joined: if a helper keeps stdin open without
    // reading, the write blocks until the group is killed.
    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), stdin) {
        let bytes = bytes.to_vec();
        thread::spawn(move || {
            let _ = pipe.write_all(&bytes);
        });
    }
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let deadline = start + timeout;
    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            timed_out = true;
            kill_group(&child);
            let _ = child.kill();
            break child.wait()?;
        }
        thread::sleep(POLL_INTERVAL);
    };
    // Anything still running in the group is a leftover helper.
    kill_group(&child);

    let drain_until = deadline.max(Instant::now() + DRAIN_GRACE);
    let stdout = collect(stdout, drain_until)?;
    let stderr = collect(stderr, drain_until)?;
    if stdout.is_none() || stderr.is_none() {
        tracing::warn!(
            pid = child.id(),
            "output pipes still open after the deadline; abandoning them"
        );
        timed_out = true;
    }

    Ok(ProcessOutput {
        status,
        stdout: stdout.unwrap_or_default(),
        stderr: stderr.unwrap_or_default(),
        timed_out,
        elapsed: start.elapsed(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> Receiver<ReaderResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = source.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}

/// Output of one pipe, or `None` when it was not closed before `until`.
fn collect(reader: Option<Receiver<ReaderResult>>, until: Instant) -> io::Result<Option<Vec<u8>>> {
    let Some(reader) = reader else {
        return Ok(Some(Vec::new()));
    };
    match reader.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(io::Error::other("output reader thread panicked")),
    }
}

fn kill_group(child: &Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            // SAFETY: signalling our own child's process group; no memory is touched.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn captures_output_and_stdin() {
        let output = run_with_timeout(
            sh("cat; echo done >&2"),
            Some(b"hello"),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, b"hello");
        assert_eq!(output.stderr_lossy().trim(), "done");
    }

    #[test]
    fn reports_nonzero_exit() {
        let output = run_with_timeout(sh("exit 3"), None, Duration::from_secs(10)).unwrap();
        assert!(!output.success());
        assert!(!output.timed_out);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn kills_process_group_on_timeout() {
        let output = run_with_timeout(
            sh("sleep 30 & sleep 30"),
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
        assert!(output.elapsed < Duration::from_secs(10));
    }

    #[test]
    fn background_helper_does_not_outlive_the_run() {
        let start = Instant::now();
        let output = run_with_timeout(
            sh("sleep 30 & echo hi"),
            None,
            Duration::from_millis(300),
        )
        .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2), "waited {:?}", start.elapsed());
        assert!(!output.timed_out);
        assert!(output.success());
        assert_eq!(output.stdout_lossy(), "hi\n");
    }

    #[test]
    fn helper_outside_the_group_is_abandoned_at_the_deadline() {
        // A helper in its own process group escapes the group kill and keeps
        // stdout open; collection must still stop at the deadline.
        if which::which("perl").is_err() {
            return;
        }
        let start = Instant::now();
        let output = run_with_timeout(
            sh("perl -e 'setpgrp(0, 0); sleep 30' & sleep 0.2; echo hi"),
            None,
            Duration::from_millis(300),
        )
        .unwrap();
        assert!(start.elapsed() < Duration::from_secs(3), "waited {:?}", start.elapsed());
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = run_with_timeout(
            Command::new("/nonexistent/sforge-test-binary"),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
