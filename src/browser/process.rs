//! Bounded execution of the Node.js helper scripts.
//!
//! Every helper owns its own browser. The child is spawned with
//! `kill_on_drop`, so dropping the owning future (a client disconnect, a
//! cancelled CLI run) reaps the process. Helpers whose browser runs detached
//! announce it on stderr as `{"event":"browser","pid":N}`; that pid is killed
//! whenever the helper does not get to close the browser itself.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Time a helper gets to shut its browser down after SIGTERM.
pub(crate) const TERMINATE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub(crate) struct HelperOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl HelperOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug)]
pub(crate) enum HelperFailure {
    Spawn(io::Error),
    Wait(io::Error),
    TimedOut(Duration),
}

/// Runs `cmd` to completion, capturing both streams. Once `process_timeout`
/// elapses the helper is asked to stop, killed after [`TERMINATE_GRACE`], and
/// any browser it announced is killed as well.
pub(crate) async fn run_helper(
    mut cmd: Command,
    process_timeout: Duration,
) -> Result<HelperOutput, HelperFailure> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(HelperFailure::Spawn)?;
    let reaper = BrowserReaper::default();

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_pipe {
            let _ = out.read_to_end(&mut buf).await;
        }
        buf
    });

    let browser_pid = reaper.slot();
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(err) = stderr_pipe {
            let mut reader = BufReader::new(err);
            loop {
                let line_start = buf.len();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if let Some(pid) = parse_browser_pid(&buf[line_start..]) {
                            debug!(pid, "helper announced its browser");
                            record(&browser_pid, pid);
                        }
                    }
                }
            }
        }
        buf
    });

    let status = match timeout(process_timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            reaper.reap().await;
            return Err(HelperFailure::Wait(err));
        }
        Err(_) => {
            terminate(&mut child).await;
            reaper.reap().await;
            debug!(
                timeout_ms = process_timeout.as_millis() as u64,
                "helper process stopped after timeout"
            );
            return Err(HelperFailure::TimedOut(process_timeout));
        }
    };

    // A helper killed by a signal never reached its `finally`; its browser
    // may also still hold the output pipes open.
    let killed = status.code().is_none();
    if killed {
        reaper.reap().await;
    }

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if killed {
        reaper.reap().await;
    } else {
        reaper.disarm();
    }

    Ok(HelperOutput {
        status,
        stdout,
        stderr,
        elapsed: start.elapsed(),
    })
}

/// SIGTERM first so the helper can close its browser, SIGKILL after the
/// grace period.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = quiet(signal_command(pid, false)).status().await;
        if let Ok(Ok(_)) = timeout(TERMINATE_GRACE, child.wait()).await {
            return;
        }
    }
    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[derive(Debug, Deserialize)]
struct BrowserAnnouncement {
    event: String,
    pid: u32,
}

fn parse_browser_pid(line: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if !text.starts_with('{') {
        return None;
    }
    serde_json::from_str::<BrowserAnnouncement>(text)
        .ok()
        .filter(|announcement| announcement.event == "browser")
        .map(|announcement| announcement.pid)
}

type PidSlot = Arc<Mutex<Option<u32>>>;

fn record(slot: &PidSlot, pid: u32) {
    *slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(pid);
}

/// Owns the pid of a helper's browser until the helper is known to have
/// closed it. Dropping an armed reaper kills the browser.
#[derive(Debug, Default)]
struct BrowserReaper {
    pid: PidSlot,
}

impl BrowserReaper {
    fn slot(&self) -> PidSlot {
        Arc::clone(&self.pid)
    }

    fn take(&self) -> Option<u32> {
        self.pid
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn disarm(&self) {
        self.take();
    }

    async fn reap(&self) {
        if let Some(pid) = self.take() {
            match quiet(signal_command(pid, true)).status().await {
                Ok(_) => debug!(pid, "killed helper browser"),
                Err(err) => warn!(pid, error = %err, "failed to kill helper browser"),
            }
        }
    }
}

impl Drop for BrowserReaper {
    fn drop(&mut self) {
        let Some(pid) = self.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let mut cmd = quiet(signal_command(pid, true));
                handle.spawn(async move {
                    let _ = cmd.status().await;
                });
            }
            Err(_) => {
                let _ = std::process::Command::from(signal_command(pid, true))
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
            }
        }
        debug!(pid, "killing browser of abandoned helper");
    }
}

/// Goes through the shell builtin; a standalone `kill` binary is not
/// guaranteed to exist.
#[cfg(unix)]
fn signal_command(pid: u32, force: bool) -> std::process::Command {
    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c")
        .arg(if force {
            r#"kill -s KILL "$1""#
        } else {
            r#"kill -s TERM "$1""#
        })
        .arg("sh")
        .arg(pid.to_string());
    cmd
}

#[cfg(windows)]
fn signal_command(pid: u32, force: bool) -> std::process::Command {
    let mut cmd = std::process::Command::new("taskkill");
    cmd.arg("/PID").arg(pid.to_string()).arg("/T");
    if force {
        cmd.arg("/F");
    }
    cmd
}

fn quiet(cmd: std::process::Command) -> Command {
    let mut cmd = Command::from(cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

/// Durations print as `800ms` or `90s`.
pub(crate) fn timed_out_message(helper: &str, limit: Duration) -> String {
    format!("{helper} helper timed out after {limit:?} and was stopped")
}

/// Helpers report failures as a JSON line on stderr, possibly after library
/// warnings. Returns the last line that parses as `T`.
pub(crate) fn last_json_line<T: DeserializeOwned>(text: &str) -> Option<T> {
    text.lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str(line).ok())
}
