//! Device log capture tied to group membership.
//!
//! While the device is in a group, a log-tailing process runs in its own
//! process group and every stdout line is published to the group channel.
//! Leaving the group (or an explicit stop) kills the whole process group and
//! reaps the child. If the process exits on its own it is reaped and
//! forgotten; capture is best-effort and never escalates.

use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LogCaptureConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::facts::{Destination, Fact, LogEntryFact};
use crate::ports::{FactSink, GroupEvent, GroupResolver};

/// Device data attached to a capture start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceContext {
    pub bundle_name: String,
}

struct CaptureProcess {
    child: Child,
    pid: u32,
}

#[derive(Default)]
struct LogSession {
    channel: String,
    process: Option<CaptureProcess>,
    /// Bumped by every start and stop; readers and in-flight starts holding
    /// an older value must not touch the slot.
    generation: u64,
}

struct Inner {
    serial: String,
    config: LogCaptureConfig,
    facts: Arc<dyn FactSink>,
    groups: Arc<dyn GroupResolver>,
    state: Mutex<LogSession>,
}

/// Cheap to clone; clones share the same capture session.
#[derive(Clone)]
pub struct LogCaptureManager {
    inner: Arc<Inner>,
}

impl LogCaptureManager {
    pub fn new(
        serial: impl Into<String>,
        config: LogCaptureConfig,
        facts: Arc<dyn FactSink>,
        groups: Arc<dyn GroupResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                serial: serial.into(),
                config,
                facts,
                groups,
                state: Mutex::new(LogSession::default()),
            }),
        }
    }

    pub fn channel(&self) -> String {
        self.inner.state.lock().channel.clone()
    }

    pub fn set_channel(&self, channel: impl Into<String>) {
        self.inner.state.lock().channel = channel.into();
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().process.is_some()
    }

    /// Pid of the running capture process.
    pub fn pid(&self) -> Option<u32> {
        self.inner.state.lock().process.as_ref().map(|p| p.pid)
    }

    /// Remember `channel`; with device context, (re)start capture for the current group.
    ///
    /// A `stop` or a newer `start` issued while this one is in flight wins;
    /// the process spawned here is then killed instead of installed.
    pub async fn start(&self, channel: &str, context: Option<DeviceContext>) -> BridgeResult<()> {
        self.set_channel(channel);
        let Some(context) = context else {
            debug!(channel, "Log capture requested without device context");
            return Ok(());
        };
        let ticket = self.inner.claim();
        let Some(group) = self.inner.groups.current().await else {
            warn!(serial = %self.inner.serial, "Device is not in a group; not capturing logs");
            return Ok(());
        };

        let previous = {
            let mut state = self.inner.state.lock();
            if state.generation != ticket {
                debug!("Log capture start superseded while resolving group");
                return Ok(());
            }
            state.process.take()
        };
        if let Some(previous) = previous {
            info!(pid = previous.pid, "Replacing running log capture");
            terminate(previous).await;
        }

        let args = self.inner.command_args(&context)?;
        let Some((program, rest)) = args.split_first() else {
            return Err(BridgeError::Capture("empty log command".into()));
        };
        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Capture(format!("failed to spawn {program}: {e}")))?;
        let pid = child.id().unwrap_or_default();
        let Some(stdout) = child.stdout.take() else {
            terminate(CaptureProcess { child, pid }).await;
            return Err(BridgeError::Capture("log process stdout not captured".into()));
        };

        let process = CaptureProcess { child, pid };
        let stale = {
            let mut state = self.inner.state.lock();
            if state.generation == ticket {
                state.process = Some(process);
                None
            } else {
                Some(process)
            }
        };
        if let Some(process) = stale {
            debug!(pid, "Log capture stopped while starting; killing fresh process");
            terminate(process).await;
            return Ok(());
        }
        info!(pid, group = %group.group, bundle = %context.bundle_name, "Log capture started");

        tokio::spawn(forward_lines(
            self.inner.clone(),
            stdout,
            group.group,
            pid,
            ticket,
        ));
        Ok(())
    }

    /// Kill the capture process group and reap it. No-op when nothing runs.
    pub async fn stop(&self) {
        let process = {
            let taken = self.inner.take_process();
            if taken.is_some() {
                self.inner.state.lock().channel.clear();
            }
            taken
        };
        let Some(process) = process else {
            debug!("No log capture to stop");
            return;
        };
        let pid = process.pid;
        terminate(process).await;
        info!(pid, "Log capture stopped");
    }

    /// Stop capture whenever the device leaves its group.
    pub fn watch_group_events(&self, mut events: broadcast::Receiver<GroupEvent>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GroupEvent::Left) => manager.stop().await,
                    Ok(GroupEvent::Joined(group)) => debug!(group = %group.group, "Joined group"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Group event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Inner {
    fn command_args(&self, context: &DeviceContext) -> BridgeResult<Vec<String>> {
        let mut args = shlex::split(&self.config.command)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| {
                BridgeError::Capture(format!("unusable log command {:?}", self.config.command))
            })?;
        args.extend([
            "--udid".to_string(),
            self.serial.clone(),
            context.bundle_name.clone(),
        ]);
        Ok(args)
    }

    /// Invalidate every in-flight start and reader; returns the new generation.
    fn claim(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.generation
    }

    /// Bumps the generation even when nothing runs.
    fn take_process(&self) -> Option<CaptureProcess> {
        let mut state = self.state.lock();
        state.generation += 1;
        state.process.take()
    }

    /// Stdout closed. Release the process group if it still belongs to `generation`.
    async fn on_exit(&self, generation: u64) {
        let process = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.process.take()
        };
        let Some(mut process) = process else {
            return;
        };
        // Closing stdout does not mean the process or its children are gone.
        kill_group(process.pid);
        if let Err(e) = process.child.start_kill() {
            debug!(pid = process.pid, error = %e, "Log capture process already gone");
        }
        match process.child.wait().await {
            Ok(status) => warn!(pid = process.pid, %status, "Log capture process exited on its own"),
            Err(e) => warn!(pid = process.pid, error = %e, "Failed to reap log capture process"),
        }
    }
}

async fn forward_lines(
    inner: Arc<Inner>,
    stdout: ChildStdout,
    group: String,
    pid: u32,
    generation: u64,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => inner.facts.send(
                Destination::channel(group.as_str()),
                Fact::DeviceLogcatEntry(LogEntryFact::captured(&inner.serial, pid, line)),
            ),
            Ok(None) => break,
            Err(e) => {
                warn!(pid, error = %e, "Reading log capture output failed");
                break;
            }
        }
    }
    inner.on_exit(generation).await;
}

async fn terminate(mut process: CaptureProcess) {
    kill_group(process.pid);
    if let Err(e) = process.child.start_kill() {
        debug!(pid = process.pid, error = %e, "Log capture process already gone");
    }
    if let Err(e) = process.child.wait().await {
        warn!(pid = process.pid, error = %e, "Failed to reap log capture process");
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // pid 0 would address our own process group.
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    if pgid <= 0 {
        return;
    }
    // SAFETY: kill(2) only sends a signal; the group was created at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "Killing log capture process group failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
