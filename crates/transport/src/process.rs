// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared subprocess machinery for the local and SSH transports.
//!
//! Both variants reduce to "run a command with piped stdio and speak
//! newline-delimited JSON over it"; the only difference is the argv they
//! are constructed with. The core owns three background tasks per spawn:
//! the stdout pump (decodes frames into the current cache entry), the
//! stderr drain (debug logs only), and the exit waiter (reaps the child
//! and settles state when it dies).

use crate::command::CommandSpec;
use crate::{ProcessStatus, TransportError, TransportMetrics};
use futures_util::StreamExt;
use iris_cache::{CacheEntry, TerminationReason};
use iris_core::{Clock, Frame, IrisError, SystemClock};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Soft bound on one stdout line before the splitter gives up on it.
const MAX_LINE_BYTES: usize = 5 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Best-effort interrupt byte (ASCII ESC).
const INTERRUPT_BYTE: [u8; 1] = [0x1b];

struct ProcState {
    pid: Option<u32>,
    current_entry: Option<Arc<CacheEntry>>,
    spawned: bool,
    terminating: bool,
    spawned_at: Option<Instant>,
    messages_processed: u64,
    last_response_at_ms: Option<u64>,
}

struct CoreInner {
    team: String,
    variant: &'static str,
    spec: CommandSpec,
    clock: SystemClock,
    state: Mutex<ProcState>,
    /// Child stdin, behind an async lock because writes await. `None` once
    /// the process is gone or terminating.
    stdin: AsyncMutex<Option<ChildStdin>>,
    status_tx: watch::Sender<ProcessStatus>,
    errors_tx: broadcast::Sender<TransportError>,
}

/// Cloneable handle to one agent subprocess slot.
#[derive(Clone)]
pub(crate) struct ProcessCore {
    inner: Arc<CoreInner>,
}

impl ProcessCore {
    pub(crate) fn new(team: &str, variant: &'static str, spec: CommandSpec) -> Self {
        let (status_tx, _) = watch::channel(ProcessStatus::Stopped);
        let (errors_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(CoreInner {
                team: team.to_string(),
                variant,
                spec,
                clock: SystemClock,
                state: Mutex::new(ProcState {
                    pid: None,
                    current_entry: None,
                    spawned: false,
                    terminating: false,
                    spawned_at: None,
                    messages_processed: 0,
                    last_response_at_ms: None,
                }),
                stdin: AsyncMutex::new(None),
                status_tx,
                errors_tx,
            }),
        }
    }

    fn now_ms(&self) -> u64 {
        self.inner.clock.epoch_ms()
    }

    fn emit(&self, error: TransportError) {
        tracing::debug!(team = %self.inner.team, %error, "transport error");
        let _ = self.inner.errors_tx.send(error);
    }

    pub(crate) async fn spawn(
        &self,
        spawn_entry: Arc<CacheEntry>,
        timeout: Duration,
    ) -> Result<(), IrisError> {
        {
            let mut state = self.inner.state.lock();
            if state.spawned {
                return Err(IrisError::Transport(format!(
                    "transport for {} was already spawned",
                    self.inner.team
                )));
            }
            state.spawned = true;
            state.current_entry = Some(Arc::clone(&spawn_entry));
            self.inner.status_tx.send_replace(ProcessStatus::Spawning);
        }

        let spec = &self.inner.spec;
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn {}: {e}", spec.program);
                self.fail_spawn(&spawn_entry, &message);
                return Err(IrisError::Transport(message));
            }
        };

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        {
            let mut state = self.inner.state.lock();
            state.pid = pid;
            state.spawned_at = Some(self.inner.clock.now());
        }
        *self.inner.stdin.lock().await = stdin;

        tracing::info!(
            team = %self.inner.team,
            variant = self.inner.variant,
            pid,
            "agent process spawned"
        );

        if let Some(stdout) = stdout {
            tokio::spawn(pump_stdout(self.clone(), stdout));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(drain_stderr(self.inner.team.clone(), stderr));
        }
        tokio::spawn(wait_for_exit(self.clone(), child));

        // Subscribe before writing: replay makes an early init impossible
        // to miss.
        let mut frames = spawn_entry.subscribe();
        if let Err(e) = self.write_user_frame(spawn_entry.tell_string()).await {
            let _ = self.terminate().await;
            return Err(e);
        }

        let saw_init = tokio::time::timeout(timeout, async {
            while let Some(frame) = frames.next().await {
                if frame.is_init() {
                    return true;
                }
            }
            false
        })
        .await;

        match saw_init {
            Ok(true) => {
                tracing::info!(team = %self.inner.team, pid, "agent ready");
                Ok(())
            }
            Ok(false) => {
                // Entry stream ended: the process died during the handshake.
                let message = format!("{} agent exited during spawn handshake", self.inner.team);
                self.emit(TransportError::SpawnFailed(message.clone()));
                Err(IrisError::ProcessCrashed(message))
            }
            Err(_) => {
                let ms = timeout.as_millis() as u64;
                self.emit(TransportError::InitTimeout(ms));
                let _ = self.terminate().await;
                Err(IrisError::InitTimeout(ms))
            }
        }
    }

    fn fail_spawn(&self, entry: &CacheEntry, message: &str) {
        tracing::error!(team = %self.inner.team, message, "spawn failed");
        entry.terminate(TerminationReason::ProcessCrashed, self.now_ms());
        self.inner.status_tx.send_replace(ProcessStatus::Stopped);
        self.emit(TransportError::SpawnFailed(message.to_string()));
    }

    pub(crate) async fn execute_tell(&self, entry: Arc<CacheEntry>) -> Result<(), IrisError> {
        {
            let mut state = self.inner.state.lock();
            if *self.inner.status_tx.borrow() != ProcessStatus::Idle {
                return Err(IrisError::ProcessBusy(self.inner.team.clone()));
            }
            if state.current_entry.as_ref().is_some_and(|e| e.is_active()) {
                return Err(IrisError::ProcessBusy(self.inner.team.clone()));
            }
            state.current_entry = Some(Arc::clone(&entry));
            self.inner.status_tx.send_replace(ProcessStatus::Processing);
        }

        match self.write_user_frame(entry.tell_string()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                entry.terminate(TerminationReason::ProcessCrashed, self.now_ms());
                self.inner.state.lock().current_entry = None;
                self.inner.status_tx.send_replace(ProcessStatus::Stopped);
                // Don't leave an unreachable child behind the broken pipe.
                let this = self.clone();
                tokio::spawn(async move {
                    let _ = this.terminate().await;
                });
                Err(e)
            }
        }
    }

    pub(crate) async fn terminate(&self) -> Result<(), IrisError> {
        let pid = {
            let mut state = self.inner.state.lock();
            state.terminating = true;
            state.pid
        };
        let Some(pid) = pid else {
            return Ok(());
        };

        // Closing stdin lets a well-behaved agent exit on EOF.
        *self.inner.stdin.lock().await = None;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

        if self.wait_stopped(TERM_GRACE).await {
            return Ok(());
        }
        tracing::warn!(team = %self.inner.team, pid, "agent ignored SIGTERM, sending SIGKILL");
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        self.wait_stopped(Duration::from_secs(1)).await;
        Ok(())
    }

    async fn wait_stopped(&self, timeout: Duration) -> bool {
        let mut status = self.inner.status_tx.subscribe();
        tokio::time::timeout(timeout, async {
            while *status.borrow_and_update() != ProcessStatus::Stopped {
                if status.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }

    pub(crate) async fn cancel(&self) -> Result<bool, IrisError> {
        if self.inner.state.lock().pid.is_none() {
            return Ok(false);
        }
        match self.write_bytes(&INTERRUPT_BYTE).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::debug!(team = %self.inner.team, error = %e, "interrupt write failed");
                Ok(false)
            }
        }
    }

    async fn write_user_frame(&self, text: &str) -> Result<(), IrisError> {
        let mut line = serde_json::to_string(&Frame::user_message(text))
            .map_err(|e| IrisError::Transport(format!("cannot encode frame: {e}")))?;
        line.push('\n');
        self.write_bytes(line.as_bytes()).await
    }

    async fn write_bytes(&self, bytes: &[u8]) -> Result<(), IrisError> {
        let mut guard = self.inner.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(IrisError::Transport(format!("{}: agent stdin closed", self.inner.team)));
        };
        let write = async {
            stdin.write_all(bytes).await?;
            stdin.flush().await
        };
        write.await.map_err(|e| {
            self.emit(TransportError::WriteFailed(e.to_string()));
            IrisError::Transport(format!("{}: write to agent failed: {e}", self.inner.team))
        })
    }

    /// One decoded stdout line. Appends to the current entry and drives the
    /// status machine on `init` / `result` frames.
    fn handle_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let now_ms = self.now_ms();
        let Some(frame) = Frame::parse_line(line, now_ms) else {
            tracing::debug!(team = %self.inner.team, line, "dropping unparseable stdout line");
            return;
        };
        // Settle state transitions before publishing the frame: observers
        // wake on the frame broadcast and must not catch the transport in
        // the pre-transition status.
        let entry = if frame.is_result() {
            let entry = {
                let mut state = self.inner.state.lock();
                state.messages_processed += 1;
                state.last_response_at_ms = Some(now_ms);
                state.current_entry.take()
            };
            self.inner.status_tx.send_if_modified(|status| {
                if *status == ProcessStatus::Processing {
                    *status = ProcessStatus::Idle;
                    true
                } else {
                    false
                }
            });
            entry
        } else {
            if frame.is_init() {
                self.inner.status_tx.send_if_modified(|status| {
                    if *status == ProcessStatus::Spawning {
                        *status = ProcessStatus::Idle;
                        true
                    } else {
                        false
                    }
                });
            }
            self.inner.state.lock().current_entry.clone()
        };

        match entry {
            Some(entry) => {
                entry.add_message(frame);
            }
            None => {
                tracing::debug!(
                    team = %self.inner.team,
                    frame_type = frame.frame_type.as_str(),
                    "frame arrived with no current entry"
                );
            }
        }
    }

    /// Settle state once the child is reaped. Idempotent.
    fn handle_exit(&self, code: Option<i32>) {
        let now_ms = self.now_ms();
        let (entry, terminating) = {
            let mut state = self.inner.state.lock();
            state.pid = None;
            (state.current_entry.take(), state.terminating)
        };
        self.inner.status_tx.send_replace(ProcessStatus::Stopped);

        if let Some(entry) = entry.filter(|e| e.is_active()) {
            let reason = if terminating {
                TerminationReason::ManualTermination
            } else {
                TerminationReason::ProcessCrashed
            };
            entry.terminate(reason, now_ms);
        }

        if terminating {
            tracing::info!(team = %self.inner.team, ?code, "agent process exited");
        } else {
            tracing::warn!(team = %self.inner.team, ?code, "agent process exited unexpectedly");
            self.emit(TransportError::UnexpectedExit(code));
        }

        if let Ok(mut guard) = self.inner.stdin.try_lock() {
            *guard = None;
        }
    }

    pub(crate) fn status(&self) -> ProcessStatus {
        *self.inner.status_tx.borrow()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<ProcessStatus> {
        self.inner.status_tx.subscribe()
    }

    pub(crate) fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.inner.errors_tx.subscribe()
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.inner.state.lock().pid
    }

    pub(crate) fn metrics(&self) -> TransportMetrics {
        let state = self.inner.state.lock();
        TransportMetrics {
            uptime_ms: state
                .spawned_at
                .filter(|_| state.pid.is_some())
                .map(|at| self.inner.clock.now().duration_since(at).as_millis() as u64)
                .unwrap_or(0),
            messages_processed: state.messages_processed,
            last_response_at_ms: state.last_response_at_ms,
        }
    }
}

async fn pump_stdout(core: ProcessCore, stdout: ChildStdout) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    while let Some(item) = lines.next().await {
        match item {
            Ok(line) => core.handle_line(&line),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                // The codec discards up to the next newline and recovers.
                tracing::warn!(team = %core.inner.team, "stdout line exceeded buffer limit");
            }
            Err(LinesCodecError::Io(e)) => {
                tracing::debug!(team = %core.inner.team, error = %e, "stdout read error");
                break;
            }
        }
    }
    tracing::debug!(team = %core.inner.team, "agent stdout closed");
}

async fn drain_stderr(team: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(team = %team, "agent stderr: {line}");
    }
}

async fn wait_for_exit(core: ProcessCore, mut child: Child) {
    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(team = %core.inner.team, error = %e, "failed waiting on agent");
            None
        }
    };
    core.handle_exit(code);
}
