//! Command execution engine.
//!
//! Runs validated commands as `sh -c <command>` in their own process group,
//! streams stdout/stderr as [`JobEvent`]s on a channel owned by the
//! connection, caps combined output, enforces deadlines with graceful then
//! forced termination, and supports cancellation by job id.
//!
//! Each job gets one supervisor task that owns the child process and drives
//! the job's [`ExecutionJob`] state machine. The live-jobs map only holds a
//! control channel per job, so lookups never contend with the process.

mod job;
mod output;

pub use job::{ExecutionJob, JobAction, JobInput, JobOutcome, JobPhase, resolve_exit_code};
pub use output::{Admission, OUTPUT_CAP_BYTES, OutputBudget, TRUNCATION_MARKER, Utf8Decoder};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, error, info, warn};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use outpost_protocol::{ExecChunk, ExecDone, ExecError, JobId, OutputStream, RunnerToBackend};

/// Delay between graceful and forced termination of a timed-out job.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(1);

/// How long to keep reading pipes after the process exits.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Shell used to run commands.
pub const DEFAULT_SHELL: &str = "sh";

const READ_BUFFER_SIZE: usize = 8192;

/// Tunable limits for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorLimits {
    /// Combined stdout+stderr bytes forwarded per job.
    pub output_cap: usize,
    pub kill_grace: Duration,
    pub drain_grace: Duration,
    /// Shell invoked as `<shell> -c <command>`.
    pub shell: String,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            output_cap: OUTPUT_CAP_BYTES,
            kill_grace: DEFAULT_KILL_GRACE,
            drain_grace: DEFAULT_DRAIN_GRACE,
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEventKind {
    Output { stream: OutputStream, data: String },
    Completed { exit_code: i32, duration_ms: u64 },
    Failed { error: String },
}

/// Event published by the executor for its connection to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: JobId,
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn output(job_id: JobId, stream: OutputStream, data: String) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Output { stream, data },
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.kind, JobEventKind::Output { .. })
    }
}

impl From<JobEvent> for RunnerToBackend {
    fn from(event: JobEvent) -> Self {
        let job_id = event.job_id;
        match event.kind {
            JobEventKind::Output { stream, data } => {
                RunnerToBackend::ExecChunk(ExecChunk {
                    job_id,
                    stream,
                    data,
                })
            }
            JobEventKind::Completed {
                exit_code,
                duration_ms,
            } => RunnerToBackend::ExecDone(ExecDone {
                job_id,
                exit_code,
                duration_ms,
            }),
            JobEventKind::Failed { error } => RunnerToBackend::ExecError(ExecError { job_id, error }),
        }
    }
}

impl From<JobOutcome> for JobEventKind {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed {
                exit_code,
                duration_ms,
            } => JobEventKind::Completed {
                exit_code,
                duration_ms,
            },
            JobOutcome::Failed { error } => JobEventKind::Failed { error },
        }
    }
}

pub type JobEventSender = mpsc::UnboundedSender<JobEvent>;
pub type JobEventReceiver = mpsc::UnboundedReceiver<JobEvent>;

#[derive(Debug)]
enum JobControl {
    Cancel,
}

/// Entry in the live-jobs map.
#[derive(Debug)]
struct LiveJob {
    pid: Option<u32>,
    control: mpsc::UnboundedSender<JobControl>,
    cancel_requested: bool,
}

/// Runs jobs for one connection.
///
/// Cloning shares the live-jobs map and event channel.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    jobs: Arc<DashMap<JobId, LiveJob>>,
    events: JobEventSender,
    limits: Arc<ExecutorLimits>,
}

impl CommandExecutor {
    pub fn new(events: JobEventSender) -> Self {
        Self::with_limits(events, ExecutorLimits::default())
    }

    pub fn with_limits(events: JobEventSender, limits: ExecutorLimits) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            events,
            limits: Arc::new(limits),
        }
    }

    /// Create an executor together with the receiving end of its event channel.
    pub fn channel(limits: ExecutorLimits) -> (Self, JobEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_limits(tx, limits), rx)
    }

    /// Start `command` for `job_id`. Returns immediately.
    ///
    /// The command must already have passed validation. The job is in the
    /// live-jobs map before any output can arrive. Every call eventually
    /// publishes exactly one terminal event for `job_id`.
    pub fn execute(&self, job_id: JobId, command: &str, timeout_secs: u64) {
        // Reserve the id first; no map lock may be held across fork/exec.
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(_) => {
                warn!("Rejecting job {}: a job with this id is running", job_id);
                let error = format!("job {job_id} is already running");
                self.publish(JobEvent::failed(job_id, error));
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(LiveJob {
                    pid: None,
                    control: control_tx,
                    cancel_requested: false,
                });
            }
        }

        let mut cmd = Command::new(&self.limits.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.jobs.remove(&job_id);
                error!("Failed to spawn job {}: {}", job_id, e);
                self.publish(JobEvent::failed(
                    job_id,
                    format!("failed to start command: {e}"),
                ));
                return;
            }
        };

        let pid = child.id();
        if let Some(mut live) = self.jobs.get_mut(&job_id) {
            live.pid = pid;
        }

        info!(
            "Started job {} (pid={:?}, timeout={}s)",
            job_id, pid, timeout_secs
        );
        debug!("Job {} command: {}", job_id, command);

        let mut pumps = Vec::with_capacity(2);
        let budget = Arc::new(Mutex::new(OutputBudget::new(self.limits.output_cap)));
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_output(
                stdout,
                OutputStream::Stdout,
                job_id.clone(),
                Arc::clone(&budget),
                self.events.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_output(
                stderr,
                OutputStream::Stderr,
                job_id.clone(),
                Arc::clone(&budget),
                self.events.clone(),
            )));
        }

        let supervisor = Supervisor {
            job: ExecutionJob::new(job_id, command, timeout_secs),
            pid,
            jobs: Arc::clone(&self.jobs),
            events: self.events.clone(),
            limits: Arc::clone(&self.limits),
        };
        tokio::spawn(async move {
            supervisor.run(child, control_rx, pumps).await;
        });
    }

    /// Request graceful termination of a running job.
    ///
    /// Returns `true` if the request was delivered. Returns `false` if the
    /// job is unknown, already finished, or already being canceled. Does not
    /// wait for the process to exit; its terminal event still follows.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let Some(mut live) = self.jobs.get_mut(job_id) else {
            return false;
        };
        if live.cancel_requested {
            debug!("Job {} already has a pending cancel", job_id);
            return false;
        }
        live.cancel_requested = true;
        let delivered = live.control.send(JobControl::Cancel).is_ok();
        if delivered {
            info!("Cancel requested for job {} (pid={:?})", job_id, live.pid);
        }
        delivered
    }

    /// Request graceful termination of every live job. Returns how many were signaled.
    pub fn terminate_all(&self) -> usize {
        let mut signaled = 0;
        for mut live in self.jobs.iter_mut() {
            live.cancel_requested = true;
            if live.control.send(JobControl::Cancel).is_ok() {
                signaled += 1;
            }
        }
        if signaled > 0 {
            info!("Terminating {} live job(s)", signaled);
        }
        signaled
    }

    pub fn is_running(&self, job_id: &JobId) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn live_jobs(&self) -> usize {
        self.jobs.len()
    }

    fn publish(&self, event: JobEvent) {
        // The receiver only goes away when the connection is torn down.
        let _ = self.events.send(event);
    }
}

/// Owns one child process until it exits.
struct Supervisor {
    job: ExecutionJob,
    pid: Option<u32>,
    jobs: Arc<DashMap<JobId, LiveJob>>,
    events: JobEventSender,
    limits: Arc<ExecutorLimits>,
}

impl Supervisor {
    async fn run(
        mut self,
        mut child: Child,
        mut control_rx: mpsc::UnboundedReceiver<JobControl>,
        mut pumps: Vec<JoinHandle<()>>,
    ) {
        self.job.transition(JobInput::Started);

        // A deadline past what `Instant` can represent never fires.
        let mut deadline = self
            .job
            .timeout()
            .and_then(|t| Instant::now().checked_add(t));
        let mut kill_at: Option<Instant> = None;

        let outcome = loop {
            let input = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => JobInput::Exited(status),
                    Err(e) => JobInput::WaitFailed(format!("failed to wait for command: {e}")),
                },
                Some(JobControl::Cancel) = control_rx.recv() => JobInput::CancelRequested,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    JobInput::DeadlineElapsed
                }
                _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                    kill_at = None;
                    JobInput::GraceElapsed
                }
            };

            match self.job.transition(input) {
                JobAction::None => {}
                JobAction::Terminate => self.signal(libc::SIGTERM),
                JobAction::TerminateWithGrace => {
                    warn!(
                        "Job {} exceeded its {}s timeout, terminating",
                        self.job.id, self.job.timeout_secs
                    );
                    self.signal(libc::SIGTERM);
                    kill_at = Some(Instant::now() + self.limits.kill_grace);
                }
                JobAction::Kill => {
                    warn!("Job {} ignored SIGTERM, killing", self.job.id);
                    self.signal(libc::SIGKILL);
                }
                JobAction::Finish(outcome) => break outcome,
            }
        };

        self.jobs.remove(&self.job.id);
        drop(control_rx);

        if !matches!(child.try_wait(), Ok(Some(_))) {
            let _ = child.start_kill();
        }
        if self.job.phase() == JobPhase::Failed {
            // Leftover group members of a timed-out or unreapable job.
            self.signal(libc::SIGKILL);
        }

        let drained = tokio::time::timeout(
            self.limits.drain_grace,
            futures::future::join_all(pumps.iter_mut()),
        )
        .await;
        if drained.is_err() {
            debug!(
                "Job {} output still open after exit, closing pipes",
                self.job.id
            );
            // Wait for aborted pumps so none publishes after the terminal event.
            for pump in pumps {
                if !pump.is_finished() {
                    pump.abort();
                    let _ = pump.await;
                }
            }
        }

        match &outcome {
            JobOutcome::Completed {
                exit_code,
                duration_ms,
            } => info!(
                "Job {} exited with code {} after {}ms",
                self.job.id, exit_code, duration_ms
            ),
            JobOutcome::Failed { error } => warn!("Job {} failed: {}", self.job.id, error),
        }

        let _ = self.events.send(JobEvent {
            job_id: self.job.id.clone(),
            kind: outcome.into(),
        });
    }

    /// Signal the job's whole process group.
    fn signal(&self, signal: libc::c_int) {
        let Some(pid) = self.pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
            return;
        };
        // SAFETY: kill(2) has no memory-safety preconditions. A negative pid
        // addresses the process group the child leads (process_group(0)).
        let rc = unsafe { libc::kill(-pid, signal) };
        if rc != 0 {
            debug!(
                "Signal {} to job {} (pgid={}) failed: {}",
                signal,
                self.job.id,
                pid,
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Forward one pipe of a job as output events, respecting the shared budget.
///
/// Keeps reading after truncation so the process never blocks on a full pipe.
async fn pump_output<R>(
    mut reader: R,
    stream: OutputStream,
    job_id: JobId,
    budget: Arc<Mutex<OutputBudget>>,
    events: JobEventSender,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Job {} {} read error: {}", job_id, stream.as_str(), e);
                break;
            }
        };

        let admission = budget.lock().await.admit(n);
        let data = match admission {
            Admission::Forward => decoder.push(&buf[..n]),
            Admission::Truncate => {
                info!("Job {} exceeded its output cap, truncating", job_id);
                TRUNCATION_MARKER.to_string()
            }
            Admission::Drop => continue,
        };

        if !data.is_empty() {
            let _ = events.send(JobEvent::output(job_id.clone(), stream, data));
        }
    }

    if !budget.lock().await.is_truncated() {
        let tail = decoder.finish();
        if !tail.is_empty() {
            let _ = events.send(JobEvent::output(job_id, stream, tail));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> (CommandExecutor, JobEventReceiver) {
        CommandExecutor::channel(ExecutorLimits::default())
    }

    /// Collect events for `job_id` until its terminal event.
    async fn run_to_end(rx: &mut JobEventReceiver) -> Vec<JobEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for job event")
                .expect("event channel closed");
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    fn stdout_text(events: &[JobEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match &e.kind {
                JobEventKind::Output {
                    stream: OutputStream::Stdout,
                    data,
                } => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_echo_completes() {
        let (executor, mut rx) = executor();
        executor.execute(JobId::from("42"), "echo hi", 0);

        let events = run_to_end(&mut rx).await;
        assert_eq!(stdout_text(&events), "hi\n");
        match &events.last().unwrap().kind {
            JobEventKind::Completed { exit_code, .. } => assert_eq!(*exit_code, 0),
            other => panic!("unexpected terminal {other:?}"),
        }
        assert_eq!(executor.live_jobs(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_and_stderr() {
        let (executor, mut rx) = executor();
        executor.execute(JobId::from(1u64), "echo oops >&2; exit 3", 0);

        let events = run_to_end(&mut rx).await;
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            JobEventKind::Output { stream: OutputStream::Stderr, data } if data == "oops\n"
        )));
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Completed { exit_code: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_error() {
        let limits = ExecutorLimits {
            shell: "/nonexistent/outpost-test-shell".to_string(),
            ..ExecutorLimits::default()
        };
        let (executor, mut rx) = CommandExecutor::channel(limits);
        executor.execute(JobId::from("x"), "echo hi", 0);

        let events = run_to_end(&mut rx).await;
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            JobEventKind::Failed { error } => {
                assert!(error.starts_with("failed to start command"), "{error}")
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!executor.is_running(&JobId::from("x")));
    }

    #[tokio::test]
    async fn test_output_cap_truncates_once() {
        let (executor, mut rx) = executor();
        // ~120 KB split across both pipes.
        executor.execute(
            JobId::from("big"),
            "head -c 60000 /dev/zero | tr '\\0' a; head -c 60000 /dev/zero | tr '\\0' b >&2",
            0,
        );

        let events = run_to_end(&mut rx).await;
        let mut raw_bytes = 0;
        let mut markers = 0;
        let mut after_marker = 0;
        for event in &events {
            if let JobEventKind::Output { data, .. } = &event.kind {
                if data == TRUNCATION_MARKER {
                    markers += 1;
                } else if markers > 0 {
                    after_marker += 1;
                } else {
                    raw_bytes += data.len();
                }
            }
        }
        assert_eq!(markers, 1);
        assert_eq!(after_marker, 0);
        assert!(raw_bytes <= OUTPUT_CAP_BYTES, "{raw_bytes}");
        // Truncation does not hide the exit status.
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Completed { exit_code: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_timeout_kills_process_ignoring_sigterm() {
        let limits = ExecutorLimits {
            kill_grace: Duration::from_millis(300),
            ..ExecutorLimits::default()
        };
        let (executor, mut rx) = CommandExecutor::channel(limits);
        let started = std::time::Instant::now();
        executor.execute(JobId::from("slow"), "trap '' TERM; sleep 30", 1);

        let events = run_to_end(&mut rx).await;
        let elapsed = started.elapsed();
        match &events.last().unwrap().kind {
            JobEventKind::Failed { error } => assert!(error.contains("timed out"), "{error}"),
            other => panic!("expected timeout error, got {other:?}"),
        }
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
        assert!(
            !events
                .iter()
                .any(|e| matches!(e.kind, JobEventKind::Completed { .. }))
        );
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let (executor, mut rx) = executor();
        let id = JobId::from("c1");
        executor.execute(id.clone(), "sleep 30", 0);
        assert!(executor.is_running(&id));

        assert!(executor.cancel(&id));
        // A second request for the same job is a no-op.
        assert!(!executor.cancel(&id));

        let events = run_to_end(&mut rx).await;
        match &events.last().unwrap().kind {
            JobEventKind::Completed { exit_code, .. } => assert_eq!(*exit_code, 143),
            other => panic!("unexpected terminal {other:?}"),
        }
        assert!(!executor.cancel(&id));
        assert!(!executor.is_running(&id));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (executor, _rx) = executor();
        assert!(!executor.cancel(&JobId::from("never-existed")));
        assert!(!executor.cancel(&JobId::from(99u64)));
    }

    #[tokio::test]
    async fn test_huge_timeout_is_unbounded() {
        let (executor, mut rx) = executor();
        executor.execute(JobId::from("huge"), "echo hi", u64::MAX);

        let events = run_to_end(&mut rx).await;
        assert_eq!(stdout_text(&events), "hi\n");
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Completed { exit_code: 0, .. }
        ));
        assert_eq!(executor.live_jobs(), 0);

        // The id is free again.
        executor.execute(JobId::from("huge"), "true", u64::MAX);
        let events = run_to_end(&mut rx).await;
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Completed { exit_code: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_exit_is_not_delivered() {
        let (executor, mut rx) = executor();
        let id = JobId::from("quick");
        executor.execute(id.clone(), "exit 0", 0);

        let events = run_to_end(&mut rx).await;
        assert!(events.last().unwrap().is_terminal());
        assert!(!executor.is_running(&id));
        assert!(!executor.cancel(&id));
        assert_eq!(executor.terminate_all(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_jobs_each_finish_once() {
        let (executor, mut rx) = executor();
        let starters: Vec<_> = (0..16u64)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    executor.execute(JobId::from(i), &format!("echo {i}"), 0);
                })
            })
            .collect();
        for starter in starters {
            starter.await.unwrap();
        }

        let mut terminals = std::collections::HashMap::new();
        while terminals.len() < 16 {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for job event")
                .expect("event channel closed");
            if event.is_terminal() {
                *terminals.entry(event.job_id.clone()).or_insert(0) += 1;
                assert!(matches!(
                    event.kind,
                    JobEventKind::Completed { exit_code: 0, .. }
                ));
            }
        }
        assert!(terminals.values().all(|count| *count == 1));
        assert_eq!(executor.live_jobs(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_job_id_rejected() {
        let (executor, mut rx) = executor();
        let id = JobId::from("dup");
        executor.execute(id.clone(), "sleep 30", 0);
        executor.execute(id.clone(), "echo second", 0);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first.kind {
            JobEventKind::Failed { error } => assert!(error.contains("already running")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(executor.is_running(&id));

        assert_eq!(executor.terminate_all(), 1);
        let events = run_to_end(&mut rx).await;
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Completed { .. }
        ));
        assert_eq!(executor.live_jobs(), 0);
    }

    #[tokio::test]
    async fn test_background_child_does_not_stall_completion() {
        let limits = ExecutorLimits {
            drain_grace: Duration::from_millis(200),
            ..ExecutorLimits::default()
        };
        let (executor, mut rx) = CommandExecutor::channel(limits);
        executor.execute(JobId::from("bg"), "sleep 3 & echo started", 0);

        let events = run_to_end(&mut rx).await;
        assert_eq!(stdout_text(&events), "started\n");
        // Nothing from the aborted readers follows the terminal event.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Completed { exit_code: 0, .. }
        ));
    }

    #[test]
    fn test_event_to_wire_message() {
        let msg: RunnerToBackend = JobEvent::failed(JobId::from("7"), "nope").into();
        assert_eq!(msg, RunnerToBackend::exec_error(JobId::from("7"), "nope"));

        let msg: RunnerToBackend = JobEvent {
            job_id: JobId::from(1u64),
            kind: JobEventKind::Completed {
                exit_code: 0,
                duration_ms: 5,
            },
        }
        .into();
        assert_eq!(msg.kind(), "exec_done");
    }
}
