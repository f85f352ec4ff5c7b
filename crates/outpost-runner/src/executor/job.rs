//! Per-job lifecycle state machine.
//!
//! Every event that affects a job (start, cancel, deadline, exit) goes
//! through [`ExecutionJob::transition`], which is the only place the phase
//! changes. The supervisor task performs whatever [`JobAction`] comes back.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use outpost_protocol::JobId;

/// Lifecycle phase of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Process created, not yet supervised.
    Spawned,
    /// Supervised and streaming output.
    Running,
    /// A cancel request sent graceful termination.
    Canceled,
    /// The deadline passed; graceful then forced termination.
    TimedOut,
    /// Terminal: exited and reported with an exit code.
    Completed,
    /// Terminal: reported as an error.
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Input to the state machine.
#[derive(Debug)]
pub enum JobInput {
    /// Supervision started.
    Started,
    /// Backend asked to cancel the job.
    CancelRequested,
    /// The job's deadline passed.
    DeadlineElapsed,
    /// The grace period after graceful termination passed.
    GraceElapsed,
    /// The process exited.
    Exited(ExitStatus),
    /// Waiting on the process failed.
    WaitFailed(String),
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    None,
    /// Send graceful termination (SIGTERM) to the job's process group.
    Terminate,
    /// Send graceful termination and arm the forced-kill timer.
    TerminateWithGrace,
    /// Send forced termination (SIGKILL).
    Kill,
    /// Report the terminal outcome.
    Finish(JobOutcome),
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { exit_code: i32, duration_ms: u64 },
    Failed { error: String },
}

/// One in-flight command.
#[derive(Debug)]
pub struct ExecutionJob {
    pub id: JobId,
    pub command: String,
    /// 0 = unbounded.
    pub timeout_secs: u64,
    pub started_at: Instant,
    phase: JobPhase,
}

impl ExecutionJob {
    pub fn new(id: JobId, command: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            id,
            command: command.into(),
            timeout_secs,
            started_at: Instant::now(),
            phase: JobPhase::Spawned,
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn timed_out(&self) -> bool {
        self.phase == JobPhase::TimedOut
    }

    /// Deadline duration, if the job has one.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Apply `input` and return the action the caller must perform.
    ///
    /// Terminal phases absorb every input, so a job reports exactly once.
    pub fn transition(&mut self, input: JobInput) -> JobAction {
        use JobPhase::*;

        match (self.phase, input) {
            (Completed | Failed, _) => JobAction::None,

            (Spawned, JobInput::Started) => {
                self.phase = Running;
                JobAction::None
            }
            (_, JobInput::Started) => JobAction::None,

            (Spawned | Running, JobInput::CancelRequested) => {
                self.phase = Canceled;
                JobAction::Terminate
            }
            (Canceled | TimedOut, JobInput::CancelRequested) => JobAction::Terminate,

            (Spawned | Running | Canceled, JobInput::DeadlineElapsed) => {
                self.phase = TimedOut;
                JobAction::TerminateWithGrace
            }
            (_, JobInput::DeadlineElapsed) => JobAction::None,

            (TimedOut, JobInput::GraceElapsed) => JobAction::Kill,
            (_, JobInput::GraceElapsed) => JobAction::None,

            (TimedOut, JobInput::Exited(_)) => {
                self.phase = Failed;
                JobAction::Finish(JobOutcome::Failed {
                    error: format!("command timed out after {}s", self.timeout_secs),
                })
            }
            (_, JobInput::Exited(status)) => {
                self.phase = Completed;
                JobAction::Finish(JobOutcome::Completed {
                    exit_code: resolve_exit_code(status),
                    duration_ms: self.elapsed_ms(),
                })
            }

            (_, JobInput::WaitFailed(error)) => {
                self.phase = Failed;
                JobAction::Finish(JobOutcome::Failed { error })
            }
        }
    }
}

/// Exit code for the backend: the real code, else `128 + signal`, else 1.
pub fn resolve_exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
