//! Servo task: the thread that owns the controller.
//!
//! The task steps the controller on a fixed tick and serves requests from
//! [`ServoHandle`]s in between. Requests travel over `std::sync::mpsc`; each
//! carries a one-shot reply channel. The loop waits with `recv_timeout` until
//! the next tick deadline, so request traffic never delays stepping by more
//! than the time it takes to answer one request.
//!
//! The handle and the task race to claim each request. A handle that times
//! out first leaves the request abandoned, and the task drops it unexecuted:
//! a request reported as `Unavailable` never takes effect later.
//!
//! Shutdown cancels any in-flight motion at the next tick, releases and shuts
//! the driver down, then the thread exits.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use stepgate_common::hal::driver::HalError;
use tracing::{debug, error, info, warn};

use crate::controller::{ServoController, StepOutcome};
use crate::envelope::SafeTarget;
use crate::error::ControlError;
use crate::state::{FaultReason, ServoPhase, ServoState};

/// How long a handle waits for the task to answer.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// The servo as seen by the dispatcher.
pub trait ServoPort {
    /// Current state snapshot.
    fn state(&self) -> Result<ServoState, ControlError>;

    /// Start a motion. Fails with `Busy` while one is in flight.
    fn begin_move(&self, target: SafeTarget) -> Result<(), ControlError>;
}

/// Full snapshot served by the task.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoSnapshot {
    /// Position and phase.
    pub state: ServoState,
    /// In-flight target.
    pub target: Option<f64>,
    /// Active fault.
    pub fault: Option<FaultReason>,
    /// Loop timing.
    pub timing: TickStats,
}

/// Stepping loop timing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks that started more than one period late.
    pub late_ticks: u64,
    /// Longest `step` call in microseconds.
    pub max_step_us: u64,
    /// Requests dropped because the caller had already timed out.
    pub abandoned: u64,
}

/// One-shot reply slot. Whoever flips `claimed` first owns the request:
/// the task to execute it, or the handle to abandon it.
struct Reply<T> {
    tx: Sender<T>,
    claimed: Arc<AtomicBool>,
}

impl<T> Reply<T> {
    /// Claim for execution. `false` once the caller has given up.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    fn send(self, value: T) {
        // The receiver only disappears if the caller gave up after we claimed.
        let _ = self.tx.send(value);
    }
}

enum ControlRequest {
    BeginMove {
        target: SafeTarget,
        reply: Reply<Result<(), ControlError>>,
    },
    Cancel {
        reply: Reply<Result<(), ControlError>>,
    },
    Fault {
        reason: FaultReason,
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<Result<f64, ControlError>>,
    },
    Snapshot {
        reply: Reply<ServoSnapshot>,
    },
    Shutdown,
}

/// Cloneable entry point into the servo task.
#[derive(Debug, Clone)]
pub struct ServoHandle {
    tx: Sender<ControlRequest>,
    reply_timeout: Duration,
}

static_assertions::assert_impl_all!(ServoHandle: Send, Sync, Clone);

impl ServoHandle {
    /// Same handle with a different reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Request cancellation of the in-flight motion.
    pub fn cancel(&self) -> Result<(), ControlError> {
        self.call(|reply| ControlRequest::Cancel { reply })?
    }

    /// Force the controller into `Faulted`.
    pub fn fault(&self, reason: FaultReason) -> Result<(), ControlError> {
        self.call(|reply| ControlRequest::Fault { reason, reply })
    }

    /// Operator reset. Returns the recalibrated position.
    pub fn reset(&self) -> Result<f64, ControlError> {
        self.call(|reply| ControlRequest::Reset { reply })?
    }

    /// Full snapshot including fault and timing.
    pub fn snapshot(&self) -> Result<ServoSnapshot, ControlError> {
        self.call(|reply| ControlRequest::Snapshot { reply })
    }

    fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControlRequest,
    ) -> Result<T, ControlError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let claimed = Arc::new(AtomicBool::new(false));
        self.tx
            .send(build(Reply {
                tx: reply_tx,
                claimed: Arc::clone(&claimed),
            }))
            .map_err(|_| ControlError::Unavailable)?;

        match reply_rx.recv_timeout(self.reply_timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                if claimed.swap(true, Ordering::AcqRel) {
                    // The task took it just before we gave up; the answer is on its way.
                    reply_rx
                        .recv_timeout(self.reply_timeout)
                        .map_err(|_| ControlError::Unavailable)
                } else {
                    warn!(
                        timeout_ms = self.reply_timeout.as_millis() as u64,
                        "Servo task unresponsive; request abandoned"
                    );
                    Err(ControlError::Unavailable)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(ControlError::Unavailable),
        }
    }
}

impl ServoPort for ServoHandle {
    fn state(&self) -> Result<ServoState, ControlError> {
        self.snapshot().map(|s| s.state)
    }

    fn begin_move(&self, target: SafeTarget) -> Result<(), ControlError> {
        self.call(|reply| ControlRequest::BeginMove { target, reply })?
    }
}

/// Running servo task.
#[derive(Debug)]
pub struct ServoRuntime {
    handle: ServoHandle,
    join: JoinHandle<Result<TickStats, HalError>>,
}

impl ServoRuntime {
    /// New handle to the task.
    pub fn handle(&self) -> ServoHandle {
        self.handle.clone()
    }

    /// Stop the task and wait for it.
    ///
    /// In-flight motion is cancelled at the next tick and the driver is
    /// released and shut down.
    pub fn shutdown(self) -> Result<TickStats, ControlError> {
        // The task may already be gone; joining reports why.
        let _ = self.handle.tx.send(ControlRequest::Shutdown);
        match self.join.join() {
            Ok(result) => result.map_err(ControlError::Hardware),
            Err(_) => {
                error!("Servo task panicked");
                Err(ControlError::Unavailable)
            }
        }
    }
}

/// Spawner for the servo task.
pub struct ServoTask {
    controller: ServoController,
    rx: Receiver<ControlRequest>,
    tick: Duration,
    stats: TickStats,
    shutting_down: bool,
}

impl ServoTask {
    /// Move `controller` onto a new thread stepping every `tick`.
    pub fn spawn(controller: ServoController, tick: Duration) -> io::Result<ServoRuntime> {
        let (tx, rx) = mpsc::channel();
        let task = ServoTask {
            controller,
            rx,
            tick,
            stats: TickStats::default(),
            shutting_down: false,
        };
        let join = thread::Builder::new()
            .name("stepgate-servo".to_string())
            .spawn(move || task.run())?;
        Ok(ServoRuntime {
            handle: ServoHandle {
                tx,
                reply_timeout: DEFAULT_REPLY_TIMEOUT,
            },
            join,
        })
    }

    fn run(mut self) -> Result<TickStats, HalError> {
        info!(
            tick_us = self.tick.as_micros() as u64,
            realtime = detect_rt_mode(),
            "Servo task started"
        );

        let mut next_tick = Instant::now() + self.tick;
        loop {
            let now = Instant::now();
            if now >= next_tick {
                self.tick_once(now, next_tick);
                next_tick += self.tick;
                if next_tick <= now {
                    // Fell more than a period behind; skip missed ticks.
                    next_tick = now + self.tick;
                }
                if self.shutting_down && self.controller.state().phase != ServoPhase::Moving {
                    break;
                }
                continue;
            }

            match self.rx.recv_timeout(next_tick - now) {
                Ok(request) => self.serve(request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if !self.shutting_down {
                        debug!("All servo handles dropped");
                        self.begin_shutdown();
                    }
                    thread::sleep(next_tick.saturating_duration_since(Instant::now()));
                }
            }
        }

        self.controller.shutdown()?;
        info!(
            ticks = self.stats.ticks,
            late_ticks = self.stats.late_ticks,
            max_step_us = self.stats.max_step_us,
            abandoned = self.stats.abandoned,
            "Servo task stopped"
        );
        Ok(self.stats)
    }

    fn tick_once(&mut self, now: Instant, deadline: Instant) {
        if now.saturating_duration_since(deadline) > self.tick {
            self.stats.late_ticks += 1;
            if self.stats.late_ticks <= 10 || self.stats.late_ticks % 1000 == 0 {
                warn!(
                    late_ticks = self.stats.late_ticks,
                    lag_us = now.saturating_duration_since(deadline).as_micros() as u64,
                    "Servo tick late"
                );
            }
        }

        let started = Instant::now();
        let outcome = self.controller.step(now);
        let step_us = started.elapsed().as_micros() as u64;
        self.stats.ticks += 1;
        self.stats.max_step_us = self.stats.max_step_us.max(step_us);

        if let StepOutcome::Faulted(reason) = outcome {
            error!(reason = %reason, "Servo faulted during step; operator reset required");
        }
    }

    fn serve(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::BeginMove { target, reply } => {
                if !self.claim(&reply, "begin_move") {
                    return;
                }
                let result = if self.shutting_down {
                    Err(ControlError::Unavailable)
                } else {
                    self.controller.begin_move(target, Instant::now())
                };
                reply.send(result);
            }
            ControlRequest::Cancel { reply } => {
                if self.claim(&reply, "cancel") {
                    reply.send(self.controller.cancel());
                }
            }
            ControlRequest::Fault { reason, reply } => {
                if self.claim(&reply, "fault") {
                    self.controller.fault(reason);
                    reply.send(());
                }
            }
            ControlRequest::Reset { reply } => {
                if self.claim(&reply, "reset") {
                    reply.send(self.controller.reset());
                }
            }
            ControlRequest::Snapshot { reply } => {
                if self.claim(&reply, "snapshot") {
                    reply.send(ServoSnapshot {
                        state: self.controller.state(),
                        target: self.controller.target().map(SafeTarget::position),
                        fault: self.controller.fault_reason().cloned(),
                        timing: self.stats,
                    });
                }
            }
            ControlRequest::Shutdown => self.begin_shutdown(),
        }
    }

    fn claim<T>(&mut self, reply: &Reply<T>, request: &'static str) -> bool {
        let claimed = reply.claim();
        if !claimed {
            self.stats.abandoned += 1;
            warn!(request, "Dropping request abandoned by its caller");
        }
        claimed
    }

    fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        if self.controller.state().phase == ServoPhase::Moving {
            // Honored at the next tick.
            let _ = self.controller.cancel();
        }
        info!("Servo task shutting down");
    }
}

/// Whether the process runs under a real-time scheduling policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
