//! Timer collaborator boundary and the thread-backed default timer.
//!
//! The engine asks a [`TickTimer`] for a handle that fires a callback at
//! a fixed period; it owns that handle, never a process-wide timer.
//! Cancelling joins the worker thread, so once [`TimerHandle::cancel`]
//! (or the handle's drop) returns, no further callback can run and any
//! in-flight callback has finished. The single worker also guarantees at
//! most one tick is executing at a time.

use crate::error::TimerError;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback invoked once per clock tick on the timer's thread.
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Source of periodic tick callbacks.
pub trait TickTimer {
    /// Arm the timer. The callback fires every `period` until the
    /// returned handle is cancelled or dropped.
    fn start(&self, period: Duration, tick: TickFn) -> Result<Box<dyn TimerHandle>, TimerError>;
}

/// A running timer owned by the engine.
pub trait TimerHandle: Send {
    /// Change the period without stopping. The next tick fires one new
    /// period after the previous tick, so only the rate changes.
    fn reprogram(&mut self, period: Duration) -> Result<(), TimerError>;

    /// Stop the timer, blocking until any in-flight callback returns.
    /// Safe to call from a thread other than the callback's.
    fn cancel(self: Box<Self>);
}

enum TimerCommand {
    Reprogram(Duration),
    Cancel,
}

/// Thread-backed [`TickTimer`].
///
/// The worker schedules against absolute deadlines so the period does
/// not accumulate drift. A tick that comes due while the host is stalled
/// fires once and re-anchors; there is no burst of catch-up ticks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadTimer;

struct ThreadTimerHandle {
    commands: Sender<TimerCommand>,
    worker: Option<JoinHandle<()>>,
}

impl TickTimer for ThreadTimer {
    fn start(&self, period: Duration, mut tick: TickFn) -> Result<Box<dyn TimerHandle>, TimerError> {
        if period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }

        let (commands, command_rx) = unbounded::<TimerCommand>();
        let worker = thread::Builder::new()
            .name("aleator-clock".into())
            .spawn(move || {
                let mut period = period;
                let mut deadline = Instant::now() + period;
                loop {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match command_rx.recv_timeout(timeout) {
                        Ok(TimerCommand::Reprogram(new_period)) => {
                            deadline = deadline - period + new_period;
                            period = new_period;
                        }
                        Ok(TimerCommand::Cancel) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            tick();
                            deadline += period;
                            let now = Instant::now();
                            if deadline < now {
                                deadline = now + period;
                            }
                        }
                    }
                }
            })
            .map_err(|e| TimerError::Arm(e.to_string()))?;

        log::trace!("timer armed with period {period:?}");
        Ok(Box::new(ThreadTimerHandle {
            commands,
            worker: Some(worker),
        }))
    }
}

impl ThreadTimerHandle {
    fn shutdown(&mut self) {
        let _ = self.commands.send(TimerCommand::Cancel);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl TimerHandle for ThreadTimerHandle {
    fn reprogram(&mut self, period: Duration) -> Result<(), TimerError> {
        if period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }
        self.commands
            .send(TimerCommand::Reprogram(period))
            .map_err(|_| TimerError::Disconnected)
    }

    fn cancel(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for ThreadTimerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
