//! The step timer of asynchronous environments.
//!
//! A dedicated thread keeps at most one pending deadline. When it expires
//! the thread calls [`TickHandler::tick`], whose answer decides whether a
//! new deadline is set. The controller schedules and cancels the deadline
//! through a [`TimerHandle`].

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const MIN_FPS: f64 = 0.01;
const MAX_FPS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Run the next tick after the delay.
    Reschedule(Duration),
    Stop,
}

pub trait TickHandler: Send + Sync {
    fn tick(&self) -> Tick;
}

/// Decides when the next step is due, given how long the last one took.
///
/// Slow environments are stepped back to back, so the step rate never
/// exceeds `fps`.
#[must_use]
pub fn next_tick(elapsed: Duration, fps: f64, paused: bool) -> Tick {
    if paused {
        return Tick::Stop;
    }
    let fps = if fps.is_nan() { MIN_FPS } else { fps.clamp(MIN_FPS, MAX_FPS) };
    let period = Duration::from_secs_f64(1.0 / fps);
    Tick::Reschedule(period.saturating_sub(elapsed))
}

#[must_use]
pub fn is_idle(since_last_action: Duration, threshold: Duration) -> bool {
    since_last_action >= threshold
}

enum Control {
    Schedule(Duration),
    Cancel,
    Shutdown,
}

/// Sends commands to the timer thread. Cheap to clone.
#[derive(Clone)]
pub struct TimerHandle {
    tx: Sender<Control>,
}

impl TimerHandle {
    /// Replaces the pending deadline, if any.
    pub fn schedule(&self, delay: Duration) {
        let _ = self.tx.send(Control::Schedule(delay));
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(Control::Cancel);
    }
}

/// Creates the handle of a timer together with the receiving end that
/// [`StepTimer::spawn`] consumes.
#[must_use]
pub fn control_channel() -> (TimerHandle, TimerControl) {
    let (tx, rx) = unbounded();
    (TimerHandle { tx }, TimerControl { rx })
}

pub struct TimerControl {
    rx: Receiver<Control>,
}

/// Owns the timer thread; dropping it stops the thread.
pub struct StepTimer {
    handle: TimerHandle,
    thread: Option<JoinHandle<()>>,
}

impl StepTimer {
    /// Starts the timer thread. The handler is held weakly so the timer does
    /// not keep its owner alive.
    pub fn spawn(
        handle: TimerHandle,
        control: TimerControl,
        handler: Weak<dyn TickHandler>,
    ) -> std::io::Result<Self> {
        let thread = thread::Builder::new()
            .name("step-timer".into())
            .spawn(move || run(&control.rx, &handler))?;
        Ok(Self { handle, thread: Some(thread) })
    }

    #[must_use]
    pub fn handle(&self) -> &TimerHandle {
        &self.handle
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(rx: &Receiver<Control>, handler: &Weak<dyn TickHandler>) {
    let mut deadline: Option<Instant> = None;
    loop {
        let control = match deadline {
            None => match rx.recv() {
                Ok(control) => control,
                Err(_) => return,
            },
            Some(at) => match rx.recv_deadline(at) {
                Ok(control) => control,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    let Some(handler) = handler.upgrade() else {
                        return;
                    };
                    if let Tick::Reschedule(delay) = handler.tick() {
                        deadline = Some(Instant::now() + delay);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            },
        };
        match control {
            Control::Schedule(delay) => deadline = Some(Instant::now() + delay),
            Control::Cancel => {
                if deadline.take().is_some() {
                    debug!("Cancelled the pending step");
                }
            }
            Control::Shutdown => return,
        }
    }
}
