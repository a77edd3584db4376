//! Thread lifecycle coordination and cooperative, signal-driven
//! shutdown.
//!
//! One context object owns the shared stop flag and the thread
//! registry; nothing here is process-global. The signal-manager thread
//! blocks synchronously waiting for a termination signal and only sets
//! the flag - no work happens inside an asynchronous signal handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::iterator::backend::Handle;
use signal_hook::iterator::Signals;
use tracing::{debug, error, info, warn};

use crate::engine::CaptureEngine;
use crate::error::{CaptureError, Result};
use crate::format::VideoFormat;

/// Cooperative stop flag shared between the supervisory, capture and
/// signal-manager threads.
///
/// This is the only data shared across threads; loops poll it
/// voluntarily, at least once per blocking cycle.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    /// Create a flag in the not-requested state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative termination of every loop polling this flag.
    pub fn request_stop(&self) {
        if !self.inner.swap(true, Ordering::Release) {
            debug!("stop requested");
        }
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

/// Logical role of a managed thread. Each role is spawned at most once
/// and joined exactly once during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadRole {
    /// Runs the capture engine lifecycle and loop.
    Capture,
    /// Blocks waiting for a termination signal.
    SignalManager,
}

impl fmt::Display for ThreadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Capture => "capture",
            Self::SignalManager => "signal-manager",
        })
    }
}

/// Owns the stop flag and the worker threads, and translates an
/// external termination signal into the cooperative flag observed by
/// the capture loop.
pub struct Coordinator {
    stop: StopFlag,
    threads: HashMap<ThreadRole, JoinHandle<()>>,
    signal_handle: Option<Handle>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    /// Create a coordinator with no threads spawned.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stop: StopFlag::new(),
            threads: HashMap::new(),
            signal_handle: None,
        }
    }

    /// Handle to the shared stop flag.
    #[must_use]
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_requested()
    }

    /// Spawn the capture thread: it initializes the engine, starts
    /// capture, runs the loop until the stop flag is raised, then tears
    /// everything down.
    pub fn spawn_capture<E>(&mut self, engine: E, format: VideoFormat) -> Result<()>
    where
        E: CaptureEngine + Send + 'static,
    {
        let stop = self.stop.clone();
        self.register(ThreadRole::Capture, move || {
            capture_thread_main(engine, format, &stop);
        })
    }

    /// Spawn the signal-manager thread: it blocks until one of the
    /// given signals arrives, raises the stop flag and exits.
    ///
    /// [`Self::shutdown`] closes the underlying iterator so the thread
    /// also exits when no signal ever arrives.
    pub fn spawn_signal_manager(&mut self, signals: &[i32]) -> Result<()> {
        let signals = Signals::new(signals).map_err(|err| {
            CaptureError::initialization(format!("cannot install signal iterator: {err}"))
        })?;
        let handle = signals.handle();
        let stop = self.stop.clone();
        self.register(ThreadRole::SignalManager, move || {
            signal_thread_main(signals, &stop);
        })?;
        self.signal_handle = Some(handle);
        Ok(())
    }

    /// Raise the stop flag and join every spawned thread exactly once.
    ///
    /// The capture thread is joined first; it polls the flag every
    /// dequeue cycle, so the join is bounded by one dequeue interval.
    pub fn shutdown(mut self) {
        self.stop.request_stop();
        if let Some(handle) = self.signal_handle.take() {
            handle.close();
        }

        for role in [ThreadRole::Capture, ThreadRole::SignalManager] {
            if let Some(handle) = self.threads.remove(&role) {
                debug!(%role, "joining thread");
                if handle.join().is_err() {
                    error!(%role, "thread panicked");
                }
            }
        }
        info!("all threads joined");
    }

    fn register<F>(&mut self, role: ThreadRole, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.threads.contains_key(&role) {
            return Err(CaptureError::initialization(format!(
                "{role} thread already spawned"
            )));
        }
        let handle = thread::Builder::new()
            .name(role.to_string())
            .spawn(body)
            .map_err(|err| {
                CaptureError::initialization(format!("failed to spawn {role} thread: {err}"))
            })?;
        debug!(%role, "thread spawned");
        self.threads.insert(role, handle);
        Ok(())
    }
}

/// Capture thread routine: full engine lifecycle around the loop.
fn capture_thread_main<E: CaptureEngine>(mut engine: E, format: VideoFormat, stop: &StopFlag) {
    info!(%format, "capture thread starting");

    if let Err(err) = engine.init(format) {
        error!(error = %err, "engine initialization failed");
        stop.request_stop();
        return;
    }
    if let Err(err) = engine.start_capture() {
        error!(error = %err, "capture start failed");
        if let Err(err) = engine.uninit() {
            warn!(error = %err, "engine release failed");
        }
        stop.request_stop();
        return;
    }

    if let Err(err) = engine.run_capture_loop(stop) {
        error!(error = %err, "capture loop aborted");
    }

    // Teardown always runs, whatever ended the loop.
    if let Err(err) = engine.stop_capture() {
        warn!(error = %err, "capture teardown reported an error");
    }
    if let Err(err) = engine.uninit() {
        warn!(error = %err, "engine release failed");
    }
    stop.request_stop();
    info!("capture thread exiting");
}

/// Signal-manager thread routine: block, set the flag, exit.
fn signal_thread_main(mut signals: Signals, stop: &StopFlag) {
    info!("signal manager waiting for termination signal");
    if let Some(signal) = signals.forever().next() {
        info!(signal, "termination signal received");
        stop.request_stop();
    } else {
        debug!("signal iterator closed without a signal");
    }
}
