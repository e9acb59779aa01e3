//! Keeping the device awake during a measurement.
//!
//! A throw measurement may take a minute or more while the user walks to the
//! landing spot. The host's idle timer is a single global flag; a
//! [`SleepGuard`] disables it for as long as the guard lives and re-enables
//! it exactly once when released or dropped.

use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Control over the host's idle/sleep timer.
pub trait IdleTimer: Send + Sync + std::fmt::Debug {
    /// Disable (`true`) or re-enable (`false`) automatic idle sleep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inhibitor`] if the platform refuses the change.
    fn set_idle_timer_disabled(&self, disabled: bool) -> Result<()>;
}

/// Scoped idle timer suppression.
///
/// Failing to engage the inhibitor is logged and otherwise ignored: a
/// measurement still works if the screen goes dark.
#[derive(Debug)]
pub struct SleepGuard {
    timer: Arc<dyn IdleTimer>,
    held: bool,
}

impl SleepGuard {
    /// Disable the idle timer until the guard is released.
    #[must_use]
    pub fn acquire(timer: Arc<dyn IdleTimer>) -> Self {
        let held = match timer.set_idle_timer_disabled(true) {
            Ok(()) => {
                debug!("Idle timer disabled");
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not disable idle timer");
                false
            }
        };
        Self { timer, held }
    }

    /// Check if the guard currently holds the idle timer off.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Re-enable the idle timer. Later calls do nothing.
    pub fn release(&mut self) {
        if !std::mem::take(&mut self.held) {
            return;
        }
        match self.timer.set_idle_timer_disabled(false) {
            Ok(()) => debug!("Idle timer re-enabled"),
            Err(e) => warn!(error = %e, "Could not re-enable idle timer"),
        }
    }
}

impl Drop for SleepGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// An idle timer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIdleTimer;

impl IdleTimer for NoopIdleTimer {
    fn set_idle_timer_disabled(&self, _disabled: bool) -> Result<()> {
        Ok(())
    }
}

/// Inhibits idle and sleep through `systemd-inhibit`.
///
/// The inhibitor lock is held by a child process for as long as the idle
/// timer is disabled; killing the child releases the lock.
#[derive(Debug)]
pub struct SystemdInhibitor {
    program: String,
    child: Mutex<Option<Child>>,
}

impl Default for SystemdInhibitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemdInhibitor {
    /// Use `systemd-inhibit` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("systemd-inhibit")
    }

    /// Use a specific `systemd-inhibit` binary.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            child: Mutex::new(None),
        }
    }

    /// Check if an inhibitor process is currently running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.child
            .lock()
            .map(|child| child.is_some())
            .unwrap_or(false)
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args([
                "--what=idle:sleep",
                "--who=discdrawer",
                "--why=Measuring a throw",
                "--mode=block",
                "sleep",
                "infinity",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Inhibitor(format!("failed to run {}: {e}", self.program)))
    }
}

impl IdleTimer for SystemdInhibitor {
    fn set_idle_timer_disabled(&self, disabled: bool) -> Result<()> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| Error::Inhibitor("inhibitor lock poisoned".to_string()))?;

        if disabled {
            if child.is_none() {
                let process = self.spawn()?;
                info!(pid = process.id(), "Sleep inhibitor engaged");
                *child = Some(process);
            }
            return Ok(());
        }

        if let Some(mut process) = child.take() {
            // already exited is fine, the lock is gone either way
            let _ = process.kill();
            let _ = process.wait();
            info!("Sleep inhibitor released");
        }
        Ok(())
    }
}

impl Drop for SystemdInhibitor {
    fn drop(&mut self) {
        if let Ok(child) = self.child.get_mut() {
            if let Some(mut process) = child.take() {
                let _ = process.kill();
                let _ = process.wait();
            }
        }
    }
}

/// An idle timer that records every change, for tests.
#[derive(Debug, Default)]
pub struct RecordingIdleTimer {
    disabled: AtomicUsize,
    enabled: AtomicUsize,
    history: Mutex<Vec<bool>>,
}

impl RecordingIdleTimer {
    /// Create a recorder with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the idle timer was disabled.
    #[must_use]
    pub fn disable_count(&self) -> usize {
        self.disabled.load(Ordering::SeqCst)
    }

    /// How many times the idle timer was re-enabled.
    #[must_use]
    pub fn enable_count(&self) -> usize {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Check if the idle timer is currently disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.history().last().copied().unwrap_or(false)
    }

    /// Every value passed to [`IdleTimer::set_idle_timer_disabled`], in order.
    #[must_use]
    pub fn history(&self) -> Vec<bool> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

impl IdleTimer for RecordingIdleTimer {
    fn set_idle_timer_disabled(&self, disabled: bool) -> Result<()> {
        if disabled {
            self.disabled.fetch_add(1, Ordering::SeqCst);
        } else {
            self.enabled.fetch_add(1, Ordering::SeqCst);
        }
        if let Ok(mut history) = self.history.lock() {
            history.push(disabled);
        }
        Ok(())
    }
}
