//! Serialised access to the terminal.
//!
//! The [`TerminalCoordinator`] owns the single activity indicator and
//! funnels every write through one mutex, so spinner frames, streamed model
//! text, subprocess output and confirmation prompts never interleave.
//!
//! ```text
//!   Idle ──start_thinking──▶ Thinking ──start_tool──▶ ToolRunning
//!    ▲                                                     │
//!    └──────────────────────────── idle ◀──────────────────┘
//!
//!   any non-Locked state ──lock()──▶ Locked ──guard dropped / force_idle──▶ Idle
//! ```

use crate::ui_writer::{OutputStream, UiWriter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

pub const DEFAULT_MIN_DWELL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Idle,
    Thinking,
    ToolRunning,
    Locked,
}

struct Inner {
    state: TerminalState,
    indicator_visible: bool,
    last_transition: Instant,
    /// Bumped on every lock and forced idle; a guard only releases the lock
    /// it acquired.
    lock_generation: u64,
}

pub struct TerminalCoordinator {
    writer: Arc<dyn UiWriter>,
    inner: Mutex<Inner>,
    min_dwell: Duration,
}

impl TerminalCoordinator {
    pub fn new(writer: Arc<dyn UiWriter>) -> Self {
        Self {
            writer,
            inner: Mutex::new(Inner {
                state: TerminalState::Idle,
                indicator_visible: false,
                last_transition: Instant::now(),
                lock_generation: 0,
            }),
            min_dwell: DEFAULT_MIN_DWELL,
        }
    }

    pub fn with_min_dwell(mut self, min_dwell: Duration) -> Self {
        self.min_dwell = min_dwell;
        self
    }

    pub fn state(&self) -> TerminalState {
        self.inner().state
    }

    pub fn is_locked(&self) -> bool {
        self.state() == TerminalState::Locked
    }

    /// Show the "thinking" indicator. Returns false if the terminal is locked.
    pub async fn start_thinking(&self) -> bool {
        self.transition(TerminalState::Thinking, Some("Thinking...")).await
    }

    /// Show the tool indicator with `message`. Returns false if the terminal is locked.
    pub async fn start_tool(&self, message: &str) -> bool {
        self.transition(TerminalState::ToolRunning, Some(message)).await
    }

    /// Clear any indicator. Returns false if the terminal is locked.
    pub async fn idle(&self) -> bool {
        self.transition(TerminalState::Idle, None).await
    }

    async fn transition(&self, target: TerminalState, message: Option<&str>) -> bool {
        let wait = {
            let inner = self.inner();
            if inner.state == TerminalState::Locked {
                trace!("Ignoring {:?} transition while locked", target);
                return false;
            }
            if inner.state == TerminalState::Idle && target == TerminalState::Idle {
                return true;
            }
            self.min_dwell.saturating_sub(inner.last_transition.elapsed())
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut inner = self.inner();
        // Re-check: a lock may have been taken while we slept.
        if inner.state == TerminalState::Locked {
            return false;
        }
        self.hide_indicator(&mut inner);
        trace!("Terminal {:?} -> {:?}", inner.state, target);
        inner.state = target;
        inner.last_transition = Instant::now();
        if let Some(message) = message {
            self.writer.start_indicator(message);
            inner.indicator_visible = true;
        }
        true
    }

    /// Take exclusive use of the terminal for an interactive exchange.
    ///
    /// Returns `None` if it is already locked. While the returned guard
    /// lives, state transitions are ignored; dropping it returns to Idle.
    pub fn lock(&self) -> Option<TerminalLock<'_>> {
        let mut inner = self.inner();
        if inner.state == TerminalState::Locked {
            return None;
        }
        self.hide_indicator(&mut inner);
        inner.state = TerminalState::Locked;
        inner.last_transition = Instant::now();
        inner.lock_generation += 1;
        Some(TerminalLock {
            coordinator: self,
            generation: inner.lock_generation,
        })
    }

    /// Return to Idle immediately, overriding a lock. Used when a signal
    /// interrupts whatever was on screen.
    pub fn force_idle(&self) {
        let mut inner = self.inner();
        self.hide_indicator(&mut inner);
        inner.state = TerminalState::Idle;
        inner.last_transition = Instant::now();
        inner.lock_generation += 1;
    }

    pub fn print(&self, text: &str) {
        let mut inner = self.inner();
        self.hide_indicator(&mut inner);
        self.writer.print(text);
        self.writer.flush();
    }

    pub fn println(&self, text: &str) {
        let mut inner = self.inner();
        self.hide_indicator(&mut inner);
        self.writer.println(text);
    }

    /// Echo a piece of subprocess output on the matching stream.
    pub fn write_output(&self, stream: OutputStream, text: &str) {
        let mut inner = self.inner();
        self.hide_indicator(&mut inner);
        match stream {
            OutputStream::Stdout => self.writer.print(text),
            OutputStream::Stderr => self.writer.print_stderr(text),
        }
        self.writer.flush();
    }

    fn hide_indicator(&self, inner: &mut Inner) {
        if inner.indicator_visible {
            self.writer.stop_indicator();
            inner.indicator_visible = false;
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive terminal access; see [`TerminalCoordinator::lock`].
pub struct TerminalLock<'a> {
    coordinator: &'a TerminalCoordinator,
    generation: u64,
}

impl TerminalLock<'_> {
    pub fn print(&self, text: &str) {
        let _inner = self.coordinator.inner();
        self.coordinator.writer.print(text);
        self.coordinator.writer.flush();
    }

    pub fn println(&self, text: &str) {
        let _inner = self.coordinator.inner();
        self.coordinator.writer.println(text);
    }

    pub fn read_key(&self, prompt: &str) -> std::io::Result<char> {
        self.coordinator.writer.read_key(prompt)
    }
}

impl Drop for TerminalLock<'_> {
    fn drop(&mut self) {
        let mut inner = self.coordinator.inner();
        if inner.state == TerminalState::Locked && inner.lock_generation == self.generation {
            inner.state = TerminalState::Idle;
            inner.last_transition = Instant::now();
        }
    }
}
