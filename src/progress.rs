//! Throttled progress reporting to a remote status message and the console
//!
//! The remote status message is a single-owner resource: only the dispatcher
//! task spawned by [`StatusDispatcher::spawn`] ever calls the [`StatusSink`].
//! Everything else, async stages and blocking workers alike, holds a cheap
//! [`StatusHandle`] that only enqueues text. Updates are applied in the order
//! they were enqueued.
//!
//! ```no_run
//! use stickerpack_dl::progress::{ProgressReporter, StatusDispatcher, StatusSink};
//! use std::sync::Arc;
//!
//! # async fn example(sink: Arc<dyn StatusSink>) {
//! let dispatcher = StatusDispatcher::spawn(sink);
//! let reporter = ProgressReporter::new("Converting", 10, dispatcher.handle(), "Convert");
//!
//! let worker = tokio::task::spawn_blocking(move || {
//!     for i in 1..=10 {
//!         reporter.report(i);
//!     }
//!     reporter.complete("done");
//! });
//! worker.await.ok();
//! dispatcher.close().await;
//! # }
//! ```

use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Minimum percentage change that forces an emission
const MIN_PERCENT_STEP: u32 = 2;

/// Minimum wall-clock gap that allows an emission for any percentage change
const MIN_EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Width of the text progress bar, in cells
const BAR_WIDTH: usize = 20;

/// Remote status message that progress text is written to
///
/// Implementations replace the whole text of one message (for Telegram, an
/// `editMessageText` on the status message of the run).
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Replace the status text
    async fn set_status(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Local console line sink, written synchronously on every emission
pub trait ConsoleSink: Send + Sync {
    /// Write one progress line
    fn write_line(&self, line: &str);
}

/// Console sink that forwards progress lines to `tracing`
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "stickerpack_dl::progress", "{}", line);
    }
}

enum StatusCommand {
    Set(String),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Owner of the status sink; applies queued updates one at a time
pub struct StatusDispatcher {
    tx: mpsc::UnboundedSender<StatusCommand>,
    task: JoinHandle<()>,
}

impl StatusDispatcher {
    /// Spawn the dispatcher task on the current runtime
    ///
    /// Must be called from within a Tokio runtime; the spawned task is the
    /// only place the sink is used.
    pub fn spawn(sink: Arc<dyn StatusSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    StatusCommand::Set(text) => {
                        // Progress must never fail the pipeline
                        if let Err(e) = sink.set_status(&text).await {
                            debug!(error = %e, "status update rejected");
                        }
                    }
                    StatusCommand::Flush(ack) => {
                        ack.send(()).ok();
                    }
                    StatusCommand::Shutdown => break,
                }
            }
        });

        Self { tx, task }
    }

    /// Handle for enqueueing updates from any context
    pub fn handle(&self) -> StatusHandle {
        StatusHandle {
            tx: self.tx.clone(),
        }
    }

    /// Apply every pending update and stop the dispatcher
    ///
    /// Updates enqueued after this call are dropped.
    pub async fn close(self) {
        self.tx.send(StatusCommand::Shutdown).ok();
        if let Err(e) = self.task.await {
            debug!(error = %e, "status dispatcher ended abnormally");
        }
    }
}

/// Cloneable, non-blocking handle to a [`StatusDispatcher`]
#[derive(Clone)]
pub struct StatusHandle {
    tx: mpsc::UnboundedSender<StatusCommand>,
}

impl StatusHandle {
    /// Enqueue a status text; never blocks, never fails
    pub fn set(&self, text: impl Into<String>) {
        if self.tx.send(StatusCommand::Set(text.into())).is_err() {
            debug!("status dispatcher closed, dropping update");
        }
    }

    /// Wait until every update enqueued so far has been applied
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(StatusCommand::Flush(ack_tx)).is_ok() {
            ack_rx.await.ok();
        }
    }
}

/// Values computed for one emission
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSnapshot {
    /// Items done (clamped to `total`)
    pub current: usize,
    /// Items expected (at least 1)
    pub total: usize,
    /// `current * 100 / total`
    pub percent: u32,
    /// Items per second since the reporter was created
    pub rate: f64,
    /// Seconds left at the current rate; `None` when the rate is zero or not finite
    pub eta_secs: Option<f64>,
    /// Whether this is the completion emission
    pub done: bool,
}

impl ProgressSnapshot {
    fn compute(current: usize, total: usize, elapsed: Duration, done: bool) -> Self {
        let total = total.max(1);
        let current = current.min(total);
        let percent = (current * 100 / total) as u32;
        let elapsed = elapsed.as_secs_f64().max(1e-6);
        let rate = current as f64 / elapsed;
        let eta = (total - current) as f64 / rate;
        let eta_secs = (rate > 0.0 && eta.is_finite()).then_some(eta);

        Self {
            current,
            total,
            percent,
            rate,
            eta_secs,
            done,
        }
    }
}

#[derive(Default)]
struct ThrottleState {
    last_percent: Option<u32>,
    last_emit: Option<Instant>,
    completed: bool,
}

/// Throttled, dual-sink progress tracker for one stage
///
/// Safe to call from async tasks and from blocking workers: emissions are
/// written to the console directly and queued to the status dispatcher.
pub struct ProgressReporter {
    label: String,
    console_label: String,
    total: usize,
    started: Instant,
    status: StatusHandle,
    console: Arc<dyn ConsoleSink>,
    state: Mutex<ThrottleState>,
}

impl ProgressReporter {
    /// Create a reporter; `total` is floored at 1
    pub fn new(
        label: impl Into<String>,
        total: usize,
        status: StatusHandle,
        console_label: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let console_label = console_label.into();
        let console_label = if console_label.is_empty() {
            label.clone()
        } else {
            console_label
        };

        Self {
            label,
            console_label,
            total: total.max(1),
            started: Instant::now(),
            status,
            console: Arc::new(TracingConsole),
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Replace the console sink
    #[must_use]
    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }

    /// Record progress; emits only when the throttle allows it
    pub fn report(&self, current: usize) {
        self.update(current, false, "");
    }

    /// Emit the completion line; only the first call has an effect
    pub fn complete(&self, extra: &str) {
        self.update(self.total, true, extra);
    }

    fn update(&self, current: usize, done: bool, extra: &str) {
        let now = Instant::now();
        let snapshot = ProgressSnapshot::compute(current, self.total, now - self.started, done);

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.completed {
                return;
            }
            if !done && !should_emit(state.last_percent, state.last_emit, snapshot.percent, now) {
                return;
            }
            state.completed = done;
            state.last_percent = Some(snapshot.percent);
            state.last_emit = Some(now);
        }

        self.console
            .write_line(&render_console(&self.console_label, &snapshot));
        self.status.set(render_status(&self.label, &snapshot, extra));
    }
}

/// Throttle rule for non-completion updates
///
/// Emit when the percentage changed and either moved by at least two points or
/// half a second passed since the previous emission.
fn should_emit(
    last_percent: Option<u32>,
    last_emit: Option<Instant>,
    percent: u32,
    now: Instant,
) -> bool {
    let Some(last_percent) = last_percent else {
        return true;
    };
    if percent == last_percent {
        return false;
    }

    let step = percent.abs_diff(last_percent);
    let waited = last_emit.is_none_or(|at| now.duration_since(at) >= MIN_EMIT_INTERVAL);
    (percent > last_percent && step >= MIN_PERCENT_STEP) || waited
}

fn render_bar(percent: u32) -> String {
    let filled = (BAR_WIDTH * percent.min(100) as usize) / 100;
    format!("{}{}", "▰".repeat(filled), "▱".repeat(BAR_WIDTH - filled))
}

fn render_eta(eta_secs: Option<f64>) -> String {
    match eta_secs {
        Some(secs) if secs > 0.0 => {
            let secs = secs as u64;
            let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
            if h > 0 {
                format!("ETA {:02}:{:02}:{:02}", h, m, s)
            } else {
                format!("ETA {:02}:{:02}", m, s)
            }
        }
        _ => "ETA --:--".to_string(),
    }
}

fn render_status(label: &str, snapshot: &ProgressSnapshot, extra: &str) -> String {
    let mut text = format!(
        "{}\n{} {}% | {}/{}\n⚡ {:.1} file/s • {}",
        label,
        render_bar(snapshot.percent),
        snapshot.percent,
        snapshot.current,
        snapshot.total,
        snapshot.rate,
        render_eta(snapshot.eta_secs)
    );
    if snapshot.done {
        text.push_str(" ✅");
    }
    if !extra.is_empty() {
        text.push('\n');
        text.push_str(extra);
    }
    text
}

fn render_console(label: &str, snapshot: &ProgressSnapshot) -> String {
    format!(
        "{}: {} {}% | {}/{} | {:.1} f/s | {}",
        label,
        render_bar(snapshot.percent),
        snapshot.percent,
        snapshot.current,
        snapshot.total,
        snapshot.rate,
        render_eta(snapshot.eta_secs)
    )
}
