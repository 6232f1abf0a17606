//! Progress reporting and cooperative cancellation for bundling runs.
//!
//! Observers are advisory: they may be called from worker threads, in any
//! order, and nothing they do feeds back into the computation.

use bevy::log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Stage of a bundling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pairwise compatibility scoring; counts edges.
    Preprocessing,
    /// Relaxation pass `index` (1-based) of `of`; counts edges.
    Pass { index: usize, of: usize },
    /// Whole relaxation schedule; counts finished passes.
    Relaxation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub completed: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Receives progress ticks.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Logs one line per 10 % step of each phase, like a console progress bar.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, event: ProgressEvent) {
        let ProgressEvent { phase, completed, total } = event;
        if total == 0 {
            return;
        }
        let decile = completed * 10 / total;
        let prev = completed.saturating_sub(1) * 10 / total;
        if completed != total && decile == prev {
            return;
        }
        match phase {
            Phase::Preprocessing => {
                info!("[BUNDLE] compatibility {}/{} edges", completed, total)
            }
            Phase::Pass { index, of } => {
                info!("[BUNDLE] pass {}/{}: {}/{} edges", index, of, completed, total)
            }
            Phase::Relaxation => info!("[BUNDLE] {}/{} passes done", completed, total),
        }
    }
}

/// Forwards events over a channel. Send errors (receiver dropped) are ignored.
pub struct ChannelProgress(Sender<ProgressEvent>);

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self(sender)
    }
}

impl ProgressObserver for ChannelProgress {
    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.0.send(event);
    }
}

/// Shared flag checked between relaxation passes.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
