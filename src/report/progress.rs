//! Encode progress rendering
//!
//! Codec sessions call their sink from worker threads; sinks forward events
//! over a tokio channel to one render task that owns the progress bars.

use std::collections::BTreeMap;
use std::sync::Arc;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use crate::bench::{ProgressSource, TaskId};
use crate::codec::ProgressSink;

/// Width of the textual indicator, in columns
pub const BAR_WIDTH: usize = 40;

/// Filled and empty cells of the indicator
const BAR_CHARS: &str = "-- ";

/// Progress notification of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub task: TaskId,
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

/// Sink handed to one task; forwards every callback as a [`ProgressEvent`].
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    task: TaskId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, bytes_processed: u64, total_bytes: u64) {
        // A closed renderer only means nobody is watching.
        let _ = self.tx.send(ProgressEvent {
            task: self.task,
            bytes_processed,
            total_bytes,
        });
    }
}

/// Source of per-task sinks feeding a single render task.
///
/// The render task finishes once the hub and every sink it handed out are
/// dropped, returning the last event seen for each task.
#[derive(Debug)]
pub struct ProgressHub {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressHub {
    /// Start rendering to stderr. Must be called inside a tokio runtime.
    pub fn start() -> (Arc<Self>, JoinHandle<BTreeMap<TaskId, ProgressEvent>>) {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(
        target: ProgressDrawTarget,
    ) -> (Arc<Self>, JoinHandle<BTreeMap<TaskId, ProgressEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let multi = MultiProgress::with_draw_target(target);
        let handle = tokio::spawn(render_loop(multi, rx));
        (Arc::new(Self { tx }), handle)
    }
}

impl ProgressSource for ProgressHub {
    fn sink_for(&self, task: TaskId) -> Box<dyn ProgressSink> {
        Box::new(ChannelProgress {
            task,
            tx: self.tx.clone(),
        })
    }
}

fn bar_template() -> String {
    format!("{{prefix}} [{{bar:{}}}] {{percent:>3}}%", BAR_WIDTH)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(&bar_template())
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(BAR_CHARS)
}

async fn render_loop(
    multi: MultiProgress,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
) -> BTreeMap<TaskId, ProgressEvent> {
    let mut bars: BTreeMap<TaskId, ProgressBar> = BTreeMap::new();
    let mut last: BTreeMap<TaskId, ProgressEvent> = BTreeMap::new();

    while let Some(event) = rx.recv().await {
        let bar = bars.entry(event.task).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(event.total_bytes));
            bar.set_style(bar_style());
            bar.set_prefix(event.task.to_string());
            bar
        });
        bar.set_length(event.total_bytes);
        bar.set_position(event.bytes_processed);
        last.insert(event.task, event);
    }

    for bar in bars.values() {
        bar.finish_and_clear();
    }
    last
}
