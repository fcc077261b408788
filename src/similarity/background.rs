//! Running a search off the caller's thread.

use super::engine::{SearchError, SimilaritySearchEngine};
use super::video::FrameSource;
use super::SimilarityPair;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Receives progress updates. Purely observational.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

/// Forwards progress over a channel
pub struct ChannelProgress(Sender<ProgressEvent>);

impl ProgressSink for ChannelProgress {
    fn report(&self, percent: u8, message: &str) {
        // the receiver may already be gone
        let _ = self.0.send(ProgressEvent {
            percent,
            message: message.to_string(),
        });
    }
}

/// Shared cooperative cancellation flag. Checked between files and between
/// candidate pairs, never inside a decode.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A search running on its own thread
pub struct SearchHandle {
    cancel: CancelFlag,
    events: Receiver<ProgressEvent>,
    thread: JoinHandle<Result<Vec<SimilarityPair>, SearchError>>,
}

impl SearchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the next progress event, or `None` once the search is done.
    pub fn next_progress(&self) -> Option<ProgressEvent> {
        self.events.recv().ok()
    }

    pub fn join(self) -> Result<Vec<SimilarityPair>, SearchError> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(SearchError::Io(anyhow::anyhow!("search thread panicked"))))
    }
}

/// Start `find_similar` on a background thread.
pub fn spawn_search<S>(
    engine: Arc<SimilaritySearchEngine<S>>,
    paths: Vec<PathBuf>,
    threshold: f64,
) -> SearchHandle
where
    S: FrameSource + 'static,
{
    let cancel = CancelFlag::new();
    let (sender, events) = mpsc::channel();
    let sink = ChannelProgress(sender);

    let thread = {
        let cancel = cancel.clone();
        thread::spawn(move || engine.find_similar_with(&paths, threshold, &sink, &cancel))
    };

    SearchHandle {
        cancel,
        events,
        thread,
    }
}
