use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::storage::lock;

/// Timer-reset debouncer. Each [`push`](Debouncer::push) restarts the quiet period; only the latest value is
/// ever committed. Commits are published on a `watch` channel.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    tx: Arc<watch::Sender<String>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        let (tx, _) = watch::channel(String::new());
        Self { delay, tx: Arc::new(tx), pending: Mutex::new(None) }
    }

    pub fn subscribe(&self) -> watch::Receiver<String> { self.tx.subscribe() }

    /// The last committed value.
    pub fn current(&self) -> String { self.tx.borrow().clone() }

    /// Schedules `value` to be committed after the quiet period, replacing anything still pending. Outside a
    /// tokio runtime the value is committed at once.
    pub fn push(&self, value: String) {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, committing search without debounce");
            self.commit(value);
            return;
        };
        let tx = self.tx.clone();
        let delay = self.delay;
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            trace!("debounced commit {value:?}");
            tx.send_if_modified(|current| replace_if_changed(current, value));
        }));
    }

    /// Commits `value` now, dropping anything pending.
    pub fn flush(&self, value: String) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.abort();
        }
        self.commit(value);
    }

    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.pending).take() {
            previous.abort();
        }
    }

    fn commit(&self, value: String) { self.tx.send_if_modified(|current| replace_if_changed(current, value)); }
}

fn replace_if_changed(current: &mut String, value: String) -> bool {
    if *current == value {
        return false;
    }
    *current = value;
    true
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.abort();
        }
    }
}
