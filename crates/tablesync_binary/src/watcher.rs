//! Debounces bursts of file-change notifications per attachment.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(5);

/// Collapses rapid change notifications for an attachment into a single
/// emission once the file has been quiet for the configured period.
///
/// Editors often write a file several times in quick succession; each
/// [`notify`](FileWatchDebouncer::notify) restarts that attachment's
/// quiet timer, and only the last write triggers an emission.
pub struct FileWatchDebouncer {
    quiet_period: Duration,
    generations: Arc<Mutex<HashMap<String, u64>>>,
    sender: mpsc::UnboundedSender<String>,
}

impl FileWatchDebouncer {
    /// A debouncer with the default five second quiet period. Emissions
    /// arrive on the returned receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        Self::with_quiet_period(DEFAULT_QUIET_PERIOD)
    }

    /// A debouncer with a custom quiet period.
    pub fn with_quiet_period(quiet_period: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            FileWatchDebouncer {
                quiet_period,
                generations: Arc::new(Mutex::new(HashMap::new())),
                sender,
            },
            receiver,
        )
    }

    /// Registers a change to `uid`, restarting its quiet timer.
    pub fn notify(&self, uid: &str) {
        let generation = {
            let mut generations = self.generations.lock();
            let slot = generations.entry(uid.to_string()).or_insert(0);
            *slot += 1;
            *slot
        };
        let uid = uid.to_string();
        let quiet_period = self.quiet_period;
        let generations = Arc::clone(&self.generations);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let current = {
                let mut generations = generations.lock();
                if generations.get(&uid) == Some(&generation) {
                    generations.remove(&uid);
                    true
                } else {
                    false
                }
            };
            if current {
                debug!(uid = %uid, "attachment settled");
                let _ = sender.send(uid);
            }
        });
    }
}
