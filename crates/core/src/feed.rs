//! Status change feed.
//!
//! Polls the status table on a short interval and delivers snapshots whose
//! `updated_at` moved past the cursor. The query boundary is inclusive so a
//! change landing exactly on the cursor timestamp is never dropped; a set of
//! already-delivered pod ids at the boundary suppresses the duplicates that
//! inclusivity would otherwise produce.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use podhost_store::PodStore;
use podhost_types::{PodId, PodStatusRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CHANNEL_CAPACITY: usize = 64;

pub struct StatusFeed {
    store: Arc<dyn PodStore>,
    interval: Duration,
}

struct Cursor {
    last_seen_at: DateTime<Utc>,
    /// Pods already delivered at exactly `last_seen_at`.
    delivered_at_boundary: HashSet<PodId>,
}

impl Cursor {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            last_seen_at: start,
            delivered_at_boundary: HashSet::new(),
        }
    }

    /// Returns the changes not yet delivered, then advances the cursor.
    fn advance(&mut self, changes: Vec<PodStatusRecord>) -> Vec<PodStatusRecord> {
        let fresh: Vec<PodStatusRecord> = changes
            .into_iter()
            .filter(|change| {
                change.updated_at > self.last_seen_at
                    || !self.delivered_at_boundary.contains(&change.pod_id)
            })
            .collect();

        if let Some(newest) = fresh.iter().map(|c| c.updated_at).max() {
            if newest > self.last_seen_at {
                self.last_seen_at = newest;
                self.delivered_at_boundary.clear();
            }
            for change in &fresh {
                if change.updated_at == self.last_seen_at {
                    self.delivered_at_boundary.insert(change.pod_id);
                }
            }
        }
        fresh
    }
}

impl StatusFeed {
    pub fn new(store: Arc<dyn PodStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Starts polling; returns the receiving end of the feed. The task exits
    /// when the shutdown signal flips or the receiver is dropped.
    pub fn subscribe(self, mut shutdown: watch::Receiver<bool>) -> mpsc::Receiver<PodStatusRecord> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut cursor = Cursor::new(Utc::now());
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.poll(&mut cursor, &tx).await {
                            match err {
                                PollEnd::ReceiverGone => return,
                                PollEnd::Store(err) => {
                                    warn!(error = %err, "status feed poll failed");
                                }
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!("status feed stopping");
                            return;
                        }
                    }
                }
            }
        });
        rx
    }

    async fn poll(
        &self,
        cursor: &mut Cursor,
        tx: &mpsc::Sender<PodStatusRecord>,
    ) -> Result<(), PollEnd> {
        let changes = self
            .store
            .status_changes_since(cursor.last_seen_at)
            .await
            .map_err(|e| PollEnd::Store(CoreError::from(e)))?;
        for change in cursor.advance(changes) {
            tx.send(change).await.map_err(|_| PollEnd::ReceiverGone)?;
        }
        Ok(())
    }
}

enum PollEnd {
    ReceiverGone,
    Store(CoreError),
}
