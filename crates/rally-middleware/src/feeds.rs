//! Single-slot latest-value sensor feeds.
//!
//! Uses [`tokio::sync::watch`] channels under the hood: a producer overwrites
//! the slot, bursts coalesce, and a slow reader only ever sees the newest
//! value, never a backlog.
//!
//! # Feeds
//!
//! | Feed | Reading |
//! |---|---|
//! | `line` | main line centroid ([`LineReading`]) |
//! | `ramp_line` | ramp line centroid ([`LineReading`]) |
//! | `stop_line` | lowest red blob row ([`StopLine`]) |
//! | `scan` | planar range scan ([`RangeScan`]) |
//! | `markers` | AR markers in the current frame |
//! | `odometry` | robot pose in `odom` ([`Pose`]) |
//!
//! # Example
//!
//! ```rust
//! use rally_middleware::feeds::LatestCell;
//!
//! let cell = LatestCell::new();
//! let mut reader = cell.subscribe();
//!
//! cell.publish(1);
//! cell.publish(2);
//! cell.publish(3);
//!
//! // Only the newest value survives.
//! assert_eq!(reader.fresh(), Some(3));
//! assert_eq!(reader.fresh(), None);
//! assert_eq!(reader.latest(), Some(3));
//! ```

use std::sync::Arc;
use std::time::Duration;

use rally_types::{LineReading, MarkerObservation, Pose, RangeScan, StopLine};
use tokio::sync::watch;
use tracing::debug;

/// Producer side of one feed.  Clone it cheaply – all clones share the same
/// slot.
#[derive(Debug)]
pub struct LatestCell<T> {
    sender: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for LatestCell<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> LatestCell<T> {
    /// An empty slot.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Overwrite the slot.  Never blocks and never fails, with or without
    /// readers.
    pub fn publish(&self, value: T) {
        self.sender.send_replace(Some(value));
    }

    pub fn latest(&self) -> Option<T> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> FeedReader<T> {
        FeedReader {
            receiver: self.sender.subscribe(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of one feed.
#[derive(Debug, Clone)]
pub struct FeedReader<T> {
    receiver: watch::Receiver<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> FeedReader<T> {
    /// Newest value, seen or not.
    pub fn latest(&self) -> Option<T> {
        self.receiver.borrow().clone()
    }

    /// Newest value if it arrived since the last `fresh`/`next_within` call.
    pub fn fresh(&mut self) -> Option<T> {
        if self.receiver.has_changed().unwrap_or(false) {
            self.receiver.borrow_and_update().clone()
        } else {
            None
        }
    }

    /// Mark the current value as seen so only later publications count as
    /// fresh.
    pub fn mark_seen(&mut self) {
        self.receiver.borrow_and_update();
    }

    /// Wait up to `limit` for a value newer than the last one seen.
    ///
    /// Returns `None` on timeout or when every producer is gone.
    pub async fn next_within(&mut self, limit: Duration) -> Option<T> {
        let receiver = &mut self.receiver;
        let wait = async move {
            loop {
                receiver.changed().await.ok()?;
                if let Some(value) = receiver.borrow_and_update().clone() {
                    return Some(value);
                }
            }
        };
        match tokio::time::timeout(limit, wait).await {
            Ok(value) => value,
            Err(_) => {
                debug!(?limit, "feed read timed out");
                None
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor bundle
// ────────────────────────────────────────────────────────────────────────────

/// Producer handles for every sensor feed the mission consumes.
#[derive(Debug, Clone, Default)]
pub struct SensorFeeds {
    pub line: LatestCell<LineReading>,
    pub ramp_line: LatestCell<LineReading>,
    pub stop_line: LatestCell<StopLine>,
    pub scan: LatestCell<RangeScan>,
    pub markers: LatestCell<Vec<MarkerObservation>>,
    pub odometry: LatestCell<Pose>,
}

impl SensorFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readers(&self) -> SensorReaders {
        SensorReaders {
            line: self.line.subscribe(),
            ramp_line: self.ramp_line.subscribe(),
            stop_line: self.stop_line.subscribe(),
            scan: self.scan.subscribe(),
            markers: self.markers.subscribe(),
            odometry: self.odometry.subscribe(),
        }
    }
}

/// Reader handles matching [`SensorFeeds`].
#[derive(Debug, Clone)]
pub struct SensorReaders {
    pub line: FeedReader<LineReading>,
    pub ramp_line: FeedReader<LineReading>,
    pub stop_line: FeedReader<StopLine>,
    pub scan: FeedReader<RangeScan>,
    pub markers: FeedReader<Vec<MarkerObservation>>,
    pub odometry: FeedReader<Pose>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_reads_none() {
        let cell: LatestCell<u32> = LatestCell::new();
        let mut reader = cell.subscribe();
        assert_eq!(cell.latest(), None);
        assert_eq!(reader.latest(), None);
        assert_eq!(reader.fresh(), None);
    }

    #[test]
    fn publish_without_readers_keeps_value() {
        let cell = LatestCell::new();
        cell.publish("scan");
        assert_eq!(cell.latest(), Some("scan"));
        // A reader created later still sees the slot.
        assert_eq!(cell.subscribe().latest(), Some("scan"));
    }

    #[test]
    fn bursts_coalesce_to_newest() {
        let cell = LatestCell::new();
        let mut reader = cell.subscribe();
        for i in 0..1_000 {
            cell.publish(i);
        }
        assert_eq!(reader.fresh(), Some(999));
        assert_eq!(reader.fresh(), None);
    }

    #[test]
    fn clones_share_one_slot() {
        let cell = LatestCell::new();
        let producer = cell.clone();
        let mut reader = cell.subscribe();
        producer.publish(7u8);
        assert_eq!(reader.fresh(), Some(7));
    }

    #[tokio::test]
    async fn next_within_times_out_without_new_value() {
        let cell = LatestCell::new();
        cell.publish(1);
        let mut reader = cell.subscribe();
        reader.mark_seen();

        let got = reader.next_within(Duration::from_millis(20)).await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn next_within_wakes_on_publish() {
        let cell = LatestCell::new();
        let mut reader = cell.subscribe();
        let producer = cell.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.publish(42u32);
        });

        let got = reader.next_within(Duration::from_secs(2)).await;
        assert_eq!(got, Some(42));
        handle.await.unwrap();
    }

    #[test]
    fn sensor_bundle_routes_each_feed() {
        let feeds = SensorFeeds::new();
        let mut readers = feeds.readers();

        feeds.stop_line.publish(StopLine { row: Some(410.0) });
        feeds.line.publish(LineReading::Lost);

        assert_eq!(readers.stop_line.fresh(), Some(StopLine { row: Some(410.0) }));
        assert_eq!(readers.line.fresh(), Some(LineReading::Lost));
        assert_eq!(readers.ramp_line.fresh(), None);
        assert!(readers.markers.latest().is_none());
    }
}
