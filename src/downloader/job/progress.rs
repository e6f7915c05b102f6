//! Aggregated fetch progress.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Byte counters of one unit
#[derive(Default)]
struct UnitCounter {
    downloaded: AtomicU64,
    /// `downloaded` at the last report pushed for this unit
    reported: AtomicU64,
}

/// Progress state shared by the fetch tasks of one job
///
/// Byte counting is lock-free and each unit only touches its own counters. The
/// aggregate percentage is `sum(downloaded) * 100 / sum(declared)`, clamped to
/// 100. Computing and delivering a report happen under one lock, so the
/// delivered sequence never decreases even when units race.
pub(crate) struct ProgressTracker {
    units: Vec<UnitCounter>,
    declared: AtomicU64,
    completed: AtomicUsize,
    /// Last percentage handed to a delivery callback
    delivered: Mutex<u8>,
    threshold: u64,
}

impl ProgressTracker {
    pub(crate) fn new(units: usize, threshold: u64) -> Self {
        Self {
            units: (0..units).map(|_| UnitCounter::default()).collect(),
            declared: AtomicU64::new(0),
            completed: AtomicUsize::new(0),
            delivered: Mutex::new(0),
            threshold: threshold.max(1),
        }
    }

    /// Add a unit's declared length to the total
    pub(crate) fn add_declared(&self, len: u64) {
        self.declared.fetch_add(len, Ordering::Relaxed);
    }

    /// Record `bytes` more for `unit`
    ///
    /// Once the unit advanced by at least the threshold since its last report,
    /// the aggregate percentage is passed to `deliver` and returned.
    pub(crate) fn advance(&self, unit: usize, bytes: u64, deliver: impl FnOnce(u8)) -> Option<u8> {
        let counter = self.units.get(unit)?;
        let downloaded = counter.downloaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let reported = counter.reported.load(Ordering::Relaxed);
        if downloaded.saturating_sub(reported) < self.threshold {
            return None;
        }
        counter.reported.store(downloaded, Ordering::Relaxed);
        Some(self.publish(false, deliver))
    }

    /// Mark `unit` as fetched and deliver the aggregate percentage
    pub(crate) fn complete(&self, unit: usize, deliver: impl FnOnce(u8)) -> u8 {
        if let Some(counter) = self.units.get(unit) {
            counter
                .reported
                .store(counter.downloaded.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.publish(completed >= self.units.len(), deliver)
    }

    /// Current aggregate percentage, never below a delivered one
    pub(crate) fn percent(&self) -> u8 {
        let last = *self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        self.raw_percent().max(last)
    }

    fn publish(&self, finished: bool, deliver: impl FnOnce(u8)) -> u8 {
        let mut last = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        let percent = if finished { 100 } else { self.raw_percent() }.max(*last);
        *last = percent;
        deliver(percent);
        percent
    }

    fn raw_percent(&self) -> u8 {
        let downloaded: u64 = self
            .units
            .iter()
            .map(|u| u.downloaded.load(Ordering::Relaxed))
            .sum();
        // Never divide by zero while no unit has declared a length
        let total = self.declared.load(Ordering::Relaxed).max(1);
        (u128::from(downloaded) * 100 / u128::from(total)).min(100) as u8
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reports_only_after_threshold() {
        let tracker = ProgressTracker::new(1, 100);
        tracker.add_declared(1000);

        assert_eq!(tracker.advance(0, 60, |_| {}), None);
        assert_eq!(tracker.advance(0, 60, |_| {}), Some(12));
        assert_eq!(tracker.advance(0, 99, |_| {}), None);
        assert_eq!(tracker.advance(0, 1, |_| {}), Some(22));
    }

    #[test]
    fn test_without_declared_length_is_bounded() {
        let tracker = ProgressTracker::new(2, 1);
        assert_eq!(tracker.percent(), 0);
        assert_eq!(tracker.advance(0, 5000, |_| {}), Some(100));
        assert_eq!(tracker.percent(), 100);
    }

    #[test]
    fn test_percent_never_decreases_when_total_grows() {
        let tracker = ProgressTracker::new(2, 1);
        tracker.add_declared(100);
        assert_eq!(tracker.advance(0, 80, |_| {}), Some(80));

        // Second unit opens late and doubles the total
        tracker.add_declared(100);
        assert_eq!(tracker.percent(), 80);
        assert_eq!(tracker.advance(1, 90, |_| {}), Some(85));
    }

    #[test]
    fn test_completion_of_last_unit_reports_full() {
        let tracker = ProgressTracker::new(2, u64::MAX);
        tracker.add_declared(1000);
        tracker.advance(0, 300, |_| {});
        assert_eq!(tracker.complete(0, |_| {}), 30);
        tracker.advance(1, 100, |_| {});
        assert_eq!(tracker.complete(1, |_| {}), 100);
    }

    #[test]
    fn test_unknown_unit_is_ignored() {
        let tracker = ProgressTracker::new(1, 1);
        assert_eq!(tracker.advance(3, 10, |_| {}), None);
    }

    #[tokio::test]
    async fn test_concurrent_units_do_not_interfere() {
        let tracker = Arc::new(ProgressTracker::new(8, 1));
        tracker.add_declared(8 * 1000);

        let mut handles = Vec::new();
        for unit in 0..8 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..100 {
                    if let Some(p) = tracker.advance(unit, 10, |_| {}) {
                        assert!(p <= 100);
                        last = p;
                    }
                    tokio::task::yield_now().await;
                }
                last
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(tracker.percent(), 100);
    }

    #[test]
    fn test_delivered_sequence_never_decreases_across_threads() {
        for _ in 0..50 {
            let tracker = ProgressTracker::new(4, 1);
            tracker.add_declared(4 * 2000);
            let delivered = Mutex::new(Vec::new());

            std::thread::scope(|scope| {
                for unit in 0..4 {
                    let tracker = &tracker;
                    let delivered = &delivered;
                    scope.spawn(move || {
                        for _ in 0..2000 {
                            tracker.advance(unit, 1, |p| delivered.lock().unwrap().push(p));
                        }
                        tracker.complete(unit, |p| delivered.lock().unwrap().push(p));
                    });
                }
            });

            let delivered = delivered.into_inner().unwrap();
            assert!(
                delivered.windows(2).all(|pair| pair[0] <= pair[1]),
                "out of order: {:?}",
                delivered
            );
            assert_eq!(delivered.last(), Some(&100));
        }
    }
}
