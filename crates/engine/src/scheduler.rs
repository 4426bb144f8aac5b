//! Windowed batch scheduling
//!
//! The manifest is cut into windows of at most `window` entries. Entries in a
//! window run concurrently, one per worker slot; windows run strictly one after
//! another, so no more than `window` checks are ever in flight.

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

use sitegate_common::{ComparisonResult, PageManifestEntry, PathManifest};

use crate::report::ReportAggregator;

/// One kind of per-path check
#[async_trait]
pub trait PageChecker: Send + Sync {
    /// State owned by one worker slot and reused across the windows it serves
    type Slot: Default + Send;

    /// Check one entry. Every failure is folded into the returned result.
    async fn check(&self, slot: &mut Self::Slot, entry: &PageManifestEntry) -> ComparisonResult;

    /// Drop whatever the slot holds after its item was abandoned mid-flight
    fn discard(&self, slot: &mut Self::Slot) {
        *slot = Self::Slot::default();
    }

    /// Release the slot at the end of a run
    async fn release(&self, _slot: Self::Slot) {}
}

/// Drives manifest entries through a checker in bounded windows
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    window: usize,
    item_timeout: Duration,
}

impl BatchScheduler {
    /// `window` is clamped to at least one
    pub fn new(window: usize, item_timeout: Duration) -> Self {
        Self {
            window: window.max(1),
            item_timeout,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Run every entry, record exactly one result per entry, and return the
    /// number of windows executed
    pub async fn run<C: PageChecker>(
        &self,
        checker: &C,
        manifest: &PathManifest,
        aggregator: &mut ReportAggregator,
    ) -> usize {
        let mut slots: Vec<C::Slot> = (0..self.window).map(|_| C::Slot::default()).collect();
        let total_windows = manifest.len().div_ceil(self.window);
        let mut windows = 0;

        for (index, window) in manifest.entries().chunks(self.window).enumerate() {
            info!(
                "Window {}/{}: checking {} page(s)",
                index + 1,
                total_windows,
                window.len()
            );

            let items = window
                .iter()
                .zip(slots.iter_mut())
                .map(|(entry, slot)| self.run_item(checker, slot, entry));

            for result in join_all(items).await {
                debug!("{} -> {}", result.path, result.status);
                aggregator.record(result);
            }
            windows += 1;
        }

        for slot in slots {
            checker.release(slot).await;
        }

        windows
    }

    async fn run_item<C: PageChecker>(
        &self,
        checker: &C,
        slot: &mut C::Slot,
        entry: &PageManifestEntry,
    ) -> ComparisonResult {
        let outcome = timeout(self.item_timeout, checker.check(slot, entry)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                checker.discard(slot);
                let message = format!(
                    "Check timed out after {}s",
                    self.item_timeout.as_secs_f64()
                );
                error!("{}: {}", entry, message);
                ComparisonResult::error(entry.path.clone(), message)
            }
        }
    }
}
