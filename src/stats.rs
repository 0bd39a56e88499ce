//! Statistics reported by fills and activations.

use std::time::{Duration, Instant};

/// Statistics for one bulk fill of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillStats {
    /// Number of resources fetched and stored.
    pub resources_stored: usize,
    /// Number of resources skipped because they were already cached.
    pub resources_skipped: usize,
    /// Total body bytes stored.
    pub total_bytes: u64,
    /// Time taken by the fill.
    pub elapsed: Duration,
}

impl Default for FillStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FillStats {
    /// Creates empty fill stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resources_stored: 0,
            resources_skipped: 0,
            total_bytes: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns the average transfer speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Builder for accumulating fill statistics.
pub struct FillStatsBuilder {
    resources_stored: usize,
    resources_skipped: usize,
    total_bytes: u64,
    start_time: Instant,
}

impl Default for FillStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FillStatsBuilder {
    /// Creates a builder and starts its clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources_stored: 0,
            resources_skipped: 0,
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Sets the number of skipped resources.
    pub const fn set_skipped(&mut self, count: usize) {
        self.resources_skipped = count;
    }

    /// Records one stored resource of the given size.
    pub const fn add_stored(&mut self, bytes: u64) {
        self.resources_stored += 1;
        self.total_bytes += bytes;
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(self) -> FillStats {
        FillStats {
            resources_stored: self.resources_stored,
            resources_skipped: self.resources_skipped,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// What a successful activation did to the content store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// True when no previous manifest record existed.
    pub first_activation: bool,
    /// Paths removed from the content store.
    pub evicted: Vec<String>,
    /// Paths kept in the content store because their fingerprint is unchanged.
    pub retained: Vec<String>,
    /// URLs copied from the temporary store into the content store.
    pub promoted: Vec<String>,
}

impl ActivationReport {
    /// Returns a one-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} evicted, {} retained, {} promoted{}",
            self.evicted.len(),
            self.retained.len(),
            self.promoted.len(),
            if self.first_activation { " (first activation)" } else { "" }
        )
    }
}
