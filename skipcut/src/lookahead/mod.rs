//! Range-detection collaborator
//!
//! The detector analyzes the media ahead of real-time playback and predicts
//! skippable ranges. The engine only consumes its predictions; it never
//! decides what is silent.

pub mod static_ranges;

use async_trait::async_trait;
use std::sync::Arc;

use skipcut_common::{DetectorParams, MediaTime, RangeQueryResult};

use crate::error::Result;

pub use static_ranges::{StaticPredictorFactory, StaticRangePredictor};

/// Predicts upcoming skippable ranges
#[async_trait]
pub trait RangePredictor: Send + Sync {
    /// Prepare the detector; idempotent
    async fn ensure_initialized(&self) -> Result<()>;

    /// Next range with `end > position`, if one is known
    fn next_skippable_range(&self, position: MediaTime) -> Option<RangeQueryResult>;

    /// Whether the detector has stopped producing predictions
    fn has_failed(&self) -> bool {
        false
    }

    /// Release detector resources; idempotent
    fn dispose(&self);
}

/// Creates detectors for a given set of detector parameters
///
/// Used on session start and whenever detector-affecting settings change.
pub trait PredictorFactory: Send + Sync {
    fn create(&self, params: &DetectorParams) -> Arc<dyn RangePredictor>;
}
