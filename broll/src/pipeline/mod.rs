//! Segment pipeline.
//!
//! Turns an ordered list of narration segments into one encoded clip per
//! segment, acquiring media through the orchestrator and reporting progress
//! to a [`JobTracker`].

pub mod fetcher;
pub mod runner;
pub mod segment;
pub mod tracker;

pub use fetcher::{AssetFetcher, HttpAssetFetcher};
pub use runner::{PipelineSettings, RunReport, SegmentOutcome, SegmentPipeline, SegmentReport};
pub use segment::{Segment, SegmentSource, TranscriptFile};
pub use tracker::{JobTracker, RepositoryJobTracker};
