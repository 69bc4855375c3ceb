pub mod aggregator;
pub mod cancellation;
pub mod dedup_index;
pub mod ingestion;
pub mod merge_committer;
pub mod report;
pub mod staging_loader;

pub use aggregator::{AggregationSummary, Aggregator};
pub use cancellation::CancellationFlag;
pub use dedup_index::DedupIndex;
pub use ingestion::IngestionPipeline;
pub use merge_committer::{CommitSummary, MergeCommitter};
pub use report::{IngestionReport, Rejection, RejectionReport};
pub use staging_loader::{StagingArea, StagingLoader};
