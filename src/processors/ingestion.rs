use crate::settings::Settings;
use crate::error::Result;
use crate::processors::{
    CancellationFlag, DedupIndex, IngestionReport, MergeCommitter, StagingLoader,
};
use crate::readers::{discover_station_files, StationFile};
use crate::utils::progress::ProgressReporter;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One ingestion run: index existing keys, stage all files in parallel,
/// then commit the staged records atomically.
pub struct IngestionPipeline {
    pool: SqlitePool,
    max_workers: usize,
    batch_size: usize,
    commit_timeout: Duration,
    use_mmap: bool,
    cancel: CancellationFlag,
}

impl IngestionPipeline {
    pub fn new(pool: SqlitePool) -> Self {
        let defaults = Settings::default();
        Self {
            pool,
            max_workers: defaults.max_workers,
            batch_size: defaults.insert_batch_size(),
            commit_timeout: Duration::from_secs(defaults.commit_timeout_secs),
            use_mmap: false,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn from_settings(pool: SqlitePool, settings: &Settings) -> Self {
        Self::new(pool)
            .with_max_workers(settings.max_workers)
            .with_batch_size(settings.insert_batch_size())
            .with_commit_timeout(Duration::from_secs(settings.commit_timeout_secs))
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Ingest every station file found directly in `dir_path`.
    pub async fn ingest_directory(
        &self,
        dir_path: &Path,
        progress: Option<ProgressReporter>,
    ) -> Result<IngestionReport> {
        let files = discover_station_files(dir_path)?;

        if files.is_empty() {
            warn!("No station files found in {}", dir_path.display());
        }

        self.ingest_files(files, progress).await
    }

    /// Ingest the given files as a single run. Nothing reaches the permanent
    /// store unless the whole run succeeds.
    pub async fn ingest_files(
        &self,
        files: Vec<StationFile>,
        progress: Option<ProgressReporter>,
    ) -> Result<IngestionReport> {
        info!(
            "Starting ingestion run over {} files with {} workers",
            files.len(),
            self.max_workers
        );

        let index = Arc::new(DedupIndex::load(&self.pool).await?);

        let loader = StagingLoader::new(index, self.max_workers)
            .with_mmap(self.use_mmap)
            .with_cancellation(self.cancel.clone());

        // Parsing is blocking work, keep it off the async workers
        let area = tokio::task::spawn_blocking(move || {
            let result = loader.stage_files(&files, progress.as_ref());
            if let Some(p) = &progress {
                p.finish_with_message("Staging complete");
            }
            result
        })
        .await??;

        let committer = MergeCommitter::new()
            .with_batch_size(self.batch_size)
            .with_timeout(self.commit_timeout)
            .with_cancellation(self.cancel.clone());

        let commit = committer.commit(&self.pool, &area.records).await?;

        let report = IngestionReport {
            files_processed: area.files_processed,
            lines_read: area.lines_read,
            staged: commit.staged,
            committed: commit.committed,
            skipped_existing: area.skipped_existing,
            skipped_in_run_duplicates: area.skipped_in_run_duplicates,
            skipped_on_commit: commit.skipped_duplicates,
            rejected: area.rejected,
        };

        info!(
            "Ingestion run finished: {} committed, {} duplicates, {} rejected",
            report.committed,
            report.duplicates(),
            report.rejected.total
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use crate::store::{connect_in_memory, count_observations};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("S1.txt"),
            "20200101\t100\t50\t10\n20200102\t110\t60\t0\n",
        )
        .unwrap();

        let pool = connect_in_memory().await.unwrap();
        let pipeline = IngestionPipeline::new(pool.clone()).with_max_workers(2);

        let first = pipeline.ingest_directory(dir.path(), None).await.unwrap();
        assert_eq!(first.committed, 2);

        let second = pipeline.ingest_directory(dir.path(), None).await.unwrap();
        assert_eq!(second.committed, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(second.staged, 0);

        assert_eq!(count_observations(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_has_no_effect() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("S1.txt"), "20200101\t100\t50\t10\n").unwrap();

        let pool = connect_in_memory().await.unwrap();
        let pipeline = IngestionPipeline::new(pool.clone());
        pipeline.cancellation().cancel();

        let result = pipeline.ingest_directory(dir.path(), None).await;

        assert!(matches!(result, Err(ProcessingError::Cancelled)));
        assert_eq!(count_observations(&pool).await.unwrap(), 0);
    }
}
