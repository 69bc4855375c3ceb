use crate::error::{ProcessingError, Result};
use crate::models::{ObservationKey, StagingRecord};
use crate::processors::{CancellationFlag, DedupIndex, RejectionReport};
use crate::readers::{parse_line, ObservationReader, StationFile};
use crate::utils::progress::ProgressReporter;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

type SourceRank = (usize, usize);

/// Keys staged so far in this run, each held by the earliest source
/// position seen for it. Shared by all file workers.
#[derive(Debug, Default)]
struct InRunClaims {
    claims: Mutex<HashMap<ObservationKey, SourceRank>>,
}

impl InRunClaims {
    /// Try to take `key` for `rank`. An earlier rank displaces a later one,
    /// so the winner does not depend on which worker got there first.
    fn claim(&self, key: ObservationKey, rank: SourceRank) -> bool {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        match claims.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(rank);
                true
            }
            Entry::Occupied(mut slot) => {
                if rank < *slot.get() {
                    slot.insert(rank);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn holds(&self, key: &ObservationKey, rank: SourceRank) -> bool {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.get(key) == Some(&rank)
    }
}

/// Everything one file worker produced.
#[derive(Debug, Default)]
struct FileStage {
    lines_read: usize,
    accepted: Vec<StagingRecord>,
    skipped_existing: usize,
    skipped_in_run_duplicates: usize,
    rejected: RejectionReport,
}

/// Validated, deduplicated observations held for one run, in source order.
#[derive(Debug, Default)]
pub struct StagingArea {
    pub records: Vec<StagingRecord>,
    pub files_processed: usize,
    pub lines_read: usize,
    pub skipped_existing: usize,
    pub skipped_in_run_duplicates: usize,
    pub rejected: RejectionReport,
}

impl StagingArea {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parses and deduplicates station files on a bounded worker pool.
pub struct StagingLoader {
    index: Arc<DedupIndex>,
    max_workers: usize,
    reader: ObservationReader,
    cancel: CancellationFlag,
}

impl StagingLoader {
    pub fn new(index: Arc<DedupIndex>, max_workers: usize) -> Self {
        Self {
            index,
            max_workers: max_workers.max(1),
            reader: ObservationReader::new(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.reader = ObservationReader::with_mmap(use_mmap);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stage every file, one worker per file, at most `max_workers` at once.
    ///
    /// Observations already in the store are skipped. When the same key
    /// appears more than once in the run, the occurrence earliest in
    /// (file order, line number) is kept.
    pub fn stage_files(
        &self,
        files: &[StationFile],
        progress: Option<&ProgressReporter>,
    ) -> Result<StagingArea> {
        let claims = InRunClaims::default();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()?;

        let stages: Vec<FileStage> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let result = self.stage_file(file, &claims);
                    if let Some(p) = progress {
                        p.increment(1);
                    }
                    result
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut area = StagingArea {
            files_processed: files.len(),
            ..StagingArea::default()
        };

        for mut stage in stages {
            // Drop records displaced by an earlier occurrence in another file
            let before = stage.accepted.len();
            stage
                .accepted
                .retain(|r| claims.holds(&r.observation.key(), r.source_rank()));
            let displaced = before - stage.accepted.len();

            area.lines_read += stage.lines_read;
            area.skipped_existing += stage.skipped_existing;
            area.skipped_in_run_duplicates += stage.skipped_in_run_duplicates + displaced;
            area.rejected.merge(stage.rejected);
            area.records.append(&mut stage.accepted);
        }

        area.records.sort_by_key(|r| r.source_rank());

        debug!(
            "Staged {} records from {} files ({} existing, {} in-run duplicates, {} rejected)",
            area.records.len(),
            area.files_processed,
            area.skipped_existing,
            area.skipped_in_run_duplicates,
            area.rejected.total
        );

        Ok(area)
    }

    fn stage_file(&self, file: &StationFile, claims: &InRunClaims) -> Result<FileStage> {
        let mut stage = FileStage::default();

        let lines_read = self.reader.for_each_line(&file.path, |line_number, line| {
            if self.cancel.is_cancelled() {
                return Err(ProcessingError::Cancelled);
            }

            let observation = match parse_line(line, &file.station_id) {
                Ok(observation) => observation,
                Err(reason) => {
                    debug!(
                        "Rejected {} line {}: {}",
                        file.path.display(),
                        line_number,
                        reason
                    );
                    stage.rejected.record(&file.station_id, line_number, &reason);
                    return Ok(());
                }
            };

            let key = observation.key();
            if self.index.contains(&key) {
                stage.skipped_existing += 1;
                return Ok(());
            }

            let record = StagingRecord::new(observation, file.index, line_number);
            if claims.claim(key, record.source_rank()) {
                stage.accepted.push(record);
            } else {
                stage.skipped_in_run_duplicates += 1;
            }

            Ok(())
        })?;

        stage.lines_read = lines_read;

        debug!(
            "Read {} lines from {} ({} accepted)",
            lines_read,
            file.path.display(),
            stage.accepted.len()
        );

        Ok(stage)
    }
}
