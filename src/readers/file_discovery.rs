use crate::error::{ProcessingError, Result};
use crate::readers::ObservationReader;
use crate::utils::constants::STATION_FILE_EXTENSION;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A station data file scheduled for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFile {
    pub path: PathBuf,
    pub station_id: String,
    /// Position in the run's file order (sorted by file name)
    pub index: usize,
}

/// List every `<station>.txt` file directly inside `dir_path`, sorted by file
/// name so that runs over the same directory see files in the same order.
pub fn discover_station_files(dir_path: &Path) -> Result<Vec<StationFile>> {
    if !dir_path.is_dir() {
        return Err(ProcessingError::InvalidFormat(format!(
            "Path is not a directory: {}",
            dir_path.display()
        )));
    }

    let mut paths = Vec::new();

    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        let is_station_file = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(STATION_FILE_EXTENSION));

        if is_station_file {
            paths.push(path);
        } else {
            debug!("Skipping non-station entry {}", path.display());
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| {
            let station_id = ObservationReader::station_id_from_path(&path)?;
            Ok(StationFile {
                path,
                station_id,
                index,
            })
        })
        .collect()
}
