use crate::error::{ProcessingError, Result};
use crate::models::Observation;
use crate::utils::constants::{
    DATE_FORMAT, DEFAULT_BUFFER_SIZE, FIELD_COUNT, FIELD_SEPARATOR, MISSING_SENTINEL, SOURCE_SCALE,
    STATION_FILE_EXTENSION,
};
use chrono::NaiveDate;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Why a single source line was not turned into an observation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("expected {expected} tab-separated fields, found {found}")]
    MalformedLine { expected: usize, found: usize },

    #[error("invalid date '{0}'")]
    MalformedDate(String),

    #[error("non-numeric {field} '{value}'")]
    MalformedNumber { field: &'static str, value: String },

    #[error("invalid {field} '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Reason category used for report counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RejectKind {
    MalformedLine,
    MalformedDate,
    MalformedNumber,
    InvalidValue,
}

impl RejectReason {
    pub fn kind(&self) -> RejectKind {
        match self {
            RejectReason::MalformedLine { .. } => RejectKind::MalformedLine,
            RejectReason::MalformedDate(_) => RejectKind::MalformedDate,
            RejectReason::MalformedNumber { .. } => RejectKind::MalformedNumber,
            RejectReason::InvalidValue { .. } => RejectKind::InvalidValue,
        }
    }
}

impl std::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RejectKind::MalformedLine => "malformed line",
            RejectKind::MalformedDate => "malformed date",
            RejectKind::MalformedNumber => "malformed number",
            RejectKind::InvalidValue => "invalid value",
        };
        write!(f, "{}", name)
    }
}

/// Parse one `DATE\tTMAX\tTMIN\tPRCP` line belonging to `station_id`.
///
/// Values are tenths in the source and are scaled by 1/10. The sentinel
/// `-9999` becomes `None` for any numeric field. Negative precipitation is
/// rejected; negative temperatures are accepted.
pub fn parse_line(line: &str, station_id: &str) -> std::result::Result<Observation, RejectReason> {
    let parts: Vec<&str> = line
        .trim_end_matches(['\r', '\n'])
        .split(FIELD_SEPARATOR)
        .map(|s| s.trim())
        .collect();

    if parts.len() != FIELD_COUNT {
        return Err(RejectReason::MalformedLine {
            expected: FIELD_COUNT,
            found: parts.len(),
        });
    }

    let date = parse_date(parts[0])?;
    let max_temp = parse_tenths(parts[1], "max_temp")?;
    let min_temp = parse_tenths(parts[2], "min_temp")?;
    let precipitation = parse_tenths(parts[3], "precipitation")?;

    if let Some(p) = precipitation {
        if p < 0.0 {
            return Err(RejectReason::InvalidValue {
                field: "precipitation",
                value: parts[3].to_string(),
            });
        }
    }

    Ok(Observation::new(
        station_id.to_string(),
        date,
        max_temp,
        min_temp,
        precipitation,
    ))
}

fn parse_date(token: &str) -> std::result::Result<NaiveDate, RejectReason> {
    // chrono's %Y accepts signs and extra digits, so pin the shape first
    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RejectReason::MalformedDate(token.to_string()));
    }

    NaiveDate::parse_from_str(token, DATE_FORMAT)
        .map_err(|_| RejectReason::MalformedDate(token.to_string()))
}

fn parse_tenths(token: &str, field: &'static str) -> std::result::Result<Option<f64>, RejectReason> {
    let raw = token.parse::<i64>().map_err(|_| RejectReason::MalformedNumber {
        field,
        value: token.to_string(),
    })?;

    if raw == MISSING_SENTINEL {
        return Ok(None);
    }

    Ok(Some(raw as f64 / SOURCE_SCALE))
}

/// Reads station files line by line, either buffered or memory-mapped.
pub struct ObservationReader {
    use_mmap: bool,
}

impl ObservationReader {
    pub fn new() -> Self {
        Self { use_mmap: false }
    }

    pub fn with_mmap(use_mmap: bool) -> Self {
        Self { use_mmap }
    }

    /// Station identifier from a file name: the part before the first dot
    /// (e.g. `USC00110072.txt` -> `USC00110072`).
    pub fn station_id_from_path(path: &Path) -> Result<String> {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| ProcessingError::InvalidFormat("Invalid file path".to_string()))?;

        let station_id = filename.split('.').next().unwrap_or_default();
        let has_extension = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(STATION_FILE_EXTENSION));

        if station_id.is_empty() || !has_extension {
            return Err(ProcessingError::InvalidFormat(format!(
                "Filename does not match expected pattern <station>.{}: {}",
                STATION_FILE_EXTENSION, filename
            )));
        }

        Ok(station_id.to_string())
    }

    /// Call `visit` with every non-empty line and its 1-based line number.
    /// An error returned by `visit` stops reading and is propagated.
    pub fn for_each_line<F>(&self, path: &Path, visit: F) -> Result<usize>
    where
        F: FnMut(usize, &str) -> Result<()>,
    {
        if self.use_mmap {
            self.for_each_line_mmap(path, visit)
        } else {
            self.for_each_line_buffered(path, visit)
        }
    }

    fn for_each_line_buffered<F>(&self, path: &Path, mut visit: F) -> Result<usize>
    where
        F: FnMut(usize, &str) -> Result<()>,
    {
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file);
        let mut line_count = 0;

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result?;

            if line.trim().is_empty() {
                continue;
            }

            line_count += 1;
            visit(index + 1, &line)?;
        }

        Ok(line_count)
    }

    fn for_each_line_mmap<F>(&self, path: &Path, mut visit: F) -> Result<usize>
    where
        F: FnMut(usize, &str) -> Result<()>,
    {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(0);
        }

        // SAFETY: the file is opened read-only and not modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        let content = std::str::from_utf8(&mmap)
            .map_err(|e| ProcessingError::InvalidFormat(format!("Invalid UTF-8: {}", e)))?;

        let mut line_count = 0;

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            line_count += 1;
            visit(index + 1, line)?;
        }

        Ok(line_count)
    }
}

impl Default for ObservationReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_line() {
        let obs = parse_line("19850101\t-22\t-128\t94", "USC00110072").unwrap();

        assert_eq!(obs.station_id, "USC00110072");
        assert_eq!(obs.date.format("%Y-%m-%d").to_string(), "1985-01-01");
        assert_eq!(obs.max_temp, Some(-2.2));
        assert_eq!(obs.min_temp, Some(-12.8));
        assert_eq!(obs.precipitation, Some(9.4));
    }

    #[test]
    fn test_parse_padded_line() {
        let obs = parse_line("19850102\t  212\t  -44\t    0\r", "S1").unwrap();

        assert_eq!(obs.max_temp, Some(21.2));
        assert_eq!(obs.min_temp, Some(-4.4));
        assert_eq!(obs.precipitation, Some(0.0));
    }

    #[test]
    fn test_sentinel_maps_to_missing() {
        let obs = parse_line("20200101\t-9999\t-9999\t-9999", "S1").unwrap();

        assert_eq!(obs.max_temp, None);
        assert_eq!(obs.min_temp, None);
        assert_eq!(obs.precipitation, None);
    }

    #[test]
    fn test_negative_precipitation_rejected() {
        let err = parse_line("20200101\t100\t50\t-50", "S1").unwrap_err();
        assert_eq!(
            err,
            RejectReason::InvalidValue {
                field: "precipitation",
                value: "-50".to_string()
            }
        );
        assert_eq!(err.kind(), RejectKind::InvalidValue);
    }

    #[test]
    fn test_malformed_dates() {
        for token in ["2020011", "202001011", "2020-01-", "20201301", "20200230", "+2020101"] {
            let line = format!("{}\t10\t10\t10", token);
            let err = parse_line(&line, "S1").unwrap_err();
            assert_eq!(err.kind(), RejectKind::MalformedDate, "token {}", token);
        }
    }

    #[test]
    fn test_malformed_numbers() {
        let err = parse_line("20200101\tabc\t10\t10", "S1").unwrap_err();
        assert_eq!(
            err,
            RejectReason::MalformedNumber {
                field: "max_temp",
                value: "abc".to_string()
            }
        );

        let err = parse_line("20200101\t10\t1.5\t10", "S1").unwrap_err();
        assert_eq!(err.kind(), RejectKind::MalformedNumber);
    }

    #[test]
    fn test_wrong_field_count() {
        let err = parse_line("20200101\t10\t10", "S1").unwrap_err();
        assert_eq!(
            err,
            RejectReason::MalformedLine {
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn test_station_id_from_path() {
        let id = ObservationReader::station_id_from_path(Path::new("wx_data/USC00110072.txt")).unwrap();
        assert_eq!(id, "USC00110072");

        assert!(ObservationReader::station_id_from_path(Path::new("wx_data/notes.csv")).is_err());
        assert!(ObservationReader::station_id_from_path(Path::new("wx_data/.txt")).is_err());
    }

    #[test]
    fn test_buffered_and_mmap_agree() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("S1.txt");
        let mut file = File::create(&path)?;
        writeln!(file, "20200101\t10\t20\t30")?;
        writeln!(file)?;
        writeln!(file, "20200102\t11\t21\t31")?;

        for reader in [ObservationReader::new(), ObservationReader::with_mmap(true)] {
            let mut seen = Vec::new();
            let count = reader.for_each_line(&path, |n, line| {
                seen.push((n, line.to_string()));
                Ok(())
            })?;

            assert_eq!(count, 2);
            assert_eq!(seen[0].0, 1);
            assert_eq!(seen[1].0, 3);
            assert_eq!(seen[1].1, "20200102\t11\t21\t31");
        }

        Ok(())
    }

    #[test]
    fn test_mmap_empty_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("S1.txt");
        File::create(&path)?;

        let count = ObservationReader::with_mmap(true).for_each_line(&path, |_, _| Ok(()))?;
        assert_eq!(count, 0);
        Ok(())
    }
}
