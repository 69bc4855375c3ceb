pub mod file_discovery;
pub mod observation_reader;

pub use file_discovery::{discover_station_files, StationFile};
pub use observation_reader::{parse_line, ObservationReader, RejectKind, RejectReason};
