pub mod observation;
pub mod page;
pub mod yearly_stat;

pub use observation::{Observation, ObservationKey, StagingRecord};
pub use page::{Page, PageRequest};
pub use yearly_stat::YearlyStat;
