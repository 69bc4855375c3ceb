pub mod queries;
pub mod schema;

pub use queries::{count_observations, query_observations, query_yearly_stats, ObservationFilter};
pub use schema::{connect, connect_in_memory, init_schema};
