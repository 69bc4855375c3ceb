pub mod args;
pub mod commands;

pub use args::{Cli, Commands, QueryTarget};
pub use commands::run;
