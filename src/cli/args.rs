use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wx-ingest")]
#[command(about = "Weather station ingestion, yearly statistics and read API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path, or directory for a timestamped log")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Configuration file [default: wx-ingest.toml if present]")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Database URL, overrides configuration")]
    pub database_url: Option<String>,

    #[arg(short, long, global = true, help = "Hide progress output")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest every station file in a directory as one run
    Ingest {
        #[arg(short, long, help = "Directory of <station>.txt files [default: from config]")]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        max_workers: Option<usize>,

        #[arg(long, default_value = "false")]
        use_mmap: bool,

        #[arg(long, default_value = "false", help = "Print the report as JSON")]
        json: bool,
    },

    /// Recompute yearly statistics from all stored observations
    Aggregate,

    /// Ingest then aggregate
    Run {
        #[arg(short, long, help = "Directory of <station>.txt files [default: from config]")]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        max_workers: Option<usize>,

        #[arg(long, default_value = "false")]
        use_mmap: bool,
    },

    /// Serve the paginated read API
    Serve {
        #[arg(short, long, help = "Bind address [default: from config]")]
        bind: Option<String>,
    },

    /// Print one page of stored data as JSON
    Query {
        #[arg(value_enum)]
        target: QueryTarget,

        #[arg(short, long)]
        station_id: Option<String>,

        #[arg(short, long, help = "Exact date (YYYY-MM-DD), observations only")]
        date: Option<chrono::NaiveDate>,

        #[arg(short, long, default_value = "1")]
        page: i64,

        #[arg(long)]
        per_page: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryTarget {
    Weather,
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from([
            "wx-ingest",
            "--verbose",
            "ingest",
            "--input-dir",
            "wx_data",
            "--max-workers",
            "4",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Ingest {
                input_dir,
                max_workers,
                use_mmap,
                json,
            } => {
                assert_eq!(input_dir, Some(PathBuf::from("wx_data")));
                assert_eq!(max_workers, Some(4));
                assert!(!use_mmap);
                assert!(!json);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "wx-ingest",
            "query",
            "weather",
            "--station-id",
            "USC00110072",
            "--date",
            "1985-01-01",
            "--page",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                target,
                station_id,
                date,
                page,
                per_page,
            } => {
                assert_eq!(target, QueryTarget::Weather);
                assert_eq!(station_id.as_deref(), Some("USC00110072"));
                assert_eq!(date, chrono::NaiveDate::from_ymd_opt(1985, 1, 1));
                assert_eq!(page, 2);
                assert_eq!(per_page, None);
            }
            _ => panic!("expected query"),
        }
    }
}
