use crate::api;
use crate::cli::args::{Cli, Commands, QueryTarget};
use crate::settings::Settings;
use crate::error::Result;
use crate::models::PageRequest;
use crate::processors::{Aggregator, CancellationFlag, IngestionPipeline, IngestionReport};
use crate::readers::discover_station_files;
use crate::store::{self, query_observations, query_yearly_stats, ObservationFilter};
use crate::utils::logging::init_logging;
use crate::utils::progress::ProgressReporter;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings = Settings::load(cli.config.as_deref())?.with_database_url(cli.database_url);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Ingest {
            input_dir,
            max_workers,
            use_mmap,
            json,
        } => {
            let settings = settings
                .with_data_dir(input_dir)
                .with_max_workers(max_workers);
            let pool = open_store(&settings).await?;

            let report = ingest(&pool, &settings, use_mmap, quiet).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            } else {
                println!("\n{}", report.summary());
            }
        }

        Commands::Aggregate => {
            let pool = open_store(&settings).await?;
            aggregate(&pool, quiet).await?;
        }

        Commands::Run {
            input_dir,
            max_workers,
            use_mmap,
        } => {
            let settings = settings
                .with_data_dir(input_dir)
                .with_max_workers(max_workers);
            let pool = open_store(&settings).await?;

            let report = ingest(&pool, &settings, use_mmap, quiet).await?;
            println!("\n{}", report.summary());

            aggregate(&pool, quiet).await?;
        }

        Commands::Serve { bind } => {
            let mut settings = settings;
            if let Some(bind) = bind {
                settings.bind_address = bind;
            }
            let pool = open_store(&settings).await?;

            println!("Serving weather API on http://{}", settings.bind_address);
            api::serve(pool, &settings).await?;
        }

        Commands::Query {
            target,
            station_id,
            date,
            page,
            per_page,
        } => {
            let pool = open_store(&settings).await?;
            let request = PageRequest::new(page, per_page.unwrap_or(settings.default_per_page))
                .validated(settings.max_per_page)?;

            let output = match target {
                QueryTarget::Weather => {
                    let filter = ObservationFilter { station_id, date };
                    serde_json::to_string_pretty(&query_observations(&pool, &filter, request).await?)
                }
                QueryTarget::Stats => {
                    if date.is_some() {
                        warn!("--date is ignored for stats queries");
                    }
                    serde_json::to_string_pretty(
                        &query_yearly_stats(&pool, station_id.as_deref(), request).await?,
                    )
                }
            };

            println!("{}", output.unwrap_or_default());
        }
    }

    Ok(())
}

async fn open_store(settings: &Settings) -> Result<SqlitePool> {
    let max_connections = u32::try_from(settings.max_workers).unwrap_or(u32::MAX).saturating_add(1);
    store::connect(&settings.database_url, max_connections).await
}

async fn ingest(
    pool: &SqlitePool,
    settings: &Settings,
    use_mmap: bool,
    quiet: bool,
) -> Result<IngestionReport> {
    let input_dir: PathBuf = settings.data_dir.clone();
    let files = discover_station_files(&input_dir)?;

    if !quiet {
        println!("Ingesting weather data...");
        println!("Input directory: {}", input_dir.display());
        println!(
            "Files: {}, Workers: {}, Batch size: {}",
            files.len(),
            settings.max_workers,
            settings.insert_batch_size()
        );
    }

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    let interrupt_watch = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling ingestion run");
            on_interrupt.cancel();
        }
    });

    let progress = ProgressReporter::new(files.len() as u64, "Staging station files...", quiet);

    let pipeline = IngestionPipeline::from_settings(pool.clone(), settings)
        .with_mmap(use_mmap)
        .with_cancellation(cancel);

    let result = pipeline.ingest_files(files, Some(progress)).await;
    interrupt_watch.abort();

    result
}

async fn aggregate(pool: &SqlitePool, quiet: bool) -> Result<()> {
    let progress = ProgressReporter::new_spinner("Calculating yearly statistics...", quiet);

    let summary = Aggregator::new().run(pool).await?;

    progress.finish_with_message(&format!(
        "Stored {} yearly statistics for {} stations",
        summary.rows_upserted, summary.stations
    ));
    info!("Aggregation complete");

    Ok(())
}
