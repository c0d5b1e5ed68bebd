mod core;
mod embed;
mod scrape;
mod seed;

use std::{path::PathBuf, sync::Arc};

use clap::{value_parser, Arg, ArgMatches, Command};
use tokio::{signal, time::Duration};

use common::{
    database::{manager::ConnectionManager, DbPool},
    services::{EmbeddingService, ExternalApiService},
    utils::{
        config::Config,
        error::{ApiError, Result},
    },
};

use crate::core::{progress::init_global_progress, Job, JobScheduler};
use embed::EmbedJob;
use scrape::ScrapeJob;
use seed::SeedJob;

const JOB_DESCRIPTIONS: &[(&str, &str)] = &[
    ("scrape", "Scrape handicraft events and upsert them by URL"),
    ("seed", "Load precomputed knowledge documents from a JSON file"),
    ("embed", "Embed knowledge documents that have no vector yet"),
];

fn cli() -> Command {
    Command::new("curator")
        .about("Hidden Gems offline data jobs")
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .value_name("JOB_TYPES")
                .help("Jobs to run in order (comma-separated: scrape,seed,embed)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .help("List all available jobs and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("kb-file")
                .long("kb-file")
                .value_name("PATH")
                .help("Knowledge file for the seed job (defaults to KB_EMBEDDINGS_PATH)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("pages")
                .long("pages")
                .value_name("N")
                .help("Listing pages to scrape (defaults to EVENT_SCRAPE_PAGES)")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("export")
                .long("export")
                .value_name("PATH")
                .help("Also write scraped events to this JSON file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("watch")
                .long("watch")
                .value_name("SECONDS")
                .help("Re-run the scrape job every SECONDS until Ctrl-C")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("migrate-only")
                .long("migrate-only")
                .help("Apply database migrations and exit")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Without `--jobs`, scrape always runs and seed joins it when a knowledge
/// file is known.
fn selected_jobs(matches: &ArgMatches, config: &Config) -> Vec<String> {
    match matches.get_one::<String>("jobs") {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        None => {
            let mut jobs = vec!["scrape".to_owned()];
            if matches.contains_id("kb-file") || config.kb_embeddings_path.is_some() {
                jobs.push("seed".to_owned());
            }
            jobs
        }
    }
}

fn build_scrape_job(matches: &ArgMatches, config: &Config, http: &ExternalApiService) -> ScrapeJob {
    let mut job = ScrapeJob::new(config, http.clone())
        .with_export(matches.get_one::<PathBuf>("export").cloned());
    if let Some(&pages) = matches.get_one::<u32>("pages") {
        job = job.with_pages(pages);
    }
    job
}

fn create_job(
    job_type: &str,
    matches: &ArgMatches,
    config: &Config,
    http: &ExternalApiService,
    embedding_service: &Arc<EmbeddingService>,
) -> Result<Arc<dyn Job>> {
    let job: Arc<dyn Job> = match job_type {
        "scrape" => Arc::new(build_scrape_job(matches, config, http)),
        "seed" => {
            let path = matches
                .get_one::<PathBuf>("kb-file")
                .cloned()
                .or_else(|| config.kb_embeddings_path.as_ref().map(PathBuf::from))
                .ok_or_else(|| {
                    ApiError::Config("seed needs --kb-file or KB_EMBEDDINGS_PATH".to_owned())
                })?;
            Arc::new(SeedJob::new(path))
        }
        "embed" => Arc::new(EmbedJob::new(Arc::clone(embedding_service))),
        other => {
            return Err(ApiError::Config(format!(
                "Invalid job type: {}. Valid options: scrape, seed, embed",
                other
            )))
        }
    };
    Ok(job)
}

async fn create_shared_pool(config: &Config) -> Result<Arc<DbPool>> {
    let pool = ConnectionManager::get_shared_pool(config).await?;
    Ok(Arc::new(pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("A rustls crypto provider was already installed");
    }

    let matches = cli().get_matches();

    tracing_subscriber::fmt().with_writer(std::io::stdout).init();

    if matches.get_flag("list") {
        println!("Available jobs:");
        for (name, desc) in JOB_DESCRIPTIONS {
            println!("  {:<8} - {}", name, desc);
        }
        return Ok(());
    }

    let config = Config::from_env()?;
    init_global_progress();

    let shared_pool = create_shared_pool(&config).await?;
    tracing::info!("Running database migrations");
    common::database::connection::run_migrations(&shared_pool).await?;

    if matches.get_flag("migrate-only") {
        tracing::info!("--migrate-only given, migrations complete, exiting");
        ConnectionManager::clear_shared_pool().await;
        return Ok(());
    }

    let http = ExternalApiService::new()?;
    let embedding_service = Arc::new(EmbeddingService::new(&config, http.clone()));

    let job_types = selected_jobs(&matches, &config);
    let mut scheduler = JobScheduler::new(Arc::clone(&shared_pool));
    scheduler.reserve_jobs(job_types.len());
    for job_type in &job_types {
        scheduler.add_job(create_job(job_type, &matches, &config, &http, &embedding_service)?);
    }

    tracing::info!("Running jobs: {}", scheduler.job_names().join(", "));
    if let Err(e) = scheduler.run_all_sequential().await {
        tracing::error!("Job execution failed: {}", e);
        ConnectionManager::clear_shared_pool().await;
        std::process::exit(1);
    }

    if let Some(&seconds) = matches.get_one::<u64>("watch") {
        let interval = Duration::from_secs(seconds.max(1));
        let scrape_job: Arc<dyn Job> = Arc::new(build_scrape_job(&matches, &config, &http));
        let scheduler = JobScheduler::new(Arc::clone(&shared_pool));

        tracing::info!("Watching events source every {:?}. Press Ctrl-C to stop", interval);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            scheduler.run_recurring(scrape_job, interval).await
        });

        signal::ctrl_c().await?;
        tracing::info!("Shutdown signal received, stopping scrape watcher");
        handle.abort();
    }

    ConnectionManager::clear_shared_pool().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> ArgMatches {
        cli().get_matches_from(std::iter::once("curator").chain(args.iter().copied()))
    }

    #[test]
    fn default_jobs_depend_on_knowledge_file() {
        let config = Config::default();
        assert_eq!(selected_jobs(&matches(&[]), &config), vec!["scrape"]);
        assert_eq!(
            selected_jobs(&matches(&["--kb-file", "kb.json"]), &config),
            vec!["scrape", "seed"]
        );

        let config = Config {
            kb_embeddings_path: Some("output_embeddings.json".into()),
            ..Config::default()
        };
        assert_eq!(selected_jobs(&matches(&[]), &config), vec!["scrape", "seed"]);
    }

    #[test]
    fn explicit_job_list_is_normalised() {
        let jobs = selected_jobs(&matches(&["--jobs", " Seed, embed ,,"]), &Config::default());
        assert_eq!(jobs, vec!["seed", "embed"]);
    }

    #[test]
    fn unknown_jobs_and_missing_kb_file_are_rejected() {
        let config = Config::default();
        let http = ExternalApiService::new().unwrap();
        let embeddings = Arc::new(EmbeddingService::new(&config, http.clone()));
        let args = matches(&[]);

        assert!(create_job("prune", &args, &config, &http, &embeddings).is_err());
        assert!(create_job("seed", &args, &config, &http, &embeddings).is_err());
        assert!(create_job("embed", &args, &config, &http, &embeddings).is_ok());

        let with_file = matches(&["--kb-file", "kb.json"]);
        let job = create_job("seed", &with_file, &config, &http, &embeddings).unwrap();
        assert_eq!(job.name(), "seed");
    }

    #[test]
    fn numeric_flags_are_validated_by_clap() {
        assert!(cli()
            .try_get_matches_from(["curator", "--watch", "soon"])
            .is_err());
        let parsed = matches(&["--pages", "3", "--watch", "600"]);
        assert_eq!(parsed.get_one::<u32>("pages"), Some(&3));
        assert_eq!(parsed.get_one::<u64>("watch"), Some(&600));
    }
}
