mod parse;

use std::{collections::HashSet, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::{
    sync::Semaphore,
    time::{sleep, Duration},
};

use common::{database::DbPool, services::ExternalApiService, utils::config::Config};

use crate::core::{progress::create_progress_with_job, Job, JobError};

use parse::{extract_event_links, parse_event_page, ScrapedEvent};

const PAGE_PAUSE: Duration = Duration::from_millis(500);

/// Crawls the handicrafts events listing and upserts each detail page into
/// `events`, keyed by its URL.
pub struct ScrapeJob {
    http: ExternalApiService,
    base_url: String,
    pages: u32,
    workers: usize,
    export_path: Option<PathBuf>,
}

impl ScrapeJob {
    pub fn new(config: &Config, http: ExternalApiService) -> Self {
        Self {
            http,
            base_url: config.event_source_url.trim_end_matches('/').to_owned(),
            pages: config.event_scrape_pages,
            workers: config.event_scrape_workers.max(1),
            export_path: None,
        }
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_export(mut self, path: Option<PathBuf>) -> Self {
        self.export_path = path;
        self
    }

    fn listing_url(&self, page: u32) -> String {
        format!("{}/en/events?page={}", self.base_url, page)
    }

    async fn collect_links(&self) -> Vec<String> {
        let progress = create_progress_with_job("scrape", "Reading listing pages");
        progress.init(self.pages as usize, "pages");

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for page in 1..=self.pages {
            match self.http.get_text(&self.listing_url(page)).await {
                Ok(html) => match extract_event_links(&html, &self.base_url) {
                    Ok(found) => {
                        tracing::debug!("Found {} event links on page {}", found.len(), page);
                        links.extend(found.into_iter().filter(|url| seen.insert(url.clone())));
                    }
                    Err(e) => tracing::warn!("Failed to parse listing page {}: {}", page, e),
                },
                Err(e) => tracing::warn!("Failed to fetch listing page {}: {}", page, e),
            }
            progress.set(page as usize);

            if page < self.pages {
                sleep(PAGE_PAUSE).await;
            }
        }

        progress.done(format!("Found {} unique event links", links.len()));
        links
    }

    async fn scrape_details(&self, links: Vec<String>) -> Vec<ScrapedEvent> {
        let progress = create_progress_with_job("scrape", "Scraping event pages");
        progress.init(links.len(), "events");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut futures = FuturesUnordered::new();

        for url in links {
            let semaphore = Arc::clone(&semaphore);
            let http = self.http.clone();

            futures.push(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| JobError::ExternalApi(format!("Semaphore error: {}", e)))?;

                let html = http.get_text(&url).await?;
                let event = parse_event_page(&url, &html)?;
                Result::<(String, Option<ScrapedEvent>), JobError>::Ok((url, event))
            });
        }

        let mut events = Vec::new();
        while let Some(result) = futures.next().await {
            progress.increment();
            match result {
                Ok((_, Some(event))) => {
                    tracing::debug!(
                        "Scraped {} at {}",
                        event.title().unwrap_or("Unknown Title"),
                        event.venue().unwrap_or("Unknown Venue")
                    );
                    events.push(event);
                }
                Ok((url, None)) => tracing::debug!("No event details on {}", url),
                Err(e) => tracing::warn!("Failed to scrape event page: {}", e),
            }
        }

        progress.done(format!("Scraped {} events", events.len()));
        events
    }

    async fn store_events(&self, events: &[ScrapedEvent], pool: &DbPool) -> Result<u64, JobError> {
        let mut client = pool
            .get()
            .await
            .map_err(|e| JobError::Database(e.to_string()))?;
        let tx = client.transaction().await?;
        let statement = tx
            .prepare(
                "INSERT INTO events (event_url, title, venue, start_date, end_date, details, scraped_at)
                 VALUES ($1, $2, $3, $4, $5, $6, NOW())
                 ON CONFLICT (event_url) DO UPDATE SET
                    title = EXCLUDED.title,
                    venue = EXCLUDED.venue,
                    start_date = EXCLUDED.start_date,
                    end_date = EXCLUDED.end_date,
                    details = EXCLUDED.details,
                    scraped_at = NOW()",
            )
            .await?;

        let mut stored = 0;
        for event in events {
            let details = serde_json::to_value(&event.fields)?;
            stored += tx
                .execute(
                    &statement,
                    &[
                        &event.event_url,
                        &event.title(),
                        &event.venue(),
                        &event.start_date(),
                        &event.end_date(),
                        &details,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn export(&self, events: &[ScrapedEvent]) -> Result<(), JobError> {
        let Some(path) = &self.export_path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(events)?;
        tokio::fs::write(path, json).await?;
        tracing::info!("Exported {} events to {}", events.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl Job for ScrapeJob {
    async fn execute(&self, pool: &DbPool) -> Result<(), JobError> {
        let links = self.collect_links().await;
        if links.is_empty() {
            tracing::warn!("No event links found on {} listing pages", self.pages);
            return Ok(());
        }

        let events = self.scrape_details(links).await;
        self.export(&events).await?;

        let stored = self.store_events(&events, pool).await?;
        tracing::info!("Upserted {} events", stored);
        Ok(())
    }

    fn name(&self) -> &str {
        "scrape"
    }
}
