use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::core::JobError;

pub const EVENT_LINK_PREFIX: &str = "/en/events/view/";

const DATETIME_FORMAT: &str = "%d/%m/%Y %I:%M %p";
const DATE_FORMAT: &str = "%d/%m/%Y";

/// Everything read off one event detail page. Keys are the row headings as
/// the source prints them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedEvent {
    #[serde(rename = "_event_url")]
    pub event_url: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl ScrapedEvent {
    pub fn title(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.contains("Name") || key.contains("Title"))
            .map(|(_, value)| value.as_str())
    }

    pub fn venue(&self) -> Option<&str> {
        self.fields.get("Venue of Event").map(String::as_str)
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.fields.get("Event Start Date").and_then(|v| date_part(v))
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.fields.get("Event End Date").and_then(|v| date_part(v))
    }
}

fn selector(css: &str) -> Result<Selector, JobError> {
    Selector::parse(css).map_err(|e| JobError::Parse(format!("Invalid selector {css}: {e}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `dd/mm/YYYY hh:mm AM` becomes an ISO datetime, `dd/mm/YYYY` an ISO date.
/// Anything else comes back as given.
pub fn clean_date(text: &str) -> String {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return dt.format("%Y-%m-%dT%H:%M:%S").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return date.format("%Y-%m-%d").to_string();
    }
    text.to_owned()
}

fn date_part(value: &str) -> Option<NaiveDate> {
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Absolute detail-page links found on one listing page, in page order.
pub fn extract_event_links(html: &str, base_url: &str) -> Result<Vec<String>, JobError> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    let base_url = base_url.trim_end_matches('/');

    let mut seen = HashSet::new();
    Ok(document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.starts_with(EVENT_LINK_PREFIX))
        .map(|href| format!("{base_url}{href}"))
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

/// Reads every `th`/`td` table row on a detail page. Returns `None` when the
/// page carries no such rows.
pub fn parse_event_page(event_url: &str, html: &str) -> Result<Option<ScrapedEvent>, JobError> {
    let document = Html::parse_document(html);
    let rows = selector("tr")?;
    let th = selector("th")?;
    let td = selector("td")?;

    let mut fields = BTreeMap::new();
    for row in document.select(&rows) {
        let (Some(key), Some(value)) = (row.select(&th).next(), row.select(&td).next()) else {
            continue;
        };
        let key = element_text(key);
        if key.is_empty() {
            continue;
        }
        let mut value = element_text(value);
        if key.contains("Date") {
            value = clean_date(&value);
        }
        fields.insert(key, value);
    }

    if fields.is_empty() {
        return Ok(None);
    }
    Ok(Some(ScrapedEvent {
        event_url: event_url.to_owned(),
        fields,
    }))
}
