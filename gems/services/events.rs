use std::collections::BTreeSet;

use chrono::NaiveDate;
use deadpool_postgres::Client;
use tracing::{debug, instrument};

use crate::{
    models::event::Event,
    utils::{
        database::{EVENT_COLUMNS, map_event_row},
        error::Result,
    },
};

pub const MAX_EVENTS_SCANNED: i64 = 1000;

fn tokens(s: &str) -> BTreeSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { above.max(row[j]) };
            diag = above;
        }
    }
    row[b.len()]
}

/// Indel similarity, `2 * LCS / (len_a + len_b)`, on a 0-100 scale.
fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

fn join(parts: &[&String]) -> String {
    parts.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")
}

/// Token-set similarity on a 0-100 scale: both inputs are reduced to sorted
/// unique tokens, and the shared tokens are compared against each side's
/// full set. A string whose tokens are a subset of the other's scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let common: Vec<&String> = left.intersection(&right).collect();
    let only_left: Vec<&String> = left.difference(&right).collect();
    let only_right: Vec<&String> = right.difference(&left).collect();

    if !common.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 100.0;
    }

    let base = join(&common);
    let with_left = join(&[common.as_slice(), only_left.as_slice()].concat());
    let with_right = join(&[common.as_slice(), only_right.as_slice()].concat());

    let mut best = ratio(&with_left, &with_right);
    if !base.is_empty() {
        best = best.max(ratio(&base, &with_left)).max(ratio(&base, &with_right));
    }
    best
}

pub fn fuzzy_match(location: &str, venue: &str, threshold: f64) -> bool {
    if location.trim().is_empty() || venue.trim().is_empty() {
        return false;
    }
    token_set_ratio(location, venue) >= threshold
}

fn within(event: &Event, date: NaiveDate) -> bool {
    match (event.start_date, event.end_date) {
        (Some(start), Some(end)) => start <= date && date <= end,
        _ => false,
    }
}

/// Events whose venue fuzzily matches `location` and, when a date is given,
/// whose start and end bracket it.
#[instrument(skip(client))]
pub async fn find_events(
    client: &Client,
    location: &str,
    date: Option<NaiveDate>,
    threshold: f64,
) -> Result<Vec<Event>> {
    let rows = match date {
        Some(date) => {
            let query = format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE start_date <= $1 AND end_date >= $1
                 ORDER BY start_date, scraped_at DESC LIMIT $2"
            );
            client.query(&query, &[&date, &MAX_EVENTS_SCANNED]).await?
        }
        None => {
            let query = format!(
                "SELECT {EVENT_COLUMNS} FROM events ORDER BY scraped_at DESC LIMIT $1"
            );
            client.query(&query, &[&MAX_EVENTS_SCANNED]).await?
        }
    };
    let scanned = rows.len();

    let matches: Vec<Event> = rows
        .iter()
        .map(map_event_row)
        .filter(|event| date.is_none_or(|d| within(event, d)))
        .filter(|event| {
            event
                .venue
                .as_deref()
                .is_some_and(|venue| fuzzy_match(location, venue, threshold))
        })
        .collect();

    debug!(scanned, matched = matches.len(), "Event search finished");
    Ok(matches)
}

pub async fn list_events(client: &Client) -> Result<Vec<Event>> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY scraped_at DESC LIMIT $1");
    let rows = client.query(&query, &[&MAX_EVENTS_SCANNED]).await?;
    Ok(rows.iter().map(map_event_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn subset_of_tokens_is_a_full_match() {
        assert_eq!(token_set_ratio("Jaipur", "Jawahar Kala Kendra, Jaipur, Rajasthan"), 100.0);
        assert_eq!(token_set_ratio("new delhi", "Dilli Haat, New Delhi"), 100.0);
    }

    #[test]
    fn matching_ignores_case_and_punctuation() {
        assert!(fuzzy_match("JAIPUR", "jaipur.", 70.0));
        assert!(fuzzy_match("Pragati Maidan New Delhi", "pragati maidan, new-delhi", 70.0));
    }

    #[test]
    fn small_typos_still_pass_the_threshold() {
        assert!(token_set_ratio("Bengaluru", "Bangaluru") >= 70.0);
        assert!(fuzzy_match("Kolkatta", "Kolkata", 70.0));
    }

    #[test]
    fn insertion_heavy_spellings_pass_the_threshold() {
        assert!((ratio("kochi", "cochin") - 800.0 / 11.0).abs() < 1e-9);
        assert!(fuzzy_match("Kochi", "Cochin", 70.0));
        assert!(fuzzy_match("Gwalior", "Gwaliar", 70.0));
    }

    #[test]
    fn indel_ratio_counts_the_longest_common_subsequence() {
        assert_eq!(lcs_len(&['a', 'b', 'c', 'd'], &['a', 'c', 'd']), 3);
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", ""), 0.0);
        assert_eq!(ratio("agra", "agra"), 100.0);
    }

    #[test]
    fn unrelated_places_do_not_match() {
        assert!(!fuzzy_match("Chennai", "Srinagar, Jammu and Kashmir", 70.0));
        assert!(!fuzzy_match("Mumbai", "Guwahati", 70.0));
    }

    #[test]
    fn blank_inputs_never_match() {
        assert!(!fuzzy_match("", "Jaipur", 70.0));
        assert!(!fuzzy_match("Jaipur", "   ", 70.0));
        assert_eq!(token_set_ratio("!!", "Jaipur"), 0.0);
    }

    fn event(start: Option<&str>, end: Option<&str>) -> Event {
        let parse = |d: &str| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap();
        Event {
            id: Uuid::new_v4(),
            event_url: "https://example.test/en/events/view/1".into(),
            title: None,
            venue: Some("Jaipur".into()),
            start_date: start.map(parse),
            end_date: end.map(parse),
            details: serde_json::json!({}),
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn date_window_is_inclusive_and_needs_both_bounds() {
        let day = |d: &str| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap();
        let fair = event(Some("2024-11-01"), Some("2024-11-10"));

        assert!(within(&fair, day("2024-11-01")));
        assert!(within(&fair, day("2024-11-10")));
        assert!(!within(&fair, day("2024-11-11")));
        assert!(!within(&event(Some("2024-11-01"), None), day("2024-11-05")));
    }
}
