//! App Store review ingestion
//!
//! Pages through the iTunes RSS customer-reviews feed for one app and
//! storefront country, following the feed's `rel="next"` links, and
//! flattens the entries into a header-bearing CSV extract. Destination:
//! `appstore_review`, keyed on the review id.

use anyhow::{Context, Result};
use kurator_db::Dataset;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

const ITUNES_BASE_URL: &str = "https://itunes.apple.com";

const CSV_HEADER: [&str; 8] = [
    "id",
    "author",
    "content",
    "rating",
    "app_version",
    "vote_count",
    "vote_sum",
    "title",
];

/// Destination declaration for App Store reviews.
pub struct AppstoreReviews;

impl Dataset for AppstoreReviews {
    fn table_name(&self) -> &str {
        "appstore_review"
    }

    fn primary_key(&self) -> &[&str] {
        &["id"]
    }

    fn columns(&self) -> &[(&str, &str)] {
        &[
            ("id", "TEXT"),
            ("author", "TEXT"),
            ("content", "TEXT"),
            ("rating", "INT"),
            ("app_version", "TEXT"),
            ("vote_count", "INT"),
            ("vote_sum", "INT"),
            ("title", "TEXT"),
        ]
    }
}

/// One flattened review entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: String,
    pub author: String,
    pub content: String,
    pub rating: i64,
    pub app_version: String,
    pub vote_count: i64,
    pub vote_sum: i64,
    pub title: String,
}

/// Fetch all reviews for `app_id` in `country` and write them to `output`.
pub async fn ingest(app_id: &str, country: &str, output: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let reviews = fetch_reviews(&client, ITUNES_BASE_URL, app_id, country).await?;
    info!(count = reviews.len(), "fetched App Store reviews");

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(output)
        .with_context(|| format!("could not create {}", output.display()))?;
    write_csv(&reviews, file)?;

    info!(output = %output.display(), "extract written");
    Ok(())
}

/// Fetch every review page, following next links until a page comes back
/// empty or stops pointing anywhere new. The feed serves overlapping pages
/// now and then, so entries are deduplicated by review id.
pub async fn fetch_reviews(
    client: &reqwest::Client,
    base_url: &str,
    app_id: &str,
    country: &str,
) -> Result<Vec<Review>> {
    let mut url = format!(
        "{base_url}/{country}/rss/customerreviews/page=1/id={app_id}/sortby=mostrecent/json"
    );
    let mut reviews = Vec::new();

    loop {
        debug!(%url, "fetching review page");
        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("review feed request failed: {}", response.status());
        }
        let feed: Value = response.json().await?;

        let page = parse_feed_page(&feed);
        if page.is_empty() {
            break;
        }
        reviews.extend(page);

        match next_page_url(&feed) {
            Some(next) if next != url => url = next,
            _ => break,
        }
    }

    let mut seen = HashSet::new();
    reviews.retain(|review| seen.insert(review.id.clone()));
    Ok(reviews)
}

/// Write reviews as the header-bearing CSV extract the load layer expects.
/// The header is written even when there are no reviews.
pub fn write_csv<W: Write>(reviews: &[Review], writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for review in reviews {
        csv.serialize(review)?;
    }
    csv.flush()?;
    Ok(())
}

fn parse_feed_page(feed: &Value) -> Vec<Review> {
    let entries = match feed.pointer("/feed/entry") {
        Some(Value::Array(entries)) => entries.as_slice(),
        // A page with a single review serves the entry as a bare object.
        Some(entry @ Value::Object(_)) => std::slice::from_ref(entry),
        _ => &[],
    };
    entries.iter().filter_map(parse_entry).collect()
}

/// Flatten one feed entry. Entries without a rating (the feed interleaves
/// app metadata with the actual reviews) are skipped.
fn parse_entry(entry: &Value) -> Option<Review> {
    let label = |path: &str| {
        entry
            .pointer(path)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let number = |path: &str| entry.pointer(path)?.as_str()?.parse::<i64>().ok();

    Some(Review {
        id: label("/id/label")?,
        author: label("/author/name/label").unwrap_or_default(),
        content: label("/content/label").unwrap_or_default(),
        rating: number("/im:rating/label")?,
        app_version: label("/im:version/label").unwrap_or_default(),
        vote_count: number("/im:voteCount/label").unwrap_or(0),
        vote_sum: number("/im:voteSum/label").unwrap_or(0),
        title: label("/title/label").unwrap_or_default(),
    })
}

fn next_page_url(feed: &Value) -> Option<String> {
    let links = feed.pointer("/feed/link")?.as_array()?;
    links
        .iter()
        .find(|link| link.pointer("/attributes/rel").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.pointer("/attributes/href").and_then(Value::as_str))
        // The feed's next links point at the XML rendering of the same page.
        .map(|href| href.replace("xml", "json"))
}
