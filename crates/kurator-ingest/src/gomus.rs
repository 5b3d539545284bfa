//! Booking report ingestion
//!
//! Downloads a report export from the gomus booking system and reshapes it
//! into the warehouse booking layout. Reports are configured inside gomus;
//! fetching one needs a valid session id, taken from `GOMUS_SESS_ID`.
//! Destination: `gomus_booking`, keyed on the booking number.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use kurator_db::Dataset;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Destination declaration for booking report rows.
pub struct GomusBookings;

impl Dataset for GomusBookings {
    fn table_name(&self) -> &str {
        "gomus_booking"
    }

    fn primary_key(&self) -> &[&str] {
        &["booking_id"]
    }

    fn columns(&self) -> &[(&str, &str)] {
        &[
            ("booking_id", "INT"),
            ("category", "TEXT"),
            ("participants", "INT"),
            ("guide", "TEXT"),
            ("start_at", "TIMESTAMP"),
            ("status", "TEXT"),
        ]
    }
}

/// Download the report export and write the reshaped extract to `output`.
pub async fn ingest(base_url: &str, report: &str, output: &Path) -> Result<()> {
    let session_id = std::env::var("GOMUS_SESS_ID")
        .context("GOMUS_SESS_ID is not set; log into gomus and export the session cookie")?;

    let client = reqwest::Client::new();
    let raw = fetch_report(&client, base_url, report, &session_id).await?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(output)
        .with_context(|| format!("could not create {}", output.display()))?;
    reshape_bookings(&raw, file)?;

    info!(report, output = %output.display(), "extract written");
    Ok(())
}

/// Fetch the raw CSV export of `report` using `session_id`.
pub async fn fetch_report(
    client: &reqwest::Client,
    base_url: &str,
    report: &str,
    session_id: &str,
) -> Result<String> {
    let url = format!("{base_url}/reports/{report}.csv");
    debug!(%url, "requesting report export");

    let response = client
        .get(&url)
        .header(reqwest::header::COOKIE, format!("_session_id={session_id}"))
        .send()
        .await?;
    if !response.status().is_success() {
        anyhow::bail!("report export request failed: {}", response.status());
    }
    Ok(response.text().await?)
}

/// Reshape the export into the warehouse booking layout. The export carries
/// German column headers in whatever order the report was configured with;
/// the extract carries exactly the declared layout, with date and start
/// time combined into one timestamp.
pub fn reshape_bookings<W: Write>(raw_csv: &str, writer: W) -> Result<()> {
    let mut reader = csv::Reader::from_reader(raw_csv.as_bytes());
    let headers = reader.headers()?.clone();
    let index = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .with_context(|| format!("report export is missing column '{name}'"))
    };

    let booking_id = index("Nummer")?;
    let category = index("Angebotskategorie")?;
    let participants = index("Teilnehmerzahl")?;
    let guide = index("Guide")?;
    let date = index("Datum")?;
    let time = index("Uhrzeit von")?;
    let status = index("Status")?;

    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(["booking_id", "category", "participants", "guide", "start_at", "status"])?;

    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let start_at = combine_start(field(date), field(time))?;
        csv.write_record([
            field(booking_id),
            field(category),
            field(participants),
            field(guide),
            start_at.as_str(),
            field(status),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Combine the export's "01.07.2026" date and "14:30" start time into a
/// timestamp literal.
fn combine_start(date: &str, time: &str) -> Result<String> {
    let date = NaiveDate::parse_from_str(date, "%d.%m.%Y")
        .with_context(|| format!("unparseable report date '{date}'"))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .with_context(|| format!("unparseable report time '{time}'"))?;
    Ok(date.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string())
}
