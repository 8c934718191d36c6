//! Print the local event log.

use anyhow::Result;
use std::path::Path;
use sync_client::LocalLog;
use sync_types::EventRecord;

use super::open_engine;

/// Run the log command.
pub async fn run(data_dir: &Path, since: Option<i64>) -> Result<()> {
    let (_, engine) = open_engine(data_dir).await?;
    let cursor = engine.cursor().await?;
    let events = match since {
        Some(after) => engine.store().range_since(after).await?,
        None => engine.store().all().await?,
    };

    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }

    for event in &events {
        println!("{}", format_event(event, cursor));
    }

    Ok(())
}

/// One line per event; unsynced events are starred.
fn format_event(event: &EventRecord, cursor: i64) -> String {
    let marker = if event.sequence > cursor { "*" } else { " " };
    format!(
        "{marker} #{:<5} {:<20} {:<25} {}",
        event.sequence, event.event_type, event.timestamp, event.payload
    )
}
