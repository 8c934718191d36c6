//! Record a local event.

use anyhow::Result;
use std::path::Path;

use super::open_engine;

/// Run the append command.
pub async fn run(data_dir: &Path, event_type: &str, payload: &str) -> Result<()> {
    let (_, engine) = open_engine(data_dir).await?;
    let event = engine.record(event_type, payload).await?;

    println!("Recorded event #{} ({})", event.sequence, event.event_type);
    println!("  Pending: {} event(s)", engine.pending().await?.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_client::LocalLog;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_assigns_next_sequence() {
        let dir = tempdir().unwrap();
        crate::commands::init::run(dir.path(), "http://localhost:8080", "alice")
            .await
            .unwrap();

        run(dir.path(), "todo_created", "{\"title\":\"milk\"}").await.unwrap();
        run(dir.path(), "todo_done", "{}").await.unwrap();

        let (_, engine) = open_engine(dir.path()).await.unwrap();
        let events = engine.store().all().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[1].event_type, "todo_done");
    }

    #[tokio::test]
    async fn append_requires_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), "a", "{}").await.is_err());
    }
}
