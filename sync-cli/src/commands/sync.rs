//! Sync with the relay, optionally forwarding a request.

use anyhow::{Context, Result};
use std::path::Path;
use sync_client::{SyncFailure, SyncMode, SyncOutcome};
use sync_types::ForwardTemplate;

use super::open_engine;

/// Run the sync command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let (_, engine) = open_engine(data_dir).await?;
    let result = engine.sync(SyncMode::SyncOnly).await;
    report(result)
}

/// Run the proxy command.
pub async fn run_proxy(data_dir: &Path, template: ForwardTemplate) -> Result<()> {
    let (_, engine) = open_engine(data_dir).await?;
    let result = engine.sync(SyncMode::SyncAndForward(template)).await;
    report(result)
}

/// Build a forward template from command-line pieces.
///
/// Headers are `Name: value` or `Name=value`.
pub fn build_template(
    url: &str,
    method: Option<&str>,
    headers: &[String],
    body: Option<&str>,
) -> Result<ForwardTemplate> {
    let mut template = ForwardTemplate::new(url);
    if let Some(method) = method {
        template = template.with_method(method);
    }
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .or_else(|| header.split_once('='))
            .with_context(|| format!("Invalid header {header:?}, expected 'Name: value'"))?;
        template = template.with_header(name.trim(), value.trim());
    }
    if let Some(body) = body {
        template = template.with_body(serde_json::Value::String(body.to_string()));
    }
    Ok(template)
}

fn report(result: std::result::Result<SyncOutcome, SyncFailure>) -> Result<()> {
    match result {
        Ok(SyncOutcome::Synced(r)) => {
            println!("Synced.");
            println!("  Pushed: {}  Pulled: {}  Cursor: {}", r.pushed, r.pulled, r.cursor);
        }
        Ok(SyncOutcome::Forwarded { report: r, response }) => {
            println!("Synced and forwarded.");
            println!("  Pushed: {}  Pulled: {}  Cursor: {}", r.pushed, r.pulled, r.cursor);
            println!("  Upstream status: {}", response.status);
            println!();
            println!("{}", response.body);
        }
        Ok(SyncOutcome::Rejected { report: r, message }) => {
            println!("Sync rejected after {} attempts: {}", r.attempts, message);
            println!("  Server events applied. Cursor: {}", r.cursor);
        }
        Err(SyncFailure::Offline(e)) => {
            println!("Offline: {e}");
            println!("  Local events are kept and will sync later.");
        }
        Err(e) => return Err(e).context("Sync failed"),
    }
    Ok(())
}
