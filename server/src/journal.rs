use anyhow::{Context, Result};
use gas_guard::GuardEvent;
use gas_guard::events::encode_frame;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::info;

/// Drains the guard's event sink until every sender is gone. Each event is
/// logged and, with a path configured, appended to the journal as a borsh
/// frame. Returns the number of events seen.
pub async fn run_journal(
    mut events: mpsc::UnboundedReceiver<GuardEvent>,
    path: Option<PathBuf>,
) -> Result<u64> {
    let mut file: Option<File> = match &path {
        Some(p) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
                .await
                .with_context(|| format!("opening journal {}", p.display()))?,
        ),
        None => None,
    };

    let mut count = 0;
    while let Some(event) = events.recv().await {
        info!("GUARD EVENT: {:?}", event);
        if let Some(f) = file.as_mut() {
            let frame = encode_frame(&event).context("encoding event")?;
            f.write_all(&frame).await.context("writing journal")?;
        }
        count += 1;
    }

    if let Some(f) = file.as_mut() {
        f.flush().await.context("flushing journal")?;
    }
    Ok(count)
}
