//! Demo folder watcher source
//!
//! Scans a directory for `*.json` post description files every couple of
//! seconds. A file is marked processed only after successful ingestion, so
//! transient failures get retried on the next scan.

use super::{sleep_with_stop, Ingestor, PostDescription};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SCAN_INTERVAL: Duration = Duration::from_secs(2);

pub async fn watch_folder(stop: Arc<AtomicBool>, ingestor: Arc<Ingestor>, dir: PathBuf) {
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tracing::warn!(dir = %dir.display(), error = %e, "Could not create watch directory");
    }

    let mut processed: HashSet<String> = HashSet::new();

    while !stop.load(Ordering::Relaxed) {
        match scan_once(&ingestor, &dir, &mut processed).await {
            Ok(ingested) if ingested > 0 => {
                tracing::info!(dir = %dir.display(), ingested, "Folder scan ingested posts");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Folder scan failed");
            }
        }

        sleep_with_stop(&stop, SCAN_INTERVAL, super::STOP_CHECK_INCREMENT).await;
    }
}

async fn scan_once(
    ingestor: &Ingestor,
    dir: &PathBuf,
    processed: &mut HashSet<String>,
) -> std::io::Result<usize> {
    let mut ingested = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if processed.contains(&name) {
            continue;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Could not read description file");
                continue;
            }
        };

        let (description, raw) = match PostDescription::parse(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "Skipping malformed description file");
                continue;
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        let request = description.into_request(raw, &stem, "watcher", Some(dir));

        match ingestor.create_post_and_queue(request).await {
            Ok(outcome) => {
                processed.insert(name);
                // Dedup no-ops are marked processed but not counted.
                if outcome.is_some() {
                    ingested += 1;
                }
            }
            Err(e) => {
                // Left unmarked so the next scan retries it.
                tracing::warn!(file = %path.display(), error = %e, "Ingestion failed");
            }
        }
    }

    Ok(ingested)
}
