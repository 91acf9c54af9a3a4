//! Dataset replay source
//!
//! Feeds a directory of post description files through ingestion at a
//! configurable speed, simulating a live stream for demos and load tests.
//! Files are replayed in lexicographic name order for reproducibility.

use super::{sleep_with_stop, Ingestor, PostDescription};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub async fn replay_dataset(
    stop: Arc<AtomicBool>,
    ingestor: Arc<Ingestor>,
    dir: PathBuf,
    speed: f64,
    limit: usize,
) {
    let mut files = match collect_description_files(&dir).await {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Replay directory unreadable");
            return;
        }
    };
    files.truncate(limit);

    let delay = replay_delay(speed);
    tracing::info!(
        dir = %dir.display(),
        files = files.len(),
        delay_ms = delay.as_millis() as u64,
        "Replay started"
    );

    let mut replayed = 0;
    for path in files {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if let Err(e) = replay_one(&ingestor, &path).await {
            tracing::warn!(file = %path.display(), error = %e, "Replay entry failed");
        } else {
            replayed += 1;
        }

        sleep_with_stop(&stop, delay, super::STOP_CHECK_INCREMENT).await;
    }

    tracing::info!(dir = %dir.display(), replayed, "Replay finished");
}

/// Inter-post delay for a replay speed. The speed floor keeps a zero or
/// negative value from dividing to infinity; the delay floor keeps a huge
/// speed from degenerating into a busy loop.
fn replay_delay(speed: f64) -> Duration {
    Duration::from_secs_f64((1.0 / speed.max(0.1)).max(0.1))
}

async fn collect_description_files(dir: &PathBuf) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn replay_one(ingestor: &Ingestor, path: &PathBuf) -> crate::error::Result<()> {
    let content = tokio::fs::read_to_string(path).await?;
    let (description, raw) = PostDescription::parse(&content)?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let request = description.into_request(raw, &stem, "unknown", None);

    ingestor.create_post_and_queue(request).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{RecordingQueue, RecordingStore};
    use super::super::Ingestor;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replay_delay_is_inverse_speed_with_floors() {
        assert!((replay_delay(1.0).as_secs_f64() - 1.0).abs() < 1e-9);
        assert!((replay_delay(2.0).as_secs_f64() - 0.5).abs() < 1e-9);
        // Delay floor at 0.1s.
        assert!((replay_delay(1000.0).as_secs_f64() - 0.1).abs() < 1e-9);
        // Speed floor at 0.1 catches zero and negative values.
        assert!((replay_delay(0.0).as_secs_f64() - 10.0).abs() < 1e-9);
        assert!((replay_delay(-3.0).as_secs_f64() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_replay_ingests_in_name_order_up_to_limit() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"text": "second"}"#).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"{"text": "first"}"#).unwrap();

        let store = Arc::new(RecordingStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let ingestor = Arc::new(Ingestor::new(
            store.clone(),
            queue.clone(),
            dir.path().to_path_buf(),
        ));

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        replay_dataset(stop, ingestor, dir.path().to_path_buf(), 1000.0, 1).await;

        // Limit 1 with lexicographic ordering: only a.json went through.
        assert_eq!(store.created_count(), 1);
        assert_eq!(queue.enqueued_count(), 1);
        let seen = store.existing.lock().unwrap();
        assert_eq!(seen[0].1, "a");
    }
}
