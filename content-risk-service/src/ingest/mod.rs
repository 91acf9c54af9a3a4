//! Ingestion orchestrator
//!
//! Every source runs as an independently startable/stoppable background
//! task registered in a process-wide [`SourceRegistry`]. All sources funnel
//! through [`Ingestor::create_post_and_queue`], which guarantees uniform
//! storage layout, dedup and enqueue behavior.

pub mod folder_watcher;
pub mod platforms;
pub mod replay;

use crate::db::PostsDb;
use crate::error::{Result, RiskServiceError};
use crate::models::{Media, MediaType, NewPost, Post};
use crate::queue::AnalysisQueue;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// The ingestion sources this service can run. One background loop each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    FolderWatcher,
    Replay,
    TwitterPoll,
    FacebookPoll,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::FolderWatcher => "folder_watcher",
            SourceKind::Replay => "replay",
            SourceKind::TwitterPoll => "twitter_poll",
            SourceKind::FacebookPoll => "facebook_poll",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of one source loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Running,
    Stopping,
}

struct SourceHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Process-wide registry of source controllers. Enforces single-flight:
/// starting a source that is already running is rejected, not duplicated.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Mutex<HashMap<SourceKind, SourceHandle>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a source loop. The loop receives a cooperative stop flag it
    /// must check at loop-top and at every one-second sleep increment.
    pub async fn start<F, Fut>(&self, kind: SourceKind, run: F) -> Result<()>
    where
        F: FnOnce(Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut sources = self.sources.lock().await;

        if let Some(existing) = sources.get(&kind) {
            if !existing.handle.is_finished() {
                return Err(RiskServiceError::SourceAlreadyRunning(kind.to_string()));
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run(stop.clone()));
        sources.insert(kind, SourceHandle { stop, handle });

        tracing::info!(source = %kind, "Source started");
        Ok(())
    }

    /// Request a cooperative stop. Returns false when the source is not
    /// running. The loop exits at its next checkpoint.
    pub async fn stop(&self, kind: SourceKind) -> bool {
        let sources = self.sources.lock().await;
        match sources.get(&kind) {
            Some(source) if !source.handle.is_finished() => {
                source.stop.store(true, Ordering::Relaxed);
                tracing::info!(source = %kind, "Stop requested");
                true
            }
            _ => false,
        }
    }

    pub async fn state(&self, kind: SourceKind) -> SourceState {
        let sources = self.sources.lock().await;
        match sources.get(&kind) {
            None => SourceState::Idle,
            Some(source) if source.handle.is_finished() => SourceState::Idle,
            Some(source) if source.stop.load(Ordering::Relaxed) => SourceState::Stopping,
            Some(_) => SourceState::Running,
        }
    }

    pub async fn stop_all(&self) {
        let sources = self.sources.lock().await;
        for (kind, source) in sources.iter() {
            if !source.handle.is_finished() {
                source.stop.store(true, Ordering::Relaxed);
                tracing::info!(source = %kind, "Stop requested");
            }
        }
    }
}

/// Sleep in increments, checking the stop flag between increments so stop
/// latency stays bounded regardless of the configured interval.
pub async fn sleep_with_stop(stop: &AtomicBool, total: Duration, increment: Duration) {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let step = remaining.min(increment);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
}

/// Default stop-check granularity for long sleeps.
pub const STOP_CHECK_INCREMENT: Duration = Duration::from_secs(1);

/// A post description file as found in the demo/replay directories.
#[derive(Debug, Clone, Deserialize)]
pub struct PostDescription {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub platform_post_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub media_paths: Vec<String>,
}

impl PostDescription {
    /// Parse a description file, keeping the raw payload for audit.
    pub fn parse(content: &str) -> Result<(Self, serde_json::Value)> {
        let raw: serde_json::Value = serde_json::from_str(content)?;
        let description: PostDescription = serde_json::from_value(raw.clone())?;
        Ok((description, raw))
    }

    /// Media paths, optionally resolving relative entries against a base
    /// directory (the watch directory for the folder watcher).
    pub fn media_paths_resolved(&self, base: Option<&Path>) -> Vec<PathBuf> {
        self.media_paths
            .iter()
            .map(|raw| {
                let path = PathBuf::from(raw);
                match base {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path,
                }
            })
            .collect()
    }

    pub fn into_request(
        self,
        raw: serde_json::Value,
        fallback_post_id: &str,
        fallback_author: &str,
        base: Option<&Path>,
    ) -> IngestRequest {
        let media_paths = self.media_paths_resolved(base);
        IngestRequest {
            platform: self.platform.unwrap_or_else(|| "demo".to_string()),
            platform_post_id: self
                .platform_post_id
                .unwrap_or_else(|| fallback_post_id.to_string()),
            text: self.text,
            author: self.author.unwrap_or_else(|| fallback_author.to_string()),
            url: self.url,
            raw,
            media_paths,
        }
    }
}

/// One post handed to the common ingestion entry point.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub platform: String,
    pub platform_post_id: String,
    pub text: String,
    pub author: String,
    pub url: String,
    pub raw: serde_json::Value,
    pub media_paths: Vec<PathBuf>,
}

/// Persistence seam for the ingestion path.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn find_by_platform_id(
        &self,
        platform: &str,
        platform_post_id: &str,
    ) -> Result<Option<Post>>;
    async fn create_post(&self, input: NewPost) -> Result<Post>;
    async fn add_media(&self, post_id: Uuid, media_type: MediaType, path: &str) -> Result<Media>;
}

#[async_trait]
impl PostStore for PostsDb {
    async fn find_by_platform_id(
        &self,
        platform: &str,
        platform_post_id: &str,
    ) -> Result<Option<Post>> {
        PostsDb::find_by_platform_id(self, platform, platform_post_id).await
    }

    async fn create_post(&self, input: NewPost) -> Result<Post> {
        PostsDb::create_post(self, input).await
    }

    async fn add_media(&self, post_id: Uuid, media_type: MediaType, path: &str) -> Result<Media> {
        PostsDb::add_media(self, post_id, media_type, path).await
    }
}

/// Enqueue seam for the analysis work queue.
#[async_trait]
pub trait PostQueue: Send + Sync {
    async fn enqueue(&self, post_id: Uuid) -> Result<()>;
}

#[async_trait]
impl PostQueue for AnalysisQueue {
    async fn enqueue(&self, post_id: Uuid) -> Result<()> {
        AnalysisQueue::enqueue(self, post_id).await
    }
}

/// The single choke point all sources funnel through.
pub struct Ingestor {
    posts: Arc<dyn PostStore>,
    queue: Arc<dyn PostQueue>,
    media_root: PathBuf,
}

impl Ingestor {
    pub fn new(posts: Arc<dyn PostStore>, queue: Arc<dyn PostQueue>, media_root: PathBuf) -> Self {
        Self {
            posts,
            queue,
            media_root,
        }
    }

    pub async fn already_ingested(&self, platform: &str, platform_post_id: &str) -> Result<bool> {
        Ok(self
            .posts
            .find_by_platform_id(platform, platform_post_id)
            .await?
            .is_some())
    }

    /// Persist the post, copy its media into durable storage, persist the
    /// media rows, and enqueue the post for analysis. Re-ingesting an
    /// already-seen (platform, platform_post_id) pair is a no-op.
    pub async fn create_post_and_queue(&self, request: IngestRequest) -> Result<Option<Post>> {
        if self
            .already_ingested(&request.platform, &request.platform_post_id)
            .await?
        {
            tracing::debug!(
                platform = %request.platform,
                platform_post_id = %request.platform_post_id,
                "Post already ingested, skipping"
            );
            return Ok(None);
        }

        let post = self
            .posts
            .create_post(NewPost {
                platform: request.platform,
                platform_post_id: request.platform_post_id,
                url: non_empty(request.url),
                author: non_empty(request.author),
                text: non_empty(request.text),
                raw: request.raw,
            })
            .await?;

        for path in &request.media_paths {
            let media_type = MediaType::from_path(path);
            let stored = self.copy_media_to_storage(path, &post).await?;
            self.posts.add_media(post.id, media_type, &stored).await?;
        }

        self.queue.enqueue(post.id).await?;
        Ok(Some(post))
    }

    /// Copy one media file into `<media_root>/post_<id>/`. A source path
    /// that no longer exists is recorded as-is rather than failing the post.
    async fn copy_media_to_storage(&self, src: &Path, post: &Post) -> Result<String> {
        if !src.exists() {
            return Ok(src.to_string_lossy().into_owned());
        }

        let out_dir = self.media_root.join(format!("post_{}", post.id));
        tokio::fs::create_dir_all(&out_dir).await?;

        let file_name = src
            .file_name()
            .ok_or_else(|| {
                RiskServiceError::InvalidInput(format!("bad media path: {}", src.display()))
            })?;
        let dst = out_dir.join(file_name);
        tokio::fs::copy(src, &dst).await?;

        Ok(dst.to_string_lossy().into_owned())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store tracking (platform, platform_post_id) pairs.
    #[derive(Default)]
    pub struct RecordingStore {
        pub existing: Mutex<Vec<(String, String)>>,
        pub created: AtomicUsize,
    }

    impl RecordingStore {
        pub fn with_existing(pairs: &[(&str, &str)]) -> Self {
            Self {
                existing: Mutex::new(
                    pairs
                        .iter()
                        .map(|(p, id)| (p.to_string(), id.to_string()))
                        .collect(),
                ),
                created: AtomicUsize::new(0),
            }
        }

        pub fn created_count(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    fn stored_post(platform: String, platform_post_id: String) -> Post {
        Post {
            id: Uuid::new_v4(),
            platform,
            platform_post_id,
            url: None,
            author: None,
            text: None,
            lang: None,
            raw: Json(serde_json::json!({})),
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl PostStore for RecordingStore {
        async fn find_by_platform_id(
            &self,
            platform: &str,
            platform_post_id: &str,
        ) -> Result<Option<Post>> {
            let existing = self.existing.lock().unwrap();
            let seen = existing
                .iter()
                .any(|(p, id)| p == platform && id == platform_post_id);
            Ok(seen.then(|| stored_post(platform.to_string(), platform_post_id.to_string())))
        }

        async fn create_post(&self, input: NewPost) -> Result<Post> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.existing
                .lock()
                .unwrap()
                .push((input.platform.clone(), input.platform_post_id.clone()));
            Ok(Post {
                id: Uuid::new_v4(),
                platform: input.platform,
                platform_post_id: input.platform_post_id,
                url: input.url,
                author: input.author,
                text: input.text,
                lang: None,
                raw: Json(input.raw),
                created_at: Utc::now(),
            })
        }

        async fn add_media(
            &self,
            post_id: Uuid,
            media_type: MediaType,
            path: &str,
        ) -> Result<Media> {
            Ok(Media {
                id: Uuid::new_v4(),
                post_id,
                media_type: media_type.as_str().to_string(),
                path: path.to_string(),
                meta: Json(serde_json::json!({})),
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingQueue {
        pub enqueued: AtomicUsize,
    }

    impl RecordingQueue {
        pub fn enqueued_count(&self) -> usize {
            self.enqueued.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PostQueue for RecordingQueue {
        async fn enqueue(&self, _post_id: Uuid) -> Result<()> {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{RecordingQueue, RecordingStore};
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_registry_single_flight() {
        let registry = SourceRegistry::new();

        registry
            .start(SourceKind::Replay, |stop| async move {
                while !stop.load(Ordering::Relaxed) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();

        assert_eq!(registry.state(SourceKind::Replay).await, SourceState::Running);

        let second = registry.start(SourceKind::Replay, |_| async {}).await;
        assert!(matches!(
            second,
            Err(RiskServiceError::SourceAlreadyRunning(_))
        ));

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_exits_within_check_interval() {
        let registry = SourceRegistry::new();

        registry
            .start(SourceKind::FolderWatcher, |stop| async move {
                // Long nominal interval, short check increment.
                sleep_with_stop(&stop, Duration::from_secs(600), Duration::from_millis(20)).await;
            })
            .await
            .unwrap();

        let started = Instant::now();
        assert!(registry.stop(SourceKind::FolderWatcher).await);

        // The loop should notice the flag within a couple of increments.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            registry.state(SourceKind::FolderWatcher).await,
            SourceState::Idle
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_restart_after_finish() {
        let registry = SourceRegistry::new();

        registry
            .start(SourceKind::Replay, |_| async {})
            .await
            .unwrap();
        // Let the no-op loop complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.state(SourceKind::Replay).await, SourceState::Idle);

        registry
            .start(SourceKind::Replay, |_| async {})
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_on_idle_source_is_false() {
        let registry = SourceRegistry::new();
        assert!(!registry.stop(SourceKind::TwitterPoll).await);
    }

    fn request(platform_post_id: &str) -> IngestRequest {
        IngestRequest {
            platform: "demo".to_string(),
            platform_post_id: platform_post_id.to_string(),
            text: "hello".to_string(),
            author: "tester".to_string(),
            url: String::new(),
            raw: serde_json::json!({}),
            media_paths: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_reingest_same_platform_id_is_noop() {
        let store = Arc::new(RecordingStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let ingestor = Ingestor::new(store.clone(), queue.clone(), std::env::temp_dir());

        let first = ingestor.create_post_and_queue(request("p-1")).await.unwrap();
        assert!(first.is_some());

        let second = ingestor.create_post_and_queue(request("p-1")).await.unwrap();
        assert!(second.is_none());

        // Exactly one row and one queue entry for the pair.
        assert_eq!(store.created_count(), 1);
        assert_eq!(queue.enqueued_count(), 1);
    }

    #[tokio::test]
    async fn test_same_post_id_on_other_platform_is_distinct() {
        let store = Arc::new(RecordingStore::with_existing(&[("twitter", "p-1")]));
        let queue = Arc::new(RecordingQueue::default());
        let ingestor = Ingestor::new(store.clone(), queue.clone(), std::env::temp_dir());

        let created = ingestor.create_post_and_queue(request("p-1")).await.unwrap();
        assert!(created.is_some());
        assert_eq!(store.created_count(), 1);
    }

    #[test]
    fn test_description_defaults() {
        let (description, raw) =
            PostDescription::parse(r#"{"text": "hello", "media_paths": ["a.mp4"]}"#).unwrap();
        let request = description.into_request(raw, "file_stem", "watcher", None);
        assert_eq!(request.platform, "demo");
        assert_eq!(request.platform_post_id, "file_stem");
        assert_eq!(request.author, "watcher");
        assert_eq!(request.media_paths, vec![PathBuf::from("a.mp4")]);
    }

    #[test]
    fn test_description_relative_paths_resolved() {
        let (description, _) =
            PostDescription::parse(r#"{"media_paths": ["clip.mp4", "/abs/photo.jpg"]}"#).unwrap();
        let resolved = description.media_paths_resolved(Some(Path::new("/watch")));
        assert_eq!(resolved[0], PathBuf::from("/watch/clip.mp4"));
        assert_eq!(resolved[1], PathBuf::from("/abs/photo.jpg"));
    }

    #[test]
    fn test_description_rejects_malformed_json() {
        assert!(PostDescription::parse("not json at all").is_err());
    }
}
