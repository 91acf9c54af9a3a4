//! Remote platform polling sources
//!
//! Twitter recent-search and Facebook page-feed pollers, plus the media
//! fetcher that downloads remote attachments into local storage before the
//! post enters the common ingestion path. Poll cycles swallow transient
//! errors; a failed cycle just waits for the next interval.

use super::{sleep_with_stop, Ingestor, IngestRequest, STOP_CHECK_INCREMENT};
use crate::error::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const TWITTER_SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
const FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com/v21.0";

/// Attachment fields requested from the Graph API; subattachments carry the
/// per-item media of album and multi-video posts, and `unshimmed_url` is the
/// direct target behind the Facebook link shim.
const FACEBOOK_POST_FIELDS: &str = "id,message,permalink_url,created_time,from,\
attachments{media_type,type,media,url,unshimmed_url,\
subattachments{media_type,type,media,url,unshimmed_url}}";

/// One post fetched from a remote platform, before media download.
#[derive(Debug, Clone)]
pub struct RemotePost {
    pub platform_post_id: String,
    pub text: String,
    pub author: String,
    pub url: String,
    pub raw: Value,
    pub media_urls: Vec<String>,
}

#[async_trait]
pub trait PlatformSource: Send + Sync {
    fn platform(&self) -> &'static str;
    async fn fetch_recent(&self) -> Result<Vec<RemotePost>>;
}

pub struct TwitterSource {
    client: reqwest::Client,
    bearer_token: String,
    query: String,
    limit: usize,
}

impl TwitterSource {
    pub fn new(client: reqwest::Client, bearer_token: String, query: String, limit: usize) -> Self {
        Self {
            client,
            bearer_token,
            query,
            limit,
        }
    }
}

#[async_trait]
impl PlatformSource for TwitterSource {
    fn platform(&self) -> &'static str {
        "twitter"
    }

    async fn fetch_recent(&self) -> Result<Vec<RemotePost>> {
        let max_results = self.limit.clamp(10, 100).to_string();
        let response = self
            .client
            .get(TWITTER_SEARCH_URL)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("query", self.query.as_str()),
                ("max_results", max_results.as_str()),
                ("tweet.fields", "author_id,created_at,lang"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Twitter search returned non-success");
            return Ok(Vec::new());
        }

        let body: Value = response.json().await?;
        let tweets = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let posts = tweets
            .into_iter()
            .filter_map(|tweet| {
                let id = tweet.get("id")?.as_str()?.to_string();
                Some(RemotePost {
                    url: format!("https://x.com/i/web/status/{}", id),
                    platform_post_id: id,
                    text: tweet
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    author: tweet
                        .get("author_id")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    raw: tweet,
                    media_urls: Vec::new(),
                })
            })
            .collect();
        Ok(posts)
    }
}

pub struct FacebookSource {
    client: reqwest::Client,
    access_token: String,
    page_ids: Vec<String>,
    limit: usize,
}

impl FacebookSource {
    pub fn new(
        client: reqwest::Client,
        access_token: String,
        page_ids: Vec<String>,
        limit: usize,
    ) -> Self {
        Self {
            client,
            access_token,
            page_ids,
            limit,
        }
    }

    async fn fetch_page(&self, page_id: &str) -> Result<Vec<RemotePost>> {
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(format!("{}/{}/posts", FACEBOOK_GRAPH_URL, page_id))
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("fields", FACEBOOK_POST_FIELDS),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(
                page_id,
                status = %response.status(),
                "Facebook page feed returned non-success"
            );
            return Ok(Vec::new());
        }

        let body: Value = response.json().await?;
        let entries = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let posts = entries
            .into_iter()
            .filter_map(|post| {
                let id = post.get("id")?.as_str()?.to_string();
                Some(RemotePost {
                    platform_post_id: id,
                    text: post
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    author: post
                        .get("from")
                        .and_then(|from| from.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    url: post
                        .get("permalink_url")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    media_urls: media_urls_from_attachments(&post),
                    raw: post,
                })
            })
            .collect();
        Ok(posts)
    }
}

#[async_trait]
impl PlatformSource for FacebookSource {
    fn platform(&self) -> &'static str {
        "facebook"
    }

    async fn fetch_recent(&self) -> Result<Vec<RemotePost>> {
        let mut posts = Vec::new();
        for page_id in &self.page_ids {
            match self.fetch_page(page_id).await {
                Ok(page_posts) => posts.extend(page_posts),
                Err(e) => {
                    tracing::warn!(page_id, error = %e, "Facebook page fetch failed");
                }
            }
        }
        Ok(posts)
    }
}

/// Flatten a post's attachments into individual nodes. Parent attachments
/// are kept alongside their expanded subattachments; album covers and the
/// per-item media both carry resolvable URLs, and dedup removes overlap.
fn attachment_nodes(post: &Value) -> Vec<&Value> {
    let mut nodes = Vec::new();
    let attachments = post
        .get("attachments")
        .and_then(|a| a.get("data"))
        .and_then(Value::as_array);

    for attachment in attachments.into_iter().flatten() {
        nodes.push(attachment);
        let sub = attachment
            .get("subattachments")
            .and_then(|s| s.get("data"))
            .and_then(Value::as_array);
        if let Some(children) = sub {
            nodes.extend(children);
        }
    }
    nodes
}

fn first_http_url<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|url| url.starts_with("http"))
        .map(str::to_string)
}

/// Resolve downloadable media URLs from a Graph API post payload. A node is
/// a video when either of its type fields contains "video" (the Graph API
/// uses variants like `video_inline` and `video_autoplay`). Videos prefer
/// the direct `media.source`, images the CDN `media.image.src`; the
/// unshimmed URL and the attachment-level `url` are fallbacks for either.
/// Order is preserved and duplicates dropped.
pub fn media_urls_from_attachments(post: &Value) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    for node in attachment_nodes(post) {
        let media_type = node
            .get("media_type")
            .or_else(|| node.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_lowercase();
        let media = node.get("media");

        let resolved = if media_type.contains("video") {
            first_http_url([
                media.and_then(|m| m.get("source")),
                node.get("unshimmed_url"),
                node.get("url"),
            ])
        } else {
            first_http_url([
                media
                    .and_then(|m| m.get("image"))
                    .and_then(|i| i.get("src")),
                node.get("unshimmed_url"),
                node.get("url"),
            ])
        };

        if let Some(url) = resolved {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Extensions trusted enough to carry over from the URL path.
const KNOWN_SUFFIXES: [&str; 8] = ["mp4", "mov", "m4v", "jpg", "jpeg", "png", "webp", "gif"];

fn suffix_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    if KNOWN_SUFFIXES.contains(&ext.as_str()) && path.contains('.') && !ext.contains('/') {
        Some(format!(".{}", ext))
    } else {
        None
    }
}

fn suffix_from_content_type(content_type: &str) -> Option<&'static str> {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match ct.as_str() {
        "video/mp4" => Some(".mp4"),
        "video/quicktime" => Some(".mov"),
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/webp" => Some(".webp"),
        "image/gif" => Some(".gif"),
        other if other.starts_with("video/") => Some(".mp4"),
        other if other.starts_with("image/") => Some(".jpg"),
        _ => None,
    }
}

fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Best-effort streaming downloader for remote attachments. Anything other
/// than a successful image/video response yields None; ingestion proceeds
/// without the file.
pub struct MediaFetcher {
    client: reqwest::Client,
    tmp_dir: PathBuf,
}

impl MediaFetcher {
    pub fn new(client: reqwest::Client, media_root: &std::path::Path) -> Self {
        Self {
            client,
            tmp_dir: media_root.join("_ingest_tmp"),
        }
    }

    pub async fn download(&self, url: &str, prefix: &str) -> Option<PathBuf> {
        match self.try_download(url, prefix).await {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(url, error = %e, "Media download failed");
                None
            }
        }
    }

    async fn try_download(&self, url: &str, prefix: &str) -> Result<Option<PathBuf>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Media URL returned non-success");
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") && !content_type.starts_with("video/") {
            tracing::debug!(url, content_type, "Skipping non-media response");
            return Ok(None);
        }

        let suffix = match suffix_from_url(response.url().path())
            .or_else(|| suffix_from_content_type(&content_type).map(str::to_string))
        {
            Some(suffix) => suffix,
            None => return Ok(None),
        };

        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        let file_name = format!(
            "{}_{}{}",
            sanitize_prefix(prefix),
            chrono::Utc::now().timestamp_millis(),
            suffix
        );
        let path = self.tmp_dir.join(file_name);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(Some(path))
    }
}

/// Generic poll loop shared by the platform sources: fetch, dedup, download
/// media, ingest, sleep. Errors within a cycle are logged and swallowed so
/// one bad cycle never kills the poller.
pub async fn poll_platform(
    stop: Arc<AtomicBool>,
    ingestor: Arc<Ingestor>,
    source: Arc<dyn PlatformSource>,
    fetcher: Arc<MediaFetcher>,
    interval: Duration,
) {
    let platform = source.platform();

    while !stop.load(Ordering::Relaxed) {
        match source.fetch_recent().await {
            Ok(posts) => {
                for post in posts {
                    if let Err(e) = ingest_remote_post(&ingestor, &fetcher, platform, post).await {
                        tracing::warn!(platform, error = %e, "Remote post ingestion failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(platform, error = %e, "Poll cycle failed");
            }
        }

        sleep_with_stop(&stop, interval, STOP_CHECK_INCREMENT).await;
    }
}

async fn ingest_remote_post(
    ingestor: &Ingestor,
    fetcher: &MediaFetcher,
    platform: &str,
    post: RemotePost,
) -> Result<()> {
    if ingestor
        .already_ingested(platform, &post.platform_post_id)
        .await?
    {
        return Ok(());
    }

    let mut media_paths = Vec::new();
    for (index, url) in post.media_urls.iter().enumerate() {
        let prefix = format!("{}_{}_{}", platform, post.platform_post_id, index);
        if let Some(path) = fetcher.download(url, &prefix).await {
            media_paths.push(path);
        }
    }

    ingestor
        .create_post_and_queue(IngestRequest {
            platform: platform.to_string(),
            platform_post_id: post.platform_post_id,
            text: post.text,
            author: post.author,
            url: post.url,
            raw: post.raw,
            media_paths,
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_attachment_prefers_source() {
        let post = json!({
            "attachments": {"data": [{
                "media_type": "video",
                "media": {"source": "https://cdn.example/video.mp4",
                          "image": {"src": "https://cdn.example/thumb.jpg"}},
                "url": "https://facebook.com/watch/123"
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec!["https://cdn.example/video.mp4"]
        );
    }

    #[test]
    fn test_image_attachment_prefers_cdn_src() {
        let post = json!({
            "attachments": {"data": [{
                "media_type": "photo",
                "media": {"image": {"src": "https://cdn.example/photo.jpg"}},
                "url": "https://facebook.com/photo/456"
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec!["https://cdn.example/photo.jpg"]
        );
    }

    #[test]
    fn test_subattachments_expand_and_dedup() {
        let post = json!({
            "attachments": {"data": [{
                "media_type": "album",
                "subattachments": {"data": [
                    {"media_type": "photo",
                     "media": {"image": {"src": "https://cdn.example/a.jpg"}}},
                    {"media_type": "photo",
                     "media": {"image": {"src": "https://cdn.example/b.jpg"}}},
                    {"media_type": "photo",
                     "media": {"image": {"src": "https://cdn.example/a.jpg"}}}
                ]}
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec!["https://cdn.example/a.jpg", "https://cdn.example/b.jpg"]
        );
    }

    #[test]
    fn test_parent_node_kept_alongside_subattachments() {
        let post = json!({
            "attachments": {"data": [{
                "media_type": "album",
                "media": {"image": {"src": "https://cdn.example/cover.jpg"}},
                "subattachments": {"data": [
                    {"media_type": "video",
                     "media": {"source": "https://cdn.example/clip.mp4"}}
                ]}
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec![
                "https://cdn.example/cover.jpg",
                "https://cdn.example/clip.mp4"
            ]
        );
    }

    #[test]
    fn test_video_matched_by_substring_with_unshimmed_fallback() {
        let post = json!({
            "attachments": {"data": [{
                "media_type": "video_inline",
                "media": {},
                "unshimmed_url": "https://video.example/raw.mp4",
                "url": "https://facebook.com/watch/999"
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec!["https://video.example/raw.mp4"]
        );
    }

    #[test]
    fn test_type_field_used_when_media_type_absent() {
        let post = json!({
            "attachments": {"data": [{
                "type": "video_autoplay",
                "media": {"source": "https://cdn.example/auto.mp4"}
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec!["https://cdn.example/auto.mp4"]
        );
    }

    #[test]
    fn test_non_http_urls_skipped() {
        let post = json!({
            "attachments": {"data": [{
                "media_type": "photo",
                "media": {"image": {"src": "data:image/png;base64,xyz"}},
                "url": "https://facebook.com/photo/789"
            }]}
        });
        assert_eq!(
            media_urls_from_attachments(&post),
            vec!["https://facebook.com/photo/789"]
        );
    }

    #[test]
    fn test_suffix_from_url() {
        assert_eq!(
            suffix_from_url("/videos/clip.mp4?token=abc"),
            Some(".mp4".to_string())
        );
        assert_eq!(
            suffix_from_url("/images/photo.JPEG"),
            Some(".jpeg".to_string())
        );
        assert_eq!(suffix_from_url("/stream/clip.m3u8"), None);
        assert_eq!(suffix_from_url("/no-extension"), None);
    }

    #[test]
    fn test_suffix_from_content_type() {
        assert_eq!(suffix_from_content_type("video/mp4"), Some(".mp4"));
        assert_eq!(
            suffix_from_content_type("image/jpeg; charset=binary"),
            Some(".jpg")
        );
        assert_eq!(suffix_from_content_type("video/x-matroska"), Some(".mp4"));
        assert_eq!(suffix_from_content_type("text/html"), None);
    }

    #[test]
    fn test_sanitize_prefix() {
        assert_eq!(
            sanitize_prefix("facebook_123/456:0"),
            "facebook_123_456_0"
        );
    }
}
