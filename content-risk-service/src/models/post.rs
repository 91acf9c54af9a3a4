use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::path::Path;
use uuid::Uuid;

/// An ingested social-media post. Identity is (platform, platform_post_id);
/// re-ingesting the same pair is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub platform: String,
    pub platform_post_id: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub lang: Option<String>,
    pub raw: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a post through the common ingestion entry point.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub platform: String,
    pub platform_post_id: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub raw: serde_json::Value,
}

/// A media item owned by exactly one post. `meta` is populated post-analysis
/// with transcript path, evidence frame paths and detection labels.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub id: Uuid,
    pub post_id: Uuid,
    pub media_type: String,
    pub path: String,
    pub meta: Json<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    /// Classify a media file by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp4" | "mov" | "m4v" | "webm" => MediaType::Video,
            _ => MediaType::Image,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_path() {
        assert_eq!(MediaType::from_path("clip.mp4"), MediaType::Video);
        assert_eq!(MediaType::from_path("clip.MOV"), MediaType::Video);
        assert_eq!(MediaType::from_path("photo.jpg"), MediaType::Image);
        assert_eq!(MediaType::from_path("no_extension"), MediaType::Image);
    }
}
