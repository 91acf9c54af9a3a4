//! Database operations for posts and their media items

use crate::error::{Result, RiskServiceError};
use crate::models::{Media, MediaType, NewPost, Post};
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct PostsDb {
    pool: Arc<PgPool>,
}

impl PostsDb {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Existence check backing the (platform, platform_post_id) dedup rule.
    pub async fn find_by_platform_id(
        &self,
        platform: &str,
        platform_post_id: &str,
    ) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, platform, platform_post_id, url, author, text, lang, raw, created_at
            FROM posts
            WHERE platform = $1 AND platform_post_id = $2
            "#,
        )
        .bind(platform)
        .bind(platform_post_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(post)
    }

    pub async fn create_post(&self, input: NewPost) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (platform, platform_post_id, url, author, text, raw, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, platform, platform_post_id, url, author, text, lang, raw, created_at
            "#,
        )
        .bind(&input.platform)
        .bind(&input.platform_post_id)
        .bind(&input.url)
        .bind(&input.author)
        .bind(&input.text)
        .bind(Json(&input.raw))
        .fetch_one(&*self.pool)
        .await?;

        tracing::info!(
            post_id = %post.id,
            platform = %post.platform,
            platform_post_id = %post.platform_post_id,
            "Post created"
        );

        Ok(post)
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, platform, platform_post_id, url, author, text, lang, raw, created_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| RiskServiceError::PostNotFound(post_id.to_string()))?;

        Ok(post)
    }

    /// Record the detected language on the post.
    pub async fn set_language(&self, post_id: Uuid, lang: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET lang = $2 WHERE id = $1")
            .bind(post_id)
            .bind(lang)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    pub async fn add_media(
        &self,
        post_id: Uuid,
        media_type: MediaType,
        path: &str,
    ) -> Result<Media> {
        let media = sqlx::query_as::<_, Media>(
            r#"
            INSERT INTO media (post_id, media_type, path, meta)
            VALUES ($1, $2, $3, '{}'::jsonb)
            RETURNING id, post_id, media_type, path, meta
            "#,
        )
        .bind(post_id)
        .bind(media_type.as_str())
        .bind(path)
        .fetch_one(&*self.pool)
        .await?;

        Ok(media)
    }

    pub async fn media_for_post(&self, post_id: Uuid) -> Result<Vec<Media>> {
        let items = sqlx::query_as::<_, Media>(
            r#"
            SELECT id, post_id, media_type, path, meta
            FROM media
            WHERE post_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(post_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(items)
    }

    /// Replace the metadata map of a media item.
    pub async fn update_media_meta(
        &self,
        media_id: Uuid,
        meta: &serde_json::Value,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE media SET meta = $2 WHERE id = $1")
            .bind(media_id)
            .bind(Json(meta))
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RiskServiceError::MediaNotFound(media_id.to_string()));
        }

        Ok(())
    }
}
