//! Video analysis capability providers

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Caps on evidence artifacts stored per media item.
pub const MAX_EVIDENCE_FRAMES: usize = 12;
pub const MAX_DETECTIONS: usize = 30;

/// Scalar score plus evidence artifacts for one video file.
#[derive(Debug, Clone, Default)]
pub struct VideoAnalysis {
    pub score: f64,
    pub evidence_frames: Vec<String>,
    pub detections: Vec<String>,
}

impl VideoAnalysis {
    fn capped(mut self) -> Self {
        self.evidence_frames.truncate(MAX_EVIDENCE_FRAMES);
        self.detections.truncate(MAX_DETECTIONS);
        self.score = self.score.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
pub trait VideoAnalyze: Send + Sync {
    fn id(&self) -> &str;

    async fn analyze(&self, video_path: &Path, evidence_dir: &Path) -> Result<VideoAnalysis>;
}

#[derive(Debug, Deserialize)]
struct RemoteVideoResponse {
    #[serde(alias = "video_score")]
    score: f64,
    #[serde(default)]
    evidence_frames: Vec<String>,
    #[serde(default, alias = "top_detections")]
    detections: Vec<String>,
}

/// Remote object-detection endpoint.
pub struct RemoteVideoAnalyzer {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RemoteVideoAnalyzer {
    pub fn new(url: String, token: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl VideoAnalyze for RemoteVideoAnalyzer {
    fn id(&self) -> &str {
        "video:remote"
    }

    async fn analyze(&self, video_path: &Path, evidence_dir: &Path) -> Result<VideoAnalysis> {
        let body = serde_json::json!({
            "video_path": video_path.to_string_lossy(),
            "evidence_dir": evidence_dir.to_string_lossy(),
        });

        let mut request = self.client.post(&self.url).json(&body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response: RemoteVideoResponse =
            request.send().await?.error_for_status()?.json().await?;

        Ok(VideoAnalysis {
            score: response.score,
            evidence_frames: response.evidence_frames,
            detections: response.detections,
        }
        .capped())
    }
}

/// Degraded default when no video capability is configured or all providers
/// fail: zero score, no evidence.
pub struct DisabledVideoAnalyzer;

#[async_trait]
impl VideoAnalyze for DisabledVideoAnalyzer {
    fn id(&self) -> &str {
        "video:disabled"
    }

    async fn analyze(&self, _video_path: &Path, _evidence_dir: &Path) -> Result<VideoAnalysis> {
        Ok(VideoAnalysis::default())
    }
}

/// Ordered provider chain; never returns malformed output.
pub struct VideoAnalyzer {
    providers: Vec<Box<dyn VideoAnalyze>>,
}

impl VideoAnalyzer {
    pub fn new(providers: Vec<Box<dyn VideoAnalyze>>) -> Self {
        Self { providers }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers: Vec<Box<dyn VideoAnalyze>> = Vec::new();
        if !config.video_inference_url.is_empty() {
            providers.push(Box::new(RemoteVideoAnalyzer::new(
                config.video_inference_url.clone(),
                config.inference_token.clone(),
                config.inference_timeout_secs,
            )?));
        }
        providers.push(Box::new(DisabledVideoAnalyzer));
        Ok(Self::new(providers))
    }

    pub async fn analyze(
        &self,
        video_path: &Path,
        evidence_dir: &Path,
    ) -> (VideoAnalysis, String) {
        for provider in &self.providers {
            match provider.analyze(video_path, evidence_dir).await {
                Ok(analysis) => return (analysis.capped(), provider.id().to_string()),
                Err(e) => {
                    tracing::warn!(provider = provider.id(), error = %e, "Video analysis failed");
                }
            }
        }
        (VideoAnalysis::default(), "video:none".to_string())
    }
}
