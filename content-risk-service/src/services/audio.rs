//! Audio transcription + classification capability providers
//!
//! Transcription is a pluggable capability; the transcript is then language-
//! detected and classified through the same text-classification chain the
//! post body uses.

use crate::config::Config;
use crate::error::Result;
use crate::services::classify::TextClassifier;
use crate::services::language::detect_lang;
use crate::models::CategoryScores;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct AudioAnalysis {
    pub transcript: String,
    pub transcript_path: Option<PathBuf>,
    pub category_scores: CategoryScores,
}

#[async_trait]
pub trait AudioTranscribe: Send + Sync {
    fn id(&self) -> &str;

    /// Extract and transcribe the audio track of a video file.
    async fn transcribe(&self, video_path: &Path) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct RemoteTranscriptResponse {
    #[serde(default)]
    transcript: String,
}

/// Remote speech-to-text endpoint.
pub struct RemoteAudioTranscriber {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RemoteAudioTranscriber {
    pub fn new(url: String, token: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl AudioTranscribe for RemoteAudioTranscriber {
    fn id(&self) -> &str {
        "audio:remote"
    }

    async fn transcribe(&self, video_path: &Path) -> Result<String> {
        let body = serde_json::json!({
            "video_path": video_path.to_string_lossy(),
        });

        let mut request = self.client.post(&self.url).json(&body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response: RemoteTranscriptResponse =
            request.send().await?.error_for_status()?.json().await?;

        Ok(response.transcript.trim().to_string())
    }
}

/// Degraded default: empty transcript, empty probability map.
pub struct DisabledAudioTranscriber;

#[async_trait]
impl AudioTranscribe for DisabledAudioTranscriber {
    fn id(&self) -> &str {
        "audio:disabled"
    }

    async fn transcribe(&self, _video_path: &Path) -> Result<String> {
        Ok(String::new())
    }
}

/// Transcription chain plus transcript classification.
pub struct AudioAnalyzer {
    transcribers: Vec<Box<dyn AudioTranscribe>>,
    classifier: Arc<TextClassifier>,
}

impl AudioAnalyzer {
    pub fn new(transcribers: Vec<Box<dyn AudioTranscribe>>, classifier: Arc<TextClassifier>) -> Self {
        Self {
            transcribers,
            classifier,
        }
    }

    pub fn from_config(config: &Config, classifier: Arc<TextClassifier>) -> Result<Self> {
        let mut transcribers: Vec<Box<dyn AudioTranscribe>> = Vec::new();
        if !config.audio_inference_url.is_empty() {
            transcribers.push(Box::new(RemoteAudioTranscriber::new(
                config.audio_inference_url.clone(),
                config.inference_token.clone(),
                config.inference_timeout_secs,
            )?));
        }
        transcribers.push(Box::new(DisabledAudioTranscriber));
        Ok(Self::new(transcribers, classifier))
    }

    /// Transcribe, re-detect the transcript language, classify the transcript,
    /// and persist the transcript alongside the post's other artifacts.
    pub async fn analyze(&self, video_path: &Path, work_dir: &Path) -> (AudioAnalysis, String) {
        let (transcript, provider_id) = self.run_transcribers(video_path).await;

        let lang = detect_lang(&transcript);
        let category_scores = if transcript.is_empty() {
            CategoryScores::new()
        } else {
            self.classifier.classify(&transcript, lang).await.0
        };

        let transcript_path = match self.write_transcript(work_dir, &transcript, lang).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write transcript file");
                None
            }
        };

        (
            AudioAnalysis {
                transcript,
                transcript_path,
                category_scores,
            },
            provider_id,
        )
    }

    async fn run_transcribers(&self, video_path: &Path) -> (String, String) {
        for transcriber in &self.transcribers {
            match transcriber.transcribe(video_path).await {
                Ok(transcript) => return (transcript, transcriber.id().to_string()),
                Err(e) => {
                    tracing::warn!(provider = transcriber.id(), error = %e, "Transcription failed");
                }
            }
        }
        (String::new(), "audio:none".to_string())
    }

    async fn write_transcript(
        &self,
        work_dir: &Path,
        transcript: &str,
        lang: &str,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(work_dir).await?;
        let path = work_dir.join("transcript.json");
        let payload = serde_json::json!({
            "transcript": transcript,
            "lang": lang,
        });
        tokio::fs::write(&path, serde_json::to_vec(&payload)?).await?;
        Ok(path)
    }
}
