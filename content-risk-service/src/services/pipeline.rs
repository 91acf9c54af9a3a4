//! Single-post analysis pipeline
//!
//! Orchestrates language detection, the keyword prefilter gate, modality
//! providers, fusion, persistence and the alert check for one post.

use crate::db::{AnalysesDb, PostsDb};
use crate::error::Result;
use crate::models::{CategoryScores, MediaType, NewAnalysis};
use crate::services::alerting::AlertDispatcher;
use crate::services::audio::AudioAnalyzer;
use crate::services::classify::TextClassifier;
use crate::services::fusion::{fuse_scores, FusionWeights};
use crate::services::keyword_prefilter::KeywordPrefilter;
use crate::services::language::detect_lang;
use crate::services::video::{VideoAnalyzer, MAX_DETECTIONS, MAX_EVIDENCE_FRAMES};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Low-confidence default for the catch-all category when the prefilter
/// gate bypasses text inference.
const PREFILTER_SKIP_SCORE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis_id: Uuid,
    pub alert_id: Option<Uuid>,
}

pub struct AnalysisPipeline {
    posts: Arc<PostsDb>,
    analyses: Arc<AnalysesDb>,
    dispatcher: Arc<AlertDispatcher>,
    prefilter: Arc<KeywordPrefilter>,
    text: Arc<TextClassifier>,
    video: Arc<VideoAnalyzer>,
    audio: Arc<AudioAnalyzer>,
    weights: FusionWeights,
    media_root: PathBuf,
}

impl AnalysisPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        posts: Arc<PostsDb>,
        analyses: Arc<AnalysesDb>,
        dispatcher: Arc<AlertDispatcher>,
        prefilter: Arc<KeywordPrefilter>,
        text: Arc<TextClassifier>,
        video: Arc<VideoAnalyzer>,
        audio: Arc<AudioAnalyzer>,
        weights: FusionWeights,
        media_root: PathBuf,
    ) -> Self {
        Self {
            posts,
            analyses,
            dispatcher,
            prefilter,
            text,
            video,
            audio,
            weights,
            media_root,
        }
    }

    /// Analyze one post end to end. Inference failures degrade to defaults;
    /// persistence errors propagate so the task runner can retry; a missing
    /// post is terminal.
    pub async fn analyze_post(&self, post_id: Uuid) -> Result<AnalysisOutcome> {
        let post = self.posts.get_post(post_id).await?;
        let text = post.text.clone().unwrap_or_default();

        let lang = detect_lang(&text);
        self.posts.set_language(post.id, lang).await?;

        let (matched, keyword_hits) = self.prefilter.match_text(&text);
        let (text_probs, text_model) = if matched {
            self.text.classify(&text, lang).await
        } else {
            // Clearly benign case: skip inference, keep the map well-formed.
            let mut probs = CategoryScores::new();
            probs.insert("general_violence".to_string(), PREFILTER_SKIP_SCORE);
            (probs, "text:prefilter_skip".to_string())
        };

        let mut video_score: f64 = 0.0;
        let mut audio_probs = CategoryScores::new();
        let mut evidence_frames: Vec<String> = Vec::new();
        let mut detections: Vec<String> = Vec::new();
        let mut has_video_input = false;
        let mut has_audio_input = false;
        let mut video_model = "video:unused".to_string();
        let mut audio_model = "audio:unused".to_string();

        let post_dir = self.media_root.join(format!("post_{}", post.id));
        let media_items = self.posts.media_for_post(post.id).await?;

        for media in &media_items {
            if media.media_type != MediaType::Video.as_str() {
                continue;
            }
            has_video_input = true;

            let video_path = Path::new(&media.path);
            let (video_result, video_provider) = self
                .video
                .analyze(video_path, &post_dir.join("frames"))
                .await;
            video_score = video_score.max(video_result.score);
            evidence_frames.extend(video_result.evidence_frames);
            detections.extend(video_result.detections);
            video_model = video_provider;

            // Audio probabilities come from the last video processed.
            let (audio_result, audio_provider) = self
                .audio
                .analyze(video_path, &post_dir.join("audio"))
                .await;
            audio_probs = audio_result.category_scores.clone();
            has_audio_input = true;
            audio_model = audio_provider;

            let mut meta = media.meta.0.clone();
            if !meta.is_object() {
                meta = json!({});
            }
            if let Some(map) = meta.as_object_mut() {
                map.insert("transcript".to_string(), json!(audio_result.transcript));
                map.insert(
                    "transcript_path".to_string(),
                    json!(audio_result
                        .transcript_path
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default()),
                );
                map.insert(
                    "evidence_frames".to_string(),
                    json!(&evidence_frames[..evidence_frames.len().min(MAX_EVIDENCE_FRAMES)]),
                );
                map.insert(
                    "top_detections".to_string(),
                    json!(&detections[..detections.len().min(MAX_DETECTIONS)]),
                );
            }
            self.posts.update_media_meta(media.id, &meta).await?;
        }

        let fusion = fuse_scores(
            self.weights,
            &text_probs,
            video_score,
            &audio_probs,
            &keyword_hits,
            has_video_input,
            has_audio_input,
        );

        let mut model_versions = HashMap::new();
        model_versions.insert("text".to_string(), text_model);
        model_versions.insert("video".to_string(), video_model);
        model_versions.insert("audio".to_string(), audio_model);

        let analysis = self
            .analyses
            .create_analysis(NewAnalysis {
                post_id: post.id,
                text_probs,
                video_score,
                audio_probs,
                risk_score: fusion.risk_score,
                severity: fusion.severity,
                category: fusion.category,
                explanation: fusion.explanation,
                model_versions,
            })
            .await?;

        let alert = self.dispatcher.maybe_create_alert(&post, &analysis).await?;

        Ok(AnalysisOutcome {
            analysis_id: analysis.id,
            alert_id: alert.map(|a| a.id),
        })
    }
}
