//! Fusion of per-modality risk signals into one severity judgment

use crate::models::{category_rank, CategoryScores, Severity, CATEGORIES};
use std::collections::HashMap;

/// Configured modality weights before re-normalization.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub text: f64,
    pub video: f64,
    pub audio: f64,
}

#[derive(Debug, Clone)]
pub struct FusionResult {
    pub category: String,
    pub severity: Severity,
    pub risk_score: f64,
    pub explanation: Vec<String>,
}

/// Highest-scoring category in a map, ties broken by declaration order.
fn top_category(probs: &CategoryScores) -> Option<(&str, f64)> {
    probs
        .iter()
        .map(|(category, score)| (category.as_str(), *score))
        .max_by(|(cat_a, score_a), (cat_b, score_b)| {
            score_a
                .partial_cmp(score_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                // Lower rank means earlier declaration, which should win,
                // so invert the rank comparison inside max_by.
                .then_with(|| category_rank(cat_b).cmp(&category_rank(cat_a)))
        })
}

/// Fuse modality outputs into one category, severity and risk score.
///
/// Modalities with no input for this post are excluded from weighting
/// entirely; the remaining weights are re-normalized to sum to 1, so a
/// text-only post is still scored fairly on the text signal alone.
pub fn fuse_scores(
    weights: FusionWeights,
    text_probs: &CategoryScores,
    video_score: f64,
    audio_probs: &CategoryScores,
    keyword_hits: &[String],
    has_video_input: bool,
    has_audio_input: bool,
) -> FusionResult {
    let (text_top, text_score) = top_category(text_probs).unwrap_or((CATEGORIES[0], 0.0));
    let (audio_top, audio_score) = top_category(audio_probs).unwrap_or((text_top, 0.0));

    let mut active: Vec<(&str, f64, f64)> = vec![("text", weights.text, text_score)];
    if has_video_input {
        active.push(("video", weights.video, video_score));
    }
    if has_audio_input {
        active.push(("audio", weights.audio, audio_score));
    }

    let total_weight: f64 = active.iter().map(|(_, w, _)| w).sum();
    let total_weight = if total_weight > 0.0 { total_weight } else { 1.0 };
    let normalized: Vec<(&str, f64, f64)> = active
        .iter()
        .map(|(name, weight, score)| (*name, weight / total_weight, *score))
        .collect();

    let base: f64 = normalized.iter().map(|(_, w, s)| w * s).sum();
    let bonus = (0.02 * keyword_hits.len() as f64).min(0.1);
    let risk_score = (base + bonus).min(1.0) * 100.0;

    let weight_for = |modality: &str| -> f64 {
        normalized
            .iter()
            .find(|(name, _, _)| *name == modality)
            .map(|(_, w, _)| *w)
            .unwrap_or(0.0)
    };
    let norm_text_w = weight_for("text");
    let norm_video_w = weight_for("video");
    let norm_audio_w = weight_for("audio");

    // Category votes: text and audio contribute their full probability maps,
    // video carries no label of its own so its vote is credited to the text
    // modality's top category.
    let mut votes: HashMap<&str, f64> = CATEGORIES.iter().map(|c| (*c, 0.0)).collect();
    for (category, prob) in text_probs {
        *votes.entry(category.as_str()).or_insert(0.0) += prob * norm_text_w;
    }
    for (category, prob) in audio_probs {
        *votes.entry(category.as_str()).or_insert(0.0) += prob * norm_audio_w;
    }
    *votes.entry(text_top).or_insert(0.0) += norm_video_w * video_score;

    let category = votes
        .iter()
        .max_by(|(cat_a, vote_a), (cat_b, vote_b)| {
            vote_a
                .partial_cmp(vote_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| category_rank(cat_b).cmp(&category_rank(cat_a)))
        })
        .map(|(category, _)| category.to_string())
        .unwrap_or_else(|| CATEGORIES[0].to_string());

    // Fixed explanation order for auditability: keyword hits, text top,
    // video score, audio top, normalized weights.
    let mut explanation = Vec::new();
    if !keyword_hits.is_empty() {
        let shown: Vec<&str> = keyword_hits.iter().take(5).map(String::as_str).collect();
        explanation.push(format!("keyword_hits=[{}]", shown.join(", ")));
    }
    explanation.push(format!("text_top={text_top}:{text_score:.2}"));
    explanation.push(format!("video_score={video_score:.2}"));
    explanation.push(format!("audio_top={audio_top}:{audio_score:.2}"));
    explanation.push(format!(
        "normalized_weights=text:{norm_text_w:.2},video:{norm_video_w:.2},audio:{norm_audio_w:.2}"
    ));

    FusionResult {
        category,
        severity: Severity::from_risk_score(risk_score),
        risk_score,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> FusionWeights {
        FusionWeights {
            text: 0.4,
            video: 0.4,
            audio: 0.2,
        }
    }

    fn probs(pairs: &[(&str, f64)]) -> CategoryScores {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_text_only_renormalizes_to_full_weight() {
        // With no video/audio input the text weight becomes 1.0; one keyword
        // hit adds 0.02, so 0.9 text probability lands at 92 => CRITICAL.
        let result = fuse_scores(
            weights(),
            &probs(&[("killings_murder_violent_acts", 0.9)]),
            0.0,
            &CategoryScores::new(),
            &["kill".to_string()],
            false,
            false,
        );
        assert!((result.risk_score - 92.0).abs() < 1e-9);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.category, "killings_murder_violent_acts");
    }

    #[test]
    fn test_all_modalities_active() {
        let result = fuse_scores(
            weights(),
            &probs(&[("killings_murder_violent_acts", 0.9)]),
            0.8,
            &probs(&[("general_violence", 0.6)]),
            &["kill".to_string(), "weapon".to_string()],
            true,
            true,
        );
        // 0.4*0.9 + 0.4*0.8 + 0.2*0.6 + 0.04 = 0.84 => 84
        assert!((result.risk_score - 84.0).abs() < 1e-9);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_low_risk() {
        let result = fuse_scores(
            weights(),
            &probs(&[("general_violence", 0.1)]),
            0.05,
            &probs(&[("general_violence", 0.1)]),
            &[],
            true,
            true,
        );
        assert!(result.risk_score < 30.0);
        assert_eq!(result.severity, Severity::Low);
    }

    #[test]
    fn test_keyword_bonus_is_capped() {
        let hits: Vec<String> = (0..10).map(|i| format!("kw{i}")).collect();
        let result = fuse_scores(
            weights(),
            &probs(&[("general_violence", 0.5)]),
            0.0,
            &CategoryScores::new(),
            &hits,
            false,
            false,
        );
        // 0.5 + min(0.1, 0.2) = 0.6 => 60, which sits on the HIGH boundary.
        assert!((result.risk_score - 60.0).abs() < 1e-9);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn test_risk_score_saturates_at_100() {
        let result = fuse_scores(
            weights(),
            &probs(&[("child_abuse", 1.0)]),
            0.0,
            &CategoryScores::new(),
            &["a".into(), "b".into(), "c".into()],
            false,
            false,
        );
        assert!((result.risk_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_video_vote_credits_text_top_category() {
        // Audio leans general_violence but the strong video signal is
        // credited to the text top category, which should win.
        let result = fuse_scores(
            weights(),
            &probs(&[("harassment_hate_speech", 0.5), ("general_violence", 0.2)]),
            0.9,
            &probs(&[("general_violence", 0.4)]),
            &[],
            true,
            false,
        );
        assert_eq!(result.category, "harassment_hate_speech");
    }

    #[test]
    fn test_tie_breaks_by_declaration_order() {
        let result = fuse_scores(
            weights(),
            &probs(&[
                ("harassment_hate_speech", 0.5),
                ("general_violence", 0.5),
            ]),
            0.0,
            &CategoryScores::new(),
            &[],
            false,
            false,
        );
        // general_violence is declared first, so it wins both the text-top
        // argmax and the final vote on an exact tie.
        assert_eq!(result.category, "general_violence");
    }

    #[test]
    fn test_empty_text_probs_defaults_to_catch_all() {
        let result = fuse_scores(
            weights(),
            &CategoryScores::new(),
            0.0,
            &CategoryScores::new(),
            &[],
            false,
            false,
        );
        assert_eq!(result.category, "general_violence");
        assert_eq!(result.severity, Severity::Low);
        assert_eq!(result.risk_score, 0.0);
    }

    #[test]
    fn test_explanation_order() {
        let result = fuse_scores(
            weights(),
            &probs(&[("general_violence", 0.7)]),
            0.3,
            &probs(&[("general_violence", 0.2)]),
            &["kill".to_string()],
            true,
            true,
        );
        assert_eq!(result.explanation.len(), 5);
        assert!(result.explanation[0].starts_with("keyword_hits="));
        assert!(result.explanation[1].starts_with("text_top="));
        assert!(result.explanation[2].starts_with("video_score="));
        assert!(result.explanation[3].starts_with("audio_top="));
        assert!(result.explanation[4].starts_with("normalized_weights="));
    }

    #[test]
    fn test_explanation_caps_keyword_hits_at_five() {
        let hits: Vec<String> = (0..8).map(|i| format!("kw{i}")).collect();
        let result = fuse_scores(
            weights(),
            &probs(&[("general_violence", 0.2)]),
            0.0,
            &CategoryScores::new(),
            &hits,
            false,
            false,
        );
        assert_eq!(
            result.explanation[0],
            "keyword_hits=[kw0, kw1, kw2, kw3, kw4]"
        );
    }

    #[test]
    fn test_absent_audio_defaults_top_to_text_top() {
        let result = fuse_scores(
            weights(),
            &probs(&[("child_abuse", 0.8)]),
            0.0,
            &CategoryScores::new(),
            &[],
            false,
            false,
        );
        assert!(result.explanation.contains(&"audio_top=child_abuse:0.00".to_string()));
    }
}
