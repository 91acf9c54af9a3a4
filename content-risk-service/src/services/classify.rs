//! Text classification capability providers
//!
//! Providers are tried in declaration order; the first well-formed, non-empty
//! category map wins. The deterministic keyword heuristic is the terminal
//! fallback, so callers always receive a well-formed map.

use crate::config::Config;
use crate::error::{Result, RiskServiceError};
use crate::models::{CategoryScores, CATEGORIES};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait TextClassify: Send + Sync {
    /// Stable identifier recorded as model provenance on the analysis.
    fn id(&self) -> &str;

    async fn classify(&self, text: &str, lang: &str) -> Result<CategoryScores>;
}

/// Recognized raw output shapes from remote classifiers. Each shape has one
/// normalizer; all converge on the canonical category map.
#[derive(Debug, Clone)]
pub enum RawClassifierOutput {
    /// `{"label": 0.9, ...}`
    LabelMap(Vec<(String, f64)>),
    /// `[{"label": "...", "score": 0.9}, ...]`
    LabelScores(Vec<LabelScore>),
    /// `{"labels": [...], "scores": [...]}`
    ParallelArrays {
        labels: Vec<String>,
        scores: Vec<f64>,
    },
    /// Bare logits, mapped to categories by declaration index after softmax.
    Logits(Vec<f64>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

fn normalize_label(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Match a free-form label to a declared category by normalized equality or
/// substring containment in either direction.
fn match_category(label: &str) -> Option<&'static str> {
    let normalized = normalize_label(label);
    CATEGORIES
        .iter()
        .find(|category| {
            normalized == **category
                || normalized.contains(*category)
                || category.contains(normalized.as_str())
        })
        .copied()
}

fn softmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    let sum = if sum > 0.0 { sum } else { 1.0 };
    exps.iter().map(|e| e / sum).collect()
}

fn empty_scores() -> CategoryScores {
    CATEGORIES.iter().map(|c| (c.to_string(), 0.0)).collect()
}

/// Convert any recognized raw shape to the canonical category map.
pub fn normalize_output(raw: RawClassifierOutput) -> CategoryScores {
    let mut scores = empty_scores();
    match raw {
        RawClassifierOutput::LabelMap(pairs) => {
            for (label, value) in pairs {
                if let Some(category) = match_category(&label) {
                    let entry = scores.entry(category.to_string()).or_insert(0.0);
                    *entry = entry.max(value);
                }
            }
            // Map shapes are renormalized to a probability distribution.
            let total: f64 = scores.values().sum();
            if total > 0.0 {
                for value in scores.values_mut() {
                    *value /= total;
                }
            }
        }
        RawClassifierOutput::LabelScores(items) => {
            for item in items {
                if let Some(category) = match_category(&item.label) {
                    let entry = scores.entry(category.to_string()).or_insert(0.0);
                    *entry = entry.max(item.score);
                }
            }
        }
        RawClassifierOutput::ParallelArrays { labels, scores: values } => {
            for (label, value) in labels.iter().zip(values.iter()) {
                if let Some(category) = match_category(label) {
                    let entry = scores.entry(category.to_string()).or_insert(0.0);
                    *entry = entry.max(*value);
                }
            }
        }
        RawClassifierOutput::Logits(values) => {
            for (idx, value) in softmax(&values).into_iter().enumerate() {
                if let Some(category) = CATEGORIES.get(idx) {
                    scores.insert(category.to_string(), value);
                }
            }
        }
    }
    scores
}

/// Detect which recognized shape a raw JSON response is.
pub fn raw_from_value(value: &serde_json::Value) -> Option<RawClassifierOutput> {
    if let Some(obj) = value.as_object() {
        if let (Some(labels), Some(scores)) = (obj.get("labels"), obj.get("scores")) {
            let labels: Vec<String> = labels
                .as_array()?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            let scores: Vec<f64> = scores
                .as_array()?
                .iter()
                .filter_map(|v| v.as_f64())
                .collect();
            return Some(RawClassifierOutput::ParallelArrays { labels, scores });
        }
        if let Some(inner) = obj.get("scores") {
            return raw_from_value(inner);
        }
        let pairs: Vec<(String, f64)> = obj
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
            .collect();
        if !pairs.is_empty() {
            return Some(RawClassifierOutput::LabelMap(pairs));
        }
        return None;
    }

    if let Some(arr) = value.as_array() {
        if arr.iter().all(|v| v.is_number()) && !arr.is_empty() {
            let values = arr.iter().filter_map(|v| v.as_f64()).collect();
            return Some(RawClassifierOutput::Logits(values));
        }
        let items: Vec<LabelScore> = arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        if !items.is_empty() {
            return Some(RawClassifierOutput::LabelScores(items));
        }
    }

    None
}

/// Remote HTTP classifier (Hugging Face style endpoint).
pub struct RemoteTextClassifier {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RemoteTextClassifier {
    pub fn new(url: String, token: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl TextClassify for RemoteTextClassifier {
    fn id(&self) -> &str {
        "text:remote"
    }

    async fn classify(&self, text: &str, lang: &str) -> Result<CategoryScores> {
        let body = serde_json::json!({
            "text": text,
            "lang": lang,
            "categories": CATEGORIES,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await?.error_for_status()?;
        let payload: serde_json::Value = response.json().await?;

        let raw = raw_from_value(&payload).ok_or_else(|| {
            RiskServiceError::Inference("unrecognized classifier output shape".to_string())
        })?;

        Ok(normalize_output(raw))
    }
}

/// Deterministic keyword heuristic; the terminal fallback of every chain.
pub struct HeuristicTextClassifier;

impl HeuristicTextClassifier {
    const HATE_MARKERS: [&'static str; 4] = ["hate", "harass", "වෛර", "හිරිහැර"];
    const KILLING_MARKERS: [&'static str; 6] = ["kill", "murder", "shoot", "stab", "මර", "ඝාත"];
    const ELDER_MARKERS: [&'static str; 2] = ["elder abuse", "වැඩිහිටි"];
    const CHILD_MARKERS: [&'static str; 3] = ["child abuse", "ළමා අපයෝජන", "child"];
    const VIOLENCE_MARKERS: [&'static str; 4] = ["fight", "violent", "ගැටුම", "අවි"];
}

#[async_trait]
impl TextClassify for HeuristicTextClassifier {
    fn id(&self) -> &str {
        "text:heuristic"
    }

    async fn classify(&self, text: &str, _lang: &str) -> Result<CategoryScores> {
        let normalized = text.to_lowercase();
        let mut scores: CategoryScores =
            CATEGORIES.iter().map(|c| (c.to_string(), 0.05)).collect();

        let contains_any =
            |markers: &[&str]| markers.iter().any(|m| normalized.contains(m));

        if contains_any(&Self::HATE_MARKERS) {
            scores.insert("harassment_hate_speech".to_string(), 0.78);
        }
        if contains_any(&Self::KILLING_MARKERS) {
            scores.insert("killings_murder_violent_acts".to_string(), 0.85);
        }
        if contains_any(&Self::ELDER_MARKERS) {
            scores.insert("elder_abuse".to_string(), 0.8);
        }
        if contains_any(&Self::CHILD_MARKERS) {
            scores.insert("child_abuse".to_string(), 0.88);
        }
        if contains_any(&Self::VIOLENCE_MARKERS) {
            let current = scores["general_violence"];
            scores.insert("general_violence".to_string(), current.max(0.75));
        }

        let total: f64 = scores.values().sum();
        for value in scores.values_mut() {
            *value /= total;
        }
        Ok(scores)
    }
}

/// Ordered provider chain converging on a well-formed category map.
pub struct TextClassifier {
    providers: Vec<Box<dyn TextClassify>>,
}

impl TextClassifier {
    pub fn new(providers: Vec<Box<dyn TextClassify>>) -> Self {
        Self { providers }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers: Vec<Box<dyn TextClassify>> = Vec::new();
        if !config.text_inference_url.is_empty() {
            providers.push(Box::new(RemoteTextClassifier::new(
                config.text_inference_url.clone(),
                config.inference_token.clone(),
                config.inference_timeout_secs,
            )?));
        }
        providers.push(Box::new(HeuristicTextClassifier));
        Ok(Self::new(providers))
    }

    /// Returns the category map and the id of the provider that produced it.
    pub async fn classify(&self, text: &str, lang: &str) -> (CategoryScores, String) {
        for provider in &self.providers {
            match provider.classify(text, lang).await {
                Ok(scores) if scores.values().sum::<f64>() > 0.0 => {
                    return (scores, provider.id().to_string());
                }
                Ok(_) => {
                    tracing::debug!(provider = provider.id(), "Classifier returned empty scores");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.id(), error = %e, "Classifier failed");
                }
            }
        }
        // The heuristic never fails, so this is only reachable with an
        // explicitly empty provider list.
        (empty_scores(), "text:none".to_string())
    }
}
