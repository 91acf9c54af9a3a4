pub mod alerting;
pub mod audio;
pub mod classify;
pub mod event_bus;
pub mod fusion;
pub mod keyword_prefilter;
pub mod language;
pub mod pipeline;
pub mod video;

pub use alerting::{AlertBroadcast, AlertDispatcher, AlertStore};
pub use audio::{AudioAnalyzer, AudioTranscribe};
pub use classify::{TextClassifier, TextClassify};
pub use event_bus::{AlertPublisher, AlertSubscriber, ALERTS_CHANNEL};
pub use fusion::{fuse_scores, FusionResult, FusionWeights};
pub use keyword_prefilter::KeywordPrefilter;
pub use language::detect_lang;
pub use pipeline::{AnalysisOutcome, AnalysisPipeline};
pub use video::{VideoAnalyze, VideoAnalyzer};
