pub mod alert;
pub mod analysis;
pub mod post;

pub use alert::{Alert, AlertStatus, AlertSummary, Feedback, FeedbackDecision, NewFeedback};
pub use analysis::{Analysis, CategoryScores, NewAnalysis, Severity};
pub use post::{Media, MediaType, NewPost, Post};

/// Risk categories in declaration order. The order is load-bearing: category
/// vote ties are broken by position here (first declared wins), and logit
/// outputs are mapped to labels by index. The catch-all category comes first.
pub const CATEGORIES: [&str; 5] = [
    "general_violence",
    "harassment_hate_speech",
    "killings_murder_violent_acts",
    "child_abuse",
    "elder_abuse",
];

/// Position of a category in the declaration order; unknown labels sort last.
pub fn category_rank(category: &str) -> usize {
    CATEGORIES
        .iter()
        .position(|c| *c == category)
        .unwrap_or(CATEGORIES.len())
}
