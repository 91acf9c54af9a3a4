//! Keyword prefilter gating text-classification inference

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Cheap gate in front of the text classifier: posts with zero keyword hits
/// skip inference and receive a fixed low-confidence default instead.
///
/// Keywords are held in ordered sets so hit lists are deterministic.
pub struct KeywordPrefilter {
    en_keywords: BTreeSet<String>,
    si_keywords: BTreeSet<String>,
}

impl KeywordPrefilter {
    /// Load both language lists. A missing file yields an empty set rather
    /// than an error; blank lines and `#` comment lines are skipped.
    pub fn new(en_path: impl AsRef<Path>, si_path: impl AsRef<Path>) -> Self {
        Self {
            en_keywords: Self::load_words(en_path.as_ref()),
            si_keywords: Self::load_words(si_path.as_ref()),
        }
    }

    fn load_words(path: &Path) -> BTreeSet<String> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Keyword list missing, using empty set");
            return BTreeSet::new();
        }

        match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(|line| line.trim().to_lowercase())
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .collect(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read keyword list");
                BTreeSet::new()
            }
        }
    }

    /// Case-insensitive substring match against the union of both sets.
    /// Returns whether anything matched and the ordered list of hits.
    pub fn match_text(&self, text: &str) -> (bool, Vec<String>) {
        let normalized = text.to_lowercase();
        let hits: Vec<String> = self
            .en_keywords
            .iter()
            .chain(self.si_keywords.iter())
            .filter(|kw| normalized.contains(kw.as_str()))
            .cloned()
            .collect();

        (!hits.is_empty(), hits)
    }

    pub fn keyword_count(&self) -> usize {
        self.en_keywords.len() + self.si_keywords.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn words_file(words: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for word in words {
            writeln!(file, "{word}").unwrap();
        }
        file
    }

    #[test]
    fn test_match_hits() {
        let en = words_file(&["kill", "hate"]);
        let si = words_file(&["මරන්න"]);
        let prefilter = KeywordPrefilter::new(en.path(), si.path());

        let (matched, hits) = prefilter.match_text("they will kill him");
        assert!(matched);
        assert!(hits.contains(&"kill".to_string()));
    }

    #[test]
    fn test_no_match() {
        let en = words_file(&["kill"]);
        let si = words_file(&[]);
        let prefilter = KeywordPrefilter::new(en.path(), si.path());

        let (matched, hits) = prefilter.match_text("safe message");
        assert!(!matched);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let en = words_file(&["weapon"]);
        let si = words_file(&[]);
        let prefilter = KeywordPrefilter::new(en.path(), si.path());

        let (matched, _) = prefilter.match_text("He bought a WEAPON yesterday");
        assert!(matched);
    }

    #[test]
    fn test_missing_file_is_empty_set() {
        let prefilter = KeywordPrefilter::new("/nonexistent/en.txt", "/nonexistent/si.txt");
        assert_eq!(prefilter.keyword_count(), 0);

        let (matched, hits) = prefilter.match_text("anything at all");
        assert!(!matched);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let en = words_file(&["kill", "", "  ", "# header", "hate"]);
        let si = words_file(&[]);
        let prefilter = KeywordPrefilter::new(en.path(), si.path());
        assert_eq!(prefilter.keyword_count(), 2);
    }
}
