//! Lightweight per-character language detection

/// Sinhala Unicode block.
const SINHALA_START: char = '\u{0D80}';
const SINHALA_END: char = '\u{0DFF}';

/// Classify text as `si` when more than 10% of its characters fall in the
/// Sinhala block, `en` otherwise. Empty text is `unknown`.
pub fn detect_lang(text: &str) -> &'static str {
    if text.is_empty() {
        return "unknown";
    }

    let total = text.chars().count();
    let sinhala = text
        .chars()
        .filter(|ch| (SINHALA_START..=SINHALA_END).contains(ch))
        .count();

    let ratio = sinhala as f64 / total.max(1) as f64;
    if ratio > 0.1 {
        "si"
    } else {
        "en"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(detect_lang(""), "unknown");
    }

    #[test]
    fn test_english_text() {
        assert_eq!(detect_lang("they will meet at noon"), "en");
    }

    #[test]
    fn test_sinhala_text() {
        assert_eq!(detect_lang("මරන්න එපා"), "si");
    }

    #[test]
    fn test_mostly_english_with_a_little_sinhala() {
        // One Sinhala char out of 30+ stays below the 10% cutoff.
        assert_eq!(detect_lang("this is an english sentence ම"), "en");
    }
}
