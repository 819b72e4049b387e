//! Title sanitization for filesystem-safe export names.

/// Reduces a raw video title to the characters that are safe in a filename:
/// ASCII alphanumerics, spaces, hyphens, and underscores. Everything else is
/// dropped and the result is trimmed. Idempotent.
pub fn clean_title(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Like [`clean_title`], but falls back to the video id when the filter leaves
/// nothing behind (titles made entirely of punctuation or non-Latin symbols).
pub fn export_title(raw: &str, video_id: &str) -> String {
    let cleaned = clean_title(raw);
    if cleaned.is_empty() {
        video_id.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_allowed_characters() {
        assert_eq!(clean_title("Intro: Part 1!"), "Intro Part 1");
        assert_eq!(clean_title("under_score-dash 9"), "under_score-dash 9");
    }

    #[test]
    fn drops_non_latin_symbols() {
        assert_eq!(clean_title("動画 #42"), "42");
        assert_eq!(clean_title("❤❤❤"), "");
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(clean_title("  spaced out  "), "spaced out");
    }

    #[test]
    fn output_is_restricted_charset() {
        let cleaned = clean_title("a!@#$%^&*()b\tc\nd");
        assert!(
            cleaned
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        );
    }

    #[test]
    fn idempotent() {
        for raw in ["Intro: Part 1!", "  x  ", "❤", "plain title"] {
            let once = clean_title(raw);
            assert_eq!(clean_title(&once), once);
        }
    }

    #[test]
    fn export_title_falls_back_to_video_id() {
        assert_eq!(export_title("!!!", "abc123"), "abc123");
        assert_eq!(export_title("", "abc123"), "abc123");
        assert_eq!(export_title("Real Title", "abc123"), "Real Title");
    }
}
