// src/util/text.rs
use crate::infrastructure::markdown::markdown_to_compact_html;
use html_escape::decode_html_entities;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLOCK_TAG_REGEX: Regex =
        Regex::new(r"</?(p|div|br|li|h[1-6]|tr|pre)[^>]*>").expect("Failed to compile block tag regex");
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]+>").expect("Failed to compile tag regex");
}

/// First non-empty line of rendered note content, as plain text.
///
/// Truncated to `max_chars` characters with a trailing ellipsis.
///
/// # Examples
///
/// ```
/// use notesync::util::text::excerpt;
///
/// assert_eq!(excerpt("# Groceries\n\n- milk", 40), "Groceries");
/// assert_eq!(excerpt("**Trees** &amp; graphs", 5), "Trees…");
/// ```
pub fn excerpt(markdown: &str, max_chars: usize) -> String {
    let html = markdown_to_compact_html(markdown);
    let with_newlines = BLOCK_TAG_REGEX.replace_all(&html, "\n");
    let no_tags = TAG_REGEX.replace_all(&with_newlines, "");
    let decoded = decode_html_entities(&no_tags);

    let line = decoded
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    if line.chars().count() > max_chars {
        let mut cut: String = line.chars().take(max_chars).collect();
        cut.push('…');
        cut
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("What is a Tree?", "What is a Tree?")]
    #[case("First line\n\nSecond line", "First line")]
    #[case("Trees &amp; Graphs", "Trees & Graphs")]
    #[case("**Bold** and *italic*", "Bold and italic")]
    #[case("", "")]
    #[case("\n\n   \n", "")]
    #[case("   What is a Tree?  ", "What is a Tree?")]
    #[case("![shot](image://abc)\n\nCaption", "Caption")]
    fn given_markdown_when_taking_excerpt_then_returns_first_plain_line(
        #[case] markdown: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(excerpt(markdown, 80), expected);
    }

    #[test]
    fn given_long_line_when_taking_excerpt_then_truncates_on_char_boundary() {
        assert_eq!(excerpt("héllo wörld", 4), "héll…");
    }
}
