//! Splits input into indexed work units.
//!
//! Text is cut at the most natural boundary that fits in `max_len`
//! characters: line breaks, then sentence ends, then clause punctuation,
//! then whitespace, and only as a last resort in the middle of a word.
//! URL lists are split one item per line.

use crate::error::{Result, VoxreelError};
use crate::pipeline::types::WorkUnit;

/// How the input should be divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    /// Free text, bounded by a maximum chunk length.
    #[default]
    Text,
    /// One unit per non-empty line (e.g. a list of URLs).
    Lines,
}

const SENTENCE_END: &[char] = &['.', '!', '?', '…', '。', '！', '？'];
const CJK_SENTENCE_END: &[char] = &['。', '！', '？'];
const CLAUSE_END: &[char] = &[',', ';', ':', '，', '；', '：'];

/// Splits `content` according to `mode`.
pub fn split(content: &str, mode: SplitMode, max_len: usize) -> Result<Vec<WorkUnit>> {
    match mode {
        SplitMode::Text => split_text(content, max_len),
        SplitMode::Lines => split_lines(content),
    }
}

/// Splits text into units of at most `max_len` characters.
///
/// Whitespace between units is dropped; every other character ends up in
/// exactly one unit, in order.
pub fn split_text(content: &str, max_len: usize) -> Result<Vec<WorkUnit>> {
    if max_len == 0 {
        return Err(VoxreelError::ConfigInvalidValue {
            key: "max_chunk_len".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    let mut remaining = content.trim();
    if remaining.is_empty() {
        return Err(VoxreelError::EmptyInput);
    }

    let mut pieces = Vec::new();
    while !remaining.is_empty() {
        let limit = match remaining.char_indices().nth(max_len) {
            Some((byte_idx, _)) => byte_idx,
            None => {
                pieces.push(remaining.to_string());
                break;
            }
        };

        let cut = find_cut(remaining, limit);
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[cut..].trim_start();
    }

    Ok(number(pieces))
}

/// Splits a list into one unit per non-empty line. Lines starting with `#`
/// are comments.
pub fn split_lines(content: &str) -> Result<Vec<WorkUnit>> {
    let items: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if items.is_empty() {
        return Err(VoxreelError::EmptyInput);
    }
    Ok(number(items))
}

fn number(payloads: Vec<String>) -> Vec<WorkUnit> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| WorkUnit::new(i + 1, payload))
        .collect()
}

/// Returns the byte offset to cut `text` at, never beyond `limit`.
///
/// `limit` is the byte offset of the first character that would not fit.
fn find_cut(text: &str, limit: usize) -> usize {
    let window = &text[..limit];
    let next_is_space = |end: usize| text[end..].chars().next().is_none_or(char::is_whitespace);

    if let Some(pos) = window.rfind('\n')
        && pos > 0
    {
        return pos + 1;
    }

    let mut sentence = None;
    let mut clause = None;
    let mut space = None;
    for (idx, ch) in window.char_indices() {
        let end = idx + ch.len_utf8();
        if SENTENCE_END.contains(&ch) && (CJK_SENTENCE_END.contains(&ch) || next_is_space(end)) {
            sentence = Some(end);
        } else if CLAUSE_END.contains(&ch) && next_is_space(end) {
            clause = Some(end);
        } else if ch.is_whitespace() && idx > 0 {
            space = Some(idx);
        }
    }

    sentence.or(clause).or(space).unwrap_or(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(units: &[WorkUnit]) -> Vec<&str> {
        units.iter().map(|u| u.payload.as_str()).collect()
    }

    fn non_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_short_text_is_single_unit() {
        let units = split_text("Hello world.", 100).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].index, 1);
        assert_eq!(units[0].payload, "Hello world.");
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = "First sentence here. Second sentence is longer than that.";
        let units = split_text(text, 30).unwrap();
        assert_eq!(units[0].payload, "First sentence here.");
        assert!(units.iter().all(|u| u.payload.chars().count() <= 30));
    }

    #[test]
    fn test_prefers_line_break_over_sentence() {
        let text = "Title\nBody sentence one. Body two.";
        let units = split_text(text, 25).unwrap();
        assert_eq!(units[0].payload, "Title");
    }

    #[test]
    fn test_falls_back_to_clause_then_whitespace() {
        let units = split_text("alpha beta, gamma delta epsilon", 15).unwrap();
        assert_eq!(units[0].payload, "alpha beta,");

        let units = split_text("alpha beta gamma delta", 12).unwrap();
        assert_eq!(units[0].payload, "alpha beta");
    }

    #[test]
    fn test_hard_cut_for_long_word() {
        let units = split_text("abcdefghij", 4).unwrap();
        assert_eq!(payloads(&units), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_never_exceeds_limit_and_covers_input() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua!\n\
                    Ut enim ad minim veniam? Quis nostrud exercitation ullamco laboris.";
        for max_len in [1, 5, 17, 40, 80, 1000] {
            let units = split_text(text, max_len).unwrap();
            assert!(units.iter().all(|u| u.payload.chars().count() <= max_len));
            let joined: String = units.iter().map(|u| u.payload.as_str()).collect();
            assert_eq!(non_whitespace(&joined), non_whitespace(text));
        }
    }

    #[test]
    fn test_indices_are_contiguous_from_one() {
        let units = split_text("a. b. c. d. e.", 2).unwrap();
        let indices: Vec<usize> = units.iter().map(|u| u.index).collect();
        let expected: Vec<usize> = (1..=units.len()).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn test_multibyte_characters_respect_char_limit() {
        let text = "日本語の文章です。次の文です。最後の文。";
        let units = split_text(text, 10).unwrap();
        assert_eq!(
            payloads(&units),
            vec!["日本語の文章です。", "次の文です。", "最後の文。"]
        );

        let units = split_text(text, 4).unwrap();
        assert!(units.iter().all(|u| u.payload.chars().count() <= 4));
    }

    #[test]
    fn test_deterministic() {
        let text = "One. Two, three four. Five six seven eight nine ten.";
        assert_eq!(split_text(text, 12).unwrap(), split_text(text, 12).unwrap());
    }

    #[test]
    fn test_empty_and_whitespace_input_is_error() {
        assert!(matches!(split_text("", 10), Err(VoxreelError::EmptyInput)));
        assert!(matches!(
            split_text("   \n\t ", 10),
            Err(VoxreelError::EmptyInput)
        ));
    }

    #[test]
    fn test_zero_max_len_is_config_error() {
        assert!(matches!(
            split_text("text", 0),
            Err(VoxreelError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_split_lines_skips_blank_and_comments() {
        let list = "https://a.example/1\n\n# skipped\n  https://a.example/2  \n";
        let units = split_lines(list).unwrap();
        assert_eq!(
            payloads(&units),
            vec!["https://a.example/1", "https://a.example/2"]
        );
        assert_eq!(units[1].index, 2);
    }

    #[test]
    fn test_split_lines_empty_is_error() {
        assert!(matches!(
            split_lines("# only a comment\n"),
            Err(VoxreelError::EmptyInput)
        ));
    }

    #[test]
    fn test_split_dispatches_on_mode() {
        let units = split("one two\nthree", SplitMode::Lines, 3).unwrap();
        assert_eq!(payloads(&units), vec!["one two", "three"]);
    }
}
