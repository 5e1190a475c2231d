/// Fold the width and punctuation variants found on source sites into one
/// ASCII-leaning form so the date/time shapes only need to match it.
///
/// Full-width ASCII becomes half-width, wave dashes, dashes and `から` become
/// `~`, and `まで` is dropped. ASCII `-` is kept so ISO-style dates survive.
pub fn canonicalize(s: &str) -> String {
    fold_width(s).replace("から", "~").replace("まで", "")
}

/// Character-for-character part of [`canonicalize`]: the output has exactly
/// as many chars as the input, so char offsets line up with the original.
pub fn fold_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            // Full-width ASCII block
            '\u{FF01}'..='\u{FF5E}' => {
                fold_separator(char::from_u32(c as u32 - 0xFEE0).unwrap_or(c))
            }
            '\u{3000}' => ' ',
            _ => fold_separator(c),
        })
        .collect()
}

/// Slice of `original` covering the same chars as `folded[range]`, where
/// `folded` came from [`fold_width`].
pub fn original_span(original: &str, folded: &str, range: std::ops::Range<usize>) -> String {
    let skip = folded[..range.start].chars().count();
    let take = folded[range].chars().count();
    original.chars().skip(skip).take(take).collect()
}

fn fold_separator(c: char) -> char {
    match c {
        '〜' | '～' | '‐' | '‑' | '–' | '—' | '−' => '~',
        _ => c,
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// At most `max` characters of `s`, whitespace collapsed. A cut text ends
/// in `…`, which counts towards `max`.
pub fn preview(s: &str, max: usize) -> String {
    let squashed = squash_whitespace(s);
    if squashed.chars().count() <= max {
        squashed
    } else {
        let mut cut: String = squashed.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

/// Split cell or block text into trimmed, non-empty lines.
pub fn lines(raw: &str) -> Vec<String> {
    raw.replace("\r\n", "\n")
        .split('\n')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_width_digits_and_colon() {
        assert_eq!(canonicalize("１０：００～１１：３０"), "10:00~11:30");
    }

    #[test]
    fn wave_dash_and_kara() {
        assert_eq!(canonicalize("10:00〜11:30"), "10:00~11:30");
        assert_eq!(canonicalize("10時から12時まで"), "10時~12時");
    }

    #[test]
    fn ideographic_space() {
        assert_eq!(canonicalize("3月5日\u{3000}(水)"), "3月5日 (水)");
    }

    #[test]
    fn katakana_long_vowel_untouched() {
        assert_eq!(canonicalize("ベビーマッサージ"), "ベビーマッサージ");
    }

    #[test]
    fn fold_width_keeps_char_alignment() {
        let original = "１０：００～ 離乳食";
        let folded = fold_width(original);
        assert_eq!(folded, "10:00~ 離乳食");
        assert_eq!(original.chars().count(), folded.chars().count());
        let start = folded.find('離').unwrap();
        assert_eq!(original_span(original, &folded, start..folded.len()), "離乳食");
        assert_eq!(original_span(original, &folded, 0..6), "１０：００～");
    }

    #[test]
    fn preview_truncates_on_chars() {
        assert_eq!(preview("あいう えお", 3), "あい…");
        assert_eq!(preview("  a \n b ", 10), "a b");
        let long = preview(&"あ".repeat(200), 120);
        assert_eq!(long.chars().count(), 120);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn lines_drop_blanks() {
        assert_eq!(lines("15\r\n\n 離乳食講座 \n"), vec!["15", "離乳食講座"]);
    }
}
