//! Plain-text helpers for feed summaries.

const SUMMARY_LIMIT: usize = 250;

/// Reduces page markdown to a short plain-text summary.
///
/// Headings and property-like noise are dropped, wiki links collapse to
/// their display text, and the result is cut at a word boundary.
pub fn cleanup_summary(body: &str) -> String {
    let mut text = String::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&strip_wiki_links(line));
    }
    truncate_words(&text, SUMMARY_LIMIT)
}

fn strip_wiki_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find("[[") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("]]") {
            Some(end) => {
                let inner = &after[..end];
                // [[target|display]] keeps the display part.
                out.push_str(inner.rsplit('|').next().unwrap_or(inner));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn truncate_words(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = 0;
    for (idx, _) in text.match_indices(' ') {
        if idx > limit {
            break;
        }
        cut = idx;
    }
    if cut == 0 {
        cut = text
            .char_indices()
            .take_while(|(idx, _)| *idx <= limit)
            .last()
            .map(|(idx, _)| idx)
            .unwrap_or(0);
    }
    format!("{}...", text[..cut].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_headings_and_joins_lines() {
        let summary = cleanup_summary("# Title\n\nFirst line.\nSecond line.\n");
        assert_eq!(summary, "First line. Second line.");
    }

    #[test]
    fn collapses_wiki_links_to_display_text() {
        assert_eq!(
            cleanup_summary("See [[Other Page]] and [[Target|the label]]."),
            "See Other Page and the label."
        );
    }

    #[test]
    fn truncates_long_text_at_word_boundary() {
        let body = "word ".repeat(100);
        let summary = cleanup_summary(&body);
        assert!(summary.len() <= SUMMARY_LIMIT + 4);
        assert!(summary.ends_with("..."));
        assert!(!summary.contains("word wor..."));
    }

    #[test]
    fn unterminated_link_is_kept_verbatim() {
        assert_eq!(cleanup_summary("Broken [[link"), "Broken [[link");
    }
}
