use once_cell::sync::Lazy;
use regex::Regex;

/// Pages whose trimmed text is this short or shorter are treated as empty.
pub const MIN_PAGE_CHARS: usize = 50;

static PAGE_NUMBER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d{1,4}[ \t]*\r?$").expect("valid page number regex"));

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence regex"));

/// Strip bare page-number lines and collapse all whitespace runs to one space.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let without_page_numbers = PAGE_NUMBER_LINE.replace_all(text, " ");
    WHITESPACE_RUN
        .replace_all(&without_page_numbers, " ")
        .trim()
        .to_string()
}

/// Split on terminal punctuation followed by whitespace, keeping the punctuation.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_END.find_iter(text) {
        // The punctuation mark is a single ASCII byte.
        let end = boundary.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Concatenate per-page text, skipping pages that are mostly empty.
#[must_use]
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut kept = Vec::with_capacity(pages.len());
    for (idx, page) in pages.iter().enumerate() {
        let page = page.as_ref();
        if page.trim().chars().count() <= MIN_PAGE_CHARS {
            log::debug!("Skipping near-empty page {}", idx + 1);
            continue;
        }
        kept.push(normalize_text(page));
    }
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_text("  Deep\tlearning\n\n  works.  "),
            "Deep learning works."
        );
    }

    #[test]
    fn normalize_strips_page_number_lines() {
        let raw = "end of the first page.\n12\nStart of the next page.\n  13  \nMore.";
        assert_eq!(
            normalize_text(raw),
            "end of the first page. Start of the next page. More."
        );
    }

    #[test]
    fn normalize_keeps_numbers_inside_lines() {
        assert_eq!(
            normalize_text("We trained for 12\nepochs on 4 GPUs."),
            "We trained for 12 epochs on 4 GPUs."
        );
    }

    #[test]
    fn split_keeps_terminal_punctuation() {
        let sentences = split_sentences("Is attention enough? We think so! It scales. Done");
        assert_eq!(
            sentences,
            vec!["Is attention enough?", "We think so!", "It scales.", "Done"]
        );
    }

    #[test]
    fn split_ignores_punctuation_without_whitespace() {
        let sentences = split_sentences("Accuracy rose to 93.5 percent. See Fig.3 for details.");
        assert_eq!(
            sentences,
            vec!["Accuracy rose to 93.5 percent.", "See Fig.3 for details."]
        );
    }

    #[test]
    fn split_empty_input() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn join_pages_skips_near_empty_pages() {
        let body = "This page carries enough extracted text to be worth keeping around.";
        let pages = vec![body.to_string(), "  7  ".to_string(), format!("{body}\n\n2")];
        let joined = join_pages(&pages);
        assert_eq!(joined, format!("{body} {body}"));
    }
}
