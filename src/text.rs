//! Query tokenization and small string helpers

/// Terms shorter than this (in characters) carry no signal
const MIN_TERM_CHARS: usize = 4;

/// Split a query into scoring terms.
///
/// Whitespace separated, surrounding punctuation stripped, lower-cased,
/// terms of three characters or fewer dropped, duplicates removed while
/// keeping first occurrence order.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let term = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if term.chars().count() < MIN_TERM_CHARS {
            continue;
        }
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Whitespace separated word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Prefix of at most `max_chars` characters, cut on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate for display, appending an ellipsis when cut
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", truncate_chars(s, max_chars))
    }
}

/// Group blank-line separated paragraphs into chunks of at most
/// `max_chars` characters. A single longer paragraph is split on char
/// boundaries.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        let needed = current.chars().count() + paragraph.chars().count() + 2;
        if !current.is_empty() && needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        let mut rest = paragraph;
        while rest.chars().count() > max_chars {
            let head = truncate_chars(rest, max_chars);
            chunks.push(head.to_string());
            rest = rest[head.len()..].trim_start();
        }
        if rest.is_empty() {
            continue;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(rest);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
