//! Text normalization shared by the lexical backends.

/// Lowercase `text`, turn every non-alphanumeric character into a word
/// break, and return the resulting words.
pub fn words(text: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            normalized.extend(c.to_lowercase());
        } else {
            normalized.push(' ');
        }
    }
    normalized.split_whitespace().map(str::to_string).collect()
}

/// Character trigrams of every word, with each word padded by two leading
/// spaces and one trailing space. Duplicates are kept.
///
/// `"ab"` yields `["  a", " ab", "ab "]`.
pub fn trigrams(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for w in words(text) {
        let chars: Vec<char> = "  ".chars().chain(w.chars()).chain(" ".chars()).collect();
        for win in chars.windows(3) {
            out.push(win.iter().collect());
        }
    }
    out
}
